//! Binding result rows into caller-owned structs.
//!
//! A [`BindTarget`] maps a column name to one of its fields and hands the
//! column value to that field's [`FromColumnValue`] coercion. Targets are
//! normally declared with [`impl_bind_target!`](crate::impl_bind_target):
//!
//! ```rust
//! use rdbms_client::prelude::*;
//!
//! #[derive(Debug, Default, Clone)]
//! struct User {
//!     id: i64,
//!     name: String,
//!     email: Option<String>,
//! }
//!
//! rdbms_client::impl_bind_target!(User { id, name => "user_name", email });
//!
//! let mut rs = ResultSet::new(vec!["id".into(), "user_name".into(), "email".into(), "extra".into()]);
//! rs.add_row_values(vec![
//!     RowValues::Int(3),
//!     RowValues::Text("ann".into()),
//!     RowValues::Null,
//!     RowValues::Bool(true),
//! ]);
//!
//! let users: Vec<User> = rdbms_client::binder::bind_all(&rs)?;
//! assert_eq!(users[0].name, "ann");
//! assert_eq!(users[0].email, None);
//! # Ok::<(), RdbmsError>(())
//! ```

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::RdbmsError;
use crate::results::{CustomDbRow, ResultSet};
use crate::types::RowValues;

/// Result of coercing one column value into a field type.
#[derive(Debug, Clone, PartialEq)]
pub enum Coercion<T> {
    Value(T),
    Mismatch,
}

impl<T> Coercion<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Coercion<U> {
        match self {
            Coercion::Value(v) => Coercion::Value(f(v)),
            Coercion::Mismatch => Coercion::Mismatch,
        }
    }
}

impl<T> From<Option<T>> for Coercion<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Coercion::Mismatch, Coercion::Value)
    }
}

/// A field type that can be populated from a column value.
pub trait FromColumnValue: Sized {
    /// Name of the semantic type, reported in binding errors.
    const EXPECTED: &'static str;

    fn coerce(value: &RowValues) -> Coercion<Self>;
}

/// What a target did with one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOutcome {
    Bound,
    /// No field maps to the column; the column is ignored.
    Unmatched,
    Mismatch { expected: &'static str },
}

/// A struct whose fields can be populated from result columns.
pub trait BindTarget {
    fn bind_column(&mut self, column: &str, value: &RowValues) -> ColumnOutcome;
}

/// Coerce `value` into `slot`, leaving `slot` untouched on a mismatch.
pub fn bind_field<T: FromColumnValue>(slot: &mut T, value: &RowValues) -> ColumnOutcome {
    match T::coerce(value) {
        Coercion::Value(v) => {
            *slot = v;
            ColumnOutcome::Bound
        }
        Coercion::Mismatch => ColumnOutcome::Mismatch {
            expected: T::EXPECTED,
        },
    }
}

/// Bind every column of `row` into `target`.
///
/// # Errors
/// Returns [`RdbmsError::Binding`] on the first column whose value cannot be
/// coerced; earlier columns may already have been written.
pub fn bind_row<T: BindTarget + ?Sized>(
    row: &CustomDbRow,
    target: &mut T,
) -> Result<(), RdbmsError> {
    for (column, value) in row.columns() {
        if let ColumnOutcome::Mismatch { expected } = target.bind_column(column, value) {
            return Err(RdbmsError::Binding {
                column: column.to_owned(),
                expected,
                found: value.kind_name(),
            });
        }
    }
    Ok(())
}

/// Bind the only row of `rs` into `target`.
///
/// Returns `Ok(false)` without touching `target` when there are no rows. The
/// row is bound into a copy first so a failed bind never leaves `target`
/// half-written.
///
/// # Errors
/// [`RdbmsError::MultipleRows`] if `rs` holds more than one row, or
/// [`RdbmsError::Binding`] if a column cannot be coerced.
pub fn bind_single<T: BindTarget + Clone>(
    query_id: &str,
    rs: &ResultSet,
    target: &mut T,
) -> Result<bool, RdbmsError> {
    let row = match rs.results.as_slice() {
        [] => return Ok(false),
        [row] => row,
        _ => {
            return Err(RdbmsError::MultipleRows {
                query_id: query_id.to_owned(),
            });
        }
    };

    let mut scratch = target.clone();
    bind_row(row, &mut scratch)?;
    *target = scratch;
    Ok(true)
}

/// Bind each row of `rs` into a fresh `T::default()`, preserving row order.
///
/// # Errors
/// Returns [`RdbmsError::Binding`] if any row fails; no rows are returned then.
pub fn bind_all<T: BindTarget + Default>(rs: &ResultSet) -> Result<Vec<T>, RdbmsError> {
    let mut bound = Vec::with_capacity(rs.len());
    for row in rs {
        let mut item = T::default();
        bind_row(row, &mut item)?;
        bound.push(item);
    }
    Ok(bound)
}

/// Implement [`BindTarget`] for a struct by listing the fields columns bind to.
///
/// A field binds from the column named by the literal after `=>`, or from the
/// column with the field's own name. Columns that match no listed field are
/// ignored.
#[macro_export]
macro_rules! impl_bind_target {
    ($ty:ty { $($field:ident $(=> $column:literal)?),* $(,)? }) => {
        impl $crate::binder::BindTarget for $ty {
            fn bind_column(
                &mut self,
                column: &str,
                value: &$crate::types::RowValues,
            ) -> $crate::binder::ColumnOutcome {
                $(
                    if column == $crate::__field_key!($field $(, $column)?) {
                        return $crate::binder::bind_field(&mut self.$field, value);
                    }
                )*
                $crate::binder::ColumnOutcome::Unmatched
            }
        }
    };
}

// A plain map takes every column verbatim.
impl BindTarget for BTreeMap<String, RowValues> {
    fn bind_column(&mut self, column: &str, value: &RowValues) -> ColumnOutcome {
        self.insert(column.to_owned(), value.clone());
        ColumnOutcome::Bound
    }
}

impl FromColumnValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        value.as_int().copied().into()
    }
}

macro_rules! narrow_int_column {
    ($($t:ty),*) => {
        $(
            impl FromColumnValue for $t {
                const EXPECTED: &'static str = "integer";

                fn coerce(value: &RowValues) -> Coercion<Self> {
                    value
                        .as_int()
                        .and_then(|i| <$t>::try_from(*i).ok())
                        .into()
                }
            }
        )*
    };
}

narrow_int_column!(i8, i16, i32, u8, u16, u32, u64, usize);

impl FromColumnValue for f64 {
    const EXPECTED: &'static str = "float";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        value.as_float().into()
    }
}

impl FromColumnValue for f32 {
    const EXPECTED: &'static str = "float";

    #[allow(clippy::cast_possible_truncation)]
    fn coerce(value: &RowValues) -> Coercion<Self> {
        value.as_float().map(|f| f as f32).into()
    }
}

impl FromColumnValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        value.as_bool().copied().into()
    }
}

impl FromColumnValue for String {
    const EXPECTED: &'static str = "text";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        match value {
            RowValues::Text(s) => Coercion::Value(s.clone()),
            RowValues::Blob(bytes) => String::from_utf8(bytes.clone()).ok().into(),
            _ => Coercion::Mismatch,
        }
    }
}

impl FromColumnValue for Vec<u8> {
    const EXPECTED: &'static str = "blob";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        match value {
            RowValues::Blob(bytes) => Coercion::Value(bytes.clone()),
            RowValues::Text(s) => Coercion::Value(s.as_bytes().to_vec()),
            _ => Coercion::Mismatch,
        }
    }
}

impl FromColumnValue for NaiveDateTime {
    const EXPECTED: &'static str = "timestamp";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        value.as_timestamp().into()
    }
}

impl FromColumnValue for JsonValue {
    const EXPECTED: &'static str = "json";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        match value {
            RowValues::JSON(json) => Coercion::Value(json.clone()),
            RowValues::Text(s) => serde_json::from_str::<JsonValue>(s).ok().into(),
            _ => Coercion::Mismatch,
        }
    }
}

impl FromColumnValue for RowValues {
    const EXPECTED: &'static str = "any";

    fn coerce(value: &RowValues) -> Coercion<Self> {
        Coercion::Value(value.clone())
    }
}

impl<T: FromColumnValue> FromColumnValue for Option<T> {
    const EXPECTED: &'static str = T::EXPECTED;

    fn coerce(value: &RowValues) -> Coercion<Self> {
        if value.is_null() {
            Coercion::Value(None)
        } else {
            T::coerce(value).map(Some)
        }
    }
}
