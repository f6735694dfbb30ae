//! Merging heterogeneous parameter sources into one flat [`ParamMap`].
//!
//! A source is anything implementing [`ParamSource`]: string-keyed maps,
//! single `(name, value)` pairs, structs declared with
//! [`impl_param_source!`](crate::impl_param_source), or any
//! `serde::Serialize` struct wrapped in [`Serialized`].
//!
//! ```rust
//! use std::collections::HashMap;
//! use rdbms_client::prelude::*;
//!
//! struct Filter {
//!     name: String,
//!     min_age: i64,
//!     internal: u8,
//! }
//!
//! rdbms_client::impl_param_source!(Filter { name, min_age => "MinAge" });
//!
//! let base = Filter { name: "ann".into(), min_age: 18, internal: 0 };
//! let mut overrides = HashMap::new();
//! overrides.insert("name".to_string(), RowValues::Text("bob".into()));
//!
//! let merged = merge_params(&[&base, &overrides]);
//! assert_eq!(merged.len(), 2);
//! assert_eq!(merged["name"], RowValues::Text("bob".into()));
//! assert_eq!(merged["MinAge"], RowValues::Int(18));
//! # let _ = base.internal;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::types::{ParamMap, RowValues};

/// Something that contributes named entries to a merged parameter mapping.
pub trait ParamSource: Sync {
    /// Insert this source's entries, replacing any existing values for the same keys.
    fn contribute(&self, into: &mut ParamMap);
}

/// Conversion of a field value into a query parameter.
pub trait ToParamValue {
    fn to_param_value(&self) -> RowValues;
}

/// Merge sources in order; on a key collision the later source wins.
#[must_use]
pub fn merge_params(sources: &[&dyn ParamSource]) -> ParamMap {
    let mut merged = ParamMap::new();
    for source in sources {
        source.contribute(&mut merged);
    }
    merged
}

/// Adapter exposing the fields of a `Serialize` struct as parameters.
///
/// Field names follow serde, so `#[serde(rename = "...")]` overrides a key and
/// `#[serde(skip)]` excludes a field. The value must serialize to a JSON
/// object; anything else is a programming error and panics.
#[derive(Debug, Clone, Copy)]
pub struct Serialized<'a, T: ?Sized>(pub &'a T);

impl<T: Serialize + Sync + ?Sized> ParamSource for Serialized<'_, T> {
    fn contribute(&self, into: &mut ParamMap) {
        match serde_json::to_value(self.0) {
            Ok(JsonValue::Object(fields)) => {
                for (name, value) in fields {
                    into.insert(name, json_to_row_value(value));
                }
            }
            Ok(other) => panic!(
                "parameter source must serialize to an object, got {}",
                json_kind(&other)
            ),
            Err(err) => panic!("parameter source could not be serialized: {err}"),
        }
    }
}

fn json_to_row_value(value: JsonValue) -> RowValues {
    match value {
        JsonValue::Null => RowValues::Null,
        JsonValue::Bool(b) => RowValues::Bool(b),
        JsonValue::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => RowValues::Int(i),
            (None, Some(f)) => RowValues::Float(f),
            (None, None) => RowValues::Text(n.to_string()),
        },
        JsonValue::String(s) => RowValues::Text(s),
        other @ (JsonValue::Array(_) | JsonValue::Object(_)) => RowValues::JSON(other),
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

impl<K: AsRef<str> + Sync, V: ToParamValue + Sync> ParamSource for BTreeMap<K, V> {
    fn contribute(&self, into: &mut ParamMap) {
        for (key, value) in self {
            into.insert(key.as_ref().to_owned(), value.to_param_value());
        }
    }
}

impl<K, V, S> ParamSource for HashMap<K, V, S>
where
    K: AsRef<str> + Sync,
    V: ToParamValue + Sync,
    S: BuildHasher + Sync,
{
    fn contribute(&self, into: &mut ParamMap) {
        for (key, value) in self {
            into.insert(key.as_ref().to_owned(), value.to_param_value());
        }
    }
}

impl<K: AsRef<str> + Sync, V: ToParamValue + Sync> ParamSource for (K, V) {
    fn contribute(&self, into: &mut ParamMap) {
        into.insert(self.0.as_ref().to_owned(), self.1.to_param_value());
    }
}

impl<T: ParamSource + ?Sized> ParamSource for &T {
    fn contribute(&self, into: &mut ParamMap) {
        (**self).contribute(into);
    }
}

macro_rules! int_param_value {
    ($($t:ty),*) => {
        $(
            impl ToParamValue for $t {
                fn to_param_value(&self) -> RowValues {
                    RowValues::Int(i64::from(*self))
                }
            }
        )*
    };
}

int_param_value!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_param_value {
    ($($t:ty),*) => {
        $(
            impl ToParamValue for $t {
                fn to_param_value(&self) -> RowValues {
                    i64::try_from(*self)
                        .map_or_else(|_| RowValues::Text(self.to_string()), RowValues::Int)
                }
            }
        )*
    };
}

wide_int_param_value!(u64, usize, isize);

impl ToParamValue for f32 {
    fn to_param_value(&self) -> RowValues {
        RowValues::Float(f64::from(*self))
    }
}

impl ToParamValue for f64 {
    fn to_param_value(&self) -> RowValues {
        RowValues::Float(*self)
    }
}

impl ToParamValue for bool {
    fn to_param_value(&self) -> RowValues {
        RowValues::Bool(*self)
    }
}

impl ToParamValue for str {
    fn to_param_value(&self) -> RowValues {
        RowValues::Text(self.to_owned())
    }
}

impl ToParamValue for String {
    fn to_param_value(&self) -> RowValues {
        RowValues::Text(self.clone())
    }
}

impl ToParamValue for NaiveDateTime {
    fn to_param_value(&self) -> RowValues {
        RowValues::Timestamp(*self)
    }
}

impl ToParamValue for Vec<u8> {
    fn to_param_value(&self) -> RowValues {
        RowValues::Blob(self.clone())
    }
}

impl ToParamValue for JsonValue {
    fn to_param_value(&self) -> RowValues {
        RowValues::JSON(self.clone())
    }
}

impl ToParamValue for RowValues {
    fn to_param_value(&self) -> RowValues {
        self.clone()
    }
}

impl<T: ToParamValue> ToParamValue for Option<T> {
    fn to_param_value(&self) -> RowValues {
        self.as_ref().map_or(RowValues::Null, ToParamValue::to_param_value)
    }
}

impl<T: ToParamValue + ?Sized> ToParamValue for &T {
    fn to_param_value(&self) -> RowValues {
        (**self).to_param_value()
    }
}

/// Implement [`ParamSource`] for a struct by listing the fields it exposes.
///
/// Each listed field contributes under its own name, or under the literal
/// given after `=>`. Fields that are not listed are excluded.
///
/// ```rust
/// struct Person { name: String, age: i32, secret: String }
/// rdbms_client::impl_param_source!(Person { name, age => "AGE" });
/// # let _ = Person { name: String::new(), age: 0, secret: String::new() }.secret;
/// ```
#[macro_export]
macro_rules! impl_param_source {
    ($ty:ty { $($field:ident $(=> $name:literal)?),* $(,)? }) => {
        impl $crate::params::ParamSource for $ty {
            fn contribute(&self, into: &mut $crate::types::ParamMap) {
                $(
                    into.insert(
                        ::std::string::String::from($crate::__field_key!($field $(, $name)?)),
                        $crate::params::ToParamValue::to_param_value(&self.$field),
                    );
                )*
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __field_key {
    ($field:ident) => {
        stringify!($field)
    };
    ($field:ident, $name:literal) => {
        $name
    };
}
