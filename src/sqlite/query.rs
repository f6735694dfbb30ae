use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::RdbmsError;
use crate::results::{ExecResult, ResultSet};
use crate::types::RowValues;

use super::params::Params;

/// Extract a [`RowValues`] from a `SQLite` row.
///
/// # Errors
/// Returns [`RdbmsError::Sqlite`] if the column cannot be read.
pub fn sqlite_extract_value_sync(row: &rusqlite::Row, idx: usize) -> Result<RowValues, RdbmsError> {
    let value: Value = row.get(idx)?;
    Ok(match value {
        Value::Null => RowValues::Null,
        Value::Integer(i) => RowValues::Int(i),
        Value::Real(f) => RowValues::Float(f),
        Value::Text(s) => RowValues::Text(s),
        Value::Blob(b) => RowValues::Blob(b),
    })
}

/// Run a prepared statement and materialise every row.
///
/// # Errors
/// Returns [`RdbmsError::Sqlite`] if stepping or reading a row fails.
pub fn build_result_set(stmt: &mut Statement<'_>, params: &Params) -> Result<ResultSet, RdbmsError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(column_names, 10);
    let mut rows = stmt.query(&params.as_refs()[..])?;
    while let Some(row) = rows.next()? {
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Execute a statement, reporting rows changed and the rowid it inserted.
///
/// The connection's last rowid survives across statements, so it is only
/// reported when this statement changed rows and moved it.
///
/// # Errors
/// Returns [`RdbmsError::Sqlite`] if preparing or executing fails.
pub fn execute_statement(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<ExecResult, RdbmsError> {
    let before = conn.last_insert_rowid();
    let mut stmt = conn.prepare(sql)?;
    let affected = stmt.execute(&params.as_refs()[..])?;
    let after = conn.last_insert_rowid();
    Ok(ExecResult::new(
        u64::try_from(affected).unwrap_or(u64::MAX),
        (affected > 0 && after != before).then_some(after),
    ))
}

/// Prepare `sql` and build its result set.
///
/// # Errors
/// Returns [`RdbmsError::Sqlite`] if preparing or stepping fails.
pub fn select_statement(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &Params,
) -> Result<ResultSet, RdbmsError> {
    let mut stmt = conn.prepare(sql)?;
    build_result_set(&mut stmt, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rowid_is_reported_only_for_rows_this_statement_inserted() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE);")
            .unwrap();
        let none = Params::default();

        let first = execute_statement(&conn, "INSERT INTO t (name) VALUES ('a')", &none).unwrap();
        assert_eq!(first, ExecResult::new(1, Some(1)));

        let ignored =
            execute_statement(&conn, "INSERT OR IGNORE INTO t (name) VALUES ('a')", &none).unwrap();
        assert_eq!(ignored, ExecResult::new(0, None));

        let renamed = execute_statement(&conn, "UPDATE t SET name = 'b' WHERE id = 1", &none).unwrap();
        assert_eq!(renamed, ExecResult::new(1, None));

        let missed = execute_statement(&conn, "DELETE FROM t WHERE id = 99", &none).unwrap();
        assert_eq!(missed, ExecResult::new(0, None));
    }
}
