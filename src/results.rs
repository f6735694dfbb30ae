//! Materialised statement outcomes.

mod exec;
mod result_set;
mod row;

pub use exec::ExecResult;
pub use result_set::ResultSet;
pub use row::CustomDbRow;
