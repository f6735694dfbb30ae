//! Convenient imports for common functionality.

pub use crate::binder::{
    BindTarget, Coercion, ColumnOutcome, FromColumnValue, bind_all, bind_row, bind_single,
};
pub use crate::client::RdbmsClient;
pub use crate::context::QueryContext;
pub use crate::driver::{DatabaseHandle, DriverTransaction, StatementExecutor};
pub use crate::error::{QueryManagerError, RdbmsError};
pub use crate::manager::{ClientManager, ClientManagerConfig};
pub use crate::params::{ParamSource, Serialized, ToParamValue, merge_params};
pub use crate::query::{QueryManager, QueryResolver, TemplateQueryManager};
pub use crate::results::{CustomDbRow, ExecResult, ResultSet};
pub use crate::transaction::TransactionState;
pub use crate::types::{InsertIdStrategy, IsolationLevel, ParamMap, RowValues, TxOptions};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDatabase, SqliteOptions, SqliteOptionsBuilder, SqliteTx};
