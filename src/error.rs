use thiserror::Error;

/// Failure reported by a [`QueryManager`](crate::query::QueryManager) while resolving a query id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryManagerError {
    #[error("no query registered with id '{0}'")]
    UnknownQuery(String),

    #[error("query '{query_id}' references parameter '{param}' which was not supplied")]
    MissingParameter { query_id: String, param: String },

    #[error("query '{query_id}' could not be rendered: {message}")]
    Template { query_id: String, message: String },
}

#[derive(Debug, Error)]
pub enum RdbmsError {
    #[error(transparent)]
    QueryManager(#[from] QueryManagerError),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("a transaction is already active on this client")]
    TransactionAlreadyActive,

    #[error("no transaction is active on this client")]
    NoActiveTransaction,

    #[error("column '{column}' holds a {found} value which cannot be bound to a {expected} field")]
    Binding {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("query '{query_id}' returned more than one row where at most one was expected")]
    MultipleRows { query_id: String },

    #[error("the driver did not report a generated id for the statement")]
    NoInsertId,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation exceeded its deadline")]
    DeadlineExceeded,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),
}

impl RdbmsError {
    /// True for misuse of the start/commit/rollback lifecycle.
    #[must_use]
    pub fn is_transaction_state(&self) -> bool {
        matches!(self, Self::TransactionAlreadyActive | Self::NoActiveTransaction)
    }

    /// True for errors raised by the driver layer itself.
    #[must_use]
    pub fn is_driver(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => true,
            Self::ConnectionError(_) | Self::ExecutionError(_) => true,
            _ => false,
        }
    }

    #[must_use]
    pub fn is_binding(&self) -> bool {
        matches!(self, Self::Binding { .. })
    }

    #[must_use]
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::QueryManager(_))
    }
}

impl From<serde_json::Error> for RdbmsError {
    fn from(err: serde_json::Error) -> Self {
        RdbmsError::ConfigError(format!("invalid JSON configuration: {err}"))
    }
}
