//! The driver capability the client runs statements through.
//!
//! A backend provides a shared [`DatabaseHandle`] (usually a pool) that can
//! execute statements directly or open a [`DriverTransaction`] bound to one
//! connection. Both surfaces share [`StatementExecutor`].

use async_trait::async_trait;

use crate::error::RdbmsError;
use crate::results::{ExecResult, ResultSet};
use crate::types::{RowValues, TxOptions};

/// Statement execution shared by pooled handles and open transactions.
#[async_trait]
pub trait StatementExecutor: Send {
    /// Execute a statement for its side effects.
    async fn execute(&mut self, sql: &str, args: &[RowValues]) -> Result<ExecResult, RdbmsError>;

    /// Execute a query and materialise its rows.
    async fn query(&mut self, sql: &str, args: &[RowValues]) -> Result<ResultSet, RdbmsError>;
}

/// An open transaction owning its connection until commit or rollback.
#[async_trait]
pub trait DriverTransaction: StatementExecutor {
    async fn commit(self: Box<Self>) -> Result<(), RdbmsError>;

    async fn rollback(self: Box<Self>) -> Result<(), RdbmsError>;
}

/// A shared database handle; safe to use from many clients at once.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    async fn execute(&self, sql: &str, args: &[RowValues]) -> Result<ExecResult, RdbmsError>;

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, RdbmsError>;

    async fn begin(&self, opts: &TxOptions) -> Result<Box<dyn DriverTransaction>, RdbmsError>;
}
