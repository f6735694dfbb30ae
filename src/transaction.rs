//! Transaction lifecycle for a single client.

use std::sync::Arc;

use tracing::debug;

use crate::context::{QueryContext, run_in};
use crate::driver::{DatabaseHandle, DriverTransaction};
use crate::error::RdbmsError;
use crate::results::{ExecResult, ResultSet};
use crate::types::{RowValues, TxOptions};

/// Whether a client is inside a transaction.
///
/// `NoTransaction` is both the initial state and the state after every commit
/// or rollback, so a client can run any number of transactions in sequence.
#[derive(Default)]
pub enum TransactionState {
    #[default]
    NoTransaction,
    InTransaction(Box<dyn DriverTransaction>),
}

impl TransactionState {
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::InTransaction(_))
    }

    /// Open a transaction on `handle`.
    ///
    /// # Errors
    /// [`RdbmsError::TransactionAlreadyActive`] if one is open (state is left
    /// as is), or the driver's error from `begin`.
    pub async fn start(
        &mut self,
        handle: &dyn DatabaseHandle,
        opts: &TxOptions,
        ctx: Option<&QueryContext>,
    ) -> Result<(), RdbmsError> {
        if self.is_active() {
            return Err(RdbmsError::TransactionAlreadyActive);
        }
        let tx = run_in(ctx, handle.begin(opts)).await?;
        debug!(?opts, "transaction started");
        *self = Self::InTransaction(tx);
        Ok(())
    }

    /// Commit the open transaction. The handle is discarded whatever the outcome.
    ///
    /// # Errors
    /// [`RdbmsError::NoActiveTransaction`], or the driver's commit error.
    pub async fn commit(&mut self, ctx: Option<&QueryContext>) -> Result<(), RdbmsError> {
        let tx = self.take()?;
        let res = run_in(ctx, tx.commit()).await;
        debug!(ok = res.is_ok(), "transaction committed");
        res
    }

    /// Roll back the open transaction. The handle is discarded whatever the outcome.
    ///
    /// # Errors
    /// [`RdbmsError::NoActiveTransaction`], or the driver's rollback error.
    pub async fn rollback(&mut self, ctx: Option<&QueryContext>) -> Result<(), RdbmsError> {
        let tx = self.take()?;
        let res = run_in(ctx, tx.rollback()).await;
        debug!(ok = res.is_ok(), "transaction rolled back");
        res
    }

    fn take(&mut self) -> Result<Box<dyn DriverTransaction>, RdbmsError> {
        match std::mem::take(self) {
            Self::InTransaction(tx) => Ok(tx),
            Self::NoTransaction => Err(RdbmsError::NoActiveTransaction),
        }
    }

    /// Execute through the open transaction, or directly on `handle`.
    pub(crate) async fn execute(
        &mut self,
        handle: &Arc<dyn DatabaseHandle>,
        sql: &str,
        args: &[RowValues],
        ctx: Option<&QueryContext>,
    ) -> Result<ExecResult, RdbmsError> {
        match self {
            Self::InTransaction(tx) => run_in(ctx, tx.execute(sql, args)).await,
            Self::NoTransaction => run_in(ctx, handle.execute(sql, args)).await,
        }
    }

    /// Query through the open transaction, or directly on `handle`.
    pub(crate) async fn query(
        &mut self,
        handle: &Arc<dyn DatabaseHandle>,
        sql: &str,
        args: &[RowValues],
        ctx: Option<&QueryContext>,
    ) -> Result<ResultSet, RdbmsError> {
        match self {
            Self::InTransaction(tx) => run_in(ctx, tx.query(sql, args)).await,
            Self::NoTransaction => run_in(ctx, handle.query(sql, args)).await,
        }
    }
}

impl std::fmt::Debug for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTransaction => f.write_str("NoTransaction"),
            Self::InTransaction(_) => f.write_str("InTransaction"),
        }
    }
}
