use std::sync::Arc;

use async_trait::async_trait;
use bb8::Pool;
use tracing::debug;

use crate::driver::{DatabaseHandle, DriverTransaction};
use crate::error::RdbmsError;
use crate::results::{ExecResult, ResultSet};
use crate::types::{RowValues, TxOptions};

use super::config::{SqliteManager, SqliteOptions};
use super::connection::{checkout_error, run_blocking};
use super::params::Params;
use super::query::{execute_statement, select_statement};
use super::transaction::SqliteTx;

/// Pooled `SQLite` database usable as a shared [`DatabaseHandle`].
///
/// Statements outside a transaction run in auto-commit mode on whichever
/// pooled connection is free.
#[derive(Clone)]
pub struct SqliteDatabase {
    pool: Pool<SqliteManager>,
}

impl SqliteDatabase {
    /// Open `opts.db_path` and build the connection pool.
    ///
    /// # Errors
    /// Returns [`RdbmsError::ConfigError`] for invalid options, or the error
    /// raised while opening the first connection.
    pub async fn open(opts: SqliteOptions) -> Result<Self, RdbmsError> {
        opts.validate()?;
        let pool = Pool::builder()
            .max_size(opts.pool_size)
            .build(SqliteManager::new(&opts))
            .await?;
        debug!(db_path = %opts.db_path, pool_size = opts.pool_size, "sqlite pool ready");
        Ok(Self { pool })
    }

    /// Run several `;`-separated statements in auto-commit mode, e.g. schema setup.
    ///
    /// # Errors
    /// Returns [`RdbmsError::Sqlite`] if any statement fails.
    pub async fn execute_batch(&self, sql: &str) -> Result<(), RdbmsError> {
        let conn = self.pool.get().await.map_err(checkout_error)?;
        let sql = sql.to_owned();
        run_blocking(Arc::clone(&*conn), move |guard| {
            guard.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    #[must_use]
    pub fn pool(&self) -> &Pool<SqliteManager> {
        &self.pool
    }
}

#[async_trait]
impl DatabaseHandle for SqliteDatabase {
    async fn execute(&self, sql: &str, args: &[RowValues]) -> Result<ExecResult, RdbmsError> {
        let conn = self.pool.get().await.map_err(checkout_error)?;
        let params = Params::convert(args);
        let sql = sql.to_owned();
        run_blocking(Arc::clone(&*conn), move |guard| execute_statement(guard, &sql, &params)).await
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, RdbmsError> {
        let conn = self.pool.get().await.map_err(checkout_error)?;
        let params = Params::convert(args);
        let sql = sql.to_owned();
        run_blocking(Arc::clone(&*conn), move |guard| select_statement(guard, &sql, &params)).await
    }

    async fn begin(&self, opts: &TxOptions) -> Result<Box<dyn DriverTransaction>, RdbmsError> {
        let conn = self.pool.get_owned().await.map_err(checkout_error)?;
        let tx = SqliteTx::begin(conn, opts).await?;
        Ok(Box::new(tx))
    }
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("state", &self.pool.state())
            .finish()
    }
}
