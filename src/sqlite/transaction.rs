use std::sync::Arc;

use async_trait::async_trait;
use bb8::PooledConnection;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::driver::{DriverTransaction, StatementExecutor};
use crate::error::RdbmsError;
use crate::results::{ExecResult, ResultSet};
use crate::types::{IsolationLevel, RowValues, TxOptions};

use super::config::{SharedSqliteConnection, SqliteManager};
use super::connection::run_blocking;
use super::params::Params;
use super::query::{execute_statement, select_statement};

/// Transaction that owns its pooled `SQLite` connection until commit or rollback.
///
/// Dropping it unfinished spawns a best-effort `ROLLBACK`; the connection
/// only returns to the pool once that has run.
pub struct SqliteTx {
    conn: Option<PooledConnection<'static, SqliteManager>>,
}

fn begin_sql(opts: &TxOptions) -> Result<&'static str, RdbmsError> {
    if opts.read_only {
        return Err(RdbmsError::Unimplemented(
            "read-only transactions are not supported by the sqlite driver".into(),
        ));
    }
    Ok(match opts.isolation {
        Some(IsolationLevel::Serializable) => "BEGIN IMMEDIATE",
        _ => "BEGIN DEFERRED",
    })
}

impl SqliteTx {
    pub(crate) async fn begin(
        conn: PooledConnection<'static, SqliteManager>,
        opts: &TxOptions,
    ) -> Result<Self, RdbmsError> {
        let sql = begin_sql(opts)?;
        run_blocking(Arc::clone(&*conn), move |guard| {
            guard.execute_batch(sql)?;
            Ok(())
        })
        .await?;
        debug!(sql, "sqlite transaction opened");
        Ok(Self { conn: Some(conn) })
    }

    fn handle(&self) -> Result<SharedSqliteConnection, RdbmsError> {
        self.conn
            .as_ref()
            .map(|conn| Arc::clone(&**conn))
            .ok_or_else(|| RdbmsError::ExecutionError("SQLite transaction already completed".into()))
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<(), RdbmsError> {
        let handle = self.handle()?;
        // Taken before running so Drop never issues a second statement.
        let conn = self.conn.take();
        let res = run_blocking(handle, move |guard| {
            guard.execute_batch(sql)?;
            Ok(())
        })
        .await;
        drop(conn);
        res
    }
}

#[async_trait]
impl StatementExecutor for SqliteTx {
    async fn execute(&mut self, sql: &str, args: &[RowValues]) -> Result<ExecResult, RdbmsError> {
        let params = Params::convert(args);
        let sql = sql.to_owned();
        run_blocking(self.handle()?, move |guard| execute_statement(guard, &sql, &params)).await
    }

    async fn query(&mut self, sql: &str, args: &[RowValues]) -> Result<ResultSet, RdbmsError> {
        let params = Params::convert(args);
        let sql = sql.to_owned();
        run_blocking(self.handle()?, move |guard| select_statement(guard, &sql, &params)).await
    }
}

#[async_trait]
impl DriverTransaction for SqliteTx {
    async fn commit(self: Box<Self>) -> Result<(), RdbmsError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), RdbmsError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        warn!("sqlite transaction dropped without commit or rollback; rolling back");
        let handle: SharedSqliteConnection = Arc::clone(&*conn);
        if let Ok(rt) = Handle::try_current() {
            rt.spawn(async move {
                let _ = run_blocking(handle, |guard| {
                    guard.execute_batch("ROLLBACK")?;
                    Ok(())
                })
                .await;
                drop(conn);
            });
        } else {
            let guard = handle.blocking_lock();
            let _ = guard.execute_batch("ROLLBACK");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_statement_follows_isolation() {
        assert_eq!(begin_sql(&TxOptions::default()).unwrap(), "BEGIN DEFERRED");
        assert_eq!(
            begin_sql(&TxOptions::default().with_isolation(IsolationLevel::Serializable)).unwrap(),
            "BEGIN IMMEDIATE"
        );
        assert!(matches!(
            begin_sql(&TxOptions::default().read_only(true)),
            Err(RdbmsError::Unimplemented(_))
        ));
    }
}
