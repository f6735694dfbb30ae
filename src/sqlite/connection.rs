use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bb8::RunError;
use rusqlite::InterruptHandle;
use tokio::task::spawn_blocking;

use crate::error::RdbmsError;

use super::config::SharedSqliteConnection;

/// Interrupts the connection's running statement if the awaiting future is dropped.
///
/// `abandoned` also stops work that has not reached the connection yet, since
/// an interrupt only reaches statements already running.
struct InterruptOnDrop {
    handle: Option<InterruptHandle>,
    abandoned: Arc<AtomicBool>,
}

impl InterruptOnDrop {
    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.abandoned.store(true, Ordering::SeqCst);
            tracing::debug!("sqlite statement abandoned; interrupting connection");
            handle.interrupt();
        }
    }
}

/// Run synchronous rusqlite work against a shared connection on the blocking pool.
///
/// Dropping the returned future before it completes interrupts the statement,
/// so abandoned writes are rolled back rather than applied.
pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, RdbmsError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, RdbmsError> + Send + 'static,
    R: Send + 'static,
{
    let interrupt = conn.lock().await.get_interrupt_handle();
    let abandoned = Arc::new(AtomicBool::new(false));
    let guard = InterruptOnDrop {
        handle: Some(interrupt),
        abandoned: Arc::clone(&abandoned),
    };

    let joined = spawn_blocking(move || {
        let mut conn = conn.blocking_lock();
        if abandoned.load(Ordering::SeqCst) {
            return Err(RdbmsError::Cancelled);
        }
        func(&mut conn)
    })
    .await;
    guard.disarm();

    joined.map_err(|e| RdbmsError::ExecutionError(format!("sqlite spawn_blocking join error: {e}")))?
}

pub(crate) fn checkout_error(err: RunError<RdbmsError>) -> RdbmsError {
    match err {
        RunError::User(e) => e,
        RunError::TimedOut => {
            RdbmsError::ConnectionError("sqlite checkout error: timed out waiting for a connection".into())
        }
    }
}
