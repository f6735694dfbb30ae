//! Cooperative cancellation and deadlines for driver calls.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RdbmsError;

/// Cancellation token, optional deadline and optional per-statement timeout
/// applied to every driver call a client makes while the context is set.
///
/// Clones share the same token, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    token: CancellationToken,
    deadline: Option<Instant>,
    statement_timeout: Option<Duration>,
}

impl QueryContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A context driven by an existing token, e.g. a child of a request-wide token.
    #[must_use]
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
            statement_timeout: None,
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Limit each driver call to `timeout`, measured from when the call starts.
    ///
    /// Combines with any absolute deadline; whichever is earlier fires.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    fn call_deadline(&self) -> Option<Instant> {
        let per_call = self.statement_timeout.map(|t| Instant::now() + t);
        match (self.deadline, per_call) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Drive `fut` until it completes, the token is cancelled, or the call's
    /// deadline passes.
    ///
    /// An abandoned future is dropped, not awaited.
    ///
    /// # Errors
    /// [`RdbmsError::Cancelled`] or [`RdbmsError::DeadlineExceeded`] when the
    /// context fires first; otherwise whatever `fut` returns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, RdbmsError>
    where
        F: Future<Output = Result<T, RdbmsError>>,
    {
        if self.token.is_cancelled() {
            return Err(RdbmsError::Cancelled);
        }
        match self.call_deadline() {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(RdbmsError::Cancelled),
                    () = tokio::time::sleep_until(deadline) => Err(RdbmsError::DeadlineExceeded),
                    res = fut => res,
                }
            }
            None => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(RdbmsError::Cancelled),
                    res = fut => res,
                }
            }
        }
    }
}

/// Run `fut` under `ctx` when one is set, otherwise to completion.
pub(crate) async fn run_in<F, T>(ctx: Option<&QueryContext>, fut: F) -> Result<T, RdbmsError>
where
    F: Future<Output = Result<T, RdbmsError>>,
{
    match ctx {
        Some(ctx) => ctx.run(fut).await,
        None => fut.await,
    }
}
