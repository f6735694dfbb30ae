//! Factory handing out one [`RdbmsClient`] per unit of work.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::RdbmsClient;
use crate::context::QueryContext;
use crate::driver::DatabaseHandle;
use crate::error::RdbmsError;
use crate::query::QueryManager;
use crate::types::InsertIdStrategy;

/// Settings shared by every client a [`ClientManager`] creates.
///
/// ```rust
/// use rdbms_client::prelude::*;
///
/// let cfg = ClientManagerConfig::from_json_str(
///     r#"{ "insert_id_strategy": "returning", "statement_timeout_ms": 2500 }"#,
/// )?;
/// assert_eq!(cfg.insert_id_strategy, InsertIdStrategy::Returning);
/// assert!(!cfg.log_statements);
/// # Ok::<(), RdbmsError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientManagerConfig {
    pub insert_id_strategy: InsertIdStrategy,
    /// Per-statement timeout for clients created without an explicit context.
    /// Each driver call gets the full timeout from when it starts.
    pub statement_timeout_ms: Option<u64>,
    /// Log every rendered statement at debug level.
    pub log_statements: bool,
}

impl ClientManagerConfig {
    /// # Errors
    /// Returns [`RdbmsError::ConfigError`] for malformed JSON or unknown keys.
    pub fn from_json_str(json: &str) -> Result<Self, RdbmsError> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_insert_id_strategy(mut self, strategy: InsertIdStrategy) -> Self {
        self.insert_id_strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }
}

/// Owns the shared database handle and query manager.
#[derive(Clone)]
pub struct ClientManager {
    handle: Arc<dyn DatabaseHandle>,
    query_manager: Arc<dyn QueryManager>,
    config: ClientManagerConfig,
}

impl ClientManager {
    #[must_use]
    pub fn new(
        handle: Arc<dyn DatabaseHandle>,
        query_manager: Arc<dyn QueryManager>,
        config: ClientManagerConfig,
    ) -> Self {
        Self {
            handle,
            query_manager,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientManagerConfig {
        &self.config
    }

    #[must_use]
    pub fn handle(&self) -> &Arc<dyn DatabaseHandle> {
        &self.handle
    }

    /// A fresh client. When a statement timeout is configured the client gets
    /// a context limiting each driver call to that timeout.
    #[must_use]
    pub fn client(&self) -> RdbmsClient {
        let client = self.base_client();
        match self.config.statement_timeout() {
            Some(timeout) => client.with_context(QueryContext::new().with_statement_timeout(timeout)),
            None => client,
        }
    }

    /// A fresh client bound to `ctx`; the configured timeout is not applied.
    #[must_use]
    pub fn client_from_context(&self, ctx: QueryContext) -> RdbmsClient {
        self.base_client().with_context(ctx)
    }

    fn base_client(&self) -> RdbmsClient {
        debug!(strategy = ?self.config.insert_id_strategy, "creating rdbms client");
        RdbmsClient::new(
            Arc::clone(&self.handle),
            Arc::clone(&self.query_manager),
            self.config.insert_id_strategy,
        )
        .with_statement_logging(self.config.log_statements)
    }
}

impl std::fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
