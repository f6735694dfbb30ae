//! Named-query client for relational databases.
//!
//! Statements are addressed by query id and rendered by a [`QueryManager`]
//! from merged parameter sources. An [`RdbmsClient`] routes each statement
//! through its open transaction (or straight to the shared
//! [`DatabaseHandle`]) and binds result rows onto caller types.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rdbms_client::prelude::*;
//!
//! #[derive(Debug, Clone, Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! rdbms_client::impl_bind_target!(User { id, name });
//!
//! # async fn demo() -> Result<(), RdbmsError> {
//! let db = SqliteDatabase::open(SqliteOptions::new("app.db")).await?;
//! let qm = TemplateQueryManager::new()
//!     .with_query("USERS_BY_NAME", "SELECT id, name FROM users WHERE name = ${name}");
//!
//! let manager = ClientManager::new(Arc::new(db), Arc::new(qm), ClientManagerConfig::default());
//! let mut client = manager.client();
//! let users: Vec<User> = client.select_bind_qid_param("USERS_BY_NAME", "name", "ann").await?;
//! # let _ = users;
//! # Ok(())
//! # }
//! ```

pub mod binder;
pub mod client;
pub mod context;
pub mod driver;
pub mod error;
pub mod manager;
pub mod params;
pub mod prelude;
pub mod query;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod transaction;
pub mod types;

pub use client::RdbmsClient;
pub use context::QueryContext;
pub use driver::{DatabaseHandle, DriverTransaction, StatementExecutor};
pub use error::{QueryManagerError, RdbmsError};
pub use manager::{ClientManager, ClientManagerConfig};
pub use query::{QueryManager, QueryResolver, TemplateQueryManager};
pub use results::{CustomDbRow, ExecResult, ResultSet};
pub use types::{InsertIdStrategy, IsolationLevel, ParamMap, RowValues, TxOptions};
