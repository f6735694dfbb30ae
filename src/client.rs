//! The per-unit-of-work client facade.
//!
//! Every id-based method reduces to the same pipeline: merge parameters,
//! resolve the query id, run the statement through the current transaction
//! state, and (for the bind variants) bind the rows.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::binder::{self, BindTarget, FromColumnValue};
use crate::context::QueryContext;
use crate::driver::DatabaseHandle;
use crate::error::RdbmsError;
use crate::params::{ParamSource, ToParamValue, merge_params};
use crate::query::{QueryManager, QueryResolver};
use crate::results::{CustomDbRow, ExecResult, ResultSet};
use crate::transaction::TransactionState;
use crate::types::{InsertIdStrategy, ParamMap, RowValues, TxOptions};

/// Client for one logical unit of work (a request, a job, a task).
///
/// The client owns its transaction state, its context and its temporary
/// queries; the database handle and query manager are shared. All methods take
/// `&mut self`, so a client is driven by one task at a time.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use rdbms_client::prelude::*;
///
/// # async fn demo(db: Arc<dyn DatabaseHandle>) -> Result<(), RdbmsError> {
/// let qm = TemplateQueryManager::new()
///     .with_query("INSERT_USER", "INSERT INTO users (name) VALUES (${name})");
/// let mut client = RdbmsClient::new(db, Arc::new(qm), InsertIdStrategy::LastInsertId);
///
/// client.start_transaction().await?;
/// let id = client
///     .insert_capture_qid_params("INSERT_USER", &[&("name", "ann")])
///     .await?;
/// client.commit_transaction().await?;
/// # let _ = id;
/// # Ok(()) }
/// ```
pub struct RdbmsClient {
    handle: Arc<dyn DatabaseHandle>,
    transaction: TransactionState,
    context: Option<QueryContext>,
    resolver: QueryResolver,
    insert_strategy: InsertIdStrategy,
    log_statements: bool,
}

impl RdbmsClient {
    #[must_use]
    pub fn new(
        handle: Arc<dyn DatabaseHandle>,
        query_manager: Arc<dyn QueryManager>,
        insert_strategy: InsertIdStrategy,
    ) -> Self {
        Self {
            handle,
            transaction: TransactionState::NoTransaction,
            context: None,
            resolver: QueryResolver::new(query_manager),
            insert_strategy,
            log_statements: false,
        }
    }

    /// Bind every subsequent driver call to `ctx`.
    #[must_use]
    pub fn with_context(mut self, ctx: QueryContext) -> Self {
        self.context = Some(ctx);
        self
    }

    /// Emit each rendered statement at debug level.
    #[must_use]
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    pub fn set_context(&mut self, ctx: QueryContext) {
        self.context = Some(ctx);
    }

    pub fn clear_context(&mut self) -> Option<QueryContext> {
        self.context.take()
    }

    #[must_use]
    pub fn context(&self) -> Option<&QueryContext> {
        self.context.as_ref()
    }

    #[must_use]
    pub fn insert_strategy(&self) -> InsertIdStrategy {
        self.insert_strategy
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_active()
    }

    // ---- transactions ----

    /// Start a transaction with driver defaults.
    ///
    /// # Errors
    /// [`RdbmsError::TransactionAlreadyActive`] if one is open, or a driver error.
    pub async fn start_transaction(&mut self) -> Result<(), RdbmsError> {
        self.start_transaction_with_options(TxOptions::default()).await
    }

    /// Start a transaction with explicit isolation/read-only options.
    ///
    /// # Errors
    /// [`RdbmsError::TransactionAlreadyActive`] if one is open, or a driver error.
    pub async fn start_transaction_with_options(
        &mut self,
        opts: TxOptions,
    ) -> Result<(), RdbmsError> {
        self.transaction
            .start(self.handle.as_ref(), &opts, self.context.as_ref())
            .await
    }

    /// # Errors
    /// [`RdbmsError::NoActiveTransaction`] if none is open, or the commit error.
    pub async fn commit_transaction(&mut self) -> Result<(), RdbmsError> {
        self.transaction.commit(self.context.as_ref()).await
    }

    /// # Errors
    /// [`RdbmsError::NoActiveTransaction`] if none is open, or the rollback error.
    pub async fn rollback(&mut self) -> Result<(), RdbmsError> {
        self.transaction.rollback(self.context.as_ref()).await
    }

    // ---- passthroughs on literal SQL ----

    /// Execute literal SQL with positional arguments.
    ///
    /// # Errors
    /// Driver errors, or the context firing.
    pub async fn exec(&mut self, sql: &str, args: &[RowValues]) -> Result<ExecResult, RdbmsError> {
        self.transaction
            .execute(&self.handle, sql, args, self.context.as_ref())
            .await
    }

    /// Run a literal query with positional arguments.
    ///
    /// # Errors
    /// Driver errors, or the context firing.
    pub async fn query(&mut self, sql: &str, args: &[RowValues]) -> Result<ResultSet, RdbmsError> {
        self.transaction
            .query(&self.handle, sql, args, self.context.as_ref())
            .await
    }

    /// Run a literal query and keep only its first row.
    ///
    /// # Errors
    /// Driver errors, or the context firing.
    pub async fn query_row(
        &mut self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<Option<CustomDbRow>, RdbmsError> {
        Ok(self.query(sql, args).await?.into_first())
    }

    // ---- resolution ----

    /// Merge `sources` and render query `qid`.
    ///
    /// # Errors
    /// The query manager's error.
    pub fn build_query_from_qid_params(
        &self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<String, RdbmsError> {
        self.render(qid, &merge_params(sources))
    }

    /// Look up an unrendered fragment.
    ///
    /// # Errors
    /// The query manager's error.
    pub fn find_fragment(&self, qid: &str) -> Result<String, RdbmsError> {
        Ok(self.resolver.resolve_fragment(qid)?)
    }

    /// Register literal SQL under `qid` for this client only.
    pub fn register_temp_query(&mut self, qid: impl Into<String>, sql: impl Into<String>) {
        self.resolver.register_temp(qid, sql);
    }

    pub fn delete_temp_query(&mut self, qid: &str) -> Option<String> {
        self.resolver.delete_temp(qid)
    }

    // ---- select: raw rows ----

    /// # Errors
    /// Resolution or driver errors.
    pub async fn select_qid(&mut self, qid: &str) -> Result<ResultSet, RdbmsError> {
        self.select_rendered(qid, &ParamMap::new()).await
    }

    /// # Errors
    /// Resolution or driver errors.
    pub async fn select_qid_param(
        &mut self,
        qid: &str,
        name: &str,
        value: impl ToParamValue,
    ) -> Result<ResultSet, RdbmsError> {
        self.select_rendered(qid, &single_param(name, &value)).await
    }

    /// # Errors
    /// Resolution or driver errors.
    pub async fn select_qid_params(
        &mut self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<ResultSet, RdbmsError> {
        self.select_rendered(qid, &merge_params(sources)).await
    }

    // ---- select: bind every row ----

    /// Bind every returned row into a fresh `T`. No rows is an empty vector.
    ///
    /// # Errors
    /// Resolution, driver or binding errors; nothing is returned on error.
    pub async fn select_bind_qid<T: BindTarget + Default>(
        &mut self,
        qid: &str,
    ) -> Result<Vec<T>, RdbmsError> {
        let rs = self.select_rendered(qid, &ParamMap::new()).await?;
        binder::bind_all(&rs)
    }

    /// # Errors
    /// Resolution, driver or binding errors.
    pub async fn select_bind_qid_param<T: BindTarget + Default>(
        &mut self,
        qid: &str,
        name: &str,
        value: impl ToParamValue,
    ) -> Result<Vec<T>, RdbmsError> {
        let rs = self.select_rendered(qid, &single_param(name, &value)).await?;
        binder::bind_all(&rs)
    }

    /// # Errors
    /// Resolution, driver or binding errors.
    pub async fn select_bind_qid_params<T: BindTarget + Default>(
        &mut self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<Vec<T>, RdbmsError> {
        let rs = self.select_rendered(qid, &merge_params(sources)).await?;
        binder::bind_all(&rs)
    }

    // ---- select: bind a single row ----

    /// Bind the single returned row into `target`; `Ok(false)` when there is none.
    ///
    /// # Errors
    /// Resolution, driver or binding errors, or more than one row.
    pub async fn select_bind_single_qid<T: BindTarget + Clone>(
        &mut self,
        qid: &str,
        target: &mut T,
    ) -> Result<bool, RdbmsError> {
        let rs = self.select_rendered(qid, &ParamMap::new()).await?;
        binder::bind_single(qid, &rs, target)
    }

    /// # Errors
    /// Resolution, driver or binding errors, or more than one row.
    pub async fn select_bind_single_qid_param<T: BindTarget + Clone>(
        &mut self,
        qid: &str,
        name: &str,
        value: impl ToParamValue,
        target: &mut T,
    ) -> Result<bool, RdbmsError> {
        let rs = self.select_rendered(qid, &single_param(name, &value)).await?;
        binder::bind_single(qid, &rs, target)
    }

    /// # Errors
    /// Resolution, driver or binding errors, or more than one row.
    pub async fn select_bind_single_qid_params<T: BindTarget + Clone>(
        &mut self,
        qid: &str,
        target: &mut T,
        sources: &[&dyn ParamSource],
    ) -> Result<bool, RdbmsError> {
        let rs = self.select_rendered(qid, &merge_params(sources)).await?;
        binder::bind_single(qid, &rs, target)
    }

    // ---- insert ----

    /// # Errors
    /// Resolution or driver errors.
    pub async fn insert_qid_params(
        &mut self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<ExecResult, RdbmsError> {
        self.exec_rendered(qid, &merge_params(sources)).await
    }

    /// Insert and return the generated id using the configured [`InsertIdStrategy`].
    ///
    /// # Errors
    /// Resolution or driver errors, or [`RdbmsError::NoInsertId`].
    pub async fn insert_capture_qid_params(
        &mut self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<i64, RdbmsError> {
        self.insert_capture(qid, &merge_params(sources)).await
    }

    /// Return the id found by `check_qid`, or insert with `insert_qid` and return the new id.
    ///
    /// Both queries are rendered from the same merged parameters.
    ///
    /// # Errors
    /// Resolution, driver or binding errors from either step.
    pub async fn existing_id_or_insert_params(
        &mut self,
        check_qid: &str,
        insert_qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<i64, RdbmsError> {
        let params = merge_params(sources);
        let rs = self.select_rendered(check_qid, &params).await?;
        if let Some(id) = single_id(check_qid, &rs)? {
            debug!(query_id = check_qid, id, "existing row found");
            return Ok(id);
        }
        self.insert_capture(insert_qid, &params).await
    }

    // ---- update / delete ----

    /// # Errors
    /// Resolution or driver errors.
    pub async fn update_qid_param(
        &mut self,
        qid: &str,
        name: &str,
        value: impl ToParamValue,
    ) -> Result<ExecResult, RdbmsError> {
        self.exec_rendered(qid, &single_param(name, &value)).await
    }

    /// # Errors
    /// Resolution or driver errors.
    pub async fn update_qid_params(
        &mut self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<ExecResult, RdbmsError> {
        self.exec_rendered(qid, &merge_params(sources)).await
    }

    /// # Errors
    /// Resolution or driver errors.
    pub async fn delete_qid_param(
        &mut self,
        qid: &str,
        name: &str,
        value: impl ToParamValue,
    ) -> Result<ExecResult, RdbmsError> {
        self.exec_rendered(qid, &single_param(name, &value)).await
    }

    /// # Errors
    /// Resolution or driver errors.
    pub async fn delete_qid_params(
        &mut self,
        qid: &str,
        sources: &[&dyn ParamSource],
    ) -> Result<ExecResult, RdbmsError> {
        self.exec_rendered(qid, &merge_params(sources)).await
    }

    // ---- internals ----

    fn render(&self, qid: &str, params: &ParamMap) -> Result<String, RdbmsError> {
        let sql = self.resolver.resolve(qid, params)?;
        if self.log_statements {
            debug!(query_id = qid, %sql, "resolved statement");
        } else {
            trace!(query_id = qid, params = params.len(), "resolved statement");
        }
        Ok(sql)
    }

    async fn select_rendered(
        &mut self,
        qid: &str,
        params: &ParamMap,
    ) -> Result<ResultSet, RdbmsError> {
        let sql = self.render(qid, params)?;
        self.query(&sql, &[]).await
    }

    async fn exec_rendered(
        &mut self,
        qid: &str,
        params: &ParamMap,
    ) -> Result<ExecResult, RdbmsError> {
        let sql = self.render(qid, params)?;
        self.exec(&sql, &[]).await
    }

    async fn insert_capture(&mut self, qid: &str, params: &ParamMap) -> Result<i64, RdbmsError> {
        let sql = self.render(qid, params)?;
        let id = match self.insert_strategy {
            InsertIdStrategy::LastInsertId => self.exec(&sql, &[]).await?.last_insert_id()?,
            InsertIdStrategy::Returning => {
                let rs = self.query(&sql, &[]).await?;
                single_id(qid, &rs)?.ok_or(RdbmsError::NoInsertId)?
            }
        };
        debug!(query_id = qid, id, "inserted row");
        Ok(id)
    }
}

impl std::fmt::Debug for RdbmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RdbmsClient")
            .field("transaction", &self.transaction)
            .field("context", &self.context)
            .field("resolver", &self.resolver)
            .field("insert_strategy", &self.insert_strategy)
            .finish_non_exhaustive()
    }
}

fn single_param(name: &str, value: &dyn ToParamValue) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert(name.to_owned(), value.to_param_value());
    params
}

/// The integer in the first column of the only row, if there is a row.
fn single_id(qid: &str, rs: &ResultSet) -> Result<Option<i64>, RdbmsError> {
    let row = match rs.results.as_slice() {
        [] => return Ok(None),
        [row] => row,
        _ => {
            return Err(RdbmsError::MultipleRows {
                query_id: qid.to_owned(),
            });
        }
    };
    let (column, value) = row.columns().next().ok_or_else(|| {
        RdbmsError::ExecutionError(format!("query '{qid}' returned a row with no columns"))
    })?;
    match i64::coerce(value) {
        binder::Coercion::Value(id) => Ok(Some(id)),
        binder::Coercion::Mismatch => Err(RdbmsError::Binding {
            column: column.to_owned(),
            expected: <i64 as FromColumnValue>::EXPECTED,
            found: value.kind_name(),
        }),
    }
}
