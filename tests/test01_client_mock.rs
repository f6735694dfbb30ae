use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rdbms_client::prelude::*;

// ---- mock driver ----

#[derive(Default)]
struct DriverState {
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    force_error: bool,
    /// Fails the next statement with exactly this SQL.
    fail_sql: Option<String>,
    delay: Option<Duration>,
    executed: Vec<String>,
    commits: usize,
    rollbacks: usize,
}

type Shared = Arc<Mutex<DriverState>>;

impl DriverState {
    fn set_rows(&mut self, columns: &[&str], rows: Vec<Vec<RowValues>>) {
        self.columns = columns.iter().map(|c| (*c).to_string()).collect();
        self.rows = rows;
    }

    fn take_error(&mut self, sql: &str) -> Result<(), RdbmsError> {
        if self.fail_sql.as_deref() == Some(sql) {
            self.fail_sql = None;
            return Err(RdbmsError::ExecutionError(format!("forced failure of {sql}")));
        }
        if std::mem::take(&mut self.force_error) {
            return Err(RdbmsError::ExecutionError("forced driver failure".into()));
        }
        Ok(())
    }
}

async fn run_query(state: &Shared, origin: &str, sql: &str) -> Result<ResultSet, RdbmsError> {
    let delay = state.lock().unwrap().delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let mut st = state.lock().unwrap();
    st.executed.push(format!("{origin}:{sql}"));
    // Canned rows are consumed by the next query, even one that fails.
    let columns = std::mem::take(&mut st.columns);
    let rows = std::mem::take(&mut st.rows);
    st.take_error(sql)?;
    let mut rs = ResultSet::new(columns);
    for row in rows {
        rs.add_row_values(row);
    }
    Ok(rs)
}

async fn run_exec(state: &Shared, origin: &str, sql: &str) -> Result<ExecResult, RdbmsError> {
    let delay = state.lock().unwrap().delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    let mut st = state.lock().unwrap();
    st.executed.push(format!("{origin}:{sql}"));
    st.take_error(sql)?;
    Ok(ExecResult::new(1, Some(1)))
}

struct MockDb {
    state: Shared,
}

struct MockTx {
    state: Shared,
}

#[async_trait]
impl DatabaseHandle for MockDb {
    async fn execute(&self, sql: &str, _args: &[RowValues]) -> Result<ExecResult, RdbmsError> {
        run_exec(&self.state, "db", sql).await
    }

    async fn query(&self, sql: &str, _args: &[RowValues]) -> Result<ResultSet, RdbmsError> {
        run_query(&self.state, "db", sql).await
    }

    async fn begin(&self, _opts: &TxOptions) -> Result<Box<dyn DriverTransaction>, RdbmsError> {
        Ok(Box::new(MockTx {
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl StatementExecutor for MockTx {
    async fn execute(&mut self, sql: &str, _args: &[RowValues]) -> Result<ExecResult, RdbmsError> {
        run_exec(&self.state, "tx", sql).await
    }

    async fn query(&mut self, sql: &str, _args: &[RowValues]) -> Result<ResultSet, RdbmsError> {
        run_query(&self.state, "tx", sql).await
    }
}

#[async_trait]
impl DriverTransaction for MockTx {
    async fn commit(self: Box<Self>) -> Result<(), RdbmsError> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RdbmsError> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }
}

// ---- recording query manager: renders a query id as itself ----

#[derive(Default)]
struct RecordingQm {
    last_params: Mutex<Option<ParamMap>>,
    last_query: Mutex<Option<String>>,
}

impl RecordingQm {
    fn reset(&self) {
        *self.last_params.lock().unwrap() = None;
        *self.last_query.lock().unwrap() = None;
    }

    fn last_params(&self) -> ParamMap {
        self.last_params.lock().unwrap().clone().unwrap_or_default()
    }

    fn last_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }
}

impl QueryManager for RecordingQm {
    fn build_query_from_id(&self, id: &str, params: &ParamMap) -> Result<String, QueryManagerError> {
        *self.last_params.lock().unwrap() = Some(params.clone());
        if id == "ERROR" {
            return Err(QueryManagerError::Template {
                query_id: id.into(),
                message: "forced".into(),
            });
        }
        *self.last_query.lock().unwrap() = Some(id.to_owned());
        Ok(id.to_owned())
    }

    fn fragment_from_id(&self, id: &str) -> Result<String, QueryManagerError> {
        Ok(id.to_owned())
    }
}

// ---- fixtures ----

struct Fixture {
    state: Shared,
    qm: Arc<RecordingQm>,
    db: Arc<MockDb>,
}

impl Fixture {
    fn new() -> Self {
        let state = Shared::default();
        Self {
            db: Arc::new(MockDb {
                state: Arc::clone(&state),
            }),
            state,
            qm: Arc::new(RecordingQm::default()),
        }
    }

    fn client(&self, strategy: InsertIdStrategy) -> RdbmsClient {
        RdbmsClient::new(
            Arc::clone(&self.db) as Arc<dyn DatabaseHandle>,
            Arc::clone(&self.qm) as Arc<dyn QueryManager>,
            strategy,
        )
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DriverState> {
        self.state.lock().unwrap()
    }

    fn last_executed(&self) -> String {
        self.state().executed.last().cloned().unwrap_or_default()
    }
}

#[derive(Default)]
struct TestParam {
    s_param: String,
    ns_param: Option<String>,
    i_param: i32,
}

rdbms_client::impl_param_source!(TestParam {
    s_param => "SParam",
    ns_param => "NSParam",
    i_param => "IOV",
});

fn standard_params() -> (TestParam, HashMap<String, RowValues>) {
    let tp = TestParam {
        s_param: "S".into(),
        ns_param: Some("NS".into()),
        i_param: 44,
    };
    let mut pm = HashMap::new();
    pm.insert("NSParam".to_string(), RowValues::Text("NS1".into()));
    pm.insert("BParam".to_string(), RowValues::Bool(false));
    (tp, pm)
}

fn assert_merged(params: &ParamMap) {
    assert_eq!(params.len(), 4);
    assert_eq!(params["SParam"], RowValues::Text("S".into()));
    assert_eq!(params["NSParam"], RowValues::Text("NS1".into()));
    assert_eq!(params["IOV"], RowValues::Int(44));
    assert_eq!(params["BParam"], RowValues::Bool(false));
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TestTarget {
    str_result: String,
    int_result: i64,
    float_result: f64,
    time_result: Option<NaiveDateTime>,
}

rdbms_client::impl_bind_target!(TestTarget {
    str_result => "StrResult",
    int_result => "Int64Result",
    float_result => "Float64Result",
    time_result => "TimeResult",
});

/// The four client configurations: plain, transactional, with context, and both.
#[derive(Debug, Clone, Copy)]
enum Mode {
    Plain,
    Tx,
    Ctx,
    CtxTx,
}

impl Mode {
    const ALL: [Mode; 4] = [Mode::Plain, Mode::Tx, Mode::Ctx, Mode::CtxTx];

    fn origin(self) -> &'static str {
        match self {
            Mode::Plain | Mode::Ctx => "db",
            Mode::Tx | Mode::CtxTx => "tx",
        }
    }
}

impl Fixture {
    async fn client_in(&self, mode: Mode) -> RdbmsClient {
        let mut c = self.client(InsertIdStrategy::LastInsertId);
        if matches!(mode, Mode::Ctx | Mode::CtxTx) {
            c.set_context(QueryContext::new());
        }
        if matches!(mode, Mode::Tx | Mode::CtxTx) {
            c.start_transaction().await.unwrap();
        }
        c
    }

    async fn finish(&self, c: &mut RdbmsClient, mode: Mode) {
        match mode {
            Mode::Tx => c.commit_transaction().await.unwrap(),
            Mode::CtxTx => c.rollback().await.unwrap(),
            Mode::Plain | Mode::Ctx => assert!(!c.in_transaction()),
        }
    }
}

// ---- tests ----

#[tokio::test]
async fn passthroughs() {
    let fx = Fixture::new();
    for mode in Mode::ALL {
        let mut c = fx.client_in(mode).await;
        let c = &mut c;
        let origin = mode.origin();
        let rs = c.query("TEST", &[]).await.unwrap();
        assert!(rs.is_empty());
        assert_eq!(fx.last_executed(), format!("{origin}:TEST"));

        fx.state()
            .set_rows(&["Float64Result"], vec![vec![RowValues::Float(123.1)]]);
        let row = c.query_row("TEST", &[RowValues::Text("A".into())]).await.unwrap();
        let row = row.expect("one row");
        assert_eq!(row.get("Float64Result"), Some(&RowValues::Float(123.1)));

        let res = c.exec("TEST", &[]).await.unwrap();
        assert_eq!(res.rows_affected(), 1);
        fx.finish(c, mode).await;
    }

    let st = fx.state();
    assert_eq!(st.commits, 1);
    assert_eq!(st.rollbacks, 1);
}

#[tokio::test]
async fn temp_queries_bypass_the_query_manager() {
    let fx = Fixture::new();
    let mut c = fx.client(InsertIdStrategy::LastInsertId);
    c.register_temp_query("QT", "123");

    fx.qm.reset();
    c.delete_qid_params("QT", &[]).await.unwrap();
    assert_eq!(fx.qm.last_query(), None);
    assert_eq!(fx.last_executed(), "db:123");

    let q = c.build_query_from_qid_params("NQ", &[]).unwrap();
    assert_eq!(q, "NQ");

    assert_eq!(c.delete_temp_query("QT"), Some("123".to_string()));
    c.delete_qid_params("QT", &[]).await.unwrap();
    assert_eq!(fx.qm.last_query().as_deref(), Some("QT"));
}

#[tokio::test]
async fn find_or_create() {
    let fx = Fixture::new();
    let mut c = fx.client(InsertIdStrategy::LastInsertId);
    let (p1, p2) = standard_params();

    let id = c.existing_id_or_insert_params("CQ", "IQ", &[&p1, &p2]).await.unwrap();
    assert_merged(&fx.qm.last_params());
    assert_eq!(id, 1);
    assert_eq!(fx.last_executed(), "db:IQ");

    fx.state().set_rows(&["Int64Result"], vec![vec![RowValues::Int(8)]]);
    let id = c.existing_id_or_insert_params("CQ", "IQ", &[&p1, &p2]).await.unwrap();
    assert_eq!(id, 8);
    assert_eq!(fx.last_executed(), "db:CQ");
}

#[tokio::test]
async fn select_methods() {
    let fx = Fixture::new();
    for mode in Mode::ALL {
        let mut c = fx.client_in(mode).await;
        let c = &mut c;
        let origin = mode.origin();
        let (p1, p2) = standard_params();

        fx.state().set_rows(
            &["StrResult"],
            vec![vec![RowValues::Text("a".into())], vec![RowValues::Text("b".into())]],
        );
        let rs = c.select_qid("SQ").await.unwrap();
        assert_eq!(rs.len(), 2);
        assert_eq!(fx.last_executed(), format!("{origin}:SQ"));

        c.select_qid_param("SQP", "p1", "v1").await.unwrap();
        assert_eq!(fx.qm.last_params()["p1"], RowValues::Text("v1".into()));

        c.select_qid_params("SQPs", &[&p1, &p2]).await.unwrap();
        assert_merged(&fx.qm.last_params());

        fx.state().set_rows(
            &["StrResult", "Int64Result", "Unmapped"],
            vec![
                vec![RowValues::Text("x".into()), RowValues::Int(1), RowValues::Null],
                vec![RowValues::Text("y".into()), RowValues::Int(2), RowValues::Null],
            ],
        );
        let bound: Vec<TestTarget> = c.select_bind_qid("SBQ").await.unwrap();
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].str_result, "x");
        assert_eq!(bound[1].int_result, 2);

        let bound: Vec<TestTarget> = c.select_bind_qid_param("SBQP", "p1", 7).await.unwrap();
        assert!(bound.is_empty());

        fx.state().set_rows(&["Float64Result"], vec![vec![RowValues::Float(2.5)]]);
        let bound: Vec<TestTarget> = c.select_bind_qid_params("SBQPs", &[&p1, &p2]).await.unwrap();
        assert_eq!(bound[0].float_result, 2.5);
        assert_merged(&fx.qm.last_params());

        let mut target = TestTarget::default();
        assert!(!c.select_bind_single_qid("SBSQ", &mut target).await.unwrap());
        assert_eq!(target, TestTarget::default());

        fx.state().set_rows(&["StrResult"], vec![vec![RowValues::Text("only".into())]]);
        assert!(
            c.select_bind_single_qid_param("SBSQP", "p1", "v1", &mut target)
                .await
                .unwrap()
        );
        assert_eq!(target.str_result, "only");

        fx.state().set_rows(&["Int64Result"], vec![vec![RowValues::Int(9)]]);
        assert!(
            c.select_bind_single_qid_params("SBSQPs", &mut target, &[&p1, &p2])
                .await
                .unwrap()
        );
        assert_eq!(target.int_result, 9);
        assert_eq!(target.str_result, "only");

        let stamp = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_opt(7, 8, 9))
            .unwrap();
        fx.state()
            .set_rows(&["TimeResult"], vec![vec![RowValues::Timestamp(stamp)]]);
        let mut single = TestTarget::default();
        assert!(c.select_bind_single_qid("SBSQ", &mut single).await.unwrap());
        assert_eq!(single.time_result, Some(stamp));
        let bound = single.clone();
        assert!(!c.select_bind_single_qid("SBSQ", &mut single).await.unwrap());
        assert_eq!(single, bound);

        fx.state().force_error = true;
        assert!(c.select_qid("SQ").await.unwrap_err().is_driver());
        fx.state().force_error = true;
        assert!(c.select_qid_param("SQP", "p1", "v1").await.unwrap_err().is_driver());
        fx.state().force_error = true;
        assert!(c.select_qid_params("SQPs", &[&p1, &p2]).await.unwrap_err().is_driver());
        fx.finish(c, mode).await;
    }
}

#[tokio::test]
async fn failed_selects_bind_nothing() {
    let fx = Fixture::new();
    for mode in Mode::ALL {
        let mut c = fx.client_in(mode).await;
        let c = &mut c;
        let (p1, p2) = standard_params();
        let row = || vec![vec![RowValues::Text("lost".into()), RowValues::Int(3)]];
        let columns = ["StrResult", "Int64Result"];

        fx.state().set_rows(&columns, row());
        fx.state().force_error = true;
        let res: Result<Vec<TestTarget>, _> = c.select_bind_qid("SBQ").await;
        assert!(res.unwrap_err().is_driver());

        fx.state().set_rows(&columns, row());
        fx.state().force_error = true;
        let res: Result<Vec<TestTarget>, _> = c.select_bind_qid_param("SBQP", "p1", 7).await;
        assert!(res.unwrap_err().is_driver());

        fx.state().set_rows(&columns, row());
        fx.state().force_error = true;
        let res: Result<Vec<TestTarget>, _> = c.select_bind_qid_params("SBQPs", &[&p1, &p2]).await;
        assert!(res.unwrap_err().is_driver());

        let original = TestTarget {
            str_result: "kept".into(),
            int_result: 5,
            ..TestTarget::default()
        };
        let mut target = original.clone();

        fx.state().set_rows(&columns, row());
        fx.state().force_error = true;
        let err = c.select_bind_single_qid("SBSQ", &mut target).await.unwrap_err();
        assert!(err.is_driver());
        assert_eq!(target, original);

        fx.state().set_rows(&columns, row());
        fx.state().force_error = true;
        let err = c
            .select_bind_single_qid_param("SBSQP", "p1", "v1", &mut target)
            .await
            .unwrap_err();
        assert!(err.is_driver());
        assert_eq!(target, original);

        fx.state().set_rows(&columns, row());
        fx.state().force_error = true;
        let err = c
            .select_bind_single_qid_params("SBSQPs", &mut target, &[&p1, &p2])
            .await
            .unwrap_err();
        assert!(err.is_driver());
        assert_eq!(target, original);

        // The failed calls left no rows behind for the next one.
        assert!(!c.select_bind_single_qid("SBSQ", &mut target).await.unwrap());
        assert_eq!(target, original);
        fx.finish(c, mode).await;
    }
}

#[tokio::test]
async fn insert_methods() {
    let fx = Fixture::new();
    for mode in Mode::ALL {
        let mut c = fx.client_in(mode).await;
        let c = &mut c;
        let origin = mode.origin();
        let (p1, p2) = standard_params();

        let id = c.insert_capture_qid_params("ICQPs", &[&p1, &p2]).await.unwrap();
        assert_eq!(id, 1);
        assert_merged(&fx.qm.last_params());
        assert_eq!(fx.last_executed(), format!("{origin}:ICQPs"));

        let res = c.insert_qid_params("IQPs", &[&p1, &p2]).await.unwrap();
        assert_eq!(res.rows_affected(), 1);

        c.insert_qid_params("IQPs", &[]).await.unwrap();
        assert!(fx.qm.last_params().is_empty());

        fx.state().force_error = true;
        assert!(c.insert_qid_params("IQPs", &[&p1, &p2]).await.unwrap_err().is_driver());
        fx.state().force_error = true;
        assert!(c.insert_capture_qid_params("ICQPs", &[&p1, &p2]).await.unwrap_err().is_driver());
        fx.finish(c, mode).await;
    }
}

#[tokio::test]
async fn failed_inserts_capture_no_id() {
    let fx = Fixture::new();
    for strategy in [InsertIdStrategy::LastInsertId, InsertIdStrategy::Returning] {
        for in_tx in [false, true] {
            let mut c = fx.client(strategy);
            if in_tx {
                c.start_transaction().await.unwrap();
            }
            let (p1, p2) = standard_params();

            fx.state().set_rows(&["id"], vec![vec![RowValues::Int(42)]]);
            fx.state().force_error = true;
            let err = c.insert_capture_qid_params("ICQPs", &[&p1, &p2]).await.unwrap_err();
            assert!(err.is_driver(), "{strategy:?}: {err:?}");
            assert_merged(&fx.qm.last_params());

            // Check step fails.
            fx.state().force_error = true;
            let err = c
                .existing_id_or_insert_params("CQ", "IQ", &[&p1, &p2])
                .await
                .unwrap_err();
            assert!(err.is_driver());
            assert!(fx.last_executed().ends_with(":CQ"));

            // Check step finds nothing, insert step fails.
            fx.state().fail_sql = Some("IQ".into());
            let executed = fx.state().executed.len();
            let err = c
                .existing_id_or_insert_params("CQ", "IQ", &[&p1, &p2])
                .await
                .unwrap_err();
            assert!(err.is_driver());
            let st = fx.state();
            assert_eq!(st.executed.len(), executed + 2);
            assert!(st.executed[executed].ends_with(":CQ"));
            assert!(st.executed[executed + 1].ends_with(":IQ"));
            drop(st);

            if in_tx {
                c.rollback().await.unwrap();
            }
        }
    }
}

#[tokio::test]
async fn update_and_delete_methods() {
    let fx = Fixture::new();
    for mode in Mode::ALL {
        let mut c = fx.client_in(mode).await;
        let c = &mut c;
        let origin = mode.origin();
        let (p1, p2) = standard_params();

        let res = c.delete_qid_param("DQP", "p1", "v1").await.unwrap();
        assert_eq!(res.rows_affected(), 1);

        fx.state().force_error = true;
        let err = c.delete_qid_param("DQP", "p1", "v1").await.unwrap_err();
        assert!(err.is_driver());

        let res = c.delete_qid_params("DQPs", &[&p1, &p2]).await.unwrap();
        assert_eq!(res.rows_affected(), 1);
        assert_merged(&fx.qm.last_params());

        let res = c.update_qid_param("UQP", "p1", "v1").await.unwrap();
        assert_eq!(res.rows_affected(), 1);

        fx.state().force_error = true;
        assert!(c.update_qid_params("UQPs", &[&p1, &p2]).await.is_err());

        let res = c.update_qid_params("UQPs", &[&p1, &p2]).await.unwrap();
        assert_eq!(res.rows_affected(), 1);
        assert_eq!(fx.last_executed(), format!("{origin}:UQPs"));
        fx.finish(c, mode).await;
    }
}

#[tokio::test]
async fn transaction_behaviour() {
    let fx = Fixture::new();

    let mut c = fx.client(InsertIdStrategy::LastInsertId);
    assert!(matches!(
        c.commit_transaction().await,
        Err(RdbmsError::NoActiveTransaction)
    ));
    assert!(matches!(c.rollback().await, Err(RdbmsError::NoActiveTransaction)));

    c.start_transaction().await.unwrap();
    c.commit_transaction().await.unwrap();
    c.start_transaction().await.unwrap();
    let err = c.start_transaction().await.unwrap_err();
    assert!(err.is_transaction_state());
    assert!(c.in_transaction());

    let mut c = fx.client(InsertIdStrategy::LastInsertId);
    c.start_transaction_with_options(TxOptions::default()).await.unwrap();
    c.commit_transaction().await.unwrap();
    c.start_transaction_with_options(TxOptions::default().with_isolation(IsolationLevel::Serializable))
        .await
        .unwrap();
    assert!(c.start_transaction().await.is_err());
    assert!(c.start_transaction_with_options(TxOptions::default()).await.is_err());
    c.rollback().await.unwrap();
    assert!(!c.in_transaction());

    let mut c = fx.client(InsertIdStrategy::LastInsertId).with_context(QueryContext::new());
    assert!(c.commit_transaction().await.is_err());
    c.start_transaction().await.unwrap();
    c.commit_transaction().await.unwrap();
    c.start_transaction_with_options(TxOptions::default()).await.unwrap();
    assert!(c.start_transaction().await.is_err());

    let st = fx.state();
    assert_eq!(st.commits, 3);
    assert_eq!(st.rollbacks, 1);
}

#[tokio::test]
async fn fragments_and_query_building() {
    let fx = Fixture::new();
    let c = fx.client(InsertIdStrategy::LastInsertId);

    assert_eq!(c.find_fragment("AAA").unwrap(), "AAA");

    let (p1, p2) = standard_params();
    let q = c.build_query_from_qid_params("OK", &[&p1, &p2]).unwrap();
    assert_merged(&fx.qm.last_params());
    assert_eq!(q, "OK");

    let err = c.build_query_from_qid_params("ERROR", &[&p1, &p2]).unwrap_err();
    assert!(err.is_resolution());
}

#[tokio::test]
async fn resolution_errors_reach_no_driver() {
    let fx = Fixture::new();
    let mut c = fx.client(InsertIdStrategy::LastInsertId);

    assert!(c.select_qid("ERROR").await.unwrap_err().is_resolution());
    assert!(c.delete_qid_param("ERROR", "a", 1).await.unwrap_err().is_resolution());
    assert!(fx.state().executed.is_empty());
}

#[tokio::test]
async fn illegal_result_contents() {
    let fx = Fixture::new();
    let mut c = fx.client(InsertIdStrategy::LastInsertId);

    fx.state()
        .set_rows(&["TimeResult"], vec![vec![RowValues::Text("AA".into())]]);
    let mut target = TestTarget::default();
    let err = c.select_bind_single_qid("SBSQ", &mut target).await.unwrap_err();
    match err {
        RdbmsError::Binding { column, expected, found } => {
            assert_eq!(column, "TimeResult");
            assert_eq!(expected, "timestamp");
            assert_eq!(found, "text");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(target, TestTarget::default());

    fx.state().set_rows(
        &["StrResult"],
        vec![vec![RowValues::Text("a".into())], vec![RowValues::Text("b".into())]],
    );
    let err = c.select_bind_single_qid("SBSQ", &mut target).await.unwrap_err();
    assert!(matches!(err, RdbmsError::MultipleRows { ref query_id } if query_id == "SBSQ"));
    assert_eq!(target, TestTarget::default());
}

#[tokio::test]
async fn returning_strategy_reads_the_id_column() {
    let fx = Fixture::new();
    let mut c = fx.client(InsertIdStrategy::Returning);

    fx.state().set_rows(&["id"], vec![vec![RowValues::Int(42)]]);
    let id = c.insert_capture_qid_params("ICQ", &[&("name", "ann")]).await.unwrap();
    assert_eq!(id, 42);
    assert_eq!(fx.last_executed(), "db:ICQ");

    let err = c.insert_capture_qid_params("ICQ", &[]).await.unwrap_err();
    assert!(matches!(err, RdbmsError::NoInsertId));

    fx.state().set_rows(&["id"], vec![vec![RowValues::Text("x".into())]]);
    let err = c.insert_capture_qid_params("ICQ", &[]).await.unwrap_err();
    assert!(err.is_binding());
}

#[tokio::test]
async fn cancelled_context_keeps_the_transaction() {
    let fx = Fixture::new();
    let ctx = QueryContext::new();
    let mut c = fx.client(InsertIdStrategy::LastInsertId).with_context(ctx.clone());

    c.start_transaction().await.unwrap();
    ctx.cancel();

    let err = c.select_qid("SQ").await.unwrap_err();
    assert!(matches!(err, RdbmsError::Cancelled));
    assert!(c.in_transaction());
    assert!(fx.state().executed.is_empty());

    c.clear_context();
    c.rollback().await.unwrap();
    assert!(!c.in_transaction());
    assert_eq!(fx.state().rollbacks, 1);
}

#[tokio::test(start_paused = true)]
async fn deadline_interrupts_slow_statements() {
    let fx = Fixture::new();
    fx.state().delay = Some(Duration::from_secs(10));

    let manager = ClientManager::new(
        Arc::clone(&fx.db) as Arc<dyn DatabaseHandle>,
        Arc::clone(&fx.qm) as Arc<dyn QueryManager>,
        ClientManagerConfig::default().with_statement_timeout(Duration::from_secs(1)),
    );
    let mut c = manager.client();
    let ctx = c.context().unwrap();
    assert_eq!(ctx.statement_timeout(), Some(Duration::from_secs(1)));
    assert!(ctx.deadline().is_none());

    let err = c.update_qid_param("UQP", "p1", 1).await.unwrap_err();
    assert!(matches!(err, RdbmsError::DeadlineExceeded));

    // The timeout restarts for every statement, however old the client is.
    tokio::time::advance(Duration::from_secs(30)).await;
    fx.state().delay = Some(Duration::from_millis(500));
    let res = c.update_qid_param("UQP", "p1", 1).await.unwrap();
    assert_eq!(res.rows_affected(), 1);

    fx.state().delay = Some(Duration::from_secs(10));
    let err = c.update_qid_param("UQP", "p1", 1).await.unwrap_err();
    assert!(matches!(err, RdbmsError::DeadlineExceeded));

    let mut c = manager.client_from_context(QueryContext::new());
    assert!(c.context().and_then(QueryContext::deadline).is_none());
    let res = c.update_qid_param("UQP", "p1", 1).await.unwrap();
    assert_eq!(res.rows_affected(), 1);
}
