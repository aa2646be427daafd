//! Scriptable in-memory implementation of the asyncfb client façade.
//!
//! There is no sql engine here: result sets are registered up front,
//! keyed by the exact sql text, and the client replays them when the
//! statement is executed. Enough behaviour is modelled (attachments,
//! transaction liveness, cursors, parameter echo) to drive the whole
//! asynchronous engine in tests without a server.
//!
//! ```rust
//! use asyncfb_core::*;
//! use asyncfb_mock::MockDbClient;
//!
//! let mock = MockDbClient::new();
//! mock.on_query(
//!     "SELECT id FROM t",
//!     vec![ColumnMeta::new("ID", SqlType::Int)],
//!     vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
//! );
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use asyncfb_core::*;

/// How a registered statement produces its rows
#[derive(Clone)]
enum Source {
    /// A fixed result set
    Rows(Arc<Vec<Vec<SqlValue>>>),
    /// Rows produced on demand, for large cursors
    Generated {
        count: usize,
        gen: Arc<dyn Fn(usize) -> Vec<SqlValue> + Send + Sync>,
    },
    /// A single row echoing back the bound parameters
    Echo,
    /// Rows computed from the bound parameters, for parameterised
    /// lookups
    Lookup(Arc<dyn Fn(&[SqlValue]) -> Vec<Vec<SqlValue>> + Send + Sync>),
    /// No result set, just an affected-rows count
    Affected(usize),
}

#[derive(Clone)]
struct Script {
    columns: Arc<Vec<ColumnMeta>>,
    source: Source,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<String, Script>,
    /// Every executed statement with the parameters it ran with
    journal: Vec<(String, Vec<SqlValue>)>,
    users: Vec<String>,
    fail_connect: Option<String>,
    reject_param_type: Option<SqlType>,
    attach_latency: Option<Duration>,
    plan: String,
    dropped: bool,
}

/// The scriptable client. Cloning shares the script catalog and the
/// execution journal, so a test can keep a handle for assertions after
/// moving another one into the engine.
#[derive(Clone)]
pub struct MockDbClient {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDbClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDbClient {
    pub fn new() -> Self {
        let state = MockState {
            plan: "PLAN (MOCK NATURAL)".to_string(),
            ..Default::default()
        };

        MockDbClient {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Register a fixed result set for the sql text
    pub fn on_query<S: Into<String>>(
        &self,
        sql: S,
        columns: Vec<ColumnMeta>,
        rows: Vec<Vec<SqlValue>>,
    ) {
        self.insert(
            sql,
            Script {
                columns: Arc::new(columns),
                source: Source::Rows(Arc::new(rows)),
            },
        );
    }

    /// Register a generated result set of `count` rows. The generator
    /// receives the 0-indexed row number.
    pub fn on_query_gen<S, G>(&self, sql: S, columns: Vec<ColumnMeta>, count: usize, gen: G)
    where
        S: Into<String>,
        G: Fn(usize) -> Vec<SqlValue> + Send + Sync + 'static,
    {
        self.insert(
            sql,
            Script {
                columns: Arc::new(columns),
                source: Source::Generated {
                    count,
                    gen: Arc::new(gen),
                },
            },
        );
    }

    /// Register a statement without a result set
    pub fn on_execute<S: Into<String>>(&self, sql: S, affected: usize) {
        self.insert(
            sql,
            Script {
                columns: Arc::new(vec![]),
                source: Source::Affected(affected),
            },
        );
    }

    /// Register a statement whose single result row echoes back the
    /// parameters it was executed with
    pub fn on_echo<S: Into<String>>(&self, sql: S, columns: Vec<ColumnMeta>) {
        self.insert(
            sql,
            Script {
                columns: Arc::new(columns),
                source: Source::Echo,
            },
        );
    }

    /// Register a parameterised lookup: the result set is computed
    /// from the bound parameters at execution time
    pub fn on_lookup<S, F>(&self, sql: S, columns: Vec<ColumnMeta>, lookup: F)
    where
        S: Into<String>,
        F: Fn(&[SqlValue]) -> Vec<Vec<SqlValue>> + Send + Sync + 'static,
    {
        self.insert(
            sql,
            Script {
                columns: Arc::new(columns),
                source: Source::Lookup(Arc::new(lookup)),
            },
        );
    }

    /// Make every attach attempt fail with the given message
    pub fn fail_connect<S: Into<String>>(&self, msg: S) {
        self.state.lock().unwrap().fail_connect = Some(msg.into());
    }

    /// Delay every attach attempt, to exercise sync-call timeouts
    pub fn attach_latency(&self, latency: Duration) {
        self.state.lock().unwrap().attach_latency = Some(latency);
    }

    /// Reject every execute that binds a parameter of this type
    pub fn reject_param_type(&self, sql_type: SqlType) {
        self.state.lock().unwrap().reject_param_type = Some(sql_type);
    }

    /// Set the user names reported for the database
    pub fn users(&self, users: Vec<String>) {
        self.state.lock().unwrap().users = users;
    }

    /// Every `(sql, params)` pair executed so far, in order
    pub fn executed(&self) -> Vec<(String, Vec<SqlValue>)> {
        self.state.lock().unwrap().journal.clone()
    }

    /// How many times the sql text was executed
    pub fn executed_count(&self, sql: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .journal
            .iter()
            .filter(|(s, _)| s == sql)
            .count()
    }

    /// Whether `drop database` ran
    pub fn was_dropped(&self) -> bool {
        self.state.lock().unwrap().dropped
    }

    fn insert<S: Into<String>>(&self, sql: S, script: Script) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(sql.into().trim().to_string(), script);
    }
}

pub struct MockDb {
    attached: bool,
}

pub struct MockTr {
    active: bool,
    access: TrAccessMode,
}

pub struct MockStmt {
    sql: String,
    script: Script,
    param_count: usize,
    cursor: usize,
    open: bool,
    bound: Vec<SqlValue>,
}

fn stmt_type_of(sql: &str) -> StmtType {
    let head = sql.trim().to_ascii_uppercase();

    if head.starts_with("SELECT") {
        StmtType::Select
    } else if head.starts_with("INSERT") {
        StmtType::Insert
    } else if head.starts_with("UPDATE") {
        StmtType::Update
    } else if head.starts_with("DELETE") {
        StmtType::Delete
    } else if head.starts_with("CREATE") || head.starts_with("ALTER") || head.starts_with("DROP") {
        StmtType::Ddl
    } else {
        StmtType::Other
    }
}

impl DbClient for MockDbClient {
    type DbHandle = MockDb;
    type TrHandle = MockTr;
    type StmtHandle = MockStmt;

    fn create_database(
        &mut self,
        params: &ConnParams,
        _dialect: Dialect,
    ) -> Result<Self::DbHandle, FbError> {
        self.attach_database(params)
    }

    fn attach_database(&mut self, _params: &ConnParams) -> Result<Self::DbHandle, FbError> {
        let (fail, latency) = {
            let state = self.state.lock().unwrap();
            (state.fail_connect.clone(), state.attach_latency)
        };

        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }

        if let Some(msg) = fail {
            return Err(FbError::ConnectFailed(msg));
        }

        Ok(MockDb { attached: true })
    }

    fn detach_database(&mut self, db: &mut Self::DbHandle) -> Result<(), FbError> {
        db.attached = false;
        Ok(())
    }

    fn drop_database(&mut self, db: &mut Self::DbHandle) -> Result<(), FbError> {
        db.attached = false;
        self.state.lock().unwrap().dropped = true;
        Ok(())
    }

    fn is_attached(&mut self, db: &mut Self::DbHandle) -> bool {
        db.attached
    }

    fn connected_users(&mut self, _db: &mut Self::DbHandle) -> Result<Vec<String>, FbError> {
        Ok(self.state.lock().unwrap().users.clone())
    }

    fn begin_transaction(
        &mut self,
        db: &mut Self::DbHandle,
        conf: &TransactionConfiguration,
    ) -> Result<Self::TrHandle, FbError> {
        if !db.attached {
            return Err(FbError::ConnectionClosed);
        }

        Ok(MockTr {
            active: true,
            access: conf.access,
        })
    }

    fn transaction_operation(
        &mut self,
        tr: &mut Self::TrHandle,
        op: TrOp,
    ) -> Result<(), FbError> {
        if !tr.active {
            return Err(FbError::TransactionInactive);
        }

        match op {
            TrOp::Commit | TrOp::Rollback => tr.active = false,
            TrOp::CommitRetaining => {}
        }

        Ok(())
    }

    fn is_active(&mut self, tr: &mut Self::TrHandle) -> bool {
        tr.active
    }

    /// Unregistered sql is accepted here, so tests can run ddl without
    /// scripting it first
    fn exec_immediate(
        &mut self,
        db: &mut Self::DbHandle,
        tr: &mut Self::TrHandle,
        _dialect: Dialect,
        sql: &str,
    ) -> Result<(), FbError> {
        if !db.attached {
            return Err(FbError::ConnectionClosed);
        }
        if !tr.active {
            return Err(FbError::TransactionInactive);
        }

        self.state
            .lock()
            .unwrap()
            .journal
            .push((sql.trim().to_string(), vec![]));

        Ok(())
    }

    fn prepare_statement(
        &mut self,
        db: &mut Self::DbHandle,
        tr: &mut Self::TrHandle,
        _dialect: Dialect,
        sql: &str,
    ) -> Result<(PreparedInfo, Self::StmtHandle), FbError> {
        if !db.attached {
            return Err(FbError::ConnectionClosed);
        }
        if !tr.active {
            return Err(FbError::TransactionInactive);
        }

        let sql = sql.trim().to_string();
        let script = self
            .state
            .lock()
            .unwrap()
            .scripts
            .get(&sql)
            .cloned()
            .ok_or_else(|| FbError::Sql(format!("no result registered for: {}", sql)))?;

        let param_count = sql.matches('?').count();
        let info = PreparedInfo {
            stmt_type: stmt_type_of(&sql),
            columns: script.columns.as_ref().clone(),
            param_count,
        };

        Ok((
            info,
            MockStmt {
                sql,
                script,
                param_count,
                cursor: 0,
                open: false,
                bound: vec![],
            },
        ))
    }

    fn execute(
        &mut self,
        tr: &mut Self::TrHandle,
        stmt: &mut Self::StmtHandle,
        params: &[SqlValue],
    ) -> Result<usize, FbError> {
        if !tr.active {
            return Err(FbError::TransactionInactive);
        }
        if params.len() != stmt.param_count {
            return Err(FbError::ParamCount {
                expected: stmt.param_count,
                found: params.len(),
            });
        }

        let mut state = self.state.lock().unwrap();

        if let Some(rejected) = state.reject_param_type {
            if params.iter().any(|p| p.sql_type() == Some(rejected)) {
                return Err(FbError::UnsupportedParameterType(format!("{:?}", rejected)));
            }
        }

        state.journal.push((stmt.sql.clone(), params.to_vec()));

        let affected = match stmt.script.source {
            Source::Affected(n) => {
                if matches!(tr.access, TrAccessMode::Read) {
                    return Err(FbError::Sql(
                        "attempted update during a read-only transaction".to_string(),
                    ));
                }
                stmt.open = false;
                n
            }
            _ => {
                stmt.cursor = 0;
                stmt.open = true;
                stmt.bound = params.to_vec();
                0
            }
        };

        Ok(affected)
    }

    fn fetch(&mut self, stmt: &mut Self::StmtHandle) -> Result<Option<Row>, FbError> {
        if !stmt.open {
            return Ok(None);
        }

        let values = match &stmt.script.source {
            Source::Rows(rows) => rows.get(stmt.cursor).cloned(),
            Source::Generated { count, gen } => {
                if stmt.cursor < *count {
                    Some(gen(stmt.cursor))
                } else {
                    None
                }
            }
            Source::Echo => {
                if stmt.cursor == 0 {
                    Some(stmt.bound.clone())
                } else {
                    None
                }
            }
            Source::Lookup(lookup) => lookup(&stmt.bound).get(stmt.cursor).cloned(),
            Source::Affected(_) => None,
        };

        match values {
            Some(values) => {
                stmt.cursor += 1;
                Ok(Some(Row::new(values)))
            }
            None => {
                stmt.open = false;
                Ok(None)
            }
        }
    }

    fn statement_plan(&mut self, _stmt: &mut Self::StmtHandle) -> Result<String, FbError> {
        Ok(self.state.lock().unwrap().plan.clone())
    }

    fn free_statement(
        &mut self,
        stmt: &mut Self::StmtHandle,
        _op: FreeStmtOp,
    ) -> Result<(), FbError> {
        stmt.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn attach(mock: &MockDbClient) -> (MockDbClient, MockDb, MockTr) {
        let mut cli = mock.clone();
        let mut db = cli.attach_database(&ConnParams::default()).unwrap();
        let tr = cli
            .begin_transaction(&mut db, &TransactionConfiguration::default())
            .unwrap();

        (cli, db, tr)
    }

    #[test]
    fn scripted_cursor() {
        let mock = MockDbClient::new();
        mock.on_query(
            "SELECT id FROM t",
            vec![ColumnMeta::new("ID", SqlType::Int)],
            vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
        );

        let (mut cli, mut db, mut tr) = attach(&mock);

        let (info, mut stmt) = cli
            .prepare_statement(&mut db, &mut tr, Dialect::D3, "SELECT id FROM t")
            .unwrap();
        assert_eq!(info.param_count, 0);
        assert_eq!(info.columns.len(), 1);

        cli.execute(&mut tr, &mut stmt, &[]).unwrap();

        assert_eq!(
            cli.fetch(&mut stmt).unwrap().unwrap().get(1).unwrap(),
            &SqlValue::Int(1)
        );
        assert_eq!(
            cli.fetch(&mut stmt).unwrap().unwrap().get(1).unwrap(),
            &SqlValue::Int(2)
        );
        assert!(cli.fetch(&mut stmt).unwrap().is_none());
    }

    #[test]
    fn echo_returns_bound_params() {
        let mock = MockDbClient::new();
        mock.on_echo(
            "SELECT v FROM echo WHERE 1 = ?",
            vec![ColumnMeta::new("V", SqlType::Int)],
        );

        let (mut cli, mut db, mut tr) = attach(&mock);
        let (_, mut stmt) = cli
            .prepare_statement(&mut db, &mut tr, Dialect::D3, "SELECT v FROM echo WHERE 1 = ?")
            .unwrap();

        cli.execute(&mut tr, &mut stmt, &[SqlValue::Int(99)]).unwrap();

        let row = cli.fetch(&mut stmt).unwrap().unwrap();
        assert_eq!(row.get(1).unwrap(), &SqlValue::Int(99));
        assert!(cli.fetch(&mut stmt).unwrap().is_none());
    }

    #[test]
    fn unknown_sql_fails_prepare() {
        let mock = MockDbClient::new();
        let (mut cli, mut db, mut tr) = attach(&mock);

        let res = cli.prepare_statement(&mut db, &mut tr, Dialect::D3, "SELECT nope");
        assert!(matches!(res, Err(FbError::Sql(_))));
    }

    #[test]
    fn commit_deactivates() {
        let mock = MockDbClient::new();
        let (mut cli, _db, mut tr) = attach(&mock);

        cli.transaction_operation(&mut tr, TrOp::CommitRetaining)
            .unwrap();
        assert!(cli.is_active(&mut tr));

        cli.transaction_operation(&mut tr, TrOp::Commit).unwrap();
        assert!(!cli.is_active(&mut tr));
    }
}
