//! Client trait to abstract over the implementations that actually
//! talk to the server
//!
//! Implementations are synchronous and not thread safe. The engine
//! keeps each instance, and every handle it produces, on a single
//! dedicated worker thread.

use crate::{ColumnMeta, FbError, Row, SqlValue, TransactionConfiguration, TrOp};

/// Firebird sql dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Dialect {
    D1 = 1,
    D2 = 2,
    D3 = 3,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::D3
    }
}

/// Close or drop a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeStmtOp {
    /// Close the open cursor, keeping the statement compiled
    Close,
    /// Release the statement altogether
    Drop,
}

/// Statement type, as reported by the server after prepare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtType {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
    Other,
}

/// Connection parameters, passed through to the client implementation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnParams {
    /// Hostname or IP address of the server
    pub server: String,
    /// TCP port of the server
    pub port: u16,
    /// Database name or path
    pub db_path: String,
    pub user: String,
    pub password: String,
    /// Connection character set name, empty for the client default
    pub charset: String,
    /// Sql role, empty for none
    pub role: String,
    /// Raw creation parameters forwarded on `create database`
    pub create_params: String,
    /// Dialect used for prepares and on database creation
    pub dialect: Dialect,
}

impl Default for ConnParams {
    fn default() -> Self {
        ConnParams {
            server: "localhost".to_string(),
            port: 3050,
            db_path: "test.fdb".to_string(),
            user: "SYSDBA".to_string(),
            password: "masterkey".to_string(),
            charset: String::new(),
            role: String::new(),
            create_params: String::new(),
            dialect: Dialect::D3,
        }
    }
}

impl ConnParams {
    /// Hostname or IP address of the server. Default: localhost
    pub fn server<S: Into<String>>(&mut self, server: S) -> &mut Self {
        self.server = server.into();
        self
    }

    /// TCP port of the server. Default: 3050
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    /// Database name or path. Default: test.fdb
    pub fn db_path<S: Into<String>>(&mut self, db_path: S) -> &mut Self {
        self.db_path = db_path.into();
        self
    }

    /// Username. Default: SYSDBA
    pub fn user<S: Into<String>>(&mut self, user: S) -> &mut Self {
        self.user = user.into();
        self
    }

    /// Password. Default: masterkey
    pub fn pass<S: Into<String>>(&mut self, pass: S) -> &mut Self {
        self.password = pass.into();
        self
    }

    /// Connection character set. Default: empty, the client decides
    pub fn charset<S: Into<String>>(&mut self, charset: S) -> &mut Self {
        self.charset = charset.into();
        self
    }

    /// Sql role. Default: none
    pub fn role<S: Into<String>>(&mut self, role: S) -> &mut Self {
        self.role = role.into();
        self
    }

    /// Parameters forwarded on database creation. Default: none
    pub fn create_params<S: Into<String>>(&mut self, create_params: S) -> &mut Self {
        self.create_params = create_params.into();
        self
    }

    /// Sql dialect. Default: 3
    pub fn dialect(&mut self, dialect: Dialect) -> &mut Self {
        self.dialect = dialect;
        self
    }
}

/// What prepare learned about a statement
#[derive(Debug, Clone)]
pub struct PreparedInfo {
    pub stmt_type: StmtType,
    /// Output column descriptors, in select order
    pub columns: Vec<ColumnMeta>,
    /// Number of `?` parameter markers
    pub param_count: usize,
}

/// The synchronous client façade the engine drives.
///
/// One instance serves one connection. None of the handle types may
/// leave the thread the instance lives on, which the `Send` bounds
/// still permit: the engine moves the whole client, handles included,
/// into its worker thread once and never shares it.
pub trait DbClient: Send + 'static {
    /// A database attachment handle
    type DbHandle: Send + 'static;
    /// A transaction handle
    type TrHandle: Send + 'static;
    /// A statement handle
    type StmtHandle: Send + 'static;

    /// Create the database and attach to it
    fn create_database(
        &mut self,
        params: &ConnParams,
        dialect: Dialect,
    ) -> Result<Self::DbHandle, FbError>;

    /// Connect to an existing database
    fn attach_database(&mut self, params: &ConnParams) -> Result<Self::DbHandle, FbError>;

    /// Disconnect from the database
    fn detach_database(&mut self, db: &mut Self::DbHandle) -> Result<(), FbError>;

    /// Delete the database on the server
    fn drop_database(&mut self, db: &mut Self::DbHandle) -> Result<(), FbError>;

    /// Whether the attachment is still alive
    fn is_attached(&mut self, db: &mut Self::DbHandle) -> bool;

    /// Names of the users currently connected to the database
    fn connected_users(&mut self, db: &mut Self::DbHandle) -> Result<Vec<String>, FbError>;

    /// Start a new transaction
    fn begin_transaction(
        &mut self,
        db: &mut Self::DbHandle,
        conf: &TransactionConfiguration,
    ) -> Result<Self::TrHandle, FbError>;

    /// Commit / rollback the transaction. After a plain commit or
    /// rollback the handle is dead; the retaining variant keeps it
    /// running.
    fn transaction_operation(&mut self, tr: &mut Self::TrHandle, op: TrOp)
        -> Result<(), FbError>;

    /// Whether the transaction is still running
    fn is_active(&mut self, tr: &mut Self::TrHandle) -> bool;

    /// Execute a sql statement immediately, without preparing it and
    /// without returning rows
    fn exec_immediate(
        &mut self,
        db: &mut Self::DbHandle,
        tr: &mut Self::TrHandle,
        dialect: Dialect,
        sql: &str,
    ) -> Result<(), FbError>;

    /// Compile a statement, returning what the server reported about it
    fn prepare_statement(
        &mut self,
        db: &mut Self::DbHandle,
        tr: &mut Self::TrHandle,
        dialect: Dialect,
        sql: &str,
    ) -> Result<(PreparedInfo, Self::StmtHandle), FbError>;

    /// Execute the prepared statement with the given parameters,
    /// returning the number of affected rows
    fn execute(
        &mut self,
        tr: &mut Self::TrHandle,
        stmt: &mut Self::StmtHandle,
        params: &[SqlValue],
    ) -> Result<usize, FbError>;

    /// Advance the cursor of the executed statement by one row
    fn fetch(&mut self, stmt: &mut Self::StmtHandle) -> Result<Option<Row>, FbError>;

    /// The access plan the server chose for the prepared statement
    fn statement_plan(&mut self, stmt: &mut Self::StmtHandle) -> Result<String, FbError>;

    /// Closes or drops a statement
    fn free_statement(
        &mut self,
        stmt: &mut Self::StmtHandle,
        op: FreeStmtOp,
    ) -> Result<(), FbError>;
}
