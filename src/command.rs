//! Command records moved from the foreground handles to the worker
//!
//! A command is one worker task: the kind, its payload, the target
//! handle identity and, for synchronous calls, the completion latch the
//! foreground is blocked on.

use std::sync::{Arc, Mutex};

use asyncfb_core::{ColumnMeta, Dialect, FbError, Row, SqlValue, TransactionConfiguration};

use crate::events::{StmtId, TrId};

/// Completion latch and result slot of a synchronous command
pub(crate) type Reply<T> = flume::Sender<Result<T, FbError>>;

/// Column metadata shared between the worker (writer, on prepare) and
/// the foreground statement cache (reader)
pub(crate) type SharedMeta = Arc<Mutex<Option<Arc<Vec<ColumnMeta>>>>>;

/// Connection attributes answerable without touching the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnInfoField {
    Server,
    Database,
    User,
    Password,
    CharacterSet,
    Role,
    CreateParams,
}

pub(crate) enum Command {
    // connection
    Create {
        dialect: Dialect,
        reply: Option<Reply<()>>,
    },
    Open {
        reply: Option<Reply<()>>,
    },
    Close {
        reply: Option<Reply<()>>,
    },
    IsOpen {
        reply: Reply<bool>,
    },
    ConnInfo {
        field: ConnInfoField,
        reply: Reply<String>,
    },
    ConnectedUsers {
        reply: Reply<Vec<String>>,
    },
    DropDatabase {
        reply: Option<Reply<()>>,
    },

    // transaction
    CreateTx {
        tr: TrId,
        reply: Reply<()>,
    },
    StartTx {
        tr: TrId,
        conf: TransactionConfiguration,
        reply: Option<Reply<()>>,
    },
    CommitTx {
        tr: TrId,
        retaining: bool,
        reply: Option<Reply<()>>,
    },
    RollbackTx {
        tr: TrId,
        reply: Option<Reply<()>>,
    },
    TxIsActive {
        tr: TrId,
        reply: Reply<bool>,
    },
    ExecImmediate {
        tr: TrId,
        sql: String,
        reply: Reply<()>,
    },
    DestroyTx {
        tr: TrId,
    },

    // statement
    CreateStmt {
        stmt: StmtId,
        tr: TrId,
        sql: Option<String>,
        stop_fetch: Arc<Mutex<bool>>,
        meta: SharedMeta,
        reply: Reply<()>,
    },
    Prepare {
        stmt: StmtId,
        sql: String,
        reply: Option<Reply<()>>,
    },
    Execute {
        stmt: StmtId,
        sql: Option<String>,
        params: Option<Vec<SqlValue>>,
        start_fetch: bool,
        reply: Option<Reply<usize>>,
    },
    SetParam {
        stmt: StmtId,
        column: usize,
        value: SqlValue,
    },
    StartFetch {
        stmt: StmtId,
    },
    FetchNext {
        stmt: StmtId,
    },
    FetchOne {
        stmt: StmtId,
        reply: Reply<Option<Row>>,
    },
    CloseCursor {
        stmt: StmtId,
        reply: Option<Reply<()>>,
    },
    StmtPlan {
        stmt: StmtId,
        reply: Reply<String>,
    },
    StmtSql {
        stmt: StmtId,
        reply: Reply<String>,
    },
    AffectedRows {
        stmt: StmtId,
        reply: Reply<usize>,
    },
    StmtColumns {
        stmt: StmtId,
        reply: Reply<Arc<Vec<ColumnMeta>>>,
    },
    DestroyStmt {
        stmt: StmtId,
    },

    Shutdown,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::Open { .. } => "open",
            Command::Close { .. } => "close",
            Command::IsOpen { .. } => "is open",
            Command::ConnInfo { .. } => "connection info",
            Command::ConnectedUsers { .. } => "connected users",
            Command::DropDatabase { .. } => "drop database",
            Command::CreateTx { .. } => "create transaction",
            Command::StartTx { .. } => "start transaction",
            Command::CommitTx { .. } => "commit",
            Command::RollbackTx { .. } => "rollback",
            Command::TxIsActive { .. } => "transaction is active",
            Command::ExecImmediate { .. } => "execute immediate",
            Command::DestroyTx { .. } => "destroy transaction",
            Command::CreateStmt { .. } => "create statement",
            Command::Prepare { .. } => "prepare",
            Command::Execute { .. } => "execute",
            Command::SetParam { .. } => "set parameter",
            Command::StartFetch { .. } => "start fetch",
            Command::FetchNext { .. } => "fetch next",
            Command::FetchOne { .. } => "fetch one row",
            Command::CloseCursor { .. } => "close cursor",
            Command::StmtPlan { .. } => "statement plan",
            Command::StmtSql { .. } => "statement sql",
            Command::AffectedRows { .. } => "affected rows",
            Command::StmtColumns { .. } => "column metadata",
            Command::DestroyStmt { .. } => "destroy statement",
            Command::Shutdown => "shutdown",
        }
    }

    /// Resolve the command without running it, releasing any
    /// foreground caller blocked on its latch
    pub fn cancel(self) {
        fn reject<T>(reply: Option<Reply<T>>) {
            if let Some(tx) = reply {
                let _ = tx.send(Err(FbError::Terminated));
            }
        }

        match self {
            Command::Create { reply, .. } => reject(reply),
            Command::Open { reply } => reject(reply),
            Command::Close { reply } => reject(reply),
            Command::IsOpen { reply } => reject(Some(reply)),
            Command::ConnInfo { reply, .. } => reject(Some(reply)),
            Command::ConnectedUsers { reply } => reject(Some(reply)),
            Command::DropDatabase { reply } => reject(reply),
            Command::CreateTx { reply, .. } => reject(Some(reply)),
            Command::StartTx { reply, .. } => reject(reply),
            Command::CommitTx { reply, .. } => reject(reply),
            Command::RollbackTx { reply, .. } => reject(reply),
            Command::TxIsActive { reply, .. } => reject(Some(reply)),
            Command::ExecImmediate { reply, .. } => reject(Some(reply)),
            Command::CreateStmt { reply, .. } => reject(Some(reply)),
            Command::Prepare { reply, .. } => reject(reply),
            Command::Execute { reply, .. } => reject(reply),
            Command::FetchOne { reply, .. } => reject(Some(reply)),
            Command::CloseCursor { reply, .. } => reject(reply),
            Command::StmtPlan { reply, .. } => reject(Some(reply)),
            Command::StmtSql { reply, .. } => reject(Some(reply)),
            Command::AffectedRows { reply, .. } => reject(Some(reply)),
            Command::StmtColumns { reply, .. } => reject(Some(reply)),
            Command::SetParam { .. }
            | Command::StartFetch { .. }
            | Command::FetchNext { .. }
            | Command::DestroyTx { .. }
            | Command::DestroyStmt { .. }
            | Command::Shutdown => {}
        }
    }
}
