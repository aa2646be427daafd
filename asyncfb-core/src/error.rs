//! Error type shared by the engine and the client implementations

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FbError {
    /// The server refused the attachment, or it could not be reached
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The operation needs a connection that is currently open
    #[error("the connection is not open")]
    ConnectionClosed,

    /// `start` on a transaction that is already running, or a reservation
    /// added after `start`
    #[error("the transaction is already active")]
    TransactionActive,

    /// Commit / rollback / prepare without a running transaction
    #[error("the transaction is not active")]
    TransactionInactive,

    /// The statement has not been prepared yet
    #[error("no statement has been prepared")]
    NotPrepared,

    /// The bound parameters do not match the prepared parameter markers
    #[error("the statement takes {expected} parameters, {found} informed")]
    ParamCount { expected: usize, found: usize },

    /// A parameter value the client cannot bind to the target column
    #[error("unsupported parameter type: {0}")]
    UnsupportedParameterType(String),

    /// Name lookup miss on a row or on the column metadata
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    /// 1-indexed column access outside the current column count
    #[error("column index {0} out of range")]
    ColumnIndex(usize),

    /// `push` on a command queue after `close`
    #[error("the command queue is closed")]
    QueueClosed,

    /// The worker thread is gone and can no longer answer
    #[error("the worker was terminated")]
    Terminated,

    /// An error reported by the server while compiling or running sql
    #[error("sql error: {0}")]
    Sql(String),

    #[error("{0}")]
    Other(String),
}

impl From<String> for FbError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for FbError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}
