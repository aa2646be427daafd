//
// asyncfb - asynchronous firebird-family client
//
// Transaction handle
//

use std::sync::Mutex;
use std::time::Duration;

use asyncfb_core::{FbError, TransactionConfiguration, TrReservation};

use crate::command::Command;
use crate::connection::Connection;
use crate::events::TrId;
use crate::queue::{reply, wait, INFO_TIMEOUT, OP_TIMEOUT};

/// A transaction bound to one [`Connection`].
///
/// The handle carries only the identity; the native transaction lives
/// on the connection's worker and starts on [`start`](Self::start).
pub struct Transaction<'c> {
    conn: &'c Connection,
    id: TrId,
    conf: Mutex<TransactionConfiguration>,
}

impl<'c> Transaction<'c> {
    pub fn new(
        conn: &'c Connection,
        conf: TransactionConfiguration,
    ) -> Result<Transaction<'c>, FbError> {
        let id = conn.next_tr_id();

        let (tx, rx) = reply();
        conn.queue.push(Command::CreateTx { tr: id, reply: tx })?;
        wait(rx, INFO_TIMEOUT, "create transaction")?;

        Ok(Transaction {
            conn,
            id,
            conf: Mutex::new(conf),
        })
    }

    pub fn id(&self) -> TrId {
        self.id
    }

    pub(crate) fn connection(&self) -> &'c Connection {
        self.conn
    }

    /// Reserve a table when the transaction starts. Only legal while
    /// the transaction is not running.
    pub fn add_reservation(&self, table: &str, mode: TrReservation) -> Result<(), FbError> {
        if self.is_active()? {
            return Err(FbError::TransactionActive);
        }

        self.conf
            .lock()
            .unwrap()
            .reservations
            .push((table.to_string(), mode));

        Ok(())
    }

    /// Start the transaction, reporting `Started` or `Error`
    pub fn start(&self) -> Result<(), FbError> {
        self.conn.queue.push(self.start_cmd(None))
    }

    pub fn start_sync(&self) -> Result<(), FbError> {
        self.start_sync_timeout(OP_TIMEOUT)
    }

    pub fn start_sync_timeout(&self, timeout: Duration) -> Result<(), FbError> {
        let (tx, rx) = reply();
        self.conn.queue.push(self.start_cmd(Some(tx)))?;

        wait(rx, timeout, "start transaction")
    }

    /// Commit the changes, reporting `Committed` or `Error`
    pub fn commit(&self) -> Result<(), FbError> {
        self.conn.queue.push(Command::CommitTx {
            tr: self.id,
            retaining: false,
            reply: None,
        })
    }

    pub fn commit_sync(&self) -> Result<(), FbError> {
        self.commit_sync_timeout(OP_TIMEOUT)
    }

    pub fn commit_sync_timeout(&self, timeout: Duration) -> Result<(), FbError> {
        let (tx, rx) = reply();
        self.conn.queue.push(Command::CommitTx {
            tr: self.id,
            retaining: false,
            reply: Some(tx),
        })?;

        wait(rx, timeout, "commit")
    }

    /// Commit and immediately reopen a fresh transaction of identical
    /// parameters, reporting `Committed` then `Started`
    pub fn commit_retaining(&self) -> Result<(), FbError> {
        self.conn.queue.push(Command::CommitTx {
            tr: self.id,
            retaining: true,
            reply: None,
        })
    }

    pub fn commit_retaining_sync(&self) -> Result<(), FbError> {
        let (tx, rx) = reply();
        self.conn.queue.push(Command::CommitTx {
            tr: self.id,
            retaining: true,
            reply: Some(tx),
        })?;

        wait(rx, OP_TIMEOUT, "commit retaining")
    }

    /// Discard the changes, reporting `RolledBack` or `Error`
    pub fn rollback(&self) -> Result<(), FbError> {
        self.conn.queue.push(Command::RollbackTx {
            tr: self.id,
            reply: None,
        })
    }

    pub fn rollback_sync(&self) -> Result<(), FbError> {
        self.rollback_sync_timeout(OP_TIMEOUT)
    }

    pub fn rollback_sync_timeout(&self, timeout: Duration) -> Result<(), FbError> {
        let (tx, rx) = reply();
        self.conn.queue.push(Command::RollbackTx {
            tr: self.id,
            reply: Some(tx),
        })?;

        wait(rx, timeout, "rollback")
    }

    /// Execute a sql statement in this transaction without preparing
    /// it and without returning rows. Blocks until done.
    pub fn execute_immediate(&self, sql: &str) -> Result<(), FbError> {
        let (tx, rx) = reply();
        self.conn.queue.push(Command::ExecImmediate {
            tr: self.id,
            sql: sql.to_string(),
            reply: tx,
        })?;

        wait(rx, OP_TIMEOUT, "execute immediate")
    }

    /// Whether the transaction is currently running
    pub fn is_active(&self) -> Result<bool, FbError> {
        let (tx, rx) = reply();
        self.conn.queue.push(Command::TxIsActive {
            tr: self.id,
            reply: tx,
        })?;

        wait(rx, INFO_TIMEOUT, "transaction is active")
    }

    fn start_cmd(&self, reply: Option<crate::command::Reply<()>>) -> Command {
        Command::StartTx {
            tr: self.id,
            conf: self.conf.lock().unwrap().clone(),
            reply,
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        // an active transaction is rolled back by the worker
        let _ = self.conn.queue.push_internal(Command::DestroyTx { tr: self.id });
    }
}
