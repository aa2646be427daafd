//
// asyncfb - asynchronous firebird-family client
//
// Preparation, execution and streaming fetch of statements
//

use std::sync::{Arc, Mutex};
use std::time::Duration;

use asyncfb_core::{ColumnMeta, FbError, IntoParams, Row, SqlType, SqlValue};

use crate::command::{Command, SharedMeta};
use crate::connection::Connection;
use crate::events::StmtId;
use crate::queue::{reply, wait, INFO_TIMEOUT, OP_TIMEOUT};
use crate::transaction::Transaction;

struct StmtInner<'c> {
    conn: &'c Connection,
    id: StmtId,
    stop_fetch: Arc<Mutex<bool>>,
    meta: SharedMeta,
}

impl Drop for StmtInner<'_> {
    fn drop(&mut self) {
        let _ = self
            .conn
            .queue
            .push_internal(Command::DestroyStmt { stmt: self.id });
    }
}

/// A statement bound to one [`Transaction`].
///
/// The handle is cheap to clone; clones share the same worker-side
/// statement. Column metadata is cached here as of the last prepare,
/// so the accessors answer without a worker round-trip while the cache
/// is warm.
pub struct Statement<'c> {
    inner: Arc<StmtInner<'c>>,
}

impl Clone for Statement<'_> {
    fn clone(&self) -> Self {
        Statement {
            inner: self.inner.clone(),
        }
    }
}

impl<'c> Statement<'c> {
    /// A new statement on the given transaction. When `sql` is
    /// informed it is prepared as part of the construction.
    pub fn new(tr: &Transaction<'c>, sql: Option<&str>) -> Result<Statement<'c>, FbError> {
        let conn = tr.connection();
        let id = conn.next_stmt_id();
        let stop_fetch = Arc::new(Mutex::new(false));
        let meta: SharedMeta = Arc::new(Mutex::new(None));

        let (txr, rxr) = reply();
        conn.queue.push(Command::CreateStmt {
            stmt: id,
            tr: tr.id(),
            sql: sql.map(String::from),
            stop_fetch: stop_fetch.clone(),
            meta: meta.clone(),
            reply: txr,
        })?;
        wait(rxr, OP_TIMEOUT, "create statement")?;

        Ok(Statement {
            inner: Arc::new(StmtInner {
                conn,
                id,
                stop_fetch,
                meta,
            }),
        })
    }

    pub fn id(&self) -> StmtId {
        self.inner.id
    }

    pub(crate) fn connection(&self) -> &'c Connection {
        self.inner.conn
    }

    pub(crate) fn shared_meta(&self) -> SharedMeta {
        self.inner.meta.clone()
    }

    pub(crate) fn stop_flag(&self) -> Arc<Mutex<bool>> {
        self.inner.stop_fetch.clone()
    }

    /// Compile the sql, reporting `Prepared` or `Error`. Refreshes the
    /// column metadata.
    pub fn prepare(&self, sql: &str) -> Result<(), FbError> {
        self.invalidate_meta();

        self.inner.conn.queue.push(Command::Prepare {
            stmt: self.inner.id,
            sql: sql.to_string(),
            reply: None,
        })
    }

    /// Compile the sql, blocking until done
    pub fn prepare_sync(&self, sql: &str) -> Result<(), FbError> {
        self.invalidate_meta();

        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::Prepare {
            stmt: self.inner.id,
            sql: sql.to_string(),
            reply: Some(tx),
        })?;

        wait(rx, OP_TIMEOUT, "prepare")
    }

    /// Run the last prepared sql, reporting `Executed` or `Error`
    pub fn execute(&self) -> Result<(), FbError> {
        self.execute_with::<()>(None, None, false)
    }

    /// Run the last prepared sql and start streaming its rows
    pub fn execute_and_fetch(&self) -> Result<(), FbError> {
        self.execute_with::<()>(None, None, true)
    }

    /// The full execution surface. A missing `sql` means "use the last
    /// prepared statement"; informed parameters must match the
    /// prepared parameter count; `start_fetch` chains the streaming
    /// fetch to the execution.
    pub fn execute_with<P: IntoParams>(
        &self,
        sql: Option<&str>,
        params: Option<P>,
        start_fetch: bool,
    ) -> Result<(), FbError> {
        if sql.is_some() {
            self.invalidate_meta();
        }

        self.inner.conn.queue.push(Command::Execute {
            stmt: self.inner.id,
            sql: sql.map(String::from),
            params: params.map(IntoParams::to_params),
            start_fetch,
            reply: None,
        })
    }

    /// Run the last prepared sql, blocking until done. Returns the
    /// number of affected rows.
    pub fn execute_sync(&self) -> Result<usize, FbError> {
        self.execute_with_sync::<()>(None, None)
    }

    pub fn execute_with_sync<P: IntoParams>(
        &self,
        sql: Option<&str>,
        params: Option<P>,
    ) -> Result<usize, FbError> {
        self.execute_with_sync_timeout(sql, params, OP_TIMEOUT)
    }

    pub fn execute_with_sync_timeout<P: IntoParams>(
        &self,
        sql: Option<&str>,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<usize, FbError> {
        if sql.is_some() {
            self.invalidate_meta();
        }

        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::Execute {
            stmt: self.inner.id,
            sql: sql.map(String::from),
            params: params.map(IntoParams::to_params),
            start_fetch: false,
            reply: Some(tx),
        })?;

        wait(rx, timeout, "execute")
    }

    /// Bind one parameter. Columns are 1-indexed; the value is kept
    /// until the next execution.
    pub fn set_param<T: Into<SqlValue>>(&self, column: usize, value: T) -> Result<(), FbError> {
        self.inner.conn.queue.push(Command::SetParam {
            stmt: self.inner.id,
            column,
            value: value.into(),
        })
    }

    /// Start the streaming fetch: `FetchStarted`, one `Fetched(row)`
    /// per row, `FetchFinished` at the end of the cursor or on
    /// cancellation
    pub fn fetch(&self) -> Result<(), FbError> {
        self.inner
            .conn
            .queue
            .push(Command::StartFetch { stmt: self.inner.id })
    }

    /// Fetch one row synchronously. Leaves an empty row and returns
    /// false at the end of the cursor.
    pub fn fetch_row(&self, row: &mut Row) -> Result<bool, FbError> {
        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::FetchOne {
            stmt: self.inner.id,
            reply: tx,
        })?;

        match wait(rx, OP_TIMEOUT, "fetch row")? {
            Some(fetched) => {
                *row = fetched;
                Ok(true)
            }
            None => {
                *row = Row::empty();
                Ok(false)
            }
        }
    }

    /// Ask a running streaming fetch to stop. Observed between rows:
    /// at most one more `Fetched` arrives before `FetchFinished`.
    pub fn stop_fetching(&self) {
        *self.inner.stop_fetch.lock().unwrap() = true;
    }

    /// Walk the rest of the cursor with synchronous fetches
    pub fn rows(&self) -> RowIter<'_, 'c> {
        RowIter { stmt: self }
    }

    /// Explicitly release the open cursor
    pub fn close(&self) -> Result<(), FbError> {
        self.inner.conn.queue.push(Command::CloseCursor {
            stmt: self.inner.id,
            reply: None,
        })
    }

    pub fn close_sync(&self) -> Result<(), FbError> {
        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::CloseCursor {
            stmt: self.inner.id,
            reply: Some(tx),
        })?;

        wait(rx, OP_TIMEOUT, "close cursor")
    }

    /// Rows affected by the last execution
    pub fn affected_rows(&self) -> Result<usize, FbError> {
        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::AffectedRows {
            stmt: self.inner.id,
            reply: tx,
        })?;

        wait(rx, INFO_TIMEOUT, "affected rows")
    }

    /// The last prepared sql text
    pub fn sql(&self) -> Result<String, FbError> {
        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::StmtSql {
            stmt: self.inner.id,
            reply: tx,
        })?;

        wait(rx, INFO_TIMEOUT, "statement sql")
    }

    /// The access plan the server chose
    pub fn plan(&self) -> Result<String, FbError> {
        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::StmtPlan {
            stmt: self.inner.id,
            reply: tx,
        })?;

        wait(rx, INFO_TIMEOUT, "statement plan")
    }

    // ------------------- column metadata -------------------

    pub fn column_count(&self) -> Result<usize, FbError> {
        Ok(self.columns()?.len())
    }

    /// Name of the 1-indexed column
    pub fn column_name(&self, column: usize) -> Result<String, FbError> {
        self.column(column).map(|c| c.name)
    }

    /// The 1-indexed position of the named column, matched case
    /// insensitively. The first match wins.
    pub fn column_index(&self, name: &str) -> Result<usize, FbError> {
        self.columns()?
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name) || c.alias.eq_ignore_ascii_case(name))
            .map(|i| i + 1)
            .ok_or_else(|| FbError::UnknownColumn(name.to_string()))
    }

    pub fn column_alias(&self, column: usize) -> Result<String, FbError> {
        self.column(column).map(|c| c.alias)
    }

    pub fn column_table(&self, column: usize) -> Result<String, FbError> {
        self.column(column).map(|c| c.table)
    }

    pub fn column_type(&self, column: usize) -> Result<SqlType, FbError> {
        self.column(column).map(|c| c.sql_type)
    }

    pub fn column_subtype(&self, column: usize) -> Result<i32, FbError> {
        self.column(column).map(|c| c.subtype)
    }

    pub fn column_size(&self, column: usize) -> Result<i32, FbError> {
        self.column(column).map(|c| c.size)
    }

    pub fn column_scale(&self, column: usize) -> Result<i32, FbError> {
        self.column(column).map(|c| c.scale)
    }

    fn column(&self, column: usize) -> Result<ColumnMeta, FbError> {
        let columns = self.columns()?;

        column
            .checked_sub(1)
            .and_then(|i| columns.get(i))
            .cloned()
            .ok_or(FbError::ColumnIndex(column))
    }

    /// The cached descriptors, refetched from the worker when a
    /// prepare invalidated them
    fn columns(&self) -> Result<Arc<Vec<ColumnMeta>>, FbError> {
        if let Some(columns) = self.inner.meta.lock().unwrap().clone() {
            return Ok(columns);
        }

        let (tx, rx) = reply();
        self.inner.conn.queue.push(Command::StmtColumns {
            stmt: self.inner.id,
            reply: tx,
        })?;
        let columns = wait(rx, INFO_TIMEOUT, "column metadata")?;

        *self.inner.meta.lock().unwrap() = Some(columns.clone());

        Ok(columns)
    }

    fn invalidate_meta(&self) {
        *self.inner.meta.lock().unwrap() = None;
    }
}

/// Iterator over the remaining rows of an executed statement
pub struct RowIter<'s, 'c> {
    stmt: &'s Statement<'c>,
}

impl Iterator for RowIter<'_, '_> {
    type Item = Result<Row, FbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut row = Row::empty();

        match self.stmt.fetch_row(&mut row) {
            Ok(true) => Some(Ok(row)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
