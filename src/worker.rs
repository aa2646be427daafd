//
// asyncfb - asynchronous firebird-family client
//
// The worker thread: owns the client instance and every native handle,
// executes commands strictly in queue order
//

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};
use log::{debug, trace};

use asyncfb_core::{
    ColumnMeta, ConnParams, DbClient, Dialect, FbError, FreeStmtOp, Row, SqlValue,
    TransactionConfiguration, TrOp,
};

use crate::command::{Command, ConnInfoField, Reply, SharedMeta};
use crate::events::{
    ConnId, ConnectionEvent, Event, Hub, StatementEvent, StmtId, TransactionEvent, TrId,
};

struct TrState<C: DbClient> {
    handle: Option<C::TrHandle>,
}

struct StmtState<C: DbClient> {
    tr: TrId,
    handle: Option<C::StmtHandle>,
    sql: Option<String>,
    columns: Arc<Vec<ColumnMeta>>,
    param_count: usize,
    /// Parameters accumulated through set-param, consumed by execute
    params: Vec<SqlValue>,
    affected: usize,
    /// Set from the foreground, observed between fetched rows
    stop_fetch: Arc<Mutex<bool>>,
    /// Foreground metadata cache, refreshed on every prepare
    meta: SharedMeta,
}

pub(crate) struct Worker<C: DbClient> {
    cli: C,
    params: ConnParams,
    conn_id: ConnId,
    db: Option<C::DbHandle>,
    transactions: HashMap<TrId, TrState<C>>,
    statements: HashMap<StmtId, StmtState<C>>,
    /// Tail of the own queue, for re-enqueuing fetch-next
    queue_tx: Sender<Command>,
    events: Arc<Hub<Event>>,
}

impl<C: DbClient> Worker<C> {
    pub fn new(
        cli: C,
        params: ConnParams,
        conn_id: ConnId,
        queue_tx: Sender<Command>,
        events: Arc<Hub<Event>>,
    ) -> Self {
        Worker {
            cli,
            params,
            conn_id,
            db: None,
            transactions: HashMap::new(),
            statements: HashMap::new(),
            queue_tx,
            events,
        }
    }

    /// The thread body. Signals `ready` once the loop is reachable and
    /// `done` right before returning.
    pub fn run(mut self, rx: Receiver<Command>, ready: Sender<()>, done: Sender<()>) {
        debug!("{} worker running", self.conn_id);
        let _ = ready.send(());

        while let Ok(cmd) = rx.recv() {
            trace!("{} received command: {}", self.conn_id, cmd.name());

            if matches!(cmd, Command::Shutdown) {
                break;
            }

            self.dispatch(cmd);
        }

        // Whatever is still queued will never run
        for cmd in rx.try_iter() {
            cmd.cancel();
        }

        self.cleanup();
        debug!("{} worker stopping", self.conn_id);
        let _ = done.send(());
    }

    fn dispatch(&mut self, cmd: Command) {
        match cmd {
            Command::Create { dialect, reply } => {
                let res = self.do_create(dialect);
                self.finish_conn(reply, res, ConnectionEvent::Opened);
            }
            Command::Open { reply } => {
                let res = self.do_open();
                self.finish_conn(reply, res, ConnectionEvent::Opened);
            }
            Command::Close { reply } => {
                // closing a closed connection is a quiet no-op
                if self.db.is_none() {
                    if let Some(tx) = reply {
                        let _ = tx.send(Ok(()));
                    }
                    return;
                }

                let res = self.do_close();
                self.finish_conn(reply, res, ConnectionEvent::Closed);
            }
            Command::IsOpen { reply } => {
                let open = self.db_connected();
                let _ = reply.send(Ok(open));
            }
            Command::ConnInfo { field, reply } => {
                let _ = reply.send(Ok(self.conn_info(field)));
            }
            Command::ConnectedUsers { reply } => {
                let res = self.do_connected_users();
                let _ = reply.send(res);
            }
            Command::DropDatabase { reply } => {
                let res = self.do_drop_database();
                self.finish_conn(reply, res, ConnectionEvent::Closed);
            }

            Command::CreateTx { tr, reply } => {
                self.transactions.insert(tr, TrState { handle: None });
                let _ = reply.send(Ok(()));
            }
            Command::StartTx { tr, conf, reply } => {
                let res = self.do_start_tx(tr, conf);
                self.finish_tr(tr, reply, res, &[TransactionEvent::Started]);
            }
            Command::CommitTx {
                tr,
                retaining,
                reply,
            } => {
                let res = self.do_commit(tr, retaining);
                // a retaining commit leaves a fresh transaction running
                let mut events = vec![TransactionEvent::Committed];
                if retaining {
                    events.push(TransactionEvent::Started);
                }
                self.finish_tr(tr, reply, res, &events);
            }
            Command::RollbackTx { tr, reply } => {
                let res = self.do_rollback(tr);
                self.finish_tr(tr, reply, res, &[TransactionEvent::RolledBack]);
            }
            Command::TxIsActive { tr, reply } => {
                let active = self.tr_active(tr);
                let _ = reply.send(Ok(active));
            }
            Command::ExecImmediate { tr, sql, reply } => {
                let res = self.do_exec_immediate(tr, &sql);
                let _ = reply.send(res);
            }
            Command::DestroyTx { tr } => {
                let _ = self.do_rollback(tr);
                self.transactions.remove(&tr);
            }

            Command::CreateStmt {
                stmt,
                tr,
                sql,
                stop_fetch,
                meta,
                reply,
            } => {
                self.statements.insert(
                    stmt,
                    StmtState {
                        tr,
                        handle: None,
                        sql: None,
                        columns: Arc::new(vec![]),
                        param_count: 0,
                        params: vec![],
                        affected: 0,
                        stop_fetch,
                        meta,
                    },
                );

                let res = match sql {
                    Some(sql) => self.do_prepare(stmt, sql),
                    None => Ok(()),
                };
                if res.is_err() {
                    self.statements.remove(&stmt);
                }
                let _ = reply.send(res);
            }
            Command::Prepare { stmt, sql, reply } => {
                let res = self.do_prepare(stmt, sql);
                self.finish_stmt(stmt, reply, res, |_| StatementEvent::Prepared);
            }
            Command::Execute {
                stmt,
                sql,
                params,
                start_fetch,
                reply,
            } => {
                let res = self.do_execute(stmt, sql, params);
                let ok = res.is_ok();
                self.finish_stmt(stmt, reply, res, |affected| StatementEvent::Executed {
                    affected: *affected,
                });

                if ok && start_fetch {
                    self.do_start_fetch(stmt);
                }
            }
            Command::SetParam {
                stmt,
                column,
                value,
            } => {
                if let Err(e) = self.do_set_param(stmt, column, value) {
                    self.emit_stmt(stmt, StatementEvent::Error(e.to_string()));
                }
            }
            Command::StartFetch { stmt } => self.do_start_fetch(stmt),
            Command::FetchNext { stmt } => self.do_fetch_next(stmt),
            Command::FetchOne { stmt, reply } => {
                let res = self.do_fetch_one(stmt);
                let _ = reply.send(res);
            }
            Command::CloseCursor { stmt, reply } => {
                let res = self.do_close_cursor(stmt);
                match res {
                    Ok(()) => {
                        if let Some(tx) = reply {
                            let _ = tx.send(Ok(()));
                        }
                    }
                    Err(e) => self.fail_stmt(stmt, reply, e),
                }
            }
            Command::StmtPlan { stmt, reply } => {
                let res = self.do_plan(stmt);
                let _ = reply.send(res);
            }
            Command::StmtSql { stmt, reply } => {
                let sql = self
                    .statements
                    .get(&stmt)
                    .and_then(|st| st.sql.clone())
                    .unwrap_or_default();
                let _ = reply.send(Ok(sql));
            }
            Command::AffectedRows { stmt, reply } => {
                let affected = self.statements.get(&stmt).map(|st| st.affected).unwrap_or(0);
                let _ = reply.send(Ok(affected));
            }
            Command::StmtColumns { stmt, reply } => {
                let columns = self
                    .statements
                    .get(&stmt)
                    .map(|st| st.columns.clone())
                    .unwrap_or_default();
                let _ = reply.send(Ok(columns));
            }
            Command::DestroyStmt { stmt } => {
                if let Some(mut st) = self.statements.remove(&stmt) {
                    if let Some(mut h) = st.handle.take() {
                        let _ = self.cli.free_statement(&mut h, FreeStmtOp::Drop);
                    }
                }
            }

            Command::Shutdown => unreachable!("handled by the loop"),
        }
    }

    // ------------------------- connection -------------------------

    fn do_create(&mut self, dialect: Dialect) -> Result<(), FbError> {
        if self.db.is_some() {
            return Err("the connection is already open".into());
        }

        let db = self
            .cli
            .create_database(&self.params, dialect)
            .map_err(connect_failed)?;
        self.db = Some(db);

        Ok(())
    }

    fn do_open(&mut self) -> Result<(), FbError> {
        if self.db.is_some() {
            return Err("the connection is already open".into());
        }

        let db = self
            .cli
            .attach_database(&self.params)
            .map_err(connect_failed)?;
        self.db = Some(db);

        Ok(())
    }

    fn do_close(&mut self) -> Result<(), FbError> {
        let mut db = self.db.take().ok_or(FbError::ConnectionClosed)?;

        // in-flight statements and transactions die with the attachment
        for st in self.statements.values_mut() {
            st.handle = None;
        }
        for tr in self.transactions.values_mut() {
            tr.handle = None;
        }

        self.cli.detach_database(&mut db)
    }

    fn do_drop_database(&mut self) -> Result<(), FbError> {
        let mut db = self.db.take().ok_or(FbError::ConnectionClosed)?;

        for st in self.statements.values_mut() {
            st.handle = None;
        }
        for tr in self.transactions.values_mut() {
            tr.handle = None;
        }

        self.cli.drop_database(&mut db)
    }

    fn conn_info(&self, field: ConnInfoField) -> String {
        match field {
            ConnInfoField::Server => self.params.server.clone(),
            ConnInfoField::Database => self.params.db_path.clone(),
            ConnInfoField::User => self.params.user.clone(),
            ConnInfoField::Password => self.params.password.clone(),
            ConnInfoField::CharacterSet => self.params.charset.clone(),
            ConnInfoField::Role => self.params.role.clone(),
            ConnInfoField::CreateParams => self.params.create_params.clone(),
        }
    }

    fn do_connected_users(&mut self) -> Result<Vec<String>, FbError> {
        let db = self.db.as_mut().ok_or(FbError::ConnectionClosed)?;

        self.cli.connected_users(db)
    }

    fn db_connected(&mut self) -> bool {
        match self.db.as_mut() {
            Some(db) => self.cli.is_attached(db),
            None => false,
        }
    }

    // ------------------------- transaction -------------------------

    fn do_start_tx(&mut self, tr: TrId, conf: TransactionConfiguration) -> Result<(), FbError> {
        let db = self.db.as_mut().ok_or(FbError::ConnectionClosed)?;
        let state = self
            .transactions
            .get_mut(&tr)
            .ok_or(FbError::TransactionInactive)?;

        if let Some(h) = state.handle.as_mut() {
            if self.cli.is_active(h) {
                return Err(FbError::TransactionActive);
            }
        }

        state.handle = Some(self.cli.begin_transaction(db, &conf)?);

        Ok(())
    }

    fn do_commit(&mut self, tr: TrId, retaining: bool) -> Result<(), FbError> {
        let state = self
            .transactions
            .get_mut(&tr)
            .ok_or(FbError::TransactionInactive)?;
        let h = state.handle.as_mut().ok_or(FbError::TransactionInactive)?;

        let op = if retaining {
            TrOp::CommitRetaining
        } else {
            TrOp::Commit
        };
        self.cli.transaction_operation(h, op)?;

        if !retaining {
            state.handle = None;
        }

        Ok(())
    }

    fn do_rollback(&mut self, tr: TrId) -> Result<(), FbError> {
        let state = self
            .transactions
            .get_mut(&tr)
            .ok_or(FbError::TransactionInactive)?;
        let h = state.handle.as_mut().ok_or(FbError::TransactionInactive)?;

        self.cli.transaction_operation(h, TrOp::Rollback)?;
        state.handle = None;

        Ok(())
    }

    fn tr_active(&mut self, tr: TrId) -> bool {
        match self.transactions.get_mut(&tr).and_then(|s| s.handle.as_mut()) {
            Some(h) => self.cli.is_active(h),
            None => false,
        }
    }

    fn do_exec_immediate(&mut self, tr: TrId, sql: &str) -> Result<(), FbError> {
        let db = self.db.as_mut().ok_or(FbError::ConnectionClosed)?;
        let tr_h = self
            .transactions
            .get_mut(&tr)
            .and_then(|t| t.handle.as_mut())
            .ok_or(FbError::TransactionInactive)?;

        self.cli
            .exec_immediate(db, tr_h, self.params.dialect, sql)
    }

    // ------------------------- statement -------------------------

    fn do_prepare(&mut self, id: StmtId, sql: String) -> Result<(), FbError> {
        let db = self.db.as_mut().ok_or(FbError::ConnectionClosed)?;
        let st = self.statements.get_mut(&id).ok_or(FbError::NotPrepared)?;
        let tr_h = self
            .transactions
            .get_mut(&st.tr)
            .and_then(|t| t.handle.as_mut())
            .ok_or(FbError::TransactionInactive)?;

        // release the previous compiled statement before replacing it
        if let Some(mut old) = st.handle.take() {
            let _ = self.cli.free_statement(&mut old, FreeStmtOp::Drop);
        }

        let (info, handle) = self
            .cli
            .prepare_statement(db, tr_h, self.params.dialect, &sql)?;

        st.handle = Some(handle);
        st.columns = Arc::new(info.columns);
        st.param_count = info.param_count;
        st.params = vec![SqlValue::Null; info.param_count];
        st.affected = 0;
        st.sql = Some(sql);
        *st.meta.lock().unwrap() = Some(st.columns.clone());

        Ok(())
    }

    fn do_execute(
        &mut self,
        id: StmtId,
        sql: Option<String>,
        params: Option<Vec<SqlValue>>,
    ) -> Result<usize, FbError> {
        if let Some(sql) = sql {
            self.do_prepare(id, sql)?;
        }

        let st = self.statements.get_mut(&id).ok_or(FbError::NotPrepared)?;

        if let Some(p) = params {
            if p.len() != st.param_count {
                return Err(FbError::ParamCount {
                    expected: st.param_count,
                    found: p.len(),
                });
            }
            st.params = p;
        }

        let h = st.handle.as_mut().ok_or(FbError::NotPrepared)?;
        let tr_h = self
            .transactions
            .get_mut(&st.tr)
            .and_then(|t| t.handle.as_mut())
            .ok_or(FbError::TransactionInactive)?;

        st.affected = self.cli.execute(tr_h, h, &st.params)?;

        Ok(st.affected)
    }

    fn do_set_param(&mut self, id: StmtId, column: usize, value: SqlValue) -> Result<(), FbError> {
        let st = self.statements.get_mut(&id).ok_or(FbError::NotPrepared)?;

        if st.handle.is_none() {
            return Err(FbError::NotPrepared);
        }
        if column == 0 || column > st.param_count {
            return Err(FbError::ColumnIndex(column));
        }

        st.params[column - 1] = value;

        Ok(())
    }

    /// Whether the statement can keep streaming: connection attached,
    /// transaction running, cursor present
    fn stream_alive(&mut self, id: StmtId) -> bool {
        let tr = match self.statements.get(&id) {
            Some(st) if st.handle.is_some() => st.tr,
            _ => return false,
        };

        self.db_connected() && self.tr_active(tr)
    }

    fn fetch_one_row(&mut self, id: StmtId) -> Result<Option<Row>, FbError> {
        let st = self.statements.get_mut(&id).ok_or(FbError::NotPrepared)?;
        let h = st.handle.as_mut().ok_or(FbError::NotPrepared)?;

        let row = self.cli.fetch(h)?;

        Ok(row.map(|r| r.with_columns(st.columns.clone())))
    }

    fn do_start_fetch(&mut self, id: StmtId) {
        if let Some(st) = self.statements.get(&id) {
            // every stream starts with a clear cancel flag
            *st.stop_fetch.lock().unwrap() = false;
        }

        if !self.stream_alive(id) {
            self.emit_stmt(id, StatementEvent::FetchStarted);
            self.emit_stmt(id, StatementEvent::FetchFinished);
            return;
        }

        match self.fetch_one_row(id) {
            Ok(Some(row)) => {
                self.emit_stmt(id, StatementEvent::FetchStarted);
                self.emit_stmt(id, StatementEvent::Fetched(row));
                self.enqueue_fetch_next(id);
            }
            Ok(None) => {
                self.emit_stmt(id, StatementEvent::FetchStarted);
                self.emit_stmt(id, StatementEvent::FetchFinished);
            }
            Err(e) => {
                self.emit_stmt(id, StatementEvent::FetchStarted);
                self.emit_stmt(id, StatementEvent::Error(e.to_string()));
                self.emit_stmt(id, StatementEvent::FetchFinished);
            }
        }
    }

    /// One streamed row per loop turn. Re-enqueued at the queue tail so
    /// commits, closes and stop requests can interleave between rows.
    fn do_fetch_next(&mut self, id: StmtId) {
        let stopped = self
            .statements
            .get(&id)
            .map(|st| *st.stop_fetch.lock().unwrap())
            .unwrap_or(true);

        if stopped || !self.stream_alive(id) {
            self.emit_stmt(id, StatementEvent::FetchFinished);
            return;
        }

        match self.fetch_one_row(id) {
            Ok(Some(row)) => {
                self.emit_stmt(id, StatementEvent::Fetched(row));
                self.enqueue_fetch_next(id);
            }
            Ok(None) => self.emit_stmt(id, StatementEvent::FetchFinished),
            Err(e) => {
                self.emit_stmt(id, StatementEvent::Error(e.to_string()));
                self.emit_stmt(id, StatementEvent::FetchFinished);
            }
        }
    }

    fn do_fetch_one(&mut self, id: StmtId) -> Result<Option<Row>, FbError> {
        if !self.stream_alive(id) {
            return Ok(None);
        }

        self.fetch_one_row(id)
    }

    fn do_close_cursor(&mut self, id: StmtId) -> Result<(), FbError> {
        let st = self.statements.get_mut(&id).ok_or(FbError::NotPrepared)?;

        match st.handle.as_mut() {
            Some(h) => self.cli.free_statement(h, FreeStmtOp::Close),
            None => Ok(()),
        }
    }

    fn do_plan(&mut self, id: StmtId) -> Result<String, FbError> {
        let st = self.statements.get_mut(&id).ok_or(FbError::NotPrepared)?;
        let h = st.handle.as_mut().ok_or(FbError::NotPrepared)?;

        self.cli.statement_plan(h)
    }

    fn enqueue_fetch_next(&self, id: StmtId) {
        let _ = self.queue_tx.send(Command::FetchNext { stmt: id });
    }

    // ------------------------- completion -------------------------

    /// Resolve a connection command. The success event goes out first
    /// so it is already delivered when a blocked sync caller resumes;
    /// sync failures travel in the result slot only.
    fn finish_conn(
        &mut self,
        reply: Option<Reply<()>>,
        res: Result<(), FbError>,
        ok_event: ConnectionEvent,
    ) {
        match res {
            Ok(()) => {
                self.events.emit(Event::Connection(self.conn_id, ok_event));
                if let Some(tx) = reply {
                    let _ = tx.send(Ok(()));
                }
            }
            Err(e) => match reply {
                Some(tx) => {
                    let _ = tx.send(Err(e));
                }
                None => self.events.emit(Event::Connection(
                    self.conn_id,
                    ConnectionEvent::Error(e.to_string()),
                )),
            },
        }
    }

    fn finish_tr(
        &mut self,
        tr: TrId,
        reply: Option<Reply<()>>,
        res: Result<(), FbError>,
        ok_events: &[TransactionEvent],
    ) {
        match res {
            Ok(()) => {
                for ev in ok_events {
                    self.events.emit(Event::Transaction(tr, ev.clone()));
                }
                if let Some(tx) = reply {
                    let _ = tx.send(Ok(()));
                }
            }
            Err(e) => match reply {
                Some(tx) => {
                    let _ = tx.send(Err(e));
                }
                None => self
                    .events
                    .emit(Event::Transaction(tr, TransactionEvent::Error(e.to_string()))),
            },
        }
    }

    fn finish_stmt<T>(
        &mut self,
        stmt: StmtId,
        reply: Option<Reply<T>>,
        res: Result<T, FbError>,
        ok_event: impl FnOnce(&T) -> StatementEvent,
    ) {
        match res {
            Ok(value) => {
                self.emit_stmt(stmt, ok_event(&value));
                if let Some(tx) = reply {
                    let _ = tx.send(Ok(value));
                }
            }
            Err(e) => self.fail_stmt(stmt, reply, e),
        }
    }

    fn fail_stmt<T>(&mut self, stmt: StmtId, reply: Option<Reply<T>>, e: FbError) {
        match reply {
            Some(tx) => {
                let _ = tx.send(Err(e));
            }
            None => self.emit_stmt(stmt, StatementEvent::Error(e.to_string())),
        }
    }

    fn emit_stmt(&self, stmt: StmtId, ev: StatementEvent) {
        self.events.emit(Event::Statement(stmt, ev));
    }

    /// Final resource teardown when the loop exits
    fn cleanup(&mut self) {
        for st in self.statements.values_mut() {
            if let Some(mut h) = st.handle.take() {
                let _ = self.cli.free_statement(&mut h, FreeStmtOp::Drop);
            }
        }

        for tr in self.transactions.values_mut() {
            if let Some(mut h) = tr.handle.take() {
                if self.cli.is_active(&mut h) {
                    let _ = self.cli.transaction_operation(&mut h, TrOp::Rollback);
                }
            }
        }

        if let Some(mut db) = self.db.take() {
            let _ = self.cli.detach_database(&mut db);
        }
    }
}

/// Attachment failures surface under the connect-failed category
/// whatever the client reported
fn connect_failed(e: FbError) -> FbError {
    match e {
        FbError::ConnectFailed(_) => e,
        other => FbError::ConnectFailed(other.to_string()),
    }
}
