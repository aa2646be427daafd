//! Typed event channels
//!
//! Each connection owns one hub. The worker pushes events into it and
//! the foreground observes them either through polled subscription
//! streams or through listeners invoked directly on the worker thread.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use asyncfb_core::Row;

/// Identity of a connection, unique in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(pub(crate) u32);

impl ConnId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        ConnId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity of a transaction, unique within its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrId(pub(crate) u32);

/// Identity of a statement, unique within its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub(crate) u32);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

impl std::fmt::Display for TrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tr#{}", self.0)
    }
}

impl std::fmt::Display for StmtId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stmt#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Opened,
    Closed,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransactionEvent {
    Started,
    Committed,
    RolledBack,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementEvent {
    Prepared,
    Executed { affected: usize },
    FetchStarted,
    Fetched(Row),
    FetchFinished,
    Error(String),
}

/// An event with the identity of the handle it originated from
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connection(ConnId, ConnectionEvent),
    Transaction(TrId, TransactionEvent),
    Statement(StmtId, StatementEvent),
}

/// Fan-out point for one event kind: any number of polled subscriber
/// channels plus listeners run inline at emit time
pub(crate) struct Hub<T> {
    subs: Mutex<Vec<flume::Sender<T>>>,
    listeners: Mutex<Vec<Box<dyn Fn(&T) + Send>>>,
}

impl<T> Default for Hub<T> {
    fn default() -> Self {
        Hub {
            subs: Mutex::new(vec![]),
            listeners: Mutex::new(vec![]),
        }
    }
}

impl<T: Clone> Hub<T> {
    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        self.subs.lock().unwrap().push(tx);
        rx
    }

    pub fn listen<F: Fn(&T) + Send + 'static>(&self, listener: F) {
        self.listeners.lock().unwrap().push(Box::new(listener));
    }

    /// Deliver to every receiver. Subscribers whose stream was dropped
    /// are pruned on the way.
    pub fn emit(&self, event: T) {
        for listener in self.listeners.lock().unwrap().iter() {
            listener(&event);
        }

        self.subs
            .lock()
            .unwrap()
            .retain(|sub| sub.send(event.clone()).is_ok());
    }
}

/// A polled stream of the events of one connection
pub struct EventStream {
    rx: flume::Receiver<Event>,
}

impl EventStream {
    pub(crate) fn new(rx: flume::Receiver<Event>) -> Self {
        EventStream { rx }
    }

    /// Next event, waiting for it if none is pending. `None` once the
    /// connection is gone.
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    /// Next event, waiting at most `timeout`
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}
