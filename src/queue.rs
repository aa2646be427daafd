//! The command queue between the foreground handles and the worker

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError};
use log::warn;

use asyncfb_core::FbError;

use crate::command::{Command, Reply};

/// Default completion wait for open, close, transaction and execution
/// commands
pub(crate) const OP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default completion wait for metadata lookups
pub(crate) const INFO_TIMEOUT: Duration = Duration::from_secs(1);

/// How long teardown waits for the worker to stop
pub(crate) const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Producer half of a connection's command queue.
///
/// After `close`, user pushes fail; the worker keeps draining what was
/// already queued.
#[derive(Clone)]
pub(crate) struct CommandQueue {
    tx: flume::Sender<Command>,
    closed: Arc<AtomicBool>,
}

impl CommandQueue {
    pub fn new() -> (Self, Receiver<Command>) {
        let (tx, rx) = flume::unbounded();

        (
            CommandQueue {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    pub fn push(&self, cmd: Command) -> Result<(), FbError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(FbError::QueueClosed);
        }

        self.tx.send(cmd).map_err(|_| FbError::Terminated)
    }

    /// Pushes from the engine itself ignore the closed flag, so
    /// teardown can still reach the worker
    pub fn push_internal(&self, cmd: Command) -> Result<(), FbError> {
        self.tx.send(cmd).map_err(|_| FbError::Terminated)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// A sender for the worker, used to re-enqueue fetch-next at the
    /// queue tail
    pub fn worker_sender(&self) -> flume::Sender<Command> {
        self.tx.clone()
    }
}

/// Make the latch and result slot of one synchronous command
pub(crate) fn reply<T>() -> (Reply<T>, Receiver<Result<T, FbError>>) {
    flume::bounded(1)
}

/// Await a synchronous command.
///
/// A timeout is treated as a suspected deadlock: it is logged, the
/// call returns the zero value and the command is left to complete on
/// the worker with its result ignored.
pub(crate) fn wait<T: Default>(
    rx: Receiver<Result<T, FbError>>,
    timeout: Duration,
    what: &str,
) -> Result<T, FbError> {
    match rx.recv_timeout(timeout) {
        Ok(res) => res,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "deadlock suspected: {} did not complete within {:?}",
                what, timeout
            );
            Ok(T::default())
        }
        Err(RecvTimeoutError::Disconnected) => Err(FbError::Terminated),
    }
}
