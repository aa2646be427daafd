//!
//! Asynchronous client for firebird-family databases
//!
//! Every connection runs one dedicated worker thread that owns the
//! synchronous client library and executes commands strictly in
//! request order. The foreground handles — [`Connection`],
//! [`Transaction`], [`Statement`] — are thin: they enqueue commands
//! and observe the outcome as typed events, or block on a completion
//! latch when the `_sync` variant of an operation is used.
//!
//! ```rust,no_run
//! use asyncfb::*;
//! use asyncfb_mock::MockDbClient;
//!
//! fn main() -> Result<(), FbError> {
//!     let conn = Connection::new(MockDbClient::new(), ConnParams::default())?;
//!     let events = conn.subscribe();
//!
//!     conn.open_sync()?;
//!
//!     let tr = conn.transaction()?;
//!     tr.start_sync()?;
//!
//!     let stmt = Statement::new(&tr, Some("SELECT id, name FROM t ORDER BY id"))?;
//!     stmt.execute_and_fetch()?;
//!
//!     while let Some(event) = events.recv() {
//!         match event {
//!             Event::Statement(_, StatementEvent::Fetched(row)) => {
//!                 println!("{} - {}", row.get(1)?.as_i32(), row.get(2)?.as_string());
//!             }
//!             Event::Statement(_, StatementEvent::FetchFinished) => break,
//!             _ => {}
//!         }
//!     }
//!
//!     tr.commit_sync()?;
//!     conn.close_sync()?;
//!
//!     Ok(())
//! }
//! ```

mod buffer;
mod command;
mod conn_string;
mod connection;
mod events;
mod queue;
mod statement;
mod transaction;
mod worker;

#[cfg(test)]
mod tests;

pub use asyncfb_core::*;

pub use crate::buffer::{Buffer, BufferEvent, BufferEventStream};
pub use crate::command::ConnInfoField;
pub use crate::conn_string::parse as parse_conn_string;
pub use crate::connection::Connection;
pub use crate::events::{
    ConnId, ConnectionEvent, Event, EventStream, StatementEvent, StmtId, TransactionEvent, TrId,
};
pub use crate::statement::{RowIter, Statement};
pub use crate::transaction::Transaction;
