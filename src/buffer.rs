//
// asyncfb - asynchronous firebird-family client
//
// Thread-safe row buffer with lazy materialisation
//

use std::sync::{Arc, Mutex};
use std::time::Duration;

use asyncfb_core::{FbError, Row};

use crate::events::{Event, Hub, StatementEvent};
use crate::statement::Statement;

/// What the buffer reports on its own channel
#[derive(Debug, Clone, PartialEq)]
pub enum BufferEvent {
    Cleared,
    RowAppended,
    RowDeleted,
    ColumnsChanged,
    /// A placeholder row was materialised on demand
    RowFetched(Row),
}

struct BufferRow {
    materialised: bool,
    row: Row,
}

struct BufferInner {
    rows: Vec<BufferRow>,
    column_count: usize,
}

/// A polled stream of buffer events
pub struct BufferEventStream {
    rx: flume::Receiver<BufferEvent>,
}

impl BufferEventStream {
    pub fn recv(&self) -> Option<BufferEvent> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<BufferEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<BufferEvent> {
        self.rx.try_recv().ok()
    }
}

/// An ordered, mutex-protected cache of the rows one statement
/// streams.
///
/// In single-statement mode every `Fetched` row of the statement is
/// appended complete. In dual-statement mode the first statement
/// streams only key columns and each row is appended as a placeholder;
/// the full record is looked up through the second, parameterised
/// statement the first time the row is read. A grid over a huge table
/// can this way show every key without ever loading the records that
/// are never scrolled into view.
pub struct Buffer<'c> {
    inner: Arc<Mutex<BufferInner>>,
    events: Arc<Hub<BufferEvent>>,
    /// Serialises lookups on the data statement
    fetch_lock: Mutex<()>,
    primary: Statement<'c>,
    data: Option<Statement<'c>>,
}

impl<'c> Buffer<'c> {
    /// Single-statement mode: every row the statement streams arrives
    /// complete
    pub fn new(stmt: &Statement<'c>) -> Buffer<'c> {
        Self::build(stmt.clone(), None)
    }

    /// Dual-statement mode: `primary` streams the key columns,
    /// `data` is a prepared lookup with one parameter marker per key
    /// column
    pub fn with_lookup(primary: &Statement<'c>, data: &Statement<'c>) -> Buffer<'c> {
        Self::build(primary.clone(), Some(data.clone()))
    }

    fn build(primary: Statement<'c>, data: Option<Statement<'c>>) -> Buffer<'c> {
        let inner = Arc::new(Mutex::new(BufferInner {
            rows: vec![],
            column_count: 0,
        }));
        let events: Arc<Hub<BufferEvent>> = Arc::new(Hub::default());

        let materialised = data.is_none();
        let primary_id = primary.id();
        // column shape follows the statement that supplies full rows
        let shape = data.as_ref().unwrap_or(&primary);
        let shape_id = shape.id();
        let shape_meta = shape.shared_meta();

        let rows = inner.clone();
        let out = events.clone();
        primary.connection().on_event(move |ev| match ev {
            Event::Statement(id, StatementEvent::Fetched(row)) if *id == primary_id => {
                rows.lock().unwrap().rows.push(BufferRow {
                    materialised,
                    row: row.clone(),
                });
                out.emit(BufferEvent::RowAppended);
            }
            Event::Statement(id, StatementEvent::Prepared) if *id == shape_id => {
                // the metadata cache is warm by the time the event is out
                let count = shape_meta
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(|c| c.len())
                    .unwrap_or(0);

                let changed = {
                    let mut inner = rows.lock().unwrap();
                    let changed = inner.column_count != count;
                    inner.column_count = count;
                    changed
                };

                if changed {
                    out.emit(BufferEvent::ColumnsChanged);
                }
            }
            _ => {}
        });

        Buffer {
            inner,
            events,
            fetch_lock: Mutex::new(()),
            primary,
            data,
        }
    }

    /// A polled stream of this buffer's events
    pub fn subscribe(&self) -> BufferEventStream {
        BufferEventStream {
            rx: self.events.subscribe(),
        }
    }

    /// Kick off the streaming fetch on the primary statement
    pub fn start_fetch(&self) -> Result<(), FbError> {
        self.primary.fetch()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.inner.lock().unwrap().column_count
    }

    /// Append a complete row
    pub fn append(&self, row: Row) {
        self.inner.lock().unwrap().rows.push(BufferRow {
            materialised: true,
            row,
        });
        self.events.emit(BufferEvent::RowAppended);
    }

    /// Replace the 0-indexed row with a caller-provided one. The row
    /// counts as materialised from here on.
    pub fn set(&self, index: usize, row: Row) -> Result<(), FbError> {
        let mut inner = self.inner.lock().unwrap();
        let entry = inner
            .rows
            .get_mut(index)
            .ok_or_else(|| row_out_of_range(index))?;

        entry.row = row;
        entry.materialised = true;

        Ok(())
    }

    /// Remove the 0-indexed row
    pub fn delete_at(&self, index: usize) -> Result<(), FbError> {
        {
            let mut inner = self.inner.lock().unwrap();
            if index >= inner.rows.len() {
                return Err(row_out_of_range(index));
            }
            inner.rows.remove(index);
        }

        self.events.emit(BufferEvent::RowDeleted);

        Ok(())
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().rows.clear();
        self.events.emit(BufferEvent::Cleared);
    }

    /// The 0-indexed row, materialising it through the data statement
    /// if only its keys are known yet. May block while the lookup runs
    /// on the worker; the row mutex is not held meanwhile, so reads of
    /// other rows proceed.
    pub fn get(&self, index: usize) -> Result<Row, FbError> {
        {
            let inner = self.inner.lock().unwrap();
            let entry = inner
                .rows
                .get(index)
                .ok_or_else(|| row_out_of_range(index))?;

            if entry.materialised {
                return Ok(entry.row.clone());
            }
        }

        self.materialise(index)
    }

    fn materialise(&self, index: usize) -> Result<Row, FbError> {
        let data = self
            .data
            .as_ref()
            .ok_or_else(|| FbError::from("the buffer has no data statement to fetch with"))?;

        let _guard = self.fetch_lock.lock().unwrap();

        // a concurrent get may have won the race for this row
        let keys = {
            let inner = self.inner.lock().unwrap();
            let entry = inner
                .rows
                .get(index)
                .ok_or_else(|| row_out_of_range(index))?;

            if entry.materialised {
                return Ok(entry.row.clone());
            }

            entry.row.values().to_vec()
        };

        data.execute_with_sync(None, Some(keys))?;

        let mut row = Row::empty();
        if !data.fetch_row(&mut row)? {
            return Err(FbError::Other(format!(
                "the data statement returned no row for index {}",
                index
            )));
        }

        let row = {
            let mut inner = self.inner.lock().unwrap();
            match inner.rows.get_mut(index) {
                Some(entry) if !entry.materialised => {
                    entry.row = row;
                    entry.materialised = true;
                    entry.row.clone()
                }
                // deleted or user-set while the lookup ran
                Some(entry) => entry.row.clone(),
                None => row,
            }
        };

        self.events.emit(BufferEvent::RowFetched(row.clone()));

        Ok(row)
    }
}

fn row_out_of_range(index: usize) -> FbError {
    FbError::Other(format!("row {} is out of range", index))
}
