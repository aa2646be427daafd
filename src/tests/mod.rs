//! Crate tests and test utils

mod buffer;
mod connection;
mod fetch;

use std::time::Duration;

use asyncfb_mock::MockDbClient;

use crate::*;

pub(crate) const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A connection over a fresh scriptable client. The returned client
/// handle shares the script catalog and the execution journal.
pub(crate) fn setup() -> (MockDbClient, Connection) {
    let mock = MockDbClient::new();
    let conn = Connection::new(mock.clone(), ConnParams::default())
        .expect("error spawning the connection worker");

    (mock, conn)
}

/// Like [`setup`], with the connection already attached
pub(crate) fn setup_open() -> (MockDbClient, Connection) {
    let (mock, conn) = setup();
    conn.open_sync().expect("error opening the connection");

    (mock, conn)
}

/// Next event, failing the test when none arrives in time
pub(crate) fn next_event(events: &EventStream) -> Event {
    events
        .recv_timeout(EVENT_TIMEOUT)
        .expect("no event arrived within the timeout")
}

/// Next event, expected to be a fetched row of the given statement
pub(crate) fn expect_fetched(events: &EventStream, stmt: StmtId) -> Row {
    match next_event(events) {
        Event::Statement(id, StatementEvent::Fetched(row)) if id == stmt => row,
        other => panic!("expected a fetched row, got {:?}", other),
    }
}

/// Assert that no further event arrives within a settle window
pub(crate) fn expect_quiet(events: &EventStream) {
    assert_eq!(events.recv_timeout(Duration::from_millis(100)), None);
}
