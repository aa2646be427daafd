//! Connection lifecycle, info and event ordering

use std::time::Duration;

use super::*;

#[test]
fn open_and_close_report_events() {
    let (_mock, conn) = setup();
    let events = conn.subscribe();

    conn.open().unwrap();
    assert_eq!(
        next_event(&events),
        Event::Connection(conn.id(), ConnectionEvent::Opened)
    );
    assert!(conn.is_open().unwrap());

    conn.close().unwrap();
    assert_eq!(
        next_event(&events),
        Event::Connection(conn.id(), ConnectionEvent::Closed)
    );
    assert!(!conn.is_open().unwrap());
}

#[test]
fn sync_open_also_reports_the_event() {
    let (_mock, conn) = setup();
    let events = conn.subscribe();

    conn.open_sync().unwrap();

    assert!(conn.is_open().unwrap());
    assert_eq!(
        next_event(&events),
        Event::Connection(conn.id(), ConnectionEvent::Opened)
    );
}

#[test]
fn commands_complete_in_request_order() {
    let (_mock, conn) = setup();
    let events = conn.subscribe();

    conn.open().unwrap();
    conn.close().unwrap();
    conn.open().unwrap();
    conn.close().unwrap();

    let expected = [
        ConnectionEvent::Opened,
        ConnectionEvent::Closed,
        ConnectionEvent::Opened,
        ConnectionEvent::Closed,
    ];
    for ev in expected {
        assert_eq!(next_event(&events), Event::Connection(conn.id(), ev));
    }

    // every command produced exactly one notification
    expect_quiet(&events);
}

#[test]
fn closing_a_closed_connection_is_quiet() {
    let (_mock, conn) = setup();
    let events = conn.subscribe();

    conn.close_sync().unwrap();
    conn.close().unwrap();

    expect_quiet(&events);
}

#[test]
fn failed_open_reports_the_error() {
    let (mock, conn) = setup();
    mock.fail_connect("refused by the server");

    let events = conn.subscribe();

    // the async form turns into an error event
    conn.open().unwrap();
    match next_event(&events) {
        Event::Connection(id, ConnectionEvent::Error(msg)) => {
            assert_eq!(id, conn.id());
            assert!(msg.contains("refused by the server"), "got: {}", msg);
        }
        other => panic!("expected an error event, got {:?}", other),
    }

    // the sync form returns the error instead of reporting it twice
    let res = conn.open_sync();
    assert_eq!(
        res,
        Err(FbError::ConnectFailed("refused by the server".to_string()))
    );
    expect_quiet(&events);
}

#[test]
fn info_answers_the_stored_parameters() {
    let mock = MockDbClient::new();

    let mut params = ConnParams::default();
    params
        .server("db.example.com")
        .db_path("/srv/db/app.fdb")
        .user("APP")
        .pass("secret")
        .charset("UTF8")
        .role("READER")
        .create_params("PAGE_SIZE 8192");

    let conn = Connection::new(mock, params).unwrap();

    assert_eq!(conn.server().unwrap(), "db.example.com");
    assert_eq!(conn.db_path().unwrap(), "/srv/db/app.fdb");
    assert_eq!(conn.user().unwrap(), "APP");
    assert_eq!(conn.password().unwrap(), "secret");
    assert_eq!(conn.charset().unwrap(), "UTF8");
    assert_eq!(conn.role().unwrap(), "READER");
    assert_eq!(conn.create_params().unwrap(), "PAGE_SIZE 8192");
}

#[test]
fn connected_users_come_from_the_server() {
    let (mock, conn) = setup();
    mock.users(vec!["SYSDBA".to_string(), "APP".to_string()]);

    conn.open_sync().unwrap();

    assert_eq!(
        conn.connected_users().unwrap(),
        vec!["SYSDBA".to_string(), "APP".to_string()]
    );
}

#[test]
fn create_attaches_and_drop_detaches() {
    let (mock, conn) = setup();
    let events = conn.subscribe();

    conn.create_sync(Dialect::D3).unwrap();
    assert_eq!(
        next_event(&events),
        Event::Connection(conn.id(), ConnectionEvent::Opened)
    );
    assert!(conn.is_open().unwrap());

    conn.drop_database_sync().unwrap();
    assert_eq!(
        next_event(&events),
        Event::Connection(conn.id(), ConnectionEvent::Closed)
    );
    assert!(!conn.is_open().unwrap());
    assert!(mock.was_dropped());
}

#[test]
fn timed_out_sync_call_proceeds_server_side() {
    let (mock, conn) = setup();
    mock.attach_latency(Duration::from_millis(300));

    let events = conn.subscribe();

    // the latch expires, the call returns the zero value and the
    // command still completes on the worker
    conn.open_sync_timeout(Duration::from_millis(30)).unwrap();

    assert_eq!(
        next_event(&events),
        Event::Connection(conn.id(), ConnectionEvent::Opened)
    );
    assert!(conn.is_open().unwrap());
}

#[test]
fn event_stream_ends_with_the_connection() {
    let (_mock, conn) = setup();
    conn.open_sync().unwrap();

    let events = conn.subscribe();
    drop(conn);

    // the stream ends once the worker is gone
    assert_eq!(events.recv(), None);
}
