//! Streaming fetch: ordering, cancellation and interleaving

use std::time::{Duration, Instant};

use super::*;

fn id_column() -> Vec<ColumnMeta> {
    vec![ColumnMeta::new("ID", SqlType::Int)]
}

/// One million generated keys, 1-indexed
fn register_big_table(mock: &MockDbClient) {
    mock.on_query_gen("SELECT id FROM big", id_column(), 1_000_000, |i| {
        vec![SqlValue::from(i as i64 + 1)]
    });
}

#[test]
fn streamed_rows_arrive_ordered_and_complete() {
    let (mock, conn) = setup_open();
    mock.on_query_gen("SELECT id FROM seq", id_column(), 1000, |i| {
        vec![SqlValue::from(i as i64 + 1)]
    });

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, Some("SELECT id FROM seq")).unwrap();

    let events = conn.subscribe();
    stmt.execute_and_fetch().unwrap();

    assert_eq!(
        next_event(&events),
        Event::Statement(stmt.id(), StatementEvent::Executed { affected: 0 })
    );
    assert_eq!(
        next_event(&events),
        Event::Statement(stmt.id(), StatementEvent::FetchStarted)
    );

    let mut expected = 1i64;
    loop {
        match next_event(&events) {
            Event::Statement(id, StatementEvent::Fetched(row)) => {
                assert_eq!(id, stmt.id());
                // no duplicates and no gaps relative to the cursor
                assert_eq!(row.get(1).unwrap().as_i64(), expected);
                expected += 1;
            }
            Event::Statement(id, StatementEvent::FetchFinished) => {
                assert_eq!(id, stmt.id());
                break;
            }
            other => panic!("unexpected event mid-stream: {:?}", other),
        }
    }

    assert_eq!(expected, 1001);
    expect_quiet(&events);
}

#[test]
fn stop_fetching_is_observed_between_rows() {
    let (mock, conn) = setup_open();
    register_big_table(&mock);

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, Some("SELECT id FROM big")).unwrap();

    // the cancel request fires on the worker thread right after the
    // fifth row goes out, so the bound below is deterministic
    let stop_flag = stmt.stop_flag();
    let target = stmt.id();
    let seen = std::sync::atomic::AtomicU32::new(0);
    conn.on_event(move |ev| {
        if let Event::Statement(id, StatementEvent::Fetched(_)) = ev {
            if *id == target && seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1 == 5 {
                *stop_flag.lock().unwrap() = true;
            }
        }
    });

    let events = conn.subscribe();
    stmt.execute_and_fetch().unwrap();

    let started = Instant::now();
    let mut fetched = 0;
    loop {
        match next_event(&events) {
            Event::Statement(_, StatementEvent::Fetched(_)) => fetched += 1,
            Event::Statement(_, StatementEvent::FetchFinished) => break,
            Event::Statement(_, StatementEvent::Executed { .. })
            | Event::Statement(_, StatementEvent::FetchStarted) => {}
            other => panic!("unexpected event mid-stream: {:?}", other),
        }
    }

    // at most one extra row may slip out after the stop request
    assert!(fetched <= 6, "received {} rows after cancelling", fetched);
    assert!(fetched >= 5);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn commit_interleaves_with_a_running_stream() {
    let (mock, conn) = setup_open();
    register_big_table(&mock);

    let tr = conn
        .transaction_with(TransactionConfiguration::read_only())
        .unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, Some("SELECT id FROM big")).unwrap();

    let events = conn.subscribe();
    stmt.execute_and_fetch().unwrap();

    // wait for the stream to be running, then ask for the commit; it
    // lands at the queue tail and is served within one row
    loop {
        if let Event::Statement(_, StatementEvent::Fetched(_)) = next_event(&events) {
            break;
        }
    }
    tr.commit().unwrap();

    let mut committed = false;
    loop {
        match next_event(&events) {
            Event::Transaction(id, TransactionEvent::Committed) => {
                assert_eq!(id, tr.id());
                committed = true;
            }
            Event::Statement(_, StatementEvent::FetchFinished) => break,
            Event::Statement(_, StatementEvent::Fetched(_)) => {
                // rows may still stream until the commit is served
                assert!(!committed, "a row arrived after the commit");
            }
            other => panic!("unexpected event mid-stream: {:?}", other),
        }
    }

    assert!(committed);
    assert!(!tr.is_active().unwrap());
    expect_quiet(&events);
}

#[test]
fn fetch_on_a_finished_transaction_is_an_empty_stream() {
    let (mock, conn) = setup_open();
    mock.on_query("SELECT id FROM t", id_column(), vec![vec![SqlValue::Int(1)]]);

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, Some("SELECT id FROM t")).unwrap();
    stmt.execute_sync().unwrap();
    tr.commit_sync().unwrap();

    let events = conn.subscribe();
    stmt.fetch().unwrap();

    assert_eq!(
        next_event(&events),
        Event::Statement(stmt.id(), StatementEvent::FetchStarted)
    );
    assert_eq!(
        next_event(&events),
        Event::Statement(stmt.id(), StatementEvent::FetchFinished)
    );
    expect_quiet(&events);
}

#[test]
fn sync_fetch_after_commit_reports_the_cursor_end() {
    let (mock, conn) = setup_open();
    mock.on_query("SELECT id FROM t", id_column(), vec![vec![SqlValue::Int(1)]]);

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, Some("SELECT id FROM t")).unwrap();
    stmt.execute_sync().unwrap();
    tr.commit_sync().unwrap();

    let mut row = Row::empty();
    assert!(!stmt.fetch_row(&mut row).unwrap());
    assert!(row.is_empty());
}

#[test]
fn a_second_stream_can_follow_a_cancelled_one() {
    let (mock, conn) = setup_open();
    mock.on_query(
        "SELECT id FROM t",
        id_column(),
        vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
    );

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, Some("SELECT id FROM t")).unwrap();

    // cancel a stream before it begins: the flag is reset when the
    // next stream starts
    stmt.stop_fetching();

    let events = conn.subscribe();
    stmt.execute_and_fetch().unwrap();

    let mut rows = 0;
    loop {
        match next_event(&events) {
            Event::Statement(_, StatementEvent::Fetched(_)) => rows += 1,
            Event::Statement(_, StatementEvent::FetchFinished) => break,
            _ => {}
        }
    }

    assert_eq!(rows, 2);
}
