//! Row buffer: streaming population, lazy materialisation, events

use rand::Rng;

use super::*;

fn wait_stream_end(events: &EventStream, stmt: StmtId) {
    loop {
        if let Event::Statement(id, StatementEvent::FetchFinished) = next_event(events) {
            if id == stmt {
                return;
            }
        }
    }
}

#[test]
fn single_statement_rows_arrive_complete() {
    let (mock, conn) = setup_open();
    mock.on_query(
        "SELECT id, name FROM t",
        vec![
            ColumnMeta::new("ID", SqlType::Int),
            ColumnMeta::new("NAME", SqlType::String),
        ],
        vec![
            vec![SqlValue::Int(1), SqlValue::Text("a".to_string())],
            vec![SqlValue::Int(2), SqlValue::Text("b".to_string())],
            vec![SqlValue::Int(3), SqlValue::Text("c".to_string())],
        ],
    );

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, None).unwrap();

    let buffer = Buffer::new(&stmt);
    let buffer_events = buffer.subscribe();
    let events = conn.subscribe();

    stmt.prepare_sync("SELECT id, name FROM t").unwrap();
    assert_eq!(buffer_events.recv_timeout(EVENT_TIMEOUT), Some(BufferEvent::ColumnsChanged));
    assert_eq!(buffer.column_count(), 2);

    stmt.execute_and_fetch().unwrap();
    wait_stream_end(&events, stmt.id());

    assert_eq!(buffer.count(), 3);
    for _ in 0..3 {
        assert_eq!(
            buffer_events.recv_timeout(EVENT_TIMEOUT),
            Some(BufferEvent::RowAppended)
        );
    }

    // every row is complete, no materialisation happens on access
    let row = buffer.get(1).unwrap();
    assert_eq!(row.get(1).unwrap().as_i32(), 2);
    assert_eq!(row.get_by_name("name").unwrap().as_string(), "b");
    assert_eq!(buffer_events.try_recv(), None);
}

#[test]
fn lazy_buffer_materialises_on_access() {
    let (mock, conn) = setup_open();

    let total = 1000usize;
    mock.on_query_gen(
        "SELECT id FROM t ORDER BY id",
        vec![ColumnMeta::new("ID", SqlType::Int)],
        total,
        |i| vec![SqlValue::from(i as i64 + 1)],
    );
    mock.on_lookup(
        "SELECT id, name FROM t WHERE id = ?",
        vec![
            ColumnMeta::new("ID", SqlType::Int),
            ColumnMeta::new("NAME", SqlType::String),
        ],
        |keys| {
            let id = keys[0].as_i64();
            vec![vec![
                SqlValue::from(id),
                SqlValue::from(format!("name {}", id)),
            ]]
        },
    );

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();

    let primary = Statement::new(&tr, Some("SELECT id FROM t ORDER BY id")).unwrap();
    let data = Statement::new(&tr, Some("SELECT id, name FROM t WHERE id = ?")).unwrap();

    let buffer = Buffer::with_lookup(&primary, &data);
    let buffer_events = buffer.subscribe();
    let events = conn.subscribe();

    primary.execute_and_fetch().unwrap();
    wait_stream_end(&events, primary.id());

    assert_eq!(buffer.count(), total);

    // index 500 holds the 501st key
    let row = buffer.get(500).unwrap();
    assert_eq!(row.get(1).unwrap().as_i64(), 501);
    assert_eq!(row.get(2).unwrap().as_string(), "name 501");

    let mut saw_fetch = false;
    while let Some(ev) = buffer_events.try_recv() {
        if let BufferEvent::RowFetched(fetched) = ev {
            assert_eq!(fetched.get(1).unwrap().as_i64(), 501);
            saw_fetch = true;
        }
    }
    assert!(saw_fetch);

    // a second read is served from the cache
    let lookups = mock.executed_count("SELECT id, name FROM t WHERE id = ?");
    buffer.get(500).unwrap();
    assert_eq!(
        mock.executed_count("SELECT id, name FROM t WHERE id = ?"),
        lookups
    );
}

#[test]
fn concurrent_reads_do_not_deadlock() {
    let (mock, conn) = setup_open();

    let total = 200usize;
    mock.on_query_gen(
        "SELECT id FROM t ORDER BY id",
        vec![ColumnMeta::new("ID", SqlType::Int)],
        total,
        |i| vec![SqlValue::from(i as i64 + 1)],
    );
    mock.on_lookup(
        "SELECT id, name FROM t WHERE id = ?",
        vec![
            ColumnMeta::new("ID", SqlType::Int),
            ColumnMeta::new("NAME", SqlType::String),
        ],
        |keys| {
            let id = keys[0].as_i64();
            vec![vec![
                SqlValue::from(id),
                SqlValue::from(format!("name {}", id)),
            ]]
        },
    );

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();

    let primary = Statement::new(&tr, Some("SELECT id FROM t ORDER BY id")).unwrap();
    let data = Statement::new(&tr, Some("SELECT id, name FROM t WHERE id = ?")).unwrap();

    let buffer = Buffer::with_lookup(&primary, &data);
    let events = conn.subscribe();

    primary.execute_and_fetch().unwrap();
    wait_stream_end(&events, primary.id());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let mut rng = rand::thread_rng();

                for _ in 0..50 {
                    let index = rng.gen_range(0..total);
                    let row = buffer.get(index).unwrap();
                    assert_eq!(row.get(1).unwrap().as_i64(), index as i64 + 1);
                }
            });
        }
    });

    // a read never surfaces a bare key placeholder
    for index in 0..total {
        assert_eq!(buffer.get(index).unwrap().column_count(), 2);
    }
}

#[test]
fn user_rows_suppress_materialisation() {
    let (mock, conn) = setup_open();
    mock.on_query(
        "SELECT id FROM t ORDER BY id",
        vec![ColumnMeta::new("ID", SqlType::Int)],
        vec![vec![SqlValue::Int(1)], vec![SqlValue::Int(2)]],
    );
    mock.on_lookup(
        "SELECT id, name FROM t WHERE id = ?",
        vec![
            ColumnMeta::new("ID", SqlType::Int),
            ColumnMeta::new("NAME", SqlType::String),
        ],
        |keys| vec![vec![keys[0].clone(), SqlValue::from("from the server")]],
    );

    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();

    let primary = Statement::new(&tr, Some("SELECT id FROM t ORDER BY id")).unwrap();
    let data = Statement::new(&tr, Some("SELECT id, name FROM t WHERE id = ?")).unwrap();

    let buffer = Buffer::with_lookup(&primary, &data);
    let events = conn.subscribe();

    primary.execute_and_fetch().unwrap();
    wait_stream_end(&events, primary.id());

    buffer
        .set(
            0,
            Row::new(vec![SqlValue::Int(1), SqlValue::from("edited locally")]),
        )
        .unwrap();

    let row = buffer.get(0).unwrap();
    assert_eq!(row.get(2).unwrap().as_string(), "edited locally");
    assert_eq!(
        mock.executed_count("SELECT id, name FROM t WHERE id = ?"),
        0
    );
}

#[test]
fn append_delete_and_clear_report_events() {
    let (_mock, conn) = setup_open();
    let tr = conn.transaction().unwrap();
    tr.start_sync().unwrap();
    let stmt = Statement::new(&tr, None).unwrap();

    let buffer = Buffer::new(&stmt);
    let buffer_events = buffer.subscribe();

    buffer.append(Row::new(vec![SqlValue::Int(1)]));
    buffer.append(Row::new(vec![SqlValue::Int(2)]));
    assert_eq!(buffer.count(), 2);
    assert_eq!(
        buffer_events.recv_timeout(EVENT_TIMEOUT),
        Some(BufferEvent::RowAppended)
    );
    assert_eq!(
        buffer_events.recv_timeout(EVENT_TIMEOUT),
        Some(BufferEvent::RowAppended)
    );

    buffer.delete_at(0).unwrap();
    assert_eq!(buffer.count(), 1);
    assert_eq!(buffer.get(0).unwrap().get(1).unwrap().as_i32(), 2);
    assert_eq!(
        buffer_events.recv_timeout(EVENT_TIMEOUT),
        Some(BufferEvent::RowDeleted)
    );

    assert!(buffer.delete_at(5).is_err());
    assert!(buffer.get(7).is_err());

    buffer.clear();
    assert_eq!(buffer.count(), 0);
    assert_eq!(
        buffer_events.recv_timeout(EVENT_TIMEOUT),
        Some(BufferEvent::Cleared)
    );
}
