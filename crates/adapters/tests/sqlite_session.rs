use std::sync::{Arc, Mutex};

use sqlgrid_adapters::sqlite::SqliteDriver;
use sqlgrid_core::driver::{DatabaseKind, Value};
use sqlgrid_core::events::Event;
use sqlgrid_core::session::{Session, SessionError};
use sqlgrid_core::table_model::{TableModel, FETCH_BATCH_SIZE};

fn sqlite_session() -> (Session, Arc<Mutex<Vec<Event>>>) {
    let mut session = Session::new(vec![Box::new(SqliteDriver)]);
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.subscribe(move |event| sink.lock().expect("event log poisoned").push(event.clone()));
    (session, events)
}

fn recording_model() -> (TableModel, Arc<Mutex<Vec<Event>>>) {
    let mut model = TableModel::new();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    model.subscribe(move |event| sink.lock().expect("event log poisoned").push(event.clone()));
    (model, events)
}

async fn run(model: &mut TableModel, session: &mut Session, sql: &str) {
    model
        .execute(session, sql)
        .await
        .unwrap_or_else(|error| panic!("`{sql}` should succeed: {error}"));
}

#[tokio::test(flavor = "current_thread")]
async fn create_table_then_query_sqlite_master() {
    let (mut session, session_events) = sqlite_session();
    session
        .connect(DatabaseKind::Sqlite, ":memory:")
        .await
        .expect("connect should succeed");
    assert!(session_events
        .lock()
        .expect("event log poisoned")
        .contains(&Event::Connected(":memory:".to_string())));

    let (mut model, model_events) = recording_model();
    run(&mut model, &mut session, "CREATE TABLE t(x)").await;
    assert_eq!(model.row_count(), 0);
    assert_eq!(model.column_count(), 0);
    assert!(model_events
        .lock()
        .expect("event log poisoned")
        .contains(&Event::Executed("Executed: CREATE TABLE t(x)".to_string())));

    run(
        &mut model,
        &mut session,
        "SELECT name FROM sqlite_master WHERE type='table'",
    )
    .await;
    assert_eq!(model.row_count(), 1);
    assert_eq!(model.column_count(), 1);
    assert_eq!(model.header(0), Some("name"));
    assert_eq!(model.cell(0, 0), Some(&Value::Text("t".to_string())));
}

#[tokio::test(flavor = "current_thread")]
async fn zero_row_select_keeps_headers_and_disables_fetch() {
    let (mut session, _events) = sqlite_session();
    session
        .connect(DatabaseKind::Sqlite, ":memory:")
        .await
        .expect("connect should succeed");

    let (mut model, model_events) = recording_model();
    run(&mut model, &mut session, "SELECT 1 WHERE 0").await;

    assert_eq!(model.row_count(), 0);
    assert_eq!(model.column_count(), 1);
    assert_eq!(model.header(0), Some("1"));
    assert!(model_events
        .lock()
        .expect("event log poisoned")
        .contains(&Event::FetchAvailable(false)));
}

#[tokio::test(flavor = "current_thread")]
async fn batch_boundary_signals_availability_then_exhaustion() {
    let (mut session, _events) = sqlite_session();
    session
        .connect(DatabaseKind::Sqlite, ":memory:")
        .await
        .expect("connect should succeed");

    let (mut model, model_events) = recording_model();
    // One peeked row plus exactly one full batch.
    let total = 1 + FETCH_BATCH_SIZE;
    run(
        &mut model,
        &mut session,
        &format!(
            "WITH RECURSIVE numbers(n) AS (\
             SELECT 1 UNION ALL SELECT n + 1 FROM numbers WHERE n < {total}\
             ) SELECT n FROM numbers"
        ),
    )
    .await;

    assert_eq!(model.row_count(), total);
    assert!(model_events
        .lock()
        .expect("event log poisoned")
        .contains(&Event::FetchAvailable(true)));

    model_events.lock().expect("event log poisoned").clear();
    model
        .fetch_more(&mut session)
        .await
        .expect("fetch_more should succeed");
    assert_eq!(model.row_count(), total);
    assert_eq!(
        *model_events.lock().expect("event log poisoned"),
        vec![Event::FetchAvailable(false)]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn repeated_fetches_drain_large_result_sets() {
    let (mut session, _events) = sqlite_session();
    session
        .connect(DatabaseKind::Sqlite, ":memory:")
        .await
        .expect("connect should succeed");

    let (mut model, _model_events) = recording_model();
    let total = 2 * FETCH_BATCH_SIZE + 17;
    run(
        &mut model,
        &mut session,
        &format!(
            "WITH RECURSIVE numbers(n) AS (\
             SELECT 1 UNION ALL SELECT n + 1 FROM numbers WHERE n < {total}\
             ) SELECT n FROM numbers"
        ),
    )
    .await;

    while model.row_count() < total {
        let before = model.row_count();
        model
            .fetch_more(&mut session)
            .await
            .expect("fetch_more should succeed");
        assert!(model.row_count() > before, "fetch made no progress");
    }
    assert_eq!(model.row_count(), total);
    assert_eq!(
        model.cell(total - 1, 0),
        Some(&Value::Integer(i64::try_from(total).expect("total fits i64")))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn connect_then_disconnect_twice_returns_to_initial_state() {
    let (mut session, events) = sqlite_session();

    session
        .connect(DatabaseKind::Sqlite, ":memory:")
        .await
        .expect("connect should succeed");
    session.disconnect().await.expect("disconnect should succeed");
    session
        .disconnect()
        .await
        .expect("second disconnect should stay a no-op");

    assert!(!session.is_connected());
    let disconnects = events
        .lock()
        .expect("event log poisoned")
        .iter()
        .filter(|event| matches!(event, Event::Disconnected))
        .count();
    // One implicit from connect, two explicit.
    assert_eq!(disconnects, 3);
}

#[tokio::test(flavor = "current_thread")]
async fn reconnecting_with_the_same_url_notifies_twice_and_stays_usable() {
    let (mut session, events) = sqlite_session();

    for _ in 0..2 {
        session
            .connect(DatabaseKind::Sqlite, ":memory:")
            .await
            .expect("connect should succeed");
    }
    let connected = events
        .lock()
        .expect("event log poisoned")
        .iter()
        .filter(|event| matches!(event, Event::Connected(_)))
        .count();
    assert_eq!(connected, 2);

    let (mut model, _model_events) = recording_model();
    run(&mut model, &mut session, "SELECT 42").await;
    assert_eq!(model.cell(0, 0), Some(&Value::Integer(42)));
}

#[tokio::test(flavor = "current_thread")]
async fn nonexistent_path_fails_with_file_not_found() {
    let (mut session, _events) = sqlite_session();

    let err = session
        .connect(DatabaseKind::Sqlite, "/nonexistent/path.db")
        .await
        .expect_err("connect should fail");
    assert!(err
        .to_string()
        .contains("/nonexistent/path.db is not found or is unaccessible"));
    assert!(!session.is_connected());
    assert_eq!(session.attempted_url(), Some("/nonexistent/path.db"));
    assert_eq!(session.url(), None);
}

#[tokio::test(flavor = "current_thread")]
async fn malformed_sql_fails_without_poisoning_the_session() {
    let (mut session, _events) = sqlite_session();
    session
        .connect(DatabaseKind::Sqlite, ":memory:")
        .await
        .expect("connect should succeed");

    let (mut model, _model_events) = recording_model();
    let err = model
        .execute(&mut session, "SELEC 1")
        .await
        .expect_err("malformed sql should fail");
    assert!(matches!(err, SessionError::Driver(_)));

    run(&mut model, &mut session, "SELECT 1").await;
    assert_eq!(model.row_count(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn commit_persists_and_rollback_discards() {
    let temp_dir = tempfile::TempDir::new().expect("failed to create temp directory");
    let path = temp_dir.path().join("data.db");
    rusqlite::Connection::open(&path)
        .expect("failed to create database file")
        .execute_batch("CREATE TABLE t(x)")
        .expect("failed to seed database");
    let url = path.to_str().expect("path should be utf-8").to_string();

    let (mut session, _events) = sqlite_session();
    session
        .connect(DatabaseKind::Sqlite, &url)
        .await
        .expect("connect should succeed");

    let (mut model, _model_events) = recording_model();
    run(&mut model, &mut session, "BEGIN").await;
    run(&mut model, &mut session, "INSERT INTO t VALUES (1)").await;
    session.commit().await.expect("commit should succeed");

    run(&mut model, &mut session, "BEGIN").await;
    run(&mut model, &mut session, "INSERT INTO t VALUES (2)").await;
    session.rollback().await.expect("rollback should succeed");

    run(&mut model, &mut session, "SELECT COUNT(*) FROM t").await;
    assert_eq!(model.cell(0, 0), Some(&Value::Integer(1)));
}
