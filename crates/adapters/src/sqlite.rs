use std::path::Path;
use std::sync::mpsc;

use async_trait::async_trait;
use sqlgrid_core::driver::{
    Connection, Cursor, DatabaseKind, Driver, DriverError, Row, Value,
};
use tokio::sync::oneshot;

/// SQLite driver backed by rusqlite.
///
/// `rusqlite::Rows` borrows its `Statement`, which borrows the
/// `Connection`, so a lazily-batched cursor cannot be stored in a struct
/// without self-reference. Instead a dedicated worker thread owns the
/// connection and keeps the live statement on its stack between fetch
/// requests; the async side talks to it over a request channel with
/// oneshot replies.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Sqlite
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError> {
        let target = verify_target(connection_string)?;
        let connection = match &target {
            Target::Memory => rusqlite::Connection::open_in_memory(),
            Target::File(path) => rusqlite::Connection::open(path),
        }
        .map_err(to_connect_error)?;

        let (requests, receiver) = mpsc::channel();
        std::thread::Builder::new()
            .name("sqlite-worker".to_string())
            .spawn(move || run_worker(&connection, &receiver))
            .map_err(|error| DriverError::Connect(error.to_string()))?;

        Ok(Box::new(SqliteConnection { requests }))
    }
}

enum Target {
    Memory,
    File(String),
}

/// Two target forms are accepted: the literal `:memory:` marker or a path
/// to an existing, accessible file.
fn verify_target(connection_string: &str) -> Result<Target, DriverError> {
    if connection_string == ":memory:" {
        return Ok(Target::Memory);
    }
    if Path::new(connection_string).is_file() {
        return Ok(Target::File(connection_string.to_string()));
    }
    Err(DriverError::FileNotFound {
        path: connection_string.to_string(),
    })
}

/// Cursor handle state shared with the worker: each opened statement gets a
/// generation number, and fetches against an older generation are rejected
/// instead of being served from the wrong statement.
enum Request {
    Execute {
        sql: String,
        reply: oneshot::Sender<Result<OpenedCursor, DriverError>>,
    },
    Fetch {
        generation: u64,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<Row>, DriverError>>,
    },
    Commit {
        reply: oneshot::Sender<Result<(), DriverError>>,
    },
    Rollback {
        reply: oneshot::Sender<Result<(), DriverError>>,
    },
    Close {
        reply: oneshot::Sender<Result<(), DriverError>>,
    },
}

struct OpenedCursor {
    headers: Option<Vec<String>>,
    generation: u64,
}

fn run_worker(connection: &rusqlite::Connection, requests: &mpsc::Receiver<Request>) {
    let mut pending = None;
    let mut generation = 0_u64;
    loop {
        let request = match pending.take() {
            Some(request) => request,
            None => match requests.recv() {
                Ok(request) => request,
                // All senders are gone; the connection closes on drop.
                Err(_) => break,
            },
        };
        match request {
            Request::Execute { sql, reply } => {
                generation += 1;
                pending = serve_cursor(connection, &sql, generation, reply, requests);
            }
            Request::Fetch { reply, .. } => {
                // The statement behind this cursor was finalized by a
                // later request.
                let _ = reply.send(Err(cursor_closed()));
            }
            Request::Commit { reply } => {
                let _ = reply.send(end_transaction(connection, "COMMIT"));
            }
            Request::Rollback { reply } => {
                let _ = reply.send(end_transaction(connection, "ROLLBACK"));
            }
            Request::Close { reply } => {
                let _ = reply.send(Ok(()));
                break;
            }
        }
    }
}

/// Prepares `sql`, replies with the column metadata, then serves fetch
/// requests from the open statement until a non-fetch request arrives.
/// That request is handed back so the statement is finalized before it
/// runs, which is also what invalidates a superseded cursor engine-side.
fn serve_cursor(
    connection: &rusqlite::Connection,
    sql: &str,
    generation: u64,
    reply: oneshot::Sender<Result<OpenedCursor, DriverError>>,
    requests: &mpsc::Receiver<Request>,
) -> Option<Request> {
    let mut statement = match connection.prepare(sql) {
        Ok(statement) => statement,
        Err(error) => {
            let _ = reply.send(Err(to_query_error(error)));
            return None;
        }
    };

    let column_count = statement.column_count();
    let headers = if column_count > 0 {
        Some(
            statement
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let mut rows = match statement.query([]) {
        Ok(rows) => rows,
        Err(error) => {
            let _ = reply.send(Err(to_query_error(error)));
            return None;
        }
    };
    let _ = reply.send(Ok(OpenedCursor { headers, generation }));

    loop {
        match requests.recv() {
            Ok(Request::Fetch {
                generation: requested,
                limit,
                reply,
            }) => {
                let _ = reply.send(if requested == generation {
                    fetch_batch(&mut rows, column_count, limit)
                } else {
                    Err(cursor_closed())
                });
            }
            Ok(other) => return Some(other),
            Err(_) => return None,
        }
    }
}

fn cursor_closed() -> DriverError {
    DriverError::Query("cursor is no longer open".to_string())
}

fn fetch_batch(
    rows: &mut rusqlite::Rows<'_>,
    column_count: usize,
    limit: usize,
) -> Result<Vec<Row>, DriverError> {
    let mut batch = Vec::new();
    while batch.len() < limit {
        match rows.next().map_err(to_query_error)? {
            Some(row) => batch.push(read_row(row, column_count)?),
            None => break,
        }
    }
    Ok(batch)
}

fn read_row(row: &rusqlite::Row<'_>, column_count: usize) -> Result<Row, DriverError> {
    let mut values = Vec::with_capacity(column_count);
    for index in 0..column_count {
        let value: rusqlite::types::Value = row.get(index).map_err(to_query_error)?;
        values.push(to_cell(value));
    }
    Ok(Row::new(values))
}

/// SQLite values pass through unchanged; blobs stay blobs.
fn to_cell(value: rusqlite::types::Value) -> Value {
    match value {
        rusqlite::types::Value::Null => Value::Null,
        rusqlite::types::Value::Integer(value) => Value::Integer(value),
        rusqlite::types::Value::Real(value) => Value::Real(value),
        rusqlite::types::Value::Text(value) => Value::Text(value),
        rusqlite::types::Value::Blob(bytes) => Value::Blob(bytes),
    }
}

/// sqlite has no transaction open in autocommit mode; COMMIT/ROLLBACK are
/// no-ops then, matching DB-API drivers.
fn end_transaction(connection: &rusqlite::Connection, sql: &str) -> Result<(), DriverError> {
    if connection.is_autocommit() {
        return Ok(());
    }
    connection.execute_batch(sql).map_err(to_query_error)
}

pub struct SqliteConnection {
    requests: mpsc::Sender<Request>,
}

impl SqliteConnection {
    async fn round_trip<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, DriverError>>) -> Request,
    ) -> Result<T, DriverError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(build(reply))
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    async fn start_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError> {
        let sql = sql.to_string();
        let opened = self
            .round_trip(|reply| Request::Execute { sql, reply })
            .await?;
        Ok(Box::new(SqliteCursor {
            requests: self.requests.clone(),
            headers: opened.headers,
            generation: opened.generation,
        }))
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.round_trip(|reply| Request::Commit { reply }).await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.round_trip(|reply| Request::Rollback { reply }).await
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.round_trip(|reply| Request::Close { reply }).await
    }
}

pub struct SqliteCursor {
    requests: mpsc::Sender<Request>,
    headers: Option<Vec<String>>,
    generation: u64,
}

#[async_trait]
impl Cursor for SqliteCursor {
    fn headers(&self) -> Option<Vec<String>> {
        self.headers.clone()
    }

    async fn next_row(&mut self) -> Result<Option<Row>, DriverError> {
        Ok(self.fetch_batch(1).await?.into_iter().next())
    }

    async fn fetch_batch(&mut self, limit: usize) -> Result<Vec<Row>, DriverError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request::Fetch {
                generation: self.generation,
                limit,
                reply,
            })
            .map_err(|_| worker_gone())?;
        response.await.map_err(|_| worker_gone())?
    }
}

fn worker_gone() -> DriverError {
    DriverError::Connect("sqlite worker thread terminated".to_string())
}

fn to_connect_error(error: rusqlite::Error) -> DriverError {
    DriverError::Connect(error.to_string())
}

fn to_query_error(error: rusqlite::Error) -> DriverError {
    DriverError::Query(error.to_string())
}
