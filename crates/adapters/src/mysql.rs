use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use mysql_async::prelude::{Query, Queryable};
use mysql_async::{OptsBuilder, Pool, PoolConstraints, PoolOpts, ResultSetStream, TextProtocol};
use sqlgrid_core::driver::{
    Connection, Cursor, DatabaseKind, Driver, DriverError, Row, Value,
};

/// MySQL driver backed by mysql_async. Experimental engine: connection
/// strings are semicolon-separated `key=value` lists.
#[derive(Debug, Clone, Default)]
pub struct MysqlDriver;

#[async_trait]
impl Driver for MysqlDriver {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    async fn connect(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError> {
        let args = parse_connection_args(connection_string)?;
        let pool = Pool::new(opts_from_args(&args)?);

        // Validate the target up front; pool construction alone does not
        // touch the network.
        let mut probe = pool.get_conn().await.map_err(to_connect_error)?;
        probe.ping().await.map_err(to_connect_error)?;
        drop(probe);

        Ok(Box::new(MysqlConnection { pool }))
    }
}

/// Parses `host=localhost;port=3306;user=root;database=app` style strings.
/// Keys are case-insensitive; the legacy aliases `dbname` and `username`
/// are renamed to their canonical forms.
pub fn parse_connection_args(raw: &str) -> Result<BTreeMap<String, String>, DriverError> {
    let mut args = BTreeMap::new();
    for pair in raw.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            DriverError::Connect(format!(
                "malformed connection option `{pair}`, expected key=value"
            ))
        })?;
        args.insert(canonical_key(key.trim()), value.trim().to_string());
    }
    Ok(args)
}

fn canonical_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    match key.as_str() {
        "dbname" => "database".to_string(),
        "username" => "user".to_string(),
        _ => key,
    }
}

fn opts_from_args(args: &BTreeMap<String, String>) -> Result<OptsBuilder, DriverError> {
    let mut builder = OptsBuilder::default();

    if let Some(host) = args.get("host") {
        builder = builder.ip_or_hostname(host.clone());
    }
    if let Some(port) = args.get("port") {
        let port = port.parse::<u16>().map_err(|_| {
            DriverError::Connect(format!("invalid port `{port}` in connection string"))
        })?;
        builder = builder.tcp_port(port);
    }
    builder = builder.user(args.get("user").cloned());
    builder = builder.db_name(args.get("database").cloned());

    if let Some(password) = args.get("password").cloned().or_else(out_of_band_password) {
        builder = builder.pass(Some(password));
    }

    // A single pooled connection keeps session semantics: COMMIT lands on
    // the same connection the queries ran on.
    let constraints = PoolConstraints::new(1, 1).unwrap_or_default();
    builder = builder.pool_opts(PoolOpts::default().with_constraints(constraints));

    Ok(builder)
}

/// An unsupplied `password` key is resolved out-of-band rather than being
/// embedded in the connection string.
fn out_of_band_password() -> Option<String> {
    std::env::var("SQLGRID_DB_PASSWORD")
        .ok()
        .filter(|password| !password.is_empty())
}

pub struct MysqlConnection {
    pool: Pool,
}

#[async_trait]
impl Connection for MysqlConnection {
    async fn start_query(&mut self, sql: &str) -> Result<Box<dyn Cursor>, DriverError> {
        let stream = sql
            .to_string()
            .stream::<mysql_async::Row, _>(self.pool.clone())
            .await
            .map_err(to_query_error)?;
        Ok(Box::new(MysqlCursor {
            stream: Some(stream),
            headers: None,
        }))
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(to_query_error)?;
        conn.query_drop("COMMIT").await.map_err(to_query_error)
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        let mut conn = self.pool.get_conn().await.map_err(to_query_error)?;
        conn.query_drop("ROLLBACK").await.map_err(to_query_error)
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.pool.disconnect().await.map_err(to_connect_error)
    }
}

pub struct MysqlCursor {
    stream: Option<ResultSetStream<'static, 'static, 'static, mysql_async::Row, TextProtocol>>,
    headers: Option<Vec<String>>,
}

#[async_trait]
impl Cursor for MysqlCursor {
    /// Column metadata travels with the rows in the text protocol, so
    /// headers become known once the first row has been fetched. A query
    /// that yields no rows therefore reports no headers on this engine.
    fn headers(&self) -> Option<Vec<String>> {
        self.headers.clone()
    }

    async fn next_row(&mut self) -> Result<Option<Row>, DriverError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        match stream.next().await {
            Some(Ok(row)) => {
                if self.headers.is_none() {
                    self.headers = Some(
                        row.columns_ref()
                            .iter()
                            .map(|column| column.name_str().into_owned())
                            .collect(),
                    );
                }
                Ok(Some(row_to_cells(row)))
            }
            Some(Err(error)) => Err(to_query_error(error)),
            None => {
                self.stream = None;
                Ok(None)
            }
        }
    }
}

fn row_to_cells(row: mysql_async::Row) -> Row {
    let values = row.unwrap().into_iter().map(mysql_value_to_cell).collect();
    Row::new(values)
}

/// The text protocol returns string-ish columns as raw bytes; those are
/// decoded to text here. Temporal values render in their usual notation.
fn mysql_value_to_cell(value: mysql_async::Value) -> Value {
    match value {
        mysql_async::Value::NULL => Value::Null,
        mysql_async::Value::Bytes(bytes) => {
            Value::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        mysql_async::Value::Int(value) => Value::Integer(value),
        mysql_async::Value::UInt(value) => match i64::try_from(value) {
            Ok(value) => Value::Integer(value),
            Err(_) => Value::Text(value.to_string()),
        },
        mysql_async::Value::Float(value) => Value::Real(f64::from(value)),
        mysql_async::Value::Double(value) => Value::Real(value),
        mysql_async::Value::Date(year, month, day, hour, minute, second, micros) => {
            Value::Text(format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
            ))
        }
        mysql_async::Value::Time(is_negative, days, hours, minutes, seconds, micros) => {
            let sign = if is_negative { "-" } else { "" };
            Value::Text(format!(
                "{sign}{days:03} {hours:02}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

fn to_connect_error(error: mysql_async::Error) -> DriverError {
    DriverError::Connect(error.to_string())
}

fn to_query_error(error: mysql_async::Error) -> DriverError {
    DriverError::Query(error.to_string())
}
