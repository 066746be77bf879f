use thiserror::Error;

use crate::driver::{Connection, Cursor, DatabaseKind, Driver, DriverError, Row};
use crate::events::{Event, Notifier};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no database connection is open")]
    NotConnected,
    #[error("no open cursor to fetch from")]
    NoCursor,
    #[error("no driver registered for {0}")]
    UnsupportedKind(DatabaseKind),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Holds the live connection handle and its at-most-one cursor, plus the
/// last attempted and last successful connection URLs.
///
/// The cursor is only ever `Some` while the connection is `Some`:
/// `disconnect` clears both and every cursor is opened through the live
/// connection.
pub struct Session {
    drivers: Vec<Box<dyn Driver>>,
    connection: Option<Box<dyn Connection>>,
    cursor: Option<Box<dyn Cursor>>,
    url: Option<String>,
    attempted_url: Option<String>,
    kind: Option<DatabaseKind>,
    notifier: Notifier,
}

impl Session {
    #[must_use]
    pub fn new(drivers: Vec<Box<dyn Driver>>) -> Self {
        Self {
            drivers,
            connection: None,
            cursor: None,
            url: None,
            attempted_url: None,
            kind: None,
            notifier: Notifier::new(),
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Event) + Send + 'static) {
        self.notifier.subscribe(listener);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Last successfully connected URL.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Last URL a connect was attempted with, successful or not.
    #[must_use]
    pub fn attempted_url(&self) -> Option<&str> {
        self.attempted_url.as_deref()
    }

    #[must_use]
    pub fn kind(&self) -> Option<DatabaseKind> {
        self.kind
    }

    /// Connects to `connection_string` with the driver registered for
    /// `kind`, closing any existing cursor and connection first.
    ///
    /// On failure the attempted URL is still recorded and the session is
    /// left disconnected.
    pub async fn connect(
        &mut self,
        kind: DatabaseKind,
        connection_string: &str,
    ) -> Result<(), SessionError> {
        self.disconnect().await?;

        let attempted = connection_string.trim().to_string();
        self.attempted_url = Some(attempted.clone());

        let driver = self
            .drivers
            .iter()
            .find(|driver| driver.kind() == kind)
            .ok_or(SessionError::UnsupportedKind(kind))?;
        let connection = driver.connect(&attempted).await?;

        self.connection = Some(connection);
        self.kind = Some(kind);
        self.url = Some(attempted.clone());
        self.notifier.emit(&Event::Connected(attempted.clone()));
        self.notifier
            .emit(&Event::Executed(format!("Connected: {attempted}")));
        Ok(())
    }

    /// Closes the cursor, then the connection, each independently optional.
    /// Always raises `Disconnected`, even when nothing was open.
    pub async fn disconnect(&mut self) -> Result<(), SessionError> {
        self.cursor = None;
        let close_result = match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        };
        self.notifier.emit(&Event::Disconnected);
        close_result.map_err(SessionError::from)
    }

    /// Commits the open transaction. Any open cursor is dropped first so
    /// the engine-side statement is finalized before transaction control;
    /// a fetch afterwards fails with [`SessionError::NoCursor`].
    pub async fn commit(&mut self) -> Result<(), SessionError> {
        self.cursor = None;
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        connection.commit().await?;
        self.notifier.emit(&Event::Executed("Committed".to_string()));
        Ok(())
    }

    /// Rolls back the open transaction, dropping any open cursor first
    /// like [`Session::commit`].
    pub async fn rollback(&mut self) -> Result<(), SessionError> {
        self.cursor = None;
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        connection.rollback().await?;
        self.notifier.emit(&Event::Executed("Rollback".to_string()));
        Ok(())
    }

    /// Opens a fresh cursor for `sql`, replacing and thereby invalidating
    /// any prior cursor's in-progress fetch state.
    pub async fn open_cursor(&mut self, sql: &str) -> Result<(), SessionError> {
        self.cursor = None;
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        let cursor = connection.start_query(sql).await?;
        self.cursor = Some(cursor);
        Ok(())
    }

    #[must_use]
    pub fn cursor_headers(&self) -> Option<Vec<String>> {
        self.cursor.as_ref().and_then(|cursor| cursor.headers())
    }

    pub async fn next_row(&mut self) -> Result<Option<Row>, SessionError> {
        let cursor = self.cursor.as_mut().ok_or(SessionError::NoCursor)?;
        Ok(cursor.next_row().await?)
    }

    pub async fn fetch_batch(&mut self, limit: usize) -> Result<Vec<Row>, SessionError> {
        let cursor = self.cursor.as_mut().ok_or(SessionError::NoCursor)?;
        Ok(cursor.fetch_batch(limit).await?)
    }
}
