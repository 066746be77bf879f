use crate::driver::{Row, Value};
use crate::events::{Event, Notifier};
use crate::session::{Session, SessionError};

/// Fixed row-fetch window bounding per-call memory growth.
pub const FETCH_BATCH_SIZE: usize = 500;

/// Bridges a forward-only cursor to a random-access tabular view.
///
/// Two observable states: empty (no query run, zero rows and columns) and
/// populated (headers fixed, rows appended batch by batch). Every change
/// raises a full `ModelReset` rather than row-range notifications; views
/// re-read counts and cells after each reset.
#[derive(Default)]
pub struct TableModel {
    headers: Vec<String>,
    rows: Vec<Row>,
    column_count: usize,
    notifier: Notifier,
}

impl TableModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&Event) + Send + 'static) {
        self.notifier.subscribe(listener);
    }

    /// Runs `sql` on the session's connection and resets the model to the
    /// new result set.
    ///
    /// Peeks the first row: if one exists the headers are fixed (cursor
    /// metadata preferred, column count from the row itself otherwise), the
    /// row set is reset to exactly that row, and one `fetch_more` cycle
    /// pulls the next batch. With no rows the headers still come from
    /// cursor metadata when present and fetching is disabled.
    pub async fn execute(&mut self, session: &mut Session, sql: &str) -> Result<(), SessionError> {
        session.open_cursor(sql).await?;

        match session.next_row().await? {
            Some(first) => {
                match session.cursor_headers() {
                    Some(headers) => {
                        self.column_count = headers.len();
                        self.headers = headers;
                    }
                    None => {
                        self.column_count = first.values.len();
                        self.headers = Vec::new();
                    }
                }
                self.rows = vec![first];
                self.notifier.emit(&Event::ModelReset);
                self.fetch_more(session).await?;
            }
            None => {
                self.headers = session.cursor_headers().unwrap_or_default();
                self.column_count = self.headers.len();
                self.rows.clear();
                self.notifier.emit(&Event::ModelReset);
                self.notifier.emit(&Event::FetchAvailable(false));
            }
        }

        self.notifier
            .emit(&Event::Executed(format!("Executed: {sql}")));
        Ok(())
    }

    /// Pulls up to [`FETCH_BATCH_SIZE`] additional rows from the open
    /// cursor. A full batch signals that more rows may remain.
    pub async fn fetch_more(&mut self, session: &mut Session) -> Result<(), SessionError> {
        let batch = session.fetch_batch(FETCH_BATCH_SIZE).await?;
        let fetched = batch.len();
        if fetched > 0 {
            self.rows.extend(batch);
            self.notifier.emit(&Event::ModelReset);
        }
        self.notifier
            .emit(&Event::FetchAvailable(fetched >= FETCH_BATCH_SIZE));
        Ok(())
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    #[must_use]
    pub fn header(&self, at: usize) -> Option<&str> {
        self.headers.get(at).map(String::as_str)
    }

    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[must_use]
    pub fn cell(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|row| row.values.get(column))
    }
}
