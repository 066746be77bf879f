use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlgrid_core::config::{ConnectionStore, SavedConnection};
use sqlgrid_core::driver::DatabaseKind;
use sqlgrid_core::error_boundary::ErrorBoundary;
use sqlgrid_core::events::Event;
use sqlgrid_core::session::Session;
use sqlgrid_core::table_model::TableModel;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { kind: DatabaseKind, url: String },
    Open { name: String },
    Save { name: String, kind: DatabaseKind, url: String },
    Connections,
    Fetch,
    Commit,
    Rollback,
    Disconnect,
    Quit,
    Sql(String),
    Help,
    Invalid(String),
}

/// Dot-commands drive the session; anything else is executed as SQL.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if !line.starts_with('.') {
        return Some(Command::Sql(line.to_string()));
    }

    let mut parts = line.splitn(4, char::is_whitespace).filter(|p| !p.is_empty());
    let command = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(".connect"), Some(kind), Some(url), rest) => match kind.parse::<DatabaseKind>() {
            Ok(kind) => {
                let mut url = url.to_string();
                if let Some(rest) = rest {
                    // MySQL connection strings may contain spaces around
                    // their key=value pairs.
                    url.push(' ');
                    url.push_str(rest);
                }
                Command::Connect { kind, url }
            }
            Err(error) => Command::Invalid(error.to_string()),
        },
        (Some(".open"), Some(name), None, None) => Command::Open {
            name: name.to_string(),
        },
        (Some(".save"), Some(name), Some(kind), Some(url)) => match kind.parse::<DatabaseKind>() {
            Ok(kind) => Command::Save {
                name: name.to_string(),
                kind,
                url: url.to_string(),
            },
            Err(error) => Command::Invalid(error.to_string()),
        },
        (Some(".connections"), None, None, None) => Command::Connections,
        (Some(".fetch"), None, None, None) => Command::Fetch,
        (Some(".commit"), None, None, None) => Command::Commit,
        (Some(".rollback"), None, None, None) => Command::Rollback,
        (Some(".disconnect"), None, None, None) => Command::Disconnect,
        (Some(".quit" | ".exit"), None, None, None) => Command::Quit,
        (Some(".help"), None, None, None) => Command::Help,
        _ => Command::Invalid(format!("unrecognized command `{line}`, try .help")),
    };
    Some(command)
}

/// Renders the model as a padded text table. Counts and cells are re-read
/// here on every call; nothing is cached between resets.
pub fn render_table(model: &TableModel) -> String {
    let columns = model.column_count();
    let rows = model.row_count();
    if columns == 0 && rows == 0 {
        return String::from("(no results)\n");
    }

    let mut cells = Vec::with_capacity(rows);
    for row in 0..rows {
        let mut rendered = Vec::with_capacity(columns);
        for column in 0..columns {
            rendered.push(
                model
                    .cell(row, column)
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            );
        }
        cells.push(rendered);
    }

    let mut widths = (0..columns)
        .map(|column| model.header(column).map_or(0, str::len))
        .collect::<Vec<_>>();
    for row in &cells {
        for (column, cell) in row.iter().enumerate() {
            widths[column] = widths[column].max(cell.len());
        }
    }

    let mut out = String::new();
    let header_line = (0..columns)
        .map(|column| format!("{:<width$}", model.header(column).unwrap_or(""), width = widths[column]))
        .collect::<Vec<_>>()
        .join(" | ");
    out.push_str(header_line.trim_end());
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    out.push('\n');
    for row in &cells {
        let line = row
            .iter()
            .enumerate()
            .map(|(column, cell)| format!("{cell:<width$}", width = widths[column]))
            .collect::<Vec<_>>()
            .join(" | ");
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&format!("({rows} rows)\n"));
    out
}

const HELP: &str = "\
.connect KIND URL    connect (KIND: sqlite | mysql)
.open NAME           connect to a saved connection
.save NAME KIND URL  save a connection for .open
.connections         list saved connections
.fetch               fetch the next batch of rows
.commit              commit the current transaction
.rollback            roll back the current transaction
.disconnect          close the connection
.quit                leave the shell
anything else        executed as SQL
";

pub struct Shell {
    session: Session,
    model: TableModel,
    boundary: ErrorBoundary,
    store: ConnectionStore,
    /// Set by the model's reset notification; the table is re-rendered
    /// only when it flips.
    model_reset: Arc<AtomicBool>,
}

impl Shell {
    pub fn new(session: Session, boundary: ErrorBoundary, store: ConnectionStore) -> Self {
        let mut session = session;
        session.subscribe(|event| {
            match event {
                Event::Executed(text) => println!("-- {text}"),
                Event::Connected(url) => println!("-- connected to {url}"),
                Event::Disconnected => println!("-- disconnected"),
                Event::FetchAvailable(_) | Event::ModelReset => {}
            }
        });

        let mut model = TableModel::new();
        let model_reset = Arc::new(AtomicBool::new(false));
        let reset_flag = Arc::clone(&model_reset);
        model.subscribe(move |event| match event {
            Event::ModelReset => reset_flag.store(true, Ordering::SeqCst),
            Event::Executed(text) => println!("-- {text}"),
            Event::FetchAvailable(more) => {
                if *more {
                    println!("-- more rows available, .fetch to continue");
                }
            }
            Event::Connected(_) | Event::Disconnected => {}
        });

        Self {
            session,
            model,
            boundary,
            store,
            model_reset,
        }
    }

    pub async fn run(&mut self, input: impl BufRead, mut output: impl Write) -> std::io::Result<()> {
        writeln!(output, "sqlgrid shell; .help for commands")?;
        for line in input.lines() {
            let line = line?;
            let Some(command) = parse_command(&line) else {
                continue;
            };
            if matches!(command, Command::Quit) {
                break;
            }
            self.dispatch(command, &mut output).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: Command, output: &mut impl Write) -> std::io::Result<()> {
        self.model_reset.store(false, Ordering::SeqCst);
        match command {
            Command::Connect { kind, url } => {
                self.boundary
                    .run_async("connect", Some(&url), self.session.connect(kind, &url))
                    .await;
            }
            Command::Open { name } => match self.store.connection(&name) {
                Some(saved) => {
                    let SavedConnection { kind, url, .. } = saved.clone();
                    self.boundary
                        .run_async("connect", Some(&url), self.session.connect(kind, &url))
                        .await;
                }
                None => writeln!(output, "no saved connection named `{name}`")?,
            },
            Command::Save { name, kind, url } => {
                self.store.upsert(SavedConnection::new(name, kind, url));
                self.boundary
                    .run("save", None, || self.store.persist());
            }
            Command::Connections => {
                for saved in self.store.connections() {
                    writeln!(output, "{}\t{}\t{}", saved.name, saved.kind, saved.url)?;
                }
            }
            Command::Fetch => {
                self.boundary
                    .run_async("fetch", None, self.model.fetch_more(&mut self.session))
                    .await;
            }
            Command::Commit => {
                self.boundary
                    .run_async("commit", None, self.session.commit())
                    .await;
            }
            Command::Rollback => {
                self.boundary
                    .run_async("rollback", None, self.session.rollback())
                    .await;
            }
            Command::Disconnect => {
                self.boundary
                    .run_async("disconnect", None, self.session.disconnect())
                    .await;
            }
            Command::Sql(sql) => {
                self.boundary
                    .run_async("execute", Some(&sql), self.model.execute(&mut self.session, &sql))
                    .await;
            }
            Command::Help => write!(output, "{HELP}")?,
            Command::Invalid(message) => writeln!(output, "{message}")?,
            Command::Quit => {}
        }

        if self.model_reset.swap(false, Ordering::SeqCst) {
            write!(output, "{}", render_table(&self.model))?;
        }
        Ok(())
    }
}
