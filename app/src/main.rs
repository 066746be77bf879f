mod shell;

use sqlgrid_core::action_log::ActionLog;
use sqlgrid_core::config::ConnectionStore;
use sqlgrid_core::error_boundary::ErrorBoundary;
use sqlgrid_core::session::Session;

use shell::Shell;

fn build_shell() -> Shell {
    let session = Session::new(sqlgrid_adapters::default_drivers());
    let boundary = match ActionLog::load_default() {
        Ok(log) => ErrorBoundary::new(log),
        Err(_) => ErrorBoundary::unlogged(),
    };
    let store = ConnectionStore::load_default().unwrap_or_else(|error| {
        eprintln!("ignoring saved connections: {error}");
        ConnectionStore::empty(std::path::PathBuf::new())
    });
    Shell::new(session, boundary, store)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    build_shell().run(stdin.lock(), stdout.lock()).await
}
