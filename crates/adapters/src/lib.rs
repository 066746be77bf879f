//! Database drivers for sqlgrid: SQLite (rusqlite) and the experimental
//! MySQL engine (mysql_async).

pub mod mysql;
pub mod sqlite;

use sqlgrid_core::driver::Driver;

/// All built-in drivers, ready to hand to `Session::new`.
#[must_use]
pub fn default_drivers() -> Vec<Box<dyn Driver>> {
    vec![
        Box::new(sqlite::SqliteDriver),
        Box::new(mysql::MysqlDriver),
    ]
}
