//! Engine-agnostic core of the sqlgrid SQL viewer: the connection session,
//! the incremental result-fetching table model, and the ambient pieces
//! (events, error boundary, action log, saved connections).

pub mod action_log;
pub mod config;
pub mod driver;
pub mod error_boundary;
pub mod events;
pub mod session;
pub mod table_model;
