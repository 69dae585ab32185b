//! Persistence layer — libSQL-backed storage for applications, messages,
//! activity, and push tokens.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;
pub mod watch;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ApplicationPatch, ApplicationStore};
pub use watch::{ChangeEvent, WatchHandle};
