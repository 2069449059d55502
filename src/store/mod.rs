//! Persistence layer: the session event log and registry, backed by libSQL.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{EventLog, SessionRecord, SessionRegistry, SessionStore};
