/// Storage for completed probe batches
///
/// One row per batch in the `ping_log` table of a local libsql database.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{DatabaseImpl, RecordSink};

use crate::error::PersistenceError;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<(), PersistenceError> {
    migrations::run_migrations(conn).await
}
