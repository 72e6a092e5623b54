//! Database layer for persistence using Diesel ORM.

pub mod model;
pub mod schema;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool};
use diesel::SqliteConnection;

use crate::error::{Error, Result};

/// Database connection pool type alias.
pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;

/// Parallel detection tasks and the dispatcher share one pool, so every
/// connection runs in WAL mode with a busy timeout, and foreign keys are
/// enforced (SQLite leaves them off by default).
#[derive(Debug, Clone, Copy)]
struct SyncPragmas;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SyncPragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA journal_mode = WAL; \
             PRAGMA busy_timeout = 5000; \
             PRAGMA foreign_keys = ON;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Create a connection pool for the given database URL.
///
/// # Errors
/// Returns an error if the pool cannot be created.
pub fn create_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<SqliteConnection>::new(database_url);
    Pool::builder()
        .max_size(5)
        .connection_customizer(Box::new(SyncPragmas))
        .build(manager)
        .map_err(|e| Error::Fatal(e.to_string()))
}
