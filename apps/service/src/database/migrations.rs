use chrono::Utc;
use libsql::{Connection, Transaction};

use crate::error::PersistenceError;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
pub async fn run_migrations(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    // each migration commits together with its schema_migrations row
    if current_version < 1 {
        let tx = conn.transaction().await?;
        let applied = async {
            run_migration_v1(&tx).await?;
            record_migration(&tx, 1, "Create ping_log").await
        }
        .await;
        finish(tx, applied).await?;
    }

    if current_version < 2 {
        let tx = conn.transaction().await?;
        let applied = async {
            run_migration_v2(&tx).await?;
            record_migration(&tx, 2, "Tag records with environment, index log_time").await
        }
        .await;
        finish(tx, applied).await?;
    }

    Ok(())
}

/// Commit a migration transaction, or roll it back when a step failed
async fn finish(
    tx: Transaction,
    applied: Result<(), PersistenceError>,
) -> Result<(), PersistenceError> {
    match applied {
        Ok(()) => Ok(tx.commit().await?),
        Err(err) => {
            tx.rollback().await?;
            Err(err)
        }
    }
}

/// Get current schema version from database
pub async fn get_current_version(conn: &Connection) -> Result<i32, PersistenceError> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(
    conn: &Connection,
    version: i32,
    description: &str,
) -> Result<(), PersistenceError> {
    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, Utc::now().to_rfc3339(), description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: one row per probe batch, RTTs in seconds
async fn run_migration_v1(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ping_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            log_time TEXT NOT NULL,
            ping_type TEXT NOT NULL CHECK (ping_type IN ('standard', 'outage')),
            target TEXT NOT NULL,
            address TEXT NOT NULL,
            packet_size INTEGER NOT NULL,
            packet_count INTEGER NOT NULL,
            packets_sent INTEGER NOT NULL,
            packets_received INTEGER NOT NULL,
            min_rtt REAL NOT NULL,
            max_rtt REAL NOT NULL,
            avg_rtt REAL NOT NULL
        )",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: environment tag and time index
async fn run_migration_v2(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute("ALTER TABLE ping_log ADD COLUMN environment TEXT NOT NULL DEFAULT ''", ())
        .await?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_ping_log_time ON ping_log(log_time)", ())
        .await?;

    Ok(())
}
