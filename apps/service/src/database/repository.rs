use async_trait::async_trait;
use chrono::DateTime;
use libsql::params;

use super::models::PingLogRecord;
use crate::error::PersistenceError;
use crate::monitoring::types::BatchResult;
use crate::pool::{LibsqlManager, LibsqlPool};

/// Durable destination for completed batches
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Append one record, returning its row id
    async fn append(&self, batch: &BatchResult) -> Result<i64, PersistenceError>;
}

/// LibSQL implementation of the record store
pub struct DatabaseImpl {
    pool: LibsqlPool,
}

impl DatabaseImpl {
    /// Create a new database instance from a pool
    pub fn new_from_pool(pool: LibsqlPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool
    async fn get_conn(&self) -> Result<deadpool::managed::Object<LibsqlManager>, PersistenceError> {
        Ok(self.pool.get().await?)
    }

    /// Most recent records, newest first
    pub async fn recent(&self, limit: usize) -> Result<Vec<PingLogRecord>, PersistenceError> {
        let conn = self.get_conn().await?;
        let mut rows = conn
            .query(
                "SELECT id, log_time, ping_type, target, address, packet_size, packet_count,
                        packets_sent, packets_received, min_rtt, max_rtt, avg_rtt, environment
                 FROM ping_log ORDER BY id DESC LIMIT ?",
                params![limit as i64],
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            let log_time: String = row.get(1)?;
            let ping_type: String = row.get(2)?;

            records.push(PingLogRecord {
                id: row.get(0)?,
                log_time: DateTime::parse_from_rfc3339(&log_time)
                    .map_err(|e| PersistenceError::CorruptRow(format!("log_time `{log_time}`: {e}")))?
                    .to_utc(),
                ping_type: ping_type.parse().map_err(PersistenceError::CorruptRow)?,
                target: row.get(3)?,
                address: row.get(4)?,
                packet_size: row.get(5)?,
                packet_count: row.get(6)?,
                packets_sent: row.get(7)?,
                packets_received: row.get(8)?,
                min_rtt: row.get(9)?,
                max_rtt: row.get(10)?,
                avg_rtt: row.get(11)?,
                environment: row.get(12)?,
            });
        }

        Ok(records)
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<u64, PersistenceError> {
        let conn = self.get_conn().await?;
        let mut rows = conn.query("SELECT COUNT(*) FROM ping_log", ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(count as u64)
    }
}

#[async_trait]
impl RecordSink for DatabaseImpl {
    async fn append(&self, batch: &BatchResult) -> Result<i64, PersistenceError> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO ping_log (
                log_time, ping_type, target, address, packet_size, packet_count,
                packets_sent, packets_received, min_rtt, max_rtt, avg_rtt, environment
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                batch.timestamp.to_rfc3339(),
                batch.mode.as_str(),
                batch.target.as_str(),
                batch.address.as_str(),
                batch.packet_size as i64,
                i64::from(batch.packet_count),
                i64::from(batch.packets_sent),
                i64::from(batch.packets_received),
                batch.min_rtt,
                batch.max_rtt,
                batch.avg_rtt,
                batch.environment.as_str(),
            ],
        )
        .await?;

        Ok(conn.last_insert_rowid())
    }
}
