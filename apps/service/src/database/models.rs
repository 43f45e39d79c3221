use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::Mode;

/// A stored `ping_log` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PingLogRecord {
    pub id: i64,
    pub log_time: DateTime<Utc>,
    pub ping_type: Mode,
    pub target: String,
    pub address: String,
    pub packet_size: i64,
    pub packet_count: i64,
    pub packets_sent: i64,
    pub packets_received: i64,
    pub min_rtt: f64,
    pub max_rtt: f64,
    pub avg_rtt: f64,
    pub environment: String,
}

impl PingLogRecord {
    /// Loss ratio in percent; 100 when nothing was sent
    pub fn loss_percent(&self) -> f64 {
        if self.packets_sent == 0 {
            return 100.0;
        }
        let lost = (self.packets_sent - self.packets_received).max(0);
        lost as f64 * 100.0 / self.packets_sent as f64
    }
}

impl std::fmt::Display for PingLogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {:<8} {} ({}) {}/{} received, {:.0}% loss, rtt min/avg/max = {:.3}/{:.3}/{:.3} ms",
            self.log_time.to_rfc3339(),
            self.ping_type.as_str(),
            self.target,
            self.address,
            self.packets_received,
            self.packets_sent,
            self.loss_percent(),
            self.min_rtt * 1000.0,
            self.avg_rtt * 1000.0,
            self.max_rtt * 1000.0,
        )
    }
}
