use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Operating profile of the monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Standard,
    Outage,
}

impl Mode {
    /// Label stored in the `ping_type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Outage => "outage",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Mode::Standard),
            "outage" => Ok(Mode::Outage),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

/// Parameters for one probe batch in a given mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    pub target: String,
    pub count: u32,
    pub packet_size: usize,
    /// Delay between individual echo requests inside the batch
    pub interval: Duration,
    /// Deadline for the whole batch, measured from its start
    pub timeout: Duration,
}

/// Runtime settings for both modes, swapped as a unit on reload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSettings {
    pub standard: ProbeConfig,
    pub outage: ProbeConfig,
    /// Wait between batches while in standard mode
    pub standard_interval: Duration,
    pub environment: String,
}

impl MonitorSettings {
    pub fn probe_config(&self, mode: Mode) -> &ProbeConfig {
        match mode {
            Mode::Standard => &self.standard,
            Mode::Outage => &self.outage,
        }
    }

    /// Delay before the next batch once `mode` is active.
    ///
    /// Outage batches run back to back.
    pub fn inter_batch_delay(&self, mode: Mode) -> Duration {
        match mode {
            Mode::Standard => self.standard_interval,
            Mode::Outage => Duration::ZERO,
        }
    }
}

/// Raw statistics returned by a prober for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStats {
    pub address: IpAddr,
    pub packets_sent: u32,
    pub packets_received: u32,
    pub min_rtt: Duration,
    pub max_rtt: Duration,
    pub avg_rtt: Duration,
}

impl BatchStats {
    /// Aggregate per-packet round trip times; all zero when nothing came back
    pub fn from_rtts(address: IpAddr, packets_sent: u32, rtts: &[Duration]) -> Self {
        let (min_rtt, max_rtt, avg_rtt) = if rtts.is_empty() {
            (Duration::ZERO, Duration::ZERO, Duration::ZERO)
        } else {
            let total: Duration = rtts.iter().sum();
            (
                rtts.iter().copied().min().unwrap_or_default(),
                rtts.iter().copied().max().unwrap_or_default(),
                total / rtts.len() as u32,
            )
        };

        Self {
            address,
            packets_sent,
            packets_received: rtts.len() as u32,
            min_rtt,
            max_rtt,
            avg_rtt,
        }
    }
}

/// Outcome of one completed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub timestamp: DateTime<Utc>,

    /// Mode that was active when the batch started
    pub mode: Mode,

    pub target: String,

    /// Resolved address the echo requests were sent to
    pub address: String,

    pub packet_size: usize,

    /// Configured packet count for the batch's mode
    pub packet_count: u32,

    pub packets_sent: u32,
    pub packets_received: u32,

    /// Round trip times in seconds
    pub min_rtt: f64,
    pub max_rtt: f64,
    pub avg_rtt: f64,

    pub environment: String,
}

impl BatchResult {
    pub fn new(mode: Mode, config: &ProbeConfig, stats: &BatchStats, environment: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            mode,
            target: config.target.clone(),
            address: stats.address.to_string(),
            packet_size: config.packet_size,
            packet_count: config.count,
            packets_sent: stats.packets_sent,
            packets_received: stats.packets_received,
            min_rtt: stats.min_rtt.as_secs_f64(),
            max_rtt: stats.max_rtt.as_secs_f64(),
            avg_rtt: stats.avg_rtt.as_secs_f64(),
            environment: environment.to_string(),
        }
    }
}

/// The driver's only mutable state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorState {
    mode: Mode,
}

impl MonitorState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Replace the active mode, returning the previous one
    pub fn advance(&mut self, next: Mode) -> Mode {
        std::mem::replace(&mut self.mode, next)
    }
}
