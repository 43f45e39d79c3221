use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence, SurgeError};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::types::{BatchStats, ProbeConfig};
use crate::error::ProbeError;

/// Runs one batch of echo requests against a target
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    /// Blocks until every reply has arrived or the batch deadline passed.
    ///
    /// Lost packets are part of the returned statistics, not an error.
    async fn run_batch(&self, config: &ProbeConfig) -> Result<BatchStats, ProbeError>;
}

/// Resolve `host` to one address, preferring families in `usable` order
pub async fn resolve(host: &str, usable: &[bool; 2]) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<IpAddr> = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|source| ProbeError::Resolution { host: host.to_string(), source })?
        .map(|addr| addr.ip())
        .collect();

    let [v4, v6] = *usable;
    addrs
        .iter()
        .find(|ip| (ip.is_ipv4() && v4) || (ip.is_ipv6() && v6))
        .copied()
        .ok_or_else(|| ProbeError::NoAddress { host: host.to_string() })
}

/// ICMP echo prober backed by surge-ping
pub struct IcmpProber {
    v4: Option<Client>,
    v6: Option<Client>,
}

impl IcmpProber {
    /// Open the ICMP sockets.
    ///
    /// Fails only when neither an IPv4 nor an IPv6 socket can be opened.
    pub fn new() -> Result<Self, ProbeError> {
        let v4 = Client::new(&Config::default());
        let v6 = Client::new(&Config::builder().kind(ICMP::V6).build());

        match (v4, v6) {
            (Err(err), Err(_)) => Err(ProbeError::Socket(err)),
            (v4, v6) => {
                if let Err(err) = &v4 {
                    warn!("IPv4 ICMP socket unavailable: {err}");
                }
                if let Err(err) = &v6 {
                    debug!("IPv6 ICMP socket unavailable: {err}");
                }
                Ok(Self { v4: v4.ok(), v6: v6.ok() })
            }
        }
    }

    fn usable_families(&self) -> [bool; 2] {
        [self.v4.is_some(), self.v6.is_some()]
    }

    fn client_for(&self, ip: IpAddr) -> Option<&Client> {
        match ip {
            IpAddr::V4(_) => self.v4.as_ref(),
            IpAddr::V6(_) => self.v6.as_ref(),
        }
    }

    /// Resolve a target once; used to reject unusable targets at startup
    pub async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
        resolve(host, &self.usable_families()).await
    }
}

#[async_trait::async_trait]
impl Prober for IcmpProber {
    async fn run_batch(&self, config: &ProbeConfig) -> Result<BatchStats, ProbeError> {
        let started = Instant::now();
        let deadline = started + config.timeout;

        let ip = self.resolve(&config.target).await?;
        let client = self
            .client_for(ip)
            .ok_or_else(|| ProbeError::NoAddress { host: config.target.clone() })?;

        let ident = PingIdentifier(rand::random());
        let payload = vec![0u8; config.packet_size];

        let mut ticker = tokio::time::interval_at(started, config.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut in_flight = JoinSet::new();
        let mut sent = 0u32;

        for seq in 0..config.count {
            ticker.tick().await;

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!(host = %config.target, sent, "Batch deadline reached before all packets were sent");
                break;
            }

            let mut pinger = client.pinger(ip, ident).await;
            pinger.timeout(remaining);
            let payload = payload.clone();
            sent += 1;

            in_flight.spawn(async move {
                pinger.ping(PingSequence(seq as u16), &payload).await.map(|(_, rtt)| rtt)
            });
        }

        let mut rtts = Vec::with_capacity(sent as usize);
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok(Ok(rtt)) => rtts.push(rtt),
                Ok(Err(SurgeError::Timeout { seq })) => {
                    debug!(host = %config.target, seq = seq.0, "Echo reply timed out");
                }
                Ok(Err(err)) => {
                    debug!(host = %config.target, "Echo request failed: {err}");
                }
                Err(err) => {
                    warn!("Echo task aborted: {err}");
                }
            }
        }

        Ok(BatchStats::from_rtts(ip, sent, &rtts))
    }
}
