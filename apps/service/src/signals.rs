//! Process signal wiring.
//!
//! SIGINT/SIGTERM cancel the driver's token; SIGHUP raises a reload request
//! that the driver picks up before its next batch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Pending configuration reload request
#[derive(Debug, Clone, Default)]
pub struct ReloadFlag {
    flag: Arc<AtomicBool>,
}

impl ReloadFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Spawn the listener task for termination and reload signals
pub fn spawn_listener(
    shutdown: CancellationToken,
    reload: ReloadFlag,
) -> std::io::Result<tokio::task::JoinHandle<()>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = terminate.recv() => {
                    info!("Received SIGTERM, stopping after the current batch");
                    shutdown.cancel();
                    break;
                }
                _ = interrupt.recv() => {
                    info!("Received SIGINT, stopping after the current batch");
                    shutdown.cancel();
                    break;
                }
                Some(()) = hangup.recv() => {
                    info!("Received SIGHUP, configuration will be reloaded before the next batch");
                    reload.trigger();
                }
            }
        }
    }))
}
