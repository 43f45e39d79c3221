use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::controller::{LogNotifier, ModeController, TransitionNotifier};
use super::prober::Prober;
use super::types::{BatchResult, Mode, MonitorSettings, MonitorState};
use crate::database::RecordSink;
use crate::error::{ConfigError, MonitorError};
use crate::signals::ReloadFlag;

/// Produces fresh settings when a reload is requested
pub trait SettingsSource: Send + Sync {
    fn load(&self) -> Result<MonitorSettings, ConfigError>;
}

impl<F> SettingsSource for F
where
    F: Fn() -> Result<MonitorSettings, ConfigError> + Send + Sync,
{
    fn load(&self) -> Result<MonitorSettings, ConfigError> {
        self()
    }
}

/// What a finished run did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Batches that completed and were persisted
    pub batches: u64,
    /// Batches that could not be attempted
    pub failed_batches: u64,
    pub transitions: u64,
    pub final_mode: Mode,
}

/// Monitoring scheduler - drives probe batches one after another
///
/// Owns the monitor state. Each iteration runs one batch with the active
/// mode's parameters, lets the controller pick the next mode, persists the
/// batch and waits as long as the new mode asks for.
pub struct MonitorScheduler<N: TransitionNotifier = LogNotifier> {
    prober: Arc<dyn Prober>,
    sink: Arc<dyn RecordSink>,
    controller: ModeController<N>,
    settings: MonitorSettings,
    state: MonitorState,
    shutdown: CancellationToken,
    reload: ReloadFlag,
    settings_source: Option<Box<dyn SettingsSource>>,
    max_batches: Option<u64>,
}

impl<N: TransitionNotifier> MonitorScheduler<N> {
    /// Create a new scheduler starting in standard mode
    pub fn new(
        prober: Arc<dyn Prober>,
        sink: Arc<dyn RecordSink>,
        controller: ModeController<N>,
        settings: MonitorSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            prober,
            sink,
            controller,
            settings,
            state: MonitorState::default(),
            shutdown,
            reload: ReloadFlag::new(),
            settings_source: None,
            max_batches: None,
        }
    }

    /// Re-read settings from `source` whenever `flag` is raised
    pub fn with_reload(mut self, flag: ReloadFlag, source: impl SettingsSource + 'static) -> Self {
        self.reload = flag;
        self.settings_source = Some(Box::new(source));
        self
    }

    /// Stop cleanly after `max` completed batches
    pub fn with_max_batches(mut self, max: Option<u64>) -> Self {
        self.max_batches = max;
        self
    }

    #[cfg(test)]
    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn controller(&self) -> &ModeController<N> {
        &self.controller
    }

    fn apply_pending_reload(&mut self) {
        if !self.reload.take() {
            return;
        }

        let Some(source) = &self.settings_source else {
            warn!("Reload requested but no configuration source is attached");
            return;
        };

        match source.load() {
            Ok(settings) => {
                if settings != self.settings {
                    info!(
                        standard_target = %settings.standard.target,
                        outage_target = %settings.outage.target,
                        "Configuration reloaded, applying to the next batch"
                    );
                } else {
                    info!("Configuration reloaded, nothing changed");
                }
                self.settings = settings;
            }
            Err(err) => error!("Reload failed, keeping previous configuration: {err}"),
        }
    }

    /// Wait `delay` unless a stop is requested first. Returns false on stop.
    async fn wait(&self, delay: Duration) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        if delay.is_zero() {
            return true;
        }

        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Run batches until a stop is requested, the batch limit is reached or
    /// a record cannot be persisted.
    ///
    /// A batch that has started always runs to completion.
    pub async fn run(&mut self) -> Result<RunSummary, MonitorError> {
        let mut summary = RunSummary {
            batches: 0,
            failed_batches: 0,
            transitions: 0,
            final_mode: self.state.mode(),
        };

        loop {
            if self.shutdown.is_cancelled() {
                info!("Stop requested, leaving monitor loop");
                break;
            }
            self.apply_pending_reload();

            let mode = self.state.mode();
            let config = self.settings.probe_config(mode).clone();

            let delay = match self.prober.run_batch(&config).await {
                Ok(stats) => {
                    let batch =
                        BatchResult::new(mode, &config, &stats, &self.settings.environment);
                    debug!(
                        %mode,
                        host = %batch.target,
                        sent = batch.packets_sent,
                        received = batch.packets_received,
                        avg_rtt = batch.avg_rtt,
                        "Batch completed"
                    );

                    let next = self.controller.decide(mode, &batch);
                    if self.state.advance(next) != next {
                        summary.transitions += 1;
                    }

                    self.sink.append(&batch).await?;
                    summary.batches += 1;

                    self.settings.inter_batch_delay(next)
                }
                Err(err) => {
                    let err = MonitorError::from(err);
                    warn!(%mode, host = %config.target, "Batch not attempted: {err}");
                    summary.failed_batches += 1;

                    let next = self.controller.decide_counts(mode, 0, config.count);
                    if self.state.advance(next) != next {
                        summary.transitions += 1;
                    }

                    // failed attempts wait one batch timeout
                    config.timeout
                }
            };

            if self.max_batches.is_some_and(|max| summary.batches >= max) {
                info!(batches = summary.batches, "Batch limit reached");
                break;
            }

            if !self.wait(delay).await {
                info!("Stop requested, leaving monitor loop");
                break;
            }
        }

        summary.final_mode = self.state.mode();
        Ok(summary)
    }
}
