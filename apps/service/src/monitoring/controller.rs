//! Probe-mode state machine.
//!
//! ```text
//! STANDARD --[received == 0]-----------> OUTAGE
//! OUTAGE   --[received == packet_count]-> STANDARD
//! ```
//!
//! Every other outcome keeps the current mode. Only the most recent batch
//! is considered.

use tracing::{info, warn};

use super::types::{BatchResult, Mode};

/// Why the monitor switched modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    TotalLoss,
    FullRecovery,
}

impl std::fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitionReason::TotalLoss => write!(f, "all packets lost in the last batch"),
            TransitionReason::FullRecovery => write!(f, "all packets received in the last batch"),
        }
    }
}

/// A mode switch decided after a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: Mode,
    pub to: Mode,
    pub reason: TransitionReason,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = self.to.as_str().to_uppercase();
        write!(f, "SWITCHING to {label} mode - {}.", self.reason)
    }
}

/// Receives one call per mode switch
pub trait TransitionNotifier: Send + Sync {
    fn notify(&self, transition: &Transition);
}

/// Writes transitions to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl TransitionNotifier for LogNotifier {
    fn notify(&self, transition: &Transition) {
        let (from, to, reason) = (transition.from, transition.to, transition.reason);
        match transition.to {
            Mode::Outage => warn!(%from, %to, ?reason, "{transition}"),
            Mode::Standard => info!(%from, %to, ?reason, "{transition}"),
        }
    }
}

/// Pure transition rule.
///
/// `received` and `expected` are the batch's reply count and the
/// configured packet count of the mode that ran it.
pub fn next_transition(current: Mode, received: u32, expected: u32) -> Option<Transition> {
    match current {
        Mode::Standard if received == 0 => Some(Transition {
            from: Mode::Standard,
            to: Mode::Outage,
            reason: TransitionReason::TotalLoss,
        }),
        Mode::Outage if received == expected => Some(Transition {
            from: Mode::Outage,
            to: Mode::Standard,
            reason: TransitionReason::FullRecovery,
        }),
        _ => None,
    }
}

/// Decides the next mode and announces switches
pub struct ModeController<N: TransitionNotifier = LogNotifier> {
    notifier: N,
}

impl<N: TransitionNotifier> ModeController<N> {
    pub fn new(notifier: N) -> Self {
        Self { notifier }
    }

    #[cfg(test)]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Next mode after `batch`, which ran in `current`.
    pub fn decide(&self, current: Mode, batch: &BatchResult) -> Mode {
        self.decide_counts(current, batch.packets_received, batch.packet_count)
    }

    /// Same rule for a batch that produced no statistics.
    pub fn decide_counts(&self, current: Mode, received: u32, expected: u32) -> Mode {
        match next_transition(current, received, expected) {
            Some(transition) => {
                self.notifier.notify(&transition);
                transition.to
            }
            None => current,
        }
    }
}
