/// Monitoring engine - probe batches and the mode state machine
///
/// This module is responsible for:
/// - Sending ICMP echo batches and aggregating their statistics
/// - Deciding between standard and outage cadence after every batch
/// - Driving the probe/decide/persist/wait loop
pub mod controller;
pub mod prober;
pub mod scheduler;
pub mod types;


pub use controller::ModeController;
pub use prober::IcmpProber;
pub use scheduler::MonitorScheduler;
pub use types::Mode;
