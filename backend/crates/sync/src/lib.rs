//! Generic synchronization engine: watermark-driven pull loops, outbox drain
//! loops and notification fan-out, each run on its own timer.

pub mod drain;
pub mod fanout;
pub mod pull;
pub mod runner;
pub mod source;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use drain::{DrainOutcome, OutboxDrainLoop};
pub use fanout::{FanOutReport, NotificationFanOut, NotifyOutcome, NotifyPolicy};
pub use pull::{PullOutcome, PullSyncLoop};
pub use runner::{run_periodic, RunSummary, Schedule};
pub use source::{Boundary, ChangeSource, NotificationChannel, WriteSink};
pub use worker::{CycleReport, Worker};
