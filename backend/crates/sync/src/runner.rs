use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::worker::{CycleReport, Worker};

#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub interval: Duration,
    /// Consecutive failed cycles after which failures are logged at `error`.
    pub failure_alert_threshold: u32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub failed_cycles: u64,
    pub max_consecutive_failures: u32,
}

/// Run `worker` once per tick until `cancel` fires.
///
/// The first cycle starts immediately. Cancellation is observed between
/// cycles; a cycle already in progress runs to completion.
pub async fn run_periodic<W: Worker>(
    worker: W,
    schedule: Schedule,
    cancel: CancellationToken,
) -> RunSummary {
    let name = worker.name().to_string();
    let mut ticker = interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = RunSummary::default();
    let mut consecutive: u32 = 0;

    tracing::info!(worker = %name, interval_secs = schedule.interval.as_secs_f64(), "worker started");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        summary.cycles += 1;
        let failed = match worker.run_once().await {
            Ok(outcome) => {
                tracing::debug!(worker = %name, ?outcome, "cycle finished");
                if outcome.is_degraded() {
                    tracing::warn!(worker = %name, ?outcome, "cycle left failed work behind");
                }
                outcome.is_degraded()
            }
            Err(e) => {
                let streak = consecutive + 1;
                if streak >= schedule.failure_alert_threshold || !e.is_transient() {
                    tracing::error!(worker = %name, error = %e, consecutive_failures = streak, "cycle failed");
                } else {
                    tracing::warn!(worker = %name, error = %e, consecutive_failures = streak, "cycle failed");
                }
                true
            }
        };

        if failed {
            consecutive += 1;
            summary.failed_cycles += 1;
            summary.max_consecutive_failures = summary.max_consecutive_failures.max(consecutive);
        } else {
            if consecutive >= schedule.failure_alert_threshold {
                tracing::info!(worker = %name, after = consecutive, "worker recovered");
            }
            consecutive = 0;
        }
    }

    tracing::info!(worker = %name, cycles = summary.cycles, "worker stopped");
    summary
}
