use std::marker::PhantomData;

use async_trait::async_trait;

use opsdash_common::error::OpsResult;
use opsdash_db::outbox::models::{FailureDisposition, OutboxPayload};
use opsdash_db::outbox::repositories::OutboxRepository;

use crate::source::WriteSink;
use crate::worker::{CycleReport, Worker};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    pub write_type: String,
    pub fetched: usize,
    pub delivered: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// The batch stopped at a failed row; it and the rows after it stay queued.
    pub aborted: bool,
    /// Dead-lettered rows of this type still in the table, including earlier cycles'.
    pub parked: i64,
}

impl CycleReport for DrainOutcome {
    fn is_degraded(&self) -> bool {
        self.aborted || self.dead_lettered > 0
    }
}

/// Replays queued writes of one type, oldest first, deleting each only after
/// the sink confirmed it.
pub struct OutboxDrainLoop<P, R, K> {
    outbox: R,
    sink: K,
    batch_size: i64,
    max_attempts: i32,
    _payload: PhantomData<fn() -> P>,
}

impl<P, R, K> OutboxDrainLoop<P, R, K>
where
    P: OutboxPayload,
    R: OutboxRepository<P>,
    K: WriteSink<P>,
{
    pub fn new(outbox: R, sink: K, batch_size: i64, max_attempts: i32) -> Self {
        Self {
            outbox,
            sink,
            batch_size,
            max_attempts,
            _payload: PhantomData,
        }
    }

    pub async fn drain_once(&self) -> OpsResult<DrainOutcome> {
        let items = self.outbox.fetch_pending(self.batch_size).await?;
        let mut outcome = DrainOutcome {
            write_type: P::WRITE_TYPE.to_string(),
            fetched: items.len(),
            ..Default::default()
        };

        for item in items {
            let e = match self.sink.replay(&item.payload).await {
                Ok(()) => {
                    // A failed delete leaves the row queued; it is replayed again next tick.
                    self.outbox.delete(item.id).await?;
                    outcome.delivered += 1;
                    continue;
                }
                Err(e) => e,
            };
            outcome.failed += 1;
            let reason = e.to_string();

            // Outages and bad credentials spend no attempts; the row blocks the rows
            // behind it until the sink recovers.
            if !e.is_rejection() {
                match self.outbox.record_retry(item.id, &reason).await {
                    Ok(()) => tracing::warn!(
                        write_type = P::WRITE_TYPE,
                        outbox_id = item.id,
                        transient = e.is_transient(),
                        error = %reason,
                        "replay failed, stopping batch"
                    ),
                    Err(record_err) => tracing::warn!(
                        write_type = P::WRITE_TYPE,
                        outbox_id = item.id,
                        error = %reason,
                        record_error = %record_err,
                        "replay failed and could not be recorded, stopping batch"
                    ),
                }
                outcome.aborted = true;
                break;
            }

            match self
                .outbox
                .record_failure(item.id, &reason, self.max_attempts)
                .await
            {
                Ok(FailureDisposition::DeadLettered { attempts }) => {
                    tracing::error!(
                        write_type = P::WRITE_TYPE,
                        outbox_id = item.id,
                        attempts,
                        error = %reason,
                        "outbox row dead-lettered"
                    );
                    outcome.dead_lettered += 1;
                }
                Ok(FailureDisposition::Retry { attempts }) => {
                    tracing::warn!(
                        write_type = P::WRITE_TYPE,
                        outbox_id = item.id,
                        attempts,
                        error = %reason,
                        "replay rejected, stopping batch"
                    );
                    outcome.aborted = true;
                    break;
                }
                Err(record_err) => {
                    tracing::warn!(
                        write_type = P::WRITE_TYPE,
                        outbox_id = item.id,
                        error = %reason,
                        record_error = %record_err,
                        "replay rejected and could not be recorded, stopping batch"
                    );
                    outcome.aborted = true;
                    break;
                }
            }
        }

        match self.outbox.count_dead_lettered().await {
            Ok(parked) => outcome.parked = parked,
            Err(e) => tracing::warn!(
                write_type = P::WRITE_TYPE,
                error = %e,
                "could not count dead-lettered rows"
            ),
        }
        if outcome.parked > 0 {
            tracing::warn!(
                write_type = P::WRITE_TYPE,
                parked = outcome.parked,
                "dead-lettered outbox rows are waiting for an operator"
            );
        }

        if outcome.fetched > 0 {
            tracing::info!(
                write_type = P::WRITE_TYPE,
                fetched = outcome.fetched,
                delivered = outcome.delivered,
                dead_lettered = outcome.dead_lettered,
                aborted = outcome.aborted,
                "outbox drain finished"
            );
        }

        Ok(outcome)
    }
}

#[async_trait]
impl<P, R, K> Worker for OutboxDrainLoop<P, R, K>
where
    P: OutboxPayload,
    R: OutboxRepository<P>,
    K: WriteSink<P>,
{
    type Outcome = DrainOutcome;

    fn name(&self) -> &str {
        P::WRITE_TYPE
    }

    async fn run_once(&self) -> OpsResult<DrainOutcome> {
        self.drain_once().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FlakySink, MemOutbox, Note};

    type Drain = OutboxDrainLoop<Note, MemOutbox, FlakySink>;

    fn drain(outbox: &MemOutbox, sink: &FlakySink, max_attempts: i32) -> Drain {
        OutboxDrainLoop::new(outbox.clone(), sink.clone(), 50, max_attempts)
    }

    #[tokio::test]
    async fn failure_stops_batch_and_keeps_remaining_rows() {
        let outbox = MemOutbox::with(&["A", "B", "C"]);
        let sink = FlakySink::failing_on(&["B"]);

        let outcome = drain(&outbox, &sink, 10).drain_once().await.unwrap();

        assert_eq!(outbox.keys(), vec!["B", "C"]);
        assert_eq!(sink.attempted(), vec!["A", "B"]);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.failed, 1);
        assert!(outcome.aborted);
        assert!(outcome.is_degraded());
        // An outage does not spend the row's attempts.
        assert_eq!(outbox.attempts("B"), 0);
        assert_eq!(outbox.last_error("B").as_deref(), Some("upstream error: HTTP 503 for B"));
    }

    #[tokio::test]
    async fn rows_are_replayed_in_creation_order_and_removed() {
        let outbox = MemOutbox::with(&["A", "B", "C"]);
        let sink = FlakySink::default();

        let outcome = drain(&outbox, &sink, 10).drain_once().await.unwrap();

        assert_eq!(sink.attempted(), vec!["A", "B", "C"]);
        assert!(outbox.keys().is_empty());
        assert_eq!(outcome.delivered, 3);
        assert!(!outcome.is_degraded());
    }

    #[tokio::test]
    async fn failed_row_is_retried_next_cycle() {
        let outbox = MemOutbox::with(&["A", "B"]);
        let sink = FlakySink::failing_on(&["A"]);
        let worker = drain(&outbox, &sink, 10);

        worker.drain_once().await.unwrap();
        assert_eq!(outbox.keys(), vec!["A", "B"]);

        sink.failing.lock().unwrap().clear();
        let outcome = worker.drain_once().await.unwrap();
        assert_eq!(outcome.delivered, 2);
        assert!(outbox.keys().is_empty());
        assert_eq!(sink.attempted(), vec!["A", "A", "B"]);
    }

    #[tokio::test]
    async fn poison_row_is_dead_lettered_and_batch_continues() {
        let outbox = MemOutbox::with(&["A", "B", "C"]);
        let sink = FlakySink::rejecting(&["B"]);
        let worker = drain(&outbox, &sink, 2);

        let first = worker.drain_once().await.unwrap();
        assert!(first.aborted);
        assert_eq!(outbox.keys(), vec!["B", "C"]);
        assert_eq!(outbox.attempts("B"), 1);
        assert_eq!(first.parked, 0);

        let second = worker.drain_once().await.unwrap();
        assert_eq!(second.dead_lettered, 1);
        assert_eq!(second.delivered, 1);
        assert!(!second.aborted);
        assert!(second.is_degraded());
        // The dead-lettered row is parked, not deleted.
        assert_eq!(outbox.keys(), vec!["B"]);
        assert_eq!(outbox.attempts("B"), 2);
        assert_eq!(second.parked, 1);

        let third = worker.drain_once().await.unwrap();
        assert_eq!(third.fetched, 0);
        assert_eq!(third.parked, 1);
        assert_eq!(sink.attempted(), vec!["A", "B", "B", "C"]);
    }

    #[tokio::test]
    async fn long_outage_never_dead_letters_healthy_rows() {
        let outbox = MemOutbox::with(&["A", "B", "C"]);
        let sink = FlakySink::failing_on(&["A", "B", "C"]);
        let worker = drain(&outbox, &sink, 3);

        for _ in 0..9 {
            let outcome = worker.drain_once().await.unwrap();
            assert!(outcome.aborted);
            assert_eq!(outcome.dead_lettered, 0);
        }
        assert_eq!(outbox.dead_count(), 0);
        assert_eq!(outbox.attempts("A"), 0);
        // Only the head row is tried while the sink is down.
        assert_eq!(sink.attempted(), vec!["A"; 9]);

        sink.failing.lock().unwrap().clear();
        let recovered = worker.drain_once().await.unwrap();
        assert_eq!(recovered.delivered, 3);
        assert_eq!(recovered.parked, 0);
        assert!(outbox.keys().is_empty());
        assert_eq!(sink.attempted()[9..], ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn failed_delete_aborts_and_row_is_redelivered() {
        let outbox = MemOutbox::with(&["A", "B"]);
        *outbox.fail_delete.lock().unwrap() = true;
        let sink = FlakySink::default();
        let worker = drain(&outbox, &sink, 10);

        assert!(worker.drain_once().await.is_err());
        assert_eq!(outbox.keys(), vec!["A", "B"]);

        *outbox.fail_delete.lock().unwrap() = false;
        worker.drain_once().await.unwrap();
        assert!(outbox.keys().is_empty());
        // At-least-once: A reached the sink twice.
        assert_eq!(sink.attempted(), vec!["A", "A", "B"]);
    }

    #[tokio::test]
    async fn respects_batch_size() {
        let outbox = MemOutbox::with(&["A", "B", "C"]);
        let sink = FlakySink::default();
        let worker: Drain = OutboxDrainLoop::new(outbox.clone(), sink.clone(), 2, 10);

        let outcome = worker.drain_once().await.unwrap();
        assert_eq!(outcome.fetched, 2);
        assert_eq!(outbox.keys(), vec!["C"]);
        assert_eq!(worker.name(), "note");
    }
}
