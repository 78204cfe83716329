use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use opsdash_common::error::OpsResult;
use opsdash_db::projection::{ProjectionRepository, SyncRecord};
use opsdash_db::sync::models::SyncWatermark;
use opsdash_db::sync::repositories::SyncWatermarkRepository;
use opsdash_db::transaction::TransactionManager;

use crate::source::{Boundary, ChangeSource};
use crate::worker::{CycleReport, Worker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOutcome {
    pub entity_type: String,
    pub fetched: usize,
    pub upserted: usize,
    /// Records at the watermark that an earlier cycle already absorbed.
    pub skipped_boundary: usize,
    /// `None` when the cycle was locked out and never read the watermark.
    pub watermark_before: Option<DateTime<Utc>>,
    pub watermark_after: Option<DateTime<Utc>>,
    /// Another process held the watermark lock; nothing was done.
    pub locked_out: bool,
}

impl PullOutcome {
    fn locked_out(entity_type: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            fetched: 0,
            upserted: 0,
            skipped_boundary: 0,
            watermark_before: None,
            watermark_after: None,
            locked_out: true,
        }
    }
}

impl CycleReport for PullOutcome {}

/// Mirrors one entity type from a [`ChangeSource`] into a [`ProjectionRepository`],
/// resuming from the stored watermark.
pub struct PullSyncLoop<E, S, P, W> {
    entity_type: String,
    source: S,
    projection: P,
    watermarks: W,
    boundary: Boundary,
    lock_lease: Duration,
    _record: PhantomData<fn() -> E>,
}

impl<E, S, P, W> PullSyncLoop<E, S, P, W>
where
    E: SyncRecord,
    S: ChangeSource<E>,
    P: ProjectionRepository<E>,
    W: SyncWatermarkRepository,
{
    pub fn new(
        entity_type: impl Into<String>,
        source: S,
        projection: P,
        watermarks: W,
        lock_lease: Duration,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            source,
            projection,
            watermarks,
            boundary: Boundary::Inclusive,
            lock_lease,
            _record: PhantomData,
        }
    }

    pub fn with_boundary(mut self, boundary: Boundary) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Run one cycle: lock, fetch, upsert in a single transaction, advance.
    pub async fn pull_once(&self) -> OpsResult<PullOutcome> {
        self.watermarks.get_or_create(&self.entity_type).await?;

        let Some(watermark) = self
            .watermarks
            .acquire_lock(&self.entity_type, self.lock_lease)
            .await?
        else {
            tracing::info!(entity_type = %self.entity_type, "pull already running elsewhere, skipping");
            return Ok(PullOutcome::locked_out(&self.entity_type));
        };

        match self.absorb(&watermark).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(mark_err) = self
                    .watermarks
                    .mark_failed(watermark.id, &e.to_string())
                    .await
                {
                    tracing::warn!(
                        entity_type = %self.entity_type,
                        error = %mark_err,
                        "failed to record pull failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn absorb(&self, watermark: &SyncWatermark) -> OpsResult<PullOutcome> {
        let since = watermark.last_synced_at;
        let fetched = self.source.list_changed(since, self.boundary).await?;
        let fetched_count = fetched.len();

        let (batch, skipped) = unabsorbed(fetched, watermark, self.boundary);

        if batch.is_empty() {
            self.watermarks.mark_idle(watermark.id).await?;
            return Ok(PullOutcome {
                entity_type: self.entity_type.clone(),
                fetched: fetched_count,
                upserted: 0,
                skipped_boundary: skipped,
                watermark_before: Some(since),
                watermark_after: Some(since),
                locked_out: false,
            });
        }

        let mut tx = self.projection.begin().await?;
        for record in &batch {
            if let Err(e) = self.projection.upsert(&mut tx, record).await {
                tracing::warn!(
                    entity_type = %self.entity_type,
                    record_id = %record.record_id(),
                    error = %e,
                    "upsert failed, rolling back batch"
                );
                if let Err(rb) = self.projection.rollback(tx).await {
                    tracing::warn!(entity_type = %self.entity_type, error = %rb, "rollback failed");
                }
                return Err(e);
            }
        }
        self.projection.commit(tx).await?;

        let (next, boundary_ids) = advance(watermark, &batch, self.boundary);
        let stored = self
            .watermarks
            .mark_completed(watermark.id, next, &boundary_ids)
            .await?;

        let outcome = PullOutcome {
            entity_type: self.entity_type.clone(),
            fetched: fetched_count,
            upserted: batch.len(),
            skipped_boundary: skipped,
            watermark_before: Some(since),
            watermark_after: Some(stored.last_synced_at),
            locked_out: false,
        };

        tracing::info!(
            entity_type = %outcome.entity_type,
            fetched = outcome.fetched,
            upserted = outcome.upserted,
            skipped = outcome.skipped_boundary,
            watermark = %stored.last_synced_at,
            "pull cycle committed"
        );

        Ok(outcome)
    }
}

/// Drop records sitting exactly on the watermark that the cycle which set it already absorbed.
fn unabsorbed<E: SyncRecord>(
    fetched: Vec<E>,
    watermark: &SyncWatermark,
    boundary: Boundary,
) -> (Vec<E>, usize) {
    if boundary == Boundary::Exclusive || watermark.boundary_ids.is_empty() {
        return (fetched, 0);
    }

    let seen: HashSet<Uuid> = watermark.boundary_ids.iter().copied().collect();
    let total = fetched.len();
    let batch: Vec<E> = fetched
        .into_iter()
        .filter(|r| !(r.last_edited_at() == watermark.last_synced_at && seen.contains(&r.record_id())))
        .collect();
    let skipped = total - batch.len();
    (batch, skipped)
}

/// New watermark and boundary set after committing `batch`.
fn advance<E: SyncRecord>(
    watermark: &SyncWatermark,
    batch: &[E],
    boundary: Boundary,
) -> (DateTime<Utc>, Vec<Uuid>) {
    let previous = watermark.last_synced_at;
    let max = batch
        .iter()
        .map(SyncRecord::last_edited_at)
        .max()
        .unwrap_or(previous);

    if boundary == Boundary::Exclusive {
        return (max.max(previous), Vec::new());
    }

    let at_max = batch
        .iter()
        .filter(|r| r.last_edited_at() == max)
        .map(SyncRecord::record_id);

    if max > previous {
        let mut ids: Vec<Uuid> = at_max.collect();
        ids.sort();
        ids.dedup();
        (max, ids)
    } else if max == previous {
        let mut ids = watermark.boundary_ids.clone();
        ids.extend(at_max);
        ids.sort();
        ids.dedup();
        (previous, ids)
    } else {
        (previous, watermark.boundary_ids.clone())
    }
}

#[async_trait]
impl<E, S, P, W> Worker for PullSyncLoop<E, S, P, W>
where
    E: SyncRecord,
    S: ChangeSource<E>,
    P: ProjectionRepository<E>,
    W: SyncWatermarkRepository,
{
    type Outcome = PullOutcome;

    fn name(&self) -> &str {
        &self.entity_type
    }

    async fn run_once(&self) -> OpsResult<PullOutcome> {
        self.pull_once().await
    }
}
