use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

use opsdash_common::error::{OpsError, OpsResult};
use opsdash_db::projection::{Notifiable, NotificationRepository};
use opsdash_db::transaction::TransactionManager;

use crate::source::NotificationChannel;
use crate::worker::{CycleReport, Worker};

/// When an entity counts as notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyPolicy {
    /// Every recipient accepted the message.
    #[default]
    AllRecipients,
    /// At least one recipient accepted the message.
    AnyRecipient,
}

impl NotifyPolicy {
    fn satisfied(self, delivered: usize, failed: usize) -> bool {
        match self {
            Self::AllRecipients => failed == 0 && delivered > 0,
            Self::AnyRecipient => delivered > 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyOutcome {
    pub entity_id: Uuid,
    pub delivered: usize,
    pub failed: usize,
    /// The `notified` flag was committed.
    pub marked: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub entity_type: String,
    pub eligible: usize,
    pub notified: usize,
    pub failed: usize,
    /// Tasks that panicked instead of returning an outcome.
    pub panicked: usize,
    pub outcomes: Vec<NotifyOutcome>,
}

impl CycleReport for FanOutReport {
    fn is_degraded(&self) -> bool {
        self.failed > 0 || self.panicked > 0
    }
}

/// Announces settled records to a fixed recipient list, one transaction per record.
pub struct NotificationFanOut<E, R, C> {
    entity_type: String,
    repo: Arc<R>,
    channel: Arc<C>,
    recipients: Arc<[String]>,
    delay: Duration,
    batch_size: i64,
    policy: NotifyPolicy,
    _record: PhantomData<fn() -> E>,
}

impl<E, R, C> NotificationFanOut<E, R, C>
where
    E: Notifiable,
    R: NotificationRepository<E> + 'static,
    R::Tx: 'static,
    C: NotificationChannel + 'static,
{
    pub fn new(
        entity_type: impl Into<String>,
        repo: R,
        channel: C,
        recipients: Vec<String>,
        delay: Duration,
        batch_size: i64,
    ) -> OpsResult<Self> {
        let entity_type = entity_type.into();
        if recipients.is_empty() {
            return Err(OpsError::Config(format!(
                "no notification recipients configured for {entity_type}"
            )));
        }
        Ok(Self {
            entity_type,
            repo: Arc::new(repo),
            channel: Arc::new(channel),
            recipients: recipients.into(),
            delay,
            batch_size,
            policy: NotifyPolicy::default(),
            _record: PhantomData,
        })
    }

    pub fn with_policy(mut self, policy: NotifyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Notify every eligible record concurrently and wait for all of them.
    pub async fn notify_pending(&self) -> OpsResult<FanOutReport> {
        let delay = chrono::Duration::from_std(self.delay)
            .map_err(|e| OpsError::Config(format!("invalid notification delay: {e}")))?;
        let cutoff = Utc::now() - delay;

        let pending = self
            .repo
            .list_pending_notifications(cutoff, self.batch_size)
            .await?;

        let mut report = FanOutReport {
            entity_type: self.entity_type.clone(),
            eligible: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        for entity in pending {
            tasks.spawn(notify_one(
                self.entity_type.clone(),
                Arc::clone(&self.repo),
                Arc::clone(&self.channel),
                Arc::clone(&self.recipients),
                self.policy,
                entity,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if outcome.marked {
                        report.notified += 1;
                    } else {
                        report.failed += 1;
                    }
                    report.outcomes.push(outcome);
                }
                Err(e) => {
                    tracing::error!(entity_type = %self.entity_type, error = %e, "notification task aborted");
                    report.panicked += 1;
                }
            }
        }

        tracing::info!(
            entity_type = %report.entity_type,
            eligible = report.eligible,
            notified = report.notified,
            failed = report.failed + report.panicked,
            "notification fan-out finished"
        );

        Ok(report)
    }
}

async fn notify_one<E, R, C>(
    entity_type: String,
    repo: Arc<R>,
    channel: Arc<C>,
    recipients: Arc<[String]>,
    policy: NotifyPolicy,
    entity: E,
) -> NotifyOutcome
where
    E: Notifiable,
    R: NotificationRepository<E>,
    C: NotificationChannel,
{
    let entity_id = entity.record_id();
    let edited_at = entity.last_edited_at();
    let mut outcome = NotifyOutcome {
        entity_id,
        delivered: 0,
        failed: 0,
        marked: false,
    };

    let mut tx = match repo.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            tracing::warn!(%entity_type, %entity_id, error = %e, "could not open notification transaction");
            return outcome;
        }
    };

    let message = entity.notification_message();
    for recipient in recipients.iter() {
        match channel.send(recipient, &message).await {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                outcome.failed += 1;
                tracing::warn!(%entity_type, %entity_id, %recipient, error = %e, "notification not delivered");
            }
        }
    }

    if !policy.satisfied(outcome.delivered, outcome.failed) {
        if let Err(e) = repo.rollback(tx).await {
            tracing::warn!(%entity_type, %entity_id, error = %e, "rollback failed");
        }
        return outcome;
    }

    // An edit that landed while sending leaves the row pending for the next cycle.
    if let Err(e) = repo.mark_notified(&mut tx, entity_id, edited_at).await {
        tracing::warn!(%entity_type, %entity_id, error = %e, "could not mark notified");
        if let Err(rb) = repo.rollback(tx).await {
            tracing::warn!(%entity_type, %entity_id, error = %rb, "rollback failed");
        }
        return outcome;
    }

    match repo.commit(tx).await {
        Ok(()) => outcome.marked = true,
        Err(e) => {
            tracing::warn!(%entity_type, %entity_id, error = %e, "could not commit notified flag");
        }
    }
    outcome
}

#[async_trait]
impl<E, R, C> Worker for NotificationFanOut<E, R, C>
where
    E: Notifiable,
    R: NotificationRepository<E> + 'static,
    R::Tx: 'static,
    C: NotificationChannel + 'static,
{
    type Outcome = FanOutReport;

    fn name(&self) -> &str {
        &self.entity_type
    }

    async fn run_once(&self) -> OpsResult<FanOutReport> {
        self.notify_pending().await
    }
}
