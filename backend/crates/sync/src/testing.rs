//! In-memory collaborators shared by the engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use opsdash_common::error::{OpsError, OpsResult};
use opsdash_db::outbox::models::{FailureDisposition, OutboxItem, OutboxPayload};
use opsdash_db::outbox::repositories::OutboxRepository;
use opsdash_db::projection::{Notifiable, NotificationRepository, ProjectionRepository, SyncRecord};
use opsdash_db::sync::models::{SyncStatus, SyncWatermark};
use opsdash_db::sync::repositories::SyncWatermarkRepository;
use opsdash_db::transaction::TransactionManager;

use crate::source::{Boundary, ChangeSource, NotificationChannel, WriteSink};

pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
}

// ── Record ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: Uuid,
    pub label: String,
    pub edited: DateTime<Utc>,
}

impl Item {
    pub fn new(label: &str, edited: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            edited,
        }
    }
}

impl SyncRecord for Item {
    fn record_id(&self) -> Uuid {
        self.id
    }

    fn last_edited_at(&self) -> DateTime<Utc> {
        self.edited
    }
}

impl Notifiable for Item {
    fn notification_message(&self) -> String {
        format!("{} is away", self.label)
    }
}

// ── Change source ───────────────────────────────────────────────

/// Behaves like the remote database: answers range queries over its current rows.
#[derive(Clone, Default)]
pub struct MemSource {
    pub rows: Arc<Mutex<Vec<Item>>>,
    pub fail: Arc<Mutex<bool>>,
    pub calls: Arc<Mutex<Vec<(DateTime<Utc>, Boundary)>>>,
}

impl MemSource {
    pub fn with(rows: Vec<Item>) -> Self {
        let source = Self::default();
        *source.rows.lock().unwrap() = rows;
        source
    }

    pub fn put(&self, item: Item) {
        let mut rows = self.rows.lock().unwrap();
        rows.retain(|r| r.id != item.id);
        rows.push(item);
    }
}

#[async_trait]
impl ChangeSource<Item> for MemSource {
    async fn list_changed(&self, since: DateTime<Utc>, boundary: Boundary) -> OpsResult<Vec<Item>> {
        self.calls.lock().unwrap().push((since, boundary));
        if *self.fail.lock().unwrap() {
            return Err(OpsError::Upstream("HTTP 502".into()));
        }
        let mut out: Vec<Item> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| match boundary {
                Boundary::Inclusive => r.edited >= since,
                Boundary::Exclusive => r.edited > since,
            })
            .cloned()
            .collect();
        out.sort_by_key(|r| r.edited);
        Ok(out)
    }
}

// ── Projection ──────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemProjection {
    pub committed: Arc<Mutex<HashMap<Uuid, Item>>>,
    pub upsert_calls: Arc<Mutex<Vec<Uuid>>>,
    pub fail_on: Arc<Mutex<HashSet<Uuid>>>,
    pub rollbacks: Arc<Mutex<usize>>,
}

impl MemProjection {
    pub fn stored(&self, id: Uuid) -> Option<Item> {
        self.committed.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.committed.lock().unwrap().len()
    }
}

#[async_trait]
impl TransactionManager for MemProjection {
    type Tx = Vec<Item>;

    async fn begin(&self) -> OpsResult<Vec<Item>> {
        Ok(Vec::new())
    }

    async fn commit(&self, tx: Vec<Item>) -> OpsResult<()> {
        let mut committed = self.committed.lock().unwrap();
        for item in tx {
            committed.insert(item.id, item);
        }
        Ok(())
    }

    async fn rollback(&self, _tx: Vec<Item>) -> OpsResult<()> {
        *self.rollbacks.lock().unwrap() += 1;
        Ok(())
    }
}

#[async_trait]
impl ProjectionRepository<Item> for MemProjection {
    async fn upsert(&self, tx: &mut Vec<Item>, record: &Item) -> OpsResult<()> {
        self.upsert_calls.lock().unwrap().push(record.id);
        if self.fail_on.lock().unwrap().contains(&record.id) {
            return Err(OpsError::Database("constraint violation".into()));
        }
        tx.push(record.clone());
        Ok(())
    }
}

// ── Watermarks ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct MemWatermarks {
    pub row: Arc<Mutex<SyncWatermark>>,
    pub lock_held_elsewhere: Arc<Mutex<bool>>,
    pub fail_reads: Arc<Mutex<bool>>,
}

impl MemWatermarks {
    pub fn new(entity_type: &str) -> Self {
        Self {
            row: Arc::new(Mutex::new(SyncWatermark {
                id: Uuid::new_v4(),
                entity_type: entity_type.to_string(),
                last_synced_at: DateTime::<Utc>::UNIX_EPOCH,
                boundary_ids: Vec::new(),
                status: SyncStatus::Idle,
                error_message: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })),
            lock_held_elsewhere: Arc::new(Mutex::new(false)),
            fail_reads: Arc::new(Mutex::new(false)),
        }
    }

    pub fn current(&self) -> SyncWatermark {
        self.row.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncWatermarkRepository for MemWatermarks {
    async fn get_or_create(&self, _entity_type: &str) -> OpsResult<SyncWatermark> {
        if *self.fail_reads.lock().unwrap() {
            return Err(OpsError::Database("connection refused".into()));
        }
        Ok(self.current())
    }

    async fn acquire_lock(
        &self,
        _entity_type: &str,
        _lease: Duration,
    ) -> OpsResult<Option<SyncWatermark>> {
        if *self.lock_held_elsewhere.lock().unwrap() {
            return Ok(None);
        }
        let mut row = self.row.lock().unwrap();
        row.status = SyncStatus::Running;
        Ok(Some(row.clone()))
    }

    async fn mark_completed(
        &self,
        _id: Uuid,
        last_synced_at: DateTime<Utc>,
        boundary_ids: &[Uuid],
    ) -> OpsResult<SyncWatermark> {
        let mut row = self.row.lock().unwrap();
        if last_synced_at >= row.last_synced_at {
            row.boundary_ids = boundary_ids.to_vec();
            row.last_synced_at = last_synced_at;
        }
        row.status = SyncStatus::Idle;
        row.error_message = None;
        Ok(row.clone())
    }

    async fn mark_idle(&self, _id: Uuid) -> OpsResult<SyncWatermark> {
        let mut row = self.row.lock().unwrap();
        row.status = SyncStatus::Idle;
        Ok(row.clone())
    }

    async fn mark_failed(&self, _id: Uuid, error_message: &str) -> OpsResult<SyncWatermark> {
        let mut row = self.row.lock().unwrap();
        row.status = SyncStatus::Failed;
        row.error_message = Some(error_message.to_string());
        Ok(row.clone())
    }
}

// ── Outbox ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub key: String,
}

impl OutboxPayload for Note {
    const WRITE_TYPE: &'static str = "note";
    const TABLE: &'static str = "note_outbox";
}

#[derive(Clone, Default)]
pub struct MemOutbox {
    pub rows: Arc<Mutex<Vec<OutboxItem<Note>>>>,
    pub dead: Arc<Mutex<Vec<i64>>>,
    pub fail_delete: Arc<Mutex<bool>>,
}

impl MemOutbox {
    pub fn with(keys: &[&str]) -> Self {
        let outbox = Self::default();
        {
            let mut rows = outbox.rows.lock().unwrap();
            for (i, key) in keys.iter().enumerate() {
                rows.push(OutboxItem {
                    id: i as i64 + 1,
                    payload: Note {
                        key: key.to_string(),
                    },
                    attempts: 0,
                    last_error: None,
                    created_at: at(i as u32),
                });
            }
        }
        outbox
    }

    /// Keys of rows still queued (dead-lettered included), in queue order.
    pub fn keys(&self) -> Vec<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.payload.key.clone())
            .collect()
    }

    pub fn attempts(&self, key: &str) -> i32 {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.payload.key == key)
            .map(|r| r.attempts)
            .unwrap_or(-1)
    }

    pub fn last_error(&self, key: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.payload.key == key)
            .and_then(|r| r.last_error.clone())
    }

    pub fn dead_count(&self) -> usize {
        self.dead.lock().unwrap().len()
    }
}

#[async_trait]
impl OutboxRepository<Note> for MemOutbox {
    async fn enqueue(&self, payload: &Note) -> OpsResult<i64> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        rows.push(OutboxItem {
            id,
            payload: payload.clone(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn fetch_pending(&self, limit: i64) -> OpsResult<Vec<OutboxItem<Note>>> {
        let dead = self.dead.lock().unwrap().clone();
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !dead.contains(&r.id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> OpsResult<()> {
        if *self.fail_delete.lock().unwrap() {
            return Err(OpsError::Database("connection reset".into()));
        }
        self.rows.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn record_retry(&self, id: i64, error: &str) -> OpsResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| OpsError::NotFound(format!("row {id}")))?;
        row.last_error = Some(error.to_string());
        Ok(())
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: i32,
    ) -> OpsResult<FailureDisposition> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| OpsError::NotFound(format!("row {id}")))?;
        row.attempts += 1;
        row.last_error = Some(error.to_string());
        if row.attempts >= max_attempts {
            self.dead.lock().unwrap().push(id);
            Ok(FailureDisposition::DeadLettered {
                attempts: row.attempts,
            })
        } else {
            Ok(FailureDisposition::Retry {
                attempts: row.attempts,
            })
        }
    }

    async fn count_dead_lettered(&self) -> OpsResult<i64> {
        Ok(self.dead.lock().unwrap().len() as i64)
    }
}

/// Fails listed keys as an outage (`failing`) or refuses them outright (`rejecting`).
#[derive(Clone, Default)]
pub struct FlakySink {
    pub attempted: Arc<Mutex<Vec<String>>>,
    pub failing: Arc<Mutex<HashSet<String>>>,
    pub rejecting: Arc<Mutex<HashSet<String>>>,
}

impl FlakySink {
    pub fn failing_on(keys: &[&str]) -> Self {
        let sink = Self::default();
        sink.failing
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
        sink
    }

    pub fn rejecting(keys: &[&str]) -> Self {
        let sink = Self::default();
        sink.rejecting
            .lock()
            .unwrap()
            .extend(keys.iter().map(|k| k.to_string()));
        sink
    }

    pub fn attempted(&self) -> Vec<String> {
        self.attempted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WriteSink<Note> for FlakySink {
    async fn replay(&self, payload: &Note) -> OpsResult<()> {
        self.attempted.lock().unwrap().push(payload.key.clone());
        if self.rejecting.lock().unwrap().contains(&payload.key) {
            return Err(OpsError::Validation(format!("HTTP 400 for {}", payload.key)));
        }
        if self.failing.lock().unwrap().contains(&payload.key) {
            return Err(OpsError::Upstream(format!("HTTP 503 for {}", payload.key)));
        }
        Ok(())
    }
}

// ── Notifications ───────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MemNotifications {
    pub pending: Arc<Mutex<Vec<Item>>>,
    pub notified: Arc<Mutex<HashSet<Uuid>>>,
    pub cutoffs: Arc<Mutex<Vec<DateTime<Utc>>>>,
}

impl MemNotifications {
    pub fn with(items: Vec<Item>) -> Self {
        let repo = Self::default();
        *repo.pending.lock().unwrap() = items;
        repo
    }

    pub fn is_notified(&self, id: Uuid) -> bool {
        self.notified.lock().unwrap().contains(&id)
    }
}

#[async_trait]
impl TransactionManager for MemNotifications {
    type Tx = Vec<Uuid>;

    async fn begin(&self) -> OpsResult<Vec<Uuid>> {
        Ok(Vec::new())
    }

    async fn commit(&self, tx: Vec<Uuid>) -> OpsResult<()> {
        self.notified.lock().unwrap().extend(tx);
        Ok(())
    }

    async fn rollback(&self, _tx: Vec<Uuid>) -> OpsResult<()> {
        Ok(())
    }
}

#[async_trait]
impl NotificationRepository<Item> for MemNotifications {
    async fn list_pending_notifications(
        &self,
        edited_before: DateTime<Utc>,
        limit: i64,
    ) -> OpsResult<Vec<Item>> {
        self.cutoffs.lock().unwrap().push(edited_before);
        let notified = self.notified.lock().unwrap().clone();
        Ok(self
            .pending
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.edited < edited_before && !notified.contains(&i.id))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_notified(
        &self,
        tx: &mut Vec<Uuid>,
        id: Uuid,
        edited_at: DateTime<Utc>,
    ) -> OpsResult<()> {
        let current = self
            .pending
            .lock()
            .unwrap()
            .iter()
            .any(|i| i.id == id && i.edited == edited_at);
        if !current {
            return Err(OpsError::NotFound(format!("item {id} at {edited_at}")));
        }
        tx.push(id);
        Ok(())
    }
}

/// Records deliveries; fails for listed recipients or for messages containing a marker.
#[derive(Clone, Default)]
pub struct MemChannel {
    pub sent: Arc<Mutex<Vec<(String, String)>>>,
    pub failing_recipients: Arc<Mutex<HashSet<String>>>,
    pub failing_marker: Arc<Mutex<Option<String>>>,
    pub panic_marker: Arc<Mutex<Option<String>>>,
}

impl MemChannel {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for MemChannel {
    async fn send(&self, recipient: &str, message: &str) -> OpsResult<()> {
        let panic_marker = self.panic_marker.lock().unwrap().clone();
        if let Some(marker) = panic_marker {
            if message.contains(&marker) {
                panic!("channel exploded on {message}");
            }
        }
        if self.failing_recipients.lock().unwrap().contains(recipient) {
            return Err(OpsError::Notification(format!("chat {recipient} not found")));
        }
        let failing_marker = self.failing_marker.lock().unwrap().clone();
        if let Some(marker) = failing_marker {
            if message.contains(&marker) {
                return Err(OpsError::Notification("bot blocked".into()));
            }
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(())
    }
}
