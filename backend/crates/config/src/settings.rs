use std::str::FromStr;
use std::time::Duration;

use opsdash_common::error::{OpsError, OpsResult};

use crate::env::{get_var_or, parse_var_or};

/// How the fan-out decides that an entity has been notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyPolicySetting {
    All,
    Any,
}

impl FromStr for NotifyPolicySetting {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            other => Err(format!("unknown notify policy: {other} (expected all|any)")),
        }
    }
}

/// Timing and batching knobs for the background loops.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub pull_interval: Duration,
    /// Used by the high-churn entity types (tasks, time entries).
    pub fast_pull_interval: Duration,
    pub outbox_interval: Duration,
    pub outbox_batch_size: i64,
    pub outbox_max_attempts: i32,
    pub notify_interval: Duration,
    pub notify_delay: Duration,
    pub notify_batch_size: i64,
    pub notify_policy: NotifyPolicySetting,
    pub notify_recipients: Vec<String>,
    pub lock_lease: Duration,
    pub failure_alert_threshold: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            pull_interval: Duration::from_secs(60),
            fast_pull_interval: Duration::from_secs(20),
            outbox_interval: Duration::from_secs(20),
            outbox_batch_size: 50,
            outbox_max_attempts: 10,
            notify_interval: Duration::from_secs(60),
            notify_delay: Duration::from_secs(5 * 60),
            notify_batch_size: 50,
            notify_policy: NotifyPolicySetting::All,
            notify_recipients: Vec::new(),
            lock_lease: Duration::from_secs(600),
            failure_alert_threshold: 5,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> OpsResult<Self> {
        let defaults = Self::default();

        let settings = Self {
            pull_interval: secs_var("PULL_INTERVAL_SECS", defaults.pull_interval)?,
            fast_pull_interval: secs_var("FAST_PULL_INTERVAL_SECS", defaults.fast_pull_interval)?,
            outbox_interval: secs_var("OUTBOX_INTERVAL_SECS", defaults.outbox_interval)?,
            outbox_batch_size: parse_var_or("OUTBOX_BATCH_SIZE", defaults.outbox_batch_size)?,
            outbox_max_attempts: parse_var_or(
                "OUTBOX_MAX_ATTEMPTS",
                defaults.outbox_max_attempts,
            )?,
            notify_interval: secs_var("NOTIFY_INTERVAL_SECS", defaults.notify_interval)?,
            notify_delay: secs_var("NOTIFY_DELAY_SECS", defaults.notify_delay)?,
            notify_batch_size: parse_var_or("NOTIFY_BATCH_SIZE", defaults.notify_batch_size)?,
            notify_policy: get_var_or("NOTIFY_POLICY", "all")
                .parse()
                .map_err(OpsError::Config)?,
            notify_recipients: parse_csv(&get_var_or("NOTIFY_RECIPIENTS", "")),
            lock_lease: secs_var("SYNC_LOCK_LEASE_SECS", defaults.lock_lease)?,
            failure_alert_threshold: parse_var_or(
                "FAILURE_ALERT_THRESHOLD",
                defaults.failure_alert_threshold,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> OpsResult<()> {
        if self.outbox_batch_size <= 0 {
            return Err(OpsError::Config("OUTBOX_BATCH_SIZE must be positive".into()));
        }
        if self.outbox_max_attempts <= 0 {
            return Err(OpsError::Config(
                "OUTBOX_MAX_ATTEMPTS must be positive".into(),
            ));
        }
        if self.notify_batch_size <= 0 {
            return Err(OpsError::Config("NOTIFY_BATCH_SIZE must be positive".into()));
        }
        for (key, interval) in [
            ("PULL_INTERVAL_SECS", self.pull_interval),
            ("FAST_PULL_INTERVAL_SECS", self.fast_pull_interval),
            ("OUTBOX_INTERVAL_SECS", self.outbox_interval),
            ("NOTIFY_INTERVAL_SECS", self.notify_interval),
        ] {
            if interval.is_zero() {
                return Err(OpsError::Config(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }
}

fn secs_var(key: &str, default: Duration) -> OpsResult<Duration> {
    parse_var_or(key, default.as_secs()).map(Duration::from_secs)
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
