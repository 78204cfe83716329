mod telegram;
mod workspace;

use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use opsdash_config::{init_tracing, AppConfig, NotifyPolicySetting, SyncSettings};
use opsdash_db::absences::models::Absence;
use opsdash_db::absences::pg_repository::PgAbsenceRepository;
use opsdash_db::clients::models::Client;
use opsdash_db::clients::pg_repository::PgClientRepository;
use opsdash_db::feedback::models::Feedback;
use opsdash_db::feedback::pg_repository::PgFeedbackRepository;
use opsdash_db::outbox::models::{TaskCreation, TimeWriteOff};
use opsdash_db::outbox::pg_repository::PgOutboxRepository;
use opsdash_db::projection::{ProjectionRepository, SyncRecord};
use opsdash_db::projects::models::Project;
use opsdash_db::projects::pg_repository::PgProjectRepository;
use opsdash_db::sync::pg_repository::PgSyncRepository;
use opsdash_db::tasks::models::Task;
use opsdash_db::tasks::pg_repository::PgTaskRepository;
use opsdash_db::time_entries::models::TimeEntry;
use opsdash_db::time_entries::pg_repository::PgTimeEntryRepository;
use opsdash_sync::{
    run_periodic, NotificationFanOut, NotifyPolicy, OutboxDrainLoop, PullSyncLoop, RunSummary,
    Schedule, Worker,
};

use crate::telegram::{TelegramChannel, TelegramConfig};
use crate::workspace::mapping::FromPage;
use crate::workspace::{
    TaskCreationSink, TimeWriteOffSink, WorkspaceClient, WorkspaceClientConfig, WorkspaceSource,
};

#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Background loops sharing one cancellation token.
struct Workers {
    tasks: JoinSet<(String, RunSummary)>,
    cancel: CancellationToken,
    failure_alert_threshold: u32,
}

impl Workers {
    fn new(cancel: CancellationToken, failure_alert_threshold: u32) -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel,
            failure_alert_threshold,
        }
    }

    fn spawn<W: Worker + 'static>(&mut self, worker: W, interval: Duration) {
        let name = worker.name().to_string();
        let schedule = Schedule {
            interval,
            failure_alert_threshold: self.failure_alert_threshold,
        };
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            let summary = run_periodic(worker, schedule, cancel).await;
            (name, summary)
        });
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    async fn join_all(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((name, summary)) => tracing::info!(
                    worker = %name,
                    cycles = summary.cycles,
                    failed_cycles = summary.failed_cycles,
                    max_consecutive_failures = summary.max_consecutive_failures,
                    "worker finished"
                ),
                Err(e) => tracing::error!(error = %e, "worker task panicked"),
            }
        }
    }
}

fn pull_loop<E, P>(
    entity_type: &str,
    client: &WorkspaceClient,
    database_id: &str,
    projection: P,
    pool: &PgPool,
    settings: &SyncSettings,
) -> PullSyncLoop<E, WorkspaceSource<E>, P, PgSyncRepository>
where
    E: SyncRecord + FromPage,
    P: ProjectionRepository<E>,
{
    PullSyncLoop::new(
        entity_type,
        WorkspaceSource::new(client.clone(), database_id),
        projection,
        PgSyncRepository::new(pool.clone()),
        settings.lock_lease,
    )
}

fn spawn_workspace_loops(
    workers: &mut Workers,
    client: &WorkspaceClient,
    pool: &PgPool,
    settings: &SyncSettings,
) {
    let db = client.databases().clone();

    workers.spawn(
        pull_loop::<Client, _>(
            "clients",
            client,
            &db.clients,
            PgClientRepository::new(pool.clone()),
            pool,
            settings,
        ),
        settings.pull_interval,
    );
    workers.spawn(
        pull_loop::<Project, _>(
            "projects",
            client,
            &db.projects,
            PgProjectRepository::new(pool.clone()),
            pool,
            settings,
        ),
        settings.pull_interval,
    );
    workers.spawn(
        pull_loop::<Task, _>(
            "tasks",
            client,
            &db.tasks,
            PgTaskRepository::new(pool.clone()),
            pool,
            settings,
        ),
        settings.fast_pull_interval,
    );
    workers.spawn(
        pull_loop::<TimeEntry, _>(
            "time_entries",
            client,
            &db.time_entries,
            PgTimeEntryRepository::new(pool.clone()),
            pool,
            settings,
        ),
        settings.fast_pull_interval,
    );
    workers.spawn(
        pull_loop::<Feedback, _>(
            "feedback",
            client,
            &db.feedback,
            PgFeedbackRepository::new(pool.clone()),
            pool,
            settings,
        ),
        settings.pull_interval,
    );
    workers.spawn(
        pull_loop::<Absence, _>(
            "absences",
            client,
            &db.absences,
            PgAbsenceRepository::new(pool.clone()),
            pool,
            settings,
        ),
        settings.pull_interval,
    );

    workers.spawn(
        OutboxDrainLoop::<TaskCreation, _, _>::new(
            PgOutboxRepository::<TaskCreation>::new(pool.clone()),
            TaskCreationSink::new(client.clone(), db.tasks.clone()),
            settings.outbox_batch_size,
            settings.outbox_max_attempts,
        ),
        settings.outbox_interval,
    );
    workers.spawn(
        OutboxDrainLoop::<TimeWriteOff, _, _>::new(
            PgOutboxRepository::<TimeWriteOff>::new(pool.clone()),
            TimeWriteOffSink::new(client.clone(), db.time_entries.clone()),
            settings.outbox_batch_size,
            settings.outbox_max_attempts,
        ),
        settings.outbox_interval,
    );
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env().expect("invalid application configuration");
    init_tracing(&config.log_level);

    tracing::info!(service = "opsdash-ingest", "starting");

    let settings = SyncSettings::from_env().expect("invalid sync settings");

    let pool = opsdash_db::create_pool(&config.database_url, config.max_connections)
        .await
        .expect("failed to connect to database");
    opsdash_db::migrate(&pool)
        .await
        .expect("failed to apply migrations");

    let cancel = CancellationToken::new();
    let mut workers = Workers::new(cancel.clone(), settings.failure_alert_threshold);

    // Workspace loops run only when WORKSPACE_TOKEN is set
    match WorkspaceClientConfig::from_env() {
        Ok(Some(workspace_config)) => {
            tracing::info!(base_url = %workspace_config.base_url, "workspace configured, starting sync loops");
            let client =
                WorkspaceClient::new(workspace_config).expect("failed to create workspace client");
            spawn_workspace_loops(&mut workers, &client, &pool, &settings);
        }
        Ok(None) => {
            tracing::info!("no workspace token found, skipping pull and outbox loops");
        }
        Err(e) => {
            panic!("workspace configuration error (fail-fast): {e}");
        }
    }

    // Absence announcements run only when TELEGRAM_BOT_TOKEN is set
    if let Some(telegram_config) = TelegramConfig::from_env() {
        let channel =
            TelegramChannel::new(telegram_config).expect("failed to create telegram client");
        let policy = match settings.notify_policy {
            NotifyPolicySetting::All => NotifyPolicy::AllRecipients,
            NotifyPolicySetting::Any => NotifyPolicy::AnyRecipient,
        };
        let fan_out = NotificationFanOut::<Absence, _, _>::new(
            "absences",
            PgAbsenceRepository::new(pool.clone()),
            channel,
            settings.notify_recipients.clone(),
            settings.notify_delay,
            settings.notify_batch_size,
        )
        .expect("notification configuration error")
        .with_policy(policy);

        tracing::info!(
            recipients = settings.notify_recipients.len(),
            ?policy,
            "telegram configured, starting absence notifications"
        );
        workers.spawn(fan_out, settings.notify_interval);
    } else {
        tracing::info!("no telegram token found, skipping absence notifications");
    }

    if workers.is_empty() {
        tracing::warn!("nothing configured to run, exiting");
        return;
    }

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
        cancel.cancel();
    });

    workers.join_all().await;
    tracing::info!("ingest service stopped");
}
