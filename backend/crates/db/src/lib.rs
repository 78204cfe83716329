pub mod absences;
pub mod clients;
pub mod feedback;
pub mod outbox;
pub mod projection;
pub mod projects;
pub mod sync;
pub mod tasks;
pub mod time_entries;
pub mod transaction;

use opsdash_common::error::{OpsError, OpsResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Create a Postgres connection pool from a database URL.
///
/// The notification fan-out opens one transaction per eligible record, so
/// `max_connections` should be at least the fan-out batch size.
pub async fn create_pool(database_url: &str, max_connections: u32) -> OpsResult<PgPool> {
    tracing::info!(max_connections, "connecting to database");
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))
}

/// Apply the embedded schema migrations.
pub async fn migrate(pool: &PgPool) -> OpsResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| OpsError::Database(e.to_string()))
}
