use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use opsdash_common::error::{OpsError, OpsResult};

/// A Postgres transaction that owns its pooled connection.
pub type PgTx = Transaction<'static, Postgres>;

/// Begin/commit/rollback over an implementation-defined transaction handle.
///
/// Dropping a handle without committing must discard its work.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Tx: Send;

    async fn begin(&self) -> OpsResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> OpsResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> OpsResult<()>;
}

pub(crate) async fn begin_pg(pool: &PgPool) -> OpsResult<PgTx> {
    pool.begin()
        .await
        .map_err(|e| OpsError::Database(e.to_string()))
}

pub(crate) async fn commit_pg(tx: PgTx) -> OpsResult<()> {
    tx.commit()
        .await
        .map_err(|e| OpsError::Database(e.to_string()))
}

pub(crate) async fn rollback_pg(tx: PgTx) -> OpsResult<()> {
    tx.rollback()
        .await
        .map_err(|e| OpsError::Database(e.to_string()))
}

/// Implements [`TransactionManager`] for a repository holding a `pool: PgPool` field.
macro_rules! pg_transaction_manager {
    ($repo:ty) => {
        #[async_trait::async_trait]
        impl $crate::transaction::TransactionManager for $repo {
            type Tx = $crate::transaction::PgTx;

            async fn begin(&self) -> opsdash_common::error::OpsResult<Self::Tx> {
                $crate::transaction::begin_pg(&self.pool).await
            }

            async fn commit(&self, tx: Self::Tx) -> opsdash_common::error::OpsResult<()> {
                $crate::transaction::commit_pg(tx).await
            }

            async fn rollback(&self, tx: Self::Tx) -> opsdash_common::error::OpsResult<()> {
                $crate::transaction::rollback_pg(tx).await
            }
        }
    };
}

pub(crate) use pg_transaction_manager;
