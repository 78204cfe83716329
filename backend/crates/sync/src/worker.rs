use async_trait::async_trait;

use opsdash_common::error::OpsResult;

/// Summary returned by one cycle of a background worker.
pub trait CycleReport: std::fmt::Debug + Send {
    /// The cycle finished but left work behind that it failed on.
    fn is_degraded(&self) -> bool {
        false
    }
}

/// A unit of background work executed once per tick.
#[async_trait]
pub trait Worker: Send + Sync {
    type Outcome: CycleReport;

    fn name(&self) -> &str;

    async fn run_once(&self) -> OpsResult<Self::Outcome>;
}
