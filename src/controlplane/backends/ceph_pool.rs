//! Ceph Pools
//!
//! Sizes placement groups from the OSD count and the share of the cluster a
//! pool gets, creates the pool, and waits for its PGs to settle.

use super::BackendContext;
use crate::controlplane::poll::PollOutcome;
use crate::domain::ports::{PoolAllocator, PoolSpec};
use crate::error::{Error, Result};
use crate::host::CommandSpec;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Target number of PGs per OSD
pub const TARGET_PGS: u64 = 100;

/// PG count for a pool holding `percentage` of a cluster with `osds` OSDs.
///
/// `2^round(log2(TARGET_PGS * osds * percentage))`, never below 1.
pub fn pg_count(osds: u64, percentage: f64) -> u64 {
    let target = (TARGET_PGS * osds) as f64 * percentage;
    if !(target > 1.0) {
        return 1;
    }
    let exponent = target.log2().round() as u32;
    1u64 << exponent.min(62)
}

/// Pool backend over `ceph osd pool`
pub struct CephPool {
    ctx: BackendContext,
}

impl CephPool {
    /// Create a new pool backend
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PoolAllocator for CephPool {
    async fn create_pool(&self, name: &str, percentage: f64) -> Result<PoolSpec> {
        if !(percentage > 0.0 && percentage <= 1.0) {
            return Err(Error::Configuration(format!(
                "Pool {} percentage {} is outside (0, 1]",
                name, percentage
            )));
        }

        let ceph = self.ctx.ceph();
        let previous = ceph.current_pg_count().await?;
        let osds = ceph.osd_stat().await?.num_osds;
        let pgs = pg_count(osds, percentage);
        info!("Creating pool {} with {} PGs", name, pgs);

        let pgs_arg = pgs.to_string();
        ceph.run(["osd", "pool", "create", name, pgs_arg.as_str(), pgs_arg.as_str()])
            .await?;

        let expected = previous + pgs;
        let poll = self.ctx.timeouts.pool_poll();
        match poll
            .until("pool PGs", || ceph.status(), |status| {
                status.pgmap.active_clean() == expected
            })
            .await
        {
            PollOutcome::Ready(_) => {
                debug!("Pool {} settled with {} active+clean PGs", name, expected);
                Ok(PoolSpec {
                    name: name.to_string(),
                    percentage,
                    pg_count: pgs,
                })
            }
            PollOutcome::TimedOut(last) => Err(Error::PoolNotClean {
                pool: name.to_string(),
                expected,
                observed: last.map(|status| status.pgmap.active_clean()).unwrap_or(0),
                timeout: poll.timeout,
            }),
        }
    }

    async fn remove_pools(&self) -> Result<()> {
        let ceph = self.ctx.ceph();
        for pool in ceph.lspools().await? {
            let name = pool.poolname.as_str();
            debug!("Purging pool {}", name);

            let purge = CommandSpec::new("rados").args([
                "purge",
                name,
                "--yes-i-really-really-mean-it",
                "--connect-timeout",
                "5",
            ]);
            let output = self.ctx.runner.run_tolerant(&purge).await;
            if !output.success() {
                warn!("Could not purge pool {}: {}", name, output.stderr.trim());
            }

            let output = ceph
                .run_quiet(["osd", "pool", "delete", name, name, "--yes-i-really-really-mean-it"])
                .await;
            if !output.success() {
                warn!("Could not delete pool {}: {}", name, output.stderr.trim());
            }
        }
        Ok(())
    }
}
