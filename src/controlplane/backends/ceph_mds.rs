//! Ceph Metadata Server
//!
//! Runs the MDS and creates the `cephfs` filesystem it serves, together with
//! the data and metadata pools behind it.

use super::daemon::DaemonUnit;
use super::{BackendContext, CephPool};
use crate::ceph::keyring_file_name;
use crate::controlplane::poll::PollOutcome;
use crate::domain::ports::{Category, DaemonDescriptor, MetadataServer, PoolAllocator};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

pub const FILESYSTEM_NAME: &str = "cephfs";
pub const DATA_POOL: &str = "cephfs_data";
pub const METADATA_POOL: &str = "cephfs_metadata";

/// Pools backing the filesystem and their share of the cluster
pub const FILESYSTEM_POOLS: [(&str, f64); 2] = [(DATA_POOL, 0.90), (METADATA_POOL, 0.10)];

/// Metadata server backend running `ceph-mds@<host>`
pub struct CephMds {
    ctx: BackendContext,
    pools: CephPool,
}

impl CephMds {
    /// Create a new metadata server backend
    pub fn new(ctx: BackendContext) -> Self {
        let pools = CephPool::new(ctx.clone());
        Self { ctx, pools }
    }

    fn entity(&self) -> String {
        format!("mds.{}", self.ctx.hostname)
    }

    fn daemon(&self) -> DaemonUnit {
        DaemonUnit::new(
            Category::Mds,
            "mds",
            &self.ctx.hostname,
            self.ctx.layout.mds_dir(&self.ctx.hostname),
        )
    }

    /// Register the MDS key with the cluster; returns the keyring file name
    async fn add_mds(&self) -> Result<String> {
        let entity = self.entity();
        let keyring = keyring_file_name(&entity);
        self.ctx
            .ceph()
            .auth_get_or_create(
                &entity,
                &[
                    ("osd", "allow rwx"),
                    ("mds", "allow"),
                    ("mon", "allow profile mds"),
                ],
                &self.ctx.in_folder(&keyring),
            )
            .await?;
        Ok(keyring)
    }
}

#[async_trait]
impl MetadataServer for CephMds {
    async fn create_mds(&self) -> Result<DaemonDescriptor> {
        let keyring = self.add_mds().await?;
        let daemon = self.daemon();
        daemon.prepare(&self.ctx, &keyring)?;
        daemon.start(&self.ctx).await?;

        for (pool, percentage) in FILESYSTEM_POOLS {
            self.pools.create_pool(pool, percentage).await?;
        }
        let ceph = self.ctx.ceph();
        ceph.run(["fs", "new", FILESYSTEM_NAME, METADATA_POOL, DATA_POOL])
            .await?;

        let poll = self.ctx.timeouts.daemon_poll();
        match poll
            .until("MDS", || ceph.active_mds_count(), |active| *active == 1)
            .await
        {
            PollOutcome::Ready(_) => {
                info!("Filesystem {} is served by {}", FILESYSTEM_NAME, daemon.unit);
                daemon.describe(&self.ctx).await
            }
            PollOutcome::TimedOut(_) => Err(Error::MdsNotStarted(poll.timeout)),
        }
    }

    async fn remove_mds(&self) -> Result<()> {
        let ceph = self.ctx.ceph();
        let output = ceph.run_quiet(["fs", "fail", FILESYSTEM_NAME]).await;
        if output.success() {
            debug!("Failed filesystem {}", FILESYSTEM_NAME);
        }
        let output = ceph
            .run_quiet(["fs", "rm", FILESYSTEM_NAME, "--yes-i-really-mean-it"])
            .await;
        if !output.success() {
            debug!("Could not remove filesystem {}: {}", FILESYSTEM_NAME, output.stderr.trim());
        }
        self.daemon().remove(&self.ctx).await
    }
}
