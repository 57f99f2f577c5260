//! CephFS Mount
//!
//! Mounts the cluster's filesystem with the kernel client and hands the
//! mount point to the invoking user.

use super::BackendContext;
use crate::ceph::read_mon_host;
use crate::controlplane::poll::PollOutcome;
use crate::domain::ports::Filesystem;
use crate::error::{Error, Result};
use crate::host::CommandSpec;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MON_PORT: u16 = 6789;

#[derive(Debug, Deserialize)]
struct MountEntry {
    target: String,
    source: String,
}

/// `findmnt --json` output
#[derive(Debug, Default, Deserialize)]
struct MountTable {
    #[serde(default)]
    filesystems: Vec<MountEntry>,
}

/// Kernel CephFS client mounting at the layout's mount point
pub struct CephFilesystem {
    ctx: BackendContext,
}

impl CephFilesystem {
    /// Create a new filesystem backend
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }

    fn mount_point(&self) -> PathBuf {
        self.ctx.layout.mount_point()
    }

    async fn is_mounted(&self, target: &Path) -> Result<bool> {
        let spec = CommandSpec::new("mountpoint").args(["-q".to_string(), target.display().to_string()]);
        Ok(self.ctx.runner.run(&spec).await?.success())
    }

    /// One mount attempt; true once the target is a mount point
    async fn try_mount(&self, target: &Path, secret: &str) -> Result<bool> {
        if self.is_mounted(target).await? {
            return Ok(true);
        }
        let spec = CommandSpec::new("mount")
            .args([
                "-t".to_string(),
                "ceph".to_string(),
                ":/".to_string(),
                target.display().to_string(),
                "-o".to_string(),
                format!("name=admin,secret={}", secret),
            ])
            .redact(secret);
        let output = self.ctx.runner.run(&spec).await?;
        if !output.success() {
            debug!("mount attempt failed: {}", output.stderr.trim());
        }
        self.is_mounted(target).await
    }

    /// Ceph mounts currently on this host
    async fn ceph_mounts(&self) -> Result<MountTable> {
        let spec = CommandSpec::new("findmnt").args(["-t", "ceph", "--json", "--list"]);
        let output = self.ctx.runner.run_tolerant(&spec).await;
        if !output.success() || output.stdout.trim().is_empty() {
            return Ok(MountTable::default());
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }
}

#[async_trait]
impl Filesystem for CephFilesystem {
    async fn mount_filesystem(&self) -> Result<PathBuf> {
        let secret = self.ctx.ceph().auth_print_key("client.admin").await?;
        let target = self.mount_point();
        self.ctx.fs.create_dir(&target, 0o755)?;

        let poll = self.ctx.timeouts.mount_poll();
        match poll
            .until("mount", || self.try_mount(&target, &secret), |mounted| *mounted)
            .await
        {
            PollOutcome::Ready(_) => {}
            PollOutcome::TimedOut(_) => return Err(Error::MountingFilesystemFailed(poll.timeout)),
        }

        let user = self.ctx.host.invoking_user();
        self.ctx.fs.chown_recursive(&target, &user, &user)?;
        info!("CephFS mounted at {:?} for {}", target, user);
        Ok(target)
    }

    async fn unmount_filesystem(&self) -> Result<()> {
        let target = self.mount_point();
        let source = match read_mon_host(&self.ctx.folder) {
            Ok(host) => Some(format!("{}:{}:/", host, MON_PORT)),
            Err(e) => {
                debug!("No monitor address for unmount: {}", e);
                None
            }
        };

        let target_str = target.display().to_string();
        for entry in self.ceph_mounts().await?.filesystems {
            let ours = entry.target == target_str || source.as_deref() == Some(entry.source.as_str());
            if !ours {
                continue;
            }
            let spec = CommandSpec::new("umount").arg(entry.target.clone());
            let output = self.ctx.runner.run_tolerant(&spec).await;
            if output.success() {
                info!("Unmounted {}", entry.target);
            } else {
                warn!("Could not unmount {}: {}", entry.target, output.stderr.trim());
            }
        }

        self.ctx.fs.remove_dir(&target)?;
        Ok(())
    }
}
