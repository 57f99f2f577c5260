//! Ceph Object Storage Daemons
//!
//! One OSD per block device, created with `ceph-volume lvm create`. The
//! devices are independent: one failing does not undo the others, and the
//! readiness poll reports the shortfall.

use super::BackendContext;
use crate::ceph::{ADMIN_KEYRING, CONFIG_FILE, DAEMON_USER, OSD_KEYRING};
use crate::controlplane::poll::PollOutcome;
use crate::domain::ports::ObjectStorage;
use crate::error::{Error, Result};
use crate::host::CommandSpec;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const OSD_ENTITY: &str = "client.bootstrap-osd";
const OSD_TARGET: &str = "ceph-osd.target";
const OSD_SLICE: &str = "system-ceph\\x2dosd.slice";

/// Object storage backend over `ceph-volume`
pub struct CephOsd {
    ctx: BackendContext,
}

impl CephOsd {
    /// Create a new OSD backend
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }

    /// Export the bootstrap-osd key into the work folder; returns the keyring file name
    async fn add_osd(&self) -> Result<&'static str> {
        self.ctx
            .ceph()
            .auth_get_or_create(
                OSD_ENTITY,
                &[("mon", "profile bootstrap-osd"), ("mgr", "allow r")],
                &self.ctx.in_folder(OSD_KEYRING),
            )
            .await?;
        Ok(OSD_KEYRING)
    }

    /// Directories and files `ceph-volume` expects to find
    fn prepare_host(&self, keyring: &str) -> Result<()> {
        let ctx = &self.ctx;
        let layout = &ctx.layout;
        for dir in [layout.bootstrap_osd_dir(), layout.osd_dir()] {
            ctx.fs.create_dir(&dir, 0o755)?;
            ctx.fs.chown_recursive(&dir, DAEMON_USER, DAEMON_USER)?;
        }

        let etc_ceph = layout.etc_ceph();
        ctx.fs
            .copy_file(&ctx.in_folder(CONFIG_FILE), &etc_ceph.join(CONFIG_FILE))?;
        ctx.fs
            .copy_file(&ctx.in_folder(ADMIN_KEYRING), &etc_ceph.join(ADMIN_KEYRING))?;
        ctx.fs
            .copy_file(&ctx.in_folder(keyring), &etc_ceph.join("ceph.keyring"))?;
        ctx.fs.copy_file(
            &ctx.in_folder(keyring),
            &layout.bootstrap_osd_dir().join("ceph.keyring"),
        )?;
        Ok(())
    }

    /// OSD ids with a data directory on this host
    fn local_osd_ids(&self) -> Result<Vec<String>> {
        let ids = glob_paths(&self.ctx.layout.osd_id_pattern())?
            .iter()
            .filter_map(|path| path.file_name()?.to_str()?.strip_prefix("ceph-"))
            .map(str::to_string)
            .collect();
        Ok(ids)
    }
}

fn glob_paths(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern)
        .map_err(|e| Error::Internal(format!("Invalid glob pattern {}: {}", pattern, e)))?;
    Ok(paths.filter_map(|entry| entry.ok()).collect())
}

fn device_arg(device: &Path) -> String {
    device.display().to_string()
}

#[async_trait]
impl ObjectStorage for CephOsd {
    async fn create_osds(&self, devices: &[PathBuf]) -> Result<u64> {
        let keyring = self.add_osd().await?;
        self.prepare_host(keyring)?;

        for device in devices {
            let spec = CommandSpec::new("ceph-volume").args([
                "lvm".to_string(),
                "create".to_string(),
                "--data".to_string(),
                device_arg(device),
            ]);
            let output = self.ctx.runner.run(&spec).await?;
            if output.success() {
                debug!("Created OSD on {:?}", device);
            } else {
                warn!(
                    "ceph-volume failed for {:?}: {}",
                    device,
                    output.stderr.trim()
                );
            }
        }

        let expected = devices.len() as u64;
        let ceph = self.ctx.ceph();
        let poll = self.ctx.timeouts.daemon_poll();
        match poll
            .until("OSDs", || ceph.osd_stat(), |stat| stat.num_up_osds == expected)
            .await
        {
            PollOutcome::Ready(stat) => {
                info!("{} OSDs are up", stat.num_up_osds);
                Ok(stat.num_up_osds)
            }
            PollOutcome::TimedOut(last) => Err(Error::OsdNotStarted {
                up: last.map(|stat| stat.num_up_osds).unwrap_or(0),
                expected,
                timeout: poll.timeout,
            }),
        }
    }

    async fn remove_osds(&self, devices: &[PathBuf]) -> Result<()> {
        let ctx = &self.ctx;
        let ceph = ctx.ceph();

        for id in self.local_osd_ids()? {
            let output = ceph.run_quiet(["osd", "out", id.as_str()]).await;
            if !output.success() {
                debug!("Could not mark osd.{} out", id);
            }
            ctx.services.stop(&format!("ceph-osd@{}", id)).await?;
            ctx.services
                .stop(&format!("var-lib-ceph-osd-ceph\\x2d{}.mount", id))
                .await?;
        }
        ctx.services.shutdown(OSD_TARGET).await?;

        for device in devices {
            let spec = CommandSpec::new("ceph-volume").args([
                "lvm".to_string(),
                "zap".to_string(),
                "--destroy".to_string(),
                device_arg(device),
            ]);
            let output = ctx.runner.run_tolerant(&spec).await;
            if !output.success() {
                debug!("Could not zap {:?}: {}", device, output.stderr.trim());
            }
        }

        for unit in glob_paths(&ctx.layout.ceph_volume_units_pattern())? {
            ctx.fs.remove_file(&unit)?;
        }
        ctx.services.stop(OSD_SLICE).await?;

        ctx.fs.remove_dir(&ctx.layout.bootstrap_osd_dir())?;
        ctx.fs.remove_dir(&ctx.layout.osd_dir())?;
        Ok(())
    }
}
