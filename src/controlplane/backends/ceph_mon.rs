//! Ceph Monitor
//!
//! Bootstraps a brand new cluster around a single monitor. Progress is
//! tracked as a [`MonState`] so a failed bootstrap reports how far it got.

use super::BackendContext;
use crate::ceph::{
    create_admin_keyring, create_bootstrap_osd_keyring, create_mon_keyring, merge_keyrings,
    write_config, ClusterIdentity, ADMIN_KEYRING, CLUSTER, CONFIG_FILE, DAEMON_USER, MONMAP_FILE,
    MON_KEYRING, OSD_KEYRING,
};
use crate::domain::ports::{Category, DaemonDescriptor, DaemonStatus, Monitor};
use crate::error::{Error, Result};
use crate::host::CommandSpec;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Seconds the "is a cluster already running" probe waits
const PROBE_CONNECT_TIMEOUT_SECS: u32 = 1;

const MON_UNIT_TARGET: &str = "ceph-mon.target";
const MON_SLICE: &str = "system-ceph\\x2dmon.slice";

/// Bootstrap progress of the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MonState {
    Absent,
    KeysCreated,
    ConfigWritten,
    MonmapBuilt,
    ClusterInitialized,
    ServiceStarted,
    Ready,
}

/// Monitor backend that bootstraps a single-monitor cluster
pub struct CephMon {
    ctx: BackendContext,
    state: Mutex<MonState>,
    identity: Mutex<Option<ClusterIdentity>>,
}

impl CephMon {
    /// Create a new monitor backend
    pub fn new(ctx: BackendContext) -> Self {
        Self {
            ctx,
            state: Mutex::new(MonState::Absent),
            identity: Mutex::new(None),
        }
    }

    pub fn state(&self) -> MonState {
        *self.state.lock()
    }

    /// Identity of the cluster bootstrapped by this monitor
    pub fn identity(&self) -> Option<ClusterIdentity> {
        self.identity.lock().clone()
    }

    fn advance(&self, state: MonState) {
        debug!("Monitor {:?}", state);
        *self.state.lock() = state;
    }

    fn unit(&self) -> String {
        format!("ceph-mon@{}", self.ctx.hostname)
    }

    async fn build_monmap(&self, identity: &ClusterIdentity) -> Result<()> {
        let spec = CommandSpec::new("monmaptool").args([
            "--create".to_string(),
            "--clobber".to_string(),
            "--add".to_string(),
            identity.hostname.clone(),
            identity.address.ip.to_string(),
            "--fsid".to_string(),
            identity.fsid.to_string(),
            self.ctx.in_folder(MONMAP_FILE).display().to_string(),
        ]);
        self.ctx.runner.run_checked(&spec).await?;
        Ok(())
    }

    async fn initialize_cluster(&self, identity: &ClusterIdentity) -> Result<()> {
        let spec = CommandSpec::new("ceph-mon").args([
            "--cluster".to_string(),
            CLUSTER.to_string(),
            "--mkfs".to_string(),
            "-i".to_string(),
            identity.hostname.clone(),
            "--monmap".to_string(),
            self.ctx.in_folder(MONMAP_FILE).display().to_string(),
            "--keyring".to_string(),
            self.ctx.in_folder(MON_KEYRING).display().to_string(),
        ]);
        self.ctx.runner.run_checked(&spec).await?;
        Ok(())
    }
}

#[async_trait]
impl Monitor for CephMon {
    async fn create_mon(&self, interface: &str) -> Result<DaemonDescriptor> {
        let ctx = &self.ctx;
        let ceph = ctx.ceph();

        if ceph.cluster_reachable(PROBE_CONNECT_TIMEOUT_SECS).await? {
            return Err(Error::ClusterAlreadyExists);
        }

        let address = ctx.host.interface_address(interface)?;
        let identity = ClusterIdentity::generate(ctx.hostname.clone(), address);
        info!(
            "Bootstrapping cluster {} on {} ({})",
            identity.fsid, identity.hostname, address
        );
        *self.identity.lock() = Some(identity.clone());
        *self.state.lock() = MonState::Absent;

        let mon_dir = ctx.layout.mon_dir(&ctx.hostname);
        ctx.fs.create_dir(&mon_dir, 0o755)?;
        ctx.fs.create_dir(&ctx.folder, 0o775)?;

        let fs = ctx.fs.as_ref();
        create_mon_keyring(fs, &ctx.folder)?;
        create_admin_keyring(fs, &ctx.folder)?;
        create_bootstrap_osd_keyring(fs, &ctx.folder)?;
        merge_keyrings(fs, &ctx.folder, MON_KEYRING, &[ADMIN_KEYRING, OSD_KEYRING])?;
        self.advance(MonState::KeysCreated);

        let etc_ceph = ctx.layout.etc_ceph();
        let config = write_config(fs, &ctx.folder, &identity)?;
        ctx.fs.copy_file(&config, &etc_ceph.join(CONFIG_FILE))?;
        self.advance(MonState::ConfigWritten);

        self.build_monmap(&identity).await?;
        self.advance(MonState::MonmapBuilt);

        let user = ctx.host.invoking_user();
        ctx.fs.chown_recursive(&ctx.folder, &user, &user)?;

        self.initialize_cluster(&identity).await?;
        self.advance(MonState::ClusterInitialized);

        let keyring = mon_dir.join("keyring");
        ctx.fs.copy_file(&ctx.in_folder(MON_KEYRING), &keyring)?;
        ctx.fs.chown_recursive(&mon_dir, DAEMON_USER, DAEMON_USER)?;
        ctx.fs
            .copy_file(&ctx.in_folder(ADMIN_KEYRING), &etc_ceph.join(ADMIN_KEYRING))?;

        let unit = self.unit();
        ctx.services.start(&unit).await?;
        self.advance(MonState::ServiceStarted);
        if !ctx.services.is_active(&unit).await? {
            return Err(Error::DaemonNotStarted("Ceph monitor".into()));
        }

        ceph.run(["mon", "enable-msgr2"]).await?;
        self.advance(MonState::Ready);
        info!("Monitor {} is up", unit);

        Ok(DaemonDescriptor {
            category: Category::Mon,
            host: ctx.hostname.clone(),
            directory: mon_dir,
            keyring,
            status: DaemonStatus::Running,
        })
    }

    async fn remove_mon(&self) -> Result<()> {
        let ctx = &self.ctx;
        ctx.services.shutdown(MON_UNIT_TARGET).await?;
        ctx.services.stop(MON_SLICE).await?;
        ctx.fs.remove_dir(&ctx.layout.mon_dir(&ctx.hostname))?;
        *self.state.lock() = MonState::Absent;
        *self.identity.lock() = None;
        Ok(())
    }
}
