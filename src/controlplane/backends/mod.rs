//! Cluster Backends
//!
//! Provides implementations for every capability category:
//! - brd: RAM block devices
//! - ceph_*: Ceph daemons, pools and the CephFS client mount
//!
//! All of them are built from a shared [`BackendContext`] by the factories
//! registered in [`default_registries`].

pub mod brd;
pub mod ceph_filesystem;
pub mod ceph_gateway;
pub mod ceph_mds;
pub mod ceph_mgr;
pub mod ceph_mon;
pub mod ceph_osd;
pub mod ceph_pool;
mod daemon;

pub use brd::*;
pub use ceph_filesystem::*;
pub use ceph_gateway::*;
pub use ceph_mds::*;
pub use ceph_mgr::*;
pub use ceph_mon::*;
pub use ceph_osd::*;
pub use ceph_pool::*;

use super::registry::Registries;
use crate::ceph::{CephCli, CephLayout};
use crate::config::Timeouts;
use crate::domain::ports::{
    Device, Filesystem, Gateway, Manager, MetadataServer, Monitor, ObjectStorage, PoolAllocator,
};
use crate::error::Result;
use crate::host::{CommandRunner, Host, HostFs, LocalFs, LocalHost, ProcessRunner, ServiceManager};
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// Backend Context
// =============================================================================

/// Host capabilities and settings shared by every backend
#[derive(Clone)]
pub struct BackendContext {
    /// Work folder for keyrings, `ceph.conf` and the monmap
    pub folder: PathBuf,
    pub layout: CephLayout,
    pub hostname: String,
    pub runner: Arc<dyn CommandRunner>,
    pub fs: Arc<dyn HostFs>,
    pub host: Arc<dyn Host>,
    pub services: ServiceManager,
    pub timeouts: Timeouts,
}

impl BackendContext {
    /// Create a context over the given capabilities
    pub fn new(
        folder: impl Into<PathBuf>,
        layout: CephLayout,
        runner: Arc<dyn CommandRunner>,
        fs: Arc<dyn HostFs>,
        host: Arc<dyn Host>,
        services: ServiceManager,
        timeouts: Timeouts,
    ) -> Result<Self> {
        let hostname = host.hostname()?;
        Ok(Self {
            folder: folder.into(),
            layout,
            hostname,
            runner,
            fs,
            host,
            services,
            timeouts,
        })
    }

    /// Create a context that acts on the local machine
    pub fn local(folder: impl Into<PathBuf>, timeouts: Timeouts) -> Result<Self> {
        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
        let services = ServiceManager::detect(runner.clone());
        Self::new(
            folder,
            CephLayout::system(),
            runner,
            Arc::new(LocalFs::new()),
            Arc::new(LocalHost::new()),
            services,
            timeouts,
        )
    }

    pub fn ceph(&self) -> CephCli {
        CephCli::new(self.runner.clone())
    }

    /// `<folder>/<name>`
    pub fn in_folder(&self, name: &str) -> PathBuf {
        self.folder.join(name)
    }
}

// =============================================================================
// Default Registries
// =============================================================================

fn brd_device(ctx: &BackendContext) -> Arc<dyn Device> {
    Arc::new(BrdDevice::new(ctx.clone()))
}

fn ceph_filesystem(ctx: &BackendContext) -> Arc<dyn Filesystem> {
    Arc::new(CephFilesystem::new(ctx.clone()))
}

fn ceph_gateway(ctx: &BackendContext) -> Arc<dyn Gateway> {
    Arc::new(CephGateway::new(ctx.clone()))
}

fn ceph_mds(ctx: &BackendContext) -> Arc<dyn MetadataServer> {
    Arc::new(CephMds::new(ctx.clone()))
}

fn ceph_mgr(ctx: &BackendContext) -> Arc<dyn Manager> {
    Arc::new(CephMgr::new(ctx.clone()))
}

fn ceph_mon(ctx: &BackendContext) -> Arc<dyn Monitor> {
    Arc::new(CephMon::new(ctx.clone()))
}

fn ceph_osd(ctx: &BackendContext) -> Arc<dyn ObjectStorage> {
    Arc::new(CephOsd::new(ctx.clone()))
}

fn ceph_pool(ctx: &BackendContext) -> Arc<dyn PoolAllocator> {
    Arc::new(CephPool::new(ctx.clone()))
}

/// Registries holding every built-in backend
pub fn default_registries() -> Registries {
    let registries = Registries::empty();
    Registries {
        device: registries.device.register("brd", brd_device),
        filesystem: registries.filesystem.register("ceph", ceph_filesystem),
        gateway: registries.gateway.register("ceph", ceph_gateway),
        mds: registries.mds.register("ceph", ceph_mds),
        mgr: registries.mgr.register("ceph", ceph_mgr),
        mon: registries.mon.register("ceph", ceph_mon),
        osd: registries.osd.register("ceph", ceph_osd),
        pool: registries.pool.register("ceph", ceph_pool),
    }
}
