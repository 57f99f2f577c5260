//! Cluster Lifecycle Orchestrator
//!
//! Drives the resolved backends through bootstrap and teardown:
//!
//! ```text
//! create:  devices -> mon -> mgr -> osds -> (mds -> mount | gateway -> s3 user)
//! remove:  unmount -> gateway -> mds -> pools -> osds -> mgr -> mon -> devices
//! ```
//!
//! Bootstrap stops at the first error and returns it unchanged. Teardown runs
//! every step and only logs failures, so it can clean up after a partial
//! bootstrap and can be repeated.

use crate::config::{RuntimeConfig, ServiceKind};
use crate::controlplane::registry::Backends;
use crate::domain::ports::{DaemonDescriptor, S3Credentials};
use crate::error::Result;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use tracing::{info, warn};

// =============================================================================
// Action
// =============================================================================

/// What to do with the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Action {
    Create,
    Remove,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Create => write!(f, "create"),
            Action::Remove => write!(f, "remove"),
        }
    }
}

// =============================================================================
// Deployment
// =============================================================================

/// Client-facing service brought up by the last bootstrap stage
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEndpoint {
    Filesystem {
        mds: DaemonDescriptor,
        mount_point: PathBuf,
    },
    ObjectStore {
        gateway: DaemonDescriptor,
        credentials: S3Credentials,
    },
}

/// What a successful bootstrap produced
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub devices: Vec<PathBuf>,
    pub mon: DaemonDescriptor,
    pub mgr: DaemonDescriptor,
    pub osds_up: u64,
    pub service: ServiceEndpoint,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Sequences the backends for one cluster on this host
pub struct Orchestrator {
    config: RuntimeConfig,
    backends: Backends,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(config: RuntimeConfig, backends: Backends) -> Self {
        Self { config, backends }
    }

    /// Run `action`
    pub async fn run(&self, action: Action) -> Result<()> {
        match action {
            Action::Create => {
                let deployment = self.bootstrap().await?;
                match &deployment.service {
                    ServiceEndpoint::Filesystem { mount_point, .. } => {
                        info!("Cluster ready, CephFS mounted at {:?}", mount_point)
                    }
                    ServiceEndpoint::ObjectStore { credentials, .. } => {
                        info!("Cluster ready, S3 endpoint {}", credentials.endpoint)
                    }
                }
                Ok(())
            }
            Action::Remove => {
                self.teardown().await;
                Ok(())
            }
        }
    }

    /// Bring the cluster up; the first failing step aborts the sequence
    pub async fn bootstrap(&self) -> Result<Deployment> {
        let setup = &self.config.setup;
        let ram = &self.config.ram;
        let b = &self.backends;
        info!(
            "Bootstrapping cluster: {} x {} GiB devices, service {}",
            ram.number, ram.size_in_gb, setup.service
        );

        let devices = if ram.number > 0 {
            info!("Creating {} RAM devices", ram.number);
            b.device.create_devices(ram.size_in_gb, ram.number).await?
        } else {
            Vec::new()
        };

        info!("Creating monitor on {}", setup.interface);
        let mon = b.mon.create_mon(&setup.interface).await?;

        info!("Creating manager");
        let mgr = b.mgr.create_mgr().await?;

        info!("Creating {} OSDs", devices.len());
        let osds_up = b.osd.create_osds(&devices).await?;

        let service = match setup.service {
            ServiceKind::Cephfs => {
                info!("Creating metadata server");
                let mds = b.mds.create_mds().await?;
                info!("Mounting CephFS");
                let mount_point = b.filesystem.mount_filesystem().await?;
                ServiceEndpoint::Filesystem { mds, mount_point }
            }
            ServiceKind::S3 => {
                info!("Creating object gateway");
                let gateway = b.gateway.create_gateway().await?;
                info!("Creating S3 user");
                let credentials = b.gateway.create_s3_user().await?;
                ServiceEndpoint::ObjectStore {
                    gateway,
                    credentials,
                }
            }
        };

        info!("Cluster bootstrap complete");
        Ok(Deployment {
            devices,
            mon,
            mgr,
            osds_up,
            service,
        })
    }

    /// Take the cluster down in reverse order, continuing past failures
    pub async fn teardown(&self) {
        let b = &self.backends;
        let devices = b.device.device_paths(self.config.ram.number);
        info!("Tearing down cluster");

        best_effort("unmount filesystem", b.filesystem.unmount_filesystem()).await;
        best_effort("remove gateway", b.gateway.remove_gateway()).await;
        best_effort("remove metadata server", b.mds.remove_mds()).await;
        best_effort("remove pools", b.pool.remove_pools()).await;
        best_effort("remove OSDs", b.osd.remove_osds(&devices)).await;
        best_effort("remove manager", b.mgr.remove_mgr()).await;
        best_effort("remove monitor", b.mon.remove_mon()).await;
        best_effort("remove devices", b.device.remove_devices()).await;

        info!("Cluster teardown complete");
    }
}

async fn best_effort<F>(step: &str, fut: F)
where
    F: Future<Output = Result<()>>,
{
    info!("Teardown: {}", step);
    if let Err(e) = fut.await {
        warn!("Teardown step `{}` failed ({}): {}", step, e.category(), e);
    }
}
