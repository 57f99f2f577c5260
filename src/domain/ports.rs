//! Domain Ports - Core trait definitions for the cluster provisioner
//!
//! One trait per capability category. Backends implement these traits and
//! are selected through the registry; the orchestrator only sees the traits.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Capability Categories
// =============================================================================

/// Categories of pluggable backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Device,
    Filesystem,
    Gateway,
    Mds,
    Mgr,
    Mon,
    Osd,
    Pool,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Device => write!(f, "device"),
            Category::Filesystem => write!(f, "filesystem"),
            Category::Gateway => write!(f, "gateway"),
            Category::Mds => write!(f, "mds"),
            Category::Mgr => write!(f, "mgr"),
            Category::Mon => write!(f, "mon"),
            Category::Osd => write!(f, "osd"),
            Category::Pool => write!(f, "pool"),
        }
    }
}

// =============================================================================
// Provisioned State
// =============================================================================

/// Whether a daemon passed its readiness check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonStatus {
    Running,
    NotRunning,
}

impl DaemonStatus {
    pub fn from_active(active: bool) -> Self {
        if active {
            DaemonStatus::Running
        } else {
            DaemonStatus::NotRunning
        }
    }
}

/// A provisioned daemon instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonDescriptor {
    pub category: Category,
    /// Host the daemon runs on
    pub host: String,
    /// Runtime directory
    pub directory: PathBuf,
    /// Keyring file the daemon authenticates with
    pub keyring: PathBuf,
    pub status: DaemonStatus,
}

/// A created storage pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSpec {
    pub name: String,
    /// Share of cluster capacity, in (0, 1]
    pub percentage: f64,
    pub pg_count: u64,
}

/// Object-storage user credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Credentials {
    pub user: String,
    pub access_key: String,
    pub secret_key: String,
    pub endpoint: String,
}

// =============================================================================
// Device Port
// =============================================================================

/// Block devices backing the OSDs
#[async_trait]
pub trait Device: Send + Sync {
    /// Create `count` devices of `size_gib` GiB each and return their paths
    async fn create_devices(&self, size_gib: u64, count: u32) -> Result<Vec<PathBuf>>;

    /// Remove every device; absent devices are not an error
    async fn remove_devices(&self) -> Result<()>;

    /// Paths the first `count` devices have (or would have)
    fn device_paths(&self, count: u32) -> Vec<PathBuf>;
}

// =============================================================================
// Daemon Ports
// =============================================================================

/// Cluster monitor
#[async_trait]
pub trait Monitor: Send + Sync {
    /// Bootstrap a new cluster on `interface` and start its first monitor
    async fn create_mon(&self, interface: &str) -> Result<DaemonDescriptor>;

    async fn remove_mon(&self) -> Result<()>;
}

/// Cluster manager
#[async_trait]
pub trait Manager: Send + Sync {
    async fn create_mgr(&self) -> Result<DaemonDescriptor>;

    async fn remove_mgr(&self) -> Result<()>;
}

/// Object-storage daemons
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create one OSD per device; returns the number of OSDs up
    async fn create_osds(&self, devices: &[PathBuf]) -> Result<u64>;

    async fn remove_osds(&self, devices: &[PathBuf]) -> Result<()>;
}

/// Metadata server, including the filesystem it serves
#[async_trait]
pub trait MetadataServer: Send + Sync {
    async fn create_mds(&self) -> Result<DaemonDescriptor>;

    async fn remove_mds(&self) -> Result<()>;
}

/// Object gateway
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn create_gateway(&self) -> Result<DaemonDescriptor>;

    /// Create an object-storage user and write its credentials file
    async fn create_s3_user(&self) -> Result<S3Credentials>;

    async fn remove_gateway(&self) -> Result<()>;
}

// =============================================================================
// Pool & Filesystem Ports
// =============================================================================

/// Pool sizing and allocation
#[async_trait]
pub trait PoolAllocator: Send + Sync {
    /// Create a pool sized to `percentage` of the cluster and wait for it to settle
    async fn create_pool(&self, name: &str, percentage: f64) -> Result<PoolSpec>;

    /// Purge and delete every pool
    async fn remove_pools(&self) -> Result<()>;
}

/// Client mount of the cluster filesystem
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Mount and return the mount point
    async fn mount_filesystem(&self) -> Result<PathBuf>;

    async fn unmount_filesystem(&self) -> Result<()>;
}
