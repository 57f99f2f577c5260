//! ramstor - Ephemeral RAM-backed Ceph Clusters
//!
//! Provisions a single-node Ceph cluster on RAM block devices for the
//! lifetime of a compute job, and tears it down again afterwards.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                  Cluster Lifecycle Orchestrator                      │
//! │   devices -> mon -> mgr -> osds -> (mds + mount | gateway + s3 user) │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │                 Backends (resolved once from registries)             │
//! │  ┌────────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐ ┌─────────┐ ┌──────────┐ │
//! │  │ device │ │ mon │ │ mgr │ │ osd │ │ mds │ │ gateway │ │ pool/fs  │ │
//! │  │ (brd)  │ │     │ │     │ │     │ │     │ │         │ │          │ │
//! │  └────────┘ └─────┘ └─────┘ └─────┘ └─────┘ └─────────┘ └──────────┘ │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   Ceph primitives: layout, keyrings, ceph.conf, CLI status probes    │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   Host capabilities: CommandRunner, ServiceManager, HostFs, Host     │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`controlplane`]: Registries, backends, readiness polling, orchestrator
//! - [`ceph`]: Layout, keyrings, cluster config and the `ceph` CLI facade
//! - [`host`]: Ports onto the local machine
//! - [`config`]: Configuration file loading
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod ceph;
pub mod config;
pub mod controlplane;
pub mod domain;
pub mod error;
pub mod host;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use config::{RamConfig, RuntimeConfig, ServiceKind, SetupConfig, Timeouts};

pub use controlplane::{
    default_registries, Action, BackendContext, BackendSelection, Backends, Deployment,
    Orchestrator, Registries, Registry, ServiceEndpoint,
};

pub use domain::ports::{
    Category, DaemonDescriptor, DaemonStatus, Device, Filesystem, Gateway, Manager,
    MetadataServer, Monitor, ObjectStorage, PoolAllocator, PoolSpec, S3Credentials,
};

pub use error::{Error, ErrorCategory, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
