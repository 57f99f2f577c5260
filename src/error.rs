//! Error types for ramstor
//!
//! Provides structured error types for the provisioners, the orchestrator,
//! and the host capabilities they call into.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the provisioner
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Registry Errors
    // =========================================================================
    #[error("Unknown {category} backend `{name}`, choose from: {available:?}")]
    UnknownBackend {
        category: String,
        name: String,
        available: Vec<String>,
    },

    // =========================================================================
    // Host Errors
    // =========================================================================
    #[error(
        "{count} devices of {size_kib}KiB totaling {requested_kib}KiB requested when only \
         {available_kib}KiB available, reduce the number of devices or the size of the device"
    )]
    NotEnoughMemory {
        count: u32,
        size_kib: u64,
        requested_kib: u64,
        available_kib: u64,
    },

    #[error("Block device creation failed: {0}")]
    DeviceCreationFailed(String),

    #[error("Network interface `{interface}` does not exist or has no IPv4 address")]
    InterfaceNotFound { interface: String },

    // =========================================================================
    // Cluster Errors
    // =========================================================================
    #[error("A cluster is already running on this host, remove it before creating a new one")]
    ClusterAlreadyExists,

    #[error("{0} daemon failed to start, please investigate")]
    DaemonNotStarted(String),

    #[error("Ceph manager did not become available within {0:?}")]
    MgrNotStarted(Duration),

    #[error("Only {up} of {expected} OSDs came up within {timeout:?}")]
    OsdNotStarted {
        up: u64,
        expected: u64,
        timeout: Duration,
    },

    #[error("Ceph MDS did not become active within {0:?}")]
    MdsNotStarted(Duration),

    #[error("Ceph gateway did not join the cluster within {0:?}")]
    GatewayNotStarted(Duration),

    #[error("Pool {pool} did not reach {expected} active+clean PGs within {timeout:?} (observed {observed})")]
    PoolNotClean {
        pool: String,
        expected: u64,
        observed: u64,
        timeout: Duration,
    },

    #[error(
        "Mounting Ceph filesystem timed out after {0:?}, ensure the packages for the ceph \
         filesystem (ceph-mds, ceph kernel client) are installed"
    )]
    MountingFilesystemFailed(Duration),

    // =========================================================================
    // External Command Errors
    // =========================================================================
    #[error("Command `{command}` failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    CommandTimeout { command: String, timeout: Duration },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("INI parse error: {0}")]
    Ini(#[from] ini::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad classification used when reporting a failed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Checked before any external call; nothing was changed
    Precondition,
    /// A readiness poll or command ran out of time
    Timeout,
    /// An external tool or host call failed
    External,
    /// Configuration or programming error
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Precondition => write!(f, "precondition"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::External => write!(f, "external"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

impl Error {
    /// Classify this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotEnoughMemory { .. }
            | Error::ClusterAlreadyExists
            | Error::InterfaceNotFound { .. }
            | Error::UnknownBackend { .. } => ErrorCategory::Precondition,

            Error::MgrNotStarted(_)
            | Error::OsdNotStarted { .. }
            | Error::MdsNotStarted(_)
            | Error::GatewayNotStarted(_)
            | Error::PoolNotClean { .. }
            | Error::MountingFilesystemFailed(_)
            | Error::CommandTimeout { .. } => ErrorCategory::Timeout,

            Error::DeviceCreationFailed(_)
            | Error::DaemonNotStarted(_)
            | Error::CommandFailed { .. }
            | Error::JsonParse(_)
            | Error::Io(_) => ErrorCategory::External,

            Error::Internal(_) | Error::Configuration(_) | Error::Ini(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Check if this error was raised before anything was changed on the host
    pub fn is_precondition(&self) -> bool {
        self.category() == ErrorCategory::Precondition
    }

    /// Check if this error is a readiness or command timeout
    pub fn is_timeout(&self) -> bool {
        self.category() == ErrorCategory::Timeout
    }
}

/// Result type alias for ramstor
pub type Result<T> = std::result::Result<T, Error>;
