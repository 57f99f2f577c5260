//! Service Manager
//!
//! Thin wrapper over `systemctl`. Start, stop and disable are skipped
//! on hosts whose init process is not systemd; their outcome is logged but
//! never an error, so removal paths can call them on units that are already
//! stopped or were never installed.

use super::runner::{CommandRunner, CommandSpec};
use crate::error::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

const INIT_COMM: &str = "/proc/1/comm";

/// Controls init-system units through a [`CommandRunner`]
#[derive(Clone)]
pub struct ServiceManager {
    runner: Arc<dyn CommandRunner>,
    systemd: bool,
}

impl ServiceManager {
    /// Create a service manager; `systemd` says whether control commands are issued at all
    pub fn new(runner: Arc<dyn CommandRunner>, systemd: bool) -> Self {
        Self { runner, systemd }
    }

    /// Create a service manager, detecting systemd from the init process name
    pub fn detect(runner: Arc<dyn CommandRunner>) -> Self {
        let systemd = is_systemd(Path::new(INIT_COMM));
        if !systemd {
            warn!("Init process is not systemd, service control commands will be skipped");
        }
        Self::new(runner, systemd)
    }

    pub async fn start(&self, unit: &str) -> Result<()> {
        self.control("start", unit).await
    }

    pub async fn stop(&self, unit: &str) -> Result<()> {
        self.control("stop", unit).await
    }

    pub async fn disable(&self, unit: &str) -> Result<()> {
        self.control("disable", unit).await
    }

    /// Stop and disable a unit
    pub async fn shutdown(&self, unit: &str) -> Result<()> {
        self.stop(unit).await?;
        self.disable(unit).await
    }

    /// Whether the unit is currently active
    pub async fn is_active(&self, unit: &str) -> Result<bool> {
        self.query("is-active", unit).await
    }

    async fn control(&self, verb: &str, unit: &str) -> Result<()> {
        if !self.systemd {
            return Ok(());
        }
        let output = self
            .runner
            .run_tolerant(&CommandSpec::new("systemctl").args([verb, unit]))
            .await;
        if !output.success() {
            debug!("systemctl {} {} exited with {:?}", verb, unit, output.status);
        }
        Ok(())
    }

    async fn query(&self, verb: &str, unit: &str) -> Result<bool> {
        let output = self
            .runner
            .run(&CommandSpec::new("systemctl").args([verb, "--quiet", unit]))
            .await?;
        Ok(output.success())
    }
}

/// Whether the process named in `comm` is systemd
fn is_systemd(comm: &Path) -> bool {
    std::fs::read_to_string(comm)
        .map(|name| name.contains("systemd"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeCluster;
    use std::io::Write;

    #[test]
    fn test_is_systemd_reads_init_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "systemd").unwrap();
        assert!(is_systemd(file.path()));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tini").unwrap();
        assert!(!is_systemd(file.path()));

        assert!(!is_systemd(Path::new("/nonexistent/comm")));
    }

    #[tokio::test]
    async fn test_control_skipped_without_systemd() {
        let cluster = Arc::new(FakeCluster::new());
        let services = ServiceManager::new(cluster.clone(), false);
        services.start("ceph-mon@node1").await.unwrap();
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_start_then_is_active() {
        let cluster = Arc::new(FakeCluster::new());
        let services = ServiceManager::new(cluster.clone(), true);
        assert!(!services.is_active("ceph-mgr@node1").await.unwrap());
        services.start("ceph-mgr@node1").await.unwrap();
        assert!(services.is_active("ceph-mgr@node1").await.unwrap());
        services.shutdown("ceph-mgr.target").await.unwrap();
        assert!(!services.is_active("ceph-mgr@node1").await.unwrap());
    }
}
