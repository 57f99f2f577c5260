//! Ceph Manager

use super::daemon::DaemonUnit;
use super::BackendContext;
use crate::ceph::keyring_file_name;
use crate::controlplane::poll::PollOutcome;
use crate::domain::ports::{Category, DaemonDescriptor, Manager};
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::info;

/// Manager backend running `ceph-mgr@<host>`
pub struct CephMgr {
    ctx: BackendContext,
}

impl CephMgr {
    /// Create a new manager backend
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }

    fn entity(&self) -> String {
        format!("mgr.{}", self.ctx.hostname)
    }

    fn daemon(&self) -> DaemonUnit {
        DaemonUnit::new(
            Category::Mgr,
            "mgr",
            &self.ctx.hostname,
            self.ctx.layout.mgr_dir(&self.ctx.hostname),
        )
    }

    /// Register the manager's key with the cluster; returns the keyring file name
    async fn add_mgr(&self) -> Result<String> {
        let entity = self.entity();
        let keyring = keyring_file_name(&entity);
        self.ctx
            .ceph()
            .auth_get_or_create(
                &entity,
                &[
                    ("mon", "allow profile mgr"),
                    ("osd", "allow *"),
                    ("mds", "allow *"),
                ],
                &self.ctx.in_folder(&keyring),
            )
            .await?;
        Ok(keyring)
    }
}

#[async_trait]
impl Manager for CephMgr {
    async fn create_mgr(&self) -> Result<DaemonDescriptor> {
        let keyring = self.add_mgr().await?;
        let daemon = self.daemon();
        daemon.prepare(&self.ctx, &keyring)?;
        daemon.start(&self.ctx).await?;

        let ceph = self.ctx.ceph();
        let poll = self.ctx.timeouts.daemon_poll();
        match poll.until("manager", || ceph.mgr_stat(), |stat| stat.available).await {
            PollOutcome::Ready(stat) => {
                info!("Manager {} is available", stat.active_name);
                daemon.describe(&self.ctx).await
            }
            PollOutcome::TimedOut(_) => Err(Error::MgrNotStarted(poll.timeout)),
        }
    }

    async fn remove_mgr(&self) -> Result<()> {
        self.daemon().remove(&self.ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ceph::read_keyring;
    use crate::testing::TestBed;
    use assert_matches::assert_matches;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_create_mgr() {
        let bed = TestBed::new();
        bed.cluster.set_monitor_up(true);
        let mgr = CephMgr::new(bed.context());

        let descriptor = mgr.create_mgr().await.unwrap();
        assert_eq!(descriptor.category, Category::Mgr);
        assert_eq!(descriptor.directory, bed.layout().mgr_dir("node1"));
        let installed = read_keyring(&descriptor.keyring).unwrap();
        assert_eq!(installed[0].subject, "mgr.node1");

        let calls = bed.cluster.calls();
        assert!(calls[0].starts_with(
            "ceph auth get-or-create mgr.node1 mon allow profile mgr osd allow * mds allow * -o"
        ));
        assert_eq!(calls[1], "systemctl start ceph-mgr@node1");
        assert!(bed.cluster.is_unit_active("ceph-mgr@node1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mgr_never_available() {
        let bed = TestBed::new();
        bed.cluster.set_monitor_up(true);
        bed.cluster.fail_on("ceph mgr stat");
        let mgr = CephMgr::new(bed.context());

        let err = mgr.create_mgr().await.unwrap_err();
        assert_matches!(err, Error::MgrNotStarted(timeout) if timeout == Duration::from_secs(2));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unit_not_active() {
        let bed = TestBed::new();
        bed.cluster.set_monitor_up(true);
        bed.cluster.fail_on("systemctl start");
        let err = CephMgr::new(bed.context()).create_mgr().await.unwrap_err();
        assert_matches!(err, Error::DaemonNotStarted(_));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_twice() {
        let bed = TestBed::new();
        bed.cluster.set_monitor_up(true);
        let mgr = CephMgr::new(bed.context());
        mgr.create_mgr().await.unwrap();

        mgr.remove_mgr().await.unwrap();
        assert!(!bed.cluster.is_unit_active("ceph-mgr@node1"));
        assert!(!bed.layout().mgr_dir("node1").exists());
        mgr.remove_mgr().await.unwrap();

        let stops = bed.cluster.calls_starting_with("systemctl stop");
        assert_eq!(
            stops[..2],
            ["systemctl stop ceph-mgr.target", "systemctl stop system-ceph\\x2dmgr.slice"]
        );
    }
}
