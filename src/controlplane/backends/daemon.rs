//! Shared steps for keyring-authenticated ceph daemons
//!
//! The manager, metadata server and gateway install the same way: a runtime
//! directory holding a copy of their keyring, owned by the daemon user, and a
//! systemd instance unit. Removal stops the role's target and slice.

use super::BackendContext;
use crate::ceph::DAEMON_USER;
use crate::domain::ports::{Category, DaemonDescriptor, DaemonStatus};
use crate::error::{Error, Result};
use std::path::PathBuf;
use tracing::debug;

/// A daemon instance on this host
pub(crate) struct DaemonUnit {
    pub category: Category,
    /// Role as it appears in unit names (`mgr`, `mds`, `radosgw`)
    pub role: &'static str,
    /// Instance unit, e.g. `ceph-mgr@node1`
    pub unit: String,
    pub directory: PathBuf,
}

impl DaemonUnit {
    pub fn new(category: Category, role: &'static str, instance: &str, directory: PathBuf) -> Self {
        Self {
            category,
            role,
            unit: format!("ceph-{}@{}", role, instance),
            directory,
        }
    }

    pub fn keyring_path(&self) -> PathBuf {
        self.directory.join("keyring")
    }

    pub fn target(&self) -> String {
        format!("ceph-{}.target", self.role)
    }

    pub fn slice(&self) -> String {
        format!("system-ceph\\x2d{}.slice", self.role)
    }

    /// Describe the instance, with its status read from the service manager
    pub async fn describe(&self, ctx: &BackendContext) -> Result<DaemonDescriptor> {
        let active = ctx.services.is_active(&self.unit).await?;
        Ok(DaemonDescriptor {
            category: self.category,
            host: ctx.hostname.clone(),
            directory: self.directory.clone(),
            keyring: self.keyring_path(),
            status: DaemonStatus::from_active(active),
        })
    }

    /// Create the runtime directory and install `keyring` (a file in the work folder) into it
    pub fn prepare(&self, ctx: &BackendContext, keyring: &str) -> Result<()> {
        ctx.fs.create_dir(&self.directory, 0o755)?;
        let source = ctx.in_folder(keyring);
        if !ctx.fs.copy_file(&source, &self.keyring_path())? {
            return Err(Error::Internal(format!(
                "{} keyring {:?} was not created",
                self.role, source
            )));
        }
        ctx.fs
            .chown_recursive(&self.directory, DAEMON_USER, DAEMON_USER)?;
        debug!("Prepared {:?} for {}", self.directory, self.unit);
        Ok(())
    }

    /// Start the unit and require it to be active
    pub async fn start(&self, ctx: &BackendContext) -> Result<()> {
        ctx.services.start(&self.unit).await?;
        if !ctx.services.is_active(&self.unit).await? {
            return Err(Error::DaemonNotStarted(format!("Ceph {}", self.role)));
        }
        Ok(())
    }

    /// Stop the role's units and delete the runtime directory
    pub async fn remove(&self, ctx: &BackendContext) -> Result<()> {
        ctx.services.shutdown(&self.target()).await?;
        ctx.services.stop(&self.slice()).await?;
        if !ctx.fs.remove_dir(&self.directory)? {
            debug!("{:?} was already removed", self.directory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestBed;

    #[tokio::test]
    async fn test_unit_lifecycle() {
        let bed = TestBed::new();
        let ctx = bed.context();
        std::fs::write(ctx.in_folder("ceph.mgr.node1.keyring"), "[mgr.node1]\n").unwrap();
        let daemon = DaemonUnit::new(Category::Mgr, "mgr", "node1", bed.layout().mgr_dir("node1"));
        assert_eq!(daemon.unit, "ceph-mgr@node1");
        assert_eq!(daemon.target(), "ceph-mgr.target");
        assert_eq!(daemon.slice(), "system-ceph\\x2dmgr.slice");

        daemon.prepare(&ctx, "ceph.mgr.node1.keyring").unwrap();
        assert!(daemon.keyring_path().exists());
        daemon.start(&ctx).await.unwrap();
        assert_eq!(daemon.describe(&ctx).await.unwrap().status, DaemonStatus::Running);

        daemon.remove(&ctx).await.unwrap();
        assert!(!daemon.directory.exists());
        let descriptor = daemon.describe(&ctx).await.unwrap();
        assert_eq!(descriptor.status, DaemonStatus::NotRunning);
        assert_eq!(descriptor.host, "node1");
    }

    #[test]
    fn test_prepare_requires_keyring() {
        let bed = TestBed::new();
        let daemon = DaemonUnit::new(Category::Mds, "mds", "node1", bed.layout().mds_dir("node1"));
        let err = daemon.prepare(&bed.context(), "ceph.mds.node1.keyring").unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
