//! Ceph Filesystem Layout
//!
//! Well-known paths used by the ceph daemons. All paths hang off a root so
//! the provisioners can be exercised inside a scratch directory.

use std::path::{Path, PathBuf};

pub const CLUSTER: &str = "ceph";
pub const CONFIG_FILE: &str = "ceph.conf";
pub const MONMAP_FILE: &str = "ceph.monmap";
pub const MON_KEYRING: &str = "ceph.mon..keyring";
pub const ADMIN_KEYRING: &str = "ceph.client.admin.keyring";
pub const OSD_KEYRING: &str = "ceph.client.bootstrap-osd.keyring";
pub const CREDENTIALS_FILE: &str = "credentials";
pub const AUTH: &str = "cephx";
pub const DAEMON_USER: &str = "ceph";

/// Absolute locations of ceph state on a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CephLayout {
    root: PathBuf,
}

impl CephLayout {
    /// The real system layout rooted at `/`
    pub fn system() -> Self {
        Self::rooted("/")
    }

    /// A layout rooted somewhere else
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn etc_ceph(&self) -> PathBuf {
        self.path("etc/ceph")
    }

    pub fn mon_dir(&self, host: &str) -> PathBuf {
        self.path(&format!("var/lib/ceph/mon/{}-{}", CLUSTER, host))
    }

    pub fn mgr_dir(&self, host: &str) -> PathBuf {
        self.path(&format!("var/lib/ceph/mgr/{}-{}", CLUSTER, host))
    }

    pub fn mds_dir(&self, host: &str) -> PathBuf {
        self.path(&format!("var/lib/ceph/mds/{}-{}", CLUSTER, host))
    }

    pub fn rgw_dir(&self, host: &str) -> PathBuf {
        self.path(&format!("var/lib/ceph/radosgw/{}-radosgw.{}", CLUSTER, host))
    }

    pub fn bootstrap_osd_dir(&self) -> PathBuf {
        self.path("var/lib/ceph/bootstrap-osd")
    }

    pub fn osd_dir(&self) -> PathBuf {
        self.path("var/lib/ceph/osd")
    }

    /// Glob matching every OSD data directory; the id follows the prefix
    pub fn osd_id_pattern(&self) -> String {
        format!("{}/{}-*", self.osd_dir().display(), CLUSTER)
    }

    /// Glob matching the `ceph-volume` units left enabled by `lvm create`
    pub fn ceph_volume_units_pattern(&self) -> String {
        format!(
            "{}/ceph-volume@lvm-*",
            self.path("etc/systemd/system/multi-user.target.wants").display()
        )
    }

    /// `/dev/ram<index>`
    pub fn ram_device(&self, index: u32) -> PathBuf {
        self.path(&format!("dev/ram{}", index))
    }

    pub fn mount_point(&self) -> PathBuf {
        self.path("mnt/ramstor")
    }
}

impl Default for CephLayout {
    fn default() -> Self {
        Self::system()
    }
}
