//! Cluster Configuration
//!
//! Renders `ceph.conf` for a single-node, throwaway cluster: replication is
//! forced to one copy, PG autoscaling is off and all daemon logging goes to
//! `/dev/null`.

use super::layout::{AUTH, CONFIG_FILE};
use crate::error::{Error, Result};
use crate::host::{HostFs, InterfaceAddress};
use ini::Ini;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

const GLOBAL: &str = "global";
const MON_HOST: &str = "mon host";

/// Identity of the cluster, fixed at bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterIdentity {
    pub fsid: Uuid,
    pub hostname: String,
    pub address: InterfaceAddress,
}

impl ClusterIdentity {
    /// A new identity with a random fsid
    pub fn generate(hostname: impl Into<String>, address: InterfaceAddress) -> Self {
        Self {
            fsid: Uuid::new_v4(),
            hostname: hostname.into(),
            address,
        }
    }

    /// `ip/prefix` used for both the public and the cluster network
    pub fn network(&self) -> String {
        self.address.to_string()
    }
}

/// The `[global]` entries, in file order
pub fn global_settings(identity: &ClusterIdentity) -> Vec<(&'static str, String)> {
    vec![
        ("fsid", identity.fsid.to_string()),
        ("mon initial members", identity.hostname.clone()),
        (MON_HOST, identity.address.ip.to_string()),
        ("public network", identity.network()),
        ("cluster network", identity.network()),
        ("auth cluster required", AUTH.to_string()),
        ("auth service required", AUTH.to_string()),
        ("auth client required", AUTH.to_string()),
        ("osd pool default size", "1".to_string()),
        ("osd pool default pg autoscale mode", "off".to_string()),
        ("log flush on exit", "false".to_string()),
        ("log file", "/dev/null".to_string()),
        ("mon cluster log", "/dev/null".to_string()),
    ]
}

/// Write `ceph.conf` into `dir`
pub fn write_config(fs: &dyn HostFs, dir: &Path, identity: &ClusterIdentity) -> Result<PathBuf> {
    let mut doc = Ini::new();
    for (key, value) in global_settings(identity) {
        doc.set_to(Some(GLOBAL), key.to_string(), value);
    }

    let mut rendered = Vec::new();
    doc.write_to(&mut rendered)?;
    let path = dir.join(CONFIG_FILE);
    fs.write_file(&path, &rendered)?;
    debug!("Wrote cluster config to {:?}", path);
    Ok(path)
}

/// Read `mon host` back from the `ceph.conf` in `dir`
pub fn read_mon_host(dir: &Path) -> Result<String> {
    let path = dir.join(CONFIG_FILE);
    let doc = Ini::load_from_file(&path)?;
    doc.get_from(Some(GLOBAL), MON_HOST)
        .map(str::to_string)
        .ok_or_else(|| Error::Configuration(format!("`{}` missing from {:?}", MON_HOST, path)))
}
