//! Ceph CLI Facade
//!
//! Typed wrappers around the `ceph` tool. Status probes ask for
//! `--format json` and deserialize into the structures below.

use crate::error::Result;
use crate::host::{CommandOutput, CommandRunner, CommandSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Seconds passed to `--connect-timeout` on probes and removal commands
pub const CONNECT_TIMEOUT_SECS: u32 = 5;

const ACTIVE_CLEAN: &str = "active+clean";
const MDS_ACTIVE: &str = "up:active";

// =============================================================================
// Status Shapes
// =============================================================================

/// `ceph osd stat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OsdStat {
    pub epoch: u64,
    pub num_osds: u64,
    pub num_up_osds: u64,
    pub num_in_osds: u64,
    pub num_remapped_pgs: u64,
}

/// One entry of `ceph osd lspools`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub poolnum: i64,
    pub poolname: String,
}

/// Count of PGs in one state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgStateCount {
    pub state_name: String,
    pub count: u64,
}

/// `pgmap` of `ceph --status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgMap {
    pub pgs_by_state: Vec<PgStateCount>,
    pub num_pgs: u64,
    pub num_pools: u64,
    pub num_objects: u64,
    pub data_bytes: u64,
    pub bytes_used: u64,
    pub bytes_avail: u64,
    pub bytes_total: u64,
}

impl PgMap {
    /// Number of PGs that are `active+clean`
    pub fn active_clean(&self) -> u64 {
        self.pgs_by_state
            .iter()
            .find(|s| s.state_name == ACTIVE_CLEAN)
            .map(|s| s.count)
            .unwrap_or(0)
    }
}

/// The parts of `ceph --status` the provisioners read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterStatus {
    pub fsid: String,
    pub pgmap: PgMap,
}

/// `ceph mgr stat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MgrStat {
    pub epoch: u64,
    pub available: bool,
    pub active_name: String,
}

// =============================================================================
// Ceph CLI
// =============================================================================

/// Runs `ceph` subcommands through a [`CommandRunner`]
#[derive(Clone)]
pub struct CephCli {
    runner: Arc<dyn CommandRunner>,
}

impl CephCli {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn ceph<I, S>(args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("ceph").args(args)
    }

    fn with_connect_timeout(spec: CommandSpec, secs: u32) -> CommandSpec {
        spec.args(["--connect-timeout".to_string(), secs.to_string()])
    }

    /// Run `ceph <args>` and require success
    pub async fn run<I, S>(&self, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.runner.run_checked(&Self::ceph(args)).await
    }

    /// Run `ceph <args> --connect-timeout 5`, tolerating failure
    pub async fn run_quiet<I, S>(&self, args: I) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = Self::with_connect_timeout(Self::ceph(args), CONNECT_TIMEOUT_SECS);
        self.runner.run_tolerant(&spec).await
    }

    async fn query_json<T, I, S>(&self, args: I) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = Self::with_connect_timeout(
            Self::ceph(args).args(["--format", "json"]),
            CONNECT_TIMEOUT_SECS,
        );
        let output = self.runner.run_checked(&spec).await?;
        Ok(serde_json::from_str(&output.stdout)?)
    }

    /// Whether a cluster answers a status probe within `connect_timeout_secs`
    pub async fn cluster_reachable(&self, connect_timeout_secs: u32) -> Result<bool> {
        let spec = Self::with_connect_timeout(Self::ceph(["--status"]), connect_timeout_secs);
        let output = self.runner.run(&spec).await?;
        Ok(output.success())
    }

    pub async fn osd_stat(&self) -> Result<OsdStat> {
        self.query_json(["osd", "stat"]).await
    }

    /// Current pools; empty if the cluster cannot be queried
    pub async fn lspools(&self) -> Result<Vec<PoolEntry>> {
        let spec = Self::with_connect_timeout(
            Self::ceph(["osd", "lspools", "--format", "json"]),
            CONNECT_TIMEOUT_SECS,
        );
        let output = self.runner.run_tolerant(&spec).await;
        if !output.success() || output.stdout.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output.stdout)?)
    }

    pub async fn status(&self) -> Result<ClusterStatus> {
        self.query_json(["--status"]).await
    }

    /// Total PG count of the cluster, counting the `.mgr` pool about to be created as one
    pub async fn current_pg_count(&self) -> Result<u64> {
        if self.lspools().await?.is_empty() {
            return Ok(1);
        }
        let num_pgs = self.status().await?.pgmap.num_pgs;
        Ok(if num_pgs == 0 { 1 } else { num_pgs })
    }

    pub async fn mgr_stat(&self) -> Result<MgrStat> {
        self.query_json(["mgr", "stat"]).await
    }

    /// Number of MDS daemons in `up:active` across all filesystems
    pub async fn active_mds_count(&self) -> Result<u64> {
        let stat: serde_json::Value = self.query_json(["mds", "stat"]).await?;
        Ok(count_active_mds(&stat))
    }

    /// Number of radosgw daemons registered with the cluster
    pub async fn rgw_daemon_count(&self) -> Result<u64> {
        let dump: serde_json::Value = self.query_json(["service", "dump"]).await?;
        Ok(count_rgw_daemons(&dump))
    }

    /// `ceph auth get-or-create <entity> <caps..> -o <output>`
    pub async fn auth_get_or_create(
        &self,
        entity: &str,
        caps: &[(&str, &str)],
        output: &Path,
    ) -> Result<()> {
        let mut args = vec!["auth".to_string(), "get-or-create".to_string(), entity.to_string()];
        for (subsystem, permission) in caps {
            args.push(subsystem.to_string());
            args.push(permission.to_string());
        }
        args.push("-o".to_string());
        args.push(output.display().to_string());
        self.run(args).await?;
        debug!("Registered {} with the cluster", entity);
        Ok(())
    }

    /// `ceph auth print-key <entity>`
    pub async fn auth_print_key(&self, entity: &str) -> Result<String> {
        let output = self.run(["auth", "print-key", entity]).await?;
        Ok(output.stdout.trim().to_string())
    }
}

fn count_active_mds(stat: &serde_json::Value) -> u64 {
    let Some(filesystems) = stat["fsmap"]["filesystems"].as_array() else {
        return 0;
    };
    filesystems
        .iter()
        .filter_map(|fs| fs["mdsmap"]["info"].as_object())
        .flat_map(|info| info.values())
        .filter(|daemon| daemon["state"].as_str() == Some(MDS_ACTIVE))
        .count() as u64
}

fn count_rgw_daemons(dump: &serde_json::Value) -> u64 {
    dump["services"]["rgw"]["daemons"]
        .as_object()
        .map(|daemons| daemons.keys().filter(|k| k.as_str() != "summary").count() as u64)
        .unwrap_or(0)
}
