//! Test doubles
//!
//! [`FakeCluster`] answers the commands the backends issue with a small
//! in-memory model of a one-node cluster. [`TestBed`] wires it, a fake host
//! and a scratch directory into a [`BackendContext`].

use crate::ceph::CephLayout;
use crate::config::Timeouts;
use crate::controlplane::backends::BackendContext;
use crate::error::{Error, Result};
use crate::host::{
    CommandOutput, CommandRunner, CommandSpec, Host, InterfaceAddress, LocalFs, ServiceManager,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const ADMIN_SECRET: &str = "AQBdT0BkAAAAABAA3cmFtc3RvcmFkbWlua2V5PT0=";
pub const S3_ACCESS_KEY: &str = "0555b35654ad1656d804";
pub const S3_SECRET_KEY: &str = "h7GhxuBLTrlhVUyxSPUKUV8r/2EI4ngqJxD7iBdBYLhwluN30JaT3Q==";

// =============================================================================
// Fake Cluster
// =============================================================================

#[derive(Debug, Default)]
struct ClusterState {
    calls: Vec<String>,
    failures: Vec<String>,
    missing: BTreeSet<String>,
    active_units: BTreeSet<String>,
    monitor_up: bool,
    osds: u64,
    osds_up: u64,
    pools: BTreeMap<String, u64>,
    filesystem: bool,
    brd_loaded: bool,
    mounts: Vec<(String, String)>,
    mon_host: String,
}

/// Scripted [`CommandRunner`] modelling a single-node cluster
#[derive(Debug)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
}

impl Default for FakeCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClusterState {
                mon_host: "127.0.0.1".to_string(),
                ..Default::default()
            }),
        }
    }

    /// Every command run so far, as full command lines
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Commands run so far whose command line starts with `prefix`
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    /// Make every command line starting with `prefix` exit with status 1
    pub fn fail_on(&self, prefix: &str) {
        self.state.lock().failures.push(prefix.to_string());
    }

    /// Make `program` fail to spawn, as if it were not installed
    pub fn uninstall(&self, program: &str) {
        self.state.lock().missing.insert(program.to_string());
    }

    /// Pretend a cluster is already answering
    pub fn set_monitor_up(&self, up: bool) {
        self.state.lock().monitor_up = up;
    }

    pub fn is_unit_active(&self, unit: &str) -> bool {
        self.state.lock().active_units.contains(unit)
    }

    pub fn pools(&self) -> Vec<String> {
        self.state.lock().pools.keys().cloned().collect()
    }

    pub fn pool_pgs(&self, pool: &str) -> Option<u64> {
        self.state.lock().pools.get(pool).copied()
    }

    pub fn osds_up(&self) -> u64 {
        self.state.lock().osds_up
    }

    pub fn has_filesystem(&self) -> bool {
        self.state.lock().filesystem
    }

    pub fn brd_loaded(&self) -> bool {
        self.state.lock().brd_loaded
    }

    pub fn mounted_targets(&self) -> Vec<String> {
        self.state.lock().mounts.iter().map(|(_, t)| t.clone()).collect()
    }

    /// Record a mount that was not made through this fake
    pub fn add_mount(&self, source: &str, target: &str) {
        self.state
            .lock()
            .mounts
            .push((source.to_string(), target.to_string()));
    }

    fn respond(state: &mut ClusterState, spec: &CommandSpec) -> CommandOutput {
        let args: Vec<&str> = positional(&spec.args);
        match spec.program.as_str() {
            "ceph" => Self::ceph(state, spec, &args),
            "systemctl" => Self::systemctl(state, &args),
            "ceph-volume" => match args.as_slice() {
                ["lvm", "create", "--data", _] => {
                    state.osds += 1;
                    if state.monitor_up {
                        state.osds_up += 1;
                    }
                    CommandOutput::ok("--> ceph-volume lvm create successful")
                }
                ["lvm", "zap", "--destroy", _] => CommandOutput::ok(""),
                _ => unknown(spec),
            },
            "rados" => match args.as_slice() {
                ["purge", pool, ..] if state.pools.contains_key(*pool) => CommandOutput::ok(""),
                ["purge", ..] => CommandOutput::failed(2, "pool does not exist"),
                _ => unknown(spec),
            },
            "radosgw-admin" => {
                let user = json!({
                    "user_id": "ramstor",
                    "display_name": "ramstor",
                    "keys": [{
                        "user": "ramstor",
                        "access_key": S3_ACCESS_KEY,
                        "secret_key": S3_SECRET_KEY,
                    }],
                });
                CommandOutput::ok(user.to_string())
            }
            "modprobe" => {
                if state.brd_loaded {
                    return CommandOutput::failed(1, "brd already loaded");
                }
                state.brd_loaded = true;
                CommandOutput::ok("")
            }
            "rmmod" => {
                if !state.brd_loaded {
                    return CommandOutput::failed(1, "rmmod: ERROR: Module brd is not currently loaded");
                }
                state.brd_loaded = false;
                CommandOutput::ok("")
            }
            "mount" => match args.as_slice() {
                ["-t", "ceph", ":/", target, "-o", options] if options.contains("secret=") => {
                    let source = format!("{}:6789:/", state.mon_host);
                    state.mounts.push((source, target.to_string()));
                    CommandOutput::ok("")
                }
                _ => CommandOutput::failed(32, "mount: bad option"),
            },
            "mountpoint" => match args.as_slice() {
                ["-q", target] if state.mounts.iter().any(|(_, t)| t.as_str() == *target) => {
                    CommandOutput::ok("")
                }
                _ => CommandOutput::failed(32, ""),
            },
            "findmnt" => {
                if state.mounts.is_empty() {
                    return CommandOutput::failed(1, "");
                }
                let filesystems: Vec<_> = state
                    .mounts
                    .iter()
                    .map(|(source, target)| {
                        json!({"target": target, "source": source, "fstype": "ceph", "options": "rw"})
                    })
                    .collect();
                CommandOutput::ok(json!({ "filesystems": filesystems }).to_string())
            }
            "umount" => match args.as_slice() {
                [target] => {
                    let before = state.mounts.len();
                    state.mounts.retain(|(_, t)| t.as_str() != *target);
                    if state.mounts.len() < before {
                        CommandOutput::ok("")
                    } else {
                        CommandOutput::failed(32, "not mounted")
                    }
                }
                _ => unknown(spec),
            },
            "monmaptool" | "ceph-mon" => CommandOutput::ok(""),
            _ => unknown(spec),
        }
    }

    fn ceph(state: &mut ClusterState, spec: &CommandSpec, args: &[&str]) -> CommandOutput {
        if !state.monitor_up {
            return CommandOutput::failed(1, "monclient: timed out");
        }
        match args {
            ["--status"] if !spec.args.iter().any(|a| a == "--format") => CommandOutput::ok("HEALTH_OK"),
            ["--status"] => {
                let num_pgs: u64 = state.pools.values().sum();
                let status = json!({
                    "fsid": "0f2c7d9e-1111-4c4c-9d9d-2b2b2b2b2b2b",
                    "pgmap": {
                        "pgs_by_state": [{"state_name": "active+clean", "count": num_pgs}],
                        "num_pgs": num_pgs,
                        "num_pools": state.pools.len(),
                    }
                });
                CommandOutput::ok(status.to_string())
            }
            ["mon", "enable-msgr2"] => CommandOutput::ok(""),
            ["auth", "get-or-create", entity, .., "-o", path] => {
                let keyring = format!("[{}]\n\tkey = {}\n", entity, ADMIN_SECRET);
                match std::fs::write(path, keyring) {
                    Ok(()) => CommandOutput::ok(""),
                    Err(e) => CommandOutput::failed(1, e.to_string()),
                }
            }
            ["auth", "print-key", "client.admin"] => CommandOutput::ok(ADMIN_SECRET),
            ["mgr", "stat"] => {
                let available = state.active_units.contains("ceph-mgr@node1");
                CommandOutput::ok(
                    json!({"epoch": 3, "available": available, "active_name": "node1"}).to_string(),
                )
            }
            ["osd", "stat"] => CommandOutput::ok(
                json!({
                    "epoch": 10,
                    "num_osds": state.osds,
                    "num_up_osds": state.osds_up,
                    "num_in_osds": state.osds_up,
                    "num_remapped_pgs": 0,
                })
                .to_string(),
            ),
            ["osd", "out", _] => CommandOutput::ok(""),
            ["osd", "lspools"] => {
                let pools: Vec<_> = state
                    .pools
                    .keys()
                    .enumerate()
                    .map(|(i, name)| json!({"poolnum": i + 1, "poolname": name}))
                    .collect();
                CommandOutput::ok(serde_json::Value::Array(pools).to_string())
            }
            ["osd", "pool", "create", name, pgs, _] => {
                let Ok(pgs) = pgs.parse::<u64>() else {
                    return CommandOutput::failed(22, "invalid pg count");
                };
                if state.pools.is_empty() {
                    state.pools.insert(".mgr".to_string(), 1);
                }
                state.pools.insert(name.to_string(), pgs);
                CommandOutput::ok(format!("pool '{}' created", name))
            }
            ["osd", "pool", "delete", name, ..] => {
                if state.pools.remove(*name).is_some() {
                    CommandOutput::ok(format!("pool '{}' removed", name))
                } else {
                    CommandOutput::failed(2, "pool does not exist")
                }
            }
            ["fs", "new", "cephfs", "cephfs_metadata", "cephfs_data"] => {
                state.filesystem = true;
                CommandOutput::ok("new fs with metadata pool and data pool")
            }
            ["fs", "fail", "cephfs"] => CommandOutput::ok(""),
            ["fs", "rm", "cephfs", ..] => {
                state.filesystem = false;
                CommandOutput::ok("")
            }
            ["mds", "stat"] => {
                let info = if state.filesystem && state.active_units.contains("ceph-mds@node1") {
                    json!({"gid_4123": {"name": "node1", "state": "up:active"}})
                } else {
                    json!({})
                };
                CommandOutput::ok(
                    json!({"fsmap": {"filesystems": [{"mdsmap": {"info": info}}]}}).to_string(),
                )
            }
            ["service", "dump"] => {
                let daemons = if state.active_units.contains("ceph-radosgw@radosgw.node1") {
                    json!({"summary": "", "14123": {"gid": 14123}})
                } else {
                    json!({"summary": ""})
                };
                CommandOutput::ok(json!({"services": {"rgw": {"daemons": daemons}}}).to_string())
            }
            _ => unknown(spec),
        }
    }

    fn systemctl(state: &mut ClusterState, args: &[&str]) -> CommandOutput {
        match args {
            ["start", unit] => {
                state.active_units.insert(unit.to_string());
                if unit.starts_with("ceph-mon@") {
                    state.monitor_up = true;
                }
                CommandOutput::ok("")
            }
            ["stop", unit] => {
                let family = unit_family(unit);
                state
                    .active_units
                    .retain(|active| active.as_str() != *unit && family.map_or(true, |f| !active.starts_with(f)));
                if family == Some("ceph-mon") {
                    state.monitor_up = false;
                }
                if family == Some("ceph-osd") {
                    state.osds_up = 0;
                    state.osds = 0;
                }
                CommandOutput::ok("")
            }
            ["disable", _] => CommandOutput::ok(""),
            ["is-active", "--quiet", unit] if state.active_units.contains(*unit) => CommandOutput::ok(""),
            _ => CommandOutput::failed(3, ""),
        }
    }
}

#[async_trait]
impl CommandRunner for FakeCluster {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.display();
        let mut state = self.state.lock();
        state.calls.push(line.clone());
        if state.missing.contains(&spec.program) {
            let message = format!("{}: not found", spec.program);
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, message).into());
        }
        if state.failures.iter().any(|prefix| line.starts_with(prefix.as_str())) {
            return Ok(CommandOutput::failed(1, "injected failure"));
        }
        Ok(Self::respond(&mut state, spec))
    }
}

/// Arguments with output-format and connect-timeout flags removed
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" | "--connect-timeout" => {
                iter.next();
            }
            other => out.push(other),
        }
    }
    out
}

/// `ceph-mgr` for `ceph-mgr.target` and `system-ceph\x2dmgr.slice`
fn unit_family(unit: &str) -> Option<&str> {
    if let Some(family) = unit.strip_suffix(".target") {
        return Some(family);
    }
    unit.strip_prefix("system-ceph\\x2d")
        .and_then(|rest| rest.strip_suffix(".slice"))
        .map(|role| match role {
            "mon" => "ceph-mon",
            "mgr" => "ceph-mgr",
            "osd" => "ceph-osd",
            "mds" => "ceph-mds",
            "radosgw" => "ceph-radosgw",
            _ => "ceph-unknown",
        })
}

fn unknown(spec: &CommandSpec) -> CommandOutput {
    CommandOutput::failed(127, format!("fake cluster does not know `{}`", spec.display()))
}

// =============================================================================
// Fake Host
// =============================================================================

/// [`Host`] with fixed answers; free memory can be changed
#[derive(Debug)]
pub struct FakeHost {
    free_memory_kib: AtomicU64,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            free_memory_kib: AtomicU64::new(64 * 1024 * 1024),
        }
    }

    pub fn set_free_memory_kib(&self, kib: u64) {
        self.free_memory_kib.store(kib, Ordering::SeqCst);
    }
}

impl Default for FakeHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for FakeHost {
    fn hostname(&self) -> Result<String> {
        Ok("node1".to_string())
    }

    fn interface_address(&self, interface: &str) -> Result<InterfaceAddress> {
        match interface {
            "lo" => Ok(InterfaceAddress::new(Ipv4Addr::LOCALHOST, 8)),
            _ => Err(Error::InterfaceNotFound {
                interface: interface.to_string(),
            }),
        }
    }

    fn free_memory_kib(&self) -> Result<u64> {
        Ok(self.free_memory_kib.load(Ordering::SeqCst))
    }

    fn invoking_user(&self) -> String {
        "tester".to_string()
    }
}

// =============================================================================
// Test Bed
// =============================================================================

/// Scratch directory plus fakes, ready to build backends from
pub struct TestBed {
    pub dir: TempDir,
    pub cluster: Arc<FakeCluster>,
    pub host: Arc<FakeHost>,
    pub timeouts: Timeouts,
}

impl TestBed {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create scratch dir");
        std::fs::create_dir_all(dir.path().join("work")).expect("create work folder");
        Self {
            dir,
            cluster: Arc::new(FakeCluster::new()),
            host: Arc::new(FakeHost::new()),
            timeouts: Timeouts {
                daemon: Duration::from_secs(2),
                pool: Duration::from_secs(5),
                mount: Duration::from_secs(1),
                poll_interval: Duration::from_millis(100),
            },
        }
    }

    pub fn layout(&self) -> CephLayout {
        CephLayout::rooted(self.dir.path())
    }

    pub fn folder(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    pub fn context(&self) -> BackendContext {
        BackendContext::new(
            self.folder(),
            self.layout(),
            self.cluster.clone(),
            Arc::new(LocalFs::without_ownership()),
            self.host.clone(),
            ServiceManager::new(self.cluster.clone(), true),
            self.timeouts,
        )
        .expect("fake host always has a hostname")
    }
}

impl Default for TestBed {
    fn default() -> Self {
        Self::new()
    }
}
