//! Host Identity Lookups
//!
//! Hostname, IPv4 address of a network interface, free memory, and the user
//! who invoked the tool.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

const PROC_MEMINFO: &str = "/proc/meminfo";
const HOSTNAME_FILES: [&str; 2] = ["/etc/hostname", "/proc/sys/kernel/hostname"];

/// IPv4 address and prefix length of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub ip: Ipv4Addr,
    pub prefix_len: u8,
}

impl InterfaceAddress {
    pub fn new(ip: Ipv4Addr, prefix_len: u8) -> Self {
        Self { ip, prefix_len }
    }
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

/// One entry of `ip -json addr show`
#[derive(Debug, Deserialize)]
struct IpLink {
    ifname: String,
    #[serde(default)]
    addr_info: Vec<IpAddrInfo>,
}

#[derive(Debug, Deserialize)]
struct IpAddrInfo {
    family: String,
    local: String,
    prefixlen: u8,
}

// =============================================================================
// Host Port
// =============================================================================

/// Port for facts about the local host
pub trait Host: Send + Sync {
    fn hostname(&self) -> Result<String>;

    /// IPv4 address of `interface`, or [`Error::InterfaceNotFound`]
    fn interface_address(&self, interface: &str) -> Result<InterfaceAddress>;

    /// Free system memory in KiB
    fn free_memory_kib(&self) -> Result<u64>;

    /// The user on whose behalf the tool runs (`SUDO_USER` when elevated)
    fn invoking_user(&self) -> String;
}

// =============================================================================
// Local Host
// =============================================================================

/// [`Host`] answered from procfs and iproute2
#[derive(Debug, Clone)]
pub struct LocalHost {
    meminfo: PathBuf,
}

impl LocalHost {
    pub fn new() -> Self {
        Self {
            meminfo: PathBuf::from(PROC_MEMINFO),
        }
    }
}

impl Default for LocalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl Host for LocalHost {
    fn hostname(&self) -> Result<String> {
        for path in HOSTNAME_FILES {
            if let Ok(name) = fs::read_to_string(path) {
                let name = name.trim();
                if !name.is_empty() {
                    return Ok(name.to_string());
                }
            }
        }

        let output = Command::new("hostname").output()?;
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || name.is_empty() {
            return Err(Error::Internal("could not determine the hostname".into()));
        }
        Ok(name)
    }

    fn interface_address(&self, interface: &str) -> Result<InterfaceAddress> {
        let not_found = || Error::InterfaceNotFound {
            interface: interface.to_string(),
        };

        let output = Command::new("ip")
            .args(["-json", "-4", "addr", "show", "dev", interface])
            .output()?;
        if !output.status.success() {
            debug!(
                "ip addr show {} failed: {}",
                interface,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(not_found());
        }

        let links: Vec<IpLink> = serde_json::from_slice(&output.stdout)?;
        ipv4_of_interface(&links, interface).ok_or_else(not_found)
    }

    fn free_memory_kib(&self) -> Result<u64> {
        read_free_memory(&self.meminfo)
    }

    fn invoking_user(&self) -> String {
        std::env::var("SUDO_USER")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| "root".to_string())
    }
}

/// First IPv4 address of `interface` in `ip -json addr` output
fn ipv4_of_interface(links: &[IpLink], interface: &str) -> Option<InterfaceAddress> {
    links
        .iter()
        .filter(|link| link.ifname == interface)
        .flat_map(|link| link.addr_info.iter())
        .filter(|info| info.family == "inet")
        .find_map(|info| {
            let ip = info.local.parse().ok()?;
            Some(InterfaceAddress::new(ip, info.prefixlen))
        })
}

/// `MemFree` from a meminfo file, in KiB
fn read_free_memory(meminfo: &Path) -> Result<u64> {
    let contents = std::fs::read_to_string(meminfo)?;
    parse_free_memory(&contents)
        .ok_or_else(|| Error::Internal(format!("MemFree missing from {:?}", meminfo)))
}

fn parse_free_memory(contents: &str) -> Option<u64> {
    contents
        .lines()
        .find_map(|line| line.strip_prefix("MemFree:"))
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|value| value.parse().ok())
}
