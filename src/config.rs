//! Runtime Configuration
//!
//! Loads the INI file handed to the binary. Section and key names are
//! matched case-insensitively:
//!
//! ```text
//! [setup]
//! backend = ceph
//! folder = /tmp/ramstor
//! interface = eth0
//! number_of_hosts = 1
//! service = cephfs
//!
//! [ram]
//! type = brd
//! number = 2
//! size_in_gb = 4
//!
//! [timeouts]
//! daemon = 30
//! ```

use crate::controlplane::poll::{Poll, POLL_INTERVAL};
use crate::controlplane::registry::BackendSelection;
use crate::error::{Error, Result};
use ini::Ini;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, warn};

const SETUP: &str = "setup";
const RAM: &str = "ram";
const TIMEOUTS: &str = "timeouts";

const SETUP_KEYS: [&str; 5] = ["backend", "folder", "interface", "number_of_hosts", "service"];
const RAM_KEYS: [&str; 3] = ["type", "number", "size_in_gb"];

// =============================================================================
// Service Kind
// =============================================================================

/// Client-facing service exposed once the core daemons are up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Metadata server plus a mounted filesystem
    Cephfs,
    /// Object gateway plus an S3 user
    S3,
}

impl FromStr for ServiceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cephfs" => Ok(ServiceKind::Cephfs),
            "s3" | "rgw" => Ok(ServiceKind::S3),
            other => Err(Error::Configuration(format!(
                "Unknown service `{}`, choose from: cephfs, s3, rgw",
                other
            ))),
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Cephfs => write!(f, "cephfs"),
            ServiceKind::S3 => write!(f, "s3"),
        }
    }
}

// =============================================================================
// Configuration Sections
// =============================================================================

/// `[setup]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupConfig {
    /// Backend for every daemon category except devices
    pub backend: String,
    /// Work folder holding keyrings, `ceph.conf` and the monmap
    pub folder: PathBuf,
    /// Network interface the cluster binds to
    pub interface: String,
    pub number_of_hosts: u32,
    pub service: ServiceKind,
    pub log_level: Option<String>,
}

/// `[ram]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamConfig {
    /// Device backend name
    pub kind: String,
    /// Number of devices; zero skips device creation
    pub number: u32,
    pub size_in_gb: u64,
}

/// Readiness timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Daemon readiness (mgr, osd, mds, gateway)
    pub daemon: Duration,
    /// Pool `active+clean` wait
    pub pool: Duration,
    /// Filesystem mount retries
    pub mount: Duration,
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            daemon: Duration::from_secs(30),
            pool: Duration::from_secs(120),
            mount: Duration::from_secs(30),
            poll_interval: POLL_INTERVAL,
        }
    }
}

impl Timeouts {
    pub fn daemon_poll(&self) -> Poll {
        Poll::new(self.poll_interval, self.daemon)
    }

    pub fn pool_poll(&self) -> Poll {
        Poll::new(self.poll_interval, self.pool)
    }

    pub fn mount_poll(&self) -> Poll {
        Poll::new(self.poll_interval, self.mount)
    }
}

// =============================================================================
// Runtime Configuration
// =============================================================================

/// Everything read from the configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub setup: SetupConfig,
    pub ram: RamConfig,
    pub timeouts: Timeouts,
}

type Sections = HashMap<String, HashMap<String, String>>;

impl RuntimeConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "Config file {:?} does not exist",
                path
            )));
        }
        let doc = Ini::load_from_file(path)?;
        Self::from_ini(&doc)
    }

    /// Parse configuration from INI text
    pub fn parse(contents: &str) -> Result<Self> {
        let doc = Ini::load_from_str(contents).map_err(|e| Error::Configuration(e.to_string()))?;
        Self::from_ini(&doc)
    }

    fn from_ini(doc: &Ini) -> Result<Self> {
        let sections = lowercase_sections(doc);

        let mut missing = Vec::new();
        let setup = required_section(&sections, SETUP, &SETUP_KEYS, &mut missing);
        let ram = required_section(&sections, RAM, &RAM_KEYS, &mut missing);
        let (Some(setup), Some(ram)) = (setup, ram) else {
            return Err(Error::Configuration(format!(
                "Missing configuration: {}",
                missing.join(", ")
            )));
        };

        let config = Self {
            setup: SetupConfig {
                backend: setup["backend"].to_lowercase(),
                folder: PathBuf::from(&setup["folder"]),
                interface: setup["interface"].clone(),
                number_of_hosts: parse_value(SETUP, "number_of_hosts", &setup["number_of_hosts"])?,
                service: setup["service"].parse()?,
                log_level: setup
                    .get("log_level")
                    .filter(|level| !level.is_empty())
                    .map(|level| level.to_lowercase()),
            },
            ram: RamConfig {
                kind: ram["type"].to_lowercase(),
                number: parse_value(RAM, "number", &ram["number"])?,
                size_in_gb: parse_value(RAM, "size_in_gb", &ram["size_in_gb"])?,
            },
            timeouts: parse_timeouts(sections.get(TIMEOUTS))?,
        };

        if config.setup.number_of_hosts > 1 {
            warn!(
                "number_of_hosts is {}, only the local host will be provisioned",
                config.setup.number_of_hosts
            );
        }

        Ok(config)
    }

    /// Backend names to resolve from the registries
    pub fn selection(&self) -> BackendSelection {
        BackendSelection {
            storage: self.setup.backend.clone(),
            device: self.ram.kind.clone(),
        }
    }
}

fn lowercase_sections(doc: &Ini) -> Sections {
    let mut sections: Sections = HashMap::new();
    for (name, props) in doc.iter() {
        let Some(name) = name else { continue };
        let section = sections.entry(name.trim().to_lowercase()).or_default();
        for (key, value) in props.iter() {
            section.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    sections
}

/// Look up a section, logging every absent or empty key
fn required_section<'a>(
    sections: &'a Sections,
    name: &str,
    keys: &[&str],
    missing: &mut Vec<String>,
) -> Option<&'a HashMap<String, String>> {
    let Some(section) = sections.get(name) else {
        error!("[{}] is missing from config file", name);
        missing.push(format!("[{}]", name));
        return None;
    };

    let before = missing.len();
    for key in keys {
        match section.get(*key) {
            None => {
                error!("{} is missing from [{}] in config", key, name);
                missing.push(format!("{}.{}", name, key));
            }
            Some(value) if value.is_empty() => {
                error!("{} is missing a value in [{}]", key, name);
                missing.push(format!("{}.{}", name, key));
            }
            Some(_) => {}
        }
    }

    (missing.len() == before).then_some(section)
}

fn parse_value<T>(section: &str, key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|e| {
        Error::Configuration(format!("Invalid {}.{} `{}`: {}", section, key, value, e))
    })
}

fn parse_timeouts(section: Option<&HashMap<String, String>>) -> Result<Timeouts> {
    let mut timeouts = Timeouts::default();
    let Some(section) = section else {
        return Ok(timeouts);
    };
    for (key, slot) in [
        ("daemon", &mut timeouts.daemon),
        ("pool", &mut timeouts.pool),
        ("mount", &mut timeouts.mount),
    ] {
        if let Some(value) = section.get(key).filter(|v| !v.is_empty()) {
            *slot = Duration::from_secs(parse_value(TIMEOUTS, key, value)?);
        }
    }
    Ok(timeouts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    const SAMPLE: &str = "\
[SETUP]
Backend = Ceph
folder = /tmp/ramstor
interface = lo
number_of_hosts = 1
service = cephfs
log_level = debug

[ram]
type = brd
number = 2
size_in_gb = 4
";

    #[test]
    fn test_parse_sample() {
        let config = RuntimeConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.setup.backend, "ceph");
        assert_eq!(config.setup.folder, PathBuf::from("/tmp/ramstor"));
        assert_eq!(config.setup.interface, "lo");
        assert_eq!(config.setup.service, ServiceKind::Cephfs);
        assert_eq!(config.setup.log_level.as_deref(), Some("debug"));
        assert_eq!(config.ram.kind, "brd");
        assert_eq!(config.ram.number, 2);
        assert_eq!(config.ram.size_in_gb, 4);
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(
            config.selection(),
            BackendSelection {
                storage: "ceph".into(),
                device: "brd".into()
            }
        );
    }

    #[test]
    fn test_service_aliases() {
        assert_eq!("rgw".parse::<ServiceKind>().unwrap(), ServiceKind::S3);
        assert_eq!("S3".parse::<ServiceKind>().unwrap(), ServiceKind::S3);
        assert_matches!("nfs".parse::<ServiceKind>(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_missing_keys_rejected() {
        let contents = SAMPLE.replace("interface = lo\n", "").replace("number = 2\n", "number =\n");
        let err = RuntimeConfig::parse(&contents).unwrap_err();
        assert_matches!(err, Error::Configuration(ref message)
            if message.contains("setup.interface") && message.contains("ram.number"));
    }

    #[test]
    fn test_missing_section_rejected() {
        let contents = "[setup]\nbackend = ceph\n";
        let err = RuntimeConfig::parse(contents).unwrap_err();
        assert_matches!(err, Error::Configuration(ref message) if message.contains("[ram]"));
    }

    #[test]
    fn test_invalid_number_rejected() {
        let contents = SAMPLE.replace("size_in_gb = 4", "size_in_gb = four");
        assert_matches!(RuntimeConfig::parse(&contents), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_timeouts_section() {
        let contents = format!("{}\n[Timeouts]\ndaemon = 5\nmount = 7\n", SAMPLE);
        let config = RuntimeConfig::parse(&contents).unwrap();
        assert_eq!(config.timeouts.daemon, Duration::from_secs(5));
        assert_eq!(config.timeouts.mount, Duration::from_secs(7));
        assert_eq!(config.timeouts.pool, Duration::from_secs(120));
        assert_eq!(config.timeouts.daemon_poll().timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = RuntimeConfig::load(file.path()).unwrap();
        assert_eq!(config.ram.number, 2);

        assert_matches!(
            RuntimeConfig::load(Path::new("/nonexistent/ramstor.ini")),
            Err(Error::Configuration(_))
        );
    }
}
