//! Cephx Keyrings
//!
//! Secret generation and keyring files. A keyring file is an INI document
//! with one section per entity:
//!
//! ```text
//! [client.admin]
//! key=AQB...==
//! caps mon=allow *
//! ```

use super::layout::{ADMIN_KEYRING, MON_KEYRING, OSD_KEYRING};
use crate::error::{Error, Result};
use crate::host::HostFs;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ini::Ini;
use rand::RngCore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// `CEPH_CRYPTO_AES`
const CRYPTO_AES: u16 = 1;
const SECRET_LEN: usize = 16;
const HEADER_LEN: usize = 12;

/// Length of an encoded secret
pub const ENCODED_SECRET_LEN: usize = 40;

/// A named credential with its capability grants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyring {
    pub subject: String,
    pub secret: String,
    /// subsystem (`mon`, `osd`, ...) to permission string
    pub caps: BTreeMap<String, String>,
}

impl Keyring {
    /// File name the keyring is stored under
    pub fn file_name(&self) -> String {
        keyring_file_name(&self.subject)
    }
}

/// `ceph.<subject>.keyring`
pub fn keyring_file_name(subject: &str) -> String {
    format!("ceph.{}.keyring", subject)
}

/// Generate a cephx secret.
///
/// Layout before encoding: `le16 type | le32 created secs | le32 created nsecs (0) | le16 len | key`.
pub fn generate_secret() -> String {
    let mut key = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut key);

    let created = chrono::Utc::now().timestamp() as u32;
    let mut raw = Vec::with_capacity(HEADER_LEN + SECRET_LEN);
    raw.extend_from_slice(&CRYPTO_AES.to_le_bytes());
    raw.extend_from_slice(&created.to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&(SECRET_LEN as u16).to_le_bytes());
    raw.extend_from_slice(&key);

    STANDARD.encode(raw)
}

/// Write a fresh keyring for `subject` into `dir`, overwriting any previous one
pub fn create_keyring(
    fs: &dyn HostFs,
    dir: &Path,
    subject: &str,
    grants: &[(&str, &str)],
) -> Result<Keyring> {
    fs.create_dir(dir, 0o755)?;

    let keyring = Keyring {
        subject: subject.to_string(),
        secret: generate_secret(),
        caps: grants
            .iter()
            .map(|(subsystem, permission)| (subsystem.to_string(), permission.to_string()))
            .collect(),
    };

    let mut doc = Ini::new();
    doc.set_to(Some(subject), "key".to_string(), keyring.secret.clone());
    for (subsystem, permission) in &keyring.caps {
        doc.set_to(Some(subject), format!("caps {}", subsystem), permission.clone());
    }

    let mut rendered = Vec::new();
    doc.write_to(&mut rendered)?;
    let path = dir.join(keyring.file_name());
    fs.write_file(&path, &rendered)?;
    debug!("Wrote keyring for {} to {:?}", subject, path);

    Ok(keyring)
}

/// Read every entity in a keyring file
pub fn read_keyring(path: &Path) -> Result<Vec<Keyring>> {
    let doc = Ini::load_from_file(path)?;
    let mut keyrings = Vec::new();
    for (name, props) in doc.iter() {
        let Some(subject) = name else { continue };
        let mut caps = BTreeMap::new();
        for (key, value) in props.iter() {
            if let Some(subsystem) = key.strip_prefix("caps ") {
                caps.insert(subsystem.to_string(), value.to_string());
            }
        }
        keyrings.push(Keyring {
            subject: subject.to_string(),
            secret: props.get("key").unwrap_or_default().to_string(),
            caps,
        });
    }
    Ok(keyrings)
}

/// Append each of `sources` to `target`, all within `dir`; returns the combined path
pub fn merge_keyrings(fs: &dyn HostFs, dir: &Path, target: &str, sources: &[&str]) -> Result<PathBuf> {
    let path = dir.join(target);
    if !fs.exists(&path) {
        return Err(Error::Internal(format!("keyring {:?} does not exist", path)));
    }
    for source in sources {
        let source = dir.join(source);
        if !fs.append_file(&source, &path)? {
            return Err(Error::Internal(format!("keyring {:?} does not exist", source)));
        }
    }
    Ok(path)
}

// =============================================================================
// Bootstrap Keyrings
// =============================================================================

/// `mon.` keyring
pub fn create_mon_keyring(fs: &dyn HostFs, dir: &Path) -> Result<Keyring> {
    let keyring = create_keyring(fs, dir, "mon.", &[("mon", "allow *")])?;
    debug_assert_eq!(keyring.file_name(), MON_KEYRING);
    Ok(keyring)
}

/// `client.admin` keyring with full access to every subsystem
pub fn create_admin_keyring(fs: &dyn HostFs, dir: &Path) -> Result<Keyring> {
    let keyring = create_keyring(
        fs,
        dir,
        "client.admin",
        &[
            ("mon", "allow *"),
            ("osd", "allow *"),
            ("mds", "allow *"),
            ("mgr", "allow *"),
        ],
    )?;
    debug_assert_eq!(keyring.file_name(), ADMIN_KEYRING);
    Ok(keyring)
}

/// `client.bootstrap-osd` keyring used by `ceph-volume`
pub fn create_bootstrap_osd_keyring(fs: &dyn HostFs, dir: &Path) -> Result<Keyring> {
    let keyring = create_keyring(
        fs,
        dir,
        "client.bootstrap-osd",
        &[("mon", "profile bootstrap-osd"), ("mgr", "allow r")],
    )?;
    debug_assert_eq!(keyring.file_name(), OSD_KEYRING);
    Ok(keyring)
}
