//! Host File Operations
//!
//! Directory, copy, removal and ownership helpers. Each returns `Ok(false)`
//! when the source or target is absent instead of failing, which keeps
//! removal paths idempotent.

use crate::error::{Error, Result};
use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Port for file and permission operations on the host
pub trait HostFs: Send + Sync {
    /// Create a directory (and parents) with `mode`; `false` if it already existed
    fn create_dir(&self, path: &Path, mode: u32) -> Result<bool>;

    /// Remove a directory tree; `false` if it did not exist
    fn remove_dir(&self, path: &Path) -> Result<bool>;

    /// Copy a file keeping its permissions; `false` if `src` does not exist
    fn copy_file(&self, src: &Path, dest: &Path) -> Result<bool>;

    /// Write `contents` to `path`, replacing it; parent directories must exist
    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()>;

    /// Remove a file; `false` if it did not exist
    fn remove_file(&self, path: &Path) -> Result<bool>;

    /// Append the contents of `src` to `dest`; `false` if `src` does not exist
    fn append_file(&self, src: &Path, dest: &Path) -> Result<bool>;

    /// Change owner of `path` and everything below it; `false` if it does not exist
    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<bool>;

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

// =============================================================================
// Local Filesystem
// =============================================================================

/// [`HostFs`] backed by the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFs {
    /// Apply ownership changes; off when running unprivileged (tests, dry runs)
    manage_ownership: bool,
}

impl LocalFs {
    pub fn new() -> Self {
        Self {
            manage_ownership: true,
        }
    }

    /// A filesystem that treats ownership changes as no-ops
    pub fn without_ownership() -> Self {
        Self {
            manage_ownership: false,
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

impl HostFs for LocalFs {
    fn create_dir(&self, path: &Path, mode: u32) -> Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        DirBuilder::new().recursive(true).mode(mode).create(path)?;
        debug!("Created directory {:?}", path);
        Ok(true)
    }

    fn remove_dir(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(path)?;
        debug!("Removed directory {:?}", path);
        Ok(true)
    }

    fn copy_file(&self, src: &Path, dest: &Path) -> Result<bool> {
        if !src.exists() {
            debug!("Not copying {:?}, source is missing", src);
            return Ok(false);
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dest)?;
        Ok(true)
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents)?;
        debug!("Wrote {:?}", path);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn append_file(&self, src: &Path, dest: &Path) -> Result<bool> {
        if !src.exists() {
            return Ok(false);
        }
        let contents = fs::read(src)?;
        let mut file = OpenOptions::new().create(true).append(true).open(dest)?;
        file.write_all(&contents)?;
        Ok(true)
    }

    fn chown_recursive(&self, path: &Path, user: &str, group: &str) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        if !self.manage_ownership {
            return Ok(true);
        }
        let owner = format!("{}:{}", user, group);
        let output = Command::new("chown")
            .arg("-R")
            .arg(&owner)
            .arg(path)
            .output()?;
        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: format!("chown -R {} {}", owner, path.display()),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("Changed owner of {:?} to {}", path, owner);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_create_and_remove_dir() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs::without_ownership();
        let target = dir.path().join("var/lib/ceph/mon/ceph-node1");

        assert!(fs.create_dir(&target, 0o755).unwrap());
        assert!(!fs.create_dir(&target, 0o755).unwrap());
        let mode = std::fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o700, 0o700);
        assert_eq!(mode & 0o002, 0);

        assert!(fs.remove_dir(&target).unwrap());
        assert!(!fs.remove_dir(&target).unwrap());
    }

    #[test]
    fn test_copy_and_append() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs::without_ownership();
        let a = dir.path().join("a");
        let b = dir.path().join("nested/b");
        std::fs::write(&a, "first\n").unwrap();

        assert!(fs.copy_file(&a, &b).unwrap());
        assert!(!fs.copy_file(&dir.path().join("missing"), &b).unwrap());
        assert!(fs.append_file(&a, &b).unwrap());
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "first\nfirst\n");
        fs.write_file(&b, b"second\n").unwrap();
        assert_eq!(std::fs::read_to_string(&b).unwrap(), "second\n");

        assert!(fs.remove_file(&b).unwrap());
        assert!(!fs.remove_file(&b).unwrap());
    }

    #[test]
    fn test_chown_missing_path() {
        let fs = LocalFs::new();
        assert!(!fs
            .chown_recursive(Path::new("/nonexistent/ramstor"), "root", "root")
            .unwrap());
    }

    #[test]
    fn test_unknown_user_rejected() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFs::new();
        let err = fs
            .chown_recursive(dir.path(), "ramstor-no-such-user", "root")
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { ref command, .. } if command.starts_with("chown -R ramstor-no-such-user:root")));
    }
}
