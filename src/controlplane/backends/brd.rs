//! RAM Block Devices
//!
//! Backs the OSDs with `/dev/ram*` devices from the `brd` kernel module.
//! Device memory comes out of system RAM, so creation checks free memory
//! first.

use super::BackendContext;
use crate::domain::ports::Device;
use crate::error::{Error, Result};
use crate::host::CommandSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info};

const KIB_PER_GIB: u64 = 1024 * 1024;

/// Device backend over the `brd` kernel module
pub struct BrdDevice {
    ctx: BackendContext,
}

impl BrdDevice {
    /// Create a new brd device backend
    pub fn new(ctx: BackendContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Device for BrdDevice {
    async fn create_devices(&self, size_gib: u64, count: u32) -> Result<Vec<PathBuf>> {
        let size_kib = size_gib.checked_mul(KIB_PER_GIB);
        let requested_kib = size_kib.and_then(|kib| kib.checked_mul(u64::from(count)));
        let (Some(size_kib), Some(requested_kib)) = (size_kib, requested_kib) else {
            return Err(Error::Configuration(format!(
                "{} devices of {} GiB overflow a 64-bit KiB count",
                count, size_gib
            )));
        };
        let available_kib = self.ctx.host.free_memory_kib()?;
        if requested_kib > available_kib {
            return Err(Error::NotEnoughMemory {
                count,
                size_kib,
                requested_kib,
                available_kib,
            });
        }

        if self.ctx.fs.exists(&self.ctx.layout.ram_device(0)) {
            return Err(Error::DeviceCreationFailed(
                "RAM block devices already exist, remove them before creating new ones".into(),
            ));
        }

        info!("Creating {} RAM block devices of {} GiB", count, size_gib);
        let spec = CommandSpec::new("modprobe").args([
            "brd".to_string(),
            format!("rd_size={}", size_kib),
            "max_part=1".to_string(),
            format!("rd_nr={}", count),
        ]);
        let output = self.ctx.runner.run(&spec).await?;
        if !output.success() {
            return Err(Error::DeviceCreationFailed(format!(
                "`{}` exited with {:?}: {}",
                spec.display(),
                output.status,
                output.stderr.trim()
            )));
        }

        Ok(self.device_paths(count))
    }

    async fn remove_devices(&self) -> Result<()> {
        let output = self
            .ctx
            .runner
            .run_tolerant(&CommandSpec::new("rmmod").arg("brd"))
            .await;
        if !output.success() {
            debug!("brd module was not loaded");
        }
        Ok(())
    }

    fn device_paths(&self, count: u32) -> Vec<PathBuf> {
        (0..count).map(|i| self.ctx.layout.ram_device(i)).collect()
    }
}
