//! Ceph Object Gateway
//!
//! Runs radosgw on the monitor host and hands out S3 credentials. The
//! credentials land in `<folder>/credentials`:
//!
//! ```text
//! [default]
//! user=ramstor
//! access_key=...
//! secret_key=...
//! endpoint=http://<mon host>:7480/
//! ```

use super::daemon::DaemonUnit;
use super::{BackendContext, CephPool};
use crate::ceph::{keyring_file_name, read_mon_host, CREDENTIALS_FILE};
use crate::controlplane::poll::PollOutcome;
use crate::domain::ports::{
    Category, DaemonDescriptor, Gateway, PoolAllocator, S3Credentials,
};
use crate::error::{Error, Result};
use crate::host::CommandSpec;
use async_trait::async_trait;
use ini::Ini;
use serde::Deserialize;
use tracing::info;

pub const S3_USER: &str = "ramstor";
pub const GATEWAY_PORT: u16 = 7480;

/// Pools radosgw expects and their share of the cluster
pub const GATEWAY_POOLS: [(&str, f64); 6] = [
    (".rgw.root", 0.05),
    ("default.rgw.control", 0.02),
    ("default.rgw.meta", 0.02),
    ("default.rgw.log", 0.02),
    ("default.rgw.buckets.index", 0.05),
    ("default.rgw.buckets.data", 0.84),
];

#[derive(Debug, Deserialize)]
struct UserKey {
    user: String,
    access_key: String,
    secret_key: String,
}

/// The part of `radosgw-admin user create` output we need
#[derive(Debug, Deserialize)]
struct UserInfo {
    keys: Vec<UserKey>,
}

/// Gateway backend running `ceph-radosgw@radosgw.<host>`
pub struct CephGateway {
    ctx: BackendContext,
    pools: CephPool,
}

impl CephGateway {
    /// Create a new gateway backend
    pub fn new(ctx: BackendContext) -> Self {
        let pools = CephPool::new(ctx.clone());
        Self { ctx, pools }
    }

    fn entity(&self) -> String {
        format!("client.radosgw.{}", self.ctx.hostname)
    }

    fn daemon(&self) -> DaemonUnit {
        DaemonUnit::new(
            Category::Gateway,
            "radosgw",
            &format!("radosgw.{}", self.ctx.hostname),
            self.ctx.layout.rgw_dir(&self.ctx.hostname),
        )
    }

    /// Register the gateway key with the cluster; returns the keyring file name
    async fn add_gateway(&self) -> Result<String> {
        let entity = self.entity();
        let keyring = keyring_file_name(&entity);
        self.ctx
            .ceph()
            .auth_get_or_create(
                &entity,
                &[("mon", "allow *"), ("osd", "allow *")],
                &self.ctx.in_folder(&keyring),
            )
            .await?;
        Ok(keyring)
    }
}

#[async_trait]
impl Gateway for CephGateway {
    async fn create_gateway(&self) -> Result<DaemonDescriptor> {
        let keyring = self.add_gateway().await?;
        let daemon = self.daemon();
        daemon.prepare(&self.ctx, &keyring)?;

        for (pool, percentage) in GATEWAY_POOLS {
            self.pools.create_pool(pool, percentage).await?;
        }
        daemon.start(&self.ctx).await?;

        let ceph = self.ctx.ceph();
        let poll = self.ctx.timeouts.daemon_poll();
        match poll
            .until("gateway", || ceph.rgw_daemon_count(), |count| *count >= 1)
            .await
        {
            PollOutcome::Ready(_) => {
                info!("Gateway {} joined the cluster", daemon.unit);
                daemon.describe(&self.ctx).await
            }
            PollOutcome::TimedOut(_) => Err(Error::GatewayNotStarted(poll.timeout)),
        }
    }

    async fn create_s3_user(&self) -> Result<S3Credentials> {
        let spec = CommandSpec::new("radosgw-admin").args([
            "user".to_string(),
            "create".to_string(),
            format!("--uid={}", S3_USER),
            format!("--display-name={}", S3_USER),
        ]);
        let output = self.ctx.runner.run_checked(&spec).await?;
        let info: UserInfo = serde_json::from_str(&output.stdout)?;
        let Some(key) = info.keys.into_iter().next() else {
            return Err(Error::Internal(format!("radosgw-admin returned no keys for {}", S3_USER)));
        };

        let mon_host = read_mon_host(&self.ctx.folder)?;
        let credentials = S3Credentials {
            user: key.user,
            access_key: key.access_key,
            secret_key: key.secret_key,
            endpoint: format!("http://{}:{}/", mon_host, GATEWAY_PORT),
        };

        let mut doc = Ini::new();
        for (field, value) in [
            ("user", &credentials.user),
            ("access_key", &credentials.access_key),
            ("secret_key", &credentials.secret_key),
            ("endpoint", &credentials.endpoint),
        ] {
            doc.set_to(Some("default"), field.to_string(), value.clone());
        }
        let mut rendered = Vec::new();
        doc.write_to(&mut rendered)?;
        let path = self.ctx.in_folder(CREDENTIALS_FILE);
        self.ctx.fs.write_file(&path, &rendered)?;
        info!("Wrote S3 credentials for {} to {:?}", credentials.user, path);

        Ok(credentials)
    }

    async fn remove_gateway(&self) -> Result<()> {
        self.daemon().remove(&self.ctx).await
    }
}
