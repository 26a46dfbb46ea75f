//! etcd-backed coordinator
//!
//! Wraps a single `etcd_client::Client`. The client multiplexes every call
//! over one balanced channel, so each operation works on a cheap clone
//! instead of serializing callers behind a mutex.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, LockOptions};
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::error::{ClientError, Result};
use crate::lease::LeaseId;

/// Connection settings for [`EtcdCoordinator`].
#[derive(Clone, Debug)]
pub struct ConnectConfig {
    /// Endpoint addresses, e.g. `http://127.0.0.1:2379`
    pub endpoints: Vec<String>,
    /// Upper bound on establishing the connection and probing the cluster
    pub connect_timeout: Duration,
    /// Per-request timeout applied by the transport (`None` = unbounded,
    /// needed for lock calls that wait on contention)
    pub request_timeout: Option<Duration>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["http://127.0.0.1:2379".to_string()],
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
        }
    }
}

impl ConnectConfig {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            ..Default::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Coordinator talking to an etcd v3 cluster.
#[derive(Clone)]
pub struct EtcdCoordinator {
    client: Client,
}

impl EtcdCoordinator {
    /// Connect to the cluster and probe it once.
    ///
    /// Fails if no endpoint is configured or none answers a status request
    /// within `connect_timeout`.
    pub async fn connect(config: &ConnectConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(ClientError::NoEndpoints);
        }

        info!(endpoints = ?config.endpoints, "Connecting to etcd");

        let mut options = ConnectOptions::new().with_connect_timeout(config.connect_timeout);
        if let Some(timeout) = config.request_timeout {
            options = options.with_timeout(timeout);
        }

        let mut client = tokio::time::timeout(
            config.connect_timeout,
            Client::connect(&config.endpoints, Some(options)),
        )
        .await
        .map_err(|_| ClientError::Timeout)??;

        // Channels connect lazily; the status probe is what proves reachability.
        let status = tokio::time::timeout(config.connect_timeout, client.status())
            .await
            .map_err(|_| {
                ClientError::Unavailable(format!(
                    "no endpoint answered within {:?}: {:?}",
                    config.connect_timeout, config.endpoints
                ))
            })?
            .map_err(|e| ClientError::Unavailable(e.to_string()))?;

        info!(version = %status.version(), "Connected to etcd");

        Ok(Self { client })
    }

    /// Wrap an already-connected client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// A clone of the underlying etcd client.
    pub fn client(&self) -> Client {
        self.client.clone()
    }
}

fn is_lease_not_found(err: &etcd_client::Error) -> bool {
    matches!(err, etcd_client::Error::GRpcStatus(status) if status.message().contains("lease not found"))
}

fn keep_alive_error(err: etcd_client::Error, lease: LeaseId) -> ClientError {
    match err {
        etcd_client::Error::LeaseKeepAliveError(_) => ClientError::LeaseNotFound(lease),
        e if is_lease_not_found(&e) => ClientError::LeaseNotFound(lease),
        e => e.into(),
    }
}

#[async_trait]
impl Coordinator for EtcdCoordinator {
    async fn lease_grant(&self, ttl_secs: i64) -> Result<LeaseId> {
        let resp = self.client.clone().lease_grant(ttl_secs, None).await?;
        let lease = LeaseId::new(resp.id());
        debug!(lease = %lease, ttl = resp.ttl(), "Lease granted");
        Ok(lease)
    }

    async fn lease_keep_alive_once(&self, lease: LeaseId) -> Result<i64> {
        let mut client = self.client.clone();
        // The keeper handshake sends one keep-alive and reads its response;
        // a gone lease comes back as `LeaseKeepAliveError`.
        client
            .lease_keep_alive(lease.get())
            .await
            .map_err(|e| keep_alive_error(e, lease))?;

        let resp = client.lease_time_to_live(lease.get(), None).await?;
        if resp.ttl() <= 0 {
            return Err(ClientError::LeaseNotFound(lease));
        }
        Ok(resp.granted_ttl())
    }

    async fn lease_revoke(&self, lease: LeaseId) -> Result<()> {
        match self.client.clone().lease_revoke(lease.get()).await {
            Ok(_) => {
                debug!(lease = %lease, "Lease revoked");
                Ok(())
            }
            Err(e) if is_lease_not_found(&e) => {
                debug!(lease = %lease, "Lease already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn lease_time_to_live(&self, lease: LeaseId) -> Result<Option<i64>> {
        match self.client.clone().lease_time_to_live(lease.get(), None).await {
            Ok(resp) if resp.ttl() >= 0 => Ok(Some(resp.ttl())),
            Ok(_) => Ok(None),
            Err(e) if is_lease_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn lock(&self, name: &[u8], lease: LeaseId) -> Result<Vec<u8>> {
        let options = LockOptions::new().with_lease(lease.get());
        let resp = self.client.clone().lock(name, Some(options)).await?;
        Ok(resp.key().to_vec())
    }

    async fn unlock(&self, lock_key: &[u8]) -> Result<()> {
        if let Err(e) = self.client.clone().unlock(lock_key).await {
            warn!(key = %String::from_utf8_lossy(lock_key), error = %e, "etcd unlock failed");
            return Err(e.into());
        }
        Ok(())
    }
}
