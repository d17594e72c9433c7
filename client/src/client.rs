//! # Client
//!
//! [`Client`] is the shared handle every operation goes through. It owns:
//!
//! - the [`NodeManager`] (node pool, health, failover),
//! - the [`NetworkInfoCache`] (protocol parameters, fetched once),
//! - the device registry that keeps hardware wallets to one operation at a
//!   time,
//! - the background task that re-checks node health.
//!
//! Cloning a `Client` is cheap; clones share all of the above. The sync task
//! holds only a weak reference and stops once the last clone is dropped.
//!
//! ```text
//! ClientBuilder::finish
//!   ├── parse nodes
//!   ├── initial sync  ──► first synced node seeds the network info
//!   └── spawn sync task (every node_sync_interval)
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::block::output::RentStructure;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::network_info::{NetworkInfo, NetworkInfoCache, NetworkSettings, ProtocolParameters};
use crate::node_manager::api::NodeApi;
use crate::node_manager::http_client::HttpNodeClient;
use crate::node_manager::node::{Node, NodeDto};
use crate::node_manager::NodeManager;
use crate::secret::ledger::{LedgerSecretManager, LedgerTransport, SpeculosTransport};
use crate::secret::vault::VaultRegistry;
use crate::secret::{LedgerNanoStatus, SecretManager, SecretManagerDto};

/// Builds a [`Client`] from options.
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    node_api: Option<Arc<dyn NodeApi>>,
    ledger_transport: Option<Arc<dyn LedgerTransport>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Options in the JSON shape bindings send.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::from_config(ClientConfig::from_json(json)?))
    }

    pub fn with_node(mut self, url: &str) -> Result<Self> {
        self.config.nodes.push(NodeDto::from(Node::new(url)?));
        Ok(self)
    }

    pub fn with_primary_node(mut self, url: &str) -> Result<Self> {
        self.config.primary_node = Some(NodeDto::from(Node::new(url)?));
        Ok(self)
    }

    pub fn with_node_sync_disabled(mut self) -> Self {
        self.config.node_sync_enabled = false;
        self
    }

    pub fn with_local_pow(mut self, local_pow: bool) -> Self {
        self.config.local_pow = local_pow;
        self
    }

    pub fn with_api_timeout(mut self, timeout: Duration) -> Self {
        self.config.api_timeout = timeout;
        self
    }

    /// Runs without asking nodes for protocol parameters.
    pub fn with_protocol_parameters(mut self, params: ProtocolParameters) -> Self {
        self.config.protocol_parameters = Some(params);
        self
    }

    /// Replaces the REST transport, e.g. with an in-memory node.
    pub fn with_node_api(mut self, api: Arc<dyn NodeApi>) -> Self {
        self.node_api = Some(api);
        self
    }

    /// Replaces the transport used for simulator Ledgers.
    pub fn with_ledger_transport(mut self, transport: Arc<dyn LedgerTransport>) -> Self {
        self.ledger_transport = Some(transport);
        self
    }

    pub async fn finish(self) -> Result<Client> {
        let config = self.config;
        let pool = config
            .nodes
            .iter()
            .cloned()
            .map(NodeDto::into_node)
            .collect::<Result<Vec<_>>>()?;
        let primary = config.primary_node.clone().map(NodeDto::into_node).transpose()?;

        let api = self
            .node_api
            .unwrap_or_else(|| Arc::new(HttpNodeClient::new()));
        let node_manager = NodeManager::new(
            primary,
            pool,
            config.node_sync_enabled,
            api,
            config.api_timeout,
        );
        let network_info = NetworkInfoCache::new(
            NetworkSettings::from(&config),
            config.protocol_parameters.clone(),
        );
        let ledger_transport = self.ledger_transport.unwrap_or_else(|| {
            Arc::new(
                SpeculosTransport::new(config.ledger_simulator_address.clone())
                    .with_timeout(config.api_timeout),
            )
        });
        let pow_workers = config.pow_worker_count.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let client = Client {
            inner: Arc::new(ClientInner {
                config,
                node_manager,
                network_info,
                devices: DeviceRegistry::default(),
                vaults: VaultRegistry::default(),
                ledger_transport,
                pow_workers,
                sync_task: Mutex::new(None),
            }),
        };

        if client.inner.node_manager.sync_enabled() {
            let synced = client.sync_nodes().await;
            if synced == 0 && !client.inner.node_manager.enabled_nodes().is_empty() {
                warn!("no node is synced yet");
            }
            client.spawn_sync_task();
        }
        info!(
            nodes = client.inner.node_manager.enabled_nodes().len(),
            local_pow = client.inner.config.local_pow,
            offline = client.inner.network_info.is_offline(),
            "client ready"
        );
        Ok(client)
    }
}

/// One lock per hardware device. Operations on a device that is already
/// serving another one fail fast with [`Error::DeviceBusy`].
#[derive(Default)]
pub(crate) struct DeviceRegistry {
    devices: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl DeviceRegistry {
    pub(crate) fn acquire(&self, device_id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .devices
            .entry(device_id.to_string())
            .or_default()
            .clone();
        lock.try_lock_owned().map_err(|_| Error::DeviceBusy)
    }
}

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) node_manager: NodeManager,
    pub(crate) network_info: NetworkInfoCache,
    devices: DeviceRegistry,
    vaults: VaultRegistry,
    ledger_transport: Arc<dyn LedgerTransport>,
    pub(crate) pow_workers: usize,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Shared client handle.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("nodes", &self.inner.node_manager.enabled_nodes().len())
            .field("network", &self.inner.network_info.snapshot().map(|i| i.network_name))
            .finish()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn node_manager(&self) -> &NodeManager {
        &self.inner.node_manager
    }

    // -----------------------------------------------------------------------
    // Node health
    // -----------------------------------------------------------------------

    /// Checks every node once. Seeds the network info from the first synced
    /// node if nothing is cached yet. Returns the number of synced nodes.
    pub async fn sync_nodes(&self) -> usize {
        let expected = self.inner.network_info.snapshot().map(|i| i.network_name);
        let synced = self
            .inner
            .node_manager
            .sync_nodes(expected.as_deref())
            .await;
        if expected.is_none() {
            if let Some((node, info)) = synced.first() {
                debug!(url = %node.url, "network info from initial sync");
                self.inner.network_info.update(&info.protocol);
            }
        }
        synced.len()
    }

    fn spawn_sync_task(&self) {
        let interval = self.inner.config.node_sync_interval;
        if interval.is_zero() || tokio::runtime::Handle::try_current().is_err() {
            return;
        }
        let weak: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; the initial sync already ran.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Client { inner }.sync_nodes().await;
            }
        });
        *self.inner.sync_task.lock() = Some(handle);
    }

    /// The node the next request goes to.
    pub fn get_node(&self) -> Result<Node> {
        self.inner.node_manager.get_node()
    }

    pub fn unsynced_nodes(&self) -> Vec<Node> {
        self.inner.node_manager.unsynced_nodes()
    }

    // -----------------------------------------------------------------------
    // Network info
    // -----------------------------------------------------------------------

    /// Cached network info, fetched from a synced node on first use.
    pub async fn get_network_info(&self) -> Result<NetworkInfo> {
        if let Some(info) = self.inner.network_info.snapshot() {
            return Ok(info);
        }
        self.refresh_network_info().await
    }

    /// Asks a node for the protocol parameters and replaces the cache.
    pub async fn refresh_network_info(&self) -> Result<NetworkInfo> {
        if self.inner.network_info.is_offline() {
            self.inner.network_info.invalidate();
            if let Some(info) = self.inner.network_info.snapshot() {
                return Ok(info);
            }
        }
        let info = self.get_info().await.map_err(|e| match e {
            Error::NoSyncedNode => Error::Network("no node reachable for network info".into()),
            other => other,
        })?;
        Ok(self.inner.network_info.update(&info.node_info.protocol))
    }

    /// Forgets the cached network info; the next read fetches it again.
    pub fn invalidate_network_info(&self) {
        self.inner.network_info.invalidate();
    }

    pub async fn get_network_id(&self) -> Result<u64> {
        Ok(self.get_network_info().await?.network_id)
    }

    pub async fn get_bech32_hrp(&self) -> Result<String> {
        Ok(self.get_network_info().await?.bech32_hrp)
    }

    pub async fn get_min_pow_score(&self) -> Result<u32> {
        Ok(self.get_network_info().await?.min_pow_score)
    }

    pub async fn get_rent_structure(&self) -> Result<RentStructure> {
        Ok(self.get_network_info().await?.rent_structure)
    }

    pub fn get_tips_interval(&self) -> u64 {
        self.inner.network_info.settings().tips_interval
    }

    pub fn get_local_pow(&self) -> bool {
        self.inner.network_info.settings().local_pow
    }

    pub fn get_fall_back_to_local_pow(&self) -> bool {
        self.inner.network_info.settings().fallback_to_local_pow
    }

    // -----------------------------------------------------------------------
    // Secret managers & devices
    // -----------------------------------------------------------------------

    /// Builds a secret manager whose simulator Ledger talks through this
    /// client's transport. Vault snapshots stay open for the client's life.
    pub fn secret_manager_from_dto(&self, dto: SecretManagerDto) -> Result<SecretManager> {
        SecretManager::from_dto(dto, self.inner.ledger_transport.clone(), &self.inner.vaults)
    }

    /// Holds the device lock of `secret_manager`, if it drives a device,
    /// for as long as the guard lives.
    pub(crate) fn lock_device(
        &self,
        secret_manager: &SecretManager,
    ) -> Result<Option<OwnedMutexGuard<()>>> {
        secret_manager
            .device_id()
            .map(|id| self.inner.devices.acquire(&id))
            .transpose()
    }

    pub async fn get_ledger_nano_status(&self, is_simulator: bool) -> Result<LedgerNanoStatus> {
        let transport: Arc<dyn LedgerTransport> = if is_simulator {
            self.inner.ledger_transport.clone()
        } else {
            Arc::new(crate::secret::ledger::HidUnavailable)
        };
        let ledger = LedgerSecretManager::new(is_simulator, transport);
        let _guard = self.inner.devices.acquire(&ledger.device_id())?;
        ledger.status().await
    }

    pub async fn store_mnemonic(&self, secret_manager: &SecretManager, mnemonic: &str) -> Result<()> {
        secret_manager.store_mnemonic(mnemonic).await
    }
}
