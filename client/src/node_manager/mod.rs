//! # Node Manager
//!
//! Owns the node pool and decides which node serves a request.
//!
//! ## Selection
//!
//! 1. The primary node, when one is configured and synced.
//! 2. Otherwise the synced pool members in round-robin order.
//!
//! A request that fails with a transport error or timeout marks the node
//! unsynced and moves on to the next candidate; any other error is the
//! answer. With no synced node left the request fails with
//! [`Error::NoSyncedNode`].
//!
//! ## Sync
//!
//! [`NodeManager::sync_nodes`] asks every enabled node for `/info`
//! concurrently and marks it synced when it reports healthy and (when
//! known) the expected network. The client re-runs it on an interval.
//! With sync disabled, every enabled node counts as synced forever.

pub mod api;
pub mod http_client;
pub mod node;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::{debug, info, warn};

use self::api::{NodeApi, NodeInfo};
use self::node::{Node, NodeState};
use crate::error::{Error, Result};

pub struct NodeManager {
    primary: Option<Node>,
    pool: Vec<Node>,
    states: DashMap<String, NodeState>,
    cursor: AtomicUsize,
    sync_enabled: bool,
    api: Arc<dyn NodeApi>,
    api_timeout: Duration,
}

impl std::fmt::Debug for NodeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeManager")
            .field("primary", &self.primary)
            .field("pool", &self.pool)
            .field("sync_enabled", &self.sync_enabled)
            .finish()
    }
}

impl NodeManager {
    pub fn new(
        primary: Option<Node>,
        pool: Vec<Node>,
        sync_enabled: bool,
        api: Arc<dyn NodeApi>,
        api_timeout: Duration,
    ) -> Self {
        let initial = if sync_enabled {
            NodeState::Unknown
        } else {
            NodeState::Synced
        };
        let states = DashMap::new();
        for node in primary.iter().chain(&pool).filter(|n| !n.disabled) {
            states.insert(node.url.clone(), initial);
        }
        Self {
            primary,
            pool,
            states,
            cursor: AtomicUsize::new(0),
            sync_enabled,
            api,
            api_timeout,
        }
    }

    pub fn api(&self) -> &Arc<dyn NodeApi> {
        &self.api
    }

    pub fn api_timeout(&self) -> Duration {
        self.api_timeout
    }

    pub fn sync_enabled(&self) -> bool {
        self.sync_enabled
    }

    /// Every enabled node, primary first.
    pub fn enabled_nodes(&self) -> Vec<Node> {
        let mut nodes: Vec<Node> = Vec::new();
        for node in self.primary.iter().chain(&self.pool) {
            if !node.disabled && !nodes.contains(node) {
                nodes.push(node.clone());
            }
        }
        nodes
    }

    pub fn state(&self, node: &Node) -> NodeState {
        self.states
            .get(&node.url)
            .map(|s| *s)
            .unwrap_or(NodeState::Unknown)
    }

    fn is_synced(&self, node: &Node) -> bool {
        !node.disabled && self.state(node) == NodeState::Synced
    }

    fn synced_pool(&self) -> Vec<Node> {
        self.pool
            .iter()
            .filter(|n| self.is_synced(n))
            .cloned()
            .collect()
    }

    /// A node to send the next request to.
    pub fn get_node(&self) -> Result<Node> {
        self.candidates().into_iter().next().ok_or(Error::NoSyncedNode)
    }

    /// Synced nodes in the order a request tries them. Advances the
    /// round-robin cursor once.
    fn candidates(&self) -> Vec<Node> {
        let mut candidates = Vec::new();
        if let Some(primary) = self.primary.as_ref().filter(|p| self.is_synced(p)) {
            candidates.push(primary.clone());
        }
        let pool = self.synced_pool();
        if !pool.is_empty() {
            let start = self.cursor.fetch_add(1, Ordering::Relaxed) % pool.len();
            for node in pool.iter().cycle().skip(start).take(pool.len()) {
                if !candidates.contains(node) {
                    candidates.push(node.clone());
                }
            }
        }
        debug!(candidates = candidates.len(), "selected nodes");
        candidates
    }

    /// Enabled nodes currently marked unsynced.
    pub fn unsynced_nodes(&self) -> Vec<Node> {
        self.enabled_nodes()
            .into_iter()
            .filter(|n| self.state(n) == NodeState::Unsynced)
            .collect()
    }

    pub fn mark(&self, node: &Node, state: NodeState) {
        if self.sync_enabled {
            self.states.insert(node.url.clone(), state);
        }
    }

    /// Runs `op` against synced nodes until one answers. Transport failures
    /// and timeouts mark the node unsynced and fall through to the next.
    pub async fn request<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn(Arc<dyn NodeApi>, Node, Duration) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let timeout = self.api_timeout;
        let mut last_error = Error::NoSyncedNode;
        for node in self.candidates() {
            let call = op(self.api.clone(), node.clone(), timeout);
            let outcome = match tokio::time::timeout(timeout, call).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout(timeout)),
            };
            match outcome {
                Err(e) if e.is_node_failure() => {
                    warn!(node = %node.url, error = %e, "node request failed, marking unsynced");
                    self.mark(&node, NodeState::Unsynced);
                    last_error = e;
                }
                other => return other,
            }
        }
        Err(last_error)
    }

    /// Checks every enabled node. `network_name` filters out nodes serving a
    /// different network. Returns the info of the nodes found synced.
    pub async fn sync_nodes(&self, network_name: Option<&str>) -> Vec<(Node, NodeInfo)> {
        if !self.sync_enabled {
            return Vec::new();
        }
        let nodes = self.enabled_nodes();
        let checks = nodes.iter().map(|node| async move {
            let result =
                tokio::time::timeout(self.api_timeout, self.api.get_info(node, self.api_timeout))
                    .await
                    .unwrap_or(Err(Error::Timeout(self.api_timeout)));
            (node, result)
        });

        let mut synced = Vec::new();
        for (node, result) in join_all(checks).await {
            match result {
                Ok(info)
                    if info.status.is_healthy
                        && network_name.map_or(true, |n| n == info.protocol.network_name) =>
                {
                    self.states.insert(node.url.clone(), NodeState::Synced);
                    synced.push((node.clone(), info));
                }
                Ok(info) => {
                    warn!(
                        node = %node.url,
                        healthy = info.status.is_healthy,
                        network = %info.protocol.network_name,
                        "node is not usable"
                    );
                    self.states.insert(node.url.clone(), NodeState::Unsynced);
                }
                Err(e) => {
                    warn!(node = %node.url, error = %e, "node sync check failed");
                    self.states.insert(node.url.clone(), NodeState::Unsynced);
                }
            }
        }
        info!(synced = synced.len(), total = nodes.len(), "node sync finished");
        synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockNode;

    fn node(url: &str) -> Node {
        Node::new(url).unwrap()
    }

    fn manager(primary: Option<Node>, pool: Vec<Node>, sync: bool) -> NodeManager {
        NodeManager::new(
            primary,
            pool,
            sync,
            Arc::new(MockNode::new("testnet")),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn unsynced_pool_has_no_node() {
        let m = manager(None, vec![node("http://a")], true);
        assert!(matches!(m.get_node(), Err(Error::NoSyncedNode)));
    }

    #[test]
    fn sync_disabled_treats_enabled_nodes_as_synced() {
        let mut disabled = node("http://b");
        disabled.disabled = true;
        let m = manager(None, vec![node("http://a"), disabled], false);
        for _ in 0..4 {
            assert_eq!(m.get_node().unwrap().url, "http://a");
        }
    }

    #[test]
    fn round_robin_over_synced_nodes() {
        let m = manager(None, vec![node("http://a"), node("http://b")], false);
        let first = m.get_node().unwrap();
        let second = m.get_node().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn primary_wins_while_synced() {
        let m = manager(Some(node("http://p")), vec![node("http://a")], true);
        m.states.insert("http://p".into(), NodeState::Synced);
        m.states.insert("http://a".into(), NodeState::Synced);
        assert_eq!(m.get_node().unwrap().url, "http://p");
        m.mark(&node("http://p"), NodeState::Unsynced);
        assert_eq!(m.get_node().unwrap().url, "http://a");
        assert_eq!(m.unsynced_nodes(), vec![node("http://p")]);
    }

    #[test]
    fn never_returns_an_unsynced_node() {
        let m = manager(None, vec![node("http://a"), node("http://b")], true);
        m.states.insert("http://a".into(), NodeState::Unsynced);
        m.states.insert("http://b".into(), NodeState::Synced);
        for _ in 0..5 {
            assert_eq!(m.get_node().unwrap().url, "http://b");
        }
    }

    #[tokio::test]
    async fn sync_marks_nodes_on_the_expected_network() {
        let m = manager(None, vec![node("http://a")], true);
        let synced = m.sync_nodes(Some("testnet")).await;
        assert_eq!(synced.len(), 1);
        assert_eq!(m.state(&node("http://a")), NodeState::Synced);

        let synced = m.sync_nodes(Some("mainnet")).await;
        assert!(synced.is_empty());
        assert_eq!(m.state(&node("http://a")), NodeState::Unsynced);
    }

    #[tokio::test]
    async fn failing_node_is_marked_unsynced() {
        let m = manager(None, vec![node("http://a")], true);
        m.sync_nodes(None).await;
        let err = m
            .request(|_, _, _| async { Err::<(), _>(Error::Network("connection reset".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(m.state(&node("http://a")), NodeState::Unsynced);
        assert!(matches!(m.get_node(), Err(Error::NoSyncedNode)));
    }

    #[tokio::test]
    async fn non_transport_errors_do_not_mark_nodes() {
        let m = manager(None, vec![node("http://a")], true);
        m.sync_nodes(None).await;
        let err = m
            .request(|_, _, _| async { Err::<(), _>(Error::PostRejected("double spend".into())) })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PostRejected(_)));
        assert_eq!(m.state(&node("http://a")), NodeState::Synced);
    }
}
