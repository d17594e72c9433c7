//! Node queries routed through the node manager's failover.

use futures::future::{join_all, try_join_all};
use tracing::debug;

use crate::block::id::{AliasId, BlockId, FoundryId, NftId, OutputId, TransactionId};
use crate::block::Block;
use crate::client::Client;
use crate::config::MAX_PARALLEL_API_REQUESTS;
use crate::error::Result;
use crate::node_manager::api::{
    BlockMetadata, ChainId, NodeInfo, NodeInfoWrapper, OutputKind, OutputQuery, OutputResponse,
    QueryParameter,
};
use crate::node_manager::node::{Node, NodeAuth};

impl Client {
    /// Info of the node currently in use, with its URL.
    pub async fn get_info(&self) -> Result<NodeInfoWrapper> {
        self.node_manager()
            .request(|api, node, timeout| async move {
                let node_info = api.get_info(&node, timeout).await?;
                Ok(NodeInfoWrapper {
                    node_info,
                    url: node.url,
                })
            })
            .await
    }

    /// Health of an arbitrary node, outside the pool.
    pub async fn get_health(&self, url: &str) -> Result<bool> {
        let node = Node::new(url)?;
        let manager = self.node_manager();
        manager.api().get_health(&node, manager.api_timeout()).await
    }

    /// Info of an arbitrary node, outside the pool.
    pub async fn get_node_info(&self, url: &str, auth: Option<NodeAuth>) -> Result<NodeInfo> {
        let mut node = Node::new(url)?;
        if let Some(auth) = auth {
            node = node.with_auth(auth);
        }
        let manager = self.node_manager();
        manager.api().get_info(&node, manager.api_timeout()).await
    }

    pub async fn get_tips(&self) -> Result<Vec<BlockId>> {
        self.node_manager()
            .request(|api, node, timeout| async move { api.get_tips(&node, timeout).await })
            .await
    }

    /// Submits a block that already carries its nonce.
    pub async fn post_block(&self, block: &Block) -> Result<BlockId> {
        self.node_manager()
            .request(|api, node, timeout| async move { api.post_block(&node, block, timeout).await })
            .await
    }

    pub async fn get_block(&self, block_id: &BlockId) -> Result<Block> {
        self.node_manager()
            .request(|api, node, timeout| async move { api.get_block(&node, block_id, timeout).await })
            .await
    }

    pub async fn get_block_metadata(&self, block_id: &BlockId) -> Result<BlockMetadata> {
        self.node_manager()
            .request(|api, node, timeout| async move {
                api.get_block_metadata(&node, block_id, timeout).await
            })
            .await
    }

    /// The block that got `transaction_id` into the ledger.
    pub async fn get_included_block(&self, transaction_id: &TransactionId) -> Result<Block> {
        self.node_manager()
            .request(|api, node, timeout| async move {
                api.get_included_block(&node, transaction_id, timeout).await
            })
            .await
    }

    pub async fn get_output(&self, output_id: &OutputId) -> Result<OutputResponse> {
        self.node_manager()
            .request(|api, node, timeout| async move { api.get_output(&node, output_id, timeout).await })
            .await
    }

    /// Fetches many outputs, at most [`MAX_PARALLEL_API_REQUESTS`] at a
    /// time. Results keep the order of `output_ids`.
    pub async fn get_outputs(&self, output_ids: &[OutputId]) -> Result<Vec<OutputResponse>> {
        let mut outputs = Vec::with_capacity(output_ids.len());
        for chunk in output_ids.chunks(MAX_PARALLEL_API_REQUESTS) {
            outputs.extend(try_join_all(chunk.iter().map(|id| self.get_output(id))).await?);
        }
        debug!(count = outputs.len(), "fetched outputs");
        Ok(outputs)
    }

    /// Like [`Client::get_outputs`], skipping outputs that could not be
    /// fetched.
    pub async fn try_get_outputs(&self, output_ids: &[OutputId]) -> Result<Vec<OutputResponse>> {
        let mut outputs = Vec::with_capacity(output_ids.len());
        for chunk in output_ids.chunks(MAX_PARALLEL_API_REQUESTS) {
            let fetched = join_all(chunk.iter().map(|id| self.get_output(id))).await;
            outputs.extend(fetched.into_iter().filter_map(|r| r.ok()));
        }
        debug!(requested = output_ids.len(), count = outputs.len(), "fetched outputs");
        Ok(outputs)
    }

    /// Unspent output ids matching an indexer query.
    pub async fn output_ids(&self, query: OutputQuery) -> Result<Vec<OutputId>> {
        let query = &query;
        self.node_manager()
            .request(|api, node, timeout| async move { api.output_ids(&node, query, timeout).await })
            .await
    }

    /// Unspent basic output ids held by a Bech32 address.
    pub async fn basic_output_ids(&self, bech32_address: &str) -> Result<Vec<OutputId>> {
        self.output_ids(OutputQuery::basic_by_address(bech32_address)).await
    }

    pub async fn basic_output_ids_by(&self, parameters: Vec<QueryParameter>) -> Result<Vec<OutputId>> {
        self.output_ids(OutputQuery::new(OutputKind::Basic, parameters)?).await
    }

    pub async fn alias_output_ids(&self, parameters: Vec<QueryParameter>) -> Result<Vec<OutputId>> {
        self.output_ids(OutputQuery::new(OutputKind::Alias, parameters)?).await
    }

    pub async fn nft_output_ids(&self, parameters: Vec<QueryParameter>) -> Result<Vec<OutputId>> {
        self.output_ids(OutputQuery::new(OutputKind::Nft, parameters)?).await
    }

    pub async fn foundry_output_ids(&self, parameters: Vec<QueryParameter>) -> Result<Vec<OutputId>> {
        self.output_ids(OutputQuery::new(OutputKind::Foundry, parameters)?).await
    }

    async fn chain_output_id(&self, chain: ChainId) -> Result<OutputId> {
        let chain = &chain;
        self.node_manager()
            .request(|api, node, timeout| async move { api.chain_output_id(&node, chain, timeout).await })
            .await
    }

    /// Output currently holding the alias.
    pub async fn alias_output_id(&self, alias_id: AliasId) -> Result<OutputId> {
        self.chain_output_id(ChainId::Alias(alias_id)).await
    }

    pub async fn nft_output_id(&self, nft_id: NftId) -> Result<OutputId> {
        self.chain_output_id(ChainId::Nft(nft_id)).await
    }

    pub async fn foundry_output_id(&self, foundry_id: FoundryId) -> Result<OutputId> {
        self.chain_output_id(ChainId::Foundry(foundry_id)).await
    }
}
