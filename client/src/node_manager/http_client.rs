//! [`NodeApi`] over the node's REST interface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::api::{
    BlockMetadata, ChainId, NodeApi, NodeInfo, OutputIdsResponse, OutputQuery, OutputResponse,
    SubmitBlockResponse, TipsResponse,
};
use super::node::Node;
use crate::block::id::{BlockId, OutputId, TransactionId};
use crate::block::Block;
use crate::error::{Error, Result};

const HEALTH: &str = "/health";
const INFO: &str = "/api/core/v2/info";
const TIPS: &str = "/api/core/v2/tips";
const BLOCKS: &str = "/api/core/v2/blocks";
const OUTPUTS: &str = "/api/core/v2/outputs";
const TRANSACTIONS: &str = "/api/core/v2/transactions";
const INDEXER_OUTPUTS: &str = "/api/indexer/v1/outputs";

#[derive(Debug, Clone, Default)]
pub struct HttpNodeClient {
    client: reqwest::Client,
}

/// Body of `POST /blocks` when the node should do the proof of work.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnminedBlock<'a> {
    protocol_version: u8,
    parents: &'a crate::block::Parents,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<&'a crate::block::payload::Payload>,
}

impl HttpNodeClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn authorize(request: RequestBuilder, node: &Node, timeout: Duration) -> RequestBuilder {
        let mut request = request.timeout(timeout);
        if let Some(auth) = &node.auth {
            if let Some(jwt) = &auth.jwt {
                request = request.bearer_auth(jwt);
            }
            if let Some((name, password)) = &auth.basic_auth_name_pwd {
                request = request.basic_auth(name, Some(password));
            }
        }
        request
    }

    async fn check(response: Response, url: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(Error::Response {
            code: status.as_u16(),
            text,
            url: url.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, node: &Node, path: &str, timeout: Duration) -> Result<T> {
        let url = node.endpoint(path);
        debug!(%url, "GET");
        let request = Self::authorize(self.client.get(&url), node, timeout);
        let response = request.send().await.map_err(|e| Error::from_transport(e, timeout))?;
        let response = Self::check(response, &url).await?;
        response.json().await.map_err(|e| Error::from_transport(e, timeout))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        node: &Node,
        body: &B,
        timeout: Duration,
    ) -> Result<BlockId> {
        let url = node.endpoint(BLOCKS);
        debug!(%url, "POST");
        let request = Self::authorize(self.client.post(&url), node, timeout).json(body);
        let response = request.send().await.map_err(|e| Error::from_transport(e, timeout))?;
        match Self::check(response, &url).await {
            Ok(response) => Ok(response
                .json::<SubmitBlockResponse>()
                .await
                .map_err(|e| Error::from_transport(e, timeout))?
                .block_id),
            Err(Error::Response { code, text, .. })
                if StatusCode::from_u16(code).is_ok_and(|s| s.is_client_error()) =>
            {
                Err(Error::PostRejected(text))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl NodeApi for HttpNodeClient {
    async fn get_health(&self, node: &Node, timeout: Duration) -> Result<bool> {
        let url = node.endpoint(HEALTH);
        let request = Self::authorize(self.client.get(&url), node, timeout);
        let response = request.send().await.map_err(|e| Error::from_transport(e, timeout))?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::SERVICE_UNAVAILABLE => Ok(false),
            _ => Err(Self::check(response, &url).await.err().unwrap_or_else(|| {
                Error::Network(format!("unexpected health status from {url}"))
            })),
        }
    }

    async fn get_info(&self, node: &Node, timeout: Duration) -> Result<NodeInfo> {
        self.get_json(node, INFO, timeout).await
    }

    async fn get_tips(&self, node: &Node, timeout: Duration) -> Result<Vec<BlockId>> {
        Ok(self.get_json::<TipsResponse>(node, TIPS, timeout).await?.tips)
    }

    async fn post_block(&self, node: &Node, block: &Block, timeout: Duration) -> Result<BlockId> {
        self.post_json(node, block, timeout).await
    }

    async fn post_block_remote_pow(
        &self,
        node: &Node,
        block: &Block,
        timeout: Duration,
    ) -> Result<BlockId> {
        let body = UnminedBlock {
            protocol_version: block.protocol_version(),
            parents: block.parents(),
            payload: block.payload(),
        };
        self.post_json(node, &body, timeout).await
    }

    async fn get_block(&self, node: &Node, block_id: &BlockId, timeout: Duration) -> Result<Block> {
        self.get_json(node, &format!("{BLOCKS}/{block_id}"), timeout).await
    }

    async fn get_block_metadata(
        &self,
        node: &Node,
        block_id: &BlockId,
        timeout: Duration,
    ) -> Result<BlockMetadata> {
        self.get_json(node, &format!("{BLOCKS}/{block_id}/metadata"), timeout).await
    }

    async fn get_included_block(
        &self,
        node: &Node,
        transaction_id: &TransactionId,
        timeout: Duration,
    ) -> Result<Block> {
        self.get_json(node, &format!("{TRANSACTIONS}/{transaction_id}/included-block"), timeout)
            .await
    }

    async fn get_output(
        &self,
        node: &Node,
        output_id: &OutputId,
        timeout: Duration,
    ) -> Result<OutputResponse> {
        self.get_json(node, &format!("{OUTPUTS}/{output_id}"), timeout).await
    }

    async fn output_ids(
        &self,
        node: &Node,
        query: &OutputQuery,
        timeout: Duration,
    ) -> Result<Vec<OutputId>> {
        let route = format!("{INDEXER_OUTPUTS}/{}", query.kind().as_str());
        let filters = query.filters();
        let mut ids = Vec::new();
        let mut cursor = query.cursor().map(str::to_string);
        loop {
            let mut params: Vec<String> = Vec::new();
            if !filters.is_empty() {
                params.push(filters.clone());
            }
            if let Some(cursor) = &cursor {
                params.push(format!("cursor={cursor}"));
            }
            let path = if params.is_empty() {
                route.clone()
            } else {
                format!("{route}?{}", params.join("&"))
            };
            let page: OutputIdsResponse = self.get_json(node, &path, timeout).await?;
            ids.extend(page.items);
            match page.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(ids),
            }
        }
    }

    async fn chain_output_id(&self, node: &Node, chain: &ChainId, timeout: Duration) -> Result<OutputId> {
        let path = format!("{INDEXER_OUTPUTS}/{}/{chain}", chain.kind().as_str());
        let page: OutputIdsResponse = self.get_json(node, &path, timeout).await?;
        page.items.into_iter().next().ok_or_else(|| Error::Response {
            code: 404,
            text: format!("no output holds {chain}"),
            url: node.endpoint(&path),
        })
    }
}
