//! The node boundary: what the client needs from a node, independent of the
//! transport.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::node::Node;
use crate::block::id::{AliasId, BlockId, FoundryId, NftId, OutputId, TransactionId};
use crate::block::output::Output;
use crate::block::Block;
use crate::error::{Error, Result};
use crate::network_info::ProtocolParameters;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub is_healthy: bool,
    #[serde(default)]
    pub latest_milestone_index: Option<u32>,
}

/// `GET /api/core/v2/info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub name: String,
    pub version: String,
    pub status: NodeStatus,
    pub protocol: ProtocolParameters,
    #[serde(default)]
    pub features: Vec<String>,
}

impl NodeInfo {
    /// Nodes that advertise `pow` mine blocks posted without a nonce.
    pub fn supports_remote_pow(&self) -> bool {
        self.features.iter().any(|f| f == "pow")
    }
}

/// [`NodeInfo`] together with the node that served it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfoWrapper {
    pub node_info: NodeInfo,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TipsResponse {
    pub tips: Vec<BlockId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBlockResponse {
    pub block_id: BlockId,
}

/// Ledger bookkeeping of an output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputMetadata {
    pub block_id: BlockId,
    pub transaction_id: TransactionId,
    pub output_index: u16,
    pub is_spent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id_spent: Option<TransactionId>,
}

impl OutputMetadata {
    pub fn output_id(&self) -> OutputId {
        OutputId::new(self.transaction_id, self.output_index)
    }
}

/// `GET /api/core/v2/outputs/{outputId}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputResponse {
    pub metadata: OutputMetadata,
    pub output: Output,
}

/// Ledger verdict on a block referenced by a milestone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LedgerInclusionState {
    Included,
    Conflicting,
    NoTransaction,
}

/// `GET /api/core/v2/blocks/{blockId}/metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockMetadata {
    pub block_id: BlockId,
    pub parents: Vec<BlockId>,
    pub is_solid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenced_by_milestone_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_inclusion_state: Option<LedgerInclusionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_reason: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_promote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub should_reattach: Option<bool>,
}

impl BlockMetadata {
    /// Referenced by a milestone and not conflicting.
    pub fn is_included(&self) -> bool {
        matches!(
            self.ledger_inclusion_state,
            Some(LedgerInclusionState::Included | LedgerInclusionState::NoTransaction)
        )
    }

    pub fn should_promote(&self) -> bool {
        self.should_promote.unwrap_or(false)
    }

    pub fn should_reattach(&self) -> bool {
        self.should_reattach.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

/// The indexer route an output query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputKind {
    Basic,
    Alias,
    Nft,
    Foundry,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Basic => "basic",
            OutputKind::Alias => "alias",
            OutputKind::Nft => "nft",
            OutputKind::Foundry => "foundry",
        }
    }

    fn accepts(self, parameter: &QueryParameter) -> bool {
        use QueryParameter::*;
        match self {
            OutputKind::Basic => matches!(
                parameter,
                Address(_) | Sender(_) | Tag(_) | HasNativeTokens(_) | Cursor(_)
            ),
            OutputKind::Alias => matches!(
                parameter,
                StateController(_) | Governor(_) | Issuer(_) | Sender(_) | HasNativeTokens(_) | Cursor(_)
            ),
            OutputKind::Nft => matches!(
                parameter,
                Address(_) | Issuer(_) | Sender(_) | Tag(_) | HasNativeTokens(_) | Cursor(_)
            ),
            OutputKind::Foundry => matches!(parameter, AliasAddress(_) | HasNativeTokens(_) | Cursor(_)),
        }
    }
}

/// One indexer filter, written `{"address": "rms1..."}` on the wire.
/// Addresses are Bech32, tags hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryParameter {
    Address(String),
    AliasAddress(String),
    StateController(String),
    Governor(String),
    Issuer(String),
    Sender(String),
    Tag(String),
    HasNativeTokens(bool),
    Cursor(String),
}

impl QueryParameter {
    pub fn name(&self) -> &'static str {
        match self {
            QueryParameter::Address(_) => "address",
            QueryParameter::AliasAddress(_) => "aliasAddress",
            QueryParameter::StateController(_) => "stateController",
            QueryParameter::Governor(_) => "governor",
            QueryParameter::Issuer(_) => "issuer",
            QueryParameter::Sender(_) => "sender",
            QueryParameter::Tag(_) => "tag",
            QueryParameter::HasNativeTokens(_) => "hasNativeTokens",
            QueryParameter::Cursor(_) => "cursor",
        }
    }

    fn value(&self) -> String {
        match self {
            QueryParameter::HasNativeTokens(flag) => flag.to_string(),
            QueryParameter::Address(v)
            | QueryParameter::AliasAddress(v)
            | QueryParameter::StateController(v)
            | QueryParameter::Governor(v)
            | QueryParameter::Issuer(v)
            | QueryParameter::Sender(v)
            | QueryParameter::Tag(v)
            | QueryParameter::Cursor(v) => v.clone(),
        }
    }
}

/// A checked indexer query: every parameter fits the route, none repeats.
/// Paging is driven by the transport, so a caller's cursor is where paging
/// starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputQuery {
    kind: OutputKind,
    parameters: Vec<QueryParameter>,
}

impl OutputQuery {
    pub fn new(kind: OutputKind, parameters: Vec<QueryParameter>) -> Result<Self> {
        for (i, parameter) in parameters.iter().enumerate() {
            if !kind.accepts(parameter) {
                return Err(Error::Validation(format!(
                    "query parameter {} is not supported for {} outputs",
                    parameter.name(),
                    kind.as_str()
                )));
            }
            if parameters[..i].iter().any(|p| p.name() == parameter.name()) {
                return Err(Error::Validation(format!(
                    "query parameter {} given twice",
                    parameter.name()
                )));
            }
        }
        Ok(Self { kind, parameters })
    }

    /// Basic outputs whose address unlock condition is `bech32_address`.
    pub fn basic_by_address(bech32_address: &str) -> Self {
        Self {
            kind: OutputKind::Basic,
            parameters: vec![QueryParameter::Address(bech32_address.to_string())],
        }
    }

    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    pub fn parameters(&self) -> &[QueryParameter] {
        &self.parameters
    }

    /// The filters as a query string, without any cursor.
    pub fn filters(&self) -> String {
        self.parameters
            .iter()
            .filter(|p| !matches!(p, QueryParameter::Cursor(_)))
            .map(|p| format!("{}={}", p.name(), p.value()))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn cursor(&self) -> Option<&str> {
        self.parameters.iter().find_map(|p| match p {
            QueryParameter::Cursor(c) => Some(c.as_str()),
            _ => None,
        })
    }
}

/// The id of a chain whose current output the indexer can look up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainId {
    Alias(AliasId),
    Nft(NftId),
    Foundry(FoundryId),
}

impl ChainId {
    pub fn kind(&self) -> OutputKind {
        match self {
            ChainId::Alias(_) => OutputKind::Alias,
            ChainId::Nft(_) => OutputKind::Nft,
            ChainId::Foundry(_) => OutputKind::Foundry,
        }
    }
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainId::Alias(id) => id.fmt(f),
            ChainId::Nft(id) => id.fmt(f),
            ChainId::Foundry(id) => id.fmt(f),
        }
    }
}

/// One page of an indexer query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputIdsResponse {
    pub items: Vec<OutputId>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Everything the client asks of a node. Every call gets the node to talk
/// to and a deadline.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// `GET /health`: whether the node considers itself healthy.
    async fn get_health(&self, node: &Node, timeout: Duration) -> Result<bool>;

    async fn get_info(&self, node: &Node, timeout: Duration) -> Result<NodeInfo>;

    async fn get_tips(&self, node: &Node, timeout: Duration) -> Result<Vec<BlockId>>;

    /// Submits a mined block. Re-submitting an accepted block returns its id.
    async fn post_block(&self, node: &Node, block: &Block, timeout: Duration) -> Result<BlockId>;

    /// Submits a block without a nonce for the node to mine.
    async fn post_block_remote_pow(
        &self,
        node: &Node,
        block: &Block,
        timeout: Duration,
    ) -> Result<BlockId>;

    async fn get_block(&self, node: &Node, block_id: &BlockId, timeout: Duration) -> Result<Block>;

    async fn get_block_metadata(
        &self,
        node: &Node,
        block_id: &BlockId,
        timeout: Duration,
    ) -> Result<BlockMetadata>;

    /// The block whose transaction made it into the ledger.
    async fn get_included_block(
        &self,
        node: &Node,
        transaction_id: &TransactionId,
        timeout: Duration,
    ) -> Result<Block>;

    async fn get_output(
        &self,
        node: &Node,
        output_id: &OutputId,
        timeout: Duration,
    ) -> Result<OutputResponse>;

    /// Unspent output ids matching `query`, all pages.
    async fn output_ids(
        &self,
        node: &Node,
        query: &OutputQuery,
        timeout: Duration,
    ) -> Result<Vec<OutputId>>;

    /// The unspent output currently holding a chain.
    async fn chain_output_id(&self, node: &Node, chain: &ChainId, timeout: Duration) -> Result<OutputId>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_json_from_a_node() {
        let json = serde_json::json!({
            "name": "HORNET",
            "version": "2.0.0",
            "status": { "isHealthy": true, "latestMilestoneIndex": 10 },
            "protocol": {
                "version": 2,
                "networkName": "testnet",
                "bech32Hrp": "rms",
                "minPowScore": 1500,
                "rentStructure": { "vByteCost": 100, "vByteFactorKey": 10, "vByteFactorData": 1 },
                "tokenSupply": "1813620509061365"
            },
            "features": ["pow"]
        });
        let info: NodeInfo = serde_json::from_value(json).unwrap();
        assert!(info.status.is_healthy);
        assert!(info.supports_remote_pow());
        assert_eq!(info.protocol.bech32_hrp, "rms");
    }

    #[test]
    fn query_parameters_fit_their_route() {
        let params = vec![
            QueryParameter::StateController("rms1state".into()),
            QueryParameter::HasNativeTokens(false),
        ];
        let query = OutputQuery::new(OutputKind::Alias, params.clone()).unwrap();
        assert_eq!(query.filters(), "stateController=rms1state&hasNativeTokens=false");

        let err = OutputQuery::new(OutputKind::Foundry, params).unwrap_err();
        assert!(err.to_string().contains("stateController"));

        let twice = vec![QueryParameter::Tag("0x01".into()), QueryParameter::Tag("0x02".into())];
        assert!(OutputQuery::new(OutputKind::Basic, twice).is_err());
    }

    #[test]
    fn query_parameters_on_the_wire() {
        let json = serde_json::json!([{ "address": "rms1qqq" }, { "hasNativeTokens": true }]);
        let params: Vec<QueryParameter> = serde_json::from_value(json).unwrap();
        assert_eq!(params[0], QueryParameter::Address("rms1qqq".into()));
        let query = OutputQuery::new(OutputKind::Nft, params).unwrap();
        assert_eq!(query.cursor(), None);
    }

    #[test]
    fn metadata_inclusion() {
        let json = serde_json::json!({
            "blockId": BlockId([1; 32]).to_string(),
            "parents": [BlockId([2; 32]).to_string()],
            "isSolid": true,
            "referencedByMilestoneIndex": 7,
            "ledgerInclusionState": "noTransaction"
        });
        let metadata: BlockMetadata = serde_json::from_value(json).unwrap();
        assert!(metadata.is_included());
        assert!(!metadata.should_reattach());
    }
}
