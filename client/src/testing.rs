//! In-memory stand-ins for a node and a Ledger device.
//!
//! [`MockNode`] keeps a tiny UTXO ledger. It checks proof of work, rejects
//! double spends and invalid unlocks, and answers indexer queries over its
//! unspent outputs. Blocks stay unreferenced until [`MockNode::include`] or
//! auto-inclusion hands them to a milestone. [`MockLedgerTransport`] answers the IOTA app's APDUs
//! from a mnemonic.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::address::Address;
use crate::block::id::{BlockId, OutputId, TransactionId};
use crate::block::output::{BasicOutputBuilder, Feature, Output, UnlockCondition};
use crate::block::payload::Payload;
use crate::block::pow::Miner;
use crate::block::Block;
use crate::crypto::slip10::{derive_keypair, Bip44};
use crate::error::{Error, Result};
use crate::network_info::ProtocolParameters;
use crate::node_manager::api::{
    BlockMetadata, ChainId, LedgerInclusionState, NodeApi, NodeInfo, NodeStatus, OutputKind,
    OutputMetadata, OutputQuery, OutputResponse, QueryParameter,
};
use crate::node_manager::node::Node;
use crate::secret::ledger::{
    LedgerTransport, INS_GET_APP_CONFIG, INS_GET_PUBLIC_KEY, INS_SIGN, SW_DEVICE_LOCKED, SW_OK,
};
use crate::secret::mnemonic::mnemonic_to_seed;

/// A tip the mock tangle starts from.
pub const GENESIS_TIP: BlockId = BlockId([0xaa; 32]);

#[derive(Default)]
struct Tangle {
    outputs: HashMap<OutputId, OutputResponse>,
    blocks: HashMap<BlockId, Block>,
    tips: Vec<BlockId>,
    milestone: u32,
    referenced: HashMap<BlockId, (u32, LedgerInclusionState)>,
    included_transactions: HashMap<TransactionId, BlockId>,
    stale: HashSet<BlockId>,
    lazy: HashSet<BlockId>,
}

impl Tangle {
    fn reference(&mut self, block_id: BlockId) {
        if self.referenced.contains_key(&block_id) {
            return;
        }
        let Some(block) = self.blocks.get(&block_id) else {
            return;
        };
        let state = match block.payload() {
            Some(Payload::Transaction(transaction)) => {
                let transaction_id = transaction.id();
                if self.included_transactions.contains_key(&transaction_id) {
                    LedgerInclusionState::Conflicting
                } else {
                    self.included_transactions.insert(transaction_id, block_id);
                    LedgerInclusionState::Included
                }
            }
            _ => LedgerInclusionState::NoTransaction,
        };
        self.milestone += 1;
        self.referenced.insert(block_id, (self.milestone, state));
    }
}

pub struct MockNode {
    params: ProtocolParameters,
    remote_pow_delay: Mutex<Option<Duration>>,
    offline: Mutex<HashSet<String>>,
    tangle: Mutex<Tangle>,
    info_calls: AtomicUsize,
    posts: AtomicUsize,
    next_transaction: AtomicU64,
    auto_include: AtomicBool,
}

impl MockNode {
    /// A healthy node of `network_name` with HRP `rms` and a minimum PoW
    /// score low enough to mine in tests.
    pub fn new(network_name: &str) -> Self {
        let mut params = ProtocolParameters::new(network_name, "rms");
        params.min_pow_score = 1;
        Self::with_parameters(params)
    }

    pub fn with_parameters(params: ProtocolParameters) -> Self {
        Self {
            params,
            remote_pow_delay: Mutex::new(None),
            offline: Mutex::new(HashSet::new()),
            tangle: Mutex::new(Tangle {
                tips: vec![GENESIS_TIP],
                ..Tangle::default()
            }),
            info_calls: AtomicUsize::new(0),
            posts: AtomicUsize::new(0),
            next_transaction: AtomicU64::new(1),
            auto_include: AtomicBool::new(false),
        }
    }

    pub fn parameters(&self) -> &ProtocolParameters {
        &self.params
    }

    /// Makes remote proof of work take `delay` before answering.
    pub fn set_remote_pow_delay(&self, delay: Option<Duration>) {
        *self.remote_pow_delay.lock() = delay;
    }

    /// Every call to the node at `url` fails with a network error.
    pub fn set_offline(&self, url: &str, offline: bool) {
        let mut set = self.offline.lock();
        if offline {
            set.insert(url.to_string());
        } else {
            set.remove(url);
        }
    }

    pub fn info_calls(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    /// Blocks accepted by `post_block`, re-posts not counted.
    pub fn posted_blocks(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    /// Adds an unspent output as if a past transaction created it.
    pub fn add_output(&self, output: Output) -> OutputId {
        let n = self.next_transaction.fetch_add(1, Ordering::SeqCst);
        let mut id = [0u8; 32];
        id[..8].copy_from_slice(&n.to_be_bytes());
        id[31] = 0xfe;
        let output_id = OutputId::new(TransactionId(id), 0);
        self.tangle.lock().outputs.insert(
            output_id,
            OutputResponse {
                metadata: OutputMetadata {
                    block_id: GENESIS_TIP,
                    transaction_id: TransactionId(id),
                    output_index: 0,
                    is_spent: false,
                    transaction_id_spent: None,
                },
                output,
            },
        );
        output_id
    }

    /// Adds a basic output of `amount` owned by `address`.
    pub fn fund(&self, address: Address, amount: u64) -> OutputId {
        let output = BasicOutputBuilder::new_with_amount(amount)
            .add_unlock_condition(UnlockCondition::Address { address })
            .finish()
            .map(Output::Basic)
            .unwrap_or_else(|e| panic!("invalid funding output: {e}"));
        self.add_output(output)
    }

    /// References `block_id` in a new milestone. Its parents are left
    /// alone.
    pub fn include(&self, block_id: &BlockId) {
        self.tangle.lock().reference(*block_id);
    }

    /// Every block accepted from now on is referenced right away.
    pub fn set_auto_include(&self, enabled: bool) {
        self.auto_include.store(enabled, Ordering::SeqCst);
    }

    /// The node asks for `block_id` to be reattached.
    pub fn mark_stale(&self, block_id: &BlockId) {
        self.tangle.lock().stale.insert(*block_id);
    }

    /// The node asks for `block_id` to be promoted.
    pub fn mark_lazy(&self, block_id: &BlockId) {
        self.tangle.lock().lazy.insert(*block_id);
    }

    pub fn is_included(&self, block_id: &BlockId) -> bool {
        self.tangle.lock().referenced.contains_key(block_id)
    }

    pub fn block(&self, block_id: &BlockId) -> Option<Block> {
        self.tangle.lock().blocks.get(block_id).cloned()
    }

    pub fn output(&self, output_id: &OutputId) -> Option<OutputResponse> {
        self.tangle.lock().outputs.get(output_id).cloned()
    }

    pub fn is_spent(&self, output_id: &OutputId) -> bool {
        self.output(output_id).is_some_and(|o| o.metadata.is_spent)
    }

    /// Unspent base-token balance of `address`.
    pub fn balance(&self, address: &Address) -> u64 {
        self.tangle
            .lock()
            .outputs
            .values()
            .filter(|o| !o.metadata.is_spent && o.output.required_address() == *address)
            .map(|o| o.output.amount())
            .sum()
    }

    fn check_online(&self, node: &Node) -> Result<()> {
        if self.offline.lock().contains(&node.url) {
            return Err(Error::Network(format!("could not connect to {}", node.url)));
        }
        Ok(())
    }

    fn not_found(node: &Node, what: String) -> Error {
        Error::Response {
            code: 404,
            text: format!("{what} not found"),
            url: node.url.clone(),
        }
    }

    /// Applies a block to the ledger. Re-posting a known block is a no-op,
    /// and a reattached transaction is not applied twice.
    fn accept(&self, block: Block) -> Result<BlockId> {
        if !block.has_valid_pow(self.params.min_pow_score) {
            return Err(Error::PostRejected("insufficient proof of work".into()));
        }
        let block_id = block.id();
        let mut tangle = self.tangle.lock();
        if tangle.blocks.contains_key(&block_id) {
            return Ok(block_id);
        }

        if let Some(Payload::Transaction(transaction)) = block.payload() {
            let essence = transaction.essence();
            if essence.network_id() != self.params.network_id() {
                return Err(Error::PostRejected("wrong network id".into()));
            }
            let transaction_id = transaction.id();
            let reattached = essence.inputs().iter().all(|input| {
                tangle.outputs.get(&input.output_id()).is_some_and(|o| {
                    o.metadata.transaction_id_spent == Some(transaction_id)
                })
            });
            let mut consumed = Vec::with_capacity(essence.inputs().len());
            for input in essence.inputs().iter().filter(|_| !reattached) {
                let output_id = input.output_id();
                let Some(existing) = tangle.outputs.get(&output_id) else {
                    return Err(Error::PostRejected(format!("input {output_id} not found")));
                };
                if existing.metadata.is_spent {
                    return Err(Error::PostRejected(format!(
                        "input {output_id} is already spent"
                    )));
                }
                consumed.push(existing.output.clone());
            }
            if !reattached {
                transaction
                    .verify_against(&consumed)
                    .map_err(|e| Error::PostRejected(e.to_string()))?;
            }

            for input in essence.inputs().iter().filter(|_| !reattached) {
                if let Some(spent) = tangle.outputs.get_mut(&input.output_id()) {
                    spent.metadata.is_spent = true;
                    spent.metadata.transaction_id_spent = Some(transaction_id);
                }
            }
            for (index, output) in essence.outputs().iter().enumerate().filter(|_| !reattached) {
                let output_index = index as u16;
                tangle.outputs.insert(
                    OutputId::new(transaction_id, output_index),
                    OutputResponse {
                        metadata: OutputMetadata {
                            block_id,
                            transaction_id,
                            output_index,
                            is_spent: false,
                            transaction_id_spent: None,
                        },
                        output: output.clone(),
                    },
                );
            }
        }

        tangle.blocks.insert(block_id, block);
        tangle.tips = vec![block_id];
        if self.auto_include.load(Ordering::SeqCst) {
            tangle.reference(block_id);
        }
        self.posts.fetch_add(1, Ordering::SeqCst);
        Ok(block_id)
    }

    fn metadata(tangle: &Tangle, block_id: &BlockId, block: &Block) -> BlockMetadata {
        let referenced = tangle.referenced.get(block_id).copied();
        let pending = |set: &HashSet<BlockId>| match referenced {
            Some(_) => None,
            None => Some(set.contains(block_id)),
        };
        BlockMetadata {
            block_id: *block_id,
            parents: block.parents().iter().copied().collect(),
            is_solid: true,
            referenced_by_milestone_index: referenced.map(|(index, _)| index),
            milestone_index: None,
            ledger_inclusion_state: referenced.map(|(_, state)| state),
            conflict_reason: match referenced {
                Some((_, LedgerInclusionState::Conflicting)) => Some(1),
                _ => None,
            },
            should_promote: pending(&tangle.lazy),
            should_reattach: pending(&tangle.stale),
        }
    }
}

fn bech32(value: &str) -> Result<Address> {
    Ok(Address::try_from_bech32(value)?.1)
}

fn has_feature_address(output: &Output, kind: u8, address: &Address, immutable: bool) -> bool {
    let features = if immutable {
        output.immutable_features()
    } else {
        Some(output.features())
    };
    features
        .and_then(|f| f.get(kind))
        .is_some_and(|feature| match feature {
            Feature::Sender { address: a } | Feature::Issuer { address: a } => a == address,
            _ => false,
        })
}

/// Whether `output` passes one indexer filter.
fn passes(output: &Output, parameter: &QueryParameter) -> Result<bool> {
    let conditions = output.unlock_conditions();
    Ok(match parameter {
        QueryParameter::Address(a) => {
            let address = bech32(a)?;
            conditions.is_plain_address() && conditions.address() == Some(&address)
        }
        QueryParameter::AliasAddress(a) => {
            let address = bech32(a)?;
            conditions
                .immutable_alias_address()
                .is_some_and(|alias| Address::Alias(*alias) == address)
        }
        QueryParameter::StateController(a) => {
            conditions.state_controller_address() == Some(&bech32(a)?)
        }
        QueryParameter::Governor(a) => {
            let address = bech32(a)?;
            matches!(
                conditions.get(UnlockCondition::GOVERNOR_ADDRESS),
                Some(UnlockCondition::GovernorAddress { address: g }) if *g == address
            )
        }
        QueryParameter::Issuer(a) => has_feature_address(output, Feature::ISSUER, &bech32(a)?, true),
        QueryParameter::Sender(a) => has_feature_address(output, Feature::SENDER, &bech32(a)?, false),
        QueryParameter::Tag(t) => {
            let wanted = crate::utils::decode_hex(t)?;
            matches!(output.features().get(Feature::TAG), Some(Feature::Tag { tag }) if *tag == wanted)
        }
        QueryParameter::HasNativeTokens(flag) => output.native_tokens().is_empty() != *flag,
        QueryParameter::Cursor(_) => true,
    })
}

fn kind_of(output: &Output) -> OutputKind {
    match output {
        Output::Basic(_) => OutputKind::Basic,
        Output::Alias(_) => OutputKind::Alias,
        Output::Nft(_) => OutputKind::Nft,
        Output::Foundry(_) => OutputKind::Foundry,
    }
}

#[async_trait]
impl NodeApi for MockNode {
    async fn get_health(&self, node: &Node, _timeout: Duration) -> Result<bool> {
        self.check_online(node)?;
        Ok(true)
    }

    async fn get_info(&self, node: &Node, _timeout: Duration) -> Result<NodeInfo> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        self.check_online(node)?;
        Ok(NodeInfo {
            name: "mock".into(),
            version: "0.0.0".into(),
            status: NodeStatus {
                is_healthy: true,
                latest_milestone_index: Some(1),
            },
            protocol: self.params.clone(),
            features: vec!["pow".into()],
        })
    }

    async fn get_tips(&self, node: &Node, _timeout: Duration) -> Result<Vec<BlockId>> {
        self.check_online(node)?;
        Ok(self.tangle.lock().tips.clone())
    }

    async fn post_block(&self, node: &Node, block: &Block, _timeout: Duration) -> Result<BlockId> {
        self.check_online(node)?;
        self.accept(block.clone())
    }

    async fn post_block_remote_pow(
        &self,
        node: &Node,
        block: &Block,
        _timeout: Duration,
    ) -> Result<BlockId> {
        self.check_online(node)?;
        let delay = *self.remote_pow_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let nonce = Miner::new(1)
            .mine(&block.bytes_without_nonce(), self.params.min_pow_score)
            .ok_or_else(|| Error::Network("remote proof of work failed".into()))?;
        self.accept(block.clone().with_nonce(nonce))
    }

    async fn get_block(&self, node: &Node, block_id: &BlockId, _timeout: Duration) -> Result<Block> {
        self.check_online(node)?;
        self.tangle
            .lock()
            .blocks
            .get(block_id)
            .cloned()
            .ok_or_else(|| Self::not_found(node, format!("block {block_id}")))
    }

    async fn get_block_metadata(
        &self,
        node: &Node,
        block_id: &BlockId,
        _timeout: Duration,
    ) -> Result<BlockMetadata> {
        self.check_online(node)?;
        let tangle = self.tangle.lock();
        let block = tangle
            .blocks
            .get(block_id)
            .ok_or_else(|| Self::not_found(node, format!("block {block_id}")))?;
        Ok(Self::metadata(&tangle, block_id, block))
    }

    async fn get_included_block(
        &self,
        node: &Node,
        transaction_id: &TransactionId,
        _timeout: Duration,
    ) -> Result<Block> {
        self.check_online(node)?;
        let tangle = self.tangle.lock();
        tangle
            .included_transactions
            .get(transaction_id)
            .and_then(|block_id| tangle.blocks.get(block_id))
            .cloned()
            .ok_or_else(|| Self::not_found(node, format!("included block of {transaction_id}")))
    }

    async fn get_output(
        &self,
        node: &Node,
        output_id: &OutputId,
        _timeout: Duration,
    ) -> Result<OutputResponse> {
        self.check_online(node)?;
        self.output(output_id)
            .ok_or_else(|| Self::not_found(node, format!("output {output_id}")))
    }

    async fn output_ids(
        &self,
        node: &Node,
        query: &OutputQuery,
        _timeout: Duration,
    ) -> Result<Vec<OutputId>> {
        self.check_online(node)?;
        let tangle = self.tangle.lock();
        let mut ids = Vec::new();
        for (id, response) in &tangle.outputs {
            if response.metadata.is_spent || kind_of(&response.output) != query.kind() {
                continue;
            }
            let mut keep = true;
            for parameter in query.parameters() {
                keep &= passes(&response.output, parameter)?;
            }
            if keep {
                ids.push(*id);
            }
        }
        ids.sort_by_key(|id| id.to_bytes());
        Ok(ids)
    }

    async fn chain_output_id(&self, node: &Node, chain: &ChainId, _timeout: Duration) -> Result<OutputId> {
        self.check_online(node)?;
        let tangle = self.tangle.lock();
        tangle
            .outputs
            .iter()
            .find(|(id, response)| {
                !response.metadata.is_spent
                    && match (chain, &response.output) {
                        (ChainId::Alias(alias_id), Output::Alias(o)) => {
                            o.alias_id().or_from_output_id(id) == *alias_id
                        }
                        (ChainId::Nft(nft_id), Output::Nft(o)) => o.nft_id().or_from_output_id(id) == *nft_id,
                        (ChainId::Foundry(foundry_id), Output::Foundry(o)) => o.id() == *foundry_id,
                        _ => false,
                    }
            })
            .map(|(id, _)| *id)
            .ok_or_else(|| Self::not_found(node, format!("output of {chain}")))
    }
}

/// A Ledger running the IOTA app, keyed by a mnemonic.
pub struct MockLedgerTransport {
    id: String,
    seed: Vec<u8>,
    delay: Duration,
    locked: AtomicBool,
    exchanges: AtomicUsize,
}

impl MockLedgerTransport {
    pub fn new(mnemonic: &str) -> Result<Self> {
        Ok(Self {
            id: "mock-ledger".into(),
            seed: mnemonic_to_seed(mnemonic)?.to_vec(),
            delay: Duration::ZERO,
            locked: AtomicBool::new(false),
            exchanges: AtomicUsize::new(0),
        })
    }

    /// Every exchange takes `delay`, like a user confirming on the device.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    pub fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    fn chain(path: &[u8]) -> Option<Bip44> {
        if path.len() != 20 {
            return None;
        }
        let segment = |i: usize| {
            let bytes = [path[4 * i], path[4 * i + 1], path[4 * i + 2], path[4 * i + 3]];
            u32::from_be_bytes(bytes) & !(1 << 31)
        };
        Some(
            Bip44::new(segment(1))
                .with_account(segment(2))
                .with_change(segment(3) != 0)
                .with_address_index(segment(4)),
        )
    }

    fn respond(&self, ins: u8, data: &[u8]) -> Vec<u8> {
        const SW_BAD_REQUEST: u16 = 0x6a80;
        let body = match ins {
            INS_GET_APP_CONFIG => {
                let mut config = vec![1, 0, 0, 0x02];
                config.extend_from_slice(b"IOTA");
                Some(config)
            }
            INS_GET_PUBLIC_KEY => Self::chain(data)
                .and_then(|chain| derive_keypair(&self.seed, &chain).ok())
                .map(|keypair| keypair.public_key().0.to_vec()),
            INS_SIGN if data.len() == 52 => Self::chain(&data[..20])
                .and_then(|chain| derive_keypair(&self.seed, &chain).ok())
                .map(|keypair| keypair.sign(&data[20..]).0.to_vec()),
            _ => None,
        };
        match body {
            Some(mut body) => {
                body.extend_from_slice(&SW_OK.to_be_bytes());
                body
            }
            None => SW_BAD_REQUEST.to_be_bytes().to_vec(),
        }
    }
}

#[async_trait]
impl LedgerTransport for MockLedgerTransport {
    fn device_id(&self) -> String {
        self.id.clone()
    }

    async fn exchange(&self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.locked.load(Ordering::SeqCst) {
            return Ok(SW_DEVICE_LOCKED.to_be_bytes().to_vec());
        }
        if apdu.len() < 5 {
            return Err(Error::DeviceUnavailable("short apdu".into()));
        }
        Ok(self.respond(apdu[1], &apdu[5..]))
    }
}
