//! # Commands
//!
//! Every request a binding can send, as `{"name": ..., "data": {...}}`.
//! Field names inside `data` are camelCase; commands without parameters
//! omit `data`.
//!
//! ```json
//! { "name": "GenerateAddresses",
//!   "data": { "secretManager": { "Mnemonic": "..." },
//!             "options": { "accountIndex": 0, "range": { "start": 0, "end": 2 } } } }
//! ```
//!
//! The name is checked against [`Command::NAMES`] before `data` is looked
//! at, so a typo in the name is always an `UnknownCommandError`, never a
//! complaint about parameters.

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use iota_client::api::{BlockOptions, PreparedTransactionData};
use iota_client::block::id::{AliasId, BlockId, FoundryId, NftId, OutputId, TransactionId};
use iota_client::block::output::{
    AliasOutputBuilder, BasicOutputBuilder, FoundryOutputBuilder, NftOutputBuilder,
};
use iota_client::block::payload::Payload;
use iota_client::block::Block;
use iota_client::node_manager::api::QueryParameter;
use iota_client::node_manager::node::NodeAuth;
use iota_client::secret::{GenerateAddressesOptions, SecretManagerDto};
use iota_client::{Error, Result};

/// A request envelope as it crosses the binding boundary.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    #[serde(alias = "cmd", alias = "command")]
    pub name: String,
    #[serde(default, alias = "payload")]
    pub data: Option<Value>,
}

/// A parsed command.
#[derive(Clone, Deserialize)]
#[serde(tag = "name", content = "data")]
pub enum Command {
    // -- Output builders ---------------------------------------------------
    BuildAliasOutput(AliasOutputBuilder),
    BuildBasicOutput(BasicOutputBuilder),
    BuildFoundryOutput(FoundryOutputBuilder),
    BuildNftOutput(NftOutputBuilder),

    // -- Addresses and secret managers -------------------------------------
    #[serde(rename_all = "camelCase")]
    GenerateAddresses {
        secret_manager: SecretManagerDto,
        #[serde(default)]
        options: GenerateAddressesOptions,
    },
    #[serde(rename_all = "camelCase")]
    GetLedgerNanoStatus { is_simulator: bool },
    #[serde(rename_all = "camelCase")]
    StoreMnemonic {
        secret_manager: SecretManagerDto,
        mnemonic: String,
    },
    GenerateMnemonic,
    MnemonicToHexSeed { mnemonic: String },

    // -- Blocks and transactions -------------------------------------------
    #[serde(rename_all = "camelCase")]
    BuildAndPostBlock {
        #[serde(default)]
        secret_manager: Option<SecretManagerDto>,
        #[serde(default)]
        options: Option<BlockOptions>,
    },
    #[serde(rename_all = "camelCase")]
    PrepareTransaction {
        secret_manager: SecretManagerDto,
        #[serde(default)]
        options: Option<BlockOptions>,
    },
    #[serde(rename_all = "camelCase")]
    SignTransaction {
        secret_manager: SecretManagerDto,
        prepared_transaction_data: PreparedTransactionData,
    },
    SubmitPayload {
        #[serde(alias = "payloadDto")]
        payload: Payload,
    },
    FindInputs { addresses: Vec<String>, amount: u64 },

    // -- Node pool and network info ----------------------------------------
    GetNode,
    UnsyncedNodes,
    GetNetworkInfo,
    GetNetworkId,
    GetBech32Hrp,
    GetMinPowScore,
    GetTipsInterval,
    GetLocalPow,
    GetFallbackToLocalPow,

    // -- Node API ----------------------------------------------------------
    GetInfo,
    GetNodeInfo {
        url: String,
        #[serde(default)]
        auth: Option<NodeAuth>,
    },
    GetHealth { url: String },
    GetTips,
    PostBlock { block: Block },
    #[serde(rename_all = "camelCase")]
    GetBlock { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    GetBlockMetadata { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    GetIncludedBlock { transaction_id: TransactionId },
    #[serde(rename_all = "camelCase")]
    GetOutput { output_id: OutputId },
    #[serde(rename_all = "camelCase")]
    GetOutputs { output_ids: Vec<OutputId> },
    #[serde(rename_all = "camelCase")]
    TryGetOutputs { output_ids: Vec<OutputId> },

    // -- Indexer -----------------------------------------------------------
    #[serde(rename_all = "camelCase")]
    BasicOutputIds {
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        query_parameters: Vec<QueryParameter>,
    },
    #[serde(rename_all = "camelCase")]
    AliasOutputIds { query_parameters: Vec<QueryParameter> },
    #[serde(rename_all = "camelCase")]
    AliasOutputId { alias_id: AliasId },
    #[serde(rename_all = "camelCase")]
    NftOutputIds { query_parameters: Vec<QueryParameter> },
    #[serde(rename_all = "camelCase")]
    NftOutputId { nft_id: NftId },
    #[serde(rename_all = "camelCase")]
    FoundryOutputIds { query_parameters: Vec<QueryParameter> },
    #[serde(rename_all = "camelCase")]
    FoundryOutputId { foundry_id: FoundryId },

    // -- Retry, promote, reattach ------------------------------------------
    #[serde(rename_all = "camelCase")]
    Retry { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    RetryUntilIncluded {
        block_id: BlockId,
        #[serde(default)]
        interval: Option<u64>,
        #[serde(default)]
        max_attempts: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Reattach { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    ReattachUnchecked { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    Promote { block_id: BlockId },
    #[serde(rename_all = "camelCase")]
    PromoteUnchecked { block_id: BlockId },

    // -- Utilities ---------------------------------------------------------
    Bech32ToHex { bech32: String },
    #[serde(rename_all = "camelCase")]
    HexToBech32 {
        hex: String,
        #[serde(default)]
        bech32_hrp: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    HexPublicKeyToBech32Address {
        hex: String,
        #[serde(default)]
        bech32_hrp: Option<String>,
    },
    ParseBech32Address { address: String },
    IsAddressValid { address: String },
    BlockId { block: Block },
}

impl Command {
    /// Every command name the dispatcher accepts.
    pub const NAMES: &'static [&'static str] = &[
        "BuildAliasOutput",
        "BuildBasicOutput",
        "BuildFoundryOutput",
        "BuildNftOutput",
        "GenerateAddresses",
        "GetLedgerNanoStatus",
        "StoreMnemonic",
        "GenerateMnemonic",
        "MnemonicToHexSeed",
        "BuildAndPostBlock",
        "PrepareTransaction",
        "SignTransaction",
        "SubmitPayload",
        "FindInputs",
        "GetNode",
        "UnsyncedNodes",
        "GetNetworkInfo",
        "GetNetworkId",
        "GetBech32Hrp",
        "GetMinPowScore",
        "GetTipsInterval",
        "GetLocalPow",
        "GetFallbackToLocalPow",
        "GetInfo",
        "GetNodeInfo",
        "GetHealth",
        "GetTips",
        "PostBlock",
        "GetBlock",
        "GetBlockMetadata",
        "GetIncludedBlock",
        "GetOutput",
        "GetOutputs",
        "TryGetOutputs",
        "BasicOutputIds",
        "AliasOutputIds",
        "AliasOutputId",
        "NftOutputIds",
        "NftOutputId",
        "FoundryOutputIds",
        "FoundryOutputId",
        "Retry",
        "RetryUntilIncluded",
        "Reattach",
        "ReattachUnchecked",
        "Promote",
        "PromoteUnchecked",
        "Bech32ToHex",
        "HexToBech32",
        "HexPublicKeyToBech32Address",
        "ParseBech32Address",
        "IsAddressValid",
        "BlockId",
    ];

    /// The canonical spelling of `name`, if it is a known command.
    pub fn lookup(name: &str) -> Option<&'static str> {
        Self::NAMES.iter().copied().find(|known| *known == name)
    }

    /// Parses `data` for the command `name`.
    ///
    /// Unknown names fail with [`Error::UnknownCommand`] without touching
    /// `data`. Malformed `data` fails with [`Error::Validation`]; the message
    /// names the problem but never echoes the offending value, which may be
    /// a secret.
    pub fn parse(name: &str, data: Option<Value>) -> Result<Self> {
        let name = Self::lookup(name).ok_or_else(|| Error::UnknownCommand(name.to_string()))?;

        let data = match data {
            // Bindings send `None` arguments as null; treat them as absent.
            Some(Value::Object(fields)) => Some(Value::Object(
                fields.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            )),
            Some(Value::Null) => None,
            other => other,
        };
        let empty = data
            .as_ref()
            .map_or(true, |d| d.as_object().is_some_and(|o| o.is_empty()));

        let parsed = Self::from_envelope(name, data);
        match parsed {
            // No parameters fits both unit commands and commands whose
            // fields are all optional.
            Err(_) if empty => Self::from_envelope(name, None)
                .or_else(|_| Self::from_envelope(name, Some(Value::Object(Default::default())))),
            other => other,
        }
        .map_err(|e| Error::Validation(format!("invalid data for {name}: {}", redact(&e))))
    }

    fn from_envelope(name: &str, data: Option<Value>) -> serde_json::Result<Self> {
        let mut envelope = serde_json::Map::new();
        envelope.insert("name".into(), Value::String(name.into()));
        if let Some(data) = data {
            envelope.insert("data".into(), data);
        }
        serde_json::from_value(Value::Object(envelope))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::BuildAliasOutput(_) => "BuildAliasOutput",
            Command::BuildBasicOutput(_) => "BuildBasicOutput",
            Command::BuildFoundryOutput(_) => "BuildFoundryOutput",
            Command::BuildNftOutput(_) => "BuildNftOutput",
            Command::GenerateAddresses { .. } => "GenerateAddresses",
            Command::GetLedgerNanoStatus { .. } => "GetLedgerNanoStatus",
            Command::StoreMnemonic { .. } => "StoreMnemonic",
            Command::GenerateMnemonic => "GenerateMnemonic",
            Command::MnemonicToHexSeed { .. } => "MnemonicToHexSeed",
            Command::BuildAndPostBlock { .. } => "BuildAndPostBlock",
            Command::PrepareTransaction { .. } => "PrepareTransaction",
            Command::SignTransaction { .. } => "SignTransaction",
            Command::SubmitPayload { .. } => "SubmitPayload",
            Command::FindInputs { .. } => "FindInputs",
            Command::GetNode => "GetNode",
            Command::UnsyncedNodes => "UnsyncedNodes",
            Command::GetNetworkInfo => "GetNetworkInfo",
            Command::GetNetworkId => "GetNetworkId",
            Command::GetBech32Hrp => "GetBech32Hrp",
            Command::GetMinPowScore => "GetMinPowScore",
            Command::GetTipsInterval => "GetTipsInterval",
            Command::GetLocalPow => "GetLocalPow",
            Command::GetFallbackToLocalPow => "GetFallbackToLocalPow",
            Command::GetInfo => "GetInfo",
            Command::GetNodeInfo { .. } => "GetNodeInfo",
            Command::GetHealth { .. } => "GetHealth",
            Command::GetTips => "GetTips",
            Command::PostBlock { .. } => "PostBlock",
            Command::GetBlock { .. } => "GetBlock",
            Command::GetBlockMetadata { .. } => "GetBlockMetadata",
            Command::GetIncludedBlock { .. } => "GetIncludedBlock",
            Command::GetOutput { .. } => "GetOutput",
            Command::GetOutputs { .. } => "GetOutputs",
            Command::TryGetOutputs { .. } => "TryGetOutputs",
            Command::BasicOutputIds { .. } => "BasicOutputIds",
            Command::AliasOutputIds { .. } => "AliasOutputIds",
            Command::AliasOutputId { .. } => "AliasOutputId",
            Command::NftOutputIds { .. } => "NftOutputIds",
            Command::NftOutputId { .. } => "NftOutputId",
            Command::FoundryOutputIds { .. } => "FoundryOutputIds",
            Command::FoundryOutputId { .. } => "FoundryOutputId",
            Command::Retry { .. } => "Retry",
            Command::RetryUntilIncluded { .. } => "RetryUntilIncluded",
            Command::Reattach { .. } => "Reattach",
            Command::ReattachUnchecked { .. } => "ReattachUnchecked",
            Command::Promote { .. } => "Promote",
            Command::PromoteUnchecked { .. } => "PromoteUnchecked",
            Command::Bech32ToHex { .. } => "Bech32ToHex",
            Command::HexToBech32 { .. } => "HexToBech32",
            Command::HexPublicKeyToBech32Address { .. } => "HexPublicKeyToBech32Address",
            Command::ParseBech32Address { .. } => "ParseBech32Address",
            Command::IsAddressValid { .. } => "IsAddressValid",
            Command::BlockId { .. } => "BlockId",
        }
    }
}

// Commands carry mnemonics and seeds.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Command({})", self.name())
    }
}

/// A serde error without the value that caused it: `invalid type: string
/// "abandon ...", expected u32` becomes `invalid type: string`. serde quotes
/// values with `"` and names with backticks, and either may come from the
/// caller. Only missing-field names, which come from the command schema, are
/// kept.
pub(crate) fn redact(err: &serde_json::Error) -> String {
    let message = err.to_string();
    const MISSING: &str = "missing field `";
    if let Some(field) = message.strip_prefix(MISSING) {
        if let Some(end) = field.find('`') {
            return format!("{MISSING}{}`", &field[..end]);
        }
    }
    match message.find(['"', '`']) {
        Some(cut) => message[..cut].trim_end().to_string(),
        None => message,
    }
}
