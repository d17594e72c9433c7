//! Records that travel between the stages of the transaction pipeline and
//! across the binding boundary.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::block::id::{BlockId, OutputId};
use crate::block::output::Output;
use crate::block::payload::{TransactionEssence, UtxoInput};
use crate::config::{ADDRESS_GAP_RANGE, SHIMMER_COIN_TYPE};
use crate::crypto::slip10::Bip44;
use crate::node_manager::api::{OutputMetadata, OutputResponse};

/// An output about to be consumed, with what a secret manager needs to
/// unlock it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSigningData {
    pub output: Output,
    pub output_metadata: OutputMetadata,
    /// Derivation path of the owning key. `None` for inputs owned by an
    /// alias or NFT.
    #[serde(default)]
    pub chain: Option<Bip44>,
}

impl InputSigningData {
    pub fn from_response(response: OutputResponse, chain: Option<Bip44>) -> Self {
        Self {
            output: response.output,
            output_metadata: response.metadata,
            chain,
        }
    }

    pub fn output_id(&self) -> OutputId {
        self.output_metadata.output_id()
    }
}

/// The change output of a transaction and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemainderData {
    pub output: Output,
    #[serde(default)]
    pub chain: Option<Bip44>,
    pub address: Address,
}

/// An essence ready to be signed. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransactionData {
    pub essence: TransactionEssence,
    pub inputs_data: Vec<InputSigningData>,
    #[serde(default)]
    pub remainder: Option<RemainderData>,
}

impl PreparedTransactionData {
    /// Consumed outputs in input order.
    pub fn consumed_outputs(&self) -> Vec<Output> {
        self.inputs_data.iter().map(|i| i.output.clone()).collect()
    }
}

/// What to put in a block and, for transactions, where the funds come
/// from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockOptions {
    pub coin_type: u32,
    pub account_index: u32,
    /// First address index searched for inputs.
    pub initial_address_index: u32,
    /// Address indexes searched for inputs. Defaults to
    /// `initial_address_index` plus the gap range.
    pub input_range: Option<Range<u32>>,
    /// Spend exactly these outputs instead of searching.
    pub inputs: Option<Vec<UtxoInput>>,
    pub outputs: Vec<Output>,
    /// Where change goes. Defaults to the address of the first input.
    pub custom_remainder_address: Option<Address>,
    /// Hex tag of a tagged-data payload.
    pub tag: Option<String>,
    /// Hex data of a tagged-data payload.
    pub data: Option<String>,
    /// Use these parents instead of asking for tips.
    pub parents: Option<Vec<BlockId>>,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            coin_type: SHIMMER_COIN_TYPE,
            account_index: 0,
            initial_address_index: 0,
            input_range: None,
            inputs: None,
            outputs: Vec::new(),
            custom_remainder_address: None,
            tag: None,
            data: None,
            parents: None,
        }
    }
}

impl BlockOptions {
    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = Output>) -> Self {
        self.outputs = outputs.into_iter().collect();
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = UtxoInput>) -> Self {
        self.inputs = Some(inputs.into_iter().collect());
        self
    }

    pub fn with_account_index(mut self, account_index: u32) -> Self {
        self.account_index = account_index;
        self
    }

    pub fn with_coin_type(mut self, coin_type: u32) -> Self {
        self.coin_type = coin_type;
        self
    }

    pub fn with_input_range(mut self, range: Range<u32>) -> Self {
        self.input_range = Some(range);
        self
    }

    pub fn with_remainder_address(mut self, address: Address) -> Self {
        self.custom_remainder_address = Some(address);
        self
    }

    pub fn with_tag(mut self, tag: &[u8]) -> Self {
        self.tag = Some(crate::utils::encode_hex(tag));
        self
    }

    pub fn with_data(mut self, data: &[u8]) -> Self {
        self.data = Some(crate::utils::encode_hex(data));
        self
    }

    pub fn with_parents(mut self, parents: Vec<BlockId>) -> Self {
        self.parents = Some(parents);
        self
    }

    pub(crate) fn address_range(&self) -> Range<u32> {
        self.input_range.clone().unwrap_or_else(|| {
            self.initial_address_index
                ..self.initial_address_index.saturating_add(ADDRESS_GAP_RANGE)
        })
    }
}
