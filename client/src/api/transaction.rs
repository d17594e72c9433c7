//! # Transaction Pipeline
//!
//! A transfer goes through three steps, each with its own output:
//!
//! ```text
//! Unprepared ──prepare──► Prepared ──sign──► Signed ──post──► Posted
//!                    PreparedTransactionData   TransactionPayload   BlockId
//! ```
//!
//! [`TransactionPipeline`] enforces the order. Calling a step out of order
//! fails with [`Error::InvalidStage`] and changes nothing; a step that fails
//! leaves the pipeline where it was, so it can be retried. Posting twice
//! returns the first block id without touching the network.
//!
//! The steps are also available one by one on [`Client`] for callers that
//! move prepared data across a process boundary (e.g. to sign offline).

use std::collections::HashMap;

use tracing::{debug, info};

use super::input_selection::{consume_all, select_inputs};
use super::types::{BlockOptions, InputSigningData, PreparedTransactionData};
use crate::address::Address;
use crate::block::id::BlockId;
use crate::block::payload::{
    inputs_commitment, Input, TaggedDataPayload, TransactionEssence, TransactionPayload, UtxoInput,
};
use crate::block::Block;
use crate::client::Client;
use crate::crypto::slip10::Bip44;
use crate::error::{Error, Result};
use crate::network_info::NetworkInfo;
use crate::secret::{GenerateAddressesOptions, SecretManager};
use crate::utils::decode_hex;

/// The tagged-data payload described by `tag`/`data`, if either is set.
pub(crate) fn tagged_data(options: &BlockOptions) -> Result<Option<TaggedDataPayload>> {
    if options.tag.is_none() && options.data.is_none() {
        return Ok(None);
    }
    let tag = options.tag.as_deref().map(decode_hex).transpose()?.unwrap_or_default();
    let data = options.data.as_deref().map(decode_hex).transpose()?.unwrap_or_default();
    Ok(Some(TaggedDataPayload::new(tag, data)?))
}

impl Client {
    /// Addresses of `options`' account over its input range, public and
    /// internal, each with its derivation path.
    async fn owned_addresses(
        &self,
        secret_manager: &SecretManager,
        options: &BlockOptions,
    ) -> Result<HashMap<Address, Bip44>> {
        let mut owned = HashMap::new();
        for internal in [false, true] {
            let generate = GenerateAddressesOptions::default()
                .with_coin_type(options.coin_type)
                .with_account_index(options.account_index)
                .with_range(options.address_range())
                .with_internal(internal);
            let addresses = secret_manager.generate_ed25519_addresses(&generate).await?;
            for (address, index) in addresses.into_iter().zip(options.address_range()) {
                let chain = Bip44::new(options.coin_type)
                    .with_account(options.account_index)
                    .with_change(internal)
                    .with_address_index(index);
                owned.insert(Address::Ed25519(address), chain);
            }
        }
        Ok(owned)
    }

    /// Unspent basic outputs held only by the account's addresses.
    async fn discover_inputs(
        &self,
        owned: &HashMap<Address, Bip44>,
        bech32_hrp: &str,
    ) -> Result<Vec<InputSigningData>> {
        let mut found = Vec::new();
        for (address, chain) in owned {
            let ids = self.basic_output_ids(&address.to_bech32(bech32_hrp)?).await?;
            if ids.is_empty() {
                continue;
            }
            for response in self.get_outputs(&ids).await? {
                let spendable = !response.metadata.is_spent
                    && response
                        .output
                        .as_basic()
                        .is_some_and(|b| b.unlock_conditions().is_plain_address())
                    && response.output.required_address() == *address;
                if spendable {
                    found.push(InputSigningData::from_response(response, Some(*chain)));
                }
            }
        }
        debug!(candidates = found.len(), "inputs discovered");
        Ok(found)
    }

    /// Fetches caller-named inputs and attaches the derivation path of
    /// owners the account controls.
    async fn named_inputs(
        &self,
        owned: &HashMap<Address, Bip44>,
        inputs: &[UtxoInput],
    ) -> Result<Vec<InputSigningData>> {
        let ids: Vec<_> = inputs.iter().map(|i| i.output_id()).collect();
        self.get_outputs(&ids)
            .await?
            .into_iter()
            .map(|response| {
                if response.metadata.is_spent {
                    return Err(Error::InvalidOutput(format!(
                        "input {} is already spent",
                        response.metadata.output_id()
                    )));
                }
                let chain = owned.get(&response.output.required_address()).copied();
                Ok(InputSigningData::from_response(response, chain))
            })
            .collect()
    }

    /// Chooses inputs, adds change and builds the essence to sign.
    pub async fn prepare_transaction(
        &self,
        secret_manager: &SecretManager,
        options: &BlockOptions,
    ) -> Result<PreparedTransactionData> {
        if options.outputs.is_empty() {
            return Err(Error::InvalidOutput("a transaction needs at least one output".into()));
        }
        let info = self.get_network_info().await?;
        check_outputs(options, &info)?;

        let _device = self.lock_device(secret_manager)?;
        let owned = self.owned_addresses(secret_manager, options).await?;
        let selection = match &options.inputs {
            Some(inputs) => consume_all(
                self.named_inputs(&owned, inputs).await?,
                &options.outputs,
                options.custom_remainder_address,
                &info.rent_structure,
            )?,
            None => select_inputs(
                self.discover_inputs(&owned, &info.bech32_hrp).await?,
                &options.outputs,
                options.custom_remainder_address,
                &info.rent_structure,
            )?,
        };

        let mut outputs = options.outputs.clone();
        if let Some(remainder) = &selection.remainder {
            outputs.push(remainder.output.clone());
        }
        let essence = TransactionEssence::new(
            info.network_id,
            selection
                .inputs
                .iter()
                .map(|i| Input::Utxo(i.output_id().into()))
                .collect(),
            inputs_commitment(selection.inputs.iter().map(|i| &i.output)),
            outputs,
            tagged_data(options)?,
        )?;
        info!(
            inputs = essence.inputs().len(),
            outputs = essence.outputs().len(),
            remainder = selection.remainder.is_some(),
            "transaction prepared"
        );
        Ok(PreparedTransactionData {
            essence,
            inputs_data: selection.inputs,
            remainder: selection.remainder,
        })
    }

    /// Signs prepared data, holding the device lock for hardware wallets.
    pub async fn sign_transaction(
        &self,
        secret_manager: &SecretManager,
        prepared: &PreparedTransactionData,
    ) -> Result<TransactionPayload> {
        let _device = self.lock_device(secret_manager)?;
        let payload = secret_manager.sign_transaction(prepared).await?;
        payload.verify_against(&prepared.consumed_outputs())?;
        Ok(payload)
    }

    /// Wraps a signed transaction in a block and posts it.
    pub async fn post_transaction(
        &self,
        payload: TransactionPayload,
        parents: Option<Vec<BlockId>>,
    ) -> Result<(BlockId, Block)> {
        self.finish_block(Some(payload.into()), parents).await
    }

    /// Unspent basic outputs of `addresses` covering `amount`, largest
    /// first. Meant for building a transaction offline.
    pub async fn find_inputs(&self, addresses: &[String], amount: u64) -> Result<Vec<UtxoInput>> {
        let mut available = Vec::new();
        for address in addresses {
            let owner = self.parse_bech32_address(address).await?;
            let ids = self.basic_output_ids(address).await?;
            if ids.is_empty() {
                continue;
            }
            available.extend(self.get_outputs(&ids).await?.into_iter().filter(|response| {
                !response.metadata.is_spent
                    && response
                        .output
                        .as_basic()
                        .is_some_and(|b| b.unlock_conditions().is_plain_address())
                    && response.output.required_address() == owner
            }));
        }
        available.sort_by_key(|r| std::cmp::Reverse(r.output.amount()));

        let mut found = 0u64;
        let mut inputs = Vec::new();
        for response in available {
            if found >= amount {
                break;
            }
            found = found.saturating_add(response.output.amount());
            inputs.push(UtxoInput::from(response.metadata.output_id()));
        }
        if found < amount {
            return Err(Error::InsufficientFunds {
                found,
                required: amount,
            });
        }
        Ok(inputs)
    }
}

fn check_outputs(options: &BlockOptions, info: &NetworkInfo) -> Result<()> {
    for (index, output) in options.outputs.iter().enumerate() {
        output
            .verify_storage_deposit(&info.rent_structure)
            .map_err(|e| Error::InvalidOutput(format!("output {index}: {e}")))?;
    }
    Ok(())
}

/// Where a [`TransactionPipeline`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Unprepared,
    Prepared,
    Signed,
    Posted,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Unprepared => "unprepared",
            PipelineStage::Prepared => "prepared",
            PipelineStage::Signed => "signed",
            PipelineStage::Posted => "posted",
        }
    }
}

/// One transfer, driven step by step.
pub struct TransactionPipeline<'a> {
    client: &'a Client,
    secret_manager: &'a SecretManager,
    options: BlockOptions,
    prepared: Option<PreparedTransactionData>,
    signed: Option<TransactionPayload>,
    posted: Option<(BlockId, Block)>,
}

impl<'a> TransactionPipeline<'a> {
    pub fn new(client: &'a Client, secret_manager: &'a SecretManager, options: BlockOptions) -> Self {
        Self {
            client,
            secret_manager,
            options,
            prepared: None,
            signed: None,
            posted: None,
        }
    }

    /// Resumes from data prepared elsewhere.
    pub fn from_prepared(
        client: &'a Client,
        secret_manager: &'a SecretManager,
        prepared: PreparedTransactionData,
    ) -> Self {
        Self {
            prepared: Some(prepared),
            ..Self::new(client, secret_manager, BlockOptions::default())
        }
    }

    pub fn stage(&self) -> PipelineStage {
        if self.posted.is_some() {
            PipelineStage::Posted
        } else if self.signed.is_some() {
            PipelineStage::Signed
        } else if self.prepared.is_some() {
            PipelineStage::Prepared
        } else {
            PipelineStage::Unprepared
        }
    }

    pub fn prepared(&self) -> Option<&PreparedTransactionData> {
        self.prepared.as_ref()
    }

    pub fn signed(&self) -> Option<&TransactionPayload> {
        self.signed.as_ref()
    }

    fn expect(&self, expected: PipelineStage) -> Result<()> {
        let current = self.stage();
        if current == expected {
            Ok(())
        } else {
            Err(Error::InvalidStage {
                current: current.as_str(),
                expected: expected.as_str(),
            })
        }
    }

    pub async fn prepare(&mut self) -> Result<&PreparedTransactionData> {
        self.expect(PipelineStage::Unprepared)?;
        let prepared = self
            .client
            .prepare_transaction(self.secret_manager, &self.options)
            .await?;
        Ok(self.prepared.insert(prepared))
    }

    pub async fn sign(&mut self) -> Result<&TransactionPayload> {
        self.expect(PipelineStage::Prepared)?;
        let Some(prepared) = self.prepared.as_ref() else {
            return Err(Error::InvalidStage {
                current: PipelineStage::Unprepared.as_str(),
                expected: PipelineStage::Prepared.as_str(),
            });
        };
        let payload = self
            .client
            .sign_transaction(self.secret_manager, prepared)
            .await?;
        Ok(self.signed.insert(payload))
    }

    pub async fn post(&mut self) -> Result<BlockId> {
        if let Some((block_id, _)) = &self.posted {
            return Ok(*block_id);
        }
        self.expect(PipelineStage::Signed)?;
        let Some(payload) = self.signed.clone() else {
            return Err(Error::InvalidStage {
                current: self.stage().as_str(),
                expected: PipelineStage::Signed.as_str(),
            });
        };
        let (block_id, block) = self
            .client
            .post_transaction(payload, self.options.parents.clone())
            .await?;
        info!(%block_id, "transaction posted");
        self.posted = Some((block_id, block));
        Ok(block_id)
    }

    /// Runs whatever steps are left.
    pub async fn run(&mut self) -> Result<(BlockId, Block)> {
        if self.stage() == PipelineStage::Unprepared {
            self.prepare().await?;
        }
        if self.stage() == PipelineStage::Prepared {
            self.sign().await?;
        }
        self.post().await?;
        self.posted.clone().ok_or(Error::InvalidStage {
            current: self.stage().as_str(),
            expected: PipelineStage::Posted.as_str(),
        })
    }
}
