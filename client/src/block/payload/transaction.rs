//! # Transactions
//!
//! ```text
//! TransactionPayload
//! ├── essence            what is signed
//! │   ├── network_id     u64, first 8 bytes of BLAKE3(network name)
//! │   ├── inputs         output ids being consumed
//! │   ├── inputs_commitment  BLAKE3 over BLAKE3(packed consumed output)…
//! │   ├── outputs
//! │   └── payload        optional tagged data
//! └── unlocks            one per input, same order
//! ```
//!
//! Signatures cover `BLAKE3(packed essence)`. The transaction id is
//! `BLAKE3(packed payload)` and names the outputs it creates.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::tagged_data::TaggedDataPayload;
use super::unlock::{verify_unlock_references, Unlock};
use crate::address::{Address, Ed25519Address};
use crate::block::id::{OutputId, TransactionId};
use crate::block::output::Output;
use crate::block::packable::{
    pack_u32_prefixed, pack_vec_u16, Packable, UnpackError, Unpacker,
};
use crate::config::{MAX_INPUTS, MAX_OUTPUTS};
use crate::crypto::hash::{blake3_hash, blake3_hash_parts};
use crate::error::{Error, Result};
use crate::utils::{serde_hex, serde_string};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoInput {
    pub transaction_id: TransactionId,
    pub transaction_output_index: u16,
}

impl UtxoInput {
    pub fn output_id(&self) -> OutputId {
        OutputId::new(self.transaction_id, self.transaction_output_index)
    }
}

impl From<OutputId> for UtxoInput {
    fn from(output_id: OutputId) -> Self {
        Self {
            transaction_id: *output_id.transaction_id(),
            transaction_output_index: output_id.index(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Input {
    Utxo(UtxoInput),
}

impl Input {
    pub const UTXO: u8 = 0;

    pub fn output_id(&self) -> OutputId {
        match self {
            Input::Utxo(utxo) => utxo.output_id(),
        }
    }
}

impl Packable for Input {
    fn pack(&self, buf: &mut Vec<u8>) {
        match self {
            Input::Utxo(utxo) => {
                buf.push(Self::UTXO);
                utxo.output_id().pack(buf);
            }
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        match unpacker.read_u8()? {
            Self::UTXO => Ok(Input::Utxo(OutputId::unpack(unpacker)?.into())),
            tag => Err(UnpackError::InvalidTag { what: "input", tag }),
        }
    }
}

/// Commits the signer to the exact outputs being consumed, in input order.
pub fn inputs_commitment<'a>(consumed: impl IntoIterator<Item = &'a Output>) -> [u8; 32] {
    let hashes: Vec<[u8; 32]> = consumed
        .into_iter()
        .map(|output| blake3_hash(&output.pack_to_vec()))
        .collect();
    let parts: Vec<&[u8]> = hashes.iter().map(|h| h.as_slice()).collect();
    blake3_hash_parts(&parts)
}

// ---------------------------------------------------------------------------
// Essence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "EssenceDto")]
pub struct TransactionEssence {
    #[serde(with = "serde_string")]
    network_id: u64,
    inputs: Vec<Input>,
    #[serde(with = "serde_hex")]
    inputs_commitment: [u8; 32],
    outputs: Vec<Output>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<TaggedDataPayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EssenceDto {
    #[serde(with = "serde_string")]
    network_id: u64,
    inputs: Vec<Input>,
    #[serde(with = "serde_hex")]
    inputs_commitment: [u8; 32],
    outputs: Vec<Output>,
    #[serde(default)]
    payload: Option<TaggedDataPayload>,
}

impl TryFrom<EssenceDto> for TransactionEssence {
    type Error = Error;

    fn try_from(dto: EssenceDto) -> Result<Self> {
        Self::new(
            dto.network_id,
            dto.inputs,
            dto.inputs_commitment,
            dto.outputs,
            dto.payload,
        )
    }
}

impl TransactionEssence {
    pub const KIND: u8 = 1;

    pub fn new(
        network_id: u64,
        inputs: Vec<Input>,
        inputs_commitment: [u8; 32],
        outputs: Vec<Output>,
        payload: Option<TaggedDataPayload>,
    ) -> Result<Self> {
        if inputs.is_empty() || inputs.len() > MAX_INPUTS {
            return Err(Error::Validation(format!(
                "a transaction needs 1 to {MAX_INPUTS} inputs, got {}",
                inputs.len()
            )));
        }
        if outputs.is_empty() || outputs.len() > MAX_OUTPUTS {
            return Err(Error::Validation(format!(
                "a transaction needs 1 to {MAX_OUTPUTS} outputs, got {}",
                outputs.len()
            )));
        }
        let mut seen = HashSet::with_capacity(inputs.len());
        for input in &inputs {
            if !seen.insert(input.output_id()) {
                return Err(Error::Validation(format!(
                    "input {} is consumed twice",
                    input.output_id()
                )));
            }
        }
        outputs
            .iter()
            .try_fold(0u64, |sum, o| sum.checked_add(o.amount()))
            .ok_or_else(|| Error::Validation("output amounts overflow".into()))?;

        Ok(Self {
            network_id,
            inputs,
            inputs_commitment,
            outputs,
            payload,
        })
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn inputs_commitment(&self) -> &[u8; 32] {
        &self.inputs_commitment
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn payload(&self) -> Option<&TaggedDataPayload> {
        self.payload.as_ref()
    }

    /// The message every signature unlock signs.
    pub fn hash(&self) -> [u8; 32] {
        blake3_hash(&self.pack_to_vec())
    }
}

impl Packable for TransactionEssence {
    fn pack(&self, buf: &mut Vec<u8>) {
        buf.push(Self::KIND);
        buf.extend_from_slice(&self.network_id.to_le_bytes());
        pack_vec_u16(buf, &self.inputs);
        buf.extend_from_slice(&self.inputs_commitment);
        pack_vec_u16(buf, &self.outputs);
        match &self.payload {
            Some(tagged) => {
                let mut inner = vec![TaggedDataPayload::KIND];
                tagged.pack(&mut inner);
                pack_u32_prefixed(buf, &inner);
            }
            None => buf.extend_from_slice(&0u32.to_le_bytes()),
        }
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        let kind = unpacker.read_u8()?;
        if kind != Self::KIND {
            return Err(UnpackError::InvalidTag {
                what: "transaction essence",
                tag: kind,
            });
        }
        let network_id = unpacker.read_u64()?;
        let inputs = unpacker.read_vec_u16::<Input>()?;
        let inputs_commitment = unpacker.read_array()?;
        let outputs = unpacker.read_vec_u16::<Output>()?;
        let payload_bytes = unpacker.read_u32_prefixed()?;
        let payload = if payload_bytes.is_empty() {
            None
        } else {
            let mut inner = Unpacker::new(&payload_bytes);
            let kind = inner.read_u8()?;
            if kind != TaggedDataPayload::KIND {
                return Err(UnpackError::InvalidTag {
                    what: "essence payload",
                    tag: kind,
                });
            }
            let tagged = TaggedDataPayload::unpack(&mut inner)?;
            inner.finish()?;
            Some(tagged)
        };
        Self::new(network_id, inputs, inputs_commitment, outputs, payload)
            .map_err(|e| UnpackError::Invalid(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Transaction Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TransactionPayloadDto")]
pub struct TransactionPayload {
    essence: TransactionEssence,
    unlocks: Vec<Unlock>,
}

#[derive(Deserialize)]
struct TransactionPayloadDto {
    essence: TransactionEssence,
    unlocks: Vec<Unlock>,
}

impl TryFrom<TransactionPayloadDto> for TransactionPayload {
    type Error = Error;

    fn try_from(dto: TransactionPayloadDto) -> Result<Self> {
        Self::new(dto.essence, dto.unlocks)
    }
}

impl TransactionPayload {
    pub const KIND: u8 = 6;

    pub fn new(essence: TransactionEssence, unlocks: Vec<Unlock>) -> Result<Self> {
        if unlocks.len() != essence.inputs().len() {
            return Err(Error::Validation(format!(
                "{} unlocks for {} inputs",
                unlocks.len(),
                essence.inputs().len()
            )));
        }
        verify_unlock_references(&unlocks).map_err(Error::Validation)?;
        Ok(Self { essence, unlocks })
    }

    pub fn essence(&self) -> &TransactionEssence {
        &self.essence
    }

    pub fn unlocks(&self) -> &[Unlock] {
        &self.unlocks
    }

    pub fn id(&self) -> TransactionId {
        TransactionId(blake3_hash_parts(&[&[Self::KIND], &self.pack_to_vec()]))
    }

    /// Ids of the outputs this transaction creates.
    pub fn output_ids(&self) -> impl Iterator<Item = OutputId> + '_ {
        let id = self.id();
        (0..self.essence.outputs().len()).map(move |i| OutputId::new(id, i as u16))
    }

    /// Ledger-level validation against the outputs being consumed, given in
    /// input order: the inputs commitment, balances, and every unlock.
    pub fn verify_against(&self, consumed: &[Output]) -> Result<()> {
        if consumed.len() != self.essence.inputs().len() {
            return Err(Error::Validation(format!(
                "{} consumed outputs for {} inputs",
                consumed.len(),
                self.essence.inputs().len()
            )));
        }
        if inputs_commitment(consumed) != *self.essence.inputs_commitment() {
            return Err(Error::Validation("inputs commitment does not match".into()));
        }
        self.verify_balances(consumed)?;
        self.verify_unlocks(consumed)
    }

    fn verify_balances(&self, consumed: &[Output]) -> Result<()> {
        let input_sum: u64 = consumed.iter().map(Output::amount).sum();
        let output_sum: u64 = self.essence.outputs().iter().map(Output::amount).sum();
        if input_sum != output_sum {
            return Err(Error::Validation(format!(
                "inputs hold {input_sum} but outputs hold {output_sum}"
            )));
        }

        // Foundries mint and melt, so token balances only have to match
        // when none takes part.
        let has_foundry = consumed
            .iter()
            .chain(self.essence.outputs())
            .any(|o| matches!(o, Output::Foundry(_)));
        if !has_foundry {
            let mut inputs = BTreeMap::new();
            let mut outputs = BTreeMap::new();
            consumed.iter().for_each(|o| o.native_tokens().add_to(&mut inputs));
            self.essence
                .outputs()
                .iter()
                .for_each(|o| o.native_tokens().add_to(&mut outputs));
            if inputs != outputs {
                return Err(Error::Validation("native token balances do not match".into()));
            }
        }
        Ok(())
    }

    fn verify_unlocks(&self, consumed: &[Output]) -> Result<()> {
        let message = self.essence.hash();
        let mut signers: HashMap<Ed25519Address, usize> = HashMap::new();
        let mut chains: HashMap<Address, usize> = HashMap::new();

        for (index, (output, unlock)) in consumed.iter().zip(&self.unlocks).enumerate() {
            let required = output.required_address();
            match (required, unlock) {
                (Address::Ed25519(address), Unlock::Signature(sig)) => {
                    if Ed25519Address::from_public_key(&sig.public_key) != address {
                        return Err(Error::Signing(format!(
                            "input {index}: public key does not match the owner"
                        )));
                    }
                    if !sig.public_key.verify(&message, &sig.signature) {
                        return Err(Error::Signing(format!("input {index}: invalid signature")));
                    }
                    if signers.insert(address, index).is_some() {
                        return Err(Error::Signing(format!(
                            "input {index}: repeated signature, expected a reference unlock"
                        )));
                    }
                }
                (Address::Ed25519(address), Unlock::Reference { reference }) => {
                    if signers.get(&address) != Some(&(*reference as usize)) {
                        return Err(Error::Signing(format!(
                            "input {index}: reference does not point to the owner's signature"
                        )));
                    }
                }
                (Address::Alias(_), Unlock::Alias { reference })
                | (Address::Nft(_), Unlock::Nft { reference }) => {
                    if chains.get(&required) != Some(&(*reference as usize)) {
                        return Err(Error::Signing(format!(
                            "input {index}: owning chain is not consumed at {reference}"
                        )));
                    }
                }
                _ => {
                    return Err(Error::Signing(format!(
                        "input {index}: unlock kind does not match the owner"
                    )))
                }
            }

            if let Some(chain) = output.chain_address(&self.essence.inputs()[index].output_id()) {
                chains.insert(chain, index);
            }
        }
        Ok(())
    }
}

impl Packable for TransactionPayload {
    fn pack(&self, buf: &mut Vec<u8>) {
        self.essence.pack(buf);
        pack_vec_u16(buf, &self.unlocks);
    }

    fn unpack(unpacker: &mut Unpacker<'_>) -> std::result::Result<Self, UnpackError> {
        let essence = TransactionEssence::unpack(unpacker)?;
        let unlocks = unpacker.read_vec_u16::<Unlock>()?;
        Self::new(essence, unlocks).map_err(|e| UnpackError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::output::{BasicOutputBuilder, UnlockCondition};
    use crate::block::payload::unlock::SignatureUnlock;
    use crate::crypto::keys::Ed25519Keypair;

    fn owned_by(keypair: &Ed25519Keypair, amount: u64) -> Output {
        BasicOutputBuilder::new_with_amount(amount)
            .add_unlock_condition(UnlockCondition::Address {
                address: Address::Ed25519(Ed25519Address::from_public_key(&keypair.public_key())),
            })
            .finish()
            .unwrap()
            .into()
    }

    fn input(byte: u8, index: u16) -> Input {
        Input::Utxo(OutputId::new(TransactionId([byte; 32]), index).into())
    }

    fn essence(consumed: &[Output], outputs: Vec<Output>) -> TransactionEssence {
        let inputs = (0..consumed.len()).map(|i| input(1, i as u16)).collect();
        TransactionEssence::new(7, inputs, inputs_commitment(consumed), outputs, None).unwrap()
    }

    fn sign(keypair: &Ed25519Keypair, essence: &TransactionEssence) -> Unlock {
        Unlock::Signature(SignatureUnlock {
            public_key: keypair.public_key(),
            signature: keypair.sign(&essence.hash()),
        })
    }

    #[test]
    fn duplicate_inputs_are_rejected() {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        let err = TransactionEssence::new(
            1,
            vec![input(1, 0), input(1, 0)],
            [0; 32],
            vec![owned_by(&keypair, 10)],
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("consumed twice"));
    }

    #[test]
    fn signature_then_reference_verifies() {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        let consumed = vec![owned_by(&keypair, 600), owned_by(&keypair, 400)];
        let essence = essence(&consumed, vec![owned_by(&keypair, 1_000)]);
        let unlocks = vec![sign(&keypair, &essence), Unlock::Reference { reference: 0 }];
        let payload = TransactionPayload::new(essence, unlocks).unwrap();
        payload.verify_against(&consumed).unwrap();

        let bytes = payload.pack_to_vec();
        assert_eq!(TransactionPayload::unpack_exact(&bytes).unwrap(), payload);
    }

    #[test]
    fn wrong_key_is_a_signing_error() {
        let owner = Ed25519Keypair::from_seed(&[1; 32]);
        let thief = Ed25519Keypair::from_seed(&[2; 32]);
        let consumed = vec![owned_by(&owner, 1_000)];
        let essence = essence(&consumed, vec![owned_by(&thief, 1_000)]);
        let unlocks = vec![sign(&thief, &essence)];
        let payload = TransactionPayload::new(essence, unlocks).unwrap();
        let err = payload.verify_against(&consumed).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn unbalanced_amounts_are_rejected() {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        let consumed = vec![owned_by(&keypair, 1_000)];
        let essence = essence(&consumed, vec![owned_by(&keypair, 999)]);
        let unlocks = vec![sign(&keypair, &essence)];
        let payload = TransactionPayload::new(essence, unlocks).unwrap();
        assert!(payload.verify_against(&consumed).is_err());
    }

    #[test]
    fn unlock_count_must_match_inputs() {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        let consumed = vec![owned_by(&keypair, 1_000)];
        let essence = essence(&consumed, vec![owned_by(&keypair, 1_000)]);
        assert!(TransactionPayload::new(essence, vec![]).is_err());
    }

    #[test]
    fn json_round_trip_keeps_the_id() {
        let keypair = Ed25519Keypair::from_seed(&[1; 32]);
        let consumed = vec![owned_by(&keypair, 1_000)];
        let essence = essence(&consumed, vec![owned_by(&keypair, 1_000)]);
        let unlocks = vec![sign(&keypair, &essence)];
        let payload = TransactionPayload::new(essence, unlocks).unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["essence"]["networkId"], "7");
        let back: TransactionPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.id(), payload.id());
    }
}
