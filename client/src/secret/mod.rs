//! # Secret Managers
//!
//! Where signing keys come from. One closed enum over every backend:
//!
//! | Backend     | Keys                                   | Locked when          |
//! |-------------|----------------------------------------|----------------------|
//! | Mnemonic    | seed in memory (mnemonic or hex seed)  | never                |
//! | LedgerNano  | on the device                          | device locked        |
//! | Vault       | mnemonic sealed in a sled snapshot     | no or wrong password |
//! | Placeholder | none                                   | always unsupported   |
//!
//! All keys are SLIP-10 Ed25519 at `m/44'/coin'/account'/internal'/index'`.
//!
//! ## Unlocks
//!
//! [`SecretManager::sign_transaction`] walks the inputs in order and emits
//! one unlock per input:
//!
//! - first input owned by an Ed25519 address: a signature over the essence
//!   hash,
//! - later inputs of the same address: a reference to that signature,
//! - inputs owned by an alias or NFT consumed earlier in the transaction: an
//!   alias or NFT unlock pointing at that input.

pub mod ledger;
pub mod mnemonic;
pub mod vault;

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use self::ledger::{LedgerSecretManager, LedgerTransport, SpeculosTransport};
use self::mnemonic::MnemonicSecretManager;
use self::vault::{VaultRegistry, VaultSecretManager};
use crate::address::{Address, Ed25519Address};
use crate::api::types::PreparedTransactionData;
use crate::block::payload::{SignatureUnlock, TransactionPayload, Unlock};
use crate::config::{ADDRESS_GAP_RANGE, DEFAULT_LEDGER_SIMULATOR_ADDRESS, SHIMMER_COIN_TYPE};
use crate::crypto::keys::Ed25519PublicKey;
use crate::crypto::slip10::{derive_keypair, Bip44};
use crate::error::{Error, Result};

pub use self::ledger::LedgerNanoStatus;
pub use self::mnemonic::{generate_mnemonic, mnemonic_to_hex_seed};

const HARDENED: u32 = 1 << 31;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which addresses to derive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateAddressesOptions {
    pub coin_type: u32,
    pub account_index: u32,
    pub range: Range<u32>,
    /// Internal (change) addresses instead of public ones.
    pub internal: bool,
    /// Defaults to the HRP of the connected network.
    pub bech32_hrp: Option<String>,
}

impl Default for GenerateAddressesOptions {
    fn default() -> Self {
        Self {
            coin_type: SHIMMER_COIN_TYPE,
            account_index: 0,
            range: 0..ADDRESS_GAP_RANGE,
            internal: false,
            bech32_hrp: None,
        }
    }
}

impl GenerateAddressesOptions {
    pub fn with_coin_type(mut self, coin_type: u32) -> Self {
        self.coin_type = coin_type;
        self
    }

    pub fn with_account_index(mut self, account_index: u32) -> Self {
        self.account_index = account_index;
        self
    }

    pub fn with_range(mut self, range: Range<u32>) -> Self {
        self.range = range;
        self
    }

    pub fn with_internal(mut self, internal: bool) -> Self {
        self.internal = internal;
        self
    }

    pub fn with_bech32_hrp(mut self, hrp: impl Into<String>) -> Self {
        self.bech32_hrp = Some(hrp.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.range.start > self.range.end {
            return Err(Error::Derivation(format!(
                "range start {} is after its end {}",
                self.range.start, self.range.end
            )));
        }
        if self.range.end > HARDENED {
            return Err(Error::Derivation(
                "address indexes must be below 2^31".into(),
            ));
        }
        if self.account_index >= HARDENED || self.coin_type >= HARDENED {
            return Err(Error::Derivation(
                "account index and coin type must be below 2^31".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn chains(&self) -> impl Iterator<Item = Bip44> + '_ {
        self.range.clone().map(|index| {
            Bip44::new(self.coin_type)
                .with_account(self.account_index)
                .with_change(self.internal)
                .with_address_index(index)
        })
    }
}

// ---------------------------------------------------------------------------
// DTO
// ---------------------------------------------------------------------------

/// Secret manager as a binding describes it, e.g. `{"Mnemonic": "..."}`,
/// `{"LedgerNano": true}` or `"Placeholder"`.
#[derive(Clone, Deserialize)]
pub enum SecretManagerDto {
    Mnemonic(String),
    HexSeed(String),
    /// `true` for the Speculos simulator.
    LedgerNano(bool),
    #[serde(alias = "Stronghold")]
    Vault(VaultDto),
    Placeholder,
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultDto {
    #[serde(default)]
    pub password: Option<String>,
    pub snapshot_path: String,
}

impl fmt::Debug for SecretManagerDto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretManagerDto::Mnemonic(_) => f.write_str("Mnemonic(<redacted>)"),
            SecretManagerDto::HexSeed(_) => f.write_str("HexSeed(<redacted>)"),
            SecretManagerDto::LedgerNano(sim) => write!(f, "LedgerNano({sim})"),
            SecretManagerDto::Vault(v) => write!(f, "Vault({})", v.snapshot_path),
            SecretManagerDto::Placeholder => f.write_str("Placeholder"),
        }
    }
}

// ---------------------------------------------------------------------------
// Secret manager
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum SecretManager {
    Mnemonic(MnemonicSecretManager),
    LedgerNano(LedgerSecretManager),
    Vault(VaultSecretManager),
    Placeholder,
}

/// Key material resolved for the duration of one operation.
enum KeySource<'a> {
    Memory(&'a MnemonicSecretManager),
    Seed(Zeroizing<Vec<u8>>),
    Device(&'a LedgerSecretManager),
}

impl KeySource<'_> {
    async fn public_key(&self, chain: &Bip44) -> Result<Ed25519PublicKey> {
        match self {
            KeySource::Memory(m) => Ok(m.keypair(chain)?.public_key()),
            KeySource::Seed(seed) => Ok(derive_keypair(seed, chain)?.public_key()),
            KeySource::Device(ledger) => ledger.public_key(chain).await,
        }
    }

    async fn sign(&self, message: &[u8; 32], chain: &Bip44) -> Result<SignatureUnlock> {
        let keypair = match self {
            KeySource::Memory(m) => m.keypair(chain)?,
            KeySource::Seed(seed) => derive_keypair(seed, chain)?,
            KeySource::Device(ledger) => return ledger.sign(message, chain).await,
        };
        Ok(SignatureUnlock {
            public_key: keypair.public_key(),
            signature: keypair.sign(message),
        })
    }
}

impl SecretManager {
    /// Builds a manager, connecting simulator Ledgers through `simulator`
    /// and opening vault snapshots through `vaults`.
    pub fn from_dto(
        dto: SecretManagerDto,
        simulator: Arc<dyn LedgerTransport>,
        vaults: &VaultRegistry,
    ) -> Result<Self> {
        Ok(match dto {
            SecretManagerDto::Mnemonic(m) => {
                SecretManager::Mnemonic(MnemonicSecretManager::try_from_mnemonic(&Zeroizing::new(m))?)
            }
            SecretManagerDto::HexSeed(s) => {
                SecretManager::Mnemonic(MnemonicSecretManager::try_from_hex_seed(&Zeroizing::new(s))?)
            }
            SecretManagerDto::LedgerNano(true) => {
                SecretManager::LedgerNano(LedgerSecretManager::new(true, simulator))
            }
            SecretManagerDto::LedgerNano(false) => SecretManager::LedgerNano(
                LedgerSecretManager::new(false, Arc::new(ledger::HidUnavailable)),
            ),
            SecretManagerDto::Vault(v) => {
                SecretManager::Vault(vaults.open(&v.snapshot_path, v.password)?)
            }
            SecretManagerDto::Placeholder => SecretManager::Placeholder,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            SecretManager::Mnemonic(_) => "mnemonic",
            SecretManager::LedgerNano(_) => "ledgerNano",
            SecretManager::Vault(_) => "vault",
            SecretManager::Placeholder => "placeholder",
        }
    }

    /// The hardware device this manager drives, if any.
    pub fn device_id(&self) -> Option<String> {
        match self {
            SecretManager::LedgerNano(ledger) => Some(ledger.device_id()),
            _ => None,
        }
    }

    async fn key_source(&self) -> Result<KeySource<'_>> {
        match self {
            SecretManager::Mnemonic(m) => Ok(KeySource::Memory(m)),
            SecretManager::Vault(v) => Ok(KeySource::Seed(v.seed().await?)),
            SecretManager::LedgerNano(l) => Ok(KeySource::Device(l)),
            SecretManager::Placeholder => Err(Error::UnsupportedBackend("placeholder")),
        }
    }

    /// Ed25519 addresses over `options.range`, in range order.
    pub async fn generate_ed25519_addresses(
        &self,
        options: &GenerateAddressesOptions,
    ) -> Result<Vec<Ed25519Address>> {
        options.validate()?;
        let source = self.key_source().await?;
        let mut addresses = Vec::with_capacity(options.range.len());
        for chain in options.chains() {
            let public_key = source.public_key(&chain).await?;
            addresses.push(Ed25519Address::from_public_key(&public_key));
        }
        debug!(
            backend = self.backend_name(),
            account = options.account_index,
            count = addresses.len(),
            "generated addresses"
        );
        Ok(addresses)
    }

    /// Bech32 addresses over `options.range` under `bech32_hrp`.
    pub async fn generate_addresses(
        &self,
        options: &GenerateAddressesOptions,
        bech32_hrp: &str,
    ) -> Result<Vec<String>> {
        self.generate_ed25519_addresses(options)
            .await?
            .into_iter()
            .map(|a| Address::Ed25519(a).to_bech32(bech32_hrp).map_err(Error::from))
            .collect()
    }

    /// Produces one unlock per input of `prepared`.
    pub async fn sign_transaction(&self, prepared: &PreparedTransactionData) -> Result<TransactionPayload> {
        let essence = &prepared.essence;
        let matches_essence = prepared.inputs_data.len() == essence.inputs().len()
            && prepared
                .inputs_data
                .iter()
                .zip(essence.inputs())
                .all(|(data, input)| data.output_id() == input.output_id());
        if !matches_essence {
            return Err(Error::Signing(
                "input signing data does not match the essence inputs".into(),
            ));
        }

        let source = self.key_source().await?;
        let message = essence.hash();
        let mut owners: HashMap<Address, u16> = HashMap::new();
        let mut unlocks = Vec::with_capacity(prepared.inputs_data.len());

        for (index, input) in prepared.inputs_data.iter().enumerate() {
            let required = input.output.required_address();
            let unlock = match (required, owners.get(&required).copied()) {
                (Address::Ed25519(_), Some(reference)) => Unlock::Reference { reference },
                (Address::Ed25519(owner), None) => {
                    let chain = input.chain.ok_or_else(|| {
                        Error::Signing(format!("input {index} has no derivation chain"))
                    })?;
                    let signature = source.sign(&message, &chain).await?;
                    if Ed25519Address::from_public_key(&signature.public_key) != owner {
                        return Err(Error::Signing(format!(
                            "key at {chain} does not own input {index}"
                        )));
                    }
                    owners.insert(required, index as u16);
                    Unlock::Signature(signature)
                }
                (Address::Alias(_), Some(reference)) => Unlock::Alias { reference },
                (Address::Nft(_), Some(reference)) => Unlock::Nft { reference },
                (Address::Alias(_) | Address::Nft(_), None) => {
                    return Err(Error::Signing(format!(
                        "input {index} is owned by a chain not consumed before it"
                    )))
                }
            };
            unlocks.push(unlock);

            if let Some(chain_address) = input.output.chain_address(&input.output_id()) {
                owners.insert(chain_address, index as u16);
            }
        }

        debug!(backend = self.backend_name(), inputs = unlocks.len(), "transaction signed");
        TransactionPayload::new(essence.clone(), unlocks)
    }

    /// Seals a mnemonic into a vault backend.
    pub async fn store_mnemonic(&self, mnemonic: &str) -> Result<()> {
        match self {
            SecretManager::Vault(vault) => vault.store_mnemonic(mnemonic).await,
            other => Err(Error::UnsupportedBackend(other.backend_name())),
        }
    }
}

impl TryFrom<SecretManagerDto> for SecretManager {
    type Error = Error;

    fn try_from(dto: SecretManagerDto) -> Result<Self> {
        Self::from_dto(
            dto,
            Arc::new(SpeculosTransport::new(DEFAULT_LEDGER_SIMULATOR_ADDRESS)),
            &VaultRegistry::default(),
        )
    }
}

impl FromStr for SecretManager {
    type Err = Error;

    fn from_str(json: &str) -> Result<Self> {
        let dto: SecretManagerDto = serde_json::from_str(json)
            .map_err(|_| Error::Validation("invalid secret manager description".into()))?;
        Self::try_from(dto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const MNEMONIC: &str = "acoustic trophy damage hint search taste love bicycle foster cradle brown govern endless depend situate athlete pudding blame question genius transfer van random vast";

    fn manager() -> SecretManager {
        format!(r#"{{"Mnemonic": "{MNEMONIC}"}}"#).parse().unwrap()
    }

    #[tokio::test]
    async fn two_deterministic_addresses() {
        let options = GenerateAddressesOptions::default().with_range(0..2);
        let first = manager().generate_addresses(&options, "rms").await.unwrap();
        let second = manager().generate_addresses(&options, "rms").await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_ne!(first[0], first[1]);
        assert!(first.iter().all(|a| a.starts_with("rms1")));
    }

    #[tokio::test]
    async fn internal_addresses_differ_from_public() {
        let public = GenerateAddressesOptions::default().with_range(0..1);
        let internal = public.clone().with_internal(true);
        let m = manager();
        assert_ne!(
            m.generate_ed25519_addresses(&public).await.unwrap(),
            m.generate_ed25519_addresses(&internal).await.unwrap()
        );
    }

    #[tokio::test]
    async fn invalid_ranges_are_derivation_errors() {
        let m = manager();
        let reversed = GenerateAddressesOptions::default().with_range(5..2);
        let too_high = GenerateAddressesOptions::default().with_range(HARDENED..HARDENED + 1);
        for options in [reversed, too_high] {
            let err = m.generate_ed25519_addresses(&options).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::DerivationError);
        }
    }

    #[tokio::test]
    async fn store_mnemonic_needs_a_vault() {
        let err = manager().store_mnemonic(MNEMONIC).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBackendError);
        let err = SecretManager::Placeholder.store_mnemonic(MNEMONIC).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBackendError);
    }

    #[tokio::test]
    async fn placeholder_cannot_derive() {
        let err = SecretManager::Placeholder
            .generate_ed25519_addresses(&GenerateAddressesOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedBackendError);
    }

    #[test]
    fn dto_shapes() {
        assert!(matches!(
            serde_json::from_str::<SecretManagerDto>(r#""Placeholder""#).unwrap(),
            SecretManagerDto::Placeholder
        ));
        assert!(matches!(
            serde_json::from_str::<SecretManagerDto>(r#"{"LedgerNano": true}"#).unwrap(),
            SecretManagerDto::LedgerNano(true)
        ));
        let vault: SecretManagerDto =
            serde_json::from_str(r#"{"Stronghold": {"password": "pw", "snapshotPath": "x"}}"#).unwrap();
        assert!(matches!(vault, SecretManagerDto::Vault(_)));
        assert!(!format!("{vault:?}").contains("pw"));
    }

    #[test]
    fn bad_dto_does_not_echo_secrets() {
        let err = "{\"Mnemonic\": \"not a real phrase\"}".parse::<SecretManager>().unwrap_err();
        assert!(!err.to_string().contains("real phrase"));
    }
}
