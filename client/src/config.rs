//! # Client Configuration & Constants
//!
//! Every magic number of the client lives here, next to the [`ClientConfig`]
//! that bindings hand to `create_message_handler` as JSON.
//!
//! ```json
//! {
//!   "nodes": ["https://api.testnet.shimmer.network"],
//!   "localPow": true,
//!   "apiTimeout": { "secs": 20, "nanos": 0 }
//! }
//! ```
//!
//! Every field is optional. Durations use serde's `{secs, nanos}` form.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network_info::ProtocolParameters;
use crate::node_manager::node::NodeDto;

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

/// SLIP-44 coin type of IOTA.
pub const IOTA_COIN_TYPE: u32 = 4218;

/// SLIP-44 coin type of Shimmer.
pub const SHIMMER_COIN_TYPE: u32 = 4219;

pub const IOTA_BECH32_HRP: &str = "iota";
pub const IOTA_TESTNET_BECH32_HRP: &str = "atoi";
pub const SHIMMER_BECH32_HRP: &str = "smr";
pub const SHIMMER_TESTNET_BECH32_HRP: &str = "rms";

/// Protocol version written into blocks when the node does not say otherwise.
pub const PROTOCOL_VERSION: u8 = 2;

// ---------------------------------------------------------------------------
// Block & Output Limits
// ---------------------------------------------------------------------------

/// Length of every 32-byte identifier (block, transaction, alias, nft).
pub const HASH_LENGTH: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// Minimum and maximum number of parents a block references.
pub const MIN_PARENTS: usize = 1;
pub const MAX_PARENTS: usize = 8;

/// Maximum inputs and outputs of one transaction essence.
pub const MAX_INPUTS: usize = 128;
pub const MAX_OUTPUTS: usize = 128;

/// Maximum distinct native tokens held by one output.
pub const MAX_NATIVE_TOKENS: usize = 64;

/// Maximum length of a metadata feature.
pub const MAX_METADATA_LENGTH: usize = 8192;

/// Maximum length of a tag feature and of a tagged-data tag.
pub const MAX_TAG_LENGTH: usize = 64;

/// Maximum data length of a tagged-data payload.
pub const MAX_TAGGED_DATA_LENGTH: usize = 32 * 1024;

/// Maximum packed length of a whole block.
pub const MAX_BLOCK_LENGTH: usize = 32 * 1024;

/// Byte size of an output id: transaction id plus a u16 index.
pub const OUTPUT_ID_LENGTH: usize = HASH_LENGTH + 2;

/// Bytes of per-output metadata a node keeps besides the output itself
/// (block id, milestone index and timestamps).
pub const OUTPUT_METADATA_LENGTH: usize = 40;

/// Shimmer's storage deposit parameters.
pub const DEFAULT_V_BYTE_COST: u32 = 100;
pub const DEFAULT_V_BYTE_FACTOR_KEY: u8 = 10;
pub const DEFAULT_V_BYTE_FACTOR_DATA: u8 = 1;

/// Minimum PoW score used before a node has been asked.
pub const DEFAULT_MIN_POW_SCORE: u32 = 1500;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Deadline for a single node API call.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(15);

/// How long the node gets to do remote proof of work.
pub const DEFAULT_REMOTE_POW_TIMEOUT: Duration = Duration::from_secs(100);

/// How often a client should refresh the parents of a block it is mining.
pub const DEFAULT_TIPS_INTERVAL: u64 = 5;

/// Seconds between inclusion checks in `retry_until_included`.
pub const DEFAULT_RETRY_UNTIL_INCLUDED_INTERVAL: u64 = 5;

/// Inclusion checks before `retry_until_included` gives up.
pub const DEFAULT_RETRY_UNTIL_INCLUDED_MAX_AMOUNT: u64 = 40;

/// How often the background task re-checks node health.
pub const NODE_SYNC_INTERVAL: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Client Behavior
// ---------------------------------------------------------------------------

/// Upper bound of concurrent requests when fetching many outputs.
pub const MAX_PARALLEL_API_REQUESTS: usize = 100;

/// Number of addresses searched per account when discovering inputs.
pub const ADDRESS_GAP_RANGE: u32 = 20;

/// Where the Speculos simulator listens for APDUs by default.
pub const DEFAULT_LEDGER_SIMULATOR_ADDRESS: &str = "127.0.0.1:9999";

/// Salt length for the vault key derivation.
pub const VAULT_SALT_LENGTH: usize = 16;

/// AES-256-GCM key and nonce lengths.
pub const AES_KEY_LENGTH: usize = 32;
pub const AES_NONCE_LENGTH: usize = 12;

// ---------------------------------------------------------------------------
// Client Config
// ---------------------------------------------------------------------------

/// Options a binding passes when it creates a message handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Node pool. Entries are either plain URLs or `{url, auth, disabled}`.
    pub nodes: Vec<NodeDto>,
    /// Node preferred over the pool whenever it is synced.
    pub primary_node: Option<NodeDto>,
    /// When false every enabled node is treated as synced.
    pub node_sync_enabled: bool,
    /// Period of the background health check.
    pub node_sync_interval: Duration,
    /// Do proof of work locally instead of asking the node.
    pub local_pow: bool,
    /// Mine locally when remote proof of work times out.
    pub fallback_to_local_pow: bool,
    pub remote_pow_timeout: Duration,
    /// Threads used for local proof of work. Defaults to the CPU count.
    pub pow_worker_count: Option<usize>,
    /// Seconds between tip refreshes while mining.
    pub tips_interval: u64,
    pub api_timeout: Duration,
    /// Protocol parameters to use without asking a node (offline mode).
    pub protocol_parameters: Option<ProtocolParameters>,
    pub ledger_simulator_address: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            primary_node: None,
            node_sync_enabled: true,
            node_sync_interval: NODE_SYNC_INTERVAL,
            local_pow: true,
            fallback_to_local_pow: true,
            remote_pow_timeout: DEFAULT_REMOTE_POW_TIMEOUT,
            pow_worker_count: None,
            tips_interval: DEFAULT_TIPS_INTERVAL,
            api_timeout: DEFAULT_API_TIMEOUT,
            protocol_parameters: None,
            ledger_simulator_address: DEFAULT_LEDGER_SIMULATOR_ADDRESS.to_string(),
        }
    }
}

impl ClientConfig {
    /// Parses the JSON options a binding sends.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Validation(format!("invalid client options: {e}")))
    }

    /// Returns the coin type matching a Bech32 HRP, defaulting to Shimmer.
    pub fn coin_type_for_hrp(hrp: &str) -> u32 {
        match hrp {
            IOTA_BECH32_HRP | IOTA_TESTNET_BECH32_HRP => IOTA_COIN_TYPE,
            _ => SHIMMER_COIN_TYPE,
        }
    }
}
