//! # Network Info Cache
//!
//! Protocol parameters come from a synced node the first time something
//! asks for them (or from the client options in offline mode) and are then
//! served from memory. Only [`NetworkInfoCache::invalidate`] or an explicit
//! refresh makes the client ask a node again, so every accessor agrees with
//! the last successful fetch.
//!
//! Client-side settings (local PoW, tips interval, ...) are fixed at
//! construction and merged into every snapshot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::block::output::RentStructure;
use crate::config::{ClientConfig, DEFAULT_MIN_POW_SCORE, PROTOCOL_VERSION};
use crate::crypto::hash::blake3_hash;
use crate::utils::serde_string;

/// Network parameters as a node reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolParameters {
    #[serde(alias = "version")]
    pub protocol_version: u8,
    pub network_name: String,
    pub bech32_hrp: String,
    pub min_pow_score: u32,
    #[serde(default)]
    pub rent_structure: RentStructure,
    #[serde(with = "serde_string")]
    pub token_supply: u64,
}

impl ProtocolParameters {
    /// Parameters for a named network with Shimmer defaults elsewhere.
    pub fn new(network_name: impl Into<String>, bech32_hrp: impl Into<String>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            network_name: network_name.into(),
            bech32_hrp: bech32_hrp.into(),
            min_pow_score: DEFAULT_MIN_POW_SCORE,
            rent_structure: RentStructure::default(),
            token_supply: 1_813_620_509_061_365,
        }
    }

    pub fn network_id(&self) -> u64 {
        network_id(&self.network_name)
    }
}

/// First 8 bytes (little endian) of BLAKE3 over the network name.
pub fn network_id(network_name: &str) -> u64 {
    let hash = blake3_hash(network_name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash[..8]);
    u64::from_le_bytes(bytes)
}

/// Settings owned by the client, not the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkSettings {
    pub local_pow: bool,
    pub fallback_to_local_pow: bool,
    pub tips_interval: u64,
    pub remote_pow_timeout: Duration,
}

impl From<&ClientConfig> for NetworkSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            local_pow: config.local_pow,
            fallback_to_local_pow: config.fallback_to_local_pow,
            tips_interval: config.tips_interval,
            remote_pow_timeout: config.remote_pow_timeout,
        }
    }
}

/// Immutable view of the network at the time of the last fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub network_name: String,
    #[serde(with = "serde_string")]
    pub network_id: u64,
    pub bech32_hrp: String,
    pub min_pow_score: u32,
    pub protocol_version: u8,
    pub rent_structure: RentStructure,
    #[serde(with = "serde_string")]
    pub token_supply: u64,
    pub tips_interval: u64,
    pub local_pow: bool,
    pub fallback_to_local_pow: bool,
    pub remote_pow_timeout: Duration,
    pub updated_at: DateTime<Utc>,
}

impl NetworkInfo {
    fn new(params: &ProtocolParameters, settings: &NetworkSettings) -> Self {
        Self {
            network_name: params.network_name.clone(),
            network_id: params.network_id(),
            bech32_hrp: params.bech32_hrp.clone(),
            min_pow_score: params.min_pow_score,
            protocol_version: params.protocol_version,
            rent_structure: params.rent_structure,
            token_supply: params.token_supply,
            tips_interval: settings.tips_interval,
            local_pow: settings.local_pow,
            fallback_to_local_pow: settings.fallback_to_local_pow,
            remote_pow_timeout: settings.remote_pow_timeout,
            updated_at: Utc::now(),
        }
    }
}

/// Memoized [`NetworkInfo`], safe to read from many tasks at once.
#[derive(Debug)]
pub struct NetworkInfoCache {
    settings: NetworkSettings,
    seed: Option<ProtocolParameters>,
    current: RwLock<Option<NetworkInfo>>,
}

impl NetworkInfoCache {
    pub fn new(settings: NetworkSettings, seed: Option<ProtocolParameters>) -> Self {
        let current = seed.as_ref().map(|p| NetworkInfo::new(p, &settings));
        Self {
            settings,
            seed,
            current: RwLock::new(current),
        }
    }

    pub fn settings(&self) -> &NetworkSettings {
        &self.settings
    }

    /// The cached snapshot, if any.
    pub fn snapshot(&self) -> Option<NetworkInfo> {
        self.current.read().clone()
    }

    /// Replaces the snapshot with freshly fetched parameters.
    pub fn update(&self, params: &ProtocolParameters) -> NetworkInfo {
        let info = NetworkInfo::new(params, &self.settings);
        info!(
            network = %info.network_name,
            network_id = info.network_id,
            hrp = %info.bech32_hrp,
            "network info updated"
        );
        *self.current.write() = Some(info.clone());
        info
    }

    /// Drops the snapshot so the next read fetches again. Config-seeded
    /// parameters are restored instead, since there is nothing to fetch.
    pub fn invalidate(&self) {
        let seeded = self.seed.as_ref().map(|p| NetworkInfo::new(p, &self.settings));
        *self.current.write() = seeded;
    }

    /// Whether the parameters came from the client options.
    pub fn is_offline(&self) -> bool {
        self.seed.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> NetworkSettings {
        NetworkSettings::from(&ClientConfig::default())
    }

    #[test]
    fn network_id_is_stable_and_name_dependent() {
        assert_eq!(network_id("testnet"), network_id("testnet"));
        assert_ne!(network_id("testnet"), network_id("shimmer"));
        let hash = blake3_hash(b"testnet");
        assert_eq!(network_id("testnet").to_le_bytes(), hash[..8]);
    }

    #[test]
    fn empty_until_updated() {
        let cache = NetworkInfoCache::new(settings(), None);
        assert!(cache.snapshot().is_none());
        let info = cache.update(&ProtocolParameters::new("testnet", "rms"));
        assert_eq!(cache.snapshot(), Some(info));
    }

    #[test]
    fn seeded_cache_survives_invalidation() {
        let params = ProtocolParameters::new("private", "atoi");
        let cache = NetworkInfoCache::new(settings(), Some(params));
        cache.invalidate();
        assert_eq!(cache.snapshot().unwrap().bech32_hrp, "atoi");
        assert!(cache.is_offline());
    }

    #[test]
    fn invalidation_clears_fetched_info() {
        let cache = NetworkInfoCache::new(settings(), None);
        cache.update(&ProtocolParameters::new("testnet", "rms"));
        cache.invalidate();
        assert!(cache.snapshot().is_none());
    }

    #[test]
    fn snapshot_carries_client_settings() {
        let config = ClientConfig {
            local_pow: false,
            tips_interval: 9,
            ..ClientConfig::default()
        };
        let cache = NetworkInfoCache::new(NetworkSettings::from(&config), None);
        let info = cache.update(&ProtocolParameters::new("testnet", "rms"));
        assert!(!info.local_pow);
        assert_eq!(info.tips_interval, 9);
    }

    #[test]
    fn node_protocol_json_parses() {
        let json = serde_json::json!({
            "version": 2,
            "networkName": "testnet",
            "bech32Hrp": "rms",
            "minPowScore": 1500,
            "rentStructure": { "vByteCost": 100, "vByteFactorKey": 10, "vByteFactorData": 1 },
            "tokenSupply": "1813620509061365"
        });
        let params: ProtocolParameters = serde_json::from_value(json).unwrap();
        assert_eq!(params.protocol_version, 2);
        assert_eq!(params.rent_structure, RentStructure::default());
    }
}
