//! # Ledger Nano
//!
//! Talks APDUs to the IOTA app on a Ledger device. Keys never leave the
//! device: it hands out public keys and signs essence hashes.
//!
//! ```text
//! CLA  INS  P1  P2  Lc  data
//! 0x7b 0x10  0   0   0                     app config
//! 0x7b 0x11  0   0  20  bip44 path         public key   -> 32 bytes
//! 0x7b 0x12  0   0  52  path ++ hash       signature    -> 64 bytes
//! ```
//!
//! Every response ends in a two-byte status word; `0x9000` is success.
//!
//! ## Transports
//!
//! [`LedgerTransport`] abstracts the wire. [`SpeculosTransport`] speaks the
//! Speculos simulator's TCP framing (u32 big-endian length, APDU; responses
//! are length, data, status word). Each exchange must finish within the
//! transport's timeout; a late or oversized answer drops the connection.
//! There is no USB HID transport, so a physical device reports as
//! unavailable.
//!
//! The device can serve one exchange sequence at a time. Callers go through
//! the client's device registry, which rejects overlapping operations.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use crate::block::payload::SignatureUnlock;
use crate::crypto::keys::{Ed25519PublicKey, Ed25519Signature};
use crate::config::DEFAULT_API_TIMEOUT;
use crate::crypto::slip10::Bip44;
use crate::error::{Error, Result};

pub const CLA: u8 = 0x7b;
pub const INS_GET_APP_CONFIG: u8 = 0x10;
pub const INS_GET_PUBLIC_KEY: u8 = 0x11;
pub const INS_SIGN: u8 = 0x12;

pub const SW_OK: u16 = 0x9000;
pub const SW_DENIED_BY_USER: u16 = 0x6985;
pub const SW_DEVICE_LOCKED: u16 = 0x5515;
pub const SW_APP_NOT_OPEN: u16 = 0x6e01;

/// Longest response data the simulator may announce.
const MAX_RESPONSE_LENGTH: usize = 1024;

const APP_CONFIG_FLAG_LOCKED: u8 = 0x01;
const APP_CONFIG_FLAG_BLIND_SIGNING: u8 = 0x02;

/// A byte pipe to a device.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Stable identity of the device behind this transport, used to
    /// serialize operations on it.
    fn device_id(&self) -> String;

    /// Sends one APDU and returns the response including the status word.
    async fn exchange(&self, apdu: &[u8]) -> Result<Vec<u8>>;
}

// ---------------------------------------------------------------------------
// Transports
// ---------------------------------------------------------------------------

/// TCP transport to a Speculos simulator.
pub struct SpeculosTransport {
    address: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl SpeculosTransport {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: DEFAULT_API_TIMEOUT,
            stream: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn unavailable(&self, err: std::io::Error) -> Error {
        Error::DeviceUnavailable(format!("simulator at {}: {}", self.address, err.kind()))
    }
}

#[async_trait]
impl LedgerTransport for SpeculosTransport {
    fn device_id(&self) -> String {
        format!("speculos:{}", self.address)
    }

    async fn exchange(&self, apdu: &[u8]) -> Result<Vec<u8>> {
        let mut guard = self.stream.lock().await;
        let result = tokio::time::timeout(self.timeout, async {
            if guard.is_none() {
                *guard = Some(TcpStream::connect(&self.address).await?);
            }
            let Some(stream) = guard.as_mut() else {
                return Err(std::io::Error::from(std::io::ErrorKind::NotConnected));
            };
            stream.write_all(&(apdu.len() as u32).to_be_bytes()).await?;
            stream.write_all(apdu).await?;
            let mut len = [0u8; 4];
            stream.read_exact(&mut len).await?;
            let len = u32::from_be_bytes(len) as usize;
            if len > MAX_RESPONSE_LENGTH {
                return Err(std::io::Error::from(std::io::ErrorKind::InvalidData));
            }
            let mut response = vec![0u8; len + 2];
            stream.read_exact(&mut response).await?;
            Ok::<_, std::io::Error>(response)
        })
        .await;

        match result {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                *guard = None;
                Err(self.unavailable(e))
            }
            Err(_) => {
                *guard = None;
                Err(Error::Timeout(self.timeout))
            }
        }
    }
}

/// Stand-in for USB HID, which this build does not support.
#[derive(Debug, Default)]
pub struct HidUnavailable;

#[async_trait]
impl LedgerTransport for HidUnavailable {
    fn device_id(&self) -> String {
        "usb-hid".into()
    }

    async fn exchange(&self, _apdu: &[u8]) -> Result<Vec<u8>> {
        Err(Error::DeviceUnavailable(
            "no USB HID transport; use the simulator".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerApp {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerNanoStatus {
    pub connected: bool,
    pub locked: bool,
    pub blind_signing_enabled: bool,
    pub app: Option<LedgerApp>,
}

// ---------------------------------------------------------------------------
// Secret manager
// ---------------------------------------------------------------------------

pub struct LedgerSecretManager {
    is_simulator: bool,
    transport: Arc<dyn LedgerTransport>,
}

impl fmt::Debug for LedgerSecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerSecretManager")
            .field("is_simulator", &self.is_simulator)
            .field("device", &self.transport.device_id())
            .finish()
    }
}

fn apdu(ins: u8, data: &[u8]) -> Vec<u8> {
    let mut apdu = vec![CLA, ins, 0, 0, data.len() as u8];
    apdu.extend_from_slice(data);
    apdu
}

/// Path segments as big-endian u32s, hardening bit set.
pub fn encode_path(chain: &Bip44) -> Vec<u8> {
    chain
        .segments()
        .iter()
        .flat_map(|s| (s | 1 << 31).to_be_bytes())
        .collect()
}

/// Splits off and checks the status word.
fn check_status(mut response: Vec<u8>) -> Result<Vec<u8>> {
    if response.len() < 2 {
        return Err(Error::DeviceUnavailable("truncated device response".into()));
    }
    let sw = u16::from_be_bytes([response[response.len() - 2], response[response.len() - 1]]);
    response.truncate(response.len() - 2);
    match sw {
        SW_OK => Ok(response),
        SW_DENIED_BY_USER => Err(Error::Signing("rejected on the device".into())),
        SW_DEVICE_LOCKED => Err(Error::BackendLocked),
        SW_APP_NOT_OPEN => Err(Error::DeviceUnavailable("IOTA app is not open".into())),
        other => Err(Error::DeviceUnavailable(format!("device status {other:#06x}"))),
    }
}

impl LedgerSecretManager {
    pub fn new(is_simulator: bool, transport: Arc<dyn LedgerTransport>) -> Self {
        Self {
            is_simulator,
            transport,
        }
    }

    pub fn is_simulator(&self) -> bool {
        self.is_simulator
    }

    pub fn device_id(&self) -> String {
        self.transport.device_id()
    }

    async fn call(&self, ins: u8, data: &[u8]) -> Result<Vec<u8>> {
        debug!(device = %self.transport.device_id(), ins, "ledger apdu");
        check_status(self.transport.exchange(&apdu(ins, data)).await?)
    }

    /// Connection, lock and app state. Fails with `DeviceUnavailable` when
    /// nothing answers.
    pub async fn status(&self) -> Result<LedgerNanoStatus> {
        let response = self.transport.exchange(&apdu(INS_GET_APP_CONFIG, &[])).await?;
        let locked = response.len() >= 2 && response[response.len() - 2..] == SW_DEVICE_LOCKED.to_be_bytes();
        if locked {
            return Ok(LedgerNanoStatus {
                connected: true,
                locked: true,
                blind_signing_enabled: false,
                app: None,
            });
        }
        let config = check_status(response)?;
        if config.len() < 4 {
            return Err(Error::DeviceUnavailable("malformed app config".into()));
        }
        let name = String::from_utf8_lossy(&config[4..]).into_owned();
        Ok(LedgerNanoStatus {
            connected: true,
            locked: config[3] & APP_CONFIG_FLAG_LOCKED != 0,
            blind_signing_enabled: config[3] & APP_CONFIG_FLAG_BLIND_SIGNING != 0,
            app: Some(LedgerApp {
                name,
                version: format!("{}.{}.{}", config[0], config[1], config[2]),
            }),
        })
    }

    pub async fn public_key(&self, chain: &Bip44) -> Result<Ed25519PublicKey> {
        chain.validate()?;
        let bytes = self.call(INS_GET_PUBLIC_KEY, &encode_path(chain)).await?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::DeviceUnavailable("malformed public key from device".into()))?;
        Ok(Ed25519PublicKey(bytes))
    }

    pub async fn sign(&self, essence_hash: &[u8; 32], chain: &Bip44) -> Result<SignatureUnlock> {
        chain.validate()?;
        let mut data = encode_path(chain);
        data.extend_from_slice(essence_hash);
        let signature = Ed25519Signature::from_slice(&self.call(INS_SIGN, &data).await?)?;
        let public_key = self.public_key(chain).await?;
        Ok(SignatureUnlock {
            public_key,
            signature,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_is_hardened_big_endian() {
        let path = encode_path(&Bip44::new(4219).with_address_index(1));
        assert_eq!(path.len(), 20);
        assert_eq!(path[..4], [0x80, 0, 0, 44]);
        assert_eq!(path[16..], [0x80, 0, 0, 1]);
    }

    #[test]
    fn status_words_map_to_errors() {
        assert_eq!(check_status(vec![1, 2, 0x90, 0x00]).unwrap(), vec![1, 2]);
        assert_eq!(
            check_status(vec![0x69, 0x85]).unwrap_err().kind(),
            crate::error::ErrorKind::SigningError
        );
        assert_eq!(
            check_status(vec![0x55, 0x15]).unwrap_err().kind(),
            crate::error::ErrorKind::BackendLockedError
        );
        assert_eq!(
            check_status(vec![0x6e, 0x01]).unwrap_err().kind(),
            crate::error::ErrorKind::DeviceUnavailableError
        );
        assert!(check_status(vec![0x90]).is_err());
    }

    #[tokio::test]
    async fn usb_reports_unavailable() {
        let ledger = LedgerSecretManager::new(false, Arc::new(HidUnavailable));
        let err = ledger.status().await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DeviceUnavailableError);
    }

    #[tokio::test]
    async fn unreachable_simulator_is_unavailable() {
        let ledger = LedgerSecretManager::new(true, Arc::new(SpeculosTransport::new("127.0.0.1:1")));
        let err = ledger.public_key(&Bip44::new(4219)).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DeviceUnavailableError);
    }

    #[tokio::test]
    async fn silent_simulator_times_out_and_reconnects() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            // First connection never answers.
            let (silent, _) = listener.accept().await.unwrap();
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 4];
            socket.read_exact(&mut header).await.unwrap();
            let mut apdu = vec![0u8; u32::from_be_bytes(header) as usize];
            socket.read_exact(&mut apdu).await.unwrap();
            socket.write_all(&[0, 0, 0, 1, 7, 0x90, 0x00]).await.unwrap();
            drop(silent);
        });

        let transport = SpeculosTransport::new(address).with_timeout(Duration::from_millis(200));
        let err = transport.exchange(&apdu(INS_GET_APP_CONFIG, &[])).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::TimeoutError);

        let response = transport.exchange(&apdu(INS_GET_APP_CONFIG, &[])).await.unwrap();
        assert_eq!(response, vec![7, 0x90, 0x00]);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_response_is_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header = [0u8; 4];
            socket.read_exact(&mut header).await.unwrap();
            let mut apdu = vec![0u8; u32::from_be_bytes(header) as usize];
            socket.read_exact(&mut apdu).await.unwrap();
            socket.write_all(&u32::MAX.to_be_bytes()).await.unwrap();
        });

        let transport = SpeculosTransport::new(address);
        let err = transport.exchange(&apdu(INS_GET_APP_CONFIG, &[])).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DeviceUnavailableError);
    }
}
