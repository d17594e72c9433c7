//! # Client Errors
//!
//! One error type for the whole client, with a stable [`ErrorKind`] that the
//! message handler puts on the wire. Module-local errors (`OutputError`,
//! `AddressError`, `UnpackError`, ...) convert into it with `?`.
//!
//! Messages are written for the person on the other side of a binding. They
//! never carry key material, passwords, or raw backend error dumps.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::AddressError;
use crate::block::output::OutputError;
use crate::block::packable::UnpackError;
use crate::crypto::encryption::EncryptionError;
use crate::crypto::keys::KeyError;

/// Result alias used across the client.
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Error Kind
// ---------------------------------------------------------------------------

/// Stable, serializable classification of every failure the client reports.
///
/// The variant names are part of the binding contract: they are emitted
/// verbatim as `error.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    NetworkError,
    TimeoutError,
    NoSyncedNodeError,
    DeviceUnavailableError,
    DeviceBusyError,
    InsufficientFundsError,
    InvalidOutputError,
    SigningError,
    DerivationError,
    BackendLockedError,
    PostRejectedError,
    UnknownCommandError,
    UnsupportedBackendError,
    AlreadyInitializedError,
}

impl ErrorKind {
    /// Whether retrying the same request later can succeed without the caller
    /// changing anything.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::TimeoutError
                | ErrorKind::NoSyncedNodeError
                | ErrorKind::DeviceBusyError
                | ErrorKind::DeviceUnavailableError
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::NoSyncedNodeError => "NoSyncedNodeError",
            ErrorKind::DeviceUnavailableError => "DeviceUnavailableError",
            ErrorKind::DeviceBusyError => "DeviceBusyError",
            ErrorKind::InsufficientFundsError => "InsufficientFundsError",
            ErrorKind::InvalidOutputError => "InvalidOutputError",
            ErrorKind::SigningError => "SigningError",
            ErrorKind::DerivationError => "DerivationError",
            ErrorKind::BackendLockedError => "BackendLockedError",
            ErrorKind::PostRejectedError => "PostRejectedError",
            ErrorKind::UnknownCommandError => "UnknownCommandError",
            ErrorKind::UnsupportedBackendError => "UnsupportedBackendError",
            ErrorKind::AlreadyInitializedError => "AlreadyInitializedError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Every failure the client can report.
#[derive(Debug, Error)]
pub enum Error {
    /// An output violated a structural or storage-deposit rule.
    #[error("invalid output: {0}")]
    Output(#[from] OutputError),

    /// A Bech32 or hex address could not be parsed.
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),

    /// Canonical bytes could not be decoded.
    #[error("malformed bytes: {0}")]
    Unpack(#[from] UnpackError),

    /// Request data was malformed.
    #[error("{0}")]
    Validation(String),

    /// A pipeline stage was invoked out of order.
    #[error("transaction pipeline is {current}, expected {expected}")]
    InvalidStage {
        current: &'static str,
        expected: &'static str,
    },

    /// Transport-level failure talking to a node.
    #[error("network error: {0}")]
    Network(String),

    /// A node answered with a non-success HTTP status.
    #[error("node responded with status {code} for {url}: {text}")]
    Response { code: u16, text: String, url: String },

    /// A network operation exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The node pool has no synced node to serve the request.
    #[error("no synced node available")]
    NoSyncedNode,

    /// The hardware wallet (or its simulator) cannot be reached.
    #[error("ledger device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Another operation holds the hardware wallet.
    #[error("ledger device is busy with another operation")]
    DeviceBusy,

    /// Selected inputs cannot cover the requested base-token amount.
    #[error("insufficient funds: found {found}, required {required}")]
    InsufficientFunds { found: u64, required: u64 },

    /// Selected inputs cannot cover a requested native token amount.
    #[error("insufficient native token {token_id}: found {found}, required {required}")]
    InsufficientNativeTokens {
        token_id: String,
        found: u128,
        required: u128,
    },

    /// An output given to the pipeline cannot be part of a transaction.
    #[error("invalid transaction output: {0}")]
    InvalidOutput(String),

    /// The secret manager could not produce a valid unlock.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Key derivation parameters were rejected.
    #[error("key derivation failed: {0}")]
    Derivation(String),

    /// The secret manager requires unlocking first.
    #[error("secret manager is locked")]
    BackendLocked,

    /// The operation does not exist for this secret manager backend.
    #[error("operation not supported by the {0} secret manager")]
    UnsupportedBackend(&'static str),

    /// The vault already holds a mnemonic.
    #[error("the vault already stores a mnemonic")]
    AlreadyInitialized,

    /// The node refused the block.
    #[error("block rejected by node: {0}")]
    PostRejected(String),

    /// The block is confirmed, or not yet eligible, so retrying it would
    /// only add noise to the tangle.
    #[error("block {0} needs neither promotion nor reattachment")]
    NoNeedPromoteOrReattach(String),

    /// A retried block was still not referenced by a milestone when the
    /// attempts ran out.
    #[error("block {block_id} was not included after {attempts} attempts")]
    NotIncluded { block_id: String, attempts: u64 },

    /// The dispatcher does not know this command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// The stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Output(_)
            | Error::Address(_)
            | Error::Unpack(_)
            | Error::Validation(_)
            | Error::InvalidStage { .. }
            | Error::NoNeedPromoteOrReattach(_)
            | Error::Json(_) => ErrorKind::ValidationError,
            Error::Response { code, .. } if is_permanent_status(*code) => ErrorKind::ValidationError,
            Error::Network(_) | Error::Response { .. } => ErrorKind::NetworkError,
            Error::Timeout(_) | Error::NotIncluded { .. } => ErrorKind::TimeoutError,
            Error::NoSyncedNode => ErrorKind::NoSyncedNodeError,
            Error::DeviceUnavailable(_) => ErrorKind::DeviceUnavailableError,
            Error::DeviceBusy => ErrorKind::DeviceBusyError,
            Error::InsufficientFunds { .. } | Error::InsufficientNativeTokens { .. } => {
                ErrorKind::InsufficientFundsError
            }
            Error::InvalidOutput(_) => ErrorKind::InvalidOutputError,
            Error::Signing(_) => ErrorKind::SigningError,
            Error::Derivation(_) => ErrorKind::DerivationError,
            Error::BackendLocked => ErrorKind::BackendLockedError,
            Error::UnsupportedBackend(_) => ErrorKind::UnsupportedBackendError,
            Error::AlreadyInitialized => ErrorKind::AlreadyInitializedError,
            Error::PostRejected(_) => ErrorKind::PostRejectedError,
            Error::UnknownCommand(_) => ErrorKind::UnknownCommandError,
        }
    }

    /// Whether the failure came from the network path and should count
    /// against the node that served the request.
    pub(crate) fn is_node_failure(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout(_))
            || matches!(self, Error::Response { code, .. } if *code >= 500)
    }
}

/// 4xx answers other than request timeout and rate limiting: the same request
/// will fail the same way on any node.
fn is_permanent_status(code: u16) -> bool {
    (400..500).contains(&code) && code != 408 && code != 429
}

impl From<EncryptionError> for Error {
    fn from(_: EncryptionError) -> Self {
        // Wrong password and corrupted snapshot look the same from outside.
        Error::BackendLocked
    }
}

impl From<KeyError> for Error {
    fn from(err: KeyError) -> Self {
        Error::Signing(err.to_string())
    }
}

impl Error {
    /// Classifies a transport failure of a request sent with `timeout`.
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            return Error::Timeout(timeout);
        }
        let url = err.url().map(|u| u.to_string()).unwrap_or_default();
        if err.is_connect() {
            Error::Network(format!("could not connect to {url}"))
        } else if err.is_decode() {
            Error::Network(format!("unexpected response body from {url}"))
        } else {
            Error::Network(format!("request to {url} failed"))
        }
    }
}
