// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # IOTA Client Core
//!
//! The native half of the IOTA client bindings: everything needed to build,
//! sign and post blocks against a node pool, with no host language in
//! sight.
//!
//! ## Architecture
//!
//! - **block**: blocks, payloads, outputs and their canonical byte form.
//! - **address**: Ed25519/alias/NFT addresses and Bech32.
//! - **crypto**: hashing, Ed25519 keys, SLIP-10 derivation, vault encryption.
//! - **secret**: mnemonic, Ledger Nano and vault secret managers.
//! - **node_manager**: node pool, health checks, failover, REST transport.
//! - **network_info**: memoized protocol parameters.
//! - **api**: input selection, the transaction pipeline, block finishing.
//! - **client**: the shared handle tying the above together.
//! - **config**: constants and the options bindings send.
//!
//! ## Ground Rules
//!
//! 1. Anything that reaches a node has been validated locally first.
//! 2. Secrets never appear in errors, logs or `Debug` output.
//! 3. Network parameters are fetched once and then served from memory.
//! 4. One operation at a time per hardware device.

pub mod address;
pub mod api;
pub mod block;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod network_info;
pub mod node_manager;
pub mod secret;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use crate::client::{Client, ClientBuilder};
pub use crate::error::{Error, ErrorKind, Result};
