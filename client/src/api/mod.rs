//! # High-Level API
//!
//! Everything a binding can ask of a [`Client`](crate::client::Client)
//! beyond its accessors:
//!
//! | Module            | Operations                                          |
//! |-------------------|-----------------------------------------------------|
//! | `node_api`        | info, health, tips, blocks, outputs, indexer        |
//! | `retry`           | promote, reattach, wait for inclusion               |
//! | `address`         | address generation, Bech32/hex conversions          |
//! | `transaction`     | prepare, sign, post; the staged pipeline            |
//! | `block`           | parents, proof of work, posting                     |
//! | `input_selection` | choosing inputs and change                          |

pub mod address;
pub mod block;
pub mod input_selection;
pub mod node_api;
pub mod retry;
pub mod transaction;
pub mod types;

pub use self::transaction::{PipelineStage, TransactionPipeline};
pub use self::types::{BlockOptions, InputSigningData, PreparedTransactionData, RemainderData};
