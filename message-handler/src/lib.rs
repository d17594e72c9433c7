// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # IOTA Message Handler
//!
//! The seam between host-language bindings and the native client. A binding
//! creates one handler with [`create_message_handler`], then sends it JSON
//! messages:
//!
//! ```text
//! {"name": "GetNetworkInfo"}
//!     -> {"result": {"networkName": "testnet", "bech32Hrp": "rms", ...}}
//! {"name": "GetNodes"}
//!     -> {"error": {"kind": "UnknownCommandError", "message": "unknown command: GetNodes"}}
//! ```
//!
//! ## Modules
//!
//! | Module     | Purpose                                              |
//! |------------|------------------------------------------------------|
//! | `command`  | The command set and its JSON shapes                  |
//! | `handler`  | Dispatch, responses, per-command metrics and logs    |
//! | `logging`  | Optional `tracing` subscriber for embedding hosts    |
//! | `metrics`  | Prometheus counters and latency histogram            |

pub mod command;
pub mod handler;
pub mod logging;
pub mod metrics;

pub use crate::command::{Command, Message};
pub use crate::handler::{
    create_message_handler, ErrorResponse, HandlerError, MessageHandler, Response,
};
