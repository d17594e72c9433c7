//! # Message Handler
//!
//! The single entry point a binding talks to.
//!
//! ```text
//!  binding ──► handle(json) ──► Message ──► Command::parse ──► execute ──► Client
//!     ▲                                                                      │
//!     └──────────── {"result": ...} | {"error": {"kind", "message"}} ◄───────┘
//! ```
//!
//! A [`MessageHandler`] is cheap to clone and safe to share: every clone
//! drives the same [`Client`], so concurrent callers share one node pool,
//! one network-info cache and one device registry.
//!
//! Errors cross the boundary as `{kind, message}`. The kind is the stable
//! [`ErrorKind`] name; the message is the client's own, which never carries
//! key material.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;
use zeroize::Zeroizing;

use iota_client::api::address::{bech32_to_hex, block_id, is_address_valid};
use iota_client::block::id::BlockId;
use iota_client::block::payload::Payload;
use iota_client::block::Block;
use iota_client::node_manager::api::QueryParameter;
use iota_client::node_manager::node::Node;
use iota_client::secret::{generate_mnemonic, mnemonic_to_hex_seed};
use iota_client::{Client, ClientBuilder, Error, ErrorKind, Result};

use crate::command::{redact, Command, Message};
use crate::metrics::HandlerMetrics;

/// Failures setting up a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Client(#[from] Error),

    #[error("metrics registry: {0}")]
    Metrics(#[from] prometheus::Error),
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// What goes back across the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    #[serde(rename = "result")]
    Result(Value),
    #[serde(rename = "error")]
    Error(ErrorResponse),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<Result<Value>> for Response {
    fn from(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Response::Result(value),
            Err(err) => Response::Error(ErrorResponse::from(&err)),
        }
    }
}

/// A posted block and its id.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PostedBlock {
    block_id: BlockId,
    block: Block,
}

const UNSERIALIZABLE: &str =
    r#"{"error":{"kind":"ValidationError","message":"response could not be serialized"}}"#;

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct MessageHandler {
    client: Client,
    metrics: Arc<HandlerMetrics>,
}

/// Builds a client from an optional JSON [`ClientConfig`] and wraps it in a
/// handler. This is what bindings call once at startup.
///
/// [`ClientConfig`]: iota_client::config::ClientConfig
pub async fn create_message_handler(
    options: Option<String>,
) -> std::result::Result<MessageHandler, HandlerError> {
    let builder = match options {
        Some(json) => ClientBuilder::from_json(&json)?,
        None => ClientBuilder::new(),
    };
    let client = builder.finish().await?;
    MessageHandler::new(client)
}

impl MessageHandler {
    pub fn new(client: Client) -> std::result::Result<Self, HandlerError> {
        Ok(Self {
            client,
            metrics: Arc::new(HandlerMetrics::new()?),
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn metrics(&self) -> &HandlerMetrics {
        &self.metrics
    }

    /// Handles one JSON message and returns the JSON response. Never fails:
    /// malformed input becomes a `ValidationError` response.
    pub async fn handle(&self, message: &str) -> String {
        let response = match serde_json::from_str::<Message>(message) {
            Ok(message) => self.send_message(message).await,
            Err(e) => Response::Error(ErrorResponse::from(&Error::Validation(format!(
                "malformed message: {}",
                redact(&e)
            )))),
        };
        serde_json::to_string(&response).unwrap_or_else(|_| UNSERIALIZABLE.to_string())
    }

    /// Handles one already-decoded message.
    pub async fn send_message(&self, message: Message) -> Response {
        self.dispatch(&message.name, message.data).await.into()
    }

    /// Runs the command `name` with `data` and returns its JSON result.
    pub async fn dispatch(&self, name: &str, data: Option<Value>) -> Result<Value> {
        let label = Command::lookup(name).unwrap_or("unknown");
        let span = tracing::info_span!("command", request_id = %Uuid::new_v4(), command = label);
        let started = Instant::now();

        let result = async {
            let command = Command::parse(name, data)?;
            self.execute(command).await
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed();
        let _entered = span.enter();
        match &result {
            Ok(_) => debug!(?elapsed, "command succeeded"),
            Err(err) => warn!(?elapsed, kind = %err.kind(), error = %err, "command failed"),
        }
        self.metrics.observe(
            label,
            elapsed.as_secs_f64(),
            result.as_ref().err().map(Error::kind),
        );
        result
    }

    async fn execute(&self, command: Command) -> Result<Value> {
        let client = &self.client;
        match command {
            // -- Output builders -------------------------------------------
            Command::BuildAliasOutput(builder) => {
                to_value(builder.finish_output(&client.get_rent_structure().await?)?)
            }
            Command::BuildBasicOutput(builder) => {
                to_value(builder.finish_output(&client.get_rent_structure().await?)?)
            }
            Command::BuildFoundryOutput(builder) => {
                to_value(builder.finish_output(&client.get_rent_structure().await?)?)
            }
            Command::BuildNftOutput(builder) => {
                to_value(builder.finish_output(&client.get_rent_structure().await?)?)
            }

            // -- Addresses and secret managers -----------------------------
            Command::GenerateAddresses {
                secret_manager,
                options,
            } => {
                let secret_manager = client.secret_manager_from_dto(secret_manager)?;
                to_value(client.generate_addresses(&secret_manager, &options).await?)
            }
            Command::GetLedgerNanoStatus { is_simulator } => {
                to_value(client.get_ledger_nano_status(is_simulator).await?)
            }
            Command::StoreMnemonic {
                secret_manager,
                mnemonic,
            } => {
                let mnemonic = Zeroizing::new(mnemonic);
                let secret_manager = client.secret_manager_from_dto(secret_manager)?;
                client.store_mnemonic(&secret_manager, &mnemonic).await?;
                info!(backend = secret_manager.backend_name(), "mnemonic stored");
                Ok(Value::Null)
            }
            Command::GenerateMnemonic => to_value(generate_mnemonic()),
            Command::MnemonicToHexSeed { mnemonic } => {
                let mnemonic = Zeroizing::new(mnemonic);
                to_value(mnemonic_to_hex_seed(&mnemonic)?)
            }

            // -- Blocks and transactions -----------------------------------
            Command::BuildAndPostBlock {
                secret_manager,
                options,
            } => {
                let secret_manager = secret_manager
                    .map(|dto| client.secret_manager_from_dto(dto))
                    .transpose()?;
                let (block_id, block) = client
                    .build_and_post_block(secret_manager.as_ref(), options.unwrap_or_default())
                    .await?;
                to_value(PostedBlock { block_id, block })
            }
            Command::PrepareTransaction {
                secret_manager,
                options,
            } => {
                let secret_manager = client.secret_manager_from_dto(secret_manager)?;
                let options = options.unwrap_or_default();
                to_value(client.prepare_transaction(&secret_manager, &options).await?)
            }
            Command::SignTransaction {
                secret_manager,
                prepared_transaction_data,
            } => {
                let secret_manager = client.secret_manager_from_dto(secret_manager)?;
                let payload = client
                    .sign_transaction(&secret_manager, &prepared_transaction_data)
                    .await?;
                to_value(Payload::from(payload))
            }
            Command::SubmitPayload { payload } => {
                let (block_id, block) = client.submit_payload(payload).await?;
                to_value(PostedBlock { block_id, block })
            }
            Command::FindInputs { addresses, amount } => {
                to_value(client.find_inputs(&addresses, amount).await?)
            }

            // -- Node pool and network info --------------------------------
            Command::GetNode => to_value(without_auth(client.get_node()?)),
            Command::UnsyncedNodes => to_value(
                client
                    .unsynced_nodes()
                    .into_iter()
                    .map(without_auth)
                    .collect::<Vec<_>>(),
            ),
            Command::GetNetworkInfo => to_value(client.get_network_info().await?),
            Command::GetNetworkId => to_value(client.get_network_id().await?),
            Command::GetBech32Hrp => to_value(client.get_bech32_hrp().await?),
            Command::GetMinPowScore => to_value(client.get_min_pow_score().await?),
            Command::GetTipsInterval => to_value(client.get_tips_interval()),
            Command::GetLocalPow => to_value(client.get_local_pow()),
            Command::GetFallbackToLocalPow => to_value(client.get_fall_back_to_local_pow()),

            // -- Node API --------------------------------------------------
            Command::GetInfo => to_value(client.get_info().await?),
            Command::GetNodeInfo { url, auth } => to_value(client.get_node_info(&url, auth).await?),
            Command::GetHealth { url } => to_value(client.get_health(&url).await?),
            Command::GetTips => to_value(client.get_tips().await?),
            Command::PostBlock { block } => to_value(client.post_block(&block).await?),
            Command::GetBlock { block_id } => to_value(client.get_block(&block_id).await?),
            Command::GetBlockMetadata { block_id } => {
                to_value(client.get_block_metadata(&block_id).await?)
            }
            Command::GetIncludedBlock { transaction_id } => {
                to_value(client.get_included_block(&transaction_id).await?)
            }
            Command::GetOutput { output_id } => to_value(client.get_output(&output_id).await?),
            Command::GetOutputs { output_ids } => to_value(client.get_outputs(&output_ids).await?),
            Command::TryGetOutputs { output_ids } => {
                to_value(client.try_get_outputs(&output_ids).await?)
            }

            // -- Indexer ---------------------------------------------------
            Command::BasicOutputIds {
                address,
                mut query_parameters,
            } => {
                if let Some(address) = address {
                    query_parameters.insert(0, QueryParameter::Address(address));
                }
                to_value(client.basic_output_ids_by(query_parameters).await?)
            }
            Command::AliasOutputIds { query_parameters } => {
                to_value(client.alias_output_ids(query_parameters).await?)
            }
            Command::AliasOutputId { alias_id } => to_value(client.alias_output_id(alias_id).await?),
            Command::NftOutputIds { query_parameters } => {
                to_value(client.nft_output_ids(query_parameters).await?)
            }
            Command::NftOutputId { nft_id } => to_value(client.nft_output_id(nft_id).await?),
            Command::FoundryOutputIds { query_parameters } => {
                to_value(client.foundry_output_ids(query_parameters).await?)
            }
            Command::FoundryOutputId { foundry_id } => {
                to_value(client.foundry_output_id(foundry_id).await?)
            }

            // -- Retry, promote, reattach ----------------------------------
            Command::Retry { block_id } => posted(client.retry(&block_id).await?),
            Command::RetryUntilIncluded {
                block_id,
                interval,
                max_attempts,
            } => {
                let blocks = client
                    .retry_until_included(&block_id, interval, max_attempts)
                    .await?;
                to_value(
                    blocks
                        .into_iter()
                        .map(|(block_id, block)| PostedBlock { block_id, block })
                        .collect::<Vec<_>>(),
                )
            }
            Command::Reattach { block_id } => posted(client.reattach(&block_id).await?),
            Command::ReattachUnchecked { block_id } => {
                posted(client.reattach_unchecked(&block_id).await?)
            }
            Command::Promote { block_id } => posted(client.promote(&block_id).await?),
            Command::PromoteUnchecked { block_id } => {
                posted(client.promote_unchecked(&block_id).await?)
            }

            // -- Utilities -------------------------------------------------
            Command::Bech32ToHex { bech32 } => to_value(bech32_to_hex(&bech32)?),
            Command::HexToBech32 { hex, bech32_hrp } => {
                to_value(client.hex_to_bech32(&hex, bech32_hrp.as_deref()).await?)
            }
            Command::HexPublicKeyToBech32Address { hex, bech32_hrp } => to_value(
                client
                    .hex_public_key_to_bech32_address(&hex, bech32_hrp.as_deref())
                    .await?,
            ),
            Command::ParseBech32Address { address } => {
                to_value(client.parse_bech32_address(&address).await?)
            }
            Command::IsAddressValid { address } => to_value(is_address_valid(&address)),
            Command::BlockId { block } => to_value(block_id(&block)),
        }
    }
}

impl std::fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandler")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

fn to_value<T: Serialize>(value: T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn posted((block_id, block): (BlockId, Block)) -> Result<Value> {
    to_value(PostedBlock { block_id, block })
}

/// Node credentials stay inside the client.
fn without_auth(node: Node) -> Node {
    Node { auth: None, ..node }
}
