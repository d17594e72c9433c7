//! The handler as a binding sees it: JSON in, JSON out.

use std::sync::Arc;

use serde_json::{json, Value};

use iota_client::address::{Address, Ed25519Address};
use iota_client::block::id::{BlockId, NftId, OutputId, TransactionId};
use iota_client::block::output::{NftOutputBuilder, UnlockCondition};
use iota_client::block::payload::Payload;
use iota_client::block::Block;
use iota_client::config::ClientConfig;
use iota_client::secret::{GenerateAddressesOptions, SecretManager, SecretManagerDto};
use iota_client::testing::{MockLedgerTransport, MockNode};
use iota_client::{ClientBuilder, ErrorKind};
use iota_message_handler::{create_message_handler, MessageHandler, Response};

const MNEMONIC: &str = "acoustic trophy damage hint search taste love bicycle foster cradle brown govern endless depend situate athlete pudding blame question genius transfer van random vast";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

async fn setup() -> (Arc<MockNode>, MessageHandler) {
    let node = Arc::new(MockNode::new("testnet"));
    let client = ClientBuilder::new()
        .with_node("http://mock.node")
        .unwrap()
        .with_node_api(node.clone())
        .with_ledger_transport(Arc::new(MockLedgerTransport::new(MNEMONIC).unwrap()))
        .finish()
        .await
        .unwrap();
    (node, MessageHandler::new(client).unwrap())
}

async fn call(handler: &MessageHandler, message: Value) -> Value {
    let response = handler.handle(&message.to_string()).await;
    serde_json::from_str(&response).unwrap()
}

async fn ok(handler: &MessageHandler, message: Value) -> Value {
    let response = call(handler, message.clone()).await;
    match response.get("result") {
        Some(result) => result.clone(),
        None => panic!("{message} failed: {response}"),
    }
}

async fn error_kind(handler: &MessageHandler, message: Value) -> String {
    let response = call(handler, message.clone()).await;
    match response["error"]["kind"].as_str() {
        Some(kind) => kind.to_string(),
        None => panic!("{message} unexpectedly succeeded: {response}"),
    }
}

fn mnemonic_dto() -> Value {
    json!({ "Mnemonic": MNEMONIC })
}

async fn first_address() -> Address {
    let manager = SecretManager::try_from(SecretManagerDto::Mnemonic(MNEMONIC.into())).unwrap();
    let options = GenerateAddressesOptions::default().with_range(0..1);
    Address::Ed25519(manager.generate_ed25519_addresses(&options).await.unwrap()[0])
}

fn recipient() -> Address {
    Address::Ed25519(Ed25519Address([7; 32]))
}

fn payment(amount: u64) -> Value {
    json!({
        "type": "basic",
        "amount": amount,
        "unlockConditions": [{ "type": "address", "address": recipient() }]
    })
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_command_is_reported_before_its_data() {
    let (_, handler) = setup().await;
    let response = call(&handler, json!({ "name": "GetNodes", "data": 12 })).await;
    assert_eq!(response["error"]["kind"], "UnknownCommandError");
    assert_eq!(response["error"]["message"], "unknown command: GetNodes");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let (_, handler) = setup().await;
    let response: Value = serde_json::from_str(&handler.handle("{not json").await).unwrap();
    assert_eq!(response["error"]["kind"], "ValidationError");
}

#[tokio::test]
async fn command_and_payload_keys_are_accepted() {
    let (_, handler) = setup().await;
    let result = ok(
        &handler,
        json!({ "command": "IsAddressValid", "payload": { "address": "rms1invalid" } }),
    )
    .await;
    assert_eq!(result, json!(false));
}

#[tokio::test]
async fn typed_dispatch_matches_the_json_path() {
    let (_, handler) = setup().await;
    let typed = handler.dispatch("GetBech32Hrp", None).await.unwrap();
    assert_eq!(typed, json!("rms"));

    let err = handler.dispatch("Nope", None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownCommandError);
}

// ---------------------------------------------------------------------------
// Network info and nodes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn network_info_accessors_agree() {
    let (node, handler) = setup().await;
    let info = ok(&handler, json!({ "name": "GetNetworkInfo" })).await;
    assert_eq!(info["networkName"], "testnet");
    assert_eq!(info["bech32Hrp"], "rms");

    let hrp = ok(&handler, json!({ "name": "GetBech32Hrp" })).await;
    assert_eq!(hrp, info["bech32Hrp"]);
    let score = ok(&handler, json!({ "name": "GetMinPowScore" })).await;
    assert_eq!(score, json!(node.parameters().min_pow_score));
    assert_eq!(ok(&handler, json!({ "name": "GetLocalPow" })).await, json!(true));
    assert_eq!(ok(&handler, json!({ "name": "GetTipsInterval" })).await, json!(5));
    assert!(ok(&handler, json!({ "name": "GetNetworkId" })).await.is_u64());
}

#[tokio::test]
async fn node_pool_commands() {
    let (node, handler) = setup().await;
    let current = ok(&handler, json!({ "name": "GetNode" })).await;
    assert_eq!(current["url"], "http://mock.node");
    assert_eq!(ok(&handler, json!({ "name": "UnsyncedNodes" })).await, json!([]));

    // The failing request marks the only node unsynced.
    node.set_offline("http://mock.node", true);
    assert_eq!(
        error_kind(&handler, json!({ "name": "GetInfo" })).await,
        "NetworkError"
    );
    assert_eq!(
        error_kind(&handler, json!({ "name": "GetNode" })).await,
        "NoSyncedNodeError"
    );
    let unsynced = ok(&handler, json!({ "name": "UnsyncedNodes" })).await;
    assert_eq!(unsynced[0]["url"], "http://mock.node");
}

#[tokio::test]
async fn offline_handler_serves_configured_parameters() {
    let config = ClientConfig {
        protocol_parameters: Some(MockNode::new("offline-net").parameters().clone()),
        ..ClientConfig::default()
    };
    let handler = create_message_handler(Some(serde_json::to_string(&config).unwrap()))
        .await
        .unwrap();

    let info = ok(&handler, json!({ "name": "GetNetworkInfo" })).await;
    assert_eq!(info["networkName"], "offline-net");
    assert_eq!(
        error_kind(&handler, json!({ "name": "GetNode" })).await,
        "NoSyncedNodeError"
    );
}

#[tokio::test]
async fn bad_client_options_are_rejected() {
    let err = create_message_handler(Some(r#"{"localPow": "yes"}"#.into()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid client options"));
}

// ---------------------------------------------------------------------------
// Outputs and addresses
// ---------------------------------------------------------------------------

#[tokio::test]
async fn basic_output_keeps_its_unlock_condition() {
    let (_, handler) = setup().await;
    let condition = json!({ "type": "address", "address": recipient() });
    let output = ok(
        &handler,
        json!({
            "name": "BuildBasicOutput",
            "data": { "amount": 1_000_000, "unlockConditions": [condition.clone()], "nativeTokens": null }
        }),
    )
    .await;
    assert_eq!(output["type"], "basic");
    assert_eq!(output["amount"], json!(1_000_000));
    assert_eq!(output["nativeTokens"], json!([]));
    assert_eq!(output["unlockConditions"], json!([condition]));
}

#[tokio::test]
async fn basic_output_without_amount_gets_the_minimum_deposit() {
    let (_, handler) = setup().await;
    let output = ok(
        &handler,
        json!({
            "name": "BuildBasicOutput",
            "data": { "unlockConditions": [{ "type": "address", "address": recipient() }] }
        }),
    )
    .await;
    assert!(output["amount"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn output_without_unlock_condition_is_invalid() {
    let (_, handler) = setup().await;
    let kind = error_kind(
        &handler,
        json!({ "name": "BuildBasicOutput", "data": { "amount": 1_000_000 } }),
    )
    .await;
    assert_eq!(kind, "ValidationError");
}

#[tokio::test]
async fn chain_outputs_need_their_id() {
    let (_, handler) = setup().await;
    let owner = json!({ "type": "address", "address": recipient() });
    let controllers = json!([
        { "type": "stateControllerAddress", "address": recipient() },
        { "type": "governorAddress", "address": recipient() }
    ]);
    let alias = json!({ "type": "alias", "aliasId": format!("0x{}", "01".repeat(32)) });
    let scheme = json!({ "type": "simple", "mintedTokens": "0", "meltedTokens": "0", "maximumSupply": "100" });

    for (name, data) in [
        ("BuildNftOutput", json!({ "unlockConditions": [owner.clone()] })),
        ("BuildAliasOutput", json!({ "unlockConditions": controllers.clone() })),
        (
            "BuildFoundryOutput",
            json!({
                "tokenScheme": scheme.clone(),
                "unlockConditions": [{ "type": "immutableAliasAddress", "address": alias.clone() }]
            }),
        ),
    ] {
        let response = call(&handler, json!({ "name": name, "data": data })).await;
        assert_eq!(response["error"]["kind"], "ValidationError", "{name}: {response}");
        assert!(
            response["error"]["message"].as_str().unwrap().contains("is missing"),
            "{name}: {response}"
        );
    }

    let minted = ok(
        &handler,
        json!({
            "name": "BuildNftOutput",
            "data": { "nftId": format!("0x{}", "00".repeat(32)), "unlockConditions": [owner] }
        }),
    )
    .await;
    assert_eq!(minted["type"], "nft");
}

#[tokio::test]
async fn foundry_accepts_snake_case_keys() {
    let (_, handler) = setup().await;
    let output = ok(
        &handler,
        json!({
            "name": "BuildFoundryOutput",
            "data": {
                "serial_number": 5,
                "token_scheme": { "type": "simple", "mintedTokens": "0x0", "meltedTokens": "0x0", "maximumSupply": "0x64" },
                "unlock_conditions": [{
                    "type": "immutableAliasAddress",
                    "address": { "type": "alias", "aliasId": format!("0x{}", "01".repeat(32)) }
                }]
            }
        }),
    )
    .await;
    assert_eq!(output["serialNumber"], 5);
    assert_eq!(output["tokenScheme"]["maximumSupply"], "100");
}

#[tokio::test]
async fn generated_addresses_are_deterministic() {
    let (_, handler) = setup().await;
    let message = json!({
        "name": "GenerateAddresses",
        "data": {
            "secretManager": mnemonic_dto(),
            "options": { "accountIndex": 0, "range": { "start": 0, "end": 2 } }
        }
    });
    let first = ok(&handler, message.clone()).await;
    let second = ok(&handler, message).await;
    let addresses = first.as_array().unwrap();
    assert_eq!(addresses.len(), 2);
    assert!(addresses[0].as_str().unwrap().starts_with("rms1"));
    assert_eq!(first, second);

    let bech32 = addresses[0].as_str().unwrap();
    let hex = ok(&handler, json!({ "name": "Bech32ToHex", "data": { "bech32": bech32 } })).await;
    let back = ok(&handler, json!({ "name": "HexToBech32", "data": { "hex": hex } })).await;
    assert_eq!(back, json!(bech32));
}

#[tokio::test]
async fn mnemonic_utilities() {
    let (_, handler) = setup().await;
    let mnemonic = ok(&handler, json!({ "name": "GenerateMnemonic" })).await;
    assert_eq!(mnemonic.as_str().unwrap().split(' ').count(), 24);

    let seed = ok(
        &handler,
        json!({ "name": "MnemonicToHexSeed", "data": { "mnemonic": mnemonic } }),
    )
    .await;
    assert_eq!(seed.as_str().unwrap().len(), 2 + 128);

    let response = call(
        &handler,
        json!({ "name": "MnemonicToHexSeed", "data": { "mnemonic": "not a real phrase" } }),
    )
    .await;
    assert_eq!(response["error"]["kind"], "ValidationError");
    assert!(!response.to_string().contains("not a real phrase"));
}

// ---------------------------------------------------------------------------
// Secret managers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn store_mnemonic_needs_a_vault() {
    let (_, handler) = setup().await;
    let kind = error_kind(
        &handler,
        json!({ "name": "StoreMnemonic", "data": { "secretManager": mnemonic_dto(), "mnemonic": MNEMONIC } }),
    )
    .await;
    assert_eq!(kind, "UnsupportedBackendError");
}

#[tokio::test]
async fn store_mnemonic_in_a_vault() {
    let (_, handler) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let vault = json!({
        "Stronghold": {
            "password": "some password",
            "snapshotPath": dir.path().join("handler.vault").to_string_lossy()
        }
    });
    let stored = ok(
        &handler,
        json!({ "name": "StoreMnemonic", "data": { "secretManager": vault.clone(), "mnemonic": MNEMONIC } }),
    )
    .await;
    assert_eq!(stored, Value::Null);

    let range = json!({ "range": { "start": 0, "end": 1 } });
    let from_vault = ok(
        &handler,
        json!({ "name": "GenerateAddresses", "data": { "secretManager": vault, "options": range.clone() } }),
    )
    .await;
    let from_mnemonic = ok(
        &handler,
        json!({ "name": "GenerateAddresses", "data": { "secretManager": mnemonic_dto(), "options": range } }),
    )
    .await;
    assert_eq!(from_vault, from_mnemonic);
}

#[tokio::test]
async fn one_vault_serves_concurrent_commands() {
    let (_, handler) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let vault = json!({
        "Stronghold": {
            "password": "some password",
            "snapshotPath": dir.path().join("shared.vault").to_string_lossy()
        }
    });
    ok(
        &handler,
        json!({ "name": "StoreMnemonic", "data": { "secretManager": vault.clone(), "mnemonic": MNEMONIC } }),
    )
    .await;

    let message = json!({
        "name": "GenerateAddresses",
        "data": { "secretManager": vault, "options": { "range": { "start": 0, "end": 1 } } }
    });
    let (a, b, c, d) = tokio::join!(
        call(&handler, message.clone()),
        call(&handler, message.clone()),
        call(&handler, message.clone()),
        call(&handler, message)
    );
    for response in [&a, &b, &c, &d] {
        assert!(response.get("result").is_some(), "{response}");
    }
    assert_eq!(a["result"], d["result"]);
}

#[tokio::test]
async fn ledger_status_through_the_handler() {
    let (_, handler) = setup().await;
    let status = ok(
        &handler,
        json!({ "name": "GetLedgerNanoStatus", "data": { "isSimulator": true } }),
    )
    .await;
    assert_eq!(status["connected"], true);
    assert_eq!(status["locked"], false);

    let kind = error_kind(
        &handler,
        json!({ "name": "GetLedgerNanoStatus", "data": { "isSimulator": false } }),
    )
    .await;
    assert_eq!(kind, "DeviceUnavailableError");
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn prepare_sign_submit() {
    let (node, handler) = setup().await;
    let owner = first_address().await;
    node.fund(owner, 3_000_000);

    let prepared = ok(
        &handler,
        json!({
            "name": "PrepareTransaction",
            "data": { "secretManager": mnemonic_dto(), "options": { "outputs": [payment(1_000_000)] } }
        }),
    )
    .await;
    assert_eq!(prepared["inputsData"].as_array().unwrap().len(), 1);

    let payload = ok(
        &handler,
        json!({
            "name": "SignTransaction",
            "data": { "secretManager": mnemonic_dto(), "preparedTransactionData": prepared }
        }),
    )
    .await;
    assert_eq!(payload["type"], "transaction");

    let posted = ok(
        &handler,
        json!({ "name": "SubmitPayload", "data": { "payload": payload } }),
    )
    .await;
    let block_id = ok(
        &handler,
        json!({ "name": "BlockId", "data": { "block": posted["block"] } }),
    )
    .await;
    assert_eq!(block_id, posted["blockId"]);
    assert_eq!(node.balance(&recipient()), 1_000_000);
    assert_eq!(node.balance(&owner), 2_000_000);
}

#[tokio::test]
async fn spending_the_same_input_twice_is_rejected() {
    let (node, handler) = setup().await;
    node.fund(first_address().await, 2_000_000);

    let mut payloads = Vec::new();
    for amount in [1_000_000u64, 1_500_000] {
        let prepared = ok(
            &handler,
            json!({
                "name": "PrepareTransaction",
                "data": { "secretManager": mnemonic_dto(), "options": { "outputs": [payment(amount)] } }
            }),
        )
        .await;
        payloads.push(
            ok(
                &handler,
                json!({
                    "name": "SignTransaction",
                    "data": { "secretManager": mnemonic_dto(), "preparedTransactionData": prepared }
                }),
            )
            .await,
        );
    }

    ok(
        &handler,
        json!({ "name": "SubmitPayload", "data": { "payload": payloads[0] } }),
    )
    .await;
    let kind = error_kind(
        &handler,
        json!({ "name": "SubmitPayload", "data": { "payload": payloads[1] } }),
    )
    .await;
    assert_eq!(kind, "PostRejectedError");
    assert_eq!(node.balance(&recipient()), 1_000_000);
}

#[tokio::test]
async fn build_and_post_block_in_one_call() {
    let (node, handler) = setup().await;
    node.fund(first_address().await, 2_000_000);

    let posted = ok(
        &handler,
        json!({
            "name": "BuildAndPostBlock",
            "data": { "secretManager": mnemonic_dto(), "options": { "outputs": [payment(2_000_000)] } }
        }),
    )
    .await;
    assert_eq!(posted["block"]["payload"]["type"], "transaction");
    assert_eq!(node.balance(&recipient()), 2_000_000);

    let fetched = ok(
        &handler,
        json!({ "name": "GetBlock", "data": { "blockId": posted["blockId"] } }),
    )
    .await;
    assert_eq!(fetched, posted["block"]);
}

#[tokio::test]
async fn tagged_data_block_without_secret_manager() {
    let (node, handler) = setup().await;
    let posted = ok(
        &handler,
        json!({
            "name": "BuildAndPostBlock",
            "data": { "secretManager": null, "options": { "tag": "0x7461672d31", "data": "0x00ff" } }
        }),
    )
    .await;
    assert_eq!(posted["block"]["payload"]["type"], "taggedData");
    assert_eq!(node.posted_blocks(), 1);
}

#[tokio::test]
async fn find_inputs_for_offline_signing() {
    let (node, handler) = setup().await;
    let owner = first_address().await;
    let funded = node.fund(owner, 4_000_000);
    let bech32 = owner.to_bech32("rms").unwrap();

    let inputs = ok(
        &handler,
        json!({ "name": "FindInputs", "data": { "addresses": [bech32.clone()], "amount": 1_000_000 } }),
    )
    .await;
    assert_eq!(inputs.as_array().unwrap().len(), 1);

    let ids = ok(
        &handler,
        json!({ "name": "BasicOutputIds", "data": { "address": bech32 } }),
    )
    .await;
    assert_eq!(ids, json!([funded]));

    let kind = error_kind(
        &handler,
        json!({ "name": "FindInputs", "data": { "addresses": [owner.to_bech32("rms").unwrap()], "amount": 9_000_000 } }),
    )
    .await;
    assert_eq!(kind, "InsufficientFundsError");
}

// ---------------------------------------------------------------------------
// Inclusion and indexer
// ---------------------------------------------------------------------------

async fn post_tagged(handler: &MessageHandler) -> (BlockId, Value) {
    let posted = ok(
        handler,
        json!({ "name": "BuildAndPostBlock", "data": { "options": { "tag": "0x6869", "data": "0x00" } } }),
    )
    .await;
    let block_id = posted["blockId"].as_str().unwrap().parse().unwrap();
    (block_id, posted)
}

#[tokio::test]
async fn promote_and_wait_for_inclusion() {
    let (node, handler) = setup().await;
    let (block_id, posted) = post_tagged(&handler).await;

    let metadata = ok(&handler, json!({ "name": "GetBlockMetadata", "data": { "blockId": block_id } })).await;
    assert_eq!(metadata["isSolid"], true);
    assert!(metadata.get("ledgerInclusionState").is_none());

    let kind = error_kind(&handler, json!({ "name": "Promote", "data": { "blockId": block_id } })).await;
    assert_eq!(kind, "ValidationError");

    node.mark_lazy(&block_id);
    let promotion = ok(&handler, json!({ "name": "Promote", "data": { "blockId": block_id } })).await;
    assert!(promotion["block"]["parents"]
        .as_array()
        .unwrap()
        .contains(&json!(block_id.to_string())));

    let kind = error_kind(
        &handler,
        json!({ "name": "RetryUntilIncluded", "data": { "blockId": block_id, "interval": 0, "maxAttempts": 1 } }),
    )
    .await;
    assert_eq!(kind, "TimeoutError");

    node.include(&block_id);
    let included = ok(
        &handler,
        json!({ "name": "RetryUntilIncluded", "data": { "blockId": block_id, "interval": 0, "maxAttempts": null } }),
    )
    .await;
    assert_eq!(included, json!([posted]));
}

#[tokio::test]
async fn reattach_through_the_handler() {
    let (node, handler) = setup().await;
    let (block_id, posted) = post_tagged(&handler).await;
    node.mark_stale(&block_id);

    let reattached = ok(&handler, json!({ "name": "Retry", "data": { "blockId": block_id } })).await;
    assert_ne!(reattached["blockId"], posted["blockId"]);
    assert_eq!(reattached["block"]["payload"], posted["block"]["payload"]);

    let again = ok(&handler, json!({ "name": "ReattachUnchecked", "data": { "blockId": block_id } })).await;
    assert_eq!(again["block"]["payload"], posted["block"]["payload"]);
}

#[tokio::test]
async fn included_block_of_a_transaction() {
    let (node, handler) = setup().await;
    node.fund(first_address().await, 2_000_000);
    let posted = ok(
        &handler,
        json!({
            "name": "BuildAndPostBlock",
            "data": { "secretManager": mnemonic_dto(), "options": { "outputs": [payment(2_000_000)] } }
        }),
    )
    .await;
    let block: Block = serde_json::from_value(posted["block"].clone()).unwrap();
    let Some(Payload::Transaction(transaction)) = block.payload() else {
        panic!("expected a transaction");
    };
    let data = json!({ "transactionId": transaction.id() });

    let kind = error_kind(&handler, json!({ "name": "GetIncludedBlock", "data": data })).await;
    assert_eq!(kind, "ValidationError");

    node.include(&block.id());
    let included = ok(&handler, json!({ "name": "GetIncludedBlock", "data": data })).await;
    assert_eq!(included, posted["block"]);
}

#[tokio::test]
async fn indexer_commands() {
    let (node, handler) = setup().await;
    let owner = first_address().await;
    let bech32 = owner.to_bech32("rms").unwrap();
    let nft = NftOutputBuilder::new_with_amount(300_000, NftId([2; 32]))
        .add_unlock_condition(UnlockCondition::Address { address: owner })
        .finish()
        .unwrap();
    let nft_output = node.add_output(nft.into());
    let basic_output = node.fund(owner, 1_000_000);

    let ids = ok(
        &handler,
        json!({ "name": "NftOutputIds", "data": { "queryParameters": [{ "address": bech32 }] } }),
    )
    .await;
    assert_eq!(ids, json!([nft_output]));

    let ids = ok(
        &handler,
        json!({ "name": "BasicOutputIds", "data": { "queryParameters": [{ "address": bech32 }, { "hasNativeTokens": false }] } }),
    )
    .await;
    assert_eq!(ids, json!([basic_output]));

    let id = ok(&handler, json!({ "name": "NftOutputId", "data": { "nftId": NftId([2; 32]) } })).await;
    assert_eq!(id, json!(nft_output));

    let kind = error_kind(
        &handler,
        json!({ "name": "FoundryOutputIds", "data": { "queryParameters": [{ "tag": "0x01" }] } }),
    )
    .await;
    assert_eq!(kind, "ValidationError");

    let missing = OutputId::new(TransactionId([1; 32]), 0);
    let outputs = ok(
        &handler,
        json!({ "name": "TryGetOutputs", "data": { "outputIds": [missing, basic_output] } }),
    )
    .await;
    assert_eq!(outputs.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn node_info_of_any_url() {
    let (_, handler) = setup().await;
    let info = ok(
        &handler,
        json!({ "name": "GetNodeInfo", "data": { "url": "http://other.node", "auth": { "jwt": "token" } } }),
    )
    .await;
    assert_eq!(info["protocol"]["networkName"], "testnet");
    assert!(info.get("url").is_none());
}

// ---------------------------------------------------------------------------
// Concurrency and metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn clones_share_one_client() {
    let (_, handler) = setup().await;
    let other = handler.clone();
    let (a, b) = tokio::join!(
        handler.dispatch("GetNetworkInfo", None),
        other.dispatch("GetNetworkInfo", None),
    );
    assert_eq!(a.unwrap(), b.unwrap());
}

#[tokio::test]
async fn concurrent_ledger_commands_are_refused() {
    let node = Arc::new(MockNode::new("testnet"));
    let transport = MockLedgerTransport::new(MNEMONIC)
        .unwrap()
        .with_delay(std::time::Duration::from_millis(100));
    let client = ClientBuilder::new()
        .with_node("http://mock.node")
        .unwrap()
        .with_node_api(node)
        .with_ledger_transport(Arc::new(transport))
        .finish()
        .await
        .unwrap();
    let handler = MessageHandler::new(client).unwrap();

    let message = json!({
        "name": "GenerateAddresses",
        "data": { "secretManager": { "LedgerNano": true }, "options": { "range": { "start": 0, "end": 2 } } }
    });
    let (first, second) = tokio::join!(call(&handler, message.clone()), call(&handler, message));
    assert!(first.get("result").is_some());
    assert_eq!(second["error"]["kind"], "DeviceBusyError");
}

#[tokio::test]
async fn commands_are_counted() {
    let (_, handler) = setup().await;
    ok(&handler, json!({ "name": "GetBech32Hrp" })).await;
    call(&handler, json!({ "name": "Unheard" })).await;

    let metrics = handler.metrics();
    assert_eq!(metrics.commands_total.with_label_values(&["GetBech32Hrp"]).get(), 1);
    assert_eq!(metrics.commands_total.with_label_values(&["unknown"]).get(), 1);
    assert_eq!(
        metrics
            .command_errors_total
            .with_label_values(&["UnknownCommandError"])
            .get(),
        1
    );
    assert!(metrics.encode().unwrap().contains("iota_command_duration_seconds"));
}

#[tokio::test]
async fn responses_round_trip_as_typed_values() {
    let (_, handler) = setup().await;
    let response: Response =
        serde_json::from_str(&handler.handle(r#"{"name": "GetLocalPow"}"#).await).unwrap();
    assert_eq!(response, Response::Result(json!(true)));
}
