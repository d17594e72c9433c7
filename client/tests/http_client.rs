//! The REST transport against a mock HTTP node.

use std::time::Duration;

use mockito::{Matcher, Server};
use serde_json::json;

use iota_client::block::id::{BlockId, NftId, OutputId};
use iota_client::node_manager::api::{
    ChainId, LedgerInclusionState, NodeApi, OutputKind, OutputQuery, QueryParameter,
};
use iota_client::node_manager::http_client::HttpNodeClient;
use iota_client::node_manager::node::{Node, NodeAuth};
use iota_client::{Client, Error, ErrorKind};

const TIMEOUT: Duration = Duration::from_secs(5);

fn info_body(network: &str) -> String {
    json!({
        "name": "HORNET",
        "version": "2.0.0",
        "status": { "isHealthy": true, "latestMilestoneIndex": 42 },
        "protocol": {
            "version": 2,
            "networkName": network,
            "bech32Hrp": "rms",
            "minPowScore": 1500,
            "rentStructure": { "vByteCost": 100, "vByteFactorKey": 10, "vByteFactorData": 1 },
            "tokenSupply": "1813620509061365"
        },
        "features": []
    })
    .to_string()
}

#[tokio::test]
async fn info_is_parsed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/core/v2/info")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(info_body("testnet"))
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap();
    let info = HttpNodeClient::new().get_info(&node, TIMEOUT).await.unwrap();
    assert_eq!(info.protocol.network_name, "testnet");
    assert_eq!(info.status.latest_milestone_index, Some(42));
    mock.assert_async().await;
}

#[tokio::test]
async fn jwt_is_sent_as_bearer() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/core/v2/tips")
        .match_header("authorization", "Bearer secret-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "tips": [format!("0x{}", "11".repeat(32))] }).to_string())
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap().with_auth(NodeAuth {
        jwt: Some("secret-token".into()),
        basic_auth_name_pwd: None,
    });
    let tips = HttpNodeClient::new().get_tips(&node, TIMEOUT).await.unwrap();
    assert_eq!(tips.len(), 1);
    mock.assert_async().await;
}

#[tokio::test]
async fn error_status_becomes_a_response_error() {
    let mut server = Server::new_async().await;
    let output_id = OutputId::new(Default::default(), 0);
    server
        .mock("GET", format!("/api/core/v2/outputs/{output_id}").as_str())
        .with_status(404)
        .with_body("output not found")
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap();
    let err = HttpNodeClient::new()
        .get_output(&node, &output_id, TIMEOUT)
        .await
        .unwrap_err();
    match err {
        Error::Response { code, text, .. } => {
            assert_eq!(code, 404);
            assert_eq!(text, "output not found");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn indexer_pages_are_followed() {
    let mut server = Server::new_async().await;
    let address = "rms1qzx";
    let first = OutputId::new(Default::default(), 1);
    let second = OutputId::new(Default::default(), 2);
    server
        .mock("GET", "/api/indexer/v1/outputs/basic")
        .match_query(Matcher::Exact(format!("address={address}")))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [first.to_string()], "cursor": "page2" }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/api/indexer/v1/outputs/basic")
        .match_query(Matcher::Exact(format!("address={address}&cursor=page2")))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [second.to_string()] }).to_string())
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap();
    let ids = HttpNodeClient::new()
        .output_ids(&node, &OutputQuery::basic_by_address(address), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(ids, vec![first, second]);
}

#[tokio::test]
async fn nft_query_carries_every_filter() {
    let mut server = Server::new_async().await;
    let id = OutputId::new(Default::default(), 3);
    let mock = server
        .mock("GET", "/api/indexer/v1/outputs/nft")
        .match_query(Matcher::Exact("issuer=rms1qis&hasNativeTokens=false".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [id.to_string()] }).to_string())
        .create_async()
        .await;

    let query = OutputQuery::new(
        OutputKind::Nft,
        vec![
            QueryParameter::Issuer("rms1qis".into()),
            QueryParameter::HasNativeTokens(false),
        ],
    )
    .unwrap();
    let node = Node::new(&server.url()).unwrap();
    let ids = HttpNodeClient::new().output_ids(&node, &query, TIMEOUT).await.unwrap();
    assert_eq!(ids, vec![id]);
    mock.assert_async().await;
}

#[tokio::test]
async fn chain_lookup_takes_the_first_item() {
    let mut server = Server::new_async().await;
    let nft_id = NftId([5; 32]);
    let id = OutputId::new(Default::default(), 4);
    server
        .mock("GET", format!("/api/indexer/v1/outputs/nft/{nft_id}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [id.to_string()] }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", format!("/api/indexer/v1/outputs/nft/{}", NftId([6; 32])).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "items": [] }).to_string())
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap();
    let api = HttpNodeClient::new();
    assert_eq!(api.chain_output_id(&node, &ChainId::Nft(nft_id), TIMEOUT).await.unwrap(), id);
    let err = api
        .chain_output_id(&node, &ChainId::Nft(NftId([6; 32])), TIMEOUT)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

#[tokio::test]
async fn block_metadata_is_parsed() {
    let mut server = Server::new_async().await;
    let block_id = BlockId([1; 32]);
    server
        .mock("GET", format!("/api/core/v2/blocks/{block_id}/metadata").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "blockId": block_id.to_string(),
                "parents": [BlockId([2; 32]).to_string()],
                "isSolid": true,
                "referencedByMilestoneIndex": 12,
                "ledgerInclusionState": "included"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap();
    let metadata = HttpNodeClient::new()
        .get_block_metadata(&node, &block_id, TIMEOUT)
        .await
        .unwrap();
    assert_eq!(metadata.ledger_inclusion_state, Some(LedgerInclusionState::Included));
    assert!(metadata.is_included());
}

#[tokio::test]
async fn missing_resource_is_not_retryable() {
    let mut server = Server::new_async().await;
    let block_id = BlockId([3; 32]);
    server
        .mock("GET", format!("/api/core/v2/blocks/{block_id}").as_str())
        .with_status(404)
        .create_async()
        .await;
    server
        .mock("GET", format!("/api/core/v2/blocks/{block_id}/metadata").as_str())
        .with_status(503)
        .create_async()
        .await;

    let node = Node::new(&server.url()).unwrap();
    let api = HttpNodeClient::new();
    let missing = api.get_block(&node, &block_id, TIMEOUT).await.unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::ValidationError);
    let overloaded = api.get_block_metadata(&node, &block_id, TIMEOUT).await.unwrap_err();
    assert_eq!(overloaded.kind(), ErrorKind::NetworkError);
}

#[tokio::test]
async fn slow_node_reports_the_configured_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let held = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(socket);
    });

    let timeout = Duration::from_millis(200);
    let node = Node::new(&url).unwrap();
    let err = HttpNodeClient::new().get_tips(&node, timeout).await.unwrap_err();
    assert!(matches!(err, Error::Timeout(t) if t == timeout), "{err:?}");
    held.abort();
}

#[tokio::test]
async fn unhealthy_node_reports_false() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/health")
        .with_status(503)
        .create_async()
        .await;
    let client = Client::builder().with_node_sync_disabled().finish().await.unwrap();
    assert!(!client.get_health(&server.url()).await.unwrap());
}

#[tokio::test]
async fn failover_skips_a_broken_node() {
    let mut broken = Server::new_async().await;
    broken
        .mock("GET", "/api/core/v2/info")
        .with_status(500)
        .expect_at_least(1)
        .create_async()
        .await;
    let mut healthy = Server::new_async().await;
    healthy
        .mock("GET", "/api/core/v2/info")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(info_body("testnet"))
        .expect_at_least(1)
        .create_async()
        .await;

    let client = Client::builder()
        .with_node(&broken.url())
        .unwrap()
        .with_node(&healthy.url())
        .unwrap()
        .with_node_sync_disabled()
        .finish()
        .await
        .unwrap();

    for _ in 0..3 {
        let info = client.get_info().await.unwrap();
        assert_eq!(info.url, healthy.url().trim_end_matches('/'));
    }
}

#[tokio::test]
async fn unreachable_node_is_a_network_error() {
    let node = Node::new("http://127.0.0.1:1").unwrap();
    let err = HttpNodeClient::new()
        .get_info(&node, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::NetworkError | ErrorKind::TimeoutError
    ));
}
