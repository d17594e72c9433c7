//! Block inclusion, promotion, reattachment and indexer queries against the
//! in-memory node.

use std::sync::Arc;

use iota_client::address::{Address, AliasAddress, Ed25519Address};
use iota_client::api::{BlockOptions, TransactionPipeline};
use iota_client::block::id::{AliasId, BlockId, NftId, OutputId, TransactionId};
use iota_client::block::output::{
    AliasOutputBuilder, BasicOutputBuilder, Feature, FoundryOutputBuilder, NftOutputBuilder, Output,
    SimpleTokenScheme, TokenScheme, UnlockCondition,
};
use iota_client::block::payload::Payload;
use iota_client::node_manager::api::{LedgerInclusionState, QueryParameter};
use iota_client::secret::{GenerateAddressesOptions, SecretManager};
use iota_client::testing::MockNode;
use iota_client::{Client, ClientBuilder, Error, ErrorKind};

const MNEMONIC: &str = "acoustic trophy damage hint search taste love bicycle foster cradle brown govern endless depend situate athlete pudding blame question genius transfer van random vast";

async fn setup() -> (Arc<MockNode>, Client) {
    let node = Arc::new(MockNode::new("testnet"));
    let client = ClientBuilder::new()
        .with_node("http://mock.node")
        .unwrap()
        .with_node_api(node.clone())
        .finish()
        .await
        .unwrap();
    (node, client)
}

async fn tagged_block(client: &Client) -> (BlockId, iota_client::block::Block) {
    let options = BlockOptions::default().with_tag(b"retry").with_data(b"payload");
    client.build_and_post_block(None, options).await.unwrap()
}

fn ed25519(byte: u8) -> Address {
    Address::Ed25519(Ed25519Address([byte; 32]))
}

fn bech32(address: Address) -> String {
    address.to_bech32("rms").unwrap()
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metadata_follows_inclusion() {
    let (node, client) = setup().await;
    let (block_id, block) = tagged_block(&client).await;

    let pending = client.get_block_metadata(&block_id).await.unwrap();
    assert!(!pending.is_included());
    assert_eq!(pending.parents, block.parents().iter().copied().collect::<Vec<_>>());
    assert_eq!(pending.should_promote, Some(false));

    node.include(&block_id);
    let included = client.get_block_metadata(&block_id).await.unwrap();
    assert_eq!(included.ledger_inclusion_state, Some(LedgerInclusionState::NoTransaction));
    assert!(included.referenced_by_milestone_index.is_some());
    assert_eq!(included.should_promote, None);
}

#[tokio::test]
async fn unknown_block_metadata_is_not_found() {
    let (_, client) = setup().await;
    let err = client.get_block_metadata(&BlockId([7; 32])).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

// ---------------------------------------------------------------------------
// Promote and reattach
// ---------------------------------------------------------------------------

#[tokio::test]
async fn promotion_approves_the_block() {
    let (node, client) = setup().await;
    let (block_id, _) = tagged_block(&client).await;

    let err = client.promote(&block_id).await.unwrap_err();
    assert!(matches!(err, Error::NoNeedPromoteOrReattach(_)));

    node.mark_lazy(&block_id);
    let (promotion_id, promotion) = client.promote(&block_id).await.unwrap();
    assert!(promotion.payload().is_none());
    assert!(promotion.parents().iter().any(|p| *p == block_id));
    assert_ne!(promotion_id, block_id);
}

#[tokio::test]
async fn reattached_transaction_is_applied_once() {
    let (node, client) = setup().await;
    let secret_manager: SecretManager = format!(r#"{{"Mnemonic": "{MNEMONIC}"}}"#).parse().unwrap();
    let options = GenerateAddressesOptions::default().with_range(0..1);
    let owner = Address::Ed25519(secret_manager.generate_ed25519_addresses(&options).await.unwrap()[0]);
    node.fund(owner, 3_000_000);

    let payment = BasicOutputBuilder::new_with_amount(1_000_000)
        .add_unlock_condition(UnlockCondition::Address { address: ed25519(9) })
        .finish()
        .map(Output::Basic)
        .unwrap();
    let options = BlockOptions::default().with_outputs([payment]);
    let (block_id, block) = TransactionPipeline::new(&client, &secret_manager, options)
        .run()
        .await
        .unwrap();
    let Some(Payload::Transaction(transaction)) = block.payload() else {
        panic!("expected a transaction");
    };

    node.mark_stale(&block_id);
    let (reattached_id, reattached) = client.reattach(&block_id).await.unwrap();
    assert_ne!(reattached_id, block_id);
    assert_eq!(reattached.payload(), block.payload());
    assert_eq!(node.balance(&ed25519(9)), 1_000_000);

    node.include(&reattached_id);
    let included = client.get_included_block(&transaction.id()).await.unwrap();
    assert_eq!(included.id(), reattached_id);

    node.include(&block_id);
    let original = client.get_block_metadata(&block_id).await.unwrap();
    assert_eq!(original.ledger_inclusion_state, Some(LedgerInclusionState::Conflicting));
}

#[tokio::test]
async fn retry_does_what_the_node_asks() {
    let (node, client) = setup().await;
    let (block_id, block) = tagged_block(&client).await;
    assert!(client.retry(&block_id).await.is_err());

    node.mark_stale(&block_id);
    let (_, reattached) = client.retry(&block_id).await.unwrap();
    assert_eq!(reattached.payload(), block.payload());
}

#[tokio::test]
async fn retry_until_included_reports_the_included_attachment_first() {
    let (node, client) = setup().await;
    let (block_id, block) = tagged_block(&client).await;
    node.mark_stale(&block_id);
    node.set_auto_include(true);

    let blocks = client.retry_until_included(&block_id, Some(0), Some(3)).await.unwrap();
    assert_eq!(blocks.len(), 1);
    let (included_id, included) = &blocks[0];
    assert_ne!(*included_id, block_id);
    assert_eq!(included.payload(), block.payload());
    assert!(node.is_included(included_id));
}

#[tokio::test]
async fn retry_until_included_gives_up() {
    let (_, client) = setup().await;
    let (block_id, _) = tagged_block(&client).await;

    let err = client.retry_until_included(&block_id, Some(0), Some(2)).await.unwrap_err();
    assert!(matches!(err, Error::NotIncluded { attempts: 2, .. }));
    assert_eq!(err.kind(), ErrorKind::TimeoutError);
}

// ---------------------------------------------------------------------------
// Indexer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn chain_outputs_are_indexed() {
    let (node, client) = setup().await;

    let nft = NftOutputBuilder::new_with_amount(300_000, NftId([6; 32]))
        .add_unlock_condition(UnlockCondition::Address { address: ed25519(1) })
        .add_immutable_feature(Feature::Issuer { address: ed25519(2) })
        .finish()
        .unwrap();
    let nft_output = node.add_output(nft.into());

    let alias = AliasOutputBuilder::new_with_amount(2_000_000, AliasId([4; 32]))
        .add_unlock_condition(UnlockCondition::StateControllerAddress { address: ed25519(3) })
        .add_unlock_condition(UnlockCondition::GovernorAddress { address: ed25519(4) })
        .finish()
        .unwrap();
    let alias_output = node.add_output(alias.into());

    let foundry = FoundryOutputBuilder::new_with_amount(
        500_000,
        1,
        TokenScheme::Simple(SimpleTokenScheme {
            minted_tokens: 10,
            melted_tokens: 0,
            maximum_supply: 100,
        }),
    )
    .add_unlock_condition(UnlockCondition::ImmutableAliasAddress {
        address: AliasAddress(AliasId([4; 32])),
    })
    .finish()
    .unwrap();
    let foundry_id = foundry.id();
    let foundry_output = node.add_output(foundry.into());

    let by_issuer = vec![QueryParameter::Issuer(bech32(ed25519(2)))];
    assert_eq!(client.nft_output_ids(by_issuer).await.unwrap(), vec![nft_output]);
    let by_other_issuer = vec![QueryParameter::Issuer(bech32(ed25519(3)))];
    assert!(client.nft_output_ids(by_other_issuer).await.unwrap().is_empty());

    let by_governor = vec![QueryParameter::Governor(bech32(ed25519(4)))];
    assert_eq!(client.alias_output_ids(by_governor).await.unwrap(), vec![alias_output]);

    let by_alias = vec![QueryParameter::AliasAddress(bech32(Address::Alias(AliasAddress(AliasId([4; 32])))))];
    assert_eq!(client.foundry_output_ids(by_alias).await.unwrap(), vec![foundry_output]);

    assert_eq!(client.nft_output_id(NftId([6; 32])).await.unwrap(), nft_output);
    assert_eq!(client.alias_output_id(AliasId([4; 32])).await.unwrap(), alias_output);
    assert_eq!(client.foundry_output_id(foundry_id).await.unwrap(), foundry_output);
    assert!(client.nft_output_id(NftId([1; 32])).await.is_err());
}

#[tokio::test]
async fn unsupported_query_parameter_is_refused() {
    let (_, client) = setup().await;
    let params = vec![QueryParameter::Tag("0x01".into())];
    let err = client.foundry_output_ids(params).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
}

#[tokio::test]
async fn try_get_outputs_skips_missing_ones() {
    let (node, client) = setup().await;
    let funded = node.fund(ed25519(1), 1_000_000);
    let missing = OutputId::new(TransactionId([3; 32]), 0);

    let outputs = client.try_get_outputs(&[missing, funded]).await.unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].output.amount(), 1_000_000);
    assert!(client.get_outputs(&[missing, funded]).await.is_err());
}
