//! Ledger and vault secret managers through the client.

use std::sync::Arc;
use std::time::Duration;

use iota_client::address::Address;
use iota_client::api::{BlockOptions, TransactionPipeline};
use iota_client::block::output::{BasicOutputBuilder, Output, UnlockCondition};
use iota_client::secret::{GenerateAddressesOptions, SecretManager, SecretManagerDto, VaultDto};
use iota_client::testing::{MockLedgerTransport, MockNode};
use iota_client::{Client, ErrorKind};

const MNEMONIC: &str = "acoustic trophy damage hint search taste love bicycle foster cradle brown govern endless depend situate athlete pudding blame question genius transfer van random vast";

async fn client_with_ledger(transport: Arc<MockLedgerTransport>) -> (Arc<MockNode>, Client) {
    let node = Arc::new(MockNode::new("testnet"));
    let client = Client::builder()
        .with_node("http://mock.node")
        .unwrap()
        .with_node_api(node.clone())
        .with_ledger_transport(transport)
        .finish()
        .await
        .unwrap();
    (node, client)
}

fn mnemonic_manager() -> SecretManager {
    SecretManager::try_from(SecretManagerDto::Mnemonic(MNEMONIC.into())).unwrap()
}

fn options() -> GenerateAddressesOptions {
    GenerateAddressesOptions::default().with_range(0..3)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ledger_derives_the_same_addresses_as_its_mnemonic() {
    let transport = Arc::new(MockLedgerTransport::new(MNEMONIC).unwrap());
    let (_, client) = client_with_ledger(transport).await;
    let ledger = client
        .secret_manager_from_dto(SecretManagerDto::LedgerNano(true))
        .unwrap();

    let from_device = client.generate_addresses(&ledger, &options()).await.unwrap();
    let from_mnemonic = client
        .generate_addresses(&mnemonic_manager(), &options())
        .await
        .unwrap();
    assert_eq!(from_device, from_mnemonic);
    assert!(from_device[0].starts_with("rms1"));
}

#[tokio::test]
async fn ledger_signs_a_transfer() {
    let transport = Arc::new(MockLedgerTransport::new(MNEMONIC).unwrap());
    let (node, client) = client_with_ledger(transport).await;
    let ledger = client
        .secret_manager_from_dto(SecretManagerDto::LedgerNano(true))
        .unwrap();

    let owner = ledger
        .generate_ed25519_addresses(&GenerateAddressesOptions::default().with_range(0..1))
        .await
        .unwrap()[0];
    node.fund(Address::Ed25519(owner), 3_000_000);

    let target = Address::Ed25519(owner);
    let output = Output::Basic(
        BasicOutputBuilder::new_with_amount(3_000_000)
            .add_unlock_condition(UnlockCondition::Address { address: target })
            .finish()
            .unwrap(),
    );
    let mut pipeline =
        TransactionPipeline::new(&client, &ledger, BlockOptions::default().with_outputs([output]));
    pipeline.run().await.unwrap();
    assert_eq!(node.balance(&target), 3_000_000);
}

#[tokio::test]
async fn concurrent_device_operations_are_refused() {
    let transport = Arc::new(
        MockLedgerTransport::new(MNEMONIC)
            .unwrap()
            .with_delay(Duration::from_millis(100)),
    );
    let (_, client) = client_with_ledger(transport).await;
    let ledger = client
        .secret_manager_from_dto(SecretManagerDto::LedgerNano(true))
        .unwrap();

    let (first_options, second_options) = (options(), options());
    let (first, second) = tokio::join!(
        client.generate_addresses(&ledger, &first_options),
        client.generate_addresses(&ledger, &second_options),
    );
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err().kind(), ErrorKind::DeviceBusyError);

    // Released once the first operation finished.
    assert!(client.generate_addresses(&ledger, &options()).await.is_ok());
}

#[tokio::test]
async fn ledger_status_reports_app_and_lock() {
    let transport = Arc::new(MockLedgerTransport::new(MNEMONIC).unwrap());
    let (_, client) = client_with_ledger(transport.clone()).await;

    let status = client.get_ledger_nano_status(true).await.unwrap();
    assert!(status.connected);
    assert!(!status.locked);
    assert!(status.blind_signing_enabled);
    assert_eq!(status.app.unwrap().name, "IOTA");

    transport.set_locked(true);
    let status = client.get_ledger_nano_status(true).await.unwrap();
    assert!(status.locked);
    assert!(status.app.is_none());

    let ledger = client
        .secret_manager_from_dto(SecretManagerDto::LedgerNano(true))
        .unwrap();
    let err = client.generate_addresses(&ledger, &options()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendLockedError);
}

#[tokio::test]
async fn physical_ledger_is_unavailable() {
    let transport = Arc::new(MockLedgerTransport::new(MNEMONIC).unwrap());
    let (_, client) = client_with_ledger(transport).await;
    let err = client.get_ledger_nano_status(false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceUnavailableError);
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

#[tokio::test]
async fn vault_holds_a_mnemonic_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallet.vault").to_string_lossy().into_owned();
    let dto = |password: Option<&str>| {
        SecretManagerDto::Vault(VaultDto {
            password: password.map(String::from),
            snapshot_path: path.clone(),
        })
    };
    let hrp_options = options().with_bech32_hrp("rms");
    let expected = mnemonic_manager()
        .generate_addresses(&hrp_options, "rms")
        .await
        .unwrap();

    {
        let vault = SecretManager::try_from(dto(Some("correct horse"))).unwrap();
        vault.store_mnemonic(MNEMONIC).await.unwrap();
        let err = vault.store_mnemonic(MNEMONIC).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyInitializedError);
    }

    let reopened = SecretManager::try_from(dto(Some("correct horse"))).unwrap();
    let addresses = reopened.generate_addresses(&hrp_options, "rms").await.unwrap();
    assert_eq!(addresses, expected);
    drop(reopened);

    let wrong = SecretManager::try_from(dto(Some("battery staple"))).unwrap();
    let err = wrong.generate_addresses(&hrp_options, "rms").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BackendLockedError);
}
