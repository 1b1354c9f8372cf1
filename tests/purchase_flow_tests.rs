//! End-to-end purchase flow over HTTP
//!
//! Runs the API on an ephemeral port and drives it with the purchase client;
//! the network is a scripted `MockRpc` that confirms whatever it accepts.

use purchase_facilitator::api::{create_router, AppState};
use purchase_facilitator::client::{PurchaseClient, PurchaseOutcome};
use purchase_facilitator::codec;
use purchase_facilitator::confirmation::ConfirmationPoller;
use purchase_facilitator::ledger::{LockStatus, PurchaseLedger};
use purchase_facilitator::rpc::RetryPolicy;
use purchase_facilitator::service::PurchaseService;
use purchase_facilitator::signer::{FacilitatorSigner, KeypairWallet};
use purchase_facilitator::submit::{SubmitConfig, Submitter};
use purchase_facilitator::test_utils::{test_program, MockRpc};
use purchase_facilitator::tx_builder::{ProgramInterface, PurchaseTxBuilder};
use serde_json::json;
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use solana_sdk::signature::{Keypair, Signer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    rpc: Arc<MockRpc>,
    base_url: String,
    service: Arc<PurchaseService>,
}

async fn start(interface: ProgramInterface) -> Harness {
    let rpc = Arc::new(MockRpc::new());
    rpc.auto_confirm();
    let builder = PurchaseTxBuilder::new(test_program(), Arc::new(interface), rpc.clone());
    let service = Arc::new(PurchaseService::new(
        builder,
        Ok(FacilitatorSigner::from_keypair(Keypair::new())),
        rpc.clone(),
        PurchaseLedger::default(),
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = create_router(AppState::new(service.clone()));
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    Harness {
        rpc,
        base_url: format!("http://{}", addr),
        service,
    }
}

fn client(h: &Harness) -> PurchaseClient {
    let submitter = Submitter::new(
        h.rpc.clone(),
        SubmitConfig {
            retry: RetryPolicy::immediate(3),
            ..SubmitConfig::default()
        },
    );
    let poller = ConfirmationPoller::new(h.rpc.clone(), Duration::from_millis(20), Duration::from_millis(10));
    PurchaseClient::new(h.base_url.clone(), h.rpc.clone(), submitter, poller, Duration::from_secs(2))
}

fn funded_wallet(h: &Harness, sol: u64) -> KeypairWallet {
    let keypair = Keypair::new();
    h.rpc.set_balance(keypair.pubkey(), sol * LAMPORTS_PER_SOL);
    KeypairWallet::new(keypair)
}

#[tokio::test]
async fn test_locked_purchase_end_to_end() {
    let h = start(ProgramInterface::builtin()).await;
    let wallet = funded_wallet(&h, 5);

    let outcome = client(&h).purchase(&wallet, 2.0, 3).await.unwrap();
    let record = match outcome {
        PurchaseOutcome::Confirmed { record: Some(record), .. } => record,
        other => panic!("unexpected outcome: {:?}", other),
    };
    assert!((record.token_amount - 212.0).abs() < 1e-9);
    assert!(record.is_locked);
    assert_eq!(record.lock_duration_months, 3);

    let purchases = client(&h).purchase_status(&wallet.address()).await.unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].status, LockStatus::Locked);
    assert_eq!(purchases[0].record, record);
}

#[tokio::test]
async fn test_small_purchase_is_recorded_unlocked() {
    let h = start(ProgramInterface::builtin()).await;
    let wallet = funded_wallet(&h, 1);

    let outcome = client(&h).purchase(&wallet, 0.005, 1).await.unwrap();
    match outcome {
        PurchaseOutcome::Confirmed { record: Some(record), .. } => {
            assert!((record.token_amount - 0.51).abs() < 1e-9);
            assert!(!record.is_locked);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    let purchases = client(&h).purchase_status(&wallet.address()).await.unwrap();
    assert_eq!(purchases[0].status, LockStatus::NotLocked);
}

#[tokio::test]
async fn test_unusable_interface_falls_back_to_transfer() {
    let iface = ProgramInterface::load(Path::new("/nonexistent/token_purchase.json"));
    let h = start(iface).await;
    let wallet = funded_wallet(&h, 1);

    let response: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/create-purchase-transaction", h.base_url))
        .json(&json!({
            "walletAddress": wallet.address().to_string(),
            "solAmount": 0.005,
            "lockDurationMonths": 1,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(response["metadata"]["buildPath"], "fallbackTransfer");
    let tx = codec::decode(response["transaction"].as_str().unwrap()).unwrap();
    assert_eq!(tx.message.instructions.len(), 1);

    let outcome = client(&h).purchase(&wallet, 0.005, 1).await.unwrap();
    assert!(matches!(outcome, PurchaseOutcome::Confirmed { record: Some(_), .. }));
}

#[tokio::test]
async fn test_repeated_completion_keeps_one_record() {
    let h = start(ProgramInterface::builtin()).await;
    let wallet = funded_wallet(&h, 5);
    let outcome = client(&h).purchase(&wallet, 1.0, 6).await.unwrap();

    let body = json!({
        "walletAddress": wallet.address().to_string(),
        "solAmount": 1.0,
        "lockDurationMonths": 6,
        "transactionSignature": outcome.signature().to_string(),
    });
    let http = reqwest::Client::new();
    for _ in 0..3 {
        let status = http
            .post(format!("{}/api/complete-purchase", h.base_url))
            .json(&body)
            .send()
            .await
            .unwrap()
            .status();
        assert!(status.is_success());
    }
    let purchases = client(&h).purchase_status(&wallet.address()).await.unwrap();
    assert_eq!(purchases.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_builds_for_one_wallet_both_succeed() {
    let h = start(ProgramInterface::builtin()).await;
    let wallet = funded_wallet(&h, 10).address();
    let http = reqwest::Client::new();

    let requests = (0..2).map(|_| {
        let http = http.clone();
        let url = format!("{}/api/create-purchase-transaction", h.base_url);
        async move {
            http.post(url)
                .json(&json!({
                    "walletAddress": wallet.to_string(),
                    "solAmount": 1.0,
                    "lockDurationMonths": 1,
                }))
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    for status in futures::future::join_all(requests).await {
        assert!(status.is_success());
    }
    assert_eq!(h.service.builds_in_flight(&wallet), 0);
}
