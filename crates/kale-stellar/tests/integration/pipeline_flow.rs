//! Integration Tests: Contract Call Pipeline
//!
//! Drives ContractClient end to end with in-memory collaborators:
//! - Happy path payment and contract calls
//! - Stale sequence and insufficient balance rejections
//! - Wallet decline, abandoned prompts and network mismatch
//! - Unfunded accounts, request timeouts and busy accounts

use super::common::{
    account, envelope_sequence, init_tracing, CountingAgent, DecliningAgent, HangingAgent,
    MemoryGateway, OtherNetworkAgent, RecordingSubmitter,
};
use kale_stellar::config::MAINNET_PASSPHRASE;
use kale_stellar::{
    ClientSettings, ContractClient, KaleError, LocalKeyAgent, NetworkProfile, Stage,
    SubmissionResult,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const FARMER_SEED: [u8; 32] = [11u8; 32];

fn farmer() -> LocalKeyAgent {
    LocalKeyAgent::from_bytes(&FARMER_SEED)
}

fn build_client(
    gateway: Arc<MemoryGateway>,
    submitter: Arc<RecordingSubmitter>,
    agent: Arc<CountingAgent>,
) -> ContractClient {
    ContractClient::with_parts(
        NetworkProfile::for_test_environment(),
        ClientSettings::default(),
        gateway,
        submitter,
        agent,
    )
}

/// Test: account at sequence 41 pays 10 XLM and is accepted
#[tokio::test]
async fn test_happy_path_payment() {
    init_tracing();

    let source = farmer().address();
    let destination = account(2);

    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 41, "100.0000000"));
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(farmer())));
    let client = build_client(gateway.clone(), submitter.clone(), agent.clone());

    let amount = kale_stellar::units::to_stroops("10").expect("valid amount");
    let outcome = client.pay(&source, &destination, amount).await;
    let receipt = outcome.clone().expect("payment accepted");

    assert!(!receipt.hash.is_empty(), "hash should be present");
    assert!(receipt.ledger >= 50_000, "ledger should be from the submitter");

    // The envelope carried sequence 42
    let submitted = submitter.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(envelope_sequence(&submitted[0]), 42);

    assert_eq!(gateway.fetch_count(), 1);
    assert_eq!(agent.prompts(), 1);
    assert!(!client.in_flight().is_busy(&source));

    let result = SubmissionResult::from(&outcome);
    assert!(result.success);
    assert_eq!(result.transaction_hash, Some(receipt.hash));
}

/// Test: plant, work and harvest reach the submitter in order
#[tokio::test]
async fn test_farming_cycle() {
    init_tracing();

    let source = farmer().address();
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 7, "25.0000000"));
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(farmer())));
    let client = build_client(gateway, submitter.clone(), agent.clone());

    let hash = format!("0000000{}", "a".repeat(57));
    client
        .plant(&source, &source, 250 * kale_stellar::units::STROOPS_PER_UNIT as i128)
        .await
        .expect("plant accepted");
    client
        .work(&source, &source, &hash, 1_234_567)
        .await
        .expect("work accepted");
    client
        .harvest(&source, &source, 30_512)
        .await
        .expect("harvest accepted");

    assert_eq!(submitter.calls(), 3);
    assert_eq!(agent.prompts(), 3);
}

/// Test: network reports a stale sequence
#[tokio::test]
async fn test_stale_sequence() {
    let source = farmer().address();
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 41, "100.0000000"));
    let submitter = Arc::new(RecordingSubmitter::answering(vec![Err(
        KaleError::RejectedBySequence("tx_bad_seq".to_string()),
    )]));
    let agent = Arc::new(CountingAgent::new(Arc::new(farmer())));
    let client = build_client(gateway, submitter.clone(), agent);

    let err = client
        .pay(&source, &account(2), 1)
        .await
        .expect_err("stale sequence should fail");

    assert_eq!(err.stage, Stage::Submission);
    assert!(matches!(err.error, KaleError::RejectedBySequence(_)));
    assert!(err.error.requires_rebuild());
    assert!(!err.error.is_retryable());
    assert!(!client.in_flight().is_busy(&source));
}

/// Test: network reports insufficient balance
#[tokio::test]
async fn test_insufficient_balance() {
    let source = farmer().address();
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 3, "1.0000000"));
    let submitter = Arc::new(RecordingSubmitter::answering(vec![Err(
        KaleError::RejectedByInsufficientBalance("op_underfunded".to_string()),
    )]));
    let client = build_client(
        gateway,
        submitter,
        Arc::new(CountingAgent::new(Arc::new(farmer()))),
    );

    let err = client
        .pay(&source, &account(2), 500_000_000)
        .await
        .expect_err("underfunded payment should fail");
    assert_eq!(err.stage, Stage::Submission);
    assert!(err.error.is_user_actionable());
}

/// Test: user declines in the wallet
#[tokio::test]
async fn test_user_declines() {
    init_tracing();

    let source = account(5);
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 9, "10.0000000"));
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(DecliningAgent {
        address: source.clone(),
    })));
    let client = build_client(gateway, submitter.clone(), agent.clone());

    let err = client
        .harvest(&source, &source, 1)
        .await
        .expect_err("declined call should fail");

    assert_eq!(err.stage, Stage::Signing);
    assert!(matches!(err.error, KaleError::Rejected(_)));
    assert_eq!(agent.prompts(), 1);
    assert_eq!(submitter.calls(), 0, "nothing may be submitted");
    assert!(!client.in_flight().is_busy(&source), "marker must be released");
}

/// Test: wallet is on mainnet while the client targets testnet
#[tokio::test]
async fn test_wallet_on_other_network() {
    let source = farmer().address();
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 41, "100.0000000"));
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(
        farmer().on_network(MAINNET_PASSPHRASE),
    )));
    let client = build_client(gateway, submitter.clone(), agent.clone());

    let err = client
        .pay(&source, &account(2), 1)
        .await
        .expect_err("mismatched network should fail");

    assert_eq!(err.stage, Stage::Signing);
    match err.error {
        KaleError::NetworkMismatch { expected, actual } => {
            assert_eq!(expected, client.profile().network_passphrase);
            assert_eq!(actual, MAINNET_PASSPHRASE);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(agent.prompts(), 0, "user must not be prompted");
    assert_eq!(submitter.calls(), 0);
}

/// Test: wallet hides its network but signs for mainnet
#[tokio::test]
async fn test_wallet_signs_for_other_network() {
    let source = account(6);
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 12, "10.0000000"));
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(OtherNetworkAgent {
        address: source.clone(),
        passphrase: MAINNET_PASSPHRASE.to_string(),
    })));
    let client = build_client(gateway, submitter.clone(), agent.clone());

    let err = client
        .harvest(&source, &source, 3)
        .await
        .expect_err("envelope signed for another network should fail");

    assert_eq!(err.stage, Stage::Signing);
    match err.error {
        KaleError::NetworkMismatch { expected, actual } => {
            assert_eq!(expected, client.profile().network_passphrase);
            assert_eq!(actual, MAINNET_PASSPHRASE);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // Only the returned passphrase gave it away
    assert_eq!(agent.prompts(), 1);
    assert_eq!(submitter.calls(), 0, "nothing may be submitted");
    assert!(!client.in_flight().is_busy(&source));
}

/// Test: caller gives up on a prompt the wallet never answers
#[tokio::test(start_paused = true)]
async fn test_abandoned_signature_releases_account() {
    let source = account(7);
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 20, "10.0000000"));
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(HangingAgent {
        address: source.clone(),
    })));
    let client = build_client(gateway, submitter.clone(), agent.clone());

    let outcome = tokio::time::timeout(
        Duration::from_millis(200),
        client.harvest(&source, &source, 1),
    )
    .await;

    assert!(outcome.is_err(), "call should still be waiting on the wallet");
    assert_eq!(agent.prompts(), 1);
    assert_eq!(submitter.calls(), 0);
    assert!(
        !client.in_flight().is_busy(&source),
        "dropping the call must release the account"
    );
}

/// Test: unfunded account stops before any envelope exists
#[tokio::test]
async fn test_unfunded_account() {
    let source = farmer().address();
    let gateway = Arc::new(MemoryGateway::new());
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let agent = Arc::new(CountingAgent::new(Arc::new(farmer())));
    let client = build_client(gateway.clone(), submitter.clone(), agent.clone());

    let err = client
        .plant(&source, &source, 0)
        .await
        .expect_err("unfunded account should fail");

    assert_eq!(err.stage, Stage::AccountLookup);
    assert_eq!(err.error, KaleError::AccountNotFound(source.clone()));
    assert_eq!(gateway.fetch_count(), 1);
    assert_eq!(agent.prompts(), 0);
    assert_eq!(submitter.calls(), 0);

    let result = SubmissionResult::failed(&err);
    assert_eq!(result.failure_stage, Some(Stage::AccountLookup));
}

/// Test: account lookup slower than the request timeout
#[tokio::test(start_paused = true)]
async fn test_account_lookup_timeout() {
    let source = farmer().address();
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_account(&source, 1, "1.0000000")
            .with_delay(Duration::from_secs(120)),
    );
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let client = build_client(
        gateway,
        submitter.clone(),
        Arc::new(CountingAgent::new(Arc::new(farmer()))),
    );

    let err = client
        .pay(&source, &account(2), 1)
        .await
        .expect_err("slow lookup should time out");

    assert_eq!(err.stage, Stage::AccountLookup);
    assert!(err.error.is_retryable());
    assert_eq!(submitter.calls(), 0);
}

/// Test: a second call for the same account fails fast
#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_same_account() {
    let source = farmer().address();
    let gateway = Arc::new(
        MemoryGateway::new()
            .with_account(&source, 41, "100.0000000")
            .with_delay(Duration::from_millis(50)),
    );
    let submitter = Arc::new(RecordingSubmitter::accepting());
    let client = build_client(
        gateway,
        submitter.clone(),
        Arc::new(CountingAgent::new(Arc::new(farmer()))),
    );

    let dest_a = account(2);
    let dest_b = account(3);
    let (first, second) = tokio::join!(
        client.pay(&source, &dest_a, 1),
        client.pay(&source, &dest_b, 1),
    );

    first.expect("first call accepted");
    let err = second.expect_err("second call should be refused");
    assert_eq!(err.stage, Stage::Admission);
    assert_eq!(err.error, KaleError::AccountBusy(source.clone()));
    assert_eq!(submitter.calls(), 1);

    // Free again afterwards
    client
        .pay(&source, &account(3), 1)
        .await
        .expect("later call accepted");
}

/// Test: same snapshot never yields two different sequences
#[tokio::test]
async fn test_rebuild_after_stale_uses_fresh_snapshot() {
    let source = farmer().address();
    let gateway = Arc::new(MemoryGateway::new().with_account(&source, 41, "100.0000000"));
    let submitter = Arc::new(RecordingSubmitter::answering(vec![Err(
        KaleError::RejectedBySequence("tx_bad_seq".to_string()),
    )]));
    let client = build_client(
        gateway.clone(),
        submitter.clone(),
        Arc::new(CountingAgent::new(Arc::new(farmer()))),
    );

    let _ = client.pay(&source, &account(2), 1).await;
    client
        .pay(&source, &account(2), 1)
        .await
        .expect("retry accepted");

    // Both attempts read the account themselves
    assert_eq!(gateway.fetch_count(), 2);
    let sequences: Vec<i64> = submitter
        .submitted()
        .iter()
        .map(|e| envelope_sequence(e))
        .collect();
    assert_eq!(sequences, vec![42, 42]);
}
