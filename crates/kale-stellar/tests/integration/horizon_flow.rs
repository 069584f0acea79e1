//! Integration Tests: Horizon Round Trips
//!
//! HorizonClient against a mocked Horizon server:
//! - Account snapshots, unfunded accounts and server errors
//! - Transaction submission and rejection classification
//! - Fee stats
//! - Full ContractClient pipeline over HTTP

use super::common::{account, init_tracing};
use kale_stellar::{
    AccountGateway, ClientSettings, ContractClient, HorizonClient, KaleError, LocalKeyAgent,
    NetworkProfile, SignedEnvelope, Stage, TransactionSubmitter,
};
use mockito::{Matcher, Server};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn localhost_binding_permitted() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

fn profile_for(server: &Server) -> NetworkProfile {
    NetworkProfile::for_test_environment().with_endpoint(&server.url())
}

fn horizon_for(server: &Server) -> HorizonClient {
    HorizonClient::new(profile_for(server), Duration::from_secs(5)).expect("client builds")
}

fn account_body(address: &str, sequence: i64) -> String {
    serde_json::json!({
        "id": address,
        "account_id": address,
        "sequence": sequence.to_string(),
        "subentry_count": 0,
        "balances": [
            { "asset_type": "native", "balance": "100.0000000" }
        ]
    })
    .to_string()
}

fn problem_body(tx: &str, ops: &[&str]) -> String {
    serde_json::json!({
        "type": "https://stellar.org/horizon-errors/transaction_failed",
        "title": "Transaction Failed",
        "status": 400,
        "detail": "The transaction failed when submitted to the stellar network.",
        "extras": {
            "envelope_xdr": "AAAA",
            "result_codes": { "transaction": tx, "operations": ops },
            "result_xdr": "AAAA"
        }
    })
    .to_string()
}

fn testnet_envelope() -> SignedEnvelope {
    SignedEnvelope::new(
        "AAAAAgAAAAA=",
        &NetworkProfile::testnet().network_passphrase,
        &account(1),
        i64::MAX,
    )
}

/// Test: account snapshot comes from GET /accounts/{id}
#[tokio::test]
async fn test_fetch_snapshot() {
    if !localhost_binding_permitted() {
        return;
    }
    let address = account(1);
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", format!("/accounts/{}", address).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(account_body(&address, 41))
        .create_async()
        .await;

    let snapshot = horizon_for(&server).fetch(&address).await.expect("snapshot");
    assert_eq!(snapshot.address, address);
    assert_eq!(snapshot.sequence_number, 41);
    assert_eq!(snapshot.native_balance, "100.0000000");
    mock.assert_async().await;
}

/// Test: 404 means unfunded, other helpers follow
#[tokio::test]
async fn test_unfunded_account() {
    if !localhost_binding_permitted() {
        return;
    }
    let address = account(2);
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", format!("/accounts/{}", address).as_str())
        .with_status(404)
        .with_header("content-type", "application/problem+json")
        .with_body(r#"{"title":"Resource Missing","status":404}"#)
        .expect(3)
        .create_async()
        .await;

    let horizon = horizon_for(&server);
    assert_eq!(
        horizon.fetch(&address).await.unwrap_err(),
        KaleError::AccountNotFound(address.clone())
    );
    assert!(!horizon.account_exists(&address).await.expect("exists check"));
    assert_eq!(horizon.native_balance(&address).await.expect("balance"), "0");
}

/// Test: server errors are retryable
#[tokio::test]
async fn test_server_error_is_unreachable() {
    if !localhost_binding_permitted() {
        return;
    }
    let address = account(3);
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", format!("/accounts/{}", address).as_str())
        .with_status(503)
        .create_async()
        .await;

    let err = horizon_for(&server).fetch(&address).await.unwrap_err();
    assert!(err.is_retryable(), "503 should be retryable: {err}");
}

/// Test: malformed address never reaches the network
#[tokio::test]
async fn test_invalid_address_rejected_locally() {
    let horizon = HorizonClient::new(NetworkProfile::testnet(), Duration::from_secs(1))
        .expect("client builds");
    let err = horizon.fetch("GNOTANADDRESS").await.unwrap_err();
    assert!(matches!(err, KaleError::Encoding(_)));
}

/// Test: accepted submission returns hash and ledger
#[tokio::test]
async fn test_submit_accepted() {
    if !localhost_binding_permitted() {
        return;
    }
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/transactions")
        .match_body(Matcher::Regex("^tx=".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"hash":"5ebd5c0af4385500b53dd63b0ef5f6e8feef1a7e1c86989be3cdcce825f3c0cc","ledger":51234,"successful":true}"#)
        .create_async()
        .await;

    let receipt = horizon_for(&server)
        .submit(&testnet_envelope())
        .await
        .expect("accepted");
    assert_eq!(receipt.ledger, 51234);
    assert_eq!(receipt.hash.len(), 64);
    mock.assert_async().await;
}

/// Test: rejection bodies map to error classes
#[tokio::test]
async fn test_submit_rejections() {
    if !localhost_binding_permitted() {
        return;
    }
    let cases = [
        (problem_body("tx_bad_seq", &[]), "rejected_by_sequence"),
        (
            problem_body("tx_failed", &["op_underfunded"]),
            "rejected_by_insufficient_balance",
        ),
        (
            problem_body("tx_failed", &["op_success", "op_no_destination"]),
            "rejected_by_operation",
        ),
        (problem_body("tx_too_late", &[]), "expired_envelope"),
    ];

    for (body, expected) in cases {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/transactions")
            .with_status(400)
            .with_header("content-type", "application/problem+json")
            .with_body(body)
            .create_async()
            .await;

        let err = horizon_for(&server)
            .submit(&testnet_envelope())
            .await
            .unwrap_err();
        assert_eq!(err.code(), expected, "unexpected classification: {err:?}");
        assert!(!err.is_retryable());
    }
}

/// Test: a 400 without problem+json is still a rejection
#[tokio::test]
async fn test_submit_rejection_with_unreadable_body() {
    if !localhost_binding_permitted() {
        return;
    }
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/transactions")
        .with_status(400)
        .with_header("content-type", "text/html")
        .with_body("<html>bad request</html>")
        .create_async()
        .await;

    let err = horizon_for(&server)
        .submit(&testnet_envelope())
        .await
        .unwrap_err();
    assert!(matches!(&err, KaleError::RejectedByOperation { code, .. } if code == "unknown"));
    assert_eq!(err.code(), "rejected_by_operation");
    assert!(!err.is_retryable());
}

/// Test: gateway timeout is retryable
#[tokio::test]
async fn test_submit_gateway_timeout() {
    if !localhost_binding_permitted() {
        return;
    }
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/transactions")
        .with_status(504)
        .create_async()
        .await;

    let err = horizon_for(&server)
        .submit(&testnet_envelope())
        .await
        .unwrap_err();
    assert!(matches!(err, KaleError::NetworkUnreachable(_)));
}

/// Test: fee stats parse
#[tokio::test]
async fn test_fee_stats() {
    if !localhost_binding_permitted() {
        return;
    }
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/fee_stats")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"last_ledger":"100","last_ledger_base_fee":"100","ledger_capacity_usage":"0.97",
                "fee_charged":{"max":"5000","min":"100","mode":"100","p50":"120","p90":"900","p99":"5000"}}"#,
        )
        .create_async()
        .await;

    let stats = horizon_for(&server).fee_stats().await.expect("fee stats");
    assert_eq!(kale_stellar::FeePolicy::from_fee_stats(&stats).base_fee, 120);
}

/// Test: harvest through ContractClient over HTTP
#[tokio::test]
async fn test_contract_call_over_http() {
    if !localhost_binding_permitted() {
        return;
    }
    init_tracing();

    let agent = LocalKeyAgent::from_bytes(&[21u8; 32]);
    let farmer = agent.address();

    let mut server = Server::new_async().await;
    let account_mock = server
        .mock("GET", format!("/accounts/{}", farmer).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(account_body(&farmer, 41))
        .create_async()
        .await;
    let submit_mock = server
        .mock("POST", "/transactions")
        .match_body(Matcher::Regex("^tx=AAAAAgAAAA".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"hash":"aa11","ledger":777,"successful":true}"#)
        .create_async()
        .await;

    let client = ContractClient::new(
        profile_for(&server),
        ClientSettings::default(),
        Arc::new(agent),
    )
    .expect("client builds");

    let receipt = client
        .harvest(&farmer, &farmer, 30_000)
        .await
        .expect("harvest accepted");
    assert_eq!(receipt.ledger, 777);

    account_mock.assert_async().await;
    submit_mock.assert_async().await;
}

/// Test: Horizon rejection surfaces at the submission stage
#[tokio::test]
async fn test_contract_call_rejected_over_http() {
    if !localhost_binding_permitted() {
        return;
    }
    let agent = LocalKeyAgent::from_bytes(&[22u8; 32]);
    let farmer = agent.address();

    let mut server = Server::new_async().await;
    let _account = server
        .mock("GET", format!("/accounts/{}", farmer).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(account_body(&farmer, 99))
        .create_async()
        .await;
    let _submit = server
        .mock("POST", "/transactions")
        .with_status(400)
        .with_header("content-type", "application/problem+json")
        .with_body(problem_body("tx_bad_seq", &[]))
        .create_async()
        .await;

    let client = ContractClient::new(
        profile_for(&server),
        ClientSettings::default(),
        Arc::new(agent),
    )
    .expect("client builds");

    let err = client
        .plant(&farmer, &farmer, 0)
        .await
        .expect_err("stale sequence");
    assert_eq!(err.stage, Stage::Submission);
    assert!(err.error.requires_rebuild());
}
