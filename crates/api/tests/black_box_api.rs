//! End-to-end coverage of §8's concrete scenarios through the actual
//! HTTP edge, wired against the in-memory event log so the test is
//! hermetic (§9: "must be injected ... to keep tests hermetic").

use std::sync::Arc;

use ledger_account::AccountEvent;
use ledger_eventlog::InMemoryEventLog;
use ledger_service::AccountService;
use serde_json::json;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let log = Arc::new(InMemoryEventLog::<AccountEvent>::new());
        let service = Arc::new(AccountService::new(log, "accountStream"));
        let app = ledger_api::app::build_app(service);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn create_then_duplicate_create_conflicts() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{}/accounts", server.base_url))
        .json(&json!({"id": "JohnDoe"}))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), 201);
    let body: serde_json::Value = created.json().await.unwrap();
    assert_eq!(body["id"], "JohnDoe");

    let duplicate = client
        .post(format!("{}/accounts", server.base_url))
        .json(&json!({"id": "JohnDoe"}))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), 400);
}

#[tokio::test]
async fn fetch_after_create_reports_zero_balance_and_version_one() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/accounts", server.base_url))
        .json(&json!({"id": "JaneDoe"}))
        .send()
        .await
        .unwrap();

    let fetched = client
        .get(format!("{}/accounts/JaneDoe", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(fetched.status(), 200);
    let body: serde_json::Value = fetched.json().await.unwrap();
    assert_eq!(body["funds"], 0);
    assert_eq!(body["version"], 1);
    assert!(!body["timestamp"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn deposit_then_withdraw_round_trips_balance() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/accounts", server.base_url))
        .json(&json!({"id": "acct-1"}))
        .send()
        .await
        .unwrap();

    let deposit = client
        .post(format!("{}/accounts/acct-1/deposits", server.base_url))
        .json(&json!({"amount": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(deposit.status(), 200);
    let body: serde_json::Value = deposit.json().await.unwrap();
    assert_eq!(body["id"], "acct-1");
    assert_eq!(body["amount"], 100);

    let after_deposit = client
        .get(format!("{}/accounts/acct-1", server.base_url))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(after_deposit["funds"], 100);
    assert_eq!(after_deposit["version"], 2);

    let withdraw = client
        .post(format!("{}/accounts/acct-1/withdrawals", server.base_url))
        .json(&json!({"amount": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(withdraw.status(), 200);

    let after_withdraw = client
        .get(format!("{}/accounts/acct-1", server.base_url))
        .send()
        .await
        .unwrap()
        .json::<serde_json::Value>()
        .await
        .unwrap();
    assert_eq!(after_withdraw["funds"], 0);
    assert_eq!(after_withdraw["version"], 3);
}

#[tokio::test]
async fn insufficient_funds_and_invalid_amount_are_400() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/accounts", server.base_url))
        .json(&json!({"id": "acct-2"}))
        .send()
        .await
        .unwrap();

    let overdraft = client
        .post(format!("{}/accounts/acct-2/withdrawals", server.base_url))
        .json(&json!({"amount": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(overdraft.status(), 400);

    let zero_deposit = client
        .post(format!("{}/accounts/acct-2/deposits", server.base_url))
        .json(&json!({"amount": 0}))
        .send()
        .await
        .unwrap();
    assert_eq!(zero_deposit.status(), 400);
}

#[tokio::test]
async fn fetch_unknown_account_is_404() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/accounts/ghost", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
