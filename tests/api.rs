//! HTTP-level tests driving the full router against the in-memory ledger
//! and stores.

#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use anchor_gateway::api::build_app;
use anchor_gateway::app_state::AppState;
use anchor_gateway::domain::{AccountAddress, Amount, AssetId, EventBus, Network, TxRef};
use anchor_gateway::ledger::{AccountSigner, LedgerClient, LedgerTransaction, MemoryLedger, Transfer};
use anchor_gateway::persistence::{ListingStore, MemoryStore, SwapLog};
use anchor_gateway::service::{AnchorContext, NetworkRegistry, PoolAssets, SettlementSettings};

const ADMIN_TOKEN: &str = "operator-secret";

struct Harness {
    app: Router,
    ledger: Arc<MemoryLedger>,
    anchor: AccountAddress,
    user: AccountSigner,
}

fn asset(code: &str) -> AssetId {
    let Ok(asset) = AssetId::new(code) else {
        panic!("valid asset {code}");
    };
    asset
}

async fn harness(admin_token: Option<&str>) -> Harness {
    let ledger = Arc::new(MemoryLedger::new(Network::Test));
    let client: Arc<dyn LedgerClient> = Arc::<MemoryLedger>::clone(&ledger);
    let Ok(pool) = PoolAssets::new(asset("AAA"), asset("BBB")) else {
        panic!("valid pool");
    };
    let Ok(ctx) = AnchorContext::new(Network::Test, client, AccountSigner::from_seed([9; 32]), pool)
    else {
        panic!("valid anchor context");
    };
    let anchor = ctx.address().clone();
    ledger.set_balance(&anchor, &asset("AAA"), Amount::new(1_000_000)).await;
    ledger.set_balance(&anchor, &asset("BBB"), Amount::new(2_000_000)).await;

    let user = AccountSigner::from_seed([1; 32]);
    ledger.set_balance(user.address(), &asset("AAA"), Amount::new(500_000)).await;

    let mut networks = NetworkRegistry::new();
    networks.insert(ctx);
    let store = Arc::new(MemoryStore::new());
    let listings: Arc<dyn ListingStore> = Arc::<MemoryStore>::clone(&store);
    let swaps: Arc<dyn SwapLog> = store;
    let settings = SettlementSettings {
        finality_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
        ..SettlementSettings::default()
    };
    let state = AppState::new(
        networks,
        listings,
        swaps,
        EventBus::new(64),
        settings,
        admin_token.map(str::to_string),
    );
    Harness {
        app: build_app(state),
        ledger,
        anchor,
        user,
    }
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let Ok(response) = app.clone().oneshot(request).await else {
        panic!("router is infallible");
    };
    let status = response.status();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body readable");
    };
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    let Ok(request) = Request::get(uri).body(Body::empty()) else {
        panic!("valid request");
    };
    request
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    let Ok(request) = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
    else {
        panic!("valid request");
    };
    request
}

fn admin_get(uri: &str, token: &str) -> Request<Body> {
    let Ok(request) = Request::get(uri).header("x-admin-token", token).body(Body::empty()) else {
        panic!("valid request");
    };
    request
}

/// The user's signed payment of `amount` AAA to the anchor.
fn signed_payment(h: &Harness, amount: u128) -> LedgerTransaction {
    let mut tx = LedgerTransaction::new(
        Network::Test,
        vec![Transfer {
            from: h.user.address().clone(),
            to: h.anchor.clone(),
            asset: asset("AAA"),
            amount: Amount::new(amount),
        }],
    );
    let Ok(()) = h.user.authorize_leg(&mut tx, 0) else {
        panic!("user signs own leg");
    };
    tx
}

/// Submits the user's payment to the anchor and returns its hash.
async fn pay_anchor(h: &Harness, amount: u128) -> TxRef {
    let Ok(tx_ref) = h.ledger.submit(&signed_payment(h, amount)).await else {
        panic!("payment accepted");
    };
    tx_ref
}

fn settle_body(h: &Harness, input: &str, extra: Value) -> Value {
    let mut body = json!({
        "network": "test",
        "fromAsset": "AAA",
        "toAsset": "BBB",
        "inputAmount": input,
        "callerAddress": h.user.address().to_string(),
    });
    if let (Some(target), Some(fields)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
    body
}

async fn balance(h: &Harness, who: &AccountAddress, code: &str) -> u128 {
    let Ok(amount) = h.ledger.balance(who, &asset(code)).await else {
        panic!("balance read");
    };
    amount.get()
}

#[tokio::test]
async fn health_lists_networks() {
    let h = harness(None).await;
    let (status, body) = call(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(
        body["networks"],
        json!([{ "network": "test", "anchorAddress": h.anchor.to_string() }])
    );
    assert_eq!(body["feedSubscribers"], 0);
}

#[tokio::test]
async fn anchor_status_reports_pool_balances() {
    let h = harness(None).await;
    let (status, body) = call(&h.app, get("/api/v1/anchor?network=test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], h.anchor.to_string());
    assert_eq!(body["balanceA"], "1000000");
    assert_eq!(body["balanceB"], "2000000");

    let (status, body) = call(&h.app, get("/api/v1/anchor?network=main")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], 3002);
}

#[tokio::test]
async fn quote_uses_constant_product() {
    let h = harness(None).await;
    let request = json!({
        "network": "test",
        "fromAsset": "AAA",
        "toAsset": "BBB",
        "inputAmount": "10000",
    });
    let (status, body) = call(&h.app, post("/api/v1/swap/quote", &request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outputAmount"], "19801");
    assert_eq!(body["rate"], "2");
    assert_eq!(body["priceImpactPct"], "2.01");
}

#[tokio::test]
async fn trusted_settlement_pays_out_once() {
    let h = harness(None).await;
    let transfer = pay_anchor(&h, 10_000).await;
    let body = settle_body(&h, "10000", json!({ "userTransferRef": transfer.to_string() }));

    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &body)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(response["success"], true);
    assert_eq!(response["mode"], "trusted_two_phase");
    assert_eq!(response["outputAmount"], "19801");
    assert_eq!(balance(&h, h.user.address(), "BBB").await, 19_801);

    let (status, replay) = call(&h.app, post("/api/v1/swap/settle", &body)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(replay["success"], false);
    assert_eq!(replay["errorCode"], 2007);
    assert_eq!(balance(&h, h.user.address(), "BBB").await, 19_801);

    let (status, history) = call(&h.app, get("/api/v1/swaps?network=test&limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn trusted_settlement_ignores_slippage_fields() {
    let h = harness(None).await;
    let transfer = pay_anchor(&h, 10_000).await;
    let body = settle_body(
        &h,
        "10000",
        json!({
            "userTransferRef": transfer.to_string(),
            "expectedRate": 9.5,
            "slippageTolerancePct": 0.5,
        }),
    );

    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &body)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(response["success"], true);
    assert_eq!(response["rate"], "2");
    assert!(response.get("slippageExceeded").is_none());
    assert_eq!(balance(&h, h.user.address(), "BBB").await, 19_801);
}

#[tokio::test]
async fn atomic_transaction_cannot_be_reused_as_trusted_payment() {
    let h = harness(None).await;
    let tx = signed_payment(&h, 10_000);
    let atomic = settle_body(&h, "10000", json!({ "unsignedCombinedTxBase64": tx.to_base64() }));
    let (status, settled) = call(&h.app, post("/api/v1/swap/settle", &atomic)).await;
    assert_eq!(status, StatusCode::OK, "{settled}");

    let replay = settle_body(&h, "10000", json!({ "userTransferRef": settled["transactionRef"] }));
    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &replay)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{response}");
    assert_eq!(response["success"], false);
    assert_eq!(response["errorCode"], 5004);
    assert_eq!(response["retryable"], false);
    assert_eq!(balance(&h, h.user.address(), "BBB").await, 19_801);
}

#[tokio::test]
async fn atomic_settlement_submits_one_transaction() {
    let h = harness(None).await;
    let tx = signed_payment(&h, 10_000);
    let body = settle_body(
        &h,
        "10000",
        json!({ "unsignedCombinedTxBase64": tx.to_base64() }),
    );

    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &body)).await;
    assert_eq!(status, StatusCode::OK, "{response}");
    assert_eq!(response["mode"], "atomic");
    assert_eq!(balance(&h, h.user.address(), "BBB").await, 19_801);
    assert_eq!(balance(&h, h.user.address(), "AAA").await, 490_000);
    assert_eq!(h.ledger.transaction_count().await, 1);
}

#[tokio::test]
async fn settlement_failures_keep_response_shape() {
    let h = harness(None).await;
    let tx = signed_payment(&h, 10_000);
    let slippage = settle_body(
        &h,
        "10000",
        json!({
            "unsignedCombinedTxBase64": tx.to_base64(),
            "expectedRate": 1.8,
            "slippageTolerancePct": 5,
        }),
    );
    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &slippage)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["success"], false);
    assert_eq!(response["slippageExceeded"], true);
    assert_eq!(response["currentRate"], "2");

    let too_big = settle_body(
        &h,
        "150001",
        json!({ "unsignedCombinedTxBase64": signed_payment(&h, 150_001).to_base64() }),
    );
    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &too_big)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);
    assert_eq!(response["errorCode"], 1002);

    let no_mode = settle_body(&h, "100", json!({}));
    let (status, response) = call(&h.app, post("/api/v1/swap/settle", &no_mode)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.get("mode").is_none());
    assert_eq!(h.ledger.transaction_count().await, 0);
}

#[tokio::test]
async fn listing_lifecycle() {
    let h = harness(None).await;
    let seller = AccountSigner::from_seed([2; 32]);
    let buyer = AccountSigner::from_seed([3; 32]);
    let create = json!({
        "network": "test",
        "tokenId": "nft-42",
        "sellerAddress": seller.address().to_string(),
        "price": 25.5,
        "currency": "XLM",
    });

    let (status, body) = call(&h.app, post("/api/v1/listings", &create)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], 2002);
    assert_eq!(body["error"]["retryable"], true);

    h.ledger.set_balance(&h.anchor, &asset("nft-42"), Amount::new(1)).await;
    let (status, listing) = call(&h.app, post("/api/v1/listings", &create)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(listing["status"], "active");
    let id = listing["id"].as_str().unwrap_or_default().to_string();

    let (status, duplicate) = call(&h.app, post("/api/v1/listings", &create)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(duplicate["error"]["code"], 2006);

    let (status, active) = call(&h.app, get("/api/v1/listings?network=test&status=active")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active.as_array().map(Vec::len), Some(1));

    let buy = json!({ "network": "test", "buyerAddress": buyer.address().to_string() });
    let (status, sold) = call(&h.app, post(&format!("/api/v1/listings/{id}/buy"), &buy)).await;
    assert_eq!(status, StatusCode::OK, "{sold}");
    assert_eq!(sold["listing"]["status"], "sold");
    assert!(sold["transactionRef"].as_str().is_some_and(|s| !s.is_empty()));
    assert_eq!(balance(&h, buyer.address(), "nft-42").await, 1);

    let (status, again) = call(&h.app, post(&format!("/api/v1/listings/{id}/buy"), &buy)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["error"]["code"], 2004);

    let (status, fetched) = call(&h.app, get(&format!("/api/v1/listings/{id}?network=test"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["buyerAddress"], buyer.address().to_string());
}

#[tokio::test]
async fn cancel_without_custody_is_flagged() {
    let h = harness(None).await;
    let seller = AccountSigner::from_seed([2; 32]);
    h.ledger.set_balance(&h.anchor, &asset("nft-7"), Amount::new(1)).await;
    let create = json!({
        "network": "test",
        "tokenId": "nft-7",
        "sellerAddress": seller.address().to_string(),
        "price": 10,
        "currency": "XLM",
    });
    let (_, listing) = call(&h.app, post("/api/v1/listings", &create)).await;
    let id = listing["id"].as_str().unwrap_or_default().to_string();

    h.ledger.set_balance(&h.anchor, &asset("nft-7"), Amount::ZERO).await;
    let cancel = json!({ "network": "test" });
    let (status, body) = call(&h.app, post(&format!("/api/v1/listings/{id}/cancel"), &cancel)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["custodyMissing"], true);
    assert_eq!(body["listing"]["status"], "cancelled");
    assert!(body["transactionRef"].is_null());
}

#[tokio::test]
async fn admin_endpoints_require_token() {
    let h = harness(Some(ADMIN_TOKEN)).await;
    h.ledger.set_balance(&h.anchor, &asset("nft-lost"), Amount::new(1)).await;

    let (status, _) = call(&h.app, get("/api/v1/admin/reconciliation?network=test")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(
        &h.app,
        admin_get("/api/v1/admin/reconciliation?network=test", "wrong"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, report) = call(
        &h.app,
        admin_get("/api/v1/admin/reconciliation?network=test", ADMIN_TOKEN),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["orphanedTokenIds"], json!(["nft-lost"]));

    let owner = AccountSigner::from_seed([5; 32]);
    let recover = json!({
        "network": "test",
        "tokenId": "nft-lost",
        "recipientAddress": owner.address().to_string(),
    });
    let Ok(request) = Request::post("/api/v1/admin/recover")
        .header("content-type", "application/json")
        .header("x-admin-token", ADMIN_TOKEN)
        .body(Body::from(recover.to_string()))
    else {
        panic!("valid request");
    };
    let (status, body) = call(&h.app, request).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["amount"], "1");
    assert_eq!(balance(&h, owner.address(), "nft-lost").await, 1);
}

#[tokio::test]
async fn admin_without_configured_token_is_unavailable() {
    let h = harness(None).await;
    let (status, body) = call(
        &h.app,
        admin_get("/api/v1/admin/reconciliation?network=test", "anything"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], 3002);
}
