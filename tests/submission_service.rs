//! Integration tests for the submission service's route table, driven
//! through `tower::ServiceExt::oneshot` against the real `axum::Router`
//! rather than a bound TCP listener, the way the pack's service-style repos
//! test their own HTTP surfaces.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use ezchain_core::audit::AuditLogger;
use ezchain_core::collaborators::{FileNodeManager, FileWalletStore, SimpleTxEngine};
use ezchain_core::config::EzChainConfig;
use ezchain_core::metrics::ServiceMetrics;
use ezchain_core::security::idempotency::IdempotencyStore;
use ezchain_core::security::nonce::NonceGuard;
use ezchain_core::service::{build_router, AppState};

const TOKEN: &str = "test-token";

fn temp_dir(label: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "ezchain-submission-test-{}-{}-{}",
        label,
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_state(data_dir: PathBuf) -> Arc<AppState> {
    let wallet = Arc::new(FileWalletStore::new(&data_dir).unwrap());
    let tx_engine = Arc::new(SimpleTxEngine::new(&data_dir, 100_000_000).unwrap());
    let node_manager = Arc::new(FileNodeManager::new(&data_dir, ".").unwrap());
    Arc::new(AppState {
        token: TOKEN.to_string(),
        config: EzChainConfig::default(),
        nonce_guard: Arc::new(NonceGuard::new(data_dir.join("used_nonces.json"), 600)),
        idempotency: Arc::new(IdempotencyStore::new(data_dir.join("tx_idempotency.json"))),
        audit: Arc::new(AuditLogger::new(data_dir.join("logs").join("service_audit.log"))),
        metrics: Arc::new(ServiceMetrics::new()),
        wallet,
        tx_engine,
        node_manager,
        started_at: Instant::now(),
    })
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_is_open_without_a_token() {
    let state = test_state(temp_dir("health"));
    let router = build_router(state);
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_route_returns_not_found() {
    let state = test_state(temp_dir("notfound"));
    let router = build_router(state);
    let response = router
        .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn wallet_create_without_token_is_rejected() {
    let state = test_state(temp_dir("noauth"));
    let router = build_router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/wallet/create")
        .header("content-type", "application/json")
        .header("content-length", "20")
        .body(Body::from(r#"{"password":"hunter2"}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn post_without_content_length_is_rejected() {
    let state = test_state(temp_dir("nocl"));
    let router = build_router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/wallet/create")
        .header("x-ez-token", TOKEN)
        .body(Body::from(r#"{"password":"hunter2"}"#))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn post_over_the_payload_limit_is_rejected() {
    let dir = temp_dir("toolarge");
    let mut config = EzChainConfig::default();
    config.security.max_payload_bytes = 8;
    let wallet = Arc::new(FileWalletStore::new(&dir).unwrap());
    let tx_engine = Arc::new(SimpleTxEngine::new(&dir, 100_000_000).unwrap());
    let node_manager = Arc::new(FileNodeManager::new(&dir, ".").unwrap());
    let state = Arc::new(AppState {
        token: TOKEN.to_string(),
        config,
        nonce_guard: Arc::new(NonceGuard::new(dir.join("used_nonces.json"), 600)),
        idempotency: Arc::new(IdempotencyStore::new(dir.join("tx_idempotency.json"))),
        audit: Arc::new(AuditLogger::new(dir.join("logs").join("service_audit.log"))),
        metrics: Arc::new(ServiceMetrics::new()),
        wallet,
        tx_engine,
        node_manager,
        started_at: Instant::now(),
    });
    let router = build_router(state);
    let body = r#"{"password":"hunter2-longer-than-eight-bytes"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/wallet/create")
        .header("x-ez-token", TOKEN)
        .header("content-length", body.len().to_string())
        .body(Body::from(body))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn wallet_create_then_show_round_trips() {
    let dir = temp_dir("create-show");
    let state = test_state(dir);
    let router = build_router(state);

    let body = r#"{"name":"main","password":"hunter2"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/wallet/create")
        .header("x-ez-token", TOKEN)
        .header("content-length", body.len().to_string())
        .body(Body::from(body))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert!(created["data"]["address"].as_str().unwrap().starts_with("0x"));

    let response = router
        .oneshot(Request::builder().uri("/wallet/show").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let shown = body_json(response).await;
    assert_eq!(shown["data"]["address"], created["data"]["address"]);
}

/// Property from §4.6/§8: the nonce is claimed strictly before the
/// idempotency check, so a replayed nonce is rejected (409-ish path) even
/// when paired with a brand-new `client_tx_id`, and a reused `client_tx_id`
/// is rejected even behind a fresh nonce.
#[tokio::test]
async fn tx_send_enforces_nonce_before_idempotency_ordering() {
    let dir = temp_dir("tx-send-order");
    let state = test_state(dir);
    let router = build_router(state);

    let create_body = r#"{"name":"main","password":"hunter2"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/wallet/create")
        .header("x-ez-token", TOKEN)
        .header("content-length", create_body.len().to_string())
        .body(Body::from(create_body))
        .unwrap();
    router.clone().oneshot(request).await.unwrap();

    let faucet_body = r#"{"amount":1000}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/tx/faucet")
        .header("x-ez-token", TOKEN)
        .header("content-length", faucet_body.len().to_string())
        .body(Body::from(faucet_body))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let send_body = r#"{"recipient":"0xabcabcabcabcabcabcabcabcabcabcabcabcabc","amount":10,"client_tx_id":"order-test-1"}"#;
    let first = Request::builder()
        .method("POST")
        .uri("/tx/send")
        .header("x-ez-token", TOKEN)
        .header("x-ez-nonce", "nonce-alpha")
        .header("content-length", send_body.len().to_string())
        .body(Body::from(send_body))
        .unwrap();
    let response = router.clone().oneshot(first).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same nonce reused with a fresh client_tx_id: rejected on the nonce,
    // never reaches the idempotency check.
    let send_body_2 = r#"{"recipient":"0xabcabcabcabcabcabcabcabcabcabcabcabcabc","amount":10,"client_tx_id":"order-test-2"}"#;
    let replay = Request::builder()
        .method("POST")
        .uri("/tx/send")
        .header("x-ez-token", TOKEN)
        .header("x-ez-nonce", "nonce-alpha")
        .header("content-length", send_body_2.len().to_string())
        .body(Body::from(send_body_2))
        .unwrap();
    let response = router.clone().oneshot(replay).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "replay_detected");

    // Fresh nonce, but the same client_tx_id as the first call: rejected by
    // idempotency.
    let duplicate = Request::builder()
        .method("POST")
        .uri("/tx/send")
        .header("x-ez-token", TOKEN)
        .header("x-ez-nonce", "nonce-beta")
        .header("content-length", send_body.len().to_string())
        .body(Body::from(send_body))
        .unwrap();
    let response = router.oneshot(duplicate).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "duplicate_transaction");
}

#[tokio::test]
async fn tx_send_without_nonce_is_rejected() {
    let dir = temp_dir("no-nonce");
    let state = test_state(dir);
    let router = build_router(state);

    let create_body = r#"{"name":"main","password":"hunter2"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/wallet/create")
        .header("x-ez-token", TOKEN)
        .header("content-length", create_body.len().to_string())
        .body(Body::from(create_body))
        .unwrap();
    router.clone().oneshot(request).await.unwrap();

    let send_body = r#"{"recipient":"0xabcabcabcabcabcabcabcabcabcabcabcabcabc","amount":10}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/tx/send")
        .header("x-ez-token", TOKEN)
        .header("content-length", send_body.len().to_string())
        .body(Body::from(send_body))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error"]["code"], "nonce_required");
}
