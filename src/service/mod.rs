//! Submission Service (C10): the loopback HTTP surface over the Tx
//! Engine/Wallet Store/Node Manager collaborators, grounded in the Flask-ish
//! route handlers of `original_source/EZ_App/service.py` and rebuilt on
//! `axum`, the HTTP stack the pack's service-style repos reach for.

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::{Method, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router as AxumRouter;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::audit::AuditLogger;
use crate::collaborators::{NodeManager, TxEngine, WalletStore};
use crate::config::EzChainConfig;
use crate::metrics::ServiceMetrics;
use crate::security::idempotency::IdempotencyStore;
use crate::security::nonce::NonceGuard;
use crate::util::now_rfc3339;

pub struct AppState {
    pub token: String,
    pub config: EzChainConfig,
    pub wallet: Arc<dyn WalletStore>,
    pub tx_engine: Arc<dyn TxEngine>,
    pub node_manager: Arc<dyn NodeManager>,
    pub nonce_guard: Arc<NonceGuard>,
    pub idempotency: Arc<IdempotencyStore>,
    pub audit: Arc<AuditLogger>,
    pub metrics: Arc<ServiceMetrics>,
    pub started_at: Instant,
}

pub fn build_router(state: Arc<AppState>) -> AxumRouter {
    AxumRouter::new()
        .route("/health", get(routes::health))
        .route("/", get(routes::ui_panel))
        .route("/ui", get(routes::ui_panel))
        .route("/wallet/show", get(routes::wallet_show))
        .route("/wallet/balance", get(routes::wallet_balance))
        .route("/tx/history", get(routes::tx_history))
        .route("/node/status", get(routes::node_status))
        .route("/metrics", get(routes::metrics))
        .route("/network/info", get(routes::network_info))
        .route("/wallet/create", post(routes::wallet_create))
        .route("/wallet/import", post(routes::wallet_import))
        .route("/tx/faucet", post(routes::tx_faucet))
        .route("/tx/send", post(routes::tx_send))
        .route("/node/start", post(routes::node_start))
        .route("/node/stop", post(routes::node_stop))
        .fallback(routes::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), content_length_guard))
        .layer(middleware::from_fn_with_state(state.clone(), record_outcome))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Every outcome passes through the Audit Logger and Metrics Counter
/// (§4.6): applied *after* `content_length_guard` in `build_router`, which
/// makes this the outer of the two, so it still observes the early
/// rejections `content_length_guard` produces instead of being skipped by
/// them. `TraceLayer`/`CorsLayer`, applied later still, wrap both.
async fn record_outcome(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let remote = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let response = next.run(request).await;
    let status = response.status().as_u16();
    let error_code = response
        .headers()
        .get(error::ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    state.metrics.record_response(status, error_code.as_deref());
    state
        .audit
        .log(serde_json::json!({
            "event": "http_request",
            "time": now_rfc3339(),
            "remote": remote,
            "method": method,
            "path": path,
            "status": status,
            "ok": status < 400,
            "error_code": error_code,
        }))
        .await;
    response
}

/// Enforces the pre-read `Content-Length` checks from §4.6: POSTs without a
/// `Content-Length` header are rejected, and oversized bodies are rejected
/// before axum buffers them.
async fn content_length_guard(State(state): State<Arc<AppState>>, request: Request<axum::body::Body>, next: Next) -> Response {
    use axum::response::IntoResponse;
    if request.method() == Method::POST {
        let Some(header) = request.headers().get(axum::http::header::CONTENT_LENGTH) else {
            return error::ServiceError::InvalidContentLength.into_response();
        };
        let Ok(len) = header.to_str().unwrap_or("").parse::<u64>() else {
            return error::ServiceError::InvalidContentLength.into_response();
        };
        if len > state.config.security.max_payload_bytes {
            return error::ServiceError::PayloadTooLarge.into_response();
        }
    }
    next.run(request).await
}

pub(crate) fn require_token(state: &AppState, headers: &axum::http::HeaderMap) -> Result<(), error::ServiceError> {
    let provided = headers
        .get("X-EZ-Token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided.is_empty() || provided != state.token {
        return Err(error::ServiceError::Unauthorized);
    }
    Ok(())
}

pub(crate) fn validate_nonce_format(nonce: &str) -> bool {
    !nonce.is_empty() && nonce.len() <= 128 && nonce.chars().all(|c| c.is_ascii_graphic())
}

pub(crate) fn validate_client_tx_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 128 && id.chars().all(|c| c.is_ascii_graphic() && c != ' ')
}
