//! HTTP handlers for the route table in §4.6, each wrapping a collaborator
//! call with the audit/metrics recording the teacher's `service.py` source
//! performs around every request.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::error::ServiceError;
use super::{require_token, validate_client_tx_id, validate_nonce_format, AppState};
use crate::util::{now_rfc3339, random_token};

type AppResult<T> = Result<T, ServiceError>;

fn ok(data: serde_json::Value) -> Response {
    Json(json!({ "ok": true, "data": data })).into_response()
}

async fn record(state: &AppState, event: &str, extra: serde_json::Value) {
    let mut payload = json!({ "event": event });
    if let (Some(map), Some(extra_map)) = (payload.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_map {
            map.insert(k.clone(), v.clone());
        }
    }
    state.audit.log(payload).await;
}

pub async fn health() -> Response {
    ok(json!({ "status": "ok", "time": now_rfc3339() }))
}

pub async fn ui_panel() -> Html<&'static str> {
    Html(UI_HTML)
}

const UI_HTML: &str = r#"<!doctype html>
<html><head><title>ezchain</title></head>
<body>
<h1>ezchain node panel</h1>
<p>Use the HTTP API documented in the project README. This page is a static placeholder.</p>
</body></html>"#;

pub async fn not_found() -> Response {
    ServiceError::NotFound.into_response()
}

pub async fn wallet_show(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let summary = state.wallet.summary().await?;
    Ok(ok(serde_json::to_value(summary).unwrap()))
}

pub async fn wallet_balance(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let password = headers
        .get("X-EZ-Password")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if password.is_empty() {
        return Err(ServiceError::PasswordRequired);
    }
    let unlocked = state.wallet.unlock(password).await.map_err(|_| ServiceError::BalanceFailed)?;
    let balance = state
        .tx_engine
        .balance(&unlocked.record.address)
        .await
        .map_err(|_| ServiceError::BalanceFailed)?;
    Ok(ok(serde_json::to_value(balance).unwrap()))
}

pub async fn tx_history(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let history = state.wallet.history().await?;
    Ok(ok(json!({ "items": history })))
}

pub async fn node_status(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let report = state.node_manager.status().await?;
    let status = format!("{:?}", report.status).to_lowercase();
    state.metrics.record_node_status(&status);
    Ok(ok(serde_json::to_value(report).unwrap()))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let node_status = state
        .node_manager
        .status()
        .await
        .map(|r| format!("{:?}", r.status).to_lowercase())
        .unwrap_or_else(|_| "stopped".to_string());
    state.metrics.record_node_status(&node_status);
    let snapshot = state.metrics.snapshot(&node_status);
    ok(serde_json::to_value(snapshot).unwrap())
}

pub async fn network_info(State(state): State<Arc<AppState>>) -> Response {
    let net = &state.config.network;
    ok(json!({
        "name": net.name,
        "bootstrap_nodes": net.bootstrap_nodes,
        "consensus_nodes": net.consensus_nodes,
        "account_nodes": net.account_nodes,
    }))
}

#[derive(Deserialize)]
pub struct WalletCreateBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    password: String,
}

pub async fn wallet_create(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<WalletCreateBody>>,
) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let Json(body) = body.ok_or(ServiceError::InvalidRequest)?;
    if body.password.is_empty() {
        return Err(ServiceError::PasswordRequired);
    }
    let name = body.name.unwrap_or_else(|| "default".to_string());
    let created = state.wallet.create_wallet(&body.password, &name, None).await?;
    record(&state, "wallet_create", json!({ "address": created.address })).await;
    Ok(ok(json!({ "address": created.address, "mnemonic": created.mnemonic })))
}

#[derive(Deserialize)]
pub struct WalletImportBody {
    mnemonic: String,
    password: String,
    #[serde(default)]
    name: Option<String>,
}

pub async fn wallet_import(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<WalletImportBody>>,
) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let Json(body) = body.ok_or(ServiceError::InvalidRequest)?;
    if body.mnemonic.is_empty() || body.password.is_empty() {
        return Err(ServiceError::InvalidRequest);
    }
    let name = body.name.unwrap_or_else(|| "default".to_string());
    let imported = state.wallet.import_wallet(&body.mnemonic, &body.password, &name).await?;
    Ok(ok(json!({ "address": imported.address })))
}

#[derive(Deserialize)]
pub struct FaucetBody {
    amount: i64,
    #[serde(default)]
    #[allow(dead_code)]
    password: String,
}

pub async fn tx_faucet(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<FaucetBody>>,
) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let Json(body) = body.ok_or(ServiceError::InvalidRequest)?;
    let summary = state.wallet.summary().await?;
    let result = state.tx_engine.faucet(&summary.address, body.amount).await?;
    Ok(ok(serde_json::to_value(result).unwrap()))
}

#[derive(Deserialize)]
pub struct SendBody {
    recipient: String,
    amount: i64,
    #[serde(default)]
    #[allow(dead_code)]
    password: String,
    #[serde(default)]
    client_tx_id: Option<String>,
}

/// The nonce-then-idempotency ordering from §4.6/§8's testable property 5:
/// a duplicate `client_tx_id` is rejected even with a fresh nonce, and a
/// replayed nonce is rejected even with a fresh `client_tx_id` — enforced
/// here by claiming the nonce strictly before the idempotency lookup.
pub async fn tx_send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<SendBody>>,
) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let started = Instant::now();

    let nonce = headers.get("X-EZ-Nonce").and_then(|v| v.to_str().ok()).unwrap_or("");
    if nonce.is_empty() {
        return Err(ServiceError::NonceRequired);
    }
    if !validate_nonce_format(nonce) {
        return Err(ServiceError::InvalidNonceFormat);
    }
    if !state.nonce_guard.claim(nonce).await {
        return Err(ServiceError::ReplayDetected);
    }

    let Json(body) = body.ok_or(ServiceError::InvalidRequest)?;
    let client_tx_id = match body.client_tx_id {
        Some(id) if !id.is_empty() => {
            if !validate_client_tx_id(&id) {
                return Err(ServiceError::InvalidClientTxId);
            }
            id
        }
        _ => random_token(16),
    };

    let summary = state.wallet.summary().await?;
    let idem_key = crate::security::idempotency::IdempotencyStore::key(&summary.address, &client_tx_id);
    match state.idempotency.try_reserve(&idem_key).await {
        crate::security::idempotency::Reservation::Reserved => {}
        crate::security::idempotency::Reservation::Pending
        | crate::security::idempotency::Reservation::AlreadyRecorded(_) => {
            state.metrics.record_tx_send(false, None, Some("duplicate_transaction"));
            return Err(ServiceError::DuplicateTransaction);
        }
    }

    let send_result = state
        .tx_engine
        .send(&summary.address, &body.recipient, body.amount, Some(client_tx_id.clone()))
        .await;

    let result = match send_result {
        Ok(result) => result,
        Err(err) => {
            state.idempotency.release(&idem_key).await;
            let service_err: ServiceError = err.into();
            state.metrics.record_tx_send(false, None, Some(service_err.code()));
            return Err(service_err);
        }
    };

    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    state.metrics.record_tx_send(true, Some(latency_ms), None);
    state
        .idempotency
        .record(&idem_key, result.tx_hash.clone(), result.submit_hash.clone(), result.amount, result.recipient.clone())
        .await;

    let history_item = json!({
        "tx_id": result.tx_hash,
        "submit_hash": result.submit_hash,
        "sender": summary.address,
        "recipient": result.recipient,
        "amount": result.amount,
        "status": result.status,
        "client_tx_id": result.client_tx_id,
        "timestamp": now_rfc3339(),
    });
    state.wallet.append_history(history_item.clone()).await?;
    record(&state, "tx_send", json!({ "tx_id": result.tx_hash })).await;
    Ok(ok(history_item))
}

#[derive(Deserialize)]
pub struct NodeStartBody {
    #[serde(default = "default_consensus")]
    consensus: u32,
    #[serde(default = "default_accounts")]
    accounts: u32,
    #[serde(default = "default_start_port")]
    start_port: u16,
}

fn default_consensus() -> u32 {
    1
}
fn default_accounts() -> u32 {
    1
}
fn default_start_port() -> u16 {
    19500
}

pub async fn node_start(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Option<Json<NodeStartBody>>,
) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let Json(body) = body.unwrap_or(Json(NodeStartBody {
        consensus: default_consensus(),
        accounts: default_accounts(),
        start_port: default_start_port(),
    }));
    let report = state.node_manager.start(body.consensus, body.accounts, body.start_port).await?;
    Ok(ok(serde_json::to_value(report).unwrap()))
}

pub async fn node_stop(State(state): State<Arc<AppState>>, headers: HeaderMap) -> AppResult<Response> {
    require_token(&state, &headers)?;
    let report = state.node_manager.stop().await?;
    Ok(ok(serde_json::to_value(report).unwrap()))
}
