//! The closed error-code set for HTTP responses (§6, §7), carried on a
//! `ServiceError` the way `TransportError`/`CryptoError` carry theirs
//! elsewhere in this crate.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::collaborators::{NodeManagerError, TxEngineError, WalletStoreError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("payload too large")]
    PayloadTooLarge,
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("invalid request body")]
    InvalidRequest,
    #[error("password required")]
    PasswordRequired,
    #[error("wallet not found")]
    WalletNotFound,
    #[error("nonce required")]
    NonceRequired,
    #[error("invalid nonce format")]
    InvalidNonceFormat,
    #[error("invalid client_tx_id format")]
    InvalidClientTxId,
    #[error("nonce already used")]
    ReplayDetected,
    #[error("duplicate transaction")]
    DuplicateTransaction,
    #[error("amount must be positive")]
    AmountMustBePositive,
    #[error("amount exceeds limit")]
    AmountExceedsLimit,
    #[error("recipient required")]
    RecipientRequired,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("send failed")]
    SendFailed,
    #[error("balance lookup failed")]
    BalanceFailed,
    #[error("internal error")]
    InternalError,
    #[error("not found")]
    NotFound,
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::PayloadTooLarge => "payload_too_large",
            Self::InvalidContentLength => "invalid_content_length",
            Self::InvalidRequest => "invalid_request",
            Self::PasswordRequired => "password_required",
            Self::WalletNotFound => "wallet_not_found",
            Self::NonceRequired => "nonce_required",
            Self::InvalidNonceFormat => "invalid_nonce_format",
            Self::InvalidClientTxId => "invalid_client_tx_id",
            Self::ReplayDetected => "replay_detected",
            Self::DuplicateTransaction => "duplicate_transaction",
            Self::AmountMustBePositive => "amount_must_be_positive",
            Self::AmountExceedsLimit => "amount_exceeds_limit",
            Self::RecipientRequired => "recipient_required",
            Self::InsufficientBalance => "insufficient_balance",
            Self::SendFailed => "send_failed",
            Self::BalanceFailed => "balance_failed",
            Self::InternalError => "internal_error",
            Self::NotFound => "not_found",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::WalletNotFound => StatusCode::NOT_FOUND,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ReplayDetected | Self::DuplicateTransaction => StatusCode::CONFLICT,
            Self::InvalidContentLength
            | Self::InvalidRequest
            | Self::PasswordRequired
            | Self::NonceRequired
            | Self::InvalidNonceFormat
            | Self::InvalidClientTxId
            | Self::AmountMustBePositive
            | Self::AmountExceedsLimit
            | Self::RecipientRequired
            | Self::InsufficientBalance => StatusCode::BAD_REQUEST,
            Self::SendFailed | Self::BalanceFailed | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<TxEngineError> for ServiceError {
    fn from(err: TxEngineError) -> Self {
        match err {
            TxEngineError::AmountMustBePositive => Self::AmountMustBePositive,
            TxEngineError::AmountExceedsLimit => Self::AmountExceedsLimit,
            TxEngineError::RecipientRequired => Self::RecipientRequired,
            TxEngineError::InsufficientBalance => Self::InsufficientBalance,
            TxEngineError::Io(_) => Self::SendFailed,
        }
    }
}

impl From<WalletStoreError> for ServiceError {
    fn from(err: WalletStoreError) -> Self {
        match err {
            WalletStoreError::NotFound => Self::WalletNotFound,
            _ => Self::InternalError,
        }
    }
}

impl From<NodeManagerError> for ServiceError {
    fn from(_: NodeManagerError) -> Self {
        Self::InternalError
    }
}

/// Header carrying the error code on failed responses, read back by the
/// audit/metrics middleware (`content_length_guard`'s sibling in
/// `service::mod`) without buffering the JSON body a second time.
pub const ERROR_CODE_HEADER: &str = "x-ez-error-code";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = Json(serde_json::json!({
            "ok": false,
            "error": { "code": code, "message": self.to_string() },
        }));
        let mut response = (status, body).into_response();
        if let Ok(value) = axum::http::HeaderValue::from_str(code) {
            response.headers_mut().insert(ERROR_CODE_HEADER, value);
        }
        response
    }
}
