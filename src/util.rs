//! Small time and token helpers shared across modules.

use rand::RngCore;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since epoch, for envelope timestamps and history items.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Wall-clock seconds since epoch, for nonce/idempotency persistence.
pub fn now_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// An opaque random hex token, used for `msg_id`, synthesized `node_id`, and
/// synthesized `client_tx_id` values.
pub fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// RFC3339 timestamp for audit lines and history items.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
