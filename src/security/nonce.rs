//! Nonce replay guard (C5), a direct port of `NonceGuard` in
//! `original_source/EZ_App/service.py`: claim-once-per-TTL semantics backed
//! by a JSON file, guarded by an async mutex per the teacher's idiom of
//! wrapping every persisted resource in its own lock
//! (`montana/src/net/connection.rs::BanList`).

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::warn;

use crate::util::now_secs_f64;

pub struct NonceGuard {
    nonce_file: PathBuf,
    ttl_seconds: u64,
    state: Mutex<()>,
}

impl NonceGuard {
    pub fn new(nonce_file: PathBuf, ttl_seconds: u64) -> Self {
        Self {
            nonce_file,
            ttl_seconds: ttl_seconds.max(1),
            state: Mutex::new(()),
        }
    }

    fn load(&self) -> HashMap<String, f64> {
        let Ok(text) = std::fs::read_to_string(&self.nonce_file) else {
            return HashMap::new();
        };
        serde_json::from_str(&text).unwrap_or_default()
    }

    fn save(&self, data: &HashMap<String, f64>) {
        if let Some(parent) = self.nonce_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(data) {
            Ok(text) => {
                if let Err(err) = std::fs::write(&self.nonce_file, text) {
                    warn!(error = %err, "nonce_save_failed");
                }
            }
            Err(err) => warn!(error = %err, "nonce_serialize_failed"),
        }
    }

    /// Claims `nonce` exactly once within `ttl_seconds`. Returns `false` for
    /// an empty nonce or one already claimed and unexpired — the replay case.
    pub async fn claim(&self, nonce: &str) -> bool {
        if nonce.is_empty() {
            return false;
        }
        let _guard = self.state.lock().await;
        let now = now_secs_f64();
        let mut data = self.load();
        data.retain(|_, expiry| *expiry > now);

        if let Some(expiry) = data.get(nonce) {
            if *expiry > now {
                return false;
            }
        }

        data.insert(nonce.to_string(), now + self.ttl_seconds as f64);
        self.save(&data);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ezchain-nonce-test-{}-{}.json", name, crate::util::random_token(4)))
    }

    #[tokio::test]
    async fn empty_nonce_is_rejected() {
        let guard = NonceGuard::new(temp_path("empty"), 60);
        assert!(!guard.claim("").await);
    }

    #[tokio::test]
    async fn first_claim_succeeds_second_is_replay() {
        let path = temp_path("replay");
        let guard = NonceGuard::new(path.clone(), 60);
        assert!(guard.claim("abc").await);
        assert!(!guard.claim("abc").await);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn expired_nonce_can_be_reclaimed() {
        let path = temp_path("expiry");
        let guard = NonceGuard::new(path.clone(), 0);
        assert!(guard.claim("abc").await);
        // ttl clamps to 1s minimum but we want to simulate pure expiry, so
        // directly stamp the file with a past expiry.
        let mut expired = HashMap::new();
        expired.insert("abc".to_string(), now_secs_f64() - 10.0);
        std::fs::write(&path, serde_json::to_string(&expired).unwrap()).unwrap();
        assert!(guard.claim("abc").await);
        let _ = std::fs::remove_file(path);
    }
}
