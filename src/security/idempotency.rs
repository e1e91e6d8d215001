//! Idempotency store (C6), lifted from the idempotency map embedded in
//! `original_source/EZ_App/runtime.py::TxEngine` into its own component per
//! the spec: checked before the Tx Engine collaborator is invoked, keyed
//! `"{sender}:{client_tx_id}"`.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::util::now_rfc3339;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub tx_hash: String,
    pub submit_hash: String,
    pub amount: i64,
    pub recipient: String,
    pub recorded_at: String,
}

/// Either a completed record, or a reservation placeholder claimed while a
/// send is in flight against the Tx Engine — see `try_reserve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state")]
enum Entry {
    Pending { reserved_at: String },
    Recorded(IdempotencyRecord),
}

/// Outcome of `try_reserve`: only `Reserved` entitles the caller to proceed
/// to the Tx Engine.
#[derive(Debug, Clone)]
pub enum Reservation {
    Reserved,
    Pending,
    AlreadyRecorded(IdempotencyRecord),
}

pub struct IdempotencyStore {
    file: PathBuf,
    state: Mutex<()>,
}

impl IdempotencyStore {
    pub fn new(file: PathBuf) -> Self {
        Self {
            file,
            state: Mutex::new(()),
        }
    }

    fn load(&self) -> HashMap<String, Entry> {
        let Ok(text) = std::fs::read_to_string(&self.file) else {
            return HashMap::new();
        };
        serde_json::from_str(&text).unwrap_or_default()
    }

    fn save(&self, data: &HashMap<String, Entry>) {
        if let Some(parent) = self.file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(data) {
            Ok(text) => {
                if let Err(err) = std::fs::write(&self.file, text) {
                    warn!(error = %err, "idempotency_save_failed");
                }
            }
            Err(err) => warn!(error = %err, "idempotency_serialize_failed"),
        }
    }

    pub fn key(sender: &str, client_tx_id: &str) -> String {
        format!("{sender}:{client_tx_id}")
    }

    /// `true` if `key` has already been recorded or reserved — kept for
    /// read-only callers; `tx_send` uses `try_reserve` instead so the
    /// check-then-insert happens under a single lock.
    pub async fn contains(&self, key: &str) -> bool {
        let _guard = self.state.lock().await;
        self.load().contains_key(key)
    }

    /// Atomically checks for a prior reservation/record and, if absent,
    /// claims `key` as pending — all under one lock, so two concurrent
    /// callers racing on the same `key` can never both observe `Reserved`
    /// (property: exactly one call reaches the Tx Engine per `key`). The
    /// loser must call `release` if it gives up, or the caller that wins
    /// must call `record` once the Tx Engine call succeeds.
    pub async fn try_reserve(&self, key: &str) -> Reservation {
        let _guard = self.state.lock().await;
        let mut data = self.load();
        match data.get(key) {
            Some(Entry::Recorded(record)) => Reservation::AlreadyRecorded(record.clone()),
            Some(Entry::Pending { .. }) => Reservation::Pending,
            None => {
                data.insert(
                    key.to_string(),
                    Entry::Pending {
                        reserved_at: now_rfc3339(),
                    },
                );
                self.save(&data);
                Reservation::Reserved
            }
        }
    }

    /// Releases a pending reservation after the Tx Engine call it guarded
    /// failed, so a retried request with the same `client_tx_id` isn't
    /// permanently blocked by a send that never went through.
    pub async fn release(&self, key: &str) {
        let _guard = self.state.lock().await;
        let mut data = self.load();
        if matches!(data.get(key), Some(Entry::Pending { .. })) {
            data.remove(key);
            self.save(&data);
        }
    }

    pub async fn record(&self, key: &str, tx_hash: String, submit_hash: String, amount: i64, recipient: String) {
        let _guard = self.state.lock().await;
        let mut data = self.load();
        data.insert(
            key.to_string(),
            Entry::Recorded(IdempotencyRecord {
                tx_hash,
                submit_hash,
                amount,
                recipient,
                recorded_at: now_rfc3339(),
            }),
        );
        self.save(&data);
    }
}
