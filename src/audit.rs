//! Audit logger (C7), ported from `AuditLogger` in
//! `original_source/EZ_App/service.py`: append-only JSON-lines file with
//! recursive secret-field redaction, guarded by its own lock per the
//! teacher's persisted-resource idiom.

use std::io::Write;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::warn;

const REDACT_KEYS: &[&str] = &[
    "password",
    "mnemonic",
    "encrypted_private_key",
    "X-EZ-Password",
    "X-EZ-Token",
];

pub struct AuditLogger {
    log_file: PathBuf,
    state: Mutex<()>,
}

impl AuditLogger {
    pub fn new(log_file: PathBuf) -> Self {
        if let Some(parent) = log_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self {
            log_file,
            state: Mutex::new(()),
        }
    }

    fn sanitize(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, item) in map {
                    if REDACT_KEYS.contains(&key.as_str()) {
                        out.insert(key.clone(), serde_json::Value::String("***".to_string()));
                    } else {
                        out.insert(key.clone(), Self::sanitize(item));
                    }
                }
                serde_json::Value::Object(out)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::sanitize).collect())
            }
            other => other.clone(),
        }
    }

    pub async fn log(&self, event: serde_json::Value) {
        let sanitized = Self::sanitize(&event);
        let line = sanitized.to_string();
        let _guard = self.state.lock().await;
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .and_then(|mut file| writeln!(file, "{line}"));
        if let Err(err) = result {
            warn!(error = %err, "audit_write_failed");
        }
    }
}
