//! Wallet persistence (C6 collaborator), ported from
//! `original_source/EZ_App/wallet_store.py`. Layout is unchanged:
//! `wallet.json` holds the encrypted identity, `tx_history.json` an
//! append-only list of sent transactions.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::collaborators::crypto_kdf::{self, CryptoKdfError};
use crate::util::now_rfc3339;

#[derive(Debug, Error)]
pub enum WalletStoreError {
    #[error("wallet already exists")]
    AlreadyExists,
    #[error("wallet not found")]
    NotFound,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed wallet file: {0}")]
    Malformed(String),
    #[error(transparent)]
    Crypto(#[from] CryptoKdfError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletSummary {
    pub address: String,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPrivateKey {
    pub ciphertext: String,
    pub salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub name: String,
    pub address: String,
    pub public_key_pem: String,
    pub encrypted_private_key: EncryptedPrivateKey,
    pub mnemonic: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockedWallet {
    #[serde(flatten)]
    pub record: WalletRecord,
    pub private_key_pem: String,
}

#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn exists(&self) -> bool;
    async fn create_wallet(
        &self,
        password: &str,
        name: &str,
        mnemonic: Option<String>,
    ) -> Result<WalletRecord, WalletStoreError>;
    async fn import_wallet(
        &self,
        mnemonic: &str,
        password: &str,
        name: &str,
    ) -> Result<WalletRecord, WalletStoreError>;
    async fn unlock(&self, password: &str) -> Result<UnlockedWallet, WalletStoreError>;
    async fn summary(&self) -> Result<WalletSummary, WalletStoreError>;
    async fn append_history(&self, record: serde_json::Value) -> Result<(), WalletStoreError>;
    async fn history(&self) -> Result<Vec<serde_json::Value>, WalletStoreError>;
}

pub struct FileWalletStore {
    wallet_file: PathBuf,
    history_file: PathBuf,
    state: Mutex<()>,
}

impl FileWalletStore {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self, WalletStoreError> {
        let base = data_dir.as_ref();
        std::fs::create_dir_all(base)?;
        Ok(Self {
            wallet_file: base.join("wallet.json"),
            history_file: base.join("tx_history.json"),
            state: Mutex::new(()),
        })
    }

    fn read_record(&self) -> Result<WalletRecord, WalletStoreError> {
        if !self.wallet_file.exists() {
            return Err(WalletStoreError::NotFound);
        }
        let text = std::fs::read_to_string(&self.wallet_file)?;
        serde_json::from_str(&text).map_err(|e| WalletStoreError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl WalletStore for FileWalletStore {
    async fn exists(&self) -> bool {
        self.wallet_file.exists()
    }

    async fn create_wallet(
        &self,
        password: &str,
        name: &str,
        mnemonic: Option<String>,
    ) -> Result<WalletRecord, WalletStoreError> {
        let _guard = self.state.lock().await;
        if self.wallet_file.exists() {
            return Err(WalletStoreError::AlreadyExists);
        }
        let mnemonic = match mnemonic {
            Some(m) => m,
            None => crypto_kdf::generate_mnemonic(12)?,
        };
        let derived = crypto_kdf::derive_keypair(&mnemonic, "")?;
        let encrypted = crypto_kdf::encrypt_text(&derived.private_key_pem, password)?;
        let record = WalletRecord {
            name: name.to_string(),
            address: derived.address,
            public_key_pem: derived.public_key_pem,
            encrypted_private_key: EncryptedPrivateKey {
                ciphertext: encrypted.ciphertext_b64,
                salt: encrypted.salt_b64,
            },
            mnemonic,
            created_at: now_rfc3339(),
        };
        std::fs::write(&self.wallet_file, serde_json::to_string_pretty(&record).unwrap())?;
        if !self.history_file.exists() {
            std::fs::write(&self.history_file, "[]")?;
        }
        Ok(record)
    }

    async fn import_wallet(
        &self,
        mnemonic: &str,
        password: &str,
        name: &str,
    ) -> Result<WalletRecord, WalletStoreError> {
        self.create_wallet(password, name, Some(mnemonic.to_string())).await
    }

    async fn unlock(&self, password: &str) -> Result<UnlockedWallet, WalletStoreError> {
        let record = self.read_record()?;
        let private_key_pem = crypto_kdf::decrypt_text(
            &record.encrypted_private_key.ciphertext,
            password,
            &record.encrypted_private_key.salt,
        )?;
        Ok(UnlockedWallet { record, private_key_pem })
    }

    async fn summary(&self) -> Result<WalletSummary, WalletStoreError> {
        let record = self.read_record()?;
        Ok(WalletSummary {
            address: record.address,
            name: record.name,
            created_at: record.created_at,
        })
    }

    async fn append_history(&self, record: serde_json::Value) -> Result<(), WalletStoreError> {
        let _guard = self.state.lock().await;
        let mut history = self.history().await?;
        history.push(record);
        std::fs::write(&self.history_file, serde_json::to_string_pretty(&history).unwrap())?;
        Ok(())
    }

    async fn history(&self) -> Result<Vec<serde_json::Value>, WalletStoreError> {
        if !self.history_file.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.history_file)?;
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> FileWalletStore {
        let dir = std::env::temp_dir().join(format!("ezchain-wallet-{}", crate::util::random_token(8)));
        FileWalletStore::new(dir).unwrap()
    }

    #[tokio::test]
    async fn create_then_unlock_round_trips_the_private_key() {
        let store = temp_store();
        let record = store.create_wallet("hunter2", "default", None).await.unwrap();
        let unlocked = store.unlock("hunter2").await.unwrap();
        assert_eq!(unlocked.record.address, record.address);
        assert!(unlocked.private_key_pem.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn creating_twice_is_rejected() {
        let store = temp_store();
        store.create_wallet("hunter2", "default", None).await.unwrap();
        let err = store.create_wallet("hunter2", "default", None).await;
        assert!(matches!(err, Err(WalletStoreError::AlreadyExists)));
    }

    #[tokio::test]
    async fn unlock_with_wrong_password_fails() {
        let store = temp_store();
        store.create_wallet("hunter2", "default", None).await.unwrap();
        assert!(store.unlock("wrong").await.is_err());
    }

    #[tokio::test]
    async fn append_history_persists_across_calls() {
        let store = temp_store();
        store.create_wallet("hunter2", "default", None).await.unwrap();
        store.append_history(serde_json::json!({"tx": "a"})).await.unwrap();
        store.append_history(serde_json::json!({"tx": "b"})).await.unwrap();
        let history = store.history().await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
