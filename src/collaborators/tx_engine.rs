//! Transaction engine (C6 collaborator), grounded in `TxEngine` from
//! `original_source/EZ_App/runtime.py`. The original backs `send`/`faucet`
//! with the VPB value-collection ledger and a `TxPool`; both are out of
//! scope here, so `SimpleTxEngine` substitutes a plain additive per-address
//! balance file. Idempotency is no longer embedded in this component — it
//! now lives in [`crate::security::idempotency`], checked by the caller
//! before `send` is invoked.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::util::random_token;

#[derive(Debug, Error)]
pub enum TxEngineError {
    #[error("amount_must_be_positive")]
    AmountMustBePositive,
    #[error("amount_exceeds_limit")]
    AmountExceedsLimit,
    #[error("recipient_required")]
    RecipientRequired,
    #[error("insufficient_balance")]
    InsufficientBalance,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TxEngineError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::AmountMustBePositive => "amount_must_be_positive",
            Self::AmountExceedsLimit => "amount_exceeds_limit",
            Self::RecipientRequired => "recipient_required",
            Self::InsufficientBalance => "insufficient_balance",
            Self::Io(_) => "internal_error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxResult {
    pub tx_hash: String,
    pub submit_hash: String,
    pub amount: i64,
    pub recipient: String,
    pub status: String,
    pub client_tx_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub address: String,
    pub available_balance: i64,
    pub total_balance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetResult {
    pub address: String,
    pub faucet_amount: i64,
    pub available_balance: i64,
    pub total_balance: i64,
}

#[async_trait]
pub trait TxEngine: Send + Sync {
    async fn faucet(&self, address: &str, amount: i64) -> Result<FaucetResult, TxEngineError>;
    async fn send(
        &self,
        address: &str,
        recipient: &str,
        amount: i64,
        client_tx_id: Option<String>,
    ) -> Result<TxResult, TxEngineError>;
    async fn balance(&self, address: &str) -> Result<BalanceInfo, TxEngineError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    balances: HashMap<String, i64>,
}

pub struct SimpleTxEngine {
    ledger_file: PathBuf,
    max_tx_amount: i64,
    state: Mutex<()>,
}

impl SimpleTxEngine {
    pub fn new<P: AsRef<Path>>(data_dir: P, max_tx_amount: i64) -> Result<Self, TxEngineError> {
        let dir = data_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            ledger_file: dir.join("ledger.json"),
            max_tx_amount,
            state: Mutex::new(()),
        })
    }

    fn load(&self) -> Ledger {
        std::fs::read_to_string(&self.ledger_file)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }

    fn save(&self, ledger: &Ledger) -> Result<(), TxEngineError> {
        std::fs::write(&self.ledger_file, serde_json::to_string_pretty(ledger).unwrap())?;
        Ok(())
    }
}

#[async_trait]
impl TxEngine for SimpleTxEngine {
    async fn faucet(&self, address: &str, amount: i64) -> Result<FaucetResult, TxEngineError> {
        if amount <= 0 {
            return Err(TxEngineError::AmountMustBePositive);
        }
        let _guard = self.state.lock().await;
        let mut ledger = self.load();
        let balance = ledger.balances.entry(address.to_string()).or_insert(0);
        *balance += amount;
        let total = *balance;
        self.save(&ledger)?;
        Ok(FaucetResult {
            address: address.to_string(),
            faucet_amount: amount,
            available_balance: total,
            total_balance: total,
        })
    }

    async fn send(
        &self,
        address: &str,
        recipient: &str,
        amount: i64,
        client_tx_id: Option<String>,
    ) -> Result<TxResult, TxEngineError> {
        if amount <= 0 {
            return Err(TxEngineError::AmountMustBePositive);
        }
        if amount > self.max_tx_amount {
            return Err(TxEngineError::AmountExceedsLimit);
        }
        if recipient.is_empty() {
            return Err(TxEngineError::RecipientRequired);
        }
        let _guard = self.state.lock().await;
        let mut ledger = self.load();
        let balance = ledger.balances.entry(address.to_string()).or_insert(0);
        if *balance < amount {
            return Err(TxEngineError::InsufficientBalance);
        }
        *balance -= amount;
        *ledger.balances.entry(recipient.to_string()).or_insert(0) += amount;
        self.save(&ledger)?;

        Ok(TxResult {
            tx_hash: format!("0x{}", random_token(32)),
            submit_hash: format!("0x{}", random_token(32)),
            amount,
            recipient: recipient.to_string(),
            status: "submitted".to_string(),
            client_tx_id,
        })
    }

    async fn balance(&self, address: &str) -> Result<BalanceInfo, TxEngineError> {
        let ledger = self.load();
        let balance = *ledger.balances.get(address).unwrap_or(&0);
        Ok(BalanceInfo {
            address: address.to_string(),
            available_balance: balance,
            total_balance: balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_engine() -> SimpleTxEngine {
        let dir = std::env::temp_dir().join(format!("ezchain-tx-{}", random_token(8)));
        SimpleTxEngine::new(dir, 100_000_000).unwrap()
    }

    #[tokio::test]
    async fn faucet_then_balance_reflects_minted_amount() {
        let engine = temp_engine();
        engine.faucet("0xabc", 500).await.unwrap();
        let balance = engine.balance("0xabc").await.unwrap();
        assert_eq!(balance.available_balance, 500);
    }

    #[tokio::test]
    async fn send_moves_funds_between_addresses() {
        let engine = temp_engine();
        engine.faucet("0xabc", 500).await.unwrap();
        let result = engine.send("0xabc", "0xdef", 200, None).await.unwrap();
        assert_eq!(result.amount, 200);
        assert_eq!(engine.balance("0xabc").await.unwrap().available_balance, 300);
        assert_eq!(engine.balance("0xdef").await.unwrap().available_balance, 200);
    }

    #[tokio::test]
    async fn send_with_insufficient_balance_is_rejected() {
        let engine = temp_engine();
        let err = engine.send("0xabc", "0xdef", 50, None).await;
        assert!(matches!(err, Err(TxEngineError::InsufficientBalance)));
    }

    #[tokio::test]
    async fn send_rejects_non_positive_amount_and_empty_recipient() {
        let engine = temp_engine();
        assert!(matches!(
            engine.send("0xabc", "0xdef", 0, None).await,
            Err(TxEngineError::AmountMustBePositive)
        ));
        assert!(matches!(
            engine.send("0xabc", "", 10, None).await,
            Err(TxEngineError::RecipientRequired)
        ));
    }

    #[tokio::test]
    async fn send_above_max_amount_is_rejected() {
        let engine = SimpleTxEngine::new(
            std::env::temp_dir().join(format!("ezchain-tx-{}", random_token(8))),
            100,
        )
        .unwrap();
        engine.faucet("0xabc", 1000).await.unwrap();
        assert!(matches!(
            engine.send("0xabc", "0xdef", 500, None).await,
            Err(TxEngineError::AmountExceedsLimit)
        ));
    }
}
