//! Collaborator interfaces (§6/§4.12): Tx Engine, Wallet Store, Node
//! Manager. The core only depends on these trait contracts; the concrete
//! implementations here are simple stand-ins for the excluded VPB/ledger
//! logic, sufficient to exercise the submission service end-to-end.

pub mod crypto_kdf;
pub mod node_manager;
pub mod tx_engine;
pub mod wallet;

pub use node_manager::{FileNodeManager, NodeManager, NodeManagerError, NodeStatus, NodeStatusReport};
pub use tx_engine::{BalanceInfo, FaucetResult, SimpleTxEngine, TxEngine, TxEngineError, TxResult};
pub use wallet::{
    EncryptedPrivateKey, FileWalletStore, UnlockedWallet, WalletRecord, WalletStore, WalletStoreError,
    WalletSummary,
};
