//! CLI surface (§6 minimum): `wallet`, `tx`, `node`, `network`, `auth`,
//! `serve`. Subcommands other than `serve` act directly on the
//! collaborators in-process rather than round-tripping through the HTTP
//! API, the way the teacher's own `main.rs` drove its `Network` directly
//! instead of shelling out to itself.

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::collaborators::{FileNodeManager, FileWalletStore, NodeManager, SimpleTxEngine, TxEngine, WalletStore};
use crate::config::EzChainConfig;

#[derive(Parser)]
#[command(name = "ezchain", version, about = "EZchain P2P router and account submission service")]
pub struct Cli {
    /// Path to the config file (JSON or restricted YAML).
    #[arg(short, long, default_value = "ezchain.yaml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Wallet lifecycle.
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },
    /// Send or mint funds.
    Tx {
        #[command(subcommand)]
        action: TxAction,
    },
    /// Control the embedded P2P node process.
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },
    /// Inspect or switch network profiles.
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },
    /// Auth token inspection.
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Run the router + submission service.
    Serve {
        /// Overrides `network.role` from the config file ("account",
        /// "consensus", or "pool_gateway").
        #[arg(long)]
        role: Option<String>,
        /// Overrides `network.identity_private_key_file`.
        #[arg(long)]
        identity_private_key_file: Option<String>,
        /// Overrides `network.identity_public_key_file`.
        #[arg(long)]
        identity_public_key_file: Option<String>,
        /// Overrides `network.enforce_identity_verification` to true.
        #[arg(long)]
        enforce_identity_verification: bool,
        /// Overrides `network.signed_message_types` (comma-separated).
        #[arg(long, value_delimiter = ',')]
        signed_message_types: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum WalletAction {
    Create {
        #[arg(long, default_value = "default")]
        name: String,
        #[arg(long)]
        password: String,
    },
    Import {
        #[arg(long)]
        mnemonic: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "default")]
        name: String,
    },
    Show,
    Balance,
}

#[derive(Subcommand)]
pub enum TxAction {
    Send {
        #[arg(long)]
        recipient: String,
        #[arg(long)]
        amount: i64,
        #[arg(long)]
        client_tx_id: Option<String>,
    },
    Faucet {
        #[arg(long)]
        amount: i64,
    },
}

#[derive(Subcommand)]
pub enum NodeAction {
    Start {
        #[arg(long, default_value_t = 1)]
        consensus: u32,
        #[arg(long, default_value_t = 1)]
        accounts: u32,
        #[arg(long, default_value_t = 19500)]
        start_port: u16,
    },
    Stop,
    Status,
}

#[derive(Subcommand)]
pub enum NetworkAction {
    Info,
    SetProfile { name: String },
    ListProfiles,
}

#[derive(Subcommand)]
pub enum AuthAction {
    ShowToken,
}

/// Exit codes from §6: 0 success, 1 handled error, 130 on interruption.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_HANDLED_ERROR: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

/// Dispatches every subcommand except `serve`, which `main` handles directly
/// since it owns the router/service long-running setup.
pub async fn dispatch(config: &EzChainConfig, command: Command) -> i32 {
    match command {
        Command::Serve { .. } => {
            eprintln!("error: serve must be run through the main entrypoint");
            EXIT_HANDLED_ERROR
        }
        Command::Wallet { action } => run_wallet(config, action).await,
        Command::Tx { action } => run_tx(config, action).await,
        Command::Node { action } => run_node(config, action).await,
        Command::Network { action } => run_network(config, action),
        Command::Auth { action } => run_auth(config, action),
    }
}

fn wallet_store(config: &EzChainConfig) -> Arc<dyn WalletStore> {
    Arc::new(FileWalletStore::new(&config.app.data_dir).expect("failed to open wallet store"))
}

fn tx_engine(config: &EzChainConfig) -> Arc<dyn TxEngine> {
    Arc::new(SimpleTxEngine::new(&config.app.data_dir, config.security.max_tx_amount).expect("failed to open tx engine"))
}

fn node_manager(config: &EzChainConfig) -> Arc<dyn NodeManager> {
    Arc::new(FileNodeManager::new(&config.app.data_dir, ".").expect("failed to open node manager"))
}

async fn run_wallet(config: &EzChainConfig, action: WalletAction) -> i32 {
    let store = wallet_store(config);
    match action {
        WalletAction::Create { name, password } => match store.create_wallet(&password, &name, None).await {
            Ok(record) => {
                println!("address: {}", record.address);
                println!("mnemonic: {}", record.mnemonic);
                EXIT_SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                EXIT_HANDLED_ERROR
            }
        },
        WalletAction::Import { mnemonic, password, name } => {
            match store.import_wallet(&mnemonic, &password, &name).await {
                Ok(record) => {
                    println!("address: {}", record.address);
                    EXIT_SUCCESS
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    EXIT_HANDLED_ERROR
                }
            }
        }
        WalletAction::Show => match store.summary().await {
            Ok(summary) => {
                println!("{}", serde_json::to_string_pretty(&summary).unwrap());
                EXIT_SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                EXIT_HANDLED_ERROR
            }
        },
        WalletAction::Balance => {
            let engine = tx_engine(config);
            match store.summary().await {
                Ok(summary) => match engine.balance(&summary.address).await {
                    Ok(balance) => {
                        println!("{}", serde_json::to_string_pretty(&balance).unwrap());
                        EXIT_SUCCESS
                    }
                    Err(err) => {
                        eprintln!("error: {err}");
                        EXIT_HANDLED_ERROR
                    }
                },
                Err(err) => {
                    eprintln!("error: {err}");
                    EXIT_HANDLED_ERROR
                }
            }
        }
    }
}

async fn run_tx(config: &EzChainConfig, action: TxAction) -> i32 {
    let store = wallet_store(config);
    let engine = tx_engine(config);
    let summary = match store.summary().await {
        Ok(s) => s,
        Err(err) => {
            eprintln!("error: {err}");
            return EXIT_HANDLED_ERROR;
        }
    };
    match action {
        TxAction::Send { recipient, amount, client_tx_id } => {
            match engine.send(&summary.address, &recipient, amount, client_tx_id).await {
                Ok(result) => {
                    println!("{}", serde_json::to_string_pretty(&result).unwrap());
                    EXIT_SUCCESS
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    EXIT_HANDLED_ERROR
                }
            }
        }
        TxAction::Faucet { amount } => match engine.faucet(&summary.address, amount).await {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result).unwrap());
                EXIT_SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                EXIT_HANDLED_ERROR
            }
        },
    }
}

async fn run_node(config: &EzChainConfig, action: NodeAction) -> i32 {
    let manager = node_manager(config);
    let result = match action {
        NodeAction::Start { consensus, accounts, start_port } => manager.start(consensus, accounts, start_port).await,
        NodeAction::Stop => manager.stop().await,
        NodeAction::Status => manager.status().await,
    };
    match result {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report).unwrap());
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            EXIT_HANDLED_ERROR
        }
    }
}

fn run_network(config: &EzChainConfig, action: NetworkAction) -> i32 {
    match action {
        NetworkAction::Info => {
            println!("{}", serde_json::to_string_pretty(&config.network).unwrap());
            EXIT_SUCCESS
        }
        NetworkAction::SetProfile { name } => {
            println!("profile switching is not implemented; current profile is '{}'", config.network.name);
            let _ = name;
            EXIT_HANDLED_ERROR
        }
        NetworkAction::ListProfiles => {
            println!("{}", config.network.name);
            EXIT_SUCCESS
        }
    }
}

fn run_auth(config: &EzChainConfig, action: AuthAction) -> i32 {
    match action {
        AuthAction::ShowToken => match crate::config::load_api_token(config) {
            Ok(token) => {
                println!("{token}");
                EXIT_SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                EXIT_HANDLED_ERROR
            }
        },
    }
}
