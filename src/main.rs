use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use ezchain_core::cli::{self, Cli, Command};
use ezchain_core::collaborators::{FileNodeManager, FileWalletStore, SimpleTxEngine};
use ezchain_core::config::{self, EzChainConfig};
use ezchain_core::router::{Router, RouterConfig};
use ezchain_core::transport::tcp::{TcpTransport, TcpTransportConfig};
use ezchain_core::{audit::AuditLogger, metrics::ServiceMetrics};
use ezchain_core::security::{idempotency::IdempotencyStore, nonce::NonceGuard};
use ezchain_core::service::{build_router, AppState};
use ezchain_core::Network;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ezchain_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(err) => {
            eprintln!("error: failed to load config: {err}");
            std::process::exit(cli::EXIT_HANDLED_ERROR);
        }
    };
    if let Err(err) = config::ensure_directories(&config) {
        eprintln!("error: failed to prepare data directories: {err}");
        std::process::exit(cli::EXIT_HANDLED_ERROR);
    }

    let exit_code = match cli.command {
        Command::Serve {
            role,
            identity_private_key_file,
            identity_public_key_file,
            enforce_identity_verification,
            signed_message_types,
        } => {
            let mut config = config;
            if let Some(role) = role {
                config.network.role = role;
            }
            if let Some(path) = identity_private_key_file {
                config.network.identity_private_key_file = Some(path);
            }
            if let Some(path) = identity_public_key_file {
                config.network.identity_public_key_file = Some(path);
            }
            if enforce_identity_verification {
                config.network.enforce_identity_verification = true;
            }
            if !signed_message_types.is_empty() {
                config.network.signed_message_types = signed_message_types;
            }
            serve(config).await
        }
        other => cli::dispatch(&config, other).await,
    };
    std::process::exit(exit_code);
}

async fn serve(config: EzChainConfig) -> i32 {
    let token = match config::load_api_token(&config) {
        Ok(t) => t,
        Err(err) => {
            eprintln!("error: failed to load api token: {err}");
            return cli::EXIT_HANDLED_ERROR;
        }
    };

    let data_dir = std::path::PathBuf::from(&config.app.data_dir);
    let wallet = match FileWalletStore::new(&data_dir) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            eprintln!("error: failed to open wallet store: {err}");
            return cli::EXIT_HANDLED_ERROR;
        }
    };
    let tx_engine = match SimpleTxEngine::new(&data_dir, config.security.max_tx_amount) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            eprintln!("error: failed to open tx engine: {err}");
            return cli::EXIT_HANDLED_ERROR;
        }
    };
    let node_manager = match FileNodeManager::new(&data_dir, ".") {
        Ok(manager) => Arc::new(manager),
        Err(err) => {
            eprintln!("error: failed to open node manager: {err}");
            return cli::EXIT_HANDLED_ERROR;
        }
    };

    let state = Arc::new(AppState {
        token,
        nonce_guard: Arc::new(NonceGuard::new(data_dir.join("used_nonces.json"), config.security.nonce_ttl_seconds)),
        idempotency: Arc::new(IdempotencyStore::new(data_dir.join("tx_idempotency.json"))),
        audit: Arc::new(AuditLogger::new(data_dir.join("logs").join("service_audit.log"))),
        metrics: Arc::new(ServiceMetrics::new()),
        wallet,
        tx_engine,
        node_manager,
        started_at: Instant::now(),
        config: config.clone(),
    });

    let http_router = build_router(state);
    let http_listener = match tokio::net::TcpListener::bind((config.app.api_host.as_str(), config.app.api_port)).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("error: failed to bind submission service: {err}");
            return cli::EXIT_HANDLED_ERROR;
        }
    };
    info!(host = %config.app.api_host, port = config.app.api_port, "submission_service_listen");

    let node_role: Network = match config.network.role.parse() {
        Ok(role) => role,
        Err(err) => {
            eprintln!("error: invalid network.role: {err}");
            return cli::EXIT_HANDLED_ERROR;
        }
    };
    let identity_private_key_pem = match &config.network.identity_private_key_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(pem) => Some(pem),
            Err(err) => {
                eprintln!("error: failed to read identity_private_key_file: {err}");
                return cli::EXIT_HANDLED_ERROR;
            }
        },
        None => None,
    };
    let identity_public_key_pem = match &config.network.identity_public_key_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(pem) => Some(pem),
            Err(err) => {
                eprintln!("error: failed to read identity_public_key_file: {err}");
                return cli::EXIT_HANDLED_ERROR;
            }
        },
        None => None,
    };

    let transport_config = TcpTransportConfig {
        max_frame_size: config.transport.max_frame_size,
        dial_timeout: Duration::from_secs(config.transport.dial_timeout_seconds),
        send_timeout: Duration::from_secs(config.transport.send_timeout_seconds),
    };
    let p2p_transport = TcpTransport::new(format!("127.0.0.1:{}", config.network.start_port), transport_config);
    let p2p_router = Router::new(
        RouterConfig {
            node_role,
            listen_host: "127.0.0.1".to_string(),
            listen_port: config.network.start_port,
            peer_seeds: config.network.bootstrap_nodes.clone(),
            network_id: config.network.name.clone(),
            protocol_version: ezchain_core::PROTOCOL_VERSION.to_string(),
            max_neighbors: 64,
            node_id: None,
            identity_private_key_pem,
            identity_public_key_pem,
            enforce_identity_verification: config.network.enforce_identity_verification,
            signed_message_types: config.network.signed_message_types.iter().cloned().collect::<HashSet<String>>(),
            maintenance_interval: Duration::from_secs(30),
            seed_retry_base: Duration::from_secs(2),
            seed_retry_max: Duration::from_secs(120),
            degraded_no_peer_sec: 120,
        },
        p2p_transport,
    );
    if let Err(err) = p2p_router.start().await {
        eprintln!("error: failed to start p2p router: {err}");
        return cli::EXIT_HANDLED_ERROR;
    }

    let server = axum::serve(
        http_listener,
        http_router.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            if let Err(err) = result {
                eprintln!("error: submission service stopped: {err}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown_requested");
        }
    }

    if let Err(err) = p2p_router.stop().await {
        eprintln!("error: failed to stop p2p router cleanly: {err}");
    }
    cli::EXIT_SUCCESS
}
