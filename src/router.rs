//! Router (C9): dispatches decoded envelopes to registered handlers, drives
//! the built-in HELLO/WELCOME/PING/PONG handlers, manages seed reconnection
//! with exponential backoff, and reports health/degraded state.
//!
//! Handler registration and the built-in handlers are grounded in
//! `original_source/modules/ez_p2p/router.py`; the seed backoff state
//! machine, signature enforcement, and health/degraded reporting are this
//! spec's additions (the original router doesn't implement them) and are
//! built from the description in `spec.md` §4.5 directly, logged with the
//! teacher's `tracing` idiom (`montana/src/net/connection.rs`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::crypto;
use crate::envelope::{Auth, Envelope, Network};
use crate::peer::{PeerEntry, PeerTable};
use crate::transport::{SendContext, Transport, TransportError};
use crate::util::{now_millis, random_token};

type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// `(envelope, remote_id, reply_context) → async void`, registered at
/// startup; there is no runtime re-registration (§9 Design Notes).
pub type Handler = Arc<dyn Fn(Envelope, String, Arc<SendContext>) -> BoxFuture + Send + Sync>;

pub struct RouterConfig {
    pub node_role: Network,
    pub listen_host: String,
    pub listen_port: u16,
    pub peer_seeds: Vec<String>,
    pub network_id: String,
    pub protocol_version: String,
    pub max_neighbors: usize,
    pub node_id: Option<String>,
    pub identity_private_key_pem: Option<String>,
    pub identity_public_key_pem: Option<String>,
    pub enforce_identity_verification: bool,
    pub signed_message_types: HashSet<String>,
    pub maintenance_interval: Duration,
    pub seed_retry_base: Duration,
    pub seed_retry_max: Duration,
    pub degraded_no_peer_sec: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeedStatus {
    Idle,
    Dialing,
    Healthy,
    Failing,
    Backoff,
}

struct SeedState {
    status: SeedStatus,
    failure_count: u32,
    next_retry: Instant,
    last_error: Option<String>,
}

impl SeedState {
    fn new() -> Self {
        Self {
            status: SeedStatus::Idle,
            failure_count: 0,
            next_retry: Instant::now(),
            last_error: None,
        }
    }
}

pub struct Health {
    pub peer_count: usize,
    pub degraded: bool,
}

pub struct Router {
    config: RouterConfig,
    node_id: String,
    transport: Arc<dyn Transport>,
    peers: AsyncMutex<PeerTable>,
    handlers: RwLock<HashMap<String, Handler>>,
    seed_states: AsyncMutex<HashMap<String, SeedState>>,
    last_peer_seen: AsyncMutex<Instant>,
    maintenance_handle: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Router {
    pub fn new(config: RouterConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let node_id = config.node_id.clone().unwrap_or_else(|| random_token(16));
        let seed_states = config
            .peer_seeds
            .iter()
            .map(|s| (s.clone(), SeedState::new()))
            .collect();
        let router = Arc::new(Self {
            peers: AsyncMutex::new(PeerTable::new(config.max_neighbors)),
            handlers: RwLock::new(HashMap::new()),
            seed_states: AsyncMutex::new(seed_states),
            last_peer_seen: AsyncMutex::new(Instant::now()),
            maintenance_handle: AsyncMutex::new(None),
            node_id,
            transport,
            config,
        });
        router.clone().register_builtin_handlers();
        router
    }

    fn register_builtin_handlers(self: Arc<Self>) {
        let hello_router = self.clone();
        self.clone().register_handler(
            "HELLO",
            Arc::new(move |envelope, remote_addr, ctx| {
                let router = hello_router.clone();
                Box::pin(async move { router.handle_hello(envelope, remote_addr, ctx).await })
            }),
        );
        let welcome_router = self.clone();
        self.clone().register_handler(
            "WELCOME",
            Arc::new(move |envelope, remote_addr, ctx| {
                let router = welcome_router.clone();
                Box::pin(async move { router.handle_welcome(envelope, remote_addr, ctx).await })
            }),
        );
        let ping_router = self.clone();
        self.clone().register_handler(
            "PING",
            Arc::new(move |envelope, remote_addr, ctx| {
                let router = ping_router.clone();
                Box::pin(async move { router.handle_ping(envelope, remote_addr, ctx).await })
            }),
        );
        let pong_router = self.clone();
        self.register_handler(
            "PONG",
            Arc::new(move |envelope, remote_addr, ctx| {
                let router = pong_router.clone();
                Box::pin(async move { router.handle_pong(envelope, remote_addr, ctx).await })
            }),
        );
    }

    pub fn register_handler(self: Arc<Self>, msg_type: &str, handler: Handler) {
        if let Ok(mut guard) = self.handlers.try_write() {
            guard.insert(msg_type.to_string(), handler);
        }
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), TransportError> {
        let this = self.clone();
        self.transport.set_on_frame(Arc::new(move |payload, remote_addr, ctx| {
            let this = this.clone();
            Box::pin(async move { this.on_frame(payload, remote_addr, Arc::new(ctx)).await })
        }));
        self.transport.start().await?;
        info!(host = %self.config.listen_host, port = self.config.listen_port, "server_listen");

        for seed in self.config.peer_seeds.clone() {
            self.dial_seed(&seed).await;
        }

        let this = self.clone();
        let handle = tokio::spawn(async move { this.maintenance_loop().await });
        *self.maintenance_handle.lock().await = Some(handle);
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.maintenance_handle.lock().await.take() {
            handle.abort();
        }
        self.transport.stop().await
    }

    async fn maintenance_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.maintenance_interval);
        loop {
            ticker.tick().await;
            let due: Vec<String> = {
                let states = self.seed_states.lock().await;
                states
                    .iter()
                    .filter(|(_, s)| s.status == SeedStatus::Backoff && Instant::now() >= s.next_retry)
                    .map(|(addr, _)| addr.clone())
                    .collect()
            };
            for addr in due {
                self.dial_seed(&addr).await;
            }
        }
    }

    async fn dial_seed(self: &Arc<Self>, addr: &str) {
        {
            let mut states = self.seed_states.lock().await;
            if let Some(state) = states.get_mut(addr) {
                state.status = SeedStatus::Dialing;
            }
        }
        match self.send_hello(addr).await {
            Ok(()) => {
                let mut states = self.seed_states.lock().await;
                if let Some(state) = states.get_mut(addr) {
                    state.status = SeedStatus::Healthy;
                    state.failure_count = 0;
                    state.last_error = None;
                }
                *self.last_peer_seen.lock().await = Instant::now();
            }
            Err(err) => {
                warn!(seed = %addr, err = %err, "seed_connect_failed");
                let mut states = self.seed_states.lock().await;
                if let Some(state) = states.get_mut(addr) {
                    state.status = SeedStatus::Failing;
                    state.failure_count += 1;
                    state.last_error = Some(err.to_string());
                    let backoff = self.config.seed_retry_base.saturating_mul(1u32 << (state.failure_count - 1).min(30));
                    let backoff = backoff.min(self.config.seed_retry_max);
                    state.next_retry = Instant::now() + backoff;
                    state.status = SeedStatus::Backoff;
                }
            }
        }
    }

    async fn send_hello(&self, addr: &str) -> Result<(), TransportError> {
        let payload = serde_json::json!({
            "node_id": self.node_id,
            "role": self.config.node_role,
            "protocol_version": self.config.protocol_version,
            "network_id": self.config.network_id,
            "latest_index": 0,
        });
        let envelope = self.build_envelope(self.config.node_role, "HELLO", payload);
        let frame = self.encode(&envelope)?;
        self.transport.send(addr, frame).await
    }

    fn build_envelope(&self, network: Network, msg_type: &str, payload: serde_json::Value) -> Envelope {
        let mut envelope = Envelope::new(network, msg_type, self.node_id.clone(), payload);
        if let Some(priv_pem) = &self.config.identity_private_key_pem {
            if let (Ok(signature), Some(pub_pem)) = (crypto::sign(&envelope, priv_pem), &self.config.identity_public_key_pem) {
                envelope.auth = Some(Auth {
                    algorithm: crypto::SUPPORTED_ALGORITHM.to_string(),
                    public_key: pub_pem.clone(),
                    signature,
                });
            }
        }
        envelope
    }

    fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(envelope).map_err(|err| TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
    }

    async fn on_frame(self: &Arc<Self>, payload: Vec<u8>, remote_addr: String, ctx: Arc<SendContext>) {
        let envelope: Envelope = match serde_json::from_slice(&payload) {
            Ok(e) => e,
            Err(err) => {
                warn!(err = %err, "decode_failed");
                return;
            }
        };

        if envelope.version != self.config.protocol_version {
            warn!(version = %envelope.version, "drop_version_mismatch");
            return;
        }
        if envelope.network != self.config.node_role {
            warn!(network = ?envelope.network, "drop_network_mismatch");
            return;
        }

        let must_verify = self.config.enforce_identity_verification
            || self.config.signed_message_types.contains(&envelope.r#type);
        if must_verify {
            let Some(auth) = &envelope.auth else {
                warn!(r#type = %envelope.r#type, "drop_missing_auth");
                return;
            };
            if !crypto::verify(&envelope, &auth.signature, &auth.public_key) {
                warn!(r#type = %envelope.r#type, "drop_invalid_signature");
                return;
            }
        }

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&envelope.r#type).cloned()
        };
        let Some(handler) = handler else {
            info!(r#type = %envelope.r#type, "drop_unknown_type");
            return;
        };
        handler(envelope, remote_addr, ctx).await;
        *self.last_peer_seen.lock().await = Instant::now();
    }

    async fn handle_hello(self: &Arc<Self>, envelope: Envelope, remote_addr: String, ctx: Arc<SendContext>) {
        let entry = peer_entry_from_payload(&envelope.payload, remote_addr.clone());
        let role = entry.role;
        self.peers.lock().await.add(entry);

        let payload = serde_json::json!({
            "node_id": self.node_id,
            "role": self.config.node_role,
            "protocol_version": self.config.protocol_version,
            "network_id": self.config.network_id,
            "latest_index": 0,
        });
        let welcome = self.build_envelope(envelope.network, "WELCOME", payload);
        if let Ok(frame) = self.encode(&welcome) {
            let _ = self.transport.send_via_context(&ctx, frame).await;
        }
        info!(from = %remote_addr, role = ?role, "hello_recv");
    }

    async fn handle_welcome(&self, envelope: Envelope, remote_addr: String, _ctx: Arc<SendContext>) {
        let entry = peer_entry_from_payload(&envelope.payload, remote_addr.clone());
        let role = entry.role;
        self.peers.lock().await.add(entry);
        info!(from = %remote_addr, role = ?role, "welcome_recv");
    }

    async fn handle_ping(&self, envelope: Envelope, remote_addr: String, ctx: Arc<SendContext>) {
        let ts = envelope.payload.get("ts").cloned().unwrap_or(serde_json::json!(now_millis()));
        let pong = self.build_envelope(envelope.network, "PONG", serde_json::json!({ "ts": ts }));
        if let Ok(frame) = self.encode(&pong) {
            let _ = self.transport.send_via_context(&ctx, frame).await;
        }
        info!(from = %remote_addr, "ping_recv");
    }

    async fn handle_pong(&self, _envelope: Envelope, remote_addr: String, _ctx: Arc<SendContext>) {
        info!(from = %remote_addr, "pong_recv");
    }

    pub async fn broadcast_to_role(&self, role: Network, payload: serde_json::Value, msg_type: &str) {
        let peers = self.peers.lock().await.select_by_role(role);
        for peer in peers {
            let envelope = self.build_envelope(role, msg_type, payload.clone());
            if let Ok(frame) = self.encode(&envelope) {
                if self.transport.send(&peer.address, frame).await.is_ok() {
                    *self.last_peer_seen.lock().await = Instant::now();
                }
            }
        }
    }

    pub async fn send_to_address(&self, address: &str, network: Network, payload: serde_json::Value, msg_type: &str) -> Result<(), TransportError> {
        let envelope = self.build_envelope(network, msg_type, payload);
        let frame = self.encode(&envelope)?;
        self.transport.send(address, frame).await?;
        *self.last_peer_seen.lock().await = Instant::now();
        Ok(())
    }

    pub async fn health(&self) -> Health {
        let peer_count = self.peers.lock().await.len();
        let last_seen = *self.last_peer_seen.lock().await;
        let degraded = peer_count == 0 && last_seen.elapsed().as_secs() > self.config.degraded_no_peer_sec;
        Health { peer_count, degraded }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }
}

fn peer_entry_from_payload(payload: &serde_json::Value, address: String) -> PeerEntry {
    let role = match payload.get("role").and_then(|v| v.as_str()) {
        Some("consensus") => Network::Consensus,
        Some("pool_gateway") => Network::PoolGateway,
        _ => Network::Account,
    };
    PeerEntry {
        node_id: payload.get("node_id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        role,
        network_id: payload.get("network_id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        latest_index: payload.get("latest_index").and_then(|v| v.as_u64()).unwrap_or(0),
        address,
    }
}
