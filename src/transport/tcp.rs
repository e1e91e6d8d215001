//! Mandatory TCP transport backend (§4.3), grounded in the teacher's
//! `tokio::sync::Mutex`-guarded connection map (`montana/src/net/connection.rs`)
//! and the original `TcpTransport`'s per-`(host, port)` client reuse
//! (`original_source/modules/ez_p2p/transport/tcp.py`).

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::codec::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
use super::{OnFrame, SendContext, Transport, TransportError};

/// Tunables for a `TcpTransport` (§4.3: max frame size, dial timeout, send
/// timeout, all configurable with the spec's stated defaults).
#[derive(Debug, Clone, Copy)]
pub struct TcpTransportConfig {
    pub max_frame_size: usize,
    pub dial_timeout: Duration,
    pub send_timeout: Duration,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            dial_timeout: Duration::from_secs(3),
            send_timeout: Duration::from_secs(3),
        }
    }
}

/// A same-connection reply target captured off an inbound or outbound frame.
pub struct TcpSendContext {
    writer: Arc<Mutex<WriteHalf<TcpStream>>>,
}

/// TCP backend: one listener plus a reused-connection outbound pool keyed by
/// `"host:port"`, matching the original transport's `_clients` dict.
pub struct TcpTransport {
    bind_addr: String,
    max_frame_size: usize,
    dial_timeout: Duration,
    send_timeout: Duration,
    on_frame: Mutex<Option<OnFrame>>,
    clients: Mutex<HashMap<String, Arc<Mutex<WriteHalf<TcpStream>>>>>,
    listener_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    self_ref: Weak<TcpTransport>,
}

impl TcpTransport {
    pub fn new(bind_addr: impl Into<String>, config: TcpTransportConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            bind_addr: bind_addr.into(),
            max_frame_size: config.max_frame_size,
            dial_timeout: config.dial_timeout,
            send_timeout: config.send_timeout,
            on_frame: Mutex::new(None),
            clients: Mutex::new(HashMap::new()),
            listener_handle: Mutex::new(None),
            self_ref: weak.clone(),
        })
    }

    fn arc_self(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("TcpTransport outlived by its own task")
    }

    async fn ensure_client(&self, addr: &str) -> Result<Arc<Mutex<WriteHalf<TcpStream>>>, TransportError> {
        {
            let clients = self.clients.lock().await;
            if let Some(writer) = clients.get(addr) {
                return Ok(writer.clone());
            }
        }
        let stream = tokio::time::timeout(self.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::NotConnected(addr.to_string()))??;
        let (reader, writer) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(writer));
        self.clients.lock().await.insert(addr.to_string(), writer.clone());
        self.spawn_reader(reader, writer.clone(), addr.to_string());
        Ok(writer)
    }

    /// Reads frames off an established connection for as long as it stays
    /// open, handing each one to the router callback with a context that
    /// replies on the same connection.
    fn spawn_reader(
        &self,
        mut reader: ReadHalf<TcpStream>,
        writer: Arc<Mutex<WriteHalf<TcpStream>>>,
        remote_addr: String,
    ) {
        let this = self.arc_self();
        let max_frame_size = self.max_frame_size;
        tokio::spawn(async move {
            loop {
                match read_frame(&mut reader, max_frame_size).await {
                    Ok(payload) => {
                        let callback = { this.on_frame.lock().await.clone() };
                        let Some(callback) = callback else { continue };
                        let ctx = SendContext::Tcp(TcpSendContext { writer: writer.clone() });
                        callback(payload, remote_addr.clone(), ctx).await;
                    }
                    Err(_) => break,
                }
            }
            this.clients.lock().await.remove(&remote_addr);
        });
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn set_on_frame(&self, callback: OnFrame) {
        if let Ok(mut guard) = self.on_frame.try_lock() {
            *guard = Some(callback);
        } else {
            warn!("set_on_frame called while transport busy; retrying");
        }
    }

    async fn start(&self) -> Result<(), TransportError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "server_listen");
        let this = self.arc_self();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let (reader, writer) = tokio::io::split(stream);
                        let writer = Arc::new(Mutex::new(writer));
                        this.spawn_reader(reader, writer, peer.to_string());
                    }
                    Err(err) => {
                        warn!(error = %err, "tcp accept failed");
                    }
                }
            }
        });
        *self.listener_handle.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        if let Some(handle) = self.listener_handle.lock().await.take() {
            handle.abort();
        }
        self.clients.lock().await.clear();
        Ok(())
    }

    async fn send(&self, addr: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let writer = self.ensure_client(addr).await?;
        let mut guard = writer.lock().await;
        tokio::time::timeout(self.send_timeout, write_frame(&mut *guard, &data, self.max_frame_size))
            .await
            .map_err(|_| TransportError::SendTimeout(addr.to_string()))?
    }

    async fn send_via_context(&self, ctx: &SendContext, data: Vec<u8>) -> Result<(), TransportError> {
        let SendContext::Tcp(tcp_ctx) = ctx;
        let mut guard = tcp_ctx.writer.lock().await;
        tokio::time::timeout(self.send_timeout, write_frame(&mut *guard, &data, self.max_frame_size))
            .await
            .map_err(|_| TransportError::SendTimeout("reply context".to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn send_and_receive_a_frame_round_trip() {
        // Bind on an ephemeral port by asking the OS, then re-derive the
        // address actually bound for the client to dial.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = TcpTransport::new(addr.to_string(), TcpTransportConfig::default());
        let received: Arc<tokio::sync::Mutex<Vec<Vec<u8>>>> = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let received_clone = received.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();
        server.set_on_frame(Arc::new(move |payload, _addr, _ctx| {
            let received = received_clone.clone();
            let counter = counter_clone.clone();
            Box::pin(async move {
                received.lock().await.push(payload);
                counter.fetch_add(1, Ordering::SeqCst);
            })
        }));
        server.start().await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let client = TcpTransport::new("127.0.0.1:0", TcpTransportConfig::default());
        client.send(&addr.to_string(), b"hello".to_vec()).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(received.lock().await[0], b"hello");
    }

    #[tokio::test]
    async fn send_rejects_frames_over_the_configured_limit() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let server = TcpTransport::new(addr.to_string(), TcpTransportConfig::default());
        server.set_on_frame(Arc::new(|_payload, _addr, _ctx| Box::pin(async {})));
        server.start().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let small_limit = TcpTransportConfig {
            max_frame_size: 8,
            ..TcpTransportConfig::default()
        };
        let client = TcpTransport::new("127.0.0.1:0", small_limit);
        let err = client.send(&addr.to_string(), b"this payload is too big".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }
}
