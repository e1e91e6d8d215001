//! Pluggable P2P transport backends (§4.3).

pub mod codec;
pub mod tcp;
pub mod daemon;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),
    #[error("not connected to {0}")]
    NotConnected(String),
    #[error("invalid send context")]
    InvalidContext,
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("send to {0} timed out")]
    SendTimeout(String),
}

/// A send context a frame arrived on, handed back to a handler so it can
/// reply on the same connection without a fresh dial (mirrors the Python
/// `send_via_context` contract against a live `StreamWriter`).
pub enum SendContext {
    Tcp(tcp::TcpSendContext),
}

type BoxFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Invoked for every inbound frame: raw bytes, the remote address string
/// (`host:port`), and a context usable for same-connection replies.
pub type OnFrame = std::sync::Arc<dyn Fn(Vec<u8>, String, SendContext) -> BoxFuture + Send + Sync>;

/// Transport backend contract (§4.3): the router drives exactly one of
/// these per deployed network.
#[async_trait]
pub trait Transport: Send + Sync {
    fn set_on_frame(&self, callback: OnFrame);
    async fn start(&self) -> Result<(), TransportError>;
    async fn stop(&self) -> Result<(), TransportError>;
    async fn send(&self, addr: &str, data: Vec<u8>) -> Result<(), TransportError>;
    async fn send_via_context(&self, ctx: &SendContext, data: Vec<u8>) -> Result<(), TransportError>;
}
