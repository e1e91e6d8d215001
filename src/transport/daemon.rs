//! Optional libp2p-daemon-style transport backend (§4.3).
//!
//! The original router construction checks whether a daemon control socket
//! is configured before wiring up `Libp2pDaemonTransport`
//! (`original_source/modules/ez_p2p/router.py`); this crate carries the same
//! contract without a real libp2p daemon client, since that integration is
//! out of scope. Selecting this backend without a control socket configured
//! fails fast at construction rather than silently falling back to TCP.

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{OnFrame, SendContext, Transport, TransportError};

pub struct DaemonTransport {
    control_socket: String,
    on_frame: Mutex<Option<OnFrame>>,
}

impl DaemonTransport {
    pub fn new(control_socket: impl Into<String>) -> Result<Self, TransportError> {
        let control_socket = control_socket.into();
        if control_socket.trim().is_empty() {
            return Err(TransportError::Unavailable(
                "daemon transport requires a control socket path".to_string(),
            ));
        }
        Ok(Self {
            control_socket,
            on_frame: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Transport for DaemonTransport {
    fn set_on_frame(&self, callback: OnFrame) {
        if let Ok(mut guard) = self.on_frame.try_lock() {
            *guard = Some(callback);
        }
    }

    async fn start(&self) -> Result<(), TransportError> {
        Err(TransportError::Unavailable(format!(
            "libp2p daemon backend ({}) is not wired to a real daemon in this build",
            self.control_socket
        )))
    }

    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send(&self, _addr: &str, _data: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unavailable("daemon transport not started".to_string()))
    }

    async fn send_via_context(&self, _ctx: &SendContext, _data: Vec<u8>) -> Result<(), TransportError> {
        Err(TransportError::Unavailable("daemon transport not started".to_string()))
    }
}
