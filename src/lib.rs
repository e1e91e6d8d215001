pub mod audit;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod metrics;
pub mod peer;
pub mod router;
pub mod security;
pub mod service;
pub mod transport;
pub mod util;

pub use envelope::{Auth, Envelope, Network, PROTOCOL_VERSION};
pub use peer::{PeerEntry, PeerTable};
pub use router::{Router, RouterConfig};
