//! Wire envelope wrapping every P2P message.

use serde::{Deserialize, Serialize};

/// The three node roles a peer can advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    Consensus,
    Account,
    PoolGateway,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Consensus => "consensus",
            Network::Account => "account",
            Network::PoolGateway => "pool_gateway",
        }
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consensus" => Ok(Network::Consensus),
            "account" => Ok(Network::Account),
            "pool_gateway" => Ok(Network::PoolGateway),
            other => Err(format!("unknown role '{other}', expected one of consensus, account, pool_gateway")),
        }
    }
}

/// Signature block attached to a signed envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auth {
    pub algorithm: String,
    pub public_key: String,
    pub signature: String,
}

/// The outer JSON object carried by every frame (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub network: Network,
    #[serde(rename = "type")]
    pub r#type: String,
    pub msg_id: String,
    pub timestamp: i64,
    pub sender_id: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub auth: Option<Auth>,
}

pub const PROTOCOL_VERSION: &str = "0.1";

impl Envelope {
    /// Builds an unsigned envelope with a fresh random `msg_id`.
    pub fn new(network: Network, r#type: impl Into<String>, sender_id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            network,
            r#type: r#type.into(),
            msg_id: crate::util::random_token(16),
            timestamp: crate::util::now_millis(),
            sender_id: sender_id.into(),
            payload,
            auth: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_wire_value_matches_spec() {
        assert_eq!(Network::PoolGateway.as_str(), "pool_gateway");
        let json = serde_json::to_string(&Network::PoolGateway).unwrap();
        assert_eq!(json, "\"pool_gateway\"");
    }

    #[test]
    fn role_string_parses_to_network() {
        assert_eq!("pool_gateway".parse::<Network>().unwrap(), Network::PoolGateway);
        assert!("bogus_role".parse::<Network>().is_err());
    }

    #[test]
    fn envelope_roundtrips_through_json() {
        let env = Envelope::new(Network::Account, "PING", "node-a", serde_json::json!({"ts": 1}));
        let encoded = serde_json::to_vec(&env).unwrap();
        let decoded: Envelope = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded.r#type, "PING");
        assert_eq!(decoded.network, Network::Account);
        assert!(decoded.auth.is_none());
    }
}
