//! Configuration loader (ambient, A3): strict-JSON-or-restricted-YAML
//! grammar, ported from `original_source/EZ_App/config.py`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config section {0}")]
    MalformedSection(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub bootstrap_nodes: Vec<String>,
    pub consensus_nodes: u32,
    pub account_nodes: u32,
    pub start_port: u16,
    /// Role this node advertises on the wire — "account", "consensus", or
    /// "pool_gateway" (§4.5). Parsed against `Network::from_str`.
    pub role: String,
    #[serde(default)]
    pub identity_private_key_file: Option<String>,
    #[serde(default)]
    pub identity_public_key_file: Option<String>,
    /// When true, every inbound envelope must carry a valid signature,
    /// regardless of `signed_message_types` (§4.5).
    #[serde(default)]
    pub enforce_identity_verification: bool,
    /// Message types that require a valid signature even when
    /// `enforce_identity_verification` is false.
    #[serde(default)]
    pub signed_message_types: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "testnet".to_string(),
            bootstrap_nodes: vec!["127.0.0.1:19500".to_string()],
            consensus_nodes: 1,
            account_nodes: 1,
            start_port: 19500,
            role: "account".to_string(),
            identity_private_key_file: None,
            identity_public_key_file: None,
            enforce_identity_verification: false,
            signed_message_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Largest frame accepted/sent over TCP, in bytes (§4.3 default 2 MiB).
    pub max_frame_size: usize,
    pub dial_timeout_seconds: u64,
    pub send_timeout_seconds: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 2 * 1024 * 1024,
            dial_timeout_seconds: 3,
            send_timeout_seconds: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_dir: String,
    pub log_dir: String,
    pub api_host: String,
    pub api_port: u16,
    pub api_token_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: ".ezchain".to_string(),
            log_dir: ".ezchain/logs".to_string(),
            api_host: "127.0.0.1".to_string(),
            api_port: 8787,
            api_token_file: ".ezchain/api.token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub max_payload_bytes: u64,
    pub max_tx_amount: i64,
    pub nonce_ttl_seconds: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 65536,
            max_tx_amount: 100_000_000,
            nonce_ttl_seconds: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EzChainConfig {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_config_version() -> u32 {
    CONFIG_SCHEMA_VERSION
}

/// Parses the restricted YAML-like grammar (§6): `section:` headers at
/// column 0, `  key: value` pairs indented by exactly two spaces, JSON
/// array values, case-insensitive booleans, quote-stripped strings.
fn parse_min_yaml(text: &str) -> HashMap<String, HashMap<String, serde_json::Value>> {
    let mut result: HashMap<String, HashMap<String, serde_json::Value>> = HashMap::new();
    let mut current_section: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim_end();
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') && line.ends_with(':') {
            let section = line[..line.len() - 1].trim().to_string();
            result.entry(section.clone()).or_default();
            current_section = Some(section);
            continue;
        }
        if let Some(section) = &current_section {
            if line.starts_with("  ") && line.contains(':') {
                let rest = trimmed;
                if let Some((key, val)) = rest.split_once(':') {
                    let key = key.trim().to_string();
                    let value = val.trim();
                    let parsed = if value.starts_with('[') && value.ends_with(']') {
                        serde_json::from_str(value).unwrap_or(serde_json::Value::Null)
                    } else if value.eq_ignore_ascii_case("true") {
                        serde_json::Value::Bool(true)
                    } else if value.eq_ignore_ascii_case("false") {
                        serde_json::Value::Bool(false)
                    } else if let Ok(n) = value.parse::<i64>() {
                        serde_json::Value::Number(n.into())
                    } else {
                        serde_json::Value::String(value.trim_matches('"').to_string())
                    };
                    result.get_mut(section).unwrap().insert(key, parsed);
                }
            }
        }
    }
    result
}

fn merge_section<T: for<'de> Deserialize<'de> + Serialize + Default>(
    overrides: Option<&HashMap<String, serde_json::Value>>,
) -> Result<T, ConfigError> {
    let base = serde_json::to_value(T::default()).map_err(|_| ConfigError::MalformedSection("base".to_string()))?;
    let mut base = match base {
        serde_json::Value::Object(map) => map,
        _ => return Err(ConfigError::MalformedSection("base".to_string())),
    };
    if let Some(overrides) = overrides {
        for (k, v) in overrides {
            base.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(serde_json::Value::Object(base))
        .map_err(|err| ConfigError::MalformedSection(err.to_string()))
}

/// Loads a config file, tolerating either JSON or the restricted YAML
/// grammar. Missing file yields all-default config, matching the source's
/// `load_config` fallback.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EzChainConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(EzChainConfig::default());
    }
    let text = std::fs::read_to_string(path)?;

    let sections: HashMap<String, HashMap<String, serde_json::Value>> =
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| match v {
                    serde_json::Value::Object(inner) => Some((k, inner.into_iter().collect())),
                    _ => None,
                })
                .collect(),
            _ => parse_min_yaml(&text),
        };

    let config_version = sections
        .get("meta")
        .and_then(|m| m.get("config_version"))
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .unwrap_or(CONFIG_SCHEMA_VERSION);

    Ok(EzChainConfig {
        config_version,
        network: merge_section(sections.get("network"))?,
        app: merge_section(sections.get("app"))?,
        security: merge_section(sections.get("security"))?,
        transport: merge_section(sections.get("transport"))?,
    })
}

pub fn ensure_directories(config: &EzChainConfig) -> Result<(), ConfigError> {
    std::fs::create_dir_all(&config.app.data_dir)?;
    std::fs::create_dir_all(&config.app.log_dir)?;
    let token_path = PathBuf::from(&config.app.api_token_file);
    if let Some(parent) = token_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if !token_path.exists() {
        std::fs::write(&token_path, crate::util::random_token(24))?;
    }
    Ok(())
}

pub fn load_api_token(config: &EzChainConfig) -> Result<String, ConfigError> {
    let token_path = PathBuf::from(&config.app.api_token_file);
    if !token_path.exists() {
        ensure_directories(config)?;
    }
    Ok(std::fs::read_to_string(&token_path)?.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config("/tmp/ezchain-does-not-exist.yaml").unwrap();
        assert_eq!(config.config_version, CONFIG_SCHEMA_VERSION);
        assert_eq!(config.network.name, "testnet");
        assert_eq!(config.network.role, "account");
        assert!(!config.network.enforce_identity_verification);
        assert_eq!(config.transport.max_frame_size, 2 * 1024 * 1024);
    }

    #[test]
    fn role_and_signed_message_types_load_from_config() {
        let path = std::env::temp_dir().join(format!("ezchain-config-test-role-{}.yaml", crate::util::random_token(4)));
        std::fs::write(
            &path,
            "network:\n  role: consensus\n  enforce_identity_verification: true\n  signed_message_types: [\"HELLO\", \"WELCOME\"]\ntransport:\n  max_frame_size: 1048576\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.network.role, "consensus");
        assert!(config.network.enforce_identity_verification);
        assert_eq!(config.network.signed_message_types, vec!["HELLO".to_string(), "WELCOME".to_string()]);
        assert_eq!(config.transport.max_frame_size, 1_048_576);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn parses_restricted_yaml_grammar() {
        let text = "network:\n  name: mynet\n  start_port: 20000\n  bootstrap_nodes: [\"127.0.0.1:1\", \"127.0.0.1:2\"]\nsecurity:\n  max_payload_bytes: 1000\n";
        let sections = parse_min_yaml(text);
        assert_eq!(sections["network"]["name"], serde_json::json!("mynet"));
        assert_eq!(sections["network"]["start_port"], serde_json::json!(20000));
        assert_eq!(
            sections["network"]["bootstrap_nodes"],
            serde_json::json!(["127.0.0.1:1", "127.0.0.1:2"])
        );
        assert_eq!(sections["security"]["max_payload_bytes"], serde_json::json!(1000));
    }

    #[test]
    fn loads_and_merges_a_written_yaml_file() {
        let path = std::env::temp_dir().join(format!("ezchain-config-test-{}.yaml", crate::util::random_token(4)));
        std::fs::write(
            &path,
            "network:\n  name: custom\napp:\n  api_port: 9999\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.network.name, "custom");
        assert_eq!(config.app.api_port, 9999);
        assert_eq!(config.app.api_host, "127.0.0.1");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn loads_strict_json_too() {
        let path = std::env::temp_dir().join(format!("ezchain-config-test-json-{}.json", crate::util::random_token(4)));
        std::fs::write(&path, r#"{"network": {"name": "jsonnet"}}"#).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.network.name, "jsonnet");
        let _ = std::fs::remove_file(path);
    }
}
