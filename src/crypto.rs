//! Envelope signing and verification (ECDSA P-256 / SHA-256).
//!
//! Mirrors `original_source/modules/ez_p2p/security.py`: the canonical bytes
//! are the sorted-key, whitespace-free JSON of the envelope's signed fields
//! (everything except `auth`), hashed with SHA-256 before signing.

use crate::envelope::Envelope;
use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const SUPPORTED_ALGORITHM: &str = "ecdsa-p256-sha256";

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("canonicalization failed")]
    Canonicalize(#[from] serde_json::Error),
}

/// Exactly the fields that are covered by a signature (§3 invariant).
#[derive(Serialize)]
struct SignedFields<'a> {
    version: &'a str,
    network: crate::envelope::Network,
    #[serde(rename = "type")]
    r#type: &'a str,
    msg_id: &'a str,
    timestamp: i64,
    sender_id: &'a str,
    payload: &'a serde_json::Value,
}

/// Serializes the signed subset of `envelope` with sorted keys and no
/// insignificant whitespace. `auth` is excluded so a receiver that strips
/// it before hashing can still verify.
pub fn canonicalize(envelope: &Envelope) -> Result<Vec<u8>, CryptoError> {
    let fields = SignedFields {
        version: &envelope.version,
        network: envelope.network,
        r#type: &envelope.r#type,
        msg_id: &envelope.msg_id,
        timestamp: envelope.timestamp,
        sender_id: &envelope.sender_id,
        payload: &envelope.payload,
    };
    let value = serde_json::to_value(&fields)?;
    let sorted = sort_value(value);
    Ok(serde_json::to_vec(&sorted)?)
}

fn sort_value(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let sorted: std::collections::BTreeMap<String, serde_json::Value> =
                map.into_iter().map(|(k, v)| (k, sort_value(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.into_iter().map(sort_value).collect())
        }
        other => other,
    }
}

pub fn sign(envelope: &Envelope, private_key_pem: &str) -> Result<String, CryptoError> {
    let signing_key =
        SigningKey::from_pkcs8_pem(private_key_pem).map_err(|_| CryptoError::InvalidPrivateKey)?;
    let digest = Sha256::digest(canonicalize(envelope)?);
    let signature: Signature = signing_key.sign(&digest);
    Ok(hex::encode(signature.to_der().as_bytes()))
}

/// Verifies a signature. Any malformed input (bad key, bad hex, mismatched
/// signature) yields `false`, never an error — per §4.2 contract.
pub fn verify(envelope: &Envelope, signature_hex: &str, public_key_pem: &str) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_public_key_pem(public_key_pem) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&sig_bytes) else {
        return false;
    };
    let Ok(canonical) = canonicalize(envelope) else {
        return false;
    };
    let digest = Sha256::digest(canonical);
    verifying_key.verify(&digest, &signature).is_ok()
}

pub fn generate_keypair() -> (SigningKey, VerifyingKey) {
    let signing_key = SigningKey::random(&mut rand::thread_rng());
    let verifying_key = *signing_key.verifying_key();
    (signing_key, verifying_key)
}

pub fn private_key_to_pem(key: &SigningKey) -> Result<String, CryptoError> {
    key.to_pkcs8_pem(Default::default())
        .map(|s| s.to_string())
        .map_err(|_| CryptoError::InvalidPrivateKey)
}

pub fn public_key_to_pem(key: &VerifyingKey) -> Result<String, CryptoError> {
    key.to_public_key_pem(Default::default())
        .map_err(|_| CryptoError::InvalidPublicKey)
}

pub fn derive_public_key_pem(private_key_pem: &str) -> Result<String, CryptoError> {
    let signing_key =
        SigningKey::from_pkcs8_pem(private_key_pem).map_err(|_| CryptoError::InvalidPrivateKey)?;
    public_key_to_pem(signing_key.verifying_key())
}

/// Stable identity token for a public key, used as `node_id`/fingerprint.
pub fn fingerprint(public_key_pem: &str) -> String {
    hex::encode(Sha256::digest(public_key_pem.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Network;

    fn sample_envelope() -> Envelope {
        Envelope::new(
            Network::Consensus,
            "HELLO",
            "node-a",
            serde_json::json!({"node_id": "node-a", "role": "consensus"}),
        )
    }

    #[test]
    fn sign_then_verify_succeeds() {
        let (sk, vk) = generate_keypair();
        let priv_pem = private_key_to_pem(&sk).unwrap();
        let pub_pem = public_key_to_pem(&vk).unwrap();

        let env = sample_envelope();
        let sig = sign(&env, &priv_pem).unwrap();
        assert!(verify(&env, &sig, &pub_pem));
    }

    #[test]
    fn tampering_with_payload_breaks_verification() {
        let (sk, vk) = generate_keypair();
        let priv_pem = private_key_to_pem(&sk).unwrap();
        let pub_pem = public_key_to_pem(&vk).unwrap();

        let mut env = sample_envelope();
        let sig = sign(&env, &priv_pem).unwrap();
        env.payload = serde_json::json!({"node_id": "node-b", "role": "consensus"});
        assert!(!verify(&env, &sig, &pub_pem));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let (sk, _vk) = generate_keypair();
        let (_sk2, vk2) = generate_keypair();
        let priv_pem = private_key_to_pem(&sk).unwrap();
        let pub_pem2 = public_key_to_pem(&vk2).unwrap();

        let env = sample_envelope();
        let sig = sign(&env, &priv_pem).unwrap();
        assert!(!verify(&env, &sig, &pub_pem2));
    }

    #[test]
    fn malformed_signature_hex_is_false_not_panic() {
        let (sk, vk) = generate_keypair();
        let priv_pem = private_key_to_pem(&sk).unwrap();
        let pub_pem = public_key_to_pem(&vk).unwrap();
        let _ = priv_pem;
        let env = sample_envelope();
        assert!(!verify(&env, "not-hex-!!", &pub_pem));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let (_sk, vk) = generate_keypair();
        let pub_pem = public_key_to_pem(&vk).unwrap();
        assert_eq!(fingerprint(&pub_pem), fingerprint(&pub_pem));
    }

    #[test]
    fn canonicalize_excludes_auth() {
        let mut env = sample_envelope();
        let before = canonicalize(&env).unwrap();
        env.auth = Some(crate::envelope::Auth {
            algorithm: SUPPORTED_ALGORITHM.to_string(),
            public_key: "pem".to_string(),
            signature: "deadbeef".to_string(),
        });
        let after = canonicalize(&env).unwrap();
        assert_eq!(before, after);
    }
}
