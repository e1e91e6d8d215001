//! Wallet key derivation and password-based encryption, grounded in
//! `original_source/EZ_App/crypto.py`. Swaps the original's Fernet
//! (AES-128-CBC+HMAC) for `chacha20poly1305`, already part of the teacher's
//! dependency stack, combined with the `pbkdf2` crate for key stretching.

use chacha20poly1305::aead::{Aead, KeyInit, OsRng as AeadOsRng};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use p256::ecdsa::{SigningKey, VerifyingKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

const PBKDF2_ROUNDS: u32 = 200_000;
const WORDLIST: &[&str] = &[
    "amber", "anchor", "ashore", "atlas", "aurora", "basil", "beacon", "birch", "bramble",
    "brook", "canyon", "cedar", "cinder", "cliff", "clover", "comet", "copper", "coral",
    "cosmic", "crane", "crimson", "crystal", "dawn", "delta", "dune", "ember", "falcon",
    "fern", "flint", "forge", "glade", "granite", "harbor", "haven", "hazel", "hickory",
    "horizon", "indigo", "ivory", "jasper", "juniper", "lantern", "laurel", "ledger",
    "linden", "lotus", "maple", "marsh", "meadow", "mesa", "meteor", "mist", "moss",
    "nectar", "nimbus", "oasis", "obsidian", "onyx", "opal", "orbit", "orchid", "osprey",
    "pebble", "petal", "pine", "plateau", "prairie", "quartz", "quill", "reef", "ridge",
    "river", "rowan", "sable", "sage", "sandstone", "sequoia", "shale", "shore", "sienna",
    "slate", "sol", "spruce", "summit", "talon", "tern", "thicket", "thistle", "thorn",
    "tide", "timber", "tundra", "umber", "valley", "vane", "violet", "willow", "wren",
    "zephyr",
];

#[derive(Debug, Error)]
pub enum CryptoKdfError {
    #[error("mnemonic must have at least {0} words")]
    MnemonicTooShort(usize),
    #[error("key derivation failed")]
    Derivation,
    #[error("decryption failed: invalid password or corrupt ciphertext")]
    Decryption,
    #[error("encoding error: {0}")]
    Encoding(String),
}

pub struct DerivedKeypair {
    pub mnemonic: String,
    pub private_key_pem: String,
    pub public_key_pem: String,
    pub address: String,
}

pub fn generate_mnemonic(words: usize) -> Result<String, CryptoKdfError> {
    if words < 12 {
        return Err(CryptoKdfError::MnemonicTooShort(12));
    }
    let mut rng = rand::thread_rng();
    Ok((0..words)
        .map(|_| WORDLIST[(rng.next_u32() as usize) % WORDLIST.len()])
        .collect::<Vec<_>>()
        .join(" "))
}

fn seed_from_mnemonic(mnemonic: &str, passphrase: &str) -> [u8; 32] {
    let mut seed = [0u8; 32];
    let salt = format!("ezchain-mnemonic-{passphrase}");
    pbkdf2_hmac::<Sha256>(mnemonic.as_bytes(), salt.as_bytes(), PBKDF2_ROUNDS, &mut seed);
    seed
}

/// Derives a signing key deterministically from `seed`, rehashing with a
/// counter on the rare out-of-range scalar instead of the original's
/// modular reduction (`SigningKey::from_bytes` rejects scalars outside
/// `[1, order)`, so rejection sampling replaces explicit `mod order`).
fn signing_key_from_seed(seed: [u8; 32]) -> SigningKey {
    let mut candidate = seed;
    for counter in 0u8..=255 {
        if let Ok(key) = SigningKey::from_bytes((&candidate).into()) {
            return key;
        }
        let mut hasher = Sha256::new();
        hasher.update(candidate);
        hasher.update([counter]);
        candidate.copy_from_slice(&hasher.finalize());
    }
    unreachable!("rejection sampling exhausted 256 rounds, astronomically unlikely")
}

pub fn address_from_public_key(public_key_pem: &str) -> Result<String, CryptoKdfError> {
    let verifying_key = VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|e| CryptoKdfError::Encoding(e.to_string()))?;
    let der = verifying_key
        .to_public_key_der()
        .map_err(|e| CryptoKdfError::Encoding(e.to_string()))?;
    let digest = Sha256::digest(der.as_bytes());
    Ok(format!("0x{}", hex::encode(&digest[..20])))
}

pub fn derive_keypair(mnemonic: &str, passphrase: &str) -> Result<DerivedKeypair, CryptoKdfError> {
    let seed = seed_from_mnemonic(mnemonic, passphrase);
    let signing_key = signing_key_from_seed(seed);
    let private_key_pem = signing_key
        .to_pkcs8_pem(Default::default())
        .map_err(|e| CryptoKdfError::Encoding(e.to_string()))?
        .to_string();
    let public_key_pem = signing_key
        .verifying_key()
        .to_public_key_pem(Default::default())
        .map_err(|e| CryptoKdfError::Encoding(e.to_string()))?;
    let address = address_from_public_key(&public_key_pem)?;
    Ok(DerivedKeypair {
        mnemonic: mnemonic.to_string(),
        private_key_pem,
        public_key_pem,
        address,
    })
}

pub struct EncryptedText {
    pub salt_b64: String,
    pub ciphertext_b64: String,
}

fn password_to_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

pub fn encrypt_text(plain_text: &str, password: &str) -> Result<EncryptedText, CryptoKdfError> {
    let mut salt = [0u8; 16];
    AeadOsRng.fill_bytes(&mut salt);
    let key = password_to_key(password, &salt);
    let cipher = ChaCha20Poly1305::new((&key).into());
    let mut nonce_bytes = [0u8; 12];
    AeadOsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut ciphertext = cipher
        .encrypt(nonce, plain_text.as_bytes())
        .map_err(|_| CryptoKdfError::Derivation)?;
    // Prepend the nonce so decryption doesn't need a second persisted field.
    let mut combined = nonce_bytes.to_vec();
    combined.append(&mut ciphertext);
    Ok(EncryptedText {
        salt_b64: hex::encode(salt),
        ciphertext_b64: hex::encode(combined),
    })
}

pub fn decrypt_text(ciphertext_b64: &str, password: &str, salt_b64: &str) -> Result<String, CryptoKdfError> {
    let salt = hex::decode(salt_b64).map_err(|_| CryptoKdfError::Decryption)?;
    let combined = hex::decode(ciphertext_b64).map_err(|_| CryptoKdfError::Decryption)?;
    if combined.len() < 12 {
        return Err(CryptoKdfError::Decryption);
    }
    let (nonce_bytes, ciphertext) = combined.split_at(12);
    let key = password_to_key(password, &salt);
    let cipher = ChaCha20Poly1305::new((&key).into());
    let nonce = Nonce::from_slice(nonce_bytes);
    let plain = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoKdfError::Decryption)?;
    String::from_utf8(plain).map_err(|_| CryptoKdfError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_below_minimum_words_is_rejected() {
        assert!(generate_mnemonic(6).is_err());
    }

    #[test]
    fn derive_keypair_is_deterministic_for_same_mnemonic() {
        let mnemonic = "amber anchor ashore atlas aurora basil beacon birch bramble brook canyon cedar";
        let a = derive_keypair(mnemonic, "").unwrap();
        let b = derive_keypair(mnemonic, "").unwrap();
        assert_eq!(a.address, b.address);
        assert_eq!(a.private_key_pem, b.private_key_pem);
    }

    #[test]
    fn different_mnemonics_yield_different_addresses() {
        let a = derive_keypair("amber anchor ashore atlas aurora basil beacon birch bramble brook canyon cedar", "").unwrap();
        let b = derive_keypair("cinder cliff clover comet copper coral cosmic crane crimson crystal dawn delta", "").unwrap();
        assert_ne!(a.address, b.address);
    }

    #[test]
    fn address_has_expected_shape() {
        let a = derive_keypair("amber anchor ashore atlas aurora basil beacon birch bramble brook canyon cedar", "").unwrap();
        assert!(a.address.starts_with("0x"));
        assert_eq!(a.address.len(), 42);
    }

    #[test]
    fn encrypt_then_decrypt_round_trips() {
        let enc = encrypt_text("top secret pem bytes", "hunter2").unwrap();
        let plain = decrypt_text(&enc.ciphertext_b64, "hunter2", &enc.salt_b64).unwrap();
        assert_eq!(plain, "top secret pem bytes");
    }

    #[test]
    fn decrypt_with_wrong_password_fails() {
        let enc = encrypt_text("top secret pem bytes", "hunter2").unwrap();
        assert!(decrypt_text(&enc.ciphertext_b64, "wrong", &enc.salt_b64).is_err());
    }
}
