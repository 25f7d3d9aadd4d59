//! Layered encryption vault for prompt content.
//!
//! `seal` runs three sequential passes, each with its own random IV:
//! AES-256-GCM under a master key (producing the authentication tag), then
//! AES-256-CBC under an actor-scoped key, then AES-256-CTR under a rotation
//! key. The actor-scoped middle layer means content sealed for one actor
//! cannot be opened with another actor's key even if the outer layers are
//! compromised. `open` reverses the passes in strict order and re-verifies a
//! truncated digest of the recovered plaintext.
//!
//! The vault is stateless apart from randomness; plaintext never reaches the
//! logs.

use aes::Aes256;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::config::VaultConfig;
use crate::core::error::AppError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;
type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const KEY_LEN: usize = 32;
const GCM_NONCE_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const BLOCK_IV_LEN: usize = 16;
const DIGEST_PREFIX_LEN: usize = 8;

const MASTER_SALT: &[u8] = b"vault-master-salt";
const ROTATION_SALT: &[u8] = b"vault-rotation-salt";
const ACTOR_SALT: &[u8] = b"vault-actor-salt";

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault seal operation failed")]
    Seal,
    #[error("envelope is malformed")]
    Malformed,
    #[error("envelope integrity verification failed")]
    Integrity,
    #[error("envelope is older than the staleness bound")]
    Expired,
}

impl From<VaultError> for AppError {
    fn from(value: VaultError) -> Self {
        match value {
            VaultError::Expired => AppError::ExpiredEnvelope,
            VaultError::Integrity | VaultError::Malformed => AppError::IntegrityFailure,
            VaultError::Seal => AppError::Internal("Vault seal failed".to_string()),
        }
    }
}

/// Per-layer IVs, the layer-1 authentication tag, a truncated digest of the
/// original plaintext, and the creation timestamp (unix milliseconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    pub iv1: String,
    pub iv2: String,
    pub iv3: String,
    pub tag: String,
    pub hash: String,
    pub ts: i64,
}

/// Opaque encrypted representation of content. Stored as JSON alongside an
/// explicit encrypted marker; never inspected outside this module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub data: String,
    pub meta: EnvelopeMeta,
}

pub struct PromptVault {
    master_key: [u8; KEY_LEN],
    rotation_key: [u8; KEY_LEN],
    max_envelope_age_ms: i64,
}

impl PromptVault {
    pub fn new(config: &VaultConfig) -> Result<Self, VaultError> {
        Ok(Self {
            master_key: derive_key(config.master_secret.as_bytes(), MASTER_SALT)?,
            rotation_key: derive_key(config.rotation_secret.as_bytes(), ROTATION_SALT)?,
            max_envelope_age_ms: config.max_envelope_age.as_millis() as i64,
        })
    }

    /// Encrypt plaintext for an actor through all three passes.
    pub fn seal(&self, plaintext: &str, actor_id: &str) -> Result<Envelope, VaultError> {
        let actor_key = derive_key(actor_id.as_bytes(), ACTOR_SALT)?;

        // Pass 1: authenticated encryption under the master key.
        let mut iv1 = [0u8; GCM_NONCE_LEN];
        OsRng.fill_bytes(&mut iv1);
        let gcm = Aes256Gcm::new_from_slice(&self.master_key).map_err(|_| VaultError::Seal)?;
        let mut inner = gcm
            .encrypt(Nonce::from_slice(&iv1), plaintext.as_bytes())
            .map_err(|_| VaultError::Seal)?;
        let tag = inner.split_off(inner.len() - GCM_TAG_LEN);

        // Pass 2: actor-scoped CBC layer.
        let mut iv2 = [0u8; BLOCK_IV_LEN];
        OsRng.fill_bytes(&mut iv2);
        let middle = Aes256CbcEnc::new_from_slices(&actor_key, &iv2)
            .map_err(|_| VaultError::Seal)?
            .encrypt_padded_vec_mut::<Pkcs7>(&inner);

        // Pass 3: rotation CTR layer.
        let mut iv3 = [0u8; BLOCK_IV_LEN];
        OsRng.fill_bytes(&mut iv3);
        let mut outer = middle;
        Aes256Ctr::new_from_slices(&self.rotation_key, &iv3)
            .map_err(|_| VaultError::Seal)?
            .apply_keystream(&mut outer);

        let digest = hex::encode(Sha256::digest(plaintext.as_bytes()));

        Ok(Envelope {
            data: hex::encode(outer),
            meta: EnvelopeMeta {
                iv1: hex::encode(iv1),
                iv2: hex::encode(iv2),
                iv3: hex::encode(iv3),
                tag: hex::encode(tag),
                hash: digest[..DIGEST_PREFIX_LEN].to_string(),
                ts: Utc::now().timestamp_millis(),
            },
        })
    }

    /// Decrypt an envelope, reversing the passes in strict order. Envelopes
    /// older than the staleness bound are rejected before any key work.
    pub fn open(&self, envelope: &Envelope, actor_id: &str) -> Result<String, VaultError> {
        let age_ms = Utc::now().timestamp_millis() - envelope.meta.ts;
        if age_ms > self.max_envelope_age_ms {
            return Err(VaultError::Expired);
        }

        let outer = hex::decode(&envelope.data).map_err(|_| VaultError::Malformed)?;
        let iv1 = decode_iv::<GCM_NONCE_LEN>(&envelope.meta.iv1)?;
        let iv2 = decode_iv::<BLOCK_IV_LEN>(&envelope.meta.iv2)?;
        let iv3 = decode_iv::<BLOCK_IV_LEN>(&envelope.meta.iv3)?;
        let tag = hex::decode(&envelope.meta.tag).map_err(|_| VaultError::Malformed)?;
        if tag.len() != GCM_TAG_LEN {
            return Err(VaultError::Malformed);
        }

        let actor_key = derive_key(actor_id.as_bytes(), ACTOR_SALT)?;

        // Reverse pass 3.
        let mut middle = outer;
        Aes256Ctr::new_from_slices(&self.rotation_key, &iv3)
            .map_err(|_| VaultError::Malformed)?
            .apply_keystream(&mut middle);

        // Reverse pass 2. A wrong actor key surfaces here as a padding error
        // or later as a tag mismatch; either way the caller sees an integrity
        // failure, never a wrong plaintext.
        let inner = Aes256CbcDec::new_from_slices(&actor_key, &iv2)
            .map_err(|_| VaultError::Malformed)?
            .decrypt_padded_vec_mut::<Pkcs7>(&middle)
            .map_err(|_| VaultError::Integrity)?;

        // Reverse pass 1, validating the authentication tag.
        let mut sealed = inner;
        sealed.extend_from_slice(&tag);
        let gcm = Aes256Gcm::new_from_slice(&self.master_key).map_err(|_| VaultError::Malformed)?;
        let plaintext_bytes = gcm
            .decrypt(Nonce::from_slice(&iv1), sealed.as_ref())
            .map_err(|_| VaultError::Integrity)?;

        let plaintext = String::from_utf8(plaintext_bytes).map_err(|_| VaultError::Integrity)?;

        // Digest re-verification over the recovered plaintext.
        let digest = hex::encode(Sha256::digest(plaintext.as_bytes()));
        if digest[..DIGEST_PREFIX_LEN] != envelope.meta.hash {
            return Err(VaultError::Integrity);
        }

        Ok(plaintext)
    }
}

fn derive_key(secret: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN], VaultError> {
    let params = scrypt::Params::new(14, 8, 1, KEY_LEN).map_err(|_| VaultError::Seal)?;
    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(secret, salt, &params, &mut key).map_err(|_| VaultError::Seal)?;
    Ok(key)
}

fn decode_iv<const N: usize>(value: &str) -> Result<[u8; N], VaultError> {
    let bytes = hex::decode(value).map_err(|_| VaultError::Malformed)?;
    bytes.try_into().map_err(|_| VaultError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_vault() -> PromptVault {
        PromptVault::new(&VaultConfig {
            master_secret: "master-secret-master-secret-master!!".to_string(),
            rotation_secret: "rotation-secret-rotation-secret-rot!".to_string(),
            max_envelope_age: Duration::from_secs(24 * 3600),
        })
        .unwrap()
    }

    #[test]
    fn seal_open_round_trip() {
        let vault = test_vault();
        let plaintext = "אתה עורך טקסט תורני. הוסף פיסוק מלא.";

        let envelope = vault.seal(plaintext, "actor-a").unwrap();
        let recovered = vault.open(&envelope, "actor-a").unwrap();

        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn cross_actor_open_fails_with_integrity_error() {
        let vault = test_vault();
        let envelope = vault.seal("secret content", "actor-a").unwrap();

        let err = vault.open(&envelope, "actor-b").unwrap_err();
        assert!(matches!(err, VaultError::Integrity));
    }

    #[test]
    fn stale_envelope_is_rejected() {
        let vault = test_vault();
        let mut envelope = vault.seal("secret content", "actor-a").unwrap();
        envelope.meta.ts -= 25 * 3600 * 1000;

        let err = vault.open(&envelope, "actor-a").unwrap_err();
        assert!(matches!(err, VaultError::Expired));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let vault = test_vault();
        let mut envelope = vault.seal("secret content", "actor-a").unwrap();

        // Flip the first ciphertext byte.
        let mut raw = hex::decode(&envelope.data).unwrap();
        raw[0] ^= 0xff;
        envelope.data = hex::encode(raw);

        let err = vault.open(&envelope, "actor-a").unwrap_err();
        assert!(matches!(err, VaultError::Integrity));
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let vault = test_vault();
        let mut envelope = vault.seal("secret content", "actor-a").unwrap();

        let mut tag = hex::decode(&envelope.meta.tag).unwrap();
        tag[0] ^= 0x01;
        envelope.meta.tag = hex::encode(tag);

        let err = vault.open(&envelope, "actor-a").unwrap_err();
        assert!(matches!(err, VaultError::Integrity));
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        let vault = test_vault();
        let mut envelope = vault.seal("secret content", "actor-a").unwrap();
        envelope.meta.iv2 = "not-hex".to_string();

        let err = vault.open(&envelope, "actor-a").unwrap_err();
        assert!(matches!(err, VaultError::Malformed));
    }

    #[test]
    fn fresh_randomness_per_seal() {
        let vault = test_vault();
        let a = vault.seal("same content", "actor-a").unwrap();
        let b = vault.seal("same content", "actor-a").unwrap();

        assert_ne!(a.data, b.data);
        assert_ne!(a.meta.iv1, b.meta.iv1);
        // The digest is over the plaintext, so it matches.
        assert_eq!(a.meta.hash, b.meta.hash);
    }
}
