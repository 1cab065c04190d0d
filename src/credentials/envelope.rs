// Envelope encryption for credential material.
// AES-256-GCM with a fresh 32-byte DEK per encryption, the DEK itself
// wrapped under the process-wide master key. Storage format keeps nonce
// and ciphertext separate (spec §4.1) rather than packed, since callers
// persist `EncryptedData` as a structured row, not a single blob string.

use crate::error::{CoreError, CoreResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// 32-byte symmetric key, zeroed on drop. Used for both the master key and
/// ephemeral per-record DEKs — neither should ever show up in a `Debug`
/// impl or survive past its owning scope.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretKey(<redacted>)")
    }
}

/// Generate a fresh 32-byte master key. Callers persist this out-of-band
/// (KMS, env var, secrets manager) — this crate never writes it to disk.
pub fn generate_master_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

/// Envelope-encrypted payload, as specified in spec §3 / §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedData {
    /// nonce₂ ‖ AES-256-GCM(DEK, master_key, nonce₂)
    pub encrypted_dek: Vec<u8>,
    /// AES-256-GCM(plaintext, DEK, nonce₁)
    pub ciphertext: Vec<u8>,
    /// nonce₁, 12 bytes.
    pub nonce: Vec<u8>,
    /// Optional external KMS key identifier (unused by this in-process
    /// implementation; carried through for forward compatibility with a
    /// KMS-backed master key provider).
    pub kms_key_id: Option<String>,
}

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

fn cipher_for(key: &[u8]) -> CoreResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| CoreError::validation("key", "AES-256-GCM key must be 32 bytes"))
}

fn random_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Encrypt an in-memory credential map under a fresh DEK, itself wrapped
/// by the master key.
///
/// `map` is a `BTreeMap` (not `HashMap`) so JSON serialization is key-order
/// deterministic — needed for any downstream consumer that wants to
/// compare ciphertexts across re-encryptions of logically identical data,
/// and for reproducible tests.
pub fn encrypt(map: &BTreeMap<String, String>, master_key: &SecretKey) -> CoreResult<EncryptedData> {
    let plaintext = serde_json::to_vec(map)?;

    // Fresh DEK per encryption.
    let mut dek_bytes = [0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut dek_bytes);

    let payload_nonce = random_nonce();
    let dek_cipher = cipher_for(&dek_bytes)?;
    let ciphertext = dek_cipher
        .encrypt(Nonce::from_slice(&payload_nonce), plaintext.as_slice())
        .map_err(|_| CoreError::Internal("payload encryption failed".into()))?;

    let dek_nonce = random_nonce();
    let master_cipher = cipher_for(master_key.as_slice())?;
    let enc_dek = master_cipher
        .encrypt(Nonce::from_slice(&dek_nonce), dek_bytes.as_slice())
        .map_err(|_| CoreError::Internal("dek wrap failed".into()))?;

    dek_bytes.zeroize();

    let mut encrypted_dek = Vec::with_capacity(NONCE_LEN + enc_dek.len());
    encrypted_dek.extend_from_slice(&dek_nonce);
    encrypted_dek.extend_from_slice(&enc_dek);

    Ok(EncryptedData {
        encrypted_dek,
        ciphertext,
        nonce: payload_nonce.to_vec(),
        kms_key_id: None,
    })
}

/// Reverse of [`encrypt`]: unwrap the DEK under the master key, then
/// decrypt the payload. Fails with `CoreError::Validation` on malformed
/// input (short `encrypted_dek`, wrong key, tampered auth tag).
pub fn decrypt(data: &EncryptedData, master_key: &SecretKey) -> CoreResult<BTreeMap<String, String>> {
    if data.encrypted_dek.len() < NONCE_LEN {
        return Err(CoreError::validation(
            "encrypted_dek",
            "shorter than the nonce prefix",
        ));
    }
    if data.nonce.len() != NONCE_LEN {
        return Err(CoreError::validation("nonce", "must be 12 bytes"));
    }

    let (dek_nonce, wrapped_dek) = data.encrypted_dek.split_at(NONCE_LEN);
    let master_cipher = cipher_for(master_key.as_slice())?;
    let mut dek_bytes_vec = master_cipher
        .decrypt(Nonce::from_slice(dek_nonce), wrapped_dek)
        .map_err(|_| CoreError::validation("encrypted_dek", "failed to unwrap — wrong master key or tampered data"))?;

    if dek_bytes_vec.len() != KEY_LEN {
        dek_bytes_vec.zeroize();
        return Err(CoreError::validation("encrypted_dek", "unwrapped DEK has wrong length"));
    }

    let dek_cipher = cipher_for(&dek_bytes_vec)?;
    let plaintext = dek_cipher
        .decrypt(Nonce::from_slice(&data.nonce), data.ciphertext.as_slice())
        .map_err(|_| CoreError::validation("ciphertext", "decryption failed — wrong key or corrupted data"));
    dek_bytes_vec.zeroize();
    let plaintext = plaintext?;

    let map: BTreeMap<String, String> = serde_json::from_slice(&plaintext)?;
    Ok(map)
}

/// Convenience wrapper matching spec §4.1's `encrypt_creds`/`decrypt_creds`
/// naming — operates on the credential's plaintext `data` field directly.
pub fn encrypt_creds(data: &BTreeMap<String, String>, master_key: &SecretKey) -> CoreResult<EncryptedData> {
    encrypt(data, master_key)
}

pub fn decrypt_creds(encrypted: &EncryptedData, master_key: &SecretKey) -> CoreResult<BTreeMap<String, String>> {
    decrypt(encrypted, master_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; 32])
    }

    fn sample_map() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("api_key".to_string(), "sk-live-abc123".to_string());
        m.insert("secret".to_string(), "s3cr3t".to_string());
        m
    }

    #[test]
    fn round_trip() {
        let k = key(0xAB);
        let map = sample_map();
        let enc = encrypt(&map, &k).unwrap();
        let dec = decrypt(&enc, &k).unwrap();
        assert_eq!(dec, map);
    }

    #[test]
    fn wrong_master_key_fails() {
        let map = sample_map();
        let enc = encrypt(&map, &key(0xAB)).unwrap();
        let result = decrypt(&enc, &key(0xCD));
        assert!(result.is_err());
    }

    #[test]
    fn each_encryption_uses_a_fresh_dek_and_nonce() {
        let k = key(0x01);
        let map = sample_map();
        let a = encrypt(&map, &k).unwrap();
        let b = encrypt(&map, &k).unwrap();
        assert_ne!(a.ciphertext, b.ciphertext);
        assert_ne!(a.encrypted_dek, b.encrypted_dek);
    }

    #[test]
    fn truncated_encrypted_dek_is_validation_error() {
        let k = key(0x01);
        let mut enc = encrypt(&sample_map(), &k).unwrap();
        enc.encrypted_dek.truncate(4);
        let err = decrypt(&enc, &k).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
    }

    #[test]
    fn tampered_ciphertext_fails_auth_tag() {
        let k = key(0x01);
        let mut enc = encrypt(&sample_map(), &k).unwrap();
        if let Some(byte) = enc.ciphertext.last_mut() {
            *byte ^= 0xFF;
        }
        assert!(decrypt(&enc, &k).is_err());
    }

    #[test]
    fn empty_map_round_trips() {
        let k = key(0x01);
        let map = BTreeMap::new();
        let enc = encrypt(&map, &k).unwrap();
        let dec = decrypt(&enc, &k).unwrap();
        assert_eq!(dec, map);
    }
}
