// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Authenticated Encryption (ChaCha20-Poly1305, detached tag)
//!
//! Encrypts a payload under a 256-bit key and a 96-bit nonce, producing a
//! ciphertext of identical length plus a separate 128-bit integrity tag.
//! The tag is verified before any plaintext is released; a tag mismatch is
//! indistinguishable between "wrong key" and "tampered ciphertext".
//!
//! Nonces must never repeat under the same key. [`Sealer`] tracks the nonces
//! it has spent and refuses reuse loudly; prefer it over the free functions
//! when encrypting more than once with one key.

use std::collections::HashSet;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Tag};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroize;

/// Nonce size (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;
/// Poly1305 authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

/// Cipher error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("Encryption failed")]
    EncryptionFailed,
    #[error("Integrity check failed: data may be corrupted or wrong key")]
    IntegrityCheckFailed,
    #[error("Key misuse: {0}")]
    KeyMisuse(String),
}

/// 256-bit symmetric key material.
///
/// Exists only transiently in producer/consumer memory. Never serialized,
/// never logged; the relay never holds one.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    bytes: [u8; 32],
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Don't expose key bytes in debug output
        f.debug_struct("KeyMaterial")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl KeyMaterial {
    /// Generates a new random key.
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let bytes = ring::rand::generate::<[u8; 32]>(&rng)
            .expect("System RNG should not fail")
            .expose();
        KeyMaterial { bytes }
    }

    /// Creates key material from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        KeyMaterial { bytes }
    }

    /// Returns a reference to the key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

/// 96-bit nonce, freshly random per encryption operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generates a fresh random nonce.
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; NONCE_SIZE];
        rng.fill(&mut bytes).expect("System RNG should not fail");
        Nonce(bytes)
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Nonce(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// 128-bit Poly1305 authentication tag, bound to (key, nonce, ciphertext).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityTag([u8; TAG_SIZE]);

impl IntegrityTag {
    pub fn from_bytes(bytes: [u8; TAG_SIZE]) -> Self {
        IntegrityTag(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; TAG_SIZE] {
        &self.0
    }
}

/// Encrypts a payload, returning ciphertext and detached tag.
///
/// Ciphertext length equals plaintext length (no padding). The caller must
/// never reuse `nonce` under the same key; use [`Sealer`] to enforce that.
pub fn encrypt(
    plaintext: &[u8],
    key: &KeyMaterial,
    nonce: &Nonce,
) -> Result<(Vec<u8>, IntegrityTag), CipherError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let mut buffer = plaintext.to_vec();

    let tag = cipher
        .encrypt_in_place_detached(
            chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
            b"",
            &mut buffer,
        )
        .map_err(|_| CipherError::EncryptionFailed)?;

    let tag_bytes: [u8; TAG_SIZE] = tag.into();
    Ok((buffer, IntegrityTag(tag_bytes)))
}

/// Decrypts a payload after verifying its tag.
///
/// Fails with `IntegrityCheckFailed` if the tag does not verify against
/// (key, nonce, ciphertext). No plaintext is released on failure.
pub fn decrypt(
    ciphertext: &[u8],
    key: &KeyMaterial,
    nonce: &Nonce,
    tag: &IntegrityTag,
) -> Result<Vec<u8>, CipherError> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let mut buffer = ciphertext.to_vec();

    cipher
        .decrypt_in_place_detached(
            chacha20poly1305::Nonce::from_slice(nonce.as_bytes()),
            b"",
            &mut buffer,
            Tag::from_slice(tag.as_bytes()),
        )
        .map_err(|_| CipherError::IntegrityCheckFailed)?;

    Ok(buffer)
}

/// Encrypts payloads under one key while guarding against nonce reuse.
///
/// Reusing a (key, nonce) pair breaks both confidentiality and integrity of
/// ChaCha20-Poly1305, so a repeated nonce is a `KeyMisuse` precondition
/// failure, never a recoverable error.
pub struct Sealer {
    key: KeyMaterial,
    spent_nonces: HashSet<[u8; NONCE_SIZE]>,
}

impl Sealer {
    pub fn new(key: KeyMaterial) -> Self {
        Sealer {
            key,
            spent_nonces: HashSet::new(),
        }
    }

    /// Encrypts with a freshly generated nonce.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<(Nonce, Vec<u8>, IntegrityTag), CipherError> {
        let nonce = Nonce::generate();
        let (ciphertext, tag) = self.seal_with_nonce(plaintext, nonce)?;
        Ok((nonce, ciphertext, tag))
    }

    /// Encrypts with a caller-supplied nonce, rejecting any nonce this sealer
    /// has already spent.
    pub fn seal_with_nonce(
        &mut self,
        plaintext: &[u8],
        nonce: Nonce,
    ) -> Result<(Vec<u8>, IntegrityTag), CipherError> {
        if !self.spent_nonces.insert(*nonce.as_bytes()) {
            return Err(CipherError::KeyMisuse(
                "nonce already used under this key".into(),
            ));
        }
        encrypt(plaintext, &self.key, &nonce)
    }
}

impl Serialize for Nonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Nonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = decode_b64_array::<D, NONCE_SIZE>(deserializer, "nonce")?;
        Ok(Nonce(bytes))
    }
}

impl Serialize for IntegrityTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for IntegrityTag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = decode_b64_array::<D, TAG_SIZE>(deserializer, "tag")?;
        Ok(IntegrityTag(bytes))
    }
}

/// Decodes a base64 string into a fixed-size array, for wire deserialization.
pub(crate) fn decode_b64_array<'de, D: Deserializer<'de>, const N: usize>(
    deserializer: D,
    what: &'static str,
) -> Result<[u8; N], D::Error> {
    let encoded = String::deserialize(deserializer)?;
    let bytes = BASE64
        .decode(&encoded)
        .map_err(|_| serde::de::Error::custom(format!("invalid base64 in {what}")))?;
    bytes
        .try_into()
        .map_err(|_| serde::de::Error::custom(format!("wrong {what} length")))
}

// INLINE_TEST_REQUIRED: Tests spent-nonce bookkeeping internal to Sealer
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sealer_tracks_spent_nonces() {
        let mut sealer = Sealer::new(KeyMaterial::generate());
        let nonce = Nonce::generate();

        sealer.seal_with_nonce(b"first", nonce).unwrap();
        assert!(sealer.spent_nonces.contains(nonce.as_bytes()));
    }

    #[test]
    fn test_fresh_nonces_are_distinct() {
        let mut sealer = Sealer::new(KeyMaterial::generate());
        let (n1, _, _) = sealer.seal(b"one").unwrap();
        let (n2, _, _) = sealer.seal(b"two").unwrap();
        assert_ne!(n1, n2);
    }
}
