// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verification-Secret Key Derivation
//!
//! Turns a verification secret into 256-bit key material:
//! - Password mode: Argon2id over the UTF-8 password and a per-upload salt.
//! - Location mode: HKDF-SHA256 expansion of a fixed, compiled-in label.
//!
//! Argon2id parameters: m=64MB, t=3, p=4 (OWASP recommended).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use zeroize::Zeroize;

use super::cipher::{decode_b64_array, KeyMaterial};

/// Salt size for password derivation (128 bits = 16 bytes).
pub const SALT_SIZE: usize = 16;

/// Argon2id memory cost in KiB (64 MB).
const ARGON2_M_COST: u32 = 65536;
/// Argon2id time cost (iterations).
const ARGON2_T_COST: u32 = 3;
/// Argon2id parallelism.
const ARGON2_P_COST: u32 = 4;

/// Fixed label expanded into the location-mode key. Matches the value baked
/// into every distributed client, so it provides no secrecy whatsoever.
const LOCATION_SECRET_LABEL: &str = "location-fixed-shared-key-32";

/// HKDF extraction salt, domain-separating this crate's key expansion.
const HKDF_DOMAIN_SALT: &[u8] = b"dropgate-shared-secret-v1";

/// Key derivation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KdfError {
    #[error("Password must not be empty")]
    EmptyPassword,
    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),
}

/// Random per-upload salt for password derivation. Public; stored alongside
/// the ciphertext metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generates a fresh random salt.
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let mut bytes = [0u8; SALT_SIZE];
        rng.fill(&mut bytes).expect("System RNG should not fail");
        Salt(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Salt(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }
}

/// Derives 256-bit key material from a password using Argon2id.
///
/// Deterministic: the same (password, salt) pair always yields the same key.
/// Fails with `EmptyPassword` before touching the KDF if the password is
/// empty.
pub fn derive_from_password(password: &str, salt: &Salt) -> Result<KeyMaterial, KdfError> {
    if password.is_empty() {
        return Err(KdfError::EmptyPassword);
    }

    let params = argon2::Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| KdfError::DerivationFailed(e.to_string()))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key_bytes = [0u8; 32];
    argon2
        .hash_password_into(password.as_bytes(), salt.as_bytes(), &mut key_bytes)
        .map_err(|e| KdfError::DerivationFailed(e.to_string()))?;

    let key = KeyMaterial::from_bytes(key_bytes);
    key_bytes.zeroize();
    Ok(key)
}

/// Derives the location-mode key by expanding the compiled-in label through
/// HKDF-SHA256.
///
/// # Threat model
///
/// This key is NOT secret: the label ships inside every client, so anyone
/// holding client code (or observing the relay) can derive it. Location
/// mode's entire security rests on the geofence gating access to the
/// ciphertext, not on secrecy of this key. The one-way expansion only ensures
/// the key is a full-entropy 256-bit value rather than padded label bytes.
pub fn derive_from_shared_secret(label: &str) -> KeyMaterial {
    let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, HKDF_DOMAIN_SALT);
    let prk = salt.extract(label.as_bytes());
    let okm = prk
        .expand(&[b"payload-key"], hkdf::HKDF_SHA256)
        .expect("HKDF expand to hash-length output should not fail");

    let mut key_bytes = [0u8; 32];
    okm.fill(&mut key_bytes)
        .expect("HKDF fill of 32 bytes should not fail");

    let key = KeyMaterial::from_bytes(key_bytes);
    key_bytes.zeroize();
    key
}

/// Derives the location-mode key from the built-in label.
pub fn location_mode_key() -> KeyMaterial {
    derive_from_shared_secret(LOCATION_SECRET_LABEL)
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = decode_b64_array::<D, SALT_SIZE>(deserializer, "salt")?;
        Ok(Salt(bytes))
    }
}

// INLINE_TEST_REQUIRED: Tests the private LOCATION_SECRET_LABEL constant
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_mode_key_matches_label_expansion() {
        let built_in = location_mode_key();
        let explicit = derive_from_shared_secret(LOCATION_SECRET_LABEL);
        assert_eq!(built_in.as_bytes(), explicit.as_bytes());
    }

    #[test]
    fn test_shared_secret_key_is_not_label_bytes() {
        let key = location_mode_key();
        assert_ne!(&key.as_bytes()[..], LOCATION_SECRET_LABEL.as_bytes());
    }
}
