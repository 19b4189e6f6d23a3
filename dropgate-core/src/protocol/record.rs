// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Exchange Records
//!
//! Server-side data model for one exchange: verification mode, short code,
//! ciphertext metadata, and lifecycle state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{IntegrityTag, Nonce, Salt};
use crate::geo::GeoPoint;

/// Length of consumer-facing short codes.
pub const SHORT_CODE_LEN: usize = 8;

/// Alphabet for short codes (62 alphanumeric characters).
const SHORT_CODE_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// How the consumer must prove eligibility, fixed at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationMode {
    Password,
    Location,
}

/// Short-code parse error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortCodeError {
    #[error("Short code must be exactly {SHORT_CODE_LEN} characters")]
    WrongLength,
    #[error("Short code contains characters outside the allowed alphabet")]
    InvalidCharacter,
}

/// The 8-character consumer-facing handle for a completed exchange.
///
/// Unique among all non-expired records; the internal exchange id is never
/// exposed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortCode(String);

impl ShortCode {
    /// Generates a random candidate code. Uniqueness is the store's job;
    /// allocation retries on collision.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code: String = (0..SHORT_CODE_LEN)
            .map(|_| SHORT_CODE_ALPHABET[rng.gen_range(0..SHORT_CODE_ALPHABET.len())] as char)
            .collect();
        ShortCode(code)
    }

    /// Validates a consumer-supplied code before any lookup happens.
    pub fn parse(input: &str) -> Result<Self, ShortCodeError> {
        if input.len() != SHORT_CODE_LEN {
            return Err(ShortCodeError::WrongLength);
        }
        if !input.bytes().all(|b| SHORT_CODE_ALPHABET.contains(&b)) {
            return Err(ShortCodeError::InvalidCharacter);
        }
        Ok(ShortCode(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShortCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ShortCode {
    type Error = ShortCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ShortCode::parse(&value)
    }
}

impl From<ShortCode> for String {
    fn from(code: ShortCode) -> String {
        code.0
    }
}

/// Lifecycle state of an exchange.
///
/// `Initiated -> AwaitingVerification -> Completed -> Consumed`. Expiry is a
/// clock predicate ([`ExchangeRecord::is_expired`]) rather than a stored
/// state: an expired record answers every lookup with `NotFound` until the
/// sweep removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Slot allocated; no ciphertext yet.
    Initiated,
    /// Ciphertext received; verification metadata not yet attached.
    AwaitingVerification,
    /// Metadata attached, short code assigned; resolvable by consumers.
    Completed,
    /// At least one decrypt-eligible resolve happened. Bookkeeping only:
    /// repeat downloads stay allowed until expiry.
    Consumed,
}

/// One server-side exchange. Created at init, enriched by the upload
/// transitions, never mutated after completion except by the `Consumed`
/// marker and expiry.
#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub exchange_id: Uuid,
    pub short_code: Option<ShortCode>,
    pub state: ExchangeState,
    pub mode: VerificationMode,
    pub salt: Option<Salt>,
    pub radius_meters: Option<f64>,
    pub producer_point: Option<GeoPoint>,
    pub nonce: Option<Nonce>,
    pub tag: Option<IntegrityTag>,
    pub ciphertext: Option<Vec<u8>>,
    pub created_at: u64,
    pub expires_at: u64,
}

impl ExchangeRecord {
    /// Creates a freshly initiated record with the shorter pending TTL. The
    /// completion transition replaces `expires_at` with the post-completion
    /// TTL.
    pub fn new(mode: VerificationMode, now: u64, pending_ttl_secs: u64) -> Self {
        ExchangeRecord {
            exchange_id: Uuid::new_v4(),
            short_code: None,
            state: ExchangeState::Initiated,
            mode,
            salt: None,
            radius_meters: None,
            producer_point: None,
            nonce: None,
            tag: None,
            ciphertext: None,
            created_at: now,
            expires_at: now + pending_ttl_secs,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// True once a consumer may resolve this record.
    pub fn is_resolvable(&self) -> bool {
        matches!(self.state, ExchangeState::Completed | ExchangeState::Consumed)
    }
}

// INLINE_TEST_REQUIRED: Tests the private SHORT_CODE_ALPHABET constant
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_use_alphabet() {
        for _ in 0..50 {
            let code = ShortCode::generate();
            assert_eq!(code.as_str().len(), SHORT_CODE_LEN);
            assert!(code
                .as_str()
                .bytes()
                .all(|b| SHORT_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_parse_rejects_non_alphabet_characters() {
        assert_eq!(
            ShortCode::parse("abc-1234"),
            Err(ShortCodeError::InvalidCharacter)
        );
    }
}
