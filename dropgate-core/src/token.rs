// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signed Exchange Tokens
//!
//! A token binds an internal exchange id to its verification mode and an
//! expiry, signed with a relay-held HMAC secret. Wire format:
//! `base64url(json payload) "." base64url(hmac-sha256)`.
//!
//! Verification order is fixed: parse, then signature (constant-time), then
//! expiry. An attacker without a valid signature cannot learn whether a
//! token is expired or tampered.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::record::VerificationMode;

/// Reference token lifetime: 15 minutes from completion of upload.
pub const TOKEN_TTL_SECS: u64 = 15 * 60;

/// Token error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    MalformedToken,
    #[error("Bad token signature")]
    BadSignature,
    #[error("Token has expired")]
    Expired,
}

/// Signed token payload. The signature covers the serialized form, so no
/// field can change without invalidating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub exchange_id: Uuid,
    pub mode: VerificationMode,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Issues and verifies signed exchange tokens with a server-held secret.
pub struct TokenSigner {
    key: hmac::Key,
}

impl TokenSigner {
    /// Creates a signer from the relay's secret bytes.
    pub fn new(secret: &[u8]) -> Self {
        TokenSigner {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Issues a token expiring `ttl_secs` from now.
    pub fn issue(&self, exchange_id: Uuid, mode: VerificationMode, ttl_secs: u64) -> String {
        self.issue_at(exchange_id, mode, ttl_secs, now_unix_secs())
    }

    /// Issues a token with an explicit issue time (for testing expiry paths).
    pub fn issue_at(
        &self,
        exchange_id: Uuid,
        mode: VerificationMode,
        ttl_secs: u64,
        now: u64,
    ) -> String {
        let payload = TokenPayload {
            exchange_id,
            mode,
            issued_at: now,
            expires_at: now + ttl_secs,
        };

        let json = serde_json::to_vec(&payload).expect("token payload serialization cannot fail");
        let data = URL_SAFE_NO_PAD.encode(json);
        let sig = hmac::sign(&self.key, data.as_bytes());

        format!("{}.{}", data, URL_SAFE_NO_PAD.encode(sig.as_ref()))
    }

    /// Verifies a token against the current clock.
    pub fn verify(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.verify_at(token, now_unix_secs())
    }

    /// Verifies a token against an explicit clock.
    ///
    /// Expiry is checked strictly after the signature verifies.
    pub fn verify_at(&self, token: &str, now: u64) -> Result<TokenPayload, TokenError> {
        let (data, sig) = token.split_once('.').ok_or(TokenError::MalformedToken)?;
        if data.is_empty() || sig.is_empty() {
            return Err(TokenError::MalformedToken);
        }

        let sig_bytes = URL_SAFE_NO_PAD
            .decode(sig)
            .map_err(|_| TokenError::MalformedToken)?;

        // Constant-time comparison via ring
        hmac::verify(&self.key, data.as_bytes(), &sig_bytes)
            .map_err(|_| TokenError::BadSignature)?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(data)
            .map_err(|_| TokenError::MalformedToken)?;
        let payload: TokenPayload =
            serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::MalformedToken)?;

        if now > payload.expires_at {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }
}

/// Seconds since the Unix epoch.
pub(crate) fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}
