// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Protocol Error Taxonomy
//!
//! Every failure in the exchange protocol maps to one stable,
//! machine-checkable variant. Unknown and expired exchanges are both
//! `NotFound` so callers cannot probe for the existence of expired records;
//! a wrong password and a tampered ciphertext both surface as
//! `IntegrityCheckFailed`.

use thiserror::Error;

use crate::crypto::{CipherError, KdfError};

/// Errors surfaced by the exchange protocol and client flows.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Malformed request shape or values; rejected before any side effect.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown or expired short code / exchange id. Deliberately
    /// indistinguishable between the two.
    #[error("Exchange not found")]
    NotFound,

    /// Location outside the permitted radius. Distance and radius are safe
    /// diagnostics for user feedback; password failures never reach this
    /// variant.
    #[error("Verification failed: {distance_meters:.1}m away, radius {radius_meters:.1}m")]
    VerificationFailed {
        distance_meters: f64,
        radius_meters: f64,
    },

    /// Authentication tag mismatch during decrypt. Fatal to the attempt;
    /// covers wrong keys and tampered data alike.
    #[error("Integrity check failed")]
    IntegrityCheckFailed,

    /// Nonce reuse or equivalent precondition violation. A protocol defect,
    /// never silently retried.
    #[error("Key misuse: {0}")]
    KeyMisuse(String),

    /// Token or record past its TTL, in contexts where expiry is not secret.
    #[error("Expired")]
    Expired,

    /// Network or timeout failure. Eligible for bounded retry by the caller
    /// on idempotent operations only.
    #[error("Transient failure: {0}")]
    Transient(String),
}

impl From<CipherError> for ProtocolError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::IntegrityCheckFailed => ProtocolError::IntegrityCheckFailed,
            CipherError::KeyMisuse(msg) => ProtocolError::KeyMisuse(msg),
            CipherError::EncryptionFailed => {
                ProtocolError::InvalidInput("payload could not be encrypted".into())
            }
        }
    }
}

impl From<KdfError> for ProtocolError {
    fn from(err: KdfError) -> Self {
        match err {
            KdfError::EmptyPassword => ProtocolError::InvalidInput("password must not be empty".into()),
            KdfError::DerivationFailed(msg) => ProtocolError::InvalidInput(msg),
        }
    }
}
