// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Producer and Consumer Flows
//!
//! Client-side orchestration of the exchange protocol: sealing a payload
//! before upload, opening one after download, and driving the five logical
//! relay operations through a transport seam so flows are testable against
//! an in-process relay.
//!
//! Keys are derived and used exclusively on this side; the relay never sees
//! a password or `KeyMaterial`.

use std::thread::sleep;
use std::time::Duration;

use uuid::Uuid;

use super::relay::{
    CompleteRequest, CompleteResponse, ExchangeRelay, InitRequest, InitResponse, ResolveResponse,
};
use super::record::{ShortCode, VerificationMode};
use crate::crypto::{
    decrypt, derive_from_password, location_mode_key, IntegrityTag, Nonce, Salt, Sealer,
};
use crate::error::ProtocolError;
use crate::geo::GeoPoint;

/// A payload sealed for upload: ciphertext plus the public metadata the
/// relay stores alongside it.
#[derive(Debug, Clone)]
pub struct SealedUpload {
    pub ciphertext: Vec<u8>,
    pub nonce: Nonce,
    pub tag: IntegrityTag,
    /// Present in password mode only.
    pub salt: Option<Salt>,
}

/// Seals a payload under a password-derived key with a fresh salt and nonce.
pub fn seal_for_password(plaintext: &[u8], password: &str) -> Result<SealedUpload, ProtocolError> {
    let salt = Salt::generate();
    let key = derive_from_password(password, &salt)?;
    let mut sealer = Sealer::new(key);
    let (nonce, ciphertext, tag) = sealer.seal(plaintext)?;

    Ok(SealedUpload {
        ciphertext,
        nonce,
        tag,
        salt: Some(salt),
    })
}

/// Seals a payload under the location-mode shared key.
///
/// Confidentiality here comes from the relay's geofence gate, not from this
/// key; see `crypto::kdf::derive_from_shared_secret`.
pub fn seal_for_location(plaintext: &[u8]) -> Result<SealedUpload, ProtocolError> {
    let mut sealer = Sealer::new(location_mode_key());
    let (nonce, ciphertext, tag) = sealer.seal(plaintext)?;

    Ok(SealedUpload {
        ciphertext,
        nonce,
        tag,
        salt: None,
    })
}

/// Decrypts downloaded ciphertext with a password-derived key.
///
/// A wrong password fails the integrity check exactly like tampered
/// ciphertext does; the caller cannot tell them apart.
pub fn open_with_password(
    ciphertext: &[u8],
    nonce: &Nonce,
    tag: &IntegrityTag,
    salt: &Salt,
    password: &str,
) -> Result<Vec<u8>, ProtocolError> {
    let key = derive_from_password(password, salt)?;
    Ok(decrypt(ciphertext, &key, nonce, tag)?)
}

/// Decrypts downloaded ciphertext with the location-mode shared key.
pub fn open_with_shared_secret(
    ciphertext: &[u8],
    nonce: &Nonce,
    tag: &IntegrityTag,
) -> Result<Vec<u8>, ProtocolError> {
    let key = location_mode_key();
    Ok(decrypt(ciphertext, &key, nonce, tag)?)
}

/// The five logical relay operations, as seen from a client.
///
/// Implementations map `ProtocolError::Transient` onto their own network
/// failures; everything else passes through typed.
pub trait RelayTransport {
    fn init_exchange(&self, request: InitRequest) -> Result<InitResponse, ProtocolError>;
    fn store_ciphertext(&self, exchange_id: Uuid, bytes: Vec<u8>) -> Result<(), ProtocolError>;
    fn complete_exchange(
        &self,
        exchange_id: Uuid,
        request: CompleteRequest,
    ) -> Result<CompleteResponse, ProtocolError>;
    fn resolve_exchange(
        &self,
        short_code: &str,
        consumer_point: Option<GeoPoint>,
    ) -> Result<ResolveResponse, ProtocolError>;
    fn fetch_ciphertext(&self, ciphertext_ref: &str) -> Result<Vec<u8>, ProtocolError>;
}

/// In-process transport: calls straight into an [`ExchangeRelay`].
impl RelayTransport for ExchangeRelay {
    fn init_exchange(&self, request: InitRequest) -> Result<InitResponse, ProtocolError> {
        ExchangeRelay::init_exchange(self, request)
    }

    fn store_ciphertext(&self, exchange_id: Uuid, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        ExchangeRelay::store_ciphertext(self, exchange_id, bytes)
    }

    fn complete_exchange(
        &self,
        exchange_id: Uuid,
        request: CompleteRequest,
    ) -> Result<CompleteResponse, ProtocolError> {
        ExchangeRelay::complete_exchange(self, exchange_id, request)
    }

    fn resolve_exchange(
        &self,
        short_code: &str,
        consumer_point: Option<GeoPoint>,
    ) -> Result<ResolveResponse, ProtocolError> {
        ExchangeRelay::resolve_exchange(self, short_code, consumer_point)
    }

    fn fetch_ciphertext(&self, ciphertext_ref: &str) -> Result<Vec<u8>, ProtocolError> {
        ExchangeRelay::fetch_ciphertext(self, ciphertext_ref)
    }
}

/// Bounded retry policy for transient transport failures.
///
/// Applied to idempotent operations only (resolve, fetch). Completions and
/// uploads are never retried by this layer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): 1s, 2s, 4s, ... capped.
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs an idempotent operation, retrying on `Transient` failures with
/// capped exponential backoff. Any other error returns immediately.
pub fn retry_transient<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut() -> Result<T, ProtocolError>,
) -> Result<T, ProtocolError> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(ProtocolError::Transient(_)) if attempt < policy.max_retries => {
                sleep(policy.delay_for(attempt));
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Producer flow: seals `plaintext` under `password` and drives the three
/// upload transitions. Returns the short code to hand to the consumer.
pub fn upload_with_password(
    relay: &impl RelayTransport,
    plaintext: &[u8],
    password: &str,
) -> Result<ShortCode, ProtocolError> {
    let sealed = seal_for_password(plaintext, password)?;

    let init = relay.init_exchange(InitRequest {
        mode: VerificationMode::Password,
        salt: sealed.salt,
        radius_meters: None,
        producer_point: None,
    })?;
    relay.store_ciphertext(init.exchange_id, sealed.ciphertext)?;

    let completed = relay.complete_exchange(
        init.exchange_id,
        CompleteRequest {
            nonce: sealed.nonce,
            tag: sealed.tag,
            salt: sealed.salt,
            radius_meters: None,
            producer_point: None,
        },
    )?;

    Ok(completed.short_code)
}

/// Producer flow for location mode: records the producer's point and an
/// optional radius (relay default: 100 m).
pub fn upload_at_location(
    relay: &impl RelayTransport,
    plaintext: &[u8],
    producer_point: GeoPoint,
    radius_meters: Option<f64>,
) -> Result<ShortCode, ProtocolError> {
    let sealed = seal_for_location(plaintext)?;

    let init = relay.init_exchange(InitRequest {
        mode: VerificationMode::Location,
        salt: None,
        radius_meters,
        producer_point: Some(producer_point),
    })?;
    relay.store_ciphertext(init.exchange_id, sealed.ciphertext)?;

    let completed = relay.complete_exchange(
        init.exchange_id,
        CompleteRequest {
            nonce: sealed.nonce,
            tag: sealed.tag,
            salt: None,
            radius_meters,
            producer_point: Some(producer_point),
        },
    )?;

    Ok(completed.short_code)
}

/// Consumer flow: resolves a short code with a password and decrypts.
pub fn download_with_password(
    relay: &impl RelayTransport,
    short_code: &str,
    password: &str,
    retry: &RetryPolicy,
) -> Result<Vec<u8>, ProtocolError> {
    let resolved = retry_transient(retry, || relay.resolve_exchange(short_code, None))?;
    if resolved.mode != VerificationMode::Password {
        return Err(ProtocolError::InvalidInput(
            "exchange does not use password verification".into(),
        ));
    }
    let salt = resolved
        .salt
        .ok_or_else(|| ProtocolError::InvalidInput("missing salt in response".into()))?;

    let ciphertext = retry_transient(retry, || relay.fetch_ciphertext(&resolved.ciphertext_ref))?;

    open_with_password(
        &ciphertext,
        &resolved.nonce,
        &resolved.tag,
        &salt,
        password,
    )
}

/// Consumer flow: resolves a short code with a claimed location and
/// decrypts. Returns the plaintext and whether the relay flagged the fix as
/// low confidence.
pub fn download_at_location(
    relay: &impl RelayTransport,
    short_code: &str,
    consumer_point: GeoPoint,
    retry: &RetryPolicy,
) -> Result<(Vec<u8>, bool), ProtocolError> {
    let resolved = retry_transient(retry, || {
        relay.resolve_exchange(short_code, Some(consumer_point))
    })?;
    if resolved.mode != VerificationMode::Location {
        return Err(ProtocolError::InvalidInput(
            "exchange does not use location verification".into(),
        ));
    }

    let ciphertext = retry_transient(retry, || relay.fetch_ciphertext(&resolved.ciphertext_ref))?;

    let plaintext = open_with_shared_secret(&ciphertext, &resolved.nonce, &resolved.tag)?;
    Ok((plaintext, resolved.low_accuracy_warning))
}
