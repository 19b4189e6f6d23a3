// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Exchange Protocol State Machine
//!
//! Relay-side orchestration of the three upload transitions
//! (`init -> store ciphertext -> complete`) and the download side
//! (`resolve -> fetch`). The relay never decrypts and never receives a
//! password; it only gates access to ciphertext metadata.
//!
//! Ordering guarantee: `Completed` is published in a single store update, so
//! a downloader can never observe ciphertext without its metadata. Records
//! still awaiting verification answer `NotFound`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{ExchangeRecord, ExchangeState, ShortCode, VerificationMode};
use super::store::{AssignOutcome, RecordStore};
use crate::crypto::{IntegrityTag, Nonce, Salt};
use crate::error::ProtocolError;
use crate::geo::{check_within_radius, GeoPoint, ACCURACY_WARN_THRESHOLD_METERS};
use crate::token::{now_unix_secs, TokenError, TokenSigner, TOKEN_TTL_SECS};

/// Relay behavior knobs. Defaults match the reference deployment.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// TTL from completion of upload to expiry of the exchange.
    pub completed_ttl_secs: u64,
    /// TTL for abandoned `Initiated`/`AwaitingVerification` records, so
    /// orphans from dropped uploads cannot accumulate.
    pub pending_ttl_secs: u64,
    /// Attempts at short-code allocation before giving up.
    pub short_code_attempts: u32,
    /// Claimed-accuracy threshold for the low-confidence annotation.
    pub accuracy_warn_threshold_meters: f64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            completed_ttl_secs: TOKEN_TTL_SECS,
            pending_ttl_secs: 3 * 60,
            short_code_attempts: 16,
            accuracy_warn_threshold_meters: ACCURACY_WARN_THRESHOLD_METERS,
        }
    }
}

/// Producer request to open an exchange slot. Metadata may be offered here
/// for early validation but the completion request is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitRequest {
    pub mode: VerificationMode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub salt: Option<Salt>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub radius_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub producer_point: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitResponse {
    pub exchange_id: Uuid,
    /// Opaque hint telling the producer where to send ciphertext bytes.
    pub upload_target: String,
}

/// Producer request attaching verification metadata to an uploaded
/// ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompleteRequest {
    pub nonce: Nonce,
    pub tag: IntegrityTag,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub salt: Option<Salt>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub radius_meters: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub producer_point: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResponse {
    pub short_code: ShortCode,
}

/// Everything a verified consumer needs to decrypt, minus the key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveResponse {
    /// Signed handle for [`ExchangeRelay::fetch_ciphertext`]; enforces
    /// expiry and authenticity independently of the short code.
    pub ciphertext_ref: String,
    pub nonce: Nonce,
    pub tag: IntegrityTag,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub salt: Option<Salt>,
    pub mode: VerificationMode,
    /// The consumer's fix was worse than the accuracy threshold; the result
    /// stands but confidence is reduced.
    pub low_accuracy_warning: bool,
}

/// The relay's exchange protocol engine, generic over record storage.
pub struct ExchangeRelay {
    store: Arc<dyn RecordStore>,
    signer: TokenSigner,
    config: RelayConfig,
}

impl ExchangeRelay {
    /// Creates a relay over the given store, signing tokens with `secret`.
    pub fn new(store: Arc<dyn RecordStore>, secret: &[u8], config: RelayConfig) -> Self {
        ExchangeRelay {
            store,
            signer: TokenSigner::new(secret),
            config,
        }
    }

    /// `Initiated`: allocates an exchange slot. No short code exists yet.
    pub fn init_exchange(&self, request: InitRequest) -> Result<InitResponse, ProtocolError> {
        self.init_exchange_at(request, now_unix_secs())
    }

    /// Initiates against an explicit clock (for testing expiry paths).
    pub fn init_exchange_at(
        &self,
        request: InitRequest,
        now: u64,
    ) -> Result<InitResponse, ProtocolError> {
        validate_optional_metadata(request.radius_meters, request.producer_point.as_ref())?;

        let record = ExchangeRecord::new(request.mode, now, self.config.pending_ttl_secs);
        let exchange_id = record.exchange_id;

        self.store
            .insert(record)
            .map_err(|e| ProtocolError::Transient(e.to_string()))?;

        Ok(InitResponse {
            exchange_id,
            upload_target: format!("exchange/{exchange_id}/ciphertext"),
        })
    }

    /// `Initiated -> AwaitingVerification`: accepts ciphertext bytes once.
    ///
    /// A repeat call on a record already holding ciphertext is an idempotent
    /// no-op, so network retries of the upload cannot corrupt state.
    pub fn store_ciphertext(&self, exchange_id: Uuid, bytes: Vec<u8>) -> Result<(), ProtocolError> {
        self.store_ciphertext_at(exchange_id, bytes, now_unix_secs())
    }

    /// Stores ciphertext against an explicit clock (for testing expiry
    /// paths).
    pub fn store_ciphertext_at(
        &self,
        exchange_id: Uuid,
        bytes: Vec<u8>,
        now: u64,
    ) -> Result<(), ProtocolError> {
        if bytes.is_empty() {
            return Err(ProtocolError::InvalidInput("ciphertext must not be empty".into()));
        }

        let record = self.store.get(&exchange_id).ok_or(ProtocolError::NotFound)?;
        if record.is_expired(now) {
            return Err(ProtocolError::NotFound);
        }

        match record.state {
            ExchangeState::Initiated => {}
            ExchangeState::AwaitingVerification => return Ok(()),
            ExchangeState::Completed | ExchangeState::Consumed => {
                return Err(ProtocolError::InvalidInput(
                    "exchange already completed".into(),
                ));
            }
        }

        let mut payload = Some(bytes);
        let updated = self.store.update(&exchange_id, &mut |record| {
            if record.state == ExchangeState::Initiated {
                if let Some(bytes) = payload.take() {
                    record.ciphertext = Some(bytes);
                    record.state = ExchangeState::AwaitingVerification;
                }
            }
        });

        if updated {
            Ok(())
        } else {
            Err(ProtocolError::NotFound)
        }
    }

    /// `AwaitingVerification -> Completed`: attaches verification metadata,
    /// assigns a short code and the post-completion expiry.
    ///
    /// Metadata, expiry, and state are published in one store update; a
    /// concurrent resolve sees either nothing or the full record, and of two
    /// concurrent completions exactly one wins.
    pub fn complete_exchange(
        &self,
        exchange_id: Uuid,
        request: CompleteRequest,
    ) -> Result<CompleteResponse, ProtocolError> {
        self.complete_exchange_at(exchange_id, request, now_unix_secs())
    }

    /// Completes against an explicit clock (for testing expiry paths).
    pub fn complete_exchange_at(
        &self,
        exchange_id: Uuid,
        request: CompleteRequest,
        now: u64,
    ) -> Result<CompleteResponse, ProtocolError> {
        let record = self.store.get(&exchange_id).ok_or(ProtocolError::NotFound)?;
        if record.is_expired(now) {
            return Err(ProtocolError::NotFound);
        }

        match record.state {
            ExchangeState::Initiated => {
                return Err(ProtocolError::InvalidInput("ciphertext not yet uploaded".into()));
            }
            ExchangeState::AwaitingVerification => {}
            ExchangeState::Completed | ExchangeState::Consumed => {
                return Err(ProtocolError::InvalidInput(
                    "exchange already completed".into(),
                ));
            }
        }

        validate_completion_metadata(record.mode, &request)?;

        let short_code = self.allocate_short_code(&exchange_id)?;
        let expires_at = now + self.config.completed_ttl_secs;

        // The state is re-checked under the store lock: the snapshot check
        // above races with concurrent completions, and a completed record
        // must never have its metadata rewritten.
        let mut published = false;
        self.store.update(&exchange_id, &mut |record| {
            if record.state == ExchangeState::AwaitingVerification {
                record.nonce = Some(request.nonce);
                record.tag = Some(request.tag);
                record.salt = request.salt;
                record.radius_meters = request.radius_meters;
                record.producer_point = request.producer_point;
                record.expires_at = expires_at;
                record.state = ExchangeState::Completed;
                published = true;
            }
        });

        if !published {
            return Err(ProtocolError::InvalidInput(
                "exchange already completed".into(),
            ));
        }

        Ok(CompleteResponse { short_code })
    }

    /// Looks up a completed exchange by short code, enforcing the geofence
    /// for location mode.
    ///
    /// Malformed codes are rejected before any lookup. Unknown, expired, and
    /// not-yet-completed records are indistinguishable (`NotFound`). A
    /// geofence rejection carries distance and radius for user feedback.
    pub fn resolve_exchange(
        &self,
        short_code: &str,
        consumer_point: Option<GeoPoint>,
    ) -> Result<ResolveResponse, ProtocolError> {
        self.resolve_exchange_at(short_code, consumer_point, now_unix_secs())
    }

    /// Resolves against an explicit clock (for testing expiry paths).
    pub fn resolve_exchange_at(
        &self,
        short_code: &str,
        consumer_point: Option<GeoPoint>,
        now: u64,
    ) -> Result<ResolveResponse, ProtocolError> {
        let code = ShortCode::parse(short_code)
            .map_err(|e| ProtocolError::InvalidInput(e.to_string()))?;

        let record = self
            .store
            .get_by_short_code(&code)
            .ok_or(ProtocolError::NotFound)?;
        if record.is_expired(now) || !record.is_resolvable() {
            return Err(ProtocolError::NotFound);
        }

        let mut low_accuracy_warning = false;
        if record.mode == VerificationMode::Location {
            let claimed = consumer_point
                .ok_or_else(|| ProtocolError::InvalidInput("location required".into()))?;
            if !claimed.is_valid() {
                return Err(ProtocolError::InvalidInput("invalid location".into()));
            }

            let check = check_within_radius(
                record.producer_point.as_ref(),
                Some(&claimed),
                record.radius_meters,
                self.config.accuracy_warn_threshold_meters,
            );
            if !check.within {
                return Err(ProtocolError::VerificationFailed {
                    distance_meters: check.distance_meters,
                    radius_meters: check.radius_meters,
                });
            }
            low_accuracy_warning = check.low_confidence;
        }

        // Metadata is always present on a resolvable record; completion
        // publishes it atomically.
        let (nonce, tag) = match (record.nonce, record.tag) {
            (Some(nonce), Some(tag)) => (nonce, tag),
            _ => return Err(ProtocolError::NotFound),
        };

        let remaining_ttl = record.expires_at.saturating_sub(now);
        let ciphertext_ref =
            self.signer
                .issue_at(record.exchange_id, record.mode, remaining_ttl, now);

        if record.state == ExchangeState::Completed {
            self.store.update(&record.exchange_id, &mut |record| {
                if record.state == ExchangeState::Completed {
                    record.state = ExchangeState::Consumed;
                }
            });
        }

        Ok(ResolveResponse {
            ciphertext_ref,
            nonce,
            tag,
            salt: record.salt,
            mode: record.mode,
            low_accuracy_warning,
        })
    }

    /// Returns the ciphertext bytes for a signed reference from
    /// [`ExchangeRelay::resolve_exchange`].
    pub fn fetch_ciphertext(&self, ciphertext_ref: &str) -> Result<Vec<u8>, ProtocolError> {
        self.fetch_ciphertext_at(ciphertext_ref, now_unix_secs())
    }

    /// Fetches against an explicit clock (for testing expiry paths).
    pub fn fetch_ciphertext_at(
        &self,
        ciphertext_ref: &str,
        now: u64,
    ) -> Result<Vec<u8>, ProtocolError> {
        let payload = self
            .signer
            .verify_at(ciphertext_ref, now)
            .map_err(|e| match e {
                TokenError::MalformedToken => {
                    ProtocolError::InvalidInput("malformed ciphertext reference".into())
                }
                // A forged reference must look like a missing one.
                TokenError::BadSignature => ProtocolError::NotFound,
                TokenError::Expired => ProtocolError::Expired,
            })?;

        let record = self
            .store
            .get(&payload.exchange_id)
            .ok_or(ProtocolError::NotFound)?;
        if record.is_expired(now) || !record.is_resolvable() {
            return Err(ProtocolError::NotFound);
        }

        record.ciphertext.ok_or(ProtocolError::NotFound)
    }

    /// Garbage-collects expired records (both abandoned pending uploads and
    /// elapsed completed exchanges). Hosts schedule this periodically.
    pub fn sweep_expired(&self, now: u64) -> usize {
        self.store.remove_expired(now)
    }

    fn allocate_short_code(&self, exchange_id: &Uuid) -> Result<ShortCode, ProtocolError> {
        for _ in 0..self.config.short_code_attempts {
            let candidate = ShortCode::generate();
            match self.store.try_assign_short_code(exchange_id, &candidate) {
                AssignOutcome::Assigned => return Ok(candidate),
                AssignOutcome::Collision => continue,
                // A concurrent completion already bound a code; this caller
                // lost the race.
                AssignOutcome::AlreadyAssigned => {
                    return Err(ProtocolError::InvalidInput(
                        "exchange already completed".into(),
                    ));
                }
                AssignOutcome::UnknownExchange => return Err(ProtocolError::NotFound),
            }
        }
        Err(ProtocolError::Transient(
            "short code allocation kept colliding".into(),
        ))
    }
}

fn validate_optional_metadata(
    radius_meters: Option<f64>,
    producer_point: Option<&GeoPoint>,
) -> Result<(), ProtocolError> {
    if let Some(radius) = radius_meters {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ProtocolError::InvalidInput(
                "radius must be a positive number of meters".into(),
            ));
        }
    }
    if let Some(point) = producer_point {
        if !point.is_valid() {
            return Err(ProtocolError::InvalidInput("invalid producer location".into()));
        }
    }
    Ok(())
}

fn validate_completion_metadata(
    mode: VerificationMode,
    request: &CompleteRequest,
) -> Result<(), ProtocolError> {
    validate_optional_metadata(request.radius_meters, request.producer_point.as_ref())?;

    match mode {
        VerificationMode::Password => {
            if request.salt.is_none() {
                return Err(ProtocolError::InvalidInput(
                    "password mode requires a salt".into(),
                ));
            }
        }
        VerificationMode::Location => {
            if request.producer_point.is_none() {
                return Err(ProtocolError::InvalidInput(
                    "location mode requires a producer location".into(),
                ));
            }
        }
    }
    Ok(())
}
