//! Dropgate Core Library
//!
//! Credential- and location-gated encrypted file exchange. A producer seals
//! a payload under a verification secret (password or the location-mode
//! shared key), hands the ciphertext plus public metadata to a relay, and a
//! consumer must know the password or stand inside the recorded geofence
//! before the relay returns enough to decrypt.
//!
//! The relay never holds usable key material. Cryptographic primitives come
//! from the audited `ring` crate, plus `chacha20poly1305` for the AEAD and
//! `argon2` for the password KDF.

pub mod crypto;
pub mod error;
pub mod geo;
pub mod protocol;
pub mod token;

pub use crypto::{
    decrypt, derive_from_password, derive_from_shared_secret, encrypt, location_mode_key,
    CipherError, IntegrityTag, KdfError, KeyMaterial, Nonce, Salt, Sealer,
};
pub use error::ProtocolError;
pub use geo::{
    check_within_radius, distance_or_infinity, haversine_distance_meters, within_radius, GeoPoint,
    RadiusCheck, ACCURACY_WARN_THRESHOLD_METERS, DEFAULT_RADIUS_METERS, EARTH_RADIUS_METERS,
};
pub use protocol::{
    download_at_location, download_with_password, seal_for_location, seal_for_password,
    upload_at_location, upload_with_password, CompleteRequest, CompleteResponse, ExchangeRecord,
    ExchangeRelay, ExchangeState, InitRequest, InitResponse, MemoryStore, RecordStore,
    RelayConfig, RelayTransport, ResolveResponse, RetryPolicy, SealedUpload, ShortCode,
    VerificationMode,
};
pub use token::{TokenError, TokenPayload, TokenSigner, TOKEN_TTL_SECS};
