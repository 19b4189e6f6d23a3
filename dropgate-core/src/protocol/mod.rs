// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Exchange Protocol
//!
//! Relay-side state machine, record storage abstraction, and client-side
//! producer/consumer flows for the encrypted exchange.

pub mod client;
pub mod record;
pub mod relay;
pub mod store;

pub use client::{
    download_at_location, download_with_password, open_with_password, open_with_shared_secret,
    retry_transient, seal_for_location, seal_for_password, upload_at_location,
    upload_with_password, RelayTransport, RetryPolicy, SealedUpload,
};
pub use record::{
    ExchangeRecord, ExchangeState, ShortCode, ShortCodeError, VerificationMode, SHORT_CODE_LEN,
};
pub use relay::{
    CompleteRequest, CompleteResponse, ExchangeRelay, InitRequest, InitResponse, RelayConfig,
    ResolveResponse,
};
pub use store::{AssignOutcome, MemoryStore, RecordStore, StoreError};
