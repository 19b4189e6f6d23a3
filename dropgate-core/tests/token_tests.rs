// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for token

use dropgate_core::protocol::VerificationMode;
use dropgate_core::token::{TokenError, TokenSigner, TOKEN_TTL_SECS};
use uuid::Uuid;

const NOW: u64 = 1_700_000_000;

fn signer() -> TokenSigner {
    TokenSigner::new(b"test-relay-secret")
}

#[test]
fn test_issue_verify_roundtrip() {
    let signer = signer();
    let id = Uuid::new_v4();

    let token = signer.issue_at(id, VerificationMode::Password, TOKEN_TTL_SECS, NOW);
    let payload = signer.verify_at(&token, NOW + 60).unwrap();

    assert_eq!(payload.exchange_id, id);
    assert_eq!(payload.mode, VerificationMode::Password);
    assert_eq!(payload.issued_at, NOW);
    assert_eq!(payload.expires_at, NOW + TOKEN_TTL_SECS);
}

#[test]
fn test_tampered_payload_fails_with_bad_signature() {
    let signer = signer();
    let token = signer.issue_at(Uuid::new_v4(), VerificationMode::Location, 900, NOW);

    // Flip one character of the payload half, keeping the structure intact
    let (data, sig) = token.split_once('.').unwrap();
    let mut bytes = data.as_bytes().to_vec();
    bytes[10] = if bytes[10] == b'A' { b'B' } else { b'A' };
    let tampered = format!("{}.{}", String::from_utf8(bytes).unwrap(), sig);

    assert_eq!(
        signer.verify_at(&tampered, NOW + 1),
        Err(TokenError::BadSignature)
    );
}

#[test]
fn test_tampered_signature_fails() {
    let signer = signer();
    let token = signer.issue_at(Uuid::new_v4(), VerificationMode::Password, 900, NOW);

    let (data, sig) = token.split_once('.').unwrap();
    let mut sig_bytes = sig.as_bytes().to_vec();
    sig_bytes[0] = if sig_bytes[0] == b'A' { b'B' } else { b'A' };
    let tampered = format!("{}.{}", data, String::from_utf8(sig_bytes).unwrap());

    assert_eq!(
        signer.verify_at(&tampered, NOW + 1),
        Err(TokenError::BadSignature)
    );
}

#[test]
fn test_expired_token_with_valid_signature() {
    let signer = signer();
    let token = signer.issue_at(Uuid::new_v4(), VerificationMode::Password, 900, NOW);

    assert_eq!(
        signer.verify_at(&token, NOW + 901),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_expiry_boundary_is_strict() {
    let signer = signer();
    let token = signer.issue_at(Uuid::new_v4(), VerificationMode::Password, 900, NOW);

    // now == expires_at still verifies; only now > expires_at fails
    assert!(signer.verify_at(&token, NOW + 900).is_ok());
}

#[test]
fn test_signature_checked_before_expiry() {
    let signer = signer();
    let token = signer.issue_at(Uuid::new_v4(), VerificationMode::Password, 900, NOW);

    let (data, sig) = token.split_once('.').unwrap();
    let mut bytes = data.as_bytes().to_vec();
    bytes[5] = if bytes[5] == b'A' { b'B' } else { b'A' };
    let tampered = format!("{}.{}", String::from_utf8(bytes).unwrap(), sig);

    // Tampered AND long expired: must report BadSignature, not Expired
    assert_eq!(
        signer.verify_at(&tampered, NOW + 10_000),
        Err(TokenError::BadSignature)
    );
}

#[test]
fn test_malformed_tokens() {
    let signer = signer();

    for garbage in ["", "no-dot-here", ".", "a.", ".b", "???.???", "a.b.c!"] {
        assert_eq!(
            signer.verify_at(garbage, NOW),
            Err(TokenError::MalformedToken),
            "input: {garbage:?}"
        );
    }
}

#[test]
fn test_different_secrets_reject_each_other() {
    let token = TokenSigner::new(b"secret-one").issue_at(
        Uuid::new_v4(),
        VerificationMode::Password,
        900,
        NOW,
    );
    assert_eq!(
        TokenSigner::new(b"secret-two").verify_at(&token, NOW),
        Err(TokenError::BadSignature)
    );
}
