// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for crypto::kdf

use dropgate_core::crypto::{
    derive_from_password, derive_from_shared_secret, location_mode_key, KdfError, Salt,
};

#[test]
fn test_password_derivation_deterministic() {
    let salt = Salt::from_bytes(*b"random_salt_16b!");

    let key1 = derive_from_password("correct-horse-battery-staple", &salt).unwrap();
    let key2 = derive_from_password("correct-horse-battery-staple", &salt).unwrap();
    assert_eq!(key1.as_bytes(), key2.as_bytes());
}

#[test]
fn test_different_passwords_different_keys() {
    let salt = Salt::from_bytes(*b"same_salt_16byte");

    let key1 = derive_from_password("password1", &salt).unwrap();
    let key2 = derive_from_password("password2", &salt).unwrap();
    assert_ne!(key1.as_bytes(), key2.as_bytes());
}

#[test]
fn test_different_salts_different_keys() {
    let key1 = derive_from_password("same_password", &Salt::from_bytes(*b"salt_one_16bytes")).unwrap();
    let key2 = derive_from_password("same_password", &Salt::from_bytes(*b"salt_two_16bytes")).unwrap();
    assert_ne!(key1.as_bytes(), key2.as_bytes());
}

#[test]
fn test_empty_password_rejected() {
    let salt = Salt::generate();
    assert_eq!(
        derive_from_password("", &salt),
        Err(KdfError::EmptyPassword)
    );
}

#[test]
fn test_password_key_is_32_bytes() {
    let key = derive_from_password("pass", &Salt::generate()).unwrap();
    assert_eq!(key.as_bytes().len(), 32);
}

#[test]
fn test_shared_secret_deterministic() {
    let key1 = derive_from_shared_secret("some-label");
    let key2 = derive_from_shared_secret("some-label");
    assert_eq!(key1.as_bytes(), key2.as_bytes());
}

#[test]
fn test_shared_secret_labels_are_domain_separated() {
    let key1 = derive_from_shared_secret("label-a");
    let key2 = derive_from_shared_secret("label-b");
    assert_ne!(key1.as_bytes(), key2.as_bytes());
}

#[test]
fn test_shared_secret_is_expansion_not_padding() {
    // The derived key must not embed the label bytes themselves.
    let label = "location-fixed-shared-key-32";
    let key = derive_from_shared_secret(label);
    assert_ne!(&key.as_bytes()[..label.len()], label.as_bytes());
}

#[test]
fn test_location_mode_key_is_stable() {
    assert_eq!(
        location_mode_key().as_bytes(),
        location_mode_key().as_bytes()
    );
}

#[test]
fn test_generated_salts_are_distinct() {
    assert_ne!(Salt::generate().as_bytes(), Salt::generate().as_bytes());
}
