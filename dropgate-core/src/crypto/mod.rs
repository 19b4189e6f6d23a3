// SPDX-FileCopyrightText: 2026 Dropgate Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod cipher;
pub mod kdf;

pub use cipher::{
    decrypt, encrypt, CipherError, IntegrityTag, KeyMaterial, Nonce, Sealer, NONCE_SIZE, TAG_SIZE,
};
pub use kdf::{
    derive_from_password, derive_from_shared_secret, location_mode_key, KdfError, Salt, SALT_SIZE,
};
