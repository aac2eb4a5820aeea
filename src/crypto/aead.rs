// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! AES-128-CCM with the Matter parameter set: 13-byte nonce, 16-byte tag.

use aes::Aes128;
use ccm::{
    Ccm,
    aead::{Aead, KeyInit, Payload},
    consts::{U13, U16},
};
use thiserror::Error;

type Aes128Ccm = Ccm<Aes128, U16, U13>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("AEAD authentication failed")]
pub struct AeadError;

/// Seal `plain` under `key`/`nonce` with `aad`, producing
/// `ciphertext ∥ tag(16)`. Sealing in-memory buffers cannot fail.
pub fn seal(key: &[u8; 16], nonce: &[u8; 13], aad: &[u8], plain: &[u8]) -> Vec<u8> {
    let cipher = Aes128Ccm::new(key.into());
    cipher
        .encrypt(nonce.into(), Payload { msg: plain, aad })
        .expect("CCM seal over in-memory buffers cannot fail")
}

/// Open `ciphertext ∥ tag(16)`. Any bit flipped in ciphertext, aad,
/// nonce or key fails the tag check.
pub fn open(
    key: &[u8; 16],
    nonce: &[u8; 13],
    aad: &[u8],
    sealed: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = Aes128Ccm::new(key.into());
    cipher
        .decrypt(nonce.into(), Payload { msg: sealed, aad })
        .map_err(|_| AeadError)
}
