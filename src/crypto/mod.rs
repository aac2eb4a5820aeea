// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Cryptographic primitives behind the secure channel.
//!
//! Everything here is a thin, typed wrapper over RustCrypto crates; the
//! higher layers never touch raw cipher APIs. Secret scalars stay inside
//! `p256` types (constant-time complete formulas) and symmetric keys ride
//! in zeroize-on-drop containers.

pub mod aead;
pub mod cert;
pub mod kdf;
pub mod spake2p;
