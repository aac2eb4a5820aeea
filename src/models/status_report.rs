// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Secure-channel StatusReport payload.
//!
//! Unlike everything else in the secure channel this is not TLV but a
//! fixed little-endian triple:
//!
//! ```text
//! | u16 | general code   (0 = success, 1 = failure) |
//! | u32 | protocol id the code belongs to           |
//! | u16 | protocol-specific code                    |
//! ```

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LittleEndian, U16, U32};

use crate::{errors::CoreError, models::opcode::PROTOCOL_SECURE_CHANNEL};

pub const GENERAL_CODE_SUCCESS: u16 = 0x0000;
pub const GENERAL_CODE_FAILURE: u16 = 0x0001;

/// Secure-channel protocol codes used by session establishment.
pub const SC_CODE_SESSION_ESTABLISHMENT_SUCCESS: u16 = 0x0000;
pub const SC_CODE_NO_SHARED_TRUST_ROOTS: u16 = 0x0001;
pub const SC_CODE_SESSION_ESTABLISHMENT_FAILED: u16 = 0x0002;
pub const SC_CODE_CLOSE_SESSION: u16 = 0x0003;
pub const SC_CODE_BUSY: u16 = 0x0004;

/// Wire image of the payload.
#[repr(C)]
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable)]
struct RawStatusReport {
    general_code: U16<LittleEndian>,
    protocol_id: U32<LittleEndian>,
    protocol_code: U16<LittleEndian>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub general_code: u16,
    pub protocol_id: u32,
    pub protocol_code: u16,
}

impl StatusReport {
    pub fn session_establishment_success() -> Self {
        Self {
            general_code: GENERAL_CODE_SUCCESS,
            protocol_id: PROTOCOL_SECURE_CHANNEL as u32,
            protocol_code: SC_CODE_SESSION_ESTABLISHMENT_SUCCESS,
        }
    }

    pub fn session_establishment_failed() -> Self {
        Self {
            general_code: GENERAL_CODE_FAILURE,
            protocol_id: PROTOCOL_SECURE_CHANNEL as u32,
            protocol_code: SC_CODE_SESSION_ESTABLISHMENT_FAILED,
        }
    }

    pub fn no_shared_trust_roots() -> Self {
        Self {
            general_code: GENERAL_CODE_FAILURE,
            protocol_id: PROTOCOL_SECURE_CHANNEL as u32,
            protocol_code: SC_CODE_NO_SHARED_TRUST_ROOTS,
        }
    }

    pub fn is_success(&self) -> bool {
        self.general_code == GENERAL_CODE_SUCCESS
    }

    pub fn encode(&self) -> Vec<u8> {
        RawStatusReport {
            general_code: U16::new(self.general_code),
            protocol_id: U32::new(self.protocol_id),
            protocol_code: U16::new(self.protocol_code),
        }
        .as_bytes()
        .to_vec()
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let (raw, _rest) = RawStatusReport::read_from_prefix(raw)
            .map_err(|_| CoreError::TruncatedInput)?;
        Ok(Self {
            general_code: raw.general_code.get(),
            protocol_id: raw.protocol_id.get(),
            protocol_code: raw.protocol_code.get(),
        })
    }
}
