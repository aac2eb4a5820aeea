// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PASE handshake payloads (TLV structs).
//!
//! Context-tag numbering follows the CHIP secure-channel encoding; the
//! controller-side counterpart reads the same fields at the same paths.

use crate::{
    errors::CoreError,
    tlv::{TlvValue, decode, encode},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PbkdfParamRequest {
    pub initiator_random: Vec<u8>,
    pub initiator_session_id: u16,
    pub passcode_id: u16,
    pub has_pbkdf_parameters: bool,
}

impl PbkdfParamRequest {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![
            (1, TlvValue::Bytes(self.initiator_random.clone())),
            (2, TlvValue::UnsignedInt(self.initiator_session_id as u64)),
            (3, TlvValue::UnsignedInt(self.passcode_id as u64)),
            (4, TlvValue::Bool(self.has_pbkdf_parameters)),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            initiator_random: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            initiator_session_id: root
                .field(2)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
            passcode_id: root.field(3).and_then(TlvValue::as_u64).unwrap_or(0) as u16,
            has_pbkdf_parameters: root
                .field(4)
                .and_then(TlvValue::as_bool)
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PbkdfParamResponse {
    pub initiator_random: Vec<u8>,
    pub responder_random: Vec<u8>,
    pub responder_session_id: u16,
    pub iterations: u32,
    pub salt: Vec<u8>,
}

impl PbkdfParamResponse {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![
            (1, TlvValue::Bytes(self.initiator_random.clone())),
            (2, TlvValue::Bytes(self.responder_random.clone())),
            (3, TlvValue::UnsignedInt(self.responder_session_id as u64)),
            (
                4,
                TlvValue::Struct(vec![
                    (1, TlvValue::UnsignedInt(self.iterations as u64)),
                    (2, TlvValue::Bytes(self.salt.clone())),
                ]),
            ),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            initiator_random: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            responder_random: root
                .field(2)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            responder_session_id: root
                .field(3)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
            iterations: root
                .get(&[4, 1])
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u32,
            salt: root
                .get(&[4, 2])
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pake1 {
    pub p_a: Vec<u8>,
}

impl Pake1 {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![(1, TlvValue::Bytes(self.p_a.clone()))]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            p_a: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pake2 {
    pub p_b: Vec<u8>,
    pub c_b: Vec<u8>,
}

impl Pake2 {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![
            (1, TlvValue::Bytes(self.p_b.clone())),
            (2, TlvValue::Bytes(self.c_b.clone())),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            p_b: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            c_b: root
                .field(2)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pake3 {
    pub c_a: Vec<u8>,
}

impl Pake3 {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![(1, TlvValue::Bytes(self.c_a.clone()))]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            c_a: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}
