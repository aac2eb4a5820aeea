// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CASE (Sigma) handshake payloads.
//!
//! Σ2/Σ3 carry an inner AEAD envelope (TBE) whose plaintext is another
//! TLV struct; the to-be-signed (TBS) structs never hit the wire, only
//! their signatures do.

use crate::{
    errors::CoreError,
    tlv::{TlvValue, decode, encode},
};

/// Fixed nonces for the Σ2/Σ3 envelope encryption.
pub const NONCE_SIGMA2: [u8; 13] = *b"NCASE_Sigma2N";
pub const NONCE_SIGMA3: [u8; 13] = *b"NCASE_Sigma3N";

#[derive(Debug, Clone, PartialEq)]
pub struct Sigma1 {
    pub initiator_random: Vec<u8>,
    pub initiator_session_id: u16,
    pub destination_id: Vec<u8>,
    pub initiator_eph_pub: Vec<u8>,
    pub resumption_id: Option<Vec<u8>>,
}

impl Sigma1 {
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = vec![
            (1, TlvValue::Bytes(self.initiator_random.clone())),
            (2, TlvValue::UnsignedInt(self.initiator_session_id as u64)),
            (3, TlvValue::Bytes(self.destination_id.clone())),
            (4, TlvValue::Bytes(self.initiator_eph_pub.clone())),
        ];
        if let Some(r) = &self.resumption_id {
            fields.push((6, TlvValue::Bytes(r.clone())));
        }
        encode(&TlvValue::Struct(fields))
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
            destination_id: root
                .field(3)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            initiator_eph_pub: root
                .field(4)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            resumption_id: root.field(6).and_then(TlvValue::as_bytes).map(<[u8]>::to_vec),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sigma2 {
    pub responder_random: Vec<u8>,
    pub responder_session_id: u16,
    pub responder_eph_pub: Vec<u8>,
    pub encrypted2: Vec<u8>,
}

impl Sigma2 {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![
            (1, TlvValue::Bytes(self.responder_random.clone())),
            (2, TlvValue::UnsignedInt(self.responder_session_id as u64)),
            (3, TlvValue::Bytes(self.responder_eph_pub.clone())),
            (4, TlvValue::Bytes(self.encrypted2.clone())),
        ]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            responder_random: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            responder_session_id: root
                .field(2)
                .and_then(TlvValue::as_u64)
                .ok_or(CoreError::InvalidTag)? as u16,
            responder_eph_pub: root
                .field(3)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            encrypted2: root
                .field(4)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sigma3 {
    pub encrypted3: Vec<u8>,
}

impl Sigma3 {
    pub fn encode(&self) -> Vec<u8> {
        encode(&TlvValue::Struct(vec![(1, TlvValue::Bytes(self.encrypted3.clone()))]))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            encrypted3: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}

/// TBS2/TBS3: the struct the ECDSA signature covers.
pub fn encode_tbs(
    noc: &[u8],
    icac: Option<&[u8]>,
    first_pub: &[u8],
    second_pub: &[u8],
) -> Vec<u8> {
    let mut fields = vec![(1, TlvValue::Bytes(noc.to_vec()))];
    if let Some(icac) = icac {
        fields.push((2, TlvValue::Bytes(icac.to_vec())));
    }
    fields.push((3, TlvValue::Bytes(first_pub.to_vec())));
    fields.push((4, TlvValue::Bytes(second_pub.to_vec())));
    encode(&TlvValue::Struct(fields))
}

/// Σ2 envelope plaintext: credentials + signature + resumption id.
#[derive(Debug, Clone, PartialEq)]
pub struct Tbe2 {
    pub noc: Vec<u8>,
    pub icac: Option<Vec<u8>>,
    pub signature: Vec<u8>,
    pub resumption_id: Vec<u8>,
}

impl Tbe2 {
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = vec![(1, TlvValue::Bytes(self.noc.clone()))];
        if let Some(icac) = &self.icac {
            fields.push((2, TlvValue::Bytes(icac.clone())));
        }
        fields.push((3, TlvValue::Bytes(self.signature.clone())));
        fields.push((4, TlvValue::Bytes(self.resumption_id.clone())));
        encode(&TlvValue::Struct(fields))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            noc: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            icac: root.field(2).and_then(TlvValue::as_bytes).map(<[u8]>::to_vec),
            signature: root
                .field(3)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            resumption_id: root
                .field(4)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}

/// Σ3 envelope plaintext: initiator credentials + signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Tbe3 {
    pub noc: Vec<u8>,
    pub icac: Option<Vec<u8>>,
    pub signature: Vec<u8>,
}

impl Tbe3 {
    pub fn encode(&self) -> Vec<u8> {
        let mut fields = vec![(1, TlvValue::Bytes(self.noc.clone()))];
        if let Some(icac) = &self.icac {
            fields.push((2, TlvValue::Bytes(icac.clone())));
        }
        fields.push((3, TlvValue::Bytes(self.signature.clone())));
        encode(&TlvValue::Struct(fields))
    }

    pub fn decode(raw: &[u8]) -> Result<Self, CoreError> {
        let root = decode(raw)?;
        Ok(Self {
            noc: root
                .field(1)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
            icac: root.field(2).and_then(TlvValue::as_bytes).map(<[u8]>::to_vec),
            signature: root
                .field(3)
                .and_then(TlvValue::as_bytes)
                .ok_or(CoreError::InvalidTag)?
                .to_vec(),
        })
    }
}
