// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Message-layer and protocol-layer header codec.
//!
//! Wire layout (little-endian throughout):
//!
//! ```text
//! | u8          | message flags: high nibble version, low nibble S/DSIZ |
//! | u16         | session id                                            |
//! | u8          | security flags: P/C/MX + session type                 |
//! | u32         | message counter                                       |
//! | 0/u64       | (optional) source node id                             |
//! | 0/u16/u64   | (optional) destination group / node id                |
//! | ...         | protocol header + payload (encrypted unless sid = 0)  |
//! | 16 bytes    | AEAD tag (encrypted frames only)                      |
//! ```
//!
//! The protocol header that follows (inside the ciphertext for secure
//! sessions): exchange flags, opcode, exchange id, optional vendor id,
//! protocol id, optional ack counter.

use bitflags::bitflags;

use crate::{
    crypto::aead,
    errors::CoreError,
    models::opcode::{Opcode, PROTOCOL_SECURE_CHANNEL},
};

const FLAGS_VERSION_MASK: u8 = 0xF0;
const FLAGS_VERSION_V1: u8 = 0x00;
const FLAGS_SOURCE_PRESENT: u8 = 0x04;
const FLAGS_DEST_MASK: u8 = 0x03;
const FLAGS_DEST_NODE: u8 = 0x01;
const FLAGS_DEST_GROUP: u8 = 0x02;

bitflags! {
    /// Security-flags octet of the message header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SecurityFlags: u8 {
        const PRIVACY            = 0b1000_0000;
        const CONTROL_MESSAGE    = 0b0100_0000;
        const MESSAGE_EXTENSIONS = 0b0010_0000;
        const SESSION_TYPE_GROUP = 0b0000_0001;
    }
}

/// How the frame is keyed, derived from session id + security flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// Session id 0: session-establishment traffic in the clear.
    Unencrypted,
    /// Nonzero unicast session.
    Unicast,
    /// Group session (multicast receive path).
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageDestination {
    #[default]
    None,
    Node(u64),
    Group(u16),
}

/// Decoded message header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MessageHeader {
    pub session_id: u16,
    pub security: SecurityFlags,
    pub counter: u32,
    pub source_node_id: Option<u64>,
    pub destination: MessageDestination,
}

impl MessageHeader {
    pub fn session_kind(&self) -> SessionKind {
        if self.security.contains(SecurityFlags::SESSION_TYPE_GROUP) {
            SessionKind::Group
        } else if self.session_id == 0 {
            SessionKind::Unencrypted
        } else {
            SessionKind::Unicast
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut flags = FLAGS_VERSION_V1;
        if self.source_node_id.is_some() {
            flags |= FLAGS_SOURCE_PRESENT;
        }
        flags |= match self.destination {
            MessageDestination::None => 0,
            MessageDestination::Node(_) => FLAGS_DEST_NODE,
            MessageDestination::Group(_) => FLAGS_DEST_GROUP,
        };
        out.push(flags);
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.push(self.security.bits());
        out.extend_from_slice(&self.counter.to_le_bytes());
        if let Some(src) = self.source_node_id {
            out.extend_from_slice(&src.to_le_bytes());
        }
        match self.destination {
            MessageDestination::None => {},
            MessageDestination::Node(id) => out.extend_from_slice(&id.to_le_bytes()),
            MessageDestination::Group(id) => out.extend_from_slice(&id.to_le_bytes()),
        }
    }

    pub fn encoded_len(&self) -> usize {
        8 + if self.source_node_id.is_some() { 8 } else { 0 }
            + match self.destination {
                MessageDestination::None => 0,
                MessageDestination::Node(_) => 8,
                MessageDestination::Group(_) => 2,
            }
    }

    /// Decode the header; returns the header and the number of bytes it
    /// occupied.
    pub fn decode(raw: &[u8]) -> Result<(Self, usize), CoreError> {
        let mut r = Cursor::new(raw);
        let flags = r.u8()?;
        if flags & FLAGS_VERSION_MASK != FLAGS_VERSION_V1 {
            return Err(CoreError::UnknownOpcode(flags));
        }
        let session_id = r.u16()?;
        let security = SecurityFlags::from_bits(r.u8()?)
            .ok_or(CoreError::TruncatedInput)?;
        let counter = r.u32()?;
        let source_node_id = if flags & FLAGS_SOURCE_PRESENT != 0 {
            Some(r.u64()?)
        } else {
            None
        };
        let destination = match flags & FLAGS_DEST_MASK {
            FLAGS_DEST_NODE => MessageDestination::Node(r.u64()?),
            FLAGS_DEST_GROUP => MessageDestination::Group(r.u16()?),
            0 => MessageDestination::None,
            _ => return Err(CoreError::TruncatedInput),
        };
        Ok((
            Self { session_id, security, counter, source_node_id, destination },
            r.pos,
        ))
    }
}

const EXCH_INITIATOR: u8 = 0x01;
const EXCH_ACK: u8 = 0x02;
const EXCH_RELIABILITY: u8 = 0x04;
const EXCH_VENDOR: u8 = 0x10;

/// Decoded protocol header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProtocolHeader {
    pub initiator: bool,
    pub needs_ack: bool,
    pub ack_counter: Option<u32>,
    pub vendor_id: Option<u16>,
    pub opcode: u8,
    pub exchange_id: u16,
    pub protocol_id: u16,
}

impl ProtocolHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut flags = 0u8;
        if self.initiator {
            flags |= EXCH_INITIATOR;
        }
        if self.ack_counter.is_some() {
            flags |= EXCH_ACK;
        }
        if self.needs_ack {
            flags |= EXCH_RELIABILITY;
        }
        if self.vendor_id.is_some() {
            flags |= EXCH_VENDOR;
        }
        out.push(flags);
        out.push(self.opcode);
        out.extend_from_slice(&self.exchange_id.to_le_bytes());
        if let Some(v) = self.vendor_id {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.protocol_id.to_le_bytes());
        if let Some(ack) = self.ack_counter {
            out.extend_from_slice(&ack.to_le_bytes());
        }
    }

    pub fn decode(raw: &[u8]) -> Result<(Self, usize), CoreError> {
        let mut r = Cursor::new(raw);
        let flags = r.u8()?;
        let opcode = r.u8()?;
        let exchange_id = r.u16()?;
        let vendor_id = if flags & EXCH_VENDOR != 0 {
            Some(r.u16()?)
        } else {
            None
        };
        let protocol_id = r.u16()?;
        let ack_counter = if flags & EXCH_ACK != 0 {
            Some(r.u32()?)
        } else {
            None
        };
        Ok((
            Self {
                initiator: flags & EXCH_INITIATOR != 0,
                needs_ack: flags & EXCH_RELIABILITY != 0,
                ack_counter,
                vendor_id,
                opcode,
                exchange_id,
                protocol_id,
            },
            r.pos,
        ))
    }

    /// The protocol-qualified opcode, if this node understands it.
    pub fn known_opcode(&self) -> Result<Opcode, CoreError> {
        Opcode::decode(self.protocol_id, self.opcode).map_err(|e| {
            if e.protocol == PROTOCOL_SECURE_CHANNEL
                || e.protocol == crate::models::opcode::PROTOCOL_INTERACTION_MODEL
            {
                CoreError::UnknownOpcode(e.opcode)
            } else {
                CoreError::UnsupportedProtocol(e.protocol)
            }
        })
    }
}

/// A fully decoded (decrypted where applicable) message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    pub header: MessageHeader,
    pub protocol: ProtocolHeader,
    pub payload: Vec<u8>,
}

impl Message {
    /// Encode as a plaintext frame (session id 0 traffic).
    pub fn encode_plaintext(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            self.header.encoded_len() + 8 + self.payload.len(),
        );
        self.header.encode(&mut out);
        self.protocol.encode(&mut out);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decode a plaintext frame in full.
    pub fn decode_plaintext(raw: &[u8]) -> Result<Self, CoreError> {
        let (header, n) = MessageHeader::decode(raw)?;
        let rest = raw.get(n..).ok_or(CoreError::TruncatedInput)?;
        let (protocol, m) = ProtocolHeader::decode(rest)?;
        let payload = rest.get(m..).ok_or(CoreError::TruncatedInput)?.to_vec();
        Ok(Self { header, protocol, payload })
    }

    /// Encode and seal with a session encrypt key. The encoded message
    /// header doubles as the AEAD additional data.
    pub fn encode_encrypted(&self, key: &[u8; 16]) -> Vec<u8> {
        let mut aad = Vec::with_capacity(self.header.encoded_len());
        self.header.encode(&mut aad);

        let mut plain = Vec::with_capacity(8 + self.payload.len());
        self.protocol.encode(&mut plain);
        plain.extend_from_slice(&self.payload);

        let nonce = build_nonce(
            self.header.security.bits(),
            self.header.counter,
            self.header.source_node_id,
        );
        let sealed = aead::seal(key, &nonce, &aad, &plain);

        let mut out = aad;
        out.extend_from_slice(&sealed);
        out
    }

    /// Open an encrypted frame whose message header was already peeked.
    pub fn decode_encrypted(
        raw: &[u8],
        header: MessageHeader,
        header_len: usize,
        key: &[u8; 16],
    ) -> Result<Self, CoreError> {
        let aad = raw.get(..header_len).ok_or(CoreError::TruncatedInput)?;
        let sealed = raw.get(header_len..).ok_or(CoreError::TruncatedInput)?;
        let nonce =
            build_nonce(header.security.bits(), header.counter, header.source_node_id);
        let plain = aead::open(key, &nonce, aad, sealed)
            .map_err(|_| CoreError::AuthenticationFailed)?;
        let (protocol, m) = ProtocolHeader::decode(&plain)?;
        let payload = plain.get(m..).ok_or(CoreError::TruncatedInput)?.to_vec();
        Ok(Self { header, protocol, payload })
    }
}

/// 13-byte CCM nonce: security flags ∥ counter LE ∥ source node id LE
/// (zero when the header carries no source).
pub fn build_nonce(security_flags: u8, counter: u32, source: Option<u64>) -> [u8; 13] {
    let mut nonce = [0u8; 13];
    nonce[0] = security_flags;
    nonce[1..5].copy_from_slice(&counter.to_le_bytes());
    nonce[5..13].copy_from_slice(&source.unwrap_or(0).to_le_bytes());
    nonce
}

/// Minimal little-endian cursor over a byte slice.
struct Cursor<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(raw: &'a [u8]) -> Self {
        Self { raw, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CoreError> {
        let end = self.pos.checked_add(n).ok_or(CoreError::TruncatedInput)?;
        let s = self.raw.get(self.pos..end).ok_or(CoreError::TruncatedInput)?;
        self.pos = end;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CoreError> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn u32(&mut self) -> Result<u32, CoreError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self) -> Result<u64, CoreError> {
        let raw = self.take(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(raw);
        Ok(u64::from_le_bytes(b))
    }
}
