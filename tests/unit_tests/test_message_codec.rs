// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use matter_node_rs::{
    errors::CoreError,
    models::{
        message::{
            Message, MessageDestination, MessageHeader, ProtocolHeader, SecurityFlags,
            SessionKind,
        },
        opcode::PROTOCOL_INTERACTION_MODEL,
    },
};

fn sample_message() -> Message {
    Message {
        header: MessageHeader {
            session_id: 0x0B0B,
            security: SecurityFlags::empty(),
            counter: 0x01020304,
            source_node_id: Some(0x1122334455667788),
            destination: MessageDestination::None,
        },
        protocol: ProtocolHeader {
            initiator: true,
            needs_ack: true,
            ack_counter: Some(77),
            vendor_id: None,
            opcode: 0x02,
            exchange_id: 0x0A0A,
            protocol_id: PROTOCOL_INTERACTION_MODEL,
        },
        payload: b"read request body".to_vec(),
    }
}

#[test]
fn plaintext_roundtrip() -> Result<()> {
    let msg = sample_message();
    let raw = msg.encode_plaintext();
    assert_eq!(Message::decode_plaintext(&raw)?, msg);
    Ok(())
}

#[test]
fn header_wire_layout_is_little_endian() {
    let mut raw = Vec::new();
    MessageHeader {
        session_id: 0x1234,
        security: SecurityFlags::empty(),
        counter: 1,
        source_node_id: None,
        destination: MessageDestination::None,
    }
    .encode(&mut raw);
    assert_eq!(raw, vec![0x00, 0x34, 0x12, 0x00, 0x01, 0x00, 0x00, 0x00]);
}

#[test]
fn encrypted_roundtrip_and_tamper_rejection() -> Result<()> {
    let key = [0x5Au8; 16];
    let msg = sample_message();
    let raw = msg.encode_encrypted(&key);

    let (header, len) = MessageHeader::decode(&raw)?;
    let opened = Message::decode_encrypted(&raw, header.clone(), len, &key)?;
    assert_eq!(opened, msg);

    // each flipped bit anywhere in the frame must fail authentication
    for pos in [0usize, 4, len, raw.len() - 1] {
        let mut bad = raw.clone();
        bad[pos] ^= 0x01;
        let decode = MessageHeader::decode(&bad);
        let Ok((h, l)) = decode else { continue };
        assert_eq!(
            Message::decode_encrypted(&bad, h, l, &key).expect_err("tampered"),
            CoreError::AuthenticationFailed,
            "flip at {pos}"
        );
    }

    // wrong key fails too
    let mut wrong = key;
    wrong[0] ^= 1;
    let (h, l) = MessageHeader::decode(&raw)?;
    assert!(Message::decode_encrypted(&raw, h, l, &wrong).is_err());
    Ok(())
}

#[test]
fn session_kind_classification() {
    let mut header = MessageHeader { session_id: 0, ..MessageHeader::default() };
    assert_eq!(header.session_kind(), SessionKind::Unencrypted);
    header.session_id = 5;
    assert_eq!(header.session_kind(), SessionKind::Unicast);
    header.security = SecurityFlags::SESSION_TYPE_GROUP;
    assert_eq!(header.session_kind(), SessionKind::Group);
}

#[test]
fn group_destination_roundtrip() -> Result<()> {
    let header = MessageHeader {
        session_id: 0x0101,
        security: SecurityFlags::SESSION_TYPE_GROUP,
        counter: 9,
        source_node_id: Some(42),
        destination: MessageDestination::Group(0xFE55),
    };
    let mut raw = Vec::new();
    header.encode(&mut raw);
    let (back, consumed) = MessageHeader::decode(&raw)?;
    assert_eq!(back, header);
    assert_eq!(consumed, raw.len());
    Ok(())
}
