// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use matter_node_rs::{
    models::{
        message::Message,
        opcode::SecureChannelOpcode,
        pase::{Pake1, PbkdfParamRequest},
        status_report::StatusReport,
    },
    node::Action,
};

use crate::unit_tests::{
    COMMISSIONER_SESSION_ID, first_send, new_node, pase_handshake, pase_handshake_with,
    plaintext_frame,
};

#[test]
fn pase_roundtrip_establishes_mirrored_sessions() -> Result<()> {
    let mut node = new_node();
    let commissioner = pase_handshake(&mut node)?;

    let node_session = node
        .sessions
        .get(commissioner.session.peer_session_id)
        .expect("node session exists");
    assert_eq!(node_session.peer_session_id, COMMISSIONER_SESSION_ID);

    // directional keys mirror between the two roles
    assert_eq!(
        commissioner.session.encrypt_key(),
        node_session.decrypt_key()
    );
    assert_eq!(
        commissioner.session.decrypt_key(),
        node_session.encrypt_key()
    );
    assert_eq!(
        commissioner.session.attestation_challenge(),
        node_session.attestation_challenge()
    );
    Ok(())
}

#[test]
fn wrong_passcode_is_rejected_at_pake3() {
    let mut node = new_node();
    let err = pase_handshake_with(&mut node, 11111111).expect_err("must fail");
    let text = format!("{err:#}");
    assert!(
        text.contains("cB does not verify") || text.contains("rejected pake3"),
        "unexpected failure mode: {text}"
    );
    assert!(node.sessions.is_empty(), "no session may survive a bad passcode");
}

#[test]
fn handshake_replies_ack_the_triggering_message() -> Result<()> {
    let mut node = new_node();
    let request = PbkdfParamRequest {
        initiator_random: vec![7u8; 32],
        initiator_session_id: 42,
        passcode_id: 0,
        has_pbkdf_parameters: false,
    };
    let frame = plaintext_frame(
        SecureChannelOpcode::PbkdfParamRequest,
        9,
        request.encode(),
        1234,
        None,
    );
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = Message::decode_plaintext(&first_send(&actions)?)?;
    // piggybacked ack for counter 1234, exactly one reply frame
    assert_eq!(reply.protocol.ack_counter, Some(1234));
    assert_eq!(
        actions
            .iter()
            .filter(|a| matches!(a, Action::Send(_)))
            .count(),
        1
    );
    Ok(())
}

#[test]
fn fresh_pbkdf_request_resets_a_stuck_handshake() -> Result<()> {
    let mut node = new_node();

    // start a handshake and abandon it after pake1 would be due
    let request = PbkdfParamRequest {
        initiator_random: vec![1u8; 32],
        initiator_session_id: 7,
        passcode_id: 0,
        has_pbkdf_parameters: false,
    };
    let frame = plaintext_frame(
        SecureChannelOpcode::PbkdfParamRequest,
        1,
        request.encode(),
        1,
        None,
    );
    node.handle_frame(&frame, 0, 0);

    // a brand-new flow on another exchange completes normally
    let commissioner = pase_handshake(&mut node)?;
    assert!(node.sessions.get(commissioner.session.peer_session_id).is_some());
    Ok(())
}

#[test]
fn pake1_without_parameter_phase_fails() {
    let mut node = new_node();
    let frame = plaintext_frame(
        SecureChannelOpcode::Pake1,
        3,
        Pake1 { p_a: vec![4u8; 65] }.encode(),
        1,
        None,
    );
    let actions = node.handle_frame(&frame, 0, 0);
    assert!(
        actions.iter().any(|a| matches!(a, Action::Error(_))),
        "out-of-order pake1 must surface an error"
    );
    assert!(node.sessions.is_empty());
}

#[test]
fn sigma2_resume_is_refused() -> Result<()> {
    let mut node = new_node();
    let frame = plaintext_frame(SecureChannelOpcode::CaseSigma2Resume, 5, vec![], 1, None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = Message::decode_plaintext(&first_send(&actions)?)?;
    assert_eq!(reply.protocol.opcode, SecureChannelOpcode::StatusReport as u8);
    let report = StatusReport::decode(&reply.payload)?;
    assert!(!report.is_success());
    Ok(())
}
