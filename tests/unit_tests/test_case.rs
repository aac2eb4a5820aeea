// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use matter_node_rs::{
    clusters::access_control,
    errors::CoreError,
    im::acl::{Privilege, make_entry},
    models::{
        case::Sigma1,
        im::{AttributePath, AttributeReport, ReadRequest, ReportData, status},
        message::Message,
        opcode::{ImOpcode, SecureChannelOpcode},
        status_report::StatusReport,
    },
    node::Action,
    session::AuthMode,
    tlv::TlvValue,
};

use crate::unit_tests::{
    case_support::{case_handshake, install_fabric},
    first_send, im_frame, new_node, open_reply, plaintext_frame,
};

#[test]
fn case_selects_the_matching_fabric() -> Result<()> {
    let mut node = new_node();
    let fabric_a = install_fabric(&mut node, 0x1000, 0x11, 0x21)?;
    let fabric_b = install_fabric(&mut node, 0x2000, 0x12, 0x22)?;

    let commissioner = case_handshake(&mut node, &fabric_b, 200)?;
    let session = node
        .sessions
        .get(commissioner.session.peer_session_id)
        .expect("session exists");
    assert_eq!(session.fabric_index, Some(fabric_b.fabric_index));
    assert_eq!(session.peer_node_id, fabric_b.controller_node_id);
    assert_eq!(session.auth_mode, AuthMode::Case);
    assert_ne!(fabric_a.fabric_index, fabric_b.fabric_index);
    Ok(())
}

#[test]
fn mismatching_destination_id_hits_no_fabric() -> Result<()> {
    let mut node = new_node();
    install_fabric(&mut node, 0x1000, 0x11, 0x21)?;

    let sigma1 = Sigma1 {
        initiator_random: vec![5u8; 32],
        initiator_session_id: 300,
        destination_id: vec![0xAB; 32],
        initiator_eph_pub: vec![4u8; 65],
        resumption_id: None,
    };
    let frame =
        plaintext_frame(SecureChannelOpcode::CaseSigma1, 7, sigma1.encode(), 1, None);
    let actions = node.handle_frame(&frame, 0, 0);

    assert!(
        actions
            .iter()
            .any(|a| matches!(a, Action::Error(CoreError::NoMatchingFabric))),
        "expected NoMatchingFabric, got {actions:?}"
    );
    let reply = Message::decode_plaintext(&first_send(&actions)?)?;
    assert_eq!(reply.protocol.opcode, SecureChannelOpcode::StatusReport as u8);
    assert!(!StatusReport::decode(&reply.payload)?.is_success());
    assert!(node.sessions.is_empty());
    Ok(())
}

#[test]
fn acl_gates_case_reads() -> Result<()> {
    let mut node = new_node();
    let setup = install_fabric(&mut node, 0x1000, 0x11, 0x21)?;
    let mut commissioner = case_handshake(&mut node, &setup, 200)?;

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, 0x0006, 0x0000)],
        ..ReadRequest::default()
    };

    // no ACL entries yet: the path resolves but access is denied
    let frame = im_frame(&mut commissioner, ImOpcode::ReadRequest, 1, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&commissioner, &first_send(&actions)?)?;
    let report = ReportData::decode(&reply.payload)?;
    assert!(matches!(
        report.attribute_reports.as_slice(),
        [AttributeReport::Status { status: s, .. }] if *s == status::UNSUPPORTED_ACCESS
    ));

    // install an admin entry for the controller and retry
    let entry = make_entry(
        Privilege::Administer,
        Some(vec![setup.controller_node_id]),
        None,
        setup.fabric_index,
    );
    let acl = node
        .registry
        .instance_mut(0, access_control::CLUSTER_ID)
        .expect("acl cluster");
    acl.state.set(access_control::ATTR_ACL, TlvValue::Array(vec![entry]));

    let frame = im_frame(&mut commissioner, ImOpcode::ReadRequest, 2, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&commissioner, &first_send(&actions)?)?;
    let report = ReportData::decode(&reply.payload)?;
    assert!(matches!(
        report.attribute_reports.as_slice(),
        [AttributeReport::Data { value: TlvValue::Bool(false), .. }]
    ));
    Ok(())
}

#[test]
fn acl_entries_of_other_fabrics_do_not_grant_access() -> Result<()> {
    let mut node = new_node();
    let setup = install_fabric(&mut node, 0x1000, 0x11, 0x21)?;
    let mut commissioner = case_handshake(&mut node, &setup, 200)?;

    // entry exists, but for a different fabric index
    let entry = make_entry(
        Privilege::Administer,
        Some(vec![setup.controller_node_id]),
        None,
        setup.fabric_index + 1,
    );
    let acl = node
        .registry
        .instance_mut(0, access_control::CLUSTER_ID)
        .expect("acl cluster");
    acl.state.set(access_control::ATTR_ACL, TlvValue::Array(vec![entry]));

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, 0x0006, 0x0000)],
        ..ReadRequest::default()
    };
    let frame = im_frame(&mut commissioner, ImOpcode::ReadRequest, 1, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&commissioner, &first_send(&actions)?)?;
    let report = ReportData::decode(&reply.payload)?;
    assert!(matches!(
        report.attribute_reports.as_slice(),
        [AttributeReport::Status { status: s, .. }] if *s == status::UNSUPPORTED_ACCESS
    ));
    Ok(())
}

#[test]
fn group_frame_mutates_without_any_reply() -> Result<()> {
    use matter_node_rs::{
        clusters::{framework::FABRIC_INDEX_FIELD, on_off},
        models::{
            im::{CommandPath, InvokeRequest},
            message::{
                Message, MessageDestination, MessageHeader, ProtocolHeader, SecurityFlags,
            },
            opcode::PROTOCOL_INTERACTION_MODEL,
        },
    };

    let mut node = new_node();
    let setup = install_fabric(&mut node, 0x1000, 0x11, 0x21)?;

    // group entry granting operate to any node on the fabric
    let entry = TlvValue::Struct(vec![
        (access_control::FIELD_PRIVILEGE, TlvValue::UnsignedInt(3)),
        (access_control::FIELD_AUTH_MODE, TlvValue::UnsignedInt(3)),
        (access_control::FIELD_SUBJECTS, TlvValue::Null),
        (access_control::FIELD_TARGETS, TlvValue::Null),
        (
            FABRIC_INDEX_FIELD,
            TlvValue::UnsignedInt(setup.fabric_index as u64),
        ),
    ]);
    node.registry
        .instance_mut(0, access_control::CLUSTER_ID)
        .expect("acl cluster")
        .state
        .set(access_control::ATTR_ACL, TlvValue::Array(vec![entry]));

    let invoke = InvokeRequest {
        suppress_response: true,
        invokes: vec![(
            CommandPath::concrete(1, on_off::CLUSTER_ID, on_off::CMD_ON),
            None,
        )],
        ..InvokeRequest::default()
    };
    let msg = Message {
        header: MessageHeader {
            session_id: 0x0101,
            security: SecurityFlags::SESSION_TYPE_GROUP,
            counter: 1,
            source_node_id: Some(setup.controller_node_id),
            destination: MessageDestination::Group(0x0001),
        },
        protocol: ProtocolHeader {
            initiator: true,
            needs_ack: false,
            ack_counter: None,
            vendor_id: None,
            opcode: ImOpcode::InvokeRequest as u8,
            exchange_id: 1,
            protocol_id: PROTOCOL_INTERACTION_MODEL,
        },
        payload: invoke.encode(),
    };
    let frame = msg.encode_encrypted(&setup.ipk);

    let actions = node.handle_frame(&frame, 0, 0);
    assert!(
        !actions.iter().any(|a| matches!(a, Action::Send(_))),
        "group traffic never earns a reply"
    );
    let state = &node
        .registry
        .instance(1, on_off::CLUSTER_ID)
        .expect("on/off")
        .state;
    assert_eq!(state.get(on_off::ATTR_ON_OFF), Some(&TlvValue::Bool(true)));

    // replaying the same group counter is rejected
    let actions = node.handle_frame(&frame, 0, 0);
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::Error(CoreError::ReplayDetected(_)))));
    Ok(())
}

#[test]
fn replayed_counter_is_dropped_after_decrypt() -> Result<()> {
    let mut node = new_node();
    let setup = install_fabric(&mut node, 0x1000, 0x11, 0x21)?;
    let mut commissioner = case_handshake(&mut node, &setup, 200)?;

    // grant access so the first copy succeeds fully
    let entry = make_entry(
        Privilege::Administer,
        None,
        None,
        setup.fabric_index,
    );
    let acl = node
        .registry
        .instance_mut(0, access_control::CLUSTER_ID)
        .expect("acl cluster");
    acl.state.set(access_control::ATTR_ACL, TlvValue::Array(vec![entry]));

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, 0x0006, 0x0000)],
        ..ReadRequest::default()
    };
    let frame = im_frame(&mut commissioner, ImOpcode::ReadRequest, 1, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    assert!(actions.iter().any(|a| matches!(a, Action::Send(_))));

    // the very same frame again: decrypts fine, rejected as replay
    let actions = node.handle_frame(&frame, 0, 0);
    assert!(
        actions
            .iter()
            .any(|a| matches!(a, Action::Error(CoreError::ReplayDetected(_)))),
        "expected replay rejection, got {actions:?}"
    );
    assert!(!actions.iter().any(|a| matches!(a, Action::Send(_))));
    Ok(())
}
