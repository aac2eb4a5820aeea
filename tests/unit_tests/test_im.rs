// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::{Context, Result};
use matter_node_rs::{
    clusters::{access_control, framework::FABRIC_INDEX_FIELD, on_off},
    errors::CoreError,
    models::{
        im::{
            AttributePath, AttributeReport, CommandPath, DataVersionFilter,
            InvokeRequest, InvokeResponse, InvokeResponseEntry, ReadRequest, ReportData,
            StatusResponse, TimedRequest, WriteRequest, WriteResponse, status,
        },
        opcode::ImOpcode,
    },
    node::{Action, NodeState},
    tlv::TlvValue,
};

use crate::unit_tests::{Commissioner, first_send, im_frame, new_node, open_reply, pase_handshake, sends};

fn read_report(
    node: &mut NodeState,
    com: &mut Commissioner,
    exchange: u16,
    req: &ReadRequest,
) -> Result<ReportData> {
    let frame = im_frame(com, ImOpcode::ReadRequest, exchange, req.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(com, &first_send(&actions)?)?;
    Ok(ReportData::decode(&reply.payload)?)
}

fn single_data(report: &ReportData) -> Result<(u32, TlvValue)> {
    match report.attribute_reports.as_slice() {
        [AttributeReport::Data { version, value, .. }] => Ok((*version, value.clone())),
        other => anyhow::bail!("expected one data report, got {other:?}"),
    }
}

#[test]
fn invoke_on_flips_attribute_and_bumps_version() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let path = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, on_off::CLUSTER_ID, 0)],
        ..ReadRequest::default()
    };
    let (v0, value) = single_data(&read_report(&mut node, &mut com, 1, &path)?)?;
    assert_eq!(value, TlvValue::Bool(false));

    let invoke = InvokeRequest {
        invokes: vec![(
            CommandPath::concrete(1, on_off::CLUSTER_ID, on_off::CMD_ON),
            None,
        )],
        ..InvokeRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::InvokeRequest, 2, invoke.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = InvokeResponse::decode(&reply.payload)?;
    assert!(matches!(
        response.responses.as_slice(),
        [InvokeResponseEntry::Status { status: s, .. }] if *s == status::SUCCESS
    ));

    let (v1, value) = single_data(&read_report(&mut node, &mut com, 3, &path)?)?;
    assert_eq!(value, TlvValue::Bool(true));
    assert_eq!(v1, v0 + 1);
    Ok(())
}

#[test]
fn full_wildcard_read_yields_only_data_reports() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::wildcard()],
        ..ReadRequest::default()
    };
    let report = read_report(&mut node, &mut com, 1, &read)?;
    assert!(!report.attribute_reports.is_empty());
    for entry in &report.attribute_reports {
        assert!(
            matches!(entry, AttributeReport::Data { .. }),
            "wildcard read produced a status entry: {entry:?}"
        );
    }

    // one report per declared (endpoint, cluster, attribute) triple
    let mut expected = 0usize;
    for endpoint in node.registry.endpoint_ids() {
        for cluster in node.registry.cluster_ids(endpoint) {
            let instance = node.registry.instance(endpoint, cluster).context("instance")?;
            expected += instance.def.attribute_ids().len();
        }
    }
    assert_eq!(report.attribute_reports.len(), expected);
    Ok(())
}

#[test]
fn concrete_read_of_missing_paths_reports_statuses() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let read = ReadRequest {
        attribute_paths: vec![
            AttributePath::concrete(9, on_off::CLUSTER_ID, 0),
            AttributePath::concrete(1, 0xDEAD, 0),
            AttributePath::concrete(1, on_off::CLUSTER_ID, 0x7777),
        ],
        ..ReadRequest::default()
    };
    let report = read_report(&mut node, &mut com, 1, &read)?;
    let statuses: Vec<u16> = report
        .attribute_reports
        .iter()
        .map(|r| match r {
            AttributeReport::Status { status, .. } => *status,
            other => panic!("expected status, got {other:?}"),
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            status::UNSUPPORTED_ENDPOINT,
            status::UNSUPPORTED_CLUSTER,
            status::UNSUPPORTED_ATTRIBUTE
        ]
    );
    Ok(())
}

#[test]
fn data_version_filter_suppresses_unchanged_cluster() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let read = ReadRequest {
        attribute_paths: vec![
            AttributePath { endpoint: Some(1), cluster: Some(on_off::CLUSTER_ID), attribute: None },
            AttributePath { endpoint: Some(0), cluster: Some(0x0028), attribute: None },
        ],
        ..ReadRequest::default()
    };
    let first = read_report(&mut node, &mut com, 1, &read)?;
    let on_off_version = first
        .attribute_reports
        .iter()
        .find_map(|r| match r {
            AttributeReport::Data { path, version, .. }
                if path.cluster == Some(on_off::CLUSTER_ID) =>
            {
                Some(*version)
            },
            _ => None,
        })
        .context("on/off report present")?;

    let filtered = ReadRequest {
        version_filters: vec![DataVersionFilter {
            endpoint: 1,
            cluster: on_off::CLUSTER_ID,
            version: on_off_version,
        }],
        ..read.clone()
    };
    let second = read_report(&mut node, &mut com, 2, &filtered)?;
    assert!(
        second
            .attribute_reports
            .iter()
            .all(|r| !matches!(r, AttributeReport::Data { path, .. }
                if path.cluster == Some(on_off::CLUSTER_ID))),
        "filtered cluster must produce no reports"
    );
    assert!(
        second.attribute_reports.iter().any(|r| matches!(r,
            AttributeReport::Data { path, .. } if path.cluster == Some(0x0028))),
        "unfiltered cluster still reports"
    );
    Ok(())
}

#[test]
fn write_validates_constraints_and_bumps_version() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    // StartUpOnOff accepts only {0, 1, 2}
    let bad = WriteRequest {
        writes: vec![(
            AttributePath::concrete(1, on_off::CLUSTER_ID, on_off::ATTR_START_UP_ON_OFF),
            TlvValue::UnsignedInt(9),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 1, bad.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = WriteResponse::decode(&reply.payload)?;
    assert_eq!(response.statuses[0].1, status::CONSTRAINT_ERROR);

    let good = WriteRequest {
        writes: vec![(
            AttributePath::concrete(1, on_off::CLUSTER_ID, on_off::ATTR_START_UP_ON_OFF),
            TlvValue::UnsignedInt(1),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 2, good.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = WriteResponse::decode(&reply.payload)?;
    assert_eq!(response.statuses[0].1, status::SUCCESS);

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(
            1,
            on_off::CLUSTER_ID,
            on_off::ATTR_START_UP_ON_OFF,
        )],
        ..ReadRequest::default()
    };
    let (_, value) = single_data(&read_report(&mut node, &mut com, 3, &read)?)?;
    assert_eq!(value, TlvValue::UnsignedInt(1));
    Ok(())
}

#[test]
fn read_only_attributes_refuse_writes() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let write = WriteRequest {
        writes: vec![(
            AttributePath::concrete(1, on_off::CLUSTER_ID, on_off::ATTR_ON_OFF),
            TlvValue::Bool(true),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 1, write.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = WriteResponse::decode(&reply.payload)?;
    assert_eq!(response.statuses[0].1, status::UNSUPPORTED_WRITE);
    Ok(())
}

#[test]
fn wildcard_write_paths_fail_per_element() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let write = WriteRequest {
        writes: vec![(
            AttributePath { endpoint: Some(1), cluster: Some(on_off::CLUSTER_ID), attribute: None },
            TlvValue::UnsignedInt(0),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 1, write.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = WriteResponse::decode(&reply.payload)?;
    assert_eq!(response.statuses[0].1, status::UNSUPPORTED_ATTRIBUTE);
    Ok(())
}

#[test]
fn suppressed_write_still_mutates_but_answers_with_ack() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    let write = WriteRequest {
        suppress_response: true,
        writes: vec![(
            AttributePath::concrete(1, on_off::CLUSTER_ID, on_off::ATTR_ON_TIME),
            TlvValue::UnsignedInt(30),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 1, write.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);

    // single reply frame: the standalone ack, not a WriteResponse
    let frames = sends(&actions);
    assert_eq!(frames.len(), 1);
    let reply = open_reply(&com, &frames[0])?;
    assert_eq!(reply.protocol.opcode, 0x10);
    assert_eq!(reply.protocol.protocol_id, 0x0000);
    assert!(reply.payload.is_empty());

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(
            1,
            on_off::CLUSTER_ID,
            on_off::ATTR_ON_TIME,
        )],
        ..ReadRequest::default()
    };
    let (_, value) = single_data(&read_report(&mut node, &mut com, 2, &read)?)?;
    assert_eq!(value, TlvValue::UnsignedInt(30));
    Ok(())
}

#[test]
fn timed_interaction_window_gates_writes() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    // a timed write without a window is refused
    let write = WriteRequest {
        timed_request: true,
        writes: vec![(
            AttributePath::concrete(1, on_off::CLUSTER_ID, on_off::ATTR_ON_TIME),
            TlvValue::UnsignedInt(5),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 1, write.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = StatusResponse::decode(&reply.payload)?;
    assert_eq!(response.status, status::NEEDS_TIMED_INTERACTION);

    // open a 100 ms window on exchange 2, then write within it
    let timed = TimedRequest { timeout_ms: 100 };
    let frame = im_frame(&mut com, ImOpcode::TimedRequest, 2, timed.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    assert_eq!(StatusResponse::decode(&reply.payload)?.status, status::SUCCESS);

    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 2, write.encode(), None);
    let actions = node.handle_frame(&frame, 50, 50_000);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = WriteResponse::decode(&reply.payload)?;
    assert_eq!(response.statuses[0].1, status::SUCCESS);

    // a new window that is allowed to lapse fails with Timeout
    let frame = im_frame(&mut com, ImOpcode::TimedRequest, 3, timed.encode(), None);
    node.handle_frame(&frame, 1000, 1_000_000);
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 3, write.encode(), None);
    let actions = node.handle_frame(&frame, 2000, 2_000_000);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = StatusResponse::decode(&reply.payload)?;
    assert_eq!(response.status, status::TIMEOUT);
    Ok(())
}

#[test]
fn fabric_scoped_write_preserves_other_fabrics_entries() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    // seed an entry belonging to fabric 7 directly
    let foreign = TlvValue::Struct(vec![
        (1, TlvValue::UnsignedInt(5)),
        (2, TlvValue::UnsignedInt(2)),
        (FABRIC_INDEX_FIELD, TlvValue::UnsignedInt(7)),
    ]);
    let acl = node
        .registry
        .instance_mut(0, access_control::CLUSTER_ID)
        .context("acl cluster")?;
    acl.state
        .set(access_control::ATTR_ACL, TlvValue::Array(vec![foreign.clone()]));

    // the PASE session (no fabric) writes its own entry set
    let own = TlvValue::Struct(vec![
        (1, TlvValue::UnsignedInt(3)),
        (2, TlvValue::UnsignedInt(2)),
    ]);
    let write = WriteRequest {
        writes: vec![(
            AttributePath::concrete(0, access_control::CLUSTER_ID, access_control::ATTR_ACL),
            TlvValue::Array(vec![own]),
        )],
        ..WriteRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::WriteRequest, 1, write.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    assert_eq!(WriteResponse::decode(&reply.payload)?.statuses[0].1, status::SUCCESS);

    let acl = node
        .registry
        .instance(0, access_control::CLUSTER_ID)
        .context("acl cluster")?;
    let entries = acl
        .state
        .get(access_control::ATTR_ACL)
        .and_then(TlvValue::as_array)
        .context("acl entries")?;
    assert_eq!(entries.len(), 2, "foreign entry must survive the write");
    assert!(entries.contains(&foreign));
    Ok(())
}

#[test]
fn invoke_decodes_positional_command_parameters() -> Result<()> {
    use matter_node_rs::clusters::level_control;

    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    // MoveToLevel(level = 200, transition_time = 0)
    let invoke = InvokeRequest {
        invokes: vec![(
            CommandPath::concrete(1, level_control::CLUSTER_ID, level_control::CMD_MOVE_TO_LEVEL),
            Some(TlvValue::Struct(vec![
                (0, TlvValue::UnsignedInt(200)),
                (1, TlvValue::UnsignedInt(0)),
            ])),
        )],
        ..InvokeRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::InvokeRequest, 1, invoke.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = InvokeResponse::decode(&reply.payload)?;
    assert!(matches!(
        response.responses.as_slice(),
        [InvokeResponseEntry::Status { status: s, .. }] if *s == status::SUCCESS
    ));

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(
            1,
            level_control::CLUSTER_ID,
            level_control::ATTR_CURRENT_LEVEL,
        )],
        ..ReadRequest::default()
    };
    let (_, value) = single_data(&read_report(&mut node, &mut com, 2, &read)?)?;
    assert_eq!(value, TlvValue::UnsignedInt(200));

    // out-of-range level is refused per command, not per envelope
    let invoke = InvokeRequest {
        invokes: vec![(
            CommandPath::concrete(1, level_control::CLUSTER_ID, level_control::CMD_MOVE_TO_LEVEL),
            Some(TlvValue::Struct(vec![(0, TlvValue::UnsignedInt(255))])),
        )],
        ..InvokeRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::InvokeRequest, 3, invoke.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let response = InvokeResponse::decode(&reply.payload)?;
    assert!(matches!(
        response.responses.as_slice(),
        [InvokeResponseEntry::Status { status: s, .. }] if *s == status::CONSTRAINT_ERROR
    ));
    Ok(())
}

#[test]
fn unknown_session_and_unknown_opcode_are_errors() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    // valid frame addressed at a session id that does not exist
    let mut frame = im_frame(&mut com, ImOpcode::ReadRequest, 1, vec![0x15, 0x18], None);
    frame[1] ^= 0x55; // session id bytes
    let actions = node.handle_frame(&frame, 0, 0);
    assert!(matches!(
        actions.as_slice(),
        [Action::Error(CoreError::UnknownSession(_))]
            | [Action::Error(CoreError::AuthenticationFailed)]
    ));
    Ok(())
}
