// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use matter_node_rs::{
    clusters::framework::EventPriority,
    models::{
        im::{EventPath, ReadRequest},
        opcode::ImOpcode,
    },
    tlv::TlvValue,
};

use crate::unit_tests::{first_send, im_frame, new_node, open_reply, pase_handshake};

#[test]
fn event_read_filters_by_path_and_minimum_number() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;

    // three records straight into the store, two clusters apart
    node.events
        .append(0, 0x0028, 0x00, EventPriority::Critical, 1_000, TlvValue::Null);
    node.events.append(
        1,
        0x0006,
        0x00,
        EventPriority::Info,
        2_000,
        TlvValue::Struct(vec![(0, TlvValue::Bool(true))]),
    );
    node.events
        .append(1, 0x0006, 0x00, EventPriority::Info, 3_000, TlvValue::Null);

    let read = ReadRequest {
        event_paths: vec![EventPath {
            endpoint: Some(1),
            cluster: Some(0x0006),
            event: None,
        }],
        event_min: Some(2),
        ..ReadRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::ReadRequest, 1, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(&com, &first_send(&actions)?)?;
    let report = matter_node_rs::models::im::ReportData::decode(&reply.payload)?;

    assert!(report.attribute_reports.is_empty());
    assert_eq!(report.event_reports.len(), 1);
    let event = &report.event_reports[0];
    assert_eq!(event.number, 2);
    assert_eq!(event.endpoint, 1);
    assert_eq!(event.cluster, 0x0006);
    assert_eq!(event.system_timestamp_us, 3_000);
    Ok(())
}
