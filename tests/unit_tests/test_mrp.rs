// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use matter_node_rs::{
    errors::CoreError,
    exchange::MAX_TRANSMISSIONS,
    models::{
        im::{AttributePath, ReadRequest},
        opcode::ImOpcode,
    },
    node::Action,
};

use crate::unit_tests::{first_send, im_frame, new_node, pase_handshake};

#[test]
fn reliable_reply_is_retransmitted_then_given_up() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;
    let session_id = com.session.peer_session_id;

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, 0x0006, 0)],
        ..ReadRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::ReadRequest, 9, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let original = first_send(&actions)?;
    let Some(Action::ScheduleMrp { exchange_id, attempt, .. }) = actions
        .iter()
        .find(|a| matches!(a, Action::ScheduleMrp { .. }))
    else {
        anyhow::bail!("reply was not sent reliably");
    };
    assert_eq!(*attempt, 0);
    let exchange_id = *exchange_id;

    // drop every retransmission: the timer keeps firing until give-up
    let mut attempt = 0u32;
    let mut transmissions = 1u32; // the original send
    loop {
        let actions = node.handle_mrp_timer(session_id, exchange_id, attempt);
        let resent = actions.iter().any(|a| matches!(a, Action::Send(_)));
        if resent {
            transmissions += 1;
            let Some(Action::ScheduleMrp { attempt: next, .. }) = actions
                .iter()
                .find(|a| matches!(a, Action::ScheduleMrp { .. }))
            else {
                anyhow::bail!("resend without a re-armed timer");
            };
            // retransmissions carry the identical frame
            assert_eq!(first_send(&actions)?, original);
            attempt = *next;
        } else {
            assert!(
                actions
                    .iter()
                    .any(|a| matches!(a, Action::Error(CoreError::Timeout))),
                "give-up must surface an error, got {actions:?}"
            );
            break;
        }
    }
    assert_eq!(transmissions, MAX_TRANSMISSIONS);

    // the entry is gone: a late timer is a no-op
    assert!(node.handle_mrp_timer(session_id, exchange_id, attempt).is_empty());
    assert!(!node.reliable.has_pending(session_id, exchange_id));
    Ok(())
}

#[test]
fn ack_stops_the_retransmit_cycle() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;
    let session_id = com.session.peer_session_id;

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, 0x0006, 0)],
        ..ReadRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::ReadRequest, 4, read.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = crate::unit_tests::open_reply(&com, &first_send(&actions)?)?;

    // ack the report by piggybacking its counter on the next frame
    let frame = im_frame(
        &mut com,
        ImOpcode::StatusResponse,
        4,
        matter_node_rs::models::im::StatusResponse { status: 0 }.encode(),
        Some(reply.header.counter),
    );
    node.handle_frame(&frame, 0, 0);
    assert!(!node.reliable.has_pending(session_id, 4));

    // any later timer fire is stale
    assert!(node.handle_mrp_timer(session_id, 4, 0).is_empty());
    Ok(())
}

#[test]
fn stale_timer_with_wrong_attempt_is_ignored() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;
    let session_id = com.session.peer_session_id;

    let read = ReadRequest {
        attribute_paths: vec![AttributePath::concrete(1, 0x0006, 0)],
        ..ReadRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::ReadRequest, 6, read.encode(), None);
    node.handle_frame(&frame, 0, 0);

    // a timer for attempt 3 when the entry sits at attempt 0
    assert!(node.handle_mrp_timer(session_id, 6, 3).is_empty());
    assert!(node.reliable.has_pending(session_id, 6));
    Ok(())
}
