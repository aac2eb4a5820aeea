// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The operational-credentials flow over a live PASE session: root cert,
//! CSR, AddNOC, label update, fabric removal.

use anyhow::{Context, Result, bail};
use matter_node_rs::{
    clusters::operational_credentials::{
        self, CMD_ADD_NOC, CMD_ADD_TRUSTED_ROOT_CERTIFICATE, CMD_CSR_REQUEST,
        CMD_NOC_RESPONSE, CMD_REMOVE_FABRIC, CMD_UPDATE_FABRIC_LABEL, NOC_STATUS_OK,
    },
    models::{
        im::{CommandPath, InvokeRequest, InvokeResponse, InvokeResponseEntry, status},
        opcode::ImOpcode,
    },
    node::{Action, NodeState},
    tlv::{TlvValue, decode},
};
use p256::ecdsa::VerifyingKey;

use crate::unit_tests::{
    Commissioner, case_support::TestCa, first_send, im_frame, new_node, open_reply,
    pase_handshake,
};

const FABRIC_ID: u64 = 0x2906;
const DEVICE_NODE_ID: u64 = 0x00AA;
const ADMIN_NODE_ID: u64 = 0x00BB;

fn invoke(
    node: &mut NodeState,
    com: &mut Commissioner,
    exchange: u16,
    command: u32,
    fields: Option<TlvValue>,
) -> Result<InvokeResponseEntry> {
    let request = InvokeRequest {
        invokes: vec![(
            CommandPath::concrete(0, operational_credentials::CLUSTER_ID, command),
            fields,
        )],
        ..InvokeRequest::default()
    };
    let frame = im_frame(com, ImOpcode::InvokeRequest, exchange, request.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = open_reply(com, &first_send(&actions)?)?;
    let response = InvokeResponse::decode(&reply.payload)?;
    response
        .responses
        .into_iter()
        .next()
        .context("invoke produced no entry")
}

fn expect_noc_response(entry: InvokeResponseEntry, want_status: u64) -> Result<u8> {
    match entry {
        InvokeResponseEntry::Command { path, fields } => {
            anyhow::ensure!(path.command == Some(CMD_NOC_RESPONSE));
            let fields = fields.context("NOCResponse fields")?;
            let status = fields.field(0).and_then(TlvValue::as_u64).context("status")?;
            anyhow::ensure!(status == want_status, "NOC status {status}");
            Ok(fields.field(1).and_then(TlvValue::as_u64).unwrap_or(0) as u8)
        },
        other => bail!("expected NOCResponse, got {other:?}"),
    }
}

#[test]
fn commissioning_flow_installs_and_removes_a_fabric() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;
    let session_id = com.session.peer_session_id;
    let ca = TestCa::new();

    // stage the trusted root
    let entry = invoke(
        &mut node,
        &mut com,
        1,
        CMD_ADD_TRUSTED_ROOT_CERTIFICATE,
        Some(TlvValue::Struct(vec![(0, TlvValue::Bytes(ca.root_cert()?))])),
    )?;
    assert!(matches!(
        entry,
        InvokeResponseEntry::Status { status: s, .. } if s == status::SUCCESS
    ));

    // CSR: the node mints its operational keypair and hands us the public half
    let entry = invoke(
        &mut node,
        &mut com,
        2,
        CMD_CSR_REQUEST,
        Some(TlvValue::Struct(vec![(0, TlvValue::Bytes(vec![0x5A; 32]))])),
    )?;
    let InvokeResponseEntry::Command { fields, .. } = entry else {
        bail!("expected CSRResponse");
    };
    let fields = fields.context("CSRResponse fields")?;
    let elements_raw = fields.field(0).and_then(TlvValue::as_bytes).context("elements")?;
    let elements = decode(elements_raw)?;
    let device_public_raw = elements
        .field(1)
        .and_then(TlvValue::as_bytes)
        .context("public key in CSR elements")?;
    let device_public = VerifyingKey::from_sec1_bytes(device_public_raw)
        .map_err(|_| anyhow::anyhow!("CSR public key invalid"))?;

    // certify and install
    let noc = ca.issue_noc(DEVICE_NODE_ID, FABRIC_ID, &device_public)?;
    let entry = invoke(
        &mut node,
        &mut com,
        3,
        CMD_ADD_NOC,
        Some(TlvValue::Struct(vec![
            (0, TlvValue::Bytes(noc)),
            (2, TlvValue::Bytes(vec![0x11; 16])),
            (3, TlvValue::UnsignedInt(ADMIN_NODE_ID)),
            (4, TlvValue::UnsignedInt(0xFFF1)),
        ])),
    )?;
    let fabric_index = expect_noc_response(entry, NOC_STATUS_OK)?;

    assert_eq!(node.fabrics.len(), 1);
    let fabric = node.fabrics.get(fabric_index).context("fabric installed")?;
    assert_eq!(fabric.fabric_id, FABRIC_ID);
    assert_eq!(fabric.node_id, DEVICE_NODE_ID);
    // the commissioning session is now bound to the new fabric
    assert_eq!(
        node.sessions.get(session_id).context("session")?.fabric_index,
        Some(fabric_index)
    );

    // label it
    let entry = invoke(
        &mut node,
        &mut com,
        4,
        CMD_UPDATE_FABRIC_LABEL,
        Some(TlvValue::Struct(vec![(0, TlvValue::Utf8("den".to_string()))])),
    )?;
    expect_noc_response(entry, NOC_STATUS_OK)?;
    assert_eq!(node.fabrics.get(fabric_index).context("fabric")?.label, "den");

    // removing the fabric also tears down the bound session
    let request = InvokeRequest {
        invokes: vec![(
            CommandPath::concrete(0, operational_credentials::CLUSTER_ID, CMD_REMOVE_FABRIC),
            Some(TlvValue::Struct(vec![(
                0,
                TlvValue::UnsignedInt(fabric_index as u64),
            )])),
        )],
        ..InvokeRequest::default()
    };
    let frame = im_frame(&mut com, ImOpcode::InvokeRequest, 5, request.encode(), None);
    let actions = node.handle_frame(&frame, 0, 0);
    assert!(actions.contains(&Action::SessionClosed(session_id)));
    assert!(node.fabrics.is_empty());
    assert!(node.sessions.get(session_id).is_none());
    Ok(())
}

#[test]
fn fabrics_survive_export_import() -> Result<()> {
    let mut node = new_node();
    let setup = crate::unit_tests::case_support::install_fabric(&mut node, 0x7001, 0x31, 0x41)?;

    let snapshot = node.export_fabrics();
    assert_eq!(snapshot.len(), 1);

    let mut restored = new_node();
    restored
        .import_fabrics(snapshot)
        .map_err(|e| anyhow::anyhow!("import: {e}"))?;
    assert_eq!(restored.fabrics.len(), 1);

    // the restored table still answers CASE for the same fabric
    let mut com = crate::unit_tests::case_support::case_handshake(&mut restored, &setup, 201)?;
    assert!(restored.sessions.get(com.session.peer_session_id).is_some());
    com.session.touch(0);
    Ok(())
}

#[test]
fn add_noc_without_csr_is_refused() -> Result<()> {
    let mut node = new_node();
    let mut com = pase_handshake(&mut node)?;
    let ca = TestCa::new();

    let key = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
    let noc = ca.issue_noc(DEVICE_NODE_ID, FABRIC_ID, key.verifying_key())?;
    let entry = invoke(
        &mut node,
        &mut com,
        1,
        CMD_ADD_NOC,
        Some(TlvValue::Struct(vec![
            (0, TlvValue::Bytes(noc)),
            (2, TlvValue::Bytes(vec![0x11; 16])),
            (3, TlvValue::UnsignedInt(ADMIN_NODE_ID)),
            (4, TlvValue::UnsignedInt(0xFFF1)),
        ])),
    )?;
    expect_noc_response(entry, operational_credentials::NOC_STATUS_MISSING_CSR)?;
    assert!(node.fabrics.is_empty());
    Ok(())
}
