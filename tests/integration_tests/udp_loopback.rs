// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives the real tokio shell over loopback UDP: the commissioner side
//! of the PBKDF parameter exchange, datagrams and all.

use std::time::Duration;

use anyhow::{Context, Result, ensure};
use matter_node_rs::{
    cfg::config::Config,
    models::{
        message::{Message, MessageHeader, ProtocolHeader},
        opcode::{PROTOCOL_SECURE_CHANNEL, SecureChannelOpcode},
        pase::{PbkdfParamRequest, PbkdfParamResponse},
    },
    node::{build_node, transport::Shell},
};
use tokio::{net::UdpSocket, time::timeout};
use tokio_util::sync::CancellationToken;

const TEST_PORT: u16 = 55540;

fn test_config() -> Config {
    let yaml = format!(
        r#"
device:
  VendorId: 0xFFF1
  ProductId: 0x8000
  Discriminator: 3840
  Passcode: 20202021
pase:
  Iterations: 1000
network:
  UdpPort: {TEST_PORT}
  BindAddress: "127.0.0.1"
"#
    );
    serde_yaml::from_str(&yaml).expect("config parses")
}

#[tokio::test]
#[serial_test::serial]
async fn pbkdf_parameter_exchange_over_loopback() -> Result<()> {
    let cfg = test_config();
    let state = build_node(&cfg)?;
    let cancel = CancellationToken::new();
    let shell_cancel = cancel.clone();
    let network = cfg.network.clone();
    let server = tokio::spawn(async move { Shell::run(state, &network, shell_cancel).await });

    // give the shell a moment to bind
    tokio::time::sleep(Duration::from_millis(100)).await;

    let socket = UdpSocket::bind("127.0.0.1:0").await?;
    socket.connect(("127.0.0.1", TEST_PORT)).await?;

    let request = PbkdfParamRequest {
        initiator_random: vec![9u8; 32],
        initiator_session_id: 71,
        passcode_id: 0,
        has_pbkdf_parameters: false,
    };
    let frame = Message {
        header: MessageHeader { counter: 1, ..MessageHeader::default() },
        protocol: ProtocolHeader {
            initiator: true,
            needs_ack: true,
            ack_counter: None,
            vendor_id: None,
            opcode: SecureChannelOpcode::PbkdfParamRequest as u8,
            exchange_id: 21,
            protocol_id: PROTOCOL_SECURE_CHANNEL,
        },
        payload: request.encode(),
    }
    .encode_plaintext();
    socket.send(&frame).await?;

    let mut buf = vec![0u8; 1280];
    let len = timeout(Duration::from_secs(5), socket.recv(&mut buf))
        .await
        .context("no reply from node")??;
    let reply = Message::decode_plaintext(&buf[..len])?;
    ensure!(
        reply.protocol.opcode == SecureChannelOpcode::PbkdfParamResponse as u8,
        "unexpected opcode 0x{:02x}",
        reply.protocol.opcode
    );
    ensure!(reply.protocol.ack_counter == Some(1), "reply must ack the request");
    let response = PbkdfParamResponse::decode(&reply.payload)?;
    ensure!(response.iterations == 1000);
    ensure!(!response.salt.is_empty());

    cancel.cancel();
    let _ = timeout(Duration::from_secs(2), server).await;
    Ok(())
}
