// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OperationalCredentials cluster (0x003E): the commissioning flow that
//! turns a passcode session into fabric membership.
//!
//! CSRRequest mints the operational keypair; AddNOC pairs it with the
//! commissioner-issued certificate and installs the fabric. The NOCs and
//! Fabrics attributes mirror the fabric table after every mutation.

use p256::ecdsa::SigningKey;
use rand::{RngCore, rngs::OsRng};
use tracing::{info, warn};

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{ClusterDef, ClusterState, CommandDef, FABRIC_INDEX_FIELD},
    },
    crypto::cert,
    models::im::status,
    session::{Fabric, FabricTable, fabric::MAX_FABRICS},
    tlv::{TlvValue, encode},
};

pub const CLUSTER_ID: u32 = 0x003E;

pub const ATTR_NOCS: u32 = 0x0000;
pub const ATTR_FABRICS: u32 = 0x0001;
pub const ATTR_SUPPORTED_FABRICS: u32 = 0x0002;
pub const ATTR_COMMISSIONED_FABRICS: u32 = 0x0003;
pub const ATTR_TRUSTED_ROOT_CERTIFICATES: u32 = 0x0004;
pub const ATTR_CURRENT_FABRIC_INDEX: u32 = 0x0005;

pub const CMD_ATTESTATION_REQUEST: u32 = 0x00;
pub const CMD_ATTESTATION_RESPONSE: u32 = 0x01;
pub const CMD_CERTIFICATE_CHAIN_REQUEST: u32 = 0x02;
pub const CMD_CERTIFICATE_CHAIN_RESPONSE: u32 = 0x03;
pub const CMD_CSR_REQUEST: u32 = 0x04;
pub const CMD_CSR_RESPONSE: u32 = 0x05;
pub const CMD_ADD_NOC: u32 = 0x06;
pub const CMD_NOC_RESPONSE: u32 = 0x08;
pub const CMD_UPDATE_FABRIC_LABEL: u32 = 0x09;
pub const CMD_REMOVE_FABRIC: u32 = 0x0A;
pub const CMD_ADD_TRUSTED_ROOT_CERTIFICATE: u32 = 0x0B;

/// NodeOperationalCertStatusEnum.
pub const NOC_STATUS_OK: u64 = 0;
pub const NOC_STATUS_INVALID_NOC: u64 = 2;
pub const NOC_STATUS_MISSING_CSR: u64 = 3;
pub const NOC_STATUS_TABLE_FULL: u64 = 5;
pub const NOC_STATUS_INVALID_FABRIC_INDEX: u64 = 11;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute_fabric_scoped(ATTR_NOCS, TlvValue::Array(Vec::new()))
        .attribute_fabric_scoped(ATTR_FABRICS, TlvValue::Array(Vec::new()))
        .attribute(
            ATTR_SUPPORTED_FABRICS,
            TlvValue::UnsignedInt(MAX_FABRICS as u64),
            false,
        )
        .attribute(ATTR_COMMISSIONED_FABRICS, TlvValue::UnsignedInt(0), false)
        .attribute(ATTR_TRUSTED_ROOT_CERTIFICATES, TlvValue::Array(Vec::new()), false)
        .attribute(ATTR_CURRENT_FABRIC_INDEX, TlvValue::UnsignedInt(0), false)
        .command_with_response(
            CMD_ATTESTATION_REQUEST,
            &["attestation_nonce"],
            CMD_ATTESTATION_RESPONSE,
        )
        .command_with_response(
            CMD_CERTIFICATE_CHAIN_REQUEST,
            &["certificate_type"],
            CMD_CERTIFICATE_CHAIN_RESPONSE,
        )
        .command_with_response(CMD_CSR_REQUEST, &["csr_nonce"], CMD_CSR_RESPONSE)
        .command_with_response(
            CMD_ADD_NOC,
            &["noc_value", "icac_value", "ipk_value", "case_admin_subject", "admin_vendor_id"],
            CMD_NOC_RESPONSE,
        )
        .command_with_response(CMD_UPDATE_FABRIC_LABEL, &["label"], CMD_NOC_RESPONSE)
        .command_with_response(CMD_REMOVE_FABRIC, &["fabric_index"], CMD_NOC_RESPONSE)
        .command(CMD_ADD_TRUSTED_ROOT_CERTIFICATE, &["root_ca_certificate"])
}

fn noc_response(status_code: u64, fabric_index: u8) -> TlvValue {
    TlvValue::Struct(vec![
        (0, TlvValue::UnsignedInt(status_code)),
        (1, TlvValue::UnsignedInt(fabric_index as u64)),
        (2, TlvValue::Utf8(String::new())),
    ])
}

/// Rebuild the NOCs/Fabrics mirror attributes from the fabric table.
fn refresh_fabric_attributes(state: &mut ClusterState, fabrics: &FabricTable) {
    let nocs = fabrics
        .iter()
        .map(|f| {
            let mut fields = vec![(1, TlvValue::Bytes(f.noc.clone()))];
            if let Some(icac) = &f.icac {
                fields.push((2, TlvValue::Bytes(icac.clone())));
            }
            fields.push((FABRIC_INDEX_FIELD, TlvValue::UnsignedInt(f.index as u64)));
            TlvValue::Struct(fields)
        })
        .collect();
    let fabric_descriptors = fabrics
        .iter()
        .map(|f| {
            TlvValue::Struct(vec![
                (1, TlvValue::Bytes(f.root_public_key.clone())),
                (3, TlvValue::UnsignedInt(f.fabric_id)),
                (4, TlvValue::UnsignedInt(f.node_id)),
                (5, TlvValue::Utf8(f.label.clone())),
                (FABRIC_INDEX_FIELD, TlvValue::UnsignedInt(f.index as u64)),
            ])
        })
        .collect();
    state.set(ATTR_NOCS, TlvValue::Array(nocs));
    state.set(ATTR_FABRICS, TlvValue::Array(fabric_descriptors));
    state.set(
        ATTR_COMMISSIONED_FABRICS,
        TlvValue::UnsignedInt(fabrics.len() as u64),
    );
}

#[derive(Debug, Default)]
pub struct Handler {
    /// DAC/PAI chain handed out by CertificateChainRequest; left empty
    /// when the shell provisions none.
    pub device_attestation_cert: Vec<u8>,
    pub product_attestation_cert: Vec<u8>,
}

impl ClusterHandler for Handler {
    fn handle_command(
        &mut self,
        ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome {
        match command.id {
            CMD_ATTESTATION_REQUEST => {
                let nonce = command
                    .param(fields, "attestation_nonce")
                    .and_then(TlvValue::as_bytes)
                    .unwrap_or_default();
                let elements = encode(&TlvValue::Struct(vec![
                    (1, TlvValue::Bytes(Vec::new())),
                    (2, TlvValue::Bytes(nonce.to_vec())),
                    (3, TlvValue::UnsignedInt(ctx.now_us / 1_000_000)),
                ]));
                // signed over elements ∥ attestation challenge
                let mut tbs = elements.clone();
                tbs.extend_from_slice(&ctx.attestation_challenge);
                let signature = match &ctx.services.commissioning.pending_operational_key {
                    Some(key) => cert::sign_p1363(key, &tbs).to_vec(),
                    None => {
                        let key = SigningKey::random(&mut OsRng);
                        cert::sign_p1363(&key, &tbs).to_vec()
                    },
                };
                CommandOutcome::Response(TlvValue::Struct(vec![
                    (0, TlvValue::Bytes(elements)),
                    (1, TlvValue::Bytes(signature)),
                ]))
            },
            CMD_CERTIFICATE_CHAIN_REQUEST => {
                let kind = command
                    .param(fields, "certificate_type")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                let chain = match kind {
                    1 => self.device_attestation_cert.clone(),
                    2 => self.product_attestation_cert.clone(),
                    _ => return CommandOutcome::Status(status::CONSTRAINT_ERROR),
                };
                CommandOutcome::Response(TlvValue::Struct(vec![(
                    0,
                    TlvValue::Bytes(chain),
                )]))
            },
            CMD_CSR_REQUEST => {
                let nonce = command
                    .param(fields, "csr_nonce")
                    .and_then(TlvValue::as_bytes)
                    .unwrap_or_default();
                let key = SigningKey::random(&mut OsRng);
                let public = key
                    .verifying_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                // elements carry the fresh public key for certification
                let elements = encode(&TlvValue::Struct(vec![
                    (1, TlvValue::Bytes(public)),
                    (2, TlvValue::Bytes(nonce.to_vec())),
                ]));
                let mut tbs = elements.clone();
                tbs.extend_from_slice(&ctx.attestation_challenge);
                let signature = cert::sign_p1363(&key, &tbs).to_vec();
                ctx.services.commissioning.pending_operational_key = Some(key);
                CommandOutcome::Response(TlvValue::Struct(vec![
                    (0, TlvValue::Bytes(elements)),
                    (1, TlvValue::Bytes(signature)),
                ]))
            },
            CMD_ADD_TRUSTED_ROOT_CERTIFICATE => {
                let root = command
                    .param(fields, "root_ca_certificate")
                    .and_then(TlvValue::as_bytes)
                    .unwrap_or_default()
                    .to_vec();
                let mut roots = state
                    .get(ATTR_TRUSTED_ROOT_CERTIFICATES)
                    .and_then(TlvValue::as_array)
                    .map(<[TlvValue]>::to_vec)
                    .unwrap_or_default();
                roots.push(TlvValue::Bytes(root.clone()));
                state.set(ATTR_TRUSTED_ROOT_CERTIFICATES, TlvValue::Array(roots));
                ctx.services.commissioning.pending_root_cert = Some(root);
                CommandOutcome::Success
            },
            CMD_ADD_NOC => self.add_noc(ctx, state, command, fields),
            CMD_UPDATE_FABRIC_LABEL => {
                let label = command
                    .param(fields, "label")
                    .and_then(TlvValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                let Some(index) = ctx.fabric_index else {
                    return CommandOutcome::Response(noc_response(
                        NOC_STATUS_INVALID_FABRIC_INDEX,
                        0,
                    ));
                };
                match ctx.services.fabrics.get_mut(index) {
                    Some(fabric) => {
                        fabric.label = label;
                        let table = &*ctx.services.fabrics;
                        refresh_fabric_attributes(state, table);
                        CommandOutcome::Response(noc_response(NOC_STATUS_OK, index))
                    },
                    None => CommandOutcome::Response(noc_response(
                        NOC_STATUS_INVALID_FABRIC_INDEX,
                        0,
                    )),
                }
            },
            CMD_REMOVE_FABRIC => {
                let index = command
                    .param(fields, "fabric_index")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0) as u8;
                match ctx.services.fabrics.remove(index) {
                    Ok(removed) => {
                        info!(fabric_index = index, fabric_id = removed.fabric_id,
                              "fabric removed");
                        ctx.services.removed_fabrics.push(index);
                        let table = &*ctx.services.fabrics;
                        refresh_fabric_attributes(state, table);
                        CommandOutcome::Response(noc_response(NOC_STATUS_OK, index))
                    },
                    Err(_) => CommandOutcome::Response(noc_response(
                        NOC_STATUS_INVALID_FABRIC_INDEX,
                        index,
                    )),
                }
            },
            _ => CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        }
    }
}

impl Handler {
    fn add_noc(
        &mut self,
        ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome {
        let Some(noc) = command
            .param(fields, "noc_value")
            .and_then(TlvValue::as_bytes)
            .map(<[u8]>::to_vec)
        else {
            return CommandOutcome::Response(noc_response(NOC_STATUS_INVALID_NOC, 0));
        };
        let icac = command
            .param(fields, "icac_value")
            .and_then(TlvValue::as_bytes)
            .map(<[u8]>::to_vec);
        let ipk_raw = command
            .param(fields, "ipk_value")
            .and_then(TlvValue::as_bytes)
            .unwrap_or_default();

        let Some(operational_key) = ctx.services.commissioning.pending_operational_key.take()
        else {
            return CommandOutcome::Response(noc_response(NOC_STATUS_MISSING_CSR, 0));
        };

        let info = match cert::parse_operational_cert(&noc) {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "rejected NOC");
                return CommandOutcome::Response(noc_response(NOC_STATUS_INVALID_NOC, 0));
            },
        };

        let root_cert = ctx.services.commissioning.pending_root_cert.take();
        let root_public_key = root_cert
            .as_deref()
            .and_then(|der| cert::parse_certificate_public_key(der).ok())
            .map(|key| key.to_encoded_point(false).as_bytes().to_vec())
            .unwrap_or_default();

        let mut epoch_key = [0u8; 16];
        if ipk_raw.len() == 16 {
            epoch_key.copy_from_slice(ipk_raw);
        } else {
            OsRng.fill_bytes(&mut epoch_key);
        }

        let index = ctx.services.fabrics.peek_next_index();
        let fabric = Fabric::new(
            index,
            info.fabric_id.unwrap_or(0),
            info.node_id,
            root_public_key,
            noc,
            icac,
            operational_key,
            epoch_key,
        );
        let compressed = fabric.compressed_fabric_id();
        match ctx.services.fabrics.add(fabric) {
            Ok(index) => {
                info!(
                    fabric_index = index,
                    compressed = %hex::encode(compressed),
                    "fabric commissioned"
                );
                ctx.services.session_fabric_binding = Some(index);
                state.set(ATTR_CURRENT_FABRIC_INDEX, TlvValue::UnsignedInt(index as u64));
                let table = &*ctx.services.fabrics;
                refresh_fabric_attributes(state, table);
                CommandOutcome::Response(noc_response(NOC_STATUS_OK, index))
            },
            Err(_) => CommandOutcome::Response(noc_response(NOC_STATUS_TABLE_FULL, 0)),
        }
    }
}
