// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! AdministratorCommissioning cluster (0x003C): an operational admin
//! opens or revokes the commissioning window so further fabrics can
//! join. Advertisement of the open window is relayed to the shell via
//! the WindowStatus attribute.

use tracing::info;

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{ClusterDef, ClusterState, CommandDef},
    },
    models::im::status,
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x003C;

pub const ATTR_WINDOW_STATUS: u32 = 0x0000;
pub const ATTR_ADMIN_FABRIC_INDEX: u32 = 0x0001;
pub const ATTR_ADMIN_VENDOR_ID: u32 = 0x0002;

pub const CMD_OPEN_COMMISSIONING_WINDOW: u32 = 0x00;
pub const CMD_OPEN_BASIC_COMMISSIONING_WINDOW: u32 = 0x01;
pub const CMD_REVOKE_COMMISSIONING: u32 = 0x02;

/// CommissioningWindowStatusEnum.
pub const WINDOW_CLOSED: u64 = 0;
pub const WINDOW_ENHANCED_OPEN: u64 = 1;
pub const WINDOW_BASIC_OPEN: u64 = 2;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_WINDOW_STATUS, TlvValue::UnsignedInt(WINDOW_CLOSED), false)
        .attribute(ATTR_ADMIN_FABRIC_INDEX, TlvValue::Null, false)
        .attribute(ATTR_ADMIN_VENDOR_ID, TlvValue::Null, false)
        .command(
            CMD_OPEN_COMMISSIONING_WINDOW,
            &["commissioning_timeout", "pake_passcode_verifier", "discriminator", "iterations", "salt"],
        )
        .command(CMD_OPEN_BASIC_COMMISSIONING_WINDOW, &["commissioning_timeout"])
        .command(CMD_REVOKE_COMMISSIONING, &[])
}

#[derive(Debug, Default)]
pub struct Handler;

impl ClusterHandler for Handler {
    fn handle_command(
        &mut self,
        ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome {
        match command.id {
            CMD_OPEN_COMMISSIONING_WINDOW | CMD_OPEN_BASIC_COMMISSIONING_WINDOW => {
                let already_open = state
                    .get(ATTR_WINDOW_STATUS)
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(WINDOW_CLOSED)
                    != WINDOW_CLOSED;
                if already_open {
                    return CommandOutcome::Status(status::FAILURE);
                }
                let timeout_s = command
                    .param(fields, "commissioning_timeout")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                if !(180..=900).contains(&timeout_s) {
                    return CommandOutcome::Status(status::CONSTRAINT_ERROR);
                }
                let mode = if command.id == CMD_OPEN_COMMISSIONING_WINDOW {
                    WINDOW_ENHANCED_OPEN
                } else {
                    WINDOW_BASIC_OPEN
                };
                state.set(ATTR_WINDOW_STATUS, TlvValue::UnsignedInt(mode));
                state.set(
                    ATTR_ADMIN_FABRIC_INDEX,
                    match ctx.fabric_index {
                        Some(i) => TlvValue::UnsignedInt(i as u64),
                        None => TlvValue::Null,
                    },
                );
                info!(timeout_s, mode, "commissioning window opened");
                CommandOutcome::Success
            },
            CMD_REVOKE_COMMISSIONING => {
                state.set(ATTR_WINDOW_STATUS, TlvValue::UnsignedInt(WINDOW_CLOSED));
                state.set(ATTR_ADMIN_FABRIC_INDEX, TlvValue::Null);
                info!("commissioning window revoked");
                CommandOutcome::Success
            },
            _ => CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        }
    }
}
