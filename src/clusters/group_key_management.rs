// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! GroupKeyManagement cluster (0x003F): KeySetWrite rotates the fabric's
//! IPK epoch key; group key *rotation schedules* stay with the
//! commissioner.

use tracing::info;

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{ClusterDef, ClusterState, CommandDef},
    },
    models::im::status,
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x003F;

pub const ATTR_GROUP_KEY_MAP: u32 = 0x0000;
pub const ATTR_GROUP_TABLE: u32 = 0x0001;
pub const ATTR_MAX_GROUPS_PER_FABRIC: u32 = 0x0002;
pub const ATTR_MAX_GROUP_KEYS_PER_FABRIC: u32 = 0x0003;

pub const CMD_KEY_SET_WRITE: u32 = 0x00;

/// GroupKeySetStruct field tags.
const KEYSET_FIELD_ID: u8 = 0;
const KEYSET_FIELD_EPOCH_KEY0: u8 = 2;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute_fabric_scoped(ATTR_GROUP_KEY_MAP, TlvValue::Array(Vec::new()))
        .attribute(ATTR_GROUP_TABLE, TlvValue::Array(Vec::new()), false)
        .attribute(ATTR_MAX_GROUPS_PER_FABRIC, TlvValue::UnsignedInt(1), false)
        .attribute(ATTR_MAX_GROUP_KEYS_PER_FABRIC, TlvValue::UnsignedInt(1), false)
        .command(CMD_KEY_SET_WRITE, &["group_key_set"])
}

#[derive(Debug, Default)]
pub struct Handler;

impl ClusterHandler for Handler {
    fn handle_command(
        &mut self,
        ctx: &mut CommandContext<'_, '_>,
        _state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome {
        match command.id {
            CMD_KEY_SET_WRITE => {
                let Some(key_set) = command.param(fields, "group_key_set") else {
                    return CommandOutcome::Status(status::CONSTRAINT_ERROR);
                };
                let set_id = key_set
                    .field(KEYSET_FIELD_ID)
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                let Some(epoch) = key_set
                    .field(KEYSET_FIELD_EPOCH_KEY0)
                    .and_then(TlvValue::as_bytes)
                else {
                    return CommandOutcome::Status(status::CONSTRAINT_ERROR);
                };
                let epoch: [u8; 16] = match epoch.try_into() {
                    Ok(e) => e,
                    Err(_) => return CommandOutcome::Status(status::CONSTRAINT_ERROR),
                };
                let Some(index) = ctx.fabric_index else {
                    return CommandOutcome::Status(status::UNSUPPORTED_ACCESS);
                };
                match ctx.services.fabrics.get_mut(index) {
                    Some(fabric) => {
                        fabric.set_ipk_epoch_key(epoch);
                        info!(fabric_index = index, set_id, "IPK epoch key replaced");
                        CommandOutcome::Success
                    },
                    None => CommandOutcome::Status(status::UNSUPPORTED_ACCESS),
                }
            },
            _ => CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        }
    }
}
