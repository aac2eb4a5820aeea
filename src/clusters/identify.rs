// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Identify cluster (0x0003): commissioners blink the device to confirm
//! which physical unit they are talking to. The countdown itself is the
//! shell's job; the cluster just tracks the requested seconds.

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{ClusterDef, ClusterState, CommandDef},
    },
    models::im::status,
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x0003;

pub const ATTR_IDENTIFY_TIME: u32 = 0x0000;
pub const ATTR_IDENTIFY_TYPE: u32 = 0x0001;

pub const CMD_IDENTIFY: u32 = 0x00;
pub const CMD_TRIGGER_EFFECT: u32 = 0x40;

/// IdentifyTypeEnum: visible light output.
const IDENTIFY_TYPE_LIGHT_OUTPUT: u64 = 2;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_IDENTIFY_TIME, TlvValue::UnsignedInt(0), true)
        .attribute(
            ATTR_IDENTIFY_TYPE,
            TlvValue::UnsignedInt(IDENTIFY_TYPE_LIGHT_OUTPUT),
            false,
        )
        .command(CMD_IDENTIFY, &["identify_time"])
        .command(CMD_TRIGGER_EFFECT, &["effect_identifier", "effect_variant"])
}

#[derive(Debug, Default)]
pub struct Handler;

impl ClusterHandler for Handler {
    fn handle_command(
        &mut self,
        _ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome {
        match command.id {
            CMD_IDENTIFY => {
                let seconds = command
                    .param(fields, "identify_time")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                state.set(ATTR_IDENTIFY_TIME, TlvValue::UnsignedInt(seconds));
                CommandOutcome::Success
            },
            // effects have no observable state here
            CMD_TRIGGER_EFFECT => CommandOutcome::Success,
            _ => CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        }
    }
}
