// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! OnOff cluster (0x0006): the demo application cluster on endpoint 1.

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{AttributeConstraint, ClusterDef, ClusterState, CommandDef},
    },
    models::im::status,
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x0006;

pub const ATTR_ON_OFF: u32 = 0x0000;
pub const ATTR_GLOBAL_SCENE_CONTROL: u32 = 0x4000;
pub const ATTR_ON_TIME: u32 = 0x4001;
pub const ATTR_OFF_WAIT_TIME: u32 = 0x4002;
pub const ATTR_START_UP_ON_OFF: u32 = 0x4003;

pub const CMD_OFF: u32 = 0x00;
pub const CMD_ON: u32 = 0x01;
pub const CMD_TOGGLE: u32 = 0x02;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_ON_OFF, TlvValue::Bool(false), false)
        .attribute(ATTR_GLOBAL_SCENE_CONTROL, TlvValue::Bool(true), false)
        .attribute(ATTR_ON_TIME, TlvValue::UnsignedInt(0), true)
        .attribute(ATTR_OFF_WAIT_TIME, TlvValue::UnsignedInt(0), true)
        .attribute_constrained(
            ATTR_START_UP_ON_OFF,
            TlvValue::UnsignedInt(0),
            AttributeConstraint::enumerated(&[0, 1, 2]),
        )
        .command(CMD_OFF, &[])
        .command(CMD_ON, &[])
        .command(CMD_TOGGLE, &[])
}

#[derive(Debug, Default)]
pub struct Handler;

impl ClusterHandler for Handler {
    fn handle_command(
        &mut self,
        _ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        _fields: &TlvValue,
    ) -> CommandOutcome {
        let current = state.get(ATTR_ON_OFF).and_then(TlvValue::as_bool).unwrap_or(false);
        let target = match command.id {
            CMD_OFF => false,
            CMD_ON => true,
            CMD_TOGGLE => !current,
            _ => return CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        };
        if target != current {
            state.set(ATTR_ON_OFF, TlvValue::Bool(target));
        }
        CommandOutcome::Success
    }
}
