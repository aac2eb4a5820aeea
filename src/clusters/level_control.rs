// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! LevelControl cluster (0x0008) for the dimmable variant of the demo
//! light. Transitions complete immediately; transition timing belongs
//! to the application shell.

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{AttributeConstraint, ClusterDef, ClusterState, CommandDef},
    },
    models::im::status,
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x0008;

pub const ATTR_CURRENT_LEVEL: u32 = 0x0000;
pub const ATTR_MIN_LEVEL: u32 = 0x0002;
pub const ATTR_MAX_LEVEL: u32 = 0x0003;
pub const ATTR_OPTIONS: u32 = 0x000F;
pub const ATTR_ON_LEVEL: u32 = 0x0011;

pub const CMD_MOVE_TO_LEVEL: u32 = 0x00;
pub const CMD_MOVE: u32 = 0x01;
pub const CMD_STEP: u32 = 0x02;
pub const CMD_STOP: u32 = 0x03;
pub const CMD_MOVE_TO_LEVEL_WITH_ON_OFF: u32 = 0x04;

pub const MIN_LEVEL: u64 = 1;
pub const MAX_LEVEL: u64 = 254;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_CURRENT_LEVEL, TlvValue::UnsignedInt(MIN_LEVEL), false)
        .attribute(ATTR_MIN_LEVEL, TlvValue::UnsignedInt(MIN_LEVEL), false)
        .attribute(ATTR_MAX_LEVEL, TlvValue::UnsignedInt(MAX_LEVEL), false)
        .attribute_constrained(
            ATTR_OPTIONS,
            TlvValue::UnsignedInt(0),
            AttributeConstraint::range(0, 3),
        )
        .attribute_constrained(
            ATTR_ON_LEVEL,
            TlvValue::UnsignedInt(MAX_LEVEL),
            AttributeConstraint::range(MIN_LEVEL as i64, MAX_LEVEL as i64),
        )
        .command(CMD_MOVE_TO_LEVEL, &["level", "transition_time", "options_mask", "options_override"])
        .command(CMD_MOVE, &["move_mode", "rate", "options_mask", "options_override"])
        .command(CMD_STEP, &["step_mode", "step_size", "transition_time"])
        .command(CMD_STOP, &[])
        .command(
            CMD_MOVE_TO_LEVEL_WITH_ON_OFF,
            &["level", "transition_time", "options_mask", "options_override"],
        )
}

#[derive(Debug, Default)]
pub struct Handler;

impl Handler {
    fn set_level(state: &mut ClusterState, level: u64) -> CommandOutcome {
        if !(MIN_LEVEL..=MAX_LEVEL).contains(&level) {
            return CommandOutcome::Status(status::CONSTRAINT_ERROR);
        }
        let current = state
            .get(ATTR_CURRENT_LEVEL)
            .and_then(TlvValue::as_u64)
            .unwrap_or(MIN_LEVEL);
        if level != current {
            state.set(ATTR_CURRENT_LEVEL, TlvValue::UnsignedInt(level));
        }
        CommandOutcome::Success
    }
}

impl ClusterHandler for Handler {
    fn handle_command(
        &mut self,
        _ctx: &mut CommandContext<'_, '_>,
        state: &mut ClusterState,
        command: &CommandDef,
        fields: &TlvValue,
    ) -> CommandOutcome {
        match command.id {
            CMD_MOVE_TO_LEVEL | CMD_MOVE_TO_LEVEL_WITH_ON_OFF => {
                let Some(level) = command.param(fields, "level").and_then(TlvValue::as_u64)
                else {
                    return CommandOutcome::Status(status::CONSTRAINT_ERROR);
                };
                Self::set_level(state, level)
            },
            CMD_STEP => {
                let step = command
                    .param(fields, "step_size")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                let up = command
                    .param(fields, "step_mode")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0)
                    == 0;
                let current = state
                    .get(ATTR_CURRENT_LEVEL)
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(MIN_LEVEL);
                let target = if up {
                    (current + step).min(MAX_LEVEL)
                } else {
                    current.saturating_sub(step).max(MIN_LEVEL)
                };
                Self::set_level(state, target)
            },
            CMD_MOVE | CMD_STOP => CommandOutcome::Success,
            _ => CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        }
    }
}
