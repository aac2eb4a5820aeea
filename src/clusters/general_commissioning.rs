// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! GeneralCommissioning cluster (0x0030): fail-safe arming and the
//! commissioning completion handshake.

use crate::{
    clusters::{
        ClusterHandler, CommandContext, CommandOutcome,
        framework::{ClusterDef, ClusterState, CommandDef},
    },
    models::im::status,
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x0030;

pub const ATTR_BREADCRUMB: u32 = 0x0000;
pub const ATTR_BASIC_COMMISSIONING_INFO: u32 = 0x0001;
pub const ATTR_REGULATORY_CONFIG: u32 = 0x0002;
pub const ATTR_LOCATION_CAPABILITY: u32 = 0x0003;
pub const ATTR_SUPPORTS_CONCURRENT_CONNECTION: u32 = 0x0004;

pub const CMD_ARM_FAIL_SAFE: u32 = 0x00;
pub const CMD_ARM_FAIL_SAFE_RESPONSE: u32 = 0x01;
pub const CMD_SET_REGULATORY_CONFIG: u32 = 0x02;
pub const CMD_SET_REGULATORY_CONFIG_RESPONSE: u32 = 0x03;
pub const CMD_COMMISSIONING_COMPLETE: u32 = 0x04;
pub const CMD_COMMISSIONING_COMPLETE_RESPONSE: u32 = 0x05;

/// CommissioningErrorEnum.
pub const ERROR_OK: u64 = 0;
pub const ERROR_BUSY_WITH_OTHER_ADMIN: u64 = 4;

pub fn definition() -> ClusterDef {
    let info = TlvValue::Struct(vec![
        (0, TlvValue::UnsignedInt(60)),  // fail-safe expiry seconds
        (1, TlvValue::UnsignedInt(900)), // max cumulative fail-safe
    ]);
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_BREADCRUMB, TlvValue::UnsignedInt(0), true)
        .attribute(ATTR_BASIC_COMMISSIONING_INFO, info, false)
        .attribute(ATTR_REGULATORY_CONFIG, TlvValue::UnsignedInt(0), false)
        .attribute(ATTR_LOCATION_CAPABILITY, TlvValue::UnsignedInt(2), false)
        .attribute(ATTR_SUPPORTS_CONCURRENT_CONNECTION, TlvValue::Bool(true), false)
        .command_with_response(
            CMD_ARM_FAIL_SAFE,
            &["expiry_length_seconds", "breadcrumb"],
            CMD_ARM_FAIL_SAFE_RESPONSE,
        )
        .command_with_response(
            CMD_SET_REGULATORY_CONFIG,
            &["new_regulatory_config", "country_code", "breadcrumb"],
            CMD_SET_REGULATORY_CONFIG_RESPONSE,
        )
        .command_with_response(
            CMD_COMMISSIONING_COMPLETE,
            &[],
            CMD_COMMISSIONING_COMPLETE_RESPONSE,
        )
}

fn ok_response() -> TlvValue {
    TlvValue::Struct(vec![
        (0, TlvValue::UnsignedInt(ERROR_OK)),
        (1, TlvValue::Utf8(String::new())),
    ])
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
            CMD_ARM_FAIL_SAFE => {
                let expiry_s = command
                    .param(fields, "expiry_length_seconds")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                let breadcrumb = command
                    .param(fields, "breadcrumb")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                let commissioning = &mut ctx.services.commissioning;
                commissioning.failsafe_deadline_ms = if expiry_s == 0 {
                    None
                } else {
                    Some(ctx.now_ms.saturating_add(expiry_s * 1000))
                };
                commissioning.breadcrumb = breadcrumb;
                state.set(ATTR_BREADCRUMB, TlvValue::UnsignedInt(breadcrumb));
                CommandOutcome::Response(ok_response())
            },
            CMD_SET_REGULATORY_CONFIG => {
                let config = command
                    .param(fields, "new_regulatory_config")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                if config > 2 {
                    return CommandOutcome::Status(status::CONSTRAINT_ERROR);
                }
                let breadcrumb = command
                    .param(fields, "breadcrumb")
                    .and_then(TlvValue::as_u64)
                    .unwrap_or(0);
                state.set(ATTR_REGULATORY_CONFIG, TlvValue::UnsignedInt(config));
                state.set(ATTR_BREADCRUMB, TlvValue::UnsignedInt(breadcrumb));
                ctx.services.commissioning.breadcrumb = breadcrumb;
                CommandOutcome::Response(ok_response())
            },
            CMD_COMMISSIONING_COMPLETE => {
                // completing the flow disarms the fail-safe
                ctx.services.commissioning.failsafe_deadline_ms = None;
                ctx.services.commissioning.breadcrumb = 0;
                state.set(ATTR_BREADCRUMB, TlvValue::UnsignedInt(0));
                CommandOutcome::Response(ok_response())
            },
            _ => CommandOutcome::Status(status::UNSUPPORTED_COMMAND),
        }
    }
}
