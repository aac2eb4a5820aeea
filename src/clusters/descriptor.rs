// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Descriptor cluster (0x001D): what lives on this endpoint.

use crate::{clusters::framework::ClusterDef, tlv::TlvValue};

pub const CLUSTER_ID: u32 = 0x001D;

pub const ATTR_DEVICE_TYPE_LIST: u32 = 0x0000;
pub const ATTR_SERVER_LIST: u32 = 0x0001;
pub const ATTR_CLIENT_LIST: u32 = 0x0002;
pub const ATTR_PARTS_LIST: u32 = 0x0003;

/// Root-node device type.
pub const DEVICE_TYPE_ROOT_NODE: u64 = 0x0016;
/// On/Off light device type.
pub const DEVICE_TYPE_ON_OFF_LIGHT: u64 = 0x0100;

/// Build the descriptor for an endpoint hosting `servers`, exposing
/// `parts` as child endpoints.
pub fn definition(device_type: u64, servers: &[u32], parts: &[u16]) -> ClusterDef {
    let device_types = TlvValue::Array(vec![TlvValue::Struct(vec![
        (0, TlvValue::UnsignedInt(device_type)),
        (1, TlvValue::UnsignedInt(1)), // revision
    ])]);
    let server_list = TlvValue::Array(
        servers.iter().map(|s| TlvValue::UnsignedInt(*s as u64)).collect(),
    );
    let parts_list =
        TlvValue::Array(parts.iter().map(|p| TlvValue::UnsignedInt(*p as u64)).collect());

    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_DEVICE_TYPE_LIST, device_types, false)
        .attribute(ATTR_SERVER_LIST, server_list, false)
        .attribute(ATTR_CLIENT_LIST, TlvValue::Array(Vec::new()), false)
        .attribute(ATTR_PARTS_LIST, parts_list, false)
}
