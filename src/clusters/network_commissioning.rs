// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! NetworkCommissioning cluster (0x0031), already-on-network flavor:
//! the node reaches the operational network before commissioning starts,
//! so the cluster only reports that single connected network.

use crate::{clusters::framework::ClusterDef, tlv::TlvValue};

pub const CLUSTER_ID: u32 = 0x0031;

pub const ATTR_MAX_NETWORKS: u32 = 0x0000;
pub const ATTR_NETWORKS: u32 = 0x0001;
pub const ATTR_INTERFACE_ENABLED: u32 = 0x0004;
pub const ATTR_LAST_NETWORKING_STATUS: u32 = 0x0005;
pub const ATTR_LAST_NETWORK_ID: u32 = 0x0006;
pub const ATTR_LAST_CONNECT_ERROR: u32 = 0x0007;

pub fn definition() -> ClusterDef {
    let connected = TlvValue::Array(vec![TlvValue::Struct(vec![
        (0, TlvValue::Bytes(b"operational".to_vec())),
        (1, TlvValue::Bool(true)),
    ])]);
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_MAX_NETWORKS, TlvValue::UnsignedInt(1), false)
        .attribute(ATTR_NETWORKS, connected, false)
        .attribute(ATTR_INTERFACE_ENABLED, TlvValue::Bool(true), true)
        .attribute(ATTR_LAST_NETWORKING_STATUS, TlvValue::UnsignedInt(0), false)
        .attribute(ATTR_LAST_NETWORK_ID, TlvValue::Bytes(b"operational".to_vec()), false)
        .attribute(ATTR_LAST_CONNECT_ERROR, TlvValue::Null, false)
}
