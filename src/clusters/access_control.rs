// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! AccessControl cluster (0x001F). The ACL itself is a fabric-scoped
//! list attribute; enforcement lives in the interaction-model ACL
//! engine, which reads entries straight out of this cluster's state.

use crate::{clusters::framework::ClusterDef, tlv::TlvValue};

pub const CLUSTER_ID: u32 = 0x001F;

pub const ATTR_ACL: u32 = 0x0000;
pub const ATTR_EXTENSION: u32 = 0x0001;
pub const ATTR_SUBJECTS_PER_ENTRY: u32 = 0x0002;
pub const ATTR_TARGETS_PER_ENTRY: u32 = 0x0003;
pub const ATTR_ENTRIES_PER_FABRIC: u32 = 0x0004;

/// Entry field tags inside the ACL list.
pub const FIELD_PRIVILEGE: u8 = 1;
pub const FIELD_AUTH_MODE: u8 = 2;
pub const FIELD_SUBJECTS: u8 = 3;
pub const FIELD_TARGETS: u8 = 4;

/// Target sub-struct field tags.
pub const TARGET_CLUSTER: u8 = 0;
pub const TARGET_ENDPOINT: u8 = 1;
pub const TARGET_DEVICE_TYPE: u8 = 2;

pub fn definition() -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute_fabric_scoped(ATTR_ACL, TlvValue::Array(Vec::new()))
        .attribute_fabric_scoped(ATTR_EXTENSION, TlvValue::Array(Vec::new()))
        .attribute(ATTR_SUBJECTS_PER_ENTRY, TlvValue::UnsignedInt(4), false)
        .attribute(ATTR_TARGETS_PER_ENTRY, TlvValue::UnsignedInt(3), false)
        .attribute(ATTR_ENTRIES_PER_FABRIC, TlvValue::UnsignedInt(4), false)
}
