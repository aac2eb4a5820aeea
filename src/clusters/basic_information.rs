// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! BasicInformation cluster (0x0028): device identity constants plus the
//! writable NodeLabel.

use crate::{
    clusters::framework::{ClusterDef, EventPriority},
    tlv::TlvValue,
};

pub const CLUSTER_ID: u32 = 0x0028;

pub const ATTR_DATA_MODEL_REVISION: u32 = 0x0000;
pub const ATTR_VENDOR_NAME: u32 = 0x0001;
pub const ATTR_VENDOR_ID: u32 = 0x0002;
pub const ATTR_PRODUCT_NAME: u32 = 0x0003;
pub const ATTR_PRODUCT_ID: u32 = 0x0004;
pub const ATTR_NODE_LABEL: u32 = 0x0005;
pub const ATTR_HARDWARE_VERSION: u32 = 0x0007;
pub const ATTR_SOFTWARE_VERSION: u32 = 0x0009;
pub const ATTR_SERIAL_NUMBER: u32 = 0x000F;
pub const ATTR_UNIQUE_ID: u32 = 0x0012;

pub const EVENT_START_UP: u32 = 0x00;
pub const EVENT_SHUT_DOWN: u32 = 0x01;

pub struct DeviceIdentity {
    pub vendor_name: String,
    pub vendor_id: u16,
    pub product_name: String,
    pub product_id: u16,
    pub serial_number: String,
    pub unique_id: String,
}

pub fn definition(identity: &DeviceIdentity) -> ClusterDef {
    ClusterDef::new(CLUSTER_ID)
        .attribute(ATTR_DATA_MODEL_REVISION, TlvValue::UnsignedInt(17), false)
        .attribute(
            ATTR_VENDOR_NAME,
            TlvValue::Utf8(identity.vendor_name.clone()),
            false,
        )
        .attribute(
            ATTR_VENDOR_ID,
            TlvValue::UnsignedInt(identity.vendor_id as u64),
            false,
        )
        .attribute(
            ATTR_PRODUCT_NAME,
            TlvValue::Utf8(identity.product_name.clone()),
            false,
        )
        .attribute(
            ATTR_PRODUCT_ID,
            TlvValue::UnsignedInt(identity.product_id as u64),
            false,
        )
        .attribute(ATTR_NODE_LABEL, TlvValue::Utf8(String::new()), true)
        .attribute(ATTR_HARDWARE_VERSION, TlvValue::UnsignedInt(1), false)
        .attribute(ATTR_SOFTWARE_VERSION, TlvValue::UnsignedInt(1), false)
        .attribute(
            ATTR_SERIAL_NUMBER,
            TlvValue::Utf8(identity.serial_number.clone()),
            false,
        )
        .attribute(ATTR_UNIQUE_ID, TlvValue::Utf8(identity.unique_id.clone()), false)
        .event(EVENT_START_UP, EventPriority::Critical)
        .event(EVENT_SHUT_DOWN, EventPriority::Critical)
}
