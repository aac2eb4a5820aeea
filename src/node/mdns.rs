// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! DNS-SD advertisement payloads.
//!
//! Discovery itself is delegated to the platform responder; this module
//! only shapes the service names, instance names and TXT records it
//! must publish.

use rand::RngCore;

use crate::session::Fabric;

pub const COMMISSIONABLE_SERVICE: &str = "_matterc._udp";
pub const OPERATIONAL_SERVICE: &str = "_matter._tcp";

/// One service advertisement: instance + TXT key/value set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub service: &'static str,
    pub instance: String,
    pub txt: Vec<(String, String)>,
}

/// Commissionable-node advertisement for an open commissioning window.
pub fn commissionable(
    discriminator: u16,
    vendor_id: u16,
    product_id: u16,
    device_type: u16,
) -> Advertisement {
    let mut instance_raw = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut instance_raw);
    Advertisement {
        service: COMMISSIONABLE_SERVICE,
        instance: hex::encode_upper(instance_raw),
        txt: vec![
            ("D".to_string(), discriminator.to_string()),
            ("VP".to_string(), format!("{vendor_id}+{product_id}")),
            ("CM".to_string(), "1".to_string()),
            ("DT".to_string(), device_type.to_string()),
        ],
    }
}

/// Operational advertisement for one commissioned fabric:
/// `{compressed_fabric_id}-{node_id}` in uppercase hex.
pub fn operational(fabric: &Fabric) -> Advertisement {
    let compressed = fabric.compressed_fabric_id();
    Advertisement {
        service: OPERATIONAL_SERVICE,
        instance: format!(
            "{}-{:016X}",
            hex::encode_upper(compressed),
            fabric.node_id
        ),
        txt: Vec::new(),
    }
}
