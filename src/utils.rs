// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngCore;

/// Fresh random bytes for handshake nonces and ids.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// Node ids print as 16 uppercase hex chars everywhere (logs, DNS-SD
/// instances, certificate DNs).
pub fn format_node_id(node_id: u64) -> String {
    format!("{node_id:016X}")
}
