// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use zeroize::Zeroizing;

use crate::{crypto::kdf, errors::CoreError};

/// How the peer proved its identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Pase,
    Case,
    Group,
}

/// Which side of the key schedule this node took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Initiator,
    Responder,
}

/// Sliding 32-counter replay window: the highest counter seen plus a
/// bitmap of the 31 before it.
#[derive(Debug, Clone, Default)]
pub struct ReplayWindow {
    max_seen: Option<u32>,
    bitmap: u32,
}

impl ReplayWindow {
    /// Admit `counter` exactly once; duplicates and counters that fell
    /// off the window are rejected.
    pub fn accept(&mut self, counter: u32) -> Result<(), CoreError> {
        match self.max_seen {
            None => {
                self.max_seen = Some(counter);
                self.bitmap = 1;
                Ok(())
            },
            Some(max) if counter > max => {
                let shift = counter - max;
                self.bitmap = if shift >= 32 { 1 } else { (self.bitmap << shift) | 1 };
                self.max_seen = Some(counter);
                Ok(())
            },
            Some(max) => {
                let offset = max - counter;
                if offset >= 32 {
                    return Err(CoreError::ReplayDetected(counter));
                }
                let bit = 1u32 << offset;
                if self.bitmap & bit != 0 {
                    return Err(CoreError::ReplayDetected(counter));
                }
                self.bitmap |= bit;
                Ok(())
            },
        }
    }
}

/// One established secure session.
///
/// Keys are directional: `encrypt_key` protects frames from this node to
/// the peer, `decrypt_key` opens frames from the peer. Both live in
/// zeroize-on-drop containers and never leave this struct as owned
/// copies.
pub struct Session {
    pub local_session_id: u16,
    pub peer_session_id: u16,
    encrypt_key: Zeroizing<[u8; 16]>,
    decrypt_key: Zeroizing<[u8; 16]>,
    attestation_challenge: Zeroizing<[u8; 16]>,
    pub local_node_id: u64,
    pub peer_node_id: u64,
    pub fabric_index: Option<u8>,
    pub auth_mode: AuthMode,
    outgoing_counter: u32,
    pub replay: ReplayWindow,
    /// Shell-provided monotonic milliseconds; drives idle and LRU sweeps.
    pub last_active_ms: u64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("local_session_id", &self.local_session_id)
            .field("peer_session_id", &self.peer_session_id)
            .field("peer_node_id", &format_args!("0x{:016x}", self.peer_node_id))
            .field("fabric_index", &self.fabric_index)
            .field("auth_mode", &self.auth_mode)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Derive a session from a raw shared secret:
    /// `I2R ∥ R2I ∥ AttestationChallenge = HKDF(salt, K_e, "SessionKeys", 48)`.
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        role: SessionRole,
        shared_secret: &[u8],
        salt: &[u8],
        local_session_id: u16,
        peer_session_id: u16,
        local_node_id: u64,
        peer_node_id: u64,
        fabric_index: Option<u8>,
        auth_mode: AuthMode,
        now_ms: u64,
    ) -> Self {
        let keypack = kdf::hkdf_sha256(salt, shared_secret, b"SessionKeys", 48);
        let mut i2r = Zeroizing::new([0u8; 16]);
        let mut r2i = Zeroizing::new([0u8; 16]);
        let mut challenge = Zeroizing::new([0u8; 16]);
        i2r.copy_from_slice(&keypack[..16]);
        r2i.copy_from_slice(&keypack[16..32]);
        challenge.copy_from_slice(&keypack[32..48]);

        let (encrypt_key, decrypt_key) = match role {
            SessionRole::Initiator => (i2r, r2i),
            SessionRole::Responder => (r2i, i2r),
        };

        Self {
            local_session_id,
            peer_session_id,
            encrypt_key,
            decrypt_key,
            attestation_challenge: challenge,
            local_node_id,
            peer_node_id,
            fabric_index,
            auth_mode,
            outgoing_counter: 0,
            replay: ReplayWindow::default(),
            last_active_ms: now_ms,
        }
    }

    pub fn encrypt_key(&self) -> &[u8; 16] {
        &self.encrypt_key
    }

    pub fn decrypt_key(&self) -> &[u8; 16] {
        &self.decrypt_key
    }

    pub fn attestation_challenge(&self) -> &[u8; 16] {
        &self.attestation_challenge
    }

    /// Strictly monotonic per-session outgoing counter.
    pub fn next_counter(&mut self) -> u32 {
        self.outgoing_counter = self.outgoing_counter.wrapping_add(1);
        self.outgoing_counter
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_active_ms = now_ms;
    }
}
