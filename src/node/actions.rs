// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::errors::CoreError;

/// Everything the core asks of its shell.
///
/// The orchestrator never performs I/O; it returns these and the shell
/// sends frames, arms timers and reports session lifecycle upward.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Emit a frame to the peer the triggering frame came from.
    Send(Bytes),
    /// Arm (or re-arm) a retransmission timer.
    ScheduleMrp {
        session_id: u16,
        exchange_id: u16,
        attempt: u32,
        timeout_ms: u64,
    },
    /// A secure session finished establishing.
    SessionEstablished(u16),
    /// A secure session went away (close, eviction, fabric removal).
    SessionClosed(u16),
    /// A frame was consumed without producing a reply.
    Error(CoreError),
}
