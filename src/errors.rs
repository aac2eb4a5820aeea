// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use thiserror::Error;

use crate::tlv::TlvError;

/// Every failure the protocol core can surface to the shell.
///
/// Layer-local decode failures (bad TLV, bad AEAD tag, replay) become
/// `Action::Error` without a reply frame; handshake failures additionally
/// produce a failure StatusReport; interaction-model failures are mapped
/// to per-path status codes instead of ever reaching the shell.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("truncated input")]
    TruncatedInput,
    #[error("invalid TLV tag")]
    InvalidTag,
    #[error("unterminated TLV container")]
    UnterminatedContainer,
    #[error("unknown opcode 0x{0:02x}")]
    UnknownOpcode(u8),
    #[error("unsupported protocol 0x{0:04x}")]
    UnsupportedProtocol(u16),
    #[error("message authentication failed")]
    AuthenticationFailed,
    #[error("replayed message counter {0}")]
    ReplayDetected(u32),
    #[error("unknown session {0}")]
    UnknownSession(u16),
    #[error("destination id mismatch")]
    DestinationMismatch,
    #[error("no fabric matches the requested destination")]
    NoMatchingFabric,
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("pake confirmation failed")]
    ConfirmationFailed,
    #[error("unsupported endpoint")]
    UnsupportedEndpoint,
    #[error("unsupported cluster")]
    UnsupportedCluster,
    #[error("unsupported attribute")]
    UnsupportedAttribute,
    #[error("unsupported command")]
    UnsupportedCommand,
    #[error("attribute is not writable")]
    UnsupportedWrite,
    #[error("access denied")]
    UnsupportedAccess,
    #[error("value violates attribute constraint")]
    ConstraintError,
    #[error("operation requires a timed interaction")]
    NeedsTimedInteraction,
    #[error("timed interaction window expired")]
    Timeout,
    #[error("failure")]
    Failure,
}

impl From<TlvError> for CoreError {
    fn from(e: TlvError) -> Self {
        match e {
            TlvError::TruncatedInput => CoreError::TruncatedInput,
            TlvError::InvalidTag(_) => CoreError::InvalidTag,
            TlvError::UnterminatedContainer => CoreError::UnterminatedContainer,
        }
    }
}
