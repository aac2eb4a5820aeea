// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! PASE responder: six messages from PBKDFParamRequest to the success
//! StatusReport, driven by the commissioning passcode.
//!
//! The transcript context binds the PAKE run to the exact
//! PBKDFParamRequest/Response bytes exchanged, so a mixed-up or replayed
//! parameter phase cannot converge on the same keys.

use rand::RngCore;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    crypto::{
        kdf,
        spake2p::{PakeShared, PaseVerifier, respond},
    },
    errors::CoreError,
    models::{
        opcode::SecureChannelOpcode,
        pase::{Pake1, Pake2, Pake3, PbkdfParamRequest, PbkdfParamResponse},
        status_report::StatusReport,
    },
    session::{AuthMode, Session, SessionRole},
    state_machine::common::HandshakeOutput,
};

const PAKE_CONTEXT_PREFIX: &[u8] = b"CHIP PAKE V1 Commissioning";

/// PBKDF parameters the device advertises.
#[derive(Debug, Clone)]
pub struct PaseConfig {
    pub passcode: u32,
    pub salt: Vec<u8>,
    pub iterations: u32,
}

enum State {
    Idle,
    AwaitingPake1 {
        context_seed: Vec<u8>,
        initiator_session_id: u16,
        responder_session_id: u16,
    },
    AwaitingPake3 {
        shared: PakeShared,
        initiator_session_id: u16,
        responder_session_id: u16,
    },
}

/// The device-side PASE machine. One commissioning channel at a time; a
/// fresh PBKDFParamRequest resets a stuck run.
pub struct PaseResponder {
    config: PaseConfig,
    state: State,
}

impl PaseResponder {
    pub fn new(config: PaseConfig) -> Self {
        Self { config, state: State::Idle }
    }

    /// Drive the machine with one plaintext secure-channel message.
    /// `responder_session_id` is the session id the caller reserved for
    /// the session under negotiation.
    pub fn handle(
        &mut self,
        opcode: SecureChannelOpcode,
        payload: &[u8],
        responder_session_id: u16,
        now_ms: u64,
    ) -> Result<HandshakeOutput, CoreError> {
        match opcode {
            SecureChannelOpcode::PbkdfParamRequest => {
                self.on_pbkdf_request(payload, responder_session_id)
            },
            SecureChannelOpcode::Pake1 => self.on_pake1(payload),
            SecureChannelOpcode::Pake3 => self.on_pake3(payload, now_ms),
            _ => Err(CoreError::UnknownOpcode(opcode as u8)),
        }
    }

    fn on_pbkdf_request(
        &mut self,
        payload: &[u8],
        responder_session_id: u16,
    ) -> Result<HandshakeOutput, CoreError> {
        let request = PbkdfParamRequest::decode(payload)?;
        debug!(
            initiator_session_id = request.initiator_session_id,
            "pbkdf parameter request"
        );

        let mut responder_random = vec![0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut responder_random);
        let response = PbkdfParamResponse {
            initiator_random: request.initiator_random.clone(),
            responder_random,
            responder_session_id,
            iterations: self.config.iterations,
            salt: self.config.salt.clone(),
        };
        let response_bytes = response.encode();

        // transcript context covers both parameter messages verbatim
        let mut context_seed =
            Vec::with_capacity(PAKE_CONTEXT_PREFIX.len() + payload.len() + response_bytes.len());
        context_seed.extend_from_slice(PAKE_CONTEXT_PREFIX);
        context_seed.extend_from_slice(payload);
        context_seed.extend_from_slice(&response_bytes);

        self.state = State::AwaitingPake1 {
            context_seed,
            initiator_session_id: request.initiator_session_id,
            responder_session_id,
        };
        Ok(HandshakeOutput::Reply {
            opcode: SecureChannelOpcode::PbkdfParamResponse,
            payload: response_bytes,
        })
    }

    fn on_pake1(&mut self, payload: &[u8]) -> Result<HandshakeOutput, CoreError> {
        let State::AwaitingPake1 {
            context_seed,
            initiator_session_id,
            responder_session_id,
        } = std::mem::replace(&mut self.state, State::Idle)
        else {
            return Err(CoreError::Failure);
        };

        let pake1 = Pake1::decode(payload)?;
        let verifier = PaseVerifier::derive(
            self.config.passcode,
            &self.config.salt,
            self.config.iterations,
        );
        let context = kdf::sha256(&context_seed);
        let round = respond(&verifier, &pake1.p_a, &context)
            .map_err(|_| CoreError::ConfirmationFailed)?;

        let reply = Pake2 {
            p_b: round.p_b.to_vec(),
            c_b: round.shared.confirmation_out.to_vec(),
        };
        self.state = State::AwaitingPake3 {
            shared: round.shared,
            initiator_session_id,
            responder_session_id,
        };
        Ok(HandshakeOutput::Reply {
            opcode: SecureChannelOpcode::Pake2,
            payload: reply.encode(),
        })
    }

    fn on_pake3(
        &mut self,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<HandshakeOutput, CoreError> {
        let State::AwaitingPake3 { shared, initiator_session_id, responder_session_id } =
            std::mem::replace(&mut self.state, State::Idle)
        else {
            return Err(CoreError::Failure);
        };

        let pake3 = Pake3::decode(payload)?;
        if !kdf::ct_eq(&pake3.c_a, &shared.confirmation_in) {
            warn!("pake confirmation mismatch, rejecting commissioner");
            return Ok(HandshakeOutput::Failed {
                opcode: SecureChannelOpcode::StatusReport,
                payload: StatusReport::session_establishment_failed().encode(),
                error: CoreError::ConfirmationFailed,
            });
        }

        let ke = Zeroizing::new(*shared.ke);
        let session = Session::derive(
            SessionRole::Responder,
            ke.as_slice(),
            &[],
            responder_session_id,
            initiator_session_id,
            0,
            0,
            None,
            AuthMode::Pase,
            now_ms,
        );
        info!(session_id = responder_session_id, "PASE session established");
        Ok(HandshakeOutput::Complete {
            opcode: SecureChannelOpcode::StatusReport,
            payload: StatusReport::session_establishment_success().encode(),
            session: Box::new(session),
        })
    }
}
