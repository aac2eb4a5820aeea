// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CASE responder: Σ1 → Σ2 → Σ3 → StatusReport, certificate
//! authenticated, one fabric picked out of many by destination id.

use p256::{PublicKey, ecdh::EphemeralSecret, elliptic_curve::sec1::ToEncodedPoint};
use rand::{RngCore, rngs::OsRng};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::{
    crypto::{aead, cert, kdf},
    errors::CoreError,
    models::{
        case::{NONCE_SIGMA2, NONCE_SIGMA3, Sigma1, Sigma2, Sigma3, Tbe2, Tbe3, encode_tbs},
        opcode::SecureChannelOpcode,
        status_report::StatusReport,
    },
    session::{AuthMode, FabricTable, Session, SessionRole},
    state_machine::common::HandshakeOutput,
};

struct AwaitingSigma3 {
    fabric_index: u8,
    local_node_id: u64,
    shared_secret: Zeroizing<Vec<u8>>,
    ipk: Zeroizing<[u8; 16]>,
    sigma1_bytes: Vec<u8>,
    sigma2_bytes: Vec<u8>,
    initiator_eph_pub: Vec<u8>,
    responder_eph_pub: Vec<u8>,
    initiator_session_id: u16,
    responder_session_id: u16,
}

enum State {
    Idle,
    AwaitingSigma3(Box<AwaitingSigma3>),
}

/// The device-side CASE machine. A fresh Σ1 always restarts it.
pub struct CaseResponder {
    state: State,
}

impl Default for CaseResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaseResponder {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Handle Σ1: route to a fabric by destination id, answer with Σ2.
    pub fn on_sigma1(
        &mut self,
        fabrics: &FabricTable,
        payload: &[u8],
        responder_session_id: u16,
    ) -> Result<HandshakeOutput, CoreError> {
        self.state = State::Idle;
        let sigma1 = Sigma1::decode(payload)?;

        // candidate scan: first fabric whose recomputed destination id
        // matches wins
        let fabric = fabrics
            .iter()
            .find(|f| {
                kdf::ct_eq(
                    &f.destination_id(&sigma1.initiator_random),
                    &sigma1.destination_id,
                )
            })
            .ok_or(CoreError::NoMatchingFabric);
        let fabric = match fabric {
            Ok(f) => f,
            Err(e) => {
                warn!("sigma1 matches no commissioned fabric");
                return Ok(HandshakeOutput::Failed {
                    opcode: SecureChannelOpcode::StatusReport,
                    payload: StatusReport::no_shared_trust_roots().encode(),
                    error: e,
                });
            },
        };
        debug!(fabric_index = fabric.index, "sigma1 routed");

        let initiator_pub = PublicKey::from_sec1_bytes(&sigma1.initiator_eph_pub)
            .map_err(|_| CoreError::InvalidTag)?;
        let eph = EphemeralSecret::random(&mut OsRng);
        let responder_eph_pub =
            eph.public_key().to_encoded_point(false).as_bytes().to_vec();
        let shared = eph.diffie_hellman(&initiator_pub);
        let shared_secret = Zeroizing::new(shared.raw_secret_bytes().to_vec());

        let mut responder_random = vec![0u8; 32];
        OsRng.fill_bytes(&mut responder_random);
        let ipk = fabric.ipk();

        // S2K = HKDF(IPK ∥ responder_random ∥ responder_eph ∥ H(Σ1))
        let sigma1_hash = kdf::sha256(payload);
        let mut salt = Vec::with_capacity(16 + 32 + 65 + 32);
        salt.extend_from_slice(ipk.as_slice());
        salt.extend_from_slice(&responder_random);
        salt.extend_from_slice(&responder_eph_pub);
        salt.extend_from_slice(&sigma1_hash);
        let s2k = key16(&kdf::hkdf_sha256(&salt, &shared_secret, b"Sigma2", 16));

        let tbs2 = encode_tbs(
            &fabric.noc,
            fabric.icac.as_deref(),
            &responder_eph_pub,
            &sigma1.initiator_eph_pub,
        );
        let signature = cert::sign_p1363(fabric.operational_key(), &tbs2);

        let mut resumption_id = vec![0u8; 16];
        OsRng.fill_bytes(&mut resumption_id);
        let tbe2 = Tbe2 {
            noc: fabric.noc.clone(),
            icac: fabric.icac.clone(),
            signature: signature.to_vec(),
            resumption_id,
        };
        let encrypted2 = aead::seal(&s2k, &NONCE_SIGMA2, &[], &tbe2.encode());

        let sigma2 = Sigma2 {
            responder_random,
            responder_session_id,
            responder_eph_pub: responder_eph_pub.clone(),
            encrypted2,
        };
        let sigma2_bytes = sigma2.encode();

        self.state = State::AwaitingSigma3(Box::new(AwaitingSigma3 {
            fabric_index: fabric.index,
            local_node_id: fabric.node_id,
            shared_secret,
            ipk,
            sigma1_bytes: payload.to_vec(),
            sigma2_bytes: sigma2_bytes.clone(),
            initiator_eph_pub: sigma1.initiator_eph_pub,
            responder_eph_pub,
            initiator_session_id: sigma1.initiator_session_id,
            responder_session_id,
        }));

        Ok(HandshakeOutput::Reply {
            opcode: SecureChannelOpcode::CaseSigma2,
            payload: sigma2_bytes,
        })
    }

    /// Handle Σ3: verify the initiator's credentials, derive the session.
    pub fn on_sigma3(
        &mut self,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<HandshakeOutput, CoreError> {
        let State::AwaitingSigma3(ctx) = std::mem::replace(&mut self.state, State::Idle)
        else {
            return Err(CoreError::Failure);
        };
        let sigma3 = Sigma3::decode(payload)?;

        // S3K = HKDF(IPK ∥ H(Σ1 ∥ Σ2))
        let transcript12 =
            kdf::sha256_multi(&[&ctx.sigma1_bytes, &ctx.sigma2_bytes]);
        let mut salt = Vec::with_capacity(16 + 32);
        salt.extend_from_slice(ctx.ipk.as_slice());
        salt.extend_from_slice(&transcript12);
        let s3k = key16(&kdf::hkdf_sha256(&salt, &ctx.shared_secret, b"Sigma3", 16));

        let tbe3_plain = match aead::open(&s3k, &NONCE_SIGMA3, &[], &sigma3.encrypted3) {
            Ok(p) => p,
            Err(_) => {
                return Ok(self.fail(CoreError::AuthenticationFailed));
            },
        };
        let tbe3 = Tbe3::decode(&tbe3_plain)?;

        let initiator_info = match cert::parse_operational_cert(&tbe3.noc) {
            Ok(info) => info,
            Err(_) => return Ok(self.fail(CoreError::SignatureVerificationFailed)),
        };
        let tbs3 = encode_tbs(
            &tbe3.noc,
            tbe3.icac.as_deref(),
            &ctx.initiator_eph_pub,
            &ctx.responder_eph_pub,
        );
        if !cert::verify_p1363(&initiator_info.verifying_key, &tbs3, &tbe3.signature) {
            warn!("sigma3 signature verification failed");
            return Ok(self.fail(CoreError::SignatureVerificationFailed));
        }

        // session salt = IPK ∥ H(Σ1 ∥ Σ2 ∥ Σ3)
        let transcript =
            kdf::sha256_multi(&[&ctx.sigma1_bytes, &ctx.sigma2_bytes, payload]);
        let mut session_salt = Vec::with_capacity(16 + 32);
        session_salt.extend_from_slice(ctx.ipk.as_slice());
        session_salt.extend_from_slice(&transcript);

        let session = Session::derive(
            SessionRole::Responder,
            &ctx.shared_secret,
            &session_salt,
            ctx.responder_session_id,
            ctx.initiator_session_id,
            ctx.local_node_id,
            initiator_info.node_id,
            Some(ctx.fabric_index),
            AuthMode::Case,
            now_ms,
        );
        info!(
            session_id = ctx.responder_session_id,
            peer_node_id = format_args!("0x{:016x}", initiator_info.node_id),
            fabric_index = ctx.fabric_index,
            "CASE session established"
        );
        Ok(HandshakeOutput::Complete {
            opcode: SecureChannelOpcode::StatusReport,
            payload: StatusReport::session_establishment_success().encode(),
            session: Box::new(session),
        })
    }

    fn fail(&mut self, error: CoreError) -> HandshakeOutput {
        self.state = State::Idle;
        HandshakeOutput::Failed {
            opcode: SecureChannelOpcode::StatusReport,
            payload: StatusReport::session_establishment_failed().encode(),
            error,
        }
    }
}

fn key16(okm: &[u8]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key.copy_from_slice(&okm[..16]);
    key
}
