// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Commissioner-side CASE machinery for the test suite: a tiny CA that
//! issues operational certificates, plus the full Σ1/Σ2/Σ3 flow driven
//! against a node.

use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use p256::{
    PublicKey,
    ecdh::EphemeralSecret,
    ecdsa::SigningKey,
    elliptic_curve::sec1::ToEncodedPoint,
};
use rand::{RngCore, rngs::OsRng};
use x509_cert::{
    attr::AttributeTypeAndValue,
    builder::{Builder, CertificateBuilder, Profile},
    der::{Any, Encode, Tag, asn1::SetOfVec},
    name::{RdnSequence, RelativeDistinguishedName},
    serial_number::SerialNumber,
    spki::SubjectPublicKeyInfoOwned,
    time::Validity,
};

use matter_node_rs::{
    crypto::{
        aead,
        cert::{self, OID_MATTER_FABRIC_ID, OID_MATTER_NODE_ID, OID_MATTER_RCAC_ID},
        kdf,
    },
    models::{
        case::{NONCE_SIGMA2, NONCE_SIGMA3, Sigma1, Sigma2, Sigma3, Tbe2, Tbe3, encode_tbs},
        message::Message,
        opcode::SecureChannelOpcode,
        status_report::StatusReport,
    },
    node::{Action, NodeState},
    session::{AuthMode, Fabric, Session, SessionRole},
};

use crate::unit_tests::{Commissioner, first_send, plaintext_frame};

/// Everything the test commissioner knows about one fabric.
pub struct TestFabricSetup {
    pub fabric_index: u8,
    pub fabric_id: u64,
    pub device_node_id: u64,
    pub controller_node_id: u64,
    pub root_public_key: Vec<u8>,
    pub controller_key: SigningKey,
    pub controller_noc: Vec<u8>,
    pub ipk: [u8; 16],
}

fn matter_dn(pairs: &[(const_oid::ObjectIdentifier, String)]) -> Result<RdnSequence> {
    let mut rdns = Vec::new();
    for (oid, value) in pairs {
        let atv = AttributeTypeAndValue {
            oid: *oid,
            value: Any::new(Tag::Utf8String, value.as_bytes()).context("utf8 attr")?,
        };
        let set = SetOfVec::try_from(vec![atv]).context("rdn set")?;
        rdns.push(RelativeDistinguishedName(set));
    }
    Ok(RdnSequence(rdns))
}

fn spki_for(key: &p256::ecdsa::VerifyingKey) -> Result<SubjectPublicKeyInfoOwned> {
    use x509_cert::der::Decode;
    use x509_cert::spki::EncodePublicKey;
    let der = key.to_public_key_der().context("encode public key")?;
    SubjectPublicKeyInfoOwned::from_der(der.as_bytes()).context("reparse spki")
}

/// A miniature certificate authority playing the commissioner's root.
pub struct TestCa {
    pub key: SigningKey,
    pub ca_id: u64,
}

impl TestCa {
    pub fn new() -> Self {
        Self { key: SigningKey::random(&mut OsRng), ca_id: 1 }
    }

    /// Self-signed root certificate.
    pub fn root_cert(&self) -> Result<Vec<u8>> {
        let subject =
            matter_dn(&[(OID_MATTER_RCAC_ID, cert::format_hex_id(self.ca_id))])?;
        let builder = CertificateBuilder::new(
            Profile::Root,
            SerialNumber::new(&[1]).context("serial")?,
            Validity::from_now(Duration::from_secs(365 * 24 * 3600))
                .context("validity")?,
            subject,
            spki_for(self.key.verifying_key())?,
            &self.key,
        )
        .context("root builder")?;
        let cert = builder
            .build::<p256::ecdsa::DerSignature>()
            .context("sign root")?;
        cert.to_der().context("encode root")
    }

    /// CA-issued node operational certificate.
    pub fn issue_noc(
        &self,
        node_id: u64,
        fabric_id: u64,
        subject_public: &p256::ecdsa::VerifyingKey,
    ) -> Result<Vec<u8>> {
        let issuer =
            matter_dn(&[(OID_MATTER_RCAC_ID, cert::format_hex_id(self.ca_id))])?;
        let subject = matter_dn(&[
            (OID_MATTER_NODE_ID, cert::format_hex_id(node_id)),
            (OID_MATTER_FABRIC_ID, cert::format_hex_id(fabric_id)),
        ])?;
        let builder = CertificateBuilder::new(
            Profile::Leaf {
                issuer,
                enable_key_agreement: false,
                enable_key_encipherment: false,
            },
            SerialNumber::new(&[2]).context("serial")?,
            Validity::from_now(Duration::from_secs(365 * 24 * 3600))
                .context("validity")?,
            subject,
            spki_for(subject_public)?,
            &self.key,
        )
        .context("noc builder")?;
        let cert = builder
            .build::<p256::ecdsa::DerSignature>()
            .context("sign noc")?;
        cert.to_der().context("encode noc")
    }

    pub fn root_public_key(&self) -> Vec<u8> {
        self.key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }
}

/// Create a commissioned fabric directly in the node's table, the way a
/// finished commissioning flow would leave it.
pub fn install_fabric(
    node: &mut NodeState,
    fabric_id: u64,
    device_node_id: u64,
    controller_node_id: u64,
) -> Result<TestFabricSetup> {
    let ca = TestCa::new();

    let device_key = SigningKey::random(&mut OsRng);
    let device_noc =
        ca.issue_noc(device_node_id, fabric_id, device_key.verifying_key())?;
    let root_public_key = ca.root_public_key();

    let mut epoch_key = [0u8; 16];
    OsRng.fill_bytes(&mut epoch_key);

    let index = node.fabrics.peek_next_index();
    let fabric = Fabric::new(
        index,
        fabric_id,
        device_node_id,
        root_public_key.clone(),
        device_noc,
        None,
        device_key,
        epoch_key,
    );
    let ipk = *fabric.ipk();
    node.fabrics
        .add(fabric)
        .map_err(|e| anyhow::anyhow!("fabric add: {e}"))?;

    let controller_key = SigningKey::random(&mut OsRng);
    let controller_noc =
        ca.issue_noc(controller_node_id, fabric_id, controller_key.verifying_key())?;

    Ok(TestFabricSetup {
        fabric_index: index,
        fabric_id,
        device_node_id,
        controller_node_id,
        root_public_key,
        controller_key,
        controller_noc,
        ipk,
    })
}

/// The destination id the initiator computes when targeting the fabric.
pub fn destination_id(setup: &TestFabricSetup, initiator_random: &[u8]) -> [u8; 32] {
    kdf::hmac_sha256_multi(
        &setup.ipk,
        &[
            initiator_random,
            &setup.root_public_key,
            &setup.fabric_id.to_le_bytes(),
            &setup.device_node_id.to_le_bytes(),
        ],
    )
}

/// Drive the full Σ handshake; returns the commissioner session half.
pub fn case_handshake(
    node: &mut NodeState,
    setup: &TestFabricSetup,
    commissioner_session_id: u16,
) -> Result<Commissioner> {
    let exchange = 0x2222;
    let mut counter = 1u32;

    let mut initiator_random = vec![0u8; 32];
    OsRng.fill_bytes(&mut initiator_random);
    let eph = EphemeralSecret::random(&mut OsRng);
    let eph_pub = eph.public_key().to_encoded_point(false).as_bytes().to_vec();

    let sigma1 = Sigma1 {
        initiator_random: initiator_random.clone(),
        initiator_session_id: commissioner_session_id,
        destination_id: destination_id(setup, &initiator_random).to_vec(),
        initiator_eph_pub: eph_pub.clone(),
        resumption_id: None,
    };
    let sigma1_payload = sigma1.encode();
    let frame = plaintext_frame(
        SecureChannelOpcode::CaseSigma1,
        exchange,
        sigma1_payload.clone(),
        counter,
        None,
    );
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = Message::decode_plaintext(&first_send(&actions)?)?;
    if reply.protocol.opcode == SecureChannelOpcode::StatusReport as u8 {
        let report = StatusReport::decode(&reply.payload)?;
        bail!("sigma1 refused: {report:?}");
    }
    ensure!(
        reply.protocol.opcode == SecureChannelOpcode::CaseSigma2 as u8,
        "expected sigma2, got 0x{:02x}",
        reply.protocol.opcode
    );
    let sigma2_payload = reply.payload.clone();
    let sigma2 = Sigma2::decode(&sigma2_payload)?;

    let responder_pub = PublicKey::from_sec1_bytes(&sigma2.responder_eph_pub)
        .map_err(|_| anyhow::anyhow!("bad responder ephemeral key"))?;
    let shared = eph.diffie_hellman(&responder_pub);
    let shared_bytes = shared.raw_secret_bytes().to_vec();

    // open and verify the sigma2 envelope
    let sigma1_hash = kdf::sha256(&sigma1_payload);
    let mut salt = Vec::new();
    salt.extend_from_slice(&setup.ipk);
    salt.extend_from_slice(&sigma2.responder_random);
    salt.extend_from_slice(&sigma2.responder_eph_pub);
    salt.extend_from_slice(&sigma1_hash);
    let s2k_okm = kdf::hkdf_sha256(&salt, &shared_bytes, b"Sigma2", 16);
    let mut s2k = [0u8; 16];
    s2k.copy_from_slice(&s2k_okm);
    let tbe2_plain = aead::open(&s2k, &NONCE_SIGMA2, &[], &sigma2.encrypted2)
        .map_err(|_| anyhow::anyhow!("sigma2 envelope rejected"))?;
    let tbe2 = Tbe2::decode(&tbe2_plain)?;
    let device_info = cert::parse_operational_cert(&tbe2.noc)
        .map_err(|e| anyhow::anyhow!("device NOC: {e}"))?;
    ensure!(device_info.node_id == setup.device_node_id, "device NOC node id");
    let tbs2 = encode_tbs(
        &tbe2.noc,
        tbe2.icac.as_deref(),
        &sigma2.responder_eph_pub,
        &eph_pub,
    );
    ensure!(
        cert::verify_p1363(&device_info.verifying_key, &tbs2, &tbe2.signature),
        "device sigma2 signature"
    );

    // sigma3
    let tbs3 = encode_tbs(
        &setup.controller_noc,
        None,
        &eph_pub,
        &sigma2.responder_eph_pub,
    );
    let signature = cert::sign_p1363(&setup.controller_key, &tbs3);
    let tbe3 = Tbe3 {
        noc: setup.controller_noc.clone(),
        icac: None,
        signature: signature.to_vec(),
    };
    let transcript12 = kdf::sha256_multi(&[&sigma1_payload, &sigma2_payload]);
    let mut salt3 = Vec::new();
    salt3.extend_from_slice(&setup.ipk);
    salt3.extend_from_slice(&transcript12);
    let s3k_okm = kdf::hkdf_sha256(&salt3, &shared_bytes, b"Sigma3", 16);
    let mut s3k = [0u8; 16];
    s3k.copy_from_slice(&s3k_okm);
    let encrypted3 = aead::seal(&s3k, &NONCE_SIGMA3, &[], &tbe3.encode());
    let sigma3_payload = Sigma3 { encrypted3 }.encode();

    counter += 1;
    let frame = plaintext_frame(
        SecureChannelOpcode::CaseSigma3,
        exchange,
        sigma3_payload.clone(),
        counter,
        Some(reply.header.counter),
    );
    let actions = node.handle_frame(&frame, 0, 0);
    let reply = Message::decode_plaintext(&first_send(&actions)?)?;
    ensure!(
        reply.protocol.opcode == SecureChannelOpcode::StatusReport as u8,
        "expected closing status report"
    );
    let report = StatusReport::decode(&reply.payload)?;
    ensure!(report.is_success(), "sigma3 rejected: {report:?}");
    ensure!(
        actions
            .iter()
            .any(|a| matches!(a, Action::SessionEstablished(_))),
        "node did not establish a session"
    );

    let transcript = kdf::sha256_multi(&[&sigma1_payload, &sigma2_payload, &sigma3_payload]);
    let mut session_salt = Vec::new();
    session_salt.extend_from_slice(&setup.ipk);
    session_salt.extend_from_slice(&transcript);
    let session = Session::derive(
        SessionRole::Initiator,
        &shared_bytes,
        &session_salt,
        commissioner_session_id,
        sigma2.responder_session_id,
        setup.controller_node_id,
        setup.device_node_id,
        None,
        AuthMode::Case,
        0,
    );
    Ok(Commissioner { session, plaintext_counter: counter })
}
