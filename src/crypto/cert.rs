// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Node operational certificate (NOC) handling.
//!
//! NOCs are plain X.509 DER with the CHIP identity carried as custom
//! attributes in the subject DN; the attribute value is the id as a
//! 16-character uppercase hex string. Certificate *issuance* belongs to
//! the commissioner; this node only parses, verifies and stores them.

use const_oid::ObjectIdentifier;
use p256::ecdsa::{
    Signature, SigningKey, VerifyingKey,
    signature::{Signer, Verifier},
};
use thiserror::Error;
use x509_cert::{Certificate, der::Decode};

/// matter-node-id attribute in the subject DN.
pub const OID_MATTER_NODE_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.1");
/// matter-fabric-id attribute in the subject DN.
pub const OID_MATTER_FABRIC_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.5");
/// matter-rcac-id attribute (root certificates).
pub const OID_MATTER_RCAC_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.37244.1.4");

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertError {
    #[error("malformed certificate DER")]
    MalformedDer,
    #[error("subject DN carries no matter node id")]
    MissingNodeId,
    #[error("subject public key is not a valid P-256 point")]
    BadPublicKey,
}

/// Identity extracted from an operational certificate.
#[derive(Debug, Clone)]
pub struct NodeCertInfo {
    pub node_id: u64,
    pub fabric_id: Option<u64>,
    pub verifying_key: VerifyingKey,
}

/// Parse a NOC: subject public key plus the DN-carried identity.
pub fn parse_operational_cert(der: &[u8]) -> Result<NodeCertInfo, CertError> {
    let cert = Certificate::from_der(der).map_err(|_| CertError::MalformedDer)?;
    let tbs = &cert.tbs_certificate;

    let mut node_id = None;
    let mut fabric_id = None;
    for rdn in tbs.subject.0.iter() {
        for atv in rdn.0.iter() {
            if atv.oid == OID_MATTER_NODE_ID {
                node_id = decode_hex_id(&atv.value);
            } else if atv.oid == OID_MATTER_FABRIC_ID {
                fabric_id = decode_hex_id(&atv.value);
            }
        }
    }

    let spki = &tbs.subject_public_key_info;
    let key_bytes = spki
        .subject_public_key
        .as_bytes()
        .ok_or(CertError::BadPublicKey)?;
    let verifying_key =
        VerifyingKey::from_sec1_bytes(key_bytes).map_err(|_| CertError::BadPublicKey)?;

    Ok(NodeCertInfo {
        node_id: node_id.ok_or(CertError::MissingNodeId)?,
        fabric_id,
        verifying_key,
    })
}

/// Subject public key alone; root certificates carry no node id.
pub fn parse_certificate_public_key(der: &[u8]) -> Result<VerifyingKey, CertError> {
    let cert = Certificate::from_der(der).map_err(|_| CertError::MalformedDer)?;
    let key_bytes = cert
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .ok_or(CertError::BadPublicKey)?;
    VerifyingKey::from_sec1_bytes(key_bytes).map_err(|_| CertError::BadPublicKey)
}

fn decode_hex_id(value: &x509_cert::der::Any) -> Option<u64> {
    let s = value
        .decode_as::<x509_cert::der::asn1::Utf8StringRef<'_>>()
        .ok()?;
    let s = s.as_str();
    if s.len() != 16 {
        return None;
    }
    u64::from_str_radix(s, 16).ok()
}

/// ECDSA-P256 over the message, emitted in raw P1363 (r ∥ s) form.
pub fn sign_p1363(key: &SigningKey, msg: &[u8]) -> [u8; 64] {
    let sig: Signature = key.sign(msg);
    sig.to_bytes().into()
}

/// Verify a raw P1363 signature.
pub fn verify_p1363(key: &VerifyingKey, msg: &[u8], sig: &[u8]) -> bool {
    let Ok(sig) = Signature::from_slice(sig) else {
        return false;
    };
    key.verify(msg, &sig).is_ok()
}

/// Format an id the way the subject DN carries it.
pub fn format_hex_id(id: u64) -> String {
    format!("{id:016X}")
}
