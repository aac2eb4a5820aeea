// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! SPAKE2+ over P-256, both roles.
//!
//! The device is the protocol responder (prover of the verifier side);
//! the initiator role lives here too so the handshake can be exercised
//! end to end without an external commissioner.
//!
//! The password-derived scalars come from an 80-byte PBKDF2-SHA256
//! stretch of the 4-byte little-endian passcode, split in two 40-byte
//! halves, each reduced modulo the group order. All scalar products run
//! on `p256`'s complete constant-time formulas.

use crypto_bigint::Encoding;
use once_cell::sync::Lazy;
use p256::{
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
    elliptic_curve::{
        Field, PrimeField,
        sec1::{FromEncodedPoint, ToEncodedPoint},
    },
};
use rand::rngs::OsRng;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::crypto::kdf;

/// Spec-fixed SPAKE2+ generator points for P-256 (compressed SEC1).
const M_COMPRESSED: [u8; 33] =
    hex_literal::hex!("02886e2f97ace46e55ba9dd7242579f2993b64e16ef3dcab95afd497333d8fa12f");
const N_COMPRESSED: [u8; 33] =
    hex_literal::hex!("03d8bbd6c639c62937b04d997f38c3770719c629d7014d49a24b4f98baa1292b49");

/// P-256 group order, zero-extended to 384 bits for wide reduction.
const ORDER_384: crypto_bigint::U384 = crypto_bigint::U384::from_be_hex(
    "00000000000000000000000000000000ffffffff00000000ffffffffffffffffbce6faada7179e84f3b9cac2fc632551",
);

static POINT_M: Lazy<ProjectivePoint> = Lazy::new(|| decompress(&M_COMPRESSED));
static POINT_N: Lazy<ProjectivePoint> = Lazy::new(|| decompress(&N_COMPRESSED));

fn decompress(sec1: &[u8; 33]) -> ProjectivePoint {
    let ep = EncodedPoint::from_bytes(sec1).expect("fixed point constant is valid SEC1");
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&ep))
        .expect("fixed point constant lies on the curve");
    ProjectivePoint::from(affine)
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SpakeError {
    #[error("peer share is not a valid curve point")]
    InvalidPoint,
}

/// The password-derived material held by the responder.
#[derive(Clone)]
pub struct PaseVerifier {
    w0: Scalar,
    w1: Scalar,
}

impl PaseVerifier {
    /// Stretch the passcode into (w0, w1).
    pub fn derive(passcode: u32, salt: &[u8], iterations: u32) -> Self {
        let stretched = kdf::pbkdf2_sha256(&passcode.to_le_bytes(), salt, iterations, 80);
        let w0 = reduce_mod_order(&stretched[..40]);
        let w1 = reduce_mod_order(&stretched[40..]);
        Self { w0, w1 }
    }

    /// The registration record L = w1·G (what a pure verifier store
    /// would hold instead of w1).
    pub fn l(&self) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * self.w1
    }
}

/// Keys agreed by one completed PAKE run.
pub struct PakeShared {
    /// Raw shared secret promoted to session keys by the caller.
    pub ke: Zeroizing<[u8; 16]>,
    /// Confirmation value this side sends.
    pub confirmation_out: [u8; 32],
    /// Confirmation value expected from the peer.
    pub confirmation_in: [u8; 32],
}

/// Responder output: pB plus the agreed keys.
pub struct ResponderRound {
    pub p_b: [u8; 65],
    pub shared: PakeShared,
}

/// Run the responder side against the initiator share pA.
pub fn respond(
    verifier: &PaseVerifier,
    p_a_raw: &[u8],
    context: &[u8; 32],
) -> Result<ResponderRound, SpakeError> {
    let p_a = parse_point(p_a_raw)?;
    let y = Scalar::random(&mut OsRng);
    respond_with_scalar(verifier, p_a, p_a_raw, context, y)
}

fn respond_with_scalar(
    verifier: &PaseVerifier,
    p_a: ProjectivePoint,
    p_a_raw: &[u8],
    context: &[u8; 32],
    y: Scalar,
) -> Result<ResponderRound, SpakeError> {
    let p_b = ProjectivePoint::GENERATOR * y + *POINT_N * verifier.w0;
    let z = (p_a - *POINT_M * verifier.w0) * y;
    let v = verifier.l() * y;

    let p_b_raw = encode_point(&p_b);
    let (k_ca, k_cb, ke) = transcript_keys(
        context,
        p_a_raw,
        &p_b_raw,
        &encode_point(&z),
        &encode_point(&v),
        &verifier.w0,
    );

    Ok(ResponderRound {
        p_b: p_b_raw,
        shared: PakeShared {
            ke,
            confirmation_out: kdf::hmac_sha256(&k_cb, p_a_raw),
            confirmation_in: kdf::hmac_sha256(&k_ca, &p_b_raw),
        },
    })
}

/// Initiator state between pA and the peer's pB.
pub struct Initiator {
    x: Scalar,
    verifier: PaseVerifier,
    p_a: [u8; 65],
}

impl Initiator {
    pub fn start(passcode: u32, salt: &[u8], iterations: u32) -> Self {
        let verifier = PaseVerifier::derive(passcode, salt, iterations);
        let x = Scalar::random(&mut OsRng);
        let p_a = encode_point(&(ProjectivePoint::GENERATOR * x + *POINT_M * verifier.w0));
        Self { x, verifier, p_a }
    }

    pub fn p_a(&self) -> &[u8; 65] {
        &self.p_a
    }

    pub fn finish(
        &self,
        p_b_raw: &[u8],
        context: &[u8; 32],
    ) -> Result<PakeShared, SpakeError> {
        let p_b = parse_point(p_b_raw)?;
        let base = p_b - *POINT_N * self.verifier.w0;
        let z = base * self.x;
        let v = base * self.verifier.w1;

        let (k_ca, k_cb, ke) = transcript_keys(
            context,
            &self.p_a,
            p_b_raw,
            &encode_point(&z),
            &encode_point(&v),
            &self.verifier.w0,
        );

        Ok(PakeShared {
            ke,
            confirmation_out: kdf::hmac_sha256(&k_ca, p_b_raw),
            confirmation_in: kdf::hmac_sha256(&k_cb, &self.p_a),
        })
    }
}

/// TT = context ∥ pA ∥ pB ∥ Z ∥ V ∥ w0; Ka∥Ke = SHA-256(TT);
/// K_cA∥K_cB = HKDF(Ka, "ConfirmationKeys", 32).
fn transcript_keys(
    context: &[u8; 32],
    p_a: &[u8],
    p_b: &[u8],
    z: &[u8],
    v: &[u8],
    w0: &Scalar,
) -> ([u8; 16], [u8; 16], Zeroizing<[u8; 16]>) {
    let w0_bytes = w0.to_bytes();
    let tt = kdf::sha256_multi(&[context, p_a, p_b, z, v, w0_bytes.as_slice()]);
    let mut ka = [0u8; 16];
    ka.copy_from_slice(&tt[..16]);
    let mut ke = Zeroizing::new([0u8; 16]);
    ke.copy_from_slice(&tt[16..]);

    let conf = kdf::hkdf_sha256(&[], &ka, b"ConfirmationKeys", 32);
    let mut k_ca = [0u8; 16];
    let mut k_cb = [0u8; 16];
    k_ca.copy_from_slice(&conf[..16]);
    k_cb.copy_from_slice(&conf[16..]);
    (k_ca, k_cb, ke)
}

fn parse_point(raw: &[u8]) -> Result<ProjectivePoint, SpakeError> {
    let ep = EncodedPoint::from_bytes(raw).map_err(|_| SpakeError::InvalidPoint)?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&ep))
        .ok_or(SpakeError::InvalidPoint)?;
    let point = ProjectivePoint::from(affine);
    if point == ProjectivePoint::IDENTITY {
        return Err(SpakeError::InvalidPoint);
    }
    Ok(point)
}

fn encode_point(p: &ProjectivePoint) -> [u8; 65] {
    let ep = p.to_affine().to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(ep.as_bytes());
    out
}

/// Interpret a 40-byte big-endian value modulo the group order.
fn reduce_mod_order(wide: &[u8]) -> Scalar {
    let mut padded = [0u8; 48];
    padded[8..].copy_from_slice(wide);
    let x = crypto_bigint::U384::from_be_slice(&padded);
    let order: crypto_bigint::NonZero<crypto_bigint::U384> =
        Option::from(crypto_bigint::NonZero::new(ORDER_384))
            .expect("group order is nonzero");
    let reduced = x % order;
    let bytes = reduced.to_be_bytes();
    let mut repr = [0u8; 32];
    repr.copy_from_slice(&bytes[16..]);
    Option::<Scalar>::from(Scalar::from_repr(repr.into()))
        .expect("value below group order")
}
