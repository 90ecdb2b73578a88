//! Conversions between curve types, big integers, and their wire encodings.
//!
//! The protocol mixes arithmetic modulo the curve order with arithmetic in
//! Paillier and Pedersen groups, so scalars regularly cross into
//! [`BigNumber`] and back.
use std::sync::OnceLock;

use digest::{Digest, FixedOutput};
use ecdsa::hazmat::DigestPrimitive;
use elliptic_curve::{
    ops::Reduce,
    point::AffineCoordinates,
    sec1::{FromEncodedPoint, ToEncodedPoint},
    Curve, PrimeField,
};
use k256::{AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, Secp256k1};
use libpaillier::unknown_order::BigNumber;
use sha2::Sha256;

use crate::proofs::ProofError;

/// The name of the curve, absorbed into every session transcript.
pub const CURVE_NAME: &[u8] = b"Secp256k1";

const SECOND_GENERATOR_LABEL: &[u8] = b"gg20-sign second generator";

/// The order of the secp256k1 group, as a big integer.
pub fn curve_order() -> &'static BigNumber {
    static ORDER: OnceLock<BigNumber> = OnceLock::new();
    ORDER.get_or_init(|| BigNumber::from_slice((-Scalar::ONE).to_bytes()) + BigNumber::one())
}

/// Hash an arbitrary message with the digest paired with the curve.
pub fn message_digest(msg: &[u8]) -> [u8; 32] {
    let digest = <Secp256k1 as DigestPrimitive>::Digest::new_with_prefix(msg);
    let m_bytes: FieldBytes = digest.finalize_fixed();
    m_bytes.into()
}

pub fn x_coordinate(point: &AffinePoint) -> Scalar {
    <Scalar as Reduce<<Secp256k1 as Curve>::Uint>>::reduce_bytes(&point.x())
}

/// Interpret big endian bytes of any length as an integer, and reduce it mod q.
pub fn reduce_bytes(bytes: &[u8]) -> Scalar {
    bn_to_scalar(&BigNumber::from_slice(bytes))
}

pub fn scalar_to_bn(x: &Scalar) -> BigNumber {
    BigNumber::from_slice(x.to_bytes())
}

/// Reduce an integer modulo the curve order, producing a scalar.
pub fn bn_to_scalar(x: &BigNumber) -> Scalar {
    let reduced = x.nmod(curve_order());
    let bytes = reduced.to_bytes();
    let mut repr = FieldBytes::default();
    let skip = bytes.len().saturating_sub(repr.len());
    let start = repr.len() - (bytes.len() - skip);
    repr[start..].copy_from_slice(&bytes[skip..]);
    <Scalar as Reduce<<Secp256k1 as Curve>::Uint>>::reduce_bytes(&repr)
}

/// Encode a scalar as a minimal big endian integer.
pub fn scalar_to_bytes(x: &Scalar) -> Vec<u8> {
    scalar_to_bn(x).to_bytes()
}

/// Decode a scalar, rejecting anything that is not a canonical value below q.
pub fn scalar_from_bytes(bytes: &[u8]) -> Option<Scalar> {
    let mut repr = FieldBytes::default();
    if bytes.is_empty() || bytes.len() > repr.len() {
        return None;
    }
    let start = repr.len() - bytes.len();
    repr[start..].copy_from_slice(bytes);
    Option::from(Scalar::from_repr(repr))
}

/// Split a point into its affine coordinates, as fixed width big endian bytes.
pub fn point_to_coords(point: &ProjectivePoint) -> Result<(Vec<u8>, Vec<u8>), ProofError> {
    let encoded = point.to_affine().to_encoded_point(false);
    match (encoded.x(), encoded.y()) {
        (Some(x), Some(y)) => Ok((x.to_vec(), y.to_vec())),
        _ => Err(ProofError::IdentityPoint),
    }
}

/// Rebuild a point from affine coordinates, checking that it lies on the curve.
pub fn point_from_coords(x: &[u8], y: &[u8]) -> Option<ProjectivePoint> {
    let x = pad_field(x)?;
    let y = pad_field(y)?;
    let encoded = EncodedPoint::from_affine_coordinates(&x, &y, false);
    let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    point.map(ProjectivePoint::from)
}

fn pad_field(bytes: &[u8]) -> Option<FieldBytes> {
    let mut out = FieldBytes::default();
    if bytes.is_empty() || bytes.len() > out.len() {
        return None;
    }
    let start = out.len() - bytes.len();
    out[start..].copy_from_slice(bytes);
    Some(out)
}

/// The compressed encoding of a point, used when absorbing points into transcripts.
pub fn point_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// A second generator of the group, with no known discrete logarithm relative to G.
///
/// This is found by try-and-increment: hash a counter to an x coordinate until
/// it lands on the curve.
pub fn second_generator() -> ProjectivePoint {
    static H: OnceLock<ProjectivePoint> = OnceLock::new();
    *H.get_or_init(|| {
        let mut counter = 0u64;
        loop {
            let digest = Sha256::new()
                .chain_update(SECOND_GENERATOR_LABEL)
                .chain_update(counter.to_be_bytes())
                .finalize();
            let mut sec1 = [0u8; 33];
            sec1[0] = 0x02;
            sec1[1..].copy_from_slice(&digest);
            if let Ok(encoded) = EncodedPoint::from_bytes(sec1) {
                let point: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
                if let Some(point) = point {
                    return point.into();
                }
            }
            counter += 1;
        }
    })
}
