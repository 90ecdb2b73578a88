//! Zero-knowledge proofs over the curve and over Paillier / Pedersen groups.
//!
//! Every proof is made non-interactive with a [`Transcript`], which the
//! caller forks with the session id and the identities of prover and verifier.
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use magikitten::Transcript;
use thiserror::Error;

use rand_core::CryptoRngCore;

use crate::{
    compat::{
        curve_order, point_from_coords, point_to_coords, scalar_from_bytes, scalar_to_bn,
        scalar_to_bytes,
    },
    math::random_bn_in_z_star,
};
use elliptic_curve::Field;

pub mod dlog;
pub mod pdl_slack;
pub mod stproof;
pub mod tproof;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("expected {expected} parts, found {found}")]
    WrongPartCount { expected: usize, found: usize },
    #[error("part {0} is empty")]
    EmptyPart(usize),
    #[error("part {0} is not a valid scalar")]
    InvalidScalar(usize),
    #[error("parts {0} and {} are not a valid point", .0 + 1)]
    InvalidPoint(usize),
    #[error("the identity point has no affine encoding")]
    IdentityPoint,
    #[error("failed to sample randomness")]
    Sampling,
    #[error("proof did not verify")]
    Rejected,
    #[error("{0}")]
    Paillier(#[from] crate::paillier::PaillierError),
}

/// The auxiliary parameters for commitments over an RSA modulus.
///
/// `n_tilde` is a product of two safe primes, and `h1`, `h2` generate the
/// same subgroup of quadratic residues, with neither discrete log known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PedersenParams {
    pub n_tilde: BigNumber,
    pub h1: BigNumber,
    pub h2: BigNumber,
}

impl PedersenParams {
    /// Build parameters from two safe primes `p = 2p' + 1` and `q = 2q' + 1`.
    pub fn from_safe_primes(
        rng: &mut impl CryptoRngCore,
        p: &BigNumber,
        q: &BigNumber,
    ) -> Option<Self> {
        let n_tilde = p * q;
        let two = BigNumber::from(2u64);
        let order = ((p - BigNumber::one()) / &two) * ((q - BigNumber::one()) / &two);

        let f = random_bn_in_z_star(rng, &n_tilde)?;
        let h1 = f.modmul(&f, &n_tilde);
        let alpha = random_bn_in_z_star(rng, &order)?;
        let h2 = h1.modpow(&alpha, &n_tilde);
        Some(Self { n_tilde, h1, h2 })
    }

    /// Compute `h1^x * h2^r mod n_tilde`.
    pub(crate) fn commit(&self, x: &BigNumber, r: &BigNumber) -> BigNumber {
        self.h1
            .modpow(x, &self.n_tilde)
            .modmul(&self.h2.modpow(r, &self.n_tilde), &self.n_tilde)
    }

    pub(crate) fn to_bytes(&self) -> [Vec<u8>; 3] {
        [self.n_tilde.to_bytes(), self.h1.to_bytes(), self.h2.to_bytes()]
    }
}

/// The curve order raised to some power, used for range bounds.
pub(crate) fn q_pow(k: u32) -> BigNumber {
    let q = curve_order();
    (1..k).fold(q.clone(), |acc, _| &acc * q)
}

/// Absorb a list of byte strings into a transcript, framing each by its length.
pub(crate) fn absorb(transcript: &mut Transcript, label: &'static [u8], parts: &[&[u8]]) {
    let mut framed = Vec::with_capacity(parts.iter().map(|p| p.len() + 8).sum());
    for part in parts {
        framed.extend_from_slice(&(part.len() as u64).to_le_bytes());
        framed.extend_from_slice(part);
    }
    transcript.message(label, &framed);
}

/// Draw a challenge scalar from a transcript.
pub(crate) fn challenge(transcript: &mut Transcript, label: &'static [u8]) -> Scalar {
    Scalar::random(&mut transcript.challenge(label))
}

/// Draw a challenge in [0, q) as a big integer, for proofs over Paillier groups.
pub(crate) fn challenge_bn(transcript: &mut Transcript, label: &'static [u8]) -> BigNumber {
    scalar_to_bn(&challenge(transcript, label))
}

/// Reads the parts of a proof one after another, checking their encoding.
pub(crate) struct PartReader<'a> {
    parts: &'a [Vec<u8>],
    at: usize,
}

impl<'a> PartReader<'a> {
    /// Start reading, after checking the exact number of parts.
    pub fn new(parts: &'a [Vec<u8>], expected: usize) -> Result<Self, ProofError> {
        if parts.len() != expected {
            return Err(ProofError::WrongPartCount {
                expected,
                found: parts.len(),
            });
        }
        if let Some(i) = parts.iter().position(|p| p.is_empty()) {
            return Err(ProofError::EmptyPart(i));
        }
        Ok(Self { parts, at: 0 })
    }

    fn next(&mut self) -> &'a [u8] {
        let out = &self.parts[self.at];
        self.at += 1;
        out
    }

    pub fn bn(&mut self) -> BigNumber {
        BigNumber::from_slice(self.next())
    }

    pub fn scalar(&mut self) -> Result<Scalar, ProofError> {
        let at = self.at;
        scalar_from_bytes(self.next()).ok_or(ProofError::InvalidScalar(at))
    }

    pub fn point(&mut self) -> Result<ProjectivePoint, ProofError> {
        let at = self.at;
        let x = self.next();
        let y = self.next();
        point_from_coords(x, y).ok_or(ProofError::InvalidPoint(at))
    }
}

/// Accumulates the parts of a proof for the wire.
#[derive(Default)]
pub(crate) struct PartWriter {
    parts: Vec<Vec<u8>>,
}

impl PartWriter {
    pub fn bn(mut self, x: &BigNumber) -> Self {
        self.parts.push(x.to_bytes());
        self
    }

    pub fn scalar(mut self, x: &Scalar) -> Self {
        self.parts.push(scalar_to_bytes(x));
        self
    }

    pub fn point(mut self, p: &ProjectivePoint) -> Result<Self, ProofError> {
        let (x, y) = point_to_coords(p)?;
        self.parts.push(x);
        self.parts.push(y);
        Ok(self)
    }

    pub fn finish(self) -> Vec<Vec<u8>> {
        self.parts
    }
}
