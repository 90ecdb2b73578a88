//! Proof of knowledge of an opening of `T = sigma * G + l * H`.
use elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use magikitten::Transcript;
use rand_core::CryptoRngCore;

use super::{absorb, challenge, PartReader, PartWriter, ProofError};
use crate::compat::{point_bytes, second_generator};

const STATEMENT_LABEL: &[u8] = b"tproof statement";
const COMMITMENT_LABEL: &[u8] = b"tproof commitment";
const CHALLENGE_LABEL: &[u8] = b"tproof challenge";

pub const PARTS: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub t: &'a ProjectivePoint,
}

impl<'a> Statement<'a> {
    fn phi(&self, a: &Scalar, b: &Scalar) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * a + second_generator() * b
    }

    fn absorb(&self, transcript: &mut Transcript) {
        absorb(
            transcript,
            STATEMENT_LABEL,
            &[
                &point_bytes(&ProjectivePoint::GENERATOR),
                &point_bytes(&second_generator()),
                &point_bytes(self.t),
            ],
        );
    }
}

#[derive(Clone, Copy)]
pub struct Witness<'a> {
    pub sigma: &'a Scalar,
    pub l: &'a Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    alpha: ProjectivePoint,
    t: Scalar,
    u: Scalar,
}

impl Proof {
    /// The wire parts: alpha.x, alpha.y, t, u.
    pub fn to_parts(&self) -> Result<Vec<Vec<u8>>, ProofError> {
        Ok(PartWriter::default()
            .point(&self.alpha)?
            .scalar(&self.t)
            .scalar(&self.u)
            .finish())
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, PARTS)?;
        Ok(Self {
            alpha: reader.point()?,
            t: reader.scalar()?,
            u: reader.scalar()?,
        })
    }
}

pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Proof {
    statement.absorb(transcript);

    let a = Scalar::random(&mut *rng);
    let b = Scalar::random(&mut *rng);
    let alpha = statement.phi(&a, &b);
    transcript.message(COMMITMENT_LABEL, &point_bytes(&alpha));

    let c = challenge(transcript, CHALLENGE_LABEL);

    Proof {
        alpha,
        t: a + c * witness.sigma,
        u: b + c * witness.l,
    }
}

#[must_use]
pub fn verify(transcript: &mut Transcript, statement: Statement<'_>, proof: &Proof) -> bool {
    statement.absorb(transcript);
    transcript.message(COMMITMENT_LABEL, &point_bytes(&proof.alpha));

    let c = challenge(transcript, CHALLENGE_LABEL);

    statement.phi(&proof.t, &proof.u) == proof.alpha + *statement.t * c
}
