//! Proof that `S = sigma * R` uses the same `sigma` committed to in `T = sigma * G + l * H`.
use elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use magikitten::Transcript;
use rand_core::CryptoRngCore;

use super::{absorb, challenge, PartReader, PartWriter, ProofError};
use crate::compat::{point_bytes, second_generator};

/// The label we use for hashing the statement.
const STATEMENT_LABEL: &[u8] = b"stproof statement";
/// The label we use for hashing the first prover message.
const COMMITMENT_LABEL: &[u8] = b"stproof commitment";
/// The label we use for generating the challenge.
const CHALLENGE_LABEL: &[u8] = b"stproof challenge";

pub const PARTS: usize = 6;

/// The public statement for this proof.
///
/// `r` plays the role of an alternate generator for the first relation.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub r: &'a ProjectivePoint,
    pub s: &'a ProjectivePoint,
    pub t: &'a ProjectivePoint,
}

impl<'a> Statement<'a> {
    /// Calculate the homomorphism we want to prove things about.
    fn phi(&self, a: &Scalar, b: &Scalar) -> (ProjectivePoint, ProjectivePoint) {
        (
            *self.r * a,
            ProjectivePoint::GENERATOR * a + second_generator() * b,
        )
    }

    fn absorb(&self, transcript: &mut Transcript) {
        absorb(
            transcript,
            STATEMENT_LABEL,
            &[
                &point_bytes(&ProjectivePoint::GENERATOR),
                &point_bytes(&second_generator()),
                &point_bytes(self.r),
                &point_bytes(self.s),
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
    beta: ProjectivePoint,
    t: Scalar,
    u: Scalar,
}

impl Proof {
    /// The wire parts: alpha.x, alpha.y, beta.x, beta.y, t, u.
    pub fn to_parts(&self) -> Result<Vec<Vec<u8>>, ProofError> {
        Ok(PartWriter::default()
            .point(&self.alpha)?
            .point(&self.beta)?
            .scalar(&self.t)
            .scalar(&self.u)
            .finish())
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, PARTS)?;
        Ok(Self {
            alpha: reader.point()?,
            beta: reader.point()?,
            t: reader.scalar()?,
            u: reader.scalar()?,
        })
    }
}

fn absorb_commitment(transcript: &mut Transcript, alpha: &ProjectivePoint, beta: &ProjectivePoint) {
    absorb(
        transcript,
        COMMITMENT_LABEL,
        &[&point_bytes(alpha), &point_bytes(beta)],
    );
}

/// Prove that a witness satisfies a given statement.
pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Proof {
    statement.absorb(transcript);

    let a = Scalar::random(&mut *rng);
    let b = Scalar::random(&mut *rng);
    let (alpha, beta) = statement.phi(&a, &b);
    absorb_commitment(transcript, &alpha, &beta);

    let c = challenge(transcript, CHALLENGE_LABEL);

    Proof {
        alpha,
        beta,
        t: a + c * witness.sigma,
        u: b + c * witness.l,
    }
}

/// Verify that a proof attesting to the validity of some statement.
#[must_use]
pub fn verify(transcript: &mut Transcript, statement: Statement<'_>, proof: &Proof) -> bool {
    statement.absorb(transcript);
    absorb_commitment(transcript, &proof.alpha, &proof.beta);

    let c = challenge(transcript, CHALLENGE_LABEL);

    let (phi0, phi1) = statement.phi(&proof.t, &proof.u);
    phi0 == proof.alpha + *statement.s * c && phi1 == proof.beta + *statement.t * c
}
