use elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use magikitten::Transcript;
use rand_core::CryptoRngCore;

use super::{absorb, challenge, PartReader, PartWriter, ProofError};
use crate::compat::point_bytes;

/// The label we use for hashing the statement.
const STATEMENT_LABEL: &[u8] = b"dlog proof statement";
/// The label we use for hashing the first prover message.
const COMMITMENT_LABEL: &[u8] = b"dlog proof commitment";
/// The label we use for generating the challenge.
const CHALLENGE_LABEL: &[u8] = b"dlog proof challenge";

/// The number of byte strings in an encoded proof.
pub const PARTS: usize = 3;

/// The public statement for this proof.
///
/// This statement claims knowledge of the discrete logarithm of some point.
#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub public: &'a ProjectivePoint,
}

impl<'a> Statement<'a> {
    /// Calculate the homomorphism we want to prove things about.
    fn phi(&self, x: &Scalar) -> ProjectivePoint {
        ProjectivePoint::GENERATOR * x
    }

    fn absorb(&self, transcript: &mut Transcript) {
        absorb(
            transcript,
            STATEMENT_LABEL,
            &[
                &point_bytes(&ProjectivePoint::GENERATOR),
                &point_bytes(self.public),
            ],
        );
    }
}

/// The private witness for this proof.
///
/// This holds the scalar the prover needs to know.
#[derive(Clone, Copy)]
pub struct Witness<'a> {
    pub x: &'a Scalar,
}

/// Represents a proof of the statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    alpha: ProjectivePoint,
    t: Scalar,
}

impl Proof {
    /// The wire parts: alpha.x, alpha.y, t.
    pub fn to_parts(&self) -> Result<Vec<Vec<u8>>, ProofError> {
        Ok(PartWriter::default()
            .point(&self.alpha)?
            .scalar(&self.t)
            .finish())
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, PARTS)?;
        Ok(Self {
            alpha: reader.point()?,
            t: reader.scalar()?,
        })
    }
}

/// Prove that a witness satisfies a given statement.
///
/// We need some randomness for the proof, and also a transcript, which is
/// used for the Fiat-Shamir transform.
pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Proof {
    statement.absorb(transcript);

    let r = Scalar::random(rng);
    let alpha = statement.phi(&r);

    transcript.message(COMMITMENT_LABEL, &point_bytes(&alpha));

    let c = challenge(transcript, CHALLENGE_LABEL);

    let t = r + c * witness.x;
    Proof { alpha, t }
}

/// Verify that a proof attesting to the validity of some statement.
///
/// We use a transcript in order to verify the Fiat-Shamir transformation.
#[must_use]
pub fn verify(transcript: &mut Transcript, statement: Statement<'_>, proof: &Proof) -> bool {
    statement.absorb(transcript);
    transcript.message(COMMITMENT_LABEL, &point_bytes(&proof.alpha));

    let c = challenge(transcript, CHALLENGE_LABEL);

    statement.phi(&proof.t) == proof.alpha + *statement.public * c
}
