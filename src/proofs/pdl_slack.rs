//! Proof that a point is a multiple of a base by a Paillier-encrypted value.
//!
//! The statement is `(c, N, R, Rbar, NTilde, h1, h2)`: the prover knows `x`
//! and the nonce `r` with `c = Enc_N(x; r)` and `Rbar = x * R`. The range of
//! `x` is only proven up to a slack factor, hence the name.
use k256::ProjectivePoint;
use libpaillier::unknown_order::BigNumber;
use magikitten::Transcript;
use rand_core::CryptoRngCore;

use super::{absorb, challenge_bn, q_pow, PartReader, PartWriter, PedersenParams, ProofError};
use crate::{
    compat::{bn_to_scalar, curve_order, point_bytes},
    math::{modpow_inverse, random_bn_in_z_star, random_positive_bn},
    paillier::EncryptionKey,
};

const STATEMENT_LABEL: &[u8] = b"pdl with slack statement";
const COMMITMENT_LABEL: &[u8] = b"pdl with slack commitment";
const CHALLENGE_LABEL: &[u8] = b"pdl with slack challenge";

pub const PARTS: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub ciphertext: &'a BigNumber,
    pub ek: &'a EncryptionKey,
    pub base: &'a ProjectivePoint,
    pub public: &'a ProjectivePoint,
    /// The verifier's parameters.
    pub params: &'a PedersenParams,
}

impl<'a> Statement<'a> {
    fn absorb(&self, transcript: &mut Transcript) {
        let [n_tilde, h1, h2] = self.params.to_bytes();
        absorb(
            transcript,
            STATEMENT_LABEL,
            &[
                &self.ciphertext.to_bytes(),
                &self.ek.n().to_bytes(),
                &point_bytes(self.base),
                &point_bytes(self.public),
                &n_tilde,
                &h1,
                &h2,
            ],
        );
    }
}

pub struct Witness<'a> {
    pub x: &'a BigNumber,
    pub nonce: &'a BigNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Proof {
    z: BigNumber,
    u1: ProjectivePoint,
    u2: BigNumber,
    u3: BigNumber,
    s1: BigNumber,
    s2: BigNumber,
    s3: BigNumber,
}

impl Proof {
    /// The wire parts: z, u1.x, u1.y, u2, u3, s1, s2, s3.
    pub fn to_parts(&self) -> Result<Vec<Vec<u8>>, ProofError> {
        Ok(PartWriter::default()
            .bn(&self.z)
            .point(&self.u1)?
            .bn(&self.u2)
            .bn(&self.u3)
            .bn(&self.s1)
            .bn(&self.s2)
            .bn(&self.s3)
            .finish())
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, PARTS)?;
        Ok(Self {
            z: reader.bn(),
            u1: reader.point()?,
            u2: reader.bn(),
            u3: reader.bn(),
            s1: reader.bn(),
            s2: reader.bn(),
            s3: reader.bn(),
        })
    }
}

fn absorb_commitment(
    transcript: &mut Transcript,
    z: &BigNumber,
    u1: &ProjectivePoint,
    u2: &BigNumber,
    u3: &BigNumber,
) {
    absorb(
        transcript,
        COMMITMENT_LABEL,
        &[&z.to_bytes(), &point_bytes(u1), &u2.to_bytes(), &u3.to_bytes()],
    );
}

pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Result<Proof, ProofError> {
    statement.absorb(transcript);

    let q = curve_order();
    let q3 = q_pow(3);
    let n = statement.ek.n();
    let nn = statement.ek.nn();
    let n_tilde = &statement.params.n_tilde;

    let alpha = random_positive_bn(rng, &q3);
    let beta = random_bn_in_z_star(rng, n).ok_or(ProofError::Sampling)?;
    let rho = random_positive_bn(rng, &(q * n_tilde));
    let gamma = random_positive_bn(rng, &(&q3 * n_tilde));

    let z = statement.params.commit(witness.x, &rho);
    let u1 = *statement.base * bn_to_scalar(&alpha);
    let u2 = statement
        .ek
        .gamma()
        .modpow(&alpha, nn)
        .modmul(&beta.modpow(n, nn), nn);
    let u3 = statement.params.commit(&alpha, &gamma);
    absorb_commitment(transcript, &z, &u1, &u2, &u3);

    let e = challenge_bn(transcript, CHALLENGE_LABEL);

    let s1 = &e * witness.x + &alpha;
    let s2 = witness.nonce.modpow(&e, n).modmul(&beta, n);
    let s3 = &e * &rho + &gamma;

    Ok(Proof {
        z,
        u1,
        u2,
        u3,
        s1,
        s2,
        s3,
    })
}

#[must_use]
pub fn verify(transcript: &mut Transcript, statement: Statement<'_>, proof: &Proof) -> bool {
    statement.absorb(transcript);
    absorb_commitment(transcript, &proof.z, &proof.u1, &proof.u2, &proof.u3);

    let e = challenge_bn(transcript, CHALLENGE_LABEL);

    // An honest s1 is below q^3 + q^2.
    if proof.s1 >= q_pow(3) * BigNumber::from(2u64) {
        return false;
    }

    let n = statement.ek.n();
    let nn = statement.ek.nn();
    let n_tilde = &statement.params.n_tilde;

    let u1 = *statement.base * bn_to_scalar(&proof.s1) - *statement.public * bn_to_scalar(&e);
    if u1 != proof.u1 {
        return false;
    }

    let c_inv = match modpow_inverse(statement.ciphertext, &e, nn) {
        Some(x) => x,
        None => return false,
    };
    let u2 = statement
        .ek
        .gamma()
        .modpow(&proof.s1, nn)
        .modmul(&proof.s2.modpow(n, nn), nn)
        .modmul(&c_inv, nn);
    if u2 != proof.u2 {
        return false;
    }

    let z_inv = match modpow_inverse(&proof.z, &e, n_tilde) {
        Some(x) => x,
        None => return false,
    };
    let u3 = statement.params.commit(&proof.s1, &proof.s3).modmul(&z_inv, n_tilde);
    u3 == proof.u3
}

#[cfg(test)]
mod test {
    use elliptic_curve::Field;
    use k256::Scalar;
    use rand_core::OsRng;

    use super::*;
    use crate::{compat::scalar_to_bn, test::fixtures};

    #[test]
    fn test_valid_proof_verifies() -> Result<(), ProofError> {
        let dk = fixtures::paillier_key(0);
        let ek = dk.encryption_key();
        let params = fixtures::pedersen_params(1);

        let x = Scalar::random(&mut OsRng);
        let x_bn = scalar_to_bn(&x);
        let (c, nonce) = ek.encrypt(&mut OsRng, &x_bn)?;
        let base = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let public = base * x;

        let statement = Statement {
            ciphertext: &c,
            ek,
            base: &base,
            public: &public,
            params: &params,
        };
        let transcript = Transcript::new(b"protocol");
        let proof = prove(
            &mut OsRng,
            &mut transcript.forked(b"party", &[1]),
            statement,
            Witness {
                x: &x_bn,
                nonce: &nonce,
            },
        )?;

        let decoded = Proof::from_parts(&proof.to_parts()?)?;
        assert!(verify(&mut transcript.forked(b"party", &[1]), statement, &decoded));

        let wrong = public + ProjectivePoint::GENERATOR;
        assert!(!verify(
            &mut transcript.forked(b"party", &[1]),
            Statement {
                public: &wrong,
                ..statement
            },
            &decoded
        ));
        Ok(())
    }
}
