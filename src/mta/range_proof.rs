//! Alice's range proof: the plaintext of her ciphertext is small.
//!
//! Statement `(c, N, NTilde, h1, h2)` where the prover knows `m < q` and `r`
//! with `c = Enc_N(m; r)`. The verifier's parameters are used for the commitments.
use libpaillier::unknown_order::BigNumber;
use magikitten::Transcript;
use rand_core::CryptoRngCore;

use crate::{
    compat::curve_order,
    math::{modpow_inverse, random_bn_in_z_star, random_positive_bn},
    paillier::EncryptionKey,
    proofs::{absorb, challenge_bn, q_pow, PartReader, PartWriter, PedersenParams, ProofError},
};

const STATEMENT_LABEL: &[u8] = b"mta alice range proof statement";
const COMMITMENT_LABEL: &[u8] = b"mta alice range proof commitment";
const CHALLENGE_LABEL: &[u8] = b"mta alice range proof challenge";

pub const PARTS: usize = 6;

#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    pub ciphertext: &'a BigNumber,
    pub ek: &'a EncryptionKey,
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
                &n_tilde,
                &h1,
                &h2,
            ],
        );
    }
}

pub struct Witness<'a> {
    pub m: &'a BigNumber,
    pub nonce: &'a BigNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeProofAlice {
    z: BigNumber,
    u: BigNumber,
    w: BigNumber,
    s: BigNumber,
    s1: BigNumber,
    s2: BigNumber,
}

impl RangeProofAlice {
    /// The wire parts: z, u, w, s, s1, s2.
    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        PartWriter::default()
            .bn(&self.z)
            .bn(&self.u)
            .bn(&self.w)
            .bn(&self.s)
            .bn(&self.s1)
            .bn(&self.s2)
            .finish()
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, PARTS)?;
        Ok(Self {
            z: reader.bn(),
            u: reader.bn(),
            w: reader.bn(),
            s: reader.bn(),
            s1: reader.bn(),
            s2: reader.bn(),
        })
    }
}

fn absorb_commitment(transcript: &mut Transcript, z: &BigNumber, u: &BigNumber, w: &BigNumber) {
    absorb(
        transcript,
        COMMITMENT_LABEL,
        &[&z.to_bytes(), &u.to_bytes(), &w.to_bytes()],
    );
}

pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Result<RangeProofAlice, ProofError> {
    statement.absorb(transcript);

    let q = curve_order();
    let q3 = q_pow(3);
    let n = statement.ek.n();
    let nn = statement.ek.nn();
    let n_tilde = &statement.params.n_tilde;

    let alpha = random_positive_bn(rng, &q3);
    let beta = random_bn_in_z_star(rng, n).ok_or(ProofError::Sampling)?;
    let gamma = random_positive_bn(rng, &(&q3 * n_tilde));
    let rho = random_positive_bn(rng, &(q * n_tilde));

    let z = statement.params.commit(witness.m, &rho);
    let u = statement
        .ek
        .gamma()
        .modpow(&alpha, nn)
        .modmul(&beta.modpow(n, nn), nn);
    let w = statement.params.commit(&alpha, &gamma);
    absorb_commitment(transcript, &z, &u, &w);

    let e = challenge_bn(transcript, CHALLENGE_LABEL);

    Ok(RangeProofAlice {
        z,
        u,
        w,
        s: witness.nonce.modpow(&e, n).modmul(&beta, n),
        s1: &e * witness.m + &alpha,
        s2: &e * &rho + &gamma,
    })
}

#[must_use]
pub fn verify(
    transcript: &mut Transcript,
    statement: Statement<'_>,
    proof: &RangeProofAlice,
) -> bool {
    statement.absorb(transcript);
    absorb_commitment(transcript, &proof.z, &proof.u, &proof.w);

    let e = challenge_bn(transcript, CHALLENGE_LABEL);

    if proof.s1 > q_pow(3) {
        return false;
    }

    let n = statement.ek.n();
    let nn = statement.ek.nn();
    let n_tilde = &statement.params.n_tilde;

    let c_inv = match modpow_inverse(statement.ciphertext, &e, nn) {
        Some(x) => x,
        None => return false,
    };
    let u = statement
        .ek
        .gamma()
        .modpow(&proof.s1, nn)
        .modmul(&proof.s.modpow(n, nn), nn)
        .modmul(&c_inv, nn);
    if u != proof.u {
        return false;
    }

    let z_inv = match modpow_inverse(&proof.z, &e, n_tilde) {
        Some(x) => x,
        None => return false,
    };
    let w = statement
        .params
        .commit(&proof.s1, &proof.s2)
        .modmul(&z_inv, n_tilde);
    w == proof.w
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::test::fixtures;

    #[test]
    fn test_range_proof() -> Result<(), ProofError> {
        let dk = fixtures::paillier_key(0);
        let ek = dk.encryption_key();
        let params = fixtures::pedersen_params(1);
        let transcript = Transcript::new(b"protocol");

        let m = BigNumber::from(123_456_789u64);
        let (c, nonce) = ek.encrypt(&mut OsRng, &m)?;
        let statement = Statement {
            ciphertext: &c,
            ek,
            params: &params,
        };
        let proof = prove(
            &mut OsRng,
            &mut transcript.forked(b"party", &[1]),
            statement,
            Witness {
                m: &m,
                nonce: &nonce,
            },
        )?;
        let decoded = RangeProofAlice::from_parts(&proof.to_parts())?;
        assert!(verify(&mut transcript.forked(b"party", &[1]), statement, &decoded));

        // The same proof doesn't carry over to another ciphertext.
        let (other, _) = ek.encrypt(&mut OsRng, &m)?;
        assert!(!verify(
            &mut transcript.forked(b"party", &[1]),
            Statement {
                ciphertext: &other,
                ..statement
            },
            &decoded
        ));
        Ok(())
    }

    #[test]
    fn test_out_of_range_plaintext_rejected() -> Result<(), ProofError> {
        let dk = fixtures::paillier_key(0);
        let ek = dk.encryption_key();
        let params = fixtures::pedersen_params(1);
        let transcript = Transcript::new(b"protocol");

        // Far beyond q^3, so s1 can't land in range.
        let m = q_pow(4);
        let (c, nonce) = ek.encrypt(&mut OsRng, &m)?;
        let statement = Statement {
            ciphertext: &c,
            ek,
            params: &params,
        };
        let proof = prove(
            &mut OsRng,
            &mut transcript.forked(b"party", &[1]),
            statement,
            Witness {
                m: &m,
                nonce: &nonce,
            },
        )?;
        assert!(!verify(&mut transcript.forked(b"party", &[1]), statement, &proof));
        Ok(())
    }
}
