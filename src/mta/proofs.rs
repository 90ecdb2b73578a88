//! Bob's proofs that his response to Alice was computed honestly.
//!
//! Bob knows `x < q`, `y < q^5` and a nonce `r` with
//! `c2 = c1^x * Enc_N(y; r)`, where `c1` is Alice's ciphertext under her key `N`.
//! The commitments use Alice's parameters, since she's the verifier.
//! The variant with check also shows that `X = x * G`.
use k256::ProjectivePoint;
use libpaillier::unknown_order::BigNumber;
use magikitten::Transcript;
use rand_core::CryptoRngCore;

use crate::{
    compat::{bn_to_scalar, curve_order, point_bytes},
    math::{random_bn_in_z_star, random_positive_bn},
    paillier::EncryptionKey,
    proofs::{absorb, challenge_bn, q_pow, PartReader, PartWriter, PedersenParams, ProofError},
};

const STATEMENT_LABEL: &[u8] = b"mta bob proof statement";
const STATEMENT_WC_LABEL: &[u8] = b"mta bob proof with check statement";
const COMMITMENT_LABEL: &[u8] = b"mta bob proof commitment";
const CHALLENGE_LABEL: &[u8] = b"mta bob proof challenge";

pub const BOB_PARTS: usize = 10;
pub const BOB_WC_PARTS: usize = 12;

#[derive(Debug, Clone, Copy)]
pub struct Statement<'a> {
    /// Alice's key.
    pub ek: &'a EncryptionKey,
    pub c1: &'a BigNumber,
    pub c2: &'a BigNumber,
    /// Alice's parameters.
    pub params: &'a PedersenParams,
}

impl<'a> Statement<'a> {
    fn absorb(&self, transcript: &mut Transcript, check: Option<&ProjectivePoint>) {
        let [n_tilde, h1, h2] = self.params.to_bytes();
        let n = self.ek.n().to_bytes();
        let c1 = self.c1.to_bytes();
        let c2 = self.c2.to_bytes();
        let x = check.map(point_bytes);
        let mut parts: Vec<&[u8]> = vec![&n, &c1, &c2, &n_tilde, &h1, &h2];
        match &x {
            Some(x) => {
                parts.push(x);
                absorb(transcript, STATEMENT_WC_LABEL, &parts);
            }
            None => absorb(transcript, STATEMENT_LABEL, &parts),
        }
    }
}

pub struct Witness<'a> {
    pub x: &'a BigNumber,
    pub y: &'a BigNumber,
    pub nonce: &'a BigNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProofBob {
    z: BigNumber,
    z_prm: BigNumber,
    t: BigNumber,
    v: BigNumber,
    w: BigNumber,
    s: BigNumber,
    s1: BigNumber,
    s2: BigNumber,
    t1: BigNumber,
    t2: BigNumber,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProofBobWC {
    bob: ProofBob,
    u: ProjectivePoint,
}

impl ProofBob {
    /// The wire parts: z, z', t, v, w, s, s1, s2, t1, t2.
    pub fn to_parts(&self) -> Vec<Vec<u8>> {
        PartWriter::default()
            .bn(&self.z)
            .bn(&self.z_prm)
            .bn(&self.t)
            .bn(&self.v)
            .bn(&self.w)
            .bn(&self.s)
            .bn(&self.s1)
            .bn(&self.s2)
            .bn(&self.t1)
            .bn(&self.t2)
            .finish()
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, BOB_PARTS)?;
        Self::read(&mut reader)
    }

    fn read(reader: &mut PartReader<'_>) -> Result<Self, ProofError> {
        Ok(Self {
            z: reader.bn(),
            z_prm: reader.bn(),
            t: reader.bn(),
            v: reader.bn(),
            w: reader.bn(),
            s: reader.bn(),
            s1: reader.bn(),
            s2: reader.bn(),
            t1: reader.bn(),
            t2: reader.bn(),
        })
    }

    fn absorb_commitment(&self, transcript: &mut Transcript, u: Option<&ProjectivePoint>) {
        let z = self.z.to_bytes();
        let z_prm = self.z_prm.to_bytes();
        let t = self.t.to_bytes();
        let v = self.v.to_bytes();
        let w = self.w.to_bytes();
        let u = u.map(point_bytes);
        let mut parts: Vec<&[u8]> = vec![&z, &z_prm, &t, &v, &w];
        if let Some(u) = &u {
            parts.push(u);
        }
        absorb(transcript, COMMITMENT_LABEL, &parts);
    }
}

impl ProofBobWC {
    /// The wire parts: the ten parts of the plain proof, then u.x, u.y.
    pub fn to_parts(&self) -> Result<Vec<Vec<u8>>, ProofError> {
        let mut parts = self.bob.to_parts();
        parts.extend(PartWriter::default().point(&self.u)?.finish());
        Ok(parts)
    }

    pub fn from_parts(parts: &[Vec<u8>]) -> Result<Self, ProofError> {
        let mut reader = PartReader::new(parts, BOB_WC_PARTS)?;
        let bob = ProofBob::read(&mut reader)?;
        let u = reader.point()?;
        Ok(Self { bob, u })
    }
}

/// The randomness of a proof, before the challenge is known.
struct Commitment {
    proof: ProofBob,
    u: Option<ProjectivePoint>,
    alpha: BigNumber,
    beta: BigNumber,
    rho: BigNumber,
    rho_prm: BigNumber,
    sigma: BigNumber,
    tau: BigNumber,
    gamma: BigNumber,
}

fn commit(
    rng: &mut impl CryptoRngCore,
    statement: &Statement<'_>,
    witness: &Witness<'_>,
    check: bool,
) -> Result<Commitment, ProofError> {
    let q = curve_order();
    let q3 = q_pow(3);
    let q7 = q_pow(7);
    let n = statement.ek.n();
    let nn = statement.ek.nn();
    let params = statement.params;
    let n_tilde = &params.n_tilde;

    let alpha = random_positive_bn(rng, &q3);
    let rho = random_positive_bn(rng, &(q * n_tilde));
    let sigma = random_positive_bn(rng, &(q * n_tilde));
    let tau = random_positive_bn(rng, &(&q3 * n_tilde));
    let rho_prm = random_positive_bn(rng, &(&q3 * n_tilde));
    let beta = random_bn_in_z_star(rng, n).ok_or(ProofError::Sampling)?;
    let gamma = random_positive_bn(rng, &q7);

    let u = check.then(|| ProjectivePoint::GENERATOR * bn_to_scalar(&alpha));
    let v = statement
        .c1
        .modpow(&alpha, nn)
        .modmul(&statement.ek.gamma().modpow(&gamma, nn), nn)
        .modmul(&beta.modpow(n, nn), nn);

    let proof = ProofBob {
        z: params.commit(witness.x, &rho),
        z_prm: params.commit(&alpha, &rho_prm),
        t: params.commit(witness.y, &sigma),
        v,
        w: params.commit(&gamma, &tau),
        s: BigNumber::zero(),
        s1: BigNumber::zero(),
        s2: BigNumber::zero(),
        t1: BigNumber::zero(),
        t2: BigNumber::zero(),
    };
    Ok(Commitment {
        proof,
        u,
        alpha,
        beta,
        rho,
        rho_prm,
        sigma,
        tau,
        gamma,
    })
}

impl Commitment {
    fn respond(self, e: &BigNumber, statement: &Statement<'_>, witness: &Witness<'_>) -> ProofBob {
        let n = statement.ek.n();
        ProofBob {
            s: witness.nonce.modpow(e, n).modmul(&self.beta, n),
            s1: e * witness.x + &self.alpha,
            s2: e * &self.rho + &self.rho_prm,
            t1: e * witness.y + &self.gamma,
            t2: e * &self.sigma + &self.tau,
            ..self.proof
        }
    }
}

pub fn prove(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    witness: Witness<'_>,
) -> Result<ProofBob, ProofError> {
    statement.absorb(transcript, None);
    let commitment = commit(rng, &statement, &witness, false)?;
    commitment.proof.absorb_commitment(transcript, None);
    let e = challenge_bn(transcript, CHALLENGE_LABEL);
    Ok(commitment.respond(&e, &statement, &witness))
}

pub fn prove_wc(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    statement: Statement<'_>,
    public: &ProjectivePoint,
    witness: Witness<'_>,
) -> Result<ProofBobWC, ProofError> {
    statement.absorb(transcript, Some(public));
    let commitment = commit(rng, &statement, &witness, true)?;
    let u = commitment.u.ok_or(ProofError::Sampling)?;
    commitment.proof.absorb_commitment(transcript, Some(&u));
    let e = challenge_bn(transcript, CHALLENGE_LABEL);
    Ok(ProofBobWC {
        bob: commitment.respond(&e, &statement, &witness),
        u,
    })
}

/// The checks shared by both variants, once the challenge is known.
fn check_bob(statement: &Statement<'_>, proof: &ProofBob, e: &BigNumber) -> bool {
    if proof.s1 > q_pow(3) || proof.t1 > q_pow(7) {
        return false;
    }

    let params = statement.params;
    let n_tilde = &params.n_tilde;
    let n = statement.ek.n();
    let nn = statement.ek.nn();

    // h1^s1 h2^s2 = z' z^e
    let lhs = params.commit(&proof.s1, &proof.s2);
    let rhs = proof.z_prm.modmul(&proof.z.modpow(e, n_tilde), n_tilde);
    if lhs != rhs {
        return false;
    }

    // c1^s1 Gamma^t1 s^N = v c2^e
    let lhs = statement
        .c1
        .modpow(&proof.s1, nn)
        .modmul(&statement.ek.gamma().modpow(&proof.t1, nn), nn)
        .modmul(&proof.s.modpow(n, nn), nn);
    let rhs = proof.v.modmul(&statement.c2.modpow(e, nn), nn);
    if lhs != rhs {
        return false;
    }

    // h1^t1 h2^t2 = w t^e
    let lhs = params.commit(&proof.t1, &proof.t2);
    let rhs = proof.w.modmul(&proof.t.modpow(e, n_tilde), n_tilde);
    lhs == rhs
}

#[must_use]
pub fn verify(transcript: &mut Transcript, statement: Statement<'_>, proof: &ProofBob) -> bool {
    statement.absorb(transcript, None);
    proof.absorb_commitment(transcript, None);
    let e = challenge_bn(transcript, CHALLENGE_LABEL);
    check_bob(&statement, proof, &e)
}

#[must_use]
pub fn verify_wc(
    transcript: &mut Transcript,
    statement: Statement<'_>,
    public: &ProjectivePoint,
    proof: &ProofBobWC,
) -> bool {
    statement.absorb(transcript, Some(public));
    proof.bob.absorb_commitment(transcript, Some(&proof.u));
    let e = challenge_bn(transcript, CHALLENGE_LABEL);

    // s1 G = u + e X
    let lhs = ProjectivePoint::GENERATOR * bn_to_scalar(&proof.bob.s1);
    if lhs != proof.u + *public * bn_to_scalar(&e) {
        return false;
    }
    check_bob(&statement, &proof.bob, &e)
}
