//! Multiplicative to additive share conversion over Paillier.
//!
//! Alice holds `a`, Bob holds `b`, and they end up with `alpha + beta = a * b mod q`.
//!
//! 1. Alice encrypts `a` under her own key, proving it's small
//!    ([`alice_init`], [`AliceInit::prove`]).
//! 2. Bob checks that proof ([`verify_alice`]) and responds with
//!    `c_A^b * Enc_A(beta')`, keeping `beta = -beta' mod q` ([`bob_mid`]).
//! 3. Alice checks Bob's proof and decrypts `alpha` ([`alice_end`]).
//!
//! The `_wc` variants additionally bind `b` to a public point `B = b * G`.
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use magikitten::Transcript;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use crate::{
    compat::{bn_to_scalar, scalar_to_bn},
    math::random_positive_bn,
    paillier::{DecryptionKey, EncryptionKey},
    proofs::{q_pow, PedersenParams, ProofError},
};

pub mod proofs;
pub mod range_proof;

pub use proofs::{ProofBob, ProofBobWC};
pub use range_proof::RangeProofAlice;

/// Alice's encryption of her secret, along with the nonce used.
pub struct AliceInit {
    pub ciphertext: BigNumber,
    pub nonce: Zeroizing<BigNumber>,
}

/// Encrypt Alice's secret under her own key.
pub fn alice_init(
    rng: &mut impl CryptoRngCore,
    ek: &EncryptionKey,
    a: &Scalar,
) -> Result<AliceInit, ProofError> {
    let a = Zeroizing::new(scalar_to_bn(a));
    let (ciphertext, nonce) = ek.encrypt(rng, &a)?;
    Ok(AliceInit {
        ciphertext,
        nonce: Zeroizing::new(nonce),
    })
}

impl AliceInit {
    /// Prove to one Bob that the ciphertext holds a small value, using his parameters.
    pub fn prove(
        &self,
        rng: &mut impl CryptoRngCore,
        transcript: &mut Transcript,
        ek: &EncryptionKey,
        a: &Scalar,
        verifier: &PedersenParams,
    ) -> Result<RangeProofAlice, ProofError> {
        let a = Zeroizing::new(scalar_to_bn(a));
        range_proof::prove(
            rng,
            transcript,
            range_proof::Statement {
                ciphertext: &self.ciphertext,
                ek,
                params: verifier,
            },
            range_proof::Witness {
                m: &a,
                nonce: &self.nonce,
            },
        )
    }
}

/// A ciphertext from Alice whose range proof has been checked.
///
/// Bob can only respond to ciphertexts of this type.
#[derive(Debug, Clone)]
pub struct VerifiedCiphertext(BigNumber);

impl VerifiedCiphertext {
    pub fn ciphertext(&self) -> &BigNumber {
        &self.0
    }
}

/// Check Alice's range proof, made against our own parameters.
pub fn verify_alice(
    transcript: &mut Transcript,
    alice_ek: &EncryptionKey,
    ciphertext: &BigNumber,
    proof: &RangeProofAlice,
    params: &PedersenParams,
) -> Option<VerifiedCiphertext> {
    if !alice_ek.is_ciphertext(ciphertext) {
        return None;
    }
    let statement = range_proof::Statement {
        ciphertext,
        ek: alice_ek,
        params,
    };
    range_proof::verify(transcript, statement, proof)
        .then(|| VerifiedCiphertext(ciphertext.clone()))
}

/// Bob's side of a conversion.
pub struct BobOutput<P> {
    /// Bob's additive share.
    pub beta: Zeroizing<Scalar>,
    /// The ciphertext sent back to Alice.
    pub ciphertext: BigNumber,
    pub proof: P,
}

struct BobResponse {
    beta_prm: Zeroizing<BigNumber>,
    b: Zeroizing<BigNumber>,
    nonce: Zeroizing<BigNumber>,
    ciphertext: BigNumber,
}

fn bob_respond(
    rng: &mut impl CryptoRngCore,
    alice_ek: &EncryptionKey,
    c_a: &VerifiedCiphertext,
    b: &Scalar,
) -> Result<BobResponse, ProofError> {
    let b = Zeroizing::new(scalar_to_bn(b));
    let beta_prm = Zeroizing::new(random_positive_bn(rng, &q_pow(5)));
    let (c_beta, nonce) = alice_ek.encrypt(rng, &beta_prm)?;
    let ciphertext = alice_ek.add(&alice_ek.mul(c_a.ciphertext(), &b)?, &c_beta)?;
    Ok(BobResponse {
        beta_prm,
        b,
        nonce: Zeroizing::new(nonce),
        ciphertext,
    })
}

impl BobResponse {
    fn beta(&self) -> Zeroizing<Scalar> {
        Zeroizing::new(-bn_to_scalar(&self.beta_prm))
    }
}

/// Respond to Alice with `b`, proving the response was computed honestly.
pub fn bob_mid(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    alice_ek: &EncryptionKey,
    alice_params: &PedersenParams,
    c_a: &VerifiedCiphertext,
    b: &Scalar,
) -> Result<BobOutput<ProofBob>, ProofError> {
    let response = bob_respond(rng, alice_ek, c_a, b)?;
    let proof = proofs::prove(
        rng,
        transcript,
        proofs::Statement {
            ek: alice_ek,
            c1: c_a.ciphertext(),
            c2: &response.ciphertext,
            params: alice_params,
        },
        proofs::Witness {
            x: &response.b,
            y: &response.beta_prm,
            nonce: &response.nonce,
        },
    )?;
    Ok(BobOutput {
        beta: response.beta(),
        ciphertext: response.ciphertext,
        proof,
    })
}

/// Like [`bob_mid`], also proving that `b` is the discrete log of `big_b`.
pub fn bob_mid_wc(
    rng: &mut impl CryptoRngCore,
    transcript: &mut Transcript,
    alice_ek: &EncryptionKey,
    alice_params: &PedersenParams,
    c_a: &VerifiedCiphertext,
    b: &Scalar,
    big_b: &ProjectivePoint,
) -> Result<BobOutput<ProofBobWC>, ProofError> {
    let response = bob_respond(rng, alice_ek, c_a, b)?;
    let proof = proofs::prove_wc(
        rng,
        transcript,
        proofs::Statement {
            ek: alice_ek,
            c1: c_a.ciphertext(),
            c2: &response.ciphertext,
            params: alice_params,
        },
        big_b,
        proofs::Witness {
            x: &response.b,
            y: &response.beta_prm,
            nonce: &response.nonce,
        },
    )?;
    Ok(BobOutput {
        beta: response.beta(),
        ciphertext: response.ciphertext,
        proof,
    })
}

fn decrypt_share(dk: &DecryptionKey, c_b: &BigNumber) -> Result<Zeroizing<Scalar>, ProofError> {
    let plaintext = Zeroizing::new(dk.decrypt(c_b)?);
    Ok(Zeroizing::new(bn_to_scalar(&plaintext)))
}

/// Check Bob's proof, then decrypt Alice's share.
pub fn alice_end(
    transcript: &mut Transcript,
    dk: &DecryptionKey,
    params: &PedersenParams,
    c_a: &BigNumber,
    c_b: &BigNumber,
    proof: &ProofBob,
) -> Result<Zeroizing<Scalar>, ProofError> {
    let ek = dk.encryption_key();
    if !ek.is_ciphertext(c_b) {
        return Err(ProofError::Rejected);
    }
    let statement = proofs::Statement {
        ek,
        c1: c_a,
        c2: c_b,
        params,
    };
    if !proofs::verify(transcript, statement, proof) {
        return Err(ProofError::Rejected);
    }
    decrypt_share(dk, c_b)
}

/// Check Bob's proof with check against `big_b`, then decrypt Alice's share.
pub fn alice_end_wc(
    transcript: &mut Transcript,
    dk: &DecryptionKey,
    params: &PedersenParams,
    c_a: &BigNumber,
    c_b: &BigNumber,
    big_b: &ProjectivePoint,
    proof: &ProofBobWC,
) -> Result<Zeroizing<Scalar>, ProofError> {
    let ek = dk.encryption_key();
    if !ek.is_ciphertext(c_b) {
        return Err(ProofError::Rejected);
    }
    let statement = proofs::Statement {
        ek,
        c1: c_a,
        c2: c_b,
        params,
    };
    if !proofs::verify_wc(transcript, statement, big_b, proof) {
        return Err(ProofError::Rejected);
    }
    decrypt_share(dk, c_b)
}
