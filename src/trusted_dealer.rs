//! A trusted dealer, producing key shares without running key generation.
//!
//! This is useful for tests, and for splitting an existing key.
use std::{fmt, sync::Arc};

use elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand_core::CryptoRngCore;
use tracing::debug;

use crate::{
    keyshare::SaveData,
    math::Polynomial,
    paillier::DecryptionKey,
    participants::SortedPartyIds,
    proofs::PedersenParams,
    protocol::InitializationError,
};

/// The size of each prime, in bits.
pub const PRIME_BITS: usize = 1024;

/// The primes a party needs, generated ahead of time since that's slow.
#[derive(Clone)]
pub struct PreParams {
    /// The primes of the Paillier modulus.
    pub paillier_p: BigNumber,
    pub paillier_q: BigNumber,
    /// The safe primes of NTilde.
    pub safe_p: BigNumber,
    pub safe_q: BigNumber,
}

impl fmt::Debug for PreParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PreParams([redacted])")
    }
}

impl PreParams {
    /// Generate fresh primes.
    ///
    /// Safe primes of this size take a long time to find, expect minutes.
    pub fn generate(rng: &mut impl CryptoRngCore) -> Self {
        Self {
            paillier_p: BigNumber::prime_from_rng(PRIME_BITS, rng),
            paillier_q: BigNumber::prime_from_rng(PRIME_BITS, rng),
            safe_p: BigNumber::safe_prime_from_rng(PRIME_BITS, rng),
            safe_q: BigNumber::safe_prime_from_rng(PRIME_BITS, rng),
        }
    }
}

/// Split a secret between parties, so that any `threshold + 1` of them can sign.
///
/// The secret is random unless given. The parties' keys are the x-coordinates
/// of their shares. There must be one set of pre-parameters per party.
pub fn deal(
    rng: &mut impl CryptoRngCore,
    parties: &SortedPartyIds,
    threshold: usize,
    secret: Option<Scalar>,
    pre_params: Vec<PreParams>,
) -> Result<Vec<SaveData>, InitializationError> {
    let n = parties.len();
    if threshold >= n {
        return Err(InitializationError::BadParameters(format!(
            "threshold {threshold} needs more than {n} parties"
        )));
    }
    if pre_params.len() != n {
        return Err(InitializationError::BadParameters(format!(
            "expected {n} pre-parameters, found {}",
            pre_params.len()
        )));
    }

    let secret = secret.unwrap_or_else(|| Scalar::random(&mut *rng));
    let f = Polynomial::extend_random(rng, threshold + 1, &secret);
    let xs: Vec<Scalar> = parties.participants().map(|p| f.evaluate(&parties.scalar(p))).collect();
    let big_xj: Vec<ProjectivePoint> = xs.iter().map(|x| ProjectivePoint::GENERATOR * x).collect();

    let mut secret_keys = Vec::with_capacity(n);
    let mut pedersen = Vec::with_capacity(n);
    for pre in &pre_params {
        let dk = DecryptionKey::with_primes(&pre.paillier_p, &pre.paillier_q).ok_or_else(|| {
            InitializationError::BadParameters("invalid Paillier primes".to_string())
        })?;
        let params = PedersenParams::from_safe_primes(rng, &pre.safe_p, &pre.safe_q)
            .ok_or_else(|| InitializationError::BadParameters("invalid safe primes".to_string()))?;
        secret_keys.push(Arc::new(dk));
        pedersen.push(params);
    }
    let paillier_pks: Vec<_> = secret_keys
        .iter()
        .map(|dk| dk.encryption_key().clone())
        .collect();
    let ks: Vec<BigNumber> = parties.ids().iter().map(|p| p.key.clone()).collect();
    let public_key = ProjectivePoint::GENERATOR * secret;

    debug!(parties = n, threshold, "dealt key shares");

    Ok(xs
        .into_iter()
        .zip(secret_keys)
        .zip(ks.iter())
        .map(|((xi, paillier_sk), share_id)| SaveData {
            share_id: share_id.clone(),
            ks: ks.clone(),
            xi,
            big_xj: big_xj.clone(),
            paillier_sk,
            paillier_pks: paillier_pks.clone(),
            pedersen: pedersen.clone(),
            public_key,
        })
        .collect())
}
