//! Identifying culprits when the nonce check fails.
//!
//! When the `Rbar_j` don't sum to `G`, every party reveals its nonce shares
//! and the additive shares of every MtA conversion on the gamma side. Everyone
//! can then recompute each party's contributions in the open, and compare
//! them with the values published earlier in the session.
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use tracing::warn;
use zeroize::Zeroizing;

use crate::{
    compat::{scalar_from_bytes, scalar_to_bn, scalar_to_bytes},
    paillier::EncryptionKey,
    participants::ParticipantMap,
    protocol::Participant,
};

/// The shares one party holds with a single peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairwiseShares {
    /// Our share of `k_i * gamma_j`, where we played Alice.
    pub alpha_ij: Vec<u8>,
    /// Our share of `k_j * gamma_i`, where we played Bob.
    pub beta_ji: Vec<u8>,
}

/// The secrets a party reveals when the session aborts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortPayload {
    pub k_i: Vec<u8>,
    /// The Paillier nonce used to encrypt `k_i` in round 1.
    pub k_randomness: Vec<u8>,
    pub gamma_i: Vec<u8>,
    /// One slot per party. The slot of the party revealing is always empty.
    pub shares: Vec<Option<PairwiseShares>>,
}

impl AbortPayload {
    pub(crate) fn new(
        me: Participant,
        party_count: usize,
        k_i: &Scalar,
        k_randomness: &BigNumber,
        gamma_i: &Scalar,
        alphas: &ParticipantMap<Zeroizing<Scalar>>,
        betas: &ParticipantMap<Zeroizing<Scalar>>,
    ) -> Self {
        let shares = (0..party_count as u32)
            .map(Participant::from)
            .map(|p| {
                if p == me {
                    return None;
                }
                Some(PairwiseShares {
                    alpha_ij: scalar_to_bytes(alphas.get(p)?),
                    beta_ji: scalar_to_bytes(betas.get(p)?),
                })
            })
            .collect();
        Self {
            k_i: scalar_to_bytes(k_i),
            k_randomness: k_randomness.to_bytes(),
            gamma_i: scalar_to_bytes(gamma_i),
            shares,
        }
    }

    /// The structural checks, done before a payload is accepted.
    ///
    /// Bad encodings inside the fields are caught later, and blamed.
    pub(crate) fn is_well_formed(&self, from: Participant, party_count: usize) -> bool {
        !self.k_i.is_empty()
            && !self.k_randomness.is_empty()
            && !self.gamma_i.is_empty()
            && self.shares.len() == party_count
            && self.shares.iter().enumerate().all(|(j, s)| match s {
                None => j == from.index(),
                Some(s) => j != from.index() && !s.alpha_ij.is_empty() && !s.beta_ji.is_empty(),
            })
    }

    fn decode(&self, from: Participant, party_count: usize) -> Option<Revealed> {
        if !self.is_well_formed(from, party_count) {
            return None;
        }
        let mut shares = Vec::with_capacity(party_count);
        for s in &self.shares {
            shares.push(match s {
                None => None,
                Some(s) => Some((scalar_from_bytes(&s.alpha_ij)?, scalar_from_bytes(&s.beta_ji)?)),
            });
        }
        Some(Revealed {
            k: scalar_from_bytes(&self.k_i)?,
            k_randomness: BigNumber::from_slice(&self.k_randomness),
            gamma: scalar_from_bytes(&self.gamma_i)?,
            shares,
        })
    }
}

struct Revealed {
    k: Scalar,
    k_randomness: BigNumber,
    gamma: Scalar,
    /// (alpha_ij, beta_ji) per peer.
    shares: Vec<Option<(Scalar, Scalar)>>,
}

impl Revealed {
    fn matches(&self, view: &PublicView<'_>, big_r: &ProjectivePoint) -> bool {
        let encrypts_to_c = view
            .ek
            .encrypt_with_nonce(&scalar_to_bn(&self.k), &self.k_randomness)
            .map_or(false, |c| &c == view.ciphertext);
        if !encrypts_to_c {
            return false;
        }
        if ProjectivePoint::GENERATOR * self.gamma != view.big_gamma {
            return false;
        }
        if *big_r * self.k != view.big_r_bar {
            return false;
        }
        let delta = self
            .shares
            .iter()
            .flatten()
            .fold(self.k * self.gamma, |acc, (alpha, beta)| acc + alpha + beta);
        delta == view.delta
    }
}

/// What everyone already knows about one party, before secrets are revealed.
pub(crate) struct PublicView<'a> {
    pub ek: &'a EncryptionKey,
    /// The encryption of `k_j` from round 1.
    pub ciphertext: &'a BigNumber,
    pub big_gamma: ProjectivePoint,
    pub big_r_bar: ProjectivePoint,
    pub delta: Scalar,
}

/// Find every party whose revealed secrets contradict the session so far.
///
/// A party that revealed nothing, or revealed garbage, is a culprit. For each
/// pair, `alpha_jl + beta_jl` must equal `k_j * gamma_l`. Since `k_j` is bound
/// by its ciphertext, a mismatch is blamed on `l`, who played Bob.
///
/// The result is sorted, without duplicates.
pub(crate) fn identify_culprits(
    big_r: &ProjectivePoint,
    views: &[PublicView<'_>],
    payloads: &[Option<AbortPayload>],
) -> Vec<Participant> {
    let n = views.len();
    let mut culprits = Vec::new();
    let mut revealed: Vec<Option<Revealed>> = Vec::with_capacity(n);
    for (j, (view, payload)) in views.iter().zip(payloads).enumerate() {
        let p = Participant::from(j as u32);
        match payload.as_ref().and_then(|x| x.decode(p, n)) {
            Some(r) if r.matches(view, big_r) => revealed.push(Some(r)),
            Some(_) => {
                warn!(culprit = j, "revealed secrets contradict public values");
                culprits.push(p);
                revealed.push(None);
            }
            None => {
                warn!(culprit = j, "abort payload missing or malformed");
                culprits.push(p);
                revealed.push(None);
            }
        }
    }

    for (j, r_j) in revealed.iter().enumerate() {
        let Some(r_j) = r_j else { continue };
        for (l, r_l) in revealed.iter().enumerate() {
            let Some(r_l) = r_l else { continue };
            if j == l {
                continue;
            }
            let (Some((alpha, _)), Some((_, beta))) = (r_j.shares[l], r_l.shares[j]) else {
                continue;
            };
            if alpha + beta != r_j.k * r_l.gamma {
                warn!(culprit = l, alice = j, "pairwise shares don't add up");
                culprits.push(Participant::from(l as u32));
            }
        }
    }

    culprits.sort();
    culprits.dedup();
    culprits
}

#[cfg(test)]
mod test {
    use elliptic_curve::Field;
    use rand_core::OsRng;

    use super::*;
    use crate::test::fixtures;

    struct Session {
        big_r: ProjectivePoint,
        ciphertexts: Vec<BigNumber>,
        big_gammas: Vec<ProjectivePoint>,
        big_r_bars: Vec<ProjectivePoint>,
        deltas: Vec<Scalar>,
        payloads: Vec<Option<AbortPayload>>,
    }

    impl Session {
        fn views(&self) -> Vec<PublicView<'_>> {
            (0..self.ciphertexts.len())
                .map(|j| PublicView {
                    ek: fixtures::paillier_key(j).encryption_key(),
                    ciphertext: &self.ciphertexts[j],
                    big_gamma: self.big_gammas[j],
                    big_r_bar: self.big_r_bars[j],
                    delta: self.deltas[j],
                })
                .collect()
        }

        fn culprits(&self) -> Vec<usize> {
            identify_culprits(&self.big_r, &self.views(), &self.payloads)
                .into_iter()
                .map(|p| p.index())
                .collect()
        }
    }

    fn honest_session(n: usize) -> Session {
        let ks: Vec<Scalar> = (0..n).map(|_| Scalar::random(&mut OsRng)).collect();
        let gammas: Vec<Scalar> = (0..n).map(|_| Scalar::random(&mut OsRng)).collect();
        // alphas[j][l] + betas[j][l] = k_j * gamma_l
        let alphas: Vec<Vec<Scalar>> = (0..n)
            .map(|_| (0..n).map(|_| Scalar::random(&mut OsRng)).collect())
            .collect();
        let betas: Vec<Vec<Scalar>> = (0..n)
            .map(|j| (0..n).map(|l| ks[j] * gammas[l] - alphas[j][l]).collect())
            .collect();

        let big_r = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let mut session = Session {
            big_r,
            ciphertexts: Vec::new(),
            big_gammas: Vec::new(),
            big_r_bars: Vec::new(),
            deltas: Vec::new(),
            payloads: Vec::new(),
        };
        for j in 0..n {
            let ek = fixtures::paillier_key(j).encryption_key();
            let (c, nonce) = ek.encrypt(&mut OsRng, &scalar_to_bn(&ks[j])).unwrap();
            let mut delta = ks[j] * gammas[j];
            let mut shares = Vec::with_capacity(n);
            for l in 0..n {
                if l == j {
                    shares.push(None);
                    continue;
                }
                delta += alphas[j][l] + betas[l][j];
                shares.push(Some(PairwiseShares {
                    alpha_ij: scalar_to_bytes(&alphas[j][l]),
                    beta_ji: scalar_to_bytes(&betas[l][j]),
                }));
            }
            session.ciphertexts.push(c);
            session.big_gammas.push(ProjectivePoint::GENERATOR * gammas[j]);
            session.big_r_bars.push(big_r * ks[j]);
            session.deltas.push(delta);
            session.payloads.push(Some(AbortPayload {
                k_i: scalar_to_bytes(&ks[j]),
                k_randomness: nonce.to_bytes(),
                gamma_i: scalar_to_bytes(&gammas[j]),
                shares,
            }));
        }
        session
    }

    #[test]
    fn test_honest_parties_not_blamed() {
        let session = honest_session(3);
        assert!(session.culprits().is_empty());
    }

    #[test]
    fn test_lying_bob_blamed() {
        let mut session = honest_session(3);
        // Party 2 used a bad beta with party 0, consistently with its delta.
        let payload = session.payloads[2].as_mut().unwrap();
        let shares = payload.shares[0].as_mut().unwrap();
        let beta = scalar_from_bytes(&shares.beta_ji).unwrap() + Scalar::ONE;
        shares.beta_ji = scalar_to_bytes(&beta);
        session.deltas[2] += Scalar::ONE;

        assert_eq!(session.culprits(), vec![2]);
    }

    #[test]
    fn test_wrong_nonce_blamed() {
        let mut session = honest_session(3);
        let payload = session.payloads[1].as_mut().unwrap();
        payload.k_i = scalar_to_bytes(&Scalar::random(&mut OsRng));
        assert_eq!(session.culprits(), vec![1]);
    }

    #[test]
    fn test_missing_and_malformed_payloads_blamed() {
        let mut session = honest_session(3);
        session.payloads[0] = None;
        let payload = session.payloads[2].as_mut().unwrap();
        payload.shares[2] = payload.shares[1].clone();
        assert_eq!(session.culprits(), vec![0, 2]);
    }

    #[test]
    fn test_self_slot_must_be_empty() {
        let session = honest_session(3);
        let payload = session.payloads[1].as_ref().unwrap();
        assert!(payload.is_well_formed(Participant::from(1u32), 3));
        assert!(!payload.is_well_formed(Participant::from(0u32), 3));
        assert!(!payload.is_well_formed(Participant::from(1u32), 4));
    }
}
