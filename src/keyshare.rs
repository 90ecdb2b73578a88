//! The key share a party brings to a signing session.
use std::{fmt, sync::Arc};

use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use zeroize::Zeroize;

use crate::{
    paillier::{DecryptionKey, EncryptionKey},
    participants::SortedPartyIds,
    proofs::PedersenParams,
};

/// The output of key generation, for one party.
///
/// Every per-party vector is in the order of the parties' keys, so index `j`
/// of each vector describes the same party.
#[derive(Clone)]
pub struct SaveData {
    /// Our share id, which is also our key in the party list.
    pub share_id: BigNumber,
    /// The share ids of every party.
    pub ks: Vec<BigNumber>,
    /// Our share of the private key.
    pub xi: Scalar,
    /// Every party's public share `x_j * G`.
    pub big_xj: Vec<ProjectivePoint>,
    pub paillier_sk: Arc<DecryptionKey>,
    pub paillier_pks: Vec<EncryptionKey>,
    /// Every party's NTilde, h1 and h2.
    pub pedersen: Vec<PedersenParams>,
    /// The group's public key.
    pub public_key: ProjectivePoint,
}

impl fmt::Debug for SaveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveData")
            .field("share_id", &self.share_id)
            .field("ks", &self.ks)
            .field("xi", &"[redacted]")
            .field("public_key", &self.public_key)
            .finish()
    }
}

impl Drop for SaveData {
    fn drop(&mut self) {
        self.xi.zeroize();
    }
}

impl SaveData {
    /// The number of parties this key was shared between.
    pub fn party_count(&self) -> usize {
        self.ks.len()
    }

    /// Restrict this key share to a subset of the parties.
    ///
    /// The result describes only the signers, in their sorted order. This
    /// returns None if some signer doesn't hold a share, or if we're not a signer.
    pub fn subset(&self, signers: &SortedPartyIds) -> Option<SaveData> {
        if !signers.ids().iter().any(|p| p.key == self.share_id) {
            return None;
        }
        let mut out = SaveData {
            share_id: self.share_id.clone(),
            ks: Vec::with_capacity(signers.len()),
            xi: self.xi,
            big_xj: Vec::with_capacity(signers.len()),
            paillier_sk: self.paillier_sk.clone(),
            paillier_pks: Vec::with_capacity(signers.len()),
            pedersen: Vec::with_capacity(signers.len()),
            public_key: self.public_key,
        };
        for signer in signers.ids() {
            let j = self.ks.iter().position(|k| k == &signer.key)?;
            out.ks.push(self.ks[j].clone());
            out.big_xj.push(self.big_xj[j]);
            out.paillier_pks.push(self.paillier_pks[j].clone());
            out.pedersen.push(self.pedersen[j].clone());
        }
        Some(out)
    }

    /// Shift the key by a public offset, for a derived child key.
    ///
    /// Every share moves by the same delta, which moves the shared secret by
    /// delta as well, since the Lagrange coefficients sum to one.
    pub fn derive_child(&self, delta: &Scalar) -> SaveData {
        let shift = ProjectivePoint::GENERATOR * delta;
        let mut out = self.clone();
        out.xi += delta;
        for big_x in out.big_xj.iter_mut() {
            *big_x += shift;
        }
        out.public_key += shift;
        out
    }
}
