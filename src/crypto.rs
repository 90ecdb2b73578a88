use ck_meow::Meow;
use rand_core::CryptoRngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

const COMMIT_LABEL: &[u8] = b"gg20-sign v0.1.0 commitment";
const COMMIT_LEN: usize = 32;
const RANDOMIZER_LEN: usize = 32;

/// Represents a commitment to some value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment([u8; COMMIT_LEN]);

impl Commitment {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.try_into().ok()?))
    }
}

impl AsRef<[u8]> for Commitment {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The randomness used to hide a committed value, revealed when opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Randomizer([u8; RANDOMIZER_LEN]);

impl Randomizer {
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.try_into().ok()?))
    }
}

impl AsRef<[u8]> for Randomizer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

fn commit_with(randomizer: &Randomizer, parts: &[&[u8]]) -> Commitment {
    let mut meow = Meow::new(COMMIT_LABEL);

    meow.ad(&randomizer.0, false);
    for part in parts {
        meow.ad(&(part.len() as u64).to_le_bytes(), false);
        meow.ad(part, true);
    }

    let mut out = [0u8; COMMIT_LEN];
    meow.prf(&mut out, false);

    Commitment(out)
}

/// Commit to a list of byte strings.
///
/// Each part is framed by its length, so different splits of the same bytes
/// produce different commitments.
pub fn commit(rng: &mut impl CryptoRngCore, parts: &[&[u8]]) -> (Commitment, Randomizer) {
    let mut r = [0u8; RANDOMIZER_LEN];
    rng.fill_bytes(&mut r);
    let randomizer = Randomizer(r);
    (commit_with(&randomizer, parts), randomizer)
}

/// Check that some parts open a commitment.
#[must_use]
pub fn check_commitment(commitment: &Commitment, randomizer: &Randomizer, parts: &[&[u8]]) -> bool {
    commit_with(randomizer, parts).0.ct_eq(&commitment.0).into()
}
