//! Paillier encryption, as used by the MtA share conversion.
//!
//! This wraps `libpaillier`, keeping the encryption nonces visible to the
//! caller, since those are needed for proofs and for the abort protocol.
use std::{fmt, sync::Arc};

use libpaillier::unknown_order::BigNumber;
use rand_core::CryptoRngCore;
use thiserror::Error;

use crate::math::{is_in_z_star, random_bn_in_z_star};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaillierError {
    #[error("plaintext out of range")]
    PlaintextOutOfRange,
    #[error("invalid encryption nonce")]
    InvalidNonce,
    #[error("invalid ciphertext")]
    InvalidCiphertext,
    #[error("failed to sample randomness")]
    Sampling,
}

/// A Paillier public key.
#[derive(Clone)]
pub struct EncryptionKey {
    inner: Arc<libpaillier::EncryptionKey>,
    n: BigNumber,
    nn: BigNumber,
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("n_bits", &self.n.bit_length())
            .finish()
    }
}

impl EncryptionKey {
    fn from_inner(inner: libpaillier::EncryptionKey) -> Self {
        let n = inner.n().clone();
        let nn = &n * &n;
        Self {
            inner: Arc::new(inner),
            n,
            nn,
        }
    }

    /// The modulus N.
    pub fn n(&self) -> &BigNumber {
        &self.n
    }

    /// The modulus N^2, where ciphertexts live.
    pub fn nn(&self) -> &BigNumber {
        &self.nn
    }

    /// The generator N + 1.
    pub fn gamma(&self) -> BigNumber {
        &self.n + BigNumber::one()
    }

    /// Encrypt a plaintext with a specific nonce.
    pub fn encrypt_with_nonce(
        &self,
        m: &BigNumber,
        nonce: &BigNumber,
    ) -> Result<BigNumber, PaillierError> {
        if m < &BigNumber::zero() || m >= &self.n {
            return Err(PaillierError::PlaintextOutOfRange);
        }
        if !is_in_z_star(nonce, &self.n) {
            return Err(PaillierError::InvalidNonce);
        }
        let (c, _) = self
            .inner
            .encrypt(m.to_bytes(), Some(nonce.clone()))
            .ok_or(PaillierError::PlaintextOutOfRange)?;
        Ok(c)
    }

    /// Encrypt a plaintext with fresh randomness, returning the ciphertext and the nonce.
    pub fn encrypt(
        &self,
        rng: &mut impl CryptoRngCore,
        m: &BigNumber,
    ) -> Result<(BigNumber, BigNumber), PaillierError> {
        let nonce = random_bn_in_z_star(rng, &self.n).ok_or(PaillierError::Sampling)?;
        let c = self.encrypt_with_nonce(m, &nonce)?;
        Ok((c, nonce))
    }

    /// Homomorphically add two plaintexts.
    pub fn add(&self, c1: &BigNumber, c2: &BigNumber) -> Result<BigNumber, PaillierError> {
        self.inner
            .add(c1, c2)
            .ok_or(PaillierError::InvalidCiphertext)
    }

    /// Homomorphically multiply a plaintext by a known scalar.
    pub fn mul(&self, c: &BigNumber, a: &BigNumber) -> Result<BigNumber, PaillierError> {
        self.inner.mul(c, a).ok_or(PaillierError::InvalidCiphertext)
    }

    /// Check that a value could be a ciphertext under this key.
    pub fn is_ciphertext(&self, c: &BigNumber) -> bool {
        is_in_z_star(c, &self.nn)
    }
}

/// A Paillier secret key.
pub struct DecryptionKey {
    inner: libpaillier::DecryptionKey,
    public: EncryptionKey,
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionKey")
            .field("public", &self.public)
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl DecryptionKey {
    /// Build a key from the two primes of the modulus.
    pub fn with_primes(p: &BigNumber, q: &BigNumber) -> Option<Self> {
        let inner = libpaillier::DecryptionKey::with_primes(p, q)?;
        let public = EncryptionKey::from_inner(libpaillier::EncryptionKey::from(&inner));
        Some(Self { inner, public })
    }

    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.public
    }

    pub fn decrypt(&self, c: &BigNumber) -> Result<BigNumber, PaillierError> {
        if !self.public.is_ciphertext(c) {
            return Err(PaillierError::InvalidCiphertext);
        }
        let m = self
            .inner
            .decrypt(c)
            .ok_or(PaillierError::InvalidCiphertext)?;
        Ok(BigNumber::from_slice(m))
    }
}

#[cfg(test)]
mod test {
    use rand_core::OsRng;

    use super::*;
    use crate::test::fixtures;

    #[test]
    fn test_homomorphic_operations() -> Result<(), PaillierError> {
        let dk = fixtures::paillier_key(0);
        let ek = dk.encryption_key();

        let a = BigNumber::from(1234u64);
        let b = BigNumber::from(5678u64);
        let (ca, _) = ek.encrypt(&mut OsRng, &a)?;
        let (cb, _) = ek.encrypt(&mut OsRng, &b)?;

        assert_eq!(dk.decrypt(&ek.add(&ca, &cb)?)?, &a + &b);
        assert_eq!(dk.decrypt(&ek.mul(&ca, &b)?)?, &a * &b);
        Ok(())
    }

    #[test]
    fn test_encryption_with_nonce_is_deterministic() -> Result<(), PaillierError> {
        let dk = fixtures::paillier_key(1);
        let ek = dk.encryption_key();

        let m = BigNumber::from(42u64);
        let (c, nonce) = ek.encrypt(&mut OsRng, &m)?;
        assert_eq!(ek.encrypt_with_nonce(&m, &nonce)?, c);
        assert_eq!(
            ek.encrypt_with_nonce(ek.n(), &nonce),
            Err(PaillierError::PlaintextOutOfRange)
        );
        Ok(())
    }
}
