use k256::Scalar;
use libpaillier::unknown_order::BigNumber;
use rand_core::CryptoRngCore;

/// How many times we retry sampling before giving up.
///
/// Every loop using this bound succeeds with overwhelming probability on the first try.
pub(crate) const SAMPLING_RETRY_MAX: usize = 500;

/// Represents a polynomial with coefficients in the scalar field of the curve.
#[derive(Debug, Clone)]
pub struct Polynomial {
    /// The coefficients of our polynomial, from 0..size-1.
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Extend a constant to a random polynomial of a certain size.
    ///
    /// This is useful if you want the polynomial to have a certain value, but
    /// otherwise be random.
    pub fn extend_random(rng: &mut impl CryptoRngCore, size: usize, constant: &Scalar) -> Self {
        let mut coefficients = Vec::with_capacity(size);
        coefficients.push(*constant);
        for _ in 1..size {
            coefficients.push(Scalar::generate_biased(&mut *rng));
        }
        Self { coefficients }
    }

    /// Evaluate this polynomial at a point, using Horner's method.
    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, c| acc * x + c)
    }
}

/// Sample a number uniformly at random from the range [0, n).
pub(crate) fn random_positive_bn(rng: &mut impl CryptoRngCore, n: &BigNumber) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Sample a number uniformly from the multiplicative group of integers modulo `n`.
pub(crate) fn random_bn_in_z_star(
    rng: &mut impl CryptoRngCore,
    n: &BigNumber,
) -> Option<BigNumber> {
    std::iter::repeat_with(|| BigNumber::from_rng(n, rng))
        .take(SAMPLING_RETRY_MAX)
        .find(|x| x != &BigNumber::zero() && x.gcd(n) == BigNumber::one())
}

/// Check that `x` lies in [1, n) and is coprime to `n`.
pub(crate) fn is_in_z_star(x: &BigNumber, n: &BigNumber) -> bool {
    x > &BigNumber::zero() && x < n && x.gcd(n) == BigNumber::one()
}

/// Compute `base^-e mod n`, failing if `base` is not invertible.
pub(crate) fn modpow_inverse(base: &BigNumber, e: &BigNumber, n: &BigNumber) -> Option<BigNumber> {
    base.modpow(e, n).invert(n)
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};
    use rand_core::OsRng;

    use super::*;

    #[test]
    fn test_polynomial_evaluation() {
        let constant = Scalar::from(5u64);
        let f = Polynomial::extend_random(&mut OsRng, 3, &constant);
        assert_eq!(f.evaluate(&Scalar::ZERO), constant);

        let x = Scalar::from(2u64);
        let c = &f.coefficients;
        let expected = c[0] + c[1] * x + c[2] * x * x;
        assert_eq!(f.evaluate(&x), expected);
    }

    #[test]
    fn test_sampling_follows_the_rng() {
        let n = BigNumber::from_slice([0xff; 64]);
        let a = random_positive_bn(&mut StdRng::seed_from_u64(7), &n);
        let b = random_positive_bn(&mut StdRng::seed_from_u64(7), &n);
        let c = random_positive_bn(&mut StdRng::seed_from_u64(8), &n);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < n);
    }

    #[test]
    fn test_z_star_sampling() {
        let n = BigNumber::from(15u64);
        for _ in 0..20 {
            let x = random_bn_in_z_star(&mut OsRng, &n).unwrap();
            assert!(is_in_z_star(&x, &n));
        }
        assert!(!is_in_z_star(&BigNumber::from(5u64), &n));
    }

    #[test]
    fn test_modpow_inverse() {
        let n = BigNumber::from(35u64);
        let x = BigNumber::from(3u64);
        let e = BigNumber::from(5u64);
        let inv = modpow_inverse(&x, &e, &n).unwrap();
        assert_eq!(inv.modmul(&x.modpow(&e, &n), &n), BigNumber::one());
        assert!(modpow_inverse(&BigNumber::from(7u64), &e, &n).is_none());
    }
}
