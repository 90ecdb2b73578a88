use elliptic_curve::{point::AffineCoordinates, scalar::IsHigh};
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use subtle::ConditionallySelectable;
use tracing::info;

use super::{accepted, round5::NoncePoint};
use crate::{
    compat::{curve_order, x_coordinate},
    protocol::ProtocolError,
    signing::{messages::MessageStore, SignatureData, SigningContext},
};

/// Check `(r, s)` with the usual ECDSA verification equation.
#[must_use]
fn verify(public_key: &ProjectivePoint, m: &Scalar, r: &Scalar, s: &Scalar) -> bool {
    if bool::from(r.is_zero()) {
        return false;
    }
    let Some(s_inv) = Option::<Scalar>::from(s.invert()) else {
        return false;
    };
    let reproduced = ProjectivePoint::GENERATOR * (*m * s_inv) + *public_key * (*r * s_inv);
    x_coordinate(&reproduced.to_affine()) == *r
}

/// Combine everyone's share of `s` into the final signature.
pub(super) fn finalize(
    ctx: &SigningContext,
    store: &MessageStore,
    point: &NoncePoint,
    s_i: Scalar,
) -> Result<SignatureData, ProtocolError> {
    let mut s = s_i;
    for j in ctx.params.parties().others(ctx.params.me()) {
        let s_j = accepted(store.round7(j), 7, j)?.s_i();
        s += accepted(s_j, 7, j)?;
    }
    if bool::from(s.is_zero()) {
        return Err(ProtocolError::Consistency {
            round: 7,
            reason: "s is zero".to_string(),
        });
    }

    // Only the low half is accepted by most verifiers.
    let high = s.is_high();
    s.conditional_assign(&(-s), high);

    let big_r = point.big_r.to_affine();
    let x_overflows = BigNumber::from_slice(big_r.x()) >= *curve_order();
    let recovery_id =
        (big_r.y_is_odd().unwrap_u8() | (u8::from(x_overflows) << 1)) ^ high.unwrap_u8();

    let m = ctx.msg.scalar();
    if !verify(&ctx.key.public_key, &m, &point.r, &s) {
        return Err(ProtocolError::AssertionFailed(
            "signature failed to verify".to_string(),
        ));
    }
    info!(party = %ctx.params.my_id(), recovery_id, "signing finished");
    Ok(SignatureData::new(&point.r, &s, recovery_id, &ctx.msg))
}

#[cfg(test)]
mod test {
    use elliptic_curve::Field;
    use rand_core::OsRng;

    use super::*;

    #[test]
    fn test_verify_equation() {
        let x = Scalar::random(&mut OsRng);
        let k = Scalar::random(&mut OsRng);
        let m = Scalar::random(&mut OsRng);
        let public_key = ProjectivePoint::GENERATOR * x;
        let r = x_coordinate(&(ProjectivePoint::GENERATOR * k).to_affine());
        let s = k.invert().unwrap() * (m + r * x);

        assert!(verify(&public_key, &m, &r, &s));
        assert!(verify(&public_key, &m, &r, &-s));
        assert!(!verify(&public_key, &(m + Scalar::ONE), &r, &s));
        assert!(!verify(&public_key, &m, &Scalar::ZERO, &s));
        assert!(!verify(&public_key, &m, &r, &Scalar::ZERO));
    }
}
