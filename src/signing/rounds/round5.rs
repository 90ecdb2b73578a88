use elliptic_curve::group::Group;
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use super::{local_branch, missing, not_started, peer_rngs, round3::SignerState, Round6, Status};
use crate::{
    compat::{scalar_to_bn, x_coordinate},
    crypto::check_commitment,
    proofs::pdl_slack,
    protocol::{
        internal::{collect_results, fan_out, BranchError},
        ProtocolError,
    },
    signing::{
        messages::{MessageContent, MessageKind, MessageStore, SignMessage, SignRound5Message},
        ssid::PDL_LABEL,
        SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round5];

/// The shared nonce point, and what went into it.
pub(crate) struct NoncePoint {
    pub big_r: ProjectivePoint,
    /// The x coordinate of `R`, reduced mod q.
    pub r: Scalar,
    /// `k_i * R`
    pub big_r_bar_i: ProjectivePoint,
    /// Everyone's opened `Gamma_j`.
    pub big_gammas: Vec<ProjectivePoint>,
}

pub(crate) struct Round5 {
    pub(super) status: Status,
    state: SignerState,
    delta_inv: Scalar,
    point: Option<NoncePoint>,
}

impl Round5 {
    pub fn new(ctx: &SigningContext, state: SignerState, delta_inv: Scalar) -> Self {
        Self {
            status: Status::new(5, KINDS, ctx),
            state,
            delta_inv,
            point: None,
        }
    }

    pub fn start(
        &mut self,
        ctx: &SigningContext,
        store: &MessageStore,
        rng: &mut impl CryptoRngCore,
        out: &mut Vec<SignMessage>,
    ) -> Result<(), ProtocolError> {
        self.status.begin(ctx)?;
        let parties = ctx.params.parties();
        let me = ctx.params.me();

        let opened = fan_out(parties.others(me).collect(), &ctx.cancel, |j| {
            let commitment = store
                .round1_broadcast(j)
                .and_then(|m| m.commitment())
                .ok_or_else(|| missing(j))?;
            let msg = store.round4(j).ok_or_else(|| missing(j))?;
            let (Some(randomizer), Some(parts), Some(big_gamma_j)) =
                (msg.randomizer(), msg.committed_parts(), msg.big_gamma_i())
            else {
                return Err(missing(j));
            };
            if !check_commitment(&commitment, &randomizer, &parts) {
                return Err(BranchError::Culprit(j, "bad decommitment".to_string()));
            }
            Ok((j, big_gamma_j))
        });
        let opened = collect_results(
            5,
            "gamma decommitment failed",
            parties,
            ctx.params.my_id(),
            opened,
        )?;

        let nonces = &self.state.nonces;
        let mut big_gammas = vec![ProjectivePoint::IDENTITY; parties.len()];
        big_gammas[me.index()] = nonces.big_gamma_i;
        for (j, big_gamma_j) in opened {
            big_gammas[j.index()] = big_gamma_j;
        }
        let big_gamma: ProjectivePoint = big_gammas.iter().sum();
        let big_r = big_gamma * self.delta_inv;
        if bool::from(big_r.is_identity()) {
            return Err(ProtocolError::Consistency {
                round: 5,
                reason: "R is the identity".to_string(),
            });
        }
        let r = x_coordinate(&big_r.to_affine());
        let big_r_bar_i = big_r * *nonces.k_i;

        let ek = ctx.key.paillier_sk.encryption_key();
        let k_bn = Zeroizing::new(scalar_to_bn(&nonces.k_i));
        let results = fan_out(peer_rngs(ctx, rng), &ctx.cancel, |(j, mut rng)| {
            let proof = pdl_slack::prove(
                &mut rng,
                &mut ctx.ssid.fork(PDL_LABEL, me, Some(j)),
                pdl_slack::Statement {
                    ciphertext: &nonces.c_i,
                    ek,
                    base: &big_r,
                    public: &big_r_bar_i,
                    params: &ctx.key.pedersen[j.index()],
                },
                pdl_slack::Witness {
                    x: &k_bn,
                    nonce: &nonces.k_randomness,
                },
            )
            .map_err(local_branch)?;
            let content = SignRound5Message::new(&big_r_bar_i, &proof).map_err(local_branch)?;
            SignMessage::direct(me, j, MessageContent::Round5(content)).map_err(local_branch)
        });
        out.extend(collect_results(5, "pdl proof failed", parties, ctx.params.my_id(), results)?);

        self.point = Some(NoncePoint {
            big_r,
            r,
            big_r_bar_i,
            big_gammas,
        });
        Ok(())
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        _store: &MessageStore,
    ) -> Result<Round6, ProtocolError> {
        self.status.finish()?;
        let point = self.point.ok_or_else(|| not_started(5))?;
        Ok(Round6::new(ctx, self.state, point))
    }
}
