use k256::ProjectivePoint;
use rand_core::CryptoRngCore;
use tracing::warn;

use super::{local, missing, not_started, round3::SignerState, round5::NoncePoint, Round7, Status};
use crate::{
    proofs::{pdl_slack, stproof},
    protocol::{
        internal::{collect_results, fan_out, BranchError},
        ProtocolError,
    },
    signing::{
        abort::AbortPayload,
        messages::{MessageContent, MessageKind, MessageStore, SignMessage, SignRound6Message},
        ssid::{PDL_LABEL, STPROOF_LABEL},
        SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round6];

pub(crate) struct Round6Outcome {
    /// Everyone's `Rbar_j`.
    pub big_r_bars: Vec<ProjectivePoint>,
    /// What we broadcast this round.
    pub own: SignRound6Message,
}

pub(crate) struct Round6 {
    pub(super) status: Status,
    state: SignerState,
    point: NoncePoint,
    outcome: Option<Round6Outcome>,
}

impl Round6 {
    pub fn new(ctx: &SigningContext, state: SignerState, point: NoncePoint) -> Self {
        Self {
            status: Status::new(6, KINDS, ctx),
            state,
            point,
            outcome: None,
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
        let my_params = &ctx.key.pedersen[me.index()];
        let big_r = &self.point.big_r;

        let results = fan_out(parties.others(me).collect(), &ctx.cancel, |j| {
            let c_j = store.round1_direct(j).ok_or_else(|| missing(j))?.c();
            let msg = store.round5(j).ok_or_else(|| missing(j))?;
            let (Some(big_r_bar_j), Ok(proof)) = (msg.big_r_bar_i(), msg.pdl_proof()) else {
                return Err(missing(j));
            };
            let statement = pdl_slack::Statement {
                ciphertext: &c_j,
                ek: &ctx.key.paillier_pks[j.index()],
                base: big_r,
                public: &big_r_bar_j,
                params: my_params,
            };
            if !pdl_slack::verify(&mut ctx.ssid.fork(PDL_LABEL, j, Some(me)), statement, &proof) {
                return Err(BranchError::Culprit(j, "pdl proof rejected".to_string()));
            }
            Ok((j, big_r_bar_j))
        });
        let results = collect_results(6, "pdl proof failed", parties, ctx.params.my_id(), results)?;

        let mut big_r_bars = vec![ProjectivePoint::IDENTITY; parties.len()];
        big_r_bars[me.index()] = self.point.big_r_bar_i;
        for (j, big_r_bar_j) in results {
            big_r_bars[j.index()] = big_r_bar_j;
        }

        let sum: ProjectivePoint = big_r_bars.iter().sum();
        let state = &self.state;
        let own = if sum != ProjectivePoint::GENERATOR {
            warn!(party = %ctx.params.my_id(), "nonce check failed, revealing secrets");
            SignRound6Message::Abort(AbortPayload::new(
                me,
                parties.len(),
                &state.nonces.k_i,
                &state.nonces.k_randomness,
                &state.nonces.gamma_i,
                &state.alphas,
                &state.betas,
            ))
        } else {
            let big_s_i = *big_r * *state.sigma_i;
            let proof = stproof::prove(
                rng,
                &mut ctx.ssid.fork(STPROOF_LABEL, me, None),
                stproof::Statement {
                    r: big_r,
                    s: &big_s_i,
                    t: &state.big_t_i,
                },
                stproof::Witness {
                    sigma: &state.sigma_i,
                    l: &state.l_i,
                },
            );
            SignRound6Message::success(&big_s_i, &proof).map_err(|e| local(ctx, 6, e))?
        };
        out.push(
            SignMessage::broadcast(me, MessageContent::Round6(own.clone()))
                .map_err(|e| local(ctx, 6, e))?,
        );

        self.outcome = Some(Round6Outcome { big_r_bars, own });
        Ok(())
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        _store: &MessageStore,
    ) -> Result<Round7, ProtocolError> {
        self.status.finish()?;
        let outcome = self.outcome.ok_or_else(|| not_started(6))?;
        Ok(Round7::new(ctx, self.state, self.point, outcome))
    }
}
