use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand_core::CryptoRngCore;
use tracing::warn;

use super::{
    accepted, finalize::finalize, local, missing, not_started, round3::SignerState,
    round5::NoncePoint, round6::Round6Outcome, Status,
};
use crate::{
    proofs::stproof,
    protocol::{
        internal::{collect_results, fan_out, BranchError},
        AbortRecord, ProtocolError,
    },
    signing::{
        abort::{identify_culprits, AbortPayload, PublicView},
        messages::{
            MessageContent, MessageKind, MessageStore, SignMessage, SignRound6Message,
            SignRound7Message,
        },
        ssid::STPROOF_LABEL,
        SignatureData, SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round7];

pub(crate) struct Round7 {
    pub(super) status: Status,
    state: SignerState,
    point: NoncePoint,
    outcome: Round6Outcome,
    s_i: Option<Scalar>,
}

impl Round7 {
    pub fn new(
        ctx: &SigningContext,
        state: SignerState,
        point: NoncePoint,
        outcome: Round6Outcome,
    ) -> Self {
        Self {
            status: Status::new(7, KINDS, ctx),
            state,
            point,
            outcome,
            s_i: None,
        }
    }

    pub fn start(
        &mut self,
        ctx: &SigningContext,
        store: &MessageStore,
        _rng: &mut impl CryptoRngCore,
        out: &mut Vec<SignMessage>,
    ) -> Result<(), ProtocolError> {
        self.status.begin(ctx)?;
        let parties = ctx.params.parties();
        let me = ctx.params.me();

        let mut round6 = Vec::with_capacity(parties.len());
        for j in parties.participants() {
            if j == me {
                round6.push(&self.outcome.own);
            } else {
                round6.push(accepted(store.round6(j), 7, j)?);
            }
        }
        if round6.iter().any(|m| m.is_abort()) {
            return Err(self.identify(ctx, store, &round6)?);
        }

        let big_r = &self.point.big_r;
        let results = fan_out(parties.others(me).collect(), &ctx.cancel, |j| {
            let big_t_j = store
                .round3(j)
                .and_then(|m| m.big_t_i())
                .ok_or_else(|| missing(j))?;
            let msg = round6[j.index()];
            let (Some(big_s_j), Ok(proof)) = (msg.big_s_i(), msg.st_proof()) else {
                return Err(missing(j));
            };
            let statement = stproof::Statement {
                r: big_r,
                s: &big_s_j,
                t: &big_t_j,
            };
            if !stproof::verify(&mut ctx.ssid.fork(STPROOF_LABEL, j, None), statement, &proof) {
                return Err(BranchError::Culprit(j, "st proof rejected".to_string()));
            }
            Ok(big_s_j)
        });
        let big_ss = collect_results(7, "st proof failed", parties, ctx.params.my_id(), results)?;

        let own = self
            .outcome
            .own
            .big_s_i()
            .ok_or_else(|| local(ctx, 7, "own S_i is missing"))?;
        let sum: ProjectivePoint = big_ss.iter().fold(own, |acc, x| acc + x);
        if sum != ctx.key.public_key {
            return Err(ProtocolError::Consistency {
                round: 7,
                reason: "S_j don't sum to the public key".to_string(),
            });
        }

        let s_i = ctx.msg.scalar() * *self.state.nonces.k_i + self.point.r * *self.state.sigma_i;
        out.push(
            SignMessage::broadcast(me, MessageContent::Round7(SignRound7Message::new(&s_i)))
                .map_err(|e| local(ctx, 7, e))?,
        );
        self.s_i = Some(s_i);
        Ok(())
    }

    /// Use everyone's revealed secrets to find who caused the abort.
    ///
    /// If we aborted too, a party that sent a success message revealed
    /// nothing, and is blamed along with any party whose secrets don't check
    /// out. If we didn't, the parties that aborted are blamed.
    fn identify(
        &self,
        ctx: &SigningContext,
        store: &MessageStore,
        round6: &[&SignRound6Message],
    ) -> Result<ProtocolError, ProtocolError> {
        let parties = ctx.params.parties();
        let me = ctx.params.me();

        let mut ciphertexts: Vec<BigNumber> = Vec::with_capacity(parties.len());
        let mut deltas = Vec::with_capacity(parties.len());
        for j in parties.participants() {
            if j == me {
                ciphertexts.push(self.state.nonces.c_i.clone());
                deltas.push(self.state.delta_i);
                continue;
            }
            ciphertexts.push(accepted(store.round1_direct(j), 7, j)?.c());
            let delta_j = accepted(store.round3(j), 7, j)?.delta_i();
            deltas.push(accepted(delta_j, 7, j)?);
        }
        let views: Vec<PublicView<'_>> = parties
            .participants()
            .map(|j| PublicView {
                ek: &ctx.key.paillier_pks[j.index()],
                ciphertext: &ciphertexts[j.index()],
                big_gamma: self.point.big_gammas[j.index()],
                big_r_bar: self.outcome.big_r_bars[j.index()],
                delta: deltas[j.index()],
            })
            .collect();
        let payloads: Vec<Option<AbortPayload>> = round6
            .iter()
            .map(|m| match m {
                SignRound6Message::Abort(payload) => Some(payload.clone()),
                SignRound6Message::Success { .. } => None,
            })
            .collect();

        // The nonce check passed on our side, so claiming it failed is the fault.
        let culprits = if self.outcome.own.is_abort() {
            identify_culprits(&self.point.big_r, &views, &payloads)
        } else {
            parties
                .participants()
                .filter(|j| round6[j.index()].is_abort())
                .collect()
        };
        warn!(
            party = %ctx.params.my_id(),
            culprits = culprits.len(),
            "signing aborted"
        );
        Ok(ProtocolError::Aborted {
            round: 7,
            record: Box::new(AbortRecord {
                culprits: parties.to_ids(culprits),
                revealed: payloads,
            }),
        })
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        store: &MessageStore,
    ) -> Result<SignatureData, ProtocolError> {
        self.status.finish()?;
        let s_i = self.s_i.ok_or_else(|| not_started(7))?;
        finalize(ctx, store, &self.point, s_i)
    }
}
