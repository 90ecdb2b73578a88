use elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use zeroize::{Zeroize, Zeroizing};

use super::{
    local, missing, not_started,
    round1::{Nonces, Round1Secrets},
    round2::BobShares,
    Round4, Status,
};
use crate::{
    compat::second_generator,
    mta::{alice_end, alice_end_wc},
    participants::ParticipantMap,
    proofs::tproof,
    protocol::{
        internal::{collect_results, fan_out, BranchError},
        Participant, ProtocolError,
    },
    signing::{
        messages::{MessageContent, MessageKind, MessageStore, SignMessage, SignRound3Message},
        ssid::{MTA_BOB_LABEL, MTA_BOB_WC_LABEL, TPROOF_LABEL},
        SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round3];

/// What a signer carries once both share conversions are done.
pub(crate) struct SignerState {
    pub nonces: Nonces,
    /// Our share of `k_j * gamma_i`, where we played Bob.
    pub betas: ParticipantMap<Zeroizing<Scalar>>,
    /// Our share of `k_i * gamma_j`, where we played Alice.
    pub alphas: ParticipantMap<Zeroizing<Scalar>>,
    /// Our additive share of `k * gamma`.
    pub delta_i: Scalar,
    /// Our additive share of `k * x`.
    pub sigma_i: Zeroizing<Scalar>,
    pub l_i: Zeroizing<Scalar>,
    /// `sigma_i * G + l_i * H`.
    pub big_t_i: ProjectivePoint,
}

pub(crate) struct Round3 {
    pub(super) status: Status,
    r1: Round1Secrets,
    bob: BobShares,
    state: Option<SignerStateParts>,
}

struct SignerStateParts {
    alphas: ParticipantMap<Zeroizing<Scalar>>,
    delta_i: Scalar,
    sigma_i: Zeroizing<Scalar>,
    l_i: Zeroizing<Scalar>,
    big_t_i: ProjectivePoint,
}

impl Round3 {
    pub fn new(ctx: &SigningContext, r1: Round1Secrets, bob: BobShares) -> Self {
        Self {
            status: Status::new(3, KINDS, ctx),
            r1,
            bob,
            state: None,
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
        let dk = &*ctx.key.paillier_sk;
        let c_i = &self.r1.nonces.c_i;
        let big_ws = &self.r1.big_ws;

        // Both conversions with each peer are checked independently.
        let items: Vec<(Participant, bool)> = parties
            .others(me)
            .flat_map(|j| [(j, false), (j, true)])
            .collect();
        let results = fan_out(items, &ctx.cancel, |(j, with_check)| {
            let msg = store.round2(j).ok_or_else(|| missing(j))?;
            let share = if with_check {
                let proof = msg
                    .proof_bob_wc()
                    .map_err(|e| BranchError::Culprit(j, e.to_string()))?;
                alice_end_wc(
                    &mut ctx.ssid.fork(MTA_BOB_WC_LABEL, j, Some(me)),
                    dk,
                    my_params,
                    c_i,
                    &msg.c2(),
                    &big_ws[j.index()],
                    &proof,
                )
            } else {
                let proof = msg
                    .proof_bob()
                    .map_err(|e| BranchError::Culprit(j, e.to_string()))?;
                alice_end(
                    &mut ctx.ssid.fork(MTA_BOB_LABEL, j, Some(me)),
                    dk,
                    my_params,
                    c_i,
                    &msg.c1(),
                    &proof,
                )
            };
            let share = share.map_err(|e| BranchError::Culprit(j, e.to_string()))?;
            Ok((j, with_check, share))
        });
        let results = collect_results(3, "bob proof failed", parties, ctx.params.my_id(), results)?;

        let k_i = &self.r1.nonces.k_i;
        let mut alphas = ParticipantMap::new(parties.len());
        let mut delta_i = **k_i * *self.r1.nonces.gamma_i;
        let mut sigma_i = Zeroizing::new(**k_i * *self.r1.w_i);
        for (j, with_check, share) in results {
            if with_check {
                let nu = self.bob.nus.get(j).ok_or_else(|| not_started(3))?;
                *sigma_i += *share + **nu;
            } else {
                let beta = self.bob.betas.get(j).ok_or_else(|| not_started(3))?;
                delta_i += *share + **beta;
                alphas.put(j, share);
            }
        }
        // The key share isn't needed past this point.
        self.r1.w_i.zeroize();

        let l_i = Zeroizing::new(Scalar::random(&mut *rng));
        let big_t_i = ProjectivePoint::GENERATOR * *sigma_i + second_generator() * *l_i;
        let proof = tproof::prove(
            rng,
            &mut ctx.ssid.fork(TPROOF_LABEL, me, None),
            tproof::Statement { t: &big_t_i },
            tproof::Witness {
                sigma: &sigma_i,
                l: &l_i,
            },
        );
        let content =
            SignRound3Message::new(&delta_i, &big_t_i, &proof).map_err(|e| local(ctx, 3, e))?;
        out.push(
            SignMessage::broadcast(me, MessageContent::Round3(content))
                .map_err(|e| local(ctx, 3, e))?,
        );

        self.state = Some(SignerStateParts {
            alphas,
            delta_i,
            sigma_i,
            l_i,
            big_t_i,
        });
        Ok(())
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        _store: &MessageStore,
    ) -> Result<Round4, ProtocolError> {
        self.status.finish()?;
        let parts = self.state.ok_or_else(|| not_started(3))?;
        Ok(Round4::new(
            ctx,
            SignerState {
                nonces: self.r1.nonces,
                betas: self.bob.betas,
                alphas: parts.alphas,
                delta_i: parts.delta_i,
                sigma_i: parts.sigma_i,
                l_i: parts.l_i,
                big_t_i: parts.big_t_i,
            },
        ))
    }
}

#[cfg(test)]
impl Round3 {
    /// Shift our Bob share with one peer, before it goes into `delta_i`.
    pub(super) fn skew_beta(&mut self, peer: Participant, by: &Scalar) {
        if let Some(beta) = self.bob.betas.get_mut(peer) {
            **beta += by;
        }
    }
}
