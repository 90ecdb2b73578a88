use k256::Scalar;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use super::{local_branch, missing, not_started, peer_rngs, round1::Round1Secrets, Round3, Status};
use crate::{
    mta::{bob_mid, bob_mid_wc, verify_alice},
    participants::ParticipantMap,
    protocol::{
        internal::{collect_results, fan_out, BranchError},
        ProtocolError,
    },
    signing::{
        messages::{MessageContent, MessageKind, MessageStore, SignMessage, SignRound2Message},
        ssid::{MTA_ALICE_LABEL, MTA_BOB_LABEL, MTA_BOB_WC_LABEL},
        SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round2];

/// Our shares from playing Bob, in both conversions.
pub(crate) struct BobShares {
    /// Our share of `k_j * gamma_i`.
    pub betas: ParticipantMap<Zeroizing<Scalar>>,
    /// Our share of `k_j * w_i`.
    pub nus: ParticipantMap<Zeroizing<Scalar>>,
}

pub(crate) struct Round2 {
    pub(super) status: Status,
    r1: Round1Secrets,
    bob: Option<BobShares>,
}

impl Round2 {
    pub fn new(ctx: &SigningContext, r1: Round1Secrets) -> Self {
        Self {
            status: Status::new(2, KINDS, ctx),
            r1,
            bob: None,
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
        let gamma_i = &self.r1.nonces.gamma_i;
        let w_i = &self.r1.w_i;
        let big_w_i = &self.r1.big_ws[me.index()];

        let results = fan_out(peer_rngs(ctx, rng), &ctx.cancel, |(j, mut rng)| {
            let msg = store.round1_direct(j).ok_or_else(|| missing(j))?;
            let alice_ek = &ctx.key.paillier_pks[j.index()];
            let alice_params = &ctx.key.pedersen[j.index()];
            let proof = msg
                .range_proof_alice()
                .map_err(|e| BranchError::Culprit(j, e.to_string()))?;
            let c_a = verify_alice(
                &mut ctx.ssid.fork(MTA_ALICE_LABEL, j, Some(me)),
                alice_ek,
                &msg.c(),
                &proof,
                my_params,
            )
            .ok_or_else(|| BranchError::Culprit(j, "alice range proof rejected".to_string()))?;

            ctx.cancel.check()?;
            let gamma = bob_mid(
                &mut rng,
                &mut ctx.ssid.fork(MTA_BOB_LABEL, me, Some(j)),
                alice_ek,
                alice_params,
                &c_a,
                gamma_i,
            )
            .map_err(local_branch)?;

            ctx.cancel.check()?;
            let w = bob_mid_wc(
                &mut rng,
                &mut ctx.ssid.fork(MTA_BOB_WC_LABEL, me, Some(j)),
                alice_ek,
                alice_params,
                &c_a,
                w_i,
                big_w_i,
            )
            .map_err(local_branch)?;

            let content =
                SignRound2Message::new(&gamma.ciphertext, &w.ciphertext, &gamma.proof, &w.proof)
                    .map_err(local_branch)?;
            let msg = SignMessage::direct(me, j, MessageContent::Round2(content))
                .map_err(local_branch)?;
            Ok((j, gamma.beta, w.beta, msg))
        });
        let results = collect_results(
            2,
            "alice range proof failed",
            parties,
            ctx.params.my_id(),
            results,
        )?;

        let mut bob = BobShares {
            betas: ParticipantMap::new(parties.len()),
            nus: ParticipantMap::new(parties.len()),
        };
        for (j, beta, nu, msg) in results {
            bob.betas.put(j, beta);
            bob.nus.put(j, nu);
            out.push(msg);
        }
        self.bob = Some(bob);
        Ok(())
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        _store: &MessageStore,
    ) -> Result<Round3, ProtocolError> {
        self.status.finish()?;
        let bob = self.bob.ok_or_else(|| not_started(2))?;
        Ok(Round3::new(ctx, self.r1, bob))
    }
}
