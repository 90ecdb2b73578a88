use elliptic_curve::Field;
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand_core::CryptoRngCore;
use zeroize::Zeroizing;

use super::{local, local_branch, not_started, peer_rngs, Round2, Status};
use crate::{
    compat::point_to_coords,
    crypto::{commit, Randomizer},
    mta::alice_init,
    protocol::{
        internal::{collect_results, fan_out},
        ProtocolError,
    },
    signing::{
        messages::{
            MessageContent, MessageKind, MessageStore, SignMessage, SignRound1Message1,
            SignRound1Message2,
        },
        ssid::MTA_ALICE_LABEL,
        SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round1Direct, MessageKind::Round1Broadcast];

/// Our shares of the nonce, kept until the end in case we need to reveal them.
pub(crate) struct Nonces {
    pub k_i: Zeroizing<Scalar>,
    pub gamma_i: Zeroizing<Scalar>,
    pub big_gamma_i: ProjectivePoint,
    /// The encryption of `k_i` under our own key.
    pub c_i: BigNumber,
    pub k_randomness: Zeroizing<BigNumber>,
    /// Opens our commitment to `Gamma_i`.
    pub randomizer: Randomizer,
}

pub(crate) struct Round1Secrets {
    pub nonces: Nonces,
    /// Our additive share of the key, `lambda_i * x_i`.
    pub w_i: Zeroizing<Scalar>,
    /// Everyone's `W_j = lambda_j * X_j`.
    pub big_ws: Vec<ProjectivePoint>,
}

pub(crate) struct Round1 {
    pub(super) status: Status,
    secrets: Option<Round1Secrets>,
}

impl Round1 {
    pub fn new(ctx: &SigningContext) -> Self {
        Self {
            status: Status::new(1, KINDS, ctx),
            secrets: None,
        }
    }

    pub fn start(
        &mut self,
        ctx: &SigningContext,
        _store: &MessageStore,
        rng: &mut impl CryptoRngCore,
        out: &mut Vec<SignMessage>,
    ) -> Result<(), ProtocolError> {
        self.status.begin(ctx)?;
        let parties = ctx.params.parties();
        let me = ctx.params.me();

        // Convert our Shamir share into an additive share over the signers.
        let w_i = Zeroizing::new(parties.lagrange(me) * ctx.key.xi);
        let big_ws: Vec<ProjectivePoint> = parties
            .participants()
            .map(|j| ctx.key.big_xj[j.index()] * parties.lagrange(j))
            .collect();

        let k_i = Zeroizing::new(Scalar::random(&mut *rng));
        let gamma_i = Zeroizing::new(Scalar::random(&mut *rng));
        let big_gamma_i = ProjectivePoint::GENERATOR * *gamma_i;
        let (x, y) = point_to_coords(&big_gamma_i).map_err(|e| local(ctx, 1, e))?;
        let (commitment, randomizer) = commit(rng, &[&x, &y]);

        let ek = ctx.key.paillier_sk.encryption_key();
        let init = alice_init(rng, ek, &k_i).map_err(|e| local(ctx, 1, e))?;

        // Each peer checks the range proof against their own parameters.
        let results = fan_out(peer_rngs(ctx, rng), &ctx.cancel, |(j, mut rng)| {
            let proof = init
                .prove(
                    &mut rng,
                    &mut ctx.ssid.fork(MTA_ALICE_LABEL, me, Some(j)),
                    ek,
                    &k_i,
                    &ctx.key.pedersen[j.index()],
                )
                .map_err(local_branch)?;
            let content = SignRound1Message1::new(&init.ciphertext, &proof);
            SignMessage::direct(me, j, MessageContent::Round1Direct(content)).map_err(local_branch)
        });
        out.extend(collect_results(1, "range proof failed", parties, ctx.params.my_id(), results)?);

        let content = SignRound1Message2::new(&commitment);
        out.push(
            SignMessage::broadcast(me, MessageContent::Round1Broadcast(content))
                .map_err(|e| local(ctx, 1, e))?,
        );

        self.secrets = Some(Round1Secrets {
            nonces: Nonces {
                k_i,
                gamma_i,
                big_gamma_i,
                c_i: init.ciphertext,
                k_randomness: init.nonce,
                randomizer,
            },
            w_i,
            big_ws,
        });
        Ok(())
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        _store: &MessageStore,
    ) -> Result<Round2, ProtocolError> {
        self.status.finish()?;
        let secrets = self.secrets.ok_or_else(|| not_started(1))?;
        Ok(Round2::new(ctx, secrets))
    }
}
