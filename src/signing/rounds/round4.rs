use k256::Scalar;
use rand_core::CryptoRngCore;

use super::{accepted, local, not_started, round3::SignerState, Round5, Status};
use crate::{
    proofs::dlog,
    protocol::ProtocolError,
    signing::{
        messages::{MessageContent, MessageKind, MessageStore, SignMessage, SignRound4Message},
        ssid::GAMMA_DLOG_LABEL,
        SigningContext,
    },
};

const KINDS: &[MessageKind] = &[MessageKind::Round4];

pub(crate) struct Round4 {
    pub(super) status: Status,
    state: SignerState,
    delta_inv: Option<Scalar>,
}

impl Round4 {
    pub fn new(ctx: &SigningContext, state: SignerState) -> Self {
        Self {
            status: Status::new(4, KINDS, ctx),
            state,
            delta_inv: None,
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
        let me = ctx.params.me();

        let mut delta = self.state.delta_i;
        for j in ctx.params.parties().others(me) {
            let msg = accepted(store.round3(j), 4, j)?;
            let delta_j = accepted(msg.delta_i(), 4, j)?;
            delta += delta_j;
        }
        let delta_inv =
            Option::<Scalar>::from(delta.invert()).ok_or_else(|| ProtocolError::Consistency {
                round: 4,
                reason: "delta is zero".to_string(),
            })?;

        let nonces = &self.state.nonces;
        let proof = dlog::prove(
            rng,
            &mut ctx.ssid.fork(GAMMA_DLOG_LABEL, me, None),
            dlog::Statement {
                public: &nonces.big_gamma_i,
            },
            dlog::Witness {
                x: &nonces.gamma_i,
            },
        );
        let content = SignRound4Message::new(&nonces.randomizer, &nonces.big_gamma_i, &proof)
            .map_err(|e| local(ctx, 4, e))?;
        out.push(
            SignMessage::broadcast(me, MessageContent::Round4(content))
                .map_err(|e| local(ctx, 4, e))?,
        );

        self.delta_inv = Some(delta_inv);
        Ok(())
    }

    pub fn next(
        self,
        ctx: &SigningContext,
        _store: &MessageStore,
    ) -> Result<Round5, ProtocolError> {
        self.status.finish()?;
        let delta_inv = self.delta_inv.ok_or_else(|| not_started(4))?;
        Ok(Round5::new(ctx, self.state, delta_inv))
    }
}
