//! The rounds of signing, as a chain of states.
//!
//! Each round holds only the secrets it still needs. Once every peer's
//! message for a round has been accepted, `next` consumes the round and moves
//! what's left into the following one, until the signature comes out.
use std::fmt::Display;

use rand_core::CryptoRngCore;
use tracing::info;

use super::{
    messages::{MessageKind, MessageStore, SignMessage},
    SignatureData, SigningContext,
};
use crate::protocol::{
    internal::{branch_rng, BranchError},
    Participant, ProtocolError,
};

mod finalize;
mod round1;
mod round2;
mod round3;
mod round4;
mod round5;
mod round6;
mod round7;

pub(crate) use round1::Round1;
pub(crate) use round2::Round2;
pub(crate) use round3::Round3;
pub(crate) use round4::Round4;
pub(crate) use round5::Round5;
pub(crate) use round6::Round6;
pub(crate) use round7::Round7;

/// Where a round stands: whether we've started it, and which peers we've heard from.
pub(crate) struct Status {
    round: u8,
    kinds: &'static [MessageKind],
    started: bool,
    ok: Vec<bool>,
}

impl Status {
    fn new(round: u8, kinds: &'static [MessageKind], ctx: &SigningContext) -> Self {
        let mut ok = vec![false; ctx.params.party_count()];
        ok[ctx.params.me().index()] = true;
        Self {
            round,
            kinds,
            started: false,
            ok,
        }
    }

    fn begin(&mut self, ctx: &SigningContext) -> Result<(), ProtocolError> {
        if self.started {
            return Err(ProtocolError::Sequence(format!(
                "round {} was already started",
                self.round
            )));
        }
        if ctx.cancel.is_cancelled() {
            return Err(ProtocolError::Cancelled);
        }
        self.started = true;
        info!(round = self.round, party = %ctx.params.my_id(), "starting round");
        Ok(())
    }

    /// Try to accept the message of each peer we haven't heard from yet.
    fn update(&mut self, ctx: &SigningContext, store: &mut MessageStore) -> bool {
        for p in ctx.params.parties().others(ctx.params.me()) {
            if self.ok[p.index()] {
                continue;
            }
            self.ok[p.index()] = self.kinds.iter().all(|kind| store.validate(*kind, p, ctx));
        }
        self.started && self.ok.iter().all(|x| *x)
    }

    fn can_accept(&self, msg: &SignMessage) -> bool {
        let kind = msg.content.kind();
        self.kinds.contains(&kind) && msg.is_broadcast() == kind.is_broadcast()
    }

    fn finish(&self) -> Result<(), ProtocolError> {
        if !self.started {
            return Err(ProtocolError::Sequence(format!(
                "round {} has not started",
                self.round
            )));
        }
        if let Some(j) = self.ok.iter().position(|x| !*x) {
            return Err(ProtocolError::Sequence(format!(
                "round {} is still waiting for participant {j}",
                self.round
            )));
        }
        Ok(())
    }
}

/// A state in the signing session.
pub(crate) enum Round {
    One(Round1),
    Two(Round2),
    Three(Round3),
    Four(Round4),
    Five(Round5),
    Six(Round6),
    Seven(Round7),
    Terminal(SignatureData),
}

macro_rules! each_round {
    ($round:expr, $r:ident => $body:expr, Terminal => $terminal:expr) => {
        match $round {
            Round::One($r) => $body,
            Round::Two($r) => $body,
            Round::Three($r) => $body,
            Round::Four($r) => $body,
            Round::Five($r) => $body,
            Round::Six($r) => $body,
            Round::Seven($r) => $body,
            Round::Terminal(_) => $terminal,
        }
    };
}

fn session_over() -> ProtocolError {
    ProtocolError::Sequence("the session is already over".to_string())
}

impl Round {
    pub fn new(ctx: &SigningContext) -> Self {
        Round::One(Round1::new(ctx))
    }

    /// The number of this round, with the terminal state counting as 8.
    pub fn number(&self) -> u8 {
        each_round!(self, r => r.status.round, Terminal => 8)
    }

    pub fn is_started(&self) -> bool {
        each_round!(self, r => r.status.started, Terminal => true)
    }

    /// Do our part of this round, placing the messages to send in `out`.
    pub fn start(
        &mut self,
        ctx: &SigningContext,
        store: &MessageStore,
        rng: &mut impl CryptoRngCore,
        out: &mut Vec<SignMessage>,
    ) -> Result<(), ProtocolError> {
        each_round!(self, r => r.start(ctx, store, rng, out), Terminal => Err(session_over()))
    }

    /// Accept whatever peer messages we can, returning true once the round is complete.
    ///
    /// This never redoes work for a peer whose message was already accepted.
    pub fn update(&mut self, ctx: &SigningContext, store: &mut MessageStore) -> bool {
        each_round!(self, r => r.status.update(ctx, store), Terminal => false)
    }

    /// Check whether a message belongs to this round.
    pub fn can_accept(&self, msg: &SignMessage) -> bool {
        each_round!(self, r => r.status.can_accept(msg), Terminal => false)
    }

    /// Move on to the next round, once this one is complete.
    pub fn next(self, ctx: &SigningContext, store: &MessageStore) -> Result<Round, ProtocolError> {
        Ok(match self {
            Round::One(r) => Round::Two(r.next(ctx, store)?),
            Round::Two(r) => Round::Three(r.next(ctx, store)?),
            Round::Three(r) => Round::Four(r.next(ctx, store)?),
            Round::Four(r) => Round::Five(r.next(ctx, store)?),
            Round::Five(r) => Round::Six(r.next(ctx, store)?),
            Round::Six(r) => Round::Seven(r.next(ctx, store)?),
            Round::Seven(r) => Round::Terminal(r.next(ctx, store)?),
            Round::Terminal(_) => return Err(session_over()),
        })
    }
}

/// A failure of our own, in a given round.
fn local(ctx: &SigningContext, round: u8, reason: impl Display) -> ProtocolError {
    ProtocolError::Local {
        round,
        party: ctx.params.my_id().clone(),
        reason: reason.to_string(),
    }
}

fn local_branch(reason: impl Display) -> BranchError {
    BranchError::Local(reason.to_string())
}

/// A message that was accepted before the round completed, but isn't there.
fn missing(from: Participant) -> BranchError {
    BranchError::Local(format!("no accepted message from participant {}", from.index()))
}

fn accepted<T>(x: Option<T>, round: u8, from: Participant) -> Result<T, ProtocolError> {
    x.ok_or_else(|| {
        ProtocolError::AssertionFailed(format!(
            "round {round}: no accepted message from participant {}",
            from.index()
        ))
    })
}

fn not_started(round: u8) -> ProtocolError {
    ProtocolError::Sequence(format!("round {round} has not started"))
}

/// One rng per peer, for parallel work.
fn peer_rngs(
    ctx: &SigningContext,
    rng: &mut impl CryptoRngCore,
) -> Vec<(Participant, impl CryptoRngCore + Send)> {
    ctx.params
        .parties()
        .others(ctx.params.me())
        .map(|j| (j, branch_rng(&mut *rng)))
        .collect()
}

#[cfg(test)]
mod test {
    use k256::Scalar;
    use rand_core::OsRng;

    use super::*;
    use crate::{
        protocol::message::ParsedMessage,
        signing::{
            messages::{MessageContent, SignRound7Message},
            Message, Parameters,
        },
        test::fixtures,
    };

    /// Everyone's context, and their first round already started.
    fn started_round1() -> (Vec<SigningContext>, Vec<Round>, Vec<SignMessage>) {
        let shares = fixtures::deal(&mut OsRng, 3, 2);
        let ids = fixtures::party_ids(3);
        let mut contexts = Vec::new();
        let mut rounds = Vec::new();
        let mut sent = Vec::new();
        for (i, share) in shares.iter().enumerate() {
            let params = Parameters::new(ids.ids().to_vec(), &ids.ids()[i], 2, b"nonce").unwrap();
            let ctx = SigningContext::new(params, share, Message::hashed(b"Hello world")).unwrap();
            let store = MessageStore::new(3);
            let mut round = Round::new(&ctx);
            round.start(&ctx, &store, &mut OsRng, &mut sent).unwrap();
            contexts.push(ctx);
            rounds.push(round);
        }
        (contexts, rounds, sent)
    }

    fn deliver(store: &mut MessageStore, sent: &[SignMessage], to: Participant) {
        for msg in sent.iter().filter(|m| m.from != to && m.is_for(to)) {
            let parsed: SignMessage = ParsedMessage::from_wire(msg.to_wire(), msg.from).unwrap();
            store.put(parsed);
        }
    }

    /// Run three parties round by round, with no peer ever missing a message.
    ///
    /// `before_start` sees each party's round just before it starts.
    fn run_lockstep(
        mut before_start: impl FnMut(Participant, &mut Round),
    ) -> Vec<Result<SignatureData, ProtocolError>> {
        let shares = fixtures::deal(&mut OsRng, 3, 2);
        let ids = fixtures::party_ids(3);
        let contexts: Vec<SigningContext> = shares
            .iter()
            .enumerate()
            .map(|(i, share)| {
                let params =
                    Parameters::new(ids.ids().to_vec(), &ids.ids()[i], 2, b"nonce").unwrap();
                SigningContext::new(params, share, Message::hashed(b"Hello world")).unwrap()
            })
            .collect();
        let mut stores: Vec<MessageStore> = (0..3).map(|_| MessageStore::new(3)).collect();
        let mut rounds: Vec<Option<Round>> =
            contexts.iter().map(|ctx| Some(Round::new(ctx))).collect();
        let mut results: Vec<Option<Result<SignatureData, ProtocolError>>> =
            (0..3).map(|_| None).collect();

        while rounds.iter().any(Option::is_some) {
            let mut sent = Vec::new();
            for (i, ctx) in contexts.iter().enumerate() {
                let Some(round) = rounds[i].as_mut() else {
                    continue;
                };
                before_start(ctx.params.me(), round);
                if let Err(e) = round.start(ctx, &stores[i], &mut OsRng, &mut sent) {
                    results[i] = Some(Err(e));
                    rounds[i] = None;
                }
            }
            for (i, store) in stores.iter_mut().enumerate() {
                deliver(store, &sent, Participant::from(i as u32));
            }
            for (i, ctx) in contexts.iter().enumerate() {
                let Some(mut round) = rounds[i].take() else {
                    continue;
                };
                assert!(round.update(ctx, &mut stores[i]), "party {i} is missing messages");
                match round.next(ctx, &stores[i]) {
                    Ok(Round::Terminal(sig)) => results[i] = Some(Ok(sig)),
                    Ok(next) => rounds[i] = Some(next),
                    Err(e) => results[i] = Some(Err(e)),
                }
            }
        }
        results.into_iter().map(Option::unwrap).collect()
    }

    #[test]
    fn test_lockstep_signing() {
        let results = run_lockstep(|_, _| {});
        let sigs: Vec<SignatureData> = results.into_iter().map(Result::unwrap).collect();
        assert!(sigs.iter().all(|s| s == &sigs[0]));
    }

    #[test]
    fn test_lying_bob_is_found_after_abort() {
        let liar = Participant::from(2u32);
        // The liar's delta_i agrees with its bad share, so nothing fails until
        // the nonce check.
        let results = run_lockstep(|me, round| {
            if let Round::Three(r) = round {
                if me == liar {
                    r.skew_beta(Participant::from(0u32), &Scalar::ONE);
                }
            }
        });
        for result in results {
            let Err(ProtocolError::Aborted { round: 7, record }) = result else {
                panic!("every party should abort in round 7");
            };
            let culprits: Vec<String> = record.culprits.iter().map(|p| p.id.clone()).collect();
            assert_eq!(culprits, vec!["3"]);
            assert!(record.revealed.iter().all(Option::is_some));
        }
    }

    #[test]
    fn test_update_is_idempotent() {
        let (contexts, mut rounds, sent) = started_round1();
        let me = Participant::from(0u32);
        let mut store = MessageStore::new(3);

        assert!(!rounds[0].update(&contexts[0], &mut store));
        deliver(&mut store, &sent, me);
        assert!(rounds[0].update(&contexts[0], &mut store));
        assert!(rounds[0].update(&contexts[0], &mut store));
        // Duplicates are ignored.
        deliver(&mut store, &sent, me);
        assert!(rounds[0].update(&contexts[0], &mut store));
    }

    #[test]
    fn test_rounds_run_in_order() {
        let (contexts, mut rounds, sent) = started_round1();
        let ctx = &contexts[0];
        let store = MessageStore::new(3);

        let round = rounds.remove(0);
        assert!(matches!(
            round.next(ctx, &store),
            Err(ProtocolError::Sequence(_))
        ));

        let mut fresh = Round::new(ctx);
        assert!(matches!(
            Round::new(ctx).next(ctx, &store),
            Err(ProtocolError::Sequence(_))
        ));
        let mut out = Vec::new();
        fresh.start(ctx, &store, &mut OsRng, &mut out).unwrap();
        assert!(matches!(
            fresh.start(ctx, &store, &mut OsRng, &mut out),
            Err(ProtocolError::Sequence(_))
        ));

        let direct = sent
            .iter()
            .find(|m| matches!(m.content, MessageContent::Round1Direct(_)))
            .unwrap();
        let late = SignMessage::broadcast(
            Participant::from(1u32),
            MessageContent::Round7(SignRound7Message { s_i: vec![1] }),
        )
        .unwrap();
        assert!(fresh.can_accept(direct));
        assert!(!fresh.can_accept(&late));
    }
}
