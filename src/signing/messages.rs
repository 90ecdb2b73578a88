//! The messages exchanged while signing.
//!
//! Every field is a byte string: integers are big endian, points are split
//! into their affine coordinates, and proofs are a fixed number of parts.
//! The constructors take the cryptographic values, and the accessors decode
//! them back, returning nothing on malformed input.
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    abort::AbortPayload,
    ssid::{GAMMA_DLOG_LABEL, MTA_ALICE_LABEL, TPROOF_LABEL},
    SigningContext,
};
use crate::{
    compat::{point_from_coords, point_to_coords, scalar_from_bytes, scalar_to_bytes},
    crypto::{Commitment, Randomizer},
    mta::{range_proof, verify_alice, ProofBob, ProofBobWC, RangeProofAlice},
    participants::ParticipantMap,
    proofs::{dlog, pdl_slack, stproof, tproof, ProofError},
    protocol::{
        message::{Content, ParsedMessage},
        Participant,
    },
    serde::{non_empty_bytes, non_empty_multi_bytes},
};

/// A signing message, with its routing information.
pub type SignMessage = ParsedMessage<MessageContent>;

/// Round 1, sent to each peer: our encrypted `k_i`, with a range proof for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound1Message1 {
    pub c: Vec<u8>,
    pub range_proof_alice: Vec<Vec<u8>>,
}

impl SignRound1Message1 {
    pub fn new(c: &BigNumber, proof: &RangeProofAlice) -> Self {
        Self {
            c: c.to_bytes(),
            range_proof_alice: proof.to_parts(),
        }
    }

    pub fn c(&self) -> BigNumber {
        BigNumber::from_slice(&self.c)
    }

    pub fn range_proof_alice(&self) -> Result<RangeProofAlice, ProofError> {
        RangeProofAlice::from_parts(&self.range_proof_alice)
    }
}

/// Round 1, broadcast: a commitment to `Gamma_i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound1Message2 {
    pub commitment: Vec<u8>,
}

impl SignRound1Message2 {
    pub fn new(commitment: &Commitment) -> Self {
        Self {
            commitment: commitment.as_ref().to_vec(),
        }
    }

    pub fn commitment(&self) -> Option<Commitment> {
        Commitment::from_bytes(&self.commitment)
    }
}

/// Round 2, sent to each peer: Bob's side of both share conversions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound2Message {
    pub c1: Vec<u8>,
    pub c2: Vec<u8>,
    pub proof_bob: Vec<Vec<u8>>,
    pub proof_bob_wc: Vec<Vec<u8>>,
}

impl SignRound2Message {
    pub fn new(
        c1: &BigNumber,
        c2: &BigNumber,
        proof_bob: &ProofBob,
        proof_bob_wc: &ProofBobWC,
    ) -> Result<Self, ProofError> {
        Ok(Self {
            c1: c1.to_bytes(),
            c2: c2.to_bytes(),
            proof_bob: proof_bob.to_parts(),
            proof_bob_wc: proof_bob_wc.to_parts()?,
        })
    }

    pub fn c1(&self) -> BigNumber {
        BigNumber::from_slice(&self.c1)
    }

    pub fn c2(&self) -> BigNumber {
        BigNumber::from_slice(&self.c2)
    }

    pub fn proof_bob(&self) -> Result<ProofBob, ProofError> {
        ProofBob::from_parts(&self.proof_bob)
    }

    pub fn proof_bob_wc(&self) -> Result<ProofBobWC, ProofError> {
        ProofBobWC::from_parts(&self.proof_bob_wc)
    }
}

/// Round 3, broadcast: our `delta_i`, and a commitment to `sigma_i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound3Message {
    pub delta_i: Vec<u8>,
    pub t_i_x: Vec<u8>,
    pub t_i_y: Vec<u8>,
    pub t_proof: Vec<Vec<u8>>,
}

impl SignRound3Message {
    pub fn new(
        delta_i: &Scalar,
        big_t_i: &ProjectivePoint,
        proof: &tproof::Proof,
    ) -> Result<Self, ProofError> {
        let (t_i_x, t_i_y) = point_to_coords(big_t_i)?;
        Ok(Self {
            delta_i: scalar_to_bytes(delta_i),
            t_i_x,
            t_i_y,
            t_proof: proof.to_parts()?,
        })
    }

    pub fn delta_i(&self) -> Option<Scalar> {
        scalar_from_bytes(&self.delta_i)
    }

    pub fn big_t_i(&self) -> Option<ProjectivePoint> {
        point_from_coords(&self.t_i_x, &self.t_i_y)
    }

    pub fn t_proof(&self) -> Result<tproof::Proof, ProofError> {
        tproof::Proof::from_parts(&self.t_proof)
    }
}

/// Round 4, broadcast: the opening of our round 1 commitment, and a proof we know `gamma_i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound4Message {
    /// The randomizer, then the coordinates of `Gamma_i`.
    pub decommitment: Vec<Vec<u8>>,
    pub gamma_proof: Vec<Vec<u8>>,
}

impl SignRound4Message {
    pub fn new(
        randomizer: &Randomizer,
        big_gamma_i: &ProjectivePoint,
        proof: &dlog::Proof,
    ) -> Result<Self, ProofError> {
        let (x, y) = point_to_coords(big_gamma_i)?;
        Ok(Self {
            decommitment: vec![randomizer.as_ref().to_vec(), x, y],
            gamma_proof: proof.to_parts()?,
        })
    }

    pub fn randomizer(&self) -> Option<Randomizer> {
        match self.decommitment.as_slice() {
            [r, _, _] => Randomizer::from_bytes(r),
            _ => None,
        }
    }

    /// The committed coordinates of `Gamma_i`.
    pub fn committed_parts(&self) -> Option<[&[u8]; 2]> {
        match self.decommitment.as_slice() {
            [_, x, y] => Some([x.as_slice(), y.as_slice()]),
            _ => None,
        }
    }

    pub fn big_gamma_i(&self) -> Option<ProjectivePoint> {
        let [x, y] = self.committed_parts()?;
        point_from_coords(x, y)
    }

    pub fn gamma_proof(&self) -> Result<dlog::Proof, ProofError> {
        dlog::Proof::from_parts(&self.gamma_proof)
    }
}

/// Round 5, sent to each peer: `Rbar_i = k_i * R`, with a proof for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound5Message {
    pub r_bar_i_x: Vec<u8>,
    pub r_bar_i_y: Vec<u8>,
    pub pdl_proof: Vec<Vec<u8>>,
}

impl SignRound5Message {
    pub fn new(
        big_r_bar_i: &ProjectivePoint,
        proof: &pdl_slack::Proof,
    ) -> Result<Self, ProofError> {
        let (r_bar_i_x, r_bar_i_y) = point_to_coords(big_r_bar_i)?;
        Ok(Self {
            r_bar_i_x,
            r_bar_i_y,
            pdl_proof: proof.to_parts()?,
        })
    }

    pub fn big_r_bar_i(&self) -> Option<ProjectivePoint> {
        point_from_coords(&self.r_bar_i_x, &self.r_bar_i_y)
    }

    pub fn pdl_proof(&self) -> Result<pdl_slack::Proof, ProofError> {
        pdl_slack::Proof::from_parts(&self.pdl_proof)
    }
}

/// Round 6, broadcast: either our share of `Y` in the exponent, or our secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignRound6Message {
    Success {
        s_i_x: Vec<u8>,
        s_i_y: Vec<u8>,
        st_proof: Vec<Vec<u8>>,
    },
    Abort(AbortPayload),
}

impl SignRound6Message {
    pub fn success(big_s_i: &ProjectivePoint, proof: &stproof::Proof) -> Result<Self, ProofError> {
        let (s_i_x, s_i_y) = point_to_coords(big_s_i)?;
        Ok(Self::Success {
            s_i_x,
            s_i_y,
            st_proof: proof.to_parts()?,
        })
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort(_))
    }

    pub fn big_s_i(&self) -> Option<ProjectivePoint> {
        match self {
            Self::Success { s_i_x, s_i_y, .. } => point_from_coords(s_i_x, s_i_y),
            Self::Abort(_) => None,
        }
    }

    pub fn st_proof(&self) -> Result<stproof::Proof, ProofError> {
        match self {
            Self::Success { st_proof, .. } => stproof::Proof::from_parts(st_proof),
            Self::Abort(_) => Err(ProofError::WrongPartCount {
                expected: stproof::PARTS,
                found: 0,
            }),
        }
    }
}

/// Round 7, broadcast: our share of `s`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignRound7Message {
    pub s_i: Vec<u8>,
}

impl SignRound7Message {
    pub fn new(s_i: &Scalar) -> Self {
        Self {
            s_i: scalar_to_bytes(s_i),
        }
    }

    pub fn s_i(&self) -> Option<Scalar> {
        scalar_from_bytes(&self.s_i)
    }
}

/// The content of any signing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageContent {
    Round1Direct(SignRound1Message1),
    Round1Broadcast(SignRound1Message2),
    Round2(SignRound2Message),
    Round3(SignRound3Message),
    Round4(SignRound4Message),
    Round5(SignRound5Message),
    Round6(SignRound6Message),
    Round7(SignRound7Message),
}

impl Content for MessageContent {
    fn round(&self) -> u8 {
        self.kind().round()
    }
}

/// The kind of a message, which decides its round and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Round1Direct,
    Round1Broadcast,
    Round2,
    Round3,
    Round4,
    Round5,
    Round6,
    Round7,
}

impl MessageKind {
    const COUNT: usize = 8;

    fn slot(self) -> usize {
        self as usize
    }

    pub fn round(self) -> u8 {
        match self {
            Self::Round1Direct | Self::Round1Broadcast => 1,
            Self::Round2 => 2,
            Self::Round3 => 3,
            Self::Round4 => 4,
            Self::Round5 => 5,
            Self::Round6 => 6,
            Self::Round7 => 7,
        }
    }

    pub fn is_broadcast(self) -> bool {
        !matches!(self, Self::Round1Direct | Self::Round2 | Self::Round5)
    }
}

impl MessageContent {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Round1Direct(_) => MessageKind::Round1Direct,
            Self::Round1Broadcast(_) => MessageKind::Round1Broadcast,
            Self::Round2(_) => MessageKind::Round2,
            Self::Round3(_) => MessageKind::Round3,
            Self::Round4(_) => MessageKind::Round4,
            Self::Round5(_) => MessageKind::Round5,
            Self::Round6(_) => MessageKind::Round6,
            Self::Round7(_) => MessageKind::Round7,
        }
    }

    /// Check a message from some party before accepting it.
    ///
    /// Every field must be present and decode, and every proof must have its
    /// exact number of parts. Proofs that only need public values and our own
    /// parameters are fully verified. Proofs which also need our own secrets
    /// or values from other messages are verified when those are available.
    pub(crate) fn validate_basic(&self, from: Participant, ctx: &SigningContext) -> bool {
        match self {
            Self::Round1Direct(m) => {
                if !non_empty_bytes(&m.c)
                    || !non_empty_multi_bytes(&m.range_proof_alice, range_proof::PARTS)
                {
                    return false;
                }
                let Ok(proof) = m.range_proof_alice() else {
                    return false;
                };
                // The proof is made against our parameters.
                let me = ctx.params.me();
                verify_alice(
                    &mut ctx.ssid.fork(MTA_ALICE_LABEL, from, Some(me)),
                    &ctx.key.paillier_pks[from.index()],
                    &m.c(),
                    &proof,
                    &ctx.key.pedersen[me.index()],
                )
                .is_some()
            }
            Self::Round1Broadcast(m) => m.commitment().is_some(),
            Self::Round2(m) => {
                non_empty_bytes(&m.c1)
                    && non_empty_bytes(&m.c2)
                    && m.proof_bob().is_ok()
                    && m.proof_bob_wc().is_ok()
            }
            Self::Round3(m) => {
                let (Some(_), Some(big_t), Ok(proof)) = (m.delta_i(), m.big_t_i(), m.t_proof())
                else {
                    return false;
                };
                tproof::verify(
                    &mut ctx.ssid.fork(TPROOF_LABEL, from, None),
                    tproof::Statement { t: &big_t },
                    &proof,
                )
            }
            Self::Round4(m) => {
                let (Some(_), Some(big_gamma), Ok(proof)) =
                    (m.randomizer(), m.big_gamma_i(), m.gamma_proof())
                else {
                    return false;
                };
                dlog::verify(
                    &mut ctx.ssid.fork(GAMMA_DLOG_LABEL, from, None),
                    dlog::Statement {
                        public: &big_gamma,
                    },
                    &proof,
                )
            }
            Self::Round5(m) => m.big_r_bar_i().is_some() && m.pdl_proof().is_ok(),
            Self::Round6(SignRound6Message::Abort(payload)) => {
                payload.is_well_formed(from, ctx.params.party_count())
            }
            Self::Round6(m) => m.big_s_i().is_some() && m.st_proof().is_ok(),
            Self::Round7(m) => m.s_i().is_some(),
        }
    }
}

struct Stored {
    msg: SignMessage,
    validated: bool,
}

/// The messages received so far, at most one of each kind per party.
///
/// Messages stay here for the whole session, since later rounds and the
/// abort checks need values sent in earlier ones.
pub(crate) struct MessageStore {
    slots: Vec<ParticipantMap<Stored>>,
}

macro_rules! typed_getter {
    ($name:ident, $kind:ident, $ty:ty) => {
        pub fn $name(&self, from: Participant) -> Option<&$ty> {
            match self.content(MessageKind::$kind, from)? {
                MessageContent::$kind(m) => Some(m),
                _ => None,
            }
        }
    };
}

impl MessageStore {
    pub fn new(party_count: usize) -> Self {
        Self {
            slots: (0..MessageKind::COUNT)
                .map(|_| ParticipantMap::new(party_count))
                .collect(),
        }
    }

    /// Keep a message for the round that needs it.
    ///
    /// Returns false if we already have a message of this kind from that party.
    pub fn put(&mut self, msg: SignMessage) -> bool {
        let kind = msg.content.kind();
        let from = msg.from;
        let stored = Stored {
            msg,
            validated: false,
        };
        let fresh = self.slots[kind.slot()].put(from, stored);
        if !fresh {
            debug!(round = kind.round(), peer = from.index(), "ignoring duplicate message");
        }
        fresh
    }

    /// Validate the message of a given kind from some party, if we have it.
    ///
    /// Validation happens at most once per message. A message that fails is
    /// dropped, leaving room for another one.
    pub fn validate(&mut self, kind: MessageKind, from: Participant, ctx: &SigningContext) -> bool {
        let slot = &mut self.slots[kind.slot()];
        let Some(stored) = slot.get_mut(from) else {
            return false;
        };
        if stored.validated {
            return true;
        }
        if stored.msg.content.validate_basic(from, ctx) {
            stored.validated = true;
            debug!(round = kind.round(), peer = from.index(), "accepted message");
            true
        } else {
            slot.take(from);
            warn!(round = kind.round(), peer = from.index(), "rejected invalid message");
            false
        }
    }

    /// The content of a validated message.
    pub fn content(&self, kind: MessageKind, from: Participant) -> Option<&MessageContent> {
        self.slots[kind.slot()]
            .get(from)
            .filter(|s| s.validated)
            .map(|s| &s.msg.content)
    }

    typed_getter!(round1_direct, Round1Direct, SignRound1Message1);
    typed_getter!(round1_broadcast, Round1Broadcast, SignRound1Message2);
    typed_getter!(round2, Round2, SignRound2Message);
    typed_getter!(round3, Round3, SignRound3Message);
    typed_getter!(round4, Round4, SignRound4Message);
    typed_getter!(round5, Round5, SignRound5Message);
    typed_getter!(round6, Round6, SignRound6Message);
    typed_getter!(round7, Round7, SignRound7Message);
}
