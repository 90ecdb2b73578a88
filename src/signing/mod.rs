//! Threshold signing, following GG20 with identifiable aborts.
//!
//! Each signer drives a [`LocalParty`] through seven rounds:
//!
//! 1. Everyone samples `k_i` and `gamma_i`, sends their encrypted `k_i` to
//!    each peer, and commits to `Gamma_i = gamma_i * G`.
//! 2. Each pair runs two share conversions, producing additive shares of
//!    `k_i * gamma_j` and `k_i * w_j`.
//! 3. Everyone publishes `delta_i`, their share of `k * gamma`, and a
//!    commitment `T_i` to `sigma_i`, their share of `k * x`.
//! 4. Everyone opens `Gamma_i`.
//! 5. Everyone computes `R = delta^-1 * Gamma`, and sends `Rbar_i = k_i * R`
//!    with a proof that it matches their encrypted `k_i`.
//! 6. If the `Rbar_i` sum to `G`, everyone publishes `S_i = sigma_i * R`.
//!    Otherwise, everyone reveals their secrets, and the cheaters are found.
//! 7. If the `S_i` sum to the public key, everyone publishes their share of `s`.
//!
//! Every proof is bound to the session through a transcript derived from the
//! parties, their keys, and a nonce agreed on by the caller.
use std::collections::VecDeque;

use k256::{
    ecdsa::{signature::hazmat::PrehashVerifier, Signature, VerifyingKey},
    ProjectivePoint, Scalar,
};
use rand_core::{CryptoRngCore, OsRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    compat::{message_digest, reduce_bytes},
    keyshare::SaveData,
    participants::{PartyId, SortedPartyIds},
    protocol::{
        internal::CancelToken, message::ParsedMessage, Action, InitializationError, MessageData,
        Participant, Protocol, ProtocolError,
    },
};

pub mod abort;
pub mod messages;
mod rounds;
mod ssid;

pub use abort::{AbortPayload, PairwiseShares};
pub use messages::{MessageContent, SignMessage};

use messages::MessageStore;
use rounds::Round;
use ssid::SessionId;

/// The configuration of a signing session, shared by every round.
#[derive(Debug, Clone)]
pub struct Parameters {
    parties: SortedPartyIds,
    me: Participant,
    threshold: usize,
    nonce: Vec<u8>,
}

impl Parameters {
    /// Describe a session between some signers.
    ///
    /// `threshold` is the degree of the sharing, so at least `threshold + 1`
    /// parties must sign. The nonce must be the same for every signer, and
    /// fresh for each session.
    pub fn new(
        parties: Vec<PartyId>,
        me: &PartyId,
        threshold: usize,
        nonce: &[u8],
    ) -> Result<Self, InitializationError> {
        if parties.len() < 2 {
            return Err(InitializationError::BadParameters(format!(
                "participant count cannot be < 2, found: {}",
                parties.len()
            )));
        }
        if parties.len() <= threshold {
            return Err(InitializationError::BadParameters(format!(
                "threshold {threshold} needs more than {} participants",
                parties.len()
            )));
        }
        let parties = SortedPartyIds::new(parties).ok_or_else(|| {
            InitializationError::BadParameters(
                "party keys must be distinct and non-zero".to_string(),
            )
        })?;
        let me = parties.index_of(me).ok_or_else(|| {
            InitializationError::BadParameters(format!("{me} is not one of the signers"))
        })?;
        Ok(Self {
            parties,
            me,
            threshold,
            nonce: nonce.to_vec(),
        })
    }

    pub fn parties(&self) -> &SortedPartyIds {
        &self.parties
    }

    pub fn me(&self) -> Participant {
        self.me
    }

    pub fn my_id(&self) -> &PartyId {
        &self.parties.ids()[self.me.index()]
    }

    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }
}

/// The message being signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    digest: [u8; 32],
    preimage: Option<Vec<u8>>,
}

impl Message {
    /// Sign a digest computed elsewhere.
    ///
    /// **WARNING** this must really be the hash of a message. Signing
    /// arbitrary values chosen by someone else is unsafe.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self {
            digest,
            preimage: None,
        }
    }

    /// Sign the SHA-256 hash of a message.
    pub fn hashed(msg: &[u8]) -> Self {
        Self {
            digest: message_digest(msg),
            preimage: Some(msg.to_vec()),
        }
    }

    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }

    pub(crate) fn scalar(&self) -> Scalar {
        reduce_bytes(&self.digest)
    }
}

/// A finished signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    pub r: [u8; 32],
    /// Always in the lower half of the scalar field.
    pub s: [u8; 32],
    /// `r || s`
    pub signature: Vec<u8>,
    pub recovery_id: u8,
    /// The digest that was signed.
    pub m: [u8; 32],
    /// The message that was hashed, if we did the hashing.
    pub message: Option<Vec<u8>>,
}

impl SignatureData {
    pub(crate) fn new(r: &Scalar, s: &Scalar, recovery_id: u8, msg: &Message) -> Self {
        let r: [u8; 32] = r.to_bytes().into();
        let s: [u8; 32] = s.to_bytes().into();
        Self {
            r,
            s,
            signature: [r, s].concat(),
            recovery_id,
            m: msg.digest,
            message: msg.preimage.clone(),
        }
    }

    pub fn to_ecdsa(&self) -> Result<Signature, k256::ecdsa::Error> {
        Signature::from_slice(&self.signature)
    }

    /// Check this signature against a public key.
    #[must_use]
    pub fn verify(&self, public_key: &ProjectivePoint) -> bool {
        let Ok(key) = VerifyingKey::from_affine(public_key.to_affine()) else {
            return false;
        };
        let Ok(sig) = self.to_ecdsa() else {
            return false;
        };
        key.verify_prehash(&self.m, &sig).is_ok()
    }
}

/// Everything the rounds of a session read.
pub(crate) struct SigningContext {
    pub params: Parameters,
    /// Our key share, restricted to the signers.
    pub key: SaveData,
    pub ssid: SessionId,
    pub msg: Message,
    pub cancel: CancelToken,
}

impl SigningContext {
    pub fn new(
        params: Parameters,
        key: &SaveData,
        msg: Message,
    ) -> Result<Self, InitializationError> {
        if key.share_id != params.my_id().key {
            return Err(InitializationError::BadParameters(format!(
                "the key share doesn't belong to {}",
                params.my_id()
            )));
        }
        let key = key.subset(params.parties()).ok_or_else(|| {
            InitializationError::BadParameters(
                "some signers don't hold a share of this key".to_string(),
            )
        })?;
        let ssid = SessionId::new(&params, &key);
        Ok(Self {
            params,
            key,
            ssid,
            msg,
            cancel: CancelToken::new(),
        })
    }
}

/// One signer's side of a signing session.
///
/// Deliver messages from the other signers with [`Protocol::message`], and
/// [`Protocol::poke`] for messages to send, until a signature comes out.
pub struct LocalParty<R = OsRng> {
    ctx: SigningContext,
    store: MessageStore,
    /// None once the session has failed.
    round: Option<Round>,
    outgoing: VecDeque<SignMessage>,
    rng: R,
    returned: bool,
}

impl<R: CryptoRngCore> LocalParty<R> {
    pub fn new(
        params: Parameters,
        key: &SaveData,
        msg: Message,
        rng: R,
    ) -> Result<Self, InitializationError> {
        let ctx = SigningContext::new(params, key, msg)?;
        let store = MessageStore::new(ctx.params.party_count());
        let round = Round::new(&ctx);
        Ok(Self {
            ctx,
            store,
            round: Some(round),
            outgoing: VecDeque::new(),
            rng,
            returned: false,
        })
    }

    /// The round we're in, or None if the session failed.
    pub fn round_number(&self) -> Option<u8> {
        self.round.as_ref().map(Round::number)
    }

    /// A handle to cancel this session, from anywhere.
    pub fn cancel_token(&self) -> CancelToken {
        self.ctx.cancel.clone()
    }

    pub fn party_id(&self) -> &PartyId {
        self.ctx.params.my_id()
    }

    fn fail(&mut self, err: ProtocolError) -> ProtocolError {
        warn!(party = %self.ctx.params.my_id(), error = %err, "signing failed");
        self.round = None;
        err
    }
}

/// Start signing a message, as one of the parties in `params`.
pub fn sign(
    params: Parameters,
    key: &SaveData,
    msg: Message,
) -> Result<LocalParty, InitializationError> {
    LocalParty::new(params, key, msg, OsRng)
}

impl<R: CryptoRngCore> Protocol for LocalParty<R> {
    type Output = SignatureData;

    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError> {
        loop {
            if let Some(msg) = self.outgoing.pop_front() {
                let to = msg.to.clone();
                let wire = msg.into_wire();
                return match to.as_deref() {
                    None => Ok(Action::SendMany(wire)),
                    Some(&[to]) => Ok(Action::SendPrivate(to, wire)),
                    Some(_) => Err(self.fail(ProtocolError::AssertionFailed(
                        "direct messages have exactly one recipient".to_string(),
                    ))),
                };
            }
            if self.ctx.cancel.is_cancelled() && self.round.is_some() && !self.returned {
                return Err(self.fail(ProtocolError::Cancelled));
            }
            let Some(round) = self.round.as_mut() else {
                return Err(ProtocolError::Sequence(
                    "the session has already ended".to_string(),
                ));
            };
            if let Round::Terminal(sig) = round {
                if self.returned {
                    return Ok(Action::Wait);
                }
                self.returned = true;
                return Ok(Action::Return(sig.clone()));
            }
            if !round.is_started() {
                let mut out = Vec::new();
                let started = round.start(&self.ctx, &self.store, &mut self.rng, &mut out);
                if let Err(e) = started {
                    return Err(self.fail(e));
                }
                self.outgoing.extend(out);
                continue;
            }
            if !round.update(&self.ctx, &mut self.store) {
                return Ok(Action::Wait);
            }
            let Some(round) = self.round.take() else {
                continue;
            };
            match round.next(&self.ctx, &self.store) {
                Ok(next) => self.round = Some(next),
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn message(&mut self, from: Participant, data: MessageData) {
        let me = self.ctx.params.me();
        if from == me {
            debug!(party = %self.ctx.params.my_id(), "ignoring message from ourselves");
            return;
        }
        if from.index() >= self.ctx.params.party_count() {
            warn!(peer = from.index(), "ignoring message from unknown participant");
            return;
        }
        let msg: SignMessage = match ParsedMessage::from_wire(&data, from) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(peer = from.index(), error = %e, "dropping unparseable message");
                return;
            }
        };
        if !msg.is_for(me) {
            warn!(peer = from.index(), "dropping message addressed to someone else");
            return;
        }
        if msg.is_broadcast() != msg.content.kind().is_broadcast() {
            warn!(peer = from.index(), "dropping message with the wrong routing");
            return;
        }
        if let Some(round) = &self.round {
            if !round.can_accept(&msg) {
                debug!(
                    peer = from.index(),
                    round = round.number(),
                    "keeping message for another round"
                );
            }
        }
        self.store.put(msg);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test::fixtures;

    #[test]
    fn test_parameters_are_checked() {
        let ids = fixtures::party_ids(3);
        let all = ids.ids().to_vec();
        let me = &all[0];

        assert!(Parameters::new(all.clone(), me, 2, b"nonce").is_ok());
        assert!(Parameters::new(all.clone(), me, 3, b"nonce").is_err());
        assert!(Parameters::new(all[..1].to_vec(), me, 0, b"nonce").is_err());
        assert!(Parameters::new(all[1..].to_vec(), me, 1, b"nonce").is_err());

        let mut duplicated = all.clone();
        duplicated[1].key = duplicated[0].key.clone();
        assert!(Parameters::new(duplicated, me, 1, b"nonce").is_err());
    }

    #[test]
    fn test_hashed_message_keeps_preimage() {
        let msg = Message::hashed(b"Hello world");
        assert_eq!(msg.preimage.as_deref(), Some(&b"Hello world"[..]));
        assert_eq!(
            msg.digest()[..4],
            [0x64, 0xec, 0x88, 0xca],
            "SHA-256 of the message"
        );
        assert_eq!(Message::from_digest(*msg.digest()).preimage, None);
    }
}
