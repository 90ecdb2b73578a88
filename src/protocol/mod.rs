//! This module provides abstractions for working with protocols.
//!
//! This library tries to abstract away as much of the internal machinery
//! of protocols as much as possible. To use a protocol, you just need to be able
//! to deliver messages to and from that protocol, and eventually it will produce
//! a result, without you having to worry about how many rounds it has, or how
//! to serialize the messages it produces.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::participants::PartyId;

/// Represents an error which can happen when running a protocol.
///
/// Errors caused by other parties carry the list of parties to blame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Some parties sent data which failed cryptographic verification.
    #[error("round {round}: {reason}, culprits: {}", display_ids(.culprits))]
    Culprits {
        round: u8,
        reason: String,
        culprits: Vec<PartyId>,
    },
    /// The session aborted, and the revealed secrets identified who caused it.
    #[error("round {round}: signing aborted, culprits: {}", display_ids(&.record.culprits))]
    Aborted { round: u8, record: Box<AbortRecord> },
    /// This party failed to perform one of its own steps.
    #[error("round {round}: local failure at {party}: {reason}")]
    Local {
        round: u8,
        party: PartyId,
        reason: String,
    },
    /// A check over everyone's combined contributions failed, without anyone to blame.
    #[error("round {round}: consistency check failed: {reason}")]
    Consistency { round: u8, reason: String },
    /// Rounds were driven out of order.
    #[error("protocol sequence error: {0}")]
    Sequence(String),
    /// The session was cancelled.
    #[error("the session was cancelled")]
    Cancelled,
    /// Some assertion in the protocol failed.
    #[error("assertion failed {0}")]
    AssertionFailed(String),
}

impl ProtocolError {
    /// The parties blamed by this error, if any.
    pub fn culprits(&self) -> &[PartyId] {
        match self {
            ProtocolError::Culprits { culprits, .. } => culprits,
            ProtocolError::Aborted { record, .. } => &record.culprits,
            _ => &[],
        }
    }
}

fn display_ids(ids: &[PartyId]) -> String {
    let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
    ids.join(", ")
}

/// The outcome of identifying the parties responsible for an abort.
#[derive(Debug, Clone)]
pub struct AbortRecord {
    /// The parties found to have cheated, in index order.
    pub culprits: Vec<PartyId>,
    /// The secrets each party revealed, in index order.
    ///
    /// A party that didn't reveal anything has no entry.
    pub revealed: Vec<Option<crate::signing::AbortPayload>>,
}

/// Represents an error which can happen when *initializing* a protocol.
///
/// These are related to bad parameters for the protocol, and things like that.
///
/// These are usually more recoverable than other protocol errors.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("bad parameters: {0}")]
    BadParameters(String),
}

/// Represents a participant in the protocol.
///
/// This is the position of a party in the sorted list of parties for a
/// session. In our case, we use a `u32`, which is enough for billions of
/// participants. That said, you won't actually be able to make the protocols
/// work with billions of users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
pub struct Participant(u32);

impl Participant {
    /// Return this participant as little endian bytes.
    pub fn bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// Return this participant as an index into per-party vectors.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<Participant> for u32 {
    fn from(p: Participant) -> Self {
        p.0
    }
}

impl From<u32> for Participant {
    fn from(x: u32) -> Self {
        Participant(x)
    }
}

/// Represents the data making up a message.
///
/// We choose to just represent messages as opaque vectors of bytes, with all
/// the serialization logic handled internally.
pub type MessageData = Vec<u8>;

/// Represents an action by a participant in the protocol.
///
/// The basic flow is that each participant receives messages from other participants,
/// and then reacts with some kind of action.
///
/// This action can consist of sending a message, doing nothing, etc.
///
/// Eventually, the participant returns a value, ending the protocol.
#[derive(Debug, Clone)]
pub enum Action<T> {
    /// Don't do anything.
    Wait,
    /// Send a message to all other participants.
    ///
    /// Participants *never* sends messages to themselves.
    SendMany(MessageData),
    /// Send a private message to another participant.
    ///
    /// It's imperative that only this participant can read this message,
    /// so you might want to use some form of encryption.
    SendPrivate(Participant, MessageData),
    /// End the protocol by returning a value.
    Return(T),
}

/// A trait for protocols.
///
/// Basically, this represents a struct for the behavior of a single participant
/// in a protocol. The idea is that the computation of that participant is driven
/// mainly by receiving messages from other participants.
pub trait Protocol {
    type Output;

    /// Poke the protocol, receiving a new action.
    ///
    /// The idea is that the protocol should be poked until it returns an error,
    /// or it returns an action with a return value, or it returns a wait action.
    ///
    /// Upon returning a wait action, that protocol will not advance any further
    /// until a new message arrives.
    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError>;

    /// Inform the protocol of a new message.
    fn message(&mut self, from: Participant, data: MessageData);
}

/// Run a protocol to completion, synchronously.
///
/// This works by executing each participant in order.
///
/// The reason this function exists is as a convenient testing utility.
/// In practice each protocol participant is likely running on a different machine,
/// and so orchestrating the protocol would happen differently.
pub fn run_protocol<T>(
    mut ps: Vec<(Participant, Box<dyn Protocol<Output = T>>)>,
) -> Result<Vec<(Participant, T)>, ProtocolError> {
    let indices: HashMap<Participant, usize> =
        ps.iter().enumerate().map(|(i, (p, _))| (*p, i)).collect();

    let size = ps.len();
    let mut out = Vec::with_capacity(size);
    while out.len() < size {
        let mut progressed = false;
        for i in 0..size {
            while {
                let action = ps[i].1.poke()?;
                match action {
                    Action::Wait => false,
                    Action::SendMany(m) => {
                        for j in 0..size {
                            if i == j {
                                continue;
                            }
                            let from = ps[i].0;
                            ps[j].1.message(from, m.clone());
                        }
                        true
                    }
                    Action::SendPrivate(to, m) => {
                        let from = ps[i].0;
                        if let Some(&j) = indices.get(&to) {
                            ps[j].1.message(from, m);
                        }
                        true
                    }
                    Action::Return(r) => {
                        out.push((ps[i].0, r));
                        false
                    }
                }
            } {
                progressed = true;
            }
        }
        if !progressed && out.len() < size {
            return Err(ProtocolError::AssertionFailed(
                "no participant can make progress".to_string(),
            ));
        }
    }

    Ok(out)
}

pub mod internal;
pub mod message;
