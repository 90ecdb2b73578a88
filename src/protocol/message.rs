//! Routing metadata and the wire encoding shared by every message.
//!
//! On the wire, a message is a round tag byte followed by the MessagePack
//! encoding of an [`Envelope`]. The envelope says whether the message was
//! broadcast, or lists its recipients.
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use super::{MessageData, Participant};
use crate::serde::{decode_tagged, encode_with_tag};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty message")]
    Empty,
    #[error("message tagged for round {tag}, but its content is from round {round}")]
    TagMismatch { tag: u8, round: u8 },
    #[error("a broadcast message can't list recipients")]
    BroadcastWithRecipients,
    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

/// The content of a message, which knows what round it belongs to.
pub trait Content: Serialize + DeserializeOwned {
    fn round(&self) -> u8;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope<T> {
    is_broadcast: bool,
    to: Option<Vec<Participant>>,
    content: T,
}

/// A message, along with its routing information.
#[derive(Debug, Clone)]
pub struct ParsedMessage<T> {
    pub from: Participant,
    /// The recipients, or None for a broadcast.
    pub to: Option<Vec<Participant>>,
    pub content: T,
    wire: MessageData,
}

impl<T: Content> ParsedMessage<T> {
    /// Create a message to send to everyone.
    pub fn broadcast(from: Participant, content: T) -> Result<Self, WireError> {
        Self::new(from, None, content)
    }

    /// Create a message to send to one other participant.
    pub fn direct(from: Participant, to: Participant, content: T) -> Result<Self, WireError> {
        Self::new(from, Some(vec![to]), content)
    }

    fn new(from: Participant, to: Option<Vec<Participant>>, content: T) -> Result<Self, WireError> {
        let envelope = Envelope {
            is_broadcast: to.is_none(),
            to,
            content,
        };
        let wire = encode_with_tag(envelope.content.round(), &envelope)?;
        Ok(Self {
            from,
            to: envelope.to,
            content: envelope.content,
            wire,
        })
    }

    /// Parse a message received from some participant.
    pub fn from_wire(wire: &[u8], from: Participant) -> Result<Self, WireError> {
        let (tag, envelope) = decode_tagged::<Envelope<T>>(wire).ok_or(WireError::Empty)?;
        let envelope = envelope?;
        let round = envelope.content.round();
        if tag != round {
            return Err(WireError::TagMismatch { tag, round });
        }
        if envelope.is_broadcast != envelope.to.is_none() {
            return Err(WireError::BroadcastWithRecipients);
        }
        Ok(Self {
            from,
            to: envelope.to,
            content: envelope.content,
            wire: wire.to_vec(),
        })
    }

    pub fn is_broadcast(&self) -> bool {
        self.to.is_none()
    }

    /// Check whether a participant is among the recipients of this message.
    pub fn is_for(&self, p: Participant) -> bool {
        match &self.to {
            None => p != self.from,
            Some(to) => to.contains(&p),
        }
    }

    pub fn to_wire(&self) -> &[u8] {
        &self.wire
    }

    pub(crate) fn into_wire(self) -> MessageData {
        self.wire
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping(u8);

    impl Content for Ping {
        fn round(&self) -> u8 {
            self.0
        }
    }

    #[test]
    fn test_routing_survives_the_wire() -> Result<(), WireError> {
        let me = Participant::from(0u32);
        let them = Participant::from(1u32);

        let direct = ParsedMessage::direct(me, them, Ping(2))?;
        let parsed = ParsedMessage::<Ping>::from_wire(direct.to_wire(), me)?;
        assert!(!parsed.is_broadcast());
        assert!(parsed.is_for(them));
        assert!(!parsed.is_for(Participant::from(2u32)));
        assert_eq!(parsed.content, Ping(2));

        let broadcast = ParsedMessage::broadcast(me, Ping(3))?;
        let parsed = ParsedMessage::<Ping>::from_wire(broadcast.to_wire(), me)?;
        assert!(parsed.is_broadcast());
        assert!(!parsed.is_for(me));
        Ok(())
    }

    #[test]
    fn test_wrong_tag_rejected() -> Result<(), WireError> {
        let msg = ParsedMessage::broadcast(Participant::from(0u32), Ping(3))?;
        let mut wire = msg.to_wire().to_vec();
        wire[0] = 4;
        assert!(matches!(
            ParsedMessage::<Ping>::from_wire(&wire, Participant::from(0u32)),
            Err(WireError::TagMismatch { tag: 4, round: 3 })
        ));
        assert!(matches!(
            ParsedMessage::<Ping>::from_wire(&[], Participant::from(0u32)),
            Err(WireError::Empty)
        ));
        Ok(())
    }
}
