//! Threshold ECDSA signing over secp256k1, following GG20 with identifiable aborts.
//!
//! A group of parties each hold a share of a private key. Any `t + 1` of
//! them can sign a message together, and no smaller group learns anything
//! about the key. If someone misbehaves, the protocol stops and names them,
//! rather than producing a bad signature or failing anonymously.
//!
//! # Warning
//!
//! This is experimental cryptographic software. This library has not
//! undergone any form of audit.
//!
//! # Design
//!
//! Signing takes seven rounds. The parties first share a random nonce `k`
//! and a random mask `gamma`, and use Paillier-based share conversion (MtA)
//! to turn products of these shares, and of their key shares, into additive
//! shares. Revealing `k * gamma` lets everyone compute the nonce point `R`
//! without learning `k`, after which each party can compute its share of `s`.
//!
//! Every value sent comes with a zero-knowledge proof, bound to the session
//! through a transcript. Before anyone reveals their share of `s`, the
//! parties check that their contributions to `R` and to `x * R` are
//! consistent. If the first check fails, everyone reveals the secrets of
//! this session, which are worthless once the session has aborted, and
//! everyone can recompute who lied.
//!
//! Keys come from outside this crate. A trusted dealer is provided for tests
//! and for splitting an existing key, see [`deal`].
//!
//! ## API Design
//!
//! Each party is a [`LocalParty`], which implements a simple interface:
//! ```ignore
//! pub trait Protocol {
//!    type Output;
//!
//!    fn poke(&mut self) -> Result<Action<Self::Output>, ProtocolError>;
//!    fn message(&mut self, from: Participant, data: MessageData);
//! }
//! ```
//! You deliver messages received from other parties, and "poke" the party
//! to see what it wants to do next:
//! - send a message to all other parties;
//! - *privately* send a message to one party;
//! - wait for more messages;
//! - or return the finished signature.
//!
//! Rounds and message serialization are handled internally. Work for each
//! peer inside a round runs in parallel.
//!
//! # Shortcomings
//!
//! - Messages sent to each peer separately aren't echoed, so a party
//!   sending different values to different peers can make them disagree on
//!   whose fault an abort is.
//! - There is no key generation, only a trusted dealer.
mod compat;
mod crypto;
mod keyshare;
mod math;
mod mta;
mod paillier;
mod participants;
mod proofs;
pub mod protocol;
mod serde;
pub mod signing;
#[cfg(test)]
mod test;
mod trusted_dealer;

pub use keyshare::SaveData;
pub use participants::{PartyId, SortedPartyIds};
pub use protocol::internal::CancelToken;
pub use signing::{sign, LocalParty, Message, Parameters, SignatureData};
pub use trusted_dealer::{deal, PreParams, PRIME_BITS};
