//! This module holds some utilities for working with participants.
//!
//! Parties are identified by a [`PartyId`], and the session-wide ordering of
//! those ids gives every party a [`Participant`] index. Most of the protocol
//! then works with indices, storing one item per participant.
use std::{cmp::Ordering, fmt};

use k256::Scalar;
use libpaillier::unknown_order::BigNumber;

use crate::{compat::bn_to_scalar, protocol::Participant};

/// The identity of a party.
///
/// The `key` orders parties within a session, and doubles as the x-coordinate
/// of that party's share of the signing key.
#[derive(Debug, Clone)]
pub struct PartyId {
    pub id: String,
    pub moniker: String,
    pub key: BigNumber,
}

impl PartyId {
    pub fn new(id: impl Into<String>, moniker: impl Into<String>, key: BigNumber) -> Self {
        Self {
            id: id.into(),
            moniker: moniker.into(),
            key,
        }
    }

    /// The canonical big endian encoding of the key.
    pub fn key_bytes(&self) -> Vec<u8> {
        self.key.to_bytes()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},{}}}", self.id, self.moniker)
    }
}

impl PartialEq for PartyId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PartyId {}

impl PartialOrd for PartyId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PartyId {
    /// Keys are non-negative, so comparing minimal big endian encodings by
    /// length, then lexicographically, orders them numerically.
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.key_bytes();
        let b = other.key_bytes();
        let a = strip_leading_zeros(&a);
        let b = strip_leading_zeros(&b);
        a.len().cmp(&b.len()).then_with(|| a.cmp(b))
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Represents a sorted list of parties.
///
/// Everybody sorts the same ids the same way, so the position of a party in
/// this list is its index for the whole session.
#[derive(Debug, Clone)]
pub struct SortedPartyIds {
    ids: Vec<PartyId>,
    /// The keys of each party, as scalars, in the same order.
    scalars: Vec<Scalar>,
}

impl SortedPartyIds {
    /// Sort a list of parties.
    ///
    /// This will return None if the keys have duplicates, or are zero modulo the curve order.
    pub fn new(ids: Vec<PartyId>) -> Option<Self> {
        let mut ids = ids;
        ids.sort();

        let scalars: Vec<Scalar> = ids.iter().map(|p| bn_to_scalar(&p.key)).collect();
        for (i, s) in scalars.iter().enumerate() {
            if bool::from(s.is_zero()) || scalars[..i].contains(s) {
                return None;
            }
        }

        Some(Self { ids, scalars })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[PartyId] {
        &self.ids
    }

    /// Iterate over the indices of every party.
    pub fn participants(&self) -> impl Iterator<Item = Participant> {
        (0..self.ids.len() as u32).map(Participant::from)
    }

    /// Iterate over the other participants
    pub fn others(&self, me: Participant) -> impl Iterator<Item = Participant> {
        self.participants().filter(move |p| *p != me)
    }

    /// Look up the party with a given index.
    pub fn get(&self, p: Participant) -> Option<&PartyId> {
        self.ids.get(p.index())
    }

    /// Find the index of a party in this list.
    pub fn index_of(&self, id: &PartyId) -> Option<Participant> {
        self.ids
            .binary_search(id)
            .ok()
            .map(|i| Participant::from(i as u32))
    }

    /// The key of a participant, as a scalar.
    pub fn scalar(&self, p: Participant) -> Scalar {
        self.scalars[p.index()]
    }

    /// Get the lagrange coefficient for a participant, evaluating at 0.
    pub fn lagrange(&self, p: Participant) -> Scalar {
        let x_i = self.scalar(p);

        let mut num = Scalar::ONE;
        let mut den = Scalar::ONE;
        for (j, x_j) in self.scalars.iter().enumerate() {
            if j == p.index() {
                continue;
            }
            num *= x_j;
            den *= *x_j - x_i;
        }

        // Keys were checked to be distinct, so the denominator is never zero.
        num * den.invert().unwrap_or(Scalar::ZERO)
    }

    /// Map some participants back to their ids.
    pub(crate) fn to_ids(&self, ps: impl IntoIterator<Item = Participant>) -> Vec<PartyId> {
        ps.into_iter().filter_map(|p| self.get(p).cloned()).collect()
    }
}

/// A map from participants to elements.
///
/// The idea is that you have one element for each participant.
#[derive(Debug, Clone)]
pub struct ParticipantMap<T> {
    data: Vec<Option<T>>,
    count: usize,
}

impl<T> ParticipantMap<T> {
    /// Create a new map with room for a certain number of participants.
    pub fn new(size: usize) -> Self {
        // We could also require a T: Clone bound instead of doing this initialization manually.
        let mut data = Vec::with_capacity(size);
        for _ in 0..size {
            data.push(None);
        }

        Self { data, count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Place the data for a participant in this map.
    ///
    /// Returns false, leaving the map unchanged, if that participant already
    /// has data or isn't part of the map.
    pub fn put(&mut self, participant: Participant, data: T) -> bool {
        match self.data.get_mut(participant.index()) {
            Some(slot @ None) => {
                *slot = Some(data);
                self.count += 1;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, participant: Participant) -> Option<&T> {
        self.data.get(participant.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, participant: Participant) -> Option<&mut T> {
        self.data.get_mut(participant.index()).and_then(Option::as_mut)
    }

    /// Remove the data for a participant, if any.
    pub fn take(&mut self, participant: Participant) -> Option<T> {
        let out = self.data.get_mut(participant.index()).and_then(Option::take);
        if out.is_some() {
            self.count -= 1;
        }
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn party(key: u64) -> PartyId {
        PartyId::new(format!("{key}"), format!("P[{key}]"), BigNumber::from(key))
    }

    #[test]
    fn test_sorting_by_key() {
        let ids = SortedPartyIds::new(vec![party(300), party(2), party(40)]).unwrap();
        let keys: Vec<_> = ids.ids().iter().map(|p| p.id.clone()).collect();
        assert_eq!(keys, vec!["2", "40", "300"]);
        assert_eq!(ids.index_of(&party(300)), Some(Participant::from(2u32)));
        assert_eq!(ids.index_of(&party(7)), None);
    }

    #[test]
    fn test_duplicate_and_zero_keys_rejected() {
        assert!(SortedPartyIds::new(vec![party(1), party(1)]).is_none());
        assert!(SortedPartyIds::new(vec![party(0), party(1)]).is_none());
    }

    #[test]
    fn test_lagrange_interpolates_constant() {
        let ids = SortedPartyIds::new(vec![party(1), party(2), party(3)]).unwrap();
        let lambda_sum = ids
            .participants()
            .fold(Scalar::ZERO, |acc, p| acc + ids.lagrange(p));
        assert_eq!(lambda_sum, Scalar::ONE);

        // f(x) = 7 + 3x
        let f = |x: Scalar| Scalar::from(7u64) + Scalar::from(3u64) * x;
        let at_zero = ids
            .participants()
            .fold(Scalar::ZERO, |acc, p| acc + ids.lagrange(p) * f(ids.scalar(p)));
        assert_eq!(at_zero, Scalar::from(7u64));
    }

    #[test]
    fn test_participant_map() {
        let mut map = ParticipantMap::new(3);
        let p = Participant::from(1u32);
        assert!(map.put(p, 10));
        assert!(!map.put(p, 11));
        assert!(!map.put(Participant::from(5u32), 12));
        assert_eq!(map.get(p), Some(&10));
        assert_eq!(map.len(), 1);
        assert_eq!(map.take(p), Some(10));
        assert!(map.is_empty());
    }
}
