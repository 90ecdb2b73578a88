//! Per-peer parallel work inside a single round.
//!
//! Rounds fan out one unit of work per peer (or per peer and sub-task),
//! run them all on scoped threads, and only then look at the results.
//! No branch short-circuits another, so a round that fails reports every
//! peer at fault, not just the first one found.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use easy_parallel::Parallel;
use magikitten::Transcript;
use rand_core::CryptoRngCore;
use tracing::warn;

use super::{Participant, ProtocolError};
use crate::participants::{PartyId, SortedPartyIds};

const BRANCH_RNG_LABEL: &[u8] = b"gg20-sign branch rng";

/// A handle used to cancel a running session.
///
/// Cloning the token shares the flag, so the orchestrator can keep one copy
/// and hand another to the party.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`BranchError::Cancelled`] if the session was cancelled.
    pub(crate) fn check(&self) -> Result<(), BranchError> {
        if self.is_cancelled() {
            Err(BranchError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Why a single branch of work failed.
#[derive(Debug)]
pub(crate) enum BranchError {
    /// The peer this branch was working on sent bad data.
    Culprit(Participant, String),
    /// We failed to do our own part of the work.
    Local(String),
    Cancelled,
}

/// Derive an independent rng for a branch of parallel work.
///
/// Branches run on other threads, so they can't share the caller's rng.
pub(crate) fn branch_rng(rng: &mut impl CryptoRngCore) -> impl CryptoRngCore + Send {
    let mut seed = [0u8; 32];
    rng.fill_bytes(&mut seed);
    let mut transcript = Transcript::new(BRANCH_RNG_LABEL);
    transcript.message(b"seed", &seed);
    transcript.challenge(b"rng")
}

/// Run a unit of work for each item in parallel, waiting for all of them.
///
/// The results come back in the same order as the items.
pub(crate) fn fan_out<I, T, F>(
    items: Vec<I>,
    cancel: &CancelToken,
    f: F,
) -> Vec<Result<T, BranchError>>
where
    I: Send,
    T: Send,
    F: Fn(I) -> Result<T, BranchError> + Sync,
{
    let f = &f;
    Parallel::new()
        .each(items, move |item| {
            cancel.check()?;
            f(item)
        })
        .run()
}

/// Collect the results of a fan out, turning any failures into a round error.
///
/// Peer faults are gathered across every branch before failing. A local
/// failure or cancellation takes precedence, since then peer faults can't be trusted.
pub(crate) fn collect_results<T>(
    round: u8,
    reason: &str,
    parties: &SortedPartyIds,
    me: &PartyId,
    results: Vec<Result<T, BranchError>>,
) -> Result<Vec<T>, ProtocolError> {
    let mut ok = Vec::with_capacity(results.len());
    let mut culprits: Vec<Participant> = Vec::new();
    let mut local = None;
    let mut cancelled = false;
    for result in results {
        match result {
            Ok(x) => ok.push(x),
            Err(BranchError::Culprit(p, why)) => {
                warn!(round, culprit = p.index(), why = %why, "{reason}");
                culprits.push(p);
            }
            Err(BranchError::Local(why)) => local = Some(why),
            Err(BranchError::Cancelled) => cancelled = true,
        }
    }
    if cancelled {
        return Err(ProtocolError::Cancelled);
    }
    if let Some(why) = local {
        return Err(ProtocolError::Local {
            round,
            party: me.clone(),
            reason: why,
        });
    }
    if !culprits.is_empty() {
        culprits.sort();
        culprits.dedup();
        return Err(ProtocolError::Culprits {
            round,
            reason: reason.to_string(),
            culprits: parties.to_ids(culprits),
        });
    }
    Ok(ok)
}

#[cfg(test)]
mod test {
    use libpaillier::unknown_order::BigNumber;
    use rand_core::{OsRng, RngCore};

    use super::*;

    fn parties() -> SortedPartyIds {
        let ids = (1..=4u64)
            .map(|k| PartyId::new(format!("{k}"), format!("P[{k}]"), BigNumber::from(k)))
            .collect();
        SortedPartyIds::new(ids).unwrap()
    }

    #[test]
    fn test_all_culprits_collected() {
        let parties = parties();
        let me = parties.ids()[0].clone();
        let peers: Vec<_> = parties.others(Participant::from(0u32)).collect();

        let results = fan_out(peers, &CancelToken::new(), |p| {
            if p.index() == 1 {
                Ok(p)
            } else {
                Err(BranchError::Culprit(p, "bad proof".to_string()))
            }
        });
        let err = collect_results(3, "bad proofs", &parties, &me, results).unwrap_err();
        let blamed: Vec<_> = err.culprits().iter().map(|p| p.id.clone()).collect();
        assert_eq!(blamed, vec!["3", "4"]);
    }

    #[test]
    fn test_results_keep_order() {
        let parties = parties();
        let me = parties.ids()[0].clone();
        let results = fan_out((0..16u32).collect(), &CancelToken::new(), |x| Ok(x * 2));
        let out = collect_results(1, "", &parties, &me, results).unwrap();
        assert_eq!(out, (0..16u32).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn test_cancellation_stops_branches() {
        let parties = parties();
        let me = parties.ids()[0].clone();
        let cancel = CancelToken::new();
        cancel.cancel();
        let results = fan_out(vec![1, 2, 3], &cancel, |x: u32| Ok(x));
        assert!(matches!(
            collect_results(2, "", &parties, &me, results),
            Err(ProtocolError::Cancelled)
        ));
    }

    #[test]
    fn test_branch_rngs_differ() {
        let mut a = branch_rng(&mut OsRng);
        let mut b = branch_rng(&mut OsRng);
        assert_ne!(a.next_u64(), b.next_u64());
    }
}
