//! Instant-runoff tally engine
//!
//! A pure function over a fixed candidate list and a fixed ballot list. Each
//! pass counts every ballot's highest-ranked active candidate, declares a
//! strict-majority winner if there is one, and otherwise eliminates every
//! candidate tied for last place at once. The loop ends in at most
//! `candidates.len()` passes:
//!
//! - no active preference on any ballot: `NoVotes` with the active set
//! - strict majority (`2 * count > total`): `Winner`
//! - every active candidate tied at the bottom: `Tied` with the active set
//!
//! Every pass snapshot is kept in the returned history.

use crate::decision::ballot::Ballot;
use crate::types::CandidateId;
use crate::{Result, ballot_error};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Votes held by one candidate in one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCount {
    pub candidate_id: CandidateId,
    pub votes: u64,
}

/// Snapshot of a single elimination pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassTally {
    /// 1-based pass number
    pub pass: usize,
    /// Every active candidate's count, in candidate order (zeros included)
    pub counts: Vec<CandidateCount>,
    /// Ballots with no active preference left
    pub exhausted: u64,
    /// Candidates removed at the end of this pass
    pub eliminated: Vec<CandidateId>,
}

impl PassTally {
    /// Sum of counted first-choice votes
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| c.votes).sum()
    }

    pub fn votes_for(&self, candidate_id: &CandidateId) -> Option<u64> {
        self.counts
            .iter()
            .find(|c| &c.candidate_id == candidate_id)
            .map(|c| c.votes)
    }
}

/// Terminal result of a tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TallyResult {
    /// Strict majority of counted votes
    Winner { candidate_id: CandidateId },
    /// Every remaining candidate tied at the bottom
    Tied { finalists: Vec<CandidateId> },
    /// No ballot expressed an active preference
    NoVotes { candidates: Vec<CandidateId> },
}

/// Result plus full per-pass audit history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyOutcome {
    pub result: TallyResult,
    pub history: Vec<PassTally>,
}

impl TallyOutcome {
    pub fn winner(&self) -> Option<CandidateId> {
        match &self.result {
            TallyResult::Winner { candidate_id } => Some(*candidate_id),
            _ => None,
        }
    }
}

/// Run instant-runoff elimination
///
/// `candidates` order is preserved in every pass snapshot; duplicates are
/// ignored. Fails with `InvalidBallot` if a ballot references a candidate
/// outside `candidates`.
pub fn tally(candidates: &[CandidateId], ballots: &[Ballot]) -> Result<TallyOutcome> {
    let mut seen = HashSet::with_capacity(candidates.len());
    let mut order: Vec<CandidateId> = candidates
        .iter()
        .copied()
        .filter(|c| seen.insert(*c))
        .collect();

    for ballot in ballots {
        if let Some(outsider) = ballot.first_outside(&seen) {
            return Err(ballot_error!(
                "ballot {} references candidate {} outside the tallied set",
                ballot.id,
                outsider
            ));
        }
    }

    let mut active = seen;
    let mut history = Vec::new();

    loop {
        let mut counts: HashMap<CandidateId, u64> =
            order.iter().map(|c| (*c, 0)).collect();
        let mut exhausted = 0u64;

        for ballot in ballots {
            match ballot.first_active(&active) {
                Some(choice) => *counts.entry(choice).or_default() += 1,
                None => exhausted += 1,
            }
        }

        let mut snapshot = PassTally {
            pass: history.len() + 1,
            counts: order
                .iter()
                .map(|c| CandidateCount {
                    candidate_id: *c,
                    votes: counts.get(c).copied().unwrap_or_default(),
                })
                .collect(),
            exhausted,
            eliminated: Vec::new(),
        };

        let total = snapshot.total();
        if total == 0 {
            history.push(snapshot);
            return Ok(TallyOutcome {
                result: TallyResult::NoVotes { candidates: order },
                history,
            });
        }

        if let Some(leader) = snapshot.counts.iter().find(|c| c.votes * 2 > total) {
            let candidate_id = leader.candidate_id;
            history.push(snapshot);
            return Ok(TallyOutcome {
                result: TallyResult::Winner { candidate_id },
                history,
            });
        }

        let min_votes = snapshot
            .counts
            .iter()
            .map(|c| c.votes)
            .min()
            .unwrap_or_default();
        let bottom: Vec<CandidateId> = snapshot
            .counts
            .iter()
            .filter(|c| c.votes == min_votes)
            .map(|c| c.candidate_id)
            .collect();

        if bottom.len() == order.len() {
            history.push(snapshot);
            return Ok(TallyOutcome {
                result: TallyResult::Tied { finalists: order },
                history,
            });
        }

        for candidate_id in &bottom {
            active.remove(candidate_id);
        }
        order.retain(|c| active.contains(c));
        snapshot.eliminated = bottom;
        history.push(snapshot);
    }
}
