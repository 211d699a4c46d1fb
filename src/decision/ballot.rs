//! Ranked ballots and their submission-time validation
//!
//! A ballot is validated once, against the eligible candidates of the round
//! it is cast in. Validation is all-or-nothing: a rejected ballot leaves no
//! trace in the round.

use crate::types::{BallotId, CandidateId, ParticipantId, RoundId};
use crate::{Result, ballot_error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One entry of a submitted ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedChoice {
    pub candidate_id: CandidateId,
    /// 1 is the most preferred
    pub rank: u32,
}

impl RankedChoice {
    pub fn new(candidate_id: CandidateId, rank: u32) -> Self {
        Self { candidate_id, rank }
    }
}

/// A participant's validated ranking for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ballot {
    pub id: BallotId,
    pub round_id: RoundId,
    pub participant_id: ParticipantId,
    /// Candidates in preference order; index 0 holds rank 1
    pub rankings: Vec<CandidateId>,
    pub cast_at: DateTime<Utc>,
}

impl Ballot {
    /// Validate explicit `(candidate, rank)` pairs into a ballot
    ///
    /// Ranks must form the dense sequence `1..=n` in any submission order,
    /// each candidate may appear once, and every candidate must be in
    /// `eligible`.
    pub fn from_choices(
        round_id: RoundId,
        participant_id: ParticipantId,
        mut choices: Vec<RankedChoice>,
        eligible: &[CandidateId],
        max_choices: usize,
    ) -> Result<Self> {
        if choices.is_empty() {
            return Err(ballot_error!("ballot ranks no candidates"));
        }
        if choices.len() > max_choices {
            return Err(ballot_error!(
                "ballot ranks {} candidates, at most {} allowed",
                choices.len(),
                max_choices
            ));
        }

        if choices.iter().any(|choice| choice.rank == 0) {
            return Err(ballot_error!("ranks start at 1"));
        }

        choices.sort_by_key(|choice| choice.rank);
        for (expected, choice) in (1u32..).zip(&choices) {
            if choice.rank != expected {
                return Err(if choice.rank < expected {
                    ballot_error!("rank {} is used more than once", choice.rank)
                } else {
                    ballot_error!("ranks must be dense from 1, missing rank {}", expected)
                });
            }
        }

        let rankings = choices.into_iter().map(|c| c.candidate_id).collect();
        Self::from_ordered(round_id, participant_id, rankings, eligible, max_choices)
    }

    /// Validate an already-ordered ranking into a ballot
    pub fn from_ordered(
        round_id: RoundId,
        participant_id: ParticipantId,
        rankings: Vec<CandidateId>,
        eligible: &[CandidateId],
        max_choices: usize,
    ) -> Result<Self> {
        if rankings.is_empty() {
            return Err(ballot_error!("ballot ranks no candidates"));
        }
        if rankings.len() > max_choices {
            return Err(ballot_error!(
                "ballot ranks {} candidates, at most {} allowed",
                rankings.len(),
                max_choices
            ));
        }

        let mut seen = HashSet::with_capacity(rankings.len());
        for candidate_id in &rankings {
            if !seen.insert(*candidate_id) {
                return Err(ballot_error!("candidate {} is ranked twice", candidate_id));
            }
            if !eligible.contains(candidate_id) {
                return Err(ballot_error!(
                    "candidate {} is not eligible in round {}",
                    candidate_id,
                    round_id
                ));
            }
        }

        Ok(Self {
            id: BallotId::new(),
            round_id,
            participant_id,
            rankings,
            cast_at: Utc::now(),
        })
    }

    /// Rankings with their 1-based ranks
    pub fn choices(&self) -> impl Iterator<Item = RankedChoice> + '_ {
        (1u32..)
            .zip(&self.rankings)
            .map(|(rank, candidate_id)| RankedChoice::new(*candidate_id, rank))
    }

    /// Rank this ballot gives to `candidate_id`, if any
    pub fn rank_of(&self, candidate_id: &CandidateId) -> Option<u32> {
        self.choices()
            .find(|choice| &choice.candidate_id == candidate_id)
            .map(|choice| choice.rank)
    }

    /// Highest-ranked candidate still in `active`
    pub fn first_active(&self, active: &HashSet<CandidateId>) -> Option<CandidateId> {
        self.rankings
            .iter()
            .find(|candidate_id| active.contains(*candidate_id))
            .copied()
    }

    /// First referenced candidate outside `allowed`, if any
    pub fn first_outside(&self, allowed: &HashSet<CandidateId>) -> Option<CandidateId> {
        self.rankings
            .iter()
            .find(|candidate_id| !allowed.contains(*candidate_id))
            .copied()
    }
}
