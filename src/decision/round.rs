//! Elimination rounds
//!
//! A round is created `Open` and moves to `Closed` exactly once. A tie never
//! reopens a round; the session opens a new, restricted one instead.

use crate::decision::tally::PassTally;
use crate::types::{CandidateId, RoundId, TripId};
use crate::{Result, decision_error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Open,
    Closed,
}

/// Why a round could not be decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UndecidableReason {
    /// Nobody voted in the round
    NoBallotsCast,
    /// Ballots exist but none ranks an eligible candidate
    AllBallotsExhausted,
}

/// Terminal outcome stored on a closed round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundOutcome {
    Winner { candidate_id: CandidateId },
    Tied { finalists: Vec<CandidateId> },
    Undecidable { reason: UndecidableReason },
}

impl RoundOutcome {
    pub fn winner(&self) -> Option<CandidateId> {
        match self {
            Self::Winner { candidate_id } => Some(*candidate_id),
            _ => None,
        }
    }

    pub fn finalists(&self) -> Option<&[CandidateId]> {
        match self {
            Self::Tied { finalists } => Some(finalists),
            _ => None,
        }
    }
}

/// Where a trip's decision session stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    /// No round has been opened yet
    NotStarted,
    /// A round is open for ballots
    Voting {
        round_id: RoundId,
        round_number: u32,
        runoff: bool,
    },
    /// A round produced an outright winner
    Decided { winner: CandidateId },
    /// A runoff ended tied; no further round opens
    FinalTie { finalists: Vec<CandidateId> },
    /// The closing round had no countable preferences
    Undecidable { reason: UndecidableReason },
}

impl SessionStatus {
    /// Derive the session state from its latest round
    pub fn from_latest(latest: Option<&Round>) -> Self {
        let Some(round) = latest else {
            return Self::NotStarted;
        };

        match &round.outcome {
            None => Self::Voting {
                round_id: round.id,
                round_number: round.number,
                runoff: round.is_runoff(),
            },
            Some(RoundOutcome::Winner { candidate_id }) => Self::Decided {
                winner: *candidate_id,
            },
            Some(RoundOutcome::Tied { finalists }) => Self::FinalTie {
                finalists: finalists.clone(),
            },
            Some(RoundOutcome::Undecidable { reason }) => Self::Undecidable { reason: *reason },
        }
    }

    /// Whether no further round will ever open
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::NotStarted | Self::Voting { .. })
    }
}

/// One elimination contest within a trip's decision session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub trip_id: TripId,
    /// 1-based position in the session
    pub number: u32,
    pub status: RoundStatus,
    /// Candidates eligible in this round, in catalog order
    pub candidates: Vec<CandidateId>,
    /// `None` for the unrestricted first round; the tied finalists for a runoff
    pub candidate_restriction: Option<Vec<CandidateId>>,
    pub tally_history: Vec<PassTally>,
    pub outcome: Option<RoundOutcome>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Round {
    /// Open the unrestricted first round over every trip candidate
    pub fn first(trip_id: TripId, candidates: Vec<CandidateId>) -> Self {
        Self::open(trip_id, 1, candidates, None)
    }

    /// Open a runoff restricted to `finalists`
    pub fn runoff(previous: &Round, finalists: Vec<CandidateId>) -> Self {
        Self::open(
            previous.trip_id,
            previous.number + 1,
            finalists.clone(),
            Some(finalists),
        )
    }

    fn open(
        trip_id: TripId,
        number: u32,
        candidates: Vec<CandidateId>,
        candidate_restriction: Option<Vec<CandidateId>>,
    ) -> Self {
        Self {
            id: RoundId::new(),
            trip_id,
            number,
            status: RoundStatus::Open,
            candidates,
            candidate_restriction,
            tally_history: Vec::new(),
            outcome: None,
            opened_at: Utc::now(),
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == RoundStatus::Open
    }

    pub fn is_runoff(&self) -> bool {
        self.candidate_restriction.is_some()
    }

    pub fn is_eligible(&self, candidate_id: &CandidateId) -> bool {
        self.candidates.contains(candidate_id)
    }

    /// Record the outcome and close; a closed round cannot be closed again
    pub fn close(&mut self, outcome: RoundOutcome, tally_history: Vec<PassTally>) -> Result<()> {
        if !self.is_open() {
            return Err(decision_error!("round {} is already closed", self.id));
        }

        self.status = RoundStatus::Closed;
        self.outcome = Some(outcome);
        self.tally_history = tally_history;
        self.closed_at = Some(Utc::now());
        Ok(())
    }
}
