//! Decision service: the per-trip round state machine
//!
//! Flow for one trip:
//! 1. The first ballot or result request opens Round 1 over every candidate
//! 2. Participants cast ballots; a recast replaces the earlier ballot
//! 3. `compute_result` snapshots the ballots, tallies, and closes the round
//!    - winner: session decided
//!    - tie in the unrestricted round: a runoff restricted to the finalists opens
//!    - tie in a runoff: final tie, session ends
//!    - no countable preference: undecidable, session ends
//!
//! Close-and-maybe-open runs as a single ledger transition. Round-creation
//! races are retried internally up to `max_race_retries`.

use crate::config::EngineConfig;
use crate::decision::ballot::{Ballot, RankedChoice};
use crate::decision::candidates::CandidateSource;
use crate::decision::ledger::{LedgerStats, RoundLedger};
use crate::decision::roster::{OpenRoster, ParticipantRoster};
use crate::decision::round::{Round, RoundOutcome, SessionStatus, UndecidableReason};
use crate::decision::tally::{PassTally, TallyResult, tally};
use crate::publish::{DecisionEvent, PublishedResult, ResultPublisher};
use crate::types::{BallotId, Candidate, CandidateId, ParticipantId, RoundId, TripId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Accepted ballot, and the ballot it replaced if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BallotReceipt {
    pub ballot: Ballot,
    pub replaced: Option<BallotId>,
}

/// What a result request produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub trip_id: TripId,
    /// The closed round this result describes
    pub round: Round,
    pub outcome: RoundOutcome,
    pub tally_history: Vec<PassTally>,
    /// Runoff opened by an unrestricted tie
    pub next_round: Option<Round>,
    pub status: SessionStatus,
    /// True when the session was already terminal and nothing was recomputed
    pub already_decided: bool,
    pub ballots_counted: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionStats {
    pub ledger: LedgerStats,
    pub ballots_accepted: u64,
    pub ballots_replaced: u64,
    pub ballots_rejected: u64,
    pub rounds_closed: u64,
    pub race_retries: u64,
}

pub struct DecisionService {
    ledger: RoundLedger,
    candidate_source: Arc<dyn CandidateSource>,
    roster: Arc<dyn ParticipantRoster>,
    publisher: ResultPublisher,
    config: EngineConfig,
    ballots_accepted: AtomicU64,
    ballots_replaced: AtomicU64,
    ballots_rejected: AtomicU64,
    rounds_closed: AtomicU64,
    race_retries: AtomicU64,
}

impl DecisionService {
    pub fn new(
        config: EngineConfig,
        candidate_source: Arc<dyn CandidateSource>,
        publisher: ResultPublisher,
    ) -> Self {
        Self {
            ledger: RoundLedger::new(),
            candidate_source,
            roster: Arc::new(OpenRoster),
            publisher,
            config,
            ballots_accepted: AtomicU64::new(0),
            ballots_replaced: AtomicU64::new(0),
            ballots_rejected: AtomicU64::new(0),
            rounds_closed: AtomicU64::new(0),
            race_retries: AtomicU64::new(0),
        }
    }

    /// Service with testing config and no sinks
    pub fn for_testing(candidate_source: Arc<dyn CandidateSource>) -> Self {
        Self::new(
            EngineConfig::for_testing(),
            candidate_source,
            ResultPublisher::new(),
        )
    }

    /// Restrict voting to participants the roster admits
    pub fn with_roster(mut self, roster: Arc<dyn ParticipantRoster>) -> Self {
        self.roster = roster;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current open round, creating Round 1 if the trip has none
    ///
    /// Once the session is terminal this returns its last (closed) round; a
    /// decided trip is never reopened.
    pub fn get_or_open_round(&self, trip_id: &TripId) -> Result<Round> {
        for attempt in 0..=self.config.max_race_retries {
            if let Some(round) = self.latest_round(trip_id)? {
                return Ok(round);
            }

            let candidates = self.candidate_source.candidates_for(trip_id)?;
            if candidates.is_empty() {
                return Err(Error::NoCandidates { trip_id: *trip_id });
            }

            match self.ledger.open_first_round(*trip_id, candidates) {
                Ok(round) => {
                    tracing::info!(
                        "🗳️ Round opened: trip={}, round={}, number={}, candidates={}",
                        trip_id,
                        round.id,
                        round.number,
                        round.candidates.len()
                    );
                    return Ok(round);
                }
                Err(e) if e.is_retryable() => {
                    self.race_retries.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "🔁 Round creation race lost: trip={}, attempt={}",
                        trip_id,
                        attempt + 1
                    );
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!("⚠️ Round creation retries exhausted: trip={}", trip_id);
        Err(Error::RoundRaceLost { trip_id: *trip_id })
    }

    /// Cast or replace a participant's ballot in the trip's open round
    pub fn submit_ballot(
        &self,
        trip_id: &TripId,
        participant_id: &ParticipantId,
        rankings: Vec<RankedChoice>,
    ) -> Result<BallotReceipt> {
        self.cast_with(trip_id, participant_id, |round, max| {
            Ballot::from_choices(round.id, *participant_id, rankings, &round.candidates, max)
        })
    }

    /// Like [`submit_ballot`](Self::submit_ballot), with ranks implied by order
    pub fn submit_ordered_ballot(
        &self,
        trip_id: &TripId,
        participant_id: &ParticipantId,
        rankings: Vec<CandidateId>,
    ) -> Result<BallotReceipt> {
        self.cast_with(trip_id, participant_id, |round, max| {
            Ballot::from_ordered(round.id, *participant_id, rankings, &round.candidates, max)
        })
    }

    fn cast_with(
        &self,
        trip_id: &TripId,
        participant_id: &ParticipantId,
        build: impl FnOnce(&Round, usize) -> Result<Ballot>,
    ) -> Result<BallotReceipt> {
        if !self.roster.is_eligible(trip_id, participant_id)? {
            self.ballots_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::ParticipantNotEligible {
                participant_id: *participant_id,
                trip_id: *trip_id,
            });
        }

        let round = self.get_or_open_round(trip_id)?;
        if !round.is_open() {
            self.ballots_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::RoundClosed { round_id: round.id });
        }

        let ballot = build(&round, self.config.max_ranked_choices).inspect_err(|e| {
            self.ballots_rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "🚫 Ballot rejected: trip={}, participant={}, error={}",
                trip_id,
                participant_id,
                e
            );
        })?;

        // The round may have closed since it was read; the ledger re-checks under its lock
        let replaced = self.ledger.cast(trip_id, ballot.clone()).inspect_err(|_| {
            self.ballots_rejected.fetch_add(1, Ordering::Relaxed);
        })?;

        self.ballots_accepted.fetch_add(1, Ordering::Relaxed);
        if replaced.is_some() {
            self.ballots_replaced.fetch_add(1, Ordering::Relaxed);
        }

        tracing::info!(
            "✅ Ballot {}: trip={}, round={}, participant={}, choices={}",
            if replaced.is_some() { "replaced" } else { "accepted" },
            trip_id,
            round.id,
            participant_id,
            ballot.rankings.len()
        );

        Ok(BallotReceipt { ballot, replaced })
    }

    /// Close the open round and report its outcome
    ///
    /// On an unrestricted tie a runoff round over the finalists is opened in
    /// the same unit of work. The round's decision event is stored on the
    /// trip and handed to the sinks before the trip is unlocked, so sinks see
    /// closes in round order. If the session is already terminal, the stored
    /// outcome of its last round is returned unchanged and no event is emitted.
    pub fn compute_result(&self, trip_id: &TripId) -> Result<DecisionResult> {
        self.get_or_open_round(trip_id)?;

        self.ledger.transition_then(
            trip_id,
            |record| {
                let Some(open) = record.open_round().cloned() else {
                    let latest = record
                        .latest_round()
                        .cloned()
                        .ok_or_else(|| Error::decision(format!("trip {trip_id} has no rounds")))?;
                    let outcome = latest.outcome.clone().ok_or_else(|| {
                        Error::decision(format!("closed round {} has no outcome", latest.id))
                    })?;
                    let ballots_counted = record.ballot_snapshot(&latest.id)?.len();

                    return Ok(DecisionResult {
                        trip_id: *trip_id,
                        tally_history: latest.tally_history.clone(),
                        round: latest,
                        outcome,
                        next_round: None,
                        status: record.status(),
                        already_decided: true,
                        ballots_counted,
                    });
                };

                let ballots = record.ballot_snapshot(&open.id)?;
                let tallied = tally(&open.candidates, &ballots)?;

                let outcome = match tallied.result {
                    TallyResult::Winner { candidate_id } => RoundOutcome::Winner { candidate_id },
                    TallyResult::Tied { finalists } => RoundOutcome::Tied { finalists },
                    TallyResult::NoVotes { .. } => RoundOutcome::Undecidable {
                        reason: if ballots.is_empty() {
                            UndecidableReason::NoBallotsCast
                        } else {
                            UndecidableReason::AllBallotsExhausted
                        },
                    },
                };

                let round = record.round_mut(&open.id)?;
                round.close(outcome.clone(), tallied.history.clone())?;
                let closed = round.clone();

                let next_round = match &outcome {
                    RoundOutcome::Tied { finalists } if !closed.is_runoff() => {
                        let runoff = Round::runoff(&closed, finalists.clone());
                        record.push_round(runoff.clone())?;
                        Some(runoff)
                    }
                    _ => None,
                };

                let result = DecisionResult {
                    trip_id: *trip_id,
                    round: closed,
                    outcome,
                    tally_history: tallied.history,
                    next_round,
                    status: record.status(),
                    already_decided: false,
                    ballots_counted: ballots.len(),
                };
                record.record_event(DecisionEvent::from_result(&result));
                Ok(result)
            },
            |record, result| {
                if result.already_decided {
                    tracing::debug!(
                        "📌 Result already decided: trip={}, round={}",
                        trip_id,
                        result.round.id
                    );
                    return;
                }

                self.rounds_closed.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    "🏁 Round closed: trip={}, round={}, outcome={:?}, passes={}, ballots={}",
                    trip_id,
                    result.round.id,
                    result.outcome,
                    result.tally_history.len(),
                    result.ballots_counted
                );
                if let Some(runoff) = &result.next_round {
                    tracing::info!(
                        "🔀 Runoff opened: trip={}, round={}, finalists={}",
                        trip_id,
                        runoff.id,
                        runoff.candidates.len()
                    );
                }

                if let Some(event) = record.last_event() {
                    self.publisher.publish(event);
                }
            },
        )
    }

    /// Compute the result and pair it with candidate display fields
    pub fn compute_published_result(&self, trip_id: &TripId) -> Result<PublishedResult> {
        let result = self.compute_result(trip_id)?;
        let candidates = self.candidates(trip_id)?;
        Ok(ResultPublisher::summarize(&result, &candidates))
    }

    /// The decision event emitted for the trip's latest round close
    pub fn last_decision_event(&self, trip_id: &TripId) -> Result<Option<DecisionEvent>> {
        Ok(self
            .ledger
            .read(trip_id, |record| record.last_event().cloned())?
            .flatten())
    }

    /// Newest round, open or closed
    pub fn latest_round(&self, trip_id: &TripId) -> Result<Option<Round>> {
        Ok(self
            .ledger
            .read(trip_id, |record| record.latest_round().cloned())?
            .flatten())
    }

    /// All rounds of the session in order
    pub fn rounds(&self, trip_id: &TripId) -> Result<Vec<Round>> {
        Ok(self
            .ledger
            .read(trip_id, |record| record.rounds().to_vec())?
            .unwrap_or_default())
    }

    /// Consistent snapshot of a round's ballots
    pub fn ballots(&self, trip_id: &TripId, round_id: &RoundId) -> Result<Vec<Ballot>> {
        self.ledger
            .read(trip_id, |record| record.ballot_snapshot(round_id))?
            .unwrap_or(Err(Error::UnknownRound {
                round_id: *round_id,
            }))
    }

    /// Candidates frozen for the session; empty before Round 1 opens
    pub fn candidates(&self, trip_id: &TripId) -> Result<Vec<Candidate>> {
        Ok(self
            .ledger
            .read(trip_id, |record| record.candidates().to_vec())?
            .unwrap_or_default())
    }

    pub fn session_status(&self, trip_id: &TripId) -> Result<SessionStatus> {
        Ok(self
            .ledger
            .read(trip_id, |record| record.status())?
            .unwrap_or(SessionStatus::NotStarted))
    }

    pub fn stats(&self) -> Result<DecisionStats> {
        Ok(DecisionStats {
            ledger: self.ledger.stats()?,
            ballots_accepted: self.ballots_accepted.load(Ordering::Relaxed),
            ballots_replaced: self.ballots_replaced.load(Ordering::Relaxed),
            ballots_rejected: self.ballots_rejected.load(Ordering::Relaxed),
            rounds_closed: self.rounds_closed.load(Ordering::Relaxed),
            race_retries: self.race_retries.load(Ordering::Relaxed),
        })
    }
}
