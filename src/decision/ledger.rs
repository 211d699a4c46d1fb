//! Round and ballot storage with per-trip serialization
//!
//! Locking layout:
//! 1. `trips` map lock, held only to find or create a trip record
//! 2. per-trip record lock: read for ballot casts, write for round creation
//!    and close/open transitions
//! 3. per-round ballot box lock, held only for a single replace or snapshot
//!
//! A transition holds the record write lock for its whole duration, so no
//! cast can interleave with a tally snapshot, and at most one open round can
//! exist per trip.

use crate::decision::ballot::Ballot;
use crate::decision::round::{Round, SessionStatus};
use crate::publish::DecisionEvent;
use crate::types::{BallotId, Candidate, ParticipantId, RoundId, TripId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Ballots of one round, at most one per participant
type BallotBox = Arc<RwLock<BTreeMap<ParticipantId, Ballot>>>;

/// Everything stored for one trip's decision session
#[derive(Clone)]
pub struct TripRecord {
    trip_id: TripId,
    candidates: Vec<Candidate>,
    rounds: Vec<Round>,
    ballot_boxes: HashMap<RoundId, BallotBox>,
    last_event: Option<DecisionEvent>,
}

impl TripRecord {
    fn new(trip_id: TripId) -> Self {
        Self {
            trip_id,
            candidates: Vec::new(),
            rounds: Vec::new(),
            ballot_boxes: HashMap::new(),
            last_event: None,
        }
    }

    /// Candidates frozen when the first round opened
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    /// The open round, if any
    pub fn open_round(&self) -> Option<&Round> {
        self.rounds.iter().rev().find(|round| round.is_open())
    }

    pub fn latest_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    pub fn round(&self, round_id: &RoundId) -> Option<&Round> {
        self.rounds.iter().find(|round| &round.id == round_id)
    }

    pub fn round_mut(&mut self, round_id: &RoundId) -> Result<&mut Round> {
        self.rounds
            .iter_mut()
            .find(|round| &round.id == round_id)
            .ok_or(Error::UnknownRound {
                round_id: *round_id,
            })
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from_latest(self.latest_round())
    }

    /// Event emitted for the most recent round close
    pub fn last_event(&self) -> Option<&DecisionEvent> {
        self.last_event.as_ref()
    }

    pub fn record_event(&mut self, event: DecisionEvent) {
        self.last_event = Some(event);
    }

    /// Append a new open round
    ///
    /// Fails with `RoundRaceLost` if the trip already has an open round.
    pub fn push_round(&mut self, round: Round) -> Result<()> {
        if self.open_round().is_some() {
            return Err(Error::RoundRaceLost {
                trip_id: self.trip_id,
            });
        }

        self.ballot_boxes.insert(round.id, BallotBox::default());
        self.rounds.push(round);
        Ok(())
    }

    /// Consistent copy of a round's ballots, ordered by participant
    pub fn ballot_snapshot(&self, round_id: &RoundId) -> Result<Vec<Ballot>> {
        let ballot_box = self.ballot_boxes.get(round_id).ok_or(Error::UnknownRound {
            round_id: *round_id,
        })?;
        let ballots = ballot_box
            .read()
            .map_err(|_| Error::internal("Ballot box read error"))?;
        Ok(ballots.values().cloned().collect())
    }
}

/// Aggregate counts across all trips
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    pub trips: usize,
    pub open_rounds: usize,
    pub closed_rounds: usize,
    pub stored_ballots: usize,
}

/// Storage for every trip's rounds and ballots
#[derive(Default)]
pub struct RoundLedger {
    trips: RwLock<HashMap<TripId, Arc<RwLock<TripRecord>>>>,
}

impl RoundLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, trip_id: &TripId) -> Result<Option<Arc<RwLock<TripRecord>>>> {
        let trips = self
            .trips
            .read()
            .map_err(|_| Error::internal("Ledger read error"))?;
        Ok(trips.get(trip_id).cloned())
    }

    fn record_or_insert(&self, trip_id: TripId) -> Result<Arc<RwLock<TripRecord>>> {
        if let Some(record) = self.record(&trip_id)? {
            return Ok(record);
        }

        let mut trips = self
            .trips
            .write()
            .map_err(|_| Error::internal("Ledger write error"))?;
        Ok(trips
            .entry(trip_id)
            .or_insert_with(|| Arc::new(RwLock::new(TripRecord::new(trip_id))))
            .clone())
    }

    /// Read-only view of a trip record; `None` if the trip is unknown
    pub fn read<T>(&self, trip_id: &TripId, f: impl FnOnce(&TripRecord) -> T) -> Result<Option<T>> {
        let Some(record) = self.record(trip_id)? else {
            return Ok(None);
        };
        let record = record
            .read()
            .map_err(|_| Error::internal("Trip record read error"))?;
        Ok(Some(f(&record)))
    }

    /// Create the first round of a session and freeze its candidates
    ///
    /// Behaves like an insert under a uniqueness constraint: if any round
    /// already exists for the trip the call fails with `RoundRaceLost` and
    /// the caller should re-fetch.
    pub fn open_first_round(&self, trip_id: TripId, candidates: Vec<Candidate>) -> Result<Round> {
        let record = self.record_or_insert(trip_id)?;
        let mut record = record
            .write()
            .map_err(|_| Error::internal("Trip record write error"))?;

        if !record.rounds.is_empty() {
            return Err(Error::RoundRaceLost { trip_id });
        }

        let round = Round::first(trip_id, candidates.iter().map(|c| c.id).collect());
        record.push_round(round.clone())?;
        record.candidates = candidates;
        Ok(round)
    }

    /// Store a ballot, replacing the participant's earlier one in that round
    ///
    /// Returns the id of the replaced ballot, if there was one.
    pub fn cast(&self, trip_id: &TripId, ballot: Ballot) -> Result<Option<BallotId>> {
        let record = self.record(trip_id)?.ok_or(Error::UnknownRound {
            round_id: ballot.round_id,
        })?;
        let record = record
            .read()
            .map_err(|_| Error::internal("Trip record read error"))?;

        let round = record.round(&ballot.round_id).ok_or(Error::UnknownRound {
            round_id: ballot.round_id,
        })?;
        if !round.is_open() {
            return Err(Error::RoundClosed {
                round_id: round.id,
            });
        }

        let ballot_box = record
            .ballot_boxes
            .get(&ballot.round_id)
            .ok_or(Error::UnknownRound {
                round_id: ballot.round_id,
            })?;
        let mut ballots = ballot_box
            .write()
            .map_err(|_| Error::internal("Ballot box write error"))?;

        Ok(ballots
            .insert(ballot.participant_id, ballot)
            .map(|previous| previous.id))
    }

    /// Run `f` as one all-or-nothing unit of work on the trip record
    ///
    /// `f` works on a copy; the copy replaces the record only if `f`
    /// succeeds. Ballot boxes are shared with the copy, so `f` must not cast.
    pub fn transition<T>(
        &self,
        trip_id: &TripId,
        f: impl FnOnce(&mut TripRecord) -> Result<T>,
    ) -> Result<T> {
        self.transition_then(trip_id, f, |_, _| {})
    }

    /// Like [`transition`](Self::transition), then run `committed` on the
    /// committed record before the trip's write lock is released
    ///
    /// Anything `committed` does is ordered with the trip's transitions. It
    /// must not call back into the ledger for the same trip.
    pub fn transition_then<T>(
        &self,
        trip_id: &TripId,
        f: impl FnOnce(&mut TripRecord) -> Result<T>,
        committed: impl FnOnce(&TripRecord, &T),
    ) -> Result<T> {
        let record = self.record_or_insert(*trip_id)?;
        let mut record = record
            .write()
            .map_err(|_| Error::internal("Trip record write error"))?;

        let mut draft = record.clone();
        let value = f(&mut draft)?;

        // Boxes of rounds that never made it into the committed record are dropped with the draft
        *record = draft;
        committed(&*record, &value);
        Ok(value)
    }

    pub fn stats(&self) -> Result<LedgerStats> {
        let records: Vec<_> = {
            let trips = self
                .trips
                .read()
                .map_err(|_| Error::internal("Ledger read error"))?;
            trips.values().cloned().collect()
        };

        let mut stats = LedgerStats {
            trips: records.len(),
            ..LedgerStats::default()
        };
        for record in records {
            let record = record
                .read()
                .map_err(|_| Error::internal("Trip record read error"))?;
            for round in &record.rounds {
                if round.is_open() {
                    stats.open_rounds += 1;
                } else {
                    stats.closed_rounds += 1;
                }
                stats.stored_ballots += record.ballot_snapshot(&round.id)?.len();
            }
        }
        Ok(stats)
    }
}
