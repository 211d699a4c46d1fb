//! Decision events and the result publisher
//!
//! Every round close produces exactly one [`DecisionEvent`], built from its
//! [`DecisionResult`]. The publisher hands that event to each registered sink
//! while the trip is still locked, so sinks see a trip's closes in round
//! order. It keeps no state of its own.

use crate::Result;
use crate::decision::{DecisionResult, PassTally, RoundOutcome, UndecidableReason};
use crate::types::{Candidate, CandidateId, RoundId, TripId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Winner,
    Tied,
    Undecidable,
}

/// Runoff round opened by a tie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunoffNotice {
    pub round_id: RoundId,
    pub candidates: Vec<CandidateId>,
}

/// Emitted once per round close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub event_id: Uuid,
    pub trip_id: TripId,
    pub round_id: RoundId,
    pub round_number: u32,
    pub outcome_kind: OutcomeKind,
    pub winner: Option<CandidateId>,
    /// Tied finalists; empty unless `outcome_kind` is `Tied`
    pub finalists: Vec<CandidateId>,
    pub undecidable_reason: Option<UndecidableReason>,
    pub tally_history: Vec<PassTally>,
    pub runoff: Option<RunoffNotice>,
    pub ballots_counted: usize,
    pub emitted_at: DateTime<Utc>,
}

impl DecisionEvent {
    pub fn from_result(result: &DecisionResult) -> Self {
        let (outcome_kind, winner, finalists, undecidable_reason) = match &result.outcome {
            RoundOutcome::Winner { candidate_id } => {
                (OutcomeKind::Winner, Some(*candidate_id), Vec::new(), None)
            }
            RoundOutcome::Tied { finalists } => {
                (OutcomeKind::Tied, None, finalists.clone(), None)
            }
            RoundOutcome::Undecidable { reason } => {
                (OutcomeKind::Undecidable, None, Vec::new(), Some(*reason))
            }
        };

        Self {
            event_id: Uuid::new_v4(),
            trip_id: result.trip_id,
            round_id: result.round.id,
            round_number: result.round.number,
            outcome_kind,
            winner,
            finalists,
            undecidable_reason,
            tally_history: result.tally_history.clone(),
            runoff: result.next_round.as_ref().map(|round| RunoffNotice {
                round_id: round.id,
                candidates: round.candidates.clone(),
            }),
            ballots_counted: result.ballots_counted,
            emitted_at: Utc::now(),
        }
    }
}

/// Consumer of decision events (audit, notifications)
pub trait DecisionEventSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    fn accept(&self, event: &DecisionEvent) -> Result<()>;
}

/// A candidate with its share of the last tally pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStanding {
    pub candidate_id: CandidateId,
    pub title: String,
    pub final_votes: Option<u64>,
    pub percentage: f64,
}

/// Outcome paired with candidate display fields for presentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedResult {
    pub trip_id: TripId,
    pub round_id: RoundId,
    pub outcome: RoundOutcome,
    pub winner_title: Option<String>,
    pub standings: Vec<CandidateStanding>,
    pub next_round: Option<RunoffNotice>,
}

/// Fans decision events out to sinks
#[derive(Default, Clone)]
pub struct ResultPublisher {
    sinks: Vec<Arc<dyn DecisionEventSink>>,
}

impl ResultPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn DecisionEventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Hand the event of a freshly closed round to every sink, in order
    ///
    /// Sink failures are logged and skipped; the decision itself is already
    /// committed.
    pub fn publish(&self, event: &DecisionEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.accept(event) {
                tracing::warn!(
                    "⚠️ Decision event not delivered: sink={}, round={}, error={}",
                    sink.name(),
                    event.round_id,
                    e
                );
            }
        }

        tracing::info!(
            "📣 Decision published: trip={}, round={}, outcome={:?}, runoff={}",
            event.trip_id,
            event.round_id,
            event.outcome_kind,
            event.runoff.is_some()
        );
    }

    /// Pair a result with the trip's candidate titles
    pub fn summarize(result: &DecisionResult, candidates: &[Candidate]) -> PublishedResult {
        let title_of = |id: &CandidateId| {
            candidates
                .iter()
                .find(|c| &c.id == id)
                .map(|c| c.title.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let last_pass = result.tally_history.last();
        let total = last_pass.map(PassTally::total).unwrap_or_default();
        let standings = result
            .round
            .candidates
            .iter()
            .map(|id| {
                let final_votes = last_pass.and_then(|pass| pass.votes_for(id));
                let percentage = match (final_votes, total) {
                    (Some(votes), total) if total > 0 => votes as f64 * 100.0 / total as f64,
                    _ => 0.0,
                };
                CandidateStanding {
                    candidate_id: *id,
                    title: title_of(id),
                    final_votes,
                    percentage,
                }
            })
            .collect();

        PublishedResult {
            trip_id: result.trip_id,
            round_id: result.round.id,
            outcome: result.outcome.clone(),
            winner_title: result.outcome.winner().map(|id| title_of(&id)),
            standings,
            next_round: result.next_round.as_ref().map(|round| RunoffNotice {
                round_id: round.id,
                candidates: round.candidates.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{CandidateCount, Round, SessionStatus};
    use crate::types::TripId;
    use std::sync::Mutex;

    struct Collecting {
        events: Mutex<Vec<DecisionEvent>>,
    }

    impl DecisionEventSink for Collecting {
        fn name(&self) -> &str {
            "collecting"
        }

        fn accept(&self, event: &DecisionEvent) -> Result<()> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Failing;

    impl DecisionEventSink for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn accept(&self, _event: &DecisionEvent) -> Result<()> {
            Err(crate::Error::internal("sink offline"))
        }
    }

    fn winner_result(trip_id: TripId, candidates: &[Candidate]) -> DecisionResult {
        let ids: Vec<_> = candidates.iter().map(|c| c.id).collect();
        let mut round = Round::first(trip_id, ids.clone());
        let history = vec![PassTally {
            pass: 1,
            counts: vec![
                CandidateCount {
                    candidate_id: ids[0],
                    votes: 3,
                },
                CandidateCount {
                    candidate_id: ids[1],
                    votes: 1,
                },
            ],
            exhausted: 0,
            eliminated: Vec::new(),
        }];
        let outcome = RoundOutcome::Winner {
            candidate_id: ids[0],
        };
        round.close(outcome.clone(), history.clone()).unwrap();

        DecisionResult {
            trip_id,
            round,
            outcome,
            tally_history: history,
            next_round: None,
            status: SessionStatus::Decided { winner: ids[0] },
            already_decided: false,
            ballots_counted: 4,
        }
    }

    #[test]
    fn test_publish_reaches_every_sink_despite_failures() {
        let trip_id = TripId::new();
        let candidates = vec![Candidate::new(trip_id, "Phuket"), Candidate::new(trip_id, "Bali")];
        let collecting = Arc::new(Collecting {
            events: Mutex::new(Vec::new()),
        });
        let publisher = ResultPublisher::new()
            .with_sink(Arc::new(Failing))
            .with_sink(collecting.clone());

        assert_eq!(publisher.sink_count(), 2);

        let event = DecisionEvent::from_result(&winner_result(trip_id, &candidates));
        publisher.publish(&event);

        assert_eq!(event.outcome_kind, OutcomeKind::Winner);
        assert_eq!(event.winner, Some(candidates[0].id));
        assert!(event.runoff.is_none());
        assert_eq!(*collecting.events.lock().unwrap(), vec![event]);
    }

    #[test]
    fn test_publisher_without_sinks_is_noop() {
        let trip_id = TripId::new();
        let candidates = vec![Candidate::new(trip_id, "Phuket"), Candidate::new(trip_id, "Bali")];
        let publisher = ResultPublisher::new();

        assert_eq!(publisher.sink_count(), 0);
        publisher.publish(&DecisionEvent::from_result(&winner_result(trip_id, &candidates)));
    }

    #[test]
    fn test_summary_uses_titles_and_shares() {
        let trip_id = TripId::new();
        let candidates = vec![Candidate::new(trip_id, "Phuket"), Candidate::new(trip_id, "Bali")];
        let summary = ResultPublisher::summarize(&winner_result(trip_id, &candidates), &candidates);

        assert_eq!(summary.winner_title.as_deref(), Some("Phuket"));
        assert_eq!(summary.standings[0].final_votes, Some(3));
        assert!((summary.standings[0].percentage - 75.0).abs() < f64::EPSILON);
        assert_eq!(summary.standings[1].title, "Bali");
    }
}
