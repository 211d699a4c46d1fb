//! Group decision engine: ballots, instant-runoff tally, rounds and sessions

pub mod ballot;
pub mod candidates;
pub mod ledger;
pub mod roster;
pub mod round;
pub mod service;
pub mod tally;

pub use ballot::{Ballot, RankedChoice};
pub use candidates::{CandidateCatalog, CandidateSource};
pub use ledger::{LedgerStats, RoundLedger, TripRecord};
pub use roster::{OpenRoster, ParticipantRoster, TripRoster};
pub use round::{Round, RoundOutcome, RoundStatus, SessionStatus, UndecidableReason};
pub use service::{BallotReceipt, DecisionResult, DecisionService, DecisionStats};
pub use tally::{CandidateCount, PassTally, TallyOutcome, TallyResult, tally};
