//! Error handling for the decision engine

use crate::types::{ParticipantId, RoundId, TripId};

/// Result type alias for the decision engine
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the decision engine
///
/// Every failure is scoped to a single trip's decision session. An
/// undecidable tally is not an error; it is reported as
/// [`RoundOutcome::Undecidable`](crate::decision::RoundOutcome::Undecidable).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Malformed ranks or an unknown/ineligible candidate
    #[error("Invalid ballot: {reason}")]
    InvalidBallot { reason: String },

    /// Ballot submitted against a round that is no longer open
    #[error("Round {round_id} is closed")]
    RoundClosed { round_id: RoundId },

    /// A concurrent round creation won the uniqueness race
    #[error("Lost round creation race for trip {trip_id}")]
    RoundRaceLost { trip_id: TripId },

    /// Participant rejected by the eligibility collaborator
    #[error("Participant {participant_id} is not eligible to vote on trip {trip_id}")]
    ParticipantNotEligible {
        participant_id: ParticipantId,
        trip_id: TripId,
    },

    /// No candidate set has been supplied for the trip
    #[error("No candidates supplied for trip {trip_id}")]
    NoCandidates { trip_id: TripId },

    /// Round id does not belong to the trip
    #[error("Unknown round {round_id}")]
    UnknownRound { round_id: RoundId },

    /// Decision state machine errors
    #[error("Decision error: {message}")]
    Decision { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new invalid ballot error
    pub fn invalid_ballot(reason: impl Into<String>) -> Self {
        Self::InvalidBallot {
            reason: reason.into(),
        }
    }

    /// Create a new decision error
    pub fn decision(message: impl Into<String>) -> Self {
        Self::Decision {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the caller should re-fetch state and try again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RoundRaceLost { .. })
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! ballot_error {
    ($msg:expr) => {
        $crate::Error::invalid_ballot($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::invalid_ballot(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! decision_error {
    ($msg:expr) => {
        $crate::Error::decision($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::decision(format!($fmt, $($arg)*))
    };
}
