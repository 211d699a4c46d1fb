//! # Core Types for the Trip Decision Engine
//!
//! This module defines the identifiers and candidate records shared by every
//! part of the engine.
//!
//! ## Design Principles
//!
//! - **Strong identifiers**: every id is its own newtype over [`Uuid`], so a
//!   candidate id can never be passed where a trip or round id is expected
//! - **Transparent serialization**: ids serialize as plain UUID strings
//! - **Immutable candidates**: a [`Candidate`] is never mutated once supplied
//!
//! ## Usage Examples
//!
//! ```rust
//! use tripvote::types::{Candidate, TripId};
//!
//! let trip_id = TripId::new();
//! let candidate = Candidate::new(trip_id, "Phuket")
//!     .with_description("Beaches and night markets");
//!
//! assert_eq!(candidate.trip_id, trip_id);
//! assert_eq!(candidate.title, "Phuket");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Underlying UUID
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                Uuid::parse_str(s).map(Self).map_err(|e| {
                    crate::Error::internal(format!(
                        "invalid {}: {}",
                        stringify!($name),
                        e
                    ))
                })
            }
        }
    };
}

define_id!(
    /// Identifier of a trip; scopes candidates, participants and rounds
    TripId
);
define_id!(
    /// Identifier of a trip participant (a voter)
    ParticipantId
);
define_id!(
    /// Identifier of a destination candidate
    CandidateId
);
define_id!(
    /// Identifier of one elimination round
    RoundId
);
define_id!(
    /// Identifier of one stored ballot
    BallotId
);

/// A destination option participants rank
///
/// Candidates come from the upstream candidate-generation collaborator. The
/// engine only interprets `id` and `trip_id`; the remaining fields are carried
/// through to published results for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    /// Unique candidate identifier
    pub id: CandidateId,

    /// Trip this candidate belongs to
    pub trip_id: TripId,

    /// Display title (e.g. "Koh Samui")
    pub title: String,

    /// Optional longer description
    pub description: Option<String>,

    /// Free-form display fields (prompt variant, model name, cost...)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// When the candidate record was created
    pub created_at: DateTime<Utc>,
}

impl Candidate {
    /// Create a candidate with a fresh id
    pub fn new(trip_id: TripId, title: impl Into<String>) -> Self {
        Self {
            id: CandidateId::new(),
            trip_id,
            title: title.into(),
            description: None,
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a display field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
