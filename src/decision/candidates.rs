//! Candidate supply
//!
//! The candidate-generation collaborator publishes a finalized list per trip.
//! The decision service reads it once, when a trip's first round opens, and
//! never again for that session.

use crate::types::{Candidate, TripId};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Source of a trip's finalized candidate list
pub trait CandidateSource: Send + Sync {
    /// Candidates for `trip_id` in presentation order; empty if none supplied
    fn candidates_for(&self, trip_id: &TripId) -> Result<Vec<Candidate>>;
}

/// In-memory candidate catalog keyed by trip
#[derive(Default)]
pub struct CandidateCatalog {
    trips: RwLock<HashMap<TripId, Vec<Candidate>>>,
}

impl CandidateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the candidate list for a trip, replacing any earlier list
    ///
    /// Every candidate must belong to `trip_id` and ids must be unique.
    pub fn publish(&self, trip_id: TripId, candidates: Vec<Candidate>) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for candidate in &candidates {
            if candidate.trip_id != trip_id {
                return Err(Error::internal(format!(
                    "candidate {} belongs to trip {}, not {}",
                    candidate.id, candidate.trip_id, trip_id
                )));
            }
            if !seen.insert(candidate.id) {
                return Err(Error::internal(format!(
                    "candidate {} published twice",
                    candidate.id
                )));
            }
        }

        let mut trips = self
            .trips
            .write()
            .map_err(|_| Error::internal("Candidate catalog write error"))?;

        tracing::debug!(
            "🧭 Candidates published: trip={}, count={}",
            trip_id,
            candidates.len()
        );
        trips.insert(trip_id, candidates);
        Ok(())
    }
}

impl CandidateSource for CandidateCatalog {
    fn candidates_for(&self, trip_id: &TripId) -> Result<Vec<Candidate>> {
        let trips = self
            .trips
            .read()
            .map_err(|_| Error::internal("Candidate catalog read error"))?;
        Ok(trips.get(trip_id).cloned().unwrap_or_default())
    }
}
