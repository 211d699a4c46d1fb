//! Participant eligibility
//!
//! Who may vote is decided outside the engine. The service asks a roster
//! before accepting a ballot and reports `ParticipantNotEligible` on refusal.

use crate::types::{ParticipantId, TripId};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

pub trait ParticipantRoster: Send + Sync {
    fn is_eligible(&self, trip_id: &TripId, participant_id: &ParticipantId) -> Result<bool>;
}

/// Roster that admits everyone; authorization happens upstream
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenRoster;

impl ParticipantRoster for OpenRoster {
    fn is_eligible(&self, _trip_id: &TripId, _participant_id: &ParticipantId) -> Result<bool> {
        Ok(true)
    }
}

/// In-memory trip membership
#[derive(Default)]
pub struct TripRoster {
    members: RwLock<HashMap<TripId, HashSet<ParticipantId>>>,
}

impl TripRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to a trip; returns false if already a member
    pub fn join(&self, trip_id: TripId, participant_id: ParticipantId) -> Result<bool> {
        let mut members = self
            .members
            .write()
            .map_err(|_| Error::internal("Roster write error"))?;
        Ok(members.entry(trip_id).or_default().insert(participant_id))
    }

    /// Remove a participant; ballots already cast are kept
    pub fn leave(&self, trip_id: &TripId, participant_id: &ParticipantId) -> Result<bool> {
        let mut members = self
            .members
            .write()
            .map_err(|_| Error::internal("Roster write error"))?;
        Ok(members
            .get_mut(trip_id)
            .is_some_and(|set| set.remove(participant_id)))
    }
}

impl ParticipantRoster for TripRoster {
    fn is_eligible(&self, trip_id: &TripId, participant_id: &ParticipantId) -> Result<bool> {
        let members = self
            .members
            .read()
            .map_err(|_| Error::internal("Roster read error"))?;
        Ok(members
            .get(trip_id)
            .is_some_and(|set| set.contains(participant_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trip_roster_membership() {
        let roster = TripRoster::new();
        let trip_id = TripId::new();
        let alice = ParticipantId::new();

        assert!(!roster.is_eligible(&trip_id, &alice).unwrap());
        assert!(roster.join(trip_id, alice).unwrap());
        assert!(!roster.join(trip_id, alice).unwrap());
        assert!(roster.is_eligible(&trip_id, &alice).unwrap());
        assert!(!roster.is_eligible(&TripId::new(), &alice).unwrap());

        assert!(roster.leave(&trip_id, &alice).unwrap());
        assert!(!roster.is_eligible(&trip_id, &alice).unwrap());
    }

    #[test]
    fn test_open_roster_admits_everyone() {
        assert!(OpenRoster.is_eligible(&TripId::new(), &ParticipantId::new()).unwrap());
    }
}
