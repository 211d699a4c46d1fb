//! Tamper-evident audit trail of decision events
//!
//! Records carry a monotonically increasing sequence number, a blake3 hash
//! of their event, and the hash of the previous record, so any edit or gap
//! shows up in [`DecisionAuditTrail::verify_integrity`]. Only the most
//! recent `max_memory_records` are kept; the chain check starts at the
//! oldest retained record.

use crate::config::AuditConfig;
use crate::publish::event::{DecisionEvent, DecisionEventSink, OutcomeKind};
use crate::types::TripId;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::RwLock;
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub type AuditHash = [u8; 32];

fn hash_bytes(data: &[u8]) -> AuditHash {
    blake3::hash(data).into()
}

fn hashes_match(a: &AuditHash, b: &AuditHash) -> bool {
    a.ct_eq(b).into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: Uuid,
    pub sequence_number: u64,
    pub audit_source: String,
    pub previous_hash: Option<AuditHash>,
    pub content_hash: AuditHash,
    pub event: DecisionEvent,
    pub system_version: String,
}

impl AuditRecord {
    fn new(
        sequence_number: u64,
        previous_hash: Option<AuditHash>,
        event: DecisionEvent,
        audit_source: String,
    ) -> Result<Self> {
        let content_hash = hash_bytes(&serde_json::to_vec(&event)?);

        Ok(Self {
            record_id: Uuid::new_v4(),
            sequence_number,
            audit_source,
            previous_hash,
            content_hash,
            event,
            system_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Hash of the whole record; the next record's `previous_hash`
    pub fn record_hash(&self) -> Result<AuditHash> {
        Ok(hash_bytes(&serde_json::to_vec(self)?))
    }

    /// Whether the stored event still matches its content hash
    pub fn verify_content(&self) -> Result<bool> {
        let expected = hash_bytes(&serde_json::to_vec(&self.event)?);
        Ok(hashes_match(&self.content_hash, &expected))
    }

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntegrityViolation {
    ContentHashMismatch { sequence_number: u64 },
    HashChainBroken { sequence_number: u64 },
    SequenceNumberGap { expected: u64, found: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditIntegrityReport {
    pub records_checked: usize,
    pub violations: Vec<IntegrityViolation>,
}

impl AuditIntegrityReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

struct TrailState {
    next_sequence: u64,
    last_hash: Option<AuditHash>,
    records: VecDeque<AuditRecord>,
}

/// In-memory hash-chained audit sink
pub struct DecisionAuditTrail {
    state: RwLock<TrailState>,
    config: AuditConfig,
}

impl DecisionAuditTrail {
    pub fn new(config: AuditConfig) -> Self {
        Self {
            state: RwLock::new(TrailState {
                next_sequence: 1,
                last_hash: None,
                records: VecDeque::new(),
            }),
            config,
        }
    }

    pub fn for_testing() -> Self {
        Self::new(AuditConfig::for_testing())
    }

    /// Append an event to the chain
    pub fn append(&self, event: DecisionEvent) -> Result<AuditRecord> {
        let mut state = self
            .state
            .write()
            .map_err(|_| Error::internal("Audit trail write error"))?;

        let record = AuditRecord::new(
            state.next_sequence,
            state.last_hash,
            event,
            self.config.audit_source.clone(),
        )?;
        let record_hash = record.record_hash()?;

        state.next_sequence += 1;
        state.last_hash = Some(record_hash);
        state.records.push_back(record.clone());
        while state.records.len() > self.config.max_memory_records {
            state.records.pop_front();
        }

        tracing::debug!(
            "📝 Audit record added: seq={}, trip={}, outcome={:?}",
            record.sequence_number,
            record.event.trip_id,
            record.event.outcome_kind
        );
        Ok(record)
    }

    /// Check sequence continuity, content hashes and the hash chain
    pub fn verify_integrity(&self) -> Result<AuditIntegrityReport> {
        let state = self
            .state
            .read()
            .map_err(|_| Error::internal("Audit trail read error"))?;

        let mut violations = Vec::new();
        let mut previous: Option<&AuditRecord> = None;

        for record in &state.records {
            if !record.verify_content()? {
                violations.push(IntegrityViolation::ContentHashMismatch {
                    sequence_number: record.sequence_number,
                });
            }

            if let Some(prev) = previous {
                let expected = prev.sequence_number + 1;
                if record.sequence_number != expected {
                    violations.push(IntegrityViolation::SequenceNumberGap {
                        expected,
                        found: record.sequence_number,
                    });
                }

                let chained = record
                    .previous_hash
                    .is_some_and(|hash| prev.record_hash().is_ok_and(|h| hashes_match(&hash, &h)));
                if !chained {
                    violations.push(IntegrityViolation::HashChainBroken {
                        sequence_number: record.sequence_number,
                    });
                }
            }
            previous = Some(record);
        }

        if !violations.is_empty() {
            tracing::warn!("🚨 Audit trail integrity violations: {}", violations.len());
        }

        Ok(AuditIntegrityReport {
            records_checked: state.records.len(),
            violations,
        })
    }

    /// Retained records for one trip, oldest first
    pub fn records_for_trip(&self, trip_id: &TripId) -> Result<Vec<AuditRecord>> {
        let state = self
            .state
            .read()
            .map_err(|_| Error::internal("Audit trail read error"))?;
        Ok(state
            .records
            .iter()
            .filter(|record| &record.event.trip_id == trip_id)
            .cloned()
            .collect())
    }

    /// Retained records with the given outcome
    pub fn records_with_outcome(&self, kind: OutcomeKind) -> Result<Vec<AuditRecord>> {
        let state = self
            .state
            .read()
            .map_err(|_| Error::internal("Audit trail read error"))?;
        Ok(state
            .records
            .iter()
            .filter(|record| record.event.outcome_kind == kind)
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        let state = self
            .state
            .read()
            .map_err(|_| Error::internal("Audit trail read error"))?;
        Ok(state.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    #[cfg(test)]
    fn tamper<F: FnOnce(&mut AuditRecord)>(&self, index: usize, f: F) {
        let mut state = self.state.write().unwrap();
        f(&mut state.records[index]);
    }
}

impl DecisionEventSink for DecisionAuditTrail {
    fn name(&self) -> &str {
        "audit_trail"
    }

    fn accept(&self, event: &DecisionEvent) -> Result<()> {
        self.append(event.clone()).map(|_| ())
    }
}
