//! Result publication: decision events, audit trail and notifications

pub mod audit;
pub mod event;
pub mod notify;

pub use audit::{AuditIntegrityReport, AuditRecord, DecisionAuditTrail, IntegrityViolation};
pub use event::{
    CandidateStanding, DecisionEvent, DecisionEventSink, OutcomeKind, PublishedResult,
    ResultPublisher, RunoffNotice,
};
pub use notify::DecisionNotifier;
