#![deny(unsafe_code)]

//! Screening eligibility and incremental status refresh.

pub mod change;
pub mod config;
pub mod eligibility;
pub mod error;
pub mod evidence;
pub mod lock;
pub mod memory;
pub mod refresh;
pub mod status;
pub mod store;
pub mod variant;

pub use change::{
    ChangeDetector, ChangeReport, ChangeRequest, ModificationReason, ModifiedScreeningType,
    modification_reason,
};
pub use config::EngineConfig;
pub use eligibility::{
    Criterion, CriterionCheck, EligibilityEvaluator, EligibilityExplanation, PatientRecord,
    condition_matches, normalize_condition,
};
pub use error::{AuditError, ConfigError, EvaluationError, PersistenceError, RefreshError};
pub use evidence::{Evidence, EvidenceFinder};
pub use lock::TenantLocks;
pub use memory::{Dataset, Dismissal, InMemoryStore, RefreshWatermark};
pub use refresh::{Collaborators, RefreshOrchestrator, RefreshRequest};
pub use status::{StatusCalculator, next_due_date};
pub use store::{
    AuditEventType, AuditLogger, ChangeSet, CommitSummary, DismissalStore, DocumentSource,
    ImmunizationSource, ScreeningStore, ScreeningUpsert, TracingAuditLogger, WriteOp,
};
pub use variant::{VariantFamily, VariantSelector, group_families, specificity_score};
