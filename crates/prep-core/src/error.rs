//! Error types for the refresh engine.
//!
//! Configuration problems in a single definition are reported through
//! [`prep_model::ConfigurationError`] and never abort a cycle. The types here
//! cover the store, per-patient evaluation, and whole-cycle failures.

use std::path::PathBuf;

use prep_model::{PatientId, ScreeningId, TenantId};
use thiserror::Error;

/// Failure reading from or writing to a collaborator store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    #[error("commit failed: {message}")]
    CommitFailed { message: String },

    #[error("screening {screening_id} not found")]
    MissingScreening { screening_id: ScreeningId },

    #[error("write for tenant {found} inside a change set for tenant {expected}")]
    TenantMismatch { expected: TenantId, found: TenantId },
}

impl PersistenceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }
}

/// Failure processing one patient. The patient is skipped and the cycle
/// continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("patient {patient_id} not found in tenant {tenant_id}")]
    UnknownPatient {
        tenant_id: TenantId,
        patient_id: PatientId,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A cycle-level failure. Nothing from the cycle was persisted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("refresh of tenant {tenant_id} failed: {source}")]
    Persistence {
        tenant_id: TenantId,
        #[source]
        source: PersistenceError,
    },

    #[error("refresh lock for tenant {tenant_id} is poisoned")]
    LockPoisoned { tenant_id: TenantId },
}

impl RefreshError {
    pub(crate) fn persistence(tenant_id: TenantId, source: PersistenceError) -> Self {
        Self::Persistence { tenant_id, source }
    }
}

/// Failure loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

/// Failure delivering an audit event. Logged and otherwise ignored.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("audit sink failed: {message}")]
pub struct AuditError {
    pub message: String,
}
