use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{DocumentOrigin, ImmunizationStatus};
use crate::ids::{DocumentId, ImmunizationId, PatientId, TenantId};

/// A scanned or EHR-sourced document, with OCR output.
///
/// Read-only input to matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub origin: DocumentOrigin,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub ocr_text: Option<String>,
    #[serde(default)]
    pub ocr_confidence: Option<f32>,
    #[serde(default)]
    pub document_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// OCR text followed by the filename, as one searchable string.
    pub fn searchable_text(&self) -> String {
        let parts: Vec<&str> = [self.ocr_text.as_deref(), self.filename.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect();
        parts.join("\n")
    }

    /// Date this document counts as evidence for.
    pub fn evidence_date(&self) -> NaiveDate {
        self.document_date
            .unwrap_or_else(|| self.created_at.date_naive())
    }
}

/// An immunization record reported by the EHR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Immunization {
    pub id: ImmunizationId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    #[serde(default)]
    pub vaccine_code: Option<String>,
    pub vaccine_name: String,
    #[serde(default)]
    pub administration_date: Option<NaiveDate>,
    pub status: ImmunizationStatus,
    pub updated_at: DateTime<Utc>,
}

impl Immunization {
    pub fn is_completed(&self) -> bool {
        self.status == ImmunizationStatus::Completed
    }
}
