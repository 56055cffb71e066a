use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::ScreeningStatus;
use crate::ids::{DocumentId, ImmunizationId, PatientId, ScreeningId, ScreeningTypeId, TenantId};

/// Per patient x screening-type tracking record.
///
/// Its existence is derived state: it exists while the patient is eligible
/// for the definition and the definition is the most specific eligible
/// member of its variant family. Complete screenings are kept as history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Screening {
    pub id: ScreeningId,
    pub tenant_id: TenantId,
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
    pub status: ScreeningStatus,
    #[serde(default)]
    pub last_completed_date: Option<NaiveDate>,
    #[serde(default)]
    pub matched_documents: BTreeSet<DocumentId>,
    #[serde(default)]
    pub matched_immunizations: BTreeSet<ImmunizationId>,
    #[serde(default)]
    pub last_processed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_dormant: bool,
    pub created_at: DateTime<Utc>,
}

impl Screening {
    pub fn key(&self) -> ScreeningKey {
        ScreeningKey {
            patient_id: self.patient_id,
            screening_type_id: self.screening_type_id,
        }
    }
}

/// Natural key of a screening: one per patient and definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScreeningKey {
    pub patient_id: PatientId,
    pub screening_type_id: ScreeningTypeId,
}

/// Evidence linking a screening to a document that justifies its status.
///
/// Recomputed on every refresh of the screening, never accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub screening_id: ScreeningId,
    pub document_id: DocumentId,
    pub confidence: f32,
    pub matched_keywords: Vec<String>,
}
