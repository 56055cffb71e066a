use thiserror::Error;

use crate::ids::ScreeningTypeId;

/// A screening-type definition whose criteria cannot be evaluated.
///
/// Definitions in this state are treated as never-eligible; the error is
/// reported but never blocks evaluation of other definitions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("screening type {id}: {field} is not a valid list: {raw:?}")]
    MalformedList {
        id: ScreeningTypeId,
        field: &'static str,
        raw: String,
    },

    #[error("screening type {id}: unknown frequency unit {unit:?}")]
    InvalidFrequencyUnit { id: ScreeningTypeId, unit: String },

    #[error("screening type {id}: frequency value must be positive, got {value}")]
    InvalidFrequencyValue { id: ScreeningTypeId, value: f64 },

    #[error("screening type {id}: min_age {min_age} exceeds max_age {max_age}")]
    InvertedAgeRange {
        id: ScreeningTypeId,
        min_age: u32,
        max_age: u32,
    },
}

impl ConfigurationError {
    /// The definition the error belongs to.
    pub fn screening_type_id(&self) -> ScreeningTypeId {
        match self {
            Self::MalformedList { id, .. }
            | Self::InvalidFrequencyUnit { id, .. }
            | Self::InvalidFrequencyValue { id, .. }
            | Self::InvertedAgeRange { id, .. } => *id,
        }
    }
}
