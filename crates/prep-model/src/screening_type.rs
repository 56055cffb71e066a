//! Screening-type definitions: the configurable rules.
//!
//! A definition is stored loosely (free-text frequency unit, legacy list
//! columns). [`ScreeningTypeDefinition::criteria`] validates it into a
//! [`ScreeningCriteria`] that the evaluators work with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::enums::{FrequencyUnit, GenderRestriction};
use crate::error::ConfigurationError;
use crate::ids::{ScreeningTypeId, TenantId};
use crate::list::StoredList;

/// How evidence for a screening type is found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchingStrategy {
    /// Fuzzy keyword matching over document text and filenames.
    #[default]
    Documents,
    /// Completed immunization records matched by vaccine code or name.
    Immunization {
        #[serde(default)]
        vaccine_codes: Vec<String>,
        #[serde(default)]
        vaccine_names: Vec<String>,
    },
}

/// Screening interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub value: f64,
    pub unit: FrequencyUnit,
}

/// A frequency converted to calendar units without fractional drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interval {
    Days(u32),
    Months(u32),
}

impl Frequency {
    /// Convert to whole days or whole months.
    ///
    /// Years and months are expressed in months (0.25 years is 3 months,
    /// 0.5 years is 6 months) so that adding the interval to a date never
    /// accumulates day-count drift.
    pub fn interval(&self) -> Interval {
        match self.unit {
            FrequencyUnit::Days => Interval::Days(round_to_u32(self.value)),
            FrequencyUnit::Months => Interval::Months(round_to_u32(self.value)),
            FrequencyUnit::Years => Interval::Months(round_to_u32(self.value * 12.0)),
        }
    }
}

fn round_to_u32(value: f64) -> u32 {
    let rounded = value.round();
    if rounded <= 0.0 {
        0
    } else if rounded >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        rounded as u32
    }
}

/// Validated, evaluation-ready view of a definition.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreeningCriteria {
    pub keywords: Vec<String>,
    pub trigger_conditions: Vec<String>,
    pub min_age: Option<u32>,
    pub max_age: Option<u32>,
    pub gender: GenderRestriction,
    pub frequency: Option<Frequency>,
    pub matching: MatchingStrategy,
}

/// A configurable screening rule, scoped to one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningTypeDefinition {
    pub id: ScreeningTypeId,
    pub tenant_id: TenantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "StoredList::is_absent")]
    pub keywords: StoredList,
    #[serde(default, skip_serializing_if = "StoredList::is_absent")]
    pub trigger_conditions: StoredList,
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub gender_restriction: GenderRestriction,
    #[serde(default)]
    pub frequency_value: Option<f64>,
    /// Free-text unit; defaults to years when a value is present.
    #[serde(default)]
    pub frequency_unit: Option<String>,
    #[serde(default)]
    pub matching: MatchingStrategy,
    pub is_active: bool,
    /// Signature recorded the last time this definition was evaluated.
    #[serde(default)]
    pub criteria_signature: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct SignatureInput<'a> {
    name: &'a str,
    keywords: &'a StoredList,
    trigger_conditions: &'a StoredList,
    min_age: Option<u32>,
    max_age: Option<u32>,
    gender_restriction: GenderRestriction,
    frequency_value: Option<f64>,
    frequency_unit: Option<&'a str>,
    matching: &'a MatchingStrategy,
    is_active: bool,
}

impl ScreeningTypeDefinition {
    /// Validate the stored fields into evaluation criteria.
    pub fn criteria(&self) -> Result<ScreeningCriteria, ConfigurationError> {
        let keywords = self
            .keywords
            .items()
            .map_err(|raw| ConfigurationError::MalformedList {
                id: self.id,
                field: "keywords",
                raw: raw.to_string(),
            })?;
        let trigger_conditions =
            self.trigger_conditions
                .items()
                .map_err(|raw| ConfigurationError::MalformedList {
                    id: self.id,
                    field: "trigger_conditions",
                    raw: raw.to_string(),
                })?;

        if let (Some(min_age), Some(max_age)) = (self.min_age, self.max_age)
            && min_age > max_age
        {
            return Err(ConfigurationError::InvertedAgeRange {
                id: self.id,
                min_age,
                max_age,
            });
        }

        Ok(ScreeningCriteria {
            keywords,
            trigger_conditions,
            min_age: self.min_age,
            max_age: self.max_age,
            gender: self.gender_restriction,
            frequency: self.frequency()?,
            matching: self.matching.clone(),
        })
    }

    fn frequency(&self) -> Result<Option<Frequency>, ConfigurationError> {
        let unit = match self.frequency_unit.as_deref().map(str::trim) {
            None | Some("") => FrequencyUnit::Years,
            Some(raw) => raw
                .parse::<FrequencyUnit>()
                .map_err(|_| ConfigurationError::InvalidFrequencyUnit {
                    id: self.id,
                    unit: raw.to_string(),
                })?,
        };
        let Some(value) = self.frequency_value else {
            return Ok(None);
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigurationError::InvalidFrequencyValue { id: self.id, value });
        }
        Ok(Some(Frequency { value, unit }))
    }

    /// Deterministic SHA-256 (hex) over every matching-relevant field.
    ///
    /// Timestamps and the stored signature itself are excluded, so the value
    /// only changes when eligibility or matching could change.
    pub fn compute_criteria_signature(&self) -> String {
        let input = SignatureInput {
            name: self.name.trim(),
            keywords: &self.keywords,
            trigger_conditions: &self.trigger_conditions,
            min_age: self.min_age,
            max_age: self.max_age,
            gender_restriction: self.gender_restriction,
            frequency_value: self.frequency_value,
            frequency_unit: self.frequency_unit.as_deref(),
            matching: &self.matching,
            is_active: self.is_active,
        };
        // Infallible for this input shape.
        let bytes = serde_json::to_vec(&input).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// True when the stored signature is missing or differs from the current one.
    pub fn criteria_changed(&self) -> bool {
        self.criteria_signature.as_deref() != Some(self.compute_criteria_signature().as_str())
    }

    /// Name with any trailing variant suffix removed.
    pub fn base_name(&self) -> String {
        base_name(Some(&self.name)).unwrap_or_default()
    }

    /// Case-insensitive key shared by all members of a variant family.
    pub fn family_key(&self) -> String {
        self.base_name().to_lowercase()
    }
}

/// Strip a trailing variant suffix from a screening-type name.
///
/// The suffix starts at the first delimiter: a spaced hyphen (`" - "`), an
/// en dash, an em dash, a colon, or an opening parenthesis when the name
/// ends with `)`. Unspaced hyphens are part of the name (`"COVID-19
/// Vaccine"`). `None` stays `None` and an empty name stays empty.
pub fn base_name(name: Option<&str>) -> Option<String> {
    let name = name?;
    let trimmed = name.trim();
    let mut cut: Option<usize> = None;
    let mut consider = |idx: Option<usize>| {
        if let Some(idx) = idx
            && idx > 0
        {
            cut = Some(cut.map_or(idx, |current| current.min(idx)));
        }
    };
    consider(trimmed.find(" - "));
    consider(trimmed.find('\u{2013}'));
    consider(trimmed.find('\u{2014}'));
    consider(trimmed.find(':'));
    if trimmed.ends_with(')') {
        consider(trimmed.find('('));
    }
    let base = match cut {
        Some(idx) => trimmed[..idx].trim_end(),
        None => trimmed,
    };
    if base.is_empty() || base.len() == trimmed.len() {
        Some(trimmed.to_string())
    } else {
        // "Panel (Adult): Fasting" only exposes its parenthesized suffix
        // after the colon suffix is gone.
        base_name(Some(base))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_strips_supported_delimiters() {
        assert_eq!(base_name(Some("A1C Test - Diabetic")).unwrap(), "A1C Test");
        assert_eq!(
            base_name(Some("A1C Test \u{2013} Severe Diabetic")).unwrap(),
            "A1C Test"
        );
        assert_eq!(base_name(Some("A1C Test\u{2014}Severe")).unwrap(), "A1C Test");
        assert_eq!(base_name(Some("Mammogram (High Risk)")).unwrap(), "Mammogram");
        assert_eq!(base_name(Some("Colonoscopy: Family History")).unwrap(), "Colonoscopy");
        assert_eq!(base_name(Some("Panel (Adult): Fasting")).unwrap(), "Panel");
    }

    #[test]
    fn base_name_keeps_unsuffixed_names() {
        assert_eq!(base_name(Some("A1C Test")).unwrap(), "A1C Test");
        assert_eq!(base_name(Some("COVID-19 Vaccine")).unwrap(), "COVID-19 Vaccine");
        assert_eq!(base_name(Some("  Lipid Panel  ")).unwrap(), "Lipid Panel");
    }

    #[test]
    fn base_name_edge_cases() {
        assert_eq!(base_name(None), None);
        assert_eq!(base_name(Some("")), Some(String::new()));
        assert_eq!(base_name(Some("(Adult)")).unwrap(), "(Adult)");
    }

    #[test]
    fn fractional_years_become_whole_months() {
        let quarter = Frequency {
            value: 0.25,
            unit: FrequencyUnit::Years,
        };
        assert_eq!(quarter.interval(), Interval::Months(3));
        let half = Frequency {
            value: 0.5,
            unit: FrequencyUnit::Years,
        };
        assert_eq!(half.interval(), Interval::Months(6));
        let days = Frequency {
            value: 90.0,
            unit: FrequencyUnit::Days,
        };
        assert_eq!(days.interval(), Interval::Days(90));
    }
}
