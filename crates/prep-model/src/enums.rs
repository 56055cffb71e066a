//! Type-safe enumerations for screening concepts.
//!
//! Several of these are stored as free text upstream (gender, frequency unit,
//! severity words inside condition names); the parsers here are the single
//! place that text is interpreted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Normalized patient gender.
///
/// `female`/`Female`/`F` map to [`Gender::Female`], `male`/`Male`/`M` to
/// [`Gender::Male`]; anything else is [`Gender::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

impl Gender {
    /// Normalize a raw gender value. Never fails.
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Gender::Unknown;
        };
        match raw.trim().to_lowercase().as_str() {
            "m" | "male" => Gender::Male,
            "f" | "female" => Gender::Female,
            _ => Gender::Unknown,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Unknown => "U",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Gender restriction on a screening-type definition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenderRestriction {
    #[serde(rename = "M", alias = "male", alias = "Male")]
    Male,
    #[serde(rename = "F", alias = "female", alias = "Female")]
    Female,
    /// No restriction.
    #[default]
    #[serde(rename = "both", alias = "Both", alias = "all")]
    Both,
}

impl GenderRestriction {
    /// Whether a patient of the given gender passes this restriction.
    ///
    /// [`Gender::Unknown`] never matches a restricted definition.
    pub fn admits(&self, gender: Gender) -> bool {
        match self {
            GenderRestriction::Both => true,
            GenderRestriction::Male => gender == Gender::Male,
            GenderRestriction::Female => gender == Gender::Female,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GenderRestriction::Male => "M",
            GenderRestriction::Female => "F",
            GenderRestriction::Both => "both",
        }
    }
}

impl fmt::Display for GenderRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a per-patient screening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreeningStatus {
    Due,
    DueSoon,
    Complete,
}

impl ScreeningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreeningStatus::Due => "due",
            ScreeningStatus::DueSoon => "due_soon",
            ScreeningStatus::Complete => "complete",
        }
    }

    /// Complete screenings are historical record and are never auto-deleted.
    pub fn is_preserved(&self) -> bool {
        matches!(self, ScreeningStatus::Complete)
    }
}

impl fmt::Display for ScreeningStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unit of a screening frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyUnit {
    Days,
    Months,
    Years,
}

impl FrequencyUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyUnit::Days => "days",
            FrequencyUnit::Months => "months",
            FrequencyUnit::Years => "years",
        }
    }
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyUnit {
    type Err = String;

    /// Parse a unit string (case-insensitive, singular or plural).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" => Ok(FrequencyUnit::Days),
            "month" | "months" => Ok(FrequencyUnit::Months),
            "year" | "years" => Ok(FrequencyUnit::Years),
            _ => Err(format!("Unknown frequency unit: {s}")),
        }
    }
}

/// Clinical severity extracted from condition or definition text.
///
/// Ordered by rank: mild (1) < moderate (2) < severe (3) < very severe (4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    VerySevere,
}

impl Severity {
    pub fn rank(&self) -> u32 {
        match self {
            Severity::Mild => 1,
            Severity::Moderate => 2,
            Severity::Severe => 3,
            Severity::VerySevere => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
            Severity::VerySevere => "very_severe",
        }
    }

    /// Find the severity keyword in free text, if any.
    ///
    /// Matching is word-based; "very severe", "very-severe" and
    /// "very_severe" all yield [`Severity::VerySevere`]. When several
    /// severities appear the highest wins.
    pub fn detect(text: &str) -> Option<Severity> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let mut found: Option<Severity> = None;
        for (idx, word) in words.iter().enumerate() {
            let severity = match *word {
                "verysevere" => Some(Severity::VerySevere),
                "severe" if idx > 0 && words[idx - 1] == "very" => Some(Severity::VerySevere),
                "severe" => Some(Severity::Severe),
                "moderate" => Some(Severity::Moderate),
                "mild" => Some(Severity::Mild),
                _ => None,
            };
            found = found.max(severity);
        }
        found
    }

    /// Whether a patient condition at `self` satisfies a trigger at `trigger`.
    ///
    /// Severities must be equal, except that a very severe condition also
    /// satisfies a severe trigger. No other cross-level match exists.
    pub fn satisfies(&self, trigger: Severity) -> bool {
        *self == trigger || (*self == Severity::VerySevere && trigger == Severity::Severe)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a document came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOrigin {
    #[default]
    Local,
    Ehr,
}

/// Status of an immunization record as reported by the EHR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImmunizationStatus {
    Completed,
    NotDone,
    EnteredInError,
    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gender_normalization() {
        assert_eq!(Gender::normalize(Some("female")), Gender::Female);
        assert_eq!(Gender::normalize(Some("Female")), Gender::Female);
        assert_eq!(Gender::normalize(Some("F")), Gender::Female);
        assert_eq!(Gender::normalize(Some(" male ")), Gender::Male);
        assert_eq!(Gender::normalize(Some("M")), Gender::Male);
        assert_eq!(Gender::normalize(Some("other")), Gender::Unknown);
        assert_eq!(Gender::normalize(None), Gender::Unknown);
    }

    #[test]
    fn unknown_gender_never_matches_restriction() {
        assert!(!GenderRestriction::Female.admits(Gender::Unknown));
        assert!(!GenderRestriction::Male.admits(Gender::Unknown));
        assert!(GenderRestriction::Both.admits(Gender::Unknown));
    }

    #[test]
    fn frequency_unit_from_str() {
        assert_eq!("Years".parse::<FrequencyUnit>().unwrap(), FrequencyUnit::Years);
        assert_eq!("month".parse::<FrequencyUnit>().unwrap(), FrequencyUnit::Months);
        assert!("fortnights".parse::<FrequencyUnit>().is_err());
    }

    #[test]
    fn severity_detection() {
        assert_eq!(Severity::detect("Severe diabetic"), Some(Severity::Severe));
        assert_eq!(
            Severity::detect("very severe asthma"),
            Some(Severity::VerySevere)
        );
        assert_eq!(Severity::detect("very_severe"), Some(Severity::VerySevere));
        assert_eq!(Severity::detect("mild COPD"), Some(Severity::Mild));
        assert_eq!(Severity::detect("persevere"), None);
        assert_eq!(Severity::detect("diabetes"), None);
    }

    #[test]
    fn severity_compatibility_is_asymmetric() {
        assert!(Severity::Severe.satisfies(Severity::Severe));
        assert!(Severity::VerySevere.satisfies(Severity::Severe));
        assert!(!Severity::Severe.satisfies(Severity::VerySevere));
        assert!(!Severity::Moderate.satisfies(Severity::Mild));
        assert!(!Severity::VerySevere.satisfies(Severity::Moderate));
    }

    #[test]
    fn immunization_status_tolerates_unknown_codes() {
        let status: ImmunizationStatus = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(status, ImmunizationStatus::Completed);
        let status: ImmunizationStatus = serde_json::from_str("\"on-hold\"").unwrap();
        assert_eq!(status, ImmunizationStatus::Unknown);
    }
}
