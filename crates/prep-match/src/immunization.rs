//! Immunization-record matching by vaccine code or name.

use chrono::NaiveDate;
use prep_model::{Immunization, ImmunizationId};
use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;
use crate::synonyms::keyword_variations;

/// Vaccine predicate taken from an immunization-based screening type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImmunizationPredicate {
    codes: Vec<String>,
    /// Every boundary-padded variation of every configured name.
    names: Vec<String>,
}

/// A completed immunization that satisfied a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmunizationMatch {
    pub immunization_id: ImmunizationId,
    pub administration_date: Option<NaiveDate>,
}

impl ImmunizationPredicate {
    pub fn new(vaccine_codes: &[String], vaccine_names: &[String]) -> Self {
        let codes = vaccine_codes
            .iter()
            .map(|code| code.trim().to_lowercase())
            .filter(|code| !code.is_empty())
            .collect();
        let mut names: Vec<String> = vaccine_names
            .iter()
            .flat_map(|name| keyword_variations(name))
            .map(|variation| format!(" {} ", variation.text))
            .collect();
        names.sort();
        names.dedup();
        Self { codes, names }
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty() && self.names.is_empty()
    }

    /// Completed records whose code matches exactly (case-insensitive) or
    /// whose name contains a configured name at word boundaries.
    pub fn matches(&self, record: &Immunization) -> bool {
        if !record.is_completed() {
            return false;
        }
        if let Some(code) = record.vaccine_code.as_deref() {
            let code = code.trim().to_lowercase();
            if self.codes.contains(&code) {
                return true;
            }
        }
        let padded = format!(" {} ", normalize_text(&record.vaccine_name));
        self.names.iter().any(|name| padded.contains(name.as_str()))
    }

    /// Matching records ordered by id.
    pub fn match_records<'a, I>(&self, records: I) -> Vec<ImmunizationMatch>
    where
        I: IntoIterator<Item = &'a Immunization>,
    {
        let mut matches: Vec<ImmunizationMatch> = records
            .into_iter()
            .filter(|record| self.matches(record))
            .map(|record| ImmunizationMatch {
                immunization_id: record.id,
                administration_date: record.administration_date,
            })
            .collect();
        matches.sort_by_key(|m| m.immunization_id);
        matches
    }
}
