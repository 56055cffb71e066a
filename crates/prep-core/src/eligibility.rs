//! Eligibility of a patient for a screening-type definition.
//!
//! A definition applies when every rule passes:
//!
//! - **Age**: inside `[min_age, max_age]`; a patient without a usable birth
//!   date is never inside a bounded range
//! - **Gender**: the restriction admits the patient's normalized gender
//! - **Trigger conditions**: none configured, or at least one active patient
//!   condition matches one trigger after clinical normalization
//!
//! A definition that fails validation is never eligible.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use prep_model::{
    ConfigurationError, Patient, PatientCondition, ScreeningCriteria, ScreeningTypeDefinition,
    Severity,
};
use regex::Regex;
use serde::Serialize;

/// A patient together with the conditions eligibility depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub patient: Patient,
    pub conditions: Vec<PatientCondition>,
}

impl PatientRecord {
    pub fn new(patient: Patient, conditions: Vec<PatientCondition>) -> Self {
        Self {
            patient,
            conditions,
        }
    }

    pub fn active_conditions(&self) -> impl Iterator<Item = &PatientCondition> {
        self.conditions.iter().filter(|c| c.is_active)
    }
}

/// One rule checked by [`EligibilityEvaluator::explain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Configuration,
    Age,
    Gender,
    TriggerConditions,
}

impl Criterion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Configuration => "configuration",
            Criterion::Age => "age",
            Criterion::Gender => "gender",
            Criterion::TriggerConditions => "trigger_conditions",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CriterionCheck {
    pub criterion: Criterion,
    pub passed: bool,
    pub detail: String,
}

/// Rule-by-rule account of an eligibility decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EligibilityExplanation {
    pub eligible: bool,
    pub checks: Vec<CriterionCheck>,
}

impl fmt::Display for EligibilityExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}",
            if self.eligible { "eligible" } else { "not eligible" }
        )?;
        for check in &self.checks {
            writeln!(
                f,
                "  [{}] {}: {}",
                if check.passed { "pass" } else { "fail" },
                check.criterion.as_str(),
                check.detail
            )?;
        }
        Ok(())
    }
}

/// Evaluates eligibility as of a fixed date.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityEvaluator {
    as_of: NaiveDate,
}

impl EligibilityEvaluator {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn is_eligible(&self, record: &PatientRecord, definition: &ScreeningTypeDefinition) -> bool {
        if !definition.is_active {
            return false;
        }
        match definition.criteria() {
            Ok(criteria) => self.meets(record, &criteria),
            Err(_) => false,
        }
    }

    /// Eligibility against already-validated criteria.
    pub fn meets(&self, record: &PatientRecord, criteria: &ScreeningCriteria) -> bool {
        self.check_age(record, criteria).passed
            && check_gender(record, criteria).passed
            && check_triggers(record, criteria).passed
    }

    pub fn explain(
        &self,
        record: &PatientRecord,
        definition: &ScreeningTypeDefinition,
    ) -> EligibilityExplanation {
        let criteria = match definition.criteria() {
            Ok(criteria) => criteria,
            Err(err) => return configuration_failure(&err),
        };
        let mut checks = Vec::with_capacity(4);
        if definition.is_active {
            checks.push(CriterionCheck {
                criterion: Criterion::Configuration,
                passed: true,
                detail: "definition is active and valid".to_string(),
            });
        } else {
            checks.push(CriterionCheck {
                criterion: Criterion::Configuration,
                passed: false,
                detail: "definition is inactive".to_string(),
            });
        }
        checks.push(self.check_age(record, &criteria));
        checks.push(check_gender(record, &criteria));
        checks.push(check_triggers(record, &criteria));
        EligibilityExplanation {
            eligible: checks.iter().all(|c| c.passed),
            checks,
        }
    }

    fn check_age(&self, record: &PatientRecord, criteria: &ScreeningCriteria) -> CriterionCheck {
        let range = describe_range(criteria.min_age, criteria.max_age);
        let age = record.patient.age_on(self.as_of);
        let (passed, detail) = match (age, criteria.min_age, criteria.max_age) {
            (_, None, None) => (true, "no age limits".to_string()),
            (None, _, _) => (false, format!("age unknown, required {range}")),
            (Some(age), min, max) => {
                let passed = min.is_none_or(|min| age >= min) && max.is_none_or(|max| age <= max);
                (passed, format!("age {age}, required {range}"))
            }
        };
        CriterionCheck {
            criterion: Criterion::Age,
            passed,
            detail,
        }
    }
}

fn configuration_failure(err: &ConfigurationError) -> EligibilityExplanation {
    EligibilityExplanation {
        eligible: false,
        checks: vec![CriterionCheck {
            criterion: Criterion::Configuration,
            passed: false,
            detail: err.to_string(),
        }],
    }
}

fn describe_range(min: Option<u32>, max: Option<u32>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("{min}-{max}"),
        (Some(min), None) => format!(">= {min}"),
        (None, Some(max)) => format!("<= {max}"),
        (None, None) => "any".to_string(),
    }
}

fn check_gender(record: &PatientRecord, criteria: &ScreeningCriteria) -> CriterionCheck {
    let gender = record.patient.normalized_gender();
    CriterionCheck {
        criterion: Criterion::Gender,
        passed: criteria.gender.admits(gender),
        detail: format!(
            "patient {}, restriction {}",
            gender.as_code(),
            criteria.gender.as_str()
        ),
    }
}

fn check_triggers(record: &PatientRecord, criteria: &ScreeningCriteria) -> CriterionCheck {
    if criteria.trigger_conditions.is_empty() {
        return CriterionCheck {
            criterion: Criterion::TriggerConditions,
            passed: true,
            detail: "no trigger conditions".to_string(),
        };
    }
    let matched = record.active_conditions().find_map(|condition| {
        criteria
            .trigger_conditions
            .iter()
            .find(|trigger| condition_matches(trigger, &condition.condition_name))
            .map(|trigger| (trigger, &condition.condition_name))
    });
    let (passed, detail) = match matched {
        Some((trigger, condition)) => (true, format!("'{condition}' matches trigger '{trigger}'")),
        None => (
            false,
            format!(
                "no active condition matches {}",
                criteria.trigger_conditions.join(", ")
            ),
        ),
    };
    CriterionCheck {
        criterion: Criterion::TriggerConditions,
        passed,
        detail,
    }
}

/// Clinical modifiers that do not change which condition is meant.
static MODIFIERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:very\s+severe|verysevere|severe|moderate|mild|unspecified|old|left|right|bilateral)\b")
        .expect("Invalid clinical modifier regex")
});

/// Whole-word abbreviations and their canonical condition names.
const CONDITION_ALIASES: &[(&str, &str)] = &[
    ("dm", "diabetes"),
    ("t2dm", "type 2 diabetes"),
    ("dm2", "type 2 diabetes"),
    ("niddm", "type 2 diabetes"),
    ("t1dm", "type 1 diabetes"),
    ("dm1", "type 1 diabetes"),
    ("iddm", "type 1 diabetes"),
    ("htn", "hypertension"),
    ("cad", "coronary artery disease"),
    ("ckd", "chronic kidney disease"),
    ("chf", "congestive heart failure"),
    ("afib", "atrial fibrillation"),
    ("copd", "chronic obstructive pulmonary disease"),
    ("hld", "hyperlipidemia"),
    ("osa", "obstructive sleep apnea"),
];

/// Multi-word phrases rewritten after alias expansion.
const CONDITION_PHRASES: &[(&str, &str)] = &[
    ("diabetes mellitus", "diabetes"),
    ("high blood pressure", "hypertension"),
    ("a fib", "atrial fibrillation"),
    ("high cholesterol", "hyperlipidemia"),
];

/// Canonical form of a condition or trigger name.
///
/// Lowercases, drops punctuation, strips severity and laterality modifiers
/// and expands known abbreviations (`T2DM` -> `type 2 diabetes`,
/// `Diabetes mellitus, unspecified` -> `diabetes`).
pub fn normalize_condition(raw: &str) -> String {
    let lowered: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let stripped = MODIFIERS.replace_all(&lowered, " ");
    let expanded: Vec<&str> = stripped
        .split_whitespace()
        .map(|word| {
            CONDITION_ALIASES
                .iter()
                .find(|(alias, _)| *alias == word)
                .map_or(word, |(_, canonical)| *canonical)
        })
        .collect();
    let mut padded = format!(" {} ", expanded.join(" "));
    for (phrase, canonical) in CONDITION_PHRASES {
        padded = padded.replace(&format!(" {phrase} "), &format!(" {canonical} "));
    }
    padded.trim().to_string()
}

/// Whether a patient condition satisfies a trigger.
///
/// After normalization either name must contain the other as a whole-word
/// sequence. When the trigger names a severity the condition must carry a
/// compatible one (see [`Severity::satisfies`]).
pub fn condition_matches(trigger: &str, condition: &str) -> bool {
    let trigger_norm = normalize_condition(trigger);
    let condition_norm = normalize_condition(condition);
    if trigger_norm.is_empty() || condition_norm.is_empty() {
        return false;
    }
    if !contains_words(&condition_norm, &trigger_norm)
        && !contains_words(&trigger_norm, &condition_norm)
    {
        return false;
    }
    match (Severity::detect(trigger), Severity::detect(condition)) {
        (None, _) => true,
        (Some(required), Some(actual)) => actual.satisfies(required),
        (Some(_), None) => false,
    }
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    format!(" {haystack} ").contains(&format!(" {needle} "))
}
