//! Variant families and most-specific-variant selection.
//!
//! Definitions whose names share a base name (`A1C Test`, `A1C Test -
//! Diabetic`) form a family. At most one member of a family is tracked per
//! patient: the eligible member with the highest specificity, ties broken by
//! the lowest id.

use std::collections::BTreeMap;

use prep_model::{ScreeningCriteria, ScreeningTypeDefinition, Severity};

use crate::eligibility::{EligibilityEvaluator, PatientRecord};

const TRIGGER_BONUS: u32 = 10;
const SEVERITY_WEIGHT: u32 = 5;

/// Definitions sharing a family key, ordered by id.
#[derive(Debug, Clone)]
pub struct VariantFamily<'a> {
    pub key: String,
    pub members: Vec<&'a ScreeningTypeDefinition>,
}

impl VariantFamily<'_> {
    pub fn is_variant_family(&self) -> bool {
        self.members.len() > 1
    }
}

/// Group definitions by family key.
///
/// Families come back in key order and members in id order, whatever the
/// input order.
pub fn group_families<'a, I>(definitions: I) -> Vec<VariantFamily<'a>>
where
    I: IntoIterator<Item = &'a ScreeningTypeDefinition>,
{
    let mut grouped: BTreeMap<String, Vec<&'a ScreeningTypeDefinition>> = BTreeMap::new();
    for definition in definitions {
        grouped
            .entry(definition.family_key())
            .or_default()
            .push(definition);
    }
    grouped
        .into_iter()
        .map(|(key, mut members)| {
            members.sort_by_key(|d| d.id);
            members.dedup_by_key(|d| d.id);
            VariantFamily { key, members }
        })
        .collect()
}

/// How condition-specific a definition is.
///
/// 0 without trigger conditions; otherwise 10 plus 5 per severity rank found
/// in the trigger text or the definition name (highest rank wins).
pub fn specificity_score(definition: &ScreeningTypeDefinition, criteria: &ScreeningCriteria) -> u32 {
    if criteria.trigger_conditions.is_empty() {
        return 0;
    }
    let severity = criteria
        .trigger_conditions
        .iter()
        .filter_map(|trigger| Severity::detect(trigger))
        .chain(Severity::detect(&definition.name))
        .max();
    TRIGGER_BONUS + severity.map_or(0, |s| s.rank() * SEVERITY_WEIGHT)
}

/// Picks the single tracked member of a variant family.
#[derive(Debug, Clone, Copy)]
pub struct VariantSelector {
    evaluator: EligibilityEvaluator,
}

impl VariantSelector {
    pub fn new(evaluator: EligibilityEvaluator) -> Self {
        Self { evaluator }
    }

    /// The most specific eligible member, or `None` when no member applies.
    ///
    /// Ordered by (-specificity, id), so the result does not depend on the
    /// order of `members`.
    pub fn select<'a>(
        &self,
        record: &PatientRecord,
        members: &[&'a ScreeningTypeDefinition],
    ) -> Option<&'a ScreeningTypeDefinition> {
        members
            .iter()
            .copied()
            .filter(|definition| definition.is_active)
            .filter_map(|definition| {
                let criteria = definition.criteria().ok()?;
                self.evaluator
                    .meets(record, &criteria)
                    .then(|| (specificity_score(definition, &criteria), definition))
            })
            .min_by(|(score_a, def_a), (score_b, def_b)| {
                score_b.cmp(score_a).then_with(|| def_a.id.cmp(&def_b.id))
            })
            .map(|(_, definition)| definition)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};
    use prep_model::{
        GenderRestriction, MatchingStrategy, Patient, PatientId, ScreeningTypeId, StoredList,
        TenantId,
    };

    use super::*;

    fn definition(id: u64, name: &str, triggers: &[&str]) -> ScreeningTypeDefinition {
        ScreeningTypeDefinition {
            id: ScreeningTypeId::new(id),
            tenant_id: TenantId::new(1),
            name: name.to_string(),
            keywords: StoredList::values(["a1c"]),
            trigger_conditions: StoredList::values(triggers.iter().copied()),
            min_age: None,
            max_age: None,
            gender_restriction: GenderRestriction::Both,
            frequency_value: Some(1.0),
            frequency_unit: None,
            matching: MatchingStrategy::Documents,
            is_active: true,
            criteria_signature: None,
            updated_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    fn score(def: &ScreeningTypeDefinition) -> u32 {
        specificity_score(def, &def.criteria().unwrap())
    }

    #[test]
    fn scores_reflect_triggers_and_severity() {
        assert_eq!(score(&definition(1, "A1C Test", &[])), 0);
        assert_eq!(score(&definition(2, "A1C Test - Diabetic", &["diabetes"])), 10);
        assert_eq!(score(&definition(3, "A1C Test - Severe", &["diabetes"])), 25);
        assert_eq!(score(&definition(4, "A1C Test", &["very severe diabetes"])), 30);
        assert_eq!(score(&definition(5, "A1C Test - Mild", &[])), 0);
    }

    #[test]
    fn families_group_by_case_insensitive_base_name() {
        let defs = [
            definition(3, "a1c test - Diabetic", &["diabetes"]),
            definition(1, "A1C Test", &[]),
            definition(2, "Mammogram", &[]),
        ];
        let families = group_families(&defs);
        assert_eq!(families.len(), 2);
        assert_eq!(families[0].key, "a1c test");
        let ids: Vec<u64> = families[0].members.iter().map(|d| d.id.get()).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(!families[1].is_variant_family());
    }

    #[test]
    fn equal_scores_break_ties_by_id() {
        let patient = PatientRecord::new(
            Patient {
                id: PatientId::new(1),
                tenant_id: TenantId::new(1),
                mrn: None,
                date_of_birth: NaiveDate::from_ymd_opt(1970, 1, 1),
                gender: None,
                next_appointment: None,
                updated_at: DateTime::<Utc>::MIN_UTC,
            },
            Vec::new(),
        );
        let a = definition(8, "Lipid Panel - A", &[]);
        let b = definition(5, "Lipid Panel - B", &[]);
        let selector = VariantSelector::new(EligibilityEvaluator::new(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        ));
        assert_eq!(selector.select(&patient, &[&a, &b]).map(|d| d.id.get()), Some(5));
        assert_eq!(selector.select(&patient, &[&b, &a]).map(|d| d.id.get()), Some(5));
        assert!(selector.select(&patient, &[]).is_none());
    }
}
