//! Static medical vocabulary: abbreviations and synonym groups.
//!
//! Tables are built once on first use and never mutated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use crate::normalize::normalize_text;

/// Word-level abbreviations expanded during normalization.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("bp", "blood pressure"),
    ("chol", "cholesterol"),
    ("mammo", "mammogram"),
    ("cxr", "chest x ray"),
    ("ekg", "electrocardiogram"),
    ("ecg", "electrocardiogram"),
    ("dxa", "dexa"),
    ("hba1c", "hemoglobin a1c"),
    ("hgba1c", "hemoglobin a1c"),
    ("ldct", "low dose ct"),
    ("pft", "pulmonary function test"),
    ("immz", "immunization"),
    ("vacc", "vaccine"),
    ("colo", "colonoscopy"),
    ("fobt", "fecal occult blood test"),
];

/// Groups of interchangeable terms. Members are normalized at load time.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["mammogram", "mammography", "breast imaging", "breast screening"],
    &[
        "colonoscopy",
        "colon screening",
        "colorectal screening",
        "colorectal cancer screening",
    ],
    &[
        "a1c",
        "hemoglobin a1c",
        "hb a1c",
        "glycated hemoglobin",
        "glycohemoglobin",
    ],
    &["dexa", "bone density", "bone densitometry", "dexa scan"],
    &["pap smear", "pap test", "cervical cytology"],
    &["flu", "influenza"],
    &["lipid panel", "lipid profile", "cholesterol panel"],
    &[
        "eye exam",
        "retinal exam",
        "ophthalmology exam",
        "diabetic eye exam",
        "retinopathy screening",
    ],
    &["psa", "prostate specific antigen"],
    &["lung cancer screening", "low dose ct"],
    &["electrocardiogram", "ecg tracing"],
    &["pneumococcal", "pneumonia vaccine", "pneumovax", "prevnar"],
    &["shingles", "zoster", "shingrix"],
    &["tdap", "tetanus"],
    &["fit test", "fecal immunochemical test", "fecal occult blood test"],
];

static ABBREVIATION_MAP: LazyLock<BTreeMap<&'static str, &'static str>> =
    LazyLock::new(|| ABBREVIATIONS.iter().copied().collect());

static SYNONYM_MAP: LazyLock<BTreeMap<String, BTreeSet<String>>> = LazyLock::new(|| {
    let mut map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for group in SYNONYM_GROUPS {
        let members: BTreeSet<String> = group.iter().map(|term| normalize_text(term)).collect();
        for member in &members {
            map.entry(member.clone())
                .or_default()
                .extend(members.iter().cloned());
        }
    }
    map
});

/// Expansion for a single lowercase word, if it is a known abbreviation.
pub fn expand_abbreviation(word: &str) -> Option<&'static str> {
    ABBREVIATION_MAP.get(word).copied()
}

/// Normalized synonyms of a normalized term, excluding the term itself.
pub fn synonyms_of(normalized: &str) -> Vec<String> {
    SYNONYM_MAP
        .get(normalized)
        .map(|group| {
            group
                .iter()
                .filter(|member| member.as_str() != normalized)
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// How a variation was derived from its keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariationKind {
    /// The normalized keyword itself.
    Original,
    /// A medical-synonym equivalent.
    Synonym,
    /// The keyword or a synonym with separators removed (`x ray` -> `xray`).
    Compact,
}

/// A normalized form a keyword may appear as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variation {
    pub text: String,
    pub kind: VariationKind,
}

/// Variation set for a keyword, original first, with no duplicates.
pub fn keyword_variations(keyword: &str) -> Vec<Variation> {
    let normalized = normalize_text(keyword);
    if normalized.is_empty() {
        return Vec::new();
    }
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    let mut push = |text: String, kind: VariationKind| {
        if !text.is_empty() && seen.insert(text.clone()) {
            out.push(Variation { text, kind });
        }
    };
    push(normalized.clone(), VariationKind::Original);
    let synonyms = synonyms_of(&normalized);
    for synonym in &synonyms {
        push(synonym.clone(), VariationKind::Synonym);
    }
    for term in std::iter::once(&normalized).chain(synonyms.iter()) {
        if term.contains(' ') {
            push(term.replace(' ', ""), VariationKind::Compact);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonyms_are_symmetric() {
        assert!(synonyms_of("mammogram").contains(&"mammography".to_string()));
        assert!(synonyms_of("mammography").contains(&"mammogram".to_string()));
        assert!(synonyms_of("breast imaging").contains(&"mammogram".to_string()));
    }

    #[test]
    fn abbreviated_synonyms_are_normalized() {
        assert_eq!(normalize_text("HbA1c"), "hb a1c");
        assert!(synonyms_of("hb a1c").contains(&"a1c".to_string()));
        assert!(synonyms_of("a1c").contains(&"hemoglobin a1c".to_string()));
        assert!(synonyms_of("bone density").contains(&"dexa".to_string()));
    }

    #[test]
    fn variations_start_with_original() {
        let variations = keyword_variations("Bone-Density");
        assert_eq!(variations[0].text, "bone density");
        assert_eq!(variations[0].kind, VariationKind::Original);
        assert!(variations.iter().any(|v| v.text == "bonedensity"));
        assert!(variations.iter().any(|v| v.text == "dexa"));
    }

    #[test]
    fn blank_keyword_has_no_variations() {
        assert!(keyword_variations("  ").is_empty());
    }
}
