//! Text normalization shared by keywords and document text.
//!
//! Both sides of every comparison go through [`normalize_text`], so a
//! keyword and the text it should match always agree on casing, separators
//! and abbreviations.

use crate::synonyms::expand_abbreviation;

/// Normalizes text for comparison.
///
/// - splits camelCase at case boundaries (`BreastImaging` -> `breast imaging`)
/// - lowercases
/// - turns every non-alphanumeric run (`_`, `-`, `.`, punctuation,
///   whitespace) into a single space
/// - expands known abbreviations word by word (`bp` -> `blood pressure`)
pub fn normalize_text(raw: &str) -> String {
    let split = split_camel_case(raw);
    let lowered = split.to_lowercase();
    let mut words = Vec::new();
    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        match expand_abbreviation(word) {
            Some(expansion) => words.push(expansion),
            None => words.push(word),
        }
    }
    words.join(" ")
}

/// Lowercase alphanumeric characters only; used for separator-free comparison.
pub fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Insert a space at lower-to-upper boundaries and before the last capital
/// of an acronym that starts a word (`PAPSmear` -> `PAP Smear`).
fn split_camel_case(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut out = String::with_capacity(raw.len() + 8);
    for (idx, &ch) in chars.iter().enumerate() {
        if idx > 0 && ch.is_uppercase() {
            let prev = chars[idx - 1];
            let next_is_lower = chars.get(idx + 1).is_some_and(|c| c.is_lowercase());
            if prev.is_lowercase() || (prev.is_uppercase() && next_is_lower) {
                out.push(' ');
            }
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separators_collapse_to_single_spaces() {
        assert_eq!(normalize_text("bone_density--scan.pdf"), "bone density scan pdf");
        assert_eq!(normalize_text("  Lipid \t Panel \n"), "lipid panel");
    }

    #[test]
    fn camel_case_is_split() {
        assert_eq!(normalize_text("BreastImaging"), "breast imaging");
        assert_eq!(normalize_text("PAPSmear"), "pap smear");
        assert_eq!(normalize_text("LIPID"), "lipid");
    }

    #[test]
    fn abbreviations_expand_per_word() {
        assert_eq!(normalize_text("BP check"), "blood pressure check");
        assert_eq!(normalize_text("bpm"), "bpm");
    }

    #[test]
    fn empty_text_normalizes_to_empty() {
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" -_. "), "");
    }

    #[test]
    fn compact_drops_separators() {
        assert_eq!(compact("X-Ray_Chest"), "xraychest");
    }
}
