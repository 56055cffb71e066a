//! Fuzzy keyword-to-text scoring.
//!
//! Each keyword expands to a variation set (itself, medical synonyms,
//! separator-free forms) which is scored against normalized text in order
//! of cost:
//!
//! 1. boundary-anchored exact phrase match (confidence 1.0)
//! 2. token-level edit-distance ratio over a sliding n-gram window
//! 3. character-trigram Jaccard similarity, for multi-word variations only
//!
//! Only the keyword's own normalized form is ever scored fuzzily; synonyms
//! and compact forms must match exactly. Variations and windows shorter
//! than [`FuzzyConfig::min_fuzzy_len`] must also match exactly, which keeps
//! `flu` from matching inside `influence` or `fluent`. A single word has to
//! clear [`FuzzyConfig::single_token_ratio_min`], which admits one OCR
//! substitution in a long word but not a different word sharing its stem
//! (`influence` for `influenza`).

use std::cmp::Ordering;
use std::collections::BTreeSet;

use rapidfuzz::distance::indel;
use serde::{Deserialize, Serialize};

use crate::normalize::normalize_text;
use crate::synonyms::{Variation, VariationKind, keyword_variations};

/// Tuning for the fuzzy strategies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzyConfig {
    /// A token ratio must exceed this to count (default: 0.6).
    pub token_ratio_min: f64,
    /// A single-word token ratio must reach this to count (default: 0.85).
    pub single_token_ratio_min: f64,
    /// A trigram Jaccard similarity must exceed this to count (default: 0.5).
    pub trigram_min: f64,
    /// Variations shorter than this (in characters) only match exactly (default: 5).
    pub min_fuzzy_len: usize,
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            token_ratio_min: 0.6,
            single_token_ratio_min: 0.85,
            trigram_min: 0.5,
            min_fuzzy_len: 5,
        }
    }
}

/// Which strategy produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    TokenRatio,
    Trigram,
}

/// Best match of one keyword against a text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordMatch {
    /// The keyword as supplied by the caller.
    pub keyword: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    /// The normalized text span that matched.
    pub matched_text: String,
    pub kind: MatchKind,
}

/// Stateless keyword matcher.
///
/// Matching is a pure function of `(text, keywords, threshold)` and the
/// configuration; repeated calls always return identical results.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatcher {
    config: FuzzyConfig,
}

/// Normalized text prepared once for scoring many keywords.
struct PreparedText {
    padded: String,
    tokens: Vec<String>,
}

impl PreparedText {
    fn new(text: &str) -> Self {
        let normalized = normalize_text(text);
        let tokens = normalized.split(' ').map(str::to_string).collect();
        Self {
            padded: format!(" {normalized} "),
            tokens,
        }
    }

    fn windows(&self, size: usize) -> impl Iterator<Item = String> + '_ {
        self.tokens.windows(size.max(1)).map(|window| window.join(" "))
    }
}

impl FuzzyMatcher {
    pub fn new(config: FuzzyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FuzzyConfig {
        &self.config
    }

    /// Score every keyword against `text`.
    ///
    /// Returns keywords whose best confidence clears `threshold`, highest
    /// confidence first; ties are ordered by keyword. Empty text or an empty
    /// keyword list yields an empty result.
    pub fn match_keywords(
        &self,
        text: &str,
        keywords: &[String],
        threshold: f32,
    ) -> Vec<KeywordMatch> {
        if text.trim().is_empty() || keywords.is_empty() {
            return Vec::new();
        }
        let prepared = PreparedText::new(text);
        if prepared.padded.trim().is_empty() {
            return Vec::new();
        }

        let mut seen = BTreeSet::new();
        let mut matches: Vec<KeywordMatch> = keywords
            .iter()
            .filter(|keyword| seen.insert(keyword.as_str()))
            .filter_map(|keyword| self.best_match(&prepared, keyword))
            .filter(|m| m.confidence >= threshold)
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.keyword.cmp(&b.keyword))
        });
        matches
    }

    /// Best match for a single keyword, regardless of threshold.
    pub fn score_keyword(&self, text: &str, keyword: &str) -> Option<KeywordMatch> {
        if text.trim().is_empty() {
            return None;
        }
        self.best_match(&PreparedText::new(text), keyword)
    }

    fn best_match(&self, text: &PreparedText, keyword: &str) -> Option<KeywordMatch> {
        let variations = keyword_variations(keyword);
        let mut best: Option<(f64, String, MatchKind)> = None;

        for variation in &variations {
            if text.padded.contains(&format!(" {} ", variation.text)) {
                return Some(KeywordMatch {
                    keyword: keyword.to_string(),
                    confidence: 1.0,
                    matched_text: variation.text.clone(),
                    kind: MatchKind::Exact,
                });
            }
        }

        for variation in variations.iter().filter(|v| self.allows_fuzzy(v)) {
            let candidate = self
                .token_ratio(text, &variation.text)
                .map(|(score, span)| (score, span, MatchKind::TokenRatio))
                .or_else(|| {
                    self.trigram(text, &variation.text)
                        .map(|(score, span)| (score, span, MatchKind::Trigram))
                });
            if let Some(candidate) = candidate
                && best.as_ref().is_none_or(|current| candidate.0 > current.0)
            {
                best = Some(candidate);
            }
        }

        best.map(|(score, matched_text, kind)| KeywordMatch {
            keyword: keyword.to_string(),
            confidence: score.clamp(0.0, 1.0) as f32,
            matched_text,
            kind,
        })
    }

    fn allows_fuzzy(&self, variation: &Variation) -> bool {
        variation.kind == VariationKind::Original
            && variation.text.chars().count() >= self.config.min_fuzzy_len
    }

    /// Best edit-distance ratio between the variation and any window of the
    /// same number of tokens.
    fn token_ratio(&self, text: &PreparedText, variation: &str) -> Option<(f64, String)> {
        let size = variation.split(' ').count();
        let accepts = |ratio: f64| {
            ratio > self.config.token_ratio_min
                && (size > 1 || ratio >= self.config.single_token_ratio_min)
        };
        let mut best: Option<(f64, String)> = None;
        for window in self.fuzzy_windows(text, size) {
            let ratio = indel::normalized_similarity(variation.chars(), window.chars());
            if accepts(ratio) && best.as_ref().is_none_or(|(current, _)| ratio > *current) {
                best = Some((ratio, window));
            }
        }
        best
    }

    fn trigram(&self, text: &PreparedText, variation: &str) -> Option<(f64, String)> {
        let size = variation.split(' ').count();
        if size < 2 {
            return None;
        }
        let target = trigrams(variation);
        let mut best: Option<(f64, String)> = None;
        for window in self.fuzzy_windows(text, size) {
            let similarity = jaccard(&target, &trigrams(&window));
            if similarity > self.config.trigram_min
                && best.as_ref().is_none_or(|(current, _)| similarity > *current)
            {
                best = Some((similarity, window));
            }
        }
        best
    }

    /// Windows of `size` tokens long enough to be scored fuzzily.
    fn fuzzy_windows<'t>(
        &self,
        text: &'t PreparedText,
        size: usize,
    ) -> impl Iterator<Item = String> + 't {
        let min_len = self.config.min_fuzzy_len;
        text.windows(size)
            .filter(move |window| window.chars().count() >= min_len)
    }
}

fn trigrams(text: &str) -> BTreeSet<(char, char, char)> {
    let chars: Vec<char> = text.chars().collect();
    chars.windows(3).map(|w| (w[0], w[1], w[2])).collect()
}

fn jaccard(a: &BTreeSet<(char, char, char)>, b: &BTreeSet<(char, char, char)>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keywords(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exact_phrase_scores_one() {
        let matcher = FuzzyMatcher::default();
        let result = matcher.match_keywords(
            "Screening MAMMOGRAM bilateral, no findings",
            &keywords(&["mammogram"]),
            0.5,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].confidence, 1.0);
        assert_eq!(result[0].kind, MatchKind::Exact);
    }

    #[test]
    fn synonym_counts_as_exact() {
        let matcher = FuzzyMatcher::default();
        let result = matcher.match_keywords(
            "Diagnostic mammography report",
            &keywords(&["mammogram"]),
            0.9,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].matched_text, "mammography");
    }

    #[test]
    fn ocr_typo_matches_by_token_ratio() {
        let matcher = FuzzyMatcher::default();
        let m = matcher
            .score_keyword("colonoscpy performed 2023", "colonoscopy")
            .unwrap();
        assert_eq!(m.kind, MatchKind::TokenRatio);
        assert!(m.confidence > 0.9, "got {}", m.confidence);
    }

    #[test]
    fn multi_word_keyword_uses_phrase_window() {
        let matcher = FuzzyMatcher::default();
        let m = matcher
            .score_keyword("results of the lipid pannel attached", "lipid panel")
            .unwrap();
        assert_eq!(m.kind, MatchKind::TokenRatio);
        assert_eq!(m.matched_text, "lipid pannel");
    }

    #[test]
    fn short_keywords_never_match_inside_words() {
        let matcher = FuzzyMatcher::default();
        let kws = keywords(&["flu"]);
        assert!(matcher.match_keywords("influence", &kws, 0.0).is_empty());
        assert!(matcher.match_keywords("fluent speaker", &kws, 0.0).is_empty());
        assert_eq!(matcher.match_keywords("flu shot given", &kws, 0.0).len(), 1);
    }

    #[test]
    fn words_sharing_a_stem_are_not_typos() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.score_keyword("under the influence", "influenza").is_none());
        assert!(matcher.score_keyword("an influential paper", "influenza").is_none());
        let typo = matcher.score_keyword("inflaenza vaccine", "influenza").unwrap();
        assert_eq!(typo.kind, MatchKind::TokenRatio);
        assert_eq!(typo.matched_text, "inflaenza");
    }

    #[test]
    fn short_windows_are_skipped_by_every_fuzzy_pass() {
        let matcher = FuzzyMatcher::new(FuzzyConfig {
            min_fuzzy_len: 10,
            ..FuzzyConfig::default()
        });
        assert!(matcher.score_keyword("lipid pan", "lipid panel").is_none());
        assert!(FuzzyMatcher::default().score_keyword("lipid pan", "lipid panel").is_some());
    }

    #[test]
    fn results_sorted_by_confidence_then_keyword() {
        let matcher = FuzzyMatcher::default();
        let result = matcher.match_keywords(
            "psa and colonoscpy",
            &keywords(&["colonoscopy", "psa"]),
            0.5,
        );
        assert_eq!(result[0].keyword, "psa");
        assert_eq!(result[1].keyword, "colonoscopy");
    }

    #[test]
    fn empty_inputs_yield_nothing() {
        let matcher = FuzzyMatcher::default();
        assert!(matcher.match_keywords("", &keywords(&["psa"]), 0.0).is_empty());
        assert!(matcher.match_keywords("psa", &[], 0.0).is_empty());
        assert!(matcher.match_keywords("   ", &keywords(&["psa"]), 0.0).is_empty());
    }

    #[test]
    fn trigram_similarity_bounds() {
        let a = trigrams("mammogram");
        assert_eq!(jaccard(&a, &a), 1.0);
        assert_eq!(jaccard(&a, &trigrams("xy")), 0.0);
    }
}
