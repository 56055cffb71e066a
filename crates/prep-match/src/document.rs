//! Document-to-keyword matching.

use chrono::NaiveDate;
use prep_model::{Document, DocumentId};
use serde::{Deserialize, Serialize};

use crate::normalize::{compact, normalize_text};
use crate::score::FuzzyMatcher;
use crate::synonyms::keyword_variations;

/// A document that matched a screening type's keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMatch {
    pub document_id: DocumentId,
    /// Best keyword confidence for this document.
    pub confidence: f32,
    /// Matched keywords, highest confidence first.
    pub matched_keywords: Vec<String>,
    pub evidence_date: NaiveDate,
}

/// Scores documents against a keyword list.
#[derive(Debug, Clone, Copy)]
pub struct DocumentMatcher {
    matcher: FuzzyMatcher,
    threshold: f32,
}

impl DocumentMatcher {
    pub fn new(matcher: FuzzyMatcher, threshold: f32) -> Self {
        Self { matcher, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Cheap rejection test run before fuzzy scoring.
    ///
    /// Passes when some keyword (or one of its variations) occurs anywhere
    /// in the text, ignoring word boundaries and separators. A pass only
    /// means the document is worth scoring.
    pub fn prefilter(text: &str, keywords: &[String]) -> bool {
        let lowered = text.to_lowercase();
        let normalized = normalize_text(text);
        let compacted = compact(text);
        keywords.iter().any(|keyword| {
            let raw = keyword.trim().to_lowercase();
            if !raw.is_empty() && lowered.contains(&raw) {
                return true;
            }
            keyword_variations(keyword).iter().any(|variation| {
                normalized.contains(&variation.text)
                    || compacted.contains(&compact(&variation.text))
            })
        })
    }

    /// Match one document, or `None` if no keyword clears the threshold.
    pub fn match_document(&self, document: &Document, keywords: &[String]) -> Option<DocumentMatch> {
        let text = document.searchable_text();
        if text.is_empty() || !Self::prefilter(&text, keywords) {
            return None;
        }
        let matches = self.matcher.match_keywords(&text, keywords, self.threshold);
        let best = matches.first()?.confidence;
        tracing::trace!(
            document_id = %document.id,
            keywords = matches.len(),
            confidence = best,
            "document matched"
        );
        Some(DocumentMatch {
            document_id: document.id,
            confidence: best,
            matched_keywords: matches.into_iter().map(|m| m.keyword).collect(),
            evidence_date: document.evidence_date(),
        })
    }

    /// Match every document, ordered by document id.
    pub fn match_documents<'a, I>(&self, documents: I, keywords: &[String]) -> Vec<DocumentMatch>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        if keywords.is_empty() {
            return Vec::new();
        }
        let mut matches: Vec<DocumentMatch> = documents
            .into_iter()
            .filter_map(|document| self.match_document(document, keywords))
            .collect();
        matches.sort_by_key(|m| m.document_id);
        matches
    }
}
