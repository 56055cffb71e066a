#![deny(unsafe_code)]

//! Keyword and vaccine matching for screening evidence.

pub mod document;
pub mod immunization;
pub mod normalize;
pub mod score;
pub mod synonyms;

pub use document::{DocumentMatch, DocumentMatcher};
pub use immunization::{ImmunizationMatch, ImmunizationPredicate};
pub use normalize::{compact, normalize_text};
pub use score::{FuzzyConfig, FuzzyMatcher, KeywordMatch, MatchKind};
pub use synonyms::{Variation, VariationKind, keyword_variations, synonyms_of};
