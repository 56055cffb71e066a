//! Engine configuration.

use std::path::Path;

use prep_match::FuzzyConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for a refresh cycle. Every field has a default, so an empty
/// TOML file is a valid configuration.
///
/// ```toml
/// match_threshold = 0.8
/// due_soon_window_months = 2
/// dormancy_window_days = 30
///
/// [fuzzy]
/// token_ratio_min = 0.65
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum keyword confidence for a document to count as evidence.
    pub match_threshold: f32,
    pub fuzzy: FuzzyConfig,
    /// Lookahead for `due_soon`, in months.
    pub due_soon_window_months: u32,
    /// When set, screenings of patients without an appointment inside this
    /// many days are flagged dormant.
    pub dormancy_window_days: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.75,
            fuzzy: FuzzyConfig::default(),
            due_soon_window_months: 1,
            dormancy_window_days: None,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.match_threshold) {
            return Err(invalid(format!(
                "match_threshold must be within [0, 1], got {}",
                self.match_threshold
            )));
        }
        let ratios = [
            self.fuzzy.token_ratio_min,
            self.fuzzy.single_token_ratio_min,
            self.fuzzy.trigram_min,
        ];
        if ratios.iter().any(|ratio| !unit.contains(&(*ratio as f32))) {
            return Err(invalid("fuzzy ratios must be within [0, 1]".to_string()));
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}
