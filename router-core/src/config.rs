use crate::error::{Result, RouterError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Scoring weights and thresholds for intent resolution.
///
/// The defaults are empirically tuned against a labeled query corpus; they
/// are kept in configuration rather than hard-coded so deployments can
/// re-tune them offline from the resolution logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Added once per trigger keyword found in the input.
    pub keyword_weight: f64,
    /// Added once per input token that appears in any example query.
    pub example_token_weight: f64,
    /// Added when a pronoun refers back to the last variable the user touched.
    pub pronoun_bonus: f64,
    /// Added when a token fuzzy-matches a dataset column name.
    pub fuzzy_bonus: f64,
    /// Minimum Jaro-Winkler similarity for a column-name match.
    pub fuzzy_match_threshold: f64,
    /// Multiplier applied when a tool's declared preconditions are unmet.
    pub precondition_penalty: f64,
    /// Minimum winning score; anything below falls back to the reasoning
    /// collaborator. A single strong keyword match scores ~1.5.
    pub acceptance_threshold: f64,
    /// Constant in `confidence = score / (score + normalizer)`.
    pub confidence_normalizer: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_weight: 1.5,
            example_token_weight: 0.4,
            pronoun_bonus: 0.8,
            fuzzy_bonus: 2.0,
            fuzzy_match_threshold: 0.55,
            precondition_penalty: 0.4,
            acceptance_threshold: 1.8,
            confidence_normalizer: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub scoring: ScoringConfig,
    /// Most recent tool invocations kept per session; older entries are
    /// evicted FIFO.
    pub history_limit: usize,
    /// Recently referenced variable names kept per session.
    pub recent_variables_limit: usize,
    /// Messages that resume a paused workflow.
    pub resume_keywords: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            history_limit: 40,
            recent_variables_limit: 10,
            resume_keywords: vec![
                "continue".to_string(),
                "resume".to_string(),
                "keep going".to_string(),
                "go on".to_string(),
            ],
        }
    }
}

impl RouterConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RouterError::InvalidConfig(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
