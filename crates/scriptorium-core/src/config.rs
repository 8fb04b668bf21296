//! Engine configuration and its defaults.
//!
//! Everything the engine would otherwise read from ambient state (fusion
//! weights, provider timeouts, which folding rules apply to which language)
//! lives in [`EngineConfig`], passed once at construction.
//!
//! # Usage
//!
//! ```
//! use scriptorium_core::config::{EngineConfig, DEFAULT_SIMILARITY_WEIGHT};
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.fusion.similarity_weight, DEFAULT_SIMILARITY_WEIGHT);
//! assert!(config.validate().is_ok());
//! ```

use crate::error::ConfigError;
use crate::text::{Language, LanguageRules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// =============================================================================
// Retrieval
// =============================================================================

/// Weight of a query term matching a token's folded surface form.
pub const DEFAULT_SURFACE_WEIGHT: f32 = 1.0;

/// Weight of a query term matching a token's lemma.
///
/// Higher than the surface weight so that a lemma hit on an inflected form
/// outranks an incidental surface hit.
pub const DEFAULT_LEMMA_WEIGHT: f32 = 2.0;

/// Share of the final score taken by the external similarity signal.
///
/// Lexical overlap always contributes the remaining `1 - weight`.
pub const DEFAULT_SIMILARITY_WEIGHT: f32 = 0.25;

// =============================================================================
// External providers
// =============================================================================

/// Upper bound on a single lemmatizer call.
pub const DEFAULT_LEMMATIZER_TIMEOUT_MS: u64 = 500;

/// Upper bound on a single similarity call.
pub const DEFAULT_SIMILARITY_TIMEOUT_MS: u64 = 250;

/// Blend weights for ranking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub surface_weight: f32,
    pub lemma_weight: f32,
    /// In `[0, 1)`
    pub similarity_weight: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            surface_weight: DEFAULT_SURFACE_WEIGHT,
            lemma_weight: DEFAULT_LEMMA_WEIGHT,
            similarity_weight: DEFAULT_SIMILARITY_WEIGHT,
        }
    }
}

impl FusionWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("surface_weight", self.surface_weight),
            ("lemma_weight", self.lemma_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    name,
                    value,
                    reason: "must be a finite non-negative number",
                });
            }
        }
        if self.surface_weight + self.lemma_weight <= 0.0 {
            return Err(ConfigError::InvalidWeight {
                name: "lemma_weight",
                value: self.lemma_weight,
                reason: "surface and lemma weights cannot both be zero",
            });
        }
        if !(0.0..1.0).contains(&self.similarity_weight) {
            return Err(ConfigError::InvalidWeight {
                name: "similarity_weight",
                value: self.similarity_weight,
                reason: "must be in [0, 1)",
            });
        }
        if self.lemma_weight < self.surface_weight {
            return Err(ConfigError::InvalidWeight {
                name: "lemma_weight",
                value: self.lemma_weight,
                reason: "must not be lower than surface_weight",
            });
        }
        Ok(())
    }
}

/// Configuration passed to [`CorpusEngine`](crate::engine::CorpusEngine) at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub fusion: FusionWeights,
    pub lemmatizer_timeout_ms: u64,
    pub similarity_timeout_ms: u64,
    /// Overrides for the built-in rules of a language
    pub languages: BTreeMap<Language, LanguageRules>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fusion: FusionWeights::default(),
            lemmatizer_timeout_ms: DEFAULT_LEMMATIZER_TIMEOUT_MS,
            similarity_timeout_ms: DEFAULT_SIMILARITY_TIMEOUT_MS,
            languages: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fusion.validate()?;
        if self.lemmatizer_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("lemmatizer_timeout_ms"));
        }
        if self.similarity_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout("similarity_timeout_ms"));
        }
        Ok(())
    }

    /// Rules in effect for a language: the override if configured, otherwise
    /// the built-in rules.
    pub fn rules_for(&self, language: Language) -> LanguageRules {
        self.languages
            .get(&language)
            .cloned()
            .unwrap_or_else(|| LanguageRules::for_language(language))
    }

    pub fn lemmatizer_timeout(&self) -> Duration {
        Duration::from_millis(self.lemmatizer_timeout_ms)
    }

    pub fn similarity_timeout(&self) -> Duration {
        Duration::from_millis(self.similarity_timeout_ms)
    }
}

/// Folding rules resolved for every language, cheap to share.
#[derive(Debug, Clone)]
pub struct RuleSet {
    greek: LanguageRules,
    latin: LanguageRules,
    generic: LanguageRules,
}

impl RuleSet {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            greek: config.rules_for(Language::Greek),
            latin: config.rules_for(Language::Latin),
            generic: config.rules_for(Language::Generic),
        }
    }

    pub fn get(&self, language: Language) -> &LanguageRules {
        match language {
            Language::Greek => &self.greek,
            Language::Latin => &self.latin,
            Language::Generic => &self.generic,
        }
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
