use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL_NAME: &str = "gpt-4o";

/// Generation-provider settings. A missing credential is a supported
/// configuration and selects the deterministic offline provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_MODEL_API_URL.to_string(),
            model: DEFAULT_MODEL_NAME.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Engine-wide configuration for the validation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub generation: GenerationConfig,
    /// Attempts required before an override may be requested.
    pub override_attempt_threshold: u32,
    /// Minimum override-justification length, in characters.
    pub min_justification_chars: usize,
    /// Word budget for specialties without a registered policy.
    pub default_word_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            override_attempt_threshold: 3,
            min_justification_chars: 20,
            default_word_budget: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let api_key = std::env::var("MODEL_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let api_url = std::env::var("MODEL_API_URL")
            .unwrap_or_else(|_| DEFAULT_MODEL_API_URL.to_string());

        let model = std::env::var("MODEL_NAME").unwrap_or_else(|_| DEFAULT_MODEL_NAME.to_string());

        let timeout_secs = std::env::var("GENERATION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let override_attempt_threshold = std::env::var("OVERRIDE_ATTEMPT_THRESHOLD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        let min_justification_chars = std::env::var("OVERRIDE_MIN_JUSTIFICATION_CHARS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(20);

        let default_word_budget = std::env::var("DEFAULT_WORD_BUDGET")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(50);

        Self {
            generation: GenerationConfig {
                api_key,
                api_url,
                model,
                timeout_secs,
            },
            override_attempt_threshold,
            min_justification_chars,
            default_word_budget,
        }
    }
}
