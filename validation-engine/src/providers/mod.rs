pub mod offline;
pub mod openai;

use async_trait::async_trait;
use tracing::info;

use crate::config::GenerationConfig;
use crate::error::EngineResult;

/// Trait for generative model providers
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Send the composed prompt and return the raw model text. Malformed
    /// or empty output is returned as-is; repairing it is the response
    /// normalizer's job.
    async fn generate(&self, prompt: &str) -> EngineResult<String>;

    fn name(&self) -> &str;
}

/// Create a provider instance based on configuration. Absence of a
/// credential selects the deterministic offline provider, not an error.
pub fn create_provider(config: &GenerationConfig) -> EngineResult<Box<dyn GenerationProvider>> {
    match config.api_key {
        Some(_) => Ok(Box::new(openai::OpenAiProvider::new(config)?)),
        None => {
            info!("No model credential configured, using offline generation provider");
            Ok(Box::new(offline::OfflineProvider::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_selects_provider_by_credential_presence() {
        let offline = create_provider(&GenerationConfig::default()).unwrap();
        assert_eq!(offline.name(), "offline");

        let config = GenerationConfig {
            api_key: Some("sk-test".to_string()),
            ..GenerationConfig::default()
        };
        let remote = create_provider(&config).unwrap();
        assert_eq!(remote.name(), "openai");
    }
}
