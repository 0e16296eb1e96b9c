use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    #[error("Override not eligible: {attempts} attempt(s) recorded, {required} required")]
    OverrideNotEligible { attempts: u32, required: u32 },

    #[error("Override justification too short: {length} chars, minimum {minimum}")]
    JustificationTooShort { length: usize, minimum: usize },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Knowledge error: {0}")]
    Knowledge(#[from] knowledge_cache::KnowledgeError),
}

pub type EngineResult<T> = Result<T, EngineError>;
