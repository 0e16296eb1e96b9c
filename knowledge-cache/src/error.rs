use thiserror::Error;

#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Cache tier unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type KnowledgeResult<T> = Result<T, KnowledgeError>;

impl From<sqlx::Error> for KnowledgeError {
    fn from(err: sqlx::Error) -> Self {
        KnowledgeError::QueryFailed(err.to_string())
    }
}

impl From<redis::RedisError> for KnowledgeError {
    fn from(err: redis::RedisError) -> Self {
        KnowledgeError::CacheUnavailable(err.to_string())
    }
}
