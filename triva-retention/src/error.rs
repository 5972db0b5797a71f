use thiserror::Error;

pub type RetentionResult<T> = Result<T, RetentionError>;

#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("invalid retention configuration: {0}")]
    Config(String),

    #[error("failed to serialize records: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write export: {0}")]
    Io(#[from] std::io::Error),
}
