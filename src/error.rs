use thiserror::Error;

#[derive(Error, Debug)]
pub enum UnderwritingError {
    #[error("Text source '{source_id}' could not be read: {details}")]
    SourceUnavailable { source_id: String, details: String },

    #[error("Invalid pattern '{pattern}': {details}")]
    InvalidPattern { pattern: String, details: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Narrative extraction failed: {0}")]
    NarrativeExtraction(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, UnderwritingError>;
