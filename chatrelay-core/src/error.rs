use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Update source error: {0}")]
    Source(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
