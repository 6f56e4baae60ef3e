use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlmanacError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Calendar parsing error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to persist settings: {0}")]
    ConfigPersist(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AlmanacError>;
