use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out during pagination: {0}")]
    ExtractionTimeout(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;

impl From<reqwest::Error> for EtlError {
    fn from(e: reqwest::Error) -> Self {
        EtlError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for EtlError {
    fn from(e: serde_json::Error) -> Self {
        EtlError::MalformedData(e.to_string())
    }
}

impl From<csv::Error> for EtlError {
    fn from(e: csv::Error) -> Self {
        EtlError::MalformedData(e.to_string())
    }
}

impl From<chrono::ParseError> for EtlError {
    fn from(e: chrono::ParseError) -> Self {
        EtlError::MalformedData(e.to_string())
    }
}
