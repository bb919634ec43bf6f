use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmberError {
    #[error("invalid model type: {0:?}")]
    InvalidModelType(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("model {name:?} is not available locally and downloads are disabled")]
    ModelNotFound { name: String },
    #[error("download failed ({status}): {url}")]
    Download {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("completion ended without producing a result")]
    ResultDropped,
}

pub type Result<T> = std::result::Result<T, EmberError>;
