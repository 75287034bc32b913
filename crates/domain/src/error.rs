/// Shared error type used across all TaskMesh crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    /// The model endpoint returned a non-2xx response.
    #[error("provider returned {status_code}: {message}")]
    Provider { status_code: u16, message: String },

    /// Malformed model output (tool arguments, decision JSON).
    #[error("parse: {0}")]
    Parse(String),

    /// An agent or team exhausted its step budget.
    #[error("{scope} step limit ({limit}) exceeded")]
    StepLimit { scope: String, limit: u32 },

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
