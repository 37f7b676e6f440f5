use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures surfaced by the credential manager and the export pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Consent or refresh could not complete, or stored secrets are missing/invalid.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Search or get call failed, including transport errors and malformed responses.
    #[error("mail query failed: {0}")]
    Query(String),

    /// A local file could not be opened or written.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::Query(e.to_string())
    }
}
