use std::path::PathBuf;

/// Core error type shared by every crate in the workspace.
///
/// Adapter crates map their transport and decode failures into `Fetch` or
/// `Forward` so the poll driver can decide between backing off and giving up.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// Upstream source failed: network, decode, or malformed response.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Messaging endpoint failed or did not acknowledge with `ok: true`.
    #[error("forward error: {0}")]
    Forward(String),

    #[error("corrupt state in {path}: {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Fetch and forward failures are resolved by backoff-and-retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Fetch(_) | Error::Forward(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
