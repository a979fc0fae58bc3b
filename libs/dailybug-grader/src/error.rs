use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Harness could not be produced. User-facing, never retried.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("invalid entry point name: {0:?}")]
    InvalidEntryPoint(String),

    #[error("failed to encode test cases: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Sandbox call failed. Safe for the caller to retry with backoff.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sandbox transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("sandbox did not answer within {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("sandbox rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed sandbox response: {0}")]
    MalformedResponse(String),

    #[error("sandbox reported a timeout: {reason}")]
    SandboxTimeout { reason: String },
}

impl DispatchError {
    /// Either our deadline or the sandbox's own limit expired
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::SandboxTimeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("no problem found")]
    NoProblemFound,

    #[error("failed to read problems from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse problems from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Infrastructure or request failure of a full grading run.
///
/// User-code failures never show up here; they are rendered into the
/// `GradingResult` instead.
#[derive(Debug, Error)]
pub enum GradeError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Problem(#[from] ProblemError),
}
