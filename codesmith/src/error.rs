//! Error types for generation calls and pipeline runs.

use std::path::PathBuf;

/// How the gateway should treat a failed generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Capacity or rate exhaustion. Worth retrying after a backoff.
    Transient,
    /// Anything else. Retrying will not help.
    Terminal,
}

/// Errors from the text-generation capability.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("capacity exhausted (status {status}): {message}")]
    Transient { status: u16, message: String },

    #[error("generation rejected (status {status}): {message}")]
    Terminal { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Transient { .. } => ErrorKind::Transient,
            _ => ErrorKind::Terminal,
        }
    }
}

/// Errors that end a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("requirements text is empty")]
    EmptyRequirements,

    #[error("planning failed: {0}")]
    Planning(#[source] GenerationError),

    #[error("code generation failed: {0}")]
    Coding(#[source] GenerationError),

    #[error("test generation failed: {0}")]
    Testing(#[source] GenerationError),

    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        let err = GenerationError::Transient {
            status: 429,
            message: "quota".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transient);

        let err = GenerationError::Terminal {
            status: 400,
            message: "bad request".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Terminal);

        let err = GenerationError::MissingCredential("GEMINI_API_KEY not set".into());
        assert_eq!(err.kind(), ErrorKind::Terminal);
        assert!(err.to_string().contains("missing credential"));
    }

    #[test]
    fn pipeline_error_display() {
        let err = PipelineError::Planning(GenerationError::InvalidResponse("no candidates".into()));
        assert!(err.to_string().contains("planning failed"));
        assert!(err.to_string().contains("no candidates"));
    }
}
