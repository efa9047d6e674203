//! Error types shared across Storyreel crates.

use std::path::PathBuf;

/// Top-level error type for Storyreel operations.
///
/// Every variant is fatal to a render: the engine never retries an external
/// call, so callers surface these to the user as-is.
#[derive(Debug, thiserror::Error)]
pub enum StoryreelError {
    /// An encoder subprocess exited with a non-zero status.
    #[error("{program} failed ({status}): {diagnostics}")]
    Encoder {
        program: String,
        status: String,
        /// Captured stderr of the subprocess, verbatim.
        diagnostics: String,
    },

    #[error("Failed to start {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Malformed {what}: {value:?}")]
    MalformedNumber { what: String, value: String },

    #[error("Template error: {message}")]
    Template { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Render error: {message}")]
    Render { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using StoryreelError.
pub type StoryreelResult<T> = Result<T, StoryreelError>;

impl StoryreelError {
    pub fn encoder(
        program: impl Into<String>,
        status: impl Into<String>,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self::Encoder {
            program: program.into(),
            status: status.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn spawn(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn malformed(what: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedNumber {
            what: what.into(),
            value: value.into(),
        }
    }

    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_error_keeps_diagnostics_verbatim() {
        let err = StoryreelError::encoder(
            "ffmpeg",
            "exit status: 1",
            "[xfade @ 0x55] First input link main timebase do not match",
        );
        let text = err.to_string();
        assert!(text.starts_with("ffmpeg failed (exit status: 1)"));
        assert!(text.ends_with("[xfade @ 0x55] First input link main timebase do not match"));
    }

    #[test]
    fn test_malformed_number_quotes_value() {
        let err = StoryreelError::malformed("encoder version", "N-109745-g");
        assert_eq!(
            err.to_string(),
            "Malformed encoder version: \"N-109745-g\""
        );
    }

    #[test]
    fn test_io_error_converts() {
        fn fails() -> StoryreelResult<()> {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(StoryreelError::Io(_))));
    }
}
