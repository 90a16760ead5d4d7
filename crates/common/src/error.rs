//! Error types shared across Reelsmith crates.

use std::path::PathBuf;

/// Top-level error type for Reelsmith operations.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    /// The environment cannot run a render at all (encoder missing,
    /// contradictory background, bad config). Raised before any I/O.
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid scene: {message}")]
    Scene { message: String },

    #[error("Failed to fetch {asset}: {message}")]
    AssetFetch { asset: String, message: String },

    #[error("Render error: {message}")]
    Render { message: String, diagnostics: String },

    #[error("Upload error: {message}")]
    Upload { message: String },

    #[error("Render cancelled before the encoder started")]
    Cancelled,

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ReelError.
pub type ReelResult<T> = Result<T, ReelError>;

impl ReelError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn scene(msg: impl Into<String>) -> Self {
        Self::Scene {
            message: msg.into(),
        }
    }

    pub fn asset_fetch(asset: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::AssetFetch {
            asset: asset.into(),
            message: msg.into(),
        }
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
            diagnostics: String::new(),
        }
    }

    pub fn render_with_diagnostics(msg: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::Render {
            message: msg.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload {
            message: msg.into(),
        }
    }

    /// Encoder output attached to a render failure, if any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            Self::Render { diagnostics, .. } if !diagnostics.is_empty() => Some(diagnostics),
            _ => None,
        }
    }

    /// Whether this error aborts a job. Upload failures are downgraded to
    /// warnings by the publisher; everything else is fatal when it escapes.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Upload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_error_exposes_diagnostics() {
        let err = ReelError::render_with_diagnostics("ffmpeg exited with 1", "No such filter");
        assert_eq!(err.diagnostics(), Some("No such filter"));
        assert!(err.to_string().contains("ffmpeg exited with 1"));
    }

    #[test]
    fn test_plain_render_error_has_no_diagnostics() {
        assert_eq!(ReelError::render("boom").diagnostics(), None);
    }

    #[test]
    fn test_upload_is_the_only_non_fatal_error() {
        assert!(!ReelError::upload("503").is_fatal());
        assert!(ReelError::config("ffmpeg missing").is_fatal());
        assert!(ReelError::asset_fetch("background", "404").is_fatal());
        assert!(ReelError::Cancelled.is_fatal());
    }
}
