//! The one value every request resolves to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// The artifact is ready at `file_path`.
    Success { file_path: PathBuf },
    /// The fetch worked but produced nothing worth delivering.
    Warning { message: String },
    Error { message: String },
}

impl Outcome {
    pub fn success(file_path: impl Into<PathBuf>) -> Self {
        Outcome::Success {
            file_path: file_path.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Outcome::Warning {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Outcome::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn file_path(&self) -> Option<&Path> {
        match self {
            Outcome::Success { file_path } => Some(file_path),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Success { .. } => None,
            Outcome::Warning { message } | Outcome::Error { message } => Some(message),
        }
    }

    /// MIME type a delivery layer should attach to a successful artifact.
    pub fn mime_type(&self) -> Option<&'static str> {
        self.file_path().map(mime_from_path)
    }
}

/// Maps an artifact's extension to the MIME type used for delivery.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("csv") => "text/csv",
        Some("vtt") => "text/vtt",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
