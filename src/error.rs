use thiserror::Error;

/// The fetch succeeded but the artifact the request needs is not on disk.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("No transcript found (none available in English)")]
    Transcript,
    #[error("Could not locate downloaded media file")]
    Media,
}
