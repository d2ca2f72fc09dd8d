#![forbid(unsafe_code)]

//! Single-file download pipeline built around `yt-dlp`.
//!
//! A request names a URL and an output kind. The pipeline empties the working
//! directory, runs the fetch engine with a configuration derived from the
//! request, and turns whatever the engine left behind into exactly one
//! deliverable: a media file, a subtitle track, a plain-text transcript or a
//! CSV of comments. Every request ends in one [`Outcome`].

pub mod comments;
pub mod config;
pub mod error;
pub mod fetch_config;
pub mod fetcher;
pub mod outcome;
pub mod request;
pub mod resolver;
pub mod transcript;
pub mod workspace;

use std::path::Path;

use tokio_util::sync::CancellationToken;

pub use error::NotFoundError;
pub use fetcher::{FetchEngine, FetchError, ProgressEvent, YtDlp};
pub use outcome::Outcome;
pub use request::{DownloadKind, DownloadRequest, Quality};
pub use workspace::Workspace;

/// Runs one request against `work_dir` with the default `yt-dlp` engine.
///
/// Progress is delivered to `sink` while the engine runs. The call blocks until
/// the engine exits and always returns exactly one [`Outcome`].
pub fn download(
    work_dir: &Path,
    url: &str,
    kind: DownloadKind,
    quality: Option<Quality>,
    sink: &mut dyn FnMut(ProgressEvent),
) -> Outcome {
    let request = DownloadRequest::new(url, kind, quality);
    let workspace = Workspace::new(work_dir);
    resolver::resolve(
        &YtDlp::default(),
        &workspace,
        &request,
        sink,
        &CancellationToken::new(),
    )
}
