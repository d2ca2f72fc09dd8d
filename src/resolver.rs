//! Drives one request from an empty workspace to a single [`Outcome`].
//!
//! Resetting → Fetching → PostProcessing → Resolved. Each stage either hands
//! over to the next or resolves immediately; nothing escapes as an `Err`.

use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use crate::comments::export_comments;
use crate::error::NotFoundError;
use crate::fetch_config::build_fetch_config;
use crate::fetcher::{FetchEngine, FetchedInfo, ProgressEvent, run_fetch};
use crate::outcome::Outcome;
use crate::request::{DownloadKind, DownloadRequest};
use crate::transcript::{find_subtitle, write_plain_transcript};
use crate::workspace::{Workspace, has_extension};

/// Extensions that never count as the media artifact.
const NON_MEDIA_EXTENSIONS: [&str; 2] = ["vtt", "csv"];

/// Runs `request` with `engine` inside `workspace`.
pub fn resolve<E>(
    engine: &E,
    workspace: &Workspace,
    request: &DownloadRequest,
    sink: &mut dyn FnMut(ProgressEvent),
    cancel: &CancellationToken,
) -> Outcome
where
    E: FetchEngine + ?Sized,
{
    let span = info_span!("download", kind = %request.kind(), url = request.url());
    let _entered = span.enter();

    workspace.reset();

    let config = build_fetch_config(request, workspace.root());
    info!(engine = engine.name(), "fetching");
    let fetched = match run_fetch(engine, request.url(), &config, sink, cancel) {
        Ok(info) => info,
        Err(err) => {
            error!("fetch failed: {err}");
            return Outcome::error(err.to_string());
        }
    };

    let outcome = match post_process(request.kind(), workspace, &fetched) {
        Ok(outcome) => outcome,
        Err(err) => Outcome::error(format!("{err:#}")),
    };
    match &outcome {
        Outcome::Success { file_path } => info!(artifact = %file_path.display(), "resolved"),
        Outcome::Warning { message } => warn!("{message}"),
        Outcome::Error { message } => error!("{message}"),
    }
    outcome
}

fn post_process(
    kind: DownloadKind,
    workspace: &Workspace,
    fetched: &FetchedInfo,
) -> Result<Outcome> {
    match kind {
        DownloadKind::Comments => export_comments(
            fetched.comments.as_deref(),
            fetched.display_title(),
            workspace.root(),
        ),
        DownloadKind::Transcript | DownloadKind::TranscriptPlain => {
            let vtt = find_subtitle(workspace).ok_or(NotFoundError::Transcript)?;
            if kind == DownloadKind::TranscriptPlain {
                Ok(Outcome::success(write_plain_transcript(&vtt)?))
            } else {
                Ok(Outcome::success(vtt))
            }
        }
        DownloadKind::VideoAudio | DownloadKind::AudioOnly => {
            Ok(Outcome::success(find_media(workspace)?))
        }
    }
}

/// First file in the workspace that is not a subtitle or comment export.
fn find_media(workspace: &Workspace) -> Result<PathBuf, NotFoundError> {
    workspace
        .find_artifact(|path| {
            !NON_MEDIA_EXTENSIONS
                .iter()
                .any(|ext| has_extension(path, ext))
        })
        .ok_or(NotFoundError::Media)
}
