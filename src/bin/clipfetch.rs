#![forbid(unsafe_code)]

use std::{
    fs,
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use clipfetch::{
    DownloadKind, DownloadRequest, Outcome, ProgressEvent, Quality, Workspace, YtDlp,
    config::{SettingsOverrides, resolve_settings},
    fetcher::FINISHED_MESSAGE,
    resolver,
};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "clipfetch")]
#[command(about = "Fetch one video, audio track, transcript or comment export")]
#[command(version)]
struct Cli {
    /// Video page URL (or a search term the engine can resolve)
    url: String,

    /// What to produce: video, audio, transcript, transcript-plain or comments
    #[arg(short, long, default_value = "video")]
    kind: DownloadKind,

    /// Resolution preference for video downloads: top, medium or low
    #[arg(short, long)]
    quality: Option<Quality>,

    /// Scratch directory, emptied before every run
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Env file to read settings from
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// yt-dlp executable to run
    #[arg(long)]
    yt_dlp: Option<PathBuf>,

    /// Mirror progress as JSON into this file
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProgressReport {
    progress: u8,
    message: String,
}

/// Atomically rewrites a small JSON status file another process can poll.
struct ProgressWriter {
    path: PathBuf,
}

impl ProgressWriter {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write(&self, progress: u8, message: &str) {
        let report = ProgressReport {
            progress: progress.min(100),
            message: message.to_string(),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && let Err(err) = fs::create_dir_all(parent)
        {
            warn!("could not create progress dir: {err}");
            return;
        }

        let tmp_path = self.path.with_extension("tmp");
        match serde_json::to_vec(&report) {
            Ok(payload) => {
                if let Err(err) = fs::write(&tmp_path, payload) {
                    warn!("could not write progress file: {err}");
                    return;
                }
                if let Err(err) = fs::rename(&tmp_path, &self.path) {
                    warn!("could not finalize progress file: {err}");
                }
            }
            Err(err) => warn!("could not serialize progress report: {err}"),
        }
    }
}

fn percent(fraction: f32) -> u8 {
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn report_progress(writer: Option<&ProgressWriter>, event: &ProgressEvent) {
    let mut stderr = io::stderr().lock();
    let _ = write!(stderr, "\r\x1b[2K{}", event.message);
    if event.message == FINISHED_MESSAGE {
        let _ = writeln!(stderr);
    }
    let _ = stderr.flush();

    if let Some(writer) = writer {
        writer.write(percent(event.fraction), &event.message);
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeReport<'a> {
    #[serde(flatten)]
    outcome: &'a Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'static str>,
}

fn print_outcome(outcome: &Outcome, json: bool) -> Result<()> {
    if json {
        let report = OutcomeReport {
            outcome,
            mime_type: outcome.mime_type(),
        };
        let rendered = serde_json::to_string_pretty(&report).context("rendering outcome")?;
        println!("{rendered}");
        return Ok(());
    }
    match outcome {
        Outcome::Success { file_path } => println!("{}", file_path.display()),
        Outcome::Warning { message } => eprintln!("Warning: {message}"),
        Outcome::Error { message } => eprintln!("Error: {message}"),
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "clipfetch=info"
    } else {
        "clipfetch=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, stopping download");
        cancel.cancel();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let Cli {
        url,
        kind,
        quality,
        work_dir,
        env_file,
        yt_dlp,
        progress_file,
        json,
        verbose,
    } = Cli::parse();
    init_tracing(verbose);

    let settings = resolve_settings(SettingsOverrides {
        work_dir,
        yt_dlp,
        env_path: env_file,
    })?;
    let engine = YtDlp::new(&settings.yt_dlp);
    let version = engine.ensure_available()?;
    info!(%version, program = %engine.program().display(), "engine ready");

    let request = DownloadRequest::new(url, kind, quality);
    let workspace = Workspace::new(&settings.work_dir);
    let progress = progress_file.map(ProgressWriter::new);
    if let Some(writer) = &progress {
        writer.write(0, "Preparing download");
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let (outcome, progress) = tokio::task::spawn_blocking(move || {
        let mut sink = |event: ProgressEvent| report_progress(progress.as_ref(), &event);
        let outcome = resolver::resolve(&engine, &workspace, &request, &mut sink, &cancel);
        (outcome, progress)
    })
    .await
    .context("download task failed")?;

    if let Some(writer) = &progress {
        match &outcome {
            Outcome::Success { .. } => writer.write(100, "Done"),
            Outcome::Warning { message } | Outcome::Error { message } => {
                writer.write(100, message)
            }
        }
    }
    print_outcome(&outcome, json)?;

    Ok(match outcome {
        Outcome::Error { .. } => ExitCode::FAILURE,
        Outcome::Success { .. } | Outcome::Warning { .. } => ExitCode::SUCCESS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_kind_and_quality_labels() {
        let cli = Cli::try_parse_from([
            "clipfetch",
            "--kind",
            "transcript-plain",
            "--quality",
            "medium",
            "https://example.com/watch?v=x",
        ])
        .unwrap();
        assert_eq!(cli.kind, DownloadKind::TranscriptPlain);
        assert_eq!(cli.quality, Some(Quality::Medium720));
        assert!(!cli.json);

        let defaults = Cli::try_parse_from(["clipfetch", "u"]).unwrap();
        assert_eq!(defaults.kind, DownloadKind::VideoAudio);
        assert_eq!(defaults.quality, None);

        assert!(Cli::try_parse_from(["clipfetch", "--kind", "hologram", "u"]).is_err());
    }

    #[test]
    fn progress_writer_replaces_file_atomically() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested/progress.json");
        let writer = ProgressWriter::new(path.clone());
        writer.write(42, "Downloading... 42%");
        writer.write(250, "Download complete! Processing...");

        let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(report["progress"], 100);
        assert_eq!(report["message"], "Download complete! Processing...");
        assert!(!path.with_extension("tmp").exists());
        Ok(())
    }

    #[test]
    fn json_outcome_carries_mime_type() -> Result<()> {
        let outcome = Outcome::success("/tmp/work/Clip.mp3");
        let rendered = serde_json::to_value(OutcomeReport {
            outcome: &outcome,
            mime_type: outcome.mime_type(),
        })?;
        assert_eq!(rendered["status"], "success");
        assert_eq!(rendered["file_path"], "/tmp/work/Clip.mp3");
        assert_eq!(rendered["mimeType"], "audio/mpeg");

        let warning = Outcome::warning("nothing");
        let rendered = serde_json::to_value(OutcomeReport {
            outcome: &warning,
            mime_type: warning.mime_type(),
        })?;
        assert_eq!(rendered["status"], "warning");
        assert!(rendered.get("mimeType").is_none());
        Ok(())
    }

    #[test]
    fn percent_rounds_and_clamps() {
        assert_eq!(percent(0.424), 42);
        assert_eq!(percent(1.5), 100);
        assert_eq!(percent(-0.1), 0);
    }
}
