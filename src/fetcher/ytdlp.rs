//! [`FetchEngine`] backed by the `yt-dlp` executable.

use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{EngineStatus, FetchEngine, FetchError, FetchedInfo};
use crate::comments::decode_comments;
use crate::fetch_config::{FetchConfig, PostProcessor};

pub const DEFAULT_PROGRAM: &str = "yt-dlp";
const PROGRESS_MARKER: &str = "[progress]";
const PROGRESS_TEMPLATE: &str =
    "download:[progress] %(progress.status)s %(progress._percent_str)s";
const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct YtDlp {
    program: PathBuf,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Runs `<program> --version` to fail loudly when the engine is missing.
    pub fn ensure_available(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("{} is not installed", self.program.display()))?;
        if !output.status.success() {
            bail!(
                "{} --version exited with status {}",
                self.program.display(),
                output.status
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
    }
}

/// Command-line flags for one fetch. The URL goes last, after `--`.
pub fn build_args(config: &FetchConfig, url: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "--newline",
        "--progress",
        "--progress-template",
        PROGRESS_TEMPLATE,
        "--no-colors",
        "--dump-single-json",
        "--no-simulate",
        "--no-playlist",
        "--no-warnings",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect();

    args.push("--default-search".into());
    args.push(config.default_search.clone());
    if config.force_ipv4 {
        args.push("--force-ipv4".into());
    }
    args.push("--output".into());
    args.push(config.output_pattern().to_string_lossy().into_owned());

    if let Some(format) = &config.format {
        args.push("--format".into());
        args.push(format.clone());
    }
    if config.skip_download {
        args.push("--skip-download".into());
    }
    if let Some(subtitles) = &config.subtitles {
        args.push("--write-subs".into());
        if subtitles.include_automatic {
            args.push("--write-auto-subs".into());
        }
        args.push("--sub-langs".into());
        args.push(subtitles.languages.join(","));
        args.push("--sub-format".into());
        args.push(subtitles.format.clone());
    }
    if config.write_comments {
        args.push("--write-comments".into());
    }
    for processor in &config.post_processors {
        match processor {
            PostProcessor::ExtractAudio {
                codec,
                bitrate_kbps,
            } => {
                args.push("--extract-audio".into());
                args.push("--audio-format".into());
                args.push(codec.as_str().to_owned());
                args.push("--audio-quality".into());
                args.push(format!("{bitrate_kbps}K"));
            }
        }
    }

    args.push("--".into());
    args.push(url.to_owned());
    args
}

/// Recognizes lines printed through our progress template, e.g.
/// `[progress] downloading  42.0%` or `[progress] finished NA`.
pub fn parse_status_line(line: &str) -> Option<EngineStatus> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?.trim();
    let (status, detail) = match rest.split_once(char::is_whitespace) {
        Some((status, detail)) => (status, detail.trim()),
        None => (rest, ""),
    };
    Some(match status {
        "downloading" => EngineStatus::Downloading {
            percent: (!detail.is_empty()).then(|| detail.to_owned()),
        },
        "finished" => EngineStatus::Finished,
        _ => EngineStatus::Other(rest.to_owned()),
    })
}

/// Only the fields we need from `--dump-single-json`.
#[derive(Deserialize)]
struct InfoJson {
    title: Option<String>,
    #[serde(default)]
    comments: Option<Vec<Value>>,
}

fn parse_metadata(json: &str) -> Result<FetchedInfo, FetchError> {
    let info: InfoJson = serde_json::from_str(json)?;
    Ok(FetchedInfo {
        title: info.title,
        comments: info.comments.map(decode_comments),
    })
}

/// Picks the most useful failure text from stderr.
fn engine_error_message(stderr: &[String], status: ExitStatus) -> String {
    if let Some(line) = stderr
        .iter()
        .rev()
        .find(|line| line.trim_start().starts_with("ERROR:"))
    {
        return line.trim().to_owned();
    }
    let joined = stderr
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    if joined.is_empty() {
        format!("yt-dlp exited with {status}")
    } else {
        joined
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R>(pipe: R, stream: Stream, tx: Sender<(Stream, String)>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(['\r', '\n'])
                        .to_owned();
                    if tx.send((stream, line)).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

impl FetchEngine for YtDlp {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn fetch(
        &self,
        url: &str,
        config: &FetchConfig,
        on_status: &mut dyn FnMut(EngineStatus),
        cancel: &CancellationToken,
    ) -> Result<FetchedInfo, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let args = build_args(config, url);
        debug!(program = %self.program.display(), ?args, "launching fetch engine");
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| FetchError::Launch {
                program: self.program.display().to_string(),
                source,
            })?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Stream::Stderr, tx);
        }

        let mut metadata: Option<String> = None;
        let mut stderr_lines = Vec::new();
        loop {
            if cancel.is_cancelled() {
                info!(url, "cancelling fetch");
                let _ = child.kill();
                let _ = child.wait();
                return Err(FetchError::Cancelled);
            }
            match rx.recv_timeout(CANCEL_POLL) {
                Ok((stream, line)) => {
                    if let Some(status) = parse_status_line(&line) {
                        on_status(status);
                        continue;
                    }
                    match stream {
                        Stream::Stdout if line.trim_start().starts_with('{') => {
                            metadata = Some(line);
                        }
                        Stream::Stdout => debug!("yt-dlp: {line}"),
                        Stream::Stderr => stderr_lines.push(line),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child
            .wait()
            .map_err(|err| FetchError::Engine(format!("waiting for yt-dlp: {err}")))?;
        if !status.success() {
            return Err(FetchError::Engine(engine_error_message(
                &stderr_lines,
                status,
            )));
        }
        match metadata {
            Some(json) => parse_metadata(&json),
            None => Err(FetchError::Engine(
                "yt-dlp finished without printing metadata".to_owned(),
            )),
        }
    }
}
