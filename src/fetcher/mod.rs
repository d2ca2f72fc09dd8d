//! Runs the fetch engine and normalizes what it reports.
//!
//! The engine is an opaque collaborator behind [`FetchEngine`]. It reports
//! progress as loosely structured [`EngineStatus`] payloads; [`run_fetch`]
//! turns those into [`ProgressEvent`]s for the caller and never retries.

mod ytdlp;

pub use ytdlp::{YtDlp, build_args, parse_status_line};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::comments::RawComment;
use crate::fetch_config::FetchConfig;

pub const FINISHED_MESSAGE: &str = "Download complete! Processing...";
pub const DEFAULT_TITLE: &str = "video";

/// Normalized progress update handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Completion in `[0.0, 1.0]`.
    pub fraction: f32,
    pub message: String,
}

/// Raw status payload as the engine reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Transfer in progress. `percent` is the engine's own text, e.g. `" 42.0%"`,
    /// and may be missing or garbled.
    Downloading { percent: Option<String> },
    Finished,
    Other(String),
}

/// Metadata the engine returns once it is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedInfo {
    pub title: Option<String>,
    /// Only populated when comments were requested.
    pub comments: Option<Vec<RawComment>>,
}

impl FetchedInfo {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|title| !title.trim().is_empty())
            .unwrap_or(DEFAULT_TITLE)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// The engine ran and failed. Carries its message verbatim.
    #[error("{0}")]
    Engine(String),
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not read engine metadata: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("download cancelled")]
    Cancelled,
}

/// Anything that can resolve a URL into files on disk plus metadata.
pub trait FetchEngine: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Blocks until the engine finishes. `on_status` is invoked on the calling
    /// thread zero or more times while the engine runs.
    fn fetch(
        &self,
        url: &str,
        config: &FetchConfig,
        on_status: &mut dyn FnMut(EngineStatus),
        cancel: &CancellationToken,
    ) -> Result<FetchedInfo, FetchError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressParseError {
    #[error("status carried no percentage")]
    Missing,
    #[error("unparseable percentage {0:?}")]
    Malformed(String),
}

fn strip_percent(raw: &str) -> &str {
    raw.trim().trim_end_matches('%').trim()
}

/// Parses a percentage such as `" 42.5%"` into `42.5`.
pub fn parse_percent(raw: &str) -> Result<f32, ProgressParseError> {
    match strip_percent(raw).parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(ProgressParseError::Malformed(raw.to_owned())),
    }
}

/// Converts engine statuses into caller-facing events for one run.
///
/// Fractions never move backwards: engines that fetch video and audio as two
/// streams restart their own counter for the second stream.
#[derive(Debug, Default)]
pub struct ProgressAdapter {
    high_water: f32,
}

impl ProgressAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adapt(
        &mut self,
        status: &EngineStatus,
    ) -> Result<Option<ProgressEvent>, ProgressParseError> {
        let event = match status {
            EngineStatus::Downloading { percent } => {
                let raw = percent.as_deref().ok_or(ProgressParseError::Missing)?;
                let value = parse_percent(raw)?;
                ProgressEvent {
                    fraction: (value / 100.0).clamp(0.0, 1.0),
                    message: format!("Downloading... {}%", strip_percent(raw)),
                }
            }
            EngineStatus::Finished => ProgressEvent {
                fraction: 1.0,
                message: FINISHED_MESSAGE.to_owned(),
            },
            EngineStatus::Other(_) => return Ok(None),
        };
        self.high_water = self.high_water.max(event.fraction);
        Ok(Some(ProgressEvent {
            fraction: self.high_water,
            ..event
        }))
    }
}

/// Runs `engine` for `url`, forwarding normalized progress to `sink`.
pub fn run_fetch<E>(
    engine: &E,
    url: &str,
    config: &FetchConfig,
    sink: &mut dyn FnMut(ProgressEvent),
    cancel: &CancellationToken,
) -> Result<FetchedInfo, FetchError>
where
    E: FetchEngine + ?Sized,
{
    let mut adapter = ProgressAdapter::new();
    let mut on_status = |status: EngineStatus| match adapter.adapt(&status) {
        Ok(Some(event)) => sink(event),
        Ok(None) => {}
        Err(err) => debug!(engine = engine.name(), "dropping progress update: {err}"),
    };
    engine.fetch(url, config, &mut on_status, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct ScriptedEngine {
        statuses: Vec<EngineStatus>,
        result: fn() -> Result<FetchedInfo, FetchError>,
    }

    impl FetchEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(
            &self,
            _url: &str,
            _config: &FetchConfig,
            on_status: &mut dyn FnMut(EngineStatus),
            _cancel: &CancellationToken,
        ) -> Result<FetchedInfo, FetchError> {
            for status in &self.statuses {
                on_status(status.clone());
            }
            (self.result)()
        }
    }

    fn downloading(percent: &str) -> EngineStatus {
        EngineStatus::Downloading {
            percent: Some(percent.to_string()),
        }
    }

    fn config() -> FetchConfig {
        let request = crate::request::DownloadRequest::new(
            "https://example.com/v",
            crate::request::DownloadKind::VideoAudio,
            None,
        );
        crate::fetch_config::build_fetch_config(&request, Path::new("/tmp/work"))
    }

    #[test]
    fn parse_percent_accepts_engine_formatting() {
        assert_eq!(parse_percent(" 42.5%"), Ok(42.5));
        assert_eq!(parse_percent("100%"), Ok(100.0));
        assert_eq!(parse_percent("7"), Ok(7.0));
        assert!(matches!(
            parse_percent("N/A%"),
            Err(ProgressParseError::Malformed(_))
        ));
        assert!(parse_percent("").is_err());
        assert!(parse_percent("NaN%").is_err());
    }

    #[test]
    fn adapter_maps_downloading_and_finished() {
        let mut adapter = ProgressAdapter::new();
        let event = adapter.adapt(&downloading(" 25.0%")).unwrap().unwrap();
        assert_eq!(event.fraction, 0.25);
        assert_eq!(event.message, "Downloading... 25.0%");

        let done = adapter.adapt(&EngineStatus::Finished).unwrap().unwrap();
        assert_eq!(done.fraction, 1.0);
        assert_eq!(done.message, FINISHED_MESSAGE);

        assert_eq!(
            adapter.adapt(&EngineStatus::Other("merging".into())).unwrap(),
            None
        );
    }

    #[test]
    fn adapter_reports_missing_and_malformed_percent() {
        let mut adapter = ProgressAdapter::new();
        assert_eq!(
            adapter.adapt(&EngineStatus::Downloading { percent: None }),
            Err(ProgressParseError::Missing)
        );
        assert!(adapter.adapt(&downloading("Unknown%")).is_err());
    }

    #[test]
    fn adapter_keeps_fraction_monotonic() {
        let mut adapter = ProgressAdapter::new();
        adapter.adapt(&downloading("80%")).unwrap();
        let restarted = adapter.adapt(&downloading("10%")).unwrap().unwrap();
        assert_eq!(restarted.fraction, 0.8);
        assert_eq!(restarted.message, "Downloading... 10%");
        let clamped = adapter.adapt(&downloading("250%")).unwrap().unwrap();
        assert_eq!(clamped.fraction, 1.0);
    }

    #[test]
    fn run_fetch_swallows_bad_progress() {
        let engine = ScriptedEngine {
            statuses: vec![
                downloading("10%"),
                EngineStatus::Downloading { percent: None },
                downloading("garbage"),
                downloading("60%"),
                EngineStatus::Finished,
            ],
            result: || {
                Ok(FetchedInfo {
                    title: Some("Clip".into()),
                    comments: None,
                })
            },
        };
        let mut events = Vec::new();
        let info = run_fetch(
            &engine,
            "https://example.com/v",
            &config(),
            &mut |event| events.push(event),
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(info.display_title(), "Clip");
        let fractions: Vec<f32> = events.iter().map(|event| event.fraction).collect();
        assert_eq!(fractions, vec![0.1, 0.6, 1.0]);
    }

    #[test]
    fn run_fetch_passes_engine_errors_through() {
        let engine = ScriptedEngine {
            statuses: vec![downloading("5%")],
            result: || Err(FetchError::Engine("ERROR: Unsupported URL: nope".into())),
        };
        let err = run_fetch(
            &engine,
            "nope",
            &config(),
            &mut |_| {},
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "ERROR: Unsupported URL: nope");
    }

    #[test]
    fn display_title_falls_back_to_default() {
        assert_eq!(FetchedInfo::default().display_title(), "video");
        let blank = FetchedInfo {
            title: Some("  ".into()),
            comments: None,
        };
        assert_eq!(blank.display_title(), "video");
    }
}
