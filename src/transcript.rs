//! Turns WebVTT subtitle tracks into readable plain text.
//!
//! Auto-generated captions repeat each phrase across several cues and carry
//! per-word timing tags. Flattening keeps the spoken text once, in order.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::workspace::{Workspace, has_extension};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

/// Subtitle file the engine wrote for this request. English tracks win when
/// more than one language landed in the workspace.
pub fn find_subtitle(workspace: &Workspace) -> Option<PathBuf> {
    let tracks: Vec<PathBuf> = workspace
        .files()
        .into_iter()
        .filter(|path| has_extension(path, "vtt"))
        .collect();
    tracks
        .iter()
        .find(|path| is_english_track(path))
        .or_else(|| tracks.first())
        .cloned()
}

fn is_english_track(path: &Path) -> bool {
    path.file_stem()
        .map(Path::new)
        .and_then(|stem| stem.extension())
        .and_then(|lang| lang.to_str())
        .is_some_and(|lang| lang.eq_ignore_ascii_case("en") || lang.starts_with("en-"))
}

/// Lines that carry no spoken text: the header, cue timings, metadata and cue
/// numbers.
fn is_structural(line: &str) -> bool {
    line.is_empty()
        || line.contains("WEBVTT")
        || line.contains("-->")
        || line.starts_with("Kind:")
        || line.starts_with("Language:")
        || line.chars().all(|c| c.is_ascii_digit())
}

/// Flattens WebVTT text into plain lines with adjacent repeats removed.
pub fn vtt_to_plain_text(vtt: &str) -> String {
    let mut emitted: Vec<String> = Vec::new();
    for raw in vtt.lines() {
        let line = raw.trim();
        if is_structural(line) {
            continue;
        }
        let cleaned = TAG_RE.replace_all(line, "");
        let cleaned = cleaned.trim();
        if is_structural(cleaned) {
            continue;
        }
        if emitted.last().is_some_and(|last| last == cleaned) {
            continue;
        }
        emitted.push(cleaned.to_owned());
    }
    emitted.join("\n")
}

/// Writes the plain-text version of `vtt_path` next to it, swapping the
/// extension for `.txt`, and returns the new path.
pub fn write_plain_transcript(vtt_path: &Path) -> Result<PathBuf> {
    let bytes =
        fs::read(vtt_path).with_context(|| format!("reading {}", vtt_path.display()))?;
    let text = vtt_to_plain_text(&String::from_utf8_lossy(&bytes));
    let txt_path = vtt_path.with_extension("txt");
    fs::write(&txt_path, text).with_context(|| format!("writing {}", txt_path.display()))?;
    Ok(txt_path)
}
