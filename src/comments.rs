//! Exports a video's comment thread as CSV.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::outcome::Outcome;

pub const NO_COMMENTS_MESSAGE: &str = "No comments found or comments are disabled.";
pub const CSV_HEADER: [&str; 4] = ["author", "date", "text", "likes"];
const CSV_SUFFIX: &str = "_comments.csv";

/// One comment as reported by the engine. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawComment {
    #[serde(default)]
    pub author: Option<String>,
    /// Unix seconds, exactly as the engine reported it.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub like_count: Option<i64>,
}

/// Accepts integers, floats, numeric strings and null.
fn lenient_i64<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Decodes each record on its own so one malformed entry does not lose the
/// rest of the thread.
pub fn decode_comments(values: Vec<Value>) -> Vec<RawComment> {
    let mut comments = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<RawComment>(value) {
            Ok(comment) => comments.push(comment),
            Err(err) => warn!("skipping undecodable comment: {err}"),
        }
    }
    comments
}

/// `<title>_comments.csv` reduced to letters, digits, spaces, `.`, `_` and `-`.
pub fn csv_file_name(title: &str) -> String {
    let raw = format!("{title}{CSV_SUFFIX}");
    raw.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | '_' | '-'))
        .collect::<String>()
        .trim()
        .to_owned()
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn push_row(out: &mut String, fields: &[String]) {
    let escaped: Vec<String> = fields.iter().map(|field| escape_csv(field)).collect();
    out.push_str(&escaped.join(","));
    out.push_str("\r\n");
}

/// Renders the CSV document, header included.
pub fn render_csv(comments: &[RawComment]) -> String {
    let mut out = String::new();
    let header: Vec<String> = CSV_HEADER.iter().map(|name| name.to_string()).collect();
    push_row(&mut out, &header);
    for comment in comments {
        push_row(
            &mut out,
            &[
                comment.author.clone().unwrap_or_default(),
                comment.timestamp.map(|ts| ts.to_string()).unwrap_or_default(),
                comment.text.clone().unwrap_or_default(),
                comment
                    .like_count
                    .map(|likes| likes.to_string())
                    .unwrap_or_default(),
            ],
        );
    }
    out
}

/// Writes the comment CSV into `dir`. An empty or absent thread is a
/// [`Outcome::Warning`], not a failure.
pub fn export_comments(
    comments: Option<&[RawComment]>,
    title: &str,
    dir: &Path,
) -> Result<Outcome> {
    let comments = match comments {
        Some(list) if !list.is_empty() => list,
        _ => return Ok(Outcome::warning(NO_COMMENTS_MESSAGE)),
    };

    let csv_path: PathBuf = dir.join(csv_file_name(title));
    fs::write(&csv_path, render_csv(comments))
        .with_context(|| format!("writing {}", csv_path.display()))?;
    Ok(Outcome::success(csv_path))
}
