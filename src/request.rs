//! What the caller asks for: a URL, an output kind and (for video) a quality.

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// The deliverable a request produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadKind {
    /// Muxed video and audio.
    VideoAudio,
    /// Audio track re-encoded to MP3.
    AudioOnly,
    /// WebVTT subtitles with timestamps kept.
    Transcript,
    /// Subtitles flattened to deduplicated plain text.
    TranscriptPlain,
    /// Comment thread exported as CSV.
    Comments,
}

impl DownloadKind {
    pub fn slug(self) -> &'static str {
        match self {
            DownloadKind::VideoAudio => "video",
            DownloadKind::AudioOnly => "audio",
            DownloadKind::Transcript => "transcript",
            DownloadKind::TranscriptPlain => "transcript-plain",
            DownloadKind::Comments => "comments",
        }
    }

    pub fn is_transcript(self) -> bool {
        matches!(
            self,
            DownloadKind::Transcript | DownloadKind::TranscriptPlain
        )
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for DownloadKind {
    type Err = anyhow::Error;

    /// Accepts the short slugs as well as the labels a form would show
    /// ("Video + Audio", "Transcript (Plain Text)", ...).
    fn from_str(value: &str) -> Result<Self> {
        let normalized: String = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "video" | "videoaudio" => Ok(DownloadKind::VideoAudio),
            "audio" | "audioonly" | "mp3" => Ok(DownloadKind::AudioOnly),
            "transcript" | "vtt" | "subtitles" => Ok(DownloadKind::Transcript),
            "transcriptplain" | "transcriptplaintext" | "plain" | "txt" => {
                Ok(DownloadKind::TranscriptPlain)
            }
            "comments" | "csv" => Ok(DownloadKind::Comments),
            _ => bail!("unknown download kind: {value}"),
        }
    }
}

/// Resolution preference for [`DownloadKind::VideoAudio`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Quality {
    #[default]
    Top,
    Medium720,
    Low,
}

impl Quality {
    /// Loose match against UI labels such as "Medium (720p)". Returns `None`
    /// for anything unrecognized so the caller can fall back to a default.
    pub fn from_label(label: &str) -> Option<Self> {
        let lowered = label.trim().to_ascii_lowercase();
        if lowered.contains("top") || lowered.contains("best") {
            Some(Quality::Top)
        } else if lowered.contains("medium") || lowered.contains("720") {
            Some(Quality::Medium720)
        } else if lowered.contains("low") || lowered.contains("360") || lowered.contains("worst")
        {
            Some(Quality::Low)
        } else {
            None
        }
    }
}

impl FromStr for Quality {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match Self::from_label(value) {
            Some(quality) => Ok(quality),
            None => bail!("unknown quality: {value}"),
        }
    }
}

/// A single download request. Built once and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    url: String,
    kind: DownloadKind,
    quality: Option<Quality>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, kind: DownloadKind, quality: Option<Quality>) -> Self {
        Self {
            url: url.into(),
            kind,
            quality,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> DownloadKind {
        self.kind
    }

    /// Quality as supplied. Ignored for every kind except video.
    pub fn quality(&self) -> Option<Quality> {
        self.quality
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_slugs_and_labels() {
        assert_eq!(
            "Video + Audio".parse::<DownloadKind>().unwrap(),
            DownloadKind::VideoAudio
        );
        assert_eq!(
            "audio-only".parse::<DownloadKind>().unwrap(),
            DownloadKind::AudioOnly
        );
        assert_eq!(
            "Transcript (Plain Text)".parse::<DownloadKind>().unwrap(),
            DownloadKind::TranscriptPlain
        );
        assert_eq!(
            "transcript".parse::<DownloadKind>().unwrap(),
            DownloadKind::Transcript
        );
        assert_eq!(
            "COMMENTS".parse::<DownloadKind>().unwrap(),
            DownloadKind::Comments
        );
        assert!("podcast".parse::<DownloadKind>().is_err());
    }

    #[test]
    fn kind_slug_roundtrips_through_from_str() {
        for kind in [
            DownloadKind::VideoAudio,
            DownloadKind::AudioOnly,
            DownloadKind::Transcript,
            DownloadKind::TranscriptPlain,
            DownloadKind::Comments,
        ] {
            assert_eq!(kind.slug().parse::<DownloadKind>().unwrap(), kind);
        }
    }

    #[test]
    fn quality_matches_form_labels() {
        assert_eq!(
            Quality::from_label("Top (Best Available)"),
            Some(Quality::Top)
        );
        assert_eq!(
            Quality::from_label("Medium (720p)"),
            Some(Quality::Medium720)
        );
        assert_eq!(Quality::from_label("Low (360p)"), Some(Quality::Low));
        assert_eq!(Quality::from_label("8k please"), None);
        assert!("".parse::<Quality>().is_err());
    }
}
