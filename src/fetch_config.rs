//! Maps a [`DownloadRequest`] onto the options handed to the fetch engine.
//!
//! Everything here is pure: the same request and directory always produce the
//! same [`FetchConfig`].

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::request::{DownloadKind, DownloadRequest, Quality};

/// Output naming template, interpolated by the engine.
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";
pub const AUDIO_FORMAT: &str = "bestaudio/best";
pub const TOP_FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";
pub const MEDIUM_720_FORMAT: &str =
    "bestvideo[height<=720][ext=mp4]+bestaudio[ext=m4a]/best[height<=720][ext=mp4]/best";
pub const LOW_FORMAT: &str = "worstvideo[ext=mp4]+bestaudio[ext=m4a]/worst[ext=mp4]/worst";
pub const SUBTITLE_LANGUAGE: &str = "en";
pub const SUBTITLE_FORMAT: &str = "vtt";
pub const MP3_BITRATE_KBPS: u32 = 192;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubtitleOptions {
    pub languages: Vec<String>,
    pub format: String,
    /// Fall back to auto-generated captions when no manual track exists.
    pub include_automatic: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Mp3,
}

impl AudioCodec {
    pub fn as_str(self) -> &'static str {
        match self {
            AudioCodec::Mp3 => "mp3",
        }
    }
}

/// Work the engine performs after the download itself.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostProcessor {
    ExtractAudio { codec: AudioCodec, bitrate_kbps: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FetchConfig {
    pub output_dir: PathBuf,
    pub output_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub skip_download: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<SubtitleOptions>,
    pub write_comments: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub post_processors: Vec<PostProcessor>,
    pub default_search: String,
    /// Bind outgoing connections to IPv4.
    pub force_ipv4: bool,
}

impl FetchConfig {
    fn base(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            output_template: OUTPUT_TEMPLATE.to_owned(),
            format: None,
            skip_download: false,
            subtitles: None,
            write_comments: false,
            post_processors: Vec::new(),
            default_search: "auto".to_owned(),
            force_ipv4: true,
        }
    }

    /// Full output path pattern, template included.
    pub fn output_pattern(&self) -> PathBuf {
        self.output_dir.join(&self.output_template)
    }
}

/// Builds the engine configuration for `request`, writing into `output_dir`.
pub fn build_fetch_config(request: &DownloadRequest, output_dir: &Path) -> FetchConfig {
    let mut config = FetchConfig::base(output_dir);
    match request.kind() {
        DownloadKind::AudioOnly => {
            config.format = Some(AUDIO_FORMAT.to_owned());
            config.post_processors.push(PostProcessor::ExtractAudio {
                codec: AudioCodec::Mp3,
                bitrate_kbps: MP3_BITRATE_KBPS,
            });
        }
        DownloadKind::Transcript | DownloadKind::TranscriptPlain => {
            config.skip_download = true;
            config.subtitles = Some(SubtitleOptions {
                languages: vec![SUBTITLE_LANGUAGE.to_owned()],
                format: SUBTITLE_FORMAT.to_owned(),
                include_automatic: true,
            });
        }
        DownloadKind::Comments => {
            config.skip_download = true;
            config.write_comments = true;
        }
        DownloadKind::VideoAudio => {
            let quality = request.quality().unwrap_or_default();
            config.format = Some(video_format(quality).to_owned());
        }
    }
    config
}

fn video_format(quality: Quality) -> &'static str {
    match quality {
        Quality::Top => TOP_FORMAT,
        Quality::Medium720 => MEDIUM_720_FORMAT,
        Quality::Low => LOW_FORMAT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUALITIES: [Option<Quality>; 4] = [
        None,
        Some(Quality::Top),
        Some(Quality::Medium720),
        Some(Quality::Low),
    ];

    fn config_for(kind: DownloadKind, quality: Option<Quality>) -> FetchConfig {
        let request = DownloadRequest::new("https://example.com/watch?v=abc", kind, quality);
        build_fetch_config(&request, Path::new("/tmp/work"))
    }

    #[test]
    fn audio_only_extracts_mp3_regardless_of_quality() {
        for quality in QUALITIES {
            let config = config_for(DownloadKind::AudioOnly, quality);
            assert_eq!(config.format.as_deref(), Some("bestaudio/best"));
            assert_eq!(
                config.post_processors,
                vec![PostProcessor::ExtractAudio {
                    codec: AudioCodec::Mp3,
                    bitrate_kbps: 192,
                }]
            );
            assert!(!config.skip_download);
            assert!(config.subtitles.is_none());
            assert!(!config.write_comments);
        }
    }

    #[test]
    fn transcript_kinds_request_english_vtt() {
        for kind in [DownloadKind::Transcript, DownloadKind::TranscriptPlain] {
            for quality in QUALITIES {
                let config = config_for(kind, quality);
                assert!(config.skip_download);
                assert!(config.format.is_none());
                let subtitles = config.subtitles.expect("subtitle options");
                assert_eq!(subtitles.languages, vec!["en".to_string()]);
                assert_eq!(subtitles.format, "vtt");
                assert!(subtitles.include_automatic);
                assert!(!config.write_comments);
            }
        }
    }

    #[test]
    fn comments_skip_media_and_collect_comments() {
        for quality in QUALITIES {
            let config = config_for(DownloadKind::Comments, quality);
            assert!(config.skip_download);
            assert!(config.write_comments);
            assert!(config.format.is_none());
            assert!(config.subtitles.is_none());
            assert!(config.post_processors.is_empty());
        }
    }

    #[test]
    fn non_video_configs_ignore_quality() {
        for kind in [
            DownloadKind::AudioOnly,
            DownloadKind::Transcript,
            DownloadKind::TranscriptPlain,
            DownloadKind::Comments,
        ] {
            let baseline = config_for(kind, None);
            for quality in QUALITIES {
                assert_eq!(config_for(kind, quality), baseline);
            }
        }
    }

    #[test]
    fn medium_quality_caps_height() {
        let config = config_for(DownloadKind::VideoAudio, Some(Quality::Medium720));
        let format = config.format.unwrap();
        assert!(format.contains("height<=720"));
        assert!(format.ends_with("/best"));
    }

    #[test]
    fn top_and_missing_quality_share_unconstrained_selector() {
        let top = config_for(DownloadKind::VideoAudio, Some(Quality::Top));
        let missing = config_for(DownloadKind::VideoAudio, None);
        assert_eq!(top, missing);
        let format = top.format.unwrap();
        assert!(!format.contains("height"));
        assert!(format.starts_with("bestvideo"));
        assert!(format.ends_with("/best"));
    }

    #[test]
    fn low_quality_prefers_worst_streams() {
        let config = config_for(DownloadKind::VideoAudio, Some(Quality::Low));
        let format = config.format.unwrap();
        assert!(format.starts_with("worstvideo"));
        assert!(format.ends_with("/worst"));
    }

    #[test]
    fn output_pattern_is_scoped_to_directory() {
        let config = config_for(DownloadKind::VideoAudio, None);
        assert_eq!(
            config.output_pattern(),
            PathBuf::from("/tmp/work/%(title)s.%(ext)s")
        );
        assert_eq!(config.default_search, "auto");
        assert!(config.force_ipv4);
    }
}
