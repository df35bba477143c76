//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use super::error::ConverterError;
use crate::options::FrameSize;
use crate::registry::StreamKind;

/// Information about a media file, as reported by ffprobe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container format as reported (e.g. "matroska,webm").
    pub format: String,
    pub format_long_name: Option<String>,
    /// Duration in seconds, 0.0 when unknown.
    pub duration_secs: f64,
    /// Overall bitrate in bits per second.
    pub bitrate: Option<u64>,
    pub size_bytes: Option<u64>,
    /// Container level tags.
    pub tags: BTreeMap<String, String>,
    /// Streams in file order.
    pub streams: Vec<StreamInfo>,
}

impl MediaInfo {
    /// First video stream that is not an attached picture.
    pub fn video(&self) -> Option<&StreamInfo> {
        self.streams
            .iter()
            .find(|s| matches!(s.details, StreamDetails::Video { attached_pic: false, .. }))
    }

    /// First audio stream.
    pub fn audio(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.kind() == StreamKind::Audio)
    }

    pub fn subtitles(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams.iter().filter(|s| s.kind() == StreamKind::Subtitle)
    }

    /// Video streams flagged as attached pictures (cover art).
    pub fn posters(&self) -> impl Iterator<Item = &StreamInfo> {
        self.streams
            .iter()
            .filter(|s| matches!(s.details, StreamDetails::Video { attached_pic: true, .. }))
    }

    /// Frame size of the main video stream, if known.
    pub fn frame_size(&self) -> Option<FrameSize> {
        match self.video()?.details {
            StreamDetails::Video {
                width: Some(width),
                height: Some(height),
                ..
            } if width > 0 && height > 0 => Some(FrameSize::new(width, height)),
            _ => None,
        }
    }

    /// Whether there is at least one audio or non-poster video stream.
    pub fn has_media_streams(&self) -> bool {
        self.video().is_some() || self.audio().is_some()
    }
}

/// A single elementary stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub index: u32,
    /// Codec name (e.g. "h264").
    pub codec: String,
    pub codec_long_name: Option<String>,
    pub duration_secs: Option<f64>,
    pub tags: BTreeMap<String, String>,
    pub details: StreamDetails,
}

impl StreamInfo {
    pub fn kind(&self) -> StreamKind {
        match self.details {
            StreamDetails::Video { .. } => StreamKind::Video,
            StreamDetails::Audio { .. } => StreamKind::Audio,
            StreamDetails::Subtitle => StreamKind::Subtitle,
        }
    }

    /// Stream language tag, if any.
    pub fn language(&self) -> Option<&str> {
        self.tags.get("language").map(String::as_str)
    }
}

/// Kind-specific stream attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDetails {
    Video {
        width: Option<u32>,
        height: Option<u32>,
        fps: Option<f64>,
        bitrate: Option<u64>,
        /// Cover art rather than a real video track.
        attached_pic: bool,
    },
    Audio {
        sample_rate: Option<u32>,
        channels: Option<u32>,
        bitrate: Option<u64>,
    },
    Subtitle,
}

/// One progress report from a running transcode.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Media time processed so far, in seconds.
    pub elapsed_secs: f64,
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    /// Processing speed relative to real time.
    pub speed: Option<f64>,
    /// Percentage complete (0-100), when the input duration is known.
    pub percent: Option<f64>,
}

impl ProgressEvent {
    /// Fills `percent` from the total input duration.
    pub fn with_duration(mut self, total_secs: f64) -> Self {
        if total_secs > 0.0 {
            self.percent = Some((self.elapsed_secs / total_secs * 100.0).clamp(0.0, 100.0));
        }
        self
    }
}

/// Category of a failed conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    TranscodeFailed,
    Timeout,
    MalformedOutput,
    Cancelled,
    Io,
    SpawnFailed,
}

impl From<&ConverterError> for FailureKind {
    fn from(err: &ConverterError) -> Self {
        match err {
            ConverterError::Timeout { .. } => Self::Timeout,
            ConverterError::UnparsableProgress { .. } | ConverterError::MalformedProbeOutput { .. } => {
                Self::MalformedOutput
            }
            ConverterError::Cancelled => Self::Cancelled,
            ConverterError::Io(_) => Self::Io,
            ConverterError::ProcessSpawnFailed { .. } => Self::SpawnFailed,
            _ => Self::TranscodeFailed,
        }
    }
}

/// Final outcome of a conversion session.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionResult {
    Success {
        output_path: PathBuf,
        /// Wall-clock time from start to exit.
        elapsed: Duration,
    },
    Failure {
        kind: FailureKind,
        message: String,
        /// Last bytes of the diagnostic stream.
        tail: String,
    },
}

impl ConversionResult {
    pub(crate) fn failure(err: &ConverterError, tail: String) -> Self {
        Self::Failure {
            kind: FailureKind::from(err),
            message: err.to_string(),
            tail,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Converts into a `Result`, mapping failures back to [`ConverterError`].
    pub fn into_result(self) -> Result<PathBuf, ConverterError> {
        match self {
            Self::Success { output_path, .. } => Ok(output_path),
            Self::Failure { kind, message, tail } => Err(match kind {
                FailureKind::Cancelled => ConverterError::Cancelled,
                FailureKind::Io => ConverterError::Io(std::io::Error::other(message)),
                _ => ConverterError::transcode_failed(message, tail),
            }),
        }
    }
}

/// Default JPEG quality for thumbnails (ffmpeg's `-q:v` scale, lower is better).
pub const DEFAULT_THUMBNAIL_QUALITY: u32 = 4;

/// A still frame to extract from a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailRequest {
    /// Offset into the input, in seconds.
    pub time_secs: f64,
    pub output: PathBuf,
    #[serde(default)]
    pub size: Option<FrameSize>,
    /// JPEG quality, 2 (best) to 31 (worst).
    #[serde(default = "default_quality")]
    pub quality: u32,
}

fn default_quality() -> u32 {
    DEFAULT_THUMBNAIL_QUALITY
}

impl ThumbnailRequest {
    pub fn new(time_secs: f64, output: impl Into<PathBuf>) -> Self {
        Self {
            time_secs,
            output: output.into(),
            size: None,
            quality: DEFAULT_THUMBNAIL_QUALITY,
        }
    }

    pub fn with_size(mut self, size: FrameSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ConverterError> {
        if !self.time_secs.is_finite() || self.time_secs < 0.0 {
            return Err(ConverterError::invalid_spec(format!(
                "thumbnail time must be a non-negative number, got {}",
                self.time_secs
            )));
        }
        if !(2..=31).contains(&self.quality) {
            return Err(ConverterError::invalid_spec(format!(
                "thumbnail quality must be in 2..=31, got {}",
                self.quality
            )));
        }
        if let Some(size) = self.size {
            if size.width == 0 || size.height == 0 {
                return Err(ConverterError::invalid_spec("thumbnail size must be positive"));
            }
        }
        Ok(())
    }
}
