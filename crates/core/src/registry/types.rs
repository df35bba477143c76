//! Types for the codec/format registry.

use serde::{Deserialize, Serialize};

/// Kind of an elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    /// Flag that drops every stream of this kind from the output.
    pub fn disable_flag(&self) -> &'static str {
        match self {
            Self::Video => "-vn",
            Self::Audio => "-an",
            Self::Subtitle => "-sn",
        }
    }

    /// Flag selecting the encoder for this kind.
    pub fn codec_flag(&self) -> &'static str {
        match self {
            Self::Video => "-c:v",
            Self::Audio => "-c:a",
            Self::Subtitle => "-c:s",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Subtitle => "subtitle",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive numeric range accepted by an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub min: u32,
    pub max: u32,
}

impl Limits {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn contains_f64(&self, value: f64) -> bool {
        value >= self.min as f64 && value <= self.max as f64
    }
}

impl std::fmt::Display for Limits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// A container format the transcoder can mux into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatEntry {
    /// User-facing identifier (e.g. "mkv").
    pub name: String,
    /// Muxer name passed to `-f` (e.g. "matroska").
    pub muxer: String,
    /// Human readable description.
    #[serde(default)]
    pub description: String,
    /// Video codecs this container can hold.
    #[serde(default)]
    pub video: Vec<String>,
    /// Audio codecs this container can hold.
    #[serde(default)]
    pub audio: Vec<String>,
    /// Subtitle codecs this container can hold.
    #[serde(default)]
    pub subtitle: Vec<String>,
}

impl FormatEntry {
    /// Codec identifiers permitted for the given stream kind.
    pub fn codecs(&self, kind: StreamKind) -> &[String] {
        match kind {
            StreamKind::Video => &self.video,
            StreamKind::Audio => &self.audio,
            StreamKind::Subtitle => &self.subtitle,
        }
    }
}

/// A video encoder with its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoCodecEntry {
    /// User-facing identifier (e.g. "h264").
    pub name: String,
    /// Encoder name passed to `-c:v` (e.g. "libx264").
    pub encoder: String,
    /// Encoder rejects odd widths/heights.
    #[serde(default)]
    pub even_dimensions: bool,
    /// CRF range, if the encoder has a constant-quality mode.
    #[serde(default)]
    pub crf: Option<Limits>,
    /// Bitrate used when the caller gives neither bitrate nor CRF.
    #[serde(default = "default_video_bitrate")]
    pub default_bitrate_kbps: u32,
    #[serde(default = "default_width_limits")]
    pub width: Limits,
    #[serde(default = "default_height_limits")]
    pub height: Limits,
    #[serde(default = "default_fps_limits")]
    pub fps: Limits,
    #[serde(default = "default_video_bitrate_limits")]
    pub bitrate_kbps: Limits,
    /// The encoder loses the display aspect unless it is repeated in `-vf`.
    #[serde(default)]
    pub aspect_filter: bool,
    /// Arguments always passed after the encoder selection.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// An audio encoder with its constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioCodecEntry {
    pub name: String,
    pub encoder: String,
    /// `None` for lossless encoders, which take no bitrate.
    #[serde(default)]
    pub default_bitrate_kbps: Option<u32>,
    #[serde(default = "default_sample_rate")]
    pub default_sample_rate: u32,
    #[serde(default = "default_channels")]
    pub default_channels: u32,
    #[serde(default = "default_audio_bitrate_limits")]
    pub bitrate_kbps: Limits,
    #[serde(default = "default_sample_rate_limits")]
    pub sample_rate: Limits,
    /// Discrete sample rates; empty means any value inside `sample_rate`.
    #[serde(default)]
    pub sample_rates: Vec<u32>,
    #[serde(default = "default_channel_limits")]
    pub channels: Limits,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl AudioCodecEntry {
    pub fn is_lossless(&self) -> bool {
        self.default_bitrate_kbps.is_none()
    }

    pub fn accepts_sample_rate(&self, rate: u32) -> bool {
        self.sample_rate.contains(rate)
            && (self.sample_rates.is_empty() || self.sample_rates.contains(&rate))
    }
}

/// A subtitle encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleCodecEntry {
    pub name: String,
    pub encoder: String,
}

fn default_video_bitrate() -> u32 {
    1000
}

fn default_width_limits() -> Limits {
    Limits::new(16, 4000)
}

fn default_height_limits() -> Limits {
    Limits::new(16, 3000)
}

fn default_fps_limits() -> Limits {
    Limits::new(1, 120)
}

fn default_video_bitrate_limits() -> Limits {
    Limits::new(16, 15000)
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_channels() -> u32 {
    2
}

fn default_audio_bitrate_limits() -> Limits {
    Limits::new(8, 512)
}

fn default_sample_rate_limits() -> Limits {
    Limits::new(1000, 50000)
}

fn default_channel_limits() -> Limits {
    Limits::new(1, 12)
}
