//! Caller-facing conversion spec and its resolved form.

use serde::{Deserialize, Serialize};

use crate::converter::ConverterError;
use crate::registry::{
    AudioCodecEntry, FormatEntry, SubtitleCodecEntry, VideoCodecEntry, COPY_CODEC, NONE_CODEC,
};

/// How to reconcile a requested frame size with the source aspect ratio.
///
/// Only takes effect when both target dimensions and the source geometry are known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectMode {
    /// Scale to the requested size, distorting if needed.
    #[default]
    Stretch,
    /// Scale to cover the requested size, then crop the excess.
    Crop,
    /// Scale to fit inside the requested size, then pad with black bars.
    Pad,
}

impl AspectMode {
    fn is_stretch(&self) -> bool {
        *self == Self::Stretch
    }
}

/// A requested transcode.
///
/// Unknown keys are rejected when deserializing, so typos surface as
/// [`ConverterError::InvalidSpecification`] instead of being ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionSpec {
    /// Target container identifier (e.g. "mkv").
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<SubtitleSpec>,
}

impl ConversionSpec {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            video: None,
            audio: None,
            subtitle: None,
        }
    }

    pub fn with_video(mut self, video: VideoSpec) -> Self {
        self.video = Some(video);
        self
    }

    pub fn with_audio(mut self, audio: AudioSpec) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_subtitle(mut self, subtitle: SubtitleSpec) -> Self {
        self.subtitle = Some(subtitle);
        self
    }

    /// Parses a spec from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConverterError> {
        serde_json::from_str(json).map_err(|e| ConverterError::invalid_spec(e.to_string()))
    }

    /// Parses a spec from TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConverterError> {
        toml::from_str(toml_str).map_err(|e| ConverterError::invalid_spec(e.to_string()))
    }
}

/// Video stream request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VideoSpec {
    /// Codec identifier, or "copy"/"none".
    pub codec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    /// Target bitrate in kbps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
    /// Constant rate factor, alternative to `bitrate`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crf: Option<u32>,
    /// Upper bound on width, keeping the aspect ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    /// Upper bound on height, keeping the aspect ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
    #[serde(default, skip_serializing_if = "AspectMode::is_stretch")]
    pub mode: AspectMode,
    #[serde(default, alias = "src_width", skip_serializing_if = "Option::is_none")]
    pub source_width: Option<u32>,
    #[serde(default, alias = "src_height", skip_serializing_if = "Option::is_none")]
    pub source_height: Option<u32>,
}

impl VideoSpec {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            ..Default::default()
        }
    }

    /// No video stream in the output.
    pub fn none() -> Self {
        Self::new(NONE_CODEC)
    }

    /// Copy the source video stream unchanged.
    pub fn copy() -> Self {
        Self::new(COPY_CODEC)
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = Some(kbps);
        self
    }

    pub fn with_crf(mut self, crf: u32) -> Self {
        self.crf = Some(crf);
        self
    }

    pub fn with_max_size(mut self, max_width: Option<u32>, max_height: Option<u32>) -> Self {
        self.max_width = max_width;
        self.max_height = max_height;
        self
    }

    pub fn with_mode(mut self, mode: AspectMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_source(mut self, width: u32, height: u32) -> Self {
        self.source_width = Some(width);
        self.source_height = Some(height);
        self
    }

    pub(crate) fn has_parameters(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.fps.is_some()
            || self.bitrate.is_some()
            || self.crf.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
            || self.mode != AspectMode::Stretch
    }
}

/// Audio stream request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioSpec {
    /// Codec identifier, or "copy"/"none".
    pub codec: String,
    #[serde(default, alias = "samplerate", skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u32>,
    /// Target bitrate in kbps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u32>,
}

impl AudioSpec {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
            ..Default::default()
        }
    }

    pub fn none() -> Self {
        Self::new(NONE_CODEC)
    }

    pub fn copy() -> Self {
        Self::new(COPY_CODEC)
    }

    pub fn with_sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = Some(hz);
        self
    }

    pub fn with_channels(mut self, channels: u32) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = Some(kbps);
        self
    }

    pub(crate) fn has_parameters(&self) -> bool {
        self.sample_rate.is_some() || self.channels.is_some() || self.bitrate.is_some()
    }
}

/// Subtitle stream request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubtitleSpec {
    pub codec: String,
}

impl SubtitleSpec {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            codec: codec.into(),
        }
    }
}

/// What happens to one stream kind in the output.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPlan<T> {
    /// Drop streams of this kind.
    Disabled,
    /// Copy the source stream without re-encoding.
    Copy,
    /// Re-encode with fully populated settings.
    Encode(T),
}

impl<T> StreamPlan<T> {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    pub fn encoded(&self) -> Option<&T> {
        match self {
            Self::Encode(inner) => Some(inner),
            _ => None,
        }
    }
}

/// Frame dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// Rate control for an encoded video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoQuality {
    /// Average bitrate in kbps.
    Bitrate(u32),
    /// Constant rate factor.
    Crf(u32),
}

/// Fully populated video settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedVideo {
    pub codec: VideoCodecEntry,
    /// `None` keeps the source width (or derives it from the source aspect).
    pub width: Option<u32>,
    /// `None` keeps the source height (or derives it from the source aspect).
    pub height: Option<u32>,
    /// `None` keeps the source frame rate.
    pub fps: Option<f64>,
    pub quality: VideoQuality,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub mode: AspectMode,
    pub source: Option<FrameSize>,
}

/// Fully populated audio settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub codec: AudioCodecEntry,
    /// `None` only for lossless codecs.
    pub bitrate_kbps: Option<u32>,
    pub sample_rate: u32,
    pub channels: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSubtitle {
    pub codec: SubtitleCodecEntry,
}

/// A validated, canonical option set.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOptions {
    pub format: FormatEntry,
    pub video: StreamPlan<ResolvedVideo>,
    pub audio: StreamPlan<ResolvedAudio>,
    pub subtitle: StreamPlan<ResolvedSubtitle>,
}

impl From<&ResolvedOptions> for ConversionSpec {
    fn from(options: &ResolvedOptions) -> Self {
        let video = match &options.video {
            StreamPlan::Disabled => VideoSpec::none(),
            StreamPlan::Copy => VideoSpec::copy(),
            StreamPlan::Encode(v) => VideoSpec {
                codec: v.codec.name.clone(),
                width: v.width,
                height: v.height,
                fps: v.fps,
                bitrate: match v.quality {
                    VideoQuality::Bitrate(kbps) => Some(kbps),
                    VideoQuality::Crf(_) => None,
                },
                crf: match v.quality {
                    VideoQuality::Crf(crf) => Some(crf),
                    VideoQuality::Bitrate(_) => None,
                },
                max_width: v.max_width,
                max_height: v.max_height,
                mode: v.mode,
                source_width: v.source.map(|s| s.width),
                source_height: v.source.map(|s| s.height),
            },
        };

        let audio = match &options.audio {
            StreamPlan::Disabled => AudioSpec::none(),
            StreamPlan::Copy => AudioSpec::copy(),
            StreamPlan::Encode(a) => AudioSpec {
                codec: a.codec.name.clone(),
                sample_rate: Some(a.sample_rate),
                channels: Some(a.channels),
                bitrate: a.bitrate_kbps,
            },
        };

        let subtitle = match &options.subtitle {
            StreamPlan::Disabled => SubtitleSpec::new(NONE_CODEC),
            StreamPlan::Copy => SubtitleSpec::new(COPY_CODEC),
            StreamPlan::Encode(s) => SubtitleSpec::new(s.codec.name.clone()),
        };

        Self {
            format: options.format.name.clone(),
            video: Some(video),
            audio: Some(audio),
            subtitle: Some(subtitle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_from_json_with_aliases() {
        let spec = ConversionSpec::from_json(
            r#"{
                "format": "mkv",
                "video": {"codec": "h264", "width": 720, "height": 400, "fps": 15, "src_width": 1280, "src_height": 720},
                "audio": {"codec": "mp3", "samplerate": 11025, "channels": 2}
            }"#,
        )
        .unwrap();

        let video = spec.video.unwrap();
        assert_eq!(video.width, Some(720));
        assert_eq!(video.fps, Some(15.0));
        assert_eq!(video.source_width, Some(1280));
        assert_eq!(spec.audio.unwrap().sample_rate, Some(11025));
    }

    #[test]
    fn test_spec_unknown_key_rejected() {
        let err = ConversionSpec::from_json(
            r#"{"format": "mkv", "video": {"codec": "h264", "resolution": "720p"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConverterError::InvalidSpecification { .. }));

        let err = ConversionSpec::from_json(r#"{"format": "mkv", "container": "x"}"#).unwrap_err();
        assert!(matches!(err, ConverterError::InvalidSpecification { .. }));
    }

    #[test]
    fn test_spec_from_toml() {
        let spec = ConversionSpec::from_toml(
            r#"
format = "webm"

[video]
codec = "vp9"
crf = 31
mode = "pad"

[audio]
codec = "opus"
"#,
        )
        .unwrap();
        let video = spec.video.unwrap();
        assert_eq!(video.crf, Some(31));
        assert_eq!(video.mode, AspectMode::Pad);
    }

    #[test]
    fn test_spec_builders() {
        let spec = ConversionSpec::new("mkv")
            .with_video(VideoSpec::new("h264").with_size(720, 400).with_fps(15.0))
            .with_audio(AudioSpec::new("mp3").with_sample_rate(11025).with_channels(2));
        assert_eq!(spec.video.as_ref().unwrap().height, Some(400));
        assert_eq!(spec.audio.as_ref().unwrap().channels, Some(2));
        assert!(spec.subtitle.is_none());
    }

    #[test]
    fn test_has_parameters() {
        assert!(!VideoSpec::copy().has_parameters());
        assert!(VideoSpec::copy().with_fps(24.0).has_parameters());
        assert!(!AudioSpec::none().has_parameters());
        assert!(AudioSpec::none().with_channels(1).has_parameters());
    }

    #[test]
    fn test_frame_size_aspect() {
        assert!((FrameSize::new(640, 480).aspect() - 4.0 / 3.0).abs() < 1e-9);
    }
}
