//! Translates resolved options into ffmpeg/ffprobe argument vectors.
//!
//! Arguments are always passed to the child as a vector, never through a
//! shell, so paths with spaces or quotes need no escaping.

mod geometry;

pub use geometry::{bound_filter, correct, Geometry};

use std::path::Path;

use crate::converter::{ConverterError, ThumbnailRequest};
use crate::options::{
    ResolvedAudio, ResolvedOptions, ResolvedSubtitle, ResolvedVideo, StreamPlan, VideoQuality,
};
use crate::registry::{StreamKind, COPY_CODEC};

/// Default `-loglevel` for transcodes.
pub const DEFAULT_LOG_LEVEL: &str = "warning";

/// Arguments that make ffprobe print `[FORMAT]`/`[STREAM]` blocks for `path`,
/// keeping errors on stderr.
pub fn probe_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// Builds ffmpeg argument vectors.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    log_level: String,
    extra_args: Vec<String>,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Global arguments inserted before the input.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Builds the transcode argument vector.
    ///
    /// Global flags come first, then the input, then per-stream options,
    /// the container and finally the output path. The same options always
    /// produce the same vector.
    pub fn build(
        &self,
        options: &ResolvedOptions,
        input: &Path,
        output: &Path,
    ) -> Result<Vec<String>, ConverterError> {
        check_combination(options)?;

        let mut args = self.global_args();
        // -stats keeps the progress line coming even at quiet log levels
        args.push("-stats".to_string());
        args.extend(self.extra_args.iter().cloned());

        // Input
        args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);

        // Video
        match &options.video {
            StreamPlan::Disabled => args.push(StreamKind::Video.disable_flag().to_string()),
            StreamPlan::Copy => args.extend(copy_args(StreamKind::Video)),
            StreamPlan::Encode(video) => args.extend(video_args(video)),
        }

        // Audio
        match &options.audio {
            StreamPlan::Disabled => args.push(StreamKind::Audio.disable_flag().to_string()),
            StreamPlan::Copy => args.extend(copy_args(StreamKind::Audio)),
            StreamPlan::Encode(audio) => args.extend(audio_args(audio)),
        }

        // Subtitles
        match &options.subtitle {
            StreamPlan::Disabled => args.push(StreamKind::Subtitle.disable_flag().to_string()),
            StreamPlan::Copy => args.extend(copy_args(StreamKind::Subtitle)),
            StreamPlan::Encode(subtitle) => args.extend(subtitle_args(subtitle)),
        }

        // Container
        args.extend(["-f".to_string(), options.format.muxer.clone()]);

        // Output
        args.push(output.to_string_lossy().to_string());

        Ok(args)
    }

    /// Builds a single ffmpeg run that grabs one still frame per request.
    pub fn thumbnail_args(
        &self,
        input: &Path,
        requests: &[ThumbnailRequest],
    ) -> Result<Vec<String>, ConverterError> {
        if requests.is_empty() {
            return Err(ConverterError::ThumbnailFailed {
                reason: "no thumbnails requested".to_string(),
            });
        }

        let mut args = self.global_args();
        args.extend(self.extra_args.iter().cloned());
        args.extend(["-i".to_string(), input.to_string_lossy().to_string()]);

        for request in requests {
            request.validate()?;

            args.extend(["-ss".to_string(), request.time_secs.to_string()]);
            args.push("-an".to_string());
            if let Some(size) = request.size {
                args.extend(["-s".to_string(), format!("{}x{}", size.width, size.height)]);
            }
            args.extend([
                "-frames:v".to_string(),
                "1".to_string(),
                "-q:v".to_string(),
                request.quality.to_string(),
                "-f".to_string(),
                "image2".to_string(),
                request.output.to_string_lossy().to_string(),
            ]);
        }

        Ok(args)
    }

    fn global_args(&self) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-nostdin".to_string(),
            "-y".to_string(),
            "-loglevel".to_string(),
            self.log_level.clone(),
        ]
    }
}

/// Re-checks combinations the resolver normally rejects, for options
/// constructed by hand.
fn check_combination(options: &ResolvedOptions) -> Result<(), ConverterError> {
    if options.video.is_disabled() && options.audio.is_disabled() {
        return Err(ConverterError::unsupported(
            "output would contain neither video nor audio",
        ));
    }

    for (kind, disabled) in [
        (StreamKind::Video, options.video.is_disabled()),
        (StreamKind::Audio, options.audio.is_disabled()),
        (StreamKind::Subtitle, options.subtitle.is_disabled()),
    ] {
        if !disabled && options.format.codecs(kind).is_empty() {
            return Err(ConverterError::unsupported(format!(
                "format '{}' cannot hold {} streams",
                options.format.name, kind
            )));
        }
    }

    if let StreamPlan::Encode(video) = &options.video {
        if (video.width.is_some() || video.height.is_some())
            && (video.max_width.is_some() || video.max_height.is_some())
        {
            return Err(ConverterError::unsupported(
                "explicit size and maximum size are mutually exclusive",
            ));
        }
        if let VideoQuality::Crf(_) = video.quality {
            if video.codec.crf.is_none() {
                return Err(ConverterError::unsupported(format!(
                    "codec '{}' has no CRF mode",
                    video.codec.name
                )));
            }
        }
        if video.codec.even_dimensions {
            for dim in [video.width, video.height].into_iter().flatten() {
                if dim % 2 != 0 {
                    return Err(ConverterError::unsupported(format!(
                        "codec '{}' requires even dimensions, got {}",
                        video.codec.name, dim
                    )));
                }
            }
        }
        let geometry = correct(
            video.source,
            video.width,
            video.height,
            video.mode,
            video.codec.even_dimensions,
        );
        if let Some(size) = geometry.size {
            if !video.codec.width.contains(size.width) || !video.codec.height.contains(size.height) {
                return Err(ConverterError::unsupported(format!(
                    "computed frame size {}x{} is outside the limits of codec '{}' (width {}, height {})",
                    size.width, size.height, video.codec.name, video.codec.width, video.codec.height
                )));
            }
        }
    }

    if let StreamPlan::Encode(audio) = &options.audio {
        if audio.codec.is_lossless() && audio.bitrate_kbps.is_some() {
            return Err(ConverterError::unsupported(format!(
                "lossless codec '{}' takes no bitrate",
                audio.codec.name
            )));
        }
    }

    Ok(())
}

fn copy_args(kind: StreamKind) -> [String; 2] {
    [kind.codec_flag().to_string(), COPY_CODEC.to_string()]
}

fn video_args(video: &ResolvedVideo) -> Vec<String> {
    let codec = &video.codec;
    let mut args = vec![
        StreamKind::Video.codec_flag().to_string(),
        codec.encoder.clone(),
    ];

    // Frame rate
    if let Some(fps) = video.fps {
        args.extend(["-r".to_string(), fps.to_string()]);
    }

    // Rate control
    match video.quality {
        VideoQuality::Bitrate(kbps) => {
            args.extend(["-b:v".to_string(), format!("{}k", kbps)]);
        }
        VideoQuality::Crf(crf) => {
            args.extend(["-crf".to_string(), crf.to_string()]);
            // libvpx only honours CRF in constrained-quality mode with b:v 0
            if codec.encoder.starts_with("libvpx") {
                args.extend(["-b:v".to_string(), "0".to_string()]);
            }
        }
    }

    // Frame size
    let geometry = correct(
        video.source,
        video.width,
        video.height,
        video.mode,
        codec.even_dimensions,
    );
    if let Some(size) = geometry.size {
        args.extend(["-s".to_string(), format!("{}x{}", size.width, size.height)]);
    }
    if let (Some(w), Some(h)) = (video.width, video.height) {
        args.extend(["-aspect".to_string(), format!("{}:{}", w, h)]);
    }

    // Filters
    let mut filters = Vec::new();
    if codec.aspect_filter {
        if let Some(size) = geometry.size {
            filters.push(format!("setdar={}/{}", size.width, size.height));
        }
    }
    filters.extend(geometry.filter);
    filters.extend(bound_filter(
        video.max_width,
        video.max_height,
        codec.even_dimensions,
    ));
    if !filters.is_empty() {
        args.extend(["-vf".to_string(), filters.join(",")]);
    }

    args.extend(codec.extra_args.iter().cloned());
    args
}

fn audio_args(audio: &ResolvedAudio) -> Vec<String> {
    let mut args = vec![
        StreamKind::Audio.codec_flag().to_string(),
        audio.codec.encoder.clone(),
        "-ac".to_string(),
        audio.channels.to_string(),
    ];

    // Bitrate (lossy only)
    if let Some(kbps) = audio.bitrate_kbps {
        args.extend(["-b:a".to_string(), format!("{}k", kbps)]);
    }

    args.extend(["-ar".to_string(), audio.sample_rate.to_string()]);
    args.extend(audio.codec.extra_args.iter().cloned());
    args
}

fn subtitle_args(subtitle: &ResolvedSubtitle) -> [String; 2] {
    [
        StreamKind::Subtitle.codec_flag().to_string(),
        subtitle.codec.encoder.clone(),
    ]
}
