//! Converter module for probing and transcoding media files.
//!
//! This module provides the `Converter` trait and its FFmpeg implementation,
//! which ties together option resolution, command building, the process
//! runner and the output parsers.
//!
//! # Example
//!
//! ```ignore
//! use transcoder_core::converter::{Converter, FfmpegConverter};
//! use transcoder_core::options::{AudioSpec, ConversionSpec, VideoSpec};
//!
//! let converter = FfmpegConverter::with_defaults();
//!
//! // Validate ffmpeg is available
//! converter.validate().await?;
//!
//! // Probe a media file
//! let info = converter.probe(Path::new("/path/to/input.avi")).await?;
//! println!("Duration: {} seconds", info.duration_secs);
//!
//! // Convert to Matroska
//! let spec = ConversionSpec::new("mkv")
//!     .with_video(VideoSpec::new("h264").with_size(720, 400).with_fps(15.0))
//!     .with_audio(AudioSpec::new("mp3").with_sample_rate(11025).with_channels(2));
//!
//! let mut session = converter
//!     .convert(&spec, Path::new("/path/to/input.avi"), Path::new("/path/to/output.mkv"))
//!     .await?;
//! while let Some(progress) = session.next_event().await {
//!     println!("{:.1}s", progress.elapsed_secs);
//! }
//! let output = session.finish().await.into_result()?;
//! ```

mod capabilities;
mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use capabilities::EncoderCapabilities;
pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{
    ConversionResult, FailureKind, MediaInfo, ProgressEvent, StreamDetails, StreamInfo,
    ThumbnailRequest, DEFAULT_THUMBNAIL_QUALITY,
};
