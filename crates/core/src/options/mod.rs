//! Conversion options: the caller's spec and the resolver that validates it.

mod resolver;
mod types;

pub use resolver::resolve;
pub use types::{
    AspectMode, AudioSpec, ConversionSpec, FrameSize, ResolvedAudio, ResolvedOptions,
    ResolvedSubtitle, ResolvedVideo, StreamPlan, SubtitleSpec, VideoQuality, VideoSpec,
};
