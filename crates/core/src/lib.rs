pub mod command;
pub mod config;
pub mod converter;
pub mod options;
pub mod parser;
pub mod process;
pub mod registry;
pub mod session;

pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
    LoggingConfig,
};
pub use converter::{
    ConversionResult, Converter, ConverterConfig, ConverterError, FailureKind, FfmpegConverter,
    MediaInfo, ProgressEvent, StreamDetails, StreamInfo, ThumbnailRequest,
};
pub use options::{resolve, AspectMode, AudioSpec, ConversionSpec, SubtitleSpec, VideoSpec};
pub use registry::{Registry, StreamKind};
pub use session::{CancelHandle, ConversionSession, SessionEvent, SessionState};
