//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

use super::capabilities::EncoderCapabilities;
use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{ConversionResult, MediaInfo, ThumbnailRequest};
use crate::command::{probe_args, CommandBuilder};
use crate::options::{resolve, ConversionSpec, ResolvedOptions, StreamPlan};
use crate::parser::ProbeParser;
use crate::process::{Companion, DiagnosticStream, ProcessRunner};
use crate::registry::Registry;
use crate::session::{ConversionSession, SessionConfig};

/// Shortest input accepted for conversion, in seconds.
const MIN_DURATION_SECS: f64 = 0.01;

/// FFmpeg-based converter implementation.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    config: ConverterConfig,
    registry: Arc<Registry>,
    builder: CommandBuilder,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter using the built-in registry.
    pub fn new(config: ConverterConfig) -> Self {
        Self::with_registry(config, Registry::builtin().clone())
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Creates a converter with an explicit registry.
    pub fn with_registry(config: ConverterConfig, registry: Registry) -> Self {
        let builder = CommandBuilder::new()
            .with_log_level(config.ffmpeg_log_level.clone())
            .with_extra_args(config.extra_ffmpeg_args.clone());
        Self {
            config,
            registry: Arc::new(registry),
            builder,
        }
    }

    /// Creates a converter, loading the registry from `registry_path` if configured.
    pub fn from_config(config: ConverterConfig) -> Result<Self, ConverterError> {
        let registry = match &config.registry_path {
            Some(path) => Registry::from_path(path)?,
            None => Registry::builtin().clone(),
        };
        Ok(Self::with_registry(config, registry))
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encoders available in the configured ffmpeg.
    pub async fn capabilities(&self) -> EncoderCapabilities {
        EncoderCapabilities::detect(&self.config).await
    }

    fn ffmpeg(&self) -> ProcessRunner {
        ProcessRunner::new(&self.config.ffmpeg_path)
    }

    fn session(&self, args: Vec<String>, input: &Path, output: &Path) -> ConversionSession {
        ConversionSession::new(self.ffmpeg(), args, output)
            .with_config(SessionConfig::from(&self.config))
            .with_input(input)
    }

    /// Resolves `spec`, filling in the source geometry from `info` when the
    /// caller did not give one.
    fn resolve_with_source(
        &self,
        spec: &ConversionSpec,
        options: ResolvedOptions,
        info: &MediaInfo,
    ) -> Result<ResolvedOptions, ConverterError> {
        let needs_source = matches!(&options.video, StreamPlan::Encode(v) if v.source.is_none());
        let Some(size) = info.frame_size().filter(|_| needs_source) else {
            return Ok(options);
        };

        let mut spec = spec.clone();
        if let Some(video) = spec.video.as_mut() {
            video.source_width = Some(size.width);
            video.source_height = Some(size.height);
        }
        resolve(&self.registry, &spec)
    }

    async fn ensure_parent_dir(path: &Path) -> Result<(), ConverterError> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    debug!(path = %parent.display(), error = %e, "Failed to create output directory");
                    ConverterError::OutputDirectoryFailed {
                        path: parent.to_path_buf(),
                    }
                })
            }
            _ => Ok(()),
        }
    }

    async fn check_version(program: &Path) -> Result<(), ConverterError> {
        let output = Command::new(program)
            .arg("-version")
            .output()
            .await
            .map_err(|e| ConverterError::ProcessSpawnFailed {
                program: program.to_path_buf(),
                reason: if e.kind() == std::io::ErrorKind::NotFound {
                    "executable not found".to_string()
                } else {
                    e.to_string()
                },
            })?;

        if !output.status.success() {
            return Err(ConverterError::ProcessSpawnFailed {
                program: program.to_path_buf(),
                reason: format!("-version exited with {}", output.status),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(
            program = %program.display(),
            version = stdout.lines().next().unwrap_or_default(),
            "Found executable"
        );
        Ok(())
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, ConverterError> {
        if !path.exists() {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let mut handle = ProcessRunner::new(&self.config.ffprobe_path)
            .with_diagnostic_stream(DiagnosticStream::Stdout)
            .with_companion(Companion::Capture(self.config.tail_bytes))
            .start(&probe_args(path))?;

        let mut parser = ProbeParser::new();
        let run = async {
            while let Some(chunk) = handle.read_chunk().await? {
                parser.feed(&chunk);
            }
            handle.wait(None).await
        };

        let status = match self.config.probe_timeout() {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, run).await;
                match outcome {
                    Ok(status) => status?,
                    Err(_) => {
                        if let Err(e) = handle.cancel(self.config.cancel_grace()).await {
                            debug!(error = %e, "Failed to stop ffprobe");
                        }
                        return Err(ConverterError::Timeout {
                            timeout_secs: limit.as_secs(),
                        });
                    }
                }
            }
            None => run.await?,
        };

        if !status.success() {
            let stderr = handle.companion_tail().await.unwrap_or_default();
            let reason = stderr
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .last()
                .map(str::to_string)
                .unwrap_or_else(|| format!("ffprobe exited with {}", status));
            return Err(ConverterError::probe_failed(reason));
        }

        let info = parser.finish()?;
        debug!(
            path = %path.display(),
            format = %info.format,
            duration_secs = info.duration_secs,
            streams = info.streams.len(),
            "Probed media file"
        );
        Ok(info)
    }

    async fn convert(
        &self,
        spec: &ConversionSpec,
        input: &Path,
        output: &Path,
    ) -> Result<ConversionSession, ConverterError> {
        let mut options = resolve(&self.registry, spec)?;

        if !input.exists() {
            return Err(ConverterError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        let mut duration = None;
        if self.config.probe_input {
            let info = self.probe(input).await?;
            if !info.has_media_streams() {
                return Err(ConverterError::probe_failed(
                    "input has no audio or video streams",
                ));
            }
            if info.duration_secs < MIN_DURATION_SECS {
                return Err(ConverterError::probe_failed("zero-length media"));
            }
            duration = Some(info.duration_secs);
            options = self.resolve_with_source(spec, options, &info)?;
        }

        let args = self.builder.build(&options, input, output)?;
        Self::ensure_parent_dir(output).await?;

        debug!(?args, "Built ffmpeg arguments");
        info!(
            input = %input.display(),
            output = %output.display(),
            format = %options.format.name,
            "Prepared conversion"
        );

        let session = self.session(args, input, output);
        Ok(match duration {
            Some(secs) => session.with_duration(secs),
            None => session,
        })
    }

    async fn thumbnails(
        &self,
        input: &Path,
        requests: &[ThumbnailRequest],
    ) -> Result<Vec<PathBuf>, ConverterError> {
        if !input.exists() {
            return Err(ConverterError::InputNotFound {
                path: input.to_path_buf(),
            });
        }

        let args = self.builder.thumbnail_args(input, requests)?;
        for request in requests {
            Self::ensure_parent_dir(&request.output).await?;
        }

        let mut session = self.session(args, input, &requests[0].output);
        if let ConversionResult::Failure { message, .. } = session.finish().await {
            return Err(ConverterError::ThumbnailFailed { reason: message });
        }

        requests
            .iter()
            .map(|request| {
                if request.output.exists() {
                    Ok(request.output.clone())
                } else {
                    Err(ConverterError::ThumbnailFailed {
                        reason: format!("{} was not created", request.output.display()),
                    })
                }
            })
            .collect()
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Self::check_version(&self.config.ffmpeg_path).await?;
        Self::check_version(&self.config.ffprobe_path).await?;
        Ok(())
    }
}
