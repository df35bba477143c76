//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::parser::DEFAULT_TAIL_BYTES;

/// Configuration for the FFmpeg-based converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Longest time a transcode may go without output or exit, in seconds. 0 disables it.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Bound on a whole probe run, in seconds. 0 disables it.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Time between SIGTERM and SIGKILL when cancelling, in milliseconds.
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,

    /// Kill the transcoder on timeout instead of leaving it running.
    #[serde(default)]
    pub kill_on_timeout: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Additional global ffmpeg arguments.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,

    /// Diagnostic bytes kept for failure reports.
    #[serde(default = "default_tail_bytes")]
    pub tail_bytes: usize,

    /// Consecutive unrecognized progress lines tolerated. Unlimited when unset.
    #[serde(default)]
    pub max_unparsed_lines: Option<usize>,

    /// Probe inputs before converting (source geometry, duration, stream checks).
    #[serde(default = "default_probe_input")]
    pub probe_input: bool,

    /// Replacement codec/format table in TOML. The built-in table is used when unset.
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_cancel_grace() -> u64 {
    5000
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn default_tail_bytes() -> usize {
    DEFAULT_TAIL_BYTES
}

fn default_probe_input() -> bool {
    true
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            cancel_grace_ms: default_cancel_grace(),
            kill_on_timeout: false,
            ffmpeg_log_level: default_log_level(),
            extra_ffmpeg_args: Vec::new(),
            tail_bytes: default_tail_bytes(),
            max_unparsed_lines: None,
            probe_input: default_probe_input(),
            registry_path: None,
        }
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

impl ConverterConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the idle timeout in seconds (0 disables it).
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_probe_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.probe_timeout_secs = timeout_secs;
        self
    }

    pub fn with_cancel_grace_ms(mut self, grace_ms: u64) -> Self {
        self.cancel_grace_ms = grace_ms;
        self
    }

    pub fn with_kill_on_timeout(mut self, kill: bool) -> Self {
        self.kill_on_timeout = kill;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.ffmpeg_log_level = level.into();
        self
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_ffmpeg_args = args;
        self
    }

    pub fn with_max_unparsed_lines(mut self, max: Option<usize>) -> Self {
        self.max_unparsed_lines = max;
        self
    }

    pub fn with_probe_input(mut self, probe: bool) -> Self {
        self.probe_input = probe;
        self
    }

    pub fn with_registry_path(mut self, path: PathBuf) -> Self {
        self.registry_path = Some(path);
        self
    }

    /// The idle timeout, `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        secs(self.timeout_secs)
    }

    /// The probe timeout, `None` when disabled.
    pub fn probe_timeout(&self) -> Option<Duration> {
        secs(self.probe_timeout_secs)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}
