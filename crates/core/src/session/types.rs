use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::converter::{ConversionResult, ConverterConfig, ProgressEvent};
use crate::parser::DEFAULT_TAIL_BYTES;

/// Lifecycle of a conversion session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Runtime limits for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Longest stretch with neither output nor exit. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Time between the termination request and the hard kill.
    pub cancel_grace: Duration,
    /// Consecutive unrecognized lines tolerated; `None` is unlimited.
    pub max_unparsed_lines: Option<usize>,
    /// Diagnostic bytes kept for failure reports.
    pub tail_bytes: usize,
    /// Kill the process on timeout instead of detaching from it.
    pub kill_on_timeout: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(30)),
            cancel_grace: Duration::from_secs(5),
            max_unparsed_lines: None,
            tail_bytes: DEFAULT_TAIL_BYTES,
            kill_on_timeout: false,
        }
    }
}

impl SessionConfig {
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn with_max_unparsed_lines(mut self, max: Option<usize>) -> Self {
        self.max_unparsed_lines = max;
        self
    }

    pub fn with_tail_bytes(mut self, bytes: usize) -> Self {
        self.tail_bytes = bytes;
        self
    }

    pub fn with_kill_on_timeout(mut self, kill: bool) -> Self {
        self.kill_on_timeout = kill;
        self
    }
}

impl From<&ConverterConfig> for SessionConfig {
    fn from(config: &ConverterConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            cancel_grace: Duration::from_millis(config.cancel_grace_ms),
            max_unparsed_lines: config.max_unparsed_lines,
            tail_bytes: config.tail_bytes,
            kill_on_timeout: config.kill_on_timeout,
        }
    }
}

/// Requests cancellation of a session from any task.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub(super) fn new(tx: Arc<watch::Sender<bool>>) -> Self {
        Self { tx }
    }

    /// Signals the session. Takes effect at its next suspension point.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Item of [`super::ConversionSession::into_stream`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    /// Always the last item.
    Finished(ConversionResult),
}
