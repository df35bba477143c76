//! Launching ffmpeg/ffprobe and owning the resulting OS process.
//!
//! A [`ProcessHandle`] is released exactly once: reaped by [`ProcessHandle::wait`],
//! killed by [`ProcessHandle::cancel`], explicitly abandoned with
//! [`ProcessHandle::detach`], or killed when dropped unreleased.

mod handle;

pub use handle::ProcessHandle;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::converter::ConverterError;

/// Which output stream of the child carries the diagnostics we parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticStream {
    /// ffmpeg writes progress and errors to stderr.
    Stderr,
    /// ffprobe writes metadata to stdout.
    Stdout,
}

/// What to do with the stream that is not being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Companion {
    Discard,
    /// Drain it in a background task, keeping the last N bytes.
    Capture(usize),
}

/// Spawns a program with a fixed stream layout.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    diagnostic: DiagnosticStream,
    companion: Companion,
}

impl ProcessRunner {
    /// Runner that reads stderr and discards stdout.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            diagnostic: DiagnosticStream::Stderr,
            companion: Companion::Discard,
        }
    }

    pub fn with_diagnostic_stream(mut self, stream: DiagnosticStream) -> Self {
        self.diagnostic = stream;
        self
    }

    pub fn with_companion(mut self, companion: Companion) -> Self {
        self.companion = companion;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Starts the program. Stdin is always closed.
    pub fn start(&self, args: &[String]) -> Result<ProcessHandle, ConverterError> {
        debug!(program = %self.program.display(), ?args, "Spawning process");

        let companion_stdio = || match self.companion {
            Companion::Discard => Stdio::null(),
            Companion::Capture(_) => Stdio::piped(),
        };
        let (stdout, stderr) = match self.diagnostic {
            DiagnosticStream::Stderr => (companion_stdio(), Stdio::piped()),
            DiagnosticStream::Stdout => (Stdio::piped(), companion_stdio()),
        };

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|e| ConverterError::ProcessSpawnFailed {
                program: self.program.clone(),
                reason: if e.kind() == std::io::ErrorKind::NotFound {
                    "executable not found".to_string()
                } else {
                    e.to_string()
                },
            })?;

        ProcessHandle::new(child, self.program.clone(), self.diagnostic, self.companion)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let err = ProcessRunner::new("/nonexistent/ffmpeg-binary")
            .start(&[])
            .unwrap_err();
        match err {
            ConverterError::ProcessSpawnFailed { program, reason } => {
                assert_eq!(program, PathBuf::from("/nonexistent/ffmpeg-binary"));
                assert_eq!(reason, "executable not found");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reads_stderr_and_waits() {
        let mut handle = ProcessRunner::new("/bin/sh")
            .start(&sh("echo ignored; echo diag >&2; exit 3"))
            .unwrap();

        let mut output = Vec::new();
        while let Some(chunk) = handle.read_chunk().await.unwrap() {
            output.extend(chunk);
        }
        assert_eq!(String::from_utf8_lossy(&output), "diag\n");

        let status = handle.wait(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_reads_stdout_and_captures_companion() {
        let mut handle = ProcessRunner::new("/bin/sh")
            .with_diagnostic_stream(DiagnosticStream::Stdout)
            .with_companion(Companion::Capture(64))
            .start(&sh("echo out; echo oops >&2"))
            .unwrap();

        let mut output = Vec::new();
        while let Some(chunk) = handle.read_chunk().await.unwrap() {
            output.extend(chunk);
        }
        assert_eq!(String::from_utf8_lossy(&output), "out\n");

        handle.wait(None).await.unwrap();
        assert_eq!(handle.companion_tail().await.as_deref(), Some("oops\n"));
    }

    #[tokio::test]
    async fn test_wait_timeout_does_not_kill() {
        let mut handle = ProcessRunner::new("/bin/sh").start(&sh("sleep 30")).unwrap();

        let err = handle.wait(Some(Duration::from_millis(100))).await.unwrap_err();
        assert!(matches!(err, ConverterError::Timeout { .. }));
        assert!(!handle.is_released());

        // Still running, so cancellation has something to stop.
        handle.cancel(Duration::from_secs(2)).await.unwrap();
        assert!(handle.is_released());
    }

    #[tokio::test]
    async fn test_cancel_escalates_to_kill() {
        let mut handle = ProcessRunner::new("/bin/sh")
            .start(&sh("trap '' TERM; sleep 30"))
            .unwrap();
        // Give the shell time to install the trap.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = handle.cancel(Duration::from_millis(200)).await.unwrap();
        assert!(!status.success());
        assert!(handle.is_released());
    }
}
