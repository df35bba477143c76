use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Companion, DiagnosticStream};
use crate::converter::ConverterError;
use crate::parser::DiagnosticTail;

static LIVE_HANDLES: AtomicUsize = AtomicUsize::new(0);

const CHUNK_SIZE: usize = 4096;

type Reader = Box<dyn AsyncRead + Send + Unpin>;

/// Exclusive owner of one running process.
pub struct ProcessHandle {
    child: Child,
    program: PathBuf,
    pid: Option<u32>,
    reader: Option<Reader>,
    companion: Option<JoinHandle<DiagnosticTail>>,
    released: bool,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("program", &self.program)
            .field("pid", &self.pid)
            .field("released", &self.released)
            .finish()
    }
}

impl ProcessHandle {
    pub(super) fn new(
        mut child: Child,
        program: PathBuf,
        diagnostic: DiagnosticStream,
        companion: Companion,
    ) -> Result<Self, ConverterError> {
        let stdout = child.stdout.take().map(|s| Box::new(s) as Reader);
        let stderr = child.stderr.take().map(|s| Box::new(s) as Reader);
        let (reader, other) = match diagnostic {
            DiagnosticStream::Stderr => (stderr, stdout),
            DiagnosticStream::Stdout => (stdout, stderr),
        };

        // Keep the companion pipe from filling up and blocking the child.
        let companion = match (companion, other) {
            (Companion::Capture(bytes), Some(mut stream)) => Some(tokio::spawn(async move {
                let mut tail = DiagnosticTail::new(bytes);
                let mut buf = [0u8; CHUNK_SIZE];
                loop {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => tail.push(&buf[..n]),
                    }
                }
                tail
            })),
            _ => None,
        };

        let pid = child.id();
        LIVE_HANDLES.fetch_add(1, Ordering::SeqCst);
        debug!(program = %program.display(), ?pid, "Process started");

        let handle = Self {
            child,
            program,
            pid,
            reader,
            companion,
            released: false,
        };

        // Unreachable with the runner's stdio setup; dropping the handle kills the child.
        if handle.reader.is_none() {
            return Err(ConverterError::Io(std::io::Error::other(
                "diagnostic stream was not captured",
            )));
        }

        Ok(handle)
    }

    /// Number of handles that have not been released yet, process-wide.
    pub fn live_handles() -> usize {
        LIVE_HANDLES.load(Ordering::SeqCst)
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Reads the next chunk of the diagnostic stream; `None` at end of stream.
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, ConverterError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        let mut buf = vec![0u8; CHUNK_SIZE];
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            self.reader = None;
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    /// Waits for the process to exit, reaping it.
    ///
    /// On timeout the process is left running and the handle stays owned.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<ExitStatus, ConverterError> {
        let status = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.child.wait())
                .await
                .map_err(|_| ConverterError::Timeout {
                    timeout_secs: limit.as_secs(),
                })??,
            None => self.child.wait().await?,
        };
        self.release();
        debug!(program = %self.program.display(), pid = ?self.pid, code = ?status.code(), "Process exited");
        Ok(status)
    }

    /// Asks the process to terminate, killing it after `grace`.
    pub async fn cancel(&mut self, grace: Duration) -> Result<ExitStatus, ConverterError> {
        if let Some(status) = self.child.try_wait()? {
            self.release();
            return Ok(status);
        }

        if !self.terminate() {
            self.child.start_kill()?;
        }

        let status = match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(
                    program = %self.program.display(),
                    pid = ?self.pid,
                    grace_ms = grace.as_millis() as u64,
                    "Process ignored termination request, killing"
                );
                self.child.kill().await?;
                self.child.wait().await?
            }
        };
        self.release();
        Ok(status)
    }

    /// Gives up ownership without stopping the process.
    pub fn detach(mut self) -> Option<u32> {
        warn!(program = %self.program.display(), pid = ?self.pid, "Detaching from running process");
        self.release();
        self.pid
    }

    /// Tail of the captured companion stream, once it has closed.
    pub async fn companion_tail(&mut self) -> Option<String> {
        let task = self.companion.take()?;
        task.await.ok().map(|tail| tail.text())
    }

    #[cfg(unix)]
    fn terminate(&self) -> bool {
        let Some(pid) = self.pid else {
            return false;
        };
        // SAFETY: pid belongs to a child we have not reaped yet.
        unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
    }

    #[cfg(not(unix))]
    fn terminate(&self) -> bool {
        false
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            LIVE_HANDLES.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.released {
            debug!(program = %self.program.display(), pid = ?self.pid, "Killing unreleased process");
            let _ = self.child.start_kill();
            self.release();
        }
        if let Some(task) = self.companion.take() {
            task.abort();
        }
    }
}
