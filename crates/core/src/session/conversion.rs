use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::Stream;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{CancelHandle, SessionConfig, SessionEvent, SessionState};
use crate::converter::{ConversionResult, ConverterError, ProgressEvent};
use crate::parser::{failure_reason, DiagnosticTail, ProgressParser};
use crate::process::{ProcessHandle, ProcessRunner};

enum ReadOutcome {
    Chunk(Vec<u8>),
    Eof,
    Cancelled,
    Failed(ConverterError),
    TimedOut,
}

/// One transcode, from spawn to terminal state.
///
/// Progress is pulled with [`next_event`](Self::next_event) (which starts
/// the process on first use) or consumed as a stream with
/// [`into_stream`](Self::into_stream). Once the session reaches a terminal
/// state its process has been released and [`finish`](Self::finish)
/// returns the outcome.
pub struct ConversionSession {
    id: Uuid,
    runner: ProcessRunner,
    args: Vec<String>,
    input: Option<PathBuf>,
    output: PathBuf,
    duration_secs: Option<f64>,
    config: SessionConfig,
    state: SessionState,
    handle: Option<ProcessHandle>,
    parser: ProgressParser,
    tail: DiagnosticTail,
    pending: VecDeque<ProgressEvent>,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    started_at: Option<Instant>,
    result: Option<ConversionResult>,
}

impl std::fmt::Debug for ConversionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionSession")
            .field("id", &self.id)
            .field("program", &self.runner.program())
            .field("state", &self.state)
            .field("output", &self.output)
            .finish()
    }
}

impl ConversionSession {
    /// Creates an idle session that will run `runner` with `args`.
    pub fn new(runner: ProcessRunner, args: Vec<String>, output: impl Into<PathBuf>) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let config = SessionConfig::default();
        Self {
            id: Uuid::new_v4(),
            runner,
            args,
            input: None,
            output: output.into(),
            duration_secs: None,
            parser: ProgressParser::new().with_max_unparsed_lines(config.max_unparsed_lines),
            tail: DiagnosticTail::new(config.tail_bytes),
            config,
            state: SessionState::Idle,
            handle: None,
            pending: VecDeque::new(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            started_at: None,
            result: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.parser = ProgressParser::new().with_max_unparsed_lines(config.max_unparsed_lines);
        self.tail = DiagnosticTail::new(config.tail_bytes);
        self.config = config;
        self
    }

    /// Input path, used to recognize input-related errors in the diagnostics.
    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Total input duration, enabling `percent` on progress events.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = (secs > 0.0).then_some(secs);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// OS process id while running.
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|h| h.id())
    }

    /// The outcome, once terminal.
    pub fn result(&self) -> Option<&ConversionResult> {
        self.result.as_ref()
    }

    /// A handle that cancels this session from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.cancel_tx))
    }

    /// Spawns the process. Only valid in the `Idle` state.
    ///
    /// A spawn failure moves the session to `Failed` and is also returned.
    pub fn start(&mut self) -> Result<(), ConverterError> {
        if self.state != SessionState::Idle {
            return Err(ConverterError::invalid_state(format!(
                "cannot start a session that is {}",
                self.state
            )));
        }

        self.started_at = Some(Instant::now());
        match self.runner.start(&self.args) {
            Ok(handle) => {
                info!(session_id = %self.id, pid = ?handle.id(), output = %self.output.display(), "Conversion started");
                self.handle = Some(handle);
                self.state = SessionState::Running;
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Conversion failed to start");
                self.state = SessionState::Failed;
                self.result = Some(ConversionResult::failure(&e, String::new()));
                Err(e)
            }
        }
    }

    /// Next progress event, in emission order; `None` once the session is terminal.
    ///
    /// Starts the session if it is still idle.
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match self.state {
                SessionState::Idle => {
                    if *self.cancel_rx.borrow_and_update() {
                        self.mark_cancelled();
                        return None;
                    }
                    if self.start().is_err() {
                        return None;
                    }
                }
                SessionState::Running => {}
                _ => return None,
            }

            match self.read().await {
                ReadOutcome::Chunk(chunk) => self.handle_chunk(&chunk).await,
                ReadOutcome::Eof => self.complete().await,
                ReadOutcome::Cancelled => {
                    self.stop_cancelled().await;
                    return None;
                }
                ReadOutcome::Failed(e) => self.fail_and_stop(e).await,
                ReadOutcome::TimedOut => self.time_out().await,
            }
        }
    }

    /// Cancels the session. The process is asked to stop and killed after
    /// the grace period. No-op once terminal.
    pub async fn cancel(&mut self) {
        self.cancel_tx.send_replace(true);
        match self.state {
            SessionState::Idle => self.mark_cancelled(),
            SessionState::Running => self.stop_cancelled().await,
            _ => {}
        }
    }

    /// Runs the session to its end, discarding remaining progress events.
    pub async fn finish(&mut self) -> ConversionResult {
        while self.next_event().await.is_some() {}
        match &self.result {
            Some(result) => result.clone(),
            None => ConversionResult::failure(
                &ConverterError::invalid_state("session ended without a result"),
                String::new(),
            ),
        }
    }

    /// Consumes the session as a stream of progress events ending with the result.
    pub fn into_stream(self) -> impl Stream<Item = SessionEvent> + Send {
        futures::stream::unfold(Some(self), |session| async move {
            let mut session = session?;
            match session.next_event().await {
                Some(event) => Some((SessionEvent::Progress(event), Some(session))),
                None => {
                    let result = session.finish().await;
                    Some((SessionEvent::Finished(result), None))
                }
            }
        })
    }

    async fn read(&mut self) -> ReadOutcome {
        if *self.cancel_rx.borrow_and_update() {
            return ReadOutcome::Cancelled;
        }
        let Some(handle) = self.handle.as_mut() else {
            return ReadOutcome::Failed(ConverterError::invalid_state("running session has no process"));
        };

        let idle_timeout = self.config.idle_timeout;
        let read = async {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, handle.read_chunk()).await.ok(),
                None => Some(handle.read_chunk().await),
            }
        };

        tokio::select! {
            biased;
            changed = self.cancel_rx.changed() => {
                if changed.is_ok() && *self.cancel_rx.borrow_and_update() {
                    ReadOutcome::Cancelled
                } else {
                    // Spurious wake-up; the next loop iteration reads again.
                    ReadOutcome::Chunk(Vec::new())
                }
            }
            outcome = read => match outcome {
                Some(Ok(Some(chunk))) => ReadOutcome::Chunk(chunk),
                Some(Ok(None)) => ReadOutcome::Eof,
                Some(Err(e)) => ReadOutcome::Failed(e),
                None => ReadOutcome::TimedOut,
            },
        }
    }

    async fn handle_chunk(&mut self, chunk: &[u8]) {
        if chunk.is_empty() {
            return;
        }
        self.tail.push(chunk);
        match self.parser.feed(chunk) {
            Ok(events) => self.push_events(events),
            Err(e) => self.fail_and_stop(e).await,
        }
    }

    fn push_events(&mut self, events: Vec<ProgressEvent>) {
        for event in events {
            let event = match self.duration_secs {
                Some(total) => event.with_duration(total),
                None => event,
            };
            self.pending.push_back(event);
        }
    }

    /// Diagnostic stream closed: flush the parser and reap the process.
    async fn complete(&mut self) {
        match self.parser.finish() {
            Ok(events) => self.push_events(events),
            Err(e) => return self.fail_and_stop(e).await,
        }

        let Some(mut handle) = self.handle.take() else {
            return;
        };

        let idle_timeout = self.config.idle_timeout;
        let waited = if *self.cancel_rx.borrow_and_update() {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel_requested(&mut self.cancel_rx) => None,
                status = handle.wait(idle_timeout) => Some(status),
            }
        };
        let Some(waited) = waited else {
            self.handle = Some(handle);
            return self.stop_cancelled().await;
        };

        match waited {
            Ok(status) if status.success() => {
                let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
                info!(
                    session_id = %self.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    events = self.parser.event_count(),
                    "Conversion completed"
                );
                self.state = SessionState::Completed;
                self.result = Some(ConversionResult::Success {
                    output_path: self.output.clone(),
                    elapsed,
                });
            }
            Ok(status) => {
                let reason = failure_reason(&self.tail, self.input.as_deref(), status.code());
                warn!(session_id = %self.id, code = ?status.code(), reason = %reason, "Conversion failed");
                self.fail(ConverterError::transcode_failed(reason, self.tail.text()));
            }
            Err(ConverterError::Timeout { .. }) => {
                self.handle = Some(handle);
                self.time_out().await;
            }
            Err(e) => {
                self.handle = Some(handle);
                self.fail_and_stop(e).await;
            }
        }
    }

    async fn time_out(&mut self) {
        let timeout_secs = self.config.idle_timeout.map(|d| d.as_secs()).unwrap_or(0);
        if let Some(mut handle) = self.handle.take() {
            if self.config.kill_on_timeout {
                warn!(session_id = %self.id, pid = ?handle.id(), timeout_secs, "Conversion timed out, killing process");
                if let Err(e) = handle.cancel(self.config.cancel_grace).await {
                    debug!(session_id = %self.id, error = %e, "Failed to stop timed out process");
                }
            } else {
                warn!(session_id = %self.id, pid = ?handle.id(), timeout_secs, "Conversion timed out, leaving process running");
                handle.detach();
            }
        }
        self.fail(ConverterError::Timeout { timeout_secs });
    }

    async fn fail_and_stop(&mut self, error: ConverterError) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.cancel(self.config.cancel_grace).await {
                debug!(session_id = %self.id, error = %e, "Failed to stop process");
            }
        }
        warn!(session_id = %self.id, error = %error, "Conversion failed");
        self.fail(error);
    }

    async fn stop_cancelled(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.cancel(self.config.cancel_grace).await {
                debug!(session_id = %self.id, error = %e, "Failed to stop cancelled process");
            }
        }
        self.mark_cancelled();
    }

    fn mark_cancelled(&mut self) {
        info!(session_id = %self.id, "Conversion cancelled");
        self.pending.clear();
        self.state = SessionState::Cancelled;
        self.result = Some(ConversionResult::failure(
            &ConverterError::Cancelled,
            self.tail.text(),
        ));
    }

    fn fail(&mut self, error: ConverterError) {
        self.state = SessionState::Failed;
        self.result = Some(ConversionResult::failure(&error, self.tail.text()));
    }
}

/// Resolves once a cancel has been requested.
async fn cancel_requested(rx: &mut watch::Receiver<bool>) {
    while rx.changed().await.is_ok() {
        if *rx.borrow_and_update() {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::converter::FailureKind;
    use futures::StreamExt;
    use std::time::Duration;

    fn sh_session(script: &str) -> ConversionSession {
        ConversionSession::new(
            ProcessRunner::new("/bin/sh"),
            vec!["-c".to_string(), script.to_string()],
            "/tmp/out.mkv",
        )
    }

    const PROGRESS: &str = "printf 'frame=1 time=00:00:01.00 bitrate=1.0kbits/s\\r' >&2; \
        printf 'frame=2 time=00:00:02.00 bitrate=1.0kbits/s\\r' >&2; \
        printf 'video:1kB audio:0kB subtitle:0kB\\n' >&2";

    #[tokio::test]
    async fn test_successful_session() {
        let mut session = sh_session(PROGRESS).with_duration(4.0);
        assert_eq!(session.state(), SessionState::Idle);

        let first = session.next_event().await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(first.elapsed_secs, 1.0);
        assert_eq!(first.percent, Some(25.0));

        let second = session.next_event().await.unwrap();
        assert_eq!(second.frame, Some(2));

        assert!(session.next_event().await.is_none());
        assert_eq!(session.state(), SessionState::Completed);
        assert!(session.next_event().await.is_none());

        match session.finish().await {
            ConversionResult::Success { output_path, .. } => {
                assert_eq!(output_path, PathBuf::from("/tmp/out.mkv"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid() {
        let mut session = sh_session("exit 0");
        session.start().unwrap();
        let err = session.start().unwrap_err();
        assert!(matches!(err, ConverterError::InvalidState { .. }));
        assert!(session.finish().await.is_success());

        let err = session.start().unwrap_err();
        assert!(matches!(err, ConverterError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails_with_tail() {
        let mut session = sh_session("echo 'Error while opening encoder' >&2; exit 1");
        let result = session.finish().await;
        assert_eq!(session.state(), SessionState::Failed);
        match result {
            ConversionResult::Failure { kind, message, tail } => {
                assert_eq!(kind, FailureKind::TranscodeFailed);
                assert!(message.contains("Error while opening encoder"));
                assert!(tail.contains("Error while opening encoder"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let mut session = ConversionSession::new(
            ProcessRunner::new("/nonexistent/ffmpeg"),
            Vec::new(),
            "/tmp/out.mkv",
        );
        assert!(session.next_event().await.is_none());
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(
            session.result(),
            Some(ConversionResult::Failure { kind: FailureKind::SpawnFailed, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let mut session = sh_session("exit 0");
        session.cancel_handle().cancel();
        assert!(session.next_event().await.is_none());
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(session.pid().is_none());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_exit() {
        // Diagnostic stream closes early, the process keeps running.
        let mut session = sh_session("printf 'frame=1 time=00:00:01.00\\r' >&2; exec 2>&-; sleep 30")
            .with_config(SessionConfig::default().with_cancel_grace(Duration::from_secs(2)));
        assert!(session.next_event().await.is_some());

        let cancel = session.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        let started = std::time::Instant::now();
        assert!(session.next_event().await.is_none());
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(matches!(
            session.finish().await,
            ConversionResult::Failure { kind: FailureKind::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancel_from_other_task() {
        let mut session = sh_session("printf 'frame=1 time=00:00:01.00\\r' >&2; sleep 30")
            .with_config(SessionConfig::default().with_cancel_grace(Duration::from_secs(2)));
        assert!(session.next_event().await.is_some());

        let cancel = session.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel.cancel();
        });

        assert!(session.next_event().await.is_none());
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(matches!(
            session.finish().await,
            ConversionResult::Failure { kind: FailureKind::Cancelled, .. }
        ));
    }

    #[tokio::test]
    async fn test_idle_timeout_detaches() {
        let mut session = sh_session("sleep 5").with_config(
            SessionConfig::default().with_idle_timeout(Some(Duration::from_millis(200))),
        );
        let started = Instant::now();
        let result = session.finish().await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(matches!(result, ConversionResult::Failure { kind: FailureKind::Timeout, .. }));
    }

    #[tokio::test]
    async fn test_unparsable_progress() {
        let mut session = sh_session("echo a >&2; echo b >&2; echo c >&2; sleep 30").with_config(
            SessionConfig::default()
                .with_max_unparsed_lines(Some(2))
                .with_cancel_grace(Duration::from_secs(2)),
        );
        let result = session.finish().await;
        assert!(matches!(
            result,
            ConversionResult::Failure { kind: FailureKind::MalformedOutput, .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_ends_with_result() {
        let session = sh_session(PROGRESS);
        let events: Vec<SessionEvent> = session.into_stream().collect().await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SessionEvent::Progress(_)));
        assert!(matches!(events[2], SessionEvent::Finished(ConversionResult::Success { .. })));
    }
}
