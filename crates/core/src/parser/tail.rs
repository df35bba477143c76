use std::collections::VecDeque;
use std::path::Path;

/// Default number of diagnostic bytes kept for error reports.
pub const DEFAULT_TAIL_BYTES: usize = 4096;

/// Keeps the last `capacity` bytes of a stream.
#[derive(Debug, Clone)]
pub struct DiagnosticTail {
    buf: VecDeque<u8>,
    capacity: usize,
}

impl Default for DiagnosticTail {
    fn default() -> Self {
        Self::new(DEFAULT_TAIL_BYTES)
    }
}

impl DiagnosticTail {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(64 * 1024)),
            capacity,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        if self.capacity == 0 {
            return;
        }
        let chunk = if chunk.len() > self.capacity {
            &chunk[chunk.len() - self.capacity..]
        } else {
            chunk
        };
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.capacity);
        self.buf.drain(..overflow);
        self.buf.extend(chunk);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The retained bytes, lossily decoded.
    pub fn text(&self) -> String {
        let (a, b) = self.buf.as_slices();
        let mut bytes = Vec::with_capacity(a.len() + b.len());
        bytes.extend_from_slice(a);
        bytes.extend_from_slice(b);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Last non-empty line of the retained text.
    pub fn last_line(&self) -> Option<String> {
        self.text()
            .split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .map(str::to_string)
    }
}

/// Explains a failed transcode from the last diagnostic line.
///
/// ffmpeg ends with a line naming the cause: a signal, an error prefixed
/// by the input path, or an "Error while ..." line.
pub fn failure_reason(tail: &DiagnosticTail, input: Option<&Path>, exit_code: Option<i32>) -> String {
    let exit = match exit_code {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    };

    let Some(line) = tail.last_line() else {
        return exit;
    };

    if line.starts_with("Received signal") {
        let signal = line.split(':').next().unwrap_or(&line);
        return format!("{} ({})", signal, exit);
    }

    if let Some(input) = input {
        let prefix = format!("{}: ", input.display());
        if let Some(rest) = line.strip_prefix(&prefix) {
            return format!("encoding error: {}", rest);
        }
    }

    if line.starts_with("Error while ") {
        return format!("encoding error: {}", line);
    }

    format!("{}: {}", exit, line)
}
