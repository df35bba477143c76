/// Longest line held in memory. Longer runs are cut into lines of this size.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Reassembles lines from arbitrarily split chunks.
///
/// Both `\n` and `\r` terminate a line, since ffmpeg redraws its progress
/// line with carriage returns. Empty lines are dropped and invalid UTF-8 is
/// replaced rather than rejected. No more than [`MAX_LINE_BYTES`] are ever
/// buffered.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.take_line(&mut lines);
            } else {
                self.pending.push(byte);
                if self.pending.len() >= MAX_LINE_BYTES {
                    self.take_line(&mut lines);
                }
            }
        }
        lines
    }

    /// Returns the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.take_line(&mut lines);
        lines.pop()
    }

    fn take_line(&mut self, lines: &mut Vec<String>) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).trim_end().to_string();
        self.pending.clear();
        if !line.is_empty() {
            lines.push(line);
        }
    }
}
