use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::debug;

use super::lines::LineBuffer;
use crate::converter::{ConverterError, ProgressEvent};

static TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"time=\s*(-?[0-9:.]+)").unwrap());
static FRAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());
static FPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"fps=\s*([0-9.]+)").unwrap());
static BITRATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"bitrate=\s*([0-9.]+)\s*kbits/s").unwrap());
static SPEED: Lazy<Regex> = Lazy::new(|| Regex::new(r"speed=\s*([0-9.e+]+)x").unwrap());
static SUMMARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"^video:\s*\S+\s+audio:").unwrap());

/// Classification of one diagnostic line.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    /// A status line with a usable timestamp.
    Progress(ProgressEvent),
    /// A status line without a timestamp yet (`time=N/A`).
    Pending,
    /// The final `video:... audio:...` size summary.
    Summary,
    /// Anything else: warnings, stream mapping, banners.
    Unrecognized,
}

/// Parses `HH:MM:SS.ss`, `MM:SS` or plain seconds. Negative values clamp to 0.
pub fn parse_timecode(value: &str) -> Option<f64> {
    let (negative, value) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let mut secs = 0.0;
    for part in value.split(':') {
        let part: f64 = part.parse().ok()?;
        secs = secs * 60.0 + part;
    }
    if !secs.is_finite() {
        return None;
    }
    Some(if negative { 0.0 } else { secs })
}

fn capture<T: std::str::FromStr>(re: &Regex, line: &str) -> Option<T> {
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Classifies a single line of ffmpeg's diagnostic stream.
pub fn parse_line(line: &str) -> ProgressLine {
    let line = line.trim();

    if SUMMARY.is_match(line) {
        return ProgressLine::Summary;
    }
    if !line.contains("time=") {
        return ProgressLine::Unrecognized;
    }

    let Some(elapsed_secs) = TIME
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_timecode(m.as_str()))
    else {
        return ProgressLine::Pending;
    };

    ProgressLine::Progress(ProgressEvent {
        elapsed_secs,
        frame: capture(&FRAME, line),
        fps: capture(&FPS, line),
        bitrate_kbps: capture(&BITRATE, line),
        speed: capture(&SPEED, line),
        percent: None,
    })
}

/// Incremental parser for ffmpeg's progress output.
///
/// Lines are terminated by `\r` or `\n`. Unrecognized lines are skipped;
/// with a tolerance set, that many consecutive unrecognized lines make the
/// stream unparsable.
#[derive(Debug, Default)]
pub struct ProgressParser {
    lines: LineBuffer,
    max_unparsed_lines: Option<usize>,
    unparsed_run: usize,
    summary_seen: bool,
    events: u64,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many consecutive unrecognized lines are tolerated (`None` = unlimited).
    pub fn with_max_unparsed_lines(mut self, max: Option<usize>) -> Self {
        self.max_unparsed_lines = max;
        self
    }

    /// Feeds a chunk, returning the events it completed in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<ProgressEvent>, ConverterError> {
        let lines = self.lines.push(chunk);
        self.handle_lines(lines)
    }

    /// Flushes the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Result<Vec<ProgressEvent>, ConverterError> {
        let lines: Vec<String> = self.lines.finish().into_iter().collect();
        self.handle_lines(lines)
    }

    /// Whether the end-of-run summary line has been seen.
    pub fn saw_summary(&self) -> bool {
        self.summary_seen
    }

    /// Number of progress events emitted so far.
    pub fn event_count(&self) -> u64 {
        self.events
    }

    fn handle_lines(&mut self, lines: Vec<String>) -> Result<Vec<ProgressEvent>, ConverterError> {
        let mut events = Vec::new();
        for line in lines {
            match parse_line(&line) {
                ProgressLine::Progress(event) => {
                    self.unparsed_run = 0;
                    self.events += 1;
                    events.push(event);
                }
                ProgressLine::Pending => self.unparsed_run = 0,
                ProgressLine::Summary => {
                    self.unparsed_run = 0;
                    self.summary_seen = true;
                }
                ProgressLine::Unrecognized => {
                    self.unparsed_run += 1;
                    debug!(line = %line, "Skipping unrecognized ffmpeg output");
                    if let Some(max) = self.max_unparsed_lines {
                        if self.unparsed_run > max {
                            return Err(ConverterError::UnparsableProgress {
                                skipped: self.unparsed_run,
                            });
                        }
                    }
                }
            }
        }
        Ok(events)
    }
}
