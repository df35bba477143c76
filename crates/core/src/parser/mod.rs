//! Parsers for ffprobe metadata and ffmpeg progress output.
//!
//! Both parsers are incremental: chunks can be split anywhere, including in
//! the middle of a line or a multi-byte character.

mod lines;
mod probe;
mod progress;
mod tail;

pub use lines::{LineBuffer, MAX_LINE_BYTES};
pub use probe::ProbeParser;
pub use progress::{parse_line, parse_timecode, ProgressLine, ProgressParser};
pub use tail::{failure_reason, DiagnosticTail, DEFAULT_TAIL_BYTES};
