//! Conversion sessions: one transcode process with a progress event stream.
//!
//! ```text
//! Idle ──start──▶ Running ──exit 0──────────────▶ Completed
//!                    │──nonzero exit / timeout / ──▶ Failed
//!                    │  unparsable output
//!                    └──cancel──────────────────▶ Cancelled
//! ```

mod conversion;
mod types;

pub use conversion::ConversionSession;
pub use types::{CancelHandle, SessionConfig, SessionEvent, SessionState};
