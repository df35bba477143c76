//! Encoder availability detection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

use super::config::ConverterConfig;
use crate::registry::Registry;

/// Encoders compiled into the local ffmpeg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    pub encoders: BTreeSet<String>,
}

impl EncoderCapabilities {
    /// Detect available encoders by running `ffmpeg -encoders`.
    ///
    /// Returns an empty set when ffmpeg cannot be run.
    pub async fn detect(config: &ConverterConfig) -> Self {
        let output = Command::new(&config.ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Self::parse(&String::from_utf8_lossy(&o.stdout)),
            Ok(o) => {
                warn!(code = ?o.status.code(), "ffmpeg -encoders failed");
                Self::default()
            }
            Err(e) => {
                warn!(path = %config.ffmpeg_path.display(), error = %e, "Could not run ffmpeg");
                Self::default()
            }
        }
    }

    /// Parses the encoder table printed by `ffmpeg -encoders`.
    ///
    /// ```text
    /// Encoders:
    ///  V..... = Video
    ///  ------
    ///  V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
    ///  A....D aac                  AAC (Advanced Audio Coding)
    /// ```
    pub fn parse(output: &str) -> Self {
        let encoders = output
            .lines()
            .skip_while(|line| !line.trim_start().starts_with("------"))
            .skip(1)
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let flags = parts.next()?;
                let name = parts.next()?;
                (flags.len() == 6).then(|| name.to_string())
            })
            .collect();
        Self { encoders }
    }

    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.encoders.is_empty()
    }

    /// Registry encoders that this ffmpeg lacks, sorted.
    pub fn missing_encoders<'a>(&self, registry: &'a Registry) -> Vec<&'a str> {
        registry
            .encoders()
            .into_iter()
            .filter(|name| !self.has_encoder(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Encoders:
 V..... = Video
 A..... = Audio
 S..... = Subtitle
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D mpeg4                MPEG-4 part 2
 A....D aac                  AAC (Advanced Audio Coding)
 A....D flac                 FLAC (Free Lossless Audio Codec)
 S..... srt                  SubRip subtitle
";

    #[test]
    fn test_parse_encoders() {
        let caps = EncoderCapabilities::parse(SAMPLE);
        assert_eq!(caps.encoders.len(), 5);
        assert!(caps.has_encoder("libx264"));
        assert!(caps.has_encoder("srt"));
        // Legend lines are not encoders.
        assert!(!caps.has_encoder("="));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(EncoderCapabilities::parse("nothing useful\n").is_empty());
    }

    #[test]
    fn test_missing_encoders() {
        let registry = Registry::from_toml_str(
            r#"
[[video_codecs]]
name = "h264"
encoder = "libx264"

[[audio_codecs]]
name = "opus"
encoder = "libopus"
default_bitrate_kbps = 128
"#,
        )
        .unwrap();
        let caps = EncoderCapabilities::parse(SAMPLE);
        assert_eq!(caps.missing_encoders(&registry), vec!["libopus"]);
    }
}
