use std::collections::BTreeMap;

use tracing::debug;

use super::lines::LineBuffer;
use crate::converter::{ConverterError, MediaInfo, StreamDetails, StreamInfo};

type Fields = BTreeMap<String, String>;

#[derive(Debug)]
enum Section {
    Outside,
    Format(Fields),
    Stream(Fields),
}

/// Incremental parser for ffprobe's default `-show_format -show_streams` output.
///
/// ```text
/// [STREAM]
/// index=0
/// codec_name=h264
/// codec_type=video
/// width=1280
/// ...
/// [/STREAM]
/// [FORMAT]
/// format_name=matroska,webm
/// duration=60.000000
/// TAG:title=Example
/// [/FORMAT]
/// ```
#[derive(Debug)]
pub struct ProbeParser {
    lines: LineBuffer,
    section: Section,
    format: Option<Fields>,
    streams: Vec<Fields>,
}

impl Default for ProbeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbeParser {
    pub fn new() -> Self {
        Self {
            lines: LineBuffer::new(),
            section: Section::Outside,
            format: None,
            streams: Vec::new(),
        }
    }

    /// Feeds a chunk of probe output.
    pub fn feed(&mut self, chunk: &[u8]) {
        for line in self.lines.push(chunk) {
            self.handle_line(&line);
        }
    }

    /// Finishes parsing and builds the [`MediaInfo`].
    pub fn finish(mut self) -> Result<MediaInfo, ConverterError> {
        if let Some(line) = self.lines.finish() {
            self.handle_line(&line);
        }

        match self.section {
            Section::Outside => {}
            Section::Format(_) => return Err(ConverterError::malformed_probe("unterminated [FORMAT] block")),
            Section::Stream(_) => return Err(ConverterError::malformed_probe("unterminated [STREAM] block")),
        }

        let format = self
            .format
            .ok_or_else(|| ConverterError::malformed_probe("no [FORMAT] block in probe output"))?;

        let streams = self.streams.iter().filter_map(build_stream).collect();

        let (tags, fields) = split_tags(format);
        Ok(MediaInfo {
            format: fields.get("format_name").cloned().unwrap_or_default(),
            format_long_name: fields.get("format_long_name").cloned(),
            duration_secs: parse_num::<f64>(&fields, "duration")
                .filter(|d| d.is_finite() && *d >= 0.0)
                .unwrap_or(0.0),
            bitrate: parse_num(&fields, "bit_rate"),
            size_bytes: parse_num(&fields, "size"),
            tags,
            streams,
        })
    }

    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        match line {
            "[FORMAT]" => {
                self.section = Section::Format(Fields::new());
                return;
            }
            "[STREAM]" => {
                self.section = Section::Stream(Fields::new());
                return;
            }
            "[/FORMAT]" | "[/STREAM]" => {
                match std::mem::replace(&mut self.section, Section::Outside) {
                    Section::Format(fields) => self.format = Some(fields),
                    Section::Stream(fields) => self.streams.push(fields),
                    Section::Outside => debug!(line, "Closing tag outside of a block"),
                }
                return;
            }
            _ => {}
        }

        let fields = match &mut self.section {
            Section::Format(fields) | Section::Stream(fields) => fields,
            Section::Outside => {
                debug!(line, "Ignoring probe line outside of a block");
                return;
            }
        };

        if let Some((key, value)) = line.split_once('=') {
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
}

/// Separates `TAG:` entries (lowercased keys) from plain fields.
fn split_tags(fields: Fields) -> (BTreeMap<String, String>, Fields) {
    let mut tags = BTreeMap::new();
    let mut rest = Fields::new();
    for (key, value) in fields {
        match key.strip_prefix("TAG:") {
            Some(tag) => {
                tags.insert(tag.to_lowercase(), value);
            }
            None => {
                rest.insert(key, value);
            }
        }
    }
    (tags, rest)
}

/// Parses a numeric field; "N/A" and garbage yield `None`.
fn parse_num<T: std::str::FromStr>(fields: &Fields, key: &str) -> Option<T> {
    fields.get(key).and_then(|v| v.parse().ok())
}

/// Parses a frame rate like "30000/1001" or "25".
fn parse_rate(value: &str) -> Option<f64> {
    let rate = match value.split_once('/') {
        Some((n, d)) => {
            let n: f64 = n.trim().parse().ok()?;
            let d: f64 = d.trim().parse().ok()?;
            if d == 0.0 {
                return None;
            }
            n / d
        }
        None => value.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn build_stream(fields: &Fields) -> Option<StreamInfo> {
    let (tags, fields) = split_tags(fields.clone());

    let details = match fields.get("codec_type").map(String::as_str) {
        Some("video") => StreamDetails::Video {
            width: parse_num(&fields, "width"),
            height: parse_num(&fields, "height"),
            fps: fields
                .get("r_frame_rate")
                .and_then(|r| parse_rate(r))
                .or_else(|| fields.get("avg_frame_rate").and_then(|r| parse_rate(r))),
            bitrate: parse_num(&fields, "bit_rate"),
            attached_pic: fields
                .get("DISPOSITION:attached_pic")
                .is_some_and(|v| v == "1"),
        },
        Some("audio") => StreamDetails::Audio {
            sample_rate: parse_num(&fields, "sample_rate"),
            channels: parse_num(&fields, "channels"),
            bitrate: parse_num(&fields, "bit_rate"),
        },
        Some("subtitle") => StreamDetails::Subtitle,
        other => {
            debug!(codec_type = ?other, "Skipping stream of unsupported type");
            return None;
        }
    };

    Some(StreamInfo {
        index: parse_num(&fields, "index").unwrap_or(0),
        codec: fields
            .get("codec_name")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string()),
        codec_long_name: fields.get("codec_long_name").cloned(),
        duration_secs: parse_num::<f64>(&fields, "duration").filter(|d| d.is_finite()),
        tags,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamKind;

    const SAMPLE: &str = "\
[STREAM]
index=0
codec_name=h264
codec_long_name=H.264 / AVC / MPEG-4 AVC / MPEG-4 part 10
codec_type=video
width=1280
height=720
r_frame_rate=30000/1001
bit_rate=N/A
duration=N/A
DISPOSITION:attached_pic=0
TAG:language=und
[/STREAM]
[STREAM]
index=1
codec_name=aac
codec_type=audio
sample_rate=48000
channels=2
bit_rate=128000
TAG:LANGUAGE=eng
[/STREAM]
[STREAM]
index=2
codec_name=subrip
codec_type=subtitle
[/STREAM]
[STREAM]
index=3
codec_name=ttf
codec_type=attachment
[/STREAM]
[STREAM]
index=4
codec_name=mjpeg
codec_type=video
width=600
height=600
DISPOSITION:attached_pic=1
[/STREAM]
[FORMAT]
filename=/tmp/in.mkv
nb_streams=5
format_name=matroska,webm
format_long_name=Matroska / WebM
duration=60.023000
size=1048576
bit_rate=139810
TAG:title=Example
TAG:ENCODER=Lavf60.3.100
[/FORMAT]
";

    fn parse(chunks: &[&[u8]]) -> Result<MediaInfo, ConverterError> {
        let mut parser = ProbeParser::new();
        for chunk in chunks {
            parser.feed(chunk);
        }
        parser.finish()
    }

    #[test]
    fn test_parse_sample() {
        let info = parse(&[SAMPLE.as_bytes()]).unwrap();

        assert_eq!(info.format, "matroska,webm");
        assert_eq!(info.format_long_name.as_deref(), Some("Matroska / WebM"));
        assert!((info.duration_secs - 60.023).abs() < 1e-9);
        assert_eq!(info.size_bytes, Some(1_048_576));
        assert_eq!(info.bitrate, Some(139_810));
        assert_eq!(info.tags.get("title").map(String::as_str), Some("Example"));
        assert_eq!(info.tags.get("encoder").map(String::as_str), Some("Lavf60.3.100"));

        // The attachment stream is not reported.
        assert_eq!(info.streams.len(), 4);
        let kinds: Vec<_> = info.streams.iter().map(|s| s.kind()).collect();
        assert_eq!(
            kinds,
            vec![StreamKind::Video, StreamKind::Audio, StreamKind::Subtitle, StreamKind::Video]
        );

        let video = info.video().unwrap();
        assert_eq!(video.index, 0);
        match &video.details {
            StreamDetails::Video { width, height, fps, bitrate, attached_pic } => {
                assert_eq!(*width, Some(1280));
                assert_eq!(*height, Some(720));
                assert!((fps.unwrap() - 29.97).abs() < 0.01);
                assert_eq!(*bitrate, None);
                assert!(!attached_pic);
            }
            other => panic!("unexpected details {:?}", other),
        }
        assert_eq!(video.duration_secs, None);

        let audio = info.audio().unwrap();
        assert_eq!(audio.language(), Some("eng"));
        assert!(matches!(
            audio.details,
            StreamDetails::Audio { sample_rate: Some(48000), channels: Some(2), bitrate: Some(128000) }
        ));

        assert_eq!(info.subtitles().count(), 1);
        assert_eq!(info.posters().next().unwrap().index, 4);
    }

    #[test]
    fn test_parse_in_small_chunks() {
        let chunks: Vec<&[u8]> = SAMPLE.as_bytes().chunks(7).collect();
        assert_eq!(parse(&chunks).unwrap(), parse(&[SAMPLE.as_bytes()]).unwrap());
    }

    #[test]
    fn test_duration_not_available() {
        let info = parse(&[b"[FORMAT]\nformat_name=mp3\nduration=N/A\n[/FORMAT]"]).unwrap();
        assert_eq!(info.duration_secs, 0.0);
        assert!(info.streams.is_empty());
    }

    #[test]
    fn test_missing_format_block() {
        let err = parse(&[b"[STREAM]\nindex=0\ncodec_type=audio\n[/STREAM]\n"]).unwrap_err();
        assert!(matches!(err, ConverterError::MalformedProbeOutput { .. }));

        let err = parse(&[b""]).unwrap_err();
        assert!(matches!(err, ConverterError::MalformedProbeOutput { .. }));
    }

    #[test]
    fn test_unterminated_block() {
        let err = parse(&[b"[FORMAT]\nformat_name=avi\n"]).unwrap_err();
        assert!(matches!(err, ConverterError::MalformedProbeOutput { .. }));
    }

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("24"), Some(24.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("N/A"), None);
    }

    #[test]
    fn test_avg_frame_rate_fallback() {
        let info = parse(&[b"[STREAM]\ncodec_type=video\nr_frame_rate=0/0\navg_frame_rate=50/2\n[/STREAM]\n[FORMAT]\n[/FORMAT]\n"])
            .unwrap();
        assert!(matches!(
            info.streams[0].details,
            StreamDetails::Video { fps: Some(f), .. } if f == 25.0
        ));
    }
}
