//! Subcommand handlers.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use transcoder_core::options::FrameSize;
use transcoder_core::{
    ConversionResult, ConversionSpec, Converter, FailureKind, FfmpegConverter, MediaInfo,
    ProgressEvent, Registry, StreamDetails, ThumbnailRequest,
};

pub async fn probe(converter: &FfmpegConverter, input: &Path, json: bool) -> Result<()> {
    let info = converter
        .probe(input)
        .await
        .with_context(|| format!("Failed to probe {:?}", input))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print_media_info(input, &info);
    }
    Ok(())
}

fn print_media_info(input: &Path, info: &MediaInfo) {
    println!("{}", input.display());
    println!(
        "  format:   {}{}",
        info.format,
        info.format_long_name
            .as_deref()
            .map(|n| format!(" ({n})"))
            .unwrap_or_default()
    );
    println!("  duration: {:.2}s", info.duration_secs);
    if let Some(bitrate) = info.bitrate {
        println!("  bitrate:  {} kb/s", bitrate / 1000);
    }
    for (key, value) in &info.tags {
        println!("  {key}: {value}");
    }

    for stream in &info.streams {
        let lang = stream
            .language()
            .map(|l| format!(" [{l}]"))
            .unwrap_or_default();
        let details = match &stream.details {
            StreamDetails::Video {
                width,
                height,
                fps,
                attached_pic,
                ..
            } => {
                let size = match (width, height) {
                    (Some(w), Some(h)) => format!("{w}x{h}"),
                    _ => "?x?".to_string(),
                };
                let fps = fps.map(|f| format!(" {f:.2} fps")).unwrap_or_default();
                let poster = if *attached_pic { " (cover art)" } else { "" };
                format!("{size}{fps}{poster}")
            }
            StreamDetails::Audio {
                sample_rate,
                channels,
                ..
            } => format!(
                "{} Hz, {} ch",
                sample_rate.map_or("?".to_string(), |r| r.to_string()),
                channels.map_or("?".to_string(), |c| c.to_string())
            ),
            StreamDetails::Subtitle => String::new(),
        };
        println!(
            "  #{} {} {}{} {}",
            stream.index,
            stream.kind(),
            stream.codec,
            lang,
            details
        );
    }
}

fn load_spec(path: &Path) -> Result<ConversionSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec file {:?}", path))?;
    let spec = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => ConversionSpec::from_toml(&text)?,
        _ => ConversionSpec::from_json(&text)?,
    };
    Ok(spec)
}

pub async fn convert(
    converter: &FfmpegConverter,
    input: &Path,
    output: &Path,
    spec_path: &Path,
    json: bool,
) -> Result<()> {
    let spec = load_spec(spec_path)?;
    let mut session = converter
        .convert(&spec, input, output)
        .await
        .context("Conversion rejected")?;
    info!(session = %session.id(), "Starting conversion");

    let cancel = session.cancel_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling conversion");
            cancel.cancel();
        }
    });

    let bar = if json { None } else { Some(progress_bar()?) };
    while let Some(event) = session.next_event().await {
        match &bar {
            Some(bar) => update_bar(bar, &event),
            None => println!("{}", serde_json::to_string(&event)?),
        }
    }
    let result = session.finish().await;
    ctrl_c.abort();

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    match result {
        ConversionResult::Success {
            output_path,
            elapsed,
        } => {
            println!(
                "{} ({:.1}s)",
                output_path.display(),
                elapsed.as_secs_f64()
            );
            Ok(())
        }
        ConversionResult::Failure {
            kind: FailureKind::Cancelled,
            ..
        } => bail!("conversion cancelled"),
        ConversionResult::Failure {
            kind,
            message,
            tail,
        } => {
            if !tail.is_empty() {
                eprintln!("{}", tail.trim_end());
            }
            bail!("conversion failed ({:?}): {}", kind, message)
        }
    }
}

fn progress_bar() -> Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}% {msg}",
    )?;
    bar.set_style(style.progress_chars("##-"));
    bar.enable_steady_tick(Duration::from_millis(200));
    Ok(bar)
}

fn update_bar(bar: &ProgressBar, event: &ProgressEvent) {
    if let Some(percent) = event.percent {
        bar.set_position(percent.round() as u64);
    }
    let mut msg = format!("{:.1}s", event.elapsed_secs);
    if let Some(speed) = event.speed {
        msg.push_str(&format!(" {speed:.2}x"));
    }
    if let Some(kbps) = event.bitrate_kbps {
        msg.push_str(&format!(" {kbps:.0} kb/s"));
    }
    bar.set_message(msg);
}

/// Parses `WIDTHxHEIGHT`.
fn parse_size(s: &str) -> Result<FrameSize> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .with_context(|| format!("size must be WIDTHxHEIGHT, got {s:?}"))?;
    let width = w.trim().parse().with_context(|| format!("bad width in {s:?}"))?;
    let height = h.trim().parse().with_context(|| format!("bad height in {s:?}"))?;
    Ok(FrameSize::new(width, height))
}

pub async fn thumbnail(
    converter: &FfmpegConverter,
    input: &Path,
    output: &Path,
    time: f64,
    size: Option<&str>,
    quality: Option<u32>,
) -> Result<()> {
    let mut request = ThumbnailRequest::new(time, output);
    if let Some(size) = size {
        request = request.with_size(parse_size(size)?);
    }
    if let Some(quality) = quality {
        request = request.with_quality(quality);
    }

    let path = converter
        .thumbnail(input, request)
        .await
        .with_context(|| format!("Failed to extract thumbnail from {:?}", input))?;
    println!("{}", path.display());
    Ok(())
}

pub async fn check(converter: &FfmpegConverter) -> Result<()> {
    converter
        .validate()
        .await
        .context("ffmpeg/ffprobe are not usable")?;
    println!("ffmpeg:  {}", converter.config().ffmpeg_path.display());
    println!("ffprobe: {}", converter.config().ffprobe_path.display());

    let caps = converter.capabilities().await;
    if caps.is_empty() {
        warn!("Could not list encoders");
        return Ok(());
    }
    let missing = caps.missing_encoders(converter.registry());
    if missing.is_empty() {
        println!("all registry encoders available");
    } else {
        println!("missing encoders: {}", missing.join(", "));
    }
    Ok(())
}

pub fn formats(registry: &Registry) {
    for format in registry.formats() {
        println!("{} (-f {})  {}", format.name, format.muxer, format.description);
        for (label, codecs) in [
            ("video", &format.video),
            ("audio", &format.audio),
            ("subtitle", &format.subtitle),
        ] {
            if !codecs.is_empty() {
                println!("    {label}: {}", codecs.join(", "));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("320x240").unwrap(), FrameSize::new(320, 240));
        assert_eq!(parse_size("640X360").unwrap(), FrameSize::new(640, 360));
        assert!(parse_size("320").is_err());
        assert!(parse_size("ax240").is_err());
    }

    #[test]
    fn test_load_spec_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("spec.json");
        std::fs::write(&json, r#"{"format": "mkv", "video": {"codec": "h264"}}"#).unwrap();
        assert_eq!(load_spec(&json).unwrap().format, "mkv");

        let toml = dir.path().join("spec.toml");
        std::fs::write(&toml, "format = \"ogg\"\n[audio]\ncodec = \"vorbis\"\n").unwrap();
        assert_eq!(load_spec(&toml).unwrap().format, "ogg");

        assert!(load_spec(&dir.path().join("missing.json")).is_err());
    }
}
