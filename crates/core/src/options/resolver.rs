//! Validation and normalization of conversion specs.

use crate::converter::ConverterError;
use crate::registry::{
    AudioCodecEntry, FormatEntry, Limits, Registry, StreamKind, VideoCodecEntry, COPY_CODEC,
    NONE_CODEC,
};

use super::types::{
    AudioSpec, ConversionSpec, FrameSize, ResolvedAudio, ResolvedOptions, ResolvedSubtitle,
    ResolvedVideo, StreamPlan, SubtitleSpec, VideoQuality, VideoSpec,
};

/// Validates `spec` against `registry` and fills in every default.
///
/// Never spawns a process. Fails with [`ConverterError::InvalidSpecification`].
pub fn resolve(registry: &Registry, spec: &ConversionSpec) -> Result<ResolvedOptions, ConverterError> {
    let format = registry.format(&spec.format).ok_or_else(|| {
        ConverterError::invalid_spec(format!("Requested unknown format: {}", spec.format))
    })?;

    let video = resolve_video(registry, format, spec.video.as_ref())?;
    let audio = resolve_audio(registry, format, spec.audio.as_ref())?;
    let subtitle = resolve_subtitle(registry, format, spec.subtitle.as_ref())?;

    if video.is_disabled() && audio.is_disabled() {
        return Err(ConverterError::invalid_spec(
            "Neither audio nor video streams requested",
        ));
    }

    Ok(ResolvedOptions {
        format: format.clone(),
        video,
        audio,
        subtitle,
    })
}

enum CodecChoice<'a> {
    Disabled,
    Copy,
    Named(&'a str),
}

/// Shared checks for the codec field of any stream kind.
fn choose_codec<'a>(
    registry: &Registry,
    format: &FormatEntry,
    kind: StreamKind,
    codec: &'a str,
    has_parameters: bool,
) -> Result<CodecChoice<'a>, ConverterError> {
    match codec {
        NONE_CODEC => {
            if has_parameters {
                return Err(ConverterError::invalid_spec(format!(
                    "{} options given but {} is disabled",
                    kind, kind
                )));
            }
            Ok(CodecChoice::Disabled)
        }
        COPY_CODEC => {
            if has_parameters {
                return Err(ConverterError::invalid_spec(format!(
                    "{} stream copy cannot be combined with encoding options",
                    kind
                )));
            }
            if format.codecs(kind).is_empty() {
                return Err(ConverterError::invalid_spec(format!(
                    "Format {} cannot hold {} streams",
                    format.name, kind
                )));
            }
            Ok(CodecChoice::Copy)
        }
        name => {
            if !registry.has_codec(kind, name) {
                return Err(ConverterError::invalid_spec(format!(
                    "Requested unknown {} codec {}",
                    kind, name
                )));
            }
            if !registry.allows(&format.name, kind, name) {
                return Err(ConverterError::invalid_spec(format!(
                    "{} codec {} is not permitted in format {}",
                    kind, name, format.name
                )));
            }
            Ok(CodecChoice::Named(name))
        }
    }
}

fn check_limit(field: &str, value: u32, limits: Limits, codec: &str) -> Result<u32, ConverterError> {
    if value == 0 {
        return Err(ConverterError::invalid_spec(format!(
            "{} must be positive",
            field
        )));
    }
    if !limits.contains(value) {
        return Err(ConverterError::invalid_spec(format!(
            "{} {} is outside {} for codec {}",
            field, value, limits, codec
        )));
    }
    Ok(value)
}

fn check_dimension(
    field: &str,
    value: u32,
    limits: Limits,
    codec: &VideoCodecEntry,
) -> Result<u32, ConverterError> {
    let value = check_limit(field, value, limits, &codec.name)?;
    if codec.even_dimensions && value % 2 != 0 {
        return Err(ConverterError::invalid_spec(format!(
            "{} {} must be even for codec {}",
            field, value, codec.name
        )));
    }
    Ok(value)
}

fn resolve_video(
    registry: &Registry,
    format: &FormatEntry,
    spec: Option<&VideoSpec>,
) -> Result<StreamPlan<ResolvedVideo>, ConverterError> {
    let Some(spec) = spec else {
        return Ok(StreamPlan::Disabled);
    };

    // Source geometry is informational and allowed even on copy/none.
    let source = match (spec.source_width, spec.source_height) {
        (None, None) => None,
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(FrameSize::new(w, h)),
        (Some(_), Some(_)) => {
            return Err(ConverterError::invalid_spec(
                "source_width and source_height must be positive",
            ))
        }
        _ => {
            return Err(ConverterError::invalid_spec(
                "source_width and source_height must be given together",
            ))
        }
    };

    let name = match choose_codec(registry, format, StreamKind::Video, &spec.codec, spec.has_parameters())? {
        CodecChoice::Disabled => return Ok(StreamPlan::Disabled),
        CodecChoice::Copy => return Ok(StreamPlan::Copy),
        CodecChoice::Named(name) => name,
    };
    let codec = registry
        .video_codec(name)
        .ok_or_else(|| ConverterError::invalid_spec(format!("Requested unknown video codec {}", name)))?;

    let width = spec
        .width
        .map(|w| check_dimension("width", w, codec.width, codec))
        .transpose()?;
    let height = spec
        .height
        .map(|h| check_dimension("height", h, codec.height, codec))
        .transpose()?;

    let max_width = spec
        .max_width
        .map(|w| check_dimension("max_width", w, codec.width, codec))
        .transpose()?;
    let max_height = spec
        .max_height
        .map(|h| check_dimension("max_height", h, codec.height, codec))
        .transpose()?;

    if (width.is_some() || height.is_some()) && (max_width.is_some() || max_height.is_some()) {
        return Err(ConverterError::invalid_spec(
            "width/height and max_width/max_height are mutually exclusive",
        ));
    }

    let fps = match spec.fps {
        None => None,
        Some(fps) if !fps.is_finite() || fps <= 0.0 => {
            return Err(ConverterError::invalid_spec("fps must be positive"))
        }
        Some(fps) if !codec.fps.contains_f64(fps) => {
            return Err(ConverterError::invalid_spec(format!(
                "fps {} is outside {} for codec {}",
                fps, codec.fps, codec.name
            )))
        }
        Some(fps) => Some(fps),
    };

    let quality = match (spec.bitrate, spec.crf) {
        (Some(_), Some(_)) => {
            return Err(ConverterError::invalid_spec(
                "bitrate and crf are mutually exclusive",
            ))
        }
        (Some(kbps), None) => VideoQuality::Bitrate(check_limit(
            "bitrate",
            kbps,
            codec.bitrate_kbps,
            &codec.name,
        )?),
        (None, Some(crf)) => {
            let limits = codec.crf.ok_or_else(|| {
                ConverterError::invalid_spec(format!("codec {} has no crf mode", codec.name))
            })?;
            if !limits.contains(crf) {
                return Err(ConverterError::invalid_spec(format!(
                    "crf {} is outside {} for codec {}",
                    crf, limits, codec.name
                )));
            }
            VideoQuality::Crf(crf)
        }
        (None, None) => VideoQuality::Bitrate(codec.default_bitrate_kbps),
    };

    Ok(StreamPlan::Encode(ResolvedVideo {
        codec: codec.clone(),
        width,
        height,
        fps,
        quality,
        max_width,
        max_height,
        mode: spec.mode,
        source,
    }))
}

fn resolve_audio(
    registry: &Registry,
    format: &FormatEntry,
    spec: Option<&AudioSpec>,
) -> Result<StreamPlan<ResolvedAudio>, ConverterError> {
    let Some(spec) = spec else {
        return Ok(StreamPlan::Disabled);
    };

    let name = match choose_codec(registry, format, StreamKind::Audio, &spec.codec, spec.has_parameters())? {
        CodecChoice::Disabled => return Ok(StreamPlan::Disabled),
        CodecChoice::Copy => return Ok(StreamPlan::Copy),
        CodecChoice::Named(name) => name,
    };
    let codec: &AudioCodecEntry = registry
        .audio_codec(name)
        .ok_or_else(|| ConverterError::invalid_spec(format!("Requested unknown audio codec {}", name)))?;

    let channels = check_limit(
        "channels",
        spec.channels.unwrap_or(codec.default_channels),
        codec.channels,
        &codec.name,
    )?;

    let sample_rate = spec.sample_rate.unwrap_or(codec.default_sample_rate);
    if sample_rate == 0 {
        return Err(ConverterError::invalid_spec("sample_rate must be positive"));
    }
    if !codec.accepts_sample_rate(sample_rate) {
        return Err(ConverterError::invalid_spec(format!(
            "sample_rate {} is not supported by codec {}",
            sample_rate, codec.name
        )));
    }

    let bitrate_kbps = match (spec.bitrate, codec.default_bitrate_kbps) {
        (Some(_), None) => {
            return Err(ConverterError::invalid_spec(format!(
                "codec {} is lossless and takes no bitrate",
                codec.name
            )))
        }
        (Some(kbps), Some(_)) => Some(check_limit("bitrate", kbps, codec.bitrate_kbps, &codec.name)?),
        (None, default) => default,
    };

    Ok(StreamPlan::Encode(ResolvedAudio {
        codec: codec.clone(),
        bitrate_kbps,
        sample_rate,
        channels,
    }))
}

fn resolve_subtitle(
    registry: &Registry,
    format: &FormatEntry,
    spec: Option<&SubtitleSpec>,
) -> Result<StreamPlan<ResolvedSubtitle>, ConverterError> {
    let Some(spec) = spec else {
        return Ok(StreamPlan::Disabled);
    };

    match choose_codec(registry, format, StreamKind::Subtitle, &spec.codec, false)? {
        CodecChoice::Disabled => Ok(StreamPlan::Disabled),
        CodecChoice::Copy => Ok(StreamPlan::Copy),
        CodecChoice::Named(name) => {
            let codec = registry.subtitle_codec(name).ok_or_else(|| {
                ConverterError::invalid_spec(format!("Requested unknown subtitle codec {}", name))
            })?;
            Ok(StreamPlan::Encode(ResolvedSubtitle {
                codec: codec.clone(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::AspectMode;

    fn registry() -> &'static Registry {
        Registry::builtin()
    }

    fn assert_invalid(spec: &ConversionSpec) {
        let err = resolve(registry(), spec).unwrap_err();
        assert!(
            matches!(err, ConverterError::InvalidSpecification { .. }),
            "expected InvalidSpecification, got {:?}",
            err
        );
    }

    fn example_spec() -> ConversionSpec {
        ConversionSpec::new("mkv")
            .with_video(VideoSpec::new("h264").with_size(720, 400).with_fps(15.0))
            .with_audio(AudioSpec::new("mp3").with_sample_rate(11025).with_channels(2))
    }

    #[test]
    fn test_resolve_fills_defaults() {
        let resolved = resolve(registry(), &example_spec()).unwrap();
        assert_eq!(resolved.format.muxer, "matroska");

        let video = resolved.video.encoded().unwrap();
        assert_eq!(video.codec.encoder, "libx264");
        assert_eq!(video.quality, VideoQuality::Bitrate(2000));
        assert_eq!(video.width, Some(720));

        let audio = resolved.audio.encoded().unwrap();
        assert_eq!(audio.bitrate_kbps, Some(192));
        assert_eq!(audio.sample_rate, 11025);
        assert_eq!(audio.channels, 2);

        assert!(resolved.subtitle.is_disabled());
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let specs = vec![
            example_spec(),
            ConversionSpec::new("webm")
                .with_video(VideoSpec::new("vp9").with_crf(30).with_max_size(Some(1280), None))
                .with_audio(AudioSpec::new("opus")),
            ConversionSpec::new("mp3").with_audio(AudioSpec::new("mp3").with_bitrate(64)),
            ConversionSpec::new("mp4")
                .with_video(VideoSpec::copy())
                .with_audio(AudioSpec::new("aac"))
                .with_subtitle(SubtitleSpec::new("mov_text")),
            ConversionSpec::new("ogg")
                .with_video(
                    VideoSpec::new("theora")
                        .with_size(320, 240)
                        .with_mode(AspectMode::Crop)
                        .with_source(640, 400),
                )
                .with_audio(AudioSpec::new("flac")),
        ];

        for spec in specs {
            let once = resolve(registry(), &spec).unwrap();
            let twice = resolve(registry(), &ConversionSpec::from(&once)).unwrap();
            assert_eq!(once, twice, "not idempotent for {:?}", spec);
        }
    }

    #[test]
    fn test_unknown_format() {
        assert_invalid(&ConversionSpec::new("wmv").with_audio(AudioSpec::new("mp3")));
    }

    #[test]
    fn test_unknown_codec() {
        assert_invalid(&ConversionSpec::new("ogg").with_audio(AudioSpec::new("bogus")));
    }

    #[test]
    fn test_codec_not_permitted_in_format() {
        assert_invalid(&ConversionSpec::new("webm").with_video(VideoSpec::new("h264")));
        assert_invalid(&ConversionSpec::new("mp3").with_audio(AudioSpec::new("aac")));
    }

    #[test]
    fn test_no_streams() {
        assert_invalid(&ConversionSpec::new("ogg"));
        assert_invalid(
            &ConversionSpec::new("ogg")
                .with_video(VideoSpec::none())
                .with_audio(AudioSpec::none()),
        );
    }

    #[test]
    fn test_explicit_disable_with_other_stream() {
        let resolved = resolve(
            registry(),
            &ConversionSpec::new("ogg")
                .with_video(VideoSpec::none())
                .with_audio(AudioSpec::new("vorbis")),
        )
        .unwrap();
        assert!(resolved.video.is_disabled());
    }

    #[test]
    fn test_non_positive_numbers() {
        assert_invalid(
            &ConversionSpec::new("mkv").with_video(VideoSpec::new("h264").with_size(0, 400)),
        );
        assert_invalid(&ConversionSpec::new("mkv").with_video(VideoSpec::new("h264").with_fps(0.0)));
        assert_invalid(&ConversionSpec::new("mkv").with_video(VideoSpec::new("h264").with_fps(-5.0)));
        assert_invalid(&ConversionSpec::new("mkv").with_audio(AudioSpec::new("aac").with_channels(0)));
        assert_invalid(&ConversionSpec::new("mkv").with_audio(AudioSpec::new("aac").with_sample_rate(0)));
        assert_invalid(&ConversionSpec::new("mkv").with_audio(AudioSpec::new("aac").with_bitrate(0)));
    }

    #[test]
    fn test_out_of_range() {
        assert_invalid(
            &ConversionSpec::new("mkv").with_video(VideoSpec::new("h264").with_size(8000, 400)),
        );
        assert_invalid(&ConversionSpec::new("mkv").with_video(VideoSpec::new("h264").with_fps(240.0)));
        assert_invalid(&ConversionSpec::new("mkv").with_audio(AudioSpec::new("aac").with_channels(16)));
        assert_invalid(
            &ConversionSpec::new("webm").with_audio(AudioSpec::new("opus").with_sample_rate(44100)),
        );
    }

    #[test]
    fn test_odd_dimensions_depend_on_codec() {
        assert_invalid(
            &ConversionSpec::new("mkv").with_video(VideoSpec::new("h264").with_size(721, 400)),
        );
        let resolved = resolve(
            registry(),
            &ConversionSpec::new("ogg").with_video(VideoSpec::new("theora").with_size(721, 401)),
        )
        .unwrap();
        assert_eq!(resolved.video.encoded().unwrap().width, Some(721));
    }

    #[test]
    fn test_mutually_exclusive_choices() {
        assert_invalid(
            &ConversionSpec::new("mkv")
                .with_video(VideoSpec::new("h264").with_bitrate(1000).with_crf(23)),
        );
        assert_invalid(
            &ConversionSpec::new("mkv").with_video(
                VideoSpec::new("h264")
                    .with_size(720, 400)
                    .with_max_size(Some(1280), None),
            ),
        );
        assert_invalid(&ConversionSpec::new("ogg").with_video(VideoSpec::new("theora").with_crf(20)));
        assert_invalid(&ConversionSpec::new("ogg").with_audio(AudioSpec::new("flac").with_bitrate(320)));
    }

    #[test]
    fn test_copy_and_none_reject_parameters() {
        assert_invalid(
            &ConversionSpec::new("mkv").with_video(VideoSpec::copy().with_size(720, 400)),
        );
        assert_invalid(
            &ConversionSpec::new("mkv")
                .with_video(VideoSpec::new("h264"))
                .with_audio(AudioSpec::none().with_bitrate(128)),
        );
    }

    #[test]
    fn test_copy_into_audio_only_container() {
        assert_invalid(
            &ConversionSpec::new("mp3")
                .with_video(VideoSpec::copy())
                .with_audio(AudioSpec::new("mp3")),
        );
    }

    #[test]
    fn test_half_source_geometry() {
        let mut video = VideoSpec::new("h264");
        video.source_width = Some(1920);
        assert_invalid(&ConversionSpec::new("mkv").with_video(video));
    }

    #[test]
    fn test_crf_mode() {
        let resolved = resolve(
            registry(),
            &ConversionSpec::new("mp4").with_video(VideoSpec::new("h264").with_crf(23)),
        )
        .unwrap();
        assert_eq!(resolved.video.encoded().unwrap().quality, VideoQuality::Crf(23));
    }
}
