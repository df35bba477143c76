//! Built-in codec and container table.

use super::types::{AudioCodecEntry, FormatEntry, Limits, SubtitleCodecEntry, VideoCodecEntry};
use super::RegistryData;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn format(name: &str, muxer: &str, description: &str, video: &[&str], audio: &[&str], subtitle: &[&str]) -> FormatEntry {
    FormatEntry {
        name: name.to_string(),
        muxer: muxer.to_string(),
        description: description.to_string(),
        video: strings(video),
        audio: strings(audio),
        subtitle: strings(subtitle),
    }
}

fn video(name: &str, encoder: &str, default_bitrate_kbps: u32) -> VideoCodecEntry {
    VideoCodecEntry {
        name: name.to_string(),
        encoder: encoder.to_string(),
        even_dimensions: false,
        crf: None,
        default_bitrate_kbps,
        width: Limits::new(16, 4000),
        height: Limits::new(16, 3000),
        fps: Limits::new(1, 120),
        bitrate_kbps: Limits::new(16, 15000),
        aspect_filter: false,
        extra_args: Vec::new(),
    }
}

fn audio(name: &str, encoder: &str, bitrate: Option<u32>, sample_rate: u32) -> AudioCodecEntry {
    AudioCodecEntry {
        name: name.to_string(),
        encoder: encoder.to_string(),
        default_bitrate_kbps: bitrate,
        default_sample_rate: sample_rate,
        default_channels: 2,
        bitrate_kbps: Limits::new(8, 512),
        sample_rate: Limits::new(1000, 50000),
        sample_rates: Vec::new(),
        channels: Limits::new(1, 12),
        extra_args: Vec::new(),
    }
}

fn subtitle(name: &str, encoder: &str) -> SubtitleCodecEntry {
    SubtitleCodecEntry {
        name: name.to_string(),
        encoder: encoder.to_string(),
    }
}

pub(super) fn data() -> RegistryData {
    let formats = vec![
        format("ogg", "ogg", "Ogg, mostly Vorbis and Theora", &["theora", "vp8"], &["vorbis", "opus", "flac"], &[]),
        format("avi", "avi", "Audio Video Interleave", &["divx", "h264", "mpeg1", "mpeg2", "h263"], &["mp3", "mp2", "aac"], &[]),
        format(
            "mkv",
            "matroska",
            "Matroska",
            &["h264", "h265", "theora", "divx", "vp8", "vp9", "av1", "mpeg1", "mpeg2"],
            &["aac", "mp3", "mp2", "vorbis", "opus", "flac"],
            &["srt", "ass", "webvtt"],
        ),
        format("webm", "webm", "WebM", &["vp8", "vp9", "av1"], &["vorbis", "opus"], &["webvtt"]),
        format("flv", "flv", "Flash Video", &["flv", "h264"], &["mp3", "aac"], &[]),
        format("mov", "mov", "QuickTime", &["h264", "h265", "divx"], &["aac", "mp3"], &["mov_text"]),
        format("mp4", "mp4", "MPEG-4 Part 14", &["h264", "h265", "divx", "av1", "vp9"], &["aac", "mp3", "opus", "flac"], &["mov_text"]),
        format("mpg", "mpegts", "MPEG transport stream", &["mpeg1", "mpeg2", "h264"], &["mp2", "mp3", "aac"], &[]),
        format("mp3", "mp3", "MP3 audio only", &[], &["mp3"], &[]),
    ];

    let mut h264 = video("h264", "libx264", 2000);
    h264.even_dimensions = true;
    h264.crf = Some(Limits::new(0, 51));
    h264.extra_args = strings(&["-pix_fmt", "yuv420p"]);

    let mut h265 = video("h265", "libx265", 1500);
    h265.even_dimensions = true;
    h265.crf = Some(Limits::new(0, 51));
    h265.extra_args = strings(&["-pix_fmt", "yuv420p"]);

    let mut vp8 = video("vp8", "libvpx", 1000);
    vp8.crf = Some(Limits::new(4, 63));

    let mut vp9 = video("vp9", "libvpx-vp9", 1000);
    vp9.crf = Some(Limits::new(0, 63));

    let mut av1 = video("av1", "libaom-av1", 1000);
    av1.crf = Some(Limits::new(0, 63));

    let mut mpeg1 = video("mpeg1", "mpeg1video", 1500);
    mpeg1.even_dimensions = true;
    mpeg1.aspect_filter = true;

    let mut mpeg2 = video("mpeg2", "mpeg2video", 2500);
    mpeg2.even_dimensions = true;
    mpeg2.aspect_filter = true;

    let video_codecs = vec![
        video("theora", "libtheora", 1000),
        h264,
        h265,
        video("divx", "mpeg4", 1500),
        vp8,
        vp9,
        av1,
        video("h263", "h263", 500),
        video("flv", "flv", 800),
        mpeg1,
        mpeg2,
    ];

    let mut opus = audio("opus", "libopus", Some(128), 48000);
    opus.sample_rates = vec![8000, 12000, 16000, 24000, 48000];
    opus.bitrate_kbps = Limits::new(8, 510);

    let audio_codecs = vec![
        audio("vorbis", "libvorbis", Some(128), 48000),
        audio("aac", "aac", Some(128), 48000),
        audio("mp3", "libmp3lame", Some(192), 44100),
        audio("mp2", "mp2", Some(192), 44100),
        opus,
        audio("flac", "flac", None, 44100),
    ];

    let subtitle_codecs = vec![
        subtitle("srt", "srt"),
        subtitle("ass", "ass"),
        subtitle("webvtt", "webvtt"),
        subtitle("mov_text", "mov_text"),
    ];

    RegistryData {
        formats,
        video_codecs,
        audio_codecs,
        subtitle_codecs,
    }
}
