//! Stand-in ffmpeg/ffprobe executables for integration tests.
//!
//! The scripts are written once per test binary, before any test spawns a
//! process, so no child can inherit an open write handle to them.

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use tempfile::TempDir;

use transcoder_core::ConverterConfig;

/// Reports 10 seconds of 640x360 video plus stereo audio. Inputs whose name
/// contains "silent" have no streams, "short" ones have zero duration and
/// "broken" ones fail.
const FFPROBE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffprobe version test"; exit 0; fi
for last; do :; done
case "$last" in
  *broken*)
    # Like ffprobe, -v quiet silences the error.
    [ "$2" = "quiet" ] || echo "$last: Invalid data found when processing input" >&2
    exit 1
    ;;
esac
case "$last" in
  *silent*) ;;
  *)
    printf '[STREAM]\nindex=0\ncodec_name=h264\ncodec_type=video\nwidth=640\nheight=360\nr_frame_rate=25/1\n[/STREAM]\n'
    printf '[STREAM]\nindex=1\ncodec_name=aac\ncodec_type=audio\nsample_rate=44100\nchannels=2\nTAG:language=eng\n[/STREAM]\n'
    ;;
esac
duration=10.000000
case "$last" in *short*) duration=0.000000 ;; esac
printf '[FORMAT]\nformat_name=matroska,webm\nduration=%s\nbit_rate=800000\n[/FORMAT]\n' "$duration"
"#;

/// Emits progress on stderr and creates the output file (the last
/// argument). Image outputs (after `-f image2`) are all created. Inputs
/// named "*corrupt*" fail like a real decode error.
const FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version test"; exit 0; fi
if [ "$1" = "-hide_banner" ] && [ "$2" = "-encoders" ]; then
  printf 'Encoders:\n V..... = Video\n ------\n V....D libx264  H.264\n A....D aac  AAC\n'
  exit 0
fi
input=""
prev=""
for arg; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  if [ "$prev" = "image2" ]; then : > "$arg"; fi
  prev="$arg"
done
case "$input" in
  *corrupt*)
    echo "$input: Invalid data found when processing input" >&2
    exit 1
    ;;
esac
printf 'Input #0, matroska,webm, from '\''%s'\'':\n' "$input" >&2
printf 'frame=   50 fps= 50 q=28.0 size=     256kB time=00:00:02.00 bitrate= 800.0kbits/s speed=2.00x\r' >&2
printf 'frame=  250 fps= 50 q=28.0 size=    1024kB time=00:00:10.00 bitrate= 800.0kbits/s speed=2.00x\n' >&2
printf 'video:900kB audio:100kB subtitle:0kB other streams:0kB global headers:0kB muxing overhead: 1.0%%\n' >&2
for last; do :; done
case "$last" in *.jpg) ;; *) : > "$last" ;; esac
exit 0
"#;

pub struct Fixtures {
    dir: TempDir,
}

impl Fixtures {
    pub fn ffmpeg(&self) -> PathBuf {
        self.dir.path().join("ffmpeg")
    }

    pub fn ffprobe(&self) -> PathBuf {
        self.dir.path().join("ffprobe")
    }

    pub fn config(&self) -> ConverterConfig {
        ConverterConfig::with_paths(self.ffmpeg(), self.ffprobe())
    }
}

fn write_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

static FIXTURES: Lazy<Fixtures> = Lazy::new(|| {
    let dir = TempDir::new().expect("Failed to create fixture dir");
    write_script(dir.path(), "ffmpeg", FFMPEG);
    write_script(dir.path(), "ffprobe", FFPROBE);
    Fixtures { dir }
});

/// Fake executables. Call before spawning anything.
pub fn fixtures() -> &'static Fixtures {
    &FIXTURES
}

/// Creates an (empty) input file named `name` in `dir`.
pub fn input_file(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").unwrap();
    path
}
