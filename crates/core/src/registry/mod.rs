//! Codec/format registry.
//!
//! Maps user-facing identifiers ("mkv", "h264") to the names ffmpeg expects,
//! and records which codecs each container accepts along with per-codec
//! parameter limits. The built-in table is created once on first use and
//! never mutated; a replacement can be loaded from TOML.
//!
//! ```toml
//! [[formats]]
//! name = "mkv"
//! muxer = "matroska"
//! video = ["h264"]
//! audio = ["aac"]
//!
//! [[video_codecs]]
//! name = "h264"
//! encoder = "libx264"
//! even_dimensions = true
//!
//! [[audio_codecs]]
//! name = "aac"
//! encoder = "aac"
//! default_bitrate_kbps = 128
//! ```

mod builtin;
mod types;

pub use types::{
    AudioCodecEntry, FormatEntry, Limits, StreamKind, SubtitleCodecEntry, VideoCodecEntry,
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Pseudo-codec: copy the source stream unchanged.
pub const COPY_CODEC: &str = "copy";

/// Pseudo-codec: drop every stream of that kind.
pub const NONE_CODEC: &str = "none";

static BUILTIN: Lazy<Registry> = Lazy::new(|| Registry::from_data_unchecked(builtin::data()));

/// Errors raised while loading a registry table.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read registry file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse registry: {0}")]
    Parse(String),

    #[error("Format '{format}' references unknown {kind} codec '{codec}'")]
    UnknownCodec {
        format: String,
        kind: StreamKind,
        codec: String,
    },

    #[error("Duplicate {what} entry '{name}'")]
    Duplicate { what: &'static str, name: String },
}

/// Serialized form of a registry table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryData {
    #[serde(default)]
    pub formats: Vec<FormatEntry>,
    #[serde(default)]
    pub video_codecs: Vec<VideoCodecEntry>,
    #[serde(default)]
    pub audio_codecs: Vec<AudioCodecEntry>,
    #[serde(default)]
    pub subtitle_codecs: Vec<SubtitleCodecEntry>,
}

/// Read-only lookup table of containers and codecs.
#[derive(Debug, Clone)]
pub struct Registry {
    formats: BTreeMap<String, FormatEntry>,
    video_codecs: BTreeMap<String, VideoCodecEntry>,
    audio_codecs: BTreeMap<String, AudioCodecEntry>,
    subtitle_codecs: BTreeMap<String, SubtitleCodecEntry>,
}

impl Registry {
    /// The process-wide built-in registry.
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// Builds a registry, checking that every format only references known codecs.
    pub fn from_data(data: RegistryData) -> Result<Self, RegistryError> {
        let mut registry = Self {
            formats: BTreeMap::new(),
            video_codecs: BTreeMap::new(),
            audio_codecs: BTreeMap::new(),
            subtitle_codecs: BTreeMap::new(),
        };

        for codec in data.video_codecs {
            let name = codec.name.clone();
            if registry.video_codecs.insert(name.clone(), codec).is_some() {
                return Err(RegistryError::Duplicate { what: "video codec", name });
            }
        }
        for codec in data.audio_codecs {
            let name = codec.name.clone();
            if registry.audio_codecs.insert(name.clone(), codec).is_some() {
                return Err(RegistryError::Duplicate { what: "audio codec", name });
            }
        }
        for codec in data.subtitle_codecs {
            let name = codec.name.clone();
            if registry.subtitle_codecs.insert(name.clone(), codec).is_some() {
                return Err(RegistryError::Duplicate { what: "subtitle codec", name });
            }
        }

        for format in data.formats {
            for kind in [StreamKind::Video, StreamKind::Audio, StreamKind::Subtitle] {
                if let Some(codec) = format
                    .codecs(kind)
                    .iter()
                    .find(|codec| !registry.has_codec(kind, codec))
                {
                    return Err(RegistryError::UnknownCodec {
                        format: format.name.clone(),
                        kind,
                        codec: codec.clone(),
                    });
                }
            }
            let name = format.name.clone();
            if registry.formats.insert(name.clone(), format).is_some() {
                return Err(RegistryError::Duplicate { what: "format", name });
            }
        }

        Ok(registry)
    }

    /// Parses a registry table from TOML.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, RegistryError> {
        let data: RegistryData =
            toml::from_str(toml_str).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::from_data(data)
    }

    /// Loads a registry table from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|source| RegistryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    // The built-in table is covered by `test_builtin_is_consistent`.
    fn from_data_unchecked(data: RegistryData) -> Self {
        Self {
            formats: data
                .formats
                .into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
            video_codecs: data
                .video_codecs
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            audio_codecs: data
                .audio_codecs
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
            subtitle_codecs: data
                .subtitle_codecs
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        }
    }

    pub fn format(&self, name: &str) -> Option<&FormatEntry> {
        self.formats.get(name)
    }

    pub fn video_codec(&self, name: &str) -> Option<&VideoCodecEntry> {
        self.video_codecs.get(name)
    }

    pub fn audio_codec(&self, name: &str) -> Option<&AudioCodecEntry> {
        self.audio_codecs.get(name)
    }

    pub fn subtitle_codec(&self, name: &str) -> Option<&SubtitleCodecEntry> {
        self.subtitle_codecs.get(name)
    }

    /// Whether a real (non-pseudo) codec of this kind exists.
    pub fn has_codec(&self, kind: StreamKind, name: &str) -> bool {
        match kind {
            StreamKind::Video => self.video_codecs.contains_key(name),
            StreamKind::Audio => self.audio_codecs.contains_key(name),
            StreamKind::Subtitle => self.subtitle_codecs.contains_key(name),
        }
    }

    /// Whether `codec` may be used for `kind` streams inside `format`.
    ///
    /// `copy` and `none` are accepted for every known format.
    pub fn allows(&self, format: &str, kind: StreamKind, codec: &str) -> bool {
        let Some(entry) = self.formats.get(format) else {
            return false;
        };
        codec == COPY_CODEC || codec == NONE_CODEC || entry.codecs(kind).iter().any(|c| c == codec)
    }

    /// Known format identifiers, sorted.
    pub fn format_names(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }

    pub fn formats(&self) -> impl Iterator<Item = &FormatEntry> {
        self.formats.values()
    }

    pub fn video_codecs(&self) -> impl Iterator<Item = &VideoCodecEntry> {
        self.video_codecs.values()
    }

    pub fn audio_codecs(&self) -> impl Iterator<Item = &AudioCodecEntry> {
        self.audio_codecs.values()
    }

    pub fn subtitle_codecs(&self) -> impl Iterator<Item = &SubtitleCodecEntry> {
        self.subtitle_codecs.values()
    }

    /// Every encoder name the registry may pass to ffmpeg.
    pub fn encoders(&self) -> Vec<&str> {
        let mut encoders: Vec<&str> = self
            .video_codecs
            .values()
            .map(|c| c.encoder.as_str())
            .chain(self.audio_codecs.values().map(|c| c.encoder.as_str()))
            .chain(self.subtitle_codecs.values().map(|c| c.encoder.as_str()))
            .collect();
        encoders.sort_unstable();
        encoders.dedup();
        encoders
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin().clone()
    }
}
