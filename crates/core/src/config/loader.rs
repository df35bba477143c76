use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables overriding the configuration.
/// Nested keys use `__`, e.g. `TRANSCODER_CONVERTER__FFMPEG_PATH`.
pub const ENV_PREFIX: &str = "TRANSCODER_";

fn env() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(env())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load the built-in defaults with environment variable overrides
pub fn load_default_config() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(env())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[converter]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"
timeout_secs = 120
max_unparsed_lines = 100

[logging]
filter = "transcoder_core=debug"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(
            config.converter.ffmpeg_path,
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
        assert_eq!(config.converter.timeout_secs, 120);
        assert_eq!(config.converter.max_unparsed_lines, Some(100));
        assert_eq!(config.converter.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.logging.filter, "transcoder_core=debug");
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[converter]
timeout_secs = "soon"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[converter]
ffprobe_path = "/usr/local/bin/ffprobe"
kill_on_timeout = true

[logging]
json = true
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.converter.ffprobe_path,
            PathBuf::from("/usr/local/bin/ffprobe")
        );
        assert!(config.converter.kill_on_timeout);
        assert!(config.logging.json);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "transcoder.toml",
                r#"
[converter]
ffmpeg_path = "/from/file"
timeout_secs = 10
"#,
            )?;
            jail.set_env("TRANSCODER_CONVERTER__FFMPEG_PATH", "/from/env");
            jail.set_env("TRANSCODER_LOGGING__FILTER", "warn");

            let config = load_config(Path::new("transcoder.toml")).unwrap();
            assert_eq!(config.converter.ffmpeg_path, PathBuf::from("/from/env"));
            assert_eq!(config.converter.timeout_secs, 10);
            assert_eq!(config.logging.filter, "warn");

            let defaults = load_default_config().unwrap();
            assert_eq!(defaults.converter.ffmpeg_path, PathBuf::from("/from/env"));
            assert_eq!(defaults.converter.timeout_secs, 30);
            Ok(())
        });
    }
}
