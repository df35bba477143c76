use super::{types::Config, ConfigError};

const LOG_LEVELS: &[&str] = &[
    "quiet", "panic", "fatal", "error", "warning", "info", "verbose", "debug", "trace",
];

/// Validate configuration
/// Currently validates:
/// - ffmpeg/ffprobe paths are not empty
/// - ffmpeg log level is one ffmpeg understands
/// - the diagnostic tail can hold at least one line
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let converter = &config.converter;

    if converter.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if converter.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffprobe_path cannot be empty".to_string(),
        ));
    }

    if !LOG_LEVELS.contains(&converter.ffmpeg_log_level.as_str()) {
        return Err(ConfigError::ValidationError(format!(
            "converter.ffmpeg_log_level '{}' is not one of {}",
            converter.ffmpeg_log_level,
            LOG_LEVELS.join(", ")
        )));
    }

    if converter.tail_bytes < 80 {
        return Err(ConfigError::ValidationError(
            "converter.tail_bytes must be at least 80".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::ConverterConfig;
    use std::path::PathBuf;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_bad_log_level_fails() {
        let config = Config {
            converter: ConverterConfig::default().with_log_level("loud"),
            ..Default::default()
        };
        let result = validate_config(&config);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_empty_path_fails() {
        let config = Config {
            converter: ConverterConfig::with_paths(PathBuf::new(), PathBuf::from("ffprobe")),
            ..Default::default()
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_tiny_tail_fails() {
        let mut config = Config::default();
        config.converter.tail_bytes = 10;
        assert!(validate_config(&config).is_err());
    }
}
