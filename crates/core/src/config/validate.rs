use super::{types::Config, ConfigError};

/// Validate a loaded configuration before the engine is built.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.queue.max_concurrency == 0 {
        return Err(ConfigError::Invalid(
            "queue.max_concurrency must be at least 1".to_string(),
        ));
    }

    if config.queue.retry_base_delay_ms > config.queue.retry_max_delay_ms {
        return Err(ConfigError::Invalid(
            "queue.retry_base_delay_ms must not exceed queue.retry_max_delay_ms".to_string(),
        ));
    }

    if config.converter.audio_bitrate_kbps < 32 || config.converter.audio_bitrate_kbps > 512 {
        return Err(ConfigError::Invalid(format!(
            "converter.audio_bitrate_kbps must be in 32..=512, got {}",
            config.converter.audio_bitrate_kbps
        )));
    }

    if config.output.output_directory.as_os_str().is_empty() {
        return Err(ConfigError::Invalid(
            "output.output_directory must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = Config::default();
        config.queue.max_concurrency = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn inverted_backoff_bounds_are_rejected() {
        let mut config = Config::default();
        config.queue.retry_base_delay_ms = 10_000;
        config.queue.retry_max_delay_ms = 1000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn silly_bitrates_are_rejected() {
        let mut config = Config::default();
        config.converter.audio_bitrate_kbps = 7;
        assert!(validate_config(&config).is_err());

        config.converter.audio_bitrate_kbps = 9000;
        assert!(validate_config(&config).is_err());
    }
}
