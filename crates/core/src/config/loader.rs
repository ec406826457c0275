use std::path::Path;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Environment keys use a double underscore as the section separator,
/// e.g. `MEDLEY_QUEUE__MAX_CONCURRENCY=4`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MEDLEY_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from a TOML string (useful for testing).
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_from_str_valid() {
        let toml = r#"
[queue]
max_concurrency = 3
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.queue.max_concurrency, 3);
    }

    #[test]
    fn load_from_str_bad_value() {
        let toml = r#"
[queue]
max_concurrency = "lots"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn load_file_not_found() {
        let result = load_config(Path::new("/nonexistent/medley.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[queue]
max_concurrency = 2
max_retries = 1

[output]
output_directory = "/tmp/medley-test"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.queue.max_concurrency, 2);
        assert_eq!(config.queue.max_retries, 1);
        assert_eq!(
            config.output.output_directory,
            std::path::PathBuf::from("/tmp/medley-test")
        );
    }
}
