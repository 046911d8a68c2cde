//! Configuration validation utilities.

use std::collections::HashSet;

use marshal_core::BuildError;

use super::error::{ConfigError, ConfigResult};
use super::schema::{EngineConfig, LogFormat, LogOutput, LoggingConfig, MarshalConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &MarshalConfig) -> ConfigResult<()> {
    validate_engine_config(&config.engine)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

fn validate_engine_config(engine: &EngineConfig) -> ConfigResult<()> {
    if let Err(error) = engine.tree_settings() {
        return Err(match error {
            BuildError::InvalidPattern { pattern, reason } => ConfigError::InvalidPattern { pattern, reason },
            other => ConfigError::validation(other.to_string()),
        });
    }

    if engine.null_literals.is_empty() {
        return Err(ConfigError::missing_field("engine.null_literals"));
    }

    let mut seen = HashSet::new();
    for literal in &engine.null_literals {
        if literal.trim().is_empty() {
            return Err(ConfigError::validation("Null literals cannot be blank"));
        }
        if !seen.insert(literal.to_lowercase()) {
            return Err(ConfigError::validation(format!("Duplicate null literal: {literal}")));
        }
    }

    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File {
        let Some(path) = &logging.file_path else {
            return Err(ConfigError::missing_field("logging.file_path"));
        };
        if path.file_name().is_none() {
            return Err(ConfigError::validation(format!(
                "Log file path has no file name: {}",
                path.display()
            )));
        }
        if logging.max_files == 0 {
            return Err(ConfigError::validation("logging.max_files must be at least 1"));
        }
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "JSON log format requires the `json-log` feature",
        ));
    }

    for target in logging.filters.keys() {
        if target.is_empty() || target.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!("Invalid log filter target: '{target}'")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&MarshalConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_bad_pattern() {
        let mut config = MarshalConfig::default();
        config.engine.naming_pattern = Some("([a-z".into());
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref pattern, .. } if pattern == "([a-z"));
    }

    #[test]
    fn test_validate_null_literals() {
        let mut config = MarshalConfig::default();
        config.engine.null_literals.clear();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.engine.null_literals = vec!["null".into(), "NULL".into()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        config.engine.null_literals = vec![" ".into()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_file_output() {
        let mut config = MarshalConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { ref field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some("logs/marshal.log".into());
        assert!(validate_config(&config).is_ok());

        config.logging.max_files = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_filter_targets() {
        let mut config = MarshalConfig::default();
        config.logging.filters.insert("marshal core".into(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }
}
