//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use marshal_core::component::DEFAULT_NAME_PATTERN;
use marshal_core::{BuildResult, ExecutionOptions, PipelineSettings, TreeSettings};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MarshalConfig {
    /// Matching and parsing rules of the engine.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Engine
// =============================================================================

/// Engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Regex every alias must match. Unset means non-empty, no whitespace
    /// and no quotes.
    #[serde(default)]
    pub naming_pattern: Option<String>,

    /// Compare aliases case-sensitively.
    #[serde(default)]
    pub case_sensitive: bool,

    /// Tokens that read as null for nullable parameters.
    #[serde(default = "default_null_literals")]
    pub null_literals: Vec<String>,

    /// Separator for joining scalar remainder tokens.
    #[serde(default = "default_remainder_separator")]
    pub remainder_separator: char,

    /// Run requests detached unless the caller asks otherwise.
    #[serde(default)]
    pub detached: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            naming_pattern: None,
            case_sensitive: false,
            null_literals: default_null_literals(),
            remainder_separator: default_remainder_separator(),
            detached: false,
        }
    }
}

fn default_null_literals() -> Vec<String> {
    PipelineSettings::default().null_literals
}

fn default_remainder_separator() -> char {
    ' '
}

impl EngineConfig {
    pub fn tree_settings(&self) -> BuildResult<TreeSettings> {
        match (&self.naming_pattern, self.case_sensitive) {
            (None, false) => Ok(TreeSettings::default()),
            (pattern, case_sensitive) => TreeSettings::new(
                pattern.as_deref().unwrap_or(DEFAULT_NAME_PATTERN),
                case_sensitive,
            ),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            null_literals: self.null_literals.clone(),
        }
    }

    /// Request options seeded from this configuration.
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions::new()
            .remainder_separator(self.remainder_separator)
            .async_mode(self.detached)
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging settings, consumed by [`LoggingBuilder`](crate::logging::LoggingBuilder).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file, required when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Rotated files to keep.
    #[serde(default = "default_max_files")]
    pub max_files: u32,

    /// Per-target level overrides, e.g. `marshal_core = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            output: LogOutput::default(),
            span_events: SpanEventConfig::default(),
            thread_ids: false,
            file_location: false,
            file_path: None,
            rotation: LogRotation::default(),
            max_files: default_max_files(),
            filters: HashMap::new(),
        }
    }
}

fn default_max_files() -> u32 {
    5
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Needs the `json-log` feature.
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_settings() {
        let engine = EngineConfig::default();
        assert_eq!(engine.null_literals, vec!["null", "nil", "none"]);
        let tree = engine.tree_settings().unwrap();
        assert_eq!(tree.pattern(), DEFAULT_NAME_PATTERN);
        assert!(!tree.case_sensitive());
        assert!(!engine.execution_options().async_mode);
    }

    #[test]
    fn test_engine_settings_flow_through() {
        let engine = EngineConfig {
            naming_pattern: Some("^[a-z]+$".into()),
            case_sensitive: true,
            null_literals: vec!["-".into()],
            remainder_separator: ',',
            detached: true,
        };
        let tree = engine.tree_settings().unwrap();
        assert_eq!(tree.pattern(), "^[a-z]+$");
        assert!(tree.case_sensitive());
        assert!(engine.pipeline_settings().is_null_literal("-"));

        let options = engine.execution_options();
        assert_eq!(options.remainder_separator, ',');
        assert!(options.async_mode);
    }

    #[test]
    fn test_log_level_names() {
        assert_eq!(LogLevel::Warn.to_string(), "warn");
        assert_eq!(LogLevel::Debug.to_tracing_level(), tracing::Level::DEBUG);
        let level: LogLevel = serde_json::from_str(r#""trace""#).unwrap();
        assert_eq!(level, LogLevel::Trace);
    }
}
