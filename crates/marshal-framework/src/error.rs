//! Error types for the Marshal framework.

use thiserror::Error;

use marshal_core::EngineError;

/// Errors that can occur while extracting handler parameters.
///
/// Extraction failures mean the handler's signature disagrees with the
/// command it is bound to, so they are reported as fatal [`EngineError`]s
/// rather than per-candidate failures.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// The bound argument has a different type than the extractor asked for.
    #[error("argument {index} is a '{actual}', expected '{expected}'")]
    TypeMismatch {
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },

    /// No value was bound at this position (missing, null or out of range).
    #[error("argument {index} has no value")]
    Absent { index: usize },

    /// A required service is not registered.
    #[error("service '{type_name}' is not registered")]
    ServiceNotFound { type_name: &'static str },

    /// Custom extraction error.
    #[error("{0}")]
    Custom(String),
}

impl ExtractError {
    /// Creates a custom extraction error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Returns `true` when an optional extractor should yield `None`.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::Absent { .. } | Self::ServiceNotFound { .. })
    }

    /// Converts the error into the fatal engine error reported for `command`.
    pub fn into_engine(self, command: &str) -> EngineError {
        match self {
            Self::TypeMismatch {
                index, expected, ..
            } => EngineError::ArgumentMismatch {
                command: command.to_string(),
                index,
                expected,
            },
            Self::Absent { index } => EngineError::ArgumentMismatch {
                command: command.to_string(),
                index,
                expected: "a bound value",
            },
            Self::ServiceNotFound { type_name } => EngineError::UnresolvedDependency {
                command: command.to_string(),
                type_name,
            },
            Self::Custom(msg) => EngineError::Internal(msg),
        }
    }
}

/// Result type for extraction operations.
pub type ExtractResult<T> = Result<T, ExtractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_mapping() {
        let err = ExtractError::ServiceNotFound { type_name: "Clock" }.into_engine("time");
        assert!(matches!(
            err,
            EngineError::UnresolvedDependency { ref command, type_name: "Clock" } if command == "time"
        ));

        let err = ExtractError::Absent { index: 2 }.into_engine("add");
        assert!(matches!(err, EngineError::ArgumentMismatch { index: 2, .. }));
        assert!(ExtractError::Absent { index: 0 }.is_absence());
        assert!(!ExtractError::custom("x").is_absence());
    }
}
