//! Error types for the Marshal core.
//!
//! Three families live here:
//!
//! - [`BuildError`]: registration-time mistakes (bad names, misplaced
//!   remainder parameters, missing parsers). These are returned from the
//!   registration API and never surface during dispatch.
//! - [`Failure`]: the expected, non-fatal outcomes of a dispatch that did not
//!   succeed. They are values, not panics.
//! - [`EngineError`]: misconfiguration discovered while invoking a command.
//!   These propagate to the caller as hard errors.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error type used by command bodies and type-erased services.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Registration Errors
// =============================================================================

/// Errors raised while building or binding components.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    /// An alias does not satisfy the configured naming pattern.
    #[error("invalid component name '{name}': does not match pattern '{pattern}'")]
    InvalidName { name: String, pattern: String },

    /// The naming pattern itself failed to compile.
    #[error("invalid naming pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// More than one parameter was marked as remainder.
    #[error("parameter '{parameter}' is a second remainder parameter")]
    DuplicateRemainder { parameter: String },

    /// A remainder parameter was declared before the last position.
    #[error("remainder parameter '{parameter}' must be the last parameter")]
    RemainderNotLast { parameter: String },

    /// No parser is registered for a parameter type.
    #[error("no type parser registered for '{type_name}' (parameter '{parameter}')")]
    MissingParser {
        parameter: String,
        type_name: &'static str,
    },

    /// An evaluator received more conditions than it allows.
    #[error("evaluator '{evaluator}' accepts at most {max} conditions, got {actual}")]
    ConditionCapExceeded {
        evaluator: String,
        max: usize,
        actual: usize,
    },

    /// The component is already bound to another parent.
    #[error("component {id} is already bound to another parent")]
    AlreadyBound { id: usize },

    /// Binding would make a group its own descendant.
    #[error("binding component {id} under {parent} would create a cycle")]
    Cycle { id: usize, parent: usize },

    /// The referenced component id does not exist.
    #[error("unknown component {id}")]
    UnknownComponent { id: usize },

    /// The target of an add is not a group.
    #[error("component {id} is not a group")]
    NotAGroup { id: usize },

    #[error("command '{name}' has no handler")]
    MissingHandler { name: String },
}

impl BuildError {
    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

// =============================================================================
// Parse Errors
// =============================================================================

/// A type parser rejected its input.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{reason}")]
pub struct ParseError {
    reason: String,
}

impl ParseError {
    /// Creates a parse error with a custom reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Creates the canonical "cannot convert" error.
    pub fn invalid(input: &str, target: impl fmt::Display) -> Self {
        Self::new(format!("'{input}' is not a valid {target}"))
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

// =============================================================================
// Invocation Errors
// =============================================================================

/// A command body failed while running.
///
/// Wraps the original error (or a caught panic) and keeps it shareable so the
/// failure can be handed to several result handlers.
#[derive(Clone)]
pub struct InvokeError {
    source: Arc<dyn std::error::Error + Send + Sync>,
}

impl InvokeError {
    /// Wraps a boxed error.
    pub fn new(error: BoxError) -> Self {
        Self {
            source: Arc::from(error),
        }
    }

    /// Creates an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::new(message.into())
    }

    /// Converts a caught panic payload into an error.
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "command panicked".to_string()
        };
        Self::msg(format!("panic: {message}"))
    }

    /// The innermost cause in the error's `source()` chain.
    pub fn innermost(&self) -> &(dyn std::error::Error + 'static) {
        let mut current: &(dyn std::error::Error + 'static) = &*self.source;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }

    /// The error as originally raised by the command body.
    pub fn outer(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.source
    }
}

impl fmt::Debug for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InvokeError").field(&self.source).finish()
    }
}

impl fmt::Display for InvokeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.innermost())
    }
}

impl std::error::Error for InvokeError {}

// =============================================================================
// Fatal Engine Errors
// =============================================================================

/// Unexpected errors that abort the whole request.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A required dependency could not be resolved from the service lookup.
    #[error("required dependency '{type_name}' of command '{command}' could not be resolved")]
    UnresolvedDependency {
        command: String,
        type_name: &'static str,
    },

    /// The handler's extractors disagree with the declared parameter list.
    #[error("argument {index} of command '{command}' cannot be extracted as '{expected}'")]
    ArgumentMismatch {
        command: String,
        index: usize,
        expected: &'static str,
    },

    /// Any other internal invariant violation.
    #[error("internal engine error: {0}")]
    Internal(String),
}

// =============================================================================
// Dispatch Failures
// =============================================================================

/// Why a dispatch did not produce a successful invocation.
///
/// Ordered by [`FailureStage`] so the executor can report the failure that
/// got furthest through the pipeline.
#[derive(Debug, Clone, Error)]
pub enum Failure {
    /// No alias path matched the input.
    #[error("no command matches '{input}'")]
    CommandNotFound { input: String },

    /// A named group matched but nothing runnable was found beneath it.
    #[error("'{group}' requires a subcommand")]
    RouteIncomplete { group: String },

    /// The remaining token count does not fit the command's bounds.
    #[error("command '{command}' expects {} arguments, got {actual}", display_bounds(.min, .max))]
    ArgumentCountMismatch {
        command: String,
        min: usize,
        max: Option<usize>,
        actual: usize,
    },

    /// A parameter's parser rejected its input.
    #[error("failed to parse parameter '{parameter}' of '{command}' with {parser}: {reason}")]
    ParseFailure {
        command: String,
        parameter: String,
        parser: String,
        reason: String,
    },

    /// A precondition group failed.
    #[error("condition '{condition}' of '{command}' was not met: {message}")]
    ConditionUnmet {
        command: String,
        condition: String,
        message: String,
    },

    /// The command body raised an error or panicked.
    #[error("command '{command}' failed: {error}")]
    InvokeFailure { command: String, error: InvokeError },

    /// Cooperative cancellation was observed.
    #[error("execution was cancelled")]
    Cancelled,
}

fn display_bounds(min: &usize, max: &Option<usize>) -> String {
    match *max {
        Some(max) if max == *min => format!("{min}"),
        Some(max) => format!("{min} to {max}"),
        None => format!("at least {min}"),
    }
}

/// The pipeline stage a failure was produced in.
///
/// The derived ordering is the preference order used when several
/// candidates fail: later stages explain the caller's intent better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureStage {
    NotFound,
    Route,
    Count,
    Parse,
    Condition,
    Invoke,
    Cancelled,
}

impl Failure {
    /// The stage this failure belongs to.
    pub fn stage(&self) -> FailureStage {
        match self {
            Self::CommandNotFound { .. } => FailureStage::NotFound,
            Self::RouteIncomplete { .. } => FailureStage::Route,
            Self::ArgumentCountMismatch { .. } => FailureStage::Count,
            Self::ParseFailure { .. } => FailureStage::Parse,
            Self::ConditionUnmet { .. } => FailureStage::Condition,
            Self::InvokeFailure { .. } => FailureStage::Invoke,
            Self::Cancelled => FailureStage::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for registration operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for parser operations.
pub type ParseResult<T> = Result<T, ParseError>;
