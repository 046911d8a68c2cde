//! The execution loop.
//!
//! ```text
//! Searching ─▶ for each candidate:
//!                Counting ─▶ Parsing ─▶ Checking ─▶ Invoking ─▶ Terminal
//!                    └──────────┴───────────┴── rejected: try the next one
//! ```
//!
//! The first candidate that reaches `Invoking` decides the request: its
//! success, its invoke failure, or its fatal error. If none gets that far
//! the most advanced rejection is reported.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::result::{ExecutionResult, Invoked};
use marshal_core::{
    ActivationError, Candidate, CommandMatch, ConditionContext, EngineError, ExecutionContext,
    ExecutionOptions, Failure, Input, Invocation, PipelineSettings, ServiceLookup, ServiceScope,
    Snapshot, bind, check_dependencies, condition::evaluate, search,
};

// =============================================================================
// Request scope
// =============================================================================

/// Resources owned by one request.
///
/// Released exactly once when dropped, on every exit path: the child
/// cancellation token is cancelled (stopping anything still listening) and
/// the external service scope, if any, is dropped.
pub(crate) struct RequestScope {
    token: CancellationToken,
    scope: Option<Box<dyn ServiceScope>>,
}

impl RequestScope {
    pub(crate) fn open(options: &ExecutionOptions, services: &dyn ServiceLookup) -> Self {
        let token = options
            .cancellation
            .as_ref()
            .map_or_else(CancellationToken::new, CancellationToken::child_token);
        Self {
            token,
            scope: services.create_scope(),
        }
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Lookup of the external scope, when the provider opened one.
    pub(crate) fn services(&self) -> Option<Arc<dyn ServiceLookup>> {
        self.scope.as_ref().map(|scope| scope.lookup())
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        self.token.cancel();
        trace!(scoped = self.scope.is_some(), "request scope released");
    }
}

// =============================================================================
// Loop
// =============================================================================

enum Attempt {
    /// The candidate was rejected before invocation.
    Rejected(Failure),
    /// The candidate reached invocation; the request is decided.
    Decided(Result<ExecutionResult, EngineError>),
}

/// Runs the search and candidate loop over one snapshot.
pub(crate) async fn run_pipeline(
    snapshot: &Snapshot,
    settings: &PipelineSettings,
    ctx: &Arc<ExecutionContext>,
    input: &Input,
    options: &ExecutionOptions,
) -> Result<ExecutionResult, EngineError> {
    if ctx.is_cancelled() {
        return Ok(Err(Failure::Cancelled));
    }

    let candidates = search(snapshot, &input.tokens);
    debug!(candidates = candidates.len(), "search finished");
    if candidates.is_empty() {
        return Ok(Err(Failure::CommandNotFound {
            input: input.display(),
        }));
    }

    let mut best: Option<Failure> = None;
    for candidate in &candidates {
        if ctx.is_cancelled() {
            return Ok(Err(Failure::Cancelled));
        }

        let Some(found) = candidate.command() else {
            if let Candidate::RouteIncomplete { path, .. } = candidate {
                record(&mut best, Failure::RouteIncomplete { group: path.clone() });
            }
            continue;
        };

        match attempt(found, settings, ctx, input, options).await {
            Attempt::Decided(outcome) => return outcome,
            Attempt::Rejected(failure) if failure.is_cancelled() => return Ok(Err(failure)),
            Attempt::Rejected(failure) => {
                debug!(
                    command = %found.path,
                    stage = ?failure.stage(),
                    reason = %failure,
                    "candidate rejected"
                );
                record(&mut best, failure);
            }
        }
    }

    Ok(Err(best.unwrap_or_else(|| Failure::CommandNotFound {
        input: input.display(),
    })))
}

/// Keeps the most advanced failure; the first one seen wins ties.
fn record(best: &mut Option<Failure>, failure: Failure) {
    if best
        .as_ref()
        .is_none_or(|current| failure.stage() > current.stage())
    {
        *best = Some(failure);
    }
}

async fn attempt(
    found: &CommandMatch,
    settings: &PipelineSettings,
    ctx: &Arc<ExecutionContext>,
    input: &Input,
    options: &ExecutionOptions,
) -> Attempt {
    let arguments = match bind(&found.command, &found.path, found.depth, input, ctx, settings).await {
        Ok(arguments) => arguments,
        Err(failure) => return Attempt::Rejected(failure),
    };

    if !options.skip_conditions {
        if ctx.is_cancelled() {
            return Attempt::Rejected(Failure::Cancelled);
        }
        let check = ConditionContext {
            execution: ctx,
            command: &found.path,
            arguments: &arguments,
        };
        if let Err(failure) = evaluate(&found.evaluators, &check).await {
            return Attempt::Rejected(failure);
        }
    }

    if ctx.is_cancelled() {
        return Attempt::Rejected(Failure::Cancelled);
    }

    let declared = found.command.activator().dependencies();
    if let Err(error) = check_dependencies(&found.path, declared, &**ctx.services()) {
        return Attempt::Decided(Err(error));
    }

    debug!(command = %found.path, arguments = arguments.len(), "invoking");
    let invocation = Invocation::new(found.path.as_str(), arguments, Arc::clone(ctx));
    let token = ctx.cancellation().clone();
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => return Attempt::Rejected(Failure::Cancelled),
        outcome = found.command.activator().invoke(invocation) => outcome,
    };

    Attempt::Decided(match outcome {
        Ok(value) => Ok(Ok(Invoked {
            command: found.path.clone(),
            value,
        })),
        Err(ActivationError::Invoke(error)) => Ok(Err(Failure::InvokeFailure {
            command: found.path.clone(),
            error,
        })),
        Err(ActivationError::Fatal(error)) => Err(error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use marshal_core::InvokeError;

    fn parse_failure() -> Failure {
        Failure::ParseFailure {
            command: "get".into(),
            parameter: "id".into(),
            parser: "i32".into(),
            reason: "bad".into(),
        }
    }

    fn count_failure() -> Failure {
        Failure::ArgumentCountMismatch {
            command: "get".into(),
            min: 1,
            max: Some(1),
            actual: 2,
        }
    }

    #[test]
    fn test_record_prefers_advanced_stage() {
        let mut best = None;
        record(&mut best, count_failure());
        record(&mut best, parse_failure());
        record(&mut best, Failure::RouteIncomplete { group: "get".into() });
        assert!(matches!(best, Some(Failure::ParseFailure { .. })));

        record(
            &mut best,
            Failure::InvokeFailure {
                command: "get".into(),
                error: InvokeError::msg("x"),
            },
        );
        assert!(matches!(best, Some(Failure::InvokeFailure { .. })));
    }

    #[test]
    fn test_record_first_wins_ties() {
        let mut best = None;
        record(&mut best, Failure::RouteIncomplete { group: "a".into() });
        record(&mut best, Failure::RouteIncomplete { group: "b".into() });
        assert!(matches!(best, Some(Failure::RouteIncomplete { ref group }) if group == "a"));
    }

    #[test]
    fn test_scope_cancels_child_on_drop() {
        let parent = CancellationToken::new();
        let options = ExecutionOptions::new().cancellation(parent.clone());
        let services = marshal_core::ServiceMap::new();
        let scope = RequestScope::open(&options, &services);
        let child = scope.token();
        assert!(!child.is_cancelled());
        drop(scope);
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_parent_cancellation_reaches_child() {
        let parent = CancellationToken::new();
        let scope = RequestScope::open(
            &ExecutionOptions::new().cancellation(parent.clone()),
            &marshal_core::ServiceMap::new(),
        );
        parent.cancel();
        assert!(scope.token().is_cancelled());
    }
}
