//! Execution results and the handlers that consume them.
//!
//! Once the execution loop reaches a terminal state its result is offered to
//! every registered [`ResultHandler`], by ascending priority, until one
//! reports [`Handled::Yes`]. In detached mode this chain is the only place a
//! result ever surfaces.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use marshal_core::{ExecutionContext, Failure, FailureStage, Return, ServiceLookup};

/// A command that ran to completion.
#[derive(Debug, Clone)]
pub struct Invoked {
    /// Alias path of the command that ran.
    pub command: String,
    pub value: Return,
}

/// The structured outcome of one request.
pub type ExecutionResult = Result<Invoked, Failure>;

/// Whether a result handler consumed the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Yes,
    No,
}

/// A consumer of execution results.
#[async_trait]
pub trait ResultHandler: Send + Sync + 'static {
    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        result: &ExecutionResult,
        services: &dyn ServiceLookup,
    ) -> Handled;
}

/// Forwards non-void success values to the context's response sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseForwarder;

#[async_trait]
impl ResultHandler for ResponseForwarder {
    async fn handle(
        &self,
        ctx: &ExecutionContext,
        result: &ExecutionResult,
        _services: &dyn ServiceLookup,
    ) -> Handled {
        let Ok(Invoked {
            value: Return::Value(value),
            ..
        }) = result
        else {
            return Handled::No;
        };
        match ctx.response() {
            Some(sink) => {
                sink.respond(value).await;
                Handled::Yes
            }
            None => Handled::No,
        }
    }
}

/// Logs failures: not-found at `debug`, everything else at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureLogger;

#[async_trait]
impl ResultHandler for FailureLogger {
    fn priority(&self) -> i32 {
        -100
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        result: &ExecutionResult,
        _services: &dyn ServiceLookup,
    ) -> Handled {
        if let Err(failure) = result {
            let caller = ctx.caller().unwrap_or("-");
            match failure.stage() {
                FailureStage::NotFound | FailureStage::Cancelled => {
                    debug!(caller, failure = %failure, "request failed");
                }
                stage => warn!(caller, ?stage, failure = %failure, "request failed"),
            }
        }
        Handled::No
    }
}

/// Result handlers ordered by ascending priority.
///
/// Handlers of equal priority keep registration order.
#[derive(Clone, Default)]
pub struct ResultHandlers {
    handlers: Vec<Arc<dyn ResultHandler>>,
}

impl ResultHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default chain: [`FailureLogger`] then [`ResponseForwarder`].
    pub fn with_defaults() -> Self {
        let mut handlers = Self::new();
        handlers.push(Arc::new(FailureLogger));
        handlers.push(Arc::new(ResponseForwarder));
        handlers
    }

    pub fn push(&mut self, handler: Arc<dyn ResultHandler>) {
        let at = self
            .handlers
            .partition_point(|h| h.priority() <= handler.priority());
        self.handlers.insert(at, handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Offers `result` to each handler until one consumes it.
    pub async fn dispatch(&self, ctx: &ExecutionContext, result: &ExecutionResult) -> Handled {
        let services = Arc::clone(ctx.services());
        for handler in &self.handlers {
            if handler.handle(ctx, result, &*services).await == Handled::Yes {
                return Handled::Yes;
            }
        }
        Handled::No
    }
}

impl std::fmt::Debug for ResultHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultHandlers")
            .field("len", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use marshal_core::{ResponseSink, Value};
    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    #[async_trait]
    impl ResponseSink for Collect {
        async fn respond(&self, value: &Value) {
            self.0.lock().push(value.to_text().unwrap_or_default());
        }
    }

    struct Record {
        priority: i32,
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        outcome: Handled,
    }

    #[async_trait]
    impl ResultHandler for Record {
        fn priority(&self) -> i32 {
            self.priority
        }

        async fn handle(&self, _: &ExecutionContext, _: &ExecutionResult, _: &dyn ServiceLookup) -> Handled {
            self.seen.lock().push(self.label);
            self.outcome
        }
    }

    fn success(value: Return) -> ExecutionResult {
        Ok(Invoked {
            command: "echo".into(),
            value,
        })
    }

    #[tokio::test]
    async fn test_forwarder_sends_values_only() {
        let sink = Arc::new(Collect::default());
        let ctx = ExecutionContext::default().with_response(sink.clone());
        let forwarder = ResponseForwarder;
        let services = Arc::clone(ctx.services());

        let handled = forwarder
            .handle(&ctx, &success(Return::Value(Value::new("hi".to_string()))), &*services)
            .await;
        assert_eq!(handled, Handled::Yes);
        assert_eq!(forwarder.handle(&ctx, &success(Return::Void), &*services).await, Handled::No);
        assert_eq!(
            forwarder
                .handle(&ctx, &Err(Failure::Cancelled), &*services)
                .await,
            Handled::No
        );
        assert_eq!(*sink.0.lock(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_chain_order_and_stop() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut chain = ResultHandlers::new();
        for (priority, label, outcome) in [
            (10, "late", Handled::No),
            (0, "first", Handled::No),
            (5, "stop", Handled::Yes),
            (0, "second", Handled::No),
        ] {
            chain.push(Arc::new(Record {
                priority,
                label,
                seen: seen.clone(),
                outcome,
            }));
        }

        let handled = chain
            .dispatch(&ExecutionContext::default(), &success(Return::Void))
            .await;
        assert_eq!(handled, Handled::Yes);
        assert_eq!(*seen.lock(), vec!["first", "second", "stop"]);
    }
}
