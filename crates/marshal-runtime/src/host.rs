//! Hosting a [`CommandManager`].
//!
//! [`CommandHost`] turns configuration into a ready manager and offers the
//! two entry points a front end needs:
//!
//! - blocking: [`run_line`](CommandHost::run_line) awaits the full pipeline
//!   and returns the result
//! - fire-and-forget: [`spawn_line`](CommandHost::spawn_line) returns at once;
//!   the result reaches the registered result handlers only
//!
//! ```rust,ignore
//! let host = CommandHost::builder().profile("production").build()?;
//! host.manager().add_command(CommandBuilder::new(["ping"]).handler_sync(|| "pong"))?;
//! let stats = host.serve(lines, ExecutionContext::default).await;
//! ```

use std::path::Path;

use futures::{Stream, StreamExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, EngineConfig, MarshalConfig};
use crate::error::RuntimeResult;
use crate::logging;
use crate::tokenize::tokenize;
use marshal_core::{ExecutionContext, ExecutionOptions, Input};
use marshal_framework::{CommandManager, Execution, ExecutionResult, Request};

/// Counters returned by [`CommandHost::serve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    /// Non-blank lines read.
    pub lines: usize,
    /// Lines handed to the engine.
    pub dispatched: usize,
    /// Lines that could not be tokenized.
    pub malformed: usize,
}

/// A configured command manager plus its request defaults.
#[derive(Debug, Clone)]
pub struct CommandHost {
    config: MarshalConfig,
    manager: CommandManager,
    shutdown: CancellationToken,
}

impl CommandHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// Initialises logging from `config` and builds the manager.
    pub fn from_config(config: &MarshalConfig) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);
        let host = Self::from_engine(&config.engine)?;

        info!(
            log_level = %config.logging.level,
            case_sensitive = config.engine.case_sensitive,
            detached = config.engine.detached,
            "Command host initialised from configuration"
        );
        Ok(Self {
            config: config.clone(),
            ..host
        })
    }

    /// Builds the manager from engine settings only; logging is untouched.
    pub fn from_engine(engine: &EngineConfig) -> RuntimeResult<Self> {
        let manager = CommandManager::with_settings(engine.tree_settings()?, engine.pipeline_settings());
        Ok(Self {
            config: MarshalConfig {
                engine: engine.clone(),
                ..Default::default()
            },
            manager,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    pub fn manager(&self) -> &CommandManager {
        &self.manager
    }

    /// Request options from the engine configuration, linked to the host's
    /// shutdown signal.
    pub fn options(&self) -> ExecutionOptions {
        self.config
            .engine
            .execution_options()
            .cancellation(self.shutdown.clone())
    }

    /// Cancels every request in flight and every later one.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    // ---------------------------------------------------------------------
    // Blocking
    // ---------------------------------------------------------------------

    /// Tokenizes `line` and runs it to completion.
    pub async fn run_line(&self, ctx: ExecutionContext, line: &str) -> RuntimeResult<ExecutionResult> {
        let input = Input::new(tokenize(line)?);
        self.run_input(ctx, input).await
    }

    /// Runs a JSON [`Request`] to completion.
    pub async fn run_json(&self, ctx: ExecutionContext, json: &str) -> RuntimeResult<ExecutionResult> {
        let input = Request::from_json(json)?.into_input()?;
        self.run_input(ctx, input).await
    }

    /// Runs an already decoded JSON [`Request`] to completion.
    pub async fn run_value(
        &self,
        ctx: ExecutionContext,
        request: serde_json::Value,
    ) -> RuntimeResult<ExecutionResult> {
        let request: Request = serde_json::from_value(request).map_err(marshal_framework::InputError::from)?;
        self.run_input(ctx, request.into_input()?).await
    }

    pub async fn run_input(&self, ctx: ExecutionContext, input: Input) -> RuntimeResult<ExecutionResult> {
        let options = self.options().async_mode(false);
        Ok(self.manager.run(ctx, input, options).await?)
    }

    // ---------------------------------------------------------------------
    // Fire-and-forget
    // ---------------------------------------------------------------------

    /// Tokenizes `line` and runs it detached. The returned
    /// [`Execution::Detached`] handle completes once the result handlers have
    /// seen the result.
    pub async fn spawn_line(&self, ctx: ExecutionContext, line: &str) -> RuntimeResult<Execution> {
        let input = Input::new(tokenize(line)?);
        let options = self.options().async_mode(true);
        Ok(self.manager.execute(ctx, input, options).await?)
    }

    // ---------------------------------------------------------------------
    // Serving
    // ---------------------------------------------------------------------

    /// Feeds every line of `lines` to the engine until the stream ends, the
    /// host is shut down or a shutdown signal arrives.
    ///
    /// Lines run in the configured mode. Outcomes are reported through the
    /// result handlers; malformed lines and engine errors are logged and
    /// skipped.
    pub async fn serve<S, F>(&self, lines: S, context: F) -> ServeStats
    where
        S: Stream<Item = String>,
        F: Fn() -> ExecutionContext,
    {
        let mut stats = ServeStats::default();
        let mut lines = std::pin::pin!(lines);
        let interrupt = shutdown_signal();
        tokio::pin!(interrupt);

        info!("Command host is serving. Press Ctrl+C to stop.");
        loop {
            let line = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = &mut interrupt => {
                    self.shutdown();
                    break;
                }
                line = lines.next() => match line {
                    Some(line) => line,
                    None => break,
                },
            };

            if line.trim().is_empty() {
                continue;
            }
            stats.lines += 1;

            let tokens = match tokenize(&line) {
                Ok(tokens) => tokens,
                Err(error) => {
                    warn!(%error, line = %line, "Skipping malformed line");
                    stats.malformed += 1;
                    continue;
                }
            };

            stats.dispatched += 1;
            match self
                .manager
                .execute(context(), Input::new(tokens), self.options())
                .await
            {
                Ok(Execution::Completed(result)) => {
                    debug!(ok = result.is_ok(), "Line executed");
                }
                Ok(Execution::Detached(_)) => {}
                Err(error) => error!(%error, line = %line, "Command misconfigured"),
            }
        }

        info!(
            lines = stats.lines,
            dispatched = stats.dispatched,
            malformed = stats.malformed,
            "Command host stopped"
        );
        stats
    }
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(error) => warn!(%error, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(error) => {
            error!(%error, "Failed to listen for Ctrl+C");
            futures::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// HostBuilder
// =============================================================================

/// Loads configuration, then builds a [`CommandHost`].
pub struct HostBuilder {
    config_loader: ConfigLoader,
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn merge(mut self, config: MarshalConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    pub fn build(self) -> RuntimeResult<CommandHost> {
        let config = self.config_loader.load()?;
        CommandHost::from_config(&config)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use marshal_core::{Failure, ParameterSpec, ResponseSink, ServiceLookup, Value};
    use marshal_framework::{Arg, CommandBuilder, GroupBuilder, Handled, ResultHandler};
    use tokio::sync::mpsc;

    use super::*;
    use crate::error::RuntimeError;

    fn host() -> CommandHost {
        let host = CommandHost::from_engine(&EngineConfig::default()).unwrap();
        let math = host.manager().add_group(GroupBuilder::new(["math"])).unwrap();
        math.add_command(
            CommandBuilder::new(["add"])
                .param(ParameterSpec::of::<i64>("a"))
                .param(ParameterSpec::of::<i64>("b"))
                .handler(|Arg(a): Arg<i64>, Arg(b): Arg<i64>| async move { a + b }),
        )
        .unwrap();
        host.manager()
            .add_command(
                CommandBuilder::new(["say"])
                    .param(ParameterSpec::of::<String>("text").remainder())
                    .handler_sync(|Arg(text): Arg<String>| text),
            )
            .unwrap();
        host
    }

    fn text(result: &ExecutionResult) -> Option<String> {
        result.as_ref().ok()?.value.value()?.to_text()
    }

    #[tokio::test]
    async fn test_run_line() {
        let host = host();
        let result = host.run_line(ExecutionContext::default(), "math add 3 4").await.unwrap();
        assert_eq!(text(&result).as_deref(), Some("7"));

        let result = host
            .run_line(ExecutionContext::default(), r#"say "hello   world" again"#)
            .await
            .unwrap();
        assert_eq!(text(&result).as_deref(), Some("hello   world again"));
    }

    #[test]
    fn test_run_line_from_sync_code() {
        let host = host();
        let result = tokio_test::block_on(host.run_line(ExecutionContext::default(), "say plain")).unwrap();
        assert_eq!(text(&result).as_deref(), Some("plain"));
    }

    #[tokio::test]
    async fn test_malformed_line() {
        let err = host()
            .run_line(ExecutionContext::default(), "say 'unterminated")
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Tokenize(_)));
    }

    #[tokio::test]
    async fn test_run_json_named() {
        let host = host();
        let result = host
            .run_json(
                ExecutionContext::default(),
                r#"{"tokens": ["math", "add", "1"], "named": {"b": 41}}"#,
            )
            .await
            .unwrap();
        assert_eq!(text(&result).as_deref(), Some("42"));

        let result = host
            .run_value(
                ExecutionContext::default(),
                serde_json::json!({"tokens": ["math", "add", "2", "3"]}),
            )
            .await
            .unwrap();
        assert_eq!(text(&result).as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_requests() {
        let host = host();
        host.shutdown();
        assert!(host.is_shut_down());
        let result = host.run_line(ExecutionContext::default(), "math add 1 2").await.unwrap();
        assert!(matches!(result, Err(Failure::Cancelled)));
    }

    struct Forward(mpsc::UnboundedSender<String>);

    #[async_trait]
    impl ResultHandler for Forward {
        async fn handle(&self, _: &ExecutionContext, result: &ExecutionResult, _: &dyn ServiceLookup) -> Handled {
            let _ = self.0.send(text(result).unwrap_or_else(|| "<failed>".into()));
            Handled::No
        }
    }

    #[tokio::test]
    async fn test_spawn_line_reaches_handlers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let host = host();
        host.manager().add_result_handler(Forward(tx));

        let execution = host
            .spawn_line(ExecutionContext::default(), "math add 20 22")
            .await
            .unwrap();
        let Execution::Detached(handle) = execution else {
            panic!("expected a detached execution");
        };
        handle.await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("42"));
    }

    #[derive(Default)]
    struct Collect(parking_lot::Mutex<Vec<String>>);

    #[async_trait]
    impl ResponseSink for Collect {
        async fn respond(&self, value: &Value) {
            self.0.lock().push(value.to_text().unwrap_or_default());
        }
    }

    #[tokio::test]
    async fn test_serve_lines() {
        let host = host();
        let sink = Arc::new(Collect::default());
        let lines = futures::stream::iter(
            ["math add 1 1", "", "say 'broken", "nope", "say done"].map(String::from),
        );

        let stats = host
            .serve(lines, || ExecutionContext::default().with_response(sink.clone()))
            .await;
        assert_eq!(
            stats,
            ServeStats {
                lines: 4,
                dispatched: 3,
                malformed: 1
            }
        );
        assert_eq!(*sink.0.lock(), vec!["2".to_string(), "done".to_string()]);
    }
}
