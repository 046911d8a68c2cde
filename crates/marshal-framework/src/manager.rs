//! The command manager: registration front-end and request entry point.
//!
//! [`CommandManager`] owns the component tree, the type-parser registry and
//! the result-handler chain. It is cheap to clone; clones share state.
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = CommandManager::new();
//! manager.add_command(
//!     CommandBuilder::new(["echo"])
//!         .param(ParameterSpec::of::<String>("text").remainder())
//!         .handler(|Arg(text): Arg<String>| async move { text }),
//! )?;
//!
//! let outcome = manager
//!     .execute(ExecutionContext::default(), Input::new(["echo", "hi"]), ExecutionOptions::new())
//!     .await?;
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, debug_span, error};

use crate::builder::{CommandBuilder, GroupBuilder};
use crate::executor::{RequestScope, run_pipeline};
use crate::result::{ExecutionResult, ResultHandler, ResultHandlers};
use marshal_core::{
    BuildResult, CommandEntry, ComponentId, ComponentTree, EngineError, ExecutionContext, ExecutionMode,
    ExecutionOptions, Input, Parent, ParserRegistry, PipelineSettings, Snapshot, TreeSettings,
    TypeParser,
};

/// What [`CommandManager::execute`] hands back.
#[derive(Debug)]
pub enum Execution {
    /// Blocking mode: the final result (already offered to the result handlers).
    Completed(ExecutionResult),
    /// Detached mode: the pipeline runs in the background and its result
    /// reaches the result handlers only.
    Detached(JoinHandle<()>),
}

impl Execution {
    pub fn into_result(self) -> Option<ExecutionResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Detached(_) => None,
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Self::Detached(_))
    }
}

struct ManagerInner {
    tree: ComponentTree,
    parsers: RwLock<ParserRegistry>,
    pipeline: PipelineSettings,
    results: RwLock<ResultHandlers>,
}

/// Registry and dispatcher of commands.
#[derive(Clone)]
pub struct CommandManager {
    inner: Arc<ManagerInner>,
}

impl Default for CommandManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandManager {
    /// A manager with default naming rules, the built-in parsers and the
    /// default result handlers.
    pub fn new() -> Self {
        Self::with_settings(TreeSettings::default(), PipelineSettings::default())
    }

    pub fn with_settings(tree: TreeSettings, pipeline: PipelineSettings) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tree: ComponentTree::new(tree),
                parsers: RwLock::new(ParserRegistry::with_defaults()),
                pipeline,
                results: RwLock::new(ResultHandlers::with_defaults()),
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Adds a command at the root.
    pub fn add_command(&self, command: CommandBuilder) -> BuildResult<ComponentId> {
        self.add_command_to(Parent::Root, command)
    }

    /// Adds a command under `parent`.
    pub fn add_command_to(&self, parent: Parent, command: CommandBuilder) -> BuildResult<ComponentId> {
        let draft = command.build(&self.inner.parsers.read())?;
        self.inner.tree.insert(draft, parent)
    }

    /// Adds a group at the root and returns a handle for filling it.
    pub fn add_group(&self, group: GroupBuilder) -> BuildResult<GroupHandle<'_>> {
        self.add_group_to(Parent::Root, group)
    }

    /// Adds a group under `parent`.
    pub fn add_group_to(&self, parent: Parent, group: GroupBuilder) -> BuildResult<GroupHandle<'_>> {
        let id = self.inner.tree.insert(group.build(), parent)?;
        Ok(GroupHandle { manager: self, id })
    }

    /// Handle for an existing group.
    pub fn group(&self, id: ComponentId) -> GroupHandle<'_> {
        GroupHandle { manager: self, id }
    }

    /// Registers (or replaces) the parser for its target type.
    ///
    /// Only commands registered afterwards see the new parser.
    pub fn add_type_parser<P: TypeParser>(&self, parser: P) -> Option<Arc<dyn TypeParser>> {
        let target = parser.target();
        let previous = self.inner.parsers.write().insert(parser);
        debug!(target = %target, replaced = previous.is_some(), "type parser registered");
        previous
    }

    pub fn add_result_handler<H: ResultHandler>(&self, handler: H) {
        self.inner.results.write().push(Arc::new(handler));
    }

    /// Detaches a component. Returns `false` if it was not bound.
    pub fn remove(&self, id: ComponentId) -> bool {
        self.inner.tree.remove(id)
    }

    /// Re-attaches a detached component.
    pub fn attach(&self, id: ComponentId, parent: Parent) -> BuildResult<()> {
        self.inner.tree.attach(id, parent)
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    pub fn tree(&self) -> &ComponentTree {
        &self.inner.tree
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.tree.snapshot()
    }

    /// Every reachable command with its full alias path.
    pub fn commands(&self) -> Vec<CommandEntry> {
        self.inner.tree.commands()
    }

    pub fn pipeline_settings(&self) -> &PipelineSettings {
        &self.inner.pipeline
    }

    // ---------------------------------------------------------------------
    // Execution
    // ---------------------------------------------------------------------

    /// Executes `input` in the mode selected by `options`.
    ///
    /// Failures are part of the [`ExecutionResult`]; only engine
    /// misconfiguration is returned as `Err`. In detached mode a fatal error
    /// is logged instead.
    pub async fn execute(
        &self,
        ctx: ExecutionContext,
        input: Input,
        options: ExecutionOptions,
    ) -> Result<Execution, EngineError> {
        match options.mode() {
            ExecutionMode::Blocking => self.run(ctx, input, options).await.map(Execution::Completed),
            ExecutionMode::Detached => {
                let manager = self.clone();
                let handle = tokio::spawn(async move {
                    if let Err(error) = manager.run(ctx, input, options).await {
                        error!(error = %error, "detached execution failed");
                    }
                });
                Ok(Execution::Detached(handle))
            }
        }
    }

    /// Runs the pipeline to completion regardless of the requested mode.
    pub async fn run(
        &self,
        ctx: ExecutionContext,
        input: Input,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult, EngineError> {
        let scope = RequestScope::open(&options, &**ctx.services());
        let ctx = match scope.services() {
            Some(scoped) => ctx.with_services(scoped),
            None => ctx,
        };
        let ctx = Arc::new(ctx.prepare(&options, scope.token()));

        let snapshot = self.inner.tree.snapshot();
        let span = debug_span!(
            "execute",
            input = %input.display(),
            caller = ctx.caller().unwrap_or("-"),
            version = snapshot.version()
        );

        let result = run_pipeline(&snapshot, &self.inner.pipeline, &ctx, &input, &options)
            .instrument(span.clone())
            .await?;

        let handlers = self.inner.results.read().clone();
        handlers.dispatch(&ctx, &result).instrument(span).await;
        drop(scope);
        Ok(result)
    }
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("components", &self.inner.tree.len())
            .field("parsers", &self.inner.parsers.read().len())
            .field("result_handlers", &self.inner.results.read().len())
            .finish()
    }
}

// =============================================================================
// GroupHandle
// =============================================================================

/// A registered group, for adding members.
#[derive(Clone, Copy)]
pub struct GroupHandle<'m> {
    manager: &'m CommandManager,
    id: ComponentId,
}

impl<'m> GroupHandle<'m> {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn add_command(&self, command: CommandBuilder) -> BuildResult<ComponentId> {
        self.manager.add_command_to(Parent::Group(self.id), command)
    }

    pub fn add_group(&self, group: GroupBuilder) -> BuildResult<GroupHandle<'m>> {
        self.manager.add_group_to(Parent::Group(self.id), group)
    }
}
