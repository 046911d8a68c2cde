//! Builders for commands and groups.
//!
//! ```rust,ignore
//! let math = manager.add_group(GroupBuilder::new(["math", "m"]))?;
//! math.add_command(
//!     CommandBuilder::new(["add"])
//!         .param(ParameterSpec::of::<i64>("a"))
//!         .param(ParameterSpec::of::<i64>("b"))
//!         .handler(|Arg(a): Arg<i64>, Arg(b): Arg<i64>| async move { a + b }),
//! )?;
//! ```

use std::sync::Arc;

use tower::{BoxError, Service};

use crate::handler::{Handler, HandlerActivator, ServiceActivator, SyncHandler};
use marshal_core::{
    Activator, Attributes, BuildError, BuildResult, Command, ComponentDraft, Condition, ConditionSpec,
    Invocation, ParameterSpec, ParserRegistry, Return,
};

fn names_of(names: impl IntoIterator<Item = impl Into<String>>) -> Vec<String> {
    names.into_iter().map(Into::into).collect()
}

// =============================================================================
// CommandBuilder
// =============================================================================

/// Declares one command overload.
#[must_use]
pub struct CommandBuilder {
    names: Vec<String>,
    parameters: Vec<ParameterSpec>,
    attributes: Attributes,
    description: Option<String>,
    activator: Option<Arc<dyn Activator>>,
}

impl CommandBuilder {
    /// A command reachable under each of `names`.
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names_of(names),
            parameters: Vec::new(),
            attributes: Attributes::default(),
            description: None,
            activator: None,
        }
    }

    /// An unnamed command, tried whenever its parent group is reached.
    pub fn default_command() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn param(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn params(mut self, specs: impl IntoIterator<Item = ParameterSpec>) -> Self {
        self.parameters.extend(specs);
        self
    }

    pub fn condition(mut self, spec: ConditionSpec) -> Self {
        self.attributes.conditions.push(spec);
        self
    }

    /// Adds an `And` condition.
    pub fn require(self, condition: Arc<dyn Condition>) -> Self {
        self.condition(ConditionSpec::and(condition))
    }

    pub fn priority(mut self, priority: f32) -> Self {
        self.attributes.priority = priority;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.metadata.insert(key.into(), value.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Runs an async handler function.
    pub fn handler<H, T>(self, handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        self.activator(Arc::new(HandlerActivator::new(handler)))
    }

    /// Runs a synchronous handler function.
    pub fn handler_sync<H, T>(self, handler: H) -> Self
    where
        H: SyncHandler<T>,
        T: 'static,
    {
        self.activator(Arc::new(HandlerActivator::from_sync(handler)))
    }

    /// Runs a tower service, typically a layered [`HandlerService`](crate::handler::HandlerService).
    pub fn service<S>(self, service: S) -> Self
    where
        S: Service<Invocation, Response = Return, Error = BoxError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.activator(Arc::new(ServiceActivator::new(service)))
    }

    /// Runs a custom activator.
    pub fn activator(mut self, activator: Arc<dyn Activator>) -> Self {
        self.activator = Some(activator);
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Resolves parameters against `registry` and produces the tree draft.
    pub fn build(self, registry: &ParserRegistry) -> BuildResult<ComponentDraft> {
        let Some(activator) = self.activator else {
            return Err(BuildError::MissingHandler {
                name: self.names.first().cloned().unwrap_or_default(),
            });
        };
        let mut command = Command::new(self.parameters, registry, activator)?;
        if let Some(description) = self.description {
            command = command.with_description(description);
        }
        Ok(ComponentDraft::command(self.names, command).with_attributes(self.attributes))
    }
}

// =============================================================================
// GroupBuilder
// =============================================================================

/// Declares a group of commands.
///
/// Conditions declared on a group are inherited by every command beneath it.
#[must_use]
pub struct GroupBuilder {
    names: Vec<String>,
    attributes: Attributes,
}

impl GroupBuilder {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names_of(names),
            attributes: Attributes::default(),
        }
    }

    /// An unnamed group; its members are searched as if they were siblings
    /// of the group.
    pub fn default_group() -> Self {
        Self::new(Vec::<String>::new())
    }

    pub fn condition(mut self, spec: ConditionSpec) -> Self {
        self.attributes.conditions.push(spec);
        self
    }

    /// Adds an `And` condition.
    pub fn require(self, condition: Arc<dyn Condition>) -> Self {
        self.condition(ConditionSpec::and(condition))
    }

    pub fn priority(mut self, priority: f32) -> Self {
        self.attributes.priority = priority;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.metadata.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ComponentDraft {
        ComponentDraft::group(self.names).with_attributes(self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use marshal_core::{ComponentKind, Unmet, condition_fn};

    use super::*;
    use crate::extractor::Arg;

    #[test]
    fn test_command_without_handler() {
        let err = CommandBuilder::new(["ping"])
            .build(&ParserRegistry::with_defaults())
            .err()
            .unwrap();
        assert_eq!(err, BuildError::MissingHandler { name: "ping".into() });
    }

    #[test]
    fn test_command_draft() {
        let draft = CommandBuilder::new(["add", "plus"])
            .param(ParameterSpec::of::<i64>("a"))
            .param(ParameterSpec::of::<i64>("b"))
            .priority(2.0)
            .description("adds two numbers")
            .require(condition_fn("always", |_| Ok::<(), Unmet>(())))
            .handler(|Arg(a): Arg<i64>, Arg(b): Arg<i64>| async move { a + b })
            .build(&ParserRegistry::with_defaults())
            .unwrap();

        assert_eq!(draft.names, vec!["add", "plus"]);
        assert_eq!(draft.attributes.priority, 2.0);
        assert_eq!(draft.attributes.conditions.len(), 1);
        let ComponentKind::Command(command) = &draft.kind else {
            panic!("expected a command");
        };
        assert_eq!(command.min_length(), 2);
        assert_eq!(command.description(), Some("adds two numbers"));
        assert_eq!(command.usage(), "<a> <b>");
    }

    #[test]
    fn test_missing_parser_surfaces() {
        struct Opaque;
        let err = CommandBuilder::new(["x"])
            .param(ParameterSpec::of::<Opaque>("o"))
            .handler_sync(|| ())
            .build(&ParserRegistry::with_defaults())
            .err()
            .unwrap();
        assert!(matches!(err, BuildError::MissingParser { .. }));
    }

    #[test]
    fn test_group_draft() {
        let draft = GroupBuilder::new(["admin"]).metadata("hidden", "true").build();
        assert!(matches!(draft.kind, ComponentKind::Group));
        assert_eq!(draft.attributes.metadata.get("hidden").map(String::as_str), Some("true"));
    }
}
