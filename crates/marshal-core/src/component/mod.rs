//! The component tree: commands nested in named groups.
//!
//! Components live in an arena owned by [`ComponentTree`] and are addressed
//! by stable [`ComponentId`]s. Each mutation publishes a fresh immutable
//! [`Snapshot`]; readers (the search engine) work on one snapshot for their
//! whole duration and never block writers.
//!
//! ```text
//! root
//! ├── math            (group)
//! │   ├── add         (command: a:i64 b:i64)
//! │   └── (default)   (command: expr...)
//! └── get / fetch     (command, two overloads)
//! ```

mod score;
mod tree;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::activator::Activator;
use crate::condition::{ConditionEvaluator, ConditionSpec};
use crate::error::{BuildError, BuildResult};
use crate::parameter::{Bounds, Parameter, ParameterSpec, resolve_all};
use crate::parser::ParserRegistry;

pub use score::{command_score, group_score, sort_by_score};
pub use tree::{CommandEntry, ComponentTree, DEFAULT_NAME_PATTERN, Snapshot, TreeSettings};

/// Stable arena index of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) usize);

impl ComponentId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where a component is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Root,
    Group(ComponentId),
}

/// Declarative attributes shared by commands and groups.
#[derive(Debug, Clone, Default)]
pub struct Attributes {
    /// Added to the component's score.
    pub priority: f32,
    /// Conditions declared on this component.
    pub conditions: Vec<ConditionSpec>,
    /// Free-form string markers.
    pub metadata: BTreeMap<String, String>,
}

// =============================================================================
// Command
// =============================================================================

/// An executable leaf.
pub struct Command {
    parameters: Vec<Parameter>,
    bounds: Bounds,
    has_remainder: bool,
    activator: Arc<dyn Activator>,
    description: Option<String>,
}

impl Command {
    /// Resolves `specs` against `registry` and builds a command.
    pub fn new(
        specs: Vec<ParameterSpec>,
        registry: &ParserRegistry,
        activator: Arc<dyn Activator>,
    ) -> BuildResult<Self> {
        Ok(Self::from_parameters(resolve_all(specs, registry)?, activator))
    }

    /// Builds a command from already resolved parameters.
    pub fn from_parameters(parameters: Vec<Parameter>, activator: Arc<dyn Activator>) -> Self {
        let bounds = Bounds::of(&parameters);
        let has_remainder = parameters.last().is_some_and(Parameter::is_remainder);
        Self {
            parameters,
            bounds,
            has_remainder,
            activator,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn min_length(&self) -> usize {
        self.bounds.min
    }

    /// `None` when the last parameter is a remainder.
    pub fn max_length(&self) -> Option<usize> {
        self.bounds.max
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn has_remainder(&self) -> bool {
        self.has_remainder
    }

    pub fn activator(&self) -> &Arc<dyn Activator> {
        &self.activator
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// One-line usage string (`<a> <b> [rest...]`).
    pub fn usage(&self) -> String {
        self.parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("parameters", &self.parameters)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Drafts and nodes
// =============================================================================

/// What a component is.
#[derive(Clone)]
pub enum ComponentKind {
    Command(Arc<Command>),
    Group,
}

/// A component that has not been added to a tree yet.
#[derive(Clone)]
pub struct ComponentDraft {
    pub names: Vec<String>,
    pub attributes: Attributes,
    pub kind: ComponentKind,
}

impl ComponentDraft {
    pub fn command(names: impl IntoIterator<Item = impl Into<String>>, command: Command) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            attributes: Attributes::default(),
            kind: ComponentKind::Command(Arc::new(command)),
        }
    }

    pub fn group(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            attributes: Attributes::default(),
            kind: ComponentKind::Group,
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_condition(mut self, spec: ConditionSpec) -> Self {
        self.attributes.conditions.push(spec);
        self
    }

    pub fn with_priority(mut self, priority: f32) -> Self {
        self.attributes.priority = priority;
        self
    }
}

/// Children of a group, or of the root.
#[derive(Debug, Clone, Default)]
pub struct Children {
    /// Declaration order.
    pub declared: Vec<ComponentId>,
    /// Score-sorted view, recomputed on every mutation.
    pub ordered: Vec<ComponentId>,
}

/// Arena payload of a component.
#[derive(Clone)]
pub enum NodeKind {
    Command {
        command: Arc<Command>,
        /// Own conditions while unbound; inherited ones are merged in on attach.
        evaluators: Arc<[ConditionEvaluator]>,
    },
    Group(Children),
}

/// One component as seen in a snapshot.
#[derive(Clone)]
pub struct Node {
    pub(crate) id: ComponentId,
    pub(crate) names: Vec<String>,
    /// Names normalised for matching.
    pub(crate) keys: Vec<String>,
    pub(crate) parent: Option<Parent>,
    pub(crate) attributes: Arc<Attributes>,
    pub(crate) kind: NodeKind,
    pub(crate) score: f32,
}

impl Node {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The first alias, or `None` for default components.
    pub fn primary_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn parent(&self) -> Option<Parent> {
        self.parent
    }

    pub fn is_bound(&self) -> bool {
        self.parent.is_some()
    }

    pub fn is_default(&self) -> bool {
        self.names.is_empty()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn command(&self) -> Option<&Arc<Command>> {
        match &self.kind {
            NodeKind::Command { command, .. } => Some(command),
            NodeKind::Group(_) => None,
        }
    }

    /// Returns `true` when `key` (already normalised) is one of the aliases.
    pub(crate) fn matches(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(if self.is_group() { "Group" } else { "Command" })
            .field("id", &self.id)
            .field("names", &self.names)
            .field("parent", &self.parent)
            .field("score", &self.score)
            .finish_non_exhaustive()
    }
}

pub(crate) fn not_a_group(id: ComponentId) -> BuildError {
    BuildError::NotAGroup { id: id.0 }
}
