//! # Marshal Core
//!
//! The core engine of the Marshal command dispatcher.
//!
//! Given a tree of named, nested commands and a tokenised input, the core
//! finds the best-matching overload, converts raw tokens into typed
//! arguments, checks preconditions and hands the result to an activator.
//! It performs no I/O of its own; the only side channel is `tracing`.
//!
//! ## Layers
//!
//! Leaf to root:
//!
//! - **Values** ([`Value`], [`Arguments`]): type-erased data moving between stages
//! - **Parsers** ([`TypeParser`], [`ParserRegistry`]): raw token to typed value
//! - **Parameters** ([`ParameterSpec`], [`Parameter`]): simple, remainder,
//!   collection and constructible parameters
//! - **Component tree** ([`ComponentTree`], [`Snapshot`]): commands and groups
//!   in an arena, published by atomic snapshot swap
//! - **Search** ([`search()`]): depth-first alias matching into ordered candidates
//! - **Pipeline** ([`bind`]): per-candidate argument binding
//! - **Conditions** ([`Condition`], [`Evaluator`]): grouped AND/OR gates
//! - **Activation** ([`Activator`]): the capability that runs a command
//!
//! ## Data flow
//!
//! ```text
//! tokens ──▶ search(snapshot) ──▶ candidates ──▶ count ─▶ parse ─▶ check ─▶ invoke
//!                                     ▲                                      │
//!                                     └──────── fallthrough on failure ──────┘
//! ```
//!
//! The loop that drives these stages lives in `marshal-framework`.

pub mod activator;
pub mod component;
pub mod condition;
pub mod context;
pub mod error;
pub mod parameter;
pub mod parser;
pub mod pipeline;
pub mod search;
pub mod value;

pub use activator::{
    ActivationError, Activator, Dependency, DependencyKind, FnActivator, Invocation, activator_fn,
    check_dependencies,
};
pub use component::{
    Attributes, Command, CommandEntry, ComponentDraft, ComponentId, ComponentKind, ComponentTree, Node,
    NodeKind, Parent, Snapshot, TreeSettings,
};
pub use condition::{
    Combinator, Condition, ConditionContext, ConditionEvaluator, ConditionSpec, Evaluator, Order, Unmet,
    condition_fn,
};
pub use context::{
    ExecutionContext, ExecutionMode, ExecutionOptions, ResponseSink, ServiceArc, ServiceLookup,
    ServiceLookupExt, ServiceMap, ServiceScope,
};
pub use error::{
    BoxError, BuildError, BuildResult, EngineError, Failure, FailureStage, InvokeError, ParseError,
    ParseResult,
};
pub use parameter::{Bounds, CollectionKind, Parameter, ParameterSpec};
pub use parser::{
    BoolParser, DurationParser, FnParser, FromStrParser, ParseContext, ParserRegistry, TypeParser,
};
pub use pipeline::{Input, PipelineSettings, bind};
pub use search::{Candidate, CommandMatch, search};
pub use value::{Argument, Arguments, Return, TypeKey, Value};
