//! # Marshal
//!
//! A typed, overload-aware command dispatcher.
//!
//! ## Overview
//!
//! Commands live in a tree of named groups. Each command declares typed
//! parameters and a handler; several overloads may share a name. Given a
//! tokenized line, Marshal finds every command the tokens can reach, tries
//! them best-first, converts raw tokens into typed arguments, checks
//! preconditions and runs the first candidate that fits.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────┐   ┌────────────┐   ┌───────────────────────────────┐   ┌─────────┐
//! │   Host   │──▶│ Search │──▶│ candidates │──▶│ count ▶ parse ▶ check ▶ invoke│──▶│ Results │
//! │ (tokens) │   │snapshot│   │ best-first │   │  rejected: try the next one   │   │handlers │
//! └──────────┘   └────────┘   └────────────┘   └───────────────────────────────┘   └─────────┘
//! ```
//!
//! - **Core**: values, parsers, parameters, the component tree, search and binding
//! - **Framework**: builders, axum-style handlers, tower services, the execution loop
//! - **Runtime**: configuration, logging, tokenizer and [`CommandHost`](runtime::CommandHost)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use marshal::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let host = CommandHost::builder().build()?;
//!     let math = host.manager().add_group(GroupBuilder::new(["math", "m"]))?;
//!     math.add_command(
//!         CommandBuilder::new(["add"])
//!             .param(ParameterSpec::of::<i64>("a"))
//!             .param(ParameterSpec::of::<i64>("b"))
//!             .handler(|Arg(a): Arg<i64>, Arg(b): Arg<i64>| async move { a + b }),
//!     )?;
//!
//!     let result = host.run_line(ExecutionContext::default(), "m add 3 4").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: `marshal.toml` configuration files (default)
//! - `yaml-config`: `marshal.yaml` configuration files
//! - `json-log`: JSON log output

pub use marshal_core as core;
pub use marshal_framework as framework;
pub use marshal_runtime as runtime;

/// Commonly used types.
///
/// ```rust,ignore
/// use marshal::prelude::*;
/// ```
pub mod prelude {
    // Hosting
    pub use marshal_runtime::{CommandHost, MarshalConfig, tokenize};

    // Registration
    pub use marshal_core::{ConditionSpec, ParameterSpec, Parent, TypeParser, condition_fn};
    pub use marshal_framework::{CommandBuilder, CommandManager, GroupBuilder};

    // Handlers and extractors
    pub use marshal_framework::extractor::{
        Arg, Args, Caller, Cancellation, CommandPath, FromInvocation, Injectable, Instance, RawArg,
        Service, Services,
    };
    pub use marshal_framework::handler::{HandlerService, Layer, ServiceBuilderExt};

    // Execution
    pub use marshal_core::{
        ExecutionContext, ExecutionOptions, Failure, Input, ResponseSink, ServiceMap, Unmet, Value,
    };
    pub use marshal_framework::{Execution, ExecutionResult, Handled, Invoked, ResultHandler};
}
