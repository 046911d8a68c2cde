//! # Marshal Framework
//!
//! The user-facing layer of the Marshal command dispatcher.
//!
//! This layer provides:
//! - [`CommandManager`]: registration, snapshots and the execution loop
//! - Builders for commands and groups
//! - Axum-style handler functions with typed extractors
//! - Tower integration: any `Service<Invocation>` can back a command
//! - Result handlers that consume terminal outcomes
//!
//! The matching, parsing and binding machinery itself lives in
//! [`marshal_core`], re-exported here as [`core`].

pub mod builder;
pub mod error;
mod executor;
pub mod extractor;
pub mod handler;
pub mod input;
pub mod manager;
pub mod result;

pub use marshal_core as core;

pub use builder::{CommandBuilder, GroupBuilder};
pub use error::{ExtractError, ExtractResult};
pub use extractor::{
    Arg, Args, Caller, Cancellation, CommandPath, ExtractCx, FromInvocation, Injectable, Instance, RawArg,
    Service, Services,
};
pub use handler::{
    BoxedCommandService, BoxedHandler, Handler, HandlerActivator, HandlerService, IntoReturn,
    ServiceActivator, ServiceBuilderExt, SyncHandler, into_handler, into_sync_handler,
};
pub use input::{InputError, Request};
pub use manager::{CommandManager, Execution, GroupHandle};
pub use result::{
    ExecutionResult, FailureLogger, Handled, Invoked, ResponseForwarder, ResultHandler, ResultHandlers,
};
