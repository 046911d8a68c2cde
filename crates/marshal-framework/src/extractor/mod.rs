//! Extractor system for the Marshal framework.
//!
//! This module provides the [`FromInvocation`] trait and built-in
//! implementations that let handler functions declare what they need:
//!
//! | Extractor | Source | Positional |
//! |---|---|---|
//! | [`Arg<T>`] | next bound argument, downcast to `T` | yes |
//! | [`RawArg`] | next bound argument, untouched | yes |
//! | [`Args`] | all bound arguments | no |
//! | `Arc<ExecutionContext>` | the request context | no |
//! | [`Service<T>`] | a registered service | no |
//! | [`Services`] | the service lookup itself | no |
//! | [`Instance<T>`] | an injected receiver object | no |
//! | [`Caller`], [`Cancellation`], [`CommandPath`] | request metadata | no |
//!
//! Non-positional extractors may appear anywhere in the signature.
//! `Option<E>` turns absence into `None`.

pub mod argument;
pub mod context;
pub mod core;
pub mod service;

pub use argument::{Arg, Args, RawArg};
pub use context::{Caller, Cancellation, CommandPath};
pub use self::core::{ExtractCx, FromInvocation};
pub use service::{Injectable, Instance, Resolution, Resolved, Service, Services, resolve_dependencies};
