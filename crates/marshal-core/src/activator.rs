//! The capability object that runs a resolved command.
//!
//! Every command owns exactly one [`Activator`], created once at
//! registration. The executor hands it an [`Invocation`] holding the bound
//! arguments and the execution context; the activator resolves whatever it
//! needs from the service lookup and runs the command body.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{ExecutionContext, ServiceLookup};
use crate::error::{EngineError, InvokeError};
use crate::value::{Arguments, Return, TypeKey};

/// Everything a command body needs for one call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Alias path of the command being invoked (`"math add"`).
    pub command: Arc<str>,
    /// Bound arguments, one slot per declared parameter.
    pub arguments: Arguments,
    /// The request's execution context.
    pub context: Arc<ExecutionContext>,
}

impl Invocation {
    pub fn new(command: impl Into<Arc<str>>, arguments: Arguments, context: Arc<ExecutionContext>) -> Self {
        Self {
            command: command.into(),
            arguments,
            context,
        }
    }
}

/// How a declared dependency is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    /// Must resolve; an unresolved dependency aborts the request.
    Required,
    /// Resolves to `None` when the lookup has no entry.
    Optional,
    /// The service lookup handle itself.
    Provider,
}

/// One dependency of a command's receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub key: TypeKey,
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn required<T: ?Sized + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            kind: DependencyKind::Required,
        }
    }

    pub fn optional<T: ?Sized + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            kind: DependencyKind::Optional,
        }
    }

    pub fn provider() -> Self {
        Self {
            key: TypeKey::of::<dyn crate::context::ServiceLookup>(),
            kind: DependencyKind::Provider,
        }
    }
}

/// Fails on the first required dependency `lookup` cannot resolve.
///
/// Run before every invocation, so a misconfigured command aborts before
/// its body starts.
pub fn check_dependencies(
    command: &str,
    dependencies: &[Dependency],
    lookup: &dyn ServiceLookup,
) -> Result<(), EngineError> {
    let missing = dependencies
        .iter()
        .find(|dep| dep.kind == DependencyKind::Required && lookup.resolve(dep.key.id()).is_none());
    match missing {
        Some(dep) => Err(EngineError::UnresolvedDependency {
            command: command.to_string(),
            type_name: dep.key.name(),
        }),
        None => Ok(()),
    }
}

/// Why an activation did not return a value.
#[derive(Debug, Clone)]
pub enum ActivationError {
    /// The command body failed. Reported as a dispatch failure.
    Invoke(InvokeError),
    /// The activator itself is misconfigured. Aborts the request.
    Fatal(EngineError),
}

impl From<InvokeError> for ActivationError {
    fn from(error: InvokeError) -> Self {
        Self::Invoke(error)
    }
}

impl From<EngineError> for ActivationError {
    fn from(error: EngineError) -> Self {
        Self::Fatal(error)
    }
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invoke(e) => write!(f, "{e}"),
            Self::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ActivationError {}

/// Runs a command body.
#[async_trait]
pub trait Activator: Send + Sync + 'static {
    /// Services the receiver needs, in injection order.
    fn dependencies(&self) -> &[Dependency] {
        &[]
    }

    /// Invokes the command with the bound arguments.
    async fn invoke(&self, invocation: Invocation) -> Result<Return, ActivationError>;
}

/// An [`Activator`] backed by a plain async closure.
///
/// Mostly useful for tests and for commands that read their arguments
/// positionally; handler functions with extractors live in the framework.
pub struct FnActivator<F, Fut> {
    f: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnActivator<F, Fut>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Return, ActivationError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> Activator for FnActivator<F, Fut>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Return, ActivationError>> + Send + 'static,
{
    async fn invoke(&self, invocation: Invocation) -> Result<Return, ActivationError> {
        (self.f)(invocation).await
    }
}

/// Shorthand for `Arc::new(FnActivator::new(f))`.
pub fn activator_fn<F, Fut>(f: F) -> Arc<dyn Activator>
where
    F: Fn(Invocation) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Return, ActivationError>> + Send + 'static,
{
    Arc::new(FnActivator::new(f))
}
