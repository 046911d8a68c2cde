//! [`Activator`] implementations backed by handlers and tower services.
//!
//! Both catch panics at the invocation boundary and report them as
//! [`InvokeError`]s, so a panicking command fails its own request and
//! nothing else.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tower::{BoxError, Service, ServiceExt};
use tracing::warn;

use super::service::BoxedCommandService;
use super::traits::{BoxedHandler, Handler, SyncHandler, into_handler, into_sync_handler};
use marshal_core::{ActivationError, Activator, Dependency, Invocation, InvokeError, Return};

/// Runs a handler function.
pub struct HandlerActivator {
    handler: BoxedHandler,
    dependencies: Vec<Dependency>,
}

impl HandlerActivator {
    /// Activator for an async handler.
    pub fn new<H, T>(handler: H) -> Self
    where
        H: Handler<T>,
        T: 'static,
    {
        Self {
            handler: into_handler(handler),
            dependencies: H::dependencies(),
        }
    }

    /// Activator for a synchronous handler.
    pub fn from_sync<H, T>(handler: H) -> Self
    where
        H: SyncHandler<T>,
        T: 'static,
    {
        Self {
            handler: into_sync_handler(handler),
            dependencies: H::dependencies(),
        }
    }
}

impl fmt::Debug for HandlerActivator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerActivator")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Activator for HandlerActivator {
    fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Return, ActivationError> {
        let handler = Arc::clone(&self.handler);
        let command = Arc::clone(&invocation.command);
        guarded(&command, async move { handler(invocation).await }).await
    }
}

/// Runs a tower service.
#[derive(Clone)]
pub struct ServiceActivator {
    service: BoxedCommandService,
}

impl ServiceActivator {
    pub fn new<S>(service: S) -> Self
    where
        S: Service<Invocation, Response = Return, Error = BoxError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        Self {
            service: BoxedCommandService::new(service),
        }
    }
}

#[async_trait]
impl Activator for ServiceActivator {
    async fn invoke(&self, invocation: Invocation) -> Result<Return, ActivationError> {
        let service = self.service.clone();
        let command = Arc::clone(&invocation.command);
        guarded(&command, async move {
            service
                .oneshot(invocation)
                .await
                .map_err(activation_error)
        })
        .await
    }
}

/// Recovers an [`ActivationError`] travelling through a tower stack.
fn activation_error(error: BoxError) -> ActivationError {
    match error.downcast::<ActivationError>() {
        Ok(error) => *error,
        Err(other) => ActivationError::Invoke(InvokeError::new(other)),
    }
}

async fn guarded<F>(command: &str, call: F) -> Result<Return, ActivationError>
where
    F: Future<Output = Result<Return, ActivationError>> + Send,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let error = InvokeError::from_panic(payload);
            warn!(command, error = %error, "command panicked");
            Err(ActivationError::Invoke(error))
        }
    }
}
