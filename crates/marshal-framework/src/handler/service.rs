//! Tower integration for command bodies.
//!
//! [`HandlerService<H, T>`] wraps a single handler and implements
//! `tower::Service<Invocation>`. Timeouts, filters and other cross-cutting
//! concerns are ordinary tower [`Layer`]s stacked *on top*; the finished
//! service is registered with
//! [`CommandBuilder::service`](crate::builder::CommandBuilder::service).
//!
//! ```text
//! ServiceBuilder::new()
//!     .filter(only_admins)   ← any tower layer
//!     .handler(my_handler)   ← HandlerService + stacked layers
//! ```

use std::marker::PhantomData;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use tower::util::BoxCloneSyncService;
use tower::{BoxError, Layer, Service, ServiceBuilder};

use super::traits::Handler;
use marshal_core::{Invocation, Return};

/// A type-erased, `Clone + Send + Sync` tower service serving a command.
///
/// Errors that are [`ActivationError`](marshal_core::ActivationError)s keep
/// their meaning; any other error is reported as an invoke failure.
pub type BoxedCommandService = BoxCloneSyncService<Invocation, Return, BoxError>;

// ============================================================================
// HandlerService
// ============================================================================

/// A tower [`Service`] that calls a single generic handler.
///
/// Holds the handler directly with no heap allocation. Cloning goes through
/// `H: Clone` (guaranteed by the [`Handler`] bound).
pub struct HandlerService<H, T> {
    handler: H,
    // PhantomData<fn() -> T> is Send + Sync regardless of T.
    _marker: PhantomData<fn() -> T>,
}

impl<H: Clone, T> Clone for HandlerService<H, T> {
    fn clone(&self) -> Self {
        HandlerService {
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

impl<H, T> HandlerService<H, T>
where
    H: Handler<T>,
{
    /// Wraps `handler` in a `HandlerService`.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

/// Allows `HandlerService::new(f)` to be omitted in favour of `f.into()`.
impl<H, T> From<H> for HandlerService<H, T>
where
    H: Handler<T>,
{
    fn from(handler: H) -> Self {
        HandlerService::new(handler)
    }
}

impl<H, T> Service<Invocation> for HandlerService<H, T>
where
    H: Handler<T>,
    T: 'static,
{
    type Response = Return;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Return, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let handler = self.handler.clone();
        async move {
            handler
                .call(invocation)
                .await
                .map_err(|e| Box::new(e) as BoxError)
        }
        .boxed()
    }
}

// ============================================================================
// ServiceBuilderExt
// ============================================================================

/// Extension trait for [`tower::ServiceBuilder`] that finishes a layer
/// stack with a handler function.
pub trait ServiceBuilderExt<L> {
    /// Wrap `handler` in a [`HandlerService`] and apply all stacked layers.
    ///
    /// Equivalent to `.service(HandlerService::new(handler))`.
    fn handler<H, T>(self, handler: H) -> L::Service
    where
        H: Handler<T>,
        L: Layer<HandlerService<H, T>>;
}

impl<L> ServiceBuilderExt<L> for ServiceBuilder<L> {
    fn handler<H, T>(self, handler: H) -> L::Service
    where
        H: Handler<T>,
        L: Layer<HandlerService<H, T>>,
    {
        self.service(HandlerService::new(handler))
    }
}
