//! Handler, activator and tower integration.
//!
//! - **Handler** ([`traits`]) – the [`Handler`] and [`SyncHandler`] traits
//!   that adapt functions with parameter injection, similar to Axum's system
//! - **Activator** ([`activator`]) – [`HandlerActivator`] and
//!   [`ServiceActivator`], the [`Activator`](marshal_core::Activator)s a
//!   command is built with
//! - **Service** ([`service`]) – [`HandlerService`], which exposes a handler
//!   as a `tower::Service<Invocation>` so layers can wrap it
//!
//! ```text
//! fn(Arg<i64>, Service<dyn Clock>) -> i64
//!     │ Handler / SyncHandler
//!     ▼
//! HandlerActivator ──────────────┐
//!                                ├─▶ Arc<dyn Activator> on the Command
//! HandlerService + layers ──▶ ServiceActivator
//! ```

pub mod activator;
pub mod service;
pub mod traits;

pub use activator::{HandlerActivator, ServiceActivator};
pub use service::{BoxedCommandService, HandlerService, ServiceBuilderExt};
pub use traits::{BoxedHandler, Handler, IntoReturn, SyncHandler, into_handler, into_sync_handler};

pub use tower::Layer;
