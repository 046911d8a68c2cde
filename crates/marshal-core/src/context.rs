//! Per-invocation execution context and the capabilities it carries.
//!
//! One [`ExecutionContext`] is created for every top-level request. It is
//! owned exclusively by that request and shared (via `Arc`) only with the
//! stages that run on its behalf: parsers, conditions and the command body.
//!
//! The context exposes three external capabilities:
//!
//! - [`ServiceLookup`]: the service-locator front-end used by activators.
//! - [`ResponseSink`]: where non-void command results are forwarded.
//! - A [`CancellationToken`] honoured at every suspension point.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::value::Value;

/// Type alias for the heterogeneous values stored in a service lookup.
///
/// The inner `dyn Any` is an `Arc<T>` (possibly `Arc<dyn Trait>`) upcast to
/// `Any`; consumers downcast it back with [`ServiceLookupExt::get`].
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

// =============================================================================
// Service Lookup
// =============================================================================

/// Capability for resolving services by type.
pub trait ServiceLookup: Send + Sync {
    /// Resolves the service registered under `type_id`.
    fn resolve(&self, type_id: TypeId) -> Option<ServiceArc>;

    /// Opens a per-request scope, if the provider supports scoping.
    ///
    /// The returned scope lives exactly as long as the request and is
    /// released when dropped.
    fn create_scope(&self) -> Option<Box<dyn ServiceScope>> {
        None
    }
}

/// A per-request service scope supplied by an external provider.
///
/// Dropping the scope releases whatever it holds.
pub trait ServiceScope: Send + Sync {
    /// Lookup that resolves services within this scope.
    fn lookup(&self) -> Arc<dyn ServiceLookup>;
}

/// Typed helpers on top of [`ServiceLookup`].
pub trait ServiceLookupExt {
    /// Resolves and downcasts the service stored for `T`.
    fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>>;
}

impl<L: ServiceLookup + ?Sized> ServiceLookupExt for L {
    fn get<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.resolve(TypeId::of::<T>())
            .and_then(|arc| arc.downcast_ref::<Arc<T>>().map(Arc::clone))
    }
}

/// A simple map-backed [`ServiceLookup`].
///
/// ```rust,ignore
/// let mut services = ServiceMap::new();
/// services.insert::<dyn Clock>(Arc::new(SystemClock));
/// let clock = services.get::<dyn Clock>().unwrap();
/// ```
#[derive(Clone, Default)]
pub struct ServiceMap {
    services: HashMap<TypeId, ServiceArc>,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `service` under the type `T`, replacing any previous entry.
    pub fn insert<T: ?Sized + Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services
            .insert(TypeId::of::<T>(), Arc::new(service) as ServiceArc);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with<T: ?Sized + Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.insert(service);
        self
    }

    pub fn contains<T: ?Sized + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl ServiceLookup for ServiceMap {
    fn resolve(&self, type_id: TypeId) -> Option<ServiceArc> {
        self.services.get(&type_id).cloned()
    }
}

impl fmt::Debug for ServiceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMap")
            .field("len", &self.services.len())
            .finish()
    }
}

// =============================================================================
// Response Sink
// =============================================================================

/// Receives the non-void values produced by successful commands.
#[async_trait]
pub trait ResponseSink: Send + Sync {
    async fn respond(&self, value: &Value);
}

// =============================================================================
// Execution Options
// =============================================================================

/// How the caller waits for the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// The caller awaits the full pipeline and receives the result.
    #[default]
    Blocking,
    /// The pipeline runs detached; only result handlers see the result.
    Detached,
}

/// Per-request execution options.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Skip all condition evaluation (trusted re-invocation paths).
    pub skip_conditions: bool,
    /// Separator used to join scalar remainder tokens.
    pub remainder_separator: char,
    /// Run detached instead of blocking the caller.
    pub async_mode: bool,
    /// External cancellation signal, linked to the request's own token.
    pub cancellation: Option<CancellationToken>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            skip_conditions: false,
            remainder_separator: ' ',
            async_mode: false,
            cancellation: None,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip_conditions(mut self, skip: bool) -> Self {
        self.skip_conditions = skip;
        self
    }

    pub fn remainder_separator(mut self, separator: char) -> Self {
        self.remainder_separator = separator;
        self
    }

    pub fn async_mode(mut self, enabled: bool) -> Self {
        self.async_mode = enabled;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        if self.async_mode {
            ExecutionMode::Detached
        } else {
            ExecutionMode::Blocking
        }
    }
}

// =============================================================================
// ExecutionContext
// =============================================================================

/// The ephemeral context for a single request.
///
/// Callers construct one with [`ExecutionContext::new`] and the builder
/// methods; the executor then stamps the per-request fields (mode, separator,
/// cancellation, scoped services) before the pipeline starts.
pub struct ExecutionContext {
    caller: Option<String>,
    services: Arc<dyn ServiceLookup>,
    response: Option<Arc<dyn ResponseSink>>,
    cancellation: CancellationToken,
    mode: ExecutionMode,
    separator: char,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ExecutionContext {
    /// Creates a context resolving services from `services`.
    pub fn new(services: Arc<dyn ServiceLookup>) -> Self {
        Self {
            caller: None,
            services,
            response: None,
            cancellation: CancellationToken::new(),
            mode: ExecutionMode::Blocking,
            separator: ' ',
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the caller identity.
    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// Sets the sink that receives non-void results.
    pub fn with_response(mut self, sink: Arc<dyn ResponseSink>) -> Self {
        self.response = Some(sink);
        self
    }

    /// Replaces the service lookup (used when a request scope is opened).
    pub fn with_services(mut self, services: Arc<dyn ServiceLookup>) -> Self {
        self.services = services;
        self
    }

    /// Stamps the per-request fields derived from [`ExecutionOptions`].
    pub fn prepare(mut self, options: &ExecutionOptions, cancellation: CancellationToken) -> Self {
        self.mode = options.mode();
        self.separator = options.remainder_separator;
        self.cancellation = cancellation;
        self
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    pub fn services(&self) -> &Arc<dyn ServiceLookup> {
        &self.services
    }

    pub fn response(&self) -> Option<&Arc<dyn ResponseSink>> {
        self.response.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn separator(&self) -> char {
        self.separator
    }

    /// Stores a value in this request's state map.
    ///
    /// Only one value per type can be stored; subsequent calls overwrite.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a cloned value from the state map.
    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    /// Removes and returns a value from the state map.
    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Arc::new(ServiceMap::new()))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("caller", &self.caller)
            .field("mode", &self.mode)
            .field("separator", &self.separator)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_service_map_trait_objects() {
        let services = ServiceMap::new().with::<dyn Greeter>(Arc::new(English));
        let greeter = services.get::<dyn Greeter>().unwrap();
        assert_eq!(greeter.greet(), "hello");
        assert!(services.get::<English>().is_none());
    }

    #[test]
    fn test_state_roundtrip() {
        let ctx = ExecutionContext::default();
        ctx.set_state(7_u8);
        assert_eq!(ctx.get_state::<u8>(), Some(7));
        assert_eq!(ctx.take_state::<u8>(), Some(7));
        assert_eq!(ctx.get_state::<u8>(), None);
    }

    #[test]
    fn test_prepare_applies_options() {
        let token = CancellationToken::new();
        let ctx = ExecutionContext::default().with_caller("tester").prepare(
            &ExecutionOptions::new().async_mode(true).remainder_separator(','),
            token.clone(),
        );
        assert_eq!(ctx.mode(), ExecutionMode::Detached);
        assert_eq!(ctx.separator(), ',');
        assert_eq!(ctx.caller(), Some("tester"));
        token.cancel();
        assert!(ctx.is_cancelled());
    }
}
