//! Service injection.
//!
//! Three dependency kinds are recognised when a command is activated:
//!
//! - **required**: [`Service<T>`]; an unregistered service is a fatal
//!   [`EngineError::UnresolvedDependency`].
//! - **optional**: `Option<Service<T>>`; an unregistered service is `None`.
//! - **provider**: [`Services`]; the lookup handle itself.
//!
//! [`Instance<T>`] builds a receiver object from its declared dependencies
//! (or takes the registered one, if `T` itself is a service).

use std::any::TypeId;
use std::sync::Arc;

use marshal_core::{
    BoxError, Dependency, DependencyKind, EngineError, ServiceArc, ServiceLookup, ServiceLookupExt,
};

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractCx, FromInvocation};

/// A registered service, usually a trait object.
///
/// ```rust,ignore
/// async fn now(clock: Service<dyn Clock>) -> String {
///     clock.now().to_string()
/// }
/// ```
pub struct Service<T: ?Sized>(pub Arc<T>);

impl<T: ?Sized> std::ops::Deref for Service<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> Clone for Service<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized + 'static> FromInvocation for Service<T> {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        cx.context()
            .services()
            .get::<T>()
            .map(Service)
            .ok_or(ExtractError::ServiceNotFound {
                type_name: std::any::type_name::<T>(),
            })
    }

    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::required::<T>()]
    }
}

/// The service lookup of the running request.
#[derive(Clone)]
pub struct Services(pub Arc<dyn ServiceLookup>);

impl std::ops::Deref for Services {
    type Target = dyn ServiceLookup;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl FromInvocation for Services {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(Services(Arc::clone(cx.context().services())))
    }

    fn dependencies() -> Vec<Dependency> {
        vec![Dependency::provider()]
    }
}

// =============================================================================
// Dependency resolution
// =============================================================================

/// How one declared dependency was satisfied.
#[derive(Clone)]
pub enum Resolution {
    Service(ServiceArc),
    Absent,
    Provider(Arc<dyn ServiceLookup>),
}

/// Dependencies resolved in declaration order.
#[derive(Clone, Default)]
pub struct Resolved {
    entries: Vec<Resolution>,
}

impl Resolved {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Resolution> {
        self.entries.get(index)
    }

    /// The service at `index`, failing if it is absent or of another type.
    pub fn required<T: ?Sized + 'static>(&self, index: usize) -> Result<Arc<T>, BoxError> {
        self.optional::<T>(index).ok_or_else(|| {
            format!(
                "dependency {index} is not a '{}'",
                std::any::type_name::<T>()
            )
            .into()
        })
    }

    /// The service at `index`, or `None` if it was not registered.
    pub fn optional<T: ?Sized + 'static>(&self, index: usize) -> Option<Arc<T>> {
        match self.entries.get(index)? {
            Resolution::Service(arc) => arc.downcast_ref::<Arc<T>>().map(Arc::clone),
            Resolution::Absent | Resolution::Provider(_) => None,
        }
    }

    /// The lookup handle at `index`.
    pub fn provider(&self, index: usize) -> Option<Arc<dyn ServiceLookup>> {
        match self.entries.get(index)? {
            Resolution::Provider(lookup) => Some(Arc::clone(lookup)),
            _ => None,
        }
    }
}

/// Resolves `dependencies` against `lookup` on behalf of `command`.
///
/// A required dependency that cannot be resolved is fatal.
pub fn resolve_dependencies(
    command: &str,
    dependencies: &[Dependency],
    lookup: &Arc<dyn ServiceLookup>,
) -> Result<Resolved, EngineError> {
    let mut entries = Vec::with_capacity(dependencies.len());
    for dep in dependencies {
        let entry = match dep.kind {
            DependencyKind::Provider => Resolution::Provider(Arc::clone(lookup)),
            DependencyKind::Optional => lookup
                .resolve(dep.key.id())
                .map_or(Resolution::Absent, Resolution::Service),
            DependencyKind::Required => match lookup.resolve(dep.key.id()) {
                Some(service) => Resolution::Service(service),
                None => {
                    return Err(EngineError::UnresolvedDependency {
                        command: command.to_string(),
                        type_name: dep.key.name(),
                    });
                }
            },
        };
        entries.push(entry);
    }
    Ok(Resolved { entries })
}

// =============================================================================
// Instance
// =============================================================================

/// A receiver type built from injected services.
///
/// ```rust,ignore
/// struct Billing {
///     ledger: Arc<dyn Ledger>,
///     audit: Option<Arc<dyn Audit>>,
/// }
///
/// impl Injectable for Billing {
///     fn dependencies() -> Vec<Dependency> {
///         vec![Dependency::required::<dyn Ledger>(), Dependency::optional::<dyn Audit>()]
///     }
///
///     fn inject(deps: &Resolved) -> Result<Self, BoxError> {
///         Ok(Self { ledger: deps.required(0)?, audit: deps.optional(1) })
///     }
/// }
/// ```
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<Dependency>;

    fn inject(dependencies: &Resolved) -> Result<Self, BoxError>;
}

/// The receiver instance of a command.
///
/// Taken from the lookup when `T` is registered there, otherwise built with
/// [`Injectable::inject`] for this call.
pub struct Instance<T>(pub Arc<T>);

impl<T> std::ops::Deref for Instance<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Injectable> FromInvocation for Instance<T> {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        let lookup = cx.context().services();
        if let Some(registered) = lookup.get::<T>() {
            return Ok(Instance(registered));
        }

        let resolved = resolve_dependencies(cx.command(), &T::dependencies(), lookup)
            .map_err(|e| match e {
                EngineError::UnresolvedDependency { type_name, .. } => {
                    ExtractError::ServiceNotFound { type_name }
                }
                other => ExtractError::custom(other.to_string()),
            })?;
        T::inject(&resolved)
            .map(|instance| Instance(Arc::new(instance)))
            .map_err(|e| {
                ExtractError::custom(format!(
                    "cannot build '{}': {e}",
                    std::any::type_name::<T>()
                ))
            })
    }

    /// A registered `T` needs none of its own dependencies, so they are
    /// only checked when the instance is built.
    fn dependencies() -> Vec<Dependency> {
        T::dependencies()
            .into_iter()
            .map(|dep| match dep.kind {
                DependencyKind::Required => Dependency {
                    kind: DependencyKind::Optional,
                    ..dep
                },
                _ => dep,
            })
            .collect()
    }
}

/// Returns `true` if `lookup` can resolve `T`.
pub fn has_service<T: ?Sized + 'static>(lookup: &dyn ServiceLookup) -> bool {
    lookup.resolve(TypeId::of::<T>()).is_some()
}

#[cfg(test)]
mod tests {
    use marshal_core::{Arguments, ExecutionContext, Invocation, ServiceMap};

    use super::*;

    trait Clock: Send + Sync {
        fn now(&self) -> u64;
    }

    struct Fixed(u64);

    impl Clock for Fixed {
        fn now(&self) -> u64 {
            self.0
        }
    }

    struct Audit;

    struct Report {
        clock: Arc<dyn Clock>,
        audit: Option<Arc<Audit>>,
        lookup: Arc<dyn ServiceLookup>,
    }

    impl Injectable for Report {
        fn dependencies() -> Vec<Dependency> {
            vec![
                Dependency::required::<dyn Clock>(),
                Dependency::optional::<Audit>(),
                Dependency::provider(),
            ]
        }

        fn inject(deps: &Resolved) -> Result<Self, BoxError> {
            Ok(Self {
                clock: deps.required(0)?,
                audit: deps.optional(1),
                lookup: deps.provider(2).ok_or("no provider")?,
            })
        }
    }

    fn invocation(services: ServiceMap) -> Invocation {
        Invocation::new(
            "report",
            Arguments::default(),
            Arc::new(ExecutionContext::new(Arc::new(services))),
        )
    }

    #[test]
    fn test_service_extraction() {
        let inv = invocation(ServiceMap::new().with::<dyn Clock>(Arc::new(Fixed(7))));
        let mut cx = ExtractCx::new(&inv);
        let clock = Service::<dyn Clock>::from_invocation(&mut cx).unwrap();
        assert_eq!(clock.now(), 7);
        assert!(
            Option::<Service<Audit>>::from_invocation(&mut cx)
                .unwrap()
                .is_none()
        );
        assert!(matches!(
            Service::<Audit>::from_invocation(&mut cx),
            Err(ExtractError::ServiceNotFound { .. })
        ));
    }

    #[test]
    fn test_dependency_kinds_declared() {
        assert_eq!(
            <Option<Service<Audit>>>::dependencies(),
            vec![Dependency::optional::<Audit>()]
        );
        assert_eq!(Services::dependencies()[0].kind, DependencyKind::Provider);
    }

    #[test]
    fn test_instance_injection() {
        let inv = invocation(ServiceMap::new().with::<dyn Clock>(Arc::new(Fixed(3))));
        let mut cx = ExtractCx::new(&inv);
        let report = Instance::<Report>::from_invocation(&mut cx).unwrap();
        assert_eq!(report.clock.now(), 3);
        assert!(report.audit.is_none());
        assert!(has_service::<dyn Clock>(&*report.lookup));
    }

    #[test]
    fn test_instance_declares_soft_dependencies() {
        let declared = Instance::<Report>::dependencies();
        assert_eq!(declared[0], Dependency::optional::<dyn Clock>());
        assert_eq!(declared[2].kind, DependencyKind::Provider);
    }

    #[test]
    fn test_instance_missing_required() {
        let inv = invocation(ServiceMap::new());
        let mut cx = ExtractCx::new(&inv);
        let err = Instance::<Report>::from_invocation(&mut cx).err().unwrap();
        assert!(matches!(err, ExtractError::ServiceNotFound { .. }));
    }

    #[test]
    fn test_resolve_required_is_fatal() {
        let lookup: Arc<dyn ServiceLookup> = Arc::new(ServiceMap::new());
        let err = resolve_dependencies("report", &[Dependency::required::<Audit>()], &lookup)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::UnresolvedDependency { .. }));

        let resolved = resolve_dependencies("report", &[Dependency::optional::<Audit>()], &lookup).unwrap();
        assert!(matches!(resolved.get(0), Some(Resolution::Absent)));
    }
}
