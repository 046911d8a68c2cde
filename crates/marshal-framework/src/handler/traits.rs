//! Handler system for the Marshal framework.
//!
//! Command bodies are plain functions. The [`Handler`] trait is implemented
//! for async functions and [`SyncHandler`] for synchronous ones, both for
//! arities 0 to 12, similar to Axum's handler system.
//!
//! # Example
//!
//! ```rust,ignore
//! use marshal::prelude::*;
//!
//! // No parameters, no result
//! async fn ping() {}
//!
//! // Positional arguments and a value result
//! async fn add(Arg(a): Arg<i64>, Arg(b): Arg<i64>) -> i64 {
//!     a + b
//! }
//!
//! // Services may appear anywhere; errors become invoke failures
//! fn lookup(store: Service<dyn Store>, Arg(key): Arg<String>) -> Result<String, StoreError> {
//!     store.get(&key)
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::extractor::{ExtractCx, FromInvocation};
use marshal_core::{ActivationError, BoxError, Dependency, Invocation, InvokeError, Return, Value};

// ============================================================================
// IntoReturn - Convert handler return values
// ============================================================================

/// A trait for types that can be returned from handlers.
pub trait IntoReturn: Send + 'static {
    /// Converts the value into the command's [`Return`], or its invoke error.
    fn into_return(self) -> Result<Return, InvokeError>;
}

/// `()` - the command produces no value.
impl IntoReturn for () {
    fn into_return(self) -> Result<Return, InvokeError> {
        Ok(Return::Void)
    }
}

impl IntoReturn for Return {
    fn into_return(self) -> Result<Return, InvokeError> {
        Ok(self)
    }
}

impl IntoReturn for Value {
    fn into_return(self) -> Result<Return, InvokeError> {
        Ok(Return::Value(self))
    }
}

macro_rules! impl_into_return_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoReturn for $ty {
                fn into_return(self) -> Result<Return, InvokeError> {
                    Ok(Return::Value(Value::new(self)))
                }
            }
        )*
    };
}

impl_into_return_value!(
    String, &'static str, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128,
    usize, f32, f64,
);

impl<T: Send + Sync + 'static> IntoReturn for Vec<T> {
    fn into_return(self) -> Result<Return, InvokeError> {
        Ok(Return::Value(Value::new(self)))
    }
}

/// `Option<T>` - `None` is a void result.
impl<T: IntoReturn> IntoReturn for Option<T> {
    fn into_return(self) -> Result<Return, InvokeError> {
        match self {
            Some(t) => t.into_return(),
            None => Ok(Return::Void),
        }
    }
}

/// `Result<T, E>` - `Err` becomes an invoke failure.
impl<T, E> IntoReturn for Result<T, E>
where
    T: IntoReturn,
    E: Into<BoxError> + Send + 'static,
{
    fn into_return(self) -> Result<Return, InvokeError> {
        match self {
            Ok(t) => t.into_return(),
            Err(e) => Err(InvokeError::new(e.into())),
        }
    }
}

// ============================================================================
// Handler Traits
// ============================================================================

/// An asynchronous command body.
///
/// # Blanket Implementation
///
/// Implemented for async functions that:
/// - Take 0-12 parameters that implement [`FromInvocation`]
/// - Return a type that implements [`IntoReturn`]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Services the parameters need.
    fn dependencies() -> Vec<Dependency>;

    /// Extracts the parameters and runs the handler.
    fn call(self, invocation: Invocation) -> BoxFuture<'static, Result<Return, ActivationError>>;
}

/// A synchronous command body.
///
/// Same as [`Handler`] for functions that do not return a future.
pub trait SyncHandler<T>: Clone + Send + Sync + 'static {
    /// Services the parameters need.
    fn dependencies() -> Vec<Dependency>;

    /// Extracts the parameters and runs the handler.
    fn call(self, invocation: Invocation) -> BoxFuture<'static, Result<Return, ActivationError>>;
}

// ============================================================================
// BoxedHandler - Type-erased handler
// ============================================================================

/// A type-erased handler.
///
/// Internally a closure that captures the original handler and calls it
/// with a cloned copy on each invocation.
pub type BoxedHandler =
    Arc<dyn Fn(Invocation) -> BoxFuture<'static, Result<Return, ActivationError>> + Send + Sync>;

/// Convert an async handler function into a boxed handler.
pub fn into_handler<H, T>(handler: H) -> BoxedHandler
where
    H: Handler<T>,
    T: 'static,
{
    Arc::new(move |invocation| handler.clone().call(invocation))
}

/// Convert a synchronous handler function into a boxed handler.
pub fn into_sync_handler<H, T>(handler: H) -> BoxedHandler
where
    H: SyncHandler<T>,
    T: 'static,
{
    Arc::new(move |invocation| SyncHandler::call(handler.clone(), invocation))
}

// ============================================================================
// Handler implementations for functions (Axum-style)
// ============================================================================

fn dependencies_of(lists: &[Vec<Dependency>]) -> Vec<Dependency> {
    lists.iter().flatten().copied().collect()
}

/// Generates [`Handler`] and [`SyncHandler`] implementations for one arity.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: IntoReturn,
            $( $ty: FromInvocation + Send + 'static, )*
        {
            fn dependencies() -> Vec<Dependency> {
                dependencies_of(&[$( $ty::dependencies(), )*])
            }

            fn call(self, invocation: Invocation) -> BoxFuture<'static, Result<Return, ActivationError>> {
                async move {
                    let ($($ty,)*) = {
                        let mut cx = ExtractCx::new(&invocation);
                        ($(
                            $ty::from_invocation(&mut cx)
                                .map_err(|e| e.into_engine(&invocation.command))?,
                        )*)
                    };

                    let res = (self)($($ty,)*).await;
                    res.into_return().map_err(ActivationError::from)
                }
                .boxed()
            }
        }

        #[allow(non_snake_case, unused_mut, unused_variables)]
        impl<F, Res, $($ty,)*> SyncHandler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Res + Clone + Send + Sync + 'static,
            Res: IntoReturn,
            $( $ty: FromInvocation + Send + 'static, )*
        {
            fn dependencies() -> Vec<Dependency> {
                dependencies_of(&[$( $ty::dependencies(), )*])
            }

            fn call(self, invocation: Invocation) -> BoxFuture<'static, Result<Return, ActivationError>> {
                async move {
                    let ($($ty,)*) = {
                        let mut cx = ExtractCx::new(&invocation);
                        ($(
                            $ty::from_invocation(&mut cx)
                                .map_err(|e| e.into_engine(&invocation.command))?,
                        )*)
                    };

                    (self)($($ty,)*).into_return().map_err(ActivationError::from)
                }
                .boxed()
            }
        }
    };
}

// Generate implementations for 0-12 parameters
impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);

#[cfg(test)]
mod tests {
    use marshal_core::{Argument, Arguments, EngineError, ExecutionContext};

    use super::*;
    use crate::extractor::{Arg, Service};

    fn invocation(arguments: Vec<Argument>) -> Invocation {
        Invocation::new(
            "calc",
            Arguments::new(arguments),
            Arc::new(ExecutionContext::default()),
        )
    }

    fn int(n: i64) -> Argument {
        Argument::Value(Value::new(n))
    }

    async fn add(Arg(a): Arg<i64>, Arg(b): Arg<i64>) -> i64 {
        a + b
    }

    fn halve(Arg(n): Arg<i64>) -> Result<i64, String> {
        if n % 2 == 0 {
            Ok(n / 2)
        } else {
            Err(format!("{n} is odd"))
        }
    }

    #[tokio::test]
    async fn test_async_handler() {
        let ret = Handler::call(add, invocation(vec![int(3), int(4)])).await.unwrap();
        assert_eq!(ret.value().and_then(|v| v.downcast::<i64>()), Some(7));
    }

    #[tokio::test]
    async fn test_sync_handler_errors() {
        let ret = SyncHandler::call(halve, invocation(vec![int(8)])).await.unwrap();
        assert_eq!(ret.value().and_then(|v| v.downcast::<i64>()), Some(4));

        let err = SyncHandler::call(halve, invocation(vec![int(3)])).await.unwrap_err();
        assert!(matches!(err, ActivationError::Invoke(ref e) if e.to_string() == "3 is odd"));
    }

    #[tokio::test]
    async fn test_signature_mismatch_is_fatal() {
        let err = Handler::call(add, invocation(vec![int(1)])).await.unwrap_err();
        assert!(matches!(
            err,
            ActivationError::Fatal(EngineError::ArgumentMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_void_and_option_returns() {
        assert!(().into_return().unwrap().is_void());
        assert!(None::<i32>.into_return().unwrap().is_void());
        assert!(!Some("x").into_return().unwrap().is_void());
    }

    #[test]
    fn test_dependencies_collected() {
        async fn needs(_: Service<String>, _: Option<Service<u32>>, Arg(_x): Arg<i64>) {}
        fn deps<H: Handler<T>, T>(_: &H) -> Vec<Dependency> {
            H::dependencies()
        }
        let listed = deps(&needs);
        assert_eq!(
            listed,
            vec![Dependency::required::<String>(), Dependency::optional::<u32>()]
        );
    }
}
