use std::sync::Arc;

use marshal_core::{Argument, Arguments, Dependency, DependencyKind, ExecutionContext, Invocation};

use crate::error::ExtractResult;

/// Extraction state for one handler call.
///
/// Positional extractors ([`Arg`](super::Arg), [`RawArg`](super::RawArg))
/// consume one bound argument each, in declaration order. Everything else
/// reads from the invocation without moving the cursor, so it can appear in
/// any position of the handler signature.
pub struct ExtractCx<'a> {
    invocation: &'a Invocation,
    cursor: usize,
}

impl<'a> ExtractCx<'a> {
    pub fn new(invocation: &'a Invocation) -> Self {
        Self {
            invocation,
            cursor: 0,
        }
    }

    pub fn invocation(&self) -> &'a Invocation {
        self.invocation
    }

    pub fn command(&self) -> &'a str {
        &self.invocation.command
    }

    pub fn context(&self) -> &'a Arc<ExecutionContext> {
        &self.invocation.context
    }

    pub fn arguments(&self) -> &'a Arguments {
        &self.invocation.arguments
    }

    /// Index of the next positional argument.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Takes the next positional argument and advances the cursor.
    ///
    /// Returns `None` past the end of the bound arguments.
    pub fn next_argument(&mut self) -> (usize, Option<&'a Argument>) {
        let index = self.cursor;
        self.cursor += 1;
        (index, self.invocation.arguments.get(index))
    }
}

/// A trait for types that can be extracted from an [`Invocation`].
///
/// This is the core abstraction behind Marshal's parameter injection. Types
/// implementing this trait can be used directly as handler function
/// parameters.
///
/// # Error Handling
///
/// A failed extraction aborts the call with a fatal engine error: the
/// handler's signature does not fit the command it was registered for.
/// Wrap an extractor in [`Option<T>`] to turn absence into `None`.
pub trait FromInvocation: Sized {
    /// Attempts to extract this type, advancing `cx` if it is positional.
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self>;

    /// Services this extractor needs from the lookup.
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }
}

/// Optional parameters: absence (no bound value, unregistered service)
/// becomes `None`; a type mismatch is still an error.
impl<T: FromInvocation> FromInvocation for Option<T> {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        match T::from_invocation(cx) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn dependencies() -> Vec<Dependency> {
        T::dependencies()
            .into_iter()
            .map(|mut dep| {
                if dep.kind == DependencyKind::Required {
                    dep.kind = DependencyKind::Optional;
                }
                dep
            })
            .collect()
    }
}

/// The execution context, in any position.
impl FromInvocation for Arc<ExecutionContext> {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(Arc::clone(cx.context()))
    }
}

/// The whole invocation, without consuming arguments.
impl FromInvocation for Invocation {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(cx.invocation().clone())
    }
}
