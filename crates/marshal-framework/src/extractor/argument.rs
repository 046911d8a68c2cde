use std::any::Any;

use marshal_core::{Argument, Arguments};

use crate::error::{ExtractError, ExtractResult};
use crate::extractor::{ExtractCx, FromInvocation};

/// A positional, typed argument.
///
/// Consumes the next bound argument and downcasts it to `T`. Missing and
/// null arguments are absent; use `Option<Arg<T>>` for optional or nullable
/// parameters.
///
/// ```rust,ignore
/// async fn add(Arg(a): Arg<i64>, Arg(b): Arg<i64>) -> i64 {
///     a + b
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Arg<T>(pub T);

impl<T> std::ops::Deref for Arg<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Any + Clone + Send + Sync> FromInvocation for Arg<T> {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        let (index, argument) = cx.next_argument();
        let Some(value) = argument.and_then(Argument::value) else {
            return Err(ExtractError::Absent { index });
        };
        value
            .downcast::<T>()
            .map(Arg)
            .ok_or_else(|| ExtractError::TypeMismatch {
                index,
                expected: std::any::type_name::<T>(),
                actual: value.type_key().name(),
            })
    }
}

/// The next bound argument as-is, keeping `Null` and `Missing` apart.
#[derive(Debug, Clone)]
pub struct RawArg(pub Argument);

impl FromInvocation for RawArg {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        let (index, argument) = cx.next_argument();
        argument
            .cloned()
            .map(RawArg)
            .ok_or(ExtractError::Absent { index })
    }
}

/// Every bound argument, without moving the cursor.
#[derive(Debug, Clone)]
pub struct Args(pub Arguments);

impl FromInvocation for Args {
    fn from_invocation(cx: &mut ExtractCx<'_>) -> ExtractResult<Self> {
        Ok(Args(cx.arguments().clone()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use marshal_core::{ExecutionContext, Invocation, Value};

    use super::*;

    fn invocation(arguments: Vec<Argument>) -> Invocation {
        Invocation::new(
            "test",
            Arguments::new(arguments),
            Arc::new(ExecutionContext::default()),
        )
    }

    #[test]
    fn test_positional_order() {
        let inv = invocation(vec![
            Argument::Value(Value::new(1_i64)),
            Argument::Value(Value::new("two".to_string())),
        ]);
        let mut cx = ExtractCx::new(&inv);
        let Arg(a) = Arg::<i64>::from_invocation(&mut cx).unwrap();
        let Args(all) = Args::from_invocation(&mut cx).unwrap();
        let Arg(b) = Arg::<String>::from_invocation(&mut cx).unwrap();
        assert_eq!((a, b.as_str(), all.len()), (1, "two", 2));
        assert_eq!(cx.position(), 2);
    }

    #[test]
    fn test_absent_and_mismatch() {
        let inv = invocation(vec![
            Argument::Null,
            Argument::Value(Value::new(3_u8)),
        ]);
        let mut cx = ExtractCx::new(&inv);
        assert_eq!(Option::<Arg<i64>>::from_invocation(&mut cx).unwrap(), None);
        assert!(matches!(
            Option::<Arg<i64>>::from_invocation(&mut cx),
            Err(ExtractError::TypeMismatch { index: 1, actual: "u8", .. })
        ));
        assert!(matches!(
            Arg::<i64>::from_invocation(&mut cx),
            Err(ExtractError::Absent { index: 2 })
        ));
    }

    #[test]
    fn test_raw_keeps_null_distinct() {
        let inv = invocation(vec![Argument::Null, Argument::Missing]);
        let mut cx = ExtractCx::new(&inv);
        let RawArg(first) = RawArg::from_invocation(&mut cx).unwrap();
        let RawArg(second) = RawArg::from_invocation(&mut cx).unwrap();
        assert!(first.is_null());
        assert!(second.is_missing());
    }
}
