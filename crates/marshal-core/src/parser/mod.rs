//! Pluggable conversion of raw tokens into typed values.
//!
//! A [`TypeParser`] converts one raw string into a [`Value`] of its target
//! type. The [`ParserRegistry`] maps target types to parsers and is consulted
//! once, when a command is registered: each simple parameter keeps a direct
//! reference to its parser afterwards.
//!
//! `String` and [`Value`] are passthrough types and never need a parser.

mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::error::ParseResult;
use crate::value::{TypeKey, Value};

pub use builtin::{BoolParser, DurationParser, FnParser, FromStrParser};

/// Information handed to a parser alongside the raw input.
#[derive(Clone, Copy)]
pub struct ParseContext<'a> {
    /// The context of the running execution.
    pub execution: &'a ExecutionContext,
    /// Name of the parameter being parsed.
    pub parameter: &'a str,
}

/// Converts raw input into a value of one target type.
///
/// Parsers may be asynchronous (e.g. resolving an identifier against a
/// service). The pipeline races every parse against the execution's
/// cancellation token, so implementations do not need to poll it themselves.
#[async_trait]
pub trait TypeParser: Send + Sync + 'static {
    /// The type this parser produces.
    fn target(&self) -> TypeKey;

    /// Identity reported in parse failures.
    fn name(&self) -> &str {
        self.target().short_name()
    }

    /// Parses `input` into a value of [`target`](Self::target).
    async fn parse(&self, input: &str, ctx: &ParseContext<'_>) -> ParseResult<Value>;
}

/// Returns `true` for types that bind the raw token without a parser.
pub fn is_passthrough(key: TypeKey) -> bool {
    key == TypeKey::of::<String>() || key == TypeKey::of::<Value>()
}

/// Mapping from target type to parser.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: HashMap<TypeKey, Arc<dyn TypeParser>>,
}

impl ParserRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with parsers for the primitive types
    /// and [`std::time::Duration`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        macro_rules! from_str {
            ($($ty:ty),* $(,)?) => {
                $( registry.insert(FromStrParser::<$ty>::new()); )*
            };
        }

        from_str!(
            char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64,
        );
        registry.insert(BoolParser);
        registry.insert(DurationParser);
        registry
    }

    /// Registers `parser`, replacing any existing parser for the same type.
    pub fn insert<P: TypeParser>(&mut self, parser: P) -> Option<Arc<dyn TypeParser>> {
        self.insert_arc(Arc::new(parser))
    }

    /// Registers an already shared parser.
    pub fn insert_arc(&mut self, parser: Arc<dyn TypeParser>) -> Option<Arc<dyn TypeParser>> {
        self.parsers.insert(parser.target(), parser)
    }

    /// Looks up the parser for `key`.
    pub fn get(&self, key: TypeKey) -> Option<Arc<dyn TypeParser>> {
        self.parsers.get(&key).cloned()
    }

    pub fn contains(&self, key: TypeKey) -> bool {
        self.parsers.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl std::fmt::Debug for ParserRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.parsers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;

    #[tokio::test]
    async fn test_default_registry_parses_primitives() {
        let registry = ParserRegistry::with_defaults();
        let ctx = ExecutionContext::default();
        let pctx = ParseContext {
            execution: &ctx,
            parameter: "n",
        };

        let parser = registry.get(TypeKey::of::<i32>()).unwrap();
        let value = parser.parse("-17", &pctx).await.unwrap();
        assert_eq!(value.downcast::<i32>(), Some(-17));

        let err = parser.parse("abc", &pctx).await.unwrap_err();
        assert_eq!(err.reason(), "'abc' is not a valid i32");
    }

    #[test]
    fn test_passthrough_types_have_no_parser() {
        let registry = ParserRegistry::with_defaults();
        assert!(is_passthrough(TypeKey::of::<String>()));
        assert!(!registry.contains(TypeKey::of::<String>()));
        assert!(registry.contains(TypeKey::of::<u64>()));
    }

    #[test]
    fn test_insert_replaces() {
        let mut registry = ParserRegistry::new();
        assert!(registry.insert(FromStrParser::<u8>::new()).is_none());
        assert!(registry.insert(FromStrParser::<u8>::new()).is_some());
        assert_eq!(registry.len(), 1);
    }
}
