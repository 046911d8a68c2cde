//! Type-erased values flowing between parsers, the pipeline and handlers.
//!
//! The engine does not know the concrete types of command parameters at
//! compile time. Parsers produce a [`Value`], the pipeline collects them into
//! [`Arguments`], and extractors on the handler side downcast them back.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// Identity of a Rust type used as a lookup key for parsers and services.
#[derive(Clone, Copy, Eq)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The underlying [`TypeId`].
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type name with module paths stripped (`alloc::string::String` → `String`).
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        match base.rfind("::") {
            Some(idx) if !self.name.contains('<') => &self.name[idx + 2..],
            _ => self.name,
        }
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// A cheaply clonable, type-erased value.
#[derive(Clone)]
pub struct Value {
    inner: Arc<dyn Any + Send + Sync>,
    key: TypeKey,
}

impl Value {
    /// Wraps a concrete value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            inner: Arc::new(value),
            key: TypeKey::of::<T>(),
        }
    }

    /// The key of the wrapped type.
    pub fn type_key(&self) -> TypeKey {
        self.key
    }

    /// Returns `true` if the wrapped value is a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Borrows the wrapped value as a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Clones the wrapped value out as a `T`.
    pub fn downcast<T: Any + Clone>(&self) -> Option<T> {
        self.downcast_ref::<T>().cloned()
    }

    /// Best-effort textual rendering for the common primitive types.
    ///
    /// Returns `None` for types the engine knows nothing about; response
    /// sinks that need richer output should downcast themselves.
    pub fn to_text(&self) -> Option<String> {
        macro_rules! render {
            ($($ty:ty),* $(,)?) => {
                $(
                    if let Some(v) = self.downcast_ref::<$ty>() {
                        return Some(v.to_string());
                    }
                )*
            };
        }
        render!(
            String, &'static str, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64,
            u128, usize, f32, f64,
        );
        None
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "Value<{}>({text:?})", self.key),
            None => write!(f, "Value<{}>", self.key),
        }
    }
}

/// One bound parameter slot.
///
/// `Null` and `Missing` are deliberately distinct: `Null` means the caller
/// supplied a null literal for a nullable parameter, `Missing` means an
/// optional parameter received no input at all.
#[derive(Debug, Clone, Default)]
pub enum Argument {
    /// Parsed value.
    Value(Value),
    /// A recognised null literal was supplied.
    Null,
    /// No input was supplied for an optional parameter.
    #[default]
    Missing,
}

impl Argument {
    /// Returns the contained value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// The materialised argument array for one command invocation.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    slots: Vec<Argument>,
}

impl Arguments {
    pub fn new(slots: Vec<Argument>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.slots.get(index)
    }

    /// Downcasts the argument at `index`, returning `None` when it is absent,
    /// null, or of another type.
    pub fn value<T: Any + Clone>(&self, index: usize) -> Option<T> {
        self.get(index).and_then(Argument::value)?.downcast::<T>()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Argument> {
        self.slots.iter()
    }

    pub fn into_vec(self) -> Vec<Argument> {
        self.slots
    }
}

impl From<Vec<Argument>> for Arguments {
    fn from(slots: Vec<Argument>) -> Self {
        Self::new(slots)
    }
}

impl<'a> IntoIterator for &'a Arguments {
    type Item = &'a Argument;
    type IntoIter = std::slice::Iter<'a, Argument>;

    fn into_iter(self) -> Self::IntoIter {
        self.slots.iter()
    }
}

/// What a command body produced.
#[derive(Debug, Clone, Default)]
pub enum Return {
    /// The command returned nothing worth forwarding.
    #[default]
    Void,
    /// The command produced a value.
    Value(Value),
}

impl Return {
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Void => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_downcast() {
        let v = Value::new(42_i64);
        assert!(v.is::<i64>());
        assert_eq!(v.downcast::<i64>(), Some(42));
        assert_eq!(v.downcast::<i32>(), None);
        assert_eq!(v.to_text().as_deref(), Some("42"));
    }

    #[test]
    fn test_type_key_short_name() {
        assert_eq!(TypeKey::of::<String>().short_name(), "String");
        assert_eq!(TypeKey::of::<i32>().short_name(), "i32");
        assert_eq!(TypeKey::of::<String>(), TypeKey::of::<String>());
        assert_ne!(TypeKey::of::<String>(), TypeKey::of::<i32>());
    }

    #[test]
    fn test_arguments_value_skips_missing_and_null() {
        let args = Arguments::new(vec![
            Argument::Value(Value::new("a".to_string())),
            Argument::Null,
            Argument::Missing,
        ]);
        assert_eq!(args.value::<String>(0).as_deref(), Some("a"));
        assert_eq!(args.value::<String>(1), None);
        assert_eq!(args.value::<String>(2), None);
        assert!(args.get(1).unwrap().is_null());
        assert!(args.get(2).unwrap().is_missing());
    }
}
