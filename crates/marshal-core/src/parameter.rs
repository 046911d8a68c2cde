//! Command parameters.
//!
//! Parameters are declared with [`ParameterSpec`] and resolved into
//! [`Parameter`]s against a [`ParserRegistry`] when the command is
//! registered. Resolution is where every parameter-level invariant is
//! enforced: a missing parser, a second remainder or a remainder that is not
//! the last parameter are all [`BuildError`]s.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::{BoxError, BuildError, BuildResult, ParseError, ParseResult};
use crate::parser::{ParserRegistry, TypeParser, is_passthrough};
use crate::value::{Arguments, TypeKey, Value};

/// Builds the composite value of a constructible parameter.
pub type ConstructFn = Arc<dyn Fn(&Arguments) -> Result<Value, BoxError> + Send + Sync>;

/// Wraps the parsed elements of a collection remainder.
pub type CollectFn = fn(Vec<Value>) -> ParseResult<Value>;

/// Container produced by a collection remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// `Vec<T>`, preserving input order.
    List,
    /// `HashSet<T>`, dropping duplicates.
    Set,
}

fn collect_list<T: Any + Clone + Send + Sync>(values: Vec<Value>) -> ParseResult<Value> {
    values
        .iter()
        .map(|v| downcast_element::<T>(v))
        .collect::<ParseResult<Vec<T>>>()
        .map(Value::new)
}

fn collect_set<T: Any + Clone + Eq + Hash + Send + Sync>(values: Vec<Value>) -> ParseResult<Value> {
    values
        .iter()
        .map(|v| downcast_element::<T>(v))
        .collect::<ParseResult<HashSet<T>>>()
        .map(Value::new)
}

fn downcast_element<T: Any + Clone>(value: &Value) -> ParseResult<T> {
    value.downcast::<T>().ok_or_else(|| {
        ParseError::new(format!(
            "element of type {} cannot be collected as {}",
            value.type_key(),
            TypeKey::of::<T>()
        ))
    })
}

// =============================================================================
// Declaration
// =============================================================================

#[derive(Clone)]
enum SpecKind {
    Simple {
        element: TypeKey,
        collection: Option<(CollectionKind, CollectFn)>,
    },
    Constructible {
        nested: Vec<ParameterSpec>,
        construct: ConstructFn,
    },
}

/// An unresolved parameter declaration.
///
/// ```rust,ignore
/// let params = vec![
///     ParameterSpec::of::<i64>("id"),
///     ParameterSpec::of::<String>("name").optional(),
///     ParameterSpec::list::<u32>("scores"),
/// ];
/// ```
#[derive(Clone)]
pub struct ParameterSpec {
    name: String,
    declared_type: TypeKey,
    optional: bool,
    nullable: bool,
    remainder: bool,
    kind: SpecKind,
}

impl ParameterSpec {
    /// A single-token parameter of type `T`.
    pub fn of<T: Any + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: TypeKey::of::<T>(),
            optional: false,
            nullable: false,
            remainder: false,
            kind: SpecKind::Simple {
                element: TypeKey::of::<T>(),
                collection: None,
            },
        }
    }

    /// A remainder collecting every remaining token into a `Vec<T>`.
    pub fn list<T: Any + Clone + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: TypeKey::of::<Vec<T>>(),
            optional: false,
            nullable: false,
            remainder: true,
            kind: SpecKind::Simple {
                element: TypeKey::of::<T>(),
                collection: Some((CollectionKind::List, collect_list::<T> as CollectFn)),
            },
        }
    }

    /// A remainder collecting every remaining token into a `HashSet<T>`.
    pub fn set<T: Any + Clone + Eq + Hash + Send + Sync>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: TypeKey::of::<HashSet<T>>(),
            optional: false,
            nullable: false,
            remainder: true,
            kind: SpecKind::Simple {
                element: TypeKey::of::<T>(),
                collection: Some((CollectionKind::Set, collect_set::<T> as CollectFn)),
            },
        }
    }

    /// A composite parameter built from `nested` once all of them parse.
    pub fn constructible<T, F>(name: impl Into<String>, nested: Vec<ParameterSpec>, construct: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            declared_type: TypeKey::of::<T>(),
            optional: false,
            nullable: false,
            remainder: false,
            kind: SpecKind::Constructible {
                nested,
                construct: Arc::new(move |args| construct(args).map(Value::new)),
            },
        }
    }

    /// Marks the parameter optional: absent input binds `Missing`.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Marks the parameter nullable: a null literal binds `Null`.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Marks the parameter as consuming every remaining token.
    pub fn remainder(mut self) -> Self {
        self.remainder = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves this declaration against `registry`.
    pub fn resolve(self, registry: &ParserRegistry) -> BuildResult<Parameter> {
        let info = ParameterInfo {
            name: self.name,
            declared_type: self.declared_type,
            optional: self.optional,
            nullable: self.nullable,
            remainder: self.remainder,
        };

        match self.kind {
            SpecKind::Simple {
                element,
                collection,
            } => {
                let parser = if is_passthrough(element) {
                    None
                } else {
                    Some(registry.get(element).ok_or_else(|| BuildError::MissingParser {
                        parameter: info.name.clone(),
                        type_name: element.name(),
                    })?)
                };
                Ok(Parameter::Simple(SimpleParameter {
                    info,
                    element,
                    parser,
                    collection,
                }))
            }
            SpecKind::Constructible { nested, construct } => {
                let nested = resolve_all(nested, registry)?;
                Ok(Parameter::Constructible(ConstructibleParameter {
                    info,
                    bounds: Bounds::of(&nested),
                    nested,
                    construct,
                }))
            }
        }
    }
}

impl fmt::Debug for ParameterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterSpec")
            .field("name", &self.name)
            .field("type", &self.declared_type)
            .finish_non_exhaustive()
    }
}

/// Resolves an ordered parameter list and checks the remainder invariant.
pub fn resolve_all(specs: Vec<ParameterSpec>, registry: &ParserRegistry) -> BuildResult<Vec<Parameter>> {
    let count = specs.len();
    let mut seen_remainder = false;
    let mut parameters = Vec::with_capacity(count);

    for (index, spec) in specs.into_iter().enumerate() {
        if spec.remainder {
            if seen_remainder {
                return Err(BuildError::DuplicateRemainder {
                    parameter: spec.name,
                });
            }
            seen_remainder = true;
            if index + 1 != count {
                return Err(BuildError::RemainderNotLast {
                    parameter: spec.name,
                });
            }
        }
        parameters.push(spec.resolve(registry)?);
    }
    Ok(parameters)
}

// =============================================================================
// Resolved parameters
// =============================================================================

/// Fields shared by every parameter kind.
#[derive(Debug, Clone)]
pub struct ParameterInfo {
    pub name: String,
    pub declared_type: TypeKey,
    pub optional: bool,
    pub nullable: bool,
    pub remainder: bool,
}

/// Inclusive token bounds; `max == None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: usize,
    pub max: Option<usize>,
}

impl Bounds {
    /// Bounds of an empty parameter list.
    pub const EMPTY: Bounds = Bounds { min: 0, max: Some(0) };

    /// Aggregates the bounds of a parameter list.
    pub fn of(parameters: &[Parameter]) -> Self {
        parameters.iter().fold(Self::EMPTY, |acc, p| acc.then(p.bounds()))
    }

    /// Bounds of `self` followed by `next`.
    pub fn then(self, next: Bounds) -> Self {
        Bounds {
            min: self.min + next.min,
            max: self.max.zip(next.max).map(|(a, b)| a + b),
        }
    }

    pub fn contains(&self, count: usize) -> bool {
        count >= self.min && self.max.is_none_or(|max| count <= max)
    }
}

/// A parameter parsed from one token, or from a remainder of tokens.
#[derive(Clone)]
pub struct SimpleParameter {
    pub info: ParameterInfo,
    /// Type the parser produces. Differs from the declared type for
    /// collections, where it is the element type.
    pub element: TypeKey,
    /// `None` for passthrough types.
    pub parser: Option<Arc<dyn TypeParser>>,
    pub collection: Option<(CollectionKind, CollectFn)>,
}

impl SimpleParameter {
    /// Name reported in parse failures.
    pub fn parser_name(&self) -> &str {
        match &self.parser {
            Some(p) => p.name(),
            None => self.element.short_name(),
        }
    }
}

/// A parameter assembled from nested parameters.
#[derive(Clone)]
pub struct ConstructibleParameter {
    pub info: ParameterInfo,
    pub nested: Vec<Parameter>,
    pub bounds: Bounds,
    pub construct: ConstructFn,
}

/// A resolved command parameter.
#[derive(Clone)]
pub enum Parameter {
    Simple(SimpleParameter),
    Constructible(ConstructibleParameter),
}

impl Parameter {
    pub fn info(&self) -> &ParameterInfo {
        match self {
            Self::Simple(p) => &p.info,
            Self::Constructible(p) => &p.info,
        }
    }

    pub fn name(&self) -> &str {
        &self.info().name
    }

    pub fn is_remainder(&self) -> bool {
        self.info().remainder
    }

    /// Token bounds this parameter can consume.
    pub fn bounds(&self) -> Bounds {
        let info = self.info();
        let (min, max) = match self {
            Self::Simple(_) if info.remainder => (1, None),
            Self::Simple(_) => (1, Some(1)),
            Self::Constructible(p) => (p.bounds.min, p.bounds.max),
        };
        Bounds {
            min: if info.optional { 0 } else { min },
            max,
        }
    }

    /// Contribution of this parameter to its command's score.
    pub fn score(&self) -> f32 {
        let info = self.info();
        let mut score = 1.0;
        if info.optional {
            score -= 0.5;
        }
        if info.remainder {
            score -= 0.25;
        }
        if info.nullable {
            score -= 0.25;
        }
        match self {
            Self::Simple(p) if p.parser.is_some() => score += 0.5,
            Self::Simple(_) => {}
            Self::Constructible(p) => score += p.nested.iter().map(Parameter::score).sum::<f32>(),
        }
        score
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        let kind = match self {
            Self::Simple(_) => "Simple",
            Self::Constructible(_) => "Constructible",
        };
        f.debug_struct(kind)
            .field("name", &info.name)
            .field("type", &info.declared_type)
            .field("optional", &info.optional)
            .field("nullable", &info.nullable)
            .field("remainder", &info.remainder)
            .finish()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        let dots = if info.remainder { "..." } else { "" };
        if info.optional {
            write!(f, "[{}{dots}]", info.name)
        } else {
            write!(f, "<{}{dots}>", info.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ParserRegistry {
        ParserRegistry::with_defaults()
    }

    #[test]
    fn test_scores() {
        let reg = registry();
        let int = ParameterSpec::of::<i32>("n").resolve(&reg).unwrap();
        let text = ParameterSpec::of::<String>("s").resolve(&reg).unwrap();
        let opt = ParameterSpec::of::<i32>("n").optional().resolve(&reg).unwrap();
        let rest = ParameterSpec::of::<String>("r").remainder().nullable().resolve(&reg).unwrap();

        assert_eq!(int.score(), 1.5);
        assert_eq!(text.score(), 1.0);
        assert_eq!(opt.score(), 1.0);
        assert_eq!(rest.score(), 0.5);
    }

    #[test]
    fn test_missing_parser() {
        struct Opaque;
        let err = ParameterSpec::of::<Opaque>("x").resolve(&registry()).unwrap_err();
        assert!(matches!(err, BuildError::MissingParser { ref parameter, .. } if parameter == "x"));
    }

    #[test]
    fn test_remainder_position() {
        let err = resolve_all(
            vec![
                ParameterSpec::list::<i32>("xs"),
                ParameterSpec::of::<i32>("y"),
            ],
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::RemainderNotLast { .. }));

        let err = resolve_all(
            vec![
                ParameterSpec::of::<String>("a").remainder(),
                ParameterSpec::of::<String>("b").remainder(),
            ],
            &registry(),
        )
        .unwrap_err();
        assert!(matches!(err, BuildError::DuplicateRemainder { ref parameter } if parameter == "b"));
    }

    #[test]
    fn test_bounds_aggregate() {
        let reg = registry();
        let params = resolve_all(
            vec![
                ParameterSpec::of::<i32>("a"),
                ParameterSpec::of::<i32>("b").optional(),
                ParameterSpec::constructible::<(i32, i32), _>(
                    "point",
                    vec![ParameterSpec::of::<i32>("x"), ParameterSpec::of::<i32>("y")],
                    |args| Ok((args.value::<i32>(0).unwrap_or(0), args.value::<i32>(1).unwrap_or(0))),
                ),
            ],
            &reg,
        )
        .unwrap();
        assert_eq!(Bounds::of(&params), Bounds { min: 3, max: Some(4) });

        let with_rest = resolve_all(
            vec![ParameterSpec::of::<i32>("a"), ParameterSpec::list::<i32>("rest")],
            &reg,
        )
        .unwrap();
        let bounds = Bounds::of(&with_rest);
        assert_eq!(bounds, Bounds { min: 2, max: None });
        assert!(bounds.contains(10));
        assert!(!bounds.contains(1));
    }

    #[test]
    fn test_collect_set_dedups() {
        let set = collect_set::<i32>(vec![Value::new(1), Value::new(1), Value::new(2)]).unwrap();
        assert_eq!(set.downcast_ref::<HashSet<i32>>().map(HashSet::len), Some(2));
    }
}
