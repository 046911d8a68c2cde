use std::any::Any;
use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;

use super::{ParseContext, TypeParser};
use crate::error::{ParseError, ParseResult};
use crate::value::{TypeKey, Value};

/// Parser for any type implementing [`FromStr`].
pub struct FromStrParser<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> FromStrParser<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for FromStrParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> TypeParser for FromStrParser<T>
where
    T: FromStr + Any + Send + Sync,
    T::Err: Display,
{
    fn target(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    async fn parse(&self, input: &str, _ctx: &ParseContext<'_>) -> ParseResult<Value> {
        input
            .trim()
            .parse::<T>()
            .map(Value::new)
            .map_err(|_| ParseError::invalid(input, self.target()))
    }
}

/// Parser backed by a synchronous closure.
///
/// ```rust,ignore
/// registry.insert(FnParser::new("color", |s: &str| match s {
///     "red" => Ok(Color::Red),
///     "blue" => Ok(Color::Blue),
///     other => Err(ParseError::invalid(other, "color")),
/// }));
/// ```
pub struct FnParser<T, F> {
    name: String,
    parse_fn: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FnParser<T, F>
where
    F: Fn(&str) -> ParseResult<T>,
{
    pub fn new(name: impl Into<String>, parse_fn: F) -> Self {
        Self {
            name: name.into(),
            parse_fn,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F> TypeParser for FnParser<T, F>
where
    T: Any + Send + Sync,
    F: Fn(&str) -> ParseResult<T> + Send + Sync + 'static,
{
    fn target(&self) -> TypeKey {
        TypeKey::of::<T>()
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn parse(&self, input: &str, _ctx: &ParseContext<'_>) -> ParseResult<Value> {
        (self.parse_fn)(input).map(Value::new)
    }
}

/// Lenient boolean parser accepting `true/false`, `yes/no`, `on/off` and `1/0`.
pub struct BoolParser;

#[async_trait]
impl TypeParser for BoolParser {
    fn target(&self) -> TypeKey {
        TypeKey::of::<bool>()
    }

    async fn parse(&self, input: &str, _ctx: &ParseContext<'_>) -> ParseResult<Value> {
        match input.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "on" | "1" => Ok(Value::new(true)),
            "false" | "no" | "n" | "off" | "0" => Ok(Value::new(false)),
            _ => Err(ParseError::invalid(input, "bool")),
        }
    }
}

/// Parses durations written as `<n>ms`, `<n>s`, `<n>m` or `<n>h`.
///
/// A bare number is read as seconds.
pub struct DurationParser;

#[async_trait]
impl TypeParser for DurationParser {
    fn target(&self) -> TypeKey {
        TypeKey::of::<Duration>()
    }

    fn name(&self) -> &str {
        "Duration"
    }

    async fn parse(&self, input: &str, _ctx: &ParseContext<'_>) -> ParseResult<Value> {
        let s = input.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (digits, unit) = s.split_at(split);
        let amount: u64 = digits
            .parse()
            .map_err(|_| ParseError::invalid(input, "duration"))?;
        let duration = match unit {
            "" | "s" => Duration::from_secs(amount),
            "ms" => Duration::from_millis(amount),
            "m" => Duration::from_secs(amount.saturating_mul(60)),
            "h" => Duration::from_secs(amount.saturating_mul(3600)),
            _ => return Err(ParseError::invalid(input, "duration")),
        };
        Ok(Value::new(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;

    fn parse_with<P: TypeParser>(parser: &P, input: &str) -> ParseResult<Value> {
        let ctx = ExecutionContext::default();
        let pctx = ParseContext {
            execution: &ctx,
            parameter: "p",
        };
        tokio_test::block_on(parser.parse(input, &pctx))
    }

    #[test]
    fn test_bool_parser_variants() {
        for yes in ["true", "YES", "on", "1"] {
            assert_eq!(parse_with(&BoolParser, yes).unwrap().downcast::<bool>(), Some(true));
        }
        for no in ["false", "No", "off", "0"] {
            assert_eq!(parse_with(&BoolParser, no).unwrap().downcast::<bool>(), Some(false));
        }
        assert!(parse_with(&BoolParser, "maybe").is_err());
    }

    #[test]
    fn test_duration_parser() {
        let parse = |s| parse_with(&DurationParser, s).unwrap().downcast::<Duration>();
        assert_eq!(parse("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse("1h"), Some(Duration::from_secs(3600)));
        assert!(parse_with(&DurationParser, "5 weeks").is_err());
        assert!(parse_with(&DurationParser, "ms").is_err());
    }

    #[test]
    fn test_fn_parser_reports_custom_name() {
        let parser = FnParser::new("even", |s: &str| {
            let n: u32 = s.parse().map_err(|_| ParseError::invalid(s, "even number"))?;
            if n % 2 == 0 {
                Ok(n)
            } else {
                Err(ParseError::invalid(s, "even number"))
            }
        });
        assert_eq!(parser.name(), "even");
        assert_eq!(parse_with(&parser, "4").unwrap().downcast::<u32>(), Some(4));
        assert!(parse_with(&parser, "5").is_err());
    }
}
