//! Binding raw tokens to a candidate's parameters.
//!
//! For one candidate the pipeline first checks the token count against the
//! command's bounds, then walks the parameters in order, consuming
//! positional tokens (or the matching named argument) and running parsers.
//! Any failure aborts only the current candidate.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::trace;

use crate::component::Command;
use crate::context::ExecutionContext;
use crate::error::Failure;
use crate::parameter::{Bounds, ConstructibleParameter, Parameter, SimpleParameter};
use crate::parser::{ParseContext, TypeParser};
use crate::value::{Argument, Arguments, Value};

/// Tokenised input plus named arguments.
#[derive(Debug, Clone, Default)]
pub struct Input {
    pub tokens: Vec<String>,
    /// Parameter name to raw value. Takes precedence over positional tokens.
    pub named: HashMap<String, String>,
}

impl Input {
    pub fn new(tokens: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            named: HashMap::new(),
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// The input as typed, for diagnostics.
    pub fn display(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Engine-wide parsing options.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Tokens a nullable parameter reads as `Null`, compared case-insensitively.
    pub null_literals: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            null_literals: vec!["null".into(), "nil".into(), "none".into()],
        }
    }
}

impl PipelineSettings {
    pub fn is_null_literal(&self, token: &str) -> bool {
        self.null_literals
            .iter()
            .any(|literal| literal.eq_ignore_ascii_case(token))
    }
}

/// Binds `input` to `command`'s parameters.
///
/// `depth` is the number of leading tokens consumed by aliases; `path` is
/// the command's alias path, used in failures.
pub async fn bind(
    command: &Command,
    path: &str,
    depth: usize,
    input: &Input,
    execution: &ExecutionContext,
    settings: &PipelineSettings,
) -> Result<Arguments, Failure> {
    let positional = input.tokens.get(depth..).unwrap_or_default();

    // Parameters filled by name take no positional tokens.
    let bounds = command
        .parameters()
        .iter()
        .filter(|p| named_value(p, Some(&input.named)).is_none())
        .fold(Bounds::EMPTY, |acc, p| acc.then(p.bounds()));

    let binder = Binder {
        command: path,
        execution,
        settings,
        bounds,
        actual: positional.len(),
    };

    if !bounds.contains(positional.len()) {
        return Err(binder.count_mismatch());
    }

    let (arguments, consumed) = binder
        .bind_list(command.parameters(), positional, Some(&input.named))
        .await?;
    if consumed < positional.len() {
        return Err(binder.count_mismatch());
    }

    trace!(command = path, arguments = arguments.len(), "arguments bound");
    Ok(Arguments::new(arguments))
}

/// Named arguments only ever fill simple parameters.
fn named_value<'n>(parameter: &Parameter, named: Option<&'n HashMap<String, String>>) -> Option<&'n String> {
    match parameter {
        Parameter::Simple(_) => named?.get(parameter.name()),
        Parameter::Constructible(_) => None,
    }
}

struct Binder<'a> {
    command: &'a str,
    execution: &'a ExecutionContext,
    settings: &'a PipelineSettings,
    /// Positional bounds of the list being bound.
    bounds: Bounds,
    actual: usize,
}

type BindOutput = Result<(Vec<Argument>, usize), Failure>;

impl Binder<'_> {
    fn count_mismatch(&self) -> Failure {
        Failure::ArgumentCountMismatch {
            command: self.command.to_string(),
            min: self.bounds.min,
            max: self.bounds.max,
            actual: self.actual,
        }
    }

    /// Binds `parameters` against `tokens`, returning the arguments and the
    /// number of tokens consumed.
    fn bind_list<'b>(
        &'b self,
        parameters: &'b [Parameter],
        tokens: &'b [String],
        named: Option<&'b HashMap<String, String>>,
    ) -> BoxFuture<'b, BindOutput> {
        async move {
            let mut cursor = 0;
            let mut out = Vec::with_capacity(parameters.len());

            for parameter in parameters {
                if self.execution.is_cancelled() {
                    return Err(Failure::Cancelled);
                }
                let named_value = named_value(parameter, named);

                match parameter {
                    Parameter::Simple(p) if p.info.remainder => {
                        let rest = &tokens[cursor..];
                        let argument = match named_value {
                            Some(raw) if p.collection.is_some() => {
                                self.collect(p, std::slice::from_ref(raw)).await?
                            }
                            Some(raw) => self.parse_scalar(p, raw).await?,
                            None if rest.is_empty() => self.absent(p.info.optional)?,
                            None if p.collection.is_some() => self.collect(p, rest).await?,
                            None => {
                                let mut buf = [0; 4];
                                let separator: &str = self.execution.separator().encode_utf8(&mut buf);
                                self.parse_scalar(p, &rest.join(separator)).await?
                            }
                        };
                        if named_value.is_none() {
                            cursor = tokens.len();
                        }
                        out.push(argument);
                    }
                    Parameter::Simple(p) => {
                        let raw = match named_value {
                            Some(raw) => raw,
                            None => match tokens.get(cursor) {
                                Some(token) => {
                                    cursor += 1;
                                    token
                                }
                                None => {
                                    out.push(self.absent(p.info.optional)?);
                                    continue;
                                }
                            },
                        };
                        out.push(self.parse_scalar(p, raw).await?);
                    }
                    Parameter::Constructible(c) => {
                        let (argument, consumed) = self.construct(c, &tokens[cursor..]).await?;
                        cursor += consumed;
                        out.push(argument);
                    }
                }
            }
            Ok((out, cursor))
        }
        .boxed()
    }

    fn absent(&self, optional: bool) -> Result<Argument, Failure> {
        if optional {
            Ok(Argument::Missing)
        } else {
            Err(self.count_mismatch())
        }
    }

    async fn construct(&self, c: &ConstructibleParameter, available: &[String]) -> Result<(Argument, usize), Failure> {
        let window = match c.bounds.max {
            Some(max) => &available[..max.min(available.len())],
            None => available,
        };
        if window.is_empty() && c.info.optional {
            return Ok((Argument::Missing, 0));
        }

        let nested = Binder {
            bounds: c.bounds,
            actual: window.len(),
            ..*self
        };
        let (nested, consumed) = match nested.bind_list(&c.nested, window, None).await {
            Ok(bound) => bound,
            Err(Failure::Cancelled) => return Err(Failure::Cancelled),
            Err(_) if c.info.optional => return Ok((Argument::Missing, 0)),
            Err(failure) => return Err(failure),
        };

        match (c.construct)(&Arguments::new(nested)) {
            Ok(value) => Ok((Argument::Value(value), consumed)),
            Err(_) if c.info.optional => Ok((Argument::Missing, 0)),
            Err(e) => Err(Failure::ParseFailure {
                command: self.command.to_string(),
                parameter: c.info.name.clone(),
                parser: c.info.declared_type.short_name().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn parse_scalar(&self, p: &SimpleParameter, raw: &str) -> Result<Argument, Failure> {
        if p.info.nullable && self.settings.is_null_literal(raw) {
            return Ok(Argument::Null);
        }
        self.parse_one(p, raw).await.map(Argument::Value)
    }

    async fn collect(&self, p: &SimpleParameter, raw: &[String]) -> Result<Argument, Failure> {
        let mut values = Vec::with_capacity(raw.len());
        for token in raw {
            values.push(self.parse_one(p, token).await?);
        }
        let Some((_, collect)) = p.collection else {
            return Err(Failure::ParseFailure {
                command: self.command.to_string(),
                parameter: p.info.name.clone(),
                parser: p.parser_name().to_string(),
                reason: "parameter is not a collection".into(),
            });
        };
        collect(values)
            .map(Argument::Value)
            .map_err(|e| self.parse_failure(p, e.reason()))
    }

    async fn parse_one(&self, p: &SimpleParameter, raw: &str) -> Result<Value, Failure> {
        let Some(parser) = &p.parser else {
            return Ok(Value::new(raw.to_string()));
        };
        self.run_parser(parser, p, raw).await
    }

    async fn run_parser(&self, parser: &Arc<dyn TypeParser>, p: &SimpleParameter, raw: &str) -> Result<Value, Failure> {
        let ctx = ParseContext {
            execution: self.execution,
            parameter: &p.info.name,
        };
        tokio::select! {
            biased;
            _ = self.execution.cancellation().cancelled() => Err(Failure::Cancelled),
            parsed = parser.parse(raw, &ctx) => parsed.map_err(|e| self.parse_failure(p, e.reason())),
        }
    }

    fn parse_failure(&self, p: &SimpleParameter, reason: &str) -> Failure {
        Failure::ParseFailure {
            command: self.command.to_string(),
            parameter: p.info.name.clone(),
            parser: p.parser_name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::activator::activator_fn;
    use crate::context::ExecutionOptions;
    use crate::parameter::ParameterSpec;
    use crate::parser::ParserRegistry;
    use crate::value::Return;
    use tokio_util::sync::CancellationToken;

    fn command(params: Vec<ParameterSpec>) -> Command {
        Command::new(
            params,
            &ParserRegistry::with_defaults(),
            activator_fn(|_| async { Ok(Return::Void) }),
        )
        .unwrap()
    }

    async fn run(cmd: &Command, input: Input) -> Result<Arguments, Failure> {
        let ctx = ExecutionContext::default();
        bind(cmd, "cmd", 0, &input, &ctx, &PipelineSettings::default()).await
    }

    #[tokio::test]
    async fn test_simple_binding() {
        let cmd = command(vec![ParameterSpec::of::<i64>("a"), ParameterSpec::of::<i64>("b")]);
        let args = run(&cmd, Input::new(["3", "4"])).await.unwrap();
        assert_eq!(args.value::<i64>(0), Some(3));
        assert_eq!(args.value::<i64>(1), Some(4));
    }

    #[tokio::test]
    async fn test_count_mismatch() {
        let cmd = command(vec![ParameterSpec::of::<i64>("a"), ParameterSpec::of::<i64>("b")]);
        let failure = run(&cmd, Input::new(["3"])).await.unwrap_err();
        assert!(matches!(
            failure,
            Failure::ArgumentCountMismatch { min: 2, max: Some(2), actual: 1, .. }
        ));
        let failure = run(&cmd, Input::new(["1", "2", "3"])).await.unwrap_err();
        assert!(matches!(failure, Failure::ArgumentCountMismatch { actual: 3, .. }));
    }

    #[tokio::test]
    async fn test_parse_failure_names_parameter() {
        let cmd = command(vec![ParameterSpec::of::<i64>("amount")]);
        match run(&cmd, Input::new(["lots"])).await {
            Err(Failure::ParseFailure { parameter, parser, .. }) => {
                assert_eq!(parameter, "amount");
                assert_eq!(parser, "i64");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remainder_join() {
        let cmd = command(vec![
            ParameterSpec::of::<String>("target"),
            ParameterSpec::of::<String>("message").remainder(),
        ]);
        let args = run(&cmd, Input::new(["bob", "hello", "there", "friend"])).await.unwrap();
        assert_eq!(args.value::<String>(0).as_deref(), Some("bob"));
        assert_eq!(args.value::<String>(1).as_deref(), Some("hello there friend"));
    }

    #[tokio::test]
    async fn test_remainder_custom_separator() {
        let cmd = command(vec![ParameterSpec::of::<String>("words").remainder()]);
        let ctx = ExecutionContext::default().prepare(
            &ExecutionOptions::new().remainder_separator(','),
            CancellationToken::new(),
        );
        let args = bind(&cmd, "cmd", 0, &Input::new(["a", "b"]), &ctx, &PipelineSettings::default())
            .await
            .unwrap();
        assert_eq!(args.value::<String>(0).as_deref(), Some("a,b"));
    }

    #[tokio::test]
    async fn test_collection_remainders() {
        let list = command(vec![ParameterSpec::list::<i32>("xs")]);
        let args = run(&list, Input::new(["3", "1", "3"])).await.unwrap();
        assert_eq!(args.value::<Vec<i32>>(0), Some(vec![3, 1, 3]));

        let set = command(vec![ParameterSpec::set::<i32>("xs")]);
        let args = run(&set, Input::new(["3", "1", "3"])).await.unwrap();
        assert_eq!(args.value::<HashSet<i32>>(0), Some(HashSet::from([1, 3])));

        assert!(matches!(
            run(&list, Input::new(["3", "x"])).await,
            Err(Failure::ParseFailure { .. })
        ));
    }

    #[tokio::test]
    async fn test_optional_and_nullable() {
        let cmd = command(vec![
            ParameterSpec::of::<i32>("a").nullable(),
            ParameterSpec::of::<i32>("b").optional(),
        ]);
        let args = run(&cmd, Input::new(["NULL"])).await.unwrap();
        assert!(args.get(0).unwrap().is_null());
        assert!(args.get(1).unwrap().is_missing());

        let args = run(&cmd, Input::new(["1", "2"])).await.unwrap();
        assert_eq!(args.value::<i32>(0), Some(1));
        assert_eq!(args.value::<i32>(1), Some(2));
    }

    #[tokio::test]
    async fn test_null_literal_on_non_nullable_is_parsed() {
        let cmd = command(vec![ParameterSpec::of::<String>("s")]);
        let args = run(&cmd, Input::new(["none"])).await.unwrap();
        assert_eq!(args.value::<String>(0).as_deref(), Some("none"));
    }

    #[tokio::test]
    async fn test_named_arguments_take_precedence() {
        let cmd = command(vec![ParameterSpec::of::<i32>("a"), ParameterSpec::of::<i32>("b")]);
        let args = run(&cmd, Input::new(["7"]).with_named("a", "1")).await.unwrap();
        assert_eq!(args.value::<i32>(0), Some(1));
        assert_eq!(args.value::<i32>(1), Some(7));
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    fn point() -> ParameterSpec {
        ParameterSpec::constructible::<Point, _>(
            "point",
            vec![ParameterSpec::of::<i32>("x"), ParameterSpec::of::<i32>("y")],
            |args| {
                Ok(Point {
                    x: args.value(0).ok_or("missing x")?,
                    y: args.value(1).ok_or("missing y")?,
                })
            },
        )
    }

    #[tokio::test]
    async fn test_constructible() {
        let cmd = command(vec![point(), ParameterSpec::of::<String>("label")]);
        let args = run(&cmd, Input::new(["1", "2", "home"])).await.unwrap();
        assert_eq!(args.value::<Point>(0), Some(Point { x: 1, y: 2 }));
        assert_eq!(args.value::<String>(1).as_deref(), Some("home"));
    }

    #[tokio::test]
    async fn test_optional_constructible_falls_back_to_missing() {
        let cmd = command(vec![point().optional()]);
        let args = run(&cmd, Input::new(Vec::<String>::new())).await.unwrap();
        assert!(args.get(0).unwrap().is_missing());

        let failure = run(&command(vec![point()]), Input::new(["1", "y"])).await.unwrap_err();
        assert!(matches!(failure, Failure::ParseFailure { ref parameter, .. } if parameter == "y"));
    }

    #[tokio::test]
    async fn test_named_value_does_not_fill_constructible() {
        let cmd = command(vec![point()]);
        let args = run(&cmd, Input::new(["1", "2"]).with_named("point", "9")).await.unwrap();
        assert_eq!(args.value::<Point>(0), Some(Point { x: 1, y: 2 }));
    }

    #[tokio::test]
    async fn test_named_optional_keeps_required_bounds() {
        let cmd = command(vec![
            ParameterSpec::of::<i32>("a").optional(),
            ParameterSpec::of::<i32>("b"),
        ]);
        let failure = run(&cmd, Input::new(Vec::<String>::new()).with_named("a", "1"))
            .await
            .unwrap_err();
        assert!(matches!(
            failure,
            Failure::ArgumentCountMismatch { min: 1, max: Some(1), actual: 0, .. }
        ));

        let args = run(&cmd, Input::new(["2"]).with_named("a", "1")).await.unwrap();
        assert_eq!(args.value::<i32>(0), Some(1));
        assert_eq!(args.value::<i32>(1), Some(2));
    }

    #[tokio::test]
    async fn test_nested_count_mismatch_reports_window() {
        let cmd = command(vec![ParameterSpec::of::<i32>("a").optional(), point()]);
        let failure = run(&cmd, Input::new(["1", "2"])).await.unwrap_err();
        assert!(matches!(
            failure,
            Failure::ArgumentCountMismatch { min: 2, max: Some(2), actual: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_parse() {
        let cmd = command(vec![ParameterSpec::of::<i32>("a")]);
        let ctx = ExecutionContext::default();
        ctx.cancellation().cancel();
        let result = bind(&cmd, "cmd", 0, &Input::new(["1"]), &ctx, &PipelineSettings::default()).await;
        assert!(matches!(result, Err(Failure::Cancelled)));
    }

    #[tokio::test]
    async fn test_depth_skips_alias_tokens() {
        let cmd = command(vec![ParameterSpec::of::<i64>("a"), ParameterSpec::of::<i64>("b")]);
        let ctx = ExecutionContext::default();
        let input = Input::new(["math", "add", "3", "4"]);
        let args = bind(&cmd, "math add", 2, &input, &ctx, &PipelineSettings::default())
            .await
            .unwrap();
        assert_eq!(args.value::<i64>(0), Some(3));
        assert_eq!(args.value::<i64>(1), Some(4));
    }
}
