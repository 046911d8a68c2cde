//! Preconditions gating command invocation.
//!
//! A [`Condition`] is a named boolean gate. Conditions are attached to
//! commands and groups through [`ConditionSpec`]s, each naming the
//! [`Evaluator`] that combines it with its siblings. When a command is bound
//! into the tree, the specs inherited from every ancestor (outermost first)
//! and its own specs are grouped by evaluator into [`ConditionEvaluator`]s,
//! sorted by ascending order.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::trace;

use crate::context::ExecutionContext;
use crate::error::{BuildError, BuildResult, Failure};
use crate::value::Arguments;

/// A condition's explanation of why it did not pass.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct Unmet {
    message: String,
}

impl Unmet {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// What a condition can see when it runs.
#[derive(Clone, Copy)]
pub struct ConditionContext<'a> {
    pub execution: &'a ExecutionContext,
    /// Alias path of the command being checked.
    pub command: &'a str,
    /// The already-bound arguments of the candidate.
    pub arguments: &'a Arguments,
}

/// A boolean gate evaluated before a command is invoked.
#[async_trait]
pub trait Condition: Send + Sync + 'static {
    /// Identity reported when the condition fails.
    fn name(&self) -> &str;

    async fn check(&self, ctx: &ConditionContext<'_>) -> Result<(), Unmet>;
}

/// A condition backed by a synchronous closure.
pub struct FnCondition<F> {
    name: String,
    check: F,
}

#[async_trait]
impl<F> Condition for FnCondition<F>
where
    F: Fn(&ConditionContext<'_>) -> Result<(), Unmet> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, ctx: &ConditionContext<'_>) -> Result<(), Unmet> {
        (self.check)(ctx)
    }
}

/// Creates a condition from a closure.
pub fn condition_fn<F>(name: impl Into<String>, check: F) -> Arc<dyn Condition>
where
    F: Fn(&ConditionContext<'_>) -> Result<(), Unmet> + Send + Sync + 'static,
{
    Arc::new(FnCondition {
        name: name.into(),
        check,
    })
}

// =============================================================================
// Evaluators
// =============================================================================

/// How the conditions of one evaluator combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every condition must pass.
    And,
    /// At least one condition must pass.
    Or,
}

/// Well-known evaluator orders.
pub struct Order;

impl Order {
    pub const FIRST: i32 = i32::MIN;
    pub const DEFAULT: i32 = 0;
    pub const LAST: i32 = i32::MAX;
}

/// Identity and policy of a condition group.
///
/// Two specs belong to the same group when their evaluators share a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluator {
    name: Cow<'static, str>,
    combinator: Combinator,
    order: i32,
    max_conditions: Option<usize>,
}

impl Evaluator {
    /// The predefined conjunctive evaluator.
    pub const AND: Evaluator = Evaluator::new_static("and", Combinator::And);
    /// The predefined disjunctive evaluator.
    pub const OR: Evaluator = Evaluator::new_static("or", Combinator::Or);

    const fn new_static(name: &'static str, combinator: Combinator) -> Self {
        Self {
            name: Cow::Borrowed(name),
            combinator,
            order: Order::DEFAULT,
            max_conditions: None,
        }
    }

    /// A custom evaluator.
    pub fn new(name: impl Into<Cow<'static, str>>, combinator: Combinator) -> Self {
        Self {
            name: name.into(),
            combinator,
            order: Order::DEFAULT,
            max_conditions: None,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_conditions(mut self, max: usize) -> Self {
        self.max_conditions = Some(max);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn order(&self) -> i32 {
        self.order
    }
}

/// A condition declared on a component, tagged with its evaluator.
#[derive(Clone)]
pub struct ConditionSpec {
    pub condition: Arc<dyn Condition>,
    pub evaluator: Evaluator,
}

impl ConditionSpec {
    pub fn new(evaluator: Evaluator, condition: Arc<dyn Condition>) -> Self {
        Self {
            condition,
            evaluator,
        }
    }

    pub fn and(condition: Arc<dyn Condition>) -> Self {
        Self::new(Evaluator::AND, condition)
    }

    pub fn or(condition: Arc<dyn Condition>) -> Self {
        Self::new(Evaluator::OR, condition)
    }
}

impl fmt::Debug for ConditionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionSpec")
            .field("condition", &self.condition.name())
            .field("evaluator", &self.evaluator.name())
            .finish()
    }
}

/// The conditions grouped under one evaluator.
#[derive(Clone)]
pub struct ConditionEvaluator {
    evaluator: Evaluator,
    conditions: Vec<Arc<dyn Condition>>,
}

impl ConditionEvaluator {
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub fn conditions(&self) -> &[Arc<dyn Condition>] {
        &self.conditions
    }

    /// Runs this group against `ctx`.
    async fn run(&self, ctx: &ConditionContext<'_>) -> GroupOutcome {
        let mut first_failure = None;
        for condition in &self.conditions {
            if ctx.execution.is_cancelled() {
                return GroupOutcome::Cancelled;
            }
            let outcome = tokio::select! {
                biased;
                _ = ctx.execution.cancellation().cancelled() => return GroupOutcome::Cancelled,
                outcome = condition.check(ctx) => outcome,
            };
            trace!(
                condition = condition.name(),
                evaluator = self.evaluator.name(),
                passed = outcome.is_ok(),
                "condition checked"
            );
            match (self.evaluator.combinator, outcome) {
                (Combinator::And, Err(unmet)) => {
                    return GroupOutcome::Unmet(condition.name().to_string(), unmet);
                }
                (Combinator::Or, Ok(())) => return GroupOutcome::Passed,
                (Combinator::Or, Err(unmet)) => {
                    first_failure.get_or_insert((condition.name().to_string(), unmet));
                }
                (Combinator::And, Ok(())) => {}
            }
        }
        match first_failure {
            Some((condition, unmet)) => GroupOutcome::Unmet(condition, unmet),
            None => GroupOutcome::Passed,
        }
    }
}

enum GroupOutcome {
    Passed,
    Unmet(String, Unmet),
    Cancelled,
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionEvaluator")
            .field("evaluator", &self.evaluator)
            .field("conditions", &self.conditions.len())
            .finish()
    }
}

/// Groups `specs` by evaluator name and sorts the groups by ascending order.
///
/// Specs keep their relative order inside a group; groups with equal order
/// keep first-appearance order.
pub fn group_conditions<'a>(specs: impl IntoIterator<Item = &'a ConditionSpec>) -> BuildResult<Vec<ConditionEvaluator>> {
    let mut groups: Vec<ConditionEvaluator> = Vec::new();
    for spec in specs {
        match groups
            .iter_mut()
            .find(|g| g.evaluator.name == spec.evaluator.name)
        {
            Some(group) => group.conditions.push(Arc::clone(&spec.condition)),
            None => groups.push(ConditionEvaluator {
                evaluator: spec.evaluator.clone(),
                conditions: vec![Arc::clone(&spec.condition)],
            }),
        }
    }

    for group in &groups {
        match group.evaluator.max_conditions {
            Some(max) if group.conditions.len() > max => {
                return Err(BuildError::ConditionCapExceeded {
                    evaluator: group.evaluator.name().to_string(),
                    max,
                    actual: group.conditions.len(),
                });
            }
            _ => {}
        }
    }

    groups.sort_by_key(|g| g.evaluator.order);
    Ok(groups)
}

/// Evaluates every group in order, stopping at the first failing group.
pub async fn evaluate(evaluators: &[ConditionEvaluator], ctx: &ConditionContext<'_>) -> Result<(), Failure> {
    for group in evaluators {
        match group.run(ctx).await {
            GroupOutcome::Passed => {}
            GroupOutcome::Unmet(condition, unmet) => {
                return Err(Failure::ConditionUnmet {
                    command: ctx.command.to_string(),
                    condition,
                    message: unmet.message,
                });
            }
            GroupOutcome::Cancelled => return Err(Failure::Cancelled),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(name: &str) -> Arc<dyn Condition> {
        condition_fn(name, |_| Ok(()))
    }

    fn fail(name: &str, message: &'static str) -> Arc<dyn Condition> {
        condition_fn(name, move |_| Err(Unmet::new(message)))
    }

    async fn run(specs: &[ConditionSpec]) -> Result<(), Failure> {
        let groups = group_conditions(specs).unwrap();
        let execution = ExecutionContext::default();
        let arguments = Arguments::default();
        let ctx = ConditionContext {
            execution: &execution,
            command: "cmd",
            arguments: &arguments,
        };
        evaluate(&groups, &ctx).await
    }

    #[tokio::test]
    async fn test_and_reports_first_failure() {
        let result = run(&[
            ConditionSpec::and(pass("a")),
            ConditionSpec::and(fail("b", "no b")),
            ConditionSpec::and(fail("c", "no c")),
        ])
        .await;
        match result {
            Err(Failure::ConditionUnmet { condition, message, .. }) => {
                assert_eq!(condition, "b");
                assert_eq!(message, "no b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_or_passes_with_one() {
        let result = run(&[
            ConditionSpec::or(fail("x", "no x")),
            ConditionSpec::or(pass("y")),
        ])
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_or_all_fail_reports_first() {
        let result = run(&[
            ConditionSpec::or(fail("x", "no x")),
            ConditionSpec::or(fail("y", "no y")),
        ])
        .await;
        assert!(matches!(result, Err(Failure::ConditionUnmet { condition, .. }) if condition == "x"));
    }

    #[tokio::test]
    async fn test_groups_run_in_order() {
        let early = Evaluator::new("early", Combinator::And).with_order(Order::FIRST);
        let result = run(&[
            ConditionSpec::and(fail("late", "late")),
            ConditionSpec::new(early, fail("early", "early")),
        ])
        .await;
        assert!(matches!(result, Err(Failure::ConditionUnmet { condition, .. }) if condition == "early"));
    }

    #[test]
    fn test_cap_exceeded() {
        let capped = Evaluator::new("single", Combinator::And).with_max_conditions(1);
        let specs = [
            ConditionSpec::new(capped.clone(), pass("a")),
            ConditionSpec::new(capped, pass("b")),
        ];
        let err = group_conditions(&specs).unwrap_err();
        assert!(matches!(err, BuildError::ConditionCapExceeded { max: 1, actual: 2, .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_check() {
        let groups = group_conditions(&[ConditionSpec::and(pass("a"))]).unwrap();
        let execution = ExecutionContext::default();
        execution.cancellation().cancel();
        let arguments = Arguments::default();
        let ctx = ConditionContext {
            execution: &execution,
            command: "cmd",
            arguments: &arguments,
        };
        assert!(matches!(evaluate(&groups, &ctx).await, Err(Failure::Cancelled)));
    }
}
