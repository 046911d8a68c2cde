//! Depth-first alias matching.
//!
//! The search walks one [`Snapshot`] and yields candidates in the order the
//! executor should try them: siblings by descending score, a matched group's
//! descendants before the group's own "incomplete route" fallback.

use std::sync::Arc;

use tracing::trace;

use crate::component::{Command, ComponentId, Node, NodeKind, Snapshot};
use crate::condition::ConditionEvaluator;

/// A command the search matched.
#[derive(Clone)]
pub struct CommandMatch {
    pub node: Arc<Node>,
    pub command: Arc<Command>,
    pub evaluators: Arc<[ConditionEvaluator]>,
    /// Number of tokens consumed by aliases.
    pub depth: usize,
    /// Primary aliases along the matched route, joined by spaces.
    pub path: String,
}

/// One result of a search.
#[derive(Clone)]
pub enum Candidate {
    /// A command whose alias matched the token at `depth - 1`.
    Found(CommandMatch),
    /// A default command reached at `depth` without consuming a token.
    Partial(CommandMatch),
    /// A named group matched but none of its descendants did.
    RouteIncomplete { group: Arc<Node>, path: String },
}

impl Candidate {
    /// The matched command, if this candidate is executable.
    pub fn command(&self) -> Option<&CommandMatch> {
        match self {
            Self::Found(m) | Self::Partial(m) => Some(m),
            Self::RouteIncomplete { .. } => None,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Found(m) | Self::Partial(m) => &m.path,
            Self::RouteIncomplete { path, .. } => path,
        }
    }
}

impl std::fmt::Debug for Candidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Found(m) => write!(f, "Found({:?}, {})", m.path, m.depth),
            Self::Partial(m) => write!(f, "Partial({:?}, {})", m.path, m.depth),
            Self::RouteIncomplete { path, .. } => write!(f, "RouteIncomplete({path:?})"),
        }
    }
}

/// Finds every candidate for `tokens` in `snapshot`.
///
/// An empty result means no alias path matched at all.
pub fn search(snapshot: &Snapshot, tokens: &[String]) -> Vec<Candidate> {
    let keys: Vec<String> = tokens
        .iter()
        .map(|t| snapshot.normalize(t).into_owned())
        .collect();
    let mut walker = Walker {
        snapshot,
        keys: &keys,
        route: Vec::new(),
        out: Vec::new(),
    };
    walker.visit(&snapshot.root().ordered, 0);
    trace!(tokens = keys.len(), candidates = walker.out.len(), "search finished");
    walker.out
}

struct Walker<'a> {
    snapshot: &'a Snapshot,
    keys: &'a [String],
    route: Vec<&'a str>,
    out: Vec<Candidate>,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, ordered: &'a [ComponentId], depth: usize) {
        let snapshot = self.snapshot;
        for id in ordered {
            let Some(node) = snapshot.get(*id) else { continue };

            if node.is_default() {
                match &node.kind {
                    NodeKind::Command { .. } => {
                        let found = self.command_match(node, depth);
                        self.out.extend(found.map(Candidate::Partial));
                    }
                    NodeKind::Group(children) => self.visit(&children.ordered, depth),
                }
                continue;
            }

            let Some(key) = self.keys.get(depth) else { continue };
            if !node.matches(key) {
                continue;
            }

            let name = node.primary_name().unwrap_or_default();
            match &node.kind {
                NodeKind::Group(children) => {
                    self.route.push(name);
                    self.visit(&children.ordered, depth + 1);
                    self.out.push(Candidate::RouteIncomplete {
                        group: Arc::clone(node),
                        path: self.route.join(" "),
                    });
                    self.route.pop();
                }
                NodeKind::Command { .. } => {
                    self.route.push(name);
                    let found = self.command_match(node, depth + 1);
                    self.out.extend(found.map(Candidate::Found));
                    self.route.pop();
                }
            }
        }
    }

    fn command_match(&self, node: &Arc<Node>, depth: usize) -> Option<CommandMatch> {
        let NodeKind::Command { command, evaluators } = &node.kind else {
            return None;
        };
        Some(CommandMatch {
            node: Arc::clone(node),
            command: Arc::clone(command),
            evaluators: Arc::clone(evaluators),
            depth,
            path: self.route.join(" "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::activator_fn;
    use crate::component::{ComponentDraft, ComponentTree, Parent};
    use crate::parameter::ParameterSpec;
    use crate::parser::ParserRegistry;
    use crate::value::Return;

    fn command(params: Vec<ParameterSpec>) -> Command {
        Command::new(
            params,
            &ParserRegistry::with_defaults(),
            activator_fn(|_| async { Ok(Return::Void) }),
        )
        .unwrap()
    }

    fn tokens(input: &str) -> Vec<String> {
        input.split_whitespace().map(String::from).collect()
    }

    fn describe(candidates: &[Candidate]) -> Vec<String> {
        candidates.iter().map(|c| format!("{c:?}")).collect()
    }

    #[test]
    fn test_every_alias_reaches_command() {
        let tree = ComponentTree::default();
        let group = tree
            .insert(ComponentDraft::group(["math", "m"]), Parent::Root)
            .unwrap();
        tree.insert(
            ComponentDraft::command(["add", "plus"], command(vec![])),
            Parent::Group(group),
        )
        .unwrap();

        let snapshot = tree.snapshot();
        for input in ["math add", "m add", "MATH plus", "m Plus"] {
            let found = search(&snapshot, &tokens(input));
            assert_eq!(
                describe(&found),
                vec![r#"Found("math add", 2)"#, r#"RouteIncomplete("math")"#],
                "input {input}"
            );
        }
    }

    #[test]
    fn test_no_match_is_empty() {
        let tree = ComponentTree::default();
        tree.insert(ComponentDraft::command(["ping"], command(vec![])), Parent::Root)
            .unwrap();
        assert!(search(&tree.snapshot(), &tokens("pong")).is_empty());
        assert!(search(&tree.snapshot(), &[]).is_empty());
    }

    #[test]
    fn test_overloads_sorted_by_score() {
        let tree = ComponentTree::default();
        tree.insert(
            ComponentDraft::command(["get"], command(vec![ParameterSpec::of::<i32>("id")])),
            Parent::Root,
        )
        .unwrap();
        let wide = tree
            .insert(
                ComponentDraft::command(
                    ["get"],
                    command(vec![
                        ParameterSpec::of::<i32>("id"),
                        ParameterSpec::of::<String>("name"),
                    ]),
                ),
                Parent::Root,
            )
            .unwrap();

        let found = search(&tree.snapshot(), &tokens("get 5 alice"));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].command().map(|m| m.node.id()), Some(wide));
    }

    #[test]
    fn test_default_members() {
        let tree = ComponentTree::default();
        let group = tree.insert(ComponentDraft::group(["calc"]), Parent::Root).unwrap();
        tree.insert(
            ComponentDraft::command(Vec::<String>::new(), command(vec![ParameterSpec::of::<String>("expr").remainder()])),
            Parent::Group(group),
        )
        .unwrap();
        let hidden = tree.insert(ComponentDraft::group(Vec::<String>::new()), Parent::Group(group)).unwrap();
        tree.insert(ComponentDraft::command(["sqrt"], command(vec![])), Parent::Group(hidden))
            .unwrap();

        let found = search(&tree.snapshot(), &tokens("calc sqrt"));
        assert_eq!(
            describe(&found),
            vec![
                r#"Found("calc sqrt", 2)"#,
                r#"Partial("calc", 1)"#,
                r#"RouteIncomplete("calc")"#
            ]
        );
    }
}
