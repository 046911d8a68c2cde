use std::borrow::Cow;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use super::score::{command_score, group_score, sort_by_score};
use super::{Children, Command, ComponentDraft, ComponentId, ComponentKind, Node, NodeKind, Parent, not_a_group};
use crate::condition::{ConditionSpec, group_conditions};
use crate::error::{BuildError, BuildResult};

/// Pattern every alias must match unless configured otherwise: no
/// whitespace and no quotes.
pub const DEFAULT_NAME_PATTERN: &str = r#"^[^\s"']+$"#;

/// Naming and matching rules of a tree.
///
/// Without an explicit pattern, aliases must be non-empty and free of
/// whitespace and quotes ([`DEFAULT_NAME_PATTERN`]).
#[derive(Debug, Clone, Default)]
pub struct TreeSettings {
    naming: Option<Regex>,
    case_sensitive: bool,
}

impl TreeSettings {
    pub fn new(pattern: &str, case_sensitive: bool) -> BuildResult<Self> {
        let naming = Regex::new(pattern).map_err(|e| BuildError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            naming: Some(naming),
            case_sensitive,
        })
    }

    pub fn pattern(&self) -> &str {
        self.naming.as_ref().map_or(DEFAULT_NAME_PATTERN, Regex::as_str)
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn validate(&self, names: &[String]) -> BuildResult<()> {
        let valid = |name: &str| match &self.naming {
            Some(re) => re.is_match(name),
            None => {
                !name.is_empty()
                    && !name
                        .chars()
                        .any(|c| c.is_whitespace() || c == '"' || c == '\'')
            }
        };
        match names.iter().find(|name| !valid(name.as_str())) {
            Some(name) => Err(BuildError::invalid_name(name.as_str(), self.pattern())),
            None => Ok(()),
        }
    }
}

/// A command as listed by [`Snapshot::commands`].
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub id: ComponentId,
    /// Primary aliases from the root down to the command.
    pub path: Vec<String>,
    /// Every alias of the command itself.
    pub aliases: Vec<String>,
    pub command: Arc<Command>,
}

impl CommandEntry {
    pub fn display_path(&self) -> String {
        self.path.join(" ")
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// An immutable view of the whole tree.
#[derive(Clone)]
pub struct Snapshot {
    nodes: Vec<Arc<Node>>,
    root: Children,
    case_sensitive: bool,
    version: u64,
}

impl Snapshot {
    fn empty(case_sensitive: bool) -> Self {
        Self {
            nodes: Vec::new(),
            root: Children::default(),
            case_sensitive,
            version: 0,
        }
    }

    pub fn get(&self, id: ComponentId) -> Option<&Arc<Node>> {
        self.nodes.get(id.0)
    }

    pub fn root(&self) -> &Children {
        &self.root
    }

    /// Children of `parent`, or `None` if it is not a group.
    pub fn children(&self, parent: Parent) -> Option<&Children> {
        match parent {
            Parent::Root => Some(&self.root),
            Parent::Group(id) => match &self.get(id)?.kind {
                NodeKind::Group(children) => Some(children),
                NodeKind::Command { .. } => None,
            },
        }
    }

    /// Number of arena slots, bound or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Incremented on every published mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Normalises a token for alias comparison.
    pub fn normalize<'a>(&self, token: &'a str) -> Cow<'a, str> {
        if self.case_sensitive {
            Cow::Borrowed(token)
        } else {
            Cow::Owned(token.to_lowercase())
        }
    }

    /// Every reachable command, depth-first in declaration order.
    pub fn commands(&self) -> Vec<CommandEntry> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        self.collect_commands(&self.root.declared, &mut path, &mut out);
        out
    }

    fn collect_commands(&self, ids: &[ComponentId], path: &mut Vec<String>, out: &mut Vec<CommandEntry>) {
        for id in ids {
            let Some(node) = self.get(*id) else { continue };
            let pushed = match node.primary_name() {
                Some(name) => {
                    path.push(name.to_string());
                    true
                }
                None => false,
            };
            match &node.kind {
                NodeKind::Command { command, .. } => out.push(CommandEntry {
                    id: node.id,
                    path: path.clone(),
                    aliases: node.names.clone(),
                    command: Arc::clone(command),
                }),
                NodeKind::Group(children) => self.collect_commands(&children.declared, path, out),
            }
            if pushed {
                path.pop();
            }
        }
    }

    fn node_mut(&mut self, id: ComponentId) -> BuildResult<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .map(Arc::make_mut)
            .ok_or(BuildError::UnknownComponent { id: id.0 })
    }

    fn children_mut(&mut self, parent: Parent) -> BuildResult<&mut Children> {
        match parent {
            Parent::Root => Ok(&mut self.root),
            Parent::Group(id) => match &mut self.node_mut(id)?.kind {
                NodeKind::Group(children) => Ok(children),
                NodeKind::Command { .. } => Err(not_a_group(id)),
            },
        }
    }

    fn parent_of(&self, id: ComponentId) -> Option<Parent> {
        self.get(id).and_then(|n| n.parent)
    }

    fn push(&mut self, draft: ComponentDraft, settings: &TreeSettings) -> BuildResult<ComponentId> {
        settings.validate(&draft.names)?;

        let id = ComponentId(self.nodes.len());
        let keys = draft
            .names
            .iter()
            .map(|n| self.normalize(n).into_owned())
            .collect();
        let (kind, score) = match draft.kind {
            ComponentKind::Command(command) => {
                let evaluators = group_conditions(&draft.attributes.conditions)?;
                let score = command_score(&command, draft.attributes.priority);
                (
                    NodeKind::Command {
                        command,
                        evaluators: evaluators.into(),
                    },
                    score,
                )
            }
            ComponentKind::Group => (NodeKind::Group(Children::default()), 0.0),
        };

        self.nodes.push(Arc::new(Node {
            id,
            names: draft.names,
            keys,
            parent: None,
            attributes: Arc::new(draft.attributes),
            kind,
            score,
        }));
        Ok(id)
    }

    fn attach(&mut self, id: ComponentId, parent: Parent) -> BuildResult<()> {
        let node = self
            .get(id)
            .cloned()
            .ok_or(BuildError::UnknownComponent { id: id.0 })?;
        if let Parent::Group(g) = parent {
            match self.get(g) {
                None => return Err(BuildError::UnknownComponent { id: g.0 }),
                Some(target) if !target.is_group() => return Err(not_a_group(g)),
                Some(_) => {}
            }
        }

        match node.parent {
            Some(current) if current == parent => return Ok(()),
            Some(_) => return Err(BuildError::AlreadyBound { id: id.0 }),
            None => {}
        }

        if let Parent::Group(target) = parent {
            let mut cursor = Some(target);
            while let Some(ancestor) = cursor {
                if ancestor == id {
                    return Err(BuildError::Cycle {
                        id: id.0,
                        parent: target.0,
                    });
                }
                cursor = match self.parent_of(ancestor) {
                    Some(Parent::Group(g)) => Some(g),
                    _ => None,
                };
            }
        }

        let inherited = self.inherited_conditions(parent);
        self.resolve_evaluators(id, &inherited)?;

        self.node_mut(id)?.parent = Some(parent);
        self.children_mut(parent)?.declared.push(id);
        self.refresh_scores(parent)
    }

    fn detach(&mut self, id: ComponentId) -> BuildResult<bool> {
        let Some(parent) = self.parent_of(id) else {
            return Ok(false);
        };
        self.children_mut(parent)?.declared.retain(|child| *child != id);
        self.node_mut(id)?.parent = None;
        self.refresh_scores(parent)?;
        Ok(true)
    }

    /// Conditions declared on the ancestors of a would-be child of `parent`,
    /// outermost first.
    fn inherited_conditions(&self, parent: Parent) -> Vec<ConditionSpec> {
        let mut chain = Vec::new();
        let mut cursor = parent;
        while let Parent::Group(id) = cursor {
            let Some(node) = self.get(id) else { break };
            chain.push(Arc::clone(&node.attributes));
            cursor = node.parent.unwrap_or(Parent::Root);
        }
        chain
            .iter()
            .rev()
            .flat_map(|attrs| attrs.conditions.iter().cloned())
            .collect()
    }

    fn resolve_evaluators(&mut self, id: ComponentId, inherited: &[ConditionSpec]) -> BuildResult<()> {
        let node = self
            .get(id)
            .cloned()
            .ok_or(BuildError::UnknownComponent { id: id.0 })?;
        let specs: Vec<ConditionSpec> = inherited
            .iter()
            .chain(node.attributes.conditions.iter())
            .cloned()
            .collect();

        match &node.kind {
            NodeKind::Command { .. } => {
                let resolved = group_conditions(&specs)?;
                if let NodeKind::Command { evaluators, .. } = &mut self.node_mut(id)?.kind {
                    *evaluators = resolved.into();
                }
            }
            NodeKind::Group(children) => {
                for child in &children.declared {
                    self.resolve_evaluators(*child, &specs)?;
                }
            }
        }
        Ok(())
    }

    /// Recomputes group scores and sorted views from `start` up to the root.
    fn refresh_scores(&mut self, start: Parent) -> BuildResult<()> {
        let mut cursor = start;
        loop {
            let Some(declared) = self.children(cursor).map(|c| c.declared.clone()) else {
                return Ok(());
            };
            let score_of = |child: ComponentId| self.get(child).map_or(0.0, |n| n.score);
            let ordered = sort_by_score(&declared, &score_of);

            match cursor {
                Parent::Root => {
                    self.root.ordered = ordered;
                    return Ok(());
                }
                Parent::Group(id) => {
                    let scores: Vec<f32> = declared.iter().map(|c| score_of(*c)).collect();
                    let node = self.node_mut(id)?;
                    node.score = group_score(scores, node.attributes.priority);
                    if let NodeKind::Group(children) = &mut node.kind {
                        children.ordered = ordered;
                    }
                    match node.parent {
                        Some(parent) => cursor = parent,
                        None => return Ok(()),
                    }
                }
            }
        }
    }
}

// =============================================================================
// ComponentTree
// =============================================================================

/// The mutable registry of commands and groups.
///
/// Writers serialise on a mutex and publish a new [`Snapshot`] atomically;
/// readers call [`snapshot`](Self::snapshot) and never take a lock.
pub struct ComponentTree {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    settings: TreeSettings,
}

impl ComponentTree {
    pub fn new(settings: TreeSettings) -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty(settings.case_sensitive)),
            writer: Mutex::new(()),
            settings,
        }
    }

    pub fn settings(&self) -> &TreeSettings {
        &self.settings
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Snapshot, &TreeSettings) -> BuildResult<R>) -> BuildResult<R> {
        let _guard = self.writer.lock();
        let mut next = Snapshot::clone(&self.current.load());
        let out = f(&mut next, &self.settings)?;
        next.version += 1;
        self.current.store(Arc::new(next));
        Ok(out)
    }

    /// Adds an unbound component to the arena.
    pub fn create(&self, draft: ComponentDraft) -> BuildResult<ComponentId> {
        self.mutate(|snapshot, settings| snapshot.push(draft, settings))
    }

    /// Binds an existing component under `parent`.
    ///
    /// Re-attaching to the current parent is a no-op.
    pub fn attach(&self, id: ComponentId, parent: Parent) -> BuildResult<()> {
        self.mutate(|snapshot, _| snapshot.attach(id, parent))?;
        debug!(component = %id, ?parent, "component attached");
        Ok(())
    }

    /// Creates a component and binds it under `parent` in one step.
    pub fn insert(&self, draft: ComponentDraft, parent: Parent) -> BuildResult<ComponentId> {
        let names = draft.names.join("|");
        let id = self.mutate(|snapshot, settings| {
            let id = snapshot.push(draft, settings)?;
            snapshot.attach(id, parent)?;
            Ok(id)
        })?;
        debug!(component = %id, names = %names, ?parent, "component inserted");
        Ok(id)
    }

    /// Detaches a component. Returns `false` if it was not bound.
    ///
    /// The component keeps its arena slot and can be attached again with
    /// [`attach`](Self::attach). Slots are never freed: inserting a fresh
    /// draft instead of re-attaching grows the arena, and every mutation
    /// copies the slot vector (one `Arc` per node).
    pub fn remove(&self, id: ComponentId) -> bool {
        let _guard = self.writer.lock();
        let mut next = Snapshot::clone(&self.current.load());
        match next.detach(id) {
            Ok(true) => {
                next.version += 1;
                self.current.store(Arc::new(next));
                debug!(component = %id, "component removed");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: ComponentId) -> Option<Arc<super::Node>> {
        self.current.load().get(id).cloned()
    }

    pub fn commands(&self) -> Vec<CommandEntry> {
        self.current.load().commands()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}

impl Default for ComponentTree {
    fn default() -> Self {
        Self::new(TreeSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::activator::activator_fn;
    use crate::condition::{ConditionSpec, Unmet, condition_fn};
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

    #[test]
    fn test_rejects_invalid_names() {
        let tree = ComponentTree::default();
        let err = tree
            .insert(ComponentDraft::command(["ok", "not ok"], command(vec![])), Parent::Root)
            .unwrap_err();
        assert!(matches!(err, BuildError::InvalidName { ref name, .. } if name == "not ok"));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_rebinding_rules() {
        let tree = ComponentTree::default();
        let a = tree.insert(ComponentDraft::group(["a"]), Parent::Root).unwrap();
        let b = tree.insert(ComponentDraft::group(["b"]), Parent::Root).unwrap();
        let cmd = tree
            .insert(ComponentDraft::command(["c"], command(vec![])), Parent::Group(a))
            .unwrap();

        tree.attach(cmd, Parent::Group(a)).unwrap();
        assert_eq!(tree.snapshot().children(Parent::Group(a)).unwrap().declared, vec![cmd]);

        assert!(matches!(
            tree.attach(cmd, Parent::Group(b)),
            Err(BuildError::AlreadyBound { .. })
        ));
        assert!(tree.remove(cmd));
        assert!(!tree.remove(cmd));
        tree.attach(cmd, Parent::Group(b)).unwrap();
        assert_eq!(tree.commands()[0].path, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_cycle_detection() {
        let tree = ComponentTree::default();
        let outer = tree.insert(ComponentDraft::group(["outer"]), Parent::Root).unwrap();
        let inner = tree
            .insert(ComponentDraft::group(["inner"]), Parent::Group(outer))
            .unwrap();
        assert!(tree.remove(outer));
        assert!(matches!(
            tree.attach(outer, Parent::Group(inner)),
            Err(BuildError::Cycle { .. })
        ));
        assert!(matches!(
            tree.attach(outer, Parent::Group(outer)),
            Err(BuildError::Cycle { .. })
        ));
    }

    #[test]
    fn test_scores_propagate() {
        let tree = ComponentTree::default();
        let group = tree.insert(ComponentDraft::group(["g"]), Parent::Root).unwrap();
        assert_eq!(tree.get(group).unwrap().score(), 0.0);

        tree.insert(
            ComponentDraft::command(["x"], command(vec![ParameterSpec::of::<i32>("n")])),
            Parent::Group(group),
        )
        .unwrap();
        // command: 1 + 1.5; group: 1 + 2.5
        assert_eq!(tree.get(group).unwrap().score(), 3.5);

        let low = tree
            .insert(ComponentDraft::command(["low"], command(vec![])), Parent::Root)
            .unwrap();
        assert_eq!(tree.snapshot().root().ordered, vec![group, low]);
    }

    #[test]
    fn test_conditions_inherited_top_down() {
        let tree = ComponentTree::default();
        let deny = condition_fn("deny", |_| Err(Unmet::new("denied")));
        let group = tree
            .insert(
                ComponentDraft::group(["admin"]).with_condition(ConditionSpec::and(deny)),
                Parent::Root,
            )
            .unwrap();
        let cmd = tree
            .insert(ComponentDraft::command(["ban"], command(vec![])), Parent::Group(group))
            .unwrap();

        let node = tree.get(cmd).unwrap();
        let NodeKind::Command { evaluators, .. } = node.kind() else {
            panic!("expected command");
        };
        assert_eq!(evaluators.len(), 1);
        assert_eq!(evaluators[0].conditions()[0].name(), "deny");
    }

    #[test]
    fn test_snapshot_is_stable_across_mutation() {
        let tree = ComponentTree::default();
        let before = tree.snapshot();
        tree.insert(ComponentDraft::command(["x"], command(vec![])), Parent::Root)
            .unwrap();
        assert!(before.root().declared.is_empty());
        assert_eq!(tree.snapshot().root().declared.len(), 1);
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let tree = ComponentTree::default();
        let group = tree.insert(ComponentDraft::group(["g"]), Parent::Root).unwrap();
        tree.insert(ComponentDraft::command(["keep"], command(vec![])), Parent::Group(group))
            .unwrap();
        let churn = tree
            .insert(ComponentDraft::command(["churn"], command(vec![])), Parent::Group(group))
            .unwrap();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..500 {
                    assert!(tree.remove(churn));
                    tree.attach(churn, Parent::Group(group)).unwrap();
                }
                done.store(true, Ordering::Release);
            });
            for _ in 0..4 {
                s.spawn(|| {
                    while !done.load(Ordering::Acquire) {
                        let snapshot = tree.snapshot();
                        let children = snapshot.children(Parent::Group(group)).unwrap();
                        let score = snapshot.get(group).unwrap().score();
                        assert_eq!(children.declared.len(), children.ordered.len());
                        // Each child command scores 1.0; the group adds 1.0.
                        match children.declared.len() {
                            1 => assert_eq!(score, 2.0),
                            2 => assert_eq!(score, 3.0),
                            n => panic!("torn child set of {n}"),
                        }
                    }
                });
            }
        });

        // Re-attaching reuses the slot.
        assert_eq!(tree.len(), 3);
        assert_eq!(tree.snapshot().version(), 3 + 2 * 500);
    }
}
