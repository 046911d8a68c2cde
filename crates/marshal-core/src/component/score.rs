//! Overload scoring.
//!
//! Scores order siblings during search: higher first, ties in declaration
//! order. A command scores `1 + Σ parameters + priority`; a group scores
//! `1 + Σ children + priority`, or `0` while it has no children.

use super::{Command, ComponentId};

pub fn command_score(command: &Command, priority: f32) -> f32 {
    1.0 + command.parameters().iter().map(|p| p.score()).sum::<f32>() + priority
}

pub fn group_score(child_scores: impl IntoIterator<Item = f32>, priority: f32) -> f32 {
    let mut children = child_scores.into_iter().peekable();
    if children.peek().is_none() {
        return 0.0;
    }
    1.0 + children.sum::<f32>() + priority
}

/// Returns `declared` sorted by descending score. The sort is stable.
pub fn sort_by_score(declared: &[ComponentId], score_of: impl Fn(ComponentId) -> f32) -> Vec<ComponentId> {
    let mut ordered = declared.to_vec();
    ordered.sort_by(|a, b| score_of(*b).total_cmp(&score_of(*a)));
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_group_scores_zero() {
        assert_eq!(group_score(std::iter::empty(), 5.0), 0.0);
        assert_eq!(group_score([2.0, 3.0], 0.5), 6.5);
    }

    #[test]
    fn test_sort_is_stable() {
        let ids = [ComponentId(0), ComponentId(1), ComponentId(2)];
        let scores = [1.0_f32, 2.0, 1.0];
        let ordered = sort_by_score(&ids, |id| scores[id.0]);
        assert_eq!(ordered, vec![ComponentId(1), ComponentId(0), ComponentId(2)]);
    }
}
