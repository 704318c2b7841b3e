// Tree Walker
// Lazy walk along the sibling axis from one node to another

use super::document_tree::{DocumentTree, NodeId};
use std::iter::FusedIterator;

/// One visited node together with its neighbours on the walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkStep {
    /// None on the first step
    pub prev: Option<NodeId>,
    pub current: NodeId,
    /// None on the last step
    pub next: Option<NodeId>,
}

/// Iterator returned by [`walk_a_to_b`]
pub struct SiblingWalk<'a> {
    tree: &'a DocumentTree,
    end: NodeId,
    prev: Option<NodeId>,
    current: Option<NodeId>,
}

/// Walk forward over siblings from `start` to `end`, both inclusive
///
/// The walk stops at `end` or when the siblings run out, so an `end` that
/// cannot be reached from `start` still terminates.
pub fn walk_a_to_b(tree: &DocumentTree, start: NodeId, end: NodeId) -> SiblingWalk<'_> {
    SiblingWalk {
        tree,
        end,
        prev: None,
        current: Some(start),
    }
}

impl Iterator for SiblingWalk<'_> {
    type Item = WalkStep;

    fn next(&mut self) -> Option<WalkStep> {
        let current = self.current?;
        let next = if current == self.end {
            None
        } else {
            self.tree.next_sibling(current)
        };

        let step = WalkStep {
            prev: self.prev,
            current,
            next,
        };
        self.prev = Some(current);
        self.current = next;
        Some(step)
    }
}

impl FusedIterator for SiblingWalk<'_> {}
