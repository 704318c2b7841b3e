// Boundary Markers
// Pins selection endpoints into the tree so they survive splits and moves

use super::document_tree::{DocumentPosition, DocumentTree, MarkerKind, NodeId, Position, Selection};
use super::error::{EditError, EditResult};

/// A start/end marker pair bracketing the selected content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start: NodeId,
    pub end: NodeId,
}

/// A single caret marker standing in for a collapsed selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caret {
    pub node: NodeId,
}

/// The result of slicing a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sliced {
    Range(Slice),
    Caret(Caret),
}

/// Insert markers for the selection and return their handles
///
/// The end marker goes in first so the start position is still valid when
/// the start marker is inserted.
pub fn slice(tree: &mut DocumentTree, selection: Selection) -> EditResult<Sliced> {
    if selection.is_collapsed() {
        return place_caret(tree, selection.start).map(Sliced::Caret);
    }

    let (start, end) = ordered(tree, selection)?;

    let end_marker = tree.create_marker(MarkerKind::End);
    tree.insert_at(end, end_marker)?;
    let start_marker = tree.create_marker(MarkerKind::Start);
    tree.insert_at(start, start_marker)?;

    sweep_empty_around(tree, start_marker);
    sweep_empty_around(tree, end_marker);

    log::trace!(
        "sliced selection {:?}..{:?}",
        tree.position_of(start_marker),
        tree.position_of(end_marker)
    );
    Ok(Sliced::Range(Slice {
        start: start_marker,
        end: end_marker,
    }))
}

fn ordered(tree: &DocumentTree, selection: Selection) -> EditResult<(Position, Position)> {
    let a = tree.resolve(selection.start)?;
    let b = tree.resolve(selection.end)?;
    if b < a {
        Ok((selection.end, selection.start))
    } else {
        Ok((selection.start, selection.end))
    }
}

/// Insert a caret marker at a position
pub fn place_caret(tree: &mut DocumentTree, position: Position) -> EditResult<Caret> {
    let node = tree.create_marker(MarkerKind::Caret);
    tree.insert_at(position, node)?;
    log::trace!("placed caret at {:?}", tree.position_of(node));
    Ok(Caret { node })
}

/// Remove empty text runs and content-free formats directly next to a marker
pub fn sweep_empty_around(tree: &mut DocumentTree, marker: NodeId) {
    while let Some(prev) = tree.prev_sibling(marker) {
        if !is_sweepable(tree, prev) {
            break;
        }
        tree.remove(prev);
    }
    while let Some(next) = tree.next_sibling(marker) {
        if !is_sweepable(tree, next) {
            break;
        }
        tree.remove(next);
    }
}

fn is_sweepable(tree: &DocumentTree, id: NodeId) -> bool {
    if tree.is_text(id) {
        return !tree.has_text(id);
    }
    tree.format_of(id).is_some() && !tree.has_text(id) && !tree.contains_marker(id)
}

/// Move a marker up until it is a direct child of `container`
///
/// At each level the marker leaves its parent through the nearest edge. When
/// it sits in the middle the parent is split around it, so neither half is
/// ever empty.
pub fn lift_to(tree: &mut DocumentTree, marker: NodeId, container: NodeId) -> EditResult {
    loop {
        let parent = tree.parent(marker).ok_or(EditError::DetachedNode)?;
        if parent == container {
            return Ok(());
        }
        if tree.parent(parent).is_none() || tree.is_block(parent) {
            return Err(EditError::Unclassifiable);
        }

        let index = tree.index_in_parent(marker).ok_or(EditError::DetachedNode)?;
        let last = tree.children(parent).len() - 1;
        if index == 0 {
            tree.move_before(parent, marker)?;
        } else if index == last {
            tree.move_after(parent, marker)?;
        } else {
            tree.split_children(parent, index)?;
            tree.move_after(parent, marker)?;
        }
    }
}

/// Nearest node containing both markers
pub fn common_ancestor(tree: &DocumentTree, a: NodeId, b: NodeId) -> EditResult<NodeId> {
    tree.common_ancestor(a, b).ok_or(EditError::Unclassifiable)
}

/// Siblings strictly between two markers that share a parent
pub fn nodes_between(tree: &DocumentTree, start: NodeId, end: NodeId) -> EditResult<Vec<NodeId>> {
    let parent = tree.parent(start).ok_or(EditError::DetachedNode)?;
    if tree.parent(end) != Some(parent) {
        return Err(EditError::Unclassifiable);
    }
    let from = tree.index_in_parent(start).ok_or(EditError::DetachedNode)?;
    let to = tree.index_in_parent(end).ok_or(EditError::DetachedNode)?;
    if to < from {
        return Err(EditError::Unclassifiable);
    }
    Ok(tree.children(parent)[from + 1..to].to_vec())
}

/// Gather the content between two sibling markers into a select node
pub fn enclose_between(tree: &mut DocumentTree, start: NodeId, end: NodeId) -> EditResult<NodeId> {
    let content = nodes_between(tree, start, end)?;
    let select = tree.create_marker(MarkerKind::Select);
    tree.insert_after(start, select)?;
    for node in content {
        tree.detach(node);
        tree.append_child(select, node);
    }
    Ok(select)
}

/// Take the markers out of the tree, reporting where they were
pub fn release(
    tree: &mut DocumentTree,
    slice: Slice,
) -> EditResult<(DocumentPosition, DocumentPosition)> {
    let start = tree.position_of(slice.start)?;
    let end = tree.position_of(slice.end)?;
    tree.remove(slice.start);
    tree.remove(slice.end);
    Ok((start, end))
}
