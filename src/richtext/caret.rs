// Caret Engine
// Toggles a format at a collapsed selection by inserting, splitting or exiting format nests

use super::document_tree::{DocumentTree, NodeId, Position, Side};
use super::error::{EditError, EditResult};
use super::format::Format;
use super::format_toggle::ToggleAction;
use super::markers::{self, Caret};
use super::selection_descriptor::{CaretDescriptor, classify_caret, node_root};

/// Result of a caret operation: what happened and where typing continues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaretOutcome {
    pub action: ToggleAction,
    pub caret: Position,
}

/// Toggle `format` at the caret
pub fn toggle_caret(tree: &mut DocumentTree, caret: Caret, format: &Format) -> EditResult<CaretOutcome> {
    let descriptor = classify_caret(tree, &caret, format)?;
    if !descriptor.inside(format) {
        return insert(tree, caret, format, &descriptor);
    }

    let node = descriptor.caret_node;
    let len = tree.text_len(node);
    if len == 0 {
        return discard(tree, caret, node, format);
    }
    let offset = tree
        .text_offset_in(node, caret.node)
        .ok_or(EditError::Unclassifiable)?;
    if offset == len {
        exit(tree, caret, format, Side::After)
    } else if offset == 0 {
        exit(tree, caret, format, Side::Before)
    } else {
        split(tree, caret, format)
    }
}

/// Start a `format` run at the caret, joining an adjacent `format` node when there is one
pub fn insert(
    tree: &mut DocumentTree,
    caret: Caret,
    format: &Format,
    descriptor: &CaretDescriptor,
) -> EditResult<CaretOutcome> {
    let anchor = tree.create_text("");
    let next = descriptor.caret_next.filter(|&n| tree.is_format(n, format));
    let prev = descriptor.caret_prev.filter(|&n| tree.is_format(n, format));

    if let Some(next) = next {
        log::debug!("caret insert: joining following {}", format);
        tree.insert_child(next, 0, anchor);
    } else if let Some(prev) = prev {
        log::debug!("caret insert: joining preceding {}", format);
        tree.append_child(prev, anchor);
    } else {
        log::debug!("caret insert: new {} placeholder", format);
        let wrapper = tree.create_format(format.clone());
        tree.append_child(wrapper, anchor);
        tree.insert_before(caret.node, wrapper)?;
    }
    tree.remove(caret.node);

    Ok(CaretOutcome {
        action: ToggleAction::Insert,
        caret: Position::Text {
            node: anchor,
            offset: 0,
        },
    })
}

/// Drop an empty `format` node the caret sits in, keeping any other formats inside it
fn discard(tree: &mut DocumentTree, caret: Caret, node: NodeId, format: &Format) -> EditResult<CaretOutcome> {
    log::debug!("caret discard: empty {}", format);
    tree.unwrap_node(node)?;
    Ok(CaretOutcome {
        action: ToggleAction::Discard,
        caret: settle(tree, caret)?,
    })
}

/// Cut the enclosing `format` node at the caret and continue typing between the halves
///
/// Formats nested inside the cut node carry over to the gap.
pub fn split(tree: &mut DocumentTree, caret: Caret, format: &Format) -> EditResult<CaretOutcome> {
    let descriptor = require_inside(tree, caret, format)?;
    let node = descriptor.caret_node;
    let container = tree.parent(node).ok_or(EditError::DetachedNode)?;

    let inner = formats_between(tree, caret.node, node);
    log::debug!("caret split: {} with {} inner format(s)", format, inner.len());

    markers::lift_to(tree, caret.node, container)?;
    let caret = place_nest(tree, caret, &inner)?;
    Ok(CaretOutcome {
        action: ToggleAction::Split,
        caret,
    })
}

/// Leave the enclosing `format` node on the left edge
pub fn exit_left(tree: &mut DocumentTree, caret: Caret, format: &Format) -> EditResult<CaretOutcome> {
    require_inside(tree, caret, format)?;
    exit(tree, caret, format, Side::Before)
}

/// Leave the enclosing `format` node on the right edge
pub fn exit_right(tree: &mut DocumentTree, caret: Caret, format: &Format) -> EditResult<CaretOutcome> {
    require_inside(tree, caret, format)?;
    exit(tree, caret, format, Side::After)
}

/// Step out of `format` and every format chained at the same edge, then
/// rebuild the ones other than `format` around a fresh anchor
fn exit(tree: &mut DocumentTree, caret: Caret, format: &Format, side: Side) -> EditResult<CaretOutcome> {
    let node = node_root(tree, caret.node, format)?;

    let mut top = node;
    while let Some(parent) = tree.parent(top).filter(|&p| tree.format_of(p).is_some()) {
        let at_edge = match side {
            Side::After => tree.text_after_in(parent, top) == Some(0),
            Side::Before => tree.text_offset_in(parent, top) == Some(0),
        };
        if !at_edge {
            break;
        }
        top = parent;
    }

    let mut lost = formats_between(tree, caret.node, top);
    if let Some(own) = tree.format_of(top).cloned() {
        lost.insert(0, own);
    }
    lost.retain(|f| f != format);

    let container = tree.parent(top).ok_or(EditError::DetachedNode)?;
    markers::lift_to(tree, caret.node, container)?;

    let kept: Vec<Format> = tree.formats_above(caret.node);
    lost.retain(|f| !kept.contains(f));
    log::debug!(
        "caret exit {:?}: leaving {}, rebuilding {:?}",
        side,
        format,
        lost.iter().map(Format::tag).collect::<Vec<_>>()
    );

    let caret = place_nest(tree, caret, &lost)?;
    Ok(CaretOutcome {
        action: match side {
            Side::Before => ToggleAction::ExitLeft,
            Side::After => ToggleAction::ExitRight,
        },
        caret,
    })
}

fn require_inside(tree: &DocumentTree, caret: Caret, format: &Format) -> EditResult<CaretDescriptor> {
    let descriptor = classify_caret(tree, &caret, format)?;
    if !descriptor.inside(format) {
        return Err(EditError::NotInsideFormat(format.tag().to_string()));
    }
    Ok(descriptor)
}

/// Formats strictly between `node` and `ancestor`, outermost first
fn formats_between(tree: &DocumentTree, node: NodeId, ancestor: NodeId) -> Vec<Format> {
    let mut formats: Vec<Format> = tree
        .ancestors(node)
        .take_while(|&a| a != ancestor)
        .filter_map(|a| tree.format_of(a).cloned())
        .collect();
    formats.reverse();
    formats
}

/// Build nested format nodes, outermost first, with an empty anchor run innermost
///
/// Returns the outermost node and the anchor.
pub fn create_node_nest(tree: &mut DocumentTree, formats: &[Format]) -> (NodeId, NodeId) {
    let anchor = tree.create_text("");
    let mut outer = anchor;
    for format in formats.iter().rev() {
        let wrapper = tree.create_format(format.clone());
        tree.append_child(wrapper, outer);
        outer = wrapper;
    }
    (outer, anchor)
}

/// Replace the caret marker by a nest of `formats` and return the anchor position
fn place_nest(tree: &mut DocumentTree, caret: Caret, formats: &[Format]) -> EditResult<Position> {
    let (outer, anchor) = create_node_nest(tree, formats);
    tree.insert_before(caret.node, outer)?;
    tree.remove(caret.node);
    Ok(Position::Text {
        node: anchor,
        offset: 0,
    })
}

/// Replace the caret marker by an empty anchor run
fn settle(tree: &mut DocumentTree, caret: Caret) -> EditResult<Position> {
    place_nest(tree, caret, &[])
}
