// Selection Descriptor
// Classifies a sliced selection against the format being toggled

use super::document_tree::{DocumentTree, NodeId, NodeKind, NodeType};
use super::error::{EditError, EditResult};
use super::format::Format;
use super::markers::{Caret, Slice};

/// Snapshot of how a sliced selection relates to the surrounding formats
///
/// Only the line and boundary fields drive the toggle decision. The root nodes
/// and neighbour fields record the tree as it was classified; wrapping lifts the
/// markers first and picks its merge targets from the tree at that point.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionDescriptor {
    pub start_line: NodeId,
    pub end_line: NodeId,
    pub is_multiline: bool,
    /// Nearest ancestor of the start marker that is the format or a block
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub start_format: NodeType,
    pub end_format: NodeType,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub prev_format: Option<Format>,
    pub next_format: Option<Format>,
    /// Share of the selected bytes that already sit under the format
    pub coverage: f32,
}

/// The collapsed-selection counterpart of [`SelectionDescriptor`]
#[derive(Debug, Clone, PartialEq)]
pub struct CaretDescriptor {
    pub line: NodeId,
    pub caret_node: NodeId,
    pub caret_format: NodeType,
    pub caret_prev: Option<NodeId>,
    pub caret_next: Option<NodeId>,
    pub caret_prev_format: Option<Format>,
    pub caret_next_format: Option<Format>,
}

impl CaretDescriptor {
    pub fn inside(&self, format: &Format) -> bool {
        self.caret_format.is_format(format)
    }
}

/// Nearest ancestor of `node` that is either `format` or a block
pub fn node_root(tree: &DocumentTree, node: NodeId, format: &Format) -> EditResult<NodeId> {
    tree.ancestors(node)
        .find(|&a| tree.is_format(a, format) || tree.is_block(a))
        .ok_or(EditError::Unclassifiable)
}

/// Direction to peek from a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peek {
    Forward,
    Backward,
}

/// The node right next to a marker, climbing out of parents it sits at the edge of
fn peek(tree: &DocumentTree, marker: NodeId, direction: Peek) -> Option<NodeId> {
    let mut node = marker;
    loop {
        let mut sibling = step(tree, node, direction);
        while let Some(s) = sibling {
            let skip = tree.marker_kind(s).is_some() || (tree.is_text(s) && !tree.has_text(s));
            if !skip {
                return Some(s);
            }
            sibling = step(tree, s, direction);
        }
        let parent = tree.parent(node)?;
        if tree.is_block(parent) {
            return None;
        }
        node = parent;
    }
}

fn step(tree: &DocumentTree, node: NodeId, direction: Peek) -> Option<NodeId> {
    match direction {
        Peek::Forward => tree.next_sibling(node),
        Peek::Backward => tree.prev_sibling(node),
    }
}

/// Whether `node` is `format`, or opens with it along the edge facing the marker
fn edge_has_format(tree: &DocumentTree, node: NodeId, format: &Format, direction: Peek) -> bool {
    let mut current = Some(node);
    while let Some(n) = current {
        if tree.format_of(n).is_none() {
            return false;
        }
        if tree.is_format(n, format) {
            return true;
        }
        current = match direction {
            Peek::Forward => tree.first_child(n),
            Peek::Backward => tree.last_child(n),
        };
    }
    false
}

/// Format attributed to a boundary marker
fn boundary_format(
    tree: &DocumentTree,
    marker: NodeId,
    root: NodeId,
    format: &Format,
    direction: Peek,
) -> EditResult<NodeType> {
    let root_type = tree.node_type(root).ok_or(EditError::DetachedNode)?;
    if root_type.is_format(format) {
        return Ok(root_type);
    }
    match peek(tree, marker, direction) {
        Some(sibling) if edge_has_format(tree, sibling, format, direction) => {
            Ok(NodeType::Format(format.clone()))
        }
        Some(sibling) if tree.format_of(sibling).is_some() => {
            tree.node_type(sibling).ok_or(EditError::DetachedNode)
        }
        _ => Ok(root_type),
    }
}

/// Describe a sliced range against `format`
pub fn classify(tree: &DocumentTree, slice: &Slice, format: &Format) -> EditResult<SelectionDescriptor> {
    let start_line = tree.line_of(slice.start).ok_or(EditError::Unclassifiable)?;
    let end_line = tree.line_of(slice.end).ok_or(EditError::Unclassifiable)?;

    let start_node = node_root(tree, slice.start, format)?;
    let end_node = node_root(tree, slice.end, format)?;
    let start_format = boundary_format(tree, slice.start, start_node, format, Peek::Forward)?;
    let end_format = boundary_format(tree, slice.end, end_node, format, Peek::Backward)?;

    let prev_sibling = tree.prev_sibling(slice.start);
    let next_sibling = tree.next_sibling(slice.end);
    let prev_format = prev_sibling
        .and_then(|n| tree.format_of(n))
        .or_else(|| tree.format_of(start_node))
        .cloned();
    let next_format = next_sibling
        .and_then(|n| tree.format_of(n))
        .or_else(|| tree.format_of(end_node))
        .cloned();

    Ok(SelectionDescriptor {
        start_line,
        end_line,
        is_multiline: start_line != end_line,
        start_node,
        end_node,
        start_format,
        end_format,
        prev_sibling,
        next_sibling,
        prev_format,
        next_format,
        coverage: coverage(tree, slice, format),
    })
}

/// Share of the text between the markers that is already under `format`
pub fn coverage(tree: &DocumentTree, slice: &Slice, format: &Format) -> f32 {
    struct Tally {
        inside: bool,
        total: usize,
        formatted: usize,
    }

    fn visit(tree: &DocumentTree, node: NodeId, slice: &Slice, format: &Format, depth: usize, tally: &mut Tally) {
        if node == slice.start {
            tally.inside = true;
        } else if node == slice.end {
            tally.inside = false;
        }
        match tree.kind(node) {
            Some(NodeKind::Text(text)) if tally.inside => {
                tally.total += text.len();
                if depth > 0 {
                    tally.formatted += text.len();
                }
            }
            _ => {
                let depth = depth + usize::from(tree.is_format(node, format));
                for &child in tree.children(node) {
                    visit(tree, child, slice, format, depth, tally);
                }
            }
        }
    }

    let mut tally = Tally {
        inside: false,
        total: 0,
        formatted: 0,
    };
    visit(tree, tree.root(), slice, format, 0, &mut tally);
    if tally.total == 0 {
        0.0
    } else {
        tally.formatted as f32 / tally.total as f32
    }
}

/// Describe a caret against `format`
pub fn classify_caret(tree: &DocumentTree, caret: &Caret, format: &Format) -> EditResult<CaretDescriptor> {
    let line = tree.line_of(caret.node).ok_or(EditError::Unclassifiable)?;
    let caret_node = node_root(tree, caret.node, format)?;
    let caret_format = tree.node_type(caret_node).ok_or(EditError::DetachedNode)?;

    let caret_prev = non_empty_sibling(tree, caret.node, Peek::Backward);
    let caret_next = non_empty_sibling(tree, caret.node, Peek::Forward);

    Ok(CaretDescriptor {
        line,
        caret_node,
        caret_format,
        caret_prev,
        caret_next,
        caret_prev_format: caret_prev.and_then(|n| tree.format_of(n)).cloned(),
        caret_next_format: caret_next.and_then(|n| tree.format_of(n)).cloned(),
    })
}

fn non_empty_sibling(tree: &DocumentTree, node: NodeId, direction: Peek) -> Option<NodeId> {
    let mut sibling = step(tree, node, direction);
    while let Some(s) = sibling {
        if !(tree.is_text(s) && !tree.has_text(s)) {
            return Some(s);
        }
        sibling = step(tree, s, direction);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::document_tree::{DocumentPosition, MarkerKind, Selection};
    use crate::richtext::markers::{Sliced, slice};
    use crate::richtext::markup::parse;

    fn sliced(markup: &str, from: (usize, usize), to: (usize, usize)) -> (DocumentTree, Slice) {
        let mut tree = parse(markup).unwrap().tree;
        let selection = Selection::new(
            tree.locate(DocumentPosition::new(from.0, from.1)).unwrap(),
            tree.locate(DocumentPosition::new(to.0, to.1)).unwrap(),
        );
        match slice(&mut tree, selection).unwrap() {
            Sliced::Range(s) => (tree, s),
            Sliced::Caret(_) => panic!("expected a range"),
        }
    }

    #[test]
    fn test_plain_selection() {
        let (tree, slice) = sliced("<p>hello world</p>", (0, 6), (0, 11));
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();

        assert!(!desc.is_multiline);
        assert_eq!(desc.start_format, NodeType::Block);
        assert_eq!(desc.end_format, NodeType::Block);
        assert_eq!(desc.coverage, 0.0);
        assert_eq!(desc.prev_format, None);
    }

    #[test]
    fn test_inside_format() {
        let (tree, slice) = sliced("<p>a<strong>bcd</strong>e</p>", (0, 2), (0, 3));
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();

        assert!(desc.start_format.is_format(&Format::bold()));
        assert!(desc.end_format.is_format(&Format::bold()));
        assert_eq!(desc.start_node, desc.end_node);
        assert_eq!(desc.coverage, 1.0);
    }

    #[test]
    fn test_peek_attributes_adjacent_format() {
        // the start lands at the end of "hello " and peeks into the bold node
        let (tree, slice) = sliced("<p>hello <strong>world</strong></p>", (0, 6), (0, 11));
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();

        assert_eq!(desc.start_node, tree.block(0).unwrap());
        assert!(desc.start_format.is_format(&Format::bold()));
        assert!(desc.end_format.is_format(&Format::bold()));
    }

    #[test]
    fn test_peek_through_nested_edge() {
        let (tree, slice) = sliced("<p>x<em><strong>yz</strong></em></p>", (0, 1), (0, 3));
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();
        assert!(desc.start_format.is_format(&Format::bold()));

        let desc = classify(&tree, &slice, &Format::underline()).unwrap();
        assert!(desc.start_format.is_format(&Format::italic()));
    }

    #[test]
    fn test_partial_coverage() {
        let (tree, slice) = sliced("<p><strong>hel</strong>lo</p>", (0, 1), (0, 5));
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();

        assert!(desc.start_format.is_format(&Format::bold()));
        assert_eq!(desc.end_format, NodeType::Block);
        assert_eq!(desc.coverage, 0.5);
    }

    #[test]
    fn test_multiline() {
        let (tree, slice) = sliced("<p>first line</p><p>second line</p>", (0, 6), (1, 6));
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();
        assert!(desc.is_multiline);
        assert_eq!(desc.start_line, tree.block(0).unwrap());
        assert_eq!(desc.end_line, tree.block(1).unwrap());
    }

    #[test]
    fn test_neighbours_at_classification() {
        let markup = parse("<p><em>ab</em><ctx-start/>cd<ctx-end/><u>ef</u></p>").unwrap();
        let slice = Slice {
            start: markup.marker(MarkerKind::Start).unwrap(),
            end: markup.marker(MarkerKind::End).unwrap(),
        };
        let tree = markup.tree;
        let desc = classify(&tree, &slice, &Format::bold()).unwrap();

        let block = tree.block(0).unwrap();
        assert_eq!(desc.start_node, block);
        assert_eq!(desc.end_node, block);
        assert_eq!(desc.prev_sibling, Some(tree.children(block)[0]));
        assert_eq!(desc.next_sibling, Some(tree.children(block)[4]));
        assert_eq!(desc.prev_format, Some(Format::italic()));
        assert_eq!(desc.next_format, Some(Format::underline()));
    }

    #[test]
    fn test_caret_descriptor() {
        let mut tree = parse("<p><em>ab</em><strong>cd</strong></p>").unwrap().tree;
        let position = tree.locate(DocumentPosition::new(0, 3)).unwrap();
        let caret = crate::richtext::markers::place_caret(&mut tree, position).unwrap();
        let desc = classify_caret(&tree, &caret, &Format::bold()).unwrap();

        assert!(desc.inside(&Format::bold()));
        assert_eq!(desc.line, tree.block(0).unwrap());
        assert!(desc.caret_prev.is_some());
        assert_eq!(desc.caret_prev_format, None);

        let desc = classify_caret(&tree, &caret, &Format::italic()).unwrap();
        assert!(!desc.inside(&Format::italic()));
        assert_eq!(desc.caret_format, NodeType::Block);
    }
}
