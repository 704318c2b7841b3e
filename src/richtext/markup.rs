// Markup
// HTML-like text form of a document tree, with optional selection markers

use super::document_tree::{
    BlockType, DocumentPosition, DocumentTree, MarkerKind, NodeId, NodeKind, Selection,
};
use super::error::{EditError, EditResult};
use super::format::Format;
use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(/)?([a-z][a-z0-9-]*)\s*(/)?$").expect("markup tag pattern compiles")
});

/// Render the tree, markers included
pub fn to_markup(tree: &DocumentTree) -> String {
    let mut out = String::new();
    for &block in tree.blocks() {
        write_node(tree, block, &mut out);
    }
    out
}

/// Render the tree with the selection shown as `<ctx-start/>`/`<ctx-end/>` or `<ctx-caret/>`
///
/// The tree itself is left untouched.
pub fn to_markup_with_selection(tree: &DocumentTree, selection: Selection) -> String {
    let mut copy = tree.clone();
    let placed = if selection.is_collapsed() {
        let caret = copy.create_marker(MarkerKind::Caret);
        copy.insert_at(selection.start, caret)
    } else {
        let end = copy.create_marker(MarkerKind::End);
        let start = copy.create_marker(MarkerKind::Start);
        copy.insert_at(selection.end, end)
            .and_then(|_| copy.insert_at(selection.start, start))
    };
    match placed {
        Ok(()) => to_markup(&copy),
        Err(err) => {
            log::warn!("selection not shown in markup: {}", err);
            to_markup(tree)
        }
    }
}

fn write_node(tree: &DocumentTree, node: NodeId, out: &mut String) {
    let tag = match tree.kind(node) {
        Some(NodeKind::Text(text)) => {
            escape_into(text, out);
            return;
        }
        Some(NodeKind::Marker(kind)) if *kind != MarkerKind::Select => {
            out.push('<');
            out.push_str(kind.tag());
            out.push_str("/>");
            return;
        }
        Some(NodeKind::Marker(kind)) => kind.tag(),
        Some(NodeKind::Block(block_type)) => block_type.tag(),
        Some(NodeKind::Format(format)) => format.tag(),
        Some(NodeKind::Root) | None => return,
    };

    out.push('<');
    out.push_str(tag);
    out.push('>');
    for &child in tree.children(node) {
        write_node(tree, child, out);
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape_into(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// A parsed document together with the markers found in it
#[derive(Debug, Clone)]
pub struct Markup {
    pub tree: DocumentTree,
    /// Markers in document order
    pub markers: Vec<(MarkerKind, NodeId)>,
}

impl Markup {
    /// The marker of the given kind, if the input had one
    pub fn marker(&self, kind: MarkerKind) -> Option<NodeId> {
        self.markers
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
    }

    /// Turn the markers into a host selection and remove them from the tree
    pub fn into_document(self) -> EditResult<(DocumentTree, Option<(DocumentPosition, DocumentPosition)>)> {
        let mut tree = self.tree;
        let start = self.markers.iter().find(|(k, _)| *k == MarkerKind::Start);
        let end = self.markers.iter().find(|(k, _)| *k == MarkerKind::End);
        let caret = self.markers.iter().find(|(k, _)| *k == MarkerKind::Caret);

        let selection = match (start, end, caret) {
            (Some(&(_, s)), Some(&(_, e)), None) => Some((tree.position_of(s)?, tree.position_of(e)?)),
            (None, None, Some(&(_, c))) => {
                let at = tree.position_of(c)?;
                Some((at, at))
            }
            (None, None, None) => None,
            _ => {
                return Err(EditError::Markup(
                    "expected either a start/end pair or a single caret".to_string(),
                ));
            }
        };

        for &(kind, id) in &self.markers {
            if kind == MarkerKind::Select {
                tree.unwrap_node(id)?;
            } else {
                tree.remove(id);
            }
        }
        tree.normalize(None);
        Ok((tree, selection))
    }
}

/// Parse markup into a tree, keeping any markers as nodes
pub fn parse(input: &str) -> EditResult<Markup> {
    let mut tree = DocumentTree::new();
    let mut markers = Vec::new();
    let mut stack: Vec<(String, NodeId)> = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(open) = rest.find('<') else {
            push_text(&mut tree, &stack, rest)?;
            break;
        };
        if open > 0 {
            push_text(&mut tree, &stack, &rest[..open])?;
        }
        let close = rest[open..]
            .find('>')
            .map(|i| open + i)
            .ok_or_else(|| EditError::Markup("unterminated tag".to_string()))?;
        let raw = &rest[open + 1..close];
        rest = &rest[close + 1..];

        let captures = TAG
            .captures(raw)
            .ok_or_else(|| EditError::Markup(format!("malformed tag <{}>", raw)))?;
        let closing = captures.get(1).is_some();
        let self_closing = captures.get(3).is_some();
        let name = &captures[2];

        if closing {
            match stack.pop() {
                Some((open_name, _)) if open_name == name => continue,
                Some((open_name, _)) => {
                    return Err(EditError::Markup(format!(
                        "</{}> closes <{}>",
                        name, open_name
                    )));
                }
                None => return Err(EditError::Markup(format!("stray </{}>", name))),
            }
        }

        let node = open_node(&mut tree, &stack, name, self_closing)?;
        if let Some(kind) = tree.marker_kind(node) {
            markers.push((kind, node));
        }
        match stack.last() {
            Some(&(_, parent)) => tree.append_child(parent, node),
            None => tree.append_child(tree.root(), node),
        }
        if !self_closing {
            stack.push((name.to_string(), node));
        }
    }

    if let Some((name, _)) = stack.last() {
        return Err(EditError::Markup(format!("<{}> is never closed", name)));
    }
    Ok(Markup { tree, markers })
}

fn open_node(
    tree: &mut DocumentTree,
    stack: &[(String, NodeId)],
    name: &str,
    self_closing: bool,
) -> EditResult<NodeId> {
    let at_top = stack.is_empty();

    if let Some(block_type) = BlockType::from_tag(name) {
        if !at_top {
            return Err(EditError::Markup(format!("<{}> inside a block", name)));
        }
        return Ok(tree.create_block(block_type));
    }
    if at_top {
        return Err(EditError::Markup(format!("<{}> outside a block", name)));
    }
    if let Some(kind) = MarkerKind::from_tag(name) {
        let wants_children = kind == MarkerKind::Select;
        if wants_children == self_closing {
            return Err(EditError::Markup(format!("<{}> has the wrong form", name)));
        }
        return Ok(tree.create_marker(kind));
    }
    if self_closing {
        return Err(EditError::Markup(format!("<{}/> cannot be empty", name)));
    }
    let format = Format::new(name).map_err(|e| EditError::Markup(e.to_string()))?;
    Ok(tree.create_format(format))
}

fn push_text(tree: &mut DocumentTree, stack: &[(String, NodeId)], text: &str) -> EditResult {
    match stack.last() {
        Some(&(_, parent)) => {
            let run = tree.create_text(&unescape(text));
            tree.append_child(parent, run);
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(EditError::Markup(format!("text {:?} outside a block", text))),
    }
}
