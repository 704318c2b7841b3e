// Document Tree
// Arena-backed tree of blocks and inline nodes that the formatting engines rewrite in place

use super::error::{EditError, EditResult};
use super::format::Format;
use slotmap::{SlotMap, new_key_type};
use std::fmt;
use unicode_segmentation::UnicodeSegmentation;

new_key_type! {
    /// Handle to a node owned by a [`DocumentTree`]
    pub struct NodeId;
}

/// Block-level content types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockType {
    Paragraph,
    Heading {
        level: u8,
    }, // 1-6
    BlockQuote,
    ListItem,
    CodeBlock,
}

impl BlockType {
    pub fn heading(level: u8) -> Self {
        BlockType::Heading {
            level: level.clamp(1, 6),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            BlockType::Paragraph => "p",
            BlockType::Heading { level } => match level {
                1 => "h1",
                2 => "h2",
                3 => "h3",
                4 => "h4",
                5 => "h5",
                _ => "h6",
            },
            BlockType::BlockQuote => "blockquote",
            BlockType::ListItem => "li",
            BlockType::CodeBlock => "pre",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "p" => BlockType::Paragraph,
            "h1" => BlockType::heading(1),
            "h2" => BlockType::heading(2),
            "h3" => BlockType::heading(3),
            "h4" => BlockType::heading(4),
            "h5" => BlockType::heading(5),
            "h6" => BlockType::heading(6),
            "blockquote" => BlockType::BlockQuote,
            "li" => BlockType::ListItem,
            "pre" => BlockType::CodeBlock,
            _ => return None,
        })
    }
}

/// The transient zero-width sentinels used while a toggle is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    Start,
    End,
    Select,
    Caret,
}

impl MarkerKind {
    pub fn tag(self) -> &'static str {
        match self {
            MarkerKind::Start => "ctx-start",
            MarkerKind::End => "ctx-end",
            MarkerKind::Select => "ctx-select",
            MarkerKind::Caret => "ctx-caret",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "ctx-start" => Some(MarkerKind::Start),
            "ctx-end" => Some(MarkerKind::End),
            "ctx-select" => Some(MarkerKind::Select),
            "ctx-caret" => Some(MarkerKind::Caret),
            _ => None,
        }
    }
}

/// What a node is, together with the data it owns
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Block(BlockType),
    Text(String),
    Format(Format),
    Marker(MarkerKind),
}

/// The comparable "node type" of a node, without its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeType {
    Root,
    Block,
    Text,
    Format(Format),
    Marker(MarkerKind),
}

impl NodeType {
    pub fn is_format(&self, format: &Format) -> bool {
        matches!(self, NodeType::Format(f) if f == format)
    }
}

/// Which end of a node's child list content is moved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Before,
    After,
}

/// A point in the tree that does not depend on marker nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Byte offset inside a text run
    Text { node: NodeId, offset: usize },
    /// Gap before the child at `index` (or after the last child)
    Child { container: NodeId, index: usize },
}

impl Position {
    pub fn text_node(&self) -> Option<NodeId> {
        match self {
            Position::Text { node, .. } => Some(*node),
            Position::Child { .. } => None,
        }
    }
}

/// An ordered pair of positions; collapsed when both are the same point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: Position,
    pub end: Position,
}

impl Selection {
    pub fn new(start: Position, end: Position) -> Self {
        Selection { start, end }
    }

    pub fn caret(position: Position) -> Self {
        Selection {
            start: position,
            end: position,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Position within a document as the host sees it
/// This represents a logical cursor position in the flattened block text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DocumentPosition {
    pub block_index: usize,
    pub offset: usize, // Byte offset within the block's flattened text
}

impl DocumentPosition {
    pub fn new(block_index: usize, offset: usize) -> Self {
        DocumentPosition {
            block_index,
            offset,
        }
    }

    pub fn start() -> Self {
        DocumentPosition::new(0, 0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Node {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Iterator over the proper ancestors of a node, nearest first
pub struct Ancestors<'a> {
    tree: &'a DocumentTree,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.parent(id);
        Some(id)
    }
}

/// The document: an ordered forest of blocks under a single root
#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: SlotMap<NodeId, Node>,
    root: NodeId,
}

impl DocumentTree {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(Node::new(NodeKind::Root));
        DocumentTree { nodes, root }
    }

    /// Create a simple document with one paragraph
    pub fn with_paragraph(text: &str) -> Self {
        let mut tree = Self::new();
        let block = tree.push_block(BlockType::Paragraph);
        if !text.is_empty() {
            let run = tree.create_text(text);
            tree.append_child(block, run);
        }
        tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    // -- construction

    fn create(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.insert(Node::new(kind))
    }

    pub fn create_block(&mut self, block_type: BlockType) -> NodeId {
        self.create(NodeKind::Block(block_type))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.create(NodeKind::Text(text.to_string()))
    }

    pub fn create_format(&mut self, format: Format) -> NodeId {
        self.create(NodeKind::Format(format))
    }

    pub fn create_marker(&mut self, kind: MarkerKind) -> NodeId {
        self.create(NodeKind::Marker(kind))
    }

    /// Append a new, empty block to the document
    pub fn push_block(&mut self, block_type: BlockType) -> NodeId {
        let block = self.create_block(block_type);
        self.append_child(self.root, block);
        block
    }

    /// A detached copy of a node without its children
    pub fn shallow_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id].kind.clone();
        self.create(kind)
    }

    // -- queries

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn kind(&self, id: NodeId) -> Option<&NodeKind> {
        self.nodes.get(id).map(|n| &n.kind)
    }

    pub fn node_type(&self, id: NodeId) -> Option<NodeType> {
        self.kind(id).map(|kind| match kind {
            NodeKind::Root => NodeType::Root,
            NodeKind::Block(_) => NodeType::Block,
            NodeKind::Text(_) => NodeType::Text,
            NodeKind::Format(f) => NodeType::Format(f.clone()),
            NodeKind::Marker(m) => NodeType::Marker(*m),
        })
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => Some(t),
            _ => None,
        }
    }

    pub fn format_of(&self, id: NodeId) -> Option<&Format> {
        match self.kind(id) {
            Some(NodeKind::Format(f)) => Some(f),
            _ => None,
        }
    }

    pub fn is_format(&self, id: NodeId, format: &Format) -> bool {
        self.format_of(id) == Some(format)
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Block(_)))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.kind(id), Some(NodeKind::Text(_)))
    }

    pub fn marker_kind(&self, id: NodeId) -> Option<MarkerKind> {
        match self.kind(id) {
            Some(NodeKind::Marker(m)) => Some(*m),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Whether `ancestor` is `id` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        id == ancestor || self.ancestors(id).any(|a| a == ancestor)
    }

    /// The block (line) a node lives in, or the node itself if it is a block
    pub fn line_of(&self, id: NodeId) -> Option<NodeId> {
        if self.is_block(id) {
            return Some(id);
        }
        self.ancestors(id).find(|&a| self.is_block(a))
    }

    /// Nearest common proper ancestor of two nodes
    pub fn common_ancestor(&self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let chain: Vec<NodeId> = self.ancestors(a).collect();
        self.ancestors(b).find(|n| chain.contains(n))
    }

    /// Blocks of the document, in order
    pub fn blocks(&self) -> &[NodeId] {
        self.children(self.root)
    }

    pub fn block(&self, index: usize) -> Option<NodeId> {
        self.blocks().get(index).copied()
    }

    pub fn block_count(&self) -> usize {
        self.blocks().len()
    }

    pub fn block_index(&self, block: NodeId) -> Option<usize> {
        self.blocks().iter().position(|&b| b == block)
    }

    pub fn block_type(&self, block: NodeId) -> Option<&BlockType> {
        match self.kind(block) {
            Some(NodeKind::Block(bt)) => Some(bt),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks().is_empty()
    }

    /// Get the total text length below a node
    pub fn text_len(&self, id: NodeId) -> usize {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => t.len(),
            _ => self.children(id).iter().map(|&c| self.text_len(c)).sum(),
        }
    }

    /// Flatten to plain text
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            Some(NodeKind::Text(t)) => out.push_str(t),
            _ => {
                for &c in self.children(id) {
                    self.collect_text(c, out);
                }
            }
        }
    }

    /// Whether any text run below the node has content
    pub fn has_text(&self, id: NodeId) -> bool {
        self.text_len(id) > 0
    }

    /// Whether any marker sits inside the node's subtree
    pub fn contains_marker(&self, id: NodeId) -> bool {
        self.children(id)
            .iter()
            .any(|&c| self.marker_kind(c).is_some() || self.contains_marker(c))
    }

    /// Length of the text that precedes `target` inside `ancestor`
    pub fn text_offset_in(&self, ancestor: NodeId, target: NodeId) -> Option<usize> {
        fn walk(tree: &DocumentTree, node: NodeId, target: NodeId, acc: &mut usize) -> bool {
            if node == target {
                return true;
            }
            if let Some(NodeKind::Text(t)) = tree.kind(node) {
                *acc += t.len();
                return false;
            }
            tree.children(node)
                .iter()
                .any(|&c| walk(tree, c, target, acc))
        }

        let mut acc = 0;
        walk(self, ancestor, target, &mut acc).then_some(acc)
    }

    /// Length of the text that follows `target` (and its subtree) inside `ancestor`
    pub fn text_after_in(&self, ancestor: NodeId, target: NodeId) -> Option<usize> {
        let before = self.text_offset_in(ancestor, target)?;
        Some(
            self.text_len(ancestor)
                .saturating_sub(before + self.text_len(target)),
        )
    }

    /// Text runs below a node in document order
    pub fn text_runs(&self, id: NodeId) -> Vec<NodeId> {
        let mut runs = Vec::new();
        self.collect_runs(id, &mut runs);
        runs
    }

    fn collect_runs(&self, id: NodeId, runs: &mut Vec<NodeId>) {
        if self.is_text(id) {
            runs.push(id);
            return;
        }
        for &c in self.children(id) {
            self.collect_runs(c, runs);
        }
    }

    /// Formats of a node's ancestors below its block, outermost first
    pub fn formats_above(&self, id: NodeId) -> Vec<Format> {
        let mut formats: Vec<Format> = self
            .ancestors(id)
            .take_while(|&a| !self.is_block(a))
            .filter_map(|a| self.format_of(a).cloned())
            .collect();
        formats.reverse();
        formats
    }

    /// Convert to plain text
    pub fn to_plain_text(&self) -> String {
        self.blocks()
            .iter()
            .map(|&b| self.text_content(b))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    // -- mutation

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        debug_assert!(self.nodes[child].parent.is_none(), "child is still attached");
        let children = &mut self.nodes[parent].children;
        let index = index.min(children.len());
        children.insert(index, child);
        self.nodes[child].parent = Some(parent);
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let len = self.nodes[parent].children.len();
        self.insert_child(parent, len, child);
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> EditResult {
        let parent = self.parent(reference).ok_or(EditError::DetachedNode)?;
        let index = self
            .index_in_parent(reference)
            .ok_or(EditError::DetachedNode)?;
        self.insert_child(parent, index, node);
        Ok(())
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> EditResult {
        let parent = self.parent(reference).ok_or(EditError::DetachedNode)?;
        let index = self
            .index_in_parent(reference)
            .ok_or(EditError::DetachedNode)?;
        self.insert_child(parent, index + 1, node);
        Ok(())
    }

    /// Detach `node` from wherever it is and put it right before `reference`
    pub fn move_before(&mut self, reference: NodeId, node: NodeId) -> EditResult {
        self.detach(node);
        self.insert_before(reference, node)
    }

    /// Detach `node` from wherever it is and put it right after `reference`
    pub fn move_after(&mut self, reference: NodeId, node: NodeId) -> EditResult {
        self.detach(node);
        self.insert_after(reference, node)
    }

    /// Unlink a node from its parent; the node stays alive in the arena
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes.get_mut(id).and_then(|n| n.parent.take()) {
            self.nodes[parent].children.retain(|&c| c != id);
        }
    }

    /// Unlink a node and drop it together with its subtree
    pub fn remove(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(node) = self.nodes.remove(n) {
                stack.extend(node.children);
            }
        }
    }

    /// Move every child of `from` into `to`, at the given end of its child list
    pub fn move_children(&mut self, from: NodeId, to: NodeId, side: Side) {
        let moved = std::mem::take(&mut self.nodes[from].children);
        for &c in &moved {
            self.nodes[c].parent = Some(to);
        }
        let target = &mut self.nodes[to].children;
        match side {
            Side::After => target.extend(moved),
            Side::Before => {
                target.splice(0..0, moved);
            }
        }
    }

    /// Replace a node with its children, in place
    pub fn unwrap_node(&mut self, id: NodeId) -> EditResult {
        let parent = self.parent(id).ok_or(EditError::DetachedNode)?;
        let index = self.index_in_parent(id).ok_or(EditError::DetachedNode)?;
        let moved = std::mem::take(&mut self.nodes[id].children);
        for &c in &moved {
            self.nodes[c].parent = Some(parent);
        }
        self.nodes[parent].children.splice(index..=index, moved);
        self.nodes.remove(id);
        Ok(())
    }

    /// Move the children of `id` from `at` onwards into a shallow clone inserted after it
    pub fn split_children(&mut self, id: NodeId, at: usize) -> EditResult<NodeId> {
        let clone = self.shallow_clone(id);
        let at = at.min(self.nodes[id].children.len());
        let tail = self.nodes[id].children.split_off(at);
        for &c in &tail {
            self.nodes[c].parent = Some(clone);
        }
        self.nodes[clone].children = tail;
        self.insert_after(id, clone)?;
        Ok(clone)
    }

    /// Split a text run at the given byte offset
    /// The left part stays in `id`; the right part becomes a new run right after it
    pub fn split_text(&mut self, id: NodeId, offset: usize) -> EditResult<NodeId> {
        let right = match &mut self.nodes.get_mut(id).ok_or(EditError::InvalidPosition)?.kind {
            NodeKind::Text(text) => {
                let offset = grapheme_floor(text, offset);
                text.split_off(offset)
            }
            _ => return Err(EditError::InvalidPosition),
        };
        let run = self.create(NodeKind::Text(right));
        self.insert_after(id, run)?;
        Ok(run)
    }

    /// Insert text into a run at the given byte offset, returning the offset after it
    pub fn insert_text(&mut self, id: NodeId, offset: usize, text: &str) -> EditResult<usize> {
        match &mut self.nodes.get_mut(id).ok_or(EditError::InvalidPosition)?.kind {
            NodeKind::Text(run) => {
                let offset = grapheme_floor(run, offset);
                run.insert_str(offset, text);
                Ok(offset + text.len())
            }
            _ => Err(EditError::InvalidPosition),
        }
    }

    /// Insert a detached node at a position, splitting a text run if needed
    pub fn insert_at(&mut self, position: Position, node: NodeId) -> EditResult {
        match position {
            Position::Text { node: run, offset } => {
                let len = self.text(run).ok_or(EditError::InvalidPosition)?.len();
                if offset == 0 {
                    self.insert_before(run, node)
                } else if offset >= len {
                    self.insert_after(run, node)
                } else {
                    self.split_text(run, offset)?;
                    self.insert_after(run, node)
                }
            }
            Position::Child { container, index } => {
                if !self.contains_node(container) {
                    return Err(EditError::InvalidPosition);
                }
                self.insert_child(container, index, node);
                Ok(())
            }
        }
    }

    // -- positions

    /// Validate and clamp a position to document bounds
    pub fn clamp_position(&self, pos: DocumentPosition) -> DocumentPosition {
        if self.is_empty() {
            return DocumentPosition::start();
        }

        let block_index = pos.block_index.min(self.block_count() - 1);
        let block = self.blocks()[block_index];
        let offset = pos.offset.min(self.text_len(block));

        DocumentPosition::new(block_index, offset)
    }

    /// Find the tree position for a host position
    /// Uses the first non-empty run whose range contains the offset, end inclusive
    pub fn locate(&self, pos: DocumentPosition) -> EditResult<Position> {
        let block = self.block(pos.block_index).ok_or(EditError::InvalidBlockIndex)?;
        let mut current_offset = 0;
        let mut last = None;

        for run in self.text_runs(block) {
            let len = self.text_len(run);
            if len == 0 {
                continue;
            }
            if current_offset + len >= pos.offset {
                let text = self.text(run).unwrap_or_default();
                let offset = grapheme_floor(text, pos.offset - current_offset);
                return Ok(Position::Text { node: run, offset });
            }
            current_offset += len;
            last = Some((run, len));
        }

        // Past the end - use the end of the last run
        match last {
            Some((node, offset)) => Ok(Position::Text { node, offset }),
            None => Ok(Position::Child {
                container: block,
                index: 0,
            }),
        }
    }

    /// Map a tree position back to host coordinates
    pub fn resolve(&self, position: Position) -> EditResult<DocumentPosition> {
        let (anchor, extra) = match position {
            Position::Text { node, offset } => {
                let len = self.text(node).ok_or(EditError::InvalidPosition)?.len();
                (node, offset.min(len))
            }
            Position::Child { container, index } => {
                if !self.contains_node(container) {
                    return Err(EditError::InvalidPosition);
                }
                match self.children(container).get(index) {
                    Some(&child) => (child, 0),
                    None => (container, self.text_len(container)),
                }
            }
        };
        let block = self.line_of(anchor).ok_or(EditError::Unclassifiable)?;
        let block_index = self.block_index(block).ok_or(EditError::DetachedNode)?;
        let base = self
            .text_offset_in(block, anchor)
            .ok_or(EditError::Unclassifiable)?;
        Ok(DocumentPosition::new(block_index, base + extra))
    }

    /// Host position of a node attached somewhere in the document
    pub fn position_of(&self, id: NodeId) -> EditResult<DocumentPosition> {
        let container = self.parent(id).ok_or(EditError::DetachedNode)?;
        let index = self.index_in_parent(id).ok_or(EditError::DetachedNode)?;
        self.resolve(Position::Child { container, index })
    }

    // -- normalization

    /// Merge adjacent text runs and same-format siblings, drop empty runs and formats
    ///
    /// The caret, when given, stays valid: merges remap it and its anchor run
    /// (with the formats around it) is never dropped.
    pub fn normalize(&mut self, mut caret: Option<&mut Position>) {
        for block in self.blocks().to_vec() {
            self.normalize_children(block, &mut caret);
        }
    }

    /// Normalize a single block
    pub fn normalize_block(&mut self, block: NodeId, mut caret: Option<&mut Position>) {
        self.normalize_children(block, &mut caret);
    }

    fn normalize_children(&mut self, parent: NodeId, caret: &mut Option<&mut Position>) {
        for child in self.children(parent).to_vec() {
            if !self.children(child).is_empty() {
                self.normalize_children(child, caret);
            }
        }

        let mut i = 0;
        while i < self.children(parent).len() {
            let id = self.children(parent)[i];
            let anchor = caret.as_deref().and_then(Position::text_node);
            let keep = anchor.is_some_and(|a| self.is_ancestor_or_self(id, a));

            let empty = match self.kind(id) {
                Some(NodeKind::Text(t)) => t.is_empty(),
                Some(NodeKind::Format(_)) => !self.has_text(id) && !self.contains_marker(id),
                _ => false,
            };
            if empty && !keep {
                self.remove(id);
                continue;
            }

            if i > 0 {
                let prev = self.children(parent)[i - 1];
                if self.is_text(prev) && self.is_text(id) {
                    self.merge_runs(prev, id, caret);
                    continue;
                }
                let same_format = match (self.format_of(prev), self.format_of(id)) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                };
                if same_format {
                    log::trace!("merging adjacent {:?} nodes", self.format_of(id));
                    self.move_children(id, prev, Side::After);
                    self.remove(id);
                    self.normalize_children(prev, caret);
                    continue;
                }
            }
            i += 1;
        }
    }

    fn merge_runs(&mut self, left: NodeId, right: NodeId, caret: &mut Option<&mut Position>) {
        let moved = match &mut self.nodes[right].kind {
            NodeKind::Text(t) => std::mem::take(t),
            _ => return,
        };
        let base = if let NodeKind::Text(t) = &mut self.nodes[left].kind {
            let base = t.len();
            t.push_str(&moved);
            base
        } else {
            return;
        };
        if let Some(pos) = caret.as_deref_mut()
            && let Position::Text { node, offset } = *pos
            && node == right
        {
            *pos = Position::Text {
                node: left,
                offset: base + offset,
            };
        }
        self.remove(right);
    }
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DocumentTree ({} blocks):", self.block_count())?;
        for (i, &block) in self.blocks().iter().enumerate() {
            write!(f, "  [{}] ", i)?;
            match self.block_type(block) {
                Some(BlockType::Heading { level }) => write!(f, "Heading(h{})", level)?,
                Some(other) => write!(f, "{:?}", other)?,
                None => write!(f, "?")?,
            }
            writeln!(f, ": {:?}", self.text_content(block))?;
        }
        Ok(())
    }
}

/// Largest grapheme boundary at or below `offset`
pub fn grapheme_floor(text: &str, offset: usize) -> usize {
    if offset >= text.len() {
        return text.len();
    }
    text.grapheme_indices(true)
        .map(|(i, _)| i)
        .take_while(|&i| i <= offset)
        .last()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bold_paragraph(tree: &mut DocumentTree, before: &str, bold: &str) -> (NodeId, NodeId) {
        let block = tree.push_block(BlockType::Paragraph);
        let plain = tree.create_text(before);
        tree.append_child(block, plain);
        let format = tree.create_format(Format::bold());
        tree.append_child(block, format);
        let inner = tree.create_text(bold);
        tree.append_child(format, inner);
        (block, format)
    }

    #[test]
    fn test_split_text() {
        let mut tree = DocumentTree::with_paragraph("hello world");
        let block = tree.block(0).unwrap();
        let run = tree.first_child(block).unwrap();
        let right = tree.split_text(run, 5).unwrap();

        assert_eq!(tree.text(run), Some("hello"));
        assert_eq!(tree.text(right), Some(" world"));
        assert_eq!(tree.next_sibling(run), Some(right));
        assert_eq!(tree.to_plain_text(), "hello world");
    }

    #[test]
    fn test_split_text_snaps_to_grapheme() {
        let mut tree = DocumentTree::with_paragraph("ae\u{301}z");
        let run = tree.first_child(tree.block(0).unwrap()).unwrap();
        // offset 2 falls between "e" and its combining accent
        let right = tree.split_text(run, 2).unwrap();
        assert_eq!(tree.text(run), Some("a"));
        assert_eq!(tree.text(right), Some("e\u{301}z"));
    }

    #[test]
    fn test_text_offsets() {
        let mut tree = DocumentTree::new();
        let (block, format) = bold_paragraph(&mut tree, "hello ", "world");
        let inner = tree.first_child(format).unwrap();

        assert_eq!(tree.text_len(block), 11);
        assert_eq!(tree.text_offset_in(block, format), Some(6));
        assert_eq!(tree.text_offset_in(block, inner), Some(6));
        assert_eq!(tree.text_after_in(block, format), Some(0));
        assert_eq!(tree.text_after_in(block, tree.first_child(block).unwrap()), Some(5));
        assert_eq!(tree.line_of(inner), Some(block));
        assert_eq!(tree.formats_above(inner), vec![Format::bold()]);
    }

    #[test]
    fn test_locate_prefers_run_ending_at_offset() {
        let mut tree = DocumentTree::new();
        let (block, format) = bold_paragraph(&mut tree, "hello ", "world");
        let plain = tree.first_child(block).unwrap();
        let inner = tree.first_child(format).unwrap();

        assert_eq!(
            tree.locate(DocumentPosition::new(0, 6)).unwrap(),
            Position::Text {
                node: plain,
                offset: 6
            }
        );
        assert_eq!(
            tree.locate(DocumentPosition::new(0, 8)).unwrap(),
            Position::Text {
                node: inner,
                offset: 2
            }
        );
        assert_eq!(
            tree.locate(DocumentPosition::new(3, 0)),
            Err(EditError::InvalidBlockIndex)
        );
    }

    #[test]
    fn test_resolve_round_trips_locate() {
        let mut tree = DocumentTree::new();
        bold_paragraph(&mut tree, "ab", "cd");
        bold_paragraph(&mut tree, "ef", "gh");
        for block_index in 0..2 {
            for offset in 0..=4 {
                let pos = DocumentPosition::new(block_index, offset);
                let located = tree.locate(pos).unwrap();
                assert_eq!(tree.resolve(located).unwrap(), pos);
            }
        }
    }

    #[test]
    fn test_empty_block_locates_to_child_position() {
        let mut tree = DocumentTree::new();
        let block = tree.push_block(BlockType::Paragraph);
        let pos = tree.locate(DocumentPosition::start()).unwrap();
        assert_eq!(
            pos,
            Position::Child {
                container: block,
                index: 0
            }
        );
        assert_eq!(tree.resolve(pos).unwrap(), DocumentPosition::start());
    }

    #[test]
    fn test_split_children_and_unwrap() {
        let mut tree = DocumentTree::new();
        let block = tree.push_block(BlockType::Paragraph);
        let format = tree.create_format(Format::italic());
        tree.append_child(block, format);
        for text in ["a", "b", "c"] {
            let run = tree.create_text(text);
            tree.append_child(format, run);
        }

        let clone = tree.split_children(format, 1).unwrap();
        assert_eq!(tree.children(block), &[format, clone]);
        assert_eq!(tree.text_content(format), "a");
        assert_eq!(tree.text_content(clone), "bc");
        assert!(tree.is_format(clone, &Format::italic()));

        tree.unwrap_node(clone).unwrap();
        assert_eq!(tree.children(block).len(), 3);
        assert_eq!(tree.text_content(block), "abc");
    }

    #[test]
    fn test_normalize_merges_and_prunes() {
        let mut tree = DocumentTree::new();
        let block = tree.push_block(BlockType::Paragraph);
        for (text, bold) in [("a", true), ("b", true), ("", false), ("c", false), ("d", false)] {
            let run = tree.create_text(text);
            if bold {
                let format = tree.create_format(Format::bold());
                tree.append_child(format, run);
                tree.append_child(block, format);
            } else {
                tree.append_child(block, run);
            }
        }
        let empty = tree.create_format(Format::italic());
        tree.append_child(block, empty);

        tree.normalize(None);

        let children = tree.children(block).to_vec();
        assert_eq!(children.len(), 2);
        assert_eq!(tree.text_content(children[0]), "ab");
        assert_eq!(tree.children(children[0]).len(), 1);
        assert_eq!(tree.text(children[1]), Some("cd"));
    }

    #[test]
    fn test_normalize_keeps_caret_anchor() {
        let mut tree = DocumentTree::new();
        let block = tree.push_block(BlockType::Paragraph);
        let run = tree.create_text("x");
        tree.append_child(block, run);
        let format = tree.create_format(Format::bold());
        tree.append_child(block, format);
        let anchor = tree.create_text("");
        tree.append_child(format, anchor);

        let mut caret = Position::Text {
            node: anchor,
            offset: 0,
        };
        tree.normalize(Some(&mut caret));
        assert_eq!(tree.children(block), &[run, format]);
        assert_eq!(caret.text_node(), Some(anchor));

        tree.normalize(None);
        assert_eq!(tree.children(block), &[run]);
    }

    #[test]
    fn test_normalize_remaps_caret_on_merge() {
        let mut tree = DocumentTree::new();
        let block = tree.push_block(BlockType::Paragraph);
        let left = tree.create_text("ab");
        let right = tree.create_text("cd");
        tree.append_child(block, left);
        tree.append_child(block, right);

        let mut caret = Position::Text {
            node: right,
            offset: 1,
        };
        tree.normalize(Some(&mut caret));
        assert_eq!(
            caret,
            Position::Text {
                node: left,
                offset: 3
            }
        );
        assert!(!tree.contains_node(right));
    }
}
