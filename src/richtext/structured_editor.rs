// Structured Editor
// Host facade: owns the document tree and the active selection, and runs
// every toggle as one all-or-nothing request

use super::caret::{self, CaretOutcome};
use super::document_tree::{BlockType, DocumentPosition, DocumentTree, Position, Selection};
use super::error::{EditError, EditResult};
use super::format::{Format, FormatRegistry};
use super::format_toggle::{self, EngineContext, ToggleOutcome, ToggleRule};
use super::markers::{self, Caret, Sliced};
use super::markup;
use super::selection_descriptor::classify;
use crate::config::Config;

type CaretOperation = fn(&mut DocumentTree, Caret, &Format) -> EditResult<CaretOutcome>;

/// The structured editor with selection state
pub struct StructuredEditor {
    tree: DocumentTree,
    formats: FormatRegistry,
    rule: ToggleRule,
    selection: Selection,
}

impl StructuredEditor {
    /// Create a new editor with an empty document
    pub fn new() -> Self {
        Self::with_tree(DocumentTree::new())
    }

    /// Create an editor with an existing document
    /// The caret starts at the beginning of the first block
    pub fn with_tree(mut tree: DocumentTree) -> Self {
        if tree.is_empty() {
            tree.push_block(BlockType::Paragraph);
        }
        tree.normalize(None);
        let selection = Selection::caret(start_of(&tree));
        StructuredEditor {
            tree,
            formats: FormatRegistry::default(),
            rule: ToggleRule::default(),
            selection,
        }
    }

    /// Create an editor using the format table and toggle rule from `config`
    pub fn with_config(tree: DocumentTree, config: &Config) -> EditResult<Self> {
        let mut editor = Self::with_tree(tree);
        editor.formats = FormatRegistry::with_overrides(&config.formats)?;
        editor.rule = config.toggle_rule;
        Ok(editor)
    }

    /// Get the document
    pub fn tree(&self) -> &DocumentTree {
        &self.tree
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn rule(&self) -> ToggleRule {
        self.rule
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Get the selection in host coordinates, start first
    pub fn selection_range(&self) -> EditResult<(DocumentPosition, DocumentPosition)> {
        let start = self.tree.resolve(self.selection.start)?;
        let end = self.tree.resolve(self.selection.end)?;
        Ok((start.min(end), start.max(end)))
    }

    /// Get cursor position (the end of the selection)
    pub fn cursor(&self) -> EditResult<DocumentPosition> {
        self.tree.resolve(self.selection.end)
    }

    /// Set cursor position (will be clamped to valid range)
    pub fn set_cursor(&mut self, pos: DocumentPosition) -> EditResult {
        self.set_selection(pos, pos)
    }

    /// Set selection range (clamped and ordered)
    pub fn set_selection(&mut self, start: DocumentPosition, end: DocumentPosition) -> EditResult {
        self.tree.normalize(None);
        let start = self.tree.clamp_position(start);
        let end = self.tree.clamp_position(end);
        let (start, end) = (start.min(end), start.max(end));

        let start_pos = self.tree.locate(start)?;
        self.selection = if start == end {
            Selection::caret(start_pos)
        } else {
            Selection::new(start_pos, self.tree.locate(end)?)
        };
        Ok(())
    }

    /// Select all content in the document
    pub fn select_all(&mut self) -> EditResult {
        let last = self.tree.block_count().checked_sub(1).ok_or(EditError::EmptyDocument)?;
        let len = self.tree.block(last).map_or(0, |b| self.tree.text_len(b));
        self.set_selection(DocumentPosition::start(), DocumentPosition::new(last, len))
    }

    /// Toggle the format registered under `key`
    pub fn toggle(&mut self, key: &str) -> EditResult<ToggleOutcome> {
        let format = self.formats.resolve(key)?.clone();
        self.toggle_format(&format)
    }

    /// Toggle bold style on the current selection
    pub fn toggle_bold(&mut self) -> EditResult<ToggleOutcome> {
        self.toggle_format(&Format::bold())
    }

    /// Toggle italic style on the current selection
    pub fn toggle_italic(&mut self) -> EditResult<ToggleOutcome> {
        self.toggle_format(&Format::italic())
    }

    /// Toggle `format` on the selection, or at the caret when it is collapsed
    pub fn toggle_format(&mut self, format: &Format) -> EditResult<ToggleOutcome> {
        self.transact(|editor| match markers::slice(&mut editor.tree, editor.selection)? {
            Sliced::Caret(caret) => {
                let outcome = caret::toggle_caret(&mut editor.tree, caret, format)?;
                Ok(editor.settle(outcome))
            }
            Sliced::Range(slice) => {
                let descriptor = classify(&editor.tree, &slice, format)?;
                let mut ctx = EngineContext {
                    tree: &mut editor.tree,
                    format,
                    descriptor: &descriptor,
                    slice,
                    rule: editor.rule,
                };
                let outcome = format_toggle::toggle_range(&mut ctx)?;

                let (start, end) = markers::release(&mut editor.tree, slice)?;
                editor.tree.normalize(None);
                editor.selection = Selection::new(editor.tree.locate(start)?, editor.tree.locate(end)?);
                Ok(outcome)
            }
        })
    }

    /// Split the `key` format at the caret
    pub fn split(&mut self, key: &str) -> EditResult<ToggleOutcome> {
        self.caret_operation(key, caret::split)
    }

    /// Leave the `key` format through its left edge
    pub fn exit_left(&mut self, key: &str) -> EditResult<ToggleOutcome> {
        self.caret_operation(key, caret::exit_left)
    }

    /// Leave the `key` format through its right edge
    pub fn exit_right(&mut self, key: &str) -> EditResult<ToggleOutcome> {
        self.caret_operation(key, caret::exit_right)
    }

    fn caret_operation(&mut self, key: &str, operation: CaretOperation) -> EditResult<ToggleOutcome> {
        let format = self.formats.resolve(key)?.clone();
        if !self.selection.is_collapsed() {
            return Err(EditError::CaretRequired);
        }
        self.transact(|editor| {
            let caret = markers::place_caret(&mut editor.tree, editor.selection.start)?;
            let outcome = operation(&mut editor.tree, caret, &format)?;
            Ok(editor.settle(outcome))
        })
    }

    /// Insert text at the caret
    ///
    /// Runs without a document snapshot: the only failure is a stale caret,
    /// which is detected before anything changes.
    pub fn insert_text(&mut self, text: &str) -> EditResult {
        if !self.selection.is_collapsed() {
            return Err(EditError::CaretRequired);
        }
        if text.is_empty() {
            return Ok(());
        }
        let mut caret = match self.selection.start {
            Position::Text { node, offset } => {
                let offset = self.tree.insert_text(node, offset, text)?;
                Position::Text { node, offset }
            }
            Position::Child { container, index } => {
                if !self.tree.contains_node(container) {
                    return Err(EditError::InvalidPosition);
                }
                let run = self.tree.create_text(text);
                self.tree.insert_child(container, index, run);
                Position::Text {
                    node: run,
                    offset: text.len(),
                }
            }
        };
        self.tree.normalize(Some(&mut caret));
        self.selection = Selection::caret(caret);
        Ok(())
    }

    /// Convert to plain text
    pub fn to_plain_text(&self) -> String {
        self.tree.to_plain_text()
    }

    /// Render the document with the active selection marked
    pub fn to_markup(&self) -> String {
        markup::to_markup_with_selection(&self.tree, self.selection)
    }

    /// Put the caret on the anchor a caret operation returned
    fn settle(&mut self, outcome: CaretOutcome) -> ToggleOutcome {
        let mut caret = outcome.caret;
        self.tree.normalize(Some(&mut caret));
        self.selection = Selection::caret(caret);
        ToggleOutcome {
            action: outcome.action,
            fragments: 1,
        }
    }

    /// Run `operation`, restoring the document and selection if it fails
    fn transact<T>(&mut self, operation: impl FnOnce(&mut Self) -> EditResult<T>) -> EditResult<T> {
        let tree = self.tree.clone();
        let selection = self.selection;
        let result = operation(self);
        if let Err(err) = &result {
            log::debug!("edit failed, restoring document: {}", err);
            self.tree = tree;
            self.selection = selection;
        }
        result
    }
}

impl Default for StructuredEditor {
    fn default() -> Self {
        Self::new()
    }
}

fn start_of(tree: &DocumentTree) -> Position {
    tree.locate(DocumentPosition::start())
        .unwrap_or(Position::Child {
            container: tree.root(),
            index: 0,
        })
}
