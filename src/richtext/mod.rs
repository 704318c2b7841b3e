// Rich text editing engine
// A block/inline document tree and the engines that toggle inline formats on it

pub mod caret;
pub mod document_tree;
pub mod error;
pub mod format;
pub mod format_toggle;
pub mod markdown_converter;
pub mod markers;
pub mod markup;
pub mod selection_descriptor;
pub mod structured_editor;
pub mod tree_walker;

pub use document_tree::{BlockType, DocumentPosition, DocumentTree, NodeId, Position, Selection};
pub use error::{EditError, EditResult};
pub use format::{Format, FormatRegistry};
pub use format_toggle::{ToggleAction, ToggleOutcome, ToggleRule};
pub use structured_editor::StructuredEditor;
