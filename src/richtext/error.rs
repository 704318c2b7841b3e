// Edit Errors
// Failures surfaced by the tree surface and the formatting engines

use thiserror::Error;

/// Result of an editing operation
pub type EditResult<T = ()> = Result<T, EditError>;

/// Errors that can occur during editing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("position does not exist in the document")]
    InvalidPosition,
    #[error("block index is out of range")]
    InvalidBlockIndex,
    #[error("document has no blocks")]
    EmptyDocument,
    #[error("no format registered for key `{0}`")]
    UnknownFormat(String),
    #[error("`{0}` is not a valid format tag")]
    InvalidFormat(String),
    #[error("operation needs a collapsed caret, not an expanded selection")]
    CaretRequired,
    #[error("caret is not inside a `{0}` node")]
    NotInsideFormat(String),
    #[error("node has no path to a block boundary")]
    Unclassifiable,
    #[error("walking forward from the start line never reached the end line")]
    UnreachableLine,
    #[error("node is not attached to the document")]
    DetachedNode,
    #[error("markup: {0}")]
    Markup(String),
}
