//! Crate error type.
//!
//! Invalid arguments (unknown ids, out-of-range indices, cycle-creating
//! reparenting) are rejected up front with one of these variants; the
//! operation is never partially applied. Lifecycle misuse on already
//! detached elements is not an error - those paths no-op with a debug
//! diagnostic instead.

use thiserror::Error;

use crate::panel::PanelId;
use crate::tree::ElementId;

/// Errors returned by structural tree and panel operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The element id does not name a live element in this tree.
    #[error("unknown element id {0:?}")]
    UnknownElement(ElementId),

    /// The reparenting operation would make an element its own ancestor.
    #[error("attaching {0:?} would create a cycle")]
    WouldCreateCycle(ElementId),

    /// Child insertion index past the end of the child list.
    #[error("child index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// The root element cannot be detached or removed.
    #[error("the root element cannot be removed")]
    CannotRemoveRoot,

    /// The panel id does not name a live panel in this context.
    #[error("unknown panel id {0:?}")]
    UnknownPanel(PanelId),
}
