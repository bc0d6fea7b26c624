//! The visual tree: element storage, dirty flags and the hierarchy
//! flags updater that connects mutations to invalidation.

pub mod element;
pub mod flags;
pub mod hierarchy;

pub use element::{
    Dimension, ElementId, FlexDirection, Overflow, PickingMode, StyleInput, VisualTree,
};
pub use flags::{required_dirty_flags, DirtyFlags, EventCategory, VersionChange};
pub use hierarchy::{HierarchyFlagsUpdater, WorldBoundsStore};
