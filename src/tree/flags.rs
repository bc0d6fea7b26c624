//! Dirty flags, version-change categories and the fixed mapping tables
//! between them.
//!
//! A `VersionChange` describes *what kind* of observable state changed in a
//! single mutation; `DirtyFlags` record *which cached derived values* are
//! now stale on a node. The mapping from one to the other is a fixed table
//! and must not be extended ad hoc - invalidation correctness depends on it.

use bitflags::bitflags;

bitflags! {
    /// Per-node pending invalidation categories.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u8 {
        /// Cached world transform is stale.
        const WORLD_TRANSFORM = 1 << 0;
        /// Cached world clip rect is stale.
        const WORLD_CLIP = 1 << 1;
        /// Cached world bounding box (self + descendants) is stale.
        const WORLD_BOUNDING_BOX = 1 << 2;
        /// Cached union of event-interest categories over the subtree is stale.
        const EVENT_PARENT_CATEGORIES = 1 << 3;
        /// Picking-related caches are stale.
        const PICKING = 1 << 4;
        /// World-space panels only: cached local 3D bounds are stale.
        const LOCAL_BOUNDS_3D = 1 << 5;
    }
}

bitflags! {
    /// Orthogonal change categories carried by one version-change
    /// notification. Several may be set on a single mutation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VersionChange: u16 {
        const TRANSFORM = 1 << 0;
        const SIZE = 1 << 1;
        const OVERFLOW = 1 << 2;
        const HIERARCHY = 1 << 3;
        const BORDER_WIDTH = 1 << 4;
        const EVENT_CALLBACK_CATEGORIES = 1 << 5;
        const PICKING = 1 << 6;
        const STYLE_SHEET = 1 << 7;
        const STYLES = 1 << 8;
        const LAYOUT = 1 << 9;
        const BINDINGS = 1 << 10;
        const DATA_BINDING = 1 << 11;
        const VIEW_DATA = 1 << 12;
        const REPAINT = 1 << 13;
    }
}

bitflags! {
    /// Event kinds an element (or subtree) is interested in. Used to skip
    /// dispatch work over subtrees with no relevant handlers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EventCategory: u8 {
        const POINTER = 1 << 0;
        const KEY = 1 << 1;
        const NAVIGATION = 1 << 2;
        const TEXT = 1 << 3;
        const IME = 1 << 4;
        const COMMAND = 1 << 5;
        const CAPTURE = 1 << 6;
    }
}

impl VersionChange {
    /// Categories that dirty the world clip rect.
    pub const CLIP_TRIGGER: Self = Self::TRANSFORM
        .union(Self::SIZE)
        .union(Self::OVERFLOW)
        .union(Self::BORDER_WIDTH);

    /// Categories that dirty the cached subtree event interests.
    pub const EVENT_INTEREST_TRIGGER: Self =
        Self::HIERARCHY.union(Self::EVENT_CALLBACK_CATEGORIES);

    /// Categories that dirty bounding boxes (self + ancestors) and bump the
    /// dirty version counter.
    pub const BOUNDS_TRIGGER: Self = Self::TRANSFORM
        .union(Self::SIZE)
        .union(Self::OVERFLOW)
        .union(Self::HIERARCHY)
        .union(Self::BORDER_WIDTH)
        .union(Self::EVENT_CALLBACK_CATEGORIES)
        .union(Self::PICKING);
}

/// The fixed category→flag table applied to the changed node itself.
///
/// Bounding-box dirtying is handled separately because it also walks
/// ancestors; see `HierarchyFlagsUpdater::on_version_changed`.
pub fn required_dirty_flags(change: VersionChange) -> DirtyFlags {
    let mut flags = DirtyFlags::empty();
    if change.contains(VersionChange::TRANSFORM) {
        flags |= DirtyFlags::WORLD_TRANSFORM | DirtyFlags::WORLD_BOUNDING_BOX;
    }
    if change.intersects(VersionChange::CLIP_TRIGGER) {
        flags |= DirtyFlags::WORLD_CLIP;
    }
    if change.intersects(VersionChange::EVENT_INTEREST_TRIGGER) {
        flags |= DirtyFlags::EVENT_PARENT_CATEGORIES;
    }
    if change.contains(VersionChange::PICKING) {
        flags |= DirtyFlags::PICKING;
    }
    flags
}
