//! Hierarchy Flags Updater
//!
//! Consumes version-change notifications and turns them into dirty flags on
//! the affected region of the tree:
//!
//! - the changed node gets the flags from the fixed category→flag table,
//! - those flags propagate *down* to descendants, short-circuiting at any
//!   subtree that already has them (propagation cost is bounded by the
//!   affected region, never the whole tree),
//! - bounding-box flags propagate *up* toward the root, stopping at the
//!   first ancestor that already holds all of them,
//! - bounding-box triggers bump a monotonically increasing dirty version
//!   counter that gates an O(1) fast path in [`HierarchyFlagsUpdater::update`].
//!
//! Installed as the TransformClip phase of the pipeline: its per-tick
//! `update` recomputes world geometry, subtree event interests and the root
//! bounding box, then refreshes the element under each active pointer. For
//! editor panels an under-pointer change defers a style re-application so
//! hover state is correct on the first frame after a mutation.
//!
//! The world-space variant (3D panels) additionally tracks
//! `LOCAL_BOUNDS_3D`, reacts to a transform crossing the affine-2D
//! boundary, and skips the under-pointer pass (hit positions are not
//! meaningful in world space).

use std::collections::HashMap;

use log::debug;

use crate::geometry::Bounds3d;
use crate::tree::element::{ElementId, VisualTree};
use crate::tree::flags::{required_dirty_flags, DirtyFlags, VersionChange};
use crate::update::{UpdateContext, UpdatePhase};

// =============================================================================
// WORLD-SPACE SIDE TABLE
// =============================================================================

/// Sparse 3D-bounds store for elements inside a world-space context.
///
/// Keyed by stable control id so slot reuse cannot alias entries. Entries
/// are created lazily on first use and cleared (recursively) when an
/// element leaves the world-space context.
#[derive(Debug, Default)]
pub struct WorldBoundsStore {
    entries: HashMap<u64, Bounds3d>,
}

impl WorldBoundsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, control_id: u64) -> Option<&Bounds3d> {
        self.entries.get(&control_id)
    }

    pub fn get_or_create(&mut self, control_id: u64) -> &mut Bounds3d {
        self.entries.entry(control_id).or_default()
    }

    pub fn remove(&mut self, control_id: u64) {
        self.entries.remove(&control_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop the entries for `id` and every descendant.
    pub fn clear_subtree(&mut self, tree: &VisualTree, id: ElementId) {
        for el in tree.subtree(id) {
            if let Some(control_id) = tree.control_id(el) {
                self.entries.remove(&control_id);
            }
        }
    }
}

// =============================================================================
// UPDATER
// =============================================================================

/// See the module docs. One instance per panel.
pub struct HierarchyFlagsUpdater {
    /// Bumped on every processed bounding-box trigger.
    version: u64,
    /// Snapshot of `version` at the end of the last `update`.
    last_update_version: u64,
    world_space: bool,
    bounds_store: WorldBoundsStore,
    /// Nodes touched by downward propagation since the last reset.
    /// Observable so tests can prove propagation is bounded.
    propagation_visits: usize,
}

impl HierarchyFlagsUpdater {
    /// Updater for flat (player or editor) panels.
    pub fn new() -> Self {
        Self {
            version: 0,
            last_update_version: 0,
            world_space: false,
            bounds_store: WorldBoundsStore::new(),
            propagation_visits: 0,
        }
    }

    /// Variant for world-space (3D) panels.
    pub fn world_space() -> Self {
        Self { world_space: true, ..Self::new() }
    }

    /// Current value of the dirty version counter.
    pub fn dirty_version(&self) -> u64 {
        self.version
    }

    pub fn propagation_visits(&self) -> usize {
        self.propagation_visits
    }

    pub fn reset_propagation_visits(&mut self) {
        self.propagation_visits = 0;
    }

    pub fn bounds_store(&self) -> &WorldBoundsStore {
        &self.bounds_store
    }

    pub fn bounds_store_mut(&mut self) -> &mut WorldBoundsStore {
        &mut self.bounds_store
    }

    /// Called when an element is detached from a world-space context: its
    /// 3D bounds entries (including all descendants') are released.
    pub fn on_detached_from_world(&mut self, tree: &VisualTree, id: ElementId) {
        self.bounds_store.clear_subtree(tree, id);
    }

    fn upward_target(&self) -> DirtyFlags {
        if self.world_space {
            DirtyFlags::WORLD_BOUNDING_BOX | DirtyFlags::LOCAL_BOUNDS_3D
        } else {
            DirtyFlags::WORLD_BOUNDING_BOX
        }
    }

    /// Set `flags` on every node of the subtree below `id` whose flags do
    /// not already include them, pruning at already-dirty subtrees.
    fn propagate_down(&mut self, tree: &mut VisualTree, id: ElementId, flags: DirtyFlags) {
        let children = tree.children(id).to_vec();
        for child in children {
            let to_set = flags & !tree.flags(child);
            if to_set.is_empty() {
                // Everything below is already at least this dirty.
                continue;
            }
            self.propagation_visits += 1;
            tree.set_flags(child, to_set);
            self.propagate_down(tree, child, flags);
        }
    }

    /// Walk ancestors setting `target`, stopping at the first one that
    /// already holds all of it.
    fn propagate_up(&mut self, tree: &mut VisualTree, id: ElementId, target: DirtyFlags) {
        let mut cur = tree.parent(id);
        while let Some(ancestor) = cur {
            let missing = target & !tree.flags(ancestor);
            if missing.is_empty() {
                break;
            }
            self.propagation_visits += 1;
            tree.set_flags(ancestor, missing);
            cur = tree.parent(ancestor);
        }
    }
}

impl Default for HierarchyFlagsUpdater {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdatePhase for HierarchyFlagsUpdater {
    fn on_version_changed(
        &mut self,
        tree: &mut VisualTree,
        target: ElementId,
        change: VersionChange,
    ) {
        if !tree.contains(target) {
            debug!("version change {change:?} on dead element {target:?}");
            return;
        }

        let mut required = required_dirty_flags(change);
        let mut dimensionality_changed = false;
        if self.world_space {
            if change.intersects(VersionChange::TRANSFORM | VersionChange::SIZE) {
                required |= DirtyFlags::LOCAL_BOUNDS_3D;
            }
            if change.contains(VersionChange::TRANSFORM) {
                let is_3d = !tree.local_transform(target).is_affine_2d();
                if is_3d != tree.needs_3d_bounds(target) {
                    tree.set_needs_3d_bounds(target, is_3d);
                    dimensionality_changed = true;
                }
            }
        }

        // Only flags not already present need work; an already-set flag is
        // guaranteed to be set on the whole subtree below.
        let to_set = required & !tree.flags(target);
        if !to_set.is_empty() {
            tree.set_flags(target, to_set);
            self.propagate_down(tree, target, to_set);
        }

        if change.intersects(VersionChange::BOUNDS_TRIGGER) || dimensionality_changed {
            let target_flags = self.upward_target();
            tree.set_flags(target, target_flags & !tree.flags(target));
            self.propagate_up(tree, target, target_flags);
            self.version += 1;
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        // O(1) skip when nothing changed since the last tick.
        if self.version == self.last_update_version {
            return;
        }
        self.last_update_version = self.version;

        let root = ctx.tree.root();
        ctx.tree.update_world_geometry();
        ctx.tree.update_event_interest(root);
        ctx.tree.update_bounding_box(root);

        if self.world_space {
            // Hit positions are not meaningful for world-space panels;
            // refresh the 3D bounds entries for elements that need them
            // instead.
            for id in ctx.tree.subtree(root) {
                if ctx.tree.needs_3d_bounds(id) {
                    if let Some(control_id) = ctx.tree.control_id(id) {
                        let bounds = Bounds3d::from_rect(&ctx.tree.world_bounds(id));
                        *self.bounds_store.get_or_create(control_id) = bounds;
                    }
                }
                ctx.tree.clear_flags(id, DirtyFlags::LOCAL_BOUNDS_3D);
            }
            return;
        }

        // Recompute the element under each active pointer so hover state is
        // right on the first frame after a mutation.
        let active: Vec<_> = ctx.pointers.active().collect();
        for (pointer, position) in active {
            let hit = ctx.tree.pick(position);
            let previous = ctx.pointers.over(pointer);
            if hit != previous {
                ctx.pointers.set_over(pointer, hit);
                if ctx.panel_kind == crate::panel::PanelKind::Editor {
                    for el in [previous, hit].into_iter().flatten() {
                        ctx.defer(el, VersionChange::STYLE_SHEET);
                    }
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Point, Rect, Size, Transform};
    use crate::panel::{PanelKind, PointerOverState};
    use crate::tree::element::PickingMode;

    fn chain(depth: usize) -> (VisualTree, Vec<ElementId>) {
        let mut tree = VisualTree::new();
        let mut ids = vec![tree.root()];
        for _ in 0..depth {
            let id = tree.create_element();
            tree.add_child(*ids.last().unwrap(), id).unwrap();
            ids.push(id);
        }
        (tree, ids)
    }

    #[test]
    fn test_transform_change_end_to_end() {
        // E child of R, both clean. Transform on E: E gets world-transform
        // and bounding-box (and clip) dirty, R only bounding-box.
        let (mut tree, ids) = chain(1);
        let (root, e) = (ids[0], ids[1]);
        let mut updater = HierarchyFlagsUpdater::new();

        updater.on_version_changed(&mut tree, e, VersionChange::TRANSFORM);

        assert!(tree.flags(e).contains(DirtyFlags::WORLD_TRANSFORM));
        assert!(tree.flags(e).contains(DirtyFlags::WORLD_BOUNDING_BOX));
        assert!(tree.flags(root).contains(DirtyFlags::WORLD_BOUNDING_BOX));
        assert!(!tree.flags(root).contains(DirtyFlags::WORLD_TRANSFORM));
    }

    #[test]
    fn test_idempotent_propagation() {
        let (mut tree, ids) = chain(3);
        let mut updater = HierarchyFlagsUpdater::new();

        updater.on_version_changed(&mut tree, ids[1], VersionChange::TRANSFORM);
        let snapshot: Vec<_> = ids.iter().map(|&id| tree.flags(id)).collect();

        updater.on_version_changed(&mut tree, ids[1], VersionChange::TRANSFORM);
        let again: Vec<_> = ids.iter().map(|&id| tree.flags(id)).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn test_bounded_propagation_skips_dirty_subtrees() {
        // A subtree that is already fully dirty costs O(1) to re-notify.
        let (mut tree, ids) = chain(50);
        let mut updater = HierarchyFlagsUpdater::new();
        updater.on_version_changed(&mut tree, ids[1], VersionChange::TRANSFORM);

        updater.reset_propagation_visits();
        updater.on_version_changed(&mut tree, ids[1], VersionChange::TRANSFORM);
        assert_eq!(updater.propagation_visits(), 0);
    }

    #[test]
    fn test_downward_propagation_reaches_clean_descendants() {
        let (mut tree, ids) = chain(3);
        let mut updater = HierarchyFlagsUpdater::new();
        updater.on_version_changed(&mut tree, ids[1], VersionChange::TRANSFORM);
        for &id in &ids[1..] {
            assert!(tree.flags(id).contains(DirtyFlags::WORLD_TRANSFORM), "{id:?}");
        }
        assert!(!tree.flags(ids[0]).contains(DirtyFlags::WORLD_TRANSFORM));
    }

    #[test]
    fn test_upward_stop_condition() {
        // Pre-dirty a mid-tree ancestor: nodes above it stay untouched.
        let (mut tree, ids) = chain(6);
        let mut updater = HierarchyFlagsUpdater::new();
        tree.set_flags(ids[3], DirtyFlags::WORLD_BOUNDING_BOX);

        updater.on_version_changed(&mut tree, ids[6], VersionChange::SIZE);

        assert!(tree.flags(ids[5]).contains(DirtyFlags::WORLD_BOUNDING_BOX));
        assert!(tree.flags(ids[4]).contains(DirtyFlags::WORLD_BOUNDING_BOX));
        assert!(tree.flags(ids[3]).contains(DirtyFlags::WORLD_BOUNDING_BOX));
        assert_eq!(tree.flags(ids[2]), DirtyFlags::empty());
        assert_eq!(tree.flags(ids[1]), DirtyFlags::empty());
        assert_eq!(tree.flags(ids[0]), DirtyFlags::empty());
    }

    #[test]
    fn test_version_counter_gates_update() {
        let (mut tree, ids) = chain(1);
        let mut updater = HierarchyFlagsUpdater::new();
        let mut pointers = PointerOverState::new();

        assert_eq!(updater.dirty_version(), 0);
        updater.on_version_changed(&mut tree, ids[1], VersionChange::PICKING);
        assert_eq!(updater.dirty_version(), 1);

        let mut ctx =
            UpdateContext::new(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        updater.update(&mut ctx);
        // Flags consumed by the geometry pass.
        assert_eq!(tree.flags(ids[0]), DirtyFlags::empty());

        // A styles-only change does not bump the counter.
        updater.on_version_changed(&mut tree, ids[1], VersionChange::STYLES);
        assert_eq!(updater.dirty_version(), 1);
    }

    #[test]
    fn test_styles_change_sets_no_flags() {
        let (mut tree, ids) = chain(1);
        let mut updater = HierarchyFlagsUpdater::new();
        updater.on_version_changed(&mut tree, ids[1], VersionChange::STYLE_SHEET);
        assert_eq!(tree.flags(ids[1]), DirtyFlags::empty());
        assert_eq!(tree.flags(ids[0]), DirtyFlags::empty());
    }

    #[test]
    fn test_dead_element_notification_is_noop() {
        let (mut tree, ids) = chain(1);
        let mut updater = HierarchyFlagsUpdater::new();
        tree.remove(ids[1]).unwrap();
        updater.on_version_changed(&mut tree, ids[1], VersionChange::TRANSFORM);
        assert_eq!(tree.flags(ids[0]), DirtyFlags::empty());
        assert_eq!(updater.dirty_version(), 0);
    }

    #[test]
    fn test_under_pointer_recompute_defers_hover_restyle_for_editor() {
        let (mut tree, ids) = chain(1);
        let e = ids[1];
        tree.set_layout_rect(e, Rect::new(0.0, 0.0, 20.0, 20.0));
        tree.set_picking(tree.root(), PickingMode::Ignore);

        let mut updater = HierarchyFlagsUpdater::new();
        let mut pointers = PointerOverState::new();
        pointers.set_position(0, Point::new(5.0, 5.0));

        updater.on_version_changed(&mut tree, e, VersionChange::TRANSFORM);
        let mut ctx =
            UpdateContext::new(&mut tree, PanelKind::Editor, &mut pointers, Size::ZERO);
        updater.update(&mut ctx);

        assert_eq!(ctx.pointers.over(0), Some(e));
        // Hover change deferred a style re-application for the new target.
        assert!(ctx
            .take_deferred_for_test()
            .iter()
            .any(|&(id, change)| id == e && change == VersionChange::STYLE_SHEET));
    }

    #[test]
    fn test_player_panel_skips_hover_restyle() {
        let (mut tree, ids) = chain(1);
        let e = ids[1];
        tree.set_layout_rect(e, Rect::new(0.0, 0.0, 20.0, 20.0));
        tree.set_picking(tree.root(), PickingMode::Ignore);

        let mut updater = HierarchyFlagsUpdater::new();
        let mut pointers = PointerOverState::new();
        pointers.set_position(0, Point::new(5.0, 5.0));

        updater.on_version_changed(&mut tree, e, VersionChange::TRANSFORM);
        let mut ctx =
            UpdateContext::new(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        updater.update(&mut ctx);

        // Pointer tracking still refreshes, but no restyle is deferred.
        assert_eq!(ctx.pointers.over(0), Some(e));
        assert!(ctx.take_deferred_for_test().is_empty());
    }

    #[test]
    fn test_world_space_tracks_3d_transforms() {
        let (mut tree, ids) = chain(1);
        let e = ids[1];
        let mut updater = HierarchyFlagsUpdater::world_space();

        tree.set_local_transform(e, Transform::translation_3d(0.0, 0.0, 5.0));
        updater.on_version_changed(&mut tree, e, VersionChange::TRANSFORM);

        assert!(tree.needs_3d_bounds(e));
        assert!(tree.flags(e).contains(DirtyFlags::LOCAL_BOUNDS_3D));
        assert!(tree.flags(ids[0]).contains(DirtyFlags::LOCAL_BOUNDS_3D));

        // Going back to a flat transform is itself an upward trigger.
        tree.set_local_transform(e, Transform::IDENTITY);
        updater.on_version_changed(&mut tree, e, VersionChange::TRANSFORM);
        assert!(!tree.needs_3d_bounds(e));
    }

    #[test]
    fn test_world_space_update_skips_pointer_pass_and_fills_store() {
        let (mut tree, ids) = chain(1);
        let e = ids[1];
        tree.set_layout_rect(e, Rect::new(0.0, 0.0, 20.0, 20.0));
        let mut updater = HierarchyFlagsUpdater::world_space();
        let mut pointers = PointerOverState::new();
        pointers.set_position(0, Point::new(5.0, 5.0));

        tree.set_local_transform(e, Transform::translation_3d(0.0, 0.0, 2.0));
        updater.on_version_changed(&mut tree, e, VersionChange::TRANSFORM);

        let mut ctx =
            UpdateContext::new(&mut tree, PanelKind::WorldSpace, &mut pointers, Size::ZERO);
        updater.update(&mut ctx);

        // No under-pointer recompute in world space.
        assert_eq!(ctx.pointers.over(0), None);
        let control_id = ctx.tree.control_id(e).unwrap();
        assert!(updater.bounds_store().get(control_id).is_some());
    }

    #[test]
    fn test_world_bounds_store_clears_subtree_on_detach() {
        let (tree, ids) = chain(2);
        let mut updater = HierarchyFlagsUpdater::world_space();
        for &id in &ids[1..] {
            let control_id = tree.control_id(id).unwrap();
            updater.bounds_store_mut().get_or_create(control_id);
        }
        assert_eq!(updater.bounds_store().len(), 2);

        updater.on_detached_from_world(&tree, ids[1]);
        assert!(updater.bounds_store().is_empty());
    }
}
