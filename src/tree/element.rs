//! Element arena - the retained visual tree.
//!
//! Elements live in a slot vector with a free pool for O(1) index reuse
//! (same allocation scheme as a component registry). An [`ElementId`] is a
//! plain slot index; because slots are reused, anything that holds an id
//! across mutations keys its side data by the element's stable
//! `control_id` instead.
//!
//! The tree stores authored inputs (style, local transform, picking mode)
//! and cached derived geometry (world transform, world clip, layout rect,
//! world bounding box). Derived values are recomputed lazily, driven by the
//! per-node [`DirtyFlags`].
//!
//! Structural operations validate their arguments and reject bad ones with
//! an error before touching any state. Plain setters on an element that no
//! longer exists are defined no-ops with a debug diagnostic.

use log::debug;

use crate::error::Error;
use crate::geometry::{Point, Rect, Transform};
use crate::tree::flags::{DirtyFlags, EventCategory};

// =============================================================================
// IDS
// =============================================================================

/// Index of an element slot in its owning [`VisualTree`].
///
/// Non-owning: holding an id never keeps an element alive, and a stale id
/// is detected by [`VisualTree::contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(pub(crate) u32);

impl ElementId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// =============================================================================
// STYLE INPUTS
// =============================================================================

/// A layout dimension.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Dimension {
    #[default]
    Auto,
    /// Absolute length in panel units.
    Points(f32),
    /// Percentage of the parent (0..=100).
    Percent(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlexDirection {
    #[default]
    Column,
    Row,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    #[default]
    Visible,
    Hidden,
}

/// How an element participates in position-based hit testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PickingMode {
    /// Picked when the position falls inside the element's rect.
    #[default]
    Position,
    /// Never picked (children still are).
    Ignore,
}

/// Authored style inputs consumed by the style resolver and, once resolved,
/// by the layout engine. Deliberately a small flat struct: style cascade
/// semantics live behind the `StyleResolver` trait, not here.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StyleInput {
    pub width: Dimension,
    pub height: Dimension,
    pub flex_direction: FlexDirection,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub border_width: f32,
    pub overflow: Overflow,
}

// =============================================================================
// NODE
// =============================================================================

/// Effectively-unbounded clip rect used for unclipped elements.
pub(crate) const UNCLIPPED: Rect = Rect {
    x: f32::MIN / 2.0,
    y: f32::MIN / 2.0,
    width: f32::MAX,
    height: f32::MAX,
};

#[derive(Debug)]
struct Node {
    control_id: u64,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    flags: DirtyFlags,

    // Authored state
    style: StyleInput,
    local_transform: Transform,
    picking: PickingMode,
    categories: EventCategory,
    focusable: bool,
    tab_index: i32,
    visible: bool,

    // Derived state
    resolved_style: StyleInput,
    layout_rect: Rect,
    world_transform: Transform,
    world_clip: Rect,
    world_bounds: Rect,
    subtree_categories: EventCategory,
    needs_3d_bounds: bool,
}

impl Node {
    fn new(control_id: u64) -> Self {
        Self {
            control_id,
            parent: None,
            children: Vec::new(),
            flags: DirtyFlags::empty(),
            style: StyleInput::default(),
            local_transform: Transform::IDENTITY,
            picking: PickingMode::Position,
            categories: EventCategory::empty(),
            focusable: false,
            tab_index: 0,
            visible: true,
            resolved_style: StyleInput::default(),
            layout_rect: Rect::ZERO,
            world_transform: Transform::IDENTITY,
            world_clip: UNCLIPPED,
            world_bounds: Rect::ZERO,
            subtree_categories: EventCategory::empty(),
            needs_3d_bounds: false,
        }
    }
}

// =============================================================================
// TREE
// =============================================================================

/// A rooted, ordered, mutable element tree.
///
/// The root always exists and cannot be removed.
#[derive(Debug)]
pub struct VisualTree {
    nodes: Vec<Option<Node>>,
    free: Vec<u32>,
    root: ElementId,
    next_control_id: u64,
}

impl Default for VisualTree {
    fn default() -> Self {
        Self::new()
    }
}

impl VisualTree {
    pub fn new() -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: ElementId(0),
            next_control_id: 1,
        };
        let root = tree.allocate();
        tree.root = root;
        tree
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// Whether `id` names a live element.
    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes
            .get(id.index())
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Number of live elements, root included.
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the root always exists
    }

    fn allocate(&mut self) -> ElementId {
        let control_id = self.next_control_id;
        self.next_control_id += 1;
        match self.free.pop() {
            Some(index) => {
                self.nodes[index as usize] = Some(Node::new(control_id));
                ElementId(index)
            }
            None => {
                self.nodes.push(Some(Node::new(control_id)));
                ElementId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn node(&self, id: ElementId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: ElementId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    // =========================================================================
    // STRUCTURE
    // =========================================================================

    /// Create a new detached element. Attach it with [`VisualTree::add_child`].
    pub fn create_element(&mut self) -> ElementId {
        self.allocate()
    }

    /// Append `child` to `parent`'s child list. Re-parents if `child` is
    /// already attached elsewhere.
    pub fn add_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), Error> {
        let len = self.node(parent).ok_or(Error::UnknownElement(parent))?.children.len();
        self.insert_child(parent, len, child)
    }

    /// Insert `child` at `index` in `parent`'s child list.
    pub fn insert_child(
        &mut self,
        parent: ElementId,
        index: usize,
        child: ElementId,
    ) -> Result<(), Error> {
        if !self.contains(parent) {
            return Err(Error::UnknownElement(parent));
        }
        if !self.contains(child) {
            return Err(Error::UnknownElement(child));
        }
        if child == parent || self.is_ancestor_of(child, parent) {
            return Err(Error::WouldCreateCycle(child));
        }
        let len = self.node(parent).map(|n| n.children.len()).unwrap_or(0);
        if index > len {
            return Err(Error::IndexOutOfRange { index, len });
        }
        self.detach(child);
        // Recompute the insertion point: detaching from the same parent may
        // have shifted it.
        let len = self.node(parent).map(|n| n.children.len()).unwrap_or(0);
        let index = index.min(len);
        if let Some(node) = self.node_mut(parent) {
            node.children.insert(index, child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    /// Detach `child` from `parent` without destroying it.
    pub fn remove_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), Error> {
        if !self.contains(parent) {
            return Err(Error::UnknownElement(parent));
        }
        match self.node(child).and_then(|n| n.parent) {
            Some(p) if p == parent => {
                self.detach(child);
                Ok(())
            }
            _ => Err(Error::UnknownElement(child)),
        }
    }

    fn detach(&mut self, child: ElementId) {
        let parent = self.node(child).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(node) = self.node_mut(parent) {
                node.children.retain(|&c| c != child);
            }
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
    }

    /// Destroy an element and its whole subtree. The root is rejected.
    pub fn remove(&mut self, id: ElementId) -> Result<(), Error> {
        if id == self.root {
            return Err(Error::CannotRemoveRoot);
        }
        if !self.contains(id) {
            return Err(Error::UnknownElement(id));
        }
        self.detach(id);
        self.free_subtree(id);
        Ok(())
    }

    fn free_subtree(&mut self, id: ElementId) {
        let children = self.node(id).map(|n| n.children.clone()).unwrap_or_default();
        for child in children {
            self.free_subtree(child);
        }
        self.nodes[id.index()] = None;
        self.free.push(id.0);
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.node(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// True when `ancestor` is a strict ancestor of `id`.
    pub fn is_ancestor_of(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parent(p);
        }
        false
    }

    /// Ids of `id` and every descendant, depth first.
    pub fn subtree(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if !self.contains(cur) {
                continue;
            }
            out.push(cur);
            stack.extend(self.children(cur).iter().rev().copied());
        }
        out
    }

    /// All live element ids in slot order.
    pub fn live_elements(&self) -> Vec<ElementId> {
        (0..self.nodes.len() as u32)
            .map(ElementId)
            .filter(|&id| self.contains(id))
            .collect()
    }

    /// Stable identity key for side tables. Unique per allocation; a reused
    /// slot gets a fresh control id.
    pub fn control_id(&self, id: ElementId) -> Option<u64> {
        self.node(id).map(|n| n.control_id)
    }

    // =========================================================================
    // FLAGS
    // =========================================================================

    pub fn flags(&self, id: ElementId) -> DirtyFlags {
        self.node(id).map(|n| n.flags).unwrap_or_default()
    }

    pub(crate) fn set_flags(&mut self, id: ElementId, flags: DirtyFlags) {
        if let Some(node) = self.node_mut(id) {
            node.flags |= flags;
        }
    }

    pub(crate) fn clear_flags(&mut self, id: ElementId, flags: DirtyFlags) {
        if let Some(node) = self.node_mut(id) {
            node.flags &= !flags;
        }
    }

    // =========================================================================
    // AUTHORED STATE
    // =========================================================================

    // Setters are defined no-ops on dead ids: mutation of a detached element
    // must not corrupt anything, and the caller gets a diagnostic.

    pub fn style(&self, id: ElementId) -> StyleInput {
        self.node(id).map(|n| n.style).unwrap_or_default()
    }

    pub fn set_style(&mut self, id: ElementId, style: StyleInput) {
        match self.node_mut(id) {
            Some(node) => node.style = style,
            None => debug!("set_style on dead element {id:?}"),
        }
    }

    pub fn local_transform(&self, id: ElementId) -> Transform {
        self.node(id).map(|n| n.local_transform).unwrap_or(Transform::IDENTITY)
    }

    pub fn set_local_transform(&mut self, id: ElementId, transform: Transform) {
        match self.node_mut(id) {
            Some(node) => node.local_transform = transform,
            None => debug!("set_local_transform on dead element {id:?}"),
        }
    }

    pub fn picking(&self, id: ElementId) -> PickingMode {
        self.node(id).map(|n| n.picking).unwrap_or_default()
    }

    pub fn set_picking(&mut self, id: ElementId, picking: PickingMode) {
        match self.node_mut(id) {
            Some(node) => node.picking = picking,
            None => debug!("set_picking on dead element {id:?}"),
        }
    }

    pub fn event_categories(&self, id: ElementId) -> EventCategory {
        self.node(id).map(|n| n.categories).unwrap_or_default()
    }

    pub fn set_event_categories(&mut self, id: ElementId, categories: EventCategory) {
        match self.node_mut(id) {
            Some(node) => node.categories = categories,
            None => debug!("set_event_categories on dead element {id:?}"),
        }
    }

    pub fn is_focusable(&self, id: ElementId) -> bool {
        self.node(id).map(|n| n.focusable).unwrap_or(false)
    }

    pub fn set_focusable(&mut self, id: ElementId, focusable: bool) {
        match self.node_mut(id) {
            Some(node) => node.focusable = focusable,
            None => debug!("set_focusable on dead element {id:?}"),
        }
    }

    pub fn tab_index(&self, id: ElementId) -> i32 {
        self.node(id).map(|n| n.tab_index).unwrap_or(0)
    }

    pub fn set_tab_index(&mut self, id: ElementId, tab_index: i32) {
        match self.node_mut(id) {
            Some(node) => node.tab_index = tab_index,
            None => debug!("set_tab_index on dead element {id:?}"),
        }
    }

    pub fn is_visible(&self, id: ElementId) -> bool {
        self.node(id).map(|n| n.visible).unwrap_or(false)
    }

    pub fn set_visible(&mut self, id: ElementId, visible: bool) {
        match self.node_mut(id) {
            Some(node) => node.visible = visible,
            None => debug!("set_visible on dead element {id:?}"),
        }
    }

    // =========================================================================
    // DERIVED STATE
    // =========================================================================

    pub fn resolved_style(&self, id: ElementId) -> StyleInput {
        self.node(id).map(|n| n.resolved_style).unwrap_or_default()
    }

    pub fn set_resolved_style(&mut self, id: ElementId, style: StyleInput) {
        if let Some(node) = self.node_mut(id) {
            node.resolved_style = style;
        }
    }

    /// Layout rect relative to the parent, as produced by the layout engine.
    pub fn layout_rect(&self, id: ElementId) -> Rect {
        self.node(id).map(|n| n.layout_rect).unwrap_or(Rect::ZERO)
    }

    pub fn set_layout_rect(&mut self, id: ElementId, rect: Rect) {
        if let Some(node) = self.node_mut(id) {
            node.layout_rect = rect;
        }
    }

    pub fn world_transform(&self, id: ElementId) -> Transform {
        self.node(id).map(|n| n.world_transform).unwrap_or(Transform::IDENTITY)
    }

    pub fn world_clip(&self, id: ElementId) -> Rect {
        self.node(id).map(|n| n.world_clip).unwrap_or(UNCLIPPED)
    }

    /// Cached world-space bounding box of the element and its descendants.
    pub fn world_bounds(&self, id: ElementId) -> Rect {
        self.node(id).map(|n| n.world_bounds).unwrap_or(Rect::ZERO)
    }

    /// Union of event interests over the subtree, as of the last recompute.
    pub fn subtree_categories(&self, id: ElementId) -> EventCategory {
        self.node(id).map(|n| n.subtree_categories).unwrap_or_default()
    }

    pub fn needs_3d_bounds(&self, id: ElementId) -> bool {
        self.node(id).map(|n| n.needs_3d_bounds).unwrap_or(false)
    }

    pub(crate) fn set_needs_3d_bounds(&mut self, id: ElementId, needs: bool) {
        if let Some(node) = self.node_mut(id) {
            node.needs_3d_bounds = needs;
        }
    }

    /// The element's own rect in world space.
    pub fn world_rect(&self, id: ElementId) -> Rect {
        let rect = self.layout_rect(id);
        self.world_transform(id)
            .transform_rect(&Rect::new(0.0, 0.0, rect.width, rect.height))
    }

    // =========================================================================
    // GEOMETRY RECOMPUTE
    // =========================================================================

    /// Recompute world transforms and world clips top-down, clearing
    /// `WORLD_TRANSFORM` and `WORLD_CLIP` as nodes are visited.
    pub fn update_world_geometry(&mut self) {
        self.update_world_geometry_from(self.root, Transform::IDENTITY, UNCLIPPED);
    }

    fn update_world_geometry_from(
        &mut self,
        id: ElementId,
        parent_world: Transform,
        parent_clip: Rect,
    ) {
        let Some(node) = self.node(id) else { return };
        let dirty = node
            .flags
            .intersects(DirtyFlags::WORLD_TRANSFORM | DirtyFlags::WORLD_CLIP);
        let (world, clip) = if dirty {
            let rect = node.layout_rect;
            let local = node.local_transform;
            let world = parent_world
                .multiply(&Transform::translation(rect.x, rect.y))
                .multiply(&local);
            let clip = match node.style.overflow {
                Overflow::Hidden => {
                    let inner = Rect::new(0.0, 0.0, rect.width, rect.height)
                        .inset(node.resolved_style.border_width);
                    parent_clip.intersect(&world.transform_rect(&inner))
                }
                Overflow::Visible => parent_clip,
            };
            if let Some(node) = self.node_mut(id) {
                node.world_transform = world;
                node.world_clip = clip;
                node.flags &= !(DirtyFlags::WORLD_TRANSFORM | DirtyFlags::WORLD_CLIP);
            }
            (world, clip)
        } else {
            (node.world_transform, node.world_clip)
        };
        let children = self.children(id).to_vec();
        for child in children {
            self.update_world_geometry_from(child, world, clip);
        }
    }

    /// Recompute the bounding box of `id`, recursing only into subtrees
    /// whose box is dirty. Returns the (now clean) cached value.
    pub fn update_bounding_box(&mut self, id: ElementId) -> Rect {
        let Some(node) = self.node(id) else { return Rect::ZERO };
        if !node.flags.contains(DirtyFlags::WORLD_BOUNDING_BOX) {
            return node.world_bounds;
        }
        let mut bounds = self.world_rect(id);
        let children = self.children(id).to_vec();
        for child in children {
            bounds = bounds.union(&self.update_bounding_box(child));
        }
        if let Some(node) = self.node_mut(id) {
            node.world_bounds = bounds;
            node.flags &= !DirtyFlags::WORLD_BOUNDING_BOX;
        }
        bounds
    }

    /// Recompute cached subtree event interests where dirty.
    pub fn update_event_interest(&mut self, id: ElementId) -> EventCategory {
        let Some(node) = self.node(id) else {
            return EventCategory::empty();
        };
        if !node.flags.contains(DirtyFlags::EVENT_PARENT_CATEGORIES) {
            return node.subtree_categories;
        }
        let mut categories = node.categories;
        let children = self.children(id).to_vec();
        for child in children {
            categories |= self.update_event_interest(child);
        }
        if let Some(node) = self.node_mut(id) {
            node.subtree_categories = categories;
            node.flags &= !DirtyFlags::EVENT_PARENT_CATEGORIES;
        }
        categories
    }

    // =========================================================================
    // HIT TESTING
    // =========================================================================

    /// Topmost pickable element at a panel-local position, or None.
    ///
    /// Later siblings sit on top of earlier ones and descendants on top of
    /// ancestors. Uses the world geometry from the last recompute.
    pub fn pick(&self, position: Point) -> Option<ElementId> {
        self.pick_from(self.root, position)
    }

    fn pick_from(&self, id: ElementId, position: Point) -> Option<ElementId> {
        let node = self.node(id)?;
        if !node.visible {
            return None;
        }
        for &child in node.children.iter().rev() {
            if let Some(hit) = self.pick_from(child, position) {
                return Some(hit);
            }
        }
        if node.picking == PickingMode::Position && self.world_rect(id).contains(position) {
            Some(id)
        } else {
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
