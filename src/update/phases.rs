//! The concrete pipeline phases.
//!
//! Each phase owns its own dirty bookkeeping, marked from
//! `on_version_changed` and consumed (and cleared) by `update`. Phases that
//! delegate real work (view data, bindings, style resolution, layout,
//! repaint) do it through a trait object so hosts can install their own
//! backends; the defaults here are the in-crate ones.
//!
//! [`default_phases`] assembles the standard array, with the
//! [`HierarchyFlagsUpdater`] installed as the TransformClip phase.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use log::trace;

use crate::geometry::{Rect, Size};
use crate::panel::PanelKind;
use crate::tree::{
    ElementId, HierarchyFlagsUpdater, StyleInput, VersionChange, VisualTree,
};
use crate::update::{PhaseId, UpdateContext, UpdatePhase};

// =============================================================================
// DIRTY SET
// =============================================================================

/// Per-phase set of elements with pending work. Drained in stable id order
/// so phase output is deterministic.
#[derive(Debug, Default)]
struct DirtySet {
    elements: HashSet<ElementId>,
}

impl DirtySet {
    fn mark(&mut self, id: ElementId) {
        self.elements.insert(id);
    }

    fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn take(&mut self) -> Vec<ElementId> {
        let mut out: Vec<_> = self.elements.drain().collect();
        out.sort_by_key(|id| id.index());
        out
    }
}

// =============================================================================
// VIEW DATA
// =============================================================================

/// Backend for the view-data phase: re-applies serialized element state
/// (templates, persisted values) to elements whose source changed.
pub trait ViewDataStore {
    fn apply(&mut self, tree: &mut VisualTree, target: ElementId);
}

/// Default store: nothing is backed by serialized data.
pub struct NullViewDataStore;

impl ViewDataStore for NullViewDataStore {
    fn apply(&mut self, _: &mut VisualTree, _: ElementId) {}
}

pub struct ViewDataPhase {
    store: Box<dyn ViewDataStore>,
    dirty: DirtySet,
}

impl ViewDataPhase {
    pub fn new(store: Box<dyn ViewDataStore>) -> Self {
        Self { store, dirty: DirtySet::default() }
    }
}

impl UpdatePhase for ViewDataPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, target: ElementId, change: VersionChange) {
        if change.contains(VersionChange::VIEW_DATA) {
            self.dirty.mark(target);
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        for id in self.dirty.take() {
            if ctx.tree.contains(id) {
                self.store.apply(ctx.tree, id);
            }
        }
    }
}

// =============================================================================
// BINDINGS
// =============================================================================

/// Backend shared by the two binding phases. The early phase updates
/// structural bindings (which may create elements); the data-binding phase
/// pushes bound values into resolved element state.
pub trait BindingSystem {
    fn update(&mut self, tree: &mut VisualTree, dirty: &[ElementId]);
}

pub struct NullBindingSystem;

impl BindingSystem for NullBindingSystem {
    fn update(&mut self, _: &mut VisualTree, _: &[ElementId]) {}
}

pub struct BindingsPhase {
    system: Box<dyn BindingSystem>,
    dirty: DirtySet,
    watched: VersionChange,
}

impl BindingsPhase {
    pub fn structural(system: Box<dyn BindingSystem>) -> Self {
        Self { system, dirty: DirtySet::default(), watched: VersionChange::BINDINGS }
    }

    pub fn data(system: Box<dyn BindingSystem>) -> Self {
        Self { system, dirty: DirtySet::default(), watched: VersionChange::DATA_BINDING }
    }
}

impl UpdatePhase for BindingsPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, target: ElementId, change: VersionChange) {
        if change.intersects(self.watched) {
            self.dirty.mark(target);
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty: Vec<_> = self
            .dirty
            .take()
            .into_iter()
            .filter(|&id| ctx.tree.contains(id))
            .collect();
        self.system.update(ctx.tree, &dirty);
    }
}

// =============================================================================
// ANIMATION
// =============================================================================

/// An active animation: called once per tick with the tick number, returns
/// `false` when finished.
pub type Animation = Box<dyn FnMut(&mut VisualTree, u64) -> bool>;

/// Drives registered animations. Has no notification-driven dirty state;
/// animations run every tick until they report completion.
#[derive(Default)]
pub struct AnimationPhase {
    animations: Vec<Animation>,
    tick: u64,
}

impl AnimationPhase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_animation(&mut self, animation: Animation) {
        self.animations.push(animation);
    }

    pub fn active_count(&self) -> usize {
        self.animations.len()
    }
}

impl UpdatePhase for AnimationPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, _: VersionChange) {}

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        self.tick += 1;
        let tick = self.tick;
        self.animations.retain_mut(|animation| animation(ctx.tree, tick));
    }
}

// =============================================================================
// STYLES
// =============================================================================

/// Computes an element's resolved style from its authored inputs (and, in
/// richer hosts, matching style sheets).
pub trait StyleResolver {
    fn resolve(&mut self, tree: &VisualTree, id: ElementId) -> StyleInput;
}

/// Default resolver: authored style is the resolved style.
pub struct DirectStyleResolver;

impl StyleResolver for DirectStyleResolver {
    fn resolve(&mut self, tree: &VisualTree, id: ElementId) -> StyleInput {
        tree.style(id)
    }
}

pub struct StylesPhase {
    resolver: Box<dyn StyleResolver>,
    dirty: DirtySet,
}

impl StylesPhase {
    pub fn new(resolver: Box<dyn StyleResolver>) -> Self {
        Self { resolver, dirty: DirtySet::default() }
    }
}

impl UpdatePhase for StylesPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, target: ElementId, change: VersionChange) {
        if change.intersects(VersionChange::STYLE_SHEET | VersionChange::STYLES) {
            self.dirty.mark(target);
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        for id in self.dirty.take() {
            if !ctx.tree.contains(id) {
                continue;
            }
            let resolved = self.resolver.resolve(ctx.tree, id);
            if resolved != ctx.tree.resolved_style(id) {
                ctx.tree.set_resolved_style(id, resolved);
                // Resolved style feeds layout inputs.
                ctx.defer(id, VersionChange::LAYOUT);
            }
        }
    }
}

// =============================================================================
// LAYOUT
// =============================================================================

/// Computes parent-relative layout rects for every live element from the
/// resolved styles.
pub trait LayoutEngine {
    fn compute_layout(&mut self, tree: &VisualTree, viewport: Size) -> Vec<(ElementId, Rect)>;
}

pub struct LayoutPhase {
    engine: Box<dyn LayoutEngine>,
    needs_layout: bool,
}

impl LayoutPhase {
    pub fn new(engine: Box<dyn LayoutEngine>) -> Self {
        Self { engine, needs_layout: true }
    }
}

impl UpdatePhase for LayoutPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, change: VersionChange) {
        // SIZE and TRANSFORM are what layout itself emits; reacting to them
        // would keep the phase dirty forever.
        if change.intersects(VersionChange::LAYOUT | VersionChange::HIERARCHY) {
            self.needs_layout = true;
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if !self.needs_layout {
            return;
        }
        self.needs_layout = false;
        let results = self.engine.compute_layout(ctx.tree, ctx.viewport);
        trace!("layout pass over {} elements", results.len());
        for (id, rect) in results {
            let old = ctx.tree.layout_rect(id);
            if old == rect {
                continue;
            }
            ctx.tree.set_layout_rect(id, rect);
            if old.size() != rect.size() {
                ctx.defer(id, VersionChange::SIZE);
            }
            if old.origin() != rect.origin() {
                ctx.defer(id, VersionChange::TRANSFORM);
            }
        }
    }
}

// =============================================================================
// REPAINT
// =============================================================================

/// Consumes the set of visually-changed elements once per tick.
pub trait Renderer {
    /// `region` is the union of the dirty elements' world bounds; `dirty`
    /// lists the live elements in stable id order.
    fn repaint(&mut self, tree: &VisualTree, region: Rect, dirty: &[ElementId]);
}

pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn repaint(&mut self, _: &VisualTree, _: Rect, _: &[ElementId]) {}
}

/// Records repainted regions; for tests and headless hosts.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub frames: Rc<RefCell<Vec<Rect>>>,
}

impl Renderer for RecordingRenderer {
    fn repaint(&mut self, _: &VisualTree, region: Rect, _: &[ElementId]) {
        self.frames.borrow_mut().push(region);
    }
}

pub struct RepaintPhase {
    renderer: Box<dyn Renderer>,
    dirty: DirtySet,
}

impl RepaintPhase {
    const TRIGGER: VersionChange = VersionChange::REPAINT
        .union(VersionChange::SIZE)
        .union(VersionChange::TRANSFORM)
        .union(VersionChange::STYLES)
        .union(VersionChange::STYLE_SHEET)
        .union(VersionChange::HIERARCHY)
        .union(VersionChange::OVERFLOW)
        .union(VersionChange::BORDER_WIDTH);

    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self { renderer, dirty: DirtySet::default() }
    }
}

impl UpdatePhase for RepaintPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, target: ElementId, change: VersionChange) {
        if change.intersects(Self::TRIGGER) {
            self.dirty.mark(target);
        }
    }

    fn update(&mut self, ctx: &mut UpdateContext<'_>) {
        if self.dirty.is_empty() {
            return;
        }
        let dirty: Vec<_> = self
            .dirty
            .take()
            .into_iter()
            .filter(|&id| ctx.tree.contains(id))
            .collect();
        if dirty.is_empty() {
            return;
        }
        let mut region = Rect::ZERO;
        for &id in &dirty {
            region = region.union(&ctx.tree.world_bounds(id));
        }
        self.renderer.repaint(ctx.tree, region, &dirty);
    }
}

// =============================================================================
// DEFAULT ASSEMBLY
// =============================================================================

/// The standard phase array in execution order, with the hierarchy flags
/// updater as the TransformClip phase (world-space variant for world-space
/// panels).
pub fn default_phases(panel_kind: PanelKind) -> [Box<dyn UpdatePhase>; PhaseId::COUNT] {
    let hierarchy = if panel_kind == PanelKind::WorldSpace {
        HierarchyFlagsUpdater::world_space()
    } else {
        HierarchyFlagsUpdater::new()
    };
    [
        Box::new(ViewDataPhase::new(Box::new(NullViewDataStore))),
        Box::new(BindingsPhase::structural(Box::new(NullBindingSystem))),
        Box::new(BindingsPhase::data(Box::new(NullBindingSystem))),
        Box::new(AnimationPhase::new()),
        Box::new(StylesPhase::new(Box::new(DirectStyleResolver))),
        Box::new(LayoutPhase::new(Box::new(
            crate::update::taffy_layout::TaffyLayoutEngine::new(),
        ))),
        Box::new(hierarchy),
        Box::new(RepaintPhase::new(Box::new(NullRenderer))),
    ]
}

// =============================================================================
// TESTS
// =============================================================================
