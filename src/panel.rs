//! Panels and the runtime context that owns them.
//!
//! A [`Panel`] bundles one visual tree with everything that keeps it
//! consistent: the phased updater, per-pointer hover state, the pointer
//! capture state machine, a focus controller and the element event handler
//! registry. Mutations go through the panel's setters so the matching
//! version-change notification is never forgotten.
//!
//! [`RuntimeContext`] is the explicit owner of all live panels - there is
//! no process-wide registry. Hosts create one context, create panels in
//! it, and hand it to the event system each tick.
//!
//! # Dispatch model
//!
//! Handlers never see the panel itself, only an [`EventCtx`]: a read-only
//! tree view plus a request queue. Capture and focus changes requested
//! during dispatch are applied after propagation completes, then pointer
//! capture is committed, so an in-flight event's path is never changed
//! under it.

use std::collections::HashMap;

use log::debug;

use crate::error::Error;
use crate::events::capture::{
    pointer_id, process_pointer_capture, CaptureNotice, PointerDispatchState,
};
use crate::events::types::{InputEventKind, NavigationDirection, PointerAction, PointerEvent};
use crate::geometry::{Point, Rect, Size};
use crate::tree::{ElementId, EventCategory, PickingMode, StyleInput, VersionChange, VisualTree};
use crate::update::phases::default_phases;
use crate::update::{PhaseId, VisualTreeUpdater};

// =============================================================================
// PANEL KIND / ID
// =============================================================================

/// What kind of host surface a panel renders into. Resolved once at
/// construction; routing decisions branch on this, never on runtime type
/// inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelKind {
    /// A runtime (game/application) panel.
    Player,
    /// An editor tool panel. Gets the pre-phase and hover restyling.
    Editor,
    /// A panel rendered in 3D world space. No under-pointer tracking.
    WorldSpace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PanelId(pub(crate) u32);

// =============================================================================
// POINTER OVER STATE
// =============================================================================

/// Last known position and hovered element per pointer.
pub struct PointerOverState {
    positions: [Option<Point>; pointer_id::COUNT],
    over: [Option<ElementId>; pointer_id::COUNT],
}

impl PointerOverState {
    pub fn new() -> Self {
        Self { positions: [None; pointer_id::COUNT], over: [None; pointer_id::COUNT] }
    }

    pub fn set_position(&mut self, pointer: usize, position: Point) {
        if pointer < pointer_id::COUNT {
            self.positions[pointer] = Some(position);
        }
    }

    pub fn position(&self, pointer: usize) -> Option<Point> {
        self.positions.get(pointer).copied().flatten()
    }

    pub fn over(&self, pointer: usize) -> Option<ElementId> {
        self.over.get(pointer).copied().flatten()
    }

    pub fn set_over(&mut self, pointer: usize, over: Option<ElementId>) {
        if pointer < pointer_id::COUNT {
            self.over[pointer] = over;
        }
    }

    /// Forget a pointer entirely (left the panel, cancelled).
    pub fn clear(&mut self, pointer: usize) {
        if pointer < pointer_id::COUNT {
            self.positions[pointer] = None;
            self.over[pointer] = None;
        }
    }

    /// Pointers with a known position.
    pub fn active(&self) -> impl Iterator<Item = (usize, Point)> + '_ {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(pointer, position)| position.map(|p| (pointer, p)))
    }
}

impl Default for PointerOverState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// EVENT CONTEXT & HANDLERS
// =============================================================================

enum Request {
    Capture(ElementId, usize),
    Release(usize),
    Focus(Option<ElementId>),
}

/// What a handler sees during dispatch: the tree (read-only), the dispatch
/// target, the element currently handling, and a request queue for capture
/// and focus changes that apply after propagation.
pub struct EventCtx<'a> {
    pub tree: &'a VisualTree,
    pub target: ElementId,
    pub current: ElementId,
    stopped: bool,
    requests: Vec<Request>,
}

impl<'a> EventCtx<'a> {
    fn new(tree: &'a VisualTree, target: ElementId) -> Self {
        Self { tree, target, current: target, stopped: false, requests: Vec::new() }
    }

    /// Stop bubbling after the current element's handlers finish.
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Request pointer capture for the current element. Deferred to after
    /// this event's propagation.
    pub fn capture_pointer(&mut self, pointer: usize) {
        self.requests.push(Request::Capture(self.current, pointer));
    }

    pub fn release_pointer(&mut self, pointer: usize) {
        self.requests.push(Request::Release(pointer));
    }

    /// Request a focus change, applied after propagation.
    pub fn set_focus(&mut self, element: Option<ElementId>) {
        self.requests.push(Request::Focus(element));
    }
}

pub type EventHandler = Box<dyn FnMut(&mut EventCtx<'_>, &InputEventKind)>;

/// Opaque handle for removing a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId {
    element: ElementId,
    seq: u64,
}

#[derive(Default)]
struct HandlerRegistry {
    map: HashMap<ElementId, Vec<(u64, EventHandler)>>,
    next_seq: u64,
}

impl HandlerRegistry {
    fn add(&mut self, element: ElementId, handler: EventHandler) -> HandlerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.map.entry(element).or_default().push((seq, handler));
        HandlerId { element, seq }
    }

    fn remove(&mut self, id: HandlerId) {
        if let Some(list) = self.map.get_mut(&id.element) {
            list.retain(|(seq, _)| *seq != id.seq);
            if list.is_empty() {
                self.map.remove(&id.element);
            }
        }
    }

    fn remove_element(&mut self, element: ElementId) {
        self.map.remove(&element);
    }
}

// =============================================================================
// PANEL NOTICES
// =============================================================================

/// Observable panel-level happenings, drained by the host each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelNotice {
    ElementFocused(ElementId),
    ElementBlurred(ElementId),
    PanelFocused,
    PanelBlurred,
    PointerEntered(usize),
    PointerLeft(usize),
}

// =============================================================================
// PANEL
// =============================================================================

pub struct Panel {
    id: PanelId,
    kind: PanelKind,
    tree: VisualTree,
    updater: VisualTreeUpdater,
    pointers: PointerOverState,
    capture: PointerDispatchState,
    handlers: HandlerRegistry,
    focused: Option<ElementId>,
    viewport: Size,
    /// Global position of the panel's top-left corner.
    offset: Point,
    /// Higher is closer to the viewer.
    sort_order: f32,
    notices: Vec<PanelNotice>,
    capture_events: Vec<CaptureNotice>,
}

impl Panel {
    fn new(id: PanelId, kind: PanelKind) -> Self {
        Self {
            id,
            kind,
            tree: VisualTree::new(),
            updater: VisualTreeUpdater::new(default_phases(kind)),
            pointers: PointerOverState::new(),
            capture: PointerDispatchState::new(),
            handlers: HandlerRegistry::default(),
            focused: None,
            viewport: Size::ZERO,
            offset: Point::ZERO,
            sort_order: 0.0,
            notices: Vec::new(),
            capture_events: Vec::new(),
        }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    pub fn kind(&self) -> PanelKind {
        self.kind
    }

    pub fn tree(&self) -> &VisualTree {
        &self.tree
    }

    /// Direct mutable tree access. Callers doing raw mutations are
    /// responsible for pairing them with [`Panel::notify_version_changed`];
    /// prefer the typed setters below.
    pub fn tree_mut(&mut self) -> &mut VisualTree {
        &mut self.tree
    }

    pub fn updater_mut(&mut self) -> &mut VisualTreeUpdater {
        &mut self.updater
    }

    pub fn capture_state(&self) -> &PointerDispatchState {
        &self.capture
    }

    pub fn capture_state_mut(&mut self) -> &mut PointerDispatchState {
        &mut self.capture
    }

    pub fn set_viewport(&mut self, viewport: Size) {
        if self.viewport != viewport {
            self.viewport = viewport;
            let root = self.tree.root();
            self.notify_version_changed(root, VersionChange::LAYOUT | VersionChange::SIZE);
        }
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn set_offset(&mut self, offset: Point) {
        self.offset = offset;
    }

    pub fn sort_order(&self) -> f32 {
        self.sort_order
    }

    pub fn set_sort_order(&mut self, sort_order: f32) {
        self.sort_order = sort_order;
    }

    // -------------------------------------------------------------------------
    // MUTATION (with version-change notification)
    // -------------------------------------------------------------------------

    pub fn notify_version_changed(&mut self, target: ElementId, change: VersionChange) {
        self.updater.on_version_changed(&mut self.tree, target, change);
    }

    pub fn create_element(&mut self) -> ElementId {
        self.tree.create_element()
    }

    pub fn add_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), Error> {
        self.tree.add_child(parent, child)?;
        self.notify_version_changed(parent, VersionChange::HIERARCHY);
        Ok(())
    }

    pub fn insert_child(
        &mut self,
        parent: ElementId,
        index: usize,
        child: ElementId,
    ) -> Result<(), Error> {
        self.tree.insert_child(parent, index, child)?;
        self.notify_version_changed(parent, VersionChange::HIERARCHY);
        Ok(())
    }

    /// Remove an element and its subtree, scrubbing every panel-held
    /// reference into it (capture, hover, focus, handlers).
    pub fn remove_element(&mut self, id: ElementId) -> Result<(), Error> {
        let removed = self.tree.subtree(id);
        let parent = self.tree.parent(id);
        self.tree.remove(id)?;
        for el in removed {
            self.capture.release_everywhere(el);
            self.handlers.remove_element(el);
            for pointer in 0..pointer_id::COUNT {
                if self.pointers.over(pointer) == Some(el) {
                    self.pointers.set_over(pointer, None);
                }
            }
            if self.focused == Some(el) {
                self.set_focused_element(None);
            }
        }
        if let Some(parent) = parent {
            self.notify_version_changed(parent, VersionChange::HIERARCHY);
        }
        Ok(())
    }

    pub fn set_style(&mut self, id: ElementId, style: StyleInput) {
        let old = self.tree.style(id);
        if old == style {
            return;
        }
        let mut change = VersionChange::STYLES;
        if old.border_width != style.border_width {
            change |= VersionChange::BORDER_WIDTH;
        }
        if old.overflow != style.overflow {
            change |= VersionChange::OVERFLOW;
        }
        self.tree.set_style(id, style);
        self.notify_version_changed(id, change);
    }

    pub fn set_local_transform(&mut self, id: ElementId, transform: crate::geometry::Transform) {
        self.tree.set_local_transform(id, transform);
        self.notify_version_changed(id, VersionChange::TRANSFORM);
    }

    pub fn set_picking(&mut self, id: ElementId, picking: PickingMode) {
        self.tree.set_picking(id, picking);
        self.notify_version_changed(id, VersionChange::PICKING);
    }

    pub fn set_event_categories(&mut self, id: ElementId, categories: EventCategory) {
        self.tree.set_event_categories(id, categories);
        self.notify_version_changed(id, VersionChange::EVENT_CALLBACK_CATEGORIES);
    }

    pub fn set_visible(&mut self, id: ElementId, visible: bool) {
        if self.tree.is_visible(id) != visible {
            self.tree.set_visible(id, visible);
            self.notify_version_changed(id, VersionChange::LAYOUT | VersionChange::REPAINT);
        }
    }

    // -------------------------------------------------------------------------
    // UPDATE
    // -------------------------------------------------------------------------

    /// Run the full pipeline once.
    pub fn update(&mut self) {
        self.updater.update_all(&mut self.tree, self.kind, &mut self.pointers, self.viewport);
    }

    /// Run one phase out of order; see [`VisualTreeUpdater::update_single_phase`].
    pub fn update_single_phase(&mut self, phase: PhaseId) {
        self.updater.update_single_phase(
            phase,
            &mut self.tree,
            self.kind,
            &mut self.pointers,
            self.viewport,
        );
    }

    // -------------------------------------------------------------------------
    // COORDINATES & PICKING
    // -------------------------------------------------------------------------

    /// Global → panel-local, without bounds checking. Captured pointers
    /// keep receiving events while dragged outside the viewport.
    pub fn to_local(&self, global: Point) -> Point {
        Point::new(global.x - self.offset.x, global.y - self.offset.y)
    }

    /// Map a global input position into panel-local space, or `None` when
    /// the position lies outside the panel's viewport.
    pub fn map_global_position(&self, global: Point) -> Option<Point> {
        let local = self.to_local(global);
        let bounds = Rect::new(0.0, 0.0, self.viewport.width, self.viewport.height);
        bounds.contains(local).then_some(local)
    }

    /// Topmost pickable element at a panel-local position.
    pub fn pick(&self, local: Point) -> Option<ElementId> {
        self.tree.pick(local)
    }

    // -------------------------------------------------------------------------
    // HANDLERS
    // -------------------------------------------------------------------------

    pub fn add_handler(&mut self, element: ElementId, handler: EventHandler) -> HandlerId {
        self.handlers.add(element, handler)
    }

    pub fn remove_handler(&mut self, id: HandlerId) {
        self.handlers.remove(id);
    }

    // -------------------------------------------------------------------------
    // FOCUS
    // -------------------------------------------------------------------------

    pub fn focused_element(&self) -> Option<ElementId> {
        self.focused
    }

    /// Blur-then-focus, idempotent: setting the current value is a no-op.
    pub fn set_focused_element(&mut self, next: Option<ElementId>) {
        let next = next.filter(|&el| self.tree.contains(el) && self.tree.is_focusable(el));
        if self.focused == next {
            return;
        }
        if let Some(old) = self.focused.take() {
            self.notices.push(PanelNotice::ElementBlurred(old));
        }
        if let Some(new) = next {
            self.notices.push(PanelNotice::ElementFocused(new));
        }
        self.focused = next;
    }

    /// Drop focus if the focused element died or stopped being focusable.
    pub fn validate_focus(&mut self) {
        if let Some(focused) = self.focused {
            if !self.tree.contains(focused) || !self.tree.is_focusable(focused) {
                debug!("focused element {focused:?} no longer focusable");
                self.set_focused_element(None);
            }
        }
    }

    fn focus_ring(&self) -> Vec<ElementId> {
        let mut ring: Vec<_> = self
            .tree
            .subtree(self.tree.root())
            .into_iter()
            .filter(|&el| self.tree.is_focusable(el))
            .collect();
        // Stable sort keeps tree order within equal tab indices.
        ring.sort_by_key(|&el| self.tree.tab_index(el));
        ring
    }

    pub fn focus_next(&mut self) {
        self.focus_step(1);
    }

    pub fn focus_previous(&mut self) {
        self.focus_step(-1);
    }

    fn focus_step(&mut self, direction: isize) {
        let ring = self.focus_ring();
        if ring.is_empty() {
            self.set_focused_element(None);
            return;
        }
        let next = match self.focused.and_then(|f| ring.iter().position(|&el| el == f)) {
            Some(i) => {
                let len = ring.len() as isize;
                ring[((i as isize + direction).rem_euclid(len)) as usize]
            }
            None => {
                if direction >= 0 {
                    ring[0]
                } else {
                    ring[ring.len() - 1]
                }
            }
        };
        self.set_focused_element(Some(next));
    }

    // -------------------------------------------------------------------------
    // DISPATCH
    // -------------------------------------------------------------------------

    /// Dispatch a pointer event already mapped to panel-local coordinates.
    /// Returns true when a handler stopped propagation.
    pub fn dispatch_pointer_event(&mut self, event: &PointerEvent) -> bool {
        let pointer = event.pointer_id;
        if pointer >= pointer_id::COUNT {
            debug!("pointer id {pointer} out of range");
            return false;
        }
        self.pointers.set_position(pointer, event.position);

        let captured = self
            .capture
            .capturing_element(pointer)
            .filter(|&el| self.tree.contains(el));
        let hit = self.tree.pick(event.position);
        if captured.is_none() {
            self.pointers.set_over(pointer, hit);
        }

        // A panel resolved through capture can see positions that miss
        // every pickable element; the event still lands on the root.
        let target = captured.or(hit).unwrap_or_else(|| self.tree.root());

        // Capture routes exclusively: no bubbling through ancestors.
        let path = if captured.is_some() {
            vec![target]
        } else {
            self.bubble_path(target)
        };

        let kind = InputEventKind::Pointer(*event);
        let (stopped, requests) = self.run_handlers(&path, target, &kind);

        if event.action == PointerAction::Down && captured.is_none() {
            let focus_target = self.nearest_focusable(target);
            self.set_focused_element(focus_target);
        }

        self.apply_requests(requests);
        self.commit_pointer_capture(pointer);

        if event.action == PointerAction::Cancel {
            self.pointers.clear(pointer);
        }
        stopped
    }

    /// Dispatch a focus-based event to `target` (or the focused element,
    /// or the root). Returns true when propagation was stopped.
    pub fn dispatch_focus_event(
        &mut self,
        kind: &InputEventKind,
        target: Option<ElementId>,
    ) -> bool {
        let target = target
            .filter(|&el| self.tree.contains(el))
            .or(self.focused)
            .unwrap_or(self.tree.root());
        let path = self.bubble_path(target);
        let (stopped, requests) = self.run_handlers(&path, target, kind);
        self.apply_requests(requests);

        // Default navigation behavior when no handler claimed the event.
        if !stopped {
            match kind {
                InputEventKind::Navigation(NavigationDirection::Next) => self.focus_next(),
                InputEventKind::Navigation(NavigationDirection::Previous) => {
                    self.focus_previous()
                }
                _ => {}
            }
        }
        stopped
    }

    fn bubble_path(&self, target: ElementId) -> Vec<ElementId> {
        let mut path = vec![target];
        let mut cur = target;
        while let Some(parent) = self.tree.parent(cur) {
            path.push(parent);
            cur = parent;
        }
        path
    }

    fn nearest_focusable(&self, from: ElementId) -> Option<ElementId> {
        let mut cur = Some(from);
        while let Some(el) = cur {
            if self.tree.is_focusable(el) {
                return Some(el);
            }
            cur = self.tree.parent(el);
        }
        None
    }

    fn run_handlers(
        &mut self,
        path: &[ElementId],
        target: ElementId,
        kind: &InputEventKind,
    ) -> (bool, Vec<Request>) {
        let mut ctx = EventCtx::new(&self.tree, target);
        for &el in path {
            ctx.current = el;
            if let Some(list) = self.handlers.map.get_mut(&el) {
                for (_, handler) in list.iter_mut() {
                    handler(&mut ctx, kind);
                    if ctx.stopped {
                        break;
                    }
                }
            }
            if ctx.stopped {
                break;
            }
        }
        (ctx.stopped, ctx.requests)
    }

    fn apply_requests(&mut self, requests: Vec<Request>) {
        for request in requests {
            match request {
                Request::Capture(owner, pointer) => self.capture.capture_pointer(owner, pointer),
                Request::Release(pointer) => self.capture.release_pointer(pointer),
                Request::Focus(element) => self.set_focused_element(element),
            }
        }
    }

    /// Commit pending capture for one pointer, recording the emitted
    /// notices for the host to drain.
    pub fn commit_pointer_capture(&mut self, pointer: usize) {
        let events = &mut self.capture_events;
        process_pointer_capture(&mut self.capture, pointer, |_, notice| events.push(notice));
    }

    // -------------------------------------------------------------------------
    // NOTICES
    // -------------------------------------------------------------------------

    pub(crate) fn pointer_entered(&mut self, pointer: usize) {
        self.notices.push(PanelNotice::PointerEntered(pointer));
    }

    pub(crate) fn pointer_left(&mut self, pointer: usize) {
        self.pointers.clear(pointer);
        self.notices.push(PanelNotice::PointerLeft(pointer));
    }

    pub(crate) fn panel_focused(&mut self) {
        self.notices.push(PanelNotice::PanelFocused);
    }

    pub(crate) fn panel_blurred(&mut self) {
        self.notices.push(PanelNotice::PanelBlurred);
    }

    pub fn take_notices(&mut self) -> Vec<PanelNotice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_capture_events(&mut self) -> Vec<CaptureNotice> {
        std::mem::take(&mut self.capture_events)
    }
}

// =============================================================================
// RUNTIME CONTEXT
// =============================================================================

/// Explicit owner of every live panel. Created by the host; all panel
/// lookup and enumeration goes through it.
pub struct RuntimeContext {
    panels: Vec<Panel>,
    next_panel: u32,
}

impl RuntimeContext {
    pub fn new() -> Self {
        Self { panels: Vec::new(), next_panel: 0 }
    }

    pub fn create_panel(&mut self, kind: PanelKind) -> PanelId {
        let id = PanelId(self.next_panel);
        self.next_panel += 1;
        self.panels.push(Panel::new(id, kind));
        id
    }

    pub fn remove_panel(&mut self, id: PanelId) -> Result<(), Error> {
        let before = self.panels.len();
        self.panels.retain(|panel| panel.id != id);
        if self.panels.len() == before {
            return Err(Error::UnknownPanel(id));
        }
        Ok(())
    }

    pub fn panel(&self, id: PanelId) -> Option<&Panel> {
        self.panels.iter().find(|panel| panel.id == id)
    }

    pub fn panel_mut(&mut self, id: PanelId) -> Option<&mut Panel> {
        self.panels.iter_mut().find(|panel| panel.id == id)
    }

    pub fn len(&self) -> usize {
        self.panels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Panel ids in topmost-first order: higher sort order wins, later
    /// creation breaks ties.
    pub fn panels_topmost_first(&self) -> Vec<PanelId> {
        let mut ids: Vec<_> = self.panels.iter().map(|p| (p.sort_order, p.id)).collect();
        ids.sort_by(|a, b| {
            b.0.total_cmp(&a.0).then_with(|| b.1 .0.cmp(&a.1 .0))
        });
        ids.into_iter().map(|(_, id)| id).collect()
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
