//! Input routing across panels.
//!
//! [`DefaultEventSystem`] drains the installed input source once per tick
//! and routes each event:
//!
//! - focus-based events (key, navigation, text, IME, command) go to the
//!   focused panel's focused element, using a per-batch snapshot so every
//!   focus-based event in one batch targets the same element even when an
//!   earlier handler moves focus. With no focused panel, the event is
//!   broadcast to panel roots topmost-first until one ends up focused or a
//!   handler stops propagation.
//! - position-based events (pointer) resolve a target panel: a panel
//!   holding element capture for the pointer wins, then soft panel capture
//!   (down..up stickiness), then topmost-first hit testing. Panel changes
//!   synthesize leave/enter notices before the main dispatch.
//!
//! Background-input suppression skips the whole tick when the application
//! lost focus, unless a remote-connection override is active.

use log::{debug, warn};

use crate::events::capture::pointer_id;
use crate::events::source::{EventQueue, InputSource};
use crate::events::types::{InputEvent, InputEventKind, PointerAction, PointerEvent};
use crate::panel::{PanelId, RuntimeContext};
use crate::tree::ElementId;

pub struct DefaultEventSystem {
    source: InputSource,
    focused_panel: Option<PanelId>,
    /// (panel, element) captured by the first focus-based event of the
    /// current batch; cleared when a new batch starts.
    batch_snapshot: Option<(Option<PanelId>, Option<ElementId>)>,
    soft_capture: [Option<PanelId>; pointer_id::COUNT],
    last_panel: [Option<PanelId>; pointer_id::COUNT],
    app_has_focus: bool,
    suppress_background_input: bool,
    remote_connection_override: bool,
}

impl DefaultEventSystem {
    pub fn new(source: InputSource) -> Self {
        Self {
            source,
            focused_panel: None,
            batch_snapshot: None,
            soft_capture: [None; pointer_id::COUNT],
            last_panel: [None; pointer_id::COUNT],
            app_has_focus: true,
            suppress_background_input: false,
            remote_connection_override: false,
        }
    }

    /// A system fed by a host-owned queue.
    pub fn with_queue() -> Self {
        Self::new(InputSource::Queue(EventQueue::new()))
    }

    pub fn enqueue(&mut self, event: InputEvent) {
        match self.source.queue_mut() {
            Some(queue) => queue.enqueue(event),
            None => warn!("enqueue on a polling input source; event dropped"),
        }
    }

    pub fn set_app_has_focus(&mut self, has_focus: bool) {
        self.app_has_focus = has_focus;
    }

    pub fn set_suppress_background_input(&mut self, suppress: bool) {
        self.suppress_background_input = suppress;
    }

    pub fn set_remote_connection_override(&mut self, active: bool) {
        self.remote_connection_override = active;
    }

    pub fn focused_panel(&self) -> Option<PanelId> {
        self.focused_panel
    }

    /// Drain and route one batch of input.
    pub fn update(&mut self, ctx: &mut RuntimeContext) {
        if !self.app_has_focus
            && self.suppress_background_input
            && !self.remote_connection_override
        {
            return;
        }
        let events = self.source.drain();
        self.batch_snapshot = None;
        for event in events {
            self.process_event(ctx, &event.kind);
        }
    }

    fn process_event(&mut self, ctx: &mut RuntimeContext, kind: &InputEventKind) {
        if kind.is_focus_based() {
            self.route_focus_event(ctx, kind);
        } else if let InputEventKind::Pointer(event) = kind {
            // Button releases deselect when they land on nothing.
            let deselect = event.action == PointerAction::Up;
            self.route_position_event(ctx, event, deselect);
        }
    }

    // -------------------------------------------------------------------------
    // FOCUS-BASED ROUTING
    // -------------------------------------------------------------------------

    fn route_focus_event(&mut self, ctx: &mut RuntimeContext, kind: &InputEventKind) {
        let snapshot = *self.batch_snapshot.get_or_insert_with(|| {
            let panel = self.focused_panel;
            let element =
                panel.and_then(|id| ctx.panel(id)).and_then(|panel| panel.focused_element());
            (panel, element)
        });

        if let Some(panel_id) = snapshot.0 {
            let resolved = match ctx.panel_mut(panel_id) {
                Some(panel) => {
                    let target = snapshot.1.unwrap_or(panel.tree().root());
                    panel.dispatch_focus_event(kind, Some(target));
                    // Re-resolve from the panel's live focus state.
                    panel.focused_element().is_some().then_some(panel_id)
                }
                None => {
                    debug!("focused panel {panel_id:?} is gone");
                    None
                }
            };
            self.set_focused_panel(ctx, resolved);
            return;
        }

        // Nothing focused: broadcast to panel roots, topmost first.
        for panel_id in ctx.panels_topmost_first() {
            let Some(panel) = ctx.panel_mut(panel_id) else { continue };
            let root = panel.tree().root();
            let stopped = panel.dispatch_focus_event(kind, Some(root));
            let gained_focus = panel.focused_element().is_some();
            if gained_focus {
                self.set_focused_panel(ctx, Some(panel_id));
                return;
            }
            if stopped {
                return;
            }
        }
    }

    // -------------------------------------------------------------------------
    // POSITION-BASED ROUTING
    // -------------------------------------------------------------------------

    fn route_position_event(
        &mut self,
        ctx: &mut RuntimeContext,
        event: &PointerEvent,
        deselect_if_no_target: bool,
    ) {
        let pointer = event.pointer_id;
        if pointer >= pointer_id::COUNT {
            warn!("pointer id {pointer} out of range");
            return;
        }

        // The focused element may have been removed since last tick.
        if let Some(panel_id) = self.focused_panel {
            if let Some(panel) = ctx.panel_mut(panel_id) {
                panel.validate_focus();
            }
        }

        // Element capture overrides panel resolution entirely; soft panel
        // capture comes next; otherwise hit-test topmost first.
        let mut capturing = None;
        for panel_id in ctx.panels_topmost_first() {
            if let Some(panel) = ctx.panel(panel_id) {
                if panel.capture_state().capturing_element(pointer).is_some() {
                    capturing = Some(panel_id);
                    break;
                }
            }
        }
        let capturing = capturing.or(self.soft_capture[pointer]);

        let resolved = if let Some(panel_id) = capturing {
            ctx.panel(panel_id).map(|panel| (panel_id, panel.to_local(event.position)))
        } else {
            let mut found = None;
            for panel_id in ctx.panels_topmost_first() {
                let Some(panel) = ctx.panel(panel_id) else { continue };
                if let Some(local) = panel.map_global_position(event.position) {
                    if panel.pick(local).is_some() {
                        found = Some((panel_id, local));
                        break;
                    }
                }
            }
            found
        };

        let Some((panel_id, local)) = resolved else {
            if let Some(old) = self.last_panel[pointer].take() {
                if let Some(panel) = ctx.panel_mut(old) {
                    panel.pointer_left(pointer);
                }
            }
            if deselect_if_no_target {
                self.set_focused_panel(ctx, None);
            }
            return;
        };

        if self.last_panel[pointer] != Some(panel_id) {
            if let Some(old) = self.last_panel[pointer] {
                if let Some(panel) = ctx.panel_mut(old) {
                    panel.pointer_left(pointer);
                }
            }
            if let Some(panel) = ctx.panel_mut(panel_id) {
                panel.pointer_entered(pointer);
            }
            self.last_panel[pointer] = Some(panel_id);
        }

        let mut local_event = *event;
        local_event.position = local;
        let (focus_changed, has_focus) = match ctx.panel_mut(panel_id) {
            Some(panel) => {
                let before = panel.focused_element();
                panel.dispatch_pointer_event(&local_event);
                let after = panel.focused_element();
                (before != after, after.is_some())
            }
            None => return,
        };

        // Any position event can move element focus (a Down through the
        // default click-to-focus path, or a handler calling set_focus);
        // global panel focus follows the controller whenever it moved.
        if has_focus && (focus_changed || event.action == PointerAction::Down) {
            self.set_focused_panel(ctx, Some(panel_id));
        }

        match event.action {
            PointerAction::Down => {
                self.soft_capture[pointer] = Some(panel_id);
            }
            PointerAction::Up if event.pressed_buttons.is_empty() => {
                self.soft_capture[pointer] = None;
            }
            PointerAction::Cancel => {
                self.soft_capture[pointer] = None;
            }
            _ => {}
        }
    }

    /// Blur-then-focus panel transition; idempotent.
    fn set_focused_panel(&mut self, ctx: &mut RuntimeContext, next: Option<PanelId>) {
        if self.focused_panel == next {
            return;
        }
        if let Some(old) = self.focused_panel {
            if let Some(panel) = ctx.panel_mut(old) {
                panel.panel_blurred();
            }
        }
        if let Some(new) = next {
            if let Some(panel) = ctx.panel_mut(new) {
                panel.panel_focused();
            }
        }
        self.focused_panel = next;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{
        KeyEvent, KeyState, Modifiers, NavigationDirection, PointerButton, PointerButtons,
    };
    use crate::geometry::{Point, Rect, Size};
    use crate::panel::{PanelKind, PanelNotice};
    use crate::tree::PickingMode;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn key_down(key: &str) -> InputEvent {
        InputEvent {
            timestamp_ms: 0,
            kind: InputEventKind::Key(KeyEvent {
                key: key.into(),
                state: KeyState::Down,
                modifiers: Modifiers::empty(),
            }),
        }
    }

    fn nav(direction: NavigationDirection) -> InputEvent {
        InputEvent { timestamp_ms: 0, kind: InputEventKind::Navigation(direction) }
    }

    fn pointer(action: PointerAction, position: Point) -> InputEvent {
        InputEvent {
            timestamp_ms: 0,
            kind: InputEventKind::Pointer(PointerEvent {
                pointer_id: pointer_id::MOUSE,
                action,
                button: matches!(action, PointerAction::Down | PointerAction::Up)
                    .then_some(PointerButton::Primary),
                position,
                scroll_delta: 0.0,
                modifiers: Modifiers::empty(),
                pressed_buttons: match action {
                    PointerAction::Down => PointerButtons::PRIMARY,
                    _ => PointerButtons::empty(),
                },
            }),
        }
    }

    /// A player panel filling `rect` in global space, root picking off,
    /// with one full-size pickable child.
    fn add_panel(ctx: &mut RuntimeContext, rect: Rect) -> (PanelId, crate::tree::ElementId) {
        let id = ctx.create_panel(PanelKind::Player);
        let panel = ctx.panel_mut(id).unwrap();
        panel.set_viewport(rect.size());
        panel.set_offset(rect.origin());
        let root = panel.tree().root();
        panel.set_picking(root, PickingMode::Ignore);
        let child = panel.create_element();
        panel.add_child(root, child).unwrap();
        panel
            .tree_mut()
            .set_layout_rect(child, Rect::new(0.0, 0.0, rect.width, rect.height));
        panel.tree_mut().update_world_geometry();
        (id, child)
    }

    #[test]
    fn test_background_input_suppression_and_remote_override() {
        let mut ctx = RuntimeContext::new();
        let (panel_id, child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        let hits = Rc::new(RefCell::new(0));
        let h = Rc::clone(&hits);
        ctx.panel_mut(panel_id)
            .unwrap()
            .add_handler(child, Box::new(move |_, _| *h.borrow_mut() += 1));

        let mut system = DefaultEventSystem::with_queue();
        system.set_app_has_focus(false);
        system.set_suppress_background_input(true);

        system.enqueue(pointer(PointerAction::Move, Point::new(10.0, 10.0)));
        system.update(&mut ctx);
        assert_eq!(*hits.borrow(), 0);

        system.set_remote_connection_override(true);
        system.update(&mut ctx);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn test_position_routing_picks_topmost_panel() {
        let mut ctx = RuntimeContext::new();
        let (bottom, bottom_child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 100.0, 100.0));
        let (top, top_child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        ctx.panel_mut(top).unwrap().set_sort_order(1.0);

        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        ctx.panel_mut(bottom)
            .unwrap()
            .add_handler(bottom_child, Box::new(move |_, _| l.borrow_mut().push("bottom")));
        let l = Rc::clone(&log);
        ctx.panel_mut(top)
            .unwrap()
            .add_handler(top_child, Box::new(move |_, _| l.borrow_mut().push("top")));

        let mut system = DefaultEventSystem::with_queue();
        // Inside both panels: top wins.
        system.enqueue(pointer(PointerAction::Move, Point::new(25.0, 25.0)));
        // Only inside the bottom panel.
        system.enqueue(pointer(PointerAction::Move, Point::new(75.0, 75.0)));
        system.update(&mut ctx);
        assert_eq!(*log.borrow(), vec!["top", "bottom"]);

        // The panel change emitted leave/enter notices.
        let notices = ctx.panel_mut(top).unwrap().take_notices();
        assert!(notices.contains(&PanelNotice::PointerEntered(pointer_id::MOUSE)));
        assert!(notices.contains(&PanelNotice::PointerLeft(pointer_id::MOUSE)));
        let notices = ctx.panel_mut(bottom).unwrap().take_notices();
        assert!(notices.contains(&PanelNotice::PointerEntered(pointer_id::MOUSE)));
    }

    #[test]
    fn test_soft_capture_keeps_panel_between_down_and_up() {
        let mut ctx = RuntimeContext::new();
        let (left, _left_child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        let (right, right_child) = add_panel(&mut ctx, Rect::new(50.0, 0.0, 50.0, 50.0));

        let log = Rc::new(RefCell::new(Vec::new()));
        // The drag leaves the pressed child's rect, so listen on the left
        // panel's root where both the Down and the miss dispatch bubble.
        let l = Rc::clone(&log);
        let left_root = ctx.panel(left).unwrap().tree().root();
        ctx.panel_mut(left)
            .unwrap()
            .add_handler(left_root, Box::new(move |_, _| l.borrow_mut().push("left")));
        let l = Rc::clone(&log);
        ctx.panel_mut(right)
            .unwrap()
            .add_handler(right_child, Box::new(move |_, _| l.borrow_mut().push("right")));

        let mut system = DefaultEventSystem::with_queue();
        system.enqueue(pointer(PointerAction::Down, Point::new(10.0, 10.0)));
        // Drag over the right panel: still routed to the left one.
        system.enqueue(pointer(PointerAction::Move, Point::new(75.0, 10.0)));
        system.enqueue(pointer(PointerAction::Up, Point::new(75.0, 10.0)));
        system.update(&mut ctx);
        assert_eq!(*log.borrow(), vec!["left", "left", "left"]);

        // Capture released on up: the next move hits the right panel.
        system.enqueue(pointer(PointerAction::Move, Point::new(75.0, 10.0)));
        system.update(&mut ctx);
        assert_eq!(log.borrow().last(), Some(&"right"));
    }

    #[test]
    fn test_down_focuses_panel_and_release_on_miss_deselects() {
        let mut ctx = RuntimeContext::new();
        let (panel_id, child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        ctx.panel_mut(panel_id).unwrap().tree_mut().set_focusable(child, true);

        let mut system = DefaultEventSystem::with_queue();
        system.enqueue(pointer(PointerAction::Down, Point::new(10.0, 10.0)));
        system.enqueue(pointer(PointerAction::Up, Point::new(10.0, 10.0)));
        system.update(&mut ctx);
        assert_eq!(system.focused_panel(), Some(panel_id));

        // Press-release on empty space clears panel focus.
        system.enqueue(pointer(PointerAction::Down, Point::new(200.0, 200.0)));
        system.enqueue(pointer(PointerAction::Up, Point::new(200.0, 200.0)));
        system.update(&mut ctx);
        assert_eq!(system.focused_panel(), None);
        assert!(ctx
            .panel_mut(panel_id)
            .unwrap()
            .take_notices()
            .contains(&PanelNotice::PanelBlurred));
    }

    #[test]
    fn test_handler_focus_on_move_refreshes_panel_focus() {
        let mut ctx = RuntimeContext::new();
        let (panel_id, child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        ctx.panel_mut(panel_id).unwrap().tree_mut().set_focusable(child, true);
        ctx.panel_mut(panel_id)
            .unwrap()
            .add_handler(child, Box::new(move |ectx, _| ectx.set_focus(Some(child))));

        // No Down ever happens: the handler moves element focus during a
        // plain Move, and panel focus tracking follows it.
        let mut system = DefaultEventSystem::with_queue();
        system.enqueue(pointer(PointerAction::Move, Point::new(10.0, 10.0)));
        system.update(&mut ctx);

        assert_eq!(ctx.panel(panel_id).unwrap().focused_element(), Some(child));
        assert_eq!(system.focused_panel(), Some(panel_id));
    }

    #[test]
    fn test_focus_batch_stability() {
        let mut ctx = RuntimeContext::new();
        let (panel_id, a) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        let panel = ctx.panel_mut(panel_id).unwrap();
        let b = panel.create_element();
        panel.add_child(panel.tree().root(), b).unwrap();
        panel.tree_mut().set_focusable(a, true);
        panel.tree_mut().set_focusable(b, true);
        panel.set_focused_element(Some(a));

        let targets = Rc::new(RefCell::new(Vec::new()));
        let t = Rc::clone(&targets);
        panel.add_handler(
            a,
            Box::new(move |ctx, kind| {
                if matches!(kind, InputEventKind::Pointer(_)) {
                    return;
                }
                t.borrow_mut().push(ctx.target);
                // The key-down handler moves focus permanently.
                if matches!(kind, InputEventKind::Key(_)) {
                    ctx.set_focus(Some(b));
                }
                ctx.stop_propagation();
            }),
        );

        let mut system = DefaultEventSystem::with_queue();
        // Make the panel globally focused first.
        system.enqueue(pointer(PointerAction::Down, Point::new(10.0, 10.0)));
        system.update(&mut ctx);
        assert_eq!(system.focused_panel(), Some(panel_id));
        ctx.panel_mut(panel_id).unwrap().set_focused_element(Some(a));

        // One batch: key-down then navigation. Both must target the
        // snapshot element `a`, even though the first handler moved focus.
        system.enqueue(key_down("x"));
        system.enqueue(nav(NavigationDirection::Submit));
        system.update(&mut ctx);
        assert_eq!(*targets.borrow(), vec![a, a]);
        // The focus change is visible to live queries after the batch.
        assert_eq!(ctx.panel(panel_id).unwrap().focused_element(), Some(b));
    }

    #[test]
    fn test_broadcast_stops_at_first_panel_taking_focus() {
        let mut ctx = RuntimeContext::new();
        let (bottom, _) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        let (top, top_child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        ctx.panel_mut(top).unwrap().set_sort_order(1.0);
        ctx.panel_mut(top).unwrap().tree_mut().set_focusable(top_child, true);

        let reached_bottom = Rc::new(RefCell::new(false));
        let r = Rc::clone(&reached_bottom);
        let bottom_root = ctx.panel(bottom).unwrap().tree().root();
        ctx.panel_mut(bottom)
            .unwrap()
            .add_handler(bottom_root, Box::new(move |_, _| *r.borrow_mut() = true));

        let top_root = ctx.panel(top).unwrap().tree().root();
        ctx.panel_mut(top).unwrap().add_handler(
            top_root,
            Box::new(move |ctx, _| ctx.set_focus(Some(top_child))),
        );

        let mut system = DefaultEventSystem::with_queue();
        system.enqueue(key_down("x"));
        system.update(&mut ctx);

        assert_eq!(system.focused_panel(), Some(top));
        assert!(!*reached_bottom.borrow());
    }

    #[test]
    fn test_element_capture_overrides_panel_resolution() {
        let mut ctx = RuntimeContext::new();
        let (left, left_child) = add_panel(&mut ctx, Rect::new(0.0, 0.0, 50.0, 50.0));
        let (right, right_child) = add_panel(&mut ctx, Rect::new(50.0, 0.0, 50.0, 50.0));

        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        ctx.panel_mut(left)
            .unwrap()
            .add_handler(left_child, Box::new(move |_, _| l.borrow_mut().push("left")));
        let l = Rc::clone(&log);
        ctx.panel_mut(right)
            .unwrap()
            .add_handler(right_child, Box::new(move |_, _| l.borrow_mut().push("right")));

        // Element capture in the left panel, no soft capture involved.
        let panel = ctx.panel_mut(left).unwrap();
        panel.capture_state_mut().capture_pointer(left_child, pointer_id::MOUSE);
        panel.commit_pointer_capture(pointer_id::MOUSE);

        let mut system = DefaultEventSystem::with_queue();
        system.enqueue(pointer(PointerAction::Move, Point::new(75.0, 10.0)));
        system.update(&mut ctx);
        assert_eq!(*log.borrow(), vec!["left"]);
    }
}
