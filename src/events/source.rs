//! Input source adapters.
//!
//! Exactly one source is active at a time: either a legacy polling adapter
//! (wrapped behind [`PolledInputSource`]) or a push-style [`EventQueue`]
//! the host feeds directly. The event system drains whichever is installed
//! once per tick, in arrival order.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crossterm::event::{
    poll, read, Event as CrosstermEvent, KeyCode, KeyEvent as CrosstermKeyEvent,
    KeyEventKind, KeyModifiers, MouseButton as CrosstermMouseButton,
    MouseEvent as CrosstermMouseEvent, MouseEventKind,
};
use log::warn;

use crate::events::capture::pointer_id;
use crate::events::types::{
    InputEvent, InputEventKind, KeyEvent, KeyState, Modifiers, NavigationDirection,
    PointerAction, PointerButton, PointerButtons, PointerEvent,
};
use crate::geometry::Point;

// =============================================================================
// SOURCE SELECTION
// =============================================================================

/// Legacy polling contract: return every event that arrived since the last
/// call, oldest first.
pub trait PolledInputSource {
    fn poll_events(&mut self) -> Vec<InputEvent>;
}

/// Push-style FIFO the host enqueues into between ticks.
#[derive(Default)]
pub struct EventQueue {
    events: VecDeque<InputEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<InputEvent> {
        self.events.drain(..).collect()
    }
}

/// The installed adapter. Selected by configuration at construction, never
/// both at once.
pub enum InputSource {
    Polled(Box<dyn PolledInputSource>),
    Queue(EventQueue),
}

impl InputSource {
    pub fn drain(&mut self) -> Vec<InputEvent> {
        match self {
            InputSource::Polled(source) => source.poll_events(),
            InputSource::Queue(queue) => queue.drain(),
        }
    }

    /// The queue, when this is the push-style source.
    pub fn queue_mut(&mut self) -> Option<&mut EventQueue> {
        match self {
            InputSource::Queue(queue) => Some(queue),
            InputSource::Polled(_) => None,
        }
    }
}

// =============================================================================
// CROSSTERM ADAPTER
// =============================================================================

/// Terminal-backed polling source. Converts crossterm key and mouse events
/// into canonical [`InputEvent`]s; Tab/BackTab become navigation events.
pub struct CrosstermInput {
    started: Instant,
    /// Buttons currently held, tracked across events.
    pressed: PointerButtons,
}

impl CrosstermInput {
    pub fn new() -> Self {
        Self { started: Instant::now(), pressed: PointerButtons::empty() }
    }

    fn timestamp_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn convert_modifiers(modifiers: KeyModifiers) -> Modifiers {
        let mut out = Modifiers::empty();
        if modifiers.contains(KeyModifiers::SHIFT) {
            out |= Modifiers::SHIFT;
        }
        if modifiers.contains(KeyModifiers::CONTROL) {
            out |= Modifiers::CONTROL;
        }
        if modifiers.contains(KeyModifiers::ALT) {
            out |= Modifiers::ALT;
        }
        if modifiers.contains(KeyModifiers::SUPER) {
            out |= Modifiers::COMMAND;
        }
        out
    }

    fn convert_key(&self, event: CrosstermKeyEvent) -> Option<InputEventKind> {
        let state = match event.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => KeyState::Down,
            KeyEventKind::Release => KeyState::Up,
        };
        let modifiers = Self::convert_modifiers(event.modifiers);
        let kind = match event.code {
            KeyCode::Tab => InputEventKind::Navigation(NavigationDirection::Next),
            KeyCode::BackTab => InputEventKind::Navigation(NavigationDirection::Previous),
            KeyCode::Enter => InputEventKind::Navigation(NavigationDirection::Submit),
            KeyCode::Esc => InputEventKind::Navigation(NavigationDirection::Cancel),
            KeyCode::Up => InputEventKind::Navigation(NavigationDirection::Up),
            KeyCode::Down => InputEventKind::Navigation(NavigationDirection::Down),
            KeyCode::Left => InputEventKind::Navigation(NavigationDirection::Left),
            KeyCode::Right => InputEventKind::Navigation(NavigationDirection::Right),
            KeyCode::Char(c) => InputEventKind::Key(KeyEvent {
                key: c.to_string(),
                state,
                modifiers,
            }),
            KeyCode::Backspace => InputEventKind::Key(KeyEvent {
                key: "Backspace".into(),
                state,
                modifiers,
            }),
            KeyCode::Delete => InputEventKind::Key(KeyEvent {
                key: "Delete".into(),
                state,
                modifiers,
            }),
            other => {
                let key = format!("{other:?}");
                InputEventKind::Key(KeyEvent { key, state, modifiers })
            }
        };
        // Navigation keys only fire on press.
        if state == KeyState::Up && matches!(kind, InputEventKind::Navigation(_)) {
            return None;
        }
        Some(kind)
    }

    fn convert_mouse(&mut self, event: CrosstermMouseEvent) -> Option<InputEventKind> {
        let position = Point::new(event.column as f32, event.row as f32);
        let modifiers = Self::convert_modifiers(event.modifiers);
        let (action, button, scroll_delta) = match event.kind {
            MouseEventKind::Down(btn) => {
                let button = Self::convert_button(btn);
                self.pressed |= button.as_buttons();
                (PointerAction::Down, Some(button), 0.0)
            }
            MouseEventKind::Up(btn) => {
                let button = Self::convert_button(btn);
                self.pressed &= !button.as_buttons();
                (PointerAction::Up, Some(button), 0.0)
            }
            MouseEventKind::Drag(_) | MouseEventKind::Moved => (PointerAction::Move, None, 0.0),
            MouseEventKind::ScrollUp => (PointerAction::Scroll, None, -1.0),
            MouseEventKind::ScrollDown => (PointerAction::Scroll, None, 1.0),
            MouseEventKind::ScrollLeft | MouseEventKind::ScrollRight => return None,
        };
        Some(InputEventKind::Pointer(PointerEvent {
            pointer_id: pointer_id::MOUSE,
            action,
            button,
            position,
            scroll_delta,
            modifiers,
            pressed_buttons: self.pressed,
        }))
    }

    fn convert_button(button: CrosstermMouseButton) -> PointerButton {
        match button {
            CrosstermMouseButton::Left => PointerButton::Primary,
            CrosstermMouseButton::Right => PointerButton::Secondary,
            CrosstermMouseButton::Middle => PointerButton::Middle,
        }
    }
}

impl Default for CrosstermInput {
    fn default() -> Self {
        Self::new()
    }
}

impl PolledInputSource for CrosstermInput {
    fn poll_events(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        loop {
            match poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    warn!("input poll failed: {err}");
                    break;
                }
            }
            let event = match read() {
                Ok(event) => event,
                Err(err) => {
                    warn!("input read failed: {err}");
                    break;
                }
            };
            let kind = match event {
                CrosstermEvent::Key(key) => self.convert_key(key),
                CrosstermEvent::Mouse(mouse) => self.convert_mouse(mouse),
                _ => None,
            };
            if let Some(kind) = kind {
                events.push(InputEvent { timestamp_ms: self.timestamp_ms(), kind });
            }
        }
        events
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_queue_is_fifo() {
        let mut queue = EventQueue::new();
        for i in 0..3 {
            queue.enqueue(InputEvent {
                timestamp_ms: i,
                kind: InputEventKind::Text(i.to_string()),
            });
        }
        let drained = queue.drain();
        let stamps: Vec<_> = drained.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_input_source_drains_installed_adapter() {
        struct OneShot(bool);
        impl PolledInputSource for OneShot {
            fn poll_events(&mut self) -> Vec<InputEvent> {
                if self.0 {
                    return Vec::new();
                }
                self.0 = true;
                vec![InputEvent {
                    timestamp_ms: 7,
                    kind: InputEventKind::Command("copy".into()),
                }]
            }
        }

        let mut source = InputSource::Polled(Box::new(OneShot(false)));
        assert_eq!(source.drain().len(), 1);
        assert!(source.drain().is_empty());
        assert!(source.queue_mut().is_none());

        let mut source = InputSource::Queue(EventQueue::new());
        source.queue_mut().unwrap().enqueue(InputEvent {
            timestamp_ms: 1,
            kind: InputEventKind::Text("x".into()),
        });
        assert_eq!(source.drain().len(), 1);
    }

    #[test]
    fn test_tab_maps_to_navigation() {
        let input = CrosstermInput::new();
        let kind = input
            .convert_key(CrosstermKeyEvent::new(KeyCode::Tab, KeyModifiers::NONE))
            .unwrap();
        assert_eq!(kind, InputEventKind::Navigation(NavigationDirection::Next));
        let kind = input
            .convert_key(CrosstermKeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT))
            .unwrap();
        assert_eq!(kind, InputEventKind::Navigation(NavigationDirection::Previous));
    }

    #[test]
    fn test_mouse_down_up_tracks_pressed_buttons() {
        let mut input = CrosstermInput::new();
        let down = input
            .convert_mouse(CrosstermMouseEvent {
                kind: MouseEventKind::Down(CrosstermMouseButton::Left),
                column: 3,
                row: 4,
                modifiers: KeyModifiers::NONE,
            })
            .unwrap();
        let InputEventKind::Pointer(ev) = down else { panic!("not a pointer event") };
        assert_eq!(ev.action, PointerAction::Down);
        assert_eq!(ev.pressed_buttons, PointerButtons::PRIMARY);
        assert_eq!(ev.position, Point::new(3.0, 4.0));

        let up = input
            .convert_mouse(CrosstermMouseEvent {
                kind: MouseEventKind::Up(CrosstermMouseButton::Left),
                column: 3,
                row: 4,
                modifiers: KeyModifiers::NONE,
            })
            .unwrap();
        let InputEventKind::Pointer(ev) = up else { panic!("not a pointer event") };
        assert_eq!(ev.pressed_buttons, PointerButtons::empty());
    }
}
