//! Canonical input event types.
//!
//! Everything an input source adapter produces is normalized into
//! [`InputEvent`]: a timestamp plus one [`InputEventKind`]. Routing splits
//! on [`InputEventKind::is_focus_based`] - focus-based events go to the
//! focused element, position-based events are hit-tested.

use bitflags::bitflags;

use crate::geometry::Point;

bitflags! {
    /// Canonical modifier set. Adapters map their platform's modifier mask
    /// into this.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const COMMAND = 1 << 3;
        const CAPS_LOCK = 1 << 4;
        const NUMERIC = 1 << 5;
        const FUNCTION_KEY = 1 << 6;
    }
}

bitflags! {
    /// Buttons currently held on a pointer device.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PointerButtons: u8 {
        const PRIMARY = 1 << 0;
        const SECONDARY = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

impl PointerButton {
    pub fn as_buttons(self) -> PointerButtons {
        match self {
            PointerButton::Primary => PointerButtons::PRIMARY,
            PointerButton::Secondary => PointerButtons::SECONDARY,
            PointerButton::Middle => PointerButtons::MIDDLE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    Down,
    Up,
    Move,
    Cancel,
    Scroll,
}

/// A pointer event in global coordinates, before panel mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: usize,
    pub action: PointerAction,
    /// The button that changed, for Down/Up.
    pub button: Option<PointerButton>,
    pub position: Point,
    pub scroll_delta: f32,
    pub modifiers: Modifiers,
    /// Buttons held *after* this event.
    pub pressed_buttons: PointerButtons,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub state: KeyState,
    pub modifiers: Modifiers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDirection {
    Next,
    Previous,
    Up,
    Down,
    Left,
    Right,
    Submit,
    Cancel,
}

/// One normalized input event.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEvent {
    pub timestamp_ms: u64,
    pub kind: InputEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEventKind {
    Pointer(PointerEvent),
    Key(KeyEvent),
    Navigation(NavigationDirection),
    /// Committed text input.
    Text(String),
    /// In-progress IME composition string.
    ImeComposition(String),
    /// Host/application command (copy, paste, undo...).
    Command(String),
}

impl InputEventKind {
    /// Focus-based events route to the focused element; everything else is
    /// position-based.
    pub fn is_focus_based(&self) -> bool {
        !matches!(self, InputEventKind::Pointer(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_is_position_based() {
        let kind = InputEventKind::Pointer(PointerEvent {
            pointer_id: 0,
            action: PointerAction::Move,
            button: None,
            position: Point::ZERO,
            scroll_delta: 0.0,
            modifiers: Modifiers::empty(),
            pressed_buttons: PointerButtons::empty(),
        });
        assert!(!kind.is_focus_based());
    }

    #[test]
    fn test_non_pointer_kinds_are_focus_based() {
        for kind in [
            InputEventKind::Key(KeyEvent {
                key: "a".into(),
                state: KeyState::Down,
                modifiers: Modifiers::empty(),
            }),
            InputEventKind::Navigation(NavigationDirection::Next),
            InputEventKind::Text("a".into()),
            InputEventKind::ImeComposition("あ".into()),
            InputEventKind::Command("copy".into()),
        ] {
            assert!(kind.is_focus_based(), "{kind:?}");
        }
    }
}
