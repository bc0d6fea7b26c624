//! Input events, pointer capture and routing.

pub mod capture;
pub mod source;
pub mod system;
pub mod types;

pub use capture::{
    pointer_id, process_pointer_capture, CaptureNotice, CaptureNoticeKind, PointerDispatchState,
};
pub use source::{CrosstermInput, EventQueue, InputSource, PolledInputSource};
pub use system::DefaultEventSystem;
pub use types::{
    InputEvent, InputEventKind, KeyEvent, KeyState, Modifiers, NavigationDirection,
    PointerAction, PointerButton, PointerButtons, PointerEvent,
};
