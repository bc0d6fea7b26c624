//! Pointer capture state machine.
//!
//! Capture ownership per pointer is a (pending, committed) pair rather than
//! a single owner. Handlers running inside an event's propagation may
//! request or release capture freely; those requests only change the
//! pending owner. The commit step, [`process_pointer_capture`], runs after
//! the triggering event has fully propagated, so capture changes never
//! reorder or truncate an in-flight dispatch.
//!
//! For the mouse pointer, legacy single-pointer "mouse capture" notices are
//! synthesized alongside the generic ones, gated by a per-pointer
//! compatibility flag (default on). Each compatibility notice re-checks the
//! ownership it is about after the preceding send, because a notice handler
//! may have changed capture again re-entrantly.

use log::warn;

use crate::tree::ElementId;

/// The bounded pointer id space.
pub mod pointer_id {
    /// The primary (mouse) pointer.
    pub const MOUSE: usize = 0;
    pub const TOUCH_FIRST: usize = 1;
    pub const TOUCH_COUNT: usize = 20;
    pub const PEN_FIRST: usize = TOUCH_FIRST + TOUCH_COUNT;
    pub const PEN_COUNT: usize = 2;
    pub const COUNT: usize = PEN_FIRST + PEN_COUNT;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureNoticeKind {
    CaptureOut,
    MouseCaptureOut,
    CaptureIn,
    MouseCaptureIn,
}

/// One capture-change notification to be delivered to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureNotice {
    pub kind: CaptureNoticeKind,
    pub target: ElementId,
    pub pointer_id: usize,
}

/// Per-pointer capture ownership. One instance per panel.
pub struct PointerDispatchState {
    pending: [Option<ElementId>; pointer_id::COUNT],
    committed: [Option<ElementId>; pointer_id::COUNT],
    compat_mouse: [bool; pointer_id::COUNT],
}

impl PointerDispatchState {
    pub fn new() -> Self {
        Self {
            pending: [None; pointer_id::COUNT],
            committed: [None; pointer_id::COUNT],
            compat_mouse: [true; pointer_id::COUNT],
        }
    }

    fn check(pointer: usize) -> bool {
        if pointer >= pointer_id::COUNT {
            warn!("pointer id {pointer} out of range");
            return false;
        }
        true
    }

    /// Request capture for `owner`. Takes routing effect only at the next
    /// commit step.
    pub fn capture_pointer(&mut self, owner: ElementId, pointer: usize) {
        if Self::check(pointer) {
            self.pending[pointer] = Some(owner);
        }
    }

    /// Unconditionally clear the pending owner.
    pub fn release_pointer(&mut self, pointer: usize) {
        if Self::check(pointer) {
            self.pending[pointer] = None;
        }
    }

    /// Clear the pending owner only if it is `owner`.
    pub fn release_pointer_for(&mut self, owner: ElementId, pointer: usize) {
        if Self::check(pointer) && self.pending[pointer] == Some(owner) {
            self.pending[pointer] = None;
        }
    }

    /// Clear any pending or committed capture held by `owner`, on every
    /// pointer. Used when the owner leaves the tree.
    pub fn release_everywhere(&mut self, owner: ElementId) {
        for pointer in 0..pointer_id::COUNT {
            if self.pending[pointer] == Some(owner) {
                self.pending[pointer] = None;
            }
            if self.committed[pointer] == Some(owner) {
                self.committed[pointer] = None;
            }
        }
    }

    /// Whether `owner` holds committed capture for `pointer`.
    pub fn has_pointer_capture(&self, owner: ElementId, pointer: usize) -> bool {
        pointer < pointer_id::COUNT && self.committed[pointer] == Some(owner)
    }

    /// The committed capture owner, the one routing decisions use.
    pub fn capturing_element(&self, pointer: usize) -> Option<ElementId> {
        self.committed.get(pointer).copied().flatten()
    }

    pub fn pending_element(&self, pointer: usize) -> Option<ElementId> {
        self.pending.get(pointer).copied().flatten()
    }

    /// Gate legacy mouse capture notices for one pointer id.
    pub fn set_compat_mouse_events(&mut self, pointer: usize, enabled: bool) {
        if Self::check(pointer) {
            self.compat_mouse[pointer] = enabled;
        }
    }

    pub fn compat_mouse_events(&self, pointer: usize) -> bool {
        self.compat_mouse.get(pointer).copied().unwrap_or(false)
    }
}

impl Default for PointerDispatchState {
    fn default() -> Self {
        Self::new()
    }
}

/// The commit step. No-op when pending equals committed. Otherwise emits,
/// in order: capture-out to the old owner, (mouse pointer, compat on)
/// mouse-capture-out, capture-in to the pending owner, (mouse pointer,
/// compat on) mouse-capture-in - then commits the pending owner.
///
/// `send` gets `&mut PointerDispatchState` back so notice handlers can
/// request further capture changes re-entrantly; the pending owner is
/// re-read after each send and the compatibility notices are skipped when
/// a handler already redirected the ownership they would describe.
pub fn process_pointer_capture<F>(state: &mut PointerDispatchState, pointer: usize, mut send: F)
where
    F: FnMut(&mut PointerDispatchState, CaptureNotice),
{
    if pointer >= pointer_id::COUNT {
        warn!("pointer id {pointer} out of range");
        return;
    }
    if state.pending[pointer] == state.committed[pointer] {
        return;
    }

    if let Some(old) = state.committed[pointer] {
        send(
            state,
            CaptureNotice { kind: CaptureNoticeKind::CaptureOut, target: old, pointer_id: pointer },
        );
        if pointer == pointer_id::MOUSE
            && state.compat_mouse[pointer]
            && state.committed[pointer] == Some(old)
        {
            send(
                state,
                CaptureNotice {
                    kind: CaptureNoticeKind::MouseCaptureOut,
                    target: old,
                    pointer_id: pointer,
                },
            );
        }
    }

    // Re-read: a capture-out handler may have changed the pending owner.
    if let Some(new) = state.pending[pointer] {
        send(
            state,
            CaptureNotice { kind: CaptureNoticeKind::CaptureIn, target: new, pointer_id: pointer },
        );
        if pointer == pointer_id::MOUSE
            && state.compat_mouse[pointer]
            && state.pending[pointer] == Some(new)
        {
            send(
                state,
                CaptureNotice {
                    kind: CaptureNoticeKind::MouseCaptureIn,
                    target: new,
                    pointer_id: pointer,
                },
            );
        }
    }

    state.committed[pointer] = state.pending[pointer];
}

// =============================================================================
// TESTS
// =============================================================================
