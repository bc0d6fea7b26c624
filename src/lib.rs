//! # arbor-ui
//!
//! A retained-mode UI visual tree that stays consistent across mutation
//! through lazily-propagated dirty flags instead of eager recomputation.
//!
//! ## Architecture
//!
//! Every observable mutation emits a version-change notification. The
//! hierarchy flags updater turns notifications into dirty flags on the
//! affected region of the tree (downward with short-circuiting, upward for
//! bounding boxes); the phased updater then runs a fixed pipeline once per
//! tick, each phase consuming its own dirty state:
//!
//! ```text
//! mutation → version change → dirty flags → ViewData → Bindings
//!          → DataBinding → Animation → Styles → Layout → TransformClip
//!          → Repaint
//! ```
//!
//! Input arrives through an event system that batches raw events per tick
//! and routes them by focus (keyboard, navigation, text, IME, commands) or
//! by position (pointer events, with per-pointer capture and soft panel
//! capture between down and up).
//!
//! ## Modules
//!
//! - [`tree`] - Element storage, dirty flags, the hierarchy flags updater
//! - [`update`] - The phased updater and the built-in phases
//! - [`events`] - Input types, pointer capture, input sources, routing
//! - [`panel`] - Panels, focus, handler registry, the runtime context
//! - [`geometry`] - Points, rects, transforms, 3D bounds

pub mod error;
pub mod events;
pub mod geometry;
pub mod panel;
pub mod tree;
pub mod update;

pub use error::Error;

pub use tree::{
    required_dirty_flags, Dimension, DirtyFlags, ElementId, EventCategory, FlexDirection,
    HierarchyFlagsUpdater, Overflow, PickingMode, StyleInput, VersionChange, VisualTree,
    WorldBoundsStore,
};

pub use update::{
    phases::{
        default_phases, Animation, AnimationPhase, BindingSystem, BindingsPhase,
        DirectStyleResolver, LayoutEngine, LayoutPhase, NullRenderer, RecordingRenderer,
        Renderer, RepaintPhase, StyleResolver, StylesPhase, ViewDataPhase, ViewDataStore,
    },
    taffy_layout::TaffyLayoutEngine,
    PhaseId, UpdateContext, UpdatePhase, VisualTreeUpdater,
};

pub use events::{
    pointer_id, process_pointer_capture, CaptureNotice, CaptureNoticeKind, CrosstermInput,
    DefaultEventSystem, EventQueue, InputEvent, InputEventKind, InputSource, KeyEvent, KeyState,
    Modifiers, NavigationDirection, PointerAction, PointerButton, PointerButtons,
    PointerDispatchState, PointerEvent, PolledInputSource,
};

pub use panel::{
    EventCtx, EventHandler, HandlerId, Panel, PanelId, PanelKind, PanelNotice, PointerOverState,
    RuntimeContext,
};

pub use geometry::{Bounds3d, Point, Rect, Size, Transform};
