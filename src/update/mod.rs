//! Phased Tree Updater
//!
//! The per-tick update pipeline. Each phase is an independent
//! [`UpdatePhase`] implementation owning its own dirty state; the
//! [`VisualTreeUpdater`] holds them in a fixed array and runs them in a
//! fixed, load-bearing order:
//!
//! ```text
//! ViewData → Bindings → DataBinding → Animation → Styles → Layout
//!          → TransformClip → Repaint
//! ```
//!
//! Styles must run before Layout (style determines layout inputs), Layout
//! before TransformClip (the clip depends on the resolved box) and
//! TransformClip before Repaint (repaint needs final world geometry).
//!
//! Version-change notifications fan out to every phase; each phase decides
//! for itself what to mark dirty. A phase's `update` may *defer* further
//! notifications through [`UpdateContext::defer`]; the updater fans those
//! out after that phase returns, which is how layout results re-enter the
//! invalidation system without re-entrant dispatch.

pub mod phases;
pub mod taffy_layout;

use crate::geometry::Size;
use crate::panel::{PanelKind, PointerOverState};
use crate::tree::{ElementId, VersionChange, VisualTree};

// =============================================================================
// PHASE IDS
// =============================================================================

/// Identifies one stage of the update pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseId {
    ViewData,
    Bindings,
    DataBinding,
    Animation,
    Styles,
    Layout,
    TransformClip,
    Repaint,
}

impl PhaseId {
    pub const COUNT: usize = 8;

    /// All phases in execution order.
    pub const ALL: [PhaseId; Self::COUNT] = [
        PhaseId::ViewData,
        PhaseId::Bindings,
        PhaseId::DataBinding,
        PhaseId::Animation,
        PhaseId::Styles,
        PhaseId::Layout,
        PhaseId::TransformClip,
        PhaseId::Repaint,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

// =============================================================================
// UPDATE CONTEXT
// =============================================================================

/// Everything a phase sees while running.
pub struct UpdateContext<'a> {
    pub tree: &'a mut VisualTree,
    pub panel_kind: PanelKind,
    pub pointers: &'a mut PointerOverState,
    /// Available space handed to the layout engine.
    pub viewport: Size,
    deferred: Vec<(ElementId, VersionChange)>,
}

impl<'a> UpdateContext<'a> {
    pub fn new(
        tree: &'a mut VisualTree,
        panel_kind: PanelKind,
        pointers: &'a mut PointerOverState,
        viewport: Size,
    ) -> Self {
        Self { tree, panel_kind, pointers, viewport, deferred: Vec::new() }
    }

    /// Queue a version-change notification to be fanned out after the
    /// current phase's `update` returns.
    pub fn defer(&mut self, target: ElementId, change: VersionChange) {
        self.deferred.push((target, change));
    }

    #[cfg(test)]
    pub(crate) fn take_deferred_for_test(&mut self) -> Vec<(ElementId, VersionChange)> {
        std::mem::take(&mut self.deferred)
    }
}

// =============================================================================
// PHASE TRAIT
// =============================================================================

/// One stage of the pipeline. Resources held by a phase are released by its
/// `Drop` impl when the phase is replaced or the updater is dropped.
pub trait UpdatePhase {
    /// React to a single mutation. Must only touch this phase's own dirty
    /// state (and, for the hierarchy phase, the tree's dirty flags).
    fn on_version_changed(&mut self, tree: &mut VisualTree, target: ElementId, change: VersionChange);

    /// Do this phase's share of the per-tick work, clearing the dirty state
    /// it consumed.
    fn update(&mut self, ctx: &mut UpdateContext<'_>);
}

/// Placeholder installed momentarily while a phase is being replaced.
struct NoopPhase;

impl UpdatePhase for NoopPhase {
    fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, _: VersionChange) {}
    fn update(&mut self, _: &mut UpdateContext<'_>) {}
}

// =============================================================================
// UPDATER
// =============================================================================

/// Owns the fixed phase array and drives it once per tick.
pub struct VisualTreeUpdater {
    phases: [Box<dyn UpdatePhase>; PhaseId::COUNT],
    ticks: [u64; PhaseId::COUNT],
    /// Editor-only pre-phase, run before the pipeline in `update_all` and
    /// notified first on version changes.
    pre_phase: Option<Box<dyn UpdatePhase>>,
}

impl VisualTreeUpdater {
    pub fn new(phases: [Box<dyn UpdatePhase>; PhaseId::COUNT]) -> Self {
        Self { phases, ticks: [0; PhaseId::COUNT], pre_phase: None }
    }

    /// Install the editor pre-phase. Only runs for editor panels.
    pub fn set_pre_phase(&mut self, phase: Box<dyn UpdatePhase>) {
        self.pre_phase = Some(phase);
    }

    /// How many times a phase has run (both full and single-phase ticks).
    pub fn phase_tick(&self, phase: PhaseId) -> u64 {
        self.ticks[phase.index()]
    }

    /// Fan a notification out: pre-phase first, then every phase in order.
    pub fn on_version_changed(
        &mut self,
        tree: &mut VisualTree,
        target: ElementId,
        change: VersionChange,
    ) {
        if let Some(pre) = self.pre_phase.as_mut() {
            pre.on_version_changed(tree, target, change);
        }
        for phase in self.phases.iter_mut() {
            phase.on_version_changed(tree, target, change);
        }
    }

    /// Run every phase once, in fixed order.
    ///
    /// Fault policy: fail-fast. A panicking phase propagates out of this
    /// call and the remaining phases are skipped for this tick; the phase
    /// array itself is untouched mid-run, so the next tick runs normally.
    pub fn update_all(
        &mut self,
        tree: &mut VisualTree,
        panel_kind: PanelKind,
        pointers: &mut PointerOverState,
        viewport: Size,
    ) {
        if panel_kind == PanelKind::Editor && self.pre_phase.is_some() {
            let deferred = {
                let mut ctx = UpdateContext::new(tree, panel_kind, pointers, viewport);
                if let Some(pre) = self.pre_phase.as_mut() {
                    pre.update(&mut ctx);
                }
                ctx.deferred
            };
            self.fan_out(tree, deferred);
        }
        for phase in PhaseId::ALL {
            let deferred = self.run_phase(phase, tree, panel_kind, pointers, viewport);
            // The hierarchy phase can request a style re-application when
            // the element under a pointer changed; resolving it now lets
            // the first hovered frame repaint with the right style.
            if phase == PhaseId::TransformClip
                && deferred.intersects(VersionChange::STYLE_SHEET | VersionChange::STYLES)
            {
                self.run_phase(PhaseId::Styles, tree, panel_kind, pointers, viewport);
            }
        }
    }

    /// Run exactly one phase out of order. Used when a caller needs one
    /// derived value (say, a fresh layout before reading a computed size)
    /// without paying for the rest of the pipeline.
    pub fn update_single_phase(
        &mut self,
        phase: PhaseId,
        tree: &mut VisualTree,
        panel_kind: PanelKind,
        pointers: &mut PointerOverState,
        viewport: Size,
    ) {
        self.run_phase(phase, tree, panel_kind, pointers, viewport);
    }

    /// Returns the union of the change bits the phase deferred, so
    /// `update_all` can tell when an earlier phase must run again.
    fn run_phase(
        &mut self,
        phase: PhaseId,
        tree: &mut VisualTree,
        panel_kind: PanelKind,
        pointers: &mut PointerOverState,
        viewport: Size,
    ) -> VersionChange {
        let idx = phase.index();
        self.ticks[idx] += 1;
        let deferred = {
            let mut ctx = UpdateContext::new(tree, panel_kind, pointers, viewport);
            self.phases[idx].update(&mut ctx);
            ctx.deferred
        };
        self.fan_out(tree, deferred)
    }

    fn fan_out(
        &mut self,
        tree: &mut VisualTree,
        deferred: Vec<(ElementId, VersionChange)>,
    ) -> VersionChange {
        let mut seen = VersionChange::empty();
        for (target, change) in deferred {
            seen |= change;
            self.on_version_changed(tree, target, change);
        }
        seen
    }

    /// Swap the implementation of one phase at runtime. The outgoing
    /// implementation is dropped (releasing its resources) before the new
    /// one is installed.
    pub fn replace_phase(&mut self, phase: PhaseId, new_phase: Box<dyn UpdatePhase>) {
        let idx = phase.index();
        let outgoing = std::mem::replace(&mut self.phases[idx], Box::new(NoopPhase));
        drop(outgoing);
        self.phases[idx] = new_phase;
    }

    /// Borrow a phase implementation, for configuration.
    pub fn phase_mut(&mut self, phase: PhaseId) -> &mut dyn UpdatePhase {
        self.phases[phase.index()].as_mut()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct ProbePhase {
        name: &'static str,
        trace: Rc<RefCell<Vec<&'static str>>>,
        notified: Rc<RefCell<Vec<&'static str>>>,
    }

    impl UpdatePhase for ProbePhase {
        fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, _: VersionChange) {
            self.notified.borrow_mut().push(self.name);
        }
        fn update(&mut self, _: &mut UpdateContext<'_>) {
            self.trace.borrow_mut().push(self.name);
        }
    }

    struct DropProbe {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl UpdatePhase for DropProbe {
        fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, _: VersionChange) {}
        fn update(&mut self, _: &mut UpdateContext<'_>) {}
    }

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.log.borrow_mut().push("dropped");
        }
    }

    fn probe_updater(
        trace: &Rc<RefCell<Vec<&'static str>>>,
        notified: &Rc<RefCell<Vec<&'static str>>>,
    ) -> VisualTreeUpdater {
        let names = [
            "view_data",
            "bindings",
            "data_binding",
            "animation",
            "styles",
            "layout",
            "transform_clip",
            "repaint",
        ];
        VisualTreeUpdater::new(names.map(|name| {
            Box::new(ProbePhase {
                name,
                trace: Rc::clone(trace),
                notified: Rc::clone(notified),
            }) as Box<dyn UpdatePhase>
        }))
    }

    #[test]
    fn test_update_all_runs_phases_in_fixed_order() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);
        let mut tree = VisualTree::new();
        let mut pointers = PointerOverState::new();

        updater.update_all(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        assert_eq!(
            *trace.borrow(),
            vec![
                "view_data",
                "bindings",
                "data_binding",
                "animation",
                "styles",
                "layout",
                "transform_clip",
                "repaint",
            ]
        );
        assert_eq!(updater.phase_tick(PhaseId::Styles), 1);
    }

    #[test]
    fn test_notification_fans_out_to_all_phases_in_order() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);
        let mut tree = VisualTree::new();
        let root = tree.root();

        updater.on_version_changed(&mut tree, root, VersionChange::TRANSFORM);
        assert_eq!(notified.borrow().len(), PhaseId::COUNT);
        assert_eq!(notified.borrow()[0], "view_data");
        assert_eq!(notified.borrow()[7], "repaint");
    }

    #[test]
    fn test_update_single_phase_runs_only_that_phase() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);
        let mut tree = VisualTree::new();
        let mut pointers = PointerOverState::new();

        updater.update_single_phase(
            PhaseId::Layout,
            &mut tree,
            PanelKind::Player,
            &mut pointers,
            Size::ZERO,
        );
        assert_eq!(*trace.borrow(), vec!["layout"]);
        assert_eq!(updater.phase_tick(PhaseId::Layout), 1);
        assert_eq!(updater.phase_tick(PhaseId::Styles), 0);
    }

    #[test]
    fn test_hover_restyle_resolves_in_the_same_tick() {
        struct RestyleRequestingPhase {
            trace: Rc<RefCell<Vec<&'static str>>>,
            requested: bool,
        }
        impl UpdatePhase for RestyleRequestingPhase {
            fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, _: VersionChange) {}
            fn update(&mut self, ctx: &mut UpdateContext<'_>) {
                self.trace.borrow_mut().push("transform_clip");
                if !self.requested {
                    self.requested = true;
                    let root = ctx.tree.root();
                    ctx.defer(root, VersionChange::STYLE_SHEET);
                }
            }
        }

        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);
        updater.replace_phase(
            PhaseId::TransformClip,
            Box::new(RestyleRequestingPhase { trace: Rc::clone(&trace), requested: false }),
        );

        let mut tree = VisualTree::new();
        let mut pointers = PointerOverState::new();
        updater.update_all(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);

        // Styles runs a second time after the geometry phase asked for a
        // restyle, and still before Repaint closes the tick.
        assert_eq!(
            *trace.borrow(),
            vec![
                "view_data",
                "bindings",
                "data_binding",
                "animation",
                "styles",
                "layout",
                "transform_clip",
                "styles",
                "repaint",
            ]
        );
        assert_eq!(updater.phase_tick(PhaseId::Styles), 2);

        // A clean tick runs each phase exactly once.
        trace.borrow_mut().clear();
        updater.update_all(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        assert_eq!(trace.borrow().len(), PhaseId::COUNT);
    }

    #[test]
    fn test_replace_phase_drops_outgoing_first() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);

        let log = Rc::new(RefCell::new(Vec::new()));
        updater.replace_phase(PhaseId::Repaint, Box::new(DropProbe { log: Rc::clone(&log) }));
        assert!(log.borrow().is_empty());
        updater.replace_phase(
            PhaseId::Repaint,
            Box::new(ProbePhase {
                name: "repaint2",
                trace: Rc::clone(&trace),
                notified: Rc::clone(&notified),
            }),
        );
        assert_eq!(*log.borrow(), vec!["dropped"]);
    }

    #[test]
    fn test_pre_phase_runs_only_for_editor_panels() {
        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);
        updater.set_pre_phase(Box::new(ProbePhase {
            name: "pre",
            trace: Rc::clone(&trace),
            notified: Rc::clone(&notified),
        }));
        let mut tree = VisualTree::new();
        let mut pointers = PointerOverState::new();

        updater.update_all(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        assert!(!trace.borrow().contains(&"pre"));

        trace.borrow_mut().clear();
        updater.update_all(&mut tree, PanelKind::Editor, &mut pointers, Size::ZERO);
        assert_eq!(trace.borrow()[0], "pre");
    }

    #[test]
    fn test_panicking_phase_leaves_array_usable() {
        struct PanickingPhase;
        impl UpdatePhase for PanickingPhase {
            fn on_version_changed(&mut self, _: &mut VisualTree, _: ElementId, _: VersionChange) {}
            fn update(&mut self, _: &mut UpdateContext<'_>) {
                panic!("phase fault");
            }
        }

        let trace = Rc::new(RefCell::new(Vec::new()));
        let notified = Rc::new(RefCell::new(Vec::new()));
        let mut updater = probe_updater(&trace, &notified);
        updater.replace_phase(PhaseId::Styles, Box::new(PanickingPhase));

        let mut tree = VisualTree::new();
        let mut pointers = PointerOverState::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            updater.update_all(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        }));
        assert!(result.is_err());
        // Phases after the faulting one were skipped this tick.
        assert!(!trace.borrow().contains(&"layout"));

        // Fail-fast, not fail-forever: the next tick runs the surviving
        // phases again once the faulting phase is replaced.
        updater.replace_phase(
            PhaseId::Styles,
            Box::new(ProbePhase {
                name: "styles",
                trace: Rc::clone(&trace),
                notified: Rc::clone(&notified),
            }),
        );
        trace.borrow_mut().clear();
        updater.update_all(&mut tree, PanelKind::Player, &mut pointers, Size::ZERO);
        assert_eq!(trace.borrow().len(), PhaseId::COUNT);
    }
}
