//! Taffy-backed layout engine.
//!
//! Converts resolved styles to Taffy styles, mirrors the element hierarchy
//! into a fresh `TaffyTree`, runs flexbox layout against the viewport and
//! reads back parent-relative rects. Invisible subtrees are excluded
//! entirely so they occupy no space.

use std::collections::HashMap;

use taffy::{
    AvailableSpace, Dimension as TaffyDimension, Display,
    FlexDirection as TaffyFlexDirection, LengthPercentage, NodeId,
    Overflow as TaffyOverflow, Size as TaffySize, Style, TaffyTree,
};

use log::warn;

use crate::geometry::{Rect, Size};
use crate::tree::{Dimension, ElementId, FlexDirection, Overflow, StyleInput, VisualTree};
use crate::update::phases::LayoutEngine;

// =============================================================================
// STYLE CONVERSION
// =============================================================================

fn to_taffy_dimension(dim: Dimension) -> TaffyDimension {
    match dim {
        Dimension::Auto => TaffyDimension::Auto,
        Dimension::Points(n) => TaffyDimension::Length(n),
        Dimension::Percent(p) => TaffyDimension::Percent(p / 100.0),
    }
}

fn to_taffy_flex_direction(dir: FlexDirection) -> TaffyFlexDirection {
    match dir {
        FlexDirection::Column => TaffyFlexDirection::Column,
        FlexDirection::Row => TaffyFlexDirection::Row,
    }
}

fn to_taffy_overflow(overflow: Overflow) -> TaffyOverflow {
    match overflow {
        Overflow::Visible => TaffyOverflow::Visible,
        Overflow::Hidden => TaffyOverflow::Clip,
    }
}

fn build_style(input: &StyleInput) -> Style {
    Style {
        display: Display::Flex,
        flex_direction: to_taffy_flex_direction(input.flex_direction),
        flex_grow: input.flex_grow,
        flex_shrink: input.flex_shrink,
        size: TaffySize {
            width: to_taffy_dimension(input.width),
            height: to_taffy_dimension(input.height),
        },
        border: taffy::Rect {
            top: LengthPercentage::Length(input.border_width),
            right: LengthPercentage::Length(input.border_width),
            bottom: LengthPercentage::Length(input.border_width),
            left: LengthPercentage::Length(input.border_width),
        },
        overflow: taffy::Point {
            x: to_taffy_overflow(input.overflow),
            y: to_taffy_overflow(input.overflow),
        },
        ..Default::default()
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The default [`LayoutEngine`]. Stateless between passes: each compute
/// mirrors the current tree from scratch, which keeps it trivially correct
/// under arbitrary hierarchy mutations.
#[derive(Default)]
pub struct TaffyLayoutEngine;

impl TaffyLayoutEngine {
    pub fn new() -> Self {
        Self
    }

    fn mirror(
        &self,
        tree: &VisualTree,
        id: ElementId,
        taffy: &mut TaffyTree,
        mapping: &mut HashMap<NodeId, ElementId>,
    ) -> Option<NodeId> {
        if !tree.is_visible(id) {
            return None;
        }
        let node = match taffy.new_leaf(build_style(&tree.resolved_style(id))) {
            Ok(node) => node,
            Err(err) => {
                warn!("taffy node creation failed: {err:?}");
                return None;
            }
        };
        mapping.insert(node, id);
        for &child in tree.children(id) {
            if let Some(child_node) = self.mirror(tree, child, taffy, mapping) {
                if let Err(err) = taffy.add_child(node, child_node) {
                    warn!("taffy add_child failed: {err:?}");
                }
            }
        }
        Some(node)
    }
}

impl LayoutEngine for TaffyLayoutEngine {
    fn compute_layout(&mut self, tree: &VisualTree, viewport: Size) -> Vec<(ElementId, Rect)> {
        let mut taffy: TaffyTree = TaffyTree::new();
        let mut mapping: HashMap<NodeId, ElementId> = HashMap::new();

        let Some(root_node) = self.mirror(tree, tree.root(), &mut taffy, &mut mapping) else {
            return Vec::new();
        };

        let available = TaffySize {
            width: AvailableSpace::Definite(viewport.width),
            height: AvailableSpace::Definite(viewport.height),
        };
        if let Err(err) = taffy.compute_layout(root_node, available) {
            warn!("taffy layout failed: {err:?}");
            return Vec::new();
        }

        let mut results: Vec<(ElementId, Rect)> = mapping
            .iter()
            .filter_map(|(&node, &id)| {
                taffy.layout(node).ok().map(|layout| {
                    (
                        id,
                        Rect::new(
                            layout.location.x,
                            layout.location.y,
                            layout.size.width,
                            layout.size.height,
                        ),
                    )
                })
            })
            .collect();
        // Stable output order for deterministic deferred notifications.
        results.sort_by_key(|(id, _)| id.index());
        results
    }
}

// =============================================================================
// TESTS
// =============================================================================
