//! Interaction dispatch table.
//!
//! The core never installs event listeners; an external input adapter
//! reports pointer interactions and this module maps them to the actions a
//! rule has configured. The mapping is a pure function over the rule, so
//! the adapter stays trivial.

use floorbind_types::{ActionConfig, ElementId, EntityId, RuleConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::index::RuleIdx;

/// Pointer interaction kinds an input adapter can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InteractionKind {
    /// A single tap or click.
    Tap,
    /// A press held past the hold threshold.
    Hold,
    /// Two taps within the double-tap window.
    DoubleTap,
    /// Pointer entering the element.
    Hover,
}

/// The actions a rule configures for an interaction kind, resolved to the
/// canonical ordered list.
pub fn actions_for(kind: InteractionKind, rule: &RuleConfig) -> Vec<ActionConfig> {
    match kind {
        InteractionKind::Tap => rule.tap_action.resolve(),
        InteractionKind::Hold => rule.hold_action.resolve(),
        InteractionKind::DoubleTap => rule.double_tap_action.resolve(),
        InteractionKind::Hover => rule.hover_action.resolve(),
    }
}

/// Everything known about one reported interaction, handed to the
/// dispatcher by the controller.
#[derive(Debug, Clone)]
pub struct ClickContext {
    /// The controller instance that owns the interaction.
    pub instance: Uuid,
    /// The kind of interaction the adapter reported.
    pub kind: InteractionKind,
    /// The element the interaction landed on.
    pub element_id: ElementId,
    /// The matched rule.
    pub rule: RuleIdx,
    /// The entity the rule binds for this element, when it binds one.
    pub entity_id: Option<EntityId>,
    /// The resolved actions to execute, in order.
    pub actions: Vec<ActionConfig>,
}
