//! State reconciliation: applies entity-state batches to the document.
//!
//! One batch at a time: for every changed entity the loop records the new
//! state, restores each bound element to the baseline captured at index
//! build, and re-runs the binding rules' `state_action` against the fresh
//! state. Restoring first makes a pass idempotent; rule effects never
//! compound across batches.
//!
//! Nothing escapes the loop. Dispatch and document failures are logged
//! with their rule and entity and the pass continues with the next
//! binding.

use std::collections::BTreeSet;

use floorbind_types::{EntityId, StateSnapshot};
use tracing::{debug, warn};

use crate::assets::AssetLoader;
use crate::dispatch::{ActionContext, ActionDispatcher};
use crate::document::GraphicDocument;
use crate::index::{ElementIndex, RuleIdx, SvgElementInfo};

/// Drives state batches through the element index.
#[derive(Debug)]
pub struct Reconciler {
    index: ElementIndex,
}

impl Reconciler {
    /// Wrap a freshly built index.
    pub const fn new(index: ElementIndex) -> Self {
        Self { index }
    }

    /// Borrow the index.
    pub const fn index(&self) -> &ElementIndex {
        &self.index
    }

    /// Mutably borrow the index.
    pub const fn index_mut(&mut self) -> &mut ElementIndex {
        &mut self.index
    }

    /// Swap in a new index, discarding all previous runtime records. Used
    /// on reconfiguration, after the document has been reloaded.
    pub fn replace_index(&mut self, index: ElementIndex) {
        self.index = index;
    }

    /// Apply one batch of entity changes.
    ///
    /// Entities no rule references are ignored. Each (rule, entity) pair
    /// fires its `state_action` at most once per batch. Returns the number
    /// of bindings that ran.
    pub fn update_states<A: AssetLoader + 'static>(
        &mut self,
        document: &mut GraphicDocument,
        dispatcher: &ActionDispatcher<A>,
        changed: &BTreeSet<EntityId>,
        snapshot: &StateSnapshot,
    ) -> usize {
        let mut fired: BTreeSet<(RuleIdx, EntityId)> = BTreeSet::new();
        let mut applied = 0_usize;

        for entity_id in changed {
            if !self.index.tracks_entity(entity_id) {
                debug!(entity = %entity_id, "state change for untracked entity, ignoring");
                continue;
            }
            let state = snapshot.get(entity_id).cloned();
            let rules: Vec<RuleIdx> = self.index.entity_mut(entity_id).map_or_else(Vec::new, |info| {
                info.last_state.clone_from(&state);
                info.rules.clone()
            });

            for rule_idx in rules {
                if !fired.insert((rule_idx, entity_id.clone())) {
                    continue;
                }
                let Some(rule) = self.index.rule(rule_idx) else {
                    continue;
                };
                let actions = rule.rule.state_action.resolve();
                let hover_info_filter = rule.rule.hover_info_filter.clone();
                let elements: Vec<SvgElementInfo> =
                    rule.elements_for(entity_id).cloned().collect();

                // Baseline first, then reapply against the new state.
                for element in &elements {
                    if let Err(error) = document.restore(element.handle, &element.baseline) {
                        warn!(
                            element = %element.element_id,
                            error = %error,
                            "baseline restore failed, skipping element"
                        );
                    }
                }
                if actions.is_empty() {
                    continue;
                }

                let context = ActionContext {
                    entity_id: Some(entity_id),
                    state: state.as_ref(),
                    elements: &elements,
                    rule: Some(rule_idx),
                    hover_info_filter: &hover_info_filter,
                };
                let loads = dispatcher.execute_all(document, &actions, &context);
                for load in loads {
                    let target = load.rule.unwrap_or(rule_idx);
                    if let Some(rule) = self.index.rule_mut(target) {
                        // Replacing the handle aborts a superseded load.
                        rule.image_load = Some(load.handle);
                    }
                }
                applied = applied.saturating_add(1);
            }
        }
        debug!(changed = changed.len(), applied, "state batch reconciled");
        applied
    }
}
