//! Element index: the runtime cross-reference built from one configuration
//! load against one loaded graphic.
//!
//! The index owns every runtime record: per-rule [`RuleInfo`] with resolved
//! element bindings, per-entity [`EntityInfo`] with the last known state and
//! the rules that reference the entity, and the element-to-rule map used by
//! interaction dispatch. Re-indexing on reconfiguration discards everything
//! and rebuilds from scratch; there is no incremental rule-set diffing.
//!
//! A rule that references an element id absent from the graphic is a
//! configuration warning, not a fatal error: that binding is skipped and
//! the remainder of the rule set is processed.

use std::collections::BTreeMap;

use floorbind_types::{ElementId, EntityId, EntityState, RuleConfig};
use tracing::{debug, warn};

use crate::assets::ImageLoadHandle;
use crate::document::{GraphicDocument, NodeBaseline, NodeHandle, Rect};

/// Index of a rule within the element index, stable for one configuration
/// load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleIdx(usize);

/// Immutable snapshot of one graphic node's pre-rule baseline.
///
/// Captured at index-build time, before any rule has touched the node.
/// Restoring the baseline before re-applying a state-driven style keeps
/// rule application idempotent across reconciliation passes.
#[derive(Debug, Clone)]
pub struct SvgElementInfo {
    /// The element's stable id.
    pub element_id: ElementId,
    /// Live node handle in the graphic arena.
    pub handle: NodeHandle,
    /// Preserved original visual state.
    pub baseline: NodeBaseline,
    /// Original bounding box, when layout information was available.
    pub original_bbox: Option<Rect>,
}

impl SvgElementInfo {
    /// Capture an element's baseline from the document.
    fn capture(document: &GraphicDocument, element_id: ElementId, handle: NodeHandle) -> Self {
        Self {
            element_id,
            baseline: document.snapshot(handle).unwrap_or_default(),
            original_bbox: document.bbox(handle),
            handle,
        }
    }
}

/// Runtime counterpart of one [`RuleConfig`].
#[derive(Debug)]
pub struct RuleInfo {
    /// The rule as configured (defaults already applied).
    pub rule: RuleConfig,
    /// All elements this rule resolved to, in declaration order.
    pub elements: Vec<SvgElementInfo>,
    /// Per-entity bindings: indices into `elements`.
    pub entity_elements: BTreeMap<EntityId, Vec<usize>>,
    /// In-flight image load for rules that swap embedded images.
    pub image_load: Option<ImageLoadHandle>,
}

impl RuleInfo {
    /// The elements bound to one entity, in declaration order.
    pub fn elements_for(&self, entity_id: &EntityId) -> impl Iterator<Item = &SvgElementInfo> {
        self.entity_elements
            .get(entity_id)
            .into_iter()
            .flatten()
            .filter_map(|index| self.elements.get(*index))
    }
}

/// Per-entity runtime record.
#[derive(Debug)]
pub struct EntityInfo {
    /// The entity this record tracks.
    pub entity_id: EntityId,
    /// Last state seen by the reconciliation loop.
    pub last_state: Option<EntityState>,
    /// Rules referencing this entity, in declaration order.
    pub rules: Vec<RuleIdx>,
}

/// The element index for one (configuration, graphic) pair.
#[derive(Debug, Default)]
pub struct ElementIndex {
    rules: Vec<RuleInfo>,
    entities: BTreeMap<EntityId, EntityInfo>,
    by_element: BTreeMap<ElementId, Vec<RuleIdx>>,
}

impl ElementIndex {
    /// Build the index from a rule set against a loaded graphic.
    ///
    /// `rules` must already have configuration defaults applied.
    pub fn build(rules: &[RuleConfig], document: &GraphicDocument) -> Self {
        let mut index = Self::default();
        for rule in rules {
            index.add_rule(rule.clone(), document);
        }
        debug!(
            rules = index.rules.len(),
            entities = index.entities.len(),
            elements = index.by_element.len(),
            "element index built"
        );
        index
    }

    fn add_rule(&mut self, rule: RuleConfig, document: &GraphicDocument) {
        let rule_idx = RuleIdx(self.rules.len());

        // Targets shared by every entity of the rule: element, elements,
        // and groups expanded to their identified members. Expansion
        // happens here, at resolution time, against the loaded graphic.
        let mut shared_targets: Vec<ElementId> = Vec::new();
        if let Some(element) = &rule.element {
            shared_targets.push(element.clone());
        }
        shared_targets.extend(rule.elements.iter().cloned());
        for group in &rule.groups {
            match document.find_by_id(group) {
                Some(handle) => shared_targets.extend(document.descendant_ids(handle)),
                None => warn!(group = %group, "group element not found in graphic, skipping"),
            }
        }

        let mut info = RuleInfo {
            rule,
            elements: Vec::new(),
            entity_elements: BTreeMap::new(),
            image_load: None,
        };

        let mut resolved: BTreeMap<ElementId, usize> = BTreeMap::new();
        let mut resolve = |info: &mut RuleInfo, element_id: &ElementId| -> Option<usize> {
            if let Some(index) = resolved.get(element_id) {
                return Some(*index);
            }
            let Some(handle) = document.find_by_id(element_id) else {
                warn!(element = %element_id, "element not found in graphic, skipping binding");
                return None;
            };
            let index = info.elements.len();
            info.elements
                .push(SvgElementInfo::capture(document, element_id.clone(), handle));
            resolved.insert(element_id.clone(), index);
            Some(index)
        };

        let shared_indices: Vec<usize> = shared_targets
            .iter()
            .filter_map(|element_id| resolve(&mut info, element_id))
            .collect();

        // Per-entity bindings: an `entities` entry with its own element
        // overrides the shared targets for that entity.
        let mut bound_entities: Vec<EntityId> = Vec::new();
        if let Some(entity) = info.rule.entity.clone() {
            info.entity_elements
                .entry(entity.clone())
                .or_insert_with(|| shared_indices.clone());
            bound_entities.push(entity);
        }
        let bindings = info.rule.entities.clone();
        for binding in &bindings {
            let entity = binding.entity_id().clone();
            let indices = binding.element_override().map_or_else(
                || shared_indices.clone(),
                |element_id| resolve(&mut info, element_id).into_iter().collect(),
            );
            info.entity_elements
                .entry(entity.clone())
                .and_modify(|existing| existing.extend(indices.iter().copied()))
                .or_insert(indices);
            bound_entities.push(entity);
        }

        for element in &info.elements {
            self.by_element
                .entry(element.element_id.clone())
                .or_default()
                .push(rule_idx);
        }

        for entity in bound_entities {
            let entry = self.entities.entry(entity.clone()).or_insert_with(|| EntityInfo {
                entity_id: entity,
                last_state: None,
                rules: Vec::new(),
            });
            if !entry.rules.contains(&rule_idx) {
                entry.rules.push(rule_idx);
            }
        }

        self.rules.push(info);
    }

    /// Number of indexed rules.
    pub const fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Iterate every rule's runtime record, in declaration order. Covers
    /// interaction-only rules that no entity points at.
    pub fn rules(&self) -> impl Iterator<Item = &RuleInfo> {
        self.rules.iter()
    }

    /// Borrow one rule's runtime record.
    pub fn rule(&self, idx: RuleIdx) -> Option<&RuleInfo> {
        self.rules.get(idx.0)
    }

    /// Mutably borrow one rule's runtime record.
    pub fn rule_mut(&mut self, idx: RuleIdx) -> Option<&mut RuleInfo> {
        self.rules.get_mut(idx.0)
    }

    /// Borrow an entity's runtime record.
    pub fn entity(&self, entity_id: &EntityId) -> Option<&EntityInfo> {
        self.entities.get(entity_id)
    }

    /// Mutably borrow an entity's runtime record.
    pub fn entity_mut(&mut self, entity_id: &EntityId) -> Option<&mut EntityInfo> {
        self.entities.get_mut(entity_id)
    }

    /// Whether any rule references the entity.
    pub fn tracks_entity(&self, entity_id: &EntityId) -> bool {
        self.entities.contains_key(entity_id)
    }

    /// Rules bound to a graphic element, in declaration order.
    pub fn rules_for_element(&self, element_id: &ElementId) -> &[RuleIdx] {
        self.by_element
            .get(element_id)
            .map_or(&[], Vec::as_slice)
    }
}
