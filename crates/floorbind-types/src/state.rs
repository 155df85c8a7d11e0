//! Entity state snapshots delivered by the host platform.
//!
//! The host's state subscription delivers batches of changed entity ids
//! together with a snapshot accessor. [`StateSnapshot`] is that accessor:
//! a read-only map from entity id to the entity's last known state. The
//! core never mutates a snapshot; it copies what it needs into its own
//! per-entity records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::EntityId;

/// Metadata attached by the host to every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateContext {
    /// Unique id of the state-change event.
    pub id: Uuid,
    /// The user that caused the change, if any.
    pub user_id: Option<String>,
}

impl Default for StateContext {
    fn default() -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: None,
        }
    }
}

/// One entity's state as reported by the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// The entity this state belongs to.
    pub entity_id: EntityId,
    /// The state string (`on`, `off`, `21.5`, ...).
    pub state: String,
    /// Attribute mapping. Values are arbitrary JSON.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    /// When the state last changed.
    pub last_changed: DateTime<Utc>,
    /// Host-provided change context.
    #[serde(default)]
    pub context: StateContext,
}

impl EntityState {
    /// Build a state with the given state string and no attributes.
    pub fn new(entity_id: impl Into<EntityId>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: BTreeMap::new(),
            last_changed: Utc::now(),
            context: StateContext::default(),
        }
    }

    /// Attach an attribute, consuming and returning the state (builder style).
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Look up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }
}

/// Read-only snapshot of all entity states at one point in time.
///
/// Keyed by entity id. Entities absent from the snapshot have unknown
/// state; rule evaluation treats unknown state per the condition
/// semantics (positive predicates false, negated predicates true).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    states: BTreeMap<EntityId, EntityState>,
}

impl StateSnapshot {
    /// An empty snapshot (no entity has a known state).
    pub const fn new() -> Self {
        Self {
            states: BTreeMap::new(),
        }
    }

    /// Insert or replace an entity's state.
    pub fn insert(&mut self, state: EntityState) {
        self.states.insert(state.entity_id.clone(), state);
    }

    /// Look up an entity's state, `None` when unknown.
    pub fn get(&self, entity_id: &EntityId) -> Option<&EntityState> {
        self.states.get(entity_id)
    }

    /// Whether the snapshot carries any state for the entity.
    pub fn contains(&self, entity_id: &EntityId) -> bool {
        self.states.contains_key(entity_id)
    }

    /// Number of entities with known state.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Iterate over all known states.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &EntityState)> {
        self.states.iter()
    }
}

impl FromIterator<EntityState> for StateSnapshot {
    fn from_iter<T: IntoIterator<Item = EntityState>>(iter: T) -> Self {
        let mut snapshot = Self::new();
        for state in iter {
            snapshot.insert(state);
        }
        snapshot
    }
}
