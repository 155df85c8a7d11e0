//! Action configuration: the closed set of things a rule can do.
//!
//! A rule's action slots (`state_action`, `tap_action`, ...) accept four
//! shapes in the source document: a structured action object, an ordered
//! list of them, a bare string shorthand, or `false` to disable the slot.
//! [`ActionSlot`] captures that union and [`ActionSlot::resolve`] is the
//! single normalization step that produces the canonical ordered action
//! list; everything downstream operates only on `Vec<ActionConfig>`.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ids::EntityId;

/// One structured action from the closed action set.
///
/// The `action` field of the source object selects the variant. There is
/// deliberately no catch-all: an unknown action name is a deserialization
/// error, surfaced as a configuration warning by the loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum ActionConfig {
    /// Toggle the bound entity via the host's toggle command.
    Toggle {
        /// Entity override; defaults to the rule's matched entity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<EntityId>,
    },
    /// Invoke a host service, e.g. `light.turn_on` or an internal
    /// `floorplan.*` service.
    CallService {
        /// Full service name, `domain.service`.
        service: String,
        /// Payload passed to the service. Templated `${...}` values are
        /// resolved against current entity state at dispatch time.
        #[serde(default, alias = "data", skip_serializing_if = "serde_json::Value::is_null")]
        service_data: serde_json::Value,
        /// Entity override; defaults to the rule's matched entity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<EntityId>,
    },
    /// Change the active dashboard view.
    Navigate {
        /// Path of the view to navigate to.
        navigation_path: String,
    },
    /// Open an external resource.
    Url {
        /// The resource URL.
        url_path: String,
    },
    /// Surface the entity-detail dialog.
    MoreInfo {
        /// Entity override; defaults to the rule's matched entity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entity: Option<EntityId>,
    },
    /// Explicit no-op.
    NoAction,
    /// Delegate to a user-supplied function from the function registry.
    Custom {
        /// Registry name of the function to invoke.
        name: String,
    },
    /// Surface entity detail on hover (transient variant of more-info).
    HoverInfo,
}

/// An action slot as written in the configuration document.
///
/// Untagged: serde tries the shapes in declared order. `false` disables
/// the slot; any other boolean value is rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum ActionSlot {
    /// Slot not present in the document.
    #[default]
    Unset,
    /// Slot explicitly disabled with `false`.
    Disabled(ExplicitFalse),
    /// Bare string shorthand, e.g. `toggle` or `light.turn_on`.
    Shorthand(String),
    /// A single structured action.
    Single(Box<ActionConfig>),
    /// An ordered list of structured actions.
    List(Vec<ActionConfig>),
}

/// Marker that deserializes only from the literal `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplicitFalse;

impl Serialize for ExplicitFalse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(false)
    }
}

impl<'de> Deserialize<'de> for ExplicitFalse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = bool::deserialize(deserializer)?;
        if value {
            Err(serde::de::Error::custom(
                "action slots accept only `false`, not `true`",
            ))
        } else {
            Ok(Self)
        }
    }
}

impl ActionSlot {
    /// Whether the slot carries anything to execute.
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset | Self::Disabled(_))
    }

    /// Normalize the slot to the canonical ordered action list.
    ///
    /// Shorthand strings map to structured actions: the fixed action names
    /// (`toggle`, `more-info`, `no-action`, `hover-info`) map to their
    /// variants, and a `domain.service` string becomes a `call-service`
    /// action with an empty payload. Malformed shorthand normalizes to an
    /// empty list and is logged; it must never abort configuration loading.
    pub fn resolve(&self) -> Vec<ActionConfig> {
        match self {
            Self::Unset | Self::Disabled(_) => Vec::new(),
            Self::Shorthand(name) => resolve_shorthand(name),
            Self::Single(action) => vec![(**action).clone()],
            Self::List(actions) => actions.clone(),
        }
    }
}

/// Expand a bare action-name string into the equivalent structured action.
fn resolve_shorthand(name: &str) -> Vec<ActionConfig> {
    match name.trim() {
        "toggle" => vec![ActionConfig::Toggle { entity: None }],
        "more-info" => vec![ActionConfig::MoreInfo { entity: None }],
        "hover-info" => vec![ActionConfig::HoverInfo],
        "no-action" | "none" => vec![ActionConfig::NoAction],
        service if service.contains('.') => vec![ActionConfig::CallService {
            service: service.to_owned(),
            service_data: serde_json::Value::Null,
            entity: None,
        }],
        other => {
            warn!(shorthand = other, "malformed action shorthand, treating as no-op");
            Vec::new()
        }
    }
}

/// Split a `domain.service` name into `(domain, service)`.
///
/// A name without a `.` yields the whole string as domain and an empty
/// service; the dispatcher logs and skips those.
pub fn split_service(service: &str) -> (&str, &str) {
    service.split_once('.').unwrap_or((service, ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_action_parses_from_tagged_object() {
        let yaml = r"
action: call-service
service: floorplan.style_set
service_data:
  style: 'opacity: 0.5'
";
        let action: ActionConfig = serde_yml::from_str(yaml).unwrap_or(ActionConfig::NoAction);
        let ActionConfig::CallService { service, service_data, .. } = action else {
            assert!(false, "expected call-service");
            return;
        };
        assert_eq!(service, "floorplan.style_set");
        assert_eq!(service_data.get("style"), Some(&serde_json::json!("opacity: 0.5")));
    }

    #[test]
    fn data_alias_is_accepted() {
        let yaml = "{ action: call-service, service: light.turn_on, data: { brightness: 128 } }";
        let action: ActionConfig = serde_yml::from_str(yaml).unwrap_or(ActionConfig::NoAction);
        let ActionConfig::CallService { service_data, .. } = action else {
            assert!(false, "expected call-service");
            return;
        };
        assert_eq!(service_data.get("brightness"), Some(&serde_json::json!(128)));
    }

    #[test]
    fn slot_shorthand_toggle_normalizes() {
        let slot = ActionSlot::Shorthand("toggle".to_owned());
        assert_eq!(slot.resolve(), vec![ActionConfig::Toggle { entity: None }]);
    }

    #[test]
    fn slot_shorthand_service_normalizes_to_call_service() {
        let slot = ActionSlot::Shorthand("light.turn_on".to_owned());
        let actions = slot.resolve();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            actions.first(),
            Some(ActionConfig::CallService { service, .. }) if service == "light.turn_on"
        ));
    }

    #[test]
    fn malformed_shorthand_resolves_to_empty() {
        let slot = ActionSlot::Shorthand("blink".to_owned());
        assert!(slot.resolve().is_empty());
    }

    #[test]
    fn disabled_slot_parses_from_false_and_resolves_empty() {
        let slot: ActionSlot = serde_yml::from_str("false").unwrap_or_default();
        assert!(matches!(slot, ActionSlot::Disabled(_)));
        assert!(!slot.is_set());
        assert!(slot.resolve().is_empty());
    }

    #[test]
    fn true_is_rejected_for_action_slots() {
        let slot: Result<ActionSlot, _> = serde_yml::from_str("true");
        assert!(slot.is_err());
    }

    #[test]
    fn list_slot_preserves_order() {
        let yaml = r"
- action: toggle
- action: navigate
  navigation_path: /lovelace/1
";
        let slot: ActionSlot = serde_yml::from_str(yaml).unwrap_or_default();
        let actions = slot.resolve();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions.first(), Some(ActionConfig::Toggle { .. })));
        assert!(matches!(actions.get(1), Some(ActionConfig::Navigate { .. })));
    }

    #[test]
    fn split_service_divides_domain_and_name() {
        assert_eq!(split_service("floorplan.style_set"), ("floorplan", "style_set"));
        assert_eq!(split_service("nodot"), ("nodot", ""));
    }
}
