//! Floorplan configuration: typed structures mirroring the source document.
//!
//! The configuration arrives as one YAML (or JSON) document with top-level
//! sections `image`, `stylesheet`, `rules`, `cards` (or the deprecated
//! `card_hosts`), `defaults`, `startup_action`, `variables`, `pages`, and
//! log-level strings. This module defines the typed mirror of that document
//! and the loader. Parsing happens once; the parsed config is immutable and
//! superseded wholesale on reconfiguration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::actions::ActionSlot;
use crate::cards::CardHostConfig;
use crate::ids::{ElementId, EntityId};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level floorplan configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloorplanConfig {
    /// The floorplan image. Absence is a fatal initialization error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageSource>,

    /// Alternate image used on small screens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_mobile: Option<ImageSource>,

    /// Stylesheet applied to the loaded graphic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stylesheet: Option<StylesheetSource>,

    /// Verbosity of the on-card log panel.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Verbosity of console/structured logging.
    #[serde(default)]
    pub console_log_level: LogLevel,

    /// Ordered rule set binding entities to graphic elements.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Embedded card hosts (deprecated key; superseded by `cards`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_hosts: Option<Vec<CardHostConfig>>,

    /// Embedded card hosts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cards: Option<Vec<CardHostConfig>>,

    /// Fallback rule merged into every rule lacking a value for a field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defaults: Option<RuleConfig>,

    /// Actions executed once after initialization completes.
    #[serde(default)]
    pub startup_action: ActionSlot,

    /// Source location of user-supplied custom functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<String>,

    /// Named values exposed to service-data templates as `${var.<name>}`.
    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    /// Page documents for multi-page configurations.
    #[serde(default)]
    pub pages: Vec<String>,
}

impl FloorplanConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yml::from_str(&contents)?)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// The effective card-host list, honoring the deprecated `card_hosts`
    /// key. When both keys are present `cards` wins wholesale; when only
    /// the legacy key is present a deprecation warning is logged.
    pub fn effective_cards(&self) -> &[CardHostConfig] {
        match (&self.cards, &self.card_hosts) {
            (Some(cards), _) => cards,
            (None, Some(hosts)) => {
                warn!("`card_hosts` is deprecated, use `cards` instead");
                hosts
            }
            (None, None) => &[],
        }
    }

    /// Apply the `defaults` rule to every rule in place.
    pub fn apply_defaults(&mut self) {
        if let Some(defaults) = self.defaults.clone() {
            for rule in &mut self.rules {
                rule.apply_defaults(&defaults);
            }
        }
    }
}

/// The floorplan image: either a bare location string or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageSource {
    /// Bare location string.
    Location(String),
    /// Full image configuration.
    Config(ImageConfig),
}

impl ImageSource {
    /// The location to fetch, picking the best `sizes` entry (largest
    /// `min_width` not exceeding `width`) for configured images.
    pub fn location_for_width(&self, width: u32) -> Option<&str> {
        match self {
            Self::Location(location) => Some(location),
            Self::Config(config) => {
                let sized = config
                    .sizes
                    .iter()
                    .filter(|size| size.min_width <= width)
                    .max_by_key(|size| size.min_width)
                    .map(|size| size.location.as_str());
                sized.or(config.location.as_deref())
            }
        }
    }
}

/// Full image configuration with responsive size variants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Default image location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Whether the fetched asset may be cached.
    #[serde(default)]
    pub cache: bool,

    /// Width-dependent image variants.
    #[serde(default)]
    pub sizes: Vec<ImageSize>,

    /// Select variants by screen width rather than element width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_screen_width: Option<bool>,
}

/// One width-dependent image variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    /// Minimum width at which this variant applies.
    #[serde(default)]
    pub min_width: u32,
    /// Image location for this variant.
    pub location: String,
    /// Whether the fetched asset may be cached.
    #[serde(default)]
    pub cache: bool,
}

/// The stylesheet: a bare location string or a full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StylesheetSource {
    /// Bare location string.
    Location(String),
    /// Full stylesheet configuration.
    Config(StylesheetConfig),
}

impl StylesheetSource {
    /// The location to fetch.
    pub fn location(&self) -> &str {
        match self {
            Self::Location(location) => location,
            Self::Config(config) => &config.location,
        }
    }
}

/// Full stylesheet configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StylesheetConfig {
    /// Stylesheet location.
    pub location: String,
    /// Whether the fetched asset may be cached.
    #[serde(default)]
    pub cache: bool,
}

/// Logging verbosity, parsed from the configuration's level strings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Errors and warnings.
    #[serde(alias = "warn")]
    Warning,
    /// Errors, warnings, and informational messages (the default).
    #[default]
    Info,
    /// Everything, including per-batch trace output.
    Debug,
}

impl LogLevel {
    /// Map to the equivalent `tracing` level filter.
    pub const fn to_level_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            Self::Error => tracing::level_filters::LevelFilter::ERROR,
            Self::Warning => tracing::level_filters::LevelFilter::WARN,
            Self::Info => tracing::level_filters::LevelFilter::INFO,
            Self::Debug => tracing::level_filters::LevelFilter::DEBUG,
        }
    }
}

/// A named variable exposed to service-data template resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableConfig {
    /// Variable name.
    pub name: String,
    /// Variable value (arbitrary JSON).
    #[serde(default)]
    pub value: serde_json::Value,
}

/// One rule binding entities to graphic elements and actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Single bound entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityId>,

    /// Ordered list of bound entities, each optionally paired with its own
    /// target element.
    #[serde(default)]
    pub entities: Vec<EntityBinding>,

    /// Graphic group element ids whose members become targets.
    #[serde(default)]
    pub groups: Vec<ElementId>,

    /// Single target element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementId>,

    /// Ordered list of target elements.
    #[serde(default)]
    pub elements: Vec<ElementId>,

    /// Actions evaluated on every state change of a bound entity.
    #[serde(default)]
    pub state_action: ActionSlot,

    /// Actions for a tap interaction.
    #[serde(default)]
    pub tap_action: ActionSlot,

    /// Actions for a hold interaction.
    #[serde(default)]
    pub hold_action: ActionSlot,

    /// Actions for a double-tap interaction.
    #[serde(default)]
    pub double_tap_action: ActionSlot,

    /// Actions for a hover interaction.
    #[serde(default)]
    pub hover_action: ActionSlot,

    /// Attribute names echoed in hover-info events; empty means all.
    #[serde(default)]
    pub hover_info_filter: Vec<String>,
}

impl RuleConfig {
    /// Field-level fallback merge: any field without an explicit value in
    /// this rule takes the value from `defaults`. An action slot disabled
    /// with `false` is an explicit value and is not overridden.
    pub fn apply_defaults(&mut self, defaults: &Self) {
        if self.entity.is_none() {
            self.entity.clone_from(&defaults.entity);
        }
        if self.entities.is_empty() {
            self.entities.clone_from(&defaults.entities);
        }
        if self.groups.is_empty() {
            self.groups.clone_from(&defaults.groups);
        }
        if self.element.is_none() {
            self.element.clone_from(&defaults.element);
        }
        if self.elements.is_empty() {
            self.elements.clone_from(&defaults.elements);
        }
        if self.hover_info_filter.is_empty() {
            self.hover_info_filter.clone_from(&defaults.hover_info_filter);
        }
        for (slot, default_slot) in [
            (&mut self.state_action, &defaults.state_action),
            (&mut self.tap_action, &defaults.tap_action),
            (&mut self.hold_action, &defaults.hold_action),
            (&mut self.double_tap_action, &defaults.double_tap_action),
            (&mut self.hover_action, &defaults.hover_action),
        ] {
            if matches!(slot, ActionSlot::Unset) {
                *slot = default_slot.clone();
            }
        }
    }

    /// All entity ids this rule binds, in declaration order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids = Vec::new();
        if let Some(entity) = &self.entity {
            ids.push(entity.clone());
        }
        for binding in &self.entities {
            ids.push(binding.entity_id().clone());
        }
        ids
    }
}

/// One entry of a rule's `entities` list: a bare entity id or an
/// `{entity, element}` pair binding that entity to its own element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityBinding {
    /// Bare entity id; the rule's `element`/`elements`/`groups` apply.
    Entity(EntityId),
    /// Entity paired with its own target element.
    Pair {
        /// The bound entity.
        entity: EntityId,
        /// The element this entity maps to.
        element: ElementId,
    },
}

impl EntityBinding {
    /// The bound entity id.
    pub const fn entity_id(&self) -> &EntityId {
        match self {
            Self::Entity(entity) | Self::Pair { entity, .. } => entity,
        }
    }

    /// The per-entity element override, if any.
    pub const fn element_override(&self) -> Option<&ElementId> {
        match self {
            Self::Entity(_) => None,
            Self::Pair { element, .. } => Some(element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses() {
        let yaml = r"
image: /local/floorplan/home.svg
rules:
  - entity: light.kitchen
    element: kitchen-light
    tap_action: toggle
";
        let config = FloorplanConfig::parse(yaml).unwrap_or_default();
        assert!(config.image.is_some());
        assert_eq!(config.rules.len(), 1);
        let rule = config.rules.first().cloned().unwrap_or_default();
        assert_eq!(rule.entity, Some(EntityId::from("light.kitchen")));
        assert!(rule.tap_action.is_set());
    }

    #[test]
    fn entities_accept_bare_ids_and_pairs() {
        let yaml = r"
entities:
  - sensor.one
  - entity: sensor.two
    element: two-element
";
        let rule: RuleConfig = serde_yml::from_str(yaml).unwrap_or_default();
        assert_eq!(rule.entities.len(), 2);
        assert_eq!(
            rule.entities.first().map(|binding| binding.entity_id().clone()),
            Some(EntityId::from("sensor.one"))
        );
        assert_eq!(
            rule.entities.get(1).and_then(EntityBinding::element_override),
            Some(&ElementId::from("two-element"))
        );
    }

    #[test]
    fn defaults_fill_missing_fields_only() {
        let mut config = FloorplanConfig::parse(
            r"
image: plan.svg
defaults:
  hover_action: hover-info
  tap_action: toggle
rules:
  - entity: light.one
    element: one
    tap_action: false
  - entity: light.two
    element: two
",
        )
        .unwrap_or_default();
        config.apply_defaults();

        let first = config.rules.first().cloned().unwrap_or_default();
        // Explicit `false` blocks the default.
        assert!(!first.tap_action.is_set());
        assert!(first.hover_action.is_set());

        let second = config.rules.get(1).cloned().unwrap_or_default();
        assert!(second.tap_action.is_set());
        assert!(second.hover_action.is_set());
    }

    #[test]
    fn effective_cards_prefers_cards_over_legacy_key() {
        let yaml = r"
image: plan.svg
card_hosts:
  - target: '#legacy'
cards:
  - target: '#modern'
";
        let config = FloorplanConfig::parse(yaml).unwrap_or_default();
        let cards = config.effective_cards();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards.first().and_then(|c| c.target.as_deref()), Some("#modern"));
    }

    #[test]
    fn legacy_card_hosts_key_still_functions() {
        let yaml = r"
image: plan.svg
card_hosts:
  - target: '#legacy'
";
        let config = FloorplanConfig::parse(yaml).unwrap_or_default();
        assert_eq!(config.effective_cards().len(), 1);
    }

    #[test]
    fn image_sizes_pick_largest_applicable_variant() {
        let source: ImageSource = serde_yml::from_str(
            r"
location: small.svg
sizes:
  - min_width: 0
    location: small.svg
  - min_width: 1024
    location: large.svg
",
        )
        .unwrap_or(ImageSource::Location(String::new()));
        assert_eq!(source.location_for_width(800), Some("small.svg"));
        assert_eq!(source.location_for_width(1920), Some("large.svg"));
    }

    #[test]
    fn log_level_strings_parse() {
        let config =
            FloorplanConfig::parse("log_level: debug\nconsole_log_level: warn").unwrap_or_default();
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.console_log_level, LogLevel::Warning);
    }

    #[test]
    fn entity_ids_combine_entity_and_entities() {
        let rule: RuleConfig = serde_yml::from_str(
            r"
entity: sensor.primary
entities:
  - sensor.secondary
",
        )
        .unwrap_or_default();
        let ids = rule.entity_ids();
        assert_eq!(
            ids,
            vec![EntityId::from("sensor.primary"), EntityId::from("sensor.secondary")]
        );
    }
}
