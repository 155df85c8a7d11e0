//! Card host configuration: embedded widgets anchored to graphic locations.
//!
//! A card host mounts an embedded dashboard card at a graphic element,
//! either replacing the element's content (`replace`) or layering a new
//! mount node on top (`overlay`). Hosts may carry **variants**: alternate
//! configurations selected by entity-state predicates, evaluated in
//! declaration order with AND semantics across one variant's conditions.
//!
//! All loose document shapes (variants as list or keyed map, natural size
//! as number/string/pair/object) normalize here, once, at load time.

use std::fmt;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::{ElementId, EntityId};
use crate::state::EntityState;

/// Placement mode for the card mount node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostMode {
    /// The target element itself becomes the mount boundary; its id and
    /// position are preserved but its content is replaced.
    #[default]
    Replace,
    /// The target element is left untouched; a new mount node is layered
    /// as a sibling positioned to the target's bounding box.
    Overlay,
}

/// How the embedded card's natural size maps onto the target rect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Stretch to 100% of both axes, ignoring aspect ratio.
    #[default]
    Fill,
    /// Uniform scale chosen so the card fits entirely within the rect.
    Contain,
    /// Uniform scale chosen so the card covers the rect entirely.
    Cover,
    /// No size transform; render at natural size.
    None,
}

/// Natural (baseline) size of the embedded card content.
///
/// Accepts a number (square), a string (`"320x320"`, `"320 × 320"`),
/// a `[width, height]` pair, or a `{width, height}` object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NaturalSize {
    /// Natural width in graphic units.
    pub width: f64,
    /// Natural height in graphic units.
    pub height: f64,
}

impl NaturalSize {
    /// Parse the string form: two numbers separated by `x`, `X`, or `×`,
    /// with optional whitespace.
    pub fn parse_str(text: &str) -> Option<Self> {
        let mut parts = text.splitn(2, ['x', 'X', '×']);
        let width: f64 = parts.next()?.trim().parse().ok()?;
        let height: f64 = parts.next()?.trim().parse().ok()?;
        if width > 0.0 && height > 0.0 {
            Some(Self { width, height })
        } else {
            None
        }
    }
}

impl<'de> Deserialize<'de> for NaturalSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl<'de> Visitor<'de> for SizeVisitor {
            type Value = NaturalSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a number, a \"WxH\" string, a [w, h] pair, or {width, height}")
            }

            fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Self::Value, E> {
                Ok(NaturalSize { width: v, height: v })
            }

            #[allow(clippy::cast_precision_loss)]
            fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
                self.visit_f64(v as f64)
            }

            #[allow(clippy::cast_precision_loss)]
            fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
                self.visit_f64(v as f64)
            }

            fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
                NaturalSize::parse_str(v)
                    .ok_or_else(|| E::custom(format!("invalid size string: {v:?}")))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let width: f64 = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("size pair is missing width"))?;
                let height: f64 = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::custom("size pair is missing height"))?;
                Ok(NaturalSize { width, height })
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut width: Option<f64> = None;
                let mut height: Option<f64> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "width" => width = Some(map.next_value()?),
                        "height" => height = Some(map.next_value()?),
                        _ => {
                            let _ignored: serde::de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                match (width, height) {
                    (Some(width), Some(height)) => Ok(NaturalSize { width, height }),
                    _ => Err(serde::de::Error::custom("size object needs width and height")),
                }
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}

/// One entity-state predicate of a variant's condition list.
///
/// Predicates are optional and AND together; a condition with no predicate
/// fields holds whenever the entity has a known state. With `attribute`
/// set, predicates test that attribute's value instead of the state string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    /// The entity whose state is tested.
    pub entity: EntityId,

    /// Test this attribute instead of the state string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// State equality: holds when the observed state is in this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<StringOrList>,

    /// Negated state exclusion: holds when the observed state is not in
    /// this set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_state: Option<StringOrList>,

    /// Value equality against an arbitrary JSON value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<serde_json::Value>,

    /// Negated value equality.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_equals: Option<serde_json::Value>,

    /// Set membership.
    #[serde(default, rename = "in", skip_serializing_if = "Option::is_none")]
    pub in_values: Option<Vec<serde_json::Value>>,

    /// Negated set membership.
    #[serde(default, rename = "not_in", skip_serializing_if = "Option::is_none")]
    pub not_in_values: Option<Vec<serde_json::Value>>,
}

/// A string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    /// A single string.
    One(String),
    /// An ordered list of strings.
    Many(Vec<String>),
}

impl StringOrList {
    /// Whether the given value is in the set.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::One(one) => one == value,
            Self::Many(many) => many.iter().any(|candidate| candidate == value),
        }
    }
}

impl ConditionConfig {
    /// Evaluate this condition against an entity's current state.
    ///
    /// Unknown entity state (or a missing attribute when `attribute` is
    /// set) makes every non-negated predicate false and every negated
    /// predicate true.
    pub fn evaluate(&self, state: Option<&EntityState>) -> bool {
        let observed = state.and_then(|s| self.observed_value(s));

        let positive_holds = |test: &dyn Fn(&serde_json::Value) -> bool| {
            observed.as_ref().is_some_and(test)
        };
        let negated_holds = |test: &dyn Fn(&serde_json::Value) -> bool| {
            observed.as_ref().is_none_or(|value| !test(value))
        };

        if let Some(expected) = &self.state
            && !positive_holds(&|value| value_as_text(value).is_some_and(|s| expected.contains(&s)))
        {
            return false;
        }
        if let Some(excluded) = &self.not_state
            && !negated_holds(&|value| value_as_text(value).is_some_and(|s| excluded.contains(&s)))
        {
            return false;
        }
        if let Some(expected) = &self.equals
            && !positive_holds(&|value| values_equal(value, expected))
        {
            return false;
        }
        if let Some(excluded) = &self.not_equals
            && !negated_holds(&|value| values_equal(value, excluded))
        {
            return false;
        }
        if let Some(members) = &self.in_values
            && !positive_holds(&|value| members.iter().any(|member| values_equal(value, member)))
        {
            return false;
        }
        if let Some(members) = &self.not_in_values
            && !negated_holds(&|value| members.iter().any(|member| values_equal(value, member)))
        {
            return false;
        }

        // A condition with no predicate fields still requires known state.
        self.has_predicates() || observed.is_some()
    }

    /// The value this condition observes: the named attribute when
    /// `attribute` is set, otherwise the state string.
    fn observed_value(&self, state: &EntityState) -> Option<serde_json::Value> {
        match &self.attribute {
            Some(attribute) => state.attribute(attribute).cloned(),
            None => Some(serde_json::Value::String(state.state.clone())),
        }
    }

    const fn has_predicates(&self) -> bool {
        self.state.is_some()
            || self.not_state.is_some()
            || self.equals.is_some()
            || self.not_equals.is_some()
            || self.in_values.is_some()
            || self.not_in_values.is_some()
    }
}

/// Textual form of a JSON value, used for state-string comparison.
fn value_as_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// JSON equality with string-coercion fallback, so `state: '42'` matches an
/// attribute holding the number `42`.
fn values_equal(observed: &serde_json::Value, expected: &serde_json::Value) -> bool {
    if observed == expected {
        return true;
    }
    match (value_as_text(observed), value_as_text(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Per-variant configuration: overrides applied while the variant is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Variant identifier; filled from the map key for keyed variants.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Conditions that must all hold for this variant to be active.
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,

    /// Extra entity subscriptions beyond the condition entities.
    #[serde(default)]
    pub entities: Vec<EntityId>,

    /// Embedded card override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<serde_json::Value>,

    /// Visibility override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,

    /// Placement-mode override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<HostMode>,

    /// Pointer-event style override for the mount container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_events: Option<String>,
}

/// The variants section: an ordered list, or a keyed map whose keys become
/// variant ids. Normalization is stable; first-declared order is preserved
/// for both shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct VariantsConfig(pub Vec<VariantConfig>);

impl VariantsConfig {
    /// The canonical ordered variant list.
    pub fn as_slice(&self) -> &[VariantConfig] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for VariantsConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VariantsVisitor;

        impl<'de> Visitor<'de> for VariantsVisitor {
            type Value = VariantsConfig;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a variant list or a map of variant id to variant")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut variants = Vec::new();
                while let Some(variant) = seq.next_element::<VariantConfig>()? {
                    variants.push(variant);
                }
                Ok(VariantsConfig(variants))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                // MapAccess yields entries in source order, which is what
                // makes keyed-map normalization deterministic.
                let mut variants = Vec::new();
                while let Some((key, mut variant)) =
                    map.next_entry::<String, VariantConfig>()?
                {
                    if variant.id.is_none() {
                        variant.id = Some(key);
                    }
                    variants.push(variant);
                }
                Ok(VariantsConfig(variants))
            }
        }

        deserializer.deserialize_any(VariantsVisitor)
    }
}

/// Declarative description of one embedded card host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CardHostConfig {
    /// Stable host identifier; defaults to the resolved anchor. The legacy
    /// `container_id` key is accepted as an alias.
    #[serde(default, alias = "container_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Anchor as a `#id` selector or bare element id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Anchor alias (legacy key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Anchor alias (legacy key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,

    /// Placement mode.
    #[serde(default)]
    pub mode: HostMode,

    /// Pointer-event style for the mount container (`auto` when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer_events: Option<String>,

    /// Fit strategy for the embedded card.
    #[serde(default)]
    pub fit: FitMode,

    /// Natural-size hint for uniform `contain`/`cover` scaling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_size: Option<NaturalSize>,

    /// The embedded card configuration (opaque to this core; handed to the
    /// card renderer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<serde_json::Value>,

    /// Baseline visibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,

    /// Explicit entity subscriptions beyond the variant condition entities.
    #[serde(default)]
    pub entities: Vec<EntityId>,

    /// Explicit mount rectangle. When set, the mount container is placed
    /// at this rectangle instead of the anchor's bounding box.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_object: Option<MountRect>,

    /// Conditional variants, first match wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<VariantsConfig>,
}

/// Explicit mount rectangle for a card host, in graphic units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MountRect {
    /// Left edge.
    #[serde(default)]
    pub x: f64,
    /// Top edge.
    #[serde(default)]
    pub y: f64,
    /// Mount width.
    pub width: f64,
    /// Mount height.
    pub height: f64,
}

impl CardHostConfig {
    /// The anchor element id, resolving `target`, then `selector`, then
    /// `element`. `None` means the host is misconfigured and is skipped.
    pub fn anchor(&self) -> Option<ElementId> {
        self.target
            .as_deref()
            .or(self.selector.as_deref())
            .or(self.element.as_deref())
            .map(ElementId::from_selector)
    }

    /// Stable key for idempotent host setup: explicit `id` or the anchor.
    pub fn host_key(&self) -> Option<String> {
        self.id
            .clone()
            .or_else(|| self.anchor().map(|anchor| anchor.0))
    }

    /// The normalized variant list (empty when no variants are declared).
    pub fn variant_list(&self) -> &[VariantConfig] {
        self.variants.as_ref().map_or(&[], VariantsConfig::as_slice)
    }

    /// Every entity whose changes require re-evaluating this host: the
    /// explicit subscription list plus all variant condition entities and
    /// variant subscription lists. Order follows declaration; duplicates
    /// are kept (callers intersect against a set).
    pub fn subscriptions(&self) -> Vec<EntityId> {
        let mut entities: Vec<EntityId> = self.entities.clone();
        for variant in self.variant_list() {
            entities.extend(variant.entities.iter().cloned());
            entities.extend(variant.conditions.iter().map(|c| c.entity.clone()));
        }
        entities
    }
}
