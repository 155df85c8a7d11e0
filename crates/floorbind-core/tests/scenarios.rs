//! End-to-end scenarios for the binding engine: full configurations driven
//! through [`FloorplanController`] against an in-memory graphic document.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use floorbind_core::assets::StaticAssetLoader;
use floorbind_core::cardhost::{CardHostEngine, NullCardRenderer};
use floorbind_core::controller::{Collaborators, FloorplanController};
use floorbind_core::dispatch::{ActionCallEvent, EventSink, NullCommandSink, NullEventSink};
use floorbind_core::document::GraphicDocument;
use floorbind_core::index::ElementIndex;
use floorbind_core::interact::InteractionKind;
use floorbind_types::{
    ActionConfig, CardHostConfig, ElementId, EntityId, EntityState, FloorplanConfig, StateSnapshot,
};

/// Collects every event the engine emits on the host event surface.
#[derive(Debug, Default)]
struct CapturingEvents {
    events: Mutex<Vec<ActionCallEvent>>,
}

impl CapturingEvents {
    fn events(&self) -> Vec<ActionCallEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }
}

impl EventSink for CapturingEvents {
    fn action_called(&self, event: &ActionCallEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

fn collaborators() -> Collaborators<StaticAssetLoader> {
    Collaborators {
        assets: Arc::new(StaticAssetLoader::new().with_asset("/local/plan.svg", "<svg/>")),
        commands: Arc::new(NullCommandSink),
        events: Arc::new(NullEventSink),
        renderer: Arc::new(NullCardRenderer),
    }
}

fn collaborators_with_events(events: Arc<CapturingEvents>) -> Collaborators<StaticAssetLoader> {
    Collaborators {
        assets: Arc::new(StaticAssetLoader::new().with_asset("/local/plan.svg", "<svg/>")),
        commands: Arc::new(NullCommandSink),
        events,
        renderer: Arc::new(NullCardRenderer),
    }
}

fn document_with_ids(ids: &[&str]) -> GraphicDocument {
    let mut doc = GraphicDocument::new();
    let root = doc.root();
    for id in ids {
        doc.create_node(root, "rect", Some(ElementId::from(*id))).unwrap();
    }
    doc
}

async fn controller(
    yaml: &str,
    document: GraphicDocument,
) -> FloorplanController<StaticAssetLoader> {
    let config = FloorplanConfig::parse(yaml).expect("valid configuration");
    FloorplanController::init(config, document, collaborators(), 1024)
        .await
        .expect("controller init")
}

fn batch(ids: &[&str]) -> BTreeSet<EntityId> {
    ids.iter().map(|id| EntityId::from(*id)).collect()
}

#[tokio::test]
async fn a_group_rule_binds_the_union_of_identified_members() {
    let mut doc = GraphicDocument::new();
    let root = doc.root();
    let group = doc
        .create_node(root, "g", Some(ElementId::from("first-floor")))
        .unwrap();
    doc.create_node(group, "rect", Some(ElementId::from("hall"))).unwrap();
    doc.create_node(group, "rect", Some(ElementId::from("kitchen"))).unwrap();
    // Id-less member is skipped by expansion.
    doc.create_node(group, "rect", None).unwrap();

    let mut controller = controller(
        r"
image: /local/plan.svg
rules:
  - entity: light.floor
    groups: [first-floor]
    elements: [hall]
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'opacity: 0.4'
",
        doc,
    )
    .await;

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("light.floor", "on"));
    controller.handle_state_batch(&batch(&["light.floor"]), snapshot);

    // Union of group members and the explicit list, each element once.
    for id in ["hall", "kitchen"] {
        let handle = controller.document().find_by_id(&ElementId::from(id)).unwrap();
        assert_eq!(
            controller.document().style(handle, "opacity"),
            Some("0.4"),
            "element {id} missed the state action"
        );
    }
}

#[tokio::test]
async fn overlay_hosting_preserves_the_original_element() {
    let mut doc = document_with_ids(&["sensor-badge"]);
    let anchor = doc.find_by_id(&ElementId::from("sensor-badge")).unwrap();
    doc.set_style(anchor, "fill", "steelblue").unwrap();

    let controller = controller(
        r"
image: /local/plan.svg
cards:
  - target: '#sensor-badge'
    mode: overlay
    pointer_events: none
    card: { type: sensor }
",
        doc,
    )
    .await;

    // The original node keeps its id, styles, and attachment.
    let doc = controller.document();
    let kept = doc.find_by_id(&ElementId::from("sensor-badge")).unwrap();
    assert_eq!(kept, anchor);
    assert_eq!(doc.style(anchor, "fill"), Some("steelblue"));
    assert!(doc.is_attached(anchor));
}

#[tokio::test]
async fn replace_hosting_keeps_the_anchor_id() {
    let mut doc = document_with_ids(&["panel"]);
    let anchor = doc.find_by_id(&ElementId::from("panel")).unwrap();
    let label = doc
        .create_node(anchor, "text", Some(ElementId::from("panel-label")))
        .unwrap();

    let controller = controller(
        r"
image: /local/plan.svg
cards:
  - target: panel
    mode: replace
    card: { type: markdown }
",
        doc,
    )
    .await;

    let doc = controller.document();
    assert_eq!(doc.find_by_id(&ElementId::from("panel")), Some(anchor));
    // The previous content was detached.
    assert!(doc.find_by_id(&ElementId::from("panel-label")).is_none());
    assert!(!doc.is_attached(label));
}

#[tokio::test]
async fn variant_selection_falls_back_to_the_baseline() {
    let mut doc = document_with_ids(&["panel"]);
    let config: Vec<CardHostConfig> = serde_yml::from_str(
        r"
- target: panel
  card: { type: gauge }
  visible: true
  variants:
    - conditions: [{ entity: alarm_control_panel.home, state: triggered }]
      visible: false
",
    )
    .unwrap();
    let mut engine = CardHostEngine::default();

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("alarm_control_panel.home", "triggered"));
    engine.init(&mut doc, &config, &snapshot, &NullCardRenderer).unwrap();
    let mount = engine.mount_for("panel").unwrap();
    assert_eq!(doc.style(mount, "display"), Some("none"));

    // Condition stops holding: back to the baseline configuration.
    snapshot.insert(EntityState::new("alarm_control_panel.home", "armed_home"));
    engine
        .update(&mut doc, &batch(&["alarm_control_panel.home"]), &snapshot, &NullCardRenderer)
        .unwrap();
    assert_eq!(doc.style(mount, "display"), Some("block"));
}

#[tokio::test]
async fn card_host_init_is_idempotent() {
    let mut doc = document_with_ids(&["panel"]);
    let config: Vec<CardHostConfig> =
        serde_yml::from_str("[{ target: panel, card: { type: gauge } }]").unwrap();
    let mut engine = CardHostEngine::default();
    let snapshot = StateSnapshot::default();

    engine.init(&mut doc, &config, &snapshot, &NullCardRenderer).unwrap();
    let mount = engine.mount_for("panel").unwrap();
    engine.init(&mut doc, &config, &snapshot, &NullCardRenderer).unwrap();

    assert_eq!(engine.host_count(), 1);
    assert_eq!(engine.mount_for("panel"), Some(mount));
}

#[tokio::test]
async fn repeated_batches_do_not_compound_rule_effects() {
    let doc = document_with_ids(&["lamp"]);
    let mut controller = controller(
        r"
image: /local/plan.svg
rules:
  - entity: light.lamp
    element: lamp
    state_action:
      action: call-service
      service: floorplan.class_toggle
      service_data:
        class: lit
",
        doc,
    )
    .await;

    let handle = controller.document().find_by_id(&ElementId::from("lamp")).unwrap();
    let mut snapshot = StateSnapshot::default();
    // Each pass restores the baseline before reapplying, so a toggling
    // action lands in the same place every time.
    for state in ["on", "off", "on", "off"] {
        snapshot.insert(EntityState::new("light.lamp", state));
        controller.handle_state_batch(&batch(&["light.lamp"]), snapshot.clone());
        assert!(controller.document().has_class(handle, "lit"));
    }
}

#[tokio::test]
async fn overlay_host_applies_configured_pointer_events() {
    let mut doc = document_with_ids(&["sensor-badge"]);
    let config: Vec<CardHostConfig> = serde_yml::from_str(
        "[{ target: sensor-badge, mode: overlay, pointer_events: none, card: { type: sensor } }]",
    )
    .unwrap();
    let mut engine = CardHostEngine::default();
    engine
        .init(&mut doc, &config, &StateSnapshot::default(), &NullCardRenderer)
        .unwrap();

    let mount = engine.mount_for("sensor-badge").unwrap();
    assert_eq!(doc.style(mount, "pointer-events"), Some("none"));
    // The original element is not touched by the host's pointer policy.
    let anchor = doc.find_by_id(&ElementId::from("sensor-badge")).unwrap();
    assert_eq!(doc.style(anchor, "pointer-events"), None);
}

#[tokio::test]
async fn replace_host_variant_flips_pointer_events_and_back() {
    let mut doc = document_with_ids(&["panel"]);
    let config: Vec<CardHostConfig> = serde_yml::from_str(
        r"
- target: panel
  mode: replace
  card: { type: gauge }
  variants:
    - conditions: [{ entity: binary_sensor.presence, state: 'off' }]
      pointer_events: none
",
    )
    .unwrap();
    let mut engine = CardHostEngine::default();

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("binary_sensor.presence", "on"));
    engine.init(&mut doc, &config, &snapshot, &NullCardRenderer).unwrap();
    let mount = engine.mount_for("panel").unwrap();
    assert_eq!(doc.style(mount, "pointer-events"), Some("auto"));

    snapshot.insert(EntityState::new("binary_sensor.presence", "off"));
    engine
        .update(&mut doc, &batch(&["binary_sensor.presence"]), &snapshot, &NullCardRenderer)
        .unwrap();
    assert_eq!(doc.style(mount, "pointer-events"), Some("none"));

    snapshot.insert(EntityState::new("binary_sensor.presence", "on"));
    engine
        .update(&mut doc, &batch(&["binary_sensor.presence"]), &snapshot, &NullCardRenderer)
        .unwrap();
    assert_eq!(doc.style(mount, "pointer-events"), Some("auto"));
}

#[tokio::test]
async fn style_set_passes_a_literal_payload_through_unchanged() {
    let doc = document_with_ids(&["zone"]);
    let mut controller = controller(
        r"
image: /local/plan.svg
rules:
  - entity: sensor.zone
    element: zone
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'fill: rgb(200, 10, 10); stroke-width: 2'
",
        doc,
    )
    .await;

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("sensor.zone", "alert"));
    controller.handle_state_batch(&batch(&["sensor.zone"]), snapshot);

    let handle = controller.document().find_by_id(&ElementId::from("zone")).unwrap();
    assert_eq!(controller.document().style(handle, "fill"), Some("rgb(200, 10, 10)"));
    assert_eq!(controller.document().style(handle, "stroke-width"), Some("2"));
}

#[tokio::test]
async fn keyed_variant_maps_normalize_in_declaration_order() {
    let config: CardHostConfig = serde_yml::from_str(
        r"
target: panel
card: { type: gauge }
variants:
  night:
    conditions: [{ entity: sun.sun, state: below_horizon }]
    visible: false
  day:
    conditions: [{ entity: sun.sun, state: above_horizon }]
",
    )
    .unwrap();

    let variants = config.variant_list();
    assert_eq!(variants.len(), 2);
    assert_eq!(variants[0].id.as_deref(), Some("night"));
    assert_eq!(variants[1].id.as_deref(), Some("day"));

    // First match wins in that same order.
    let mut doc = document_with_ids(&["panel"]);
    let mut engine = CardHostEngine::default();
    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("sun.sun", "below_horizon"));
    engine
        .init(&mut doc, std::slice::from_ref(&config), &snapshot, &NullCardRenderer)
        .unwrap();
    let mount = engine.mount_for("panel").unwrap();
    assert_eq!(doc.style(mount, "display"), Some("none"));
}

/// Two rules styling one element apply in declaration order within a batch,
/// so the later rule's properties win on overlap. This ordering is a
/// property of the configuration, not a guarantee worth depending on.
#[tokio::test]
async fn overlapping_rules_apply_in_declaration_order() {
    let doc = document_with_ids(&["shared"]);
    let mut controller = controller(
        r"
image: /local/plan.svg
rules:
  - entity: sensor.reading
    element: shared
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'fill: green; opacity: 0.2'
  - entity: sensor.reading
    element: shared
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'fill: purple'
",
        doc,
    )
    .await;

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("sensor.reading", "42"));
    controller.handle_state_batch(&batch(&["sensor.reading"]), snapshot);

    let handle = controller.document().find_by_id(&ElementId::from("shared")).unwrap();
    // The later rule restores the shared baseline before applying, so its
    // payload replaces the earlier rule's wholesale.
    assert_eq!(controller.document().style(handle, "fill"), Some("purple"));
    assert_eq!(controller.document().style(handle, "opacity"), None);
}

#[tokio::test]
async fn missing_elements_warn_and_the_rest_of_the_configuration_works() {
    let doc = document_with_ids(&["present"]);
    let mut controller = controller(
        r"
image: /local/plan.svg
rules:
  - entity: sensor.ghost
    element: not-in-document
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'fill: red'
  - entity: sensor.real
    element: present
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'fill: green'
",
        doc,
    )
    .await;

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("sensor.ghost", "1"));
    snapshot.insert(EntityState::new("sensor.real", "1"));
    controller.handle_state_batch(&batch(&["sensor.ghost", "sensor.real"]), snapshot);

    let handle = controller.document().find_by_id(&ElementId::from("present")).unwrap();
    assert_eq!(controller.document().style(handle, "fill"), Some("green"));
}

#[tokio::test]
async fn defaults_fill_rule_gaps_without_overriding_explicit_values() {
    let doc = document_with_ids(&["one", "two"]);
    let mut controller = controller(
        r"
image: /local/plan.svg
defaults:
  state_action:
    action: call-service
    service: floorplan.style_set
    service_data:
      style: 'opacity: 0.3'
rules:
  - entity: sensor.uses_default
    element: one
  - entity: sensor.has_own
    element: two
    state_action:
      action: call-service
      service: floorplan.style_set
      service_data:
        style: 'opacity: 0.9'
",
        doc,
    )
    .await;

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(EntityState::new("sensor.uses_default", "x"));
    snapshot.insert(EntityState::new("sensor.has_own", "y"));
    controller.handle_state_batch(&batch(&["sensor.uses_default", "sensor.has_own"]), snapshot);

    let doc = controller.document();
    let one = doc.find_by_id(&ElementId::from("one")).unwrap();
    let two = doc.find_by_id(&ElementId::from("two")).unwrap();
    assert_eq!(doc.style(one, "opacity"), Some("0.3"));
    assert_eq!(doc.style(two, "opacity"), Some("0.9"));
}

#[tokio::test]
async fn legacy_card_hosts_key_still_mounts() {
    let mut doc = document_with_ids(&["panel"]);
    let config = FloorplanConfig::parse(
        r"
image: /local/plan.svg
card_hosts:
  - target: panel
    card: { type: gauge }
",
    )
    .unwrap();
    let mut engine = CardHostEngine::default();
    engine
        .init(&mut doc, config.effective_cards(), &StateSnapshot::default(), &NullCardRenderer)
        .unwrap();
    assert_eq!(engine.host_count(), 1);
}

#[tokio::test]
async fn index_rebuild_discards_previous_runtime_state() {
    let doc = document_with_ids(&["lamp"]);
    let config = FloorplanConfig::parse(
        r"
rules:
  - entity: light.lamp
    element: lamp
",
    )
    .unwrap();
    let index = ElementIndex::build(&config.rules, &doc);
    assert!(index.tracks_entity(&EntityId::from("light.lamp")));

    let replacement = FloorplanConfig::parse(
        r"
rules:
  - entity: light.other
    element: lamp
",
    )
    .unwrap();
    let rebuilt = ElementIndex::build(&replacement.rules, &doc);
    assert!(!rebuilt.tracks_entity(&EntityId::from("light.lamp")));
    assert!(rebuilt.tracks_entity(&EntityId::from("light.other")));
}

#[tokio::test]
async fn hover_info_events_echo_only_filtered_attributes() {
    let events = Arc::new(CapturingEvents::default());
    let config = FloorplanConfig::parse(
        r"
image: /local/plan.svg
rules:
  - entity: sensor.temp
    element: gauge
    hover_action: hover-info
    hover_info_filter: [unit]
",
    )
    .expect("valid configuration");
    let mut controller = FloorplanController::init(
        config,
        document_with_ids(&["gauge"]),
        collaborators_with_events(Arc::clone(&events)),
        1024,
    )
    .await
    .expect("controller init");

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(
        EntityState::new("sensor.temp", "21.5")
            .with_attribute("unit", serde_json::json!("°C"))
            .with_attribute("battery", serde_json::json!(87)),
    );
    controller.handle_state_batch(&batch(&["sensor.temp"]), snapshot);

    let contexts = controller.handle_interaction(InteractionKind::Hover, &ElementId::from("gauge"));
    assert_eq!(contexts.len(), 1);

    let emitted = events.events();
    assert_eq!(emitted.len(), 1, "one event per hover-info dispatch");
    let event = &emitted[0];
    assert!(matches!(event.action, ActionConfig::HoverInfo));
    assert_eq!(event.entity_id.as_ref().map(EntityId::as_str), Some("sensor.temp"));
    assert_eq!(event.element_id.as_ref().map(ElementId::as_str), Some("gauge"));
    let keys: Vec<&str> = event.attributes.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["unit"], "attributes outside the filter are dropped");
}

#[tokio::test]
async fn service_dispatch_emits_one_event_with_resolved_payload() {
    let events = Arc::new(CapturingEvents::default());
    let config = FloorplanConfig::parse(
        r"
image: /local/plan.svg
rules:
  - entity: light.lamp
    element: lamp
    state_action:
      action: call-service
      service: notify.send
      service_data:
        message: 'lamp is ${entity.state}'
",
    )
    .expect("valid configuration");
    let mut controller = FloorplanController::init(
        config,
        document_with_ids(&["lamp"]),
        collaborators_with_events(Arc::clone(&events)),
        1024,
    )
    .await
    .expect("controller init");

    let mut snapshot = StateSnapshot::default();
    snapshot.insert(
        EntityState::new("light.lamp", "on").with_attribute("brightness", serde_json::json!(200)),
    );
    controller.handle_state_batch(&batch(&["light.lamp"]), snapshot);

    let emitted = events.events();
    assert_eq!(emitted.len(), 1, "one event per outbound service call");
    let event = &emitted[0];
    let ActionConfig::CallService { service, service_data, .. } = &event.action else {
        assert!(false, "expected a call-service event");
        return;
    };
    assert_eq!(service, "notify.send");
    assert_eq!(service_data.get("message"), Some(&serde_json::json!("lamp is on")));
    assert_eq!(event.entity_id.as_ref().map(EntityId::as_str), Some("light.lamp"));
    assert!(event.rule.is_some());
    // The unfiltered surface carries every attribute.
    assert!(event.attributes.contains_key("brightness"));
}
