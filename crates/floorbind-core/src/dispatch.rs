//! Action dispatcher: executes resolved action lists against the host
//! command surface and the graphic document.
//!
//! Host-facing commands (toggle, call-service, navigate, open-url,
//! more-info) go through the [`CommandSink`] seam. `call-service` actions
//! whose domain is `floorplan` never leave the engine; they mutate the
//! document directly (`style_set`, `class_set`, `class_toggle`, `text_set`,
//! `image_set`). Service payloads are template-resolved before dispatch.
//!
//! Every action in a list executes independently: a failing action is
//! logged with its error and the remainder of the list still runs.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use floorbind_types::{
    ActionConfig, ElementId, EntityId, EntityState, split_service,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::assets::{AssetLoader, ImageLoadHandle};
use crate::document::{DocumentError, GraphicDocument};
use crate::index::{RuleIdx, SvgElementInfo};

// ---- errors ----

/// Failures raised while executing a single action.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The host command surface rejected a command.
    #[error("host command `{command}` failed: {reason}")]
    Command {
        /// The command that failed.
        command: &'static str,
        /// Sink-provided failure description.
        reason: String,
    },

    /// A document mutation from an internal service failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// A registered custom function returned an error.
    #[error("custom function `{name}` failed: {reason}")]
    Function {
        /// The registry name of the function.
        name: String,
        /// Function-provided failure description.
        reason: String,
    },
}

// ---- host command seam ----

/// The host's command surface.
///
/// The engine never talks to a dashboard directly; an adapter implements
/// this trait against whatever host it embeds in.
pub trait CommandSink: Send + Sync {
    /// Toggle an entity.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Command`] when the host rejects the command.
    fn toggle(&self, entity: &EntityId) -> Result<(), DispatchError>;

    /// Invoke a host service with a resolved payload.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Command`] when the host rejects the command.
    fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &serde_json::Value,
        entity: Option<&EntityId>,
    ) -> Result<(), DispatchError>;

    /// Change the active dashboard view.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Command`] when the host rejects the command.
    fn navigate(&self, path: &str) -> Result<(), DispatchError>;

    /// Open an external resource.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Command`] when the host rejects the command.
    fn open_url(&self, url: &str) -> Result<(), DispatchError>;

    /// Surface the entity-detail dialog. `hover` marks the transient
    /// hover-info flavor.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Command`] when the host rejects the command.
    fn more_info(&self, entity: &EntityId, hover: bool) -> Result<(), DispatchError>;
}

/// Sink that accepts and drops every command.
///
/// Used when no host adapter is wired up, and by tests that only exercise
/// document-side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCommandSink;

impl CommandSink for NullCommandSink {
    fn toggle(&self, _entity: &EntityId) -> Result<(), DispatchError> {
        Ok(())
    }

    fn call_service(
        &self,
        _domain: &str,
        _service: &str,
        _data: &serde_json::Value,
        _entity: Option<&EntityId>,
    ) -> Result<(), DispatchError> {
        Ok(())
    }

    fn navigate(&self, _path: &str) -> Result<(), DispatchError> {
        Ok(())
    }

    fn open_url(&self, _url: &str) -> Result<(), DispatchError> {
        Ok(())
    }

    fn more_info(&self, _entity: &EntityId, _hover: bool) -> Result<(), DispatchError> {
        Ok(())
    }
}

// ---- event seam ----

/// One dispatched action, echoed to the embedding host.
#[derive(Debug, Clone)]
pub struct ActionCallEvent {
    /// The action as dispatched, with templates already resolved.
    pub action: ActionConfig,
    /// The entity the action ran for, when there was one.
    pub entity_id: Option<EntityId>,
    /// The first element the action targeted, when there was one.
    pub element_id: Option<ElementId>,
    /// The rule the action came from, when it came from a rule.
    pub rule: Option<RuleIdx>,
    /// Entity attributes echoed with the event. For hover-info this is
    /// limited to the rule's `hover_info_filter` when one is set.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// Receives [`ActionCallEvent`]s for the host's event surface.
pub trait EventSink: Send + Sync {
    /// Called once per dispatched host-facing action.
    fn action_called(&self, event: &ActionCallEvent);
}

/// Event sink that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn action_called(&self, _event: &ActionCallEvent) {}
}

// ---- custom function registry ----

/// A user-supplied action implementation.
pub type CustomFunction =
    Box<dyn Fn(&mut GraphicDocument, &ActionContext<'_>) -> Result<(), DispatchError> + Send + Sync>;

/// Named custom functions invocable through `action: custom`.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, CustomFunction>,
}

impl FunctionRegistry {
    /// Register a function under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, function: CustomFunction) {
        self.functions.insert(name.into(), function);
    }

    /// Look up a function by name.
    pub fn get(&self, name: &str) -> Option<&CustomFunction> {
        self.functions.get(name)
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---- execution context ----

/// Everything one action execution can draw on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionContext<'a> {
    /// The entity the triggering rule matched, if any.
    pub entity_id: Option<&'a EntityId>,
    /// That entity's current state, if known.
    pub state: Option<&'a EntityState>,
    /// The rule's resolved target elements; internal services apply to all
    /// of them.
    pub elements: &'a [SvgElementInfo],
    /// The rule the actions came from.
    pub rule: Option<RuleIdx>,
    /// Attribute names echoed with hover-info events; empty means all.
    pub hover_info_filter: &'a [String],
}

impl ActionContext<'_> {
    fn first_element_id(&self) -> Option<ElementId> {
        self.elements.first().map(|element| element.element_id.clone())
    }

    /// Entity attributes for the event surface, honoring the hover filter
    /// when `filtered` is set.
    fn event_attributes(&self, filtered: bool) -> BTreeMap<String, serde_json::Value> {
        let Some(state) = self.state else {
            return BTreeMap::new();
        };
        state
            .attributes
            .iter()
            .filter(|(name, _)| {
                !filtered
                    || self.hover_info_filter.is_empty()
                    || self.hover_info_filter.contains(name)
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

/// An image load started by `floorplan.image_set`.
///
/// The caller stashes the handle on the originating rule; replacing the
/// previous handle drops it, which aborts the superseded load.
#[derive(Debug)]
pub struct StartedImageLoad {
    /// The rule the load belongs to.
    pub rule: Option<RuleIdx>,
    /// The abort handle for the spawned fetch.
    pub handle: ImageLoadHandle,
}

/// A completed image fetch, delivered through the dispatcher's channel and
/// applied to the document by the controller between batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpdate {
    /// The element whose content is replaced.
    pub element: ElementId,
    /// The fetched markup.
    pub content: String,
}

// ---- dispatcher ----

/// Executes resolved action lists.
pub struct ActionDispatcher<A> {
    assets: Arc<A>,
    commands: Arc<dyn CommandSink>,
    events: Arc<dyn EventSink>,
    functions: FunctionRegistry,
    variables: BTreeMap<String, serde_json::Value>,
    image_tx: mpsc::UnboundedSender<ImageUpdate>,
}

impl<A> fmt::Debug for ActionDispatcher<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("functions", &self.functions)
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl<A: AssetLoader + 'static> ActionDispatcher<A> {
    /// Build a dispatcher and the receiving end of its image-update
    /// channel. The caller drains the receiver and applies each update to
    /// the document.
    pub fn new(
        assets: Arc<A>,
        commands: Arc<dyn CommandSink>,
        events: Arc<dyn EventSink>,
    ) -> (Self, mpsc::UnboundedReceiver<ImageUpdate>) {
        let (image_tx, image_rx) = mpsc::unbounded_channel();
        (
            Self {
                assets,
                commands,
                events,
                functions: FunctionRegistry::default(),
                variables: BTreeMap::new(),
                image_tx,
            },
            image_rx,
        )
    }

    /// The custom function registry.
    pub const fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Replace the `${var.<name>}` substitution table.
    pub fn set_variables(&mut self, variables: BTreeMap<String, serde_json::Value>) {
        self.variables = variables;
    }

    /// Run every action in order. A failing action is logged and skipped;
    /// it never aborts the rest of the list. Returns the image loads the
    /// list started, for the caller to stash on the originating rules.
    pub fn execute_all(
        &self,
        document: &mut GraphicDocument,
        actions: &[ActionConfig],
        context: &ActionContext<'_>,
    ) -> Vec<StartedImageLoad> {
        let mut loads = Vec::new();
        for action in actions {
            match self.execute_one(document, action, context) {
                Ok(Some(load)) => loads.push(load),
                Ok(None) => {}
                Err(error) => {
                    warn!(entity = ?context.entity_id, error = %error, "action failed, continuing");
                }
            }
        }
        loads
    }

    fn execute_one(
        &self,
        document: &mut GraphicDocument,
        action: &ActionConfig,
        context: &ActionContext<'_>,
    ) -> Result<Option<StartedImageLoad>, DispatchError> {
        match action {
            ActionConfig::Toggle { entity } => {
                let Some(entity) = entity.as_ref().or(context.entity_id) else {
                    warn!("toggle action without an entity, skipping");
                    return Ok(None);
                };
                debug!(entity = %entity, domain = entity.domain(), "toggle dispatched");
                self.commands.toggle(entity)?;
            }
            ActionConfig::CallService { service, service_data, entity } => {
                let (domain, name) = split_service(service);
                let data = self.resolve_value(service_data, context);
                if domain == "floorplan" {
                    return self.internal_service(document, name, &data, context);
                }
                if name.is_empty() {
                    warn!(service, "service name has no domain separator, skipping");
                    return Ok(None);
                }
                let entity = entity.as_ref().or(context.entity_id);
                self.events.action_called(&ActionCallEvent {
                    action: ActionConfig::CallService {
                        service: service.clone(),
                        service_data: data.clone(),
                        entity: entity.cloned(),
                    },
                    entity_id: entity.cloned(),
                    element_id: context.first_element_id(),
                    rule: context.rule,
                    attributes: context.event_attributes(false),
                });
                self.commands.call_service(domain, name, &data, entity)?;
            }
            ActionConfig::Navigate { navigation_path } => {
                let path = self.resolve_text_to_string(navigation_path, context);
                self.commands.navigate(&path)?;
            }
            ActionConfig::Url { url_path } => {
                let url = self.resolve_text_to_string(url_path, context);
                self.commands.open_url(&url)?;
            }
            ActionConfig::MoreInfo { entity } => {
                let Some(entity) = entity.as_ref().or(context.entity_id) else {
                    warn!("more-info action without an entity, skipping");
                    return Ok(None);
                };
                self.commands.more_info(entity, false)?;
            }
            ActionConfig::HoverInfo => {
                let Some(entity) = context.entity_id else {
                    debug!("hover-info without an entity, skipping");
                    return Ok(None);
                };
                self.events.action_called(&ActionCallEvent {
                    action: ActionConfig::HoverInfo,
                    entity_id: Some(entity.clone()),
                    element_id: context.first_element_id(),
                    rule: context.rule,
                    attributes: context.event_attributes(true),
                });
                self.commands.more_info(entity, true)?;
            }
            ActionConfig::NoAction => {}
            ActionConfig::Custom { name } => match self.functions.get(name) {
                Some(function) => function(document, context)?,
                None => warn!(function = name, "unknown custom function, skipping"),
            },
        }
        Ok(None)
    }

    // ---- internal floorplan services ----

    fn internal_service(
        &self,
        document: &mut GraphicDocument,
        name: &str,
        data: &serde_json::Value,
        context: &ActionContext<'_>,
    ) -> Result<Option<StartedImageLoad>, DispatchError> {
        match name {
            "style_set" => {
                let Some(style) = string_payload(data, "style") else {
                    warn!("floorplan.style_set without a style payload, skipping");
                    return Ok(None);
                };
                for element in context.elements {
                    document.set_style_block(element.handle, &style)?;
                }
            }
            "class_set" => {
                let Some(classes) = string_payload(data, "class") else {
                    warn!("floorplan.class_set without a class payload, skipping");
                    return Ok(None);
                };
                for element in context.elements {
                    document.set_classes(
                        element.handle,
                        classes.split_whitespace().map(str::to_owned),
                    )?;
                }
            }
            "class_toggle" => {
                let Some(class) = string_payload(data, "class") else {
                    warn!("floorplan.class_toggle without a class payload, skipping");
                    return Ok(None);
                };
                for element in context.elements {
                    document.toggle_class(element.handle, &class)?;
                }
            }
            "text_set" => {
                let Some(text) = string_payload(data, "text") else {
                    warn!("floorplan.text_set without a text payload, skipping");
                    return Ok(None);
                };
                for element in context.elements {
                    document.set_text(element.handle, &text)?;
                }
            }
            "image_set" => {
                let Some(location) = string_payload(data, "image") else {
                    warn!("floorplan.image_set without an image payload, skipping");
                    return Ok(None);
                };
                return Ok(Some(self.start_image_load(location, context)));
            }
            other => warn!(service = other, "unknown floorplan service, skipping"),
        }
        Ok(None)
    }

    /// Spawn the fetch for an `image_set` and return its handle. Fetch
    /// failure is logged inside the task; the previous image stays.
    fn start_image_load(&self, location: String, context: &ActionContext<'_>) -> StartedImageLoad {
        let loader = Arc::clone(&self.assets);
        let tx = self.image_tx.clone();
        let elements: Vec<ElementId> = context
            .elements
            .iter()
            .map(|element| element.element_id.clone())
            .collect();
        let fetch_location = location.clone();
        let task = tokio::spawn(async move {
            match loader.fetch_text(&fetch_location).await {
                Ok(content) => {
                    for element in elements {
                        let update = ImageUpdate { element, content: content.clone() };
                        if tx.send(update).is_err() {
                            return;
                        }
                    }
                }
                Err(error) => {
                    warn!(location = %fetch_location, error = %error, "image fetch failed, keeping previous image");
                }
            }
        });
        StartedImageLoad {
            rule: context.rule,
            handle: ImageLoadHandle::new(location, task.abort_handle()),
        }
    }

    // ---- template resolution ----

    /// Resolve `${...}` placeholders recursively through a payload.
    fn resolve_value(
        &self,
        value: &serde_json::Value,
        context: &ActionContext<'_>,
    ) -> serde_json::Value {
        match value {
            serde_json::Value::String(text) => self.resolve_text(text, context),
            serde_json::Value::Array(items) => serde_json::Value::Array(
                items.iter().map(|item| self.resolve_value(item, context)).collect(),
            ),
            serde_json::Value::Object(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(key, item)| (key.clone(), self.resolve_value(item, context)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Resolve placeholders in one string. A string that is exactly one
    /// placeholder keeps the substituted value's type; mixed text
    /// interpolates. Unknown placeholders are left literal and logged.
    fn resolve_text(&self, text: &str, context: &ActionContext<'_>) -> serde_json::Value {
        if let Some(path) = text
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            && !rest_contains_placeholder(path)
        {
            if let Some(value) = self.placeholder_value(path, context) {
                return value;
            }
            warn!(placeholder = path, "unresolved template placeholder, keeping literal");
            return serde_json::Value::String(text.to_owned());
        }

        let mut out = String::new();
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            let Some(end) = rest.get(start..).and_then(|tail| tail.find('}')) else {
                break;
            };
            out.push_str(rest.get(..start).unwrap_or_default());
            let path = rest.get(start.saturating_add(2)..start.saturating_add(end)).unwrap_or_default();
            match self.placeholder_value(path, context) {
                Some(value) => out.push_str(&value_to_text(&value)),
                None => {
                    warn!(placeholder = path, "unresolved template placeholder, keeping literal");
                    out.push_str(rest.get(start..=start.saturating_add(end)).unwrap_or_default());
                }
            }
            rest = rest.get(start.saturating_add(end).saturating_add(1)..).unwrap_or_default();
        }
        out.push_str(rest);
        serde_json::Value::String(out)
    }

    fn resolve_text_to_string(&self, text: &str, context: &ActionContext<'_>) -> String {
        value_to_text(&self.resolve_text(text, context))
    }

    /// Value for one placeholder path: `entity.state`,
    /// `entity.attributes.<key>`, or `var.<name>`.
    fn placeholder_value(
        &self,
        path: &str,
        context: &ActionContext<'_>,
    ) -> Option<serde_json::Value> {
        if path == "entity.state" {
            return context
                .state
                .map(|state| serde_json::Value::String(state.state.clone()));
        }
        if let Some(key) = path.strip_prefix("entity.attributes.") {
            return context.state.and_then(|state| state.attributes.get(key)).cloned();
        }
        if path == "entity.entity_id" {
            return context
                .entity_id
                .map(|entity| serde_json::Value::String(entity.as_str().to_owned()));
        }
        path.strip_prefix("var.")
            .and_then(|name| self.variables.get(name))
            .cloned()
    }
}

/// Whether a placeholder body itself opens another placeholder, which
/// disqualifies the whole-string fast path.
fn rest_contains_placeholder(path: &str) -> bool {
    path.contains("${") || path.contains('}')
}

/// Accept a payload that is either a bare string or an object with the
/// given key.
fn string_payload(data: &serde_json::Value, key: &str) -> Option<String> {
    match data {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Object(entries) => entries
            .get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ---- tests ----
