//! The floorplan controller: owns one configuration, one document, and the
//! engines that keep them in sync.
//!
//! Initialization order is fixed: logging, image and stylesheet fetch,
//! rule defaults, element index, card hosts, then the `startup_action`.
//! A missing image is the one fatal configuration error; everything else
//! degrades with a warning.
//!
//! Reconfiguration is sequenced against state batches: [`FloorplanController::reload`]
//! applies immediately between batches, while [`FloorplanController::request_reload`]
//! queues the new configuration to be applied atomically after the next
//! batch finishes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use floorbind_types::{
    ElementId, EntityId, FloorplanConfig, StateSnapshot,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assets::{AssetError, AssetLoader, ImageLoadHandle};
use crate::cardhost::{CardHostEngine, CardHostError, CardRenderer};
use crate::dispatch::{
    ActionContext, ActionDispatcher, CommandSink, EventSink, FunctionRegistry, ImageUpdate,
};
use crate::document::{DocumentError, GraphicDocument};
use crate::index::{ElementIndex, RuleIdx};
use crate::interact::{ClickContext, InteractionKind, actions_for};
use crate::logging::init_logging;
use crate::reconcile::Reconciler;

// ---- errors ----

/// Fatal controller failures.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Neither `image` nor `image_mobile` is configured, or neither yields
    /// a location for the viewport.
    #[error("No image provided")]
    NoImage,

    /// The floorplan image could not be fetched.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// Card host setup failed on a stale document handle.
    #[error(transparent)]
    CardHost(#[from] CardHostError),

    /// A document mutation failed during initialization.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

// ---- collaborators ----

/// External collaborators the controller is wired to.
pub struct Collaborators<A> {
    /// Asset fetcher for images and stylesheets.
    pub assets: Arc<A>,
    /// The host's command surface.
    pub commands: Arc<dyn CommandSink>,
    /// The host's event surface.
    pub events: Arc<dyn EventSink>,
    /// Builder for embedded card content.
    pub renderer: Arc<dyn CardRenderer>,
}

impl<A> std::fmt::Debug for Collaborators<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

// ---- controller ----

/// One live floorplan instance.
pub struct FloorplanController<A> {
    instance: Uuid,
    config: FloorplanConfig,
    document: GraphicDocument,
    reconciler: Reconciler,
    cards: CardHostEngine,
    dispatcher: ActionDispatcher<A>,
    image_rx: mpsc::UnboundedReceiver<ImageUpdate>,
    renderer: Arc<dyn CardRenderer>,
    snapshot: StateSnapshot,
    image_markup: String,
    stylesheet: Option<String>,
    pending_reload: Option<FloorplanConfig>,
    startup_loads: Vec<ImageLoadHandle>,
}

impl<A> std::fmt::Debug for FloorplanController<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FloorplanController")
            .field("instance", &self.instance)
            .field("rules", &self.config.rules.len())
            .finish_non_exhaustive()
    }
}

impl<A: AssetLoader + 'static> FloorplanController<A> {
    /// Initialize a controller against an already-parsed graphic document.
    ///
    /// `viewport_width` selects among responsive image sizes.
    ///
    /// # Errors
    ///
    /// [`ControllerError::NoImage`] when the configuration names no image,
    /// and [`ControllerError::Asset`] when the image cannot be fetched.
    /// Stylesheet fetch failures are non-fatal.
    pub async fn init(
        mut config: FloorplanConfig,
        document: GraphicDocument,
        collaborators: Collaborators<A>,
        viewport_width: u32,
    ) -> Result<Self, ControllerError> {
        init_logging(config.console_log_level);
        let instance = Uuid::new_v4();
        info!(instance = %instance, rules = config.rules.len(), "floorplan initializing");

        let Some(location) = config
            .image
            .as_ref()
            .or(config.image_mobile.as_ref())
            .and_then(|source| source.location_for_width(viewport_width))
            .map(str::to_owned)
        else {
            error!("No image provided");
            return Err(ControllerError::NoImage);
        };
        let image_markup = collaborators.assets.fetch_text(&location).await?;

        let mut stylesheet = None;
        if let Some(source) = &config.stylesheet {
            match collaborators.assets.fetch_text(source.location()).await {
                Ok(css) => stylesheet = Some(css),
                Err(fetch_error) => {
                    warn!(location = source.location(), error = %fetch_error, "stylesheet fetch failed, continuing without it");
                }
            }
        }

        config.apply_defaults();
        let index = ElementIndex::build(&config.rules, &document);
        let (mut dispatcher, image_rx) = ActionDispatcher::new(
            Arc::clone(&collaborators.assets),
            collaborators.commands,
            collaborators.events,
        );
        dispatcher.set_variables(variable_table(&config));

        let mut controller = Self {
            instance,
            document,
            reconciler: Reconciler::new(index),
            cards: CardHostEngine::default(),
            dispatcher,
            image_rx,
            renderer: collaborators.renderer,
            snapshot: StateSnapshot::default(),
            image_markup,
            stylesheet,
            pending_reload: None,
            startup_loads: Vec::new(),
            config,
        };

        controller.cards.init(
            &mut controller.document,
            controller.config.effective_cards(),
            &controller.snapshot,
            controller.renderer.as_ref(),
        )?;
        controller.run_startup_action();
        info!(instance = %controller.instance, "floorplan ready");
        Ok(controller)
    }

    fn run_startup_action(&mut self) {
        let actions = self.config.startup_action.resolve();
        if actions.is_empty() {
            return;
        }
        let context = ActionContext::default();
        let loads = self
            .dispatcher
            .execute_all(&mut self.document, &actions, &context);
        // Keep the handles alive; dropping one aborts its fetch.
        self.startup_loads
            .extend(loads.into_iter().map(|load| load.handle));
    }

    /// Apply one batch of entity-state changes.
    ///
    /// Runs the reconciliation pass, updates affected card hosts, applies
    /// any completed image fetches, and finally applies a queued reload.
    /// Returns the number of rule bindings that ran.
    pub fn handle_state_batch(
        &mut self,
        changed: &BTreeSet<EntityId>,
        snapshot: StateSnapshot,
    ) -> usize {
        self.snapshot = snapshot;
        let applied = self.reconciler.update_states(
            &mut self.document,
            &self.dispatcher,
            changed,
            &self.snapshot,
        );
        if let Err(card_error) = self.cards.update(
            &mut self.document,
            changed,
            &self.snapshot,
            self.renderer.as_ref(),
        ) {
            warn!(error = %card_error, "card host update failed, continuing");
        }
        self.apply_pending_images();
        if let Some(config) = self.pending_reload.take()
            && let Err(reload_error) = self.apply_reload(config)
        {
            warn!(error = %reload_error, "queued reload failed, keeping previous configuration");
        }
        applied
    }

    /// Execute the actions a rule configures for a pointer interaction on
    /// an element. Returns the click contexts that ran, in rule order.
    pub fn handle_interaction(
        &mut self,
        kind: InteractionKind,
        element_id: &ElementId,
    ) -> Vec<ClickContext> {
        let rule_indices: Vec<RuleIdx> = self
            .reconciler
            .index()
            .rules_for_element(element_id)
            .to_vec();
        let mut contexts = Vec::new();

        for rule_idx in rule_indices {
            let Some(rule) = self.reconciler.index().rule(rule_idx) else {
                continue;
            };
            let actions = actions_for(kind, &rule.rule);
            if actions.is_empty() {
                continue;
            }
            let hover_info_filter = rule.rule.hover_info_filter.clone();
            let entity_id = rule
                .entity_elements
                .iter()
                .find(|(_, indices)| {
                    indices.iter().any(|index| {
                        rule.elements
                            .get(*index)
                            .is_some_and(|element| &element.element_id == element_id)
                    })
                })
                .map(|(entity, _)| entity.clone())
                .or_else(|| rule.rule.entity_ids().into_iter().next());
            let elements: Vec<_> = match &entity_id {
                Some(entity) => rule.elements_for(entity).cloned().collect(),
                None => rule.elements.clone(),
            };
            let state = entity_id
                .as_ref()
                .and_then(|entity| self.snapshot.get(entity))
                .cloned();

            let context = ActionContext {
                entity_id: entity_id.as_ref(),
                state: state.as_ref(),
                elements: &elements,
                rule: Some(rule_idx),
                hover_info_filter: &hover_info_filter,
            };
            let loads = self
                .dispatcher
                .execute_all(&mut self.document, &actions, &context);
            contexts.push(ClickContext {
                instance: self.instance,
                kind,
                element_id: element_id.clone(),
                rule: rule_idx,
                entity_id,
                actions,
            });
            for load in loads {
                let target = load.rule.unwrap_or(rule_idx);
                if let Some(rule) = self.reconciler.index_mut().rule_mut(target) {
                    rule.image_load = Some(load.handle);
                }
            }
        }
        contexts
    }

    /// Apply every completed image fetch to the document. Returns how many
    /// were applied.
    pub fn apply_pending_images(&mut self) -> usize {
        let mut applied = 0_usize;
        while let Ok(update) = self.image_rx.try_recv() {
            match self.apply_image_update(&update) {
                Ok(()) => applied = applied.saturating_add(1),
                Err(image_error) => {
                    warn!(element = %update.element, error = %image_error, "image update failed, keeping previous image");
                }
            }
        }
        applied
    }

    fn apply_image_update(&mut self, update: &ImageUpdate) -> Result<(), DocumentError> {
        let Some(handle) = self.document.find_by_id(&update.element) else {
            warn!(element = %update.element, "image target no longer in document, dropping update");
            return Ok(());
        };
        self.document.replace_children(handle)?;
        self.document.set_text(handle, update.content.clone())
    }

    /// Queue a reload to be applied after the next state batch.
    pub fn request_reload(&mut self, config: FloorplanConfig) {
        self.pending_reload = Some(config);
    }

    /// Reconfigure immediately against the current document.
    ///
    /// Every indexed element is restored to its baseline first, so the new
    /// index captures clean baselines. Card hosts are torn down and
    /// re-mounted. The image and stylesheet are not refetched.
    ///
    /// # Errors
    ///
    /// [`ControllerError::NoImage`] when the new configuration names no
    /// image; the previous configuration stays active.
    pub fn reload(&mut self, config: FloorplanConfig) -> Result<(), ControllerError> {
        self.apply_reload(config)
    }

    fn apply_reload(&mut self, mut config: FloorplanConfig) -> Result<(), ControllerError> {
        if config.image.is_none() && config.image_mobile.is_none() {
            error!("No image provided");
            return Err(ControllerError::NoImage);
        }
        self.restore_all_baselines();
        config.apply_defaults();
        let index = ElementIndex::build(&config.rules, &self.document);
        self.reconciler.replace_index(index);
        self.cards.reset();
        self.dispatcher.set_variables(variable_table(&config));
        self.config = config;
        self.cards.init(
            &mut self.document,
            self.config.effective_cards(),
            &self.snapshot,
            self.renderer.as_ref(),
        )?;
        info!(instance = %self.instance, rules = self.config.rules.len(), "configuration reloaded");
        Ok(())
    }

    fn restore_all_baselines(&mut self) {
        let mut baselines = Vec::new();
        for rule in self.reconciler.index().rules() {
            for element in &rule.elements {
                baselines.push((element.handle, element.baseline.clone()));
            }
        }
        for (handle, baseline) in baselines {
            if let Err(restore_error) = self.document.restore(handle, &baseline) {
                warn!(error = %restore_error, "baseline restore failed during reload");
            }
        }
    }

    // ---- accessors ----

    /// This controller instance's id, echoed on click contexts.
    pub const fn instance(&self) -> Uuid {
        self.instance
    }

    /// The active configuration.
    pub const fn config(&self) -> &FloorplanConfig {
        &self.config
    }

    /// The live document.
    pub const fn document(&self) -> &GraphicDocument {
        &self.document
    }

    /// Mutable access to the live document, for input adapters that track
    /// layout.
    pub const fn document_mut(&mut self) -> &mut GraphicDocument {
        &mut self.document
    }

    /// The fetched floorplan image markup.
    pub fn image_markup(&self) -> &str {
        &self.image_markup
    }

    /// The fetched stylesheet, when one was configured and reachable.
    pub fn stylesheet(&self) -> Option<&str> {
        self.stylesheet.as_deref()
    }

    /// The custom function registry.
    pub const fn functions_mut(&mut self) -> &mut FunctionRegistry {
        self.dispatcher.functions_mut()
    }

    /// The element index built from the active configuration.
    pub const fn index(&self) -> &ElementIndex {
        self.reconciler.index()
    }
}

fn variable_table(config: &FloorplanConfig) -> BTreeMap<String, serde_json::Value> {
    config
        .variables
        .iter()
        .map(|variable| (variable.name.clone(), variable.value.clone()))
        .collect()
}

// ---- tests ----
