//! Card host engine: mounts embedded cards onto graphic anchor elements and
//! keeps them in sync with entity state.
//!
//! Each configured host resolves one anchor element and places a mount
//! container there. `replace` mode empties the anchor and keeps its element
//! id; `overlay` mode layers the mount as the anchor's next sibling and
//! leaves the original node untouched. Card content itself is opaque to this
//! crate and is produced through the [`CardRenderer`] seam.
//!
//! Placement mode is fixed when the host is first set up. Variant switches
//! afterwards re-render content, visibility, and pointer-events in the
//! existing mount; they never re-place it.

use std::collections::{BTreeMap, BTreeSet};

use floorbind_types::{
    CardHostConfig, EntityId, FitMode, HostMode, NaturalSize, StateSnapshot, VariantConfig,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{DocumentError, GraphicDocument, NodeHandle, Rect};

// ---- errors ----

/// Failures raised while mounting or updating card hosts.
#[derive(Debug, Error)]
pub enum CardHostError {
    /// A document mutation on a host-owned node failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// The renderer could not produce content for a host's card.
    #[error("card render failed for host `{host}`: {reason}")]
    Render {
        /// The host key.
        host: String,
        /// Renderer-reported failure description.
        reason: String,
    },
}

// ---- renderer seam ----

/// Produces the content subtree for an embedded card.
///
/// The card configuration is an opaque value handed through from the host
/// configuration. A renderer builds whatever nodes it needs under `mount`
/// and may report the content's natural size for `contain`/`cover` scaling.
pub trait CardRenderer: Send + Sync {
    /// Build the card's content under `mount`.
    ///
    /// # Errors
    ///
    /// [`CardHostError::Render`] when the card configuration cannot be
    /// realized; the engine logs it and leaves the mount empty.
    fn render(
        &self,
        document: &mut GraphicDocument,
        mount: NodeHandle,
        card: &serde_json::Value,
    ) -> Result<Option<NaturalSize>, CardHostError>;
}

/// Renderer that mounts nothing. Used when no card collaborator is wired
/// up, and by tests that only exercise placement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCardRenderer;

impl CardRenderer for NullCardRenderer {
    fn render(
        &self,
        _document: &mut GraphicDocument,
        _mount: NodeHandle,
        _card: &serde_json::Value,
    ) -> Result<Option<NaturalSize>, CardHostError> {
        Ok(None)
    }
}

// ---- runtime state ----

/// One mounted host.
#[derive(Debug)]
struct HostRuntime {
    config: CardHostConfig,
    key: String,
    mount: NodeHandle,
    /// Natural size reported by the renderer for the current content.
    rendered_natural: Option<NaturalSize>,
    /// Target rect the content is fitted into (the anchor's bbox when known).
    target: Option<Rect>,
    /// Index into the variant list; `None` is the baseline configuration.
    active_variant: Option<usize>,
    subscriptions: BTreeSet<EntityId>,
}

impl HostRuntime {
    fn variant(&self) -> Option<&VariantConfig> {
        self.active_variant
            .and_then(|index| self.config.variant_list().get(index))
    }

    fn effective_card(&self) -> Option<&serde_json::Value> {
        self.variant()
            .and_then(|variant| variant.card.as_ref())
            .or(self.config.card.as_ref())
    }

    fn effective_visible(&self) -> bool {
        self.variant()
            .and_then(|variant| variant.visible)
            .or(self.config.visible)
            .unwrap_or(true)
    }

    fn effective_pointer_events(&self) -> &str {
        self.variant()
            .and_then(|variant| variant.pointer_events.as_deref())
            .or(self.config.pointer_events.as_deref())
            .unwrap_or("auto")
    }

    const fn effective_fit(&self) -> FitMode {
        self.config.fit
    }
}

// ---- engine ----

/// Mounts and maintains every configured card host against one document.
#[derive(Debug, Default)]
pub struct CardHostEngine {
    hosts: Vec<HostRuntime>,
    by_key: BTreeMap<String, usize>,
}

impl CardHostEngine {
    /// Mount every configured host that is not already mounted.
    ///
    /// Setup is idempotent by host key (explicit `id`, else the resolved
    /// anchor id): a second call for the same configuration is a no-op.
    /// Hosts with no resolvable anchor are logged and skipped; the rest of
    /// the list is still processed.
    ///
    /// # Errors
    ///
    /// [`CardHostError::Document`] when one of the engine's own node
    /// handles has gone stale, which indicates the document was swapped
    /// without resetting the engine.
    pub fn init(
        &mut self,
        document: &mut GraphicDocument,
        configs: &[CardHostConfig],
        snapshot: &StateSnapshot,
        renderer: &dyn CardRenderer,
    ) -> Result<(), CardHostError> {
        for config in configs {
            let Some(key) = config.host_key() else {
                warn!("card host has no id and no anchor, skipping");
                continue;
            };
            if self.by_key.contains_key(&key) {
                debug!(host = %key, "card host already mounted, skipping");
                continue;
            }
            let Some(anchor_id) = config.anchor() else {
                warn!(host = %key, "card host has no anchor element, skipping");
                continue;
            };
            let Some(anchor) = document.find_by_id(&anchor_id) else {
                warn!(host = %key, anchor = %anchor_id, "anchor element not found, skipping");
                continue;
            };

            let target = config
                .foreign_object
                .map(|rect| Rect::new(rect.x, rect.y, rect.width, rect.height))
                .or_else(|| document.bbox(anchor));
            let active_variant = select_variant(config.variant_list(), snapshot);
            let mode = active_variant
                .and_then(|index| config.variant_list().get(index))
                .and_then(|variant| variant.mode)
                .unwrap_or(config.mode);

            let mount = match mode {
                HostMode::Replace => {
                    // The anchor keeps its element id; only its content is
                    // replaced by the mount container.
                    document.replace_children(anchor)?;
                    document.create_node(anchor, "foreignObject", None)?
                }
                HostMode::Overlay => {
                    let mount = document.insert_after(anchor, "foreignObject", None)?;
                    if let Some(bbox) = target {
                        document.set_bbox(mount, bbox)?;
                    }
                    mount
                }
            };

            let mut host = HostRuntime {
                config: config.clone(),
                key,
                mount,
                rendered_natural: None,
                target,
                active_variant,
                subscriptions: config.subscriptions().into_iter().collect(),
            };
            apply_content(&mut host, document, renderer)?;
            apply_presentation(&host, document)?;
            debug!(host = %host.key, mode = ?mode, variant = ?host.active_variant, "card host mounted");

            self.by_key.insert(host.key.clone(), self.hosts.len());
            self.hosts.push(host);
        }
        Ok(())
    }

    /// Re-evaluate hosts affected by a batch of entity changes.
    ///
    /// Only hosts whose subscription set intersects `changed` are
    /// considered; of those, only hosts whose active variant actually
    /// changes are touched. The mount node is reused in place.
    ///
    /// # Errors
    ///
    /// [`CardHostError::Document`] on a stale mount handle; see
    /// [`CardHostEngine::init`].
    pub fn update(
        &mut self,
        document: &mut GraphicDocument,
        changed: &BTreeSet<EntityId>,
        snapshot: &StateSnapshot,
        renderer: &dyn CardRenderer,
    ) -> Result<(), CardHostError> {
        for host in &mut self.hosts {
            if host.subscriptions.is_disjoint(changed) {
                continue;
            }
            let selected = select_variant(host.config.variant_list(), snapshot);
            if selected == host.active_variant {
                continue;
            }
            let previous_card = host.effective_card().cloned();
            host.active_variant = selected;
            debug!(host = %host.key, variant = ?selected, "card host variant changed");

            if host.effective_card() != previous_card.as_ref() {
                document.replace_children(host.mount)?;
                apply_content(host, document, renderer)?;
            }
            apply_presentation(host, document)?;
        }
        Ok(())
    }

    /// Number of mounted hosts.
    pub const fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// The mount node for a host key, when mounted.
    pub fn mount_for(&self, key: &str) -> Option<NodeHandle> {
        self.by_key.get(key).and_then(|index| self.hosts.get(*index)).map(|host| host.mount)
    }

    /// Drop all runtime state. Required before re-initializing against a
    /// freshly loaded document.
    pub fn reset(&mut self) {
        self.hosts.clear();
        self.by_key.clear();
    }
}

// ---- variant selection and fitting ----

/// First variant whose conditions all hold wins; a variant without
/// conditions always matches. `None` selects the baseline configuration.
fn select_variant(variants: &[VariantConfig], snapshot: &StateSnapshot) -> Option<usize> {
    variants.iter().position(|variant| {
        variant
            .conditions
            .iter()
            .all(|condition| condition.evaluate(snapshot.get(&condition.entity)))
    })
}

/// Render the host's effective card into its (empty) mount and refit.
fn apply_content(
    host: &mut HostRuntime,
    document: &mut GraphicDocument,
    renderer: &dyn CardRenderer,
) -> Result<(), CardHostError> {
    host.rendered_natural = None;
    if let Some(card) = host.effective_card().cloned() {
        match renderer.render(document, host.mount, &card) {
            Ok(natural) => host.rendered_natural = natural,
            // A failed render is isolated to this host; the mount stays
            // empty and the rest of the pass continues.
            Err(error) => warn!(host = %host.key, error = %error, "card render failed"),
        }
    }
    apply_fit(host, document)?;
    Ok(())
}

/// Visibility and pointer-events on the mount container.
fn apply_presentation(
    host: &HostRuntime,
    document: &mut GraphicDocument,
) -> Result<(), CardHostError> {
    document.set_style(host.mount, "pointer-events", host.effective_pointer_events())?;
    if host.effective_visible() {
        document.set_style(host.mount, "display", "block")?;
    } else {
        document.set_style(host.mount, "display", "none")?;
    }
    Ok(())
}

/// Apply the host's fit strategy as styles on the mount container.
fn apply_fit(host: &HostRuntime, document: &mut GraphicDocument) -> Result<(), CardHostError> {
    match host.effective_fit() {
        FitMode::Fill => {
            document.set_style(host.mount, "width", "100%")?;
            document.set_style(host.mount, "height", "100%")?;
        }
        FitMode::Contain | FitMode::Cover => {
            let Some(target) = host.target else {
                debug!(host = %host.key, "no anchor bbox, skipping fit scaling");
                return Ok(());
            };
            // Natural size: explicit hint, then renderer-reported, then the
            // anchor bbox itself (scale 1).
            let natural = host
                .config
                .default_size
                .or(host.rendered_natural)
                .unwrap_or(NaturalSize { width: target.width, height: target.height });
            if let Some(scale) = fit_scale(host.effective_fit(), target, natural) {
                document.set_style(host.mount, "transform", format!("scale({scale})"))?;
            }
        }
        FitMode::None => {}
    }
    Ok(())
}

/// Uniform scale for `contain` (min axis ratio) and `cover` (max axis
/// ratio). `None` when the natural size is degenerate.
fn fit_scale(fit: FitMode, target: Rect, natural: NaturalSize) -> Option<f64> {
    if natural.width <= 0.0 || natural.height <= 0.0 {
        return None;
    }
    let horizontal = target.width / natural.width;
    let vertical = target.height / natural.height;
    match fit {
        FitMode::Contain => Some(horizontal.min(vertical)),
        FitMode::Cover => Some(horizontal.max(vertical)),
        FitMode::Fill | FitMode::None => None,
    }
}

// ---- tests ----
