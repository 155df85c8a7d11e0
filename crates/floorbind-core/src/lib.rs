//! Binding engine for entity-driven floorplan graphics.
//!
//! This crate turns a parsed floorplan configuration and a loaded graphic
//! document into a live instance: rules bind entities to graphic elements,
//! state batches restyle those elements, card hosts mount embedded cards
//! onto anchor elements, and pointer interactions dispatch configured
//! actions through the host's command surface.
//!
//! # Modules
//!
//! - [`document`] -- Index-addressed arena of graphic nodes with
//!   baseline snapshot and restore.
//! - [`index`] -- The element index: per-rule and per-entity runtime
//!   records built from one configuration against one document.
//! - [`cardhost`] -- Card host engine: replace/overlay placement, variant
//!   selection, fit strategies, [`CardRenderer`] seam.
//! - [`reconcile`] -- State reconciliation loop: restore-then-reapply, one
//!   batch at a time.
//! - [`dispatch`] -- Action dispatcher: [`CommandSink`] seam, internal
//!   `floorplan.*` services, service-data template resolution.
//! - [`interact`] -- Pure interaction-to-actions dispatch table.
//! - [`assets`] -- [`AssetLoader`] seam and abortable image loads.
//! - [`controller`] -- [`FloorplanController`]: initialization, batches,
//!   interactions, reload sequencing.
//! - [`logging`] -- Structured logging setup from the configured level.
//!
//! [`CardRenderer`]: cardhost::CardRenderer
//! [`CommandSink`]: dispatch::CommandSink
//! [`AssetLoader`]: assets::AssetLoader
//! [`FloorplanController`]: controller::FloorplanController

pub mod assets;
pub mod cardhost;
pub mod controller;
pub mod dispatch;
pub mod document;
pub mod index;
pub mod interact;
pub mod logging;
pub mod reconcile;
