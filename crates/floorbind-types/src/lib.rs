//! Shared type definitions for the floorbind binding engine.
//!
//! This crate is the single source of truth for the configuration model
//! and the entity-state snapshot types used across the floorbind
//! workspace. Configuration is parsed once, normalized to canonical
//! shapes here, and treated as immutable downstream.
//!
//! # Modules
//!
//! - [`ids`] -- Typed string identifiers for entities and graphic elements
//! - [`state`] -- Entity state snapshots delivered by the host platform
//! - [`actions`] -- The closed action set and action-slot normalization
//! - [`config`] -- The floorplan document: rules, defaults, assets, levels
//! - [`cards`] -- Card host configuration: variants, conditions, fit

pub mod actions;
pub mod cards;
pub mod config;
pub mod ids;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use actions::{ActionConfig, ActionSlot, ExplicitFalse, split_service};
pub use cards::{
    CardHostConfig, ConditionConfig, FitMode, HostMode, MountRect, NaturalSize, StringOrList,
    VariantConfig, VariantsConfig,
};
pub use config::{
    ConfigError, EntityBinding, FloorplanConfig, ImageConfig, ImageSize, ImageSource, LogLevel,
    RuleConfig, StylesheetConfig, StylesheetSource, VariableConfig,
};
pub use ids::{ElementId, EntityId};
pub use state::{EntityState, StateContext, StateSnapshot};
