//! Typed string identifier wrappers for entities and graphic elements.
//!
//! Home Assistant identifies devices by stable strings (`sensor.demo`,
//! `light.kitchen`) and SVG documents identify graphic nodes by element id.
//! Wrapping both in newtypes prevents accidental mixing of the two
//! namespaces at compile time -- an entity id is never a valid lookup key
//! for the graphic arena and vice versa.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `String` with standard derives.
macro_rules! define_str_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from anything string-like.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_str_id! {
    /// Identifier of a smart-home entity, e.g. `sensor.moisture_level`.
    EntityId
}

define_str_id! {
    /// Identifier of one graphic node inside the loaded SVG document.
    ElementId
}

impl EntityId {
    /// The domain portion of the entity id (the text before the first `.`).
    /// An id without a `.` is its own domain.
    pub fn domain(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl ElementId {
    /// Strip a leading `#` so `#target` and `target` address the same node.
    pub fn from_selector(selector: &str) -> Self {
        Self(selector.strip_prefix('#').unwrap_or(selector).to_owned())
    }
}
