//! Common types for homelab resource composition: errors, resource bodies,
//! the declaration graph and stack, stack references, and utilities

#![deny(missing_docs)]

pub mod config;
pub mod deferred;
pub mod error;
pub mod graph;
pub mod reference;
pub mod resource;
pub mod sequence;
pub mod stack;
pub mod urn;
pub mod yaml;

pub use config::{ComponentConfig, ConfigSource, SecretValue};
pub use deferred::{Deferred, ResourceOptions};
pub use error::Error;
pub use reference::StackReference;
pub use resource::{HasApiResource, ObjectMeta, ResourceBody};
pub use stack::{Component, ComponentUnit, Declared, Stack};
pub use urn::Urn;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Standard Kubernetes name label
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes managed-by label
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label for everything declared here
pub const LABEL_MANAGED_BY_HOMELAB: &str = "homelab";
