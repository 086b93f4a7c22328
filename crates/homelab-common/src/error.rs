//! Error types for homelab resource composition
//!
//! Errors are structured with fields so a failed declaration pass points at
//! the unit, component or config key that caused it. Every error here is a
//! construction-time failure: nothing in this layer talks to a cluster, so
//! nothing here is retryable.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for resource composition
#[derive(Debug, Error)]
pub enum Error {
    /// Composer arguments failed validation
    #[error("validation error for {unit}: {message}")]
    Validation {
        /// Logical name of the unit being composed
        unit: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field (e.g., "entryPoints")
        field: Option<String>,
    },

    /// Component configuration is missing or malformed
    #[error("config error for {component}:{key}: {message}")]
    Config {
        /// Component namespace of the key (e.g., "overseerr")
        component: String,
        /// Key within the component
        key: String,
        /// Description of what failed
        message: String,
    },

    /// Two nodes in one stack resolved to the same URN
    #[error("duplicate resource urn: {urn}")]
    DuplicateUrn {
        /// The conflicting URN
        urn: String,
    },

    /// A declaration named a parent that was never registered
    #[error("unknown parent {parent} for {child}")]
    UnknownParent {
        /// URN of the missing parent
        parent: String,
        /// Logical name of the child being registered
        child: String,
    },

    /// Ordering edges form a cycle
    #[error("cycle detected in ordering graph: {0}")]
    CycleDetected(String),

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// YAML parsing or emitting failed
    #[error("yaml error: {0}")]
    Yaml(String),
}

impl Error {
    /// Create a validation error with the given message
    ///
    /// For simple validation errors without unit context.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            unit: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with unit context
    pub fn validation_for(unit: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            unit: unit.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with unit context and field name
    pub fn validation_for_field(
        unit: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            unit: unit.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a config error for a component key
    pub fn config(
        component: impl Into<String>,
        key: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Config {
            component: component.into(),
            key: key.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Get the unit name if this error is associated with a composed unit
    pub fn unit(&self) -> Option<&str> {
        match self {
            Error::Validation { unit, .. } => Some(unit),
            Error::UnknownParent { child, .. } => Some(child),
            _ => None,
        }
    }

    /// Get the offending field, if known
    pub fn field(&self) -> Option<&str> {
        match self {
            Error::Validation { field, .. } => field.as_deref(),
            Error::Config { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}
