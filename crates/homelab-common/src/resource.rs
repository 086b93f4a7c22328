//! Resource metadata and typed declaration bodies
//!
//! Every object this layer declares ends up as a [`ResourceBody`]: the
//! serialized JSON plus the identity fields (apiVersion, kind, name,
//! namespace) the engine keys on. Typed bodies come from two places:
//!
//! - `k8s-openapi` types for core objects (Namespace, PersistentVolume, ...)
//! - hand-written serde types implementing [`HasApiResource`] for custom
//!   resources (cert-manager, Traefik, Longhorn)

use std::collections::BTreeMap;

use kube::core::ApiResource;
use serde::Serialize;

use crate::{Error, Result};

// =============================================================================
// ObjectMeta - metadata for hand-written custom resource bodies
// =============================================================================

/// Kubernetes metadata for custom resources declared by a composer.
///
/// Adds the homelab management labels on construction.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with standard homelab labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            labels: managed_labels(&name),
            name,
            namespace: namespace.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// Standard labels stamped on everything a composer declares
pub fn managed_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(crate::LABEL_NAME.to_string(), name.to_string());
    labels.insert(
        crate::LABEL_MANAGED_BY.to_string(),
        crate::LABEL_MANAGED_BY_HOMELAB.to_string(),
    );
    labels
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for types that have a known API group, version, and kind.
///
/// Implement this for custom resource types so their serialized
/// `apiVersion`/`kind` and their `ApiResource` come from one place.
///
/// # Example
/// ```ignore
/// impl HasApiResource for IngressRoute {
///     const API_VERSION: &'static str = "traefik.containo.us/v1alpha1";
///     const KIND: &'static str = "IngressRoute";
/// }
///
/// let ar = IngressRoute::api_resource();
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "cert-manager.io/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "Certificate")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from an apiVersion string and kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Engine type token for an API resource (`kubernetes:<group>/<version>:<kind>`).
///
/// Core types have an empty group and are spelled `core`, so a Namespace is
/// `kubernetes:core/v1:Namespace`.
pub fn type_token(ar: &ApiResource) -> String {
    let group = if ar.group.is_empty() { "core" } else { &ar.group };
    format!("kubernetes:{}/{}:{}", group, ar.version, ar.kind)
}

/// Split an apiVersion into (group, version). Core types have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Plurals that simple suffix rules get wrong
const KIND_PLURALS: &[(&str, &str)] = &[
    ("ingressroutetcp", "ingressroutetcps"),
    ("ingressrouteudp", "ingressrouteudps"),
    ("persistentvolume", "persistentvolumes"),
    ("persistentvolumeclaim", "persistentvolumeclaims"),
];

/// Pluralize a Kubernetes kind the way the API server names its resources
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// ResourceBody - a serialized declaration
// =============================================================================

/// A serialized object ready to be declared, with its identity extracted.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceBody {
    /// The full object as JSON
    pub value: serde_json::Value,
    /// API version (e.g., "cert-manager.io/v1")
    pub api_version: String,
    /// Kind (e.g., "Certificate")
    pub kind: String,
    /// metadata.name
    pub name: String,
    /// metadata.namespace (None for cluster-scoped objects)
    pub namespace: Option<String>,
}

impl ResourceBody {
    /// Serialize a typed object and extract its identity fields.
    ///
    /// Fails if the object has no apiVersion, kind or metadata.name, so a
    /// malformed body is caught while the graph is being built.
    pub fn from_object<T: Serialize>(object: &T) -> Result<Self> {
        let value = serde_json::to_value(object)?;
        Self::from_value(value)
    }

    /// Extract identity fields from an already-serialized object
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let api_version = value
            .get("apiVersion")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::serialization("resource body missing apiVersion"))?
            .to_string();

        let kind = value
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::serialization("resource body missing kind"))?
            .to_string();

        let name = value
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::serialization_for_kind(&kind, "missing metadata.name"))?
            .to_string();

        let namespace = value
            .pointer("/metadata/namespace")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(Self {
            value,
            api_version,
            kind,
            name,
            namespace,
        })
    }

    /// ApiResource for this body's group/version/kind
    pub fn api_resource(&self) -> ApiResource {
        build_api_resource(&self.api_version, &self.kind)
    }

    /// Type token the body is declared under
    pub fn type_token(&self) -> String {
        type_token(&self.api_resource())
    }

    /// Whether this body is an instance of `T`
    pub fn is<T: HasApiResource>(&self) -> bool {
        let (group, version) = parse_api_version(&self.api_version);
        let ar = T::api_resource();
        ar.group == group && ar.version == version && ar.kind == self.kind
    }

    /// `Kind/namespace/name` (or `Kind/name`) for logging
    pub fn display(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.kind, ns, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}
