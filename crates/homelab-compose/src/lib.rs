//! Resource composers for homelab stacks
//!
//! Each composer implements [`homelab_common::Component`] and declares a small,
//! fixed shape of resources under its own unit:
//!
//! - **Namespace**: declares the namespace a deployable unit lives in and
//!   hands back a [`ScopeHandle`]; its name can be exported to and read
//!   from other stacks
//! - **Certificate**: a cert-manager Certificate with a secret name known
//!   before the secret exists
//! - **Ingress**: Traefik routes for HTTP (with TLS), TCP or UDP
//! - **Volume**: a Longhorn-backed PersistentVolume and the claim bound to it
//! - **LocalVolume**: a hostPath PersistentVolume pinned to disk nodes

/// Implement default_api_version() and default_kind() for types
/// implementing HasApiResource, for use as serde defaults.
macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

pub mod certificate;
pub mod ingress;
pub mod local_volume;
pub mod namespace;
pub mod volume;

pub use certificate::{CertificateArgs, CertificateHandle, ManagedCertificate};
pub use ingress::{Ingress, IngressArgs, RoutingIntent, RoutingSpec, ServiceTarget};
pub use local_volume::{LocalVolume, LocalVolumeArgs, LocalVolumeHandle, NodeLabel};
pub use namespace::{declare_namespace, export_namespace, require_namespace, ScopeHandle, NAMESPACE_OUTPUT};
pub use volume::{parse_quantity_bytes, AccessMode, LonghornVolume, VolumeArgs, VolumeHandle};
