//! Local-path volume composer
//!
//! Declares a hostPath PersistentVolume pinned to the nodes that carry the
//! backing disk, and a claim bound to it by name. Used for app data that
//! already lives on a node's array (downloads, sync folders) rather than in
//! Longhorn.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    HostPathVolumeSource, NodeSelector, NodeSelectorRequirement, NodeSelectorTerm,
    PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeSpec,
    VolumeNodeAffinity, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as K8sObjectMeta;
use tracing::debug;

use homelab_common::resource::managed_labels;
use homelab_common::{Component, ComponentUnit, Deferred, Error, Result, Stack};

use crate::namespace::ScopeHandle;
use crate::volume::{storage, validate_size, AccessMode, SKIP_AWAIT_ANNOTATION};

/// Storage class served by the local-path provisioner
pub const LOCAL_PATH_STORAGE_CLASS: &str = "local-path";

/// Capacity used when the caller doesn't give one
pub const DEFAULT_LOCAL_SIZE: &str = "20Gi";

const LOCAL_TYPE_LABEL: (&str, &str) = ("type", "local");
const RECLAIM_POLICY: &str = "Retain";
const NODE_SELECTOR_OPERATOR: &str = "In";

/// Name of the claim composed for `name`
pub fn local_claim_name_for(name: &str) -> String {
    format!("{}-pv-claim", name)
}

/// Node label a local volume is pinned to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeLabel {
    /// Label key
    pub key: String,
    /// Required value
    pub value: String,
}

impl Default for NodeLabel {
    /// Nodes with the unraid array mounted
    fn default() -> Self {
        Self {
            key: "disk".to_string(),
            value: "unraid".to_string(),
        }
    }
}

/// Arguments for [`LocalVolume`]
#[derive(Clone, Debug)]
pub struct LocalVolumeArgs {
    /// Absolute path on the node
    pub path: String,
    /// Capacity as a Kubernetes quantity
    pub size: String,
    /// Nodes the volume may be mounted on
    pub node: NodeLabel,
    /// Namespace the claim lives in
    pub scope: ScopeHandle,
}

impl LocalVolumeArgs {
    /// 20Gi on the default disk nodes
    pub fn new(path: impl Into<String>, scope: ScopeHandle) -> Self {
        Self {
            path: path.into(),
            size: DEFAULT_LOCAL_SIZE.to_string(),
            node: NodeLabel::default(),
            scope,
        }
    }
}

/// What a local volume composition hands back
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVolumeHandle {
    claim_name: Deferred<String>,
    path: String,
}

impl LocalVolumeHandle {
    /// Claim a workload mounts; produced by the claim declaration
    pub fn claim_name(&self) -> &Deferred<String> {
        &self.claim_name
    }

    /// Host path backing the volume
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Declares a hostPath PersistentVolume and its claim
pub struct LocalVolume;

impl LocalVolume {
    /// Build the PersistentVolume for `name`
    pub fn build_volume(name: &str, args: &LocalVolumeArgs) -> PersistentVolume {
        let pv_name = format!("{}-pv", name);
        let mut labels = managed_labels(&pv_name);
        labels.insert(LOCAL_TYPE_LABEL.0.to_string(), LOCAL_TYPE_LABEL.1.to_string());

        PersistentVolume {
            metadata: K8sObjectMeta {
                name: Some(pv_name),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                node_affinity: Some(VolumeNodeAffinity {
                    required: Some(NodeSelector {
                        node_selector_terms: vec![NodeSelectorTerm {
                            match_expressions: Some(vec![NodeSelectorRequirement {
                                key: args.node.key.clone(),
                                operator: NODE_SELECTOR_OPERATOR.to_string(),
                                values: Some(vec![args.node.value.clone()]),
                            }]),
                            ..Default::default()
                        }],
                    }),
                }),
                storage_class_name: Some(LOCAL_PATH_STORAGE_CLASS.to_string()),
                persistent_volume_reclaim_policy: Some(RECLAIM_POLICY.to_string()),
                capacity: Some(storage(&args.size)),
                access_modes: Some(vec![AccessMode::ReadWriteOnce.as_str().to_string()]),
                host_path: Some(HostPathVolumeSource {
                    path: args.path.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build the claim bound to `volume_name`
    pub fn build_claim(
        name: &str,
        namespace: &str,
        volume_name: &str,
        args: &LocalVolumeArgs,
    ) -> PersistentVolumeClaim {
        let claim_name = local_claim_name_for(name);
        let mut annotations = BTreeMap::new();
        annotations.insert(SKIP_AWAIT_ANNOTATION.to_string(), "true".to_string());

        PersistentVolumeClaim {
            metadata: K8sObjectMeta {
                labels: Some(managed_labels(&claim_name)),
                name: Some(claim_name),
                namespace: Some(namespace.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                storage_class_name: Some(LOCAL_PATH_STORAGE_CLASS.to_string()),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(storage(&args.size)),
                    ..Default::default()
                }),
                access_modes: Some(vec![AccessMode::ReadWriteOnce.as_str().to_string()]),
                volume_name: Some(volume_name.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn validate(name: &str, args: &LocalVolumeArgs) -> Result<()> {
        if !args.path.starts_with('/') {
            return Err(Error::validation_for_field(
                name,
                "path",
                format!("host path '{}' must be absolute", args.path),
            ));
        }
        if args.node.key.trim().is_empty() || args.node.value.trim().is_empty() {
            return Err(Error::validation_for_field(name, "node", "node label key and value are required"));
        }
        validate_size(name, &args.size)
    }
}

impl Component for LocalVolume {
    const TYPE: &'static str = "homelab:resources:LocalVolume";
    type Args = LocalVolumeArgs;
    type Output = LocalVolumeHandle;

    fn compose(stack: &mut Stack, unit: &ComponentUnit, args: LocalVolumeArgs) -> Result<LocalVolumeHandle> {
        let name = unit.name();
        Self::validate(name, &args)?;

        let pv = Self::build_volume(name, &args);
        let pv_declared = stack.declare_object(&format!("{}-pv", name), &pv, unit.child_opts())?;

        let mut pvc_opts = unit.child_opts();
        let namespace = args.scope.namespace().read(&mut pvc_opts).clone();
        let pv_name = pv_declared.name();
        let pvc = Self::build_claim(name, &namespace, pv_name.read(&mut pvc_opts), &args);
        let pvc_declared = stack.declare_object(&local_claim_name_for(name), &pvc, pvc_opts)?;

        let node = format!("{}={}", args.node.key, args.node.value);
        debug!(
            volume = %name,
            path = %args.path,
            size = %args.size,
            node = %node,
            "declared local volume"
        );

        Ok(LocalVolumeHandle {
            claim_name: pvc_declared.name(),
            path: args.path,
        })
    }
}
