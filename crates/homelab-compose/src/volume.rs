//! Longhorn volume composer
//!
//! Declares a statically provisioned Longhorn PersistentVolume and a claim
//! bound to it by name. The claim is annotated so the engine does not wait
//! for binding; Longhorn attach can take minutes and needs nothing from this
//! layer.
//!
//! Two identifiers are involved and must not be mixed up:
//! - the Longhorn volume handle is the composer's logical name
//! - the claim consumers mount is `<name>-pvc`

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta as K8sObjectMeta;
use serde::{Deserialize, Serialize};
use tracing::debug;

use homelab_common::resource::managed_labels;
use homelab_common::{
    Component, ComponentUnit, Deferred, Error, HasApiResource, ObjectMeta, Result, Stack,
};

use crate::namespace::ScopeHandle;

/// Longhorn CSI driver name
pub const LONGHORN_DRIVER: &str = "driver.longhorn.io";

/// Storage class for Longhorn volumes
pub const LONGHORN_STORAGE_CLASS: &str = "longhorn";

/// Annotation telling the engine not to wait for a claim to bind
pub const SKIP_AWAIT_ANNOTATION: &str = "pulumi.com/skipAwait";

/// Project of the Longhorn system stack
pub const LONGHORN_PROJECT: &str = "homelab-system-longhorn";

/// Label Longhorn uses to find a volume's objects
pub const LONGHORN_VOLUME_LABEL: &str = "longhornvolume";

const FS_TYPE: &str = "ext4";
const RECLAIM_POLICY: &str = "Retain";
const VOLUME_MODE: &str = "Filesystem";
const ENGINE_FRONTEND: &str = "blockdev";

/// Name of the claim composed for `name`
pub fn claim_name_for(name: &str) -> String {
    format!("{}-pvc", name)
}

/// Name of the PersistentVolume composed for `name`
pub fn volume_name_for(name: &str) -> String {
    format!("{}-pv", name)
}

// =============================================================================
// Access Mode
// =============================================================================

/// Volume access mode
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessMode {
    /// Single node read-write (default)
    #[default]
    ReadWriteOnce,
    /// Multi-node read-write
    ReadWriteMany,
    /// Multi-node read-only
    ReadOnlyMany,
}

impl AccessMode {
    /// Kubernetes spelling
    pub fn as_str(self) -> &'static str {
        match self {
            AccessMode::ReadWriteOnce => "ReadWriteOnce",
            AccessMode::ReadWriteMany => "ReadWriteMany",
            AccessMode::ReadOnlyMany => "ReadOnlyMany",
        }
    }

    /// Longhorn engine spelling
    pub fn longhorn_mode(self) -> &'static str {
        match self {
            AccessMode::ReadWriteOnce => "rwo",
            AccessMode::ReadWriteMany => "rwx",
            AccessMode::ReadOnlyMany => "rox",
        }
    }
}

// =============================================================================
// Size parsing
// =============================================================================

/// Parse a Kubernetes storage quantity (`30Gi`, `500M`, `1.5Ti`, `5e9`) into bytes.
///
/// Follows the API server's grammar: an unsigned decimal number, then a
/// binary suffix (`Ki` to `Ei`), a decimal suffix (`k`, `M` to `E`) or a
/// decimal exponent (`e9`, `E-3`). No whitespace, no `B`, no lowercase `gi`.
/// Fractional bytes round up. Returns None for anything else, or when the
/// value does not fit in a u64.
pub fn parse_quantity_bytes(quantity: &str) -> Option<u64> {
    let split = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(quantity.len());
    let (number, suffix) = quantity.split_at(split);

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if fraction.contains('.') {
        return None;
    }

    let mut numerator: u128 = format!("{}{}", whole, fraction).parse().ok()?;
    let mut denominator: u128 = 10u128.checked_pow(u32::try_from(fraction.len()).ok()?)?;

    let binary = |shift: u32| 1u128 << shift;
    let decimal = |exp: u32| 10u128.pow(exp);
    let multiplier = match suffix {
        "" => 1,
        "Ki" => binary(10),
        "Mi" => binary(20),
        "Gi" => binary(30),
        "Ti" => binary(40),
        "Pi" => binary(50),
        "Ei" => binary(60),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        exponent => {
            let digits = exponent
                .strip_prefix('e')
                .or_else(|| exponent.strip_prefix('E'))?;
            let (negative, digits) = match digits.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, digits.strip_prefix('+').unwrap_or(digits)),
            };
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let exp: u32 = digits.parse().ok()?;
            let scale = 10u128.checked_pow(exp)?;
            if negative {
                denominator = denominator.checked_mul(scale)?;
                1
            } else {
                scale
            }
        }
    };

    numerator = numerator.checked_mul(multiplier)?;
    let bytes = numerator.div_ceil(denominator);
    u64::try_from(bytes).ok()
}

/// Parse a human size (`30Gi`, `500M`, `1.5 GiB`, `1024`) into bytes, the
/// way the Longhorn engine volume's `spec.size` has always been computed.
///
/// Binary suffixes (`Ki` to `Ei`) are powers of 1024, decimal ones (`K` to
/// `E`) powers of 1000; a trailing `B` is optional and case is ignored.
/// Returns None for anything else.
pub fn parse_size_bytes(size: &str) -> Option<u64> {
    let size = size.trim();
    let split = size
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(size.len());
    let (number, suffix) = size.split_at(split);
    if number.is_empty() {
        return None;
    }

    let suffix = suffix.trim().to_ascii_lowercase();
    let suffix = suffix.strip_suffix('b').unwrap_or(&suffix);
    let multiplier: u64 = match suffix {
        "" => 1,
        "k" => 1_000,
        "ki" => 1 << 10,
        "m" => 1_000_000,
        "mi" => 1 << 20,
        "g" => 1_000_000_000,
        "gi" => 1 << 30,
        "t" => 1_000_000_000_000,
        "ti" => 1 << 40,
        "p" => 1_000_000_000_000_000,
        "pi" => 1 << 50,
        "e" => 1_000_000_000_000_000_000,
        "ei" => 1 << 60,
        _ => return None,
    };

    if let Ok(whole) = number.parse::<u64>() {
        return whole.checked_mul(multiplier);
    }

    let fractional: f64 = number.parse().ok()?;
    let bytes = (fractional * multiplier as f64).round();
    if bytes.is_finite() && bytes >= 0.0 && bytes < u64::MAX as f64 {
        Some(bytes as u64)
    } else {
        None
    }
}

// =============================================================================
// Longhorn Types
// =============================================================================

/// Longhorn engine Volume resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// API version (longhorn.io/v1beta2)
    #[serde(default = "Volume::default_api_version")]
    pub api_version: String,
    /// Resource kind (Volume)
    #[serde(default = "Volume::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ObjectMeta,
    /// Volume specification
    pub spec: EngineVolumeSpec,
}

impl HasApiResource for Volume {
    const API_VERSION: &'static str = "longhorn.io/v1beta2";
    const KIND: &'static str = "Volume";
}

impl_api_defaults!(Volume);

/// Longhorn Volume spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineVolumeSpec {
    /// Longhorn access mode (rwo, rwx, rox)
    pub access_mode: String,
    /// Frontend (blockdev)
    pub frontend: String,
    /// Replica count
    pub number_of_replicas: u32,
    /// Size in bytes, as a string
    pub size: String,
}

// =============================================================================
// Composer
// =============================================================================

/// Arguments for [`LonghornVolume`]
#[derive(Clone, Debug)]
pub struct VolumeArgs {
    /// Capacity as a Kubernetes quantity (e.g., "30Gi")
    pub size: String,
    /// Access mode for both volume and claim
    pub access_mode: AccessMode,
    /// Longhorn replica count
    pub replicas: u32,
    /// Namespace the claim lives in
    pub scope: ScopeHandle,
    /// When set, also declare the Longhorn engine Volume in this namespace,
    /// usually the namespace [`LONGHORN_PROJECT`] exports
    /// (see [`crate::namespace::require_namespace`])
    pub engine_namespace: Option<Deferred<String>>,
}

/// What a volume composition hands back
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeHandle {
    claim_name: Deferred<String>,
    size: String,
    access_mode: AccessMode,
    replicas: u32,
}

impl VolumeHandle {
    /// Claim a workload mounts; produced by the claim declaration
    pub fn claim_name(&self) -> &Deferred<String> {
        &self.claim_name
    }

    /// Requested capacity
    pub fn size(&self) -> &str {
        &self.size
    }

    /// Access mode
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    /// Longhorn replica count
    pub fn replicas(&self) -> u32 {
        self.replicas
    }
}

/// Declares a Longhorn-backed PersistentVolume and its claim
pub struct LonghornVolume;

impl LonghornVolume {
    /// Build the PersistentVolume for `name`
    pub fn build_volume(name: &str, volume_handle: &str, args: &VolumeArgs) -> PersistentVolume {
        let pv_name = volume_name_for(name);
        let mut attributes = BTreeMap::new();
        attributes.insert("numberOfReplicas".to_string(), args.replicas.to_string());

        PersistentVolume {
            metadata: K8sObjectMeta {
                labels: Some(managed_labels(&pv_name)),
                name: Some(pv_name),
                ..Default::default()
            },
            spec: Some(PersistentVolumeSpec {
                capacity: Some(storage(&args.size)),
                csi: Some(CSIPersistentVolumeSource {
                    driver: LONGHORN_DRIVER.to_string(),
                    fs_type: Some(FS_TYPE.to_string()),
                    volume_handle: volume_handle.to_string(),
                    volume_attributes: Some(attributes),
                    ..Default::default()
                }),
                access_modes: Some(vec![args.access_mode.as_str().to_string()]),
                persistent_volume_reclaim_policy: Some(RECLAIM_POLICY.to_string()),
                storage_class_name: Some(LONGHORN_STORAGE_CLASS.to_string()),
                volume_mode: Some(VOLUME_MODE.to_string()),
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
        args: &VolumeArgs,
    ) -> PersistentVolumeClaim {
        let claim_name = claim_name_for(name);
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
                access_modes: Some(vec![args.access_mode.as_str().to_string()]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(storage(&args.size)),
                    ..Default::default()
                }),
                volume_name: Some(volume_name.to_string()),
                storage_class_name: Some(LONGHORN_STORAGE_CLASS.to_string()),
                volume_mode: Some(VOLUME_MODE.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build the Longhorn engine Volume for `name`
    pub fn build_engine_volume(name: &str, namespace: &str, bytes: u64, args: &VolumeArgs) -> Volume {
        Volume {
            api_version: Volume::default_api_version(),
            kind: Volume::default_kind(),
            metadata: ObjectMeta::new(name, namespace).with_label(LONGHORN_VOLUME_LABEL, name),
            spec: EngineVolumeSpec {
                access_mode: args.access_mode.longhorn_mode().to_string(),
                frontend: ENGINE_FRONTEND.to_string(),
                number_of_replicas: args.replicas,
                size: bytes.to_string(),
            },
        }
    }

    fn validate(name: &str, args: &VolumeArgs) -> Result<()> {
        if args.replicas == 0 {
            return Err(Error::validation_for_field(name, "replicas", "replicas must be at least 1"));
        }
        validate_size(name, &args.size)
    }

    fn engine_size(name: &str, size: &str) -> Result<u64> {
        parse_size_bytes(size).ok_or_else(|| {
            Error::validation_for_field(
                name,
                "size",
                format!("size '{}' cannot be converted to bytes for the engine volume", size),
            )
        })
    }
}

/// Reject sizes the API server would refuse as a storage quantity
pub(crate) fn validate_size(unit: &str, size: &str) -> Result<()> {
    match parse_quantity_bytes(size) {
        None => Err(Error::validation_for_field(
            unit,
            "size",
            format!("'{}' is not a Kubernetes quantity (e.g. 30Gi, 500M)", size),
        )),
        Some(0) => Err(Error::validation_for_field(unit, "size", "size must be non-zero")),
        Some(_) => Ok(()),
    }
}

pub(crate) fn storage(size: &str) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    map.insert("storage".to_string(), Quantity(size.to_string()));
    map
}

impl Component for LonghornVolume {
    const TYPE: &'static str = "homelab:resources:LonghornVolume";
    type Args = VolumeArgs;
    type Output = VolumeHandle;

    fn compose(stack: &mut Stack, unit: &ComponentUnit, args: VolumeArgs) -> Result<VolumeHandle> {
        let name = unit.name();
        Self::validate(name, &args)?;

        let mut pv_opts = unit.child_opts();
        let volume_handle: Deferred<String> = match &args.engine_namespace {
            Some(engine_namespace) => {
                let bytes = Self::engine_size(name, &args.size)?;
                let mut engine_opts = unit.child_opts();
                let engine_namespace = engine_namespace.read(&mut engine_opts);
                let engine = Self::build_engine_volume(name, engine_namespace, bytes, &args);
                stack
                    .declare_object(&format!("{}-longhorn-volume", name), &engine, engine_opts)?
                    .name()
            }
            None => Deferred::known(name.to_string()),
        };
        let pv = Self::build_volume(name, volume_handle.read(&mut pv_opts), &args);
        let pv_declared = stack.declare_object(&volume_name_for(name), &pv, pv_opts)?;

        let mut pvc_opts = unit.child_opts();
        let namespace = args.scope.namespace().read(&mut pvc_opts).clone();
        let pv_name = pv_declared.name();
        let pvc = Self::build_claim(name, &namespace, pv_name.read(&mut pvc_opts), &args);
        let pvc_declared = stack.declare_object(&claim_name_for(name), &pvc, pvc_opts)?;

        debug!(
            volume = %name,
            size = %args.size,
            access_mode = args.access_mode.as_str(),
            replicas = args.replicas,
            engine_volume = args.engine_namespace.is_some(),
            "declared longhorn volume"
        );

        Ok(VolumeHandle {
            claim_name: pvc_declared.name(),
            size: args.size,
            access_mode: args.access_mode,
            replicas: args.replicas,
        })
    }
}
