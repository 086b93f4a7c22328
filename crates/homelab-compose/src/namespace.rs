//! Namespace declaration and the scope handle composers are given
//!
//! Every app and system stack exports its namespace under
//! [`NAMESPACE_OUTPUT`]; other stacks find it through a
//! [`StackReference`].

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use homelab_common::resource::managed_labels;
use homelab_common::{Deferred, ResourceOptions, Result, Stack, StackReference, Urn};

/// Output key a stack exports its namespace under
pub const NAMESPACE_OUTPUT: &str = "namespace";

/// The namespace a deployable unit's resources live in.
///
/// Produced once by [`declare_namespace`] and passed explicitly to every
/// composer that declares namespaced objects.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopeHandle {
    namespace: Deferred<String>,
    urn: Urn,
}

impl ScopeHandle {
    /// The namespace name, produced by the Namespace declaration
    pub fn namespace(&self) -> &Deferred<String> {
        &self.namespace
    }

    /// URN of the Namespace declaration
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Options for a declaration owned by the namespace
    pub fn child_opts(&self) -> ResourceOptions {
        ResourceOptions::with_parent(&self.urn)
    }
}

/// Declare a namespace named `name` (logical name `<name>-namespace`)
pub fn declare_namespace(
    stack: &mut Stack,
    name: &str,
    opts: ResourceOptions,
) -> Result<ScopeHandle> {
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(managed_labels(name)),
            ..Default::default()
        },
        ..Default::default()
    };

    let declared = stack.declare_object(&format!("{}-namespace", name), &namespace, opts)?;
    debug!(namespace = %name, "declared namespace");

    Ok(ScopeHandle {
        namespace: declared.name(),
        urn: declared.urn().clone(),
    })
}

/// Export the scope's namespace for other stacks
pub fn export_namespace(stack: &mut Stack, scope: &ScopeHandle) {
    stack.export(NAMESPACE_OUTPUT, scope.namespace().clone());
}

/// The namespace another project's stack exports
pub fn require_namespace(reference: &StackReference) -> Result<Deferred<String>> {
    reference.require_output(NAMESPACE_OUTPUT)
}
