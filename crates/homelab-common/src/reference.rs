//! References to other stacks' outputs
//!
//! A stack that lives in another project (the Longhorn system stack, say)
//! exports values such as its namespace. A [`StackReference`] holds a
//! snapshot of those outputs and hands them out as [`Deferred`] values
//! produced by the reference itself. The reference's URN is never registered
//! in the consuming stack, so any edge it produces resolves as external and
//! is treated as already satisfied.

use std::collections::BTreeMap;

use tracing::debug;

use crate::deferred::Deferred;
use crate::stack::Stack;
use crate::urn::Urn;
use crate::{Error, Result};

/// Type token of a stack reference
pub const STACK_REFERENCE_TYPE: &str = "homelab:StackReference";

/// Outputs of another project's stack
#[derive(Clone, Debug, PartialEq)]
pub struct StackReference {
    urn: Urn,
    outputs: BTreeMap<String, String>,
}

impl StackReference {
    /// Reference `project`/`stack` with known outputs
    pub fn new(
        project: impl Into<String>,
        stack: impl Into<String>,
        outputs: BTreeMap<String, String>,
    ) -> Self {
        let project = project.into();
        let stack = stack.into();
        let name = format!("{}/{}", project, stack);
        Self {
            urn: Urn::root(stack, project, STACK_REFERENCE_TYPE, name),
            outputs,
        }
    }

    /// Reference a stack built in this process, taking its current exports
    pub fn from_stack(stack: &Stack) -> Self {
        Self::new(stack.project(), stack.stack_name(), stack.output_values())
    }

    /// Reference a stack from its outputs as a JSON object
    /// (`{"namespace": "longhorn-system"}`).
    ///
    /// String values are taken as-is; anything else is kept as its JSON text.
    pub fn from_json(
        project: impl Into<String>,
        stack: impl Into<String>,
        input: &str,
    ) -> Result<Self> {
        let project = project.into();
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(input)
            .map_err(|e| Error::config(&project, "outputs", e.to_string()))?;

        let outputs = raw
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect();
        Ok(Self::new(project, stack, outputs))
    }

    /// `project/stack`
    pub fn name(&self) -> &str {
        self.urn.name()
    }

    /// Identity of the reference; never part of the consuming stack
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// An output, if the referenced stack exports it
    pub fn get_output(&self, key: &str) -> Option<Deferred<String>> {
        self.outputs
            .get(key)
            .map(|v| Deferred::produced_by(&self.urn, v.clone()))
    }

    /// An output the caller cannot do without
    pub fn require_output(&self, key: &str) -> Result<Deferred<String>> {
        let value = self.get_output(key).ok_or_else(|| {
            Error::config(
                self.urn.project(),
                key,
                format!("stack {} does not export '{}'", self.name(), key),
            )
        })?;
        debug!(reference = %self.name(), output = key, "resolved stack output");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::ResourceOptions;
    use crate::resource::ResourceBody;

    fn longhorn() -> StackReference {
        let mut outputs = BTreeMap::new();
        outputs.insert("namespace".to_string(), "longhorn-system".to_string());
        StackReference::new("homelab-system-longhorn", "dev", outputs)
    }

    #[test]
    fn test_output_is_produced_by_the_reference() {
        let reference = longhorn();
        let ns = reference.require_output("namespace").unwrap();

        let mut opts = ResourceOptions::new();
        assert_eq!(ns.read(&mut opts), "longhorn-system");
        assert!(opts.implicit_edges().contains(reference.urn()));
        assert_eq!(reference.name(), "homelab-system-longhorn/dev");
    }

    #[test]
    fn test_missing_output_is_config_error() {
        let err = longhorn().require_output("storageClass").unwrap_err();
        match err {
            Error::Config { component, key, .. } => {
                assert_eq!(component, "homelab-system-longhorn");
                assert_eq!(key, "storageClass");
            }
            other => panic!("Expected Config, got {:?}", other),
        }
        assert!(longhorn().get_output("storageClass").is_none());
    }

    #[test]
    fn test_from_json_outputs() {
        let reference = StackReference::from_json(
            "homelab-system-longhorn",
            "dev",
            r#"{"namespace": "longhorn-system", "replicas": 3}"#,
        )
        .unwrap();

        let mut opts = ResourceOptions::new();
        assert_eq!(
            reference.require_output("replicas").unwrap().read(&mut opts),
            "3"
        );
        assert!(StackReference::from_json("p", "dev", "not json").is_err());
    }

    #[test]
    fn test_reading_a_reference_is_an_external_edge() {
        let reference = longhorn();
        let mut stack = Stack::new("overseerr", "dev");

        let mut opts = ResourceOptions::new();
        let ns = reference.require_output("namespace").unwrap();
        let ns = ns.read(&mut opts).clone();
        let declared = stack
            .declare(
                "cm",
                ResourceBody::from_value(serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {"name": "cm", "namespace": ns}
                }))
                .unwrap(),
                opts,
            )
            .unwrap();

        let edges = stack.graph().resolve_edges(declared.urn());
        assert!(edges.internal.is_empty());
        assert!(edges.external.contains(reference.urn()));
        assert_eq!(stack.sequence().unwrap().num_groups(), 1);
    }

    #[test]
    fn test_from_stack_snapshots_exports() {
        let mut producer = Stack::new("homelab-system-longhorn", "dev");
        producer.export("namespace", Deferred::known("longhorn-system".to_string()));

        let reference = StackReference::from_stack(&producer);
        assert_eq!(reference.name(), "homelab-system-longhorn/dev");
        let mut opts = ResourceOptions::new();
        assert_eq!(
            reference.require_output("namespace").unwrap().read(&mut opts),
            "longhorn-system"
        );
    }
}
