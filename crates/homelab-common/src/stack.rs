//! Stack: the declaration context every composer writes into
//!
//! A [`Stack`] collects component units and resource declarations for one
//! project/stack pair. Composers implement [`Component`] and are invoked
//! through [`Stack::component`], which registers the unit before handing it
//! to the composer so every declaration inside can be owned by it.
//!
//! ```ignore
//! let mut stack = Stack::new("overseerr", "dev");
//! let volume = stack.component::<LonghornVolume>("overseerr-config", args, ResourceOptions::new())?;
//! let manifest = stack.to_manifest()?;
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::deferred::{Deferred, ResourceOptions};
use crate::graph::{DeclarationGraph, GraphNode};
use crate::resource::{HasApiResource, ResourceBody};
use crate::sequence::ApplySequence;
use crate::urn::Urn;
use crate::yaml::emit_documents;
use crate::Result;

/// A composer of related declarations
pub trait Component {
    /// Type token (e.g., "homelab:resources:Certificate")
    const TYPE: &'static str;
    /// Composer input
    type Args;
    /// Handle returned to the caller
    type Output;

    /// Declare everything this component owns under `unit`
    fn compose(stack: &mut Stack, unit: &ComponentUnit, args: Self::Args) -> Result<Self::Output>;
}

/// A registered component instance
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentUnit {
    urn: Urn,
}

impl ComponentUnit {
    /// Logical name
    pub fn name(&self) -> &str {
        self.urn.name()
    }

    /// Unique name
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Options for a declaration owned by this unit
    pub fn child_opts(&self) -> ResourceOptions {
        ResourceOptions::with_parent(&self.urn)
    }
}

/// Handle to a declared resource
#[derive(Clone, Debug, PartialEq)]
pub struct Declared {
    urn: Urn,
    name: String,
    namespace: Option<String>,
}

impl Declared {
    /// Unique name
    pub fn urn(&self) -> &Urn {
        &self.urn
    }

    /// The object's `metadata.name`, produced by this declaration
    pub fn name(&self) -> Deferred<String> {
        Deferred::produced_by(&self.urn, self.name.clone())
    }

    /// The object's `metadata.namespace`, produced by this declaration
    pub fn namespace(&self) -> Option<Deferred<String>> {
        self.namespace
            .as_ref()
            .map(|ns| Deferred::produced_by(&self.urn, ns.clone()))
    }
}

/// Declarations for one project and stack
#[derive(Debug)]
pub struct Stack {
    project: String,
    stack: String,
    graph: DeclarationGraph,
    outputs: BTreeMap<String, Deferred<String>>,
}

impl Stack {
    /// Create an empty stack
    pub fn new(project: impl Into<String>, stack: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            stack: stack.into(),
            graph: DeclarationGraph::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Project name
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Stack name
    pub fn stack_name(&self) -> &str {
        &self.stack
    }

    /// The declaration graph built so far
    pub fn graph(&self) -> &DeclarationGraph {
        &self.graph
    }

    fn urn_for(&self, type_token: &str, name: &str, opts: &ResourceOptions) -> Urn {
        match opts.parent_urn() {
            Some(parent) => parent.child(type_token, name),
            None => Urn::root(&self.stack, &self.project, type_token, name),
        }
    }

    /// Register a component unit and run its composer.
    ///
    /// If the composer fails, the unit and everything registered after it
    /// are removed again, so the stack is as it was before the call.
    pub fn component<C: Component>(
        &mut self,
        name: &str,
        args: C::Args,
        opts: ResourceOptions,
    ) -> Result<C::Output> {
        let mark = self.graph.len();
        let urn = self.urn_for(C::TYPE, name, &opts);
        self.graph.insert_component(urn.clone(), opts)?;
        debug!(urn = %urn, component = C::TYPE, "registered component");

        let unit = ComponentUnit { urn };
        match C::compose(self, &unit, args) {
            Ok(output) => Ok(output),
            Err(e) => {
                let dropped = self.graph.len() - mark;
                self.graph.truncate(mark);
                debug!(
                    urn = %unit.urn,
                    dropped,
                    error = %e,
                    "component failed, rolled back its declarations"
                );
                Err(e)
            }
        }
    }

    /// Declare a resource body
    pub fn declare(
        &mut self,
        name: &str,
        body: ResourceBody,
        opts: ResourceOptions,
    ) -> Result<Declared> {
        let type_token = body.type_token();
        let urn = self.urn_for(&type_token, name, &opts);
        let declared = Declared {
            urn: urn.clone(),
            name: body.name.clone(),
            namespace: body.namespace.clone(),
        };

        debug!(
            urn = %urn,
            resource = %body.display(),
            depends_on = opts.explicit_edges().len(),
            reads = opts.implicit_edges().len(),
            "declared resource"
        );
        self.graph.insert_resource(urn, body, opts)?;
        Ok(declared)
    }

    /// Serialize a typed object and declare it
    pub fn declare_object<T: Serialize>(
        &mut self,
        name: &str,
        object: &T,
        opts: ResourceOptions,
    ) -> Result<Declared> {
        let body = ResourceBody::from_object(object)?;
        self.declare(name, body, opts)
    }

    /// Look up a node
    pub fn get(&self, urn: &Urn) -> Option<&GraphNode> {
        self.graph.get(urn)
    }

    /// Every node owned directly or transitively by `urn`
    pub fn owned_by(&self, urn: &Urn) -> Vec<&GraphNode> {
        self.graph
            .descendants(urn)
            .iter()
            .filter_map(|u| self.graph.get(u))
            .collect()
    }

    /// Resource declarations of a given kind, in registration order
    pub fn resources_of_kind<'a>(&'a self, kind: &'a str) -> impl Iterator<Item = &'a GraphNode> {
        self.graph
            .resources()
            .filter(move |n| n.body().is_some_and(|b| b.kind == kind))
    }

    /// Resource declarations of type `T`, in registration order
    pub fn resources_of<T: HasApiResource>(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph
            .resources()
            .filter(|n| n.body().is_some_and(|b| b.is::<T>()))
    }

    /// Export a value for other stacks to reference.
    ///
    /// Exporting a key twice keeps the later value.
    pub fn export(&mut self, key: impl Into<String>, value: Deferred<String>) {
        let key = key.into();
        if self.outputs.insert(key.clone(), value).is_some() {
            warn!(output = %key, "stack output exported twice, keeping the later value");
        }
    }

    /// Exported outputs, by key
    pub fn outputs(&self) -> &BTreeMap<String, Deferred<String>> {
        &self.outputs
    }

    /// Exported outputs as the engine resolves them
    pub fn output_values(&self) -> BTreeMap<String, String> {
        self.outputs
            .iter()
            .map(|(k, v)| (k.clone(), v.resolved().clone()))
            .collect()
    }

    /// Number of resource declarations
    pub fn resource_count(&self) -> usize {
        self.graph.resources().count()
    }

    /// Compute the apply sequence
    pub fn sequence(&self) -> Result<ApplySequence> {
        ApplySequence::from_graph(&self.graph)
    }

    /// Render every resource as multi-document YAML, in apply order
    pub fn to_manifest(&self) -> Result<String> {
        let sequence = self.sequence()?;
        let bodies: Vec<&serde_json::Value> = sequence
            .apply_order()
            .iter()
            .filter_map(|urn| self.graph.get(urn))
            .filter_map(|n| n.body())
            .map(|b| &b.value)
            .collect();
        emit_documents(bodies)
    }
}
