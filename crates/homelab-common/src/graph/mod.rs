//! Declaration graph for a stack
//!
//! Nodes are either component units (logical groupings with no body of their
//! own) or resources (a serialized object the engine applies). Two kinds of
//! relation connect them:
//!
//! - **ownership**: each node has at most one parent, fixed at registration.
//!   Ownership scopes identity and teardown but does not order anything.
//! - **ordering**: depends-after edges, either explicit or recorded by reading
//!   a deferred value. An edge onto a component means "after every resource
//!   the component owns", and a component's own edges are inherited by
//!   everything it owns. A resource owner passes on no edges.
//!
//! Edges onto URNs outside the graph (another stack's outputs) are kept
//! apart and treated as satisfied.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::deferred::ResourceOptions;
use crate::resource::ResourceBody;
use crate::urn::Urn;
use crate::{Error, Result};

/// What a node is
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// A component unit; owns other nodes, has no body
    Component,
    /// A declared object
    Resource(ResourceBody),
}

/// A registered node
#[derive(Clone, Debug, PartialEq)]
pub struct GraphNode {
    /// Unique name
    pub urn: Urn,
    /// Owning unit, if any
    pub parent: Option<Urn>,
    /// Explicit depends-after edges
    pub depends_on: BTreeSet<Urn>,
    /// Edges recorded by reading deferred values
    pub reads: BTreeSet<Urn>,
    /// Component or resource
    pub kind: NodeKind,
}

impl GraphNode {
    fn new(urn: Urn, opts: ResourceOptions, kind: NodeKind) -> Self {
        Self {
            urn,
            parent: opts.parent_urn().cloned(),
            depends_on: opts.explicit_edges().clone(),
            reads: opts.implicit_edges().clone(),
            kind,
        }
    }

    /// Logical name
    pub fn name(&self) -> &str {
        self.urn.name()
    }

    /// The body, if this node is a resource
    pub fn body(&self) -> Option<&ResourceBody> {
        match &self.kind {
            NodeKind::Resource(body) => Some(body),
            NodeKind::Component => None,
        }
    }

    /// Whether this node is a component unit
    pub fn is_component(&self) -> bool {
        matches!(self.kind, NodeKind::Component)
    }

    /// Explicit and implicit edges together
    pub fn all_edges(&self) -> BTreeSet<Urn> {
        self.depends_on.union(&self.reads).cloned().collect()
    }
}

/// Ordering edges of one resource after expansion
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedEdges {
    /// Resources in this graph that must be applied first
    pub internal: BTreeSet<Urn>,
    /// Targets outside this graph; treated as already satisfied
    pub external: BTreeSet<Urn>,
}

/// All nodes of one stack, in registration order
#[derive(Debug, Default)]
pub struct DeclarationGraph {
    nodes: BTreeMap<Urn, GraphNode>,
    order: Vec<Urn>,
    children: BTreeMap<Urn, Vec<Urn>>,
}

impl DeclarationGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component unit
    pub fn insert_component(&mut self, urn: Urn, opts: ResourceOptions) -> Result<()> {
        self.insert(GraphNode::new(urn, opts, NodeKind::Component))
    }

    /// Register a resource declaration
    pub fn insert_resource(
        &mut self,
        urn: Urn,
        body: ResourceBody,
        opts: ResourceOptions,
    ) -> Result<()> {
        self.insert(GraphNode::new(urn, opts, NodeKind::Resource(body)))
    }

    fn insert(&mut self, node: GraphNode) -> Result<()> {
        if self.nodes.contains_key(&node.urn) {
            return Err(Error::DuplicateUrn {
                urn: node.urn.to_string(),
            });
        }

        if let Some(parent) = &node.parent {
            if !self.nodes.contains_key(parent) {
                return Err(Error::UnknownParent {
                    parent: parent.to_string(),
                    child: node.name().to_string(),
                });
            }
            self.children
                .entry(parent.clone())
                .or_default()
                .push(node.urn.clone());
        }

        self.order.push(node.urn.clone());
        self.nodes.insert(node.urn.clone(), node);
        Ok(())
    }

    /// Drop every node registered after the first `len`, newest first.
    ///
    /// Used to undo a composition that failed part-way; nodes registered
    /// before the mark, and their edges, are untouched.
    pub fn truncate(&mut self, len: usize) {
        while self.order.len() > len {
            let Some(urn) = self.order.pop() else {
                break;
            };
            if let Some(node) = self.nodes.remove(&urn) {
                if let Some(parent) = &node.parent {
                    if let Some(siblings) = self.children.get_mut(parent) {
                        siblings.retain(|c| c != &urn);
                        if siblings.is_empty() {
                            self.children.remove(parent);
                        }
                    }
                }
            }
            self.children.remove(&urn);
        }
    }

    /// Get a node by URN
    pub fn get(&self, urn: &Urn) -> Option<&GraphNode> {
        self.nodes.get(urn)
    }

    /// Check if a URN is registered
    pub fn contains(&self, urn: &Urn) -> bool {
        self.nodes.contains_key(urn)
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in registration order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().filter_map(|urn| self.nodes.get(urn))
    }

    /// Resource nodes in registration order
    pub fn resources(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes().filter(|n| !n.is_component())
    }

    /// Direct children of a node, in registration order
    pub fn children(&self, urn: &Urn) -> &[Urn] {
        self.children.get(urn).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node owned directly or transitively by `urn`, depth-first
    pub fn descendants(&self, urn: &Urn) -> Vec<Urn> {
        let mut out = Vec::new();
        let mut stack: Vec<&Urn> = self.children(urn).iter().rev().collect();
        while let Some(next) = stack.pop() {
            out.push(next.clone());
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Owners of `urn`, nearest first
    pub fn ancestors(&self, urn: &Urn) -> Vec<Urn> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(urn).and_then(|n| n.parent.as_ref());
        while let Some(parent) = current {
            out.push(parent.clone());
            current = self.nodes.get(parent).and_then(|n| n.parent.as_ref());
        }
        out
    }

    /// Compute the resources `urn` must be applied after.
    ///
    /// Collects the node's own edges plus every edge on its owning
    /// components (resource owners only scope identity), then expands each
    /// component target into the resources it owns. Edges onto an owning
    /// component are dropped; an owning resource is still a valid target.
    /// Targets not registered here land in `external`.
    pub fn resolve_edges(&self, urn: &Urn) -> ResolvedEdges {
        let mut resolved = ResolvedEdges::default();
        let Some(node) = self.nodes.get(urn) else {
            return resolved;
        };

        let owners: Vec<&GraphNode> = self
            .ancestors(urn)
            .iter()
            .filter_map(|a| self.nodes.get(a))
            .filter(|n| n.is_component())
            .collect();
        let mut targets = node.all_edges();
        for owner in &owners {
            targets.extend(owner.all_edges());
        }

        for target in targets {
            // Edges onto an owning component never order its own members
            if owners.iter().any(|o| o.urn == target) {
                continue;
            }
            match self.nodes.get(&target) {
                None => {
                    resolved.external.insert(target);
                }
                Some(t) if t.is_component() => {
                    for d in self.descendants(&target) {
                        if self.nodes.get(&d).is_some_and(|n| !n.is_component()) {
                            resolved.internal.insert(d);
                        }
                    }
                }
                Some(_) => {
                    resolved.internal.insert(target);
                }
            }
        }

        resolved.internal.remove(urn);
        if !resolved.external.is_empty() {
            debug!(
                urn = %urn,
                external = resolved.external.len(),
                "ordering edges reference nodes outside this stack; treating them as satisfied"
            );
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urn(name: &str) -> Urn {
        Urn::root("dev", "home", "test:Resource", name)
    }

    fn component(name: &str) -> Urn {
        Urn::root("dev", "home", "test:Component", name)
    }

    fn body(name: &str) -> ResourceBody {
        ResourceBody::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "default"}
        }))
        .expect("body should parse")
    }

    // ==========================================================================
    // Registration
    // ==========================================================================

    #[test]
    fn test_insert_and_lookup() {
        let mut graph = DeclarationGraph::new();
        let a = urn("a");
        graph
            .insert_resource(a.clone(), body("a"), ResourceOptions::new())
            .unwrap();

        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&a));
        assert_eq!(graph.get(&a).unwrap().body().unwrap().name, "a");
    }

    #[test]
    fn test_duplicate_urn_rejected() {
        let mut graph = DeclarationGraph::new();
        graph
            .insert_resource(urn("a"), body("a"), ResourceOptions::new())
            .unwrap();
        let err = graph
            .insert_resource(urn("a"), body("a"), ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateUrn { .. }));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut graph = DeclarationGraph::new();
        let err = graph
            .insert_resource(
                urn("child"),
                body("child"),
                ResourceOptions::with_parent(&component("missing")),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParent { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_children_and_descendants() {
        let mut graph = DeclarationGraph::new();
        let root = component("ingress");
        let cert = root.child("test:Component", "cert");
        let cert_cr = cert.child("test:Resource", "cert-cr");
        let route = root.child("test:Resource", "route");

        graph.insert_component(root.clone(), ResourceOptions::new()).unwrap();
        graph
            .insert_component(cert.clone(), ResourceOptions::with_parent(&root))
            .unwrap();
        graph
            .insert_resource(cert_cr.clone(), body("cert-cr"), ResourceOptions::with_parent(&cert))
            .unwrap();
        graph
            .insert_resource(route.clone(), body("route"), ResourceOptions::with_parent(&root))
            .unwrap();

        assert_eq!(graph.children(&root), &[cert.clone(), route.clone()]);
        assert_eq!(
            graph.descendants(&root),
            vec![cert.clone(), cert_cr.clone(), route.clone()]
        );
        assert_eq!(graph.ancestors(&cert_cr), vec![cert, root]);
        assert_eq!(graph.resources().count(), 2);
    }

    // ==========================================================================
    // Edge resolution
    // ==========================================================================

    #[test]
    fn test_edge_onto_component_expands_to_its_resources() {
        let mut graph = DeclarationGraph::new();
        let vol = component("media");
        let pv = vol.child("test:Resource", "media-pv");
        let pvc = vol.child("test:Resource", "media-pvc");
        let deploy = urn("deploy");

        graph.insert_component(vol.clone(), ResourceOptions::new()).unwrap();
        graph
            .insert_resource(pv.clone(), body("media-pv"), ResourceOptions::with_parent(&vol))
            .unwrap();
        graph
            .insert_resource(pvc.clone(), body("media-pvc"), ResourceOptions::with_parent(&vol))
            .unwrap();
        graph
            .insert_resource(
                deploy.clone(),
                body("deploy"),
                ResourceOptions::new().depends_on(&vol),
            )
            .unwrap();

        let edges = graph.resolve_edges(&deploy);
        assert_eq!(edges.internal, [pv, pvc].into_iter().collect());
        assert!(edges.external.is_empty());
    }

    #[test]
    fn test_component_edges_are_inherited() {
        let mut graph = DeclarationGraph::new();
        let ns = urn("ns");
        let comp = component("app");
        let child = comp.child("test:Resource", "child");

        graph
            .insert_resource(ns.clone(), body("ns"), ResourceOptions::new())
            .unwrap();
        graph
            .insert_component(comp.clone(), ResourceOptions::new().depends_on(&ns))
            .unwrap();
        graph
            .insert_resource(child.clone(), body("child"), ResourceOptions::with_parent(&comp))
            .unwrap();

        assert!(graph.resolve_edges(&child).internal.contains(&ns));
    }

    #[test]
    fn test_external_edges_are_separated() {
        let mut graph = DeclarationGraph::new();
        let a = urn("a");
        let outside = Urn::root("prod", "other", "test:Resource", "x");
        graph
            .insert_resource(a.clone(), body("a"), ResourceOptions::new().depends_on(&outside))
            .unwrap();

        let edges = graph.resolve_edges(&a);
        assert!(edges.internal.is_empty());
        assert!(edges.external.contains(&outside));
    }

    #[test]
    fn test_parent_does_not_imply_ordering() {
        let mut graph = DeclarationGraph::new();
        let owner = urn("owner");
        let child = owner.child("test:Resource", "child");
        graph
            .insert_resource(owner.clone(), body("owner"), ResourceOptions::new())
            .unwrap();
        graph
            .insert_resource(child.clone(), body("child"), ResourceOptions::with_parent(&owner))
            .unwrap();

        assert!(graph.resolve_edges(&child).internal.is_empty());
    }

    #[test]
    fn test_truncate_drops_newest_nodes() {
        let mut graph = DeclarationGraph::new();
        let keep = urn("keep");
        let comp = component("app");
        let child = comp.child("test:Resource", "child");

        graph
            .insert_resource(keep.clone(), body("keep"), ResourceOptions::new())
            .unwrap();
        let mark = graph.len();
        graph.insert_component(comp.clone(), ResourceOptions::new()).unwrap();
        graph
            .insert_resource(child.clone(), body("child"), ResourceOptions::with_parent(&comp))
            .unwrap();

        graph.truncate(mark);

        assert_eq!(graph.len(), 1);
        assert!(graph.contains(&keep));
        assert!(!graph.contains(&comp));
        assert!(graph.children(&comp).is_empty());
        assert_eq!(graph.nodes().count(), 1);

        // The same URNs register cleanly again
        graph.insert_component(comp.clone(), ResourceOptions::new()).unwrap();
        graph
            .insert_resource(child, body("child"), ResourceOptions::with_parent(&comp))
            .unwrap();
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_edge_onto_own_owner_is_ignored() {
        let mut graph = DeclarationGraph::new();
        let comp = component("app");
        let first = comp.child("test:Resource", "first");
        let second = comp.child("test:Resource", "second");

        graph.insert_component(comp.clone(), ResourceOptions::new()).unwrap();
        graph
            .insert_resource(first.clone(), body("first"), ResourceOptions::with_parent(&comp))
            .unwrap();
        graph
            .insert_resource(
                second.clone(),
                body("second"),
                ResourceOptions::with_parent(&comp).depends_on(&comp),
            )
            .unwrap();

        assert!(graph.resolve_edges(&second).internal.is_empty());
    }

    #[test]
    fn test_owning_resource_is_still_an_edge_target() {
        let mut graph = DeclarationGraph::new();
        let service = urn("svc");
        let route = service.child("test:Resource", "route");
        graph
            .insert_resource(service.clone(), body("svc"), ResourceOptions::new())
            .unwrap();
        graph
            .insert_resource(
                route.clone(),
                body("route"),
                ResourceOptions::with_parent(&service).depends_on(&service),
            )
            .unwrap();

        assert!(graph.resolve_edges(&route).internal.contains(&service));
    }
}
