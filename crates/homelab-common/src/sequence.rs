//! Topological sort for determining apply order
//!
//! This module computes the order in which a stack's resources are applied.
//! Every resource lands in a group after the groups holding the resources it
//! depends on; resources within a group have no edges between them and can be
//! applied concurrently. Teardown walks the groups in reverse.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::graph::DeclarationGraph;
use crate::urn::Urn;
use crate::{Error, Result};

/// A group of resources that can be applied in parallel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyGroup {
    /// URNs in this group, in registration order
    pub urns: Vec<Urn>,
}

impl ApplyGroup {
    /// Check if the group is empty
    pub fn is_empty(&self) -> bool {
        self.urns.is_empty()
    }

    /// Get the number of resources in the group
    pub fn len(&self) -> usize {
        self.urns.len()
    }
}

/// Ordered sequence of groups for applying a stack
///
/// All dependencies of resources in group N are in groups 0..N-1.
#[derive(Debug)]
pub struct ApplySequence {
    groups: Vec<ApplyGroup>,
    total: usize,
}

impl ApplySequence {
    /// Compute the apply sequence from a declaration graph
    ///
    /// Uses Kahn's algorithm, one level at a time:
    /// 1. Find all unplaced resources whose dependencies are placed
    /// 2. Add them to the current group
    /// 3. Repeat until everything is placed
    ///
    /// Candidates are scanned in registration order so the same graph always
    /// yields the same sequence.
    pub fn from_graph(graph: &DeclarationGraph) -> Result<Self> {
        let resources: Vec<(Urn, BTreeSet<Urn>)> = graph
            .resources()
            .map(|n| (n.urn.clone(), graph.resolve_edges(&n.urn).internal))
            .collect();
        let total = resources.len();

        let mut placed: BTreeSet<Urn> = BTreeSet::new();
        let mut groups: Vec<ApplyGroup> = Vec::new();

        while placed.len() < total {
            let mut group = ApplyGroup::default();

            for (urn, deps) in &resources {
                if placed.contains(urn) {
                    continue;
                }
                if deps.iter().all(|d| placed.contains(d)) {
                    group.urns.push(urn.clone());
                }
            }

            // No progress means the remaining resources wait on each other
            if group.is_empty() {
                let stuck: Vec<String> = resources
                    .iter()
                    .filter(|(urn, _)| !placed.contains(urn))
                    .map(|(urn, _)| urn.name().to_string())
                    .collect();

                return Err(Error::CycleDetected(format!(
                    "cannot make progress, stuck resources: {:?}",
                    stuck
                )));
            }

            debug!(
                group = groups.len(),
                resources = group.len(),
                "Computed apply group"
            );

            placed.extend(group.urns.iter().cloned());
            groups.push(group);
        }

        info!(
            groups = groups.len(),
            resources = total,
            "Computed apply sequence"
        );

        Ok(Self { groups, total })
    }

    /// Get the ordered groups
    pub fn groups(&self) -> &[ApplyGroup] {
        &self.groups
    }

    /// Get the total number of resources
    pub fn total_resources(&self) -> usize {
        self.total
    }

    /// Get the number of groups
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Get all URNs in apply order (flattened)
    pub fn apply_order(&self) -> Vec<Urn> {
        self.groups
            .iter()
            .flat_map(|g| g.urns.iter().cloned())
            .collect()
    }

    /// Get all URNs in reverse order for teardown
    pub fn deletion_order(&self) -> Vec<Urn> {
        self.groups
            .iter()
            .rev()
            .flat_map(|g| g.urns.iter().rev().cloned())
            .collect()
    }

    /// Position of a resource in apply order
    pub fn position(&self, urn: &Urn) -> Option<usize> {
        self.groups
            .iter()
            .flat_map(|g| g.urns.iter())
            .position(|u| u == urn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::ResourceOptions;
    use crate::resource::ResourceBody;
    use proptest::prelude::*;

    fn urn(name: &str) -> Urn {
        Urn::root("dev", "home", "test:Resource", name)
    }

    fn body(name: &str) -> ResourceBody {
        ResourceBody::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name}
        }))
        .expect("body should parse")
    }

    fn make_test_graph(nodes: Vec<(&str, Vec<&str>)>) -> DeclarationGraph {
        let mut graph = DeclarationGraph::new();
        for (name, deps) in nodes {
            let opts = deps
                .into_iter()
                .fold(ResourceOptions::new(), |o, d| o.depends_on(&urn(d)));
            graph
                .insert_resource(urn(name), body(name), opts)
                .expect("insert should succeed");
        }
        graph
    }

    fn names(urns: Vec<Urn>) -> Vec<String> {
        urns.iter().map(|u| u.name().to_string()).collect()
    }

    #[test]
    fn test_apply_group_basic() {
        let group = ApplyGroup::default();
        assert!(group.is_empty());
        assert_eq!(group.len(), 0);
    }

    #[test]
    fn test_sequence_empty_graph() {
        let sequence = ApplySequence::from_graph(&DeclarationGraph::new()).unwrap();
        assert_eq!(sequence.num_groups(), 0);
        assert_eq!(sequence.total_resources(), 0);
    }

    #[test]
    fn test_sequence_linear_chain() {
        // c depends on b, b depends on a
        let graph = make_test_graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]);

        let sequence = ApplySequence::from_graph(&graph).unwrap();

        assert_eq!(sequence.num_groups(), 3);
        assert_eq!(sequence.total_resources(), 3);
        assert_eq!(names(sequence.apply_order()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sequence_registration_order_does_not_matter() {
        // b registered before the a it depends on
        let graph = make_test_graph(vec![("b", vec!["a"]), ("a", vec![])]);
        let sequence = ApplySequence::from_graph(&graph).unwrap();
        assert_eq!(names(sequence.apply_order()), vec!["a", "b"]);
    }

    #[test]
    fn test_sequence_diamond_dependency() {
        let graph = make_test_graph(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);

        let sequence = ApplySequence::from_graph(&graph).unwrap();

        // [a], [b, c], [d]
        assert_eq!(sequence.num_groups(), 3);
        assert_eq!(names(sequence.apply_order()), vec!["a", "b", "c", "d"]);
        assert_eq!(sequence.groups()[1].len(), 2);
    }

    #[test]
    fn test_sequence_parallel_roots() {
        let graph = make_test_graph(vec![("a", vec![]), ("b", vec![])]);
        let sequence = ApplySequence::from_graph(&graph).unwrap();
        assert_eq!(sequence.num_groups(), 1);
        assert_eq!(sequence.groups()[0].len(), 2);
    }

    #[test]
    fn test_sequence_external_dependency() {
        // b depends on a, but a is not in this stack
        let graph = make_test_graph(vec![("b", vec!["a"])]);
        let sequence = ApplySequence::from_graph(&graph).unwrap();
        assert_eq!(sequence.num_groups(), 1);
        assert_eq!(names(sequence.apply_order()), vec!["b"]);
    }

    #[test]
    fn test_sequence_cycle_detected() {
        let graph = make_test_graph(vec![("a", vec!["b"]), ("b", vec!["a"]), ("c", vec![])]);
        let err = ApplySequence::from_graph(&graph).unwrap_err();
        match err {
            Error::CycleDetected(msg) => {
                assert!(msg.contains("\"a\""));
                assert!(msg.contains("\"b\""));
                assert!(!msg.contains("\"c\""));
            }
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_deletion_order() {
        let graph = make_test_graph(vec![("a", vec![]), ("b", vec!["a"]), ("c", vec!["b"])]);
        let sequence = ApplySequence::from_graph(&graph).unwrap();
        assert_eq!(names(sequence.deletion_order()), vec!["c", "b", "a"]);
    }

    proptest! {
        /// Every resource of an acyclic graph lands after all of its
        /// dependencies, and teardown is the exact reverse.
        #[test]
        fn dependencies_always_come_first(
            deps in proptest::collection::vec(proptest::collection::vec(0usize..16, 0..4), 1..16),
        ) {
            // Node i may only depend on nodes before it, so the graph is a DAG
            let nodes: Vec<(String, Vec<String>)> = deps
                .iter()
                .enumerate()
                .map(|(i, ds)| {
                    let ds = ds
                        .iter()
                        .filter(|d| **d < i)
                        .map(|d| format!("n{}", d))
                        .collect();
                    (format!("n{}", i), ds)
                })
                .collect();

            let mut graph = DeclarationGraph::new();
            for (name, ds) in &nodes {
                let opts = ds
                    .iter()
                    .fold(ResourceOptions::new(), |o, d| o.depends_on(&urn(d)));
                graph.insert_resource(urn(name), body(name), opts).unwrap();
            }

            let sequence = ApplySequence::from_graph(&graph).unwrap();
            prop_assert_eq!(sequence.total_resources(), nodes.len());
            for (name, ds) in &nodes {
                let at = sequence.position(&urn(name)).unwrap();
                for d in ds {
                    prop_assert!(sequence.position(&urn(d)).unwrap() < at);
                }
            }

            let mut reversed = sequence.apply_order();
            reversed.reverse();
            prop_assert_eq!(sequence.deletion_order(), reversed);
        }
    }

    #[test]
    fn test_position() {
        let graph = make_test_graph(vec![("a", vec![]), ("b", vec!["a"])]);
        let sequence = ApplySequence::from_graph(&graph).unwrap();
        assert_eq!(sequence.position(&urn("a")), Some(0));
        assert_eq!(sequence.position(&urn("b")), Some(1));
        assert_eq!(sequence.position(&urn("missing")), None);
    }
}
