//! Unique resource names
//!
//! A URN identifies one node of the declaration graph within a stack:
//!
//! ```text
//! urn:homelab:<stack>::<project>::<type-chain>::<name>
//! ```
//!
//! The type chain is the parent's chain with the node's own type appended
//! (`homelab:resources:Ingress$homelab:resources:Certificate$kubernetes:cert-manager.io/v1:Certificate`),
//! so a child's identity is namespaced by its owner the way the engine
//! expects.

use std::fmt;

/// Separator between the segments of a type chain
pub const TYPE_CHAIN_SEPARATOR: char = '$';

/// Unique name of a component or resource declaration
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Urn {
    stack: String,
    project: String,
    type_chain: String,
    name: String,
}

impl Urn {
    /// Build a URN for a root node (no parent)
    pub fn root(
        stack: impl Into<String>,
        project: impl Into<String>,
        type_token: &str,
        name: impl Into<String>,
    ) -> Self {
        Self {
            stack: stack.into(),
            project: project.into(),
            type_chain: type_token.to_string(),
            name: name.into(),
        }
    }

    /// Build a URN for a node owned by `self`
    pub fn child(&self, type_token: &str, name: impl Into<String>) -> Self {
        Self {
            stack: self.stack.clone(),
            project: self.project.clone(),
            type_chain: format!("{}{}{}", self.type_chain, TYPE_CHAIN_SEPARATOR, type_token),
            name: name.into(),
        }
    }

    /// Logical name of the node
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The node's own type token (last segment of the chain)
    pub fn type_token(&self) -> &str {
        self.type_chain
            .rsplit(TYPE_CHAIN_SEPARATOR)
            .next()
            .unwrap_or(&self.type_chain)
    }

    /// Full type chain including ancestors
    pub fn type_chain(&self) -> &str {
        &self.type_chain
    }

    /// Stack the node belongs to
    pub fn stack(&self) -> &str {
        &self.stack
    }

    /// Project the node belongs to
    pub fn project(&self) -> &str {
        &self.project
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:homelab:{}::{}::{}::{}",
            self.stack, self.project, self.type_chain, self.name
        )
    }
}
