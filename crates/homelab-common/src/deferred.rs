//! Deferred values and declaration options
//!
//! A [`Deferred`] is a value some declaration produces (a namespace name, a
//! claim name, a certificate's secret name) together with the URNs of the
//! declarations that produce it. The engine resolves these against the live
//! platform during its own concurrent apply, so consuming one before then is
//! only defined in two ways:
//!
//! 1. **Read by reference**: [`Deferred::read`] hands out the value and
//!    records an implicit ordering edge onto every producer in the consuming
//!    declaration's [`ResourceOptions`].
//! 2. **Explicit ordering edge**: [`ResourceOptions::depends_on`] or
//!    [`Deferred::after`] without touching the value.
//!
//! The inner value has no other public accessor; the stack itself reads it
//! only to render exported outputs.

use std::collections::BTreeSet;

use crate::urn::Urn;

// =============================================================================
// ResourceOptions
// =============================================================================

/// Ownership and ordering options for one declaration or component
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceOptions {
    parent: Option<Urn>,
    depends_on: BTreeSet<Urn>,
    reads: BTreeSet<Urn>,
}

impl ResourceOptions {
    /// Options with no parent and no edges
    pub fn new() -> Self {
        Self::default()
    }

    /// Options owned by `parent`
    pub fn with_parent(parent: &Urn) -> Self {
        Self {
            parent: Some(parent.clone()),
            ..Self::default()
        }
    }

    /// Set the owning unit
    pub fn parent(mut self, parent: &Urn) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Add an explicit depends-after edge
    pub fn depends_on(mut self, urn: &Urn) -> Self {
        self.depends_on.insert(urn.clone());
        self
    }

    /// Add explicit depends-after edges onto every given URN
    pub fn depends_on_all<'a>(mut self, urns: impl IntoIterator<Item = &'a Urn>) -> Self {
        self.depends_on.extend(urns.into_iter().cloned());
        self
    }

    /// The owning unit, if any
    pub fn parent_urn(&self) -> Option<&Urn> {
        self.parent.as_ref()
    }

    /// Explicit depends-after edges
    pub fn explicit_edges(&self) -> &BTreeSet<Urn> {
        &self.depends_on
    }

    /// Edges recorded by reading deferred values
    pub fn implicit_edges(&self) -> &BTreeSet<Urn> {
        &self.reads
    }

    fn record_read<'a>(&mut self, sources: impl IntoIterator<Item = &'a Urn>) {
        self.reads.extend(sources.into_iter().cloned());
    }

    fn record_explicit<'a>(&mut self, sources: impl IntoIterator<Item = &'a Urn>) {
        self.depends_on.extend(sources.into_iter().cloned());
    }
}

// =============================================================================
// Deferred
// =============================================================================

/// A value produced by one or more declarations
#[must_use]
#[derive(Clone, Debug, PartialEq)]
pub struct Deferred<T> {
    value: T,
    sources: BTreeSet<Urn>,
}

impl<T> Deferred<T> {
    /// A literal with no producer. Reading it adds no edges.
    pub fn known(value: T) -> Self {
        Self {
            value,
            sources: BTreeSet::new(),
        }
    }

    /// A value produced by the declaration `source`
    pub fn produced_by(source: &Urn, value: T) -> Self {
        let mut sources = BTreeSet::new();
        sources.insert(source.clone());
        Self { value, sources }
    }

    /// Read the value, recording implicit edges onto its producers
    pub fn read(&self, opts: &mut ResourceOptions) -> &T {
        opts.record_read(&self.sources);
        &self.value
    }

    /// Order a declaration after this value's producers without reading it
    pub fn after(&self, opts: &mut ResourceOptions) {
        opts.record_explicit(&self.sources);
    }

    /// The value as the engine will resolve it, for rendering stack outputs
    pub(crate) fn resolved(&self) -> &T {
        &self.value
    }

    /// URNs of the declarations producing this value
    pub fn sources(&self) -> impl Iterator<Item = &Urn> {
        self.sources.iter()
    }

    /// Whether this value is a plain literal
    pub fn is_literal(&self) -> bool {
        self.sources.is_empty()
    }

    /// Derive a new value; the producers carry over
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Deferred<U> {
        Deferred {
            value: f(self.value),
            sources: self.sources,
        }
    }

    /// Combine two deferred values; the result depends on both producer sets
    pub fn zip<U>(self, other: Deferred<U>) -> Deferred<(T, U)> {
        let mut sources = self.sources;
        sources.extend(other.sources);
        Deferred {
            value: (self.value, other.value),
            sources,
        }
    }
}

impl From<&str> for Deferred<String> {
    fn from(value: &str) -> Self {
        Deferred::known(value.to_string())
    }
}

impl From<String> for Deferred<String> {
    fn from(value: String) -> Self {
        Deferred::known(value)
    }
}
