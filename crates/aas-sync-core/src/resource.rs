//! Resource graphs observed from remote services
//!
//! A [`ResourceGraph`] is the snapshot of everything a service exposes at one
//! point in time: root resources (shells, submodels, concept descriptions)
//! and their nested elements. Only what is needed to identify, reference and
//! compare resources is modelled; the payload of each node is kept as opaque
//! JSON content.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{CoreError, CoreResult};

/// Kind of a root-level resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Shell,
    Submodel,
    ConceptDescription,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Shell => write!(f, "shell"),
            ResourceKind::Submodel => write!(f, "submodel"),
            ResourceKind::ConceptDescription => write!(f, "concept_description"),
        }
    }
}

/// Typed path from a service's root to one of its resources
///
/// Root resources have an empty `path`; nested elements append one segment
/// per level (e.g. `submodel:sm-1/Nameplate.ManufacturerName`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceReference {
    kind: ResourceKind,
    id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    path: Vec<String>,
}

impl ResourceReference {
    /// Reference to a root-level resource
    pub fn root(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            path: Vec::new(),
        }
    }

    /// Reference to a direct child of this resource
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self {
            kind: self.kind,
            id: self.id.clone(),
            path,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether this references a root-level resource
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }
}

impl fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)?;
        if !self.path.is_empty() {
            write!(f, "/{}", self.path.join("."))?;
        }
        Ok(())
    }
}

/// One node of a resource graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    reference: ResourceReference,
    #[serde(default)]
    content: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Resource>,
}

impl Resource {
    /// Create a root-level resource
    pub fn root(kind: ResourceKind, id: impl Into<String>, content: serde_json::Value) -> Self {
        Self {
            reference: ResourceReference::root(kind, id),
            content,
            children: Vec::new(),
        }
    }

    /// Append a nested element below this resource
    pub fn with_child(mut self, segment: impl Into<String>, content: serde_json::Value) -> Self {
        let child = Resource {
            reference: self.reference.child(segment),
            content,
            children: Vec::new(),
        };
        self.children.push(child);
        self
    }

    /// Append an already built subtree below this resource.
    ///
    /// The subtree is re-rooted so that every reference in it extends this
    /// resource's reference.
    pub fn with_subtree(mut self, segment: impl Into<String>, subtree: Resource) -> Self {
        let reference = self.reference.child(segment);
        self.children.push(subtree.rebased(reference));
        self
    }

    fn rebased(self, reference: ResourceReference) -> Self {
        let children = self
            .children
            .into_iter()
            .map(|child| {
                let segment = child
                    .reference
                    .path
                    .last()
                    .cloned()
                    .unwrap_or_else(|| child.reference.id.clone());
                let child_reference = reference.child(segment);
                child.rebased(child_reference)
            })
            .collect();
        Self {
            reference,
            content: self.content,
            children,
        }
    }

    pub fn reference(&self) -> &ResourceReference {
        &self.reference
    }

    pub fn content(&self) -> &serde_json::Value {
        &self.content
    }

    pub fn children(&self) -> &[Resource] {
        &self.children
    }

    /// Flat catalog entry for this node (own content only, no children)
    pub fn entry(&self) -> ResourceEntry {
        ResourceEntry {
            reference: self.reference.clone(),
            content: self.content.clone(),
        }
    }
}

/// Flat view of a single resource as handed to the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    pub reference: ResourceReference,
    pub content: serde_json::Value,
}

/// Snapshot of every resource a service exposes
///
/// Snapshots are never mutated after construction; the registry shares them
/// behind an `Arc` so an old snapshot stays valid while a new one is
/// installed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceGraph {
    #[serde(default)]
    roots: Vec<Resource>,
}

impl ResourceGraph {
    pub fn new(roots: Vec<Resource>) -> Self {
        Self { roots }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn roots(&self) -> &[Resource] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// All reachable resources in pre-order (each root followed by its subtree)
    pub fn walk(&self) -> Vec<&Resource> {
        let mut out = Vec::new();
        let mut stack: Vec<&Resource> = self.roots.iter().rev().collect();
        while let Some(resource) = stack.pop() {
            out.push(resource);
            stack.extend(resource.children.iter().rev());
        }
        out
    }

    /// All reachable references in pre-order
    pub fn references(&self) -> Vec<&ResourceReference> {
        self.walk().into_iter().map(Resource::reference).collect()
    }

    /// Check that no reference occurs twice in this graph.
    pub fn validate(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for reference in self.references() {
            if !seen.insert(reference) {
                return Err(CoreError::InvariantViolation(format!(
                    "duplicate resource reference {} in snapshot",
                    reference
                )));
            }
        }
        Ok(())
    }

    /// Copy of this graph keeping only root resources of the given kinds
    pub fn retain_kinds(&self, kinds: &[ResourceKind]) -> Self {
        Self {
            roots: self
                .roots
                .iter()
                .filter(|root| kinds.contains(&root.reference.kind))
                .cloned()
                .collect(),
        }
    }
}
