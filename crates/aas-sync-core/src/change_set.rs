//! Change sets and snapshot diffing
//!
//! A [`ChangeSet`] is the difference between two snapshots of one service,
//! expressed as resources to add to and references to remove from the
//! catalog. Updates are never patched in place: a resource whose content
//! changed is removed (old version) and added again (new version).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::CoreResult;
use crate::resource::{Resource, ResourceEntry, ResourceGraph, ResourceReference};

/// Additions and removals computed for one synchronization cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet<A, R> {
    to_add: Vec<A>,
    to_remove: Vec<R>,
}

/// Change set handed to the catalog for a single service
pub type ServiceChangeSet = ChangeSet<ResourceEntry, ResourceReference>;

impl<A, R> ChangeSet<A, R> {
    pub fn builder() -> ChangeSetBuilder<A, R> {
        ChangeSetBuilder::default()
    }

    /// A change set with nothing to do
    pub fn empty() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
        }
    }

    /// Items to add, in first-seen order
    pub fn to_add(&self) -> &[A] {
        &self.to_add
    }

    /// Items to remove, in first-seen order
    pub fn to_remove(&self) -> &[R] {
        &self.to_remove
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Total number of additions and removals
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    pub fn into_parts(self) -> (Vec<A>, Vec<R>) {
        (self.to_add, self.to_remove)
    }
}

impl<A, R> Default for ChangeSet<A, R> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder accumulating additions and removals in insertion order
#[derive(Debug)]
pub struct ChangeSetBuilder<A, R> {
    to_add: Vec<A>,
    to_remove: Vec<R>,
}

impl<A, R> Default for ChangeSetBuilder<A, R> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_remove: Vec::new(),
        }
    }
}

impl<A, R> ChangeSetBuilder<A, R> {
    pub fn add(mut self, item: A) -> Self {
        self.to_add.push(item);
        self
    }

    pub fn add_all(mut self, items: impl IntoIterator<Item = A>) -> Self {
        self.to_add.extend(items);
        self
    }

    pub fn remove(mut self, item: R) -> Self {
        self.to_remove.push(item);
        self
    }

    pub fn remove_all(mut self, items: impl IntoIterator<Item = R>) -> Self {
        self.to_remove.extend(items);
        self
    }

    pub fn build(self) -> ChangeSet<A, R> {
        ChangeSet {
            to_add: self.to_add,
            to_remove: self.to_remove,
        }
    }
}

/// Compute the change set that turns `old` into `new`.
///
/// `None` for `old` means the service was never synchronized: every resource
/// of `new` is an addition. Both graphs must be free of duplicate references.
pub fn diff(old: Option<&ResourceGraph>, new: &ResourceGraph) -> CoreResult<ServiceChangeSet> {
    new.validate()?;

    let Some(old) = old else {
        return Ok(ChangeSet::builder()
            .add_all(new.walk().into_iter().map(Resource::entry))
            .build());
    };
    old.validate()?;

    let old_index: HashMap<&ResourceReference, &Resource> = old
        .walk()
        .into_iter()
        .map(|resource| (resource.reference(), resource))
        .collect();
    let new_index: HashMap<&ResourceReference, &Resource> = new
        .walk()
        .into_iter()
        .map(|resource| (resource.reference(), resource))
        .collect();

    let mut builder = ChangeSet::builder();

    // Removals first, in the old graph's order, then additions in the new one's
    for resource in old.walk() {
        match new_index.get(resource.reference()) {
            None => builder = builder.remove(resource.reference().clone()),
            Some(current) if current.content() != resource.content() => {
                builder = builder.remove(resource.reference().clone())
            }
            Some(_) => {}
        }
    }

    for resource in new.walk() {
        match old_index.get(resource.reference()) {
            None => builder = builder.add(resource.entry()),
            Some(previous) if previous.content() != resource.content() => {
                builder = builder.add(resource.entry())
            }
            Some(_) => {}
        }
    }

    Ok(builder.build())
}

/// Change set removing every resource of a snapshot (used when a service goes away)
pub fn removal_of(snapshot: &ResourceGraph) -> ServiceChangeSet {
    ChangeSet::builder()
        .remove_all(snapshot.walk().into_iter().map(|r| r.reference().clone()))
        .build()
}
