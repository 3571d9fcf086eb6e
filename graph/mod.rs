/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graph data structures for the replayed heap.
//!
//! Core structures:
//! - `HeapGraph`: mutable object/reference graph backed by petgraph::StableGraph
//! - `HeapObject`: one simulated allocation with its renderer-visible state
//! - `Reference`: a directed reference with a soft removal status
//!
//! Boundary: mutation methods are `pub(crate)` — the replay engine is the
//! single write path; callers outside it are invariant violations.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::{Directed, Direction};
use serde::Serialize;
use std::collections::HashMap;

/// Opaque object id, unique within one simulation run.
pub type ObjectId = u64;

/// Stable node handle (petgraph NodeIndex — survives other deletions)
pub type NodeKey = NodeIndex;

/// Stable edge handle (petgraph EdgeIndex)
pub type EdgeKey = EdgeIndex;

/// Default object size in bytes when the payload gives none.
pub const DEFAULT_OBJECT_SIZE: u64 = 64;

/// Lifecycle status of a simulated object.
///
/// `Deleted` objects stay in the graph so the renderer can show their
/// terminal state; only a fresh `allocate` of a different id adds nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStatus {
    Alive,
    Deleted,
    /// Unreclaimable under the collector that produced the run (RC on a cycle).
    Leaked,
}

impl ObjectStatus {
    /// Parse a backend status string. Anything unrecognized counts as alive,
    /// matching the source's equality checks against `deleted`/`leaked`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "deleted" => ObjectStatus::Deleted,
            "leaked" => ObjectStatus::Leaked,
            _ => ObjectStatus::Alive,
        }
    }
}

/// Reference classification supplied by the operation, not computed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkType {
    Normal,
    /// The reference whose creation closed a directed cycle.
    Cycle,
}

/// Soft status of a reference. Removed edges are kept for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Active,
    Removed,
}

/// A simulated allocation in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeapObject {
    /// Stable object identity, immutable once allocated.
    pub id: ObjectId,

    /// Size in bytes, informational only.
    pub size: u64,

    pub status: ObjectStatus,

    /// Reachable from the outside world.
    pub is_root: bool,

    /// Mark-phase reachability flag (MS only; RC runs leave it true).
    pub is_marked: bool,
}

/// Directed reference payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub link_type: LinkType,
    pub status: LinkStatus,
}

/// Read-only view of a reference, keyed by object ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferenceView {
    pub from_id: ObjectId,
    pub to_id: ObjectId,
    pub link_type: LinkType,
    pub status: LinkStatus,
}

/// Full serializable state after a replay step — enough for a renderer to
/// redraw without consulting prior state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeapView {
    pub objects: Vec<HeapObject>,
    pub references: Vec<ReferenceView>,
}

/// Mutable object/reference graph backed by petgraph::StableGraph.
#[derive(Clone, Default)]
pub struct HeapGraph {
    inner: StableGraph<HeapObject, Reference, Directed>,

    /// Object id to node mapping. Deleted objects stay mapped.
    id_to_node: HashMap<ObjectId, NodeKey>,
}

impl HeapGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            id_to_node: HashMap::new(),
        }
    }

    /// Add a new object. Returns `None` when the id is already allocated.
    pub(crate) fn allocate(&mut self, id: ObjectId, size: u64) -> Option<NodeKey> {
        if self.id_to_node.contains_key(&id) {
            return None;
        }
        let key = self.inner.add_node(HeapObject {
            id,
            size,
            status: ObjectStatus::Alive,
            is_root: false,
            is_marked: true,
        });
        self.id_to_node.insert(id, key);
        Some(key)
    }

    /// Flip the root flag. Returns false when the object does not exist.
    pub(crate) fn set_root(&mut self, id: ObjectId, is_root: bool) -> bool {
        let Some(object) = self.object_mut(id) else {
            return false;
        };
        object.is_root = is_root;
        true
    }

    /// Flip the mark-phase reachability flag.
    pub(crate) fn set_mark(&mut self, id: ObjectId, is_marked: bool) -> bool {
        let Some(object) = self.object_mut(id) else {
            return false;
        };
        object.is_marked = is_marked;
        true
    }

    /// Set the lifecycle status without touching edges.
    pub(crate) fn set_status(&mut self, id: ObjectId, status: ObjectStatus) -> bool {
        let Some(object) = self.object_mut(id) else {
            return false;
        };
        object.status = status;
        true
    }

    /// Add a directed reference from `from` to `to`.
    ///
    /// Idempotent per ordered `(from, to, link_type)` triple: an existing
    /// active edge makes this a no-op, and a soft-removed edge is reactivated
    /// rather than stacked with a duplicate. Returns false when either
    /// endpoint does not exist.
    pub(crate) fn add_reference(
        &mut self,
        from: ObjectId,
        to: ObjectId,
        link_type: LinkType,
    ) -> bool {
        let (Some(from_key), Some(to_key)) = (self.node_key(from), self.node_key(to)) else {
            return false;
        };
        if let Some(edge_key) = self.find_reference(from_key, to_key, link_type) {
            if let Some(reference) = self.inner.edge_weight_mut(edge_key) {
                reference.status = LinkStatus::Active;
            }
            return true;
        }
        let _ = self.inner.add_edge(
            from_key,
            to_key,
            Reference {
                link_type,
                status: LinkStatus::Active,
            },
        );
        true
    }

    /// Soft-remove the first active reference from `from` to `to`, regardless
    /// of link type. Returns false when no active edge matches.
    pub(crate) fn remove_reference(&mut self, from: ObjectId, to: ObjectId) -> bool {
        let (Some(from_key), Some(to_key)) = (self.node_key(from), self.node_key(to)) else {
            return false;
        };
        let active = self
            .inner
            .edges_directed(from_key, Direction::Outgoing)
            .find(|edge| edge.target() == to_key && edge.weight().status == LinkStatus::Active)
            .map(|edge| edge.id());
        let Some(edge_key) = active else {
            return false;
        };
        if let Some(reference) = self.inner.edge_weight_mut(edge_key) {
            reference.status = LinkStatus::Removed;
        }
        true
    }

    /// Delete an object: hard-remove every incident edge (both directions,
    /// removed edges included), then set the terminal status and clear the
    /// root and mark flags. The node itself is retained. Idempotent.
    pub(crate) fn hard_delete(&mut self, id: ObjectId) -> bool {
        let Some(key) = self.node_key(id) else {
            return false;
        };
        let incident: Vec<EdgeKey> = self
            .inner
            .edges_directed(key, Direction::Outgoing)
            .chain(self.inner.edges_directed(key, Direction::Incoming))
            .map(|edge| edge.id())
            .collect();
        for edge_key in incident {
            let _ = self.inner.remove_edge(edge_key);
        }
        if let Some(object) = self.inner.node_weight_mut(key) {
            object.status = ObjectStatus::Deleted;
            object.is_marked = false;
            object.is_root = false;
        }
        true
    }

    /// Get an object by id.
    pub fn object(&self, id: ObjectId) -> Option<&HeapObject> {
        let key = *self.id_to_node.get(&id)?;
        self.inner.node_weight(key)
    }

    /// Whether an object with this id was ever allocated.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.id_to_node.contains_key(&id)
    }

    fn node_key(&self, id: ObjectId) -> Option<NodeKey> {
        self.id_to_node.get(&id).copied()
    }

    fn object_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        let key = *self.id_to_node.get(&id)?;
        self.inner.node_weight_mut(key)
    }

    fn find_reference(
        &self,
        from_key: NodeKey,
        to_key: NodeKey,
        link_type: LinkType,
    ) -> Option<EdgeKey> {
        self.inner
            .edges_directed(from_key, Direction::Outgoing)
            .find(|edge| edge.target() == to_key && edge.weight().link_type == link_type)
            .map(|edge| edge.id())
    }

    /// Iterate over all objects in allocation order.
    pub fn objects(&self) -> impl Iterator<Item = &HeapObject> {
        self.inner.node_indices().map(move |idx| &self.inner[idx])
    }

    /// Iterate over all references as ReferenceView
    pub fn references(&self) -> impl Iterator<Item = ReferenceView> + '_ {
        self.inner.edge_references().map(|edge| ReferenceView {
            from_id: self.inner[edge.source()].id,
            to_id: self.inner[edge.target()].id,
            link_type: edge.weight().link_type,
            status: edge.weight().status,
        })
    }

    /// Count of objects, deleted ones included.
    pub fn object_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Count of references still present (active or soft-removed).
    pub fn reference_count(&self) -> usize {
        self.inner.edge_count()
    }

    /// Count of active references touching an object, both directions.
    pub fn active_degree(&self, id: ObjectId) -> usize {
        let Some(key) = self.node_key(id) else {
            return 0;
        };
        self.inner
            .edges_directed(key, Direction::Outgoing)
            .chain(self.inner.edges_directed(key, Direction::Incoming))
            .filter(|edge| edge.weight().status == LinkStatus::Active)
            .count()
    }

    /// Count of objects currently flagged as roots.
    pub fn root_count(&self) -> usize {
        self.objects().filter(|object| object.is_root).count()
    }

    /// Serialize the full current state for the renderer.
    pub fn view(&self) -> HeapView {
        HeapView {
            objects: self.objects().cloned().collect(),
            references: self.references().collect(),
        }
    }
}
