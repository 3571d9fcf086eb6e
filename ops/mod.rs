/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The closed vocabulary of atomic graph mutations.
//!
//! Backend records arrive as loosely-typed JSON objects (`RawOperation`);
//! conversion into the `Operation` enum is where malformed records are caught.
//! Untrusted input never aborts a run: a bad record is reported as an
//! `OperationError` and the caller skips it.

use crate::graph::ObjectId;
use serde::Deserialize;

/// One atomic mutation of the heap graph. Ordering is total: operations apply
/// strictly in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Create an object: status alive, marked, not a root.
    Allocate { obj_id: ObjectId, size: u64 },

    /// Flag an object as reachable from the outside world.
    AddRoot { obj_id: ObjectId },

    /// Create or reactivate a normal reference `obj_id -> target_id`.
    AddRef { obj_id: ObjectId, target_id: ObjectId },

    /// Create a reference documented as closing a directed cycle. The
    /// classification comes from the producer, not from graph topology.
    CycleClosure { obj_id: ObjectId, target_id: ObjectId },

    /// Drop the root flag — the trigger that makes the graph collectible.
    RemoveRoot { obj_id: ObjectId },

    /// Soft-remove the active reference `obj_id -> target_id`.
    RemoveRef { obj_id: ObjectId, target_id: ObjectId },

    /// Mark-phase result: the object was not reached.
    MarkUnreachable { obj_id: ObjectId },

    /// RC verdict on a cycle member: still allocated, never reclaimed.
    MarkLeaked { obj_id: ObjectId },

    /// Hard-remove all incident references and set terminal status.
    Delete { obj_id: ObjectId },

    /// No mutation; the consumer should render the current state and wait.
    Pause,
}

impl Operation {
    /// Wire tag for this operation.
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Allocate { .. } => "allocate",
            Operation::AddRoot { .. } => "addroot",
            Operation::AddRef { .. } => "addref",
            Operation::CycleClosure { .. } => "cycle_closure",
            Operation::RemoveRoot { .. } => "removeroot",
            Operation::RemoveRef { .. } => "removeref",
            Operation::MarkUnreachable { .. } => "mark_unreachable",
            Operation::MarkLeaked { .. } => "mark_leaked",
            Operation::Delete { .. } => "delete",
            Operation::Pause => "pause",
        }
    }
}

/// A backend operation record before validation. Extra fields (the source
/// duplicates `obj_id`/`target_id` as `from`/`to` on some records) are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOperation {
    pub op: String,
    #[serde(default)]
    pub obj_id: Option<ObjectId>,
    #[serde(default)]
    pub target_id: Option<ObjectId>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// Malformed operation record: unknown tag or missing required field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    UnknownTag(String),
    MissingField {
        op: &'static str,
        field: &'static str,
    },
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationError::UnknownTag(tag) => write!(f, "unknown operation tag: {tag:?}"),
            OperationError::MissingField { op, field } => {
                write!(f, "operation {op:?} is missing required field {field:?}")
            }
        }
    }
}

impl std::error::Error for OperationError {}

impl TryFrom<&RawOperation> for Operation {
    type Error = OperationError;

    fn try_from(raw: &RawOperation) -> Result<Self, Self::Error> {
        fn require(
            value: Option<u64>,
            op: &'static str,
            field: &'static str,
        ) -> Result<u64, OperationError> {
            value.ok_or(OperationError::MissingField { op, field })
        }

        match raw.op.as_str() {
            "allocate" => Ok(Operation::Allocate {
                obj_id: require(raw.obj_id, "allocate", "obj_id")?,
                size: require(raw.size, "allocate", "size")?,
            }),
            "addroot" => Ok(Operation::AddRoot {
                obj_id: require(raw.obj_id, "addroot", "obj_id")?,
            }),
            "addref" => Ok(Operation::AddRef {
                obj_id: require(raw.obj_id, "addref", "obj_id")?,
                target_id: require(raw.target_id, "addref", "target_id")?,
            }),
            "cycle_closure" => Ok(Operation::CycleClosure {
                obj_id: require(raw.obj_id, "cycle_closure", "obj_id")?,
                target_id: require(raw.target_id, "cycle_closure", "target_id")?,
            }),
            "removeroot" => Ok(Operation::RemoveRoot {
                obj_id: require(raw.obj_id, "removeroot", "obj_id")?,
            }),
            "removeref" => Ok(Operation::RemoveRef {
                obj_id: require(raw.obj_id, "removeref", "obj_id")?,
                target_id: require(raw.target_id, "removeref", "target_id")?,
            }),
            "mark_unreachable" => Ok(Operation::MarkUnreachable {
                obj_id: require(raw.obj_id, "mark_unreachable", "obj_id")?,
            }),
            "mark_leaked" => Ok(Operation::MarkLeaked {
                obj_id: require(raw.obj_id, "mark_leaked", "obj_id")?,
            }),
            "delete" => Ok(Operation::Delete {
                obj_id: require(raw.obj_id, "delete", "obj_id")?,
            }),
            "pause" => Ok(Operation::Pause),
            other => Err(OperationError::UnknownTag(other.to_string())),
        }
    }
}
