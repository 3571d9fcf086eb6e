/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Step-paced replay of a canonical operation sequence over a `HeapGraph`.
//!
//! One operation per `advance()` call, in order, never skipped or reordered.
//! Per-operation failures are recovered locally: the offending record is
//! logged, surfaced as `StepOutcome::Skipped`, and the run continues — a
//! single bad backend record never aborts an animated run. The consumer may
//! stop at any time; the graph stays in the last-applied consistent state.

use crate::graph::{HeapGraph, HeapView, LinkType, ObjectId, ObjectStatus};
use crate::normalize::SimulationRun;
use crate::ops::Operation;
use log::warn;

/// Recoverable per-operation replay failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayError {
    /// The operation names an object id that was never allocated.
    DanglingReference { id: ObjectId },

    /// A second `allocate` for an id that is already live.
    AlreadyAllocated { id: ObjectId },

    /// `removeref` found no active reference between the endpoints.
    MissingReference { from: ObjectId, to: ObjectId },
}

impl std::fmt::Display for ReplayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplayError::DanglingReference { id } => {
                write!(f, "operation references unallocated object {id}")
            }
            ReplayError::AlreadyAllocated { id } => {
                write!(f, "object {id} is already allocated")
            }
            ReplayError::MissingReference { from, to } => {
                write!(f, "no active reference {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for ReplayError {}

/// Result of one `advance()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The operation mutated the graph; render the new state.
    Applied { op: Operation },

    /// Pause sentinel: no mutation, render the current state and wait.
    Paused,

    /// The operation was dropped (logged, run continues).
    Skipped { op: Operation, error: ReplayError },

    /// Cursor at end of sequence. Repeated calls stay `Complete`.
    Complete,
}

/// Replays one simulation run over one graph. Two runs never share a graph.
pub struct ReplayEngine {
    graph: HeapGraph,
    sequence: Vec<Operation>,
    cursor: usize,
}

impl ReplayEngine {
    /// Engine with an empty sequence; reports completion immediately.
    pub fn new() -> Self {
        Self {
            graph: HeapGraph::new(),
            sequence: Vec::new(),
            cursor: 0,
        }
    }

    /// Start replaying a normalized run: fresh graph, cursor at zero.
    pub fn start(&mut self, run: &SimulationRun) {
        self.start_sequence(run.operations.clone());
    }

    /// Start replaying a bare operation sequence.
    pub fn start_sequence(&mut self, sequence: Vec<Operation>) {
        self.graph = HeapGraph::new();
        self.sequence = sequence;
        self.cursor = 0;
    }

    /// Apply the next operation and advance the logical clock.
    pub fn advance(&mut self) -> StepOutcome {
        let Some(op) = self.sequence.get(self.cursor).copied() else {
            return StepOutcome::Complete;
        };
        self.cursor += 1;

        if op == Operation::Pause {
            return StepOutcome::Paused;
        }
        match self.apply(op) {
            Ok(()) => StepOutcome::Applied { op },
            Err(error) => {
                warn!("skipping {} at step {}: {error}", op.tag(), self.cursor - 1);
                StepOutcome::Skipped { op, error }
            }
        }
    }

    /// Drive `advance()` to completion, handing the outcome and the graph to
    /// the observer after every step. Suitable for an externally-paced
    /// animation loop.
    pub fn run<F>(&mut self, mut observe: F)
    where
        F: FnMut(&StepOutcome, &HeapGraph),
    {
        loop {
            let outcome = self.advance();
            if outcome == StepOutcome::Complete {
                break;
            }
            observe(&outcome, &self.graph);
        }
    }

    fn apply(&mut self, op: Operation) -> Result<(), ReplayError> {
        match op {
            Operation::Allocate { obj_id, size } => {
                if self.graph.allocate(obj_id, size).is_none() {
                    return Err(ReplayError::AlreadyAllocated { id: obj_id });
                }
            }
            Operation::AddRoot { obj_id } => {
                if !self.graph.set_root(obj_id, true) {
                    return Err(ReplayError::DanglingReference { id: obj_id });
                }
            }
            Operation::RemoveRoot { obj_id } => {
                if !self.graph.set_root(obj_id, false) {
                    return Err(ReplayError::DanglingReference { id: obj_id });
                }
            }
            Operation::AddRef { obj_id, target_id } => {
                self.require(obj_id)?;
                self.require(target_id)?;
                let _ = self.graph.add_reference(obj_id, target_id, LinkType::Normal);
            }
            Operation::CycleClosure { obj_id, target_id } => {
                self.require(obj_id)?;
                self.require(target_id)?;
                let _ = self.graph.add_reference(obj_id, target_id, LinkType::Cycle);
            }
            Operation::RemoveRef { obj_id, target_id } => {
                self.require(obj_id)?;
                self.require(target_id)?;
                if !self.graph.remove_reference(obj_id, target_id) {
                    return Err(ReplayError::MissingReference {
                        from: obj_id,
                        to: target_id,
                    });
                }
            }
            Operation::MarkUnreachable { obj_id } => {
                if !self.graph.set_mark(obj_id, false) {
                    return Err(ReplayError::DanglingReference { id: obj_id });
                }
            }
            Operation::MarkLeaked { obj_id } => {
                if !self.graph.set_status(obj_id, ObjectStatus::Leaked) {
                    return Err(ReplayError::DanglingReference { id: obj_id });
                }
            }
            Operation::Delete { obj_id } => {
                if !self.graph.hard_delete(obj_id) {
                    return Err(ReplayError::DanglingReference { id: obj_id });
                }
            }
            // advance() returns Paused before reaching apply(); kept so the
            // match stays exhaustive over the vocabulary.
            Operation::Pause => {}
        }
        Ok(())
    }

    fn require(&self, id: ObjectId) -> Result<(), ReplayError> {
        if self.graph.contains(id) {
            Ok(())
        } else {
            Err(ReplayError::DanglingReference { id })
        }
    }

    /// The live graph in its last-applied consistent state.
    pub fn graph(&self) -> &HeapGraph {
        &self.graph
    }

    /// Serializable state after the last step.
    pub fn snapshot(&self) -> HeapView {
        self.graph.view()
    }

    /// Current step index into the canonical sequence.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total sequence length.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.sequence.len()
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}
