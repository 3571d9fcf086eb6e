/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Payload normalization: heterogeneous backend shapes in, one canonical
//! operation sequence out.
//!
//! Three recognized shapes:
//! - Phase form `{ scenario, phases: [{ name, operations }] }` — flattened in
//!   order. Preferred: it carries the producer's real step trace.
//! - Flat form `[operation, ...]` — validated element-wise, passed through.
//! - Snapshot form `{ scenario, objects: [...] }` — no step trace at all;
//!   a plausible causal history is synthesized from the terminal statuses and
//!   the collector policy. This is a documented fallback, not a recomputation
//!   of the collector's actual trace.
//!
//! Per-record failures are logged and skipped; only a wholly unrecognized
//! payload shape is a hard error.

use crate::graph::{DEFAULT_OBJECT_SIZE, ObjectId, ObjectStatus};
use crate::ops::{Operation, RawOperation};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which collector produced a payload. Drives snapshot synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorKind {
    ReferenceCounting,
    MarkSweep,
}

impl CollectorKind {
    /// Short label used by the backend ("RC" / "MS").
    pub fn label(&self) -> &'static str {
        match self {
            CollectorKind::ReferenceCounting => "RC",
            CollectorKind::MarkSweep => "MS",
        }
    }
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregate statistics block from the backend. Consumed and displayed
/// verbatim; never produced or recomputed by the replay core.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryStatistics {
    #[serde(default)]
    pub total_allocated: u64,
    #[serde(default)]
    pub total_freed: u64,
    #[serde(default)]
    pub peak_memory: u64,
    #[serde(default)]
    pub leaked_memory: u64,
    #[serde(default)]
    pub recovery_percent: f64,
    #[serde(default)]
    pub objects_created: u64,
    #[serde(default)]
    pub objects_left: u64,
    #[serde(default)]
    pub execution_time_ms: f64,
}

impl MemoryStatistics {
    /// Recovery percentage derived from the object counts, the way the
    /// backend computes it. Useful when a payload left the field zeroed.
    pub fn derived_recovery_percent(&self) -> f64 {
        if self.objects_created == 0 {
            return 0.0;
        }
        let freed = self.objects_created.saturating_sub(self.objects_left);
        (freed as f64 / self.objects_created as f64) * 100.0
    }
}

/// One named phase in the phase-form payload. Operation records stay loose
/// until validation so one unreadable record costs itself, not the phase.
#[derive(Debug, Clone, Deserialize)]
pub struct Phase {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub operations: Vec<Value>,
}

/// One object row in the snapshot-form payload.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminalObject {
    pub id: ObjectId,
    pub status: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// A normalized simulation: the canonical operation sequence plus the labels
/// identifying which collector and scenario produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationRun {
    pub collector: CollectorKind,
    pub scenario: String,
    pub operations: Vec<Operation>,
    /// Pass-through statistics when the payload carried a stats block.
    pub stats: Option<MemoryStatistics>,
}

/// Unrecoverable normalization failure: the payload matches none of the three
/// recognized shapes. Nothing is replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    UnsupportedShape(String),
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NormalizeError::UnsupportedShape(detail) => {
                write!(f, "unsupported payload shape: {detail}")
            }
        }
    }
}

impl std::error::Error for NormalizeError {}

#[derive(Deserialize)]
struct PhasePayload {
    #[serde(default)]
    scenario: Option<String>,
    phases: Vec<Phase>,
    #[serde(default)]
    stats: Option<MemoryStatistics>,
}

#[derive(Deserialize)]
struct SnapshotPayload {
    #[serde(default)]
    scenario: Option<String>,
    objects: Vec<TerminalObject>,
    #[serde(default)]
    stats: Option<MemoryStatistics>,
}

const DEFAULT_SCENARIO: &str = "basic";

/// Normalize a backend payload into a canonical operation sequence.
///
/// Pure and deterministic: identical input (including the collector
/// discriminator) yields identical sequences.
pub fn normalize(collector: CollectorKind, payload: &Value) -> Result<SimulationRun, NormalizeError> {
    if let Some(records) = payload.as_array() {
        return Ok(SimulationRun {
            collector,
            scenario: DEFAULT_SCENARIO.to_string(),
            operations: validate_records(collector, records),
            stats: None,
        });
    }

    let Some(object) = payload.as_object() else {
        return Err(NormalizeError::UnsupportedShape(format!(
            "expected an array or object, got {}",
            json_kind(payload)
        )));
    };

    if object.contains_key("phases") {
        let parsed: PhasePayload = serde_json::from_value(payload.clone()).map_err(|e| {
            NormalizeError::UnsupportedShape(format!("malformed phase payload: {e}"))
        })?;
        let mut operations = Vec::new();
        for phase in &parsed.phases {
            operations.extend(validate_records(collector, &phase.operations));
        }
        return Ok(SimulationRun {
            collector,
            scenario: parsed.scenario.unwrap_or_else(|| DEFAULT_SCENARIO.to_string()),
            operations,
            stats: parsed.stats,
        });
    }

    if object.contains_key("objects") {
        let parsed: SnapshotPayload = serde_json::from_value(payload.clone()).map_err(|e| {
            NormalizeError::UnsupportedShape(format!("malformed snapshot payload: {e}"))
        })?;
        let scenario = parsed
            .scenario
            .unwrap_or_else(|| DEFAULT_SCENARIO.to_string());
        let operations = synthesize(collector, &scenario, &parsed.objects);
        return Ok(SimulationRun {
            collector,
            scenario,
            operations,
            stats: parsed.stats,
        });
    }

    Err(NormalizeError::UnsupportedShape(
        "object payload has neither \"phases\" nor \"objects\"".to_string(),
    ))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_records(collector: CollectorKind, records: &[Value]) -> Vec<Operation> {
    let mut operations = Vec::with_capacity(records.len());
    for record in records {
        let raw: RawOperation = match serde_json::from_value(record.clone()) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("[{collector}] dropping unreadable operation record: {err}");
                continue;
            }
        };
        match Operation::try_from(&raw) {
            Ok(op) => operations.push(op),
            Err(err) => warn!("[{collector}] dropping malformed operation: {err}"),
        }
    }
    operations
}

/// Does the scenario label describe a cyclic topology? Matches the source's
/// substring check, covering both "cyclic" and "cycle_leak".
pub fn is_cyclic_scenario(scenario: &str) -> bool {
    scenario.to_ascii_lowercase().contains("cycl")
}

/// Reconstruct a plausible operation history from a terminal snapshot.
///
/// The sequence is illustrative: allocation, one root, a chain (closed into a
/// cycle for cyclic scenarios), root removal, then a policy-specific teardown
/// derived from each object's terminal status. Pause sentinels pace the
/// sequence for a step-wise consumer; their count affects timing only.
fn synthesize(
    collector: CollectorKind,
    scenario: &str,
    objects: &[TerminalObject],
) -> Vec<Operation> {
    let count = objects.len() as ObjectId;
    if count == 0 {
        return Vec::new();
    }

    let cyclic = is_cyclic_scenario(scenario);
    let status_of = |id: ObjectId| -> ObjectStatus {
        objects
            .iter()
            .find(|object| object.id == id)
            .map(|object| ObjectStatus::from_label(&object.status))
            .unwrap_or(ObjectStatus::Alive)
    };
    let size_of = |id: ObjectId| -> u64 {
        objects
            .iter()
            .find(|object| object.id == id)
            .and_then(|object| object.size)
            .unwrap_or(DEFAULT_OBJECT_SIZE)
    };

    let mut ops = Vec::new();

    // Allocation phase.
    for i in 0..count {
        ops.push(Operation::Allocate {
            obj_id: i,
            size: size_of(i),
        });
        if i % 4 == 0 {
            ops.push(Operation::Pause);
        }
    }
    ops.push(Operation::Pause);

    // Object 0 is always the sole root.
    ops.push(Operation::AddRoot { obj_id: 0 });
    ops.push(Operation::Pause);
    ops.push(Operation::Pause);

    // Reference topology: a chain, closed into a cycle when the scenario
    // says so. The closure edge is the only one tagged `cycle`.
    if cyclic {
        for i in 1..count {
            ops.push(Operation::AddRef {
                obj_id: i - 1,
                target_id: i,
            });
            if i % 3 == 0 {
                ops.push(Operation::Pause);
            }
        }
        ops.push(Operation::Pause);
        if count > 1 {
            ops.push(Operation::CycleClosure {
                obj_id: count - 1,
                target_id: 0,
            });
            ops.push(Operation::Pause);
            ops.push(Operation::Pause);
        }
    } else {
        for i in 1..count {
            ops.push(Operation::AddRef {
                obj_id: i - 1,
                target_id: i,
            });
            if i % 4 == 0 {
                ops.push(Operation::Pause);
            }
        }
    }
    ops.push(Operation::Pause);
    ops.push(Operation::Pause);

    // The root goes out of scope; the rest becomes collectible.
    ops.push(Operation::RemoveRoot { obj_id: 0 });
    ops.push(Operation::Pause);
    ops.push(Operation::Pause);

    match collector {
        CollectorKind::ReferenceCounting if cyclic => {
            // RC cannot reclaim a cycle: the members stay allocated and are
            // flagged leaked, never deleted.
            for i in 0..count {
                if status_of(i) == ObjectStatus::Leaked {
                    ops.push(Operation::MarkLeaked { obj_id: i });
                    ops.push(Operation::Pause);
                }
            }
        }
        CollectorKind::ReferenceCounting => {
            // Cascading collection down the chain: each refcount reaches zero
            // once the reference into it is dropped.
            for i in 0..count {
                if status_of(i) == ObjectStatus::Deleted {
                    if i < count - 1 {
                        ops.push(Operation::RemoveRef {
                            obj_id: i,
                            target_id: i + 1,
                        });
                        ops.push(Operation::Pause);
                    }
                    ops.push(Operation::Delete { obj_id: i });
                    ops.push(Operation::Pause);
                }
            }
        }
        CollectorKind::MarkSweep => {
            // Reachability, not per-edge counting, decides survival: two bulk
            // phases regardless of topology.
            ops.push(Operation::Pause);
            for i in 0..count {
                if status_of(i) == ObjectStatus::Deleted {
                    ops.push(Operation::MarkUnreachable { obj_id: i });
                    if i % 3 == 0 {
                        ops.push(Operation::Pause);
                    }
                }
            }
            ops.push(Operation::Pause);
            ops.push(Operation::Pause);

            ops.push(Operation::Pause);
            for i in 0..count {
                if status_of(i) == ObjectStatus::Deleted {
                    ops.push(Operation::Delete { obj_id: i });
                    if i % 2 == 0 {
                        ops.push(Operation::Pause);
                    }
                }
            }
        }
    }

    ops.push(Operation::Pause);
    ops.push(Operation::Pause);

    ops
}
