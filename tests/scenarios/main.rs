/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end scenarios: backend payload through normalization and a full
//! replay, asserting on the terminal graph state each collector produces.

use gc_replay::{
    CollectorKind, ComparisonSession, HeapGraph, LinkType, ObjectStatus, Operation, ReplayEngine,
    StepOutcome, normalize,
};
use serde_json::{Value, json};

fn snapshot_payload(scenario: &str, statuses: &[&str]) -> Value {
    let objects: Vec<Value> = statuses
        .iter()
        .enumerate()
        .map(|(id, status)| json!({ "id": id, "status": status }))
        .collect();
    json!({ "scenario": scenario, "objects": objects })
}

fn replay_to_end(collector: CollectorKind, payload: &Value) -> ReplayEngine {
    let run = normalize(collector, payload).expect("payload should normalize");
    let mut engine = ReplayEngine::new();
    engine.start(&run);
    engine.run(|_, _| {});
    engine
}

#[test]
fn crate_version_is_set() {
    assert!(!gc_replay::VERSION.is_empty());
}

#[test]
fn rc_acyclic_chain_is_fully_collected() {
    // Five objects in a linear chain, root removed: cascading refcount
    // collection reclaims every one of them.
    let payload = snapshot_payload(
        "basic",
        &["deleted", "deleted", "deleted", "deleted", "deleted"],
    );
    let engine = replay_to_end(CollectorKind::ReferenceCounting, &payload);

    assert_eq!(engine.graph().object_count(), 5);
    for object in engine.graph().objects() {
        assert_eq!(object.status, ObjectStatus::Deleted, "object {}", object.id);
        assert_ne!(object.status, ObjectStatus::Leaked);
    }
    assert_eq!(engine.graph().root_count(), 0);
}

#[test]
fn rc_cannot_reclaim_a_cycle() {
    // The same five objects, chain closed into a cycle by 4 -> 0: every
    // member survives as alive or leaked, never deleted.
    let payload = snapshot_payload(
        "cyclic",
        &["leaked", "leaked", "leaked", "leaked", "leaked"],
    );
    let engine = replay_to_end(CollectorKind::ReferenceCounting, &payload);

    for object in engine.graph().objects() {
        assert_ne!(object.status, ObjectStatus::Deleted, "object {}", object.id);
    }
    let cycle_edges: Vec<_> = engine
        .graph()
        .references()
        .filter(|edge| edge.link_type == LinkType::Cycle)
        .collect();
    assert_eq!(cycle_edges.len(), 1);
    assert_eq!(cycle_edges[0].from_id, 4);
    assert_eq!(cycle_edges[0].to_id, 0);
}

#[test]
fn ms_reclaims_the_cycle_rc_leaks() {
    // Identical cyclic topology, MS discriminator: reachability wins and all
    // five objects end up deleted.
    let payload = snapshot_payload(
        "cyclic",
        &["deleted", "deleted", "deleted", "deleted", "deleted"],
    );
    let engine = replay_to_end(CollectorKind::MarkSweep, &payload);

    for object in engine.graph().objects() {
        assert_eq!(object.status, ObjectStatus::Deleted, "object {}", object.id);
        assert!(!object.is_marked);
    }
    // Sweep hard-removed every reference.
    assert_eq!(engine.graph().reference_count(), 0);
}

#[test]
fn rc_cyclic_example_end_to_end() {
    // Three leaked objects, cyclic scenario, RC discriminator.
    let payload = snapshot_payload("cyclic", &["leaked", "leaked", "leaked"]);
    let run = normalize(CollectorKind::ReferenceCounting, &payload).unwrap();

    let count = |tag: &str| run.operations.iter().filter(|op| op.tag() == tag).count();
    assert_eq!(count("allocate"), 3);
    assert_eq!(count("addroot"), 1);
    assert_eq!(count("addref"), 2);
    assert_eq!(count("cycle_closure"), 1);
    assert_eq!(count("removeroot"), 1);
    assert_eq!(count("mark_leaked"), 3);
    assert_eq!(count("delete"), 0);

    let mut engine = ReplayEngine::new();
    engine.start(&run);
    engine.run(|_, _| {});

    let view = engine.snapshot();
    assert_eq!(view.objects.len(), 3);
    assert!(
        view.objects
            .iter()
            .all(|object| object.status == ObjectStatus::Leaked)
    );
    assert_eq!(view.references.len(), 3);
    assert_eq!(
        view.references
            .iter()
            .filter(|edge| edge.link_type == LinkType::Cycle)
            .count(),
        1
    );
    assert_eq!(engine.graph().root_count(), 0);
}

#[test]
fn replay_is_deterministic_step_for_step() {
    let payload = snapshot_payload(
        "cycle_leak",
        &["leaked", "leaked", "deleted", "leaked", "deleted"],
    );
    let run = normalize(CollectorKind::ReferenceCounting, &payload).unwrap();

    let mut first = ReplayEngine::new();
    let mut second = ReplayEngine::new();
    first.start(&run);
    second.start(&run);

    loop {
        let a = first.advance();
        let b = second.advance();
        assert_eq!(a, b);
        assert_eq!(first.snapshot(), second.snapshot());
        if a == StepOutcome::Complete {
            break;
        }
    }
}

fn assert_edges_touch_allocated_objects(graph: &HeapGraph) {
    for edge in graph.references() {
        assert!(graph.contains(edge.from_id));
        assert!(graph.contains(edge.to_id));
    }
}

#[test]
fn no_edge_ever_touches_an_unallocated_object() {
    // Includes records referencing ids that are never allocated; those must
    // be dropped while the invariant holds at every intermediate step.
    let payload = json!([
        { "op": "allocate", "obj_id": 0, "size": 64 },
        { "op": "addref", "obj_id": 0, "target_id": 7 },
        { "op": "allocate", "obj_id": 1, "size": 64 },
        { "op": "addref", "obj_id": 0, "target_id": 1 },
        { "op": "cycle_closure", "obj_id": 1, "target_id": 0 },
        { "op": "delete", "obj_id": 0 },
        { "op": "addref", "obj_id": 5, "target_id": 1 }
    ]);
    let run = normalize(CollectorKind::MarkSweep, &payload).unwrap();
    let mut engine = ReplayEngine::new();
    engine.start(&run);
    engine.run(|_, graph| assert_edges_touch_allocated_objects(graph));
}

#[test]
fn delete_leaves_no_active_edge_on_the_victim() {
    let payload = snapshot_payload("basic", &["deleted", "deleted", "deleted", "deleted"]);
    let run = normalize(CollectorKind::MarkSweep, &payload).unwrap();

    let mut engine = ReplayEngine::new();
    engine.start(&run);
    engine.run(|outcome, graph| {
        if let StepOutcome::Applied {
            op: Operation::Delete { obj_id },
        } = outcome
        {
            assert_eq!(graph.active_degree(*obj_id), 0);
        }
    });
}

#[test]
fn duplicate_operations_are_idempotent_through_the_full_pipeline() {
    let payload = json!([
        { "op": "allocate", "obj_id": 0, "size": 64 },
        { "op": "allocate", "obj_id": 1, "size": 64 },
        { "op": "addref", "obj_id": 0, "target_id": 1 },
        { "op": "addref", "obj_id": 0, "target_id": 1 },
        { "op": "delete", "obj_id": 1 },
        { "op": "delete", "obj_id": 1 }
    ]);
    let mut engine = ReplayEngine::new();
    engine.start(&normalize(CollectorKind::ReferenceCounting, &payload).unwrap());

    assert!(matches!(engine.advance(), StepOutcome::Applied { .. }));
    assert!(matches!(engine.advance(), StepOutcome::Applied { .. }));
    assert!(matches!(engine.advance(), StepOutcome::Applied { .. }));
    assert!(matches!(engine.advance(), StepOutcome::Applied { .. }));
    assert_eq!(engine.graph().reference_count(), 1);

    assert!(matches!(engine.advance(), StepOutcome::Applied { .. }));
    assert!(matches!(engine.advance(), StepOutcome::Applied { .. }));
    assert_eq!(engine.graph().object(1).unwrap().status, ObjectStatus::Deleted);
    assert_eq!(engine.graph().reference_count(), 0);
}

#[test]
fn side_by_side_runs_share_nothing() {
    let cyclic = snapshot_payload("cyclic", &["leaked", "leaked", "leaked"]);
    let cyclic_ms = snapshot_payload("cyclic", &["deleted", "deleted", "deleted"]);

    let mut session = ComparisonSession::new();
    session
        .load(CollectorKind::ReferenceCounting, &cyclic)
        .unwrap();
    session.load(CollectorKind::MarkSweep, &cyclic_ms).unwrap();

    let mut rc_engine = session.replay(CollectorKind::ReferenceCounting).unwrap();
    let mut ms_engine = session.replay(CollectorKind::MarkSweep).unwrap();

    // Interleave the two replays the way an animation loop would.
    loop {
        let a = rc_engine.advance();
        let b = ms_engine.advance();
        if a == StepOutcome::Complete && b == StepOutcome::Complete {
            break;
        }
    }

    assert!(
        rc_engine
            .graph()
            .objects()
            .all(|object| object.status == ObjectStatus::Leaked)
    );
    assert!(
        ms_engine
            .graph()
            .objects()
            .all(|object| object.status == ObjectStatus::Deleted)
    );
}

#[test]
fn empty_snapshot_reports_completion_immediately() {
    let payload = json!({ "scenario": "basic", "objects": [] });
    let run = normalize(CollectorKind::ReferenceCounting, &payload).unwrap();
    assert!(run.operations.is_empty());

    let mut engine = ReplayEngine::new();
    engine.start(&run);
    assert!(engine.is_complete());
    assert_eq!(engine.advance(), StepOutcome::Complete);
    assert_eq!(engine.graph().object_count(), 0);
}

#[test]
fn renderer_snapshot_serializes_with_backend_field_names() {
    let payload = snapshot_payload("cyclic", &["leaked", "leaked"]);
    let engine = replay_to_end(CollectorKind::ReferenceCounting, &payload);

    let view = serde_json::to_value(engine.snapshot()).unwrap();
    let objects = view["objects"].as_array().unwrap();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0]["status"], "leaked");
    assert_eq!(objects[0]["is_root"], false);

    let references = view["references"].as_array().unwrap();
    assert!(
        references
            .iter()
            .any(|edge| edge["link_type"] == "cycle" && edge["status"] == "active")
    );
}
