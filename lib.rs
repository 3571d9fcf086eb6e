/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Operation-log replay engine for side-by-side GC strategy visualization.
//!
//! Backend collectors (Reference Counting and Mark-&-Sweep) report either an
//! explicit phase/operation trace or a terminal heap snapshot. This crate
//! normalizes either shape into one canonical ordered sequence of atomic
//! graph mutations and replays it, one operation per step, over an in-memory
//! object/reference graph — exposing the full node/edge state after every
//! step so an external renderer can animate how each strategy evolves the
//! same heap.
//!
//! Pipeline: payload → [`normalize`] → [`SimulationRun`] → [`ReplayEngine`]
//! → [`HeapGraph`] state per step. Rendering, layout and the collectors
//! themselves live elsewhere.

pub mod graph;
pub mod normalize;
pub mod ops;
pub mod replay;
pub mod session;

pub use graph::{
    HeapGraph, HeapObject, HeapView, LinkStatus, LinkType, ObjectId, ObjectStatus, Reference,
    ReferenceView,
};
pub use normalize::{
    CollectorKind, MemoryStatistics, NormalizeError, Phase, SimulationRun, TerminalObject,
    is_cyclic_scenario, normalize,
};
pub use ops::{Operation, OperationError, RawOperation};
pub use replay::{ReplayEngine, ReplayError, StepOutcome};
pub use session::ComparisonSession;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
