/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Caller-owned session context for the side-by-side comparison.
//!
//! The source kept the last backend result per collector in module-level
//! globals so later button clicks could re-animate it. Here that state is an
//! explicit object owned by the caller: one `SimulationRun` slot per
//! collector, each minting independent replay engines on demand. The two
//! sides never share a graph.

use crate::normalize::{CollectorKind, NormalizeError, SimulationRun, normalize};
use crate::replay::ReplayEngine;
use serde_json::Value;

/// Holds the most recent normalized run for each collector.
#[derive(Default)]
pub struct ComparisonSession {
    rc: Option<SimulationRun>,
    ms: Option<SimulationRun>,
}

impl ComparisonSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a backend payload and retain it as the current run for the
    /// given collector. Replaces any previous run for that side only.
    pub fn load(
        &mut self,
        collector: CollectorKind,
        payload: &Value,
    ) -> Result<&SimulationRun, NormalizeError> {
        let run = normalize(collector, payload)?;
        Ok(self.slot_mut(collector).insert(run))
    }

    /// The retained run for a collector, if one was loaded.
    pub fn run(&self, collector: CollectorKind) -> Option<&SimulationRun> {
        match collector {
            CollectorKind::ReferenceCounting => self.rc.as_ref(),
            CollectorKind::MarkSweep => self.ms.as_ref(),
        }
    }

    /// A fresh engine positioned at step zero of the retained run.
    pub fn replay(&self, collector: CollectorKind) -> Option<ReplayEngine> {
        let run = self.run(collector)?;
        let mut engine = ReplayEngine::new();
        engine.start(run);
        Some(engine)
    }

    /// Drop the retained run for one collector.
    pub fn clear(&mut self, collector: CollectorKind) {
        *self.slot_mut(collector) = None;
    }

    fn slot_mut(&mut self, collector: CollectorKind) -> &mut Option<SimulationRun> {
        match collector {
            CollectorKind::ReferenceCounting => &mut self.rc,
            CollectorKind::MarkSweep => &mut self.ms,
        }
    }
}
