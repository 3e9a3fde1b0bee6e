//! Per-cell staircase controller
//!
//! Each response is appended to the cell's observations and moves the level:
//! down by the large step after "heard", up by the small step after "not
//! heard", always within [min, max]. The cell completes when a "heard"
//! response leaves the level unchanged (pinned at the floor) or when the
//! trial cap is reached.

use super::protocol::StaircaseRules;
use super::threshold::estimate_threshold;
use super::types::{Cell, Observation};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Working state of the active cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellState {
    pub cell: Cell,
    /// Level of the next presentation (dB)
    pub current_level: i32,
    /// Chronological presentation/response pairs, append-only
    pub observations: Vec<Observation>,
    /// Always equal to `observations.len()`
    pub trial_count: u32,
    pub max_trials: u32,
}

/// Why a cell finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// "Heard" at the floor level, which could not go any lower
    FloorReached,
    /// Trial cap exhausted
    TrialLimit,
}

/// A finished cell with its estimated threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedCell {
    pub cell: Cell,
    pub threshold_db: f64,
    pub trials: u32,
    pub reason: CompletionReason,
}

/// Result of applying one response to a cell
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Continue(CellState),
    Complete(CompletedCell),
}

impl CellState {
    /// Fresh state for `cell`, starting at the initial level
    pub fn new(cell: Cell, rules: &StaircaseRules) -> Self {
        Self {
            cell,
            current_level: rules.initial_level_db,
            observations: Vec::new(),
            trial_count: 0,
            max_trials: rules.max_trials,
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.trial_count as usize == self.observations.len()
    }

    /// Apply one response at the current level
    pub fn respond(mut self, heard: bool, rules: &StaircaseRules) -> Transition {
        let old_level = self.current_level;
        self.observations.push(Observation { level: old_level, heard });
        self.trial_count += 1;
        self.current_level = rules.next_level(old_level, heard);

        debug!(
            cell = %self.cell,
            trial = self.trial_count,
            level = old_level,
            heard,
            next_level = self.current_level,
            "Staircase response"
        );

        let reason = if heard && self.current_level == old_level {
            Some(CompletionReason::FloorReached)
        } else if self.trial_count >= self.max_trials {
            Some(CompletionReason::TrialLimit)
        } else {
            None
        };

        match reason {
            None => Transition::Continue(self),
            Some(reason) => Transition::Complete(CompletedCell {
                cell: self.cell,
                threshold_db: estimate_threshold(&self.observations, rules.fallback_threshold()),
                trials: self.trial_count,
                reason,
            }),
        }
    }
}
