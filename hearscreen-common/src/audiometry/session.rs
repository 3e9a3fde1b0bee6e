//! Session state machine
//!
//! A session walks the fixed test sequence one cell at a time. Each submitted
//! response is delegated to the active cell's staircase; when the cell
//! completes its threshold is recorded and the next cell starts fresh. Once
//! every cell is done the session is terminal and can only be summarized.
//!
//! The state is a plain value: callers load it, apply one transition, and
//! persist the result. It carries an explicit `version` so persisted blobs are
//! checked on load instead of failing deep inside threshold computation.

use super::legacy;
use super::protocol::Protocol;
use super::staircase::{CellState, CompletedCell, Transition};
use super::types::{Cell, Ear, Observation, Thresholds};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Current persisted shape of [`SessionState`]
pub const STATE_VERSION: u32 = 1;

/// Full persisted state for one respondent's run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub version: u32,
    /// Rules captured at `begin()`
    pub protocol: Protocol,
    pub test_sequence: Vec<Cell>,
    pub current_cell_index: usize,
    pub total_cells: usize,
    /// Present exactly while the session is in progress
    pub active_cell_state: Option<CellState>,
    pub thresholds: Thresholds,
}

/// Effect of one submitted response
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub observation: Observation,
    pub completed_cell: Option<CompletedCell>,
    pub session_completed: bool,
}

/// Position within an in-progress session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub frequency: u32,
    pub ear: Ear,
    pub level_db: i32,
    /// Linear playback volume for `level_db`
    pub volume: f64,
    /// Completed cells / total cells, in [0, 1)
    pub fraction_complete: f64,
    /// 1-based index of the active cell
    pub test_number: usize,
    pub total_tests: usize,
}

/// Final result of a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Every tested (frequency, ear) pair, untested ones at the fallback level
    pub thresholds: Thresholds,
    pub left_average: f64,
    pub right_average: f64,
    pub max_interaural_difference: f64,
    /// False when every threshold sits at the fallback level
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    InProgress(Progress),
    Completed(Summary),
}

impl SessionState {
    /// Start a new session at the first cell of `protocol`'s sequence
    pub fn begin(protocol: Protocol) -> Result<Self> {
        protocol.validate()?;

        let test_sequence = protocol.test_sequence();
        let active = CellState::new(test_sequence[0], &protocol.staircase);

        info!(
            "Session started: {} cells, first {}",
            test_sequence.len(),
            active.cell
        );

        Ok(Self {
            version: STATE_VERSION,
            total_cells: test_sequence.len(),
            test_sequence,
            current_cell_index: 0,
            active_cell_state: Some(active),
            thresholds: Thresholds::default(),
            protocol,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.current_cell_index >= self.total_cells
    }

    /// Apply one response to the active cell.
    ///
    /// # Errors
    /// - [`Error::InvalidState`] once the session has completed
    /// - [`Error::MalformedData`] if an in-progress session has no active cell
    ///
    /// The state is left untouched on error.
    pub fn submit(&mut self, heard: bool) -> Result<SubmitOutcome> {
        if self.is_completed() {
            return Err(Error::InvalidState(
                "Cannot submit a response: session already completed".to_string(),
            ));
        }
        let active = self.active_cell_state.take().ok_or_else(|| {
            Error::MalformedData("In-progress session has no active cell".to_string())
        })?;

        let observation = Observation {
            level: active.current_level,
            heard,
        };

        match active.respond(heard, &self.protocol.staircase) {
            Transition::Continue(next) => {
                self.active_cell_state = Some(next);
                Ok(SubmitOutcome {
                    observation,
                    completed_cell: None,
                    session_completed: false,
                })
            }
            Transition::Complete(done) => {
                self.thresholds
                    .insert(done.cell.ear, done.cell.frequency, done.threshold_db);
                self.current_cell_index += 1;

                info!(
                    "Cell {} complete after {} trials: threshold {} dB ({:?})",
                    done.cell, done.trials, done.threshold_db, done.reason
                );

                if let Some(&next_cell) = self.test_sequence.get(self.current_cell_index) {
                    debug!("Advancing to cell {}", next_cell);
                    self.active_cell_state =
                        Some(CellState::new(next_cell, &self.protocol.staircase));
                } else {
                    info!("Session complete: all {} cells tested", self.total_cells);
                }

                Ok(SubmitOutcome {
                    observation,
                    completed_cell: Some(done),
                    session_completed: self.is_completed(),
                })
            }
        }
    }

    /// Report progress, or the summary once completed
    pub fn status(&self) -> Result<SessionStatus> {
        if self.is_completed() {
            return self.summary().map(SessionStatus::Completed);
        }

        let active = self.active_cell_state.as_ref().ok_or_else(|| {
            Error::MalformedData("In-progress session has no active cell".to_string())
        })?;

        Ok(SessionStatus::InProgress(Progress {
            frequency: active.cell.frequency,
            ear: active.cell.ear,
            level_db: active.current_level,
            volume: self.protocol.level_to_volume(active.current_level),
            fraction_complete: self.current_cell_index as f64 / self.total_cells as f64,
            test_number: self.current_cell_index + 1,
            total_tests: self.total_cells,
        }))
    }

    /// Thresholds with every protocol (frequency, ear) pair present
    pub fn final_thresholds(&self) -> Thresholds {
        let fallback = self.protocol.staircase.fallback_threshold();
        let mut thresholds = self.thresholds.clone();
        for &frequency in &self.protocol.frequencies {
            for ear in [Ear::Left, Ear::Right] {
                thresholds.fill_missing(ear, frequency, fallback);
            }
        }
        thresholds
    }

    /// Per-ear averages and inter-ear asymmetry of a completed session
    pub fn summary(&self) -> Result<Summary> {
        if !self.is_completed() {
            return Err(Error::InvalidState(format!(
                "Session still in progress ({}/{} cells)",
                self.current_cell_index, self.total_cells
            )));
        }

        let thresholds = self.final_thresholds();
        let fallback = self.protocol.staircase.fallback_threshold();
        let frequencies = &self.protocol.frequencies;

        let average = |ear: Ear| {
            let values = thresholds.ear(ear);
            frequencies.iter().filter_map(|f| values.get(f)).sum::<f64>() / frequencies.len() as f64
        };

        let max_interaural_difference = frequencies
            .iter()
            .filter_map(|f| Some((thresholds.get(Ear::Left, *f)? - thresholds.get(Ear::Right, *f)?).abs()))
            .fold(0.0, f64::max);

        let is_valid = !thresholds.values().all(|t| t == fallback);

        Ok(Summary {
            left_average: average(Ear::Left),
            right_average: average(Ear::Right),
            max_interaural_difference,
            is_valid,
            thresholds,
        })
    }

    /// Structural consistency checks applied to persisted states
    pub fn validate(&self) -> Result<()> {
        let malformed = |msg: String| Err(Error::MalformedData(msg));

        if self.version != STATE_VERSION {
            return malformed(format!("Unsupported session state version {}", self.version));
        }
        if let Err(e) = self.protocol.validate() {
            return malformed(format!("Stored protocol rejected: {}", e));
        }
        if self.test_sequence != self.protocol.test_sequence() {
            return malformed("test_sequence does not match the stored protocol".to_string());
        }
        if self.total_cells != self.test_sequence.len() {
            return malformed(format!(
                "total_cells {} does not match sequence length {}",
                self.total_cells,
                self.test_sequence.len()
            ));
        }
        if self.current_cell_index > self.total_cells {
            return malformed(format!(
                "current_cell_index {} beyond {} cells",
                self.current_cell_index, self.total_cells
            ));
        }

        match (&self.active_cell_state, self.test_sequence.get(self.current_cell_index)) {
            (Some(active), Some(expected)) => {
                if active.cell != *expected {
                    return malformed(format!(
                        "Active cell {} does not match sequence cell {}",
                        active.cell, expected
                    ));
                }
                let rules = &self.protocol.staircase;
                if !(rules.min_level_db..=rules.max_level_db).contains(&active.current_level) {
                    return malformed(format!(
                        "current_level {} outside [{}, {}]",
                        active.current_level, rules.min_level_db, rules.max_level_db
                    ));
                }
                if !active.is_consistent() {
                    return malformed(format!(
                        "trial_count {} does not match {} observations",
                        active.trial_count,
                        active.observations.len()
                    ));
                }
                if active.trial_count > active.max_trials {
                    return malformed(format!(
                        "trial_count {} exceeds max_trials {}",
                        active.trial_count, active.max_trials
                    ));
                }
            }
            (None, None) => {}
            (Some(_), None) => return malformed("Completed session still has an active cell".to_string()),
            (None, Some(_)) => return malformed("In-progress session has no active cell".to_string()),
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a persisted blob.
    ///
    /// Versioned blobs are decoded strictly and checked with [`Self::validate`];
    /// unversioned blobs go through the legacy converter. An empty object is a
    /// respondent whose test was never begun.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::MalformedData(format!("Session state is not valid JSON: {}", e)))?;

        let Some(map) = value.as_object() else {
            return Err(Error::MalformedData("Session state is not a JSON object".to_string()));
        };
        if map.is_empty() {
            return Err(Error::InvalidState("Test has not been started".to_string()));
        }
        if !map.contains_key("version") {
            return legacy::from_legacy_value(&value);
        }

        let state: SessionState = serde_json::from_value(value)
            .map_err(|e| Error::MalformedData(format!("Invalid session state: {}", e)))?;
        state.validate()?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cell_protocol() -> Protocol {
        Protocol {
            frequencies: vec![1000],
            ..Protocol::default()
        }
    }

    #[test]
    fn test_begin_initializes_first_cell() {
        let state = SessionState::begin(Protocol::default()).unwrap();
        assert_eq!(state.total_cells, 12);
        assert_eq!(state.current_cell_index, 0);
        let active = state.active_cell_state.as_ref().unwrap();
        assert_eq!(active.cell, Cell::new(5000, Ear::Right));
        assert_eq!(active.current_level, 40);
        assert!(state.thresholds.is_empty());
    }

    #[test]
    fn test_begin_rejects_invalid_protocol() {
        let protocol = Protocol {
            frequencies: vec![],
            ..Protocol::default()
        };
        assert!(matches!(SessionState::begin(protocol), Err(Error::Validation(_))));
    }

    #[test]
    fn test_status_reports_progress() {
        let state = SessionState::begin(Protocol::default()).unwrap();
        match state.status().unwrap() {
            SessionStatus::InProgress(progress) => {
                assert_eq!(progress.frequency, 5000);
                assert_eq!(progress.ear, Ear::Right);
                assert_eq!(progress.level_db, 40);
                assert_eq!(progress.volume, 1.0);
                assert_eq!(progress.fraction_complete, 0.0);
                assert_eq!(progress.test_number, 1);
                assert_eq!(progress.total_tests, 12);
            }
            SessionStatus::Completed(_) => panic!("fresh session cannot be complete"),
        }
    }

    #[test]
    fn test_cell_completion_advances_to_next_cell() {
        let mut state = SessionState::begin(two_cell_protocol()).unwrap();
        for _ in 0..5 {
            let outcome = state.submit(true).unwrap();
            assert!(outcome.completed_cell.is_none());
        }
        let outcome = state.submit(true).unwrap();
        let done = outcome.completed_cell.unwrap();
        assert_eq!(done.cell, Cell::new(1000, Ear::Right));
        assert!(!outcome.session_completed);

        assert_eq!(state.current_cell_index, 1);
        let active = state.active_cell_state.as_ref().unwrap();
        assert_eq!(active.cell, Cell::new(1000, Ear::Left));
        assert_eq!(active.current_level, 40);
        assert!(active.observations.is_empty());
        assert_eq!(state.thresholds.get(Ear::Right, 1000), Some(-10.0));
    }

    #[test]
    fn test_submit_after_completion_is_invalid_state() {
        let mut state = SessionState::begin(two_cell_protocol()).unwrap();
        while !state.is_completed() {
            state.submit(true).unwrap();
        }
        assert!(state.active_cell_state.is_none());

        let before = state.clone();
        assert!(matches!(state.submit(true), Err(Error::InvalidState(_))));
        assert_eq!(state, before);
    }

    #[test]
    fn test_summary_requires_completion() {
        let state = SessionState::begin(two_cell_protocol()).unwrap();
        assert!(matches!(state.summary(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_summary_fills_untested_cells_with_fallback() {
        let mut state = SessionState::begin(two_cell_protocol()).unwrap();
        // Simulate a completed run that lost its left-ear result
        state.thresholds.insert(Ear::Right, 1000, 10.0);
        state.current_cell_index = state.total_cells;
        state.active_cell_state = None;

        let summary = state.summary().unwrap();
        assert_eq!(summary.thresholds.get(Ear::Left, 1000), Some(40.0));
        assert_eq!(summary.right_average, 10.0);
        assert_eq!(summary.left_average, 40.0);
        assert_eq!(summary.max_interaural_difference, 30.0);
        assert!(summary.is_valid);
    }

    #[test]
    fn test_empty_blob_means_not_started() {
        assert!(matches!(SessionState::from_json("{}"), Err(Error::InvalidState(_))));
        assert!(matches!(SessionState::from_json("[]"), Err(Error::MalformedData(_))));
        assert!(matches!(SessionState::from_json("not json"), Err(Error::MalformedData(_))));
    }

    #[test]
    fn test_versioned_blob_validation() {
        let mut state = SessionState::begin(two_cell_protocol()).unwrap();
        state.submit(false).unwrap();

        let mut value = serde_json::to_value(&state).unwrap();
        value["active_cell_state"]["trial_count"] = serde_json::json!(5);
        let text = serde_json::to_string(&value).unwrap();
        assert!(matches!(SessionState::from_json(&text), Err(Error::MalformedData(_))));

        let mut value = serde_json::to_value(&state).unwrap();
        value["version"] = serde_json::json!(99);
        let text = serde_json::to_string(&value).unwrap();
        assert!(matches!(SessionState::from_json(&text), Err(Error::MalformedData(_))));
    }

    fn completed_blob() -> serde_json::Value {
        let mut state = SessionState::begin(two_cell_protocol()).unwrap();
        while !state.is_completed() {
            state.submit(true).unwrap();
        }
        serde_json::to_value(&state).unwrap()
    }

    fn decode(value: &serde_json::Value) -> Result<SessionState> {
        SessionState::from_json(&serde_json::to_string(value).unwrap())
    }

    #[test]
    fn test_rejects_protocol_not_matching_sequence() {
        let mut value = completed_blob();
        assert!(decode(&value).is_ok());

        // Averages would be computed over 5000 Hz while the results are at 1000 Hz
        value["protocol"]["frequencies"] = serde_json::json!([5000]);
        assert!(matches!(decode(&value), Err(Error::MalformedData(_))));

        let mut value = completed_blob();
        value["test_sequence"][0]["frequency"] = serde_json::json!(2000);
        assert!(matches!(decode(&value), Err(Error::MalformedData(_))));
    }

    #[test]
    fn test_rejects_invalid_stored_protocol() {
        let mut state = SessionState::begin(two_cell_protocol()).unwrap();
        state.submit(false).unwrap();

        let mut value = serde_json::to_value(&state).unwrap();
        value["protocol"]["staircase"]["step_down_db"] = serde_json::json!(0);
        assert!(matches!(decode(&value), Err(Error::MalformedData(_))));

        let mut value = serde_json::to_value(&state).unwrap();
        value["protocol"]["frequencies"] = serde_json::json!([]);
        value["test_sequence"] = serde_json::json!([]);
        value["total_cells"] = serde_json::json!(0);
        value["current_cell_index"] = serde_json::json!(0);
        value["active_cell_state"] = serde_json::Value::Null;
        assert!(matches!(decode(&value), Err(Error::MalformedData(_))));
    }

    #[test]
    fn test_rejects_active_level_out_of_range() {
        let state = SessionState::begin(two_cell_protocol()).unwrap();

        let mut value = serde_json::to_value(&state).unwrap();
        value["active_cell_state"]["current_level"] = serde_json::json!(45);
        assert!(matches!(decode(&value), Err(Error::MalformedData(_))));

        let mut value = serde_json::to_value(&state).unwrap();
        value["active_cell_state"]["current_level"] = serde_json::json!(-20);
        assert!(matches!(decode(&value), Err(Error::MalformedData(_))));

        let mut value = serde_json::to_value(&state).unwrap();
        value["active_cell_state"]["current_level"] = serde_json::json!(-10);
        assert_eq!(decode(&value).unwrap().active_cell_state.unwrap().current_level, -10);
    }
}
