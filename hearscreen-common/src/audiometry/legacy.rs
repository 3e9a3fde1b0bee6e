//! Conversion of unversioned state blobs
//!
//! Earlier deployments stored session state as free-form JSON:
//!
//! ```json
//! {
//!   "thresholds": {"left": {"5000": 10.0}, "right": {}},
//!   "test_sequence": [{"freq": 5000, "ear": "right"}, ...],
//!   "current_test_index": 1,
//!   "total_tests": 12,
//!   "current_test": {"frequency": 5000, "ear": "left", "current_level": 35,
//!                    "responses": [{"level": 40, "heard": false}],
//!                    "trial_count": 1, "max_trials": 12}
//! }
//! ```
//!
//! Individual response records with a missing or non-numeric level are
//! dropped (and the trial count re-derived); anything structurally wrong is
//! rejected as malformed.

use super::protocol::{Protocol, StaircaseRules};
use super::session::{SessionState, STATE_VERSION};
use super::staircase::CellState;
use super::threshold::ObservationRecord;
use super::types::{Cell, Ear, Observation, Thresholds};
use crate::{Error, Result};
use serde_json::{Map, Value};
use tracing::{info, warn};

fn malformed<T>(msg: impl Into<String>) -> Result<T> {
    Err(Error::MalformedData(msg.into()))
}

/// Convert an unversioned blob into the current [`SessionState`]
pub fn from_legacy_value(value: &Value) -> Result<SessionState> {
    let Some(root) = value.as_object() else {
        return malformed("Legacy state is not an object");
    };

    let test_sequence = parse_sequence(root)?;
    if test_sequence.is_empty() {
        return malformed("Legacy state has an empty test_sequence");
    }

    let Some(index) = root.get("current_test_index").and_then(Value::as_u64) else {
        return malformed("Legacy state missing current_test_index");
    };
    let current_cell_index = index as usize;
    if current_cell_index > test_sequence.len() {
        return malformed(format!(
            "current_test_index {} beyond {} cells",
            current_cell_index,
            test_sequence.len()
        ));
    }
    if let Some(total) = root.get("total_tests") {
        if total.as_u64() != Some(test_sequence.len() as u64) {
            return malformed(format!(
                "total_tests {} does not match sequence length {}",
                total,
                test_sequence.len()
            ));
        }
    }

    let mut staircase = StaircaseRules::default();
    let current = root.get("current_test").and_then(Value::as_object);
    if let Some(max) = current.and_then(|c| c.get("max_trials")).and_then(Value::as_u64) {
        staircase.max_trials = max as u32;
    }

    let mut frequencies: Vec<u32> = Vec::new();
    for cell in &test_sequence {
        if !frequencies.contains(&cell.frequency) {
            frequencies.push(cell.frequency);
        }
    }
    let protocol = Protocol {
        frequencies,
        staircase,
    };
    protocol
        .validate()
        .map_err(|e| Error::MalformedData(format!("Legacy protocol rejected: {}", e)))?;

    let active_cell_state = match test_sequence.get(current_cell_index) {
        Some(expected) => {
            let Some(current) = current else {
                return malformed("In-progress legacy state has no current_test");
            };
            Some(parse_current_test(current, *expected, &protocol.staircase)?)
        }
        None => None,
    };

    let thresholds = parse_thresholds(root.get("thresholds"))?;

    info!(
        "Converted legacy session state ({}/{} cells complete)",
        current_cell_index,
        test_sequence.len()
    );

    let state = SessionState {
        version: STATE_VERSION,
        protocol,
        total_cells: test_sequence.len(),
        test_sequence,
        current_cell_index,
        active_cell_state,
        thresholds,
    };
    state.validate()?;
    Ok(state)
}

fn parse_sequence(root: &Map<String, Value>) -> Result<Vec<Cell>> {
    let Some(entries) = root.get("test_sequence").and_then(Value::as_array) else {
        return malformed("Legacy state missing test_sequence");
    };

    entries
        .iter()
        .map(|entry| {
            let frequency = entry.get("freq").and_then(as_frequency);
            let ear = entry.get("ear").and_then(Value::as_str).map(str::parse::<Ear>);
            match (frequency, ear) {
                (Some(frequency), Some(Ok(ear))) => Ok(Cell::new(frequency, ear)),
                _ => malformed(format!("Invalid test_sequence entry: {}", entry)),
            }
        })
        .collect()
}

fn as_frequency(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|f| u32::try_from(f).ok())
}

fn parse_current_test(
    current: &Map<String, Value>,
    expected: Cell,
    rules: &StaircaseRules,
) -> Result<CellState> {
    let frequency = current.get("frequency").and_then(as_frequency);
    let ear = current
        .get("ear")
        .and_then(Value::as_str)
        .and_then(|e| e.parse::<Ear>().ok());
    if frequency != Some(expected.frequency) || ear != Some(expected.ear) {
        return malformed(format!(
            "current_test does not match sequence cell {}",
            expected
        ));
    }

    let current_level = match current.get("current_level") {
        None => rules.initial_level_db,
        Some(level) => match level.as_i64().and_then(|l| i32::try_from(l).ok()) {
            Some(level) => level.clamp(rules.min_level_db, rules.max_level_db),
            None => return malformed(format!("Invalid current_level: {}", level)),
        },
    };

    let records = match current.get("responses") {
        None => Vec::new(),
        Some(Value::Array(records)) => records.clone(),
        Some(other) => return malformed(format!("responses is not an array: {}", other)),
    };

    let observations: Vec<Observation> = records
        .iter()
        .filter_map(|record| {
            // Levels are whole decibels; fractional ones are rounded
            let level = record.level_db()?.round();
            if level < i32::MIN as f64 || level > i32::MAX as f64 {
                return None;
            }
            Some(Observation {
                level: level as i32,
                heard: record.heard(),
            })
        })
        .collect();

    let dropped = records.len() - observations.len();
    if dropped > 0 {
        warn!(
            "Dropped {} unusable response record(s) from legacy cell {}",
            dropped, expected
        );
    }

    // A legacy cell can hold more trials than its cap when the cap was lowered
    let max_trials = rules.max_trials.max(observations.len() as u32);

    Ok(CellState {
        cell: expected,
        current_level,
        trial_count: observations.len() as u32,
        observations,
        max_trials,
    })
}

fn parse_thresholds(value: Option<&Value>) -> Result<Thresholds> {
    let mut thresholds = Thresholds::default();
    let Some(value) = value else {
        return Ok(thresholds);
    };
    let Some(by_ear) = value.as_object() else {
        return malformed("thresholds is not an object");
    };

    for (ear_name, entries) in by_ear {
        let Ok(ear) = ear_name.parse::<Ear>() else {
            return malformed(format!("Unknown ear '{}' in thresholds", ear_name));
        };
        let Some(entries) = entries.as_object() else {
            return malformed(format!("thresholds.{} is not an object", ear_name));
        };
        for (frequency, threshold) in entries {
            let Ok(frequency) = frequency.trim().parse::<u32>() else {
                return malformed(format!("Invalid frequency key '{}'", frequency));
            };
            let Some(threshold) = threshold.as_f64() else {
                return malformed(format!("Invalid threshold {} at {} Hz", threshold, frequency));
            };
            thresholds.insert(ear, frequency, threshold);
        }
    }

    Ok(thresholds)
}
