//! End-to-end session scenarios
//!
//! Drives the session state machine through complete runs and checks the
//! resulting summaries, plus persistence round-trips of in-progress state.

use hearscreen_common::audiometry::{Protocol, SessionState, SessionStatus};
use hearscreen_common::{Ear, Error};

fn single_frequency(frequency: u32) -> Protocol {
    Protocol {
        frequencies: vec![frequency],
        ..Protocol::default()
    }
}

/// Submit the same response until the session completes, returning trials used
fn run_to_completion(state: &mut SessionState, heard: bool) -> usize {
    let mut trials = 0;
    while !state.is_completed() {
        state.submit(heard).expect("submit while in progress");
        trials += 1;
    }
    trials
}

#[test]
fn test_all_heard_two_cells_reach_floor() {
    let mut state = SessionState::begin(single_frequency(1000)).unwrap();
    assert_eq!(state.total_cells, 2);

    // Per cell: 40 → 30 → 20 → 10 → 0 → -10, then heard at -10 (unchanged)
    let mut per_cell = Vec::new();
    let mut trials = 0;
    while !state.is_completed() {
        trials += 1;
        if state.submit(true).unwrap().completed_cell.is_some() {
            per_cell.push(trials);
            trials = 0;
        }
    }
    assert_eq!(per_cell, vec![6, 6]);

    match state.status().unwrap() {
        SessionStatus::Completed(summary) => {
            assert_eq!(summary.left_average, -10.0);
            assert_eq!(summary.right_average, -10.0);
            assert_eq!(summary.max_interaural_difference, 0.0);
            assert!(summary.is_valid);
        }
        SessionStatus::InProgress(_) => panic!("session should be complete"),
    }
}

#[test]
fn test_nothing_heard_is_invalid() {
    let mut state = SessionState::begin(Protocol::default()).unwrap();
    let trials = run_to_completion(&mut state, false);
    assert_eq!(trials, 12 * 12);

    let summary = state.summary().unwrap();
    assert!(!summary.is_valid);
    assert_eq!(summary.left_average, 40.0);
    assert_eq!(summary.right_average, 40.0);
    for ear in [Ear::Left, Ear::Right] {
        for frequency in [5000, 4000, 2000, 1000, 500, 250] {
            assert_eq!(summary.thresholds.get(ear, frequency), Some(40.0));
        }
    }
}

#[test]
fn test_asymmetric_ears() {
    let mut state = SessionState::begin(single_frequency(2000)).unwrap();

    // Right ear first: heard all the way down
    while state.current_cell_index == 0 {
        state.submit(true).unwrap();
    }
    // Left ear: never heard
    run_to_completion(&mut state, false);

    let summary = state.summary().unwrap();
    assert_eq!(summary.thresholds.get(Ear::Right, 2000), Some(-10.0));
    assert_eq!(summary.thresholds.get(Ear::Left, 2000), Some(40.0));
    assert_eq!(summary.max_interaural_difference, 50.0);
    assert!(summary.is_valid);
}

#[test]
fn test_progress_advances_with_cells() {
    let mut state = SessionState::begin(Protocol::default()).unwrap();
    for _ in 0..6 {
        state.submit(true).unwrap();
    }
    match state.status().unwrap() {
        SessionStatus::InProgress(progress) => {
            assert_eq!(progress.frequency, 5000);
            assert_eq!(progress.ear, Ear::Left);
            assert_eq!(progress.test_number, 2);
            assert!((progress.fraction_complete - 1.0 / 12.0).abs() < 1e-12);
        }
        SessionStatus::Completed(_) => panic!("still in progress"),
    }
}

#[test]
fn test_submit_after_completion_fails() {
    let mut state = SessionState::begin(single_frequency(500)).unwrap();
    run_to_completion(&mut state, true);
    assert!(matches!(state.submit(false), Err(Error::InvalidState(_))));
}

#[test]
fn test_json_round_trip_mid_session() {
    let mut state = SessionState::begin(Protocol::default()).unwrap();
    let responses = [true, true, false, true, false, true, true, true, true, true, false, false, true];

    for heard in responses {
        state.submit(heard).unwrap();
        let text = state.to_json().unwrap();
        let restored = SessionState::from_json(&text).unwrap();
        assert_eq!(restored, state);
    }
}

#[test]
fn test_restored_state_continues_identically() {
    let mut original = SessionState::begin(Protocol::default()).unwrap();
    for heard in [true, false, true] {
        original.submit(heard).unwrap();
    }
    let mut restored = SessionState::from_json(&original.to_json().unwrap()).unwrap();

    for heard in [true, true, false, true, true, true, true] {
        let a = original.submit(heard).unwrap();
        let b = restored.submit(heard).unwrap();
        assert_eq!(a, b);
    }
    assert_eq!(original, restored);
}
