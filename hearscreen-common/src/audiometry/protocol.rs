//! Test protocol: frequency list and staircase rules
//!
//! Defaults are the canonical screening procedure: six frequencies from
//! 5 kHz down to 250 Hz, each tested right ear then left ear, starting at
//! 40 dB with 10 dB down-steps, 5 dB up-steps, a floor of -10 dB and a cap of
//! 12 trials per cell.

use super::types::{Cell, Ear};
use crate::tone::{MAX_FREQUENCY_HZ, MIN_FREQUENCY_HZ};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Frequencies tested by default, in presentation order (Hz)
pub const DEFAULT_FREQUENCIES: [u32; 6] = [5000, 4000, 2000, 1000, 500, 250];

/// Ear order within each frequency
pub const EAR_ORDER: [Ear; 2] = [Ear::Right, Ear::Left];

/// Level adaptation rules for one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaircaseRules {
    /// Starting level; also the fallback threshold when nothing was heard
    pub initial_level_db: i32,
    pub min_level_db: i32,
    pub max_level_db: i32,
    /// Decrease after a "heard" response
    pub step_down_db: i32,
    /// Increase after a "not heard" response
    pub step_up_db: i32,
    pub max_trials: u32,
}

impl Default for StaircaseRules {
    fn default() -> Self {
        Self {
            initial_level_db: 40,
            min_level_db: -10,
            max_level_db: 40,
            step_down_db: 10,
            step_up_db: 5,
            max_trials: 12,
        }
    }
}

impl StaircaseRules {
    /// Level presented after a response at `level`
    pub fn next_level(&self, level: i32, heard: bool) -> i32 {
        if heard {
            level.saturating_sub(self.step_down_db).max(self.min_level_db)
        } else {
            level.saturating_add(self.step_up_db).min(self.max_level_db)
        }
    }

    /// Threshold assigned when a cell yields no usable "heard" response
    pub fn fallback_threshold(&self) -> f64 {
        self.initial_level_db as f64
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_level_db > self.max_level_db {
            return Err(Error::Validation(format!(
                "min_level_db ({}) exceeds max_level_db ({})",
                self.min_level_db, self.max_level_db
            )));
        }
        if !(self.min_level_db..=self.max_level_db).contains(&self.initial_level_db) {
            return Err(Error::Validation(format!(
                "initial_level_db ({}) outside [{}, {}]",
                self.initial_level_db, self.min_level_db, self.max_level_db
            )));
        }
        if self.step_down_db <= 0 || self.step_up_db <= 0 {
            return Err(Error::Validation("Step sizes must be positive".to_string()));
        }
        if self.max_trials == 0 {
            return Err(Error::Validation("max_trials must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Complete test protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocol {
    /// Frequencies in presentation order (Hz)
    pub frequencies: Vec<u32>,
    pub staircase: StaircaseRules,
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            frequencies: DEFAULT_FREQUENCIES.to_vec(),
            staircase: StaircaseRules::default(),
        }
    }
}

impl Protocol {
    pub fn validate(&self) -> Result<()> {
        if self.frequencies.is_empty() {
            return Err(Error::Validation("Protocol has no frequencies".to_string()));
        }

        let mut seen = HashSet::new();
        for &frequency in &self.frequencies {
            if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&frequency) {
                return Err(Error::Validation(format!(
                    "Protocol frequency {} Hz outside {}-{} Hz",
                    frequency, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ
                )));
            }
            if !seen.insert(frequency) {
                return Err(Error::Validation(format!(
                    "Protocol frequency {} Hz listed twice",
                    frequency
                )));
            }
        }

        self.staircase.validate()
    }

    /// Every frequency crossed with both ears, right before left
    pub fn test_sequence(&self) -> Vec<Cell> {
        self.frequencies
            .iter()
            .flat_map(|&frequency| EAR_ORDER.iter().map(move |&ear| Cell::new(frequency, ear)))
            .collect()
    }

    /// Linear playback volume for a staircase level.
    ///
    /// The loudest permitted level plays at full volume; every 20 dB below it
    /// is a factor of ten quieter.
    pub fn level_to_volume(&self, level_db: i32) -> f64 {
        let attenuation_db = (level_db - self.staircase.max_level_db) as f64;
        10f64.powf(attenuation_db / 20.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence_order() {
        let sequence = Protocol::default().test_sequence();
        assert_eq!(sequence.len(), 12);
        assert_eq!(sequence[0], Cell::new(5000, Ear::Right));
        assert_eq!(sequence[1], Cell::new(5000, Ear::Left));
        assert_eq!(sequence[11], Cell::new(250, Ear::Left));
    }

    #[test]
    fn test_next_level_bounds() {
        let rules = StaircaseRules::default();
        assert_eq!(rules.next_level(40, true), 30);
        assert_eq!(rules.next_level(0, true), -10);
        assert_eq!(rules.next_level(-5, true), -10);
        assert_eq!(rules.next_level(-10, true), -10);
        assert_eq!(rules.next_level(30, false), 35);
        assert_eq!(rules.next_level(40, false), 40);
        assert_eq!(rules.next_level(38, false), 40);
    }

    #[test]
    fn test_validation_rejects_bad_protocols() {
        assert!(Protocol::default().validate().is_ok());

        let empty = Protocol { frequencies: vec![], ..Protocol::default() };
        assert!(empty.validate().is_err());

        let duplicate = Protocol { frequencies: vec![1000, 1000], ..Protocol::default() };
        assert!(duplicate.validate().is_err());

        let inaudible = Protocol { frequencies: vec![25_000], ..Protocol::default() };
        assert!(inaudible.validate().is_err());

        let mut rules = StaircaseRules::default();
        rules.initial_level_db = 50;
        assert!(rules.validate().is_err());

        let mut rules = StaircaseRules::default();
        rules.step_up_db = 0;
        assert!(rules.validate().is_err());

        let mut rules = StaircaseRules::default();
        rules.max_trials = 0;
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_level_to_volume() {
        let protocol = Protocol::default();
        assert_eq!(protocol.level_to_volume(40), 1.0);
        assert!((protocol.level_to_volume(20) - 0.1).abs() < 1e-12);
        assert!((protocol.level_to_volume(0) - 0.01).abs() < 1e-12);
        assert!(protocol.level_to_volume(-10) > 0.0);
    }
}
