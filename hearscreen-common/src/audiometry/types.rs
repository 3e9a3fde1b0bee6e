//! Value types shared by the staircase and session state machine

use crate::tone::Channel;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Ear under test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ear {
    Left,
    Right,
}

impl Ear {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ear::Left => "left",
            Ear::Right => "right",
        }
    }

    /// Stereo channel that carries a stimulus for this ear
    pub fn channel(&self) -> Channel {
        match self {
            Ear::Left => Channel::Left,
            Ear::Right => Channel::Right,
        }
    }
}

impl fmt::Display for Ear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ear {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "left" => Ok(Ear::Left),
            "right" => Ok(Ear::Right),
            other => Err(Error::Validation(format!("Unknown ear '{}'", other))),
        }
    }
}

/// One (frequency, ear) pair to be tested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cell {
    /// Tone frequency (Hz)
    pub frequency: u32,
    pub ear: Ear,
}

impl Cell {
    pub fn new(frequency: u32, ear: Ear) -> Self {
        Self { frequency, ear }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz {}", self.frequency, self.ear)
    }
}

/// One presentation and its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Presentation level (dB relative to the reference)
    pub level: i32,
    pub heard: bool,
}

/// Estimated thresholds (dB) per ear and frequency
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default)]
    pub left: BTreeMap<u32, f64>,
    #[serde(default)]
    pub right: BTreeMap<u32, f64>,
}

impl Thresholds {
    pub fn ear(&self, ear: Ear) -> &BTreeMap<u32, f64> {
        match ear {
            Ear::Left => &self.left,
            Ear::Right => &self.right,
        }
    }

    fn ear_mut(&mut self, ear: Ear) -> &mut BTreeMap<u32, f64> {
        match ear {
            Ear::Left => &mut self.left,
            Ear::Right => &mut self.right,
        }
    }

    pub fn get(&self, ear: Ear, frequency: u32) -> Option<f64> {
        self.ear(ear).get(&frequency).copied()
    }

    pub fn insert(&mut self, ear: Ear, frequency: u32, threshold_db: f64) {
        self.ear_mut(ear).insert(frequency, threshold_db);
    }

    /// Insert `threshold_db` only where no value exists yet
    pub fn fill_missing(&mut self, ear: Ear, frequency: u32, threshold_db: f64) {
        self.ear_mut(ear).entry(frequency).or_insert(threshold_db);
    }

    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty() && self.right.is_empty()
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.left.values().chain(self.right.values()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_json_shape() {
        let mut thresholds = Thresholds::default();
        thresholds.insert(Ear::Left, 1000, -10.0);
        thresholds.insert(Ear::Right, 250, 35.0);

        let json = serde_json::to_value(&thresholds).unwrap();
        assert_eq!(json["left"]["1000"], -10.0);
        assert_eq!(json["right"]["250"], 35.0);

        let text = serde_json::to_string(&thresholds).unwrap();
        let back: Thresholds = serde_json::from_str(&text).unwrap();
        assert_eq!(back, thresholds);
    }

    #[test]
    fn test_fill_missing_keeps_existing() {
        let mut thresholds = Thresholds::default();
        thresholds.insert(Ear::Right, 500, 5.0);
        thresholds.fill_missing(Ear::Right, 500, 40.0);
        thresholds.fill_missing(Ear::Left, 500, 40.0);
        assert_eq!(thresholds.get(Ear::Right, 500), Some(5.0));
        assert_eq!(thresholds.get(Ear::Left, 500), Some(40.0));
        assert_eq!(thresholds.len(), 2);
    }

    #[test]
    fn test_ear_round_trip() {
        assert_eq!("left".parse::<Ear>().unwrap(), Ear::Left);
        assert_eq!(Ear::Right.to_string(), "right");
        assert_eq!(Ear::Right.channel(), Channel::Right);
        assert!("both".parse::<Ear>().is_err());
    }
}
