//! Threshold estimation from one cell's observations
//!
//! The threshold is the softest level at which at least half of the
//! presentations were heard. With sparser data the softest level with any
//! "heard" response is used, and with no "heard" responses at all the caller's
//! fallback (the starting level) is returned.

use super::types::Observation;
use serde_json::Value;
use tracing::warn;

/// Minimum fraction of "heard" responses for a level to count as reliably heard
pub const HEARD_CRITERION: f64 = 0.5;

/// A presentation/response record as seen by the estimator.
///
/// Records that cannot report a usable level are skipped rather than failing
/// the whole estimate.
pub trait ObservationRecord {
    fn level_db(&self) -> Option<f64>;
    fn heard(&self) -> bool;
}

impl ObservationRecord for Observation {
    fn level_db(&self) -> Option<f64> {
        Some(self.level as f64)
    }

    fn heard(&self) -> bool {
        self.heard
    }
}

/// Free-form `{"level": .., "heard": ..}` records from older state blobs
impl ObservationRecord for Value {
    fn level_db(&self) -> Option<f64> {
        let level = match self.get("level")? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        level.filter(|level| level.is_finite())
    }

    fn heard(&self) -> bool {
        match self.get("heard") {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
            _ => false,
        }
    }
}

impl<T: ObservationRecord + ?Sized> ObservationRecord for &T {
    fn level_db(&self) -> Option<f64> {
        (**self).level_db()
    }

    fn heard(&self) -> bool {
        (**self).heard()
    }
}

#[derive(Debug)]
struct LevelTally {
    level: f64,
    heard: u32,
    total: u32,
}

impl LevelTally {
    fn heard_fraction(&self) -> f64 {
        self.heard as f64 / self.total as f64
    }
}

/// Estimate a threshold (dB) from chronologically ordered records
pub fn estimate_threshold<I>(records: I, fallback_db: f64) -> f64
where
    I: IntoIterator,
    I::Item: ObservationRecord,
{
    let mut tallies: Vec<LevelTally> = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        let Some(level) = record.level_db() else {
            skipped += 1;
            continue;
        };

        let index = match tallies.iter().position(|t| t.level == level) {
            Some(index) => index,
            None => {
                tallies.push(LevelTally { level, heard: 0, total: 0 });
                tallies.len() - 1
            }
        };
        let tally = &mut tallies[index];
        tally.total += 1;
        if record.heard() {
            tally.heard += 1;
        }
    }

    if skipped > 0 {
        warn!("Skipped {} observation record(s) without a usable level", skipped);
    }

    softest(tallies.iter().filter(|t| t.heard_fraction() >= HEARD_CRITERION))
        .or_else(|| softest(tallies.iter().filter(|t| t.heard > 0)))
        .unwrap_or(fallback_db)
}

fn softest<'a>(candidates: impl Iterator<Item = &'a LevelTally>) -> Option<f64> {
    candidates.map(|t| t.level).min_by(f64::total_cmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obs(level: i32, heard: bool) -> Observation {
        Observation { level, heard }
    }

    #[test]
    fn test_empty_returns_fallback() {
        let none: Vec<Observation> = Vec::new();
        assert_eq!(estimate_threshold(&none, 40.0), 40.0);
    }

    #[test]
    fn test_nothing_heard_returns_fallback() {
        let records = vec![obs(40, false), obs(40, false), obs(40, false)];
        assert_eq!(estimate_threshold(&records, 40.0), 40.0);
    }

    #[test]
    fn test_all_heard_returns_minimum_level() {
        let records = vec![obs(40, true), obs(30, true), obs(20, true), obs(10, true)];
        assert_eq!(estimate_threshold(&records, 40.0), 10.0);
    }

    #[test]
    fn test_softest_level_meeting_criterion() {
        // 20 dB: 1/2 heard (meets criterion), 10 dB: 0/2, 15 dB: 1/3
        let records = vec![
            obs(40, true),
            obs(30, true),
            obs(20, true),
            obs(10, false),
            obs(15, false),
            obs(20, false),
            obs(10, false),
            obs(15, true),
            obs(15, false),
        ];
        assert_eq!(estimate_threshold(&records, 40.0), 20.0);
    }

    #[test]
    fn test_sparse_heard_uses_softest_heard_level() {
        // 25 dB: 1/3, 30 dB: 1/3; nothing reaches 50%
        let records = vec![
            obs(25, false),
            obs(25, true),
            obs(25, false),
            obs(30, false),
            obs(30, false),
            obs(30, true),
        ];
        assert_eq!(estimate_threshold(&records, 40.0), 25.0);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let records = vec![
            json!({"level": 40, "heard": true}),
            json!({"level": "abc", "heard": true}),
            json!({"heard": true}),
            json!({"level": null, "heard": true}),
            json!({"level": "30", "heard": true}),
            json!({"level": 20.0, "heard": false}),
        ];
        assert_eq!(estimate_threshold(&records, 40.0), 30.0);
    }

    #[test]
    fn test_only_malformed_records_returns_fallback() {
        let records = vec![json!({"heard": true}), json!("garbage")];
        assert_eq!(estimate_threshold(&records, 40.0), 40.0);
    }
}
