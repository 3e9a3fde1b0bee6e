//! Persistence collaborator
//!
//! The session state machine treats storage as an injected service: load a
//! state, apply one transition, save it back. [`SessionStore`] is that seam;
//! [`SqliteSessionStore`] is the production backend and
//! [`MemorySessionStore`] backs tests and the `--in-memory` demo mode.
//!
//! Stores do not serialize read-modify-write sequences themselves; callers
//! hold the per-session lock from [`crate::locks::SessionLocks`] around them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearscreen_common::{Result, SessionState, Summary, Thresholds};
use serde::{Deserialize, Serialize};

mod memory;
mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

/// Demographics captured at registration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRespondent {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub age_group: Option<String>,
    pub gender: Option<String>,
}

/// A recorded summary, as persisted independently of the session blob
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSummary {
    pub respondent_id: i64,
    pub left_average: f64,
    pub right_average: f64,
    pub max_interaural_difference: f64,
    pub is_valid: bool,
    pub thresholds: Thresholds,
    pub recorded_at: DateTime<Utc>,
}

impl StoredSummary {
    pub fn from_summary(respondent_id: i64, summary: &Summary, recorded_at: DateTime<Utc>) -> Self {
        Self {
            respondent_id,
            left_average: summary.left_average,
            right_average: summary.right_average,
            max_interaural_difference: summary.max_interaural_difference,
            is_valid: summary.is_valid,
            thresholds: summary.thresholds.clone(),
            recorded_at,
        }
    }
}

/// Session persistence keyed by respondent id
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register a respondent; the test is not begun yet
    async fn create_session(&self, respondent: NewRespondent) -> Result<i64>;

    /// Fails with `NotFound` for unknown ids and `InvalidState` when the test
    /// was never begun
    async fn load_session(&self, id: i64) -> Result<SessionState>;

    /// Replace the stored state in a single write
    async fn save_session(&self, id: i64, state: &SessionState) -> Result<()>;

    /// Upsert the finalized averages for later retrieval
    async fn record_summary(&self, id: i64, summary: &Summary) -> Result<()>;

    /// `Ok(None)` when the respondent exists but has no recorded summary
    async fn load_summary(&self, id: i64) -> Result<Option<StoredSummary>>;
}
