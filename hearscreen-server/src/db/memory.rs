//! In-process session store
//!
//! Keeps the same JSON blob representation as the SQLite store so state
//! round-trips through serialization exactly as it would in production.

use super::{NewRespondent, SessionStore, StoredSummary};
use async_trait::async_trait;
use chrono::Utc;
use hearscreen_common::{Error, Result, SessionState, Summary};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug)]
struct Record {
    test_state: Option<String>,
    summary: Option<StoredSummary>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    records: HashMap<i64, Record>,
}

/// Volatile store; contents are lost when the process exits.
///
/// Registration demographics are not retained, only session state and
/// summaries.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored blob for `id` without decoding it
    pub async fn put_raw_state(&self, id: i64, text: impl Into<String>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| not_found(id))?;
        record.test_state = Some(text.into());
        Ok(())
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Respondent {}", id))
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(&self, _respondent: NewRespondent) -> Result<i64> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(
            id,
            Record {
                test_state: None,
                summary: None,
            },
        );
        info!("Registered respondent {} (in-memory)", id);
        Ok(id)
    }

    async fn load_session(&self, id: i64) -> Result<SessionState> {
        let inner = self.inner.read().await;
        let record = inner.records.get(&id).ok_or_else(|| not_found(id))?;
        match &record.test_state {
            None => Err(Error::InvalidState(format!(
                "Respondent {} has not started the test",
                id
            ))),
            Some(text) => SessionState::from_json(text),
        }
    }

    async fn save_session(&self, id: i64, state: &SessionState) -> Result<()> {
        let text = state.to_json()?;
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| not_found(id))?;
        record.test_state = Some(text);
        Ok(())
    }

    async fn record_summary(&self, id: i64, summary: &Summary) -> Result<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(&id).ok_or_else(|| not_found(id))?;
        record.summary = Some(StoredSummary::from_summary(id, summary, Utc::now()));
        Ok(())
    }

    async fn load_summary(&self, id: i64) -> Result<Option<StoredSummary>> {
        let inner = self.inner.read().await;
        let record = inner.records.get(&id).ok_or_else(|| not_found(id))?;
        Ok(record.summary.clone())
    }
}
