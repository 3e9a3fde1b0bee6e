//! Screening workflow over the persistence collaborator
//!
//! Each operation is one load → transition → save sequence held under the
//! session's lock. Errors leave the stored state untouched because nothing is
//! saved until the transition has succeeded.

use crate::db::{NewRespondent, SessionStore, StoredSummary};
use crate::locks::SessionLocks;
use hearscreen_common::audiometry::SubmitOutcome;
use hearscreen_common::{Error, Protocol, Result, SessionState, SessionStatus};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ScreeningService {
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    protocol: Protocol,
}

impl ScreeningService {
    pub fn new(store: Arc<dyn SessionStore>, protocol: Protocol) -> Self {
        Self {
            store,
            locks: SessionLocks::new(),
            protocol,
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub async fn register(&self, respondent: NewRespondent) -> Result<i64> {
        self.store.create_session(respondent).await
    }

    /// Begin (or restart) the test for `id`, returning the first status
    pub async fn start_test(&self, id: i64) -> Result<SessionStatus> {
        let _guard = self.locks.lock(id).await;

        let state = SessionState::begin(self.protocol.clone())?;
        self.store.save_session(id, &state).await?;
        info!("Test started for respondent {}", id);

        state.status()
    }

    /// Apply one response to the active cell of `id`
    pub async fn submit_response(&self, id: i64, heard: bool) -> Result<SubmitOutcome> {
        let _guard = self.locks.lock(id).await;

        let mut state = self.store.load_session(id).await?;
        let outcome = state.submit(heard)?;
        self.store.save_session(id, &state).await?;

        debug!(
            "Respondent {}: level {} dB heard={} (cell complete: {})",
            id,
            outcome.observation.level,
            heard,
            outcome.completed_cell.is_some()
        );
        if outcome.session_completed {
            info!("Respondent {} completed all cells", id);
        }

        Ok(outcome)
    }

    /// Current status; a completed session has its summary recorded
    pub async fn next_test(&self, id: i64) -> Result<SessionStatus> {
        let _guard = self.locks.lock(id).await;

        let state = self.store.load_session(id).await?;
        let status = state.status()?;

        if let SessionStatus::Completed(summary) = &status {
            if !summary.is_valid {
                warn!(
                    "Respondent {} never reported hearing a tone; summary marked invalid",
                    id
                );
            }
            self.store.record_summary(id, summary).await?;
        }

        Ok(status)
    }

    /// Previously recorded summary for `id`
    pub async fn results(&self, id: i64) -> Result<StoredSummary> {
        self.store
            .load_summary(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("No results recorded for respondent {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemorySessionStore;

    fn service() -> ScreeningService {
        let protocol = Protocol {
            frequencies: vec![1000],
            ..Protocol::default()
        };
        ScreeningService::new(Arc::new(MemorySessionStore::new()), protocol)
    }

    #[tokio::test]
    async fn test_unknown_respondent_is_not_found() {
        let service = service();
        assert!(matches!(service.start_test(42).await, Err(Error::NotFound(_))));
        assert!(matches!(service.submit_response(42, true).await, Err(Error::NotFound(_))));
        assert!(matches!(service.next_test(42).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_status_before_start_is_invalid_state() {
        let service = service();
        let id = service.register(NewRespondent::default()).await.unwrap();
        assert!(matches!(service.next_test(id).await, Err(Error::InvalidState(_))));
        assert!(matches!(service.submit_response(id, true).await, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_full_run_records_summary() {
        let service = service();
        let id = service.register(NewRespondent::default()).await.unwrap();
        service.start_test(id).await.unwrap();

        assert!(matches!(service.results(id).await, Err(Error::NotFound(_))));

        let mut completed = false;
        while !completed {
            completed = service.submit_response(id, true).await.unwrap().session_completed;
        }

        match service.next_test(id).await.unwrap() {
            SessionStatus::Completed(summary) => assert!(summary.is_valid),
            SessionStatus::InProgress(_) => panic!("expected completion"),
        }

        let stored = service.results(id).await.unwrap();
        assert_eq!(stored.left_average, -10.0);
        assert_eq!(stored.right_average, -10.0);

        assert!(matches!(
            service.submit_response(id, true).await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_responses_are_not_lost() {
        let service = Arc::new(ScreeningService::new(
            Arc::new(MemorySessionStore::new()),
            Protocol::default(),
        ));
        let id = service.register(NewRespondent::default()).await.unwrap();
        service.start_test(id).await.unwrap();

        // Eight "not heard" responses at the ceiling stay within the first cell
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move { service.submit_response(id, false).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = service.store().load_session(id).await.unwrap();
        let active = state.active_cell_state.unwrap();
        assert_eq!(active.trial_count, 8);
        assert_eq!(active.observations.len(), 8);
    }
}
