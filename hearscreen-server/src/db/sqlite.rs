//! SQLite-backed session store

use super::{NewRespondent, SessionStore, StoredSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearscreen_common::{Error, Result, SessionState, Summary, Thresholds};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// Respondents and their session blobs in the `respondents` table, summaries
/// in `summaries`
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn respondent_exists(&self, id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM respondents WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

fn not_found(id: i64) -> Error {
    Error::NotFound(format!("Respondent {}", id))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, respondent: NewRespondent) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO respondents (name, surname, age_group, gender) VALUES (?, ?, ?, ?)",
        )
        .bind(&respondent.name)
        .bind(&respondent.surname)
        .bind(&respondent.age_group)
        .bind(&respondent.gender)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!("Registered respondent {}", id);
        Ok(id)
    }

    async fn load_session(&self, id: i64) -> Result<SessionState> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT test_state FROM respondents WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            None => Err(not_found(id)),
            Some((None,)) => Err(Error::InvalidState(format!(
                "Respondent {} has not started the test",
                id
            ))),
            Some((Some(text),)) => SessionState::from_json(&text),
        }
    }

    async fn save_session(&self, id: i64, state: &SessionState) -> Result<()> {
        let text = state.to_json()?;
        let result = sqlx::query(
            "UPDATE respondents SET test_state = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(&text)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found(id));
        }
        debug!("Saved session state for respondent {} ({} bytes)", id, text.len());
        Ok(())
    }

    async fn record_summary(&self, id: i64, summary: &Summary) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM respondents WHERE id = ?)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Err(not_found(id));
        }

        sqlx::query(
            r#"
            INSERT INTO summaries
                (respondent_id, left_avg, right_avg, max_interaural_difference, is_valid, thresholds, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(respondent_id) DO UPDATE SET
                left_avg = excluded.left_avg,
                right_avg = excluded.right_avg,
                max_interaural_difference = excluded.max_interaural_difference,
                is_valid = excluded.is_valid,
                thresholds = excluded.thresholds,
                recorded_at = excluded.recorded_at
            "#,
        )
        .bind(id)
        .bind(summary.left_average)
        .bind(summary.right_average)
        .bind(summary.max_interaural_difference)
        .bind(summary.is_valid)
        .bind(serde_json::to_string(&summary.thresholds)?)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(
            "Recorded summary for respondent {}: left {:.1} dB, right {:.1} dB, max diff {:.1} dB",
            id, summary.left_average, summary.right_average, summary.max_interaural_difference
        );
        Ok(())
    }

    async fn load_summary(&self, id: i64) -> Result<Option<StoredSummary>> {
        let row: Option<(f64, f64, f64, bool, String, String)> = sqlx::query_as(
            r#"
            SELECT left_avg, right_avg, max_interaural_difference, is_valid, thresholds, recorded_at
            FROM summaries WHERE respondent_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((left_average, right_average, max_interaural_difference, is_valid, thresholds, recorded_at)) = row
        else {
            return if self.respondent_exists(id).await? {
                Ok(None)
            } else {
                Err(not_found(id))
            };
        };

        let thresholds: Thresholds = serde_json::from_str(&thresholds)
            .map_err(|e| Error::MalformedData(format!("Stored thresholds for {}: {}", id, e)))?;
        let recorded_at = DateTime::parse_from_rfc3339(&recorded_at)
            .map_err(|e| Error::MalformedData(format!("Stored timestamp for {}: {}", id, e)))?
            .with_timezone(&Utc);

        Ok(Some(StoredSummary {
            respondent_id: id,
            left_average,
            right_average,
            max_interaural_difference,
            is_valid,
            thresholds,
            recorded_at,
        }))
    }
}
