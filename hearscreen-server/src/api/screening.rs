//! Registration and test-flow endpoints
//!
//! The client registers, starts the test, then alternates between
//! `GET /next_test` (what to play) and `POST /submit_response` (what was
//! heard) until the status reports completion.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use hearscreen_common::{Ear, SessionStatus, Thresholds};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{NewRespondent, StoredSummary};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub age_group: Option<String>,
    pub gender: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct StartTestRequest {
    pub user_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub user_id: Option<i64>,
    pub heard: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponseResponse {
    pub success: bool,
    pub cell_completed: bool,
    pub completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Option<i64>,
}

/// Status payload for `GET /next_test` and `POST /start_test`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TestStatusResponse {
    InProgress {
        completed: bool,
        freq: u32,
        ear: Ear,
        level: i32,
        volume: f64,
        duration: f64,
        /// Percent of cells completed
        progress: f64,
        test_number: usize,
        total_tests: usize,
    },
    Completed {
        completed: bool,
        is_valid: bool,
        thresholds: Thresholds,
        left_avg: f64,
        right_avg: f64,
        max_diff: f64,
    },
}

impl TestStatusResponse {
    fn from_status(status: SessionStatus, duration: f64) -> Self {
        match status {
            SessionStatus::InProgress(p) => TestStatusResponse::InProgress {
                completed: false,
                freq: p.frequency,
                ear: p.ear,
                level: p.level_db,
                volume: p.volume,
                duration,
                progress: p.fraction_complete * 100.0,
                test_number: p.test_number,
                total_tests: p.total_tests,
            },
            SessionStatus::Completed(s) => TestStatusResponse::Completed {
                completed: true,
                is_valid: s.is_valid,
                thresholds: s.thresholds,
                left_avg: s.left_average,
                right_avg: s.right_average,
                max_diff: s.max_interaural_difference,
            },
        }
    }
}

fn require_user_id(user_id: Option<i64>) -> ApiResult<i64> {
    user_id.ok_or_else(|| ApiError::validation("User ID required"))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Json<RegisterResponse>> {
    let Json(req) = payload?;
    let user_id = state
        .screening
        .register(NewRespondent {
            name: req.name,
            surname: req.surname,
            age_group: req.age_group,
            gender: req.gender,
        })
        .await?;

    Ok(Json(RegisterResponse { user_id }))
}

/// POST /start_test
pub async fn start_test(
    State(state): State<AppState>,
    payload: Result<Json<StartTestRequest>, JsonRejection>,
) -> ApiResult<Json<TestStatusResponse>> {
    let Json(req) = payload?;
    let user_id = require_user_id(req.user_id)?;
    let status = state.screening.start_test(user_id).await?;
    Ok(Json(TestStatusResponse::from_status(status, state.tone.duration_s)))
}

/// POST /submit_response
pub async fn submit_response(
    State(state): State<AppState>,
    payload: Result<Json<SubmitResponseRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitResponseResponse>> {
    let Json(req) = payload?;
    let (Some(user_id), Some(heard)) = (req.user_id, req.heard) else {
        return Err(ApiError::validation("User ID and response required"));
    };

    let outcome = state.screening.submit_response(user_id, heard).await?;
    if let Some(cell) = &outcome.completed_cell {
        info!(
            "Respondent {}: {} threshold {} dB",
            user_id, cell.cell, cell.threshold_db
        );
    }

    Ok(Json(SubmitResponseResponse {
        success: true,
        cell_completed: outcome.completed_cell.is_some(),
        completed: outcome.session_completed,
    }))
}

/// GET /next_test?user_id=
pub async fn next_test(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult<Json<TestStatusResponse>> {
    let Query(query) = query?;
    let user_id = require_user_id(query.user_id)?;
    let status = state.screening.next_test(user_id).await?;
    Ok(Json(TestStatusResponse::from_status(status, state.tone.duration_s)))
}

/// GET /results/:user_id
pub async fn get_results(
    State(state): State<AppState>,
    user_id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<StoredSummary>> {
    let Path(user_id) = user_id?;
    Ok(Json(state.screening.results(user_id).await?))
}
