//! hearscreen-server library - Hearing screening HTTP service
//!
//! Serves the test client, renders stimulus tones, and drives the
//! per-respondent screening sessions stored through a [`db::SessionStore`].

use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod api;
pub mod db;
pub mod error;
pub mod locks;
pub mod screening;

use screening::ScreeningService;

/// Stimulus delivery settings
#[derive(Debug, Clone, Copy)]
pub struct ToneSettings {
    /// Clip length the client is told to request (seconds)
    pub duration_s: f64,
    /// Swap left/right in every rendered clip
    pub swap_stereo_channels: bool,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            duration_s: 0.35,
            swap_stereo_channels: false,
        }
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub screening: Arc<ScreeningService>,
    pub tone: ToneSettings,
}

impl AppState {
    pub fn new(screening: Arc<ScreeningService>, tone: ToneSettings) -> Self {
        Self { screening, tone }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/", get(api::serve_index))
        .route("/static/app.js", get(api::serve_app_js))
        .route("/register", post(api::register))
        .route("/start_test", post(api::start_test))
        .route("/submit_response", post(api::submit_response))
        .route("/next_test", get(api::next_test))
        .route("/results/:user_id", get(api::get_results))
        .route("/tone", get(api::generate_tone))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
