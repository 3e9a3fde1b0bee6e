//! HTTP API handlers

pub mod health;
pub mod screening;
pub mod tone;
pub mod ui;

pub use health::{get_build_info, health_routes, BuildInfo};
pub use screening::{get_results, next_test, register, start_test, submit_response};
pub use tone::generate_tone;
pub use ui::{serve_app_js, serve_index};
