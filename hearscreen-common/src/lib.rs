//! # Hearscreen Common Library
//!
//! Shared code for the hearing screening service including:
//! - Tone synthesis (stereo PCM16 clips with click-free ramps)
//! - The adaptive staircase, threshold estimator and session state machine
//! - Configuration loading and root folder resolution
//! - Database schema initialization

pub mod audiometry;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod tone;

pub use audiometry::{
    Cell, CellState, Ear, Observation, Protocol, SessionState, SessionStatus, Summary, Thresholds,
};
pub use error::{Error, Result};
pub use tone::{Channel, ToneClip};
