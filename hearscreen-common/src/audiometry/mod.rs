//! Adaptive pure-tone audiometry
//!
//! Leaves first:
//! - [`threshold`]: estimates a threshold from the observations of one cell
//! - [`staircase`]: per-cell level adaptation and termination
//! - [`session`]: sequences the staircase across all (frequency, ear) cells
//!   and summarizes the result
//! - [`legacy`]: converts free-form state blobs from the earlier storage format

pub mod legacy;
pub mod protocol;
pub mod session;
pub mod staircase;
pub mod threshold;
pub mod types;

pub use protocol::{Protocol, StaircaseRules, DEFAULT_FREQUENCIES, EAR_ORDER};
pub use session::{Progress, SessionState, SessionStatus, SubmitOutcome, Summary, STATE_VERSION};
pub use staircase::{CellState, CompletedCell, CompletionReason, Transition};
pub use threshold::{estimate_threshold, ObservationRecord};
pub use types::{Cell, Ear, Observation, Thresholds};
