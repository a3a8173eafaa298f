//! Pipeline: fetch, normalize, plan, notify, commit.
//!
//! - `window`: period markers and pruning per window policy
//! - `plan`: pure notification planning and state commit
//! - `run`: the orchestrator wiring services and storage together

pub mod plan;
pub mod run;
pub mod window;

pub use plan::{NotifyPlan, Planner, SkipReason};
pub use run::{Pipeline, RunOutcome, run_once};
pub use window::{ROLLING_MARKER, local_offset};
