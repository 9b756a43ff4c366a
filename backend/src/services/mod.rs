//! Process-wide services shared by the analyzers.

pub mod job_tracker;

pub use job_tracker::{Job, JobGuard, JobTracker};
