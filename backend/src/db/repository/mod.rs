//! Repository trait definitions for analysis persistence.
//!
//! - [`error`]: Error types for repository operations
//! - [`analysis`]: Content-addressed storage of [`crate::api::Analysis`] records
//!
//! The repository is the only component that reads or writes analyses;
//! everything else goes through the [`AnalysisRepository`] trait.

pub mod analysis;
pub mod error;

pub use analysis::AnalysisRepository;
pub use error::{ErrorContext, RepositoryError, RepositoryResult};
