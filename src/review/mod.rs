//! Review orchestration.
//!
//! [`Orchestrator::submit`] persists the submission, creates a running
//! review and spawns a background job. The job fans out to the analyzers
//! through the [`TaskRunner`] and, once every task has settled, hands the
//! results to the [`Aggregator`] for the terminal transition.

pub mod aggregator;
pub mod orchestrator;
pub mod runner;

pub use aggregator::{total_issues, Aggregator, Transition};
pub use orchestrator::{Orchestrator, SubmittedReview};
pub use runner::TaskRunner;
