//! Specialist code analyzers.
//!
//! Each analyzer variant is a [`Focus`] (what to look for) paired with the
//! shared inference chain (how to ask). Analysis never errors; it always
//! produces an [`crate::models::AgentResult`].

pub mod analyzer;
pub mod focus;
pub mod parse;

pub use analyzer::{Analyzer, MAX_CONTEXT_PATTERNS};
pub use focus::{focus_for, Focus};
