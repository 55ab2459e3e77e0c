//! Report rendering for review snapshots.

mod generator;

pub use generator::{generate_json_report, generate_markdown_report};
