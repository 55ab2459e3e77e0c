//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::StoreBackend;
use crate::models::AnalyzerVariant;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ReviewSwarm - multi-agent LLM code review
///
/// Dispatches a source file to security, performance and quality
/// reviewers running in parallel, enriched with similar reference
/// patterns, and aggregates their findings into one review.
///
/// Examples:
///   reviewswarm review src/login.py
///   reviewswarm review handler.go --agents security,performance --format json
///   reviewswarm show review_3f2a9c1b7d04
///   reviewswarm stats
///   reviewswarm import-patterns patterns.json
///   reviewswarm init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reviewswarm.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend (overrides config)
    #[arg(long, value_name = "BACKEND", global = true)]
    pub store: Option<StoreBackend>,

    /// SQLite database path (overrides config)
    #[arg(long, value_name = "FILE", env = "REVIEWSWARM_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Request timeout in seconds for every inference provider
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Ollama embedding model used for vector retrieval
    #[arg(long, value_name = "MODEL", global = true)]
    pub embedding_model: Option<String>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Submit a source file for review and wait for the result
    Review(ReviewArgs),

    /// Print the current state of a review
    Show {
        /// Review identifier returned by `review`
        review_id: String,

        /// Output format (markdown, json)
        #[arg(long, default_value = "markdown", value_name = "FORMAT")]
        format: OutputFormat,
    },

    /// Print aggregate counters across all reviews
    Stats,

    /// Check store connectivity and list available agents and providers
    Health,

    /// Load reference patterns from a JSON array file
    ImportPatterns {
        /// File containing `[{"name": ..., "snippet": ..., ...}]`
        file: PathBuf,
    },

    /// Generate a default .reviewswarm.toml configuration file
    InitConfig,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ReviewArgs {
    /// Source file to review, or `-` for stdin
    pub file: PathBuf,

    /// Programming language (inferred from the file extension if omitted)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Analyzers to run (comma-separated)
    ///
    /// Defaults to the config's default_agents.
    #[arg(short, long, value_delimiter = ',', value_name = "AGENTS")]
    pub agents: Option<Vec<AnalyzerVariant>>,

    /// Skip reference pattern retrieval
    #[arg(long)]
    pub no_retrieval: bool,

    /// Output file path for the report (stdout if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Poll interval in milliseconds (overrides config)
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Print only the review id and skip the report
    ///
    /// The review still runs to completion; fetch it later with `show`.
    #[arg(long)]
    pub no_wait: bool,

    /// Fail if issues at or above this severity are found
    ///
    /// Useful for CI pipelines. Exit code 2 when threshold is exceeded.
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Severity level for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, clap::ValueEnum)]
pub enum FailOnLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Command::Review(ref review) = self.command {
            if review.file.as_os_str() != "-" && !review.file.is_file() {
                return Err(format!("Source file does not exist: {}", review.file.display()));
            }
            if let Some(ref agents) = review.agents {
                if agents.is_empty() {
                    return Err("At least one agent must be selected".to_string());
                }
            }
            if review.poll_interval == Some(0) {
                return Err("Poll interval must be at least 1ms".to_string());
            }
        }

        if let Command::ImportPatterns { ref file } = self.command {
            if !file.is_file() {
                return Err(format!("Pattern file does not exist: {}", file.display()));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
