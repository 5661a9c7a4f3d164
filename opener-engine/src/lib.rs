//! Opener Engine Library
//!
//! A stateless, reusable library for tracking progress through a job's
//! scripted opening sequence from host combat-log lines.
//!
//! # Architecture
//!
//! This library is intentionally minimal and focused on matching:
//! - Parses ability-usage log lines into detected actions
//! - Loads and validates opener definitions, indexed by job
//! - Decides whether a detected ability is the next expected step
//! - Computes the next progress value (advance, mark missed, reset)
//!
//! The library does NOT:
//! - Subscribe to host events
//! - Track which player or job is active
//! - Hold the active opener/progress pair
//! - Render timelines or play audio cues
//!
//! All higher-level functionality is in the application layer (opener-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use opener_engine::{CatalogConfig, LogLineParser, OpenerCatalog, ProgressionMatcher};
//!
//! let catalog = OpenerCatalog::load_all(&CatalogConfig::new()).unwrap();
//! let opener = catalog.default_for("WAR").unwrap();
//! let mut progress = catalog.create_progress(opener);
//!
//! let line = "21|2024-03-01T20:15:02.1230000+01:00|1039A1B2|Kaia Stone|2E|Tomahawk|40001234|Dummy";
//! if let Some(action) = LogLineParser::parse_line(line) {
//!     if ProgressionMatcher::matches(opener, &progress, &action.ability_id) {
//!         progress = ProgressionMatcher::advance(opener, &progress);
//!     }
//! }
//! println!("{} of {} actions done", progress.current_index, opener.len());
//! ```

// Public modules
pub mod catalog;
pub mod config;
pub mod jobs;
pub mod matcher;
pub mod parser;
pub mod types;

// Re-export main types for convenience
pub use catalog::{CatalogStats, OpenerCatalog};
pub use config::CatalogConfig;
pub use jobs::{job_code, job_name};
pub use matcher::ProgressionMatcher;
pub use parser::{normalize_ability_id, LogLineParser};
pub use types::{
    ActionDefinition, ActionKind, DetectedAction, EngineError, Opener,
    OpenerProgress, ProgressState, Result, Timestamp,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
