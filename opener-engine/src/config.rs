//! Catalog configuration types
//!
//! This module defines the minimal configuration needed to build an opener
//! catalog. Session behaviour (duplicate handling, roster timeouts, etc.) is
//! handled by the application layer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for loading the opener catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Whether to load the definitions shipped with the library
    #[serde(default = "default_true")]
    pub include_builtin: bool,

    /// Extra directories scanned for `*.json` definition files
    #[serde(default)]
    pub directories: Vec<PathBuf>,

    /// Optional: only keep openers for these job codes
    #[serde(default)]
    pub job_filter: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            include_builtin: true,
            directories: Vec::new(),
            job_filter: None,
        }
    }
}

impl CatalogConfig {
    /// Create a new catalog configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: enable or disable the builtin definitions
    pub fn with_builtin(mut self, enabled: bool) -> Self {
        self.include_builtin = enabled;
        self
    }

    /// Builder method: add a definition directory
    pub fn add_directory(mut self, dir: impl AsRef<Path>) -> Self {
        self.directories.push(dir.as_ref().to_path_buf());
        self
    }

    /// Builder method: set job filter
    pub fn with_job_filter(mut self, jobs: Vec<String>) -> Self {
        self.job_filter = Some(jobs);
        self
    }

    /// Check if openers for a job should be kept
    pub fn should_load_job(&self, job: &str) -> bool {
        match &self.job_filter {
            Some(jobs) => jobs.iter().any(|j| j.eq_ignore_ascii_case(job)),
            None => true,
        }
    }
}
