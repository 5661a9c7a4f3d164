//! Opener catalog
//!
//! Holds every loaded opener, indexed by job code. Built once at startup;
//! lookups never re-parse definitions.

use super::builtin::builtin_openers;
use super::definition::parse_definition_file;
use crate::config::CatalogConfig;
use crate::types::{Opener, OpenerProgress, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The opener catalog
#[derive(Debug, Clone, Default)]
pub struct OpenerCatalog {
    /// Job code (uppercase) -> openers in load order
    by_job: BTreeMap<String, Vec<Arc<Opener>>>,

    /// Every opener in load order
    all: Vec<Arc<Opener>>,
}

impl OpenerCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from builtin definitions and configured directories
    ///
    /// Load order: builtin definitions in their fixed order, then each
    /// directory's `*.json` files sorted by file name. Invalid directory
    /// files are skipped with a warning.
    pub fn load_all(config: &CatalogConfig) -> Result<Self> {
        let mut catalog = Self::new();

        if config.include_builtin {
            for opener in builtin_openers()? {
                catalog.insert_filtered(opener, config);
            }
        }

        for dir in &config.directories {
            log::info!("Loading opener definitions from {:?}", dir);
            for path in definition_files(dir)? {
                match parse_definition_file(&path) {
                    Ok(opener) => catalog.insert_filtered(opener, config),
                    Err(e) => log::warn!("Skipping opener definition {:?}: {}", path, e),
                }
            }
        }

        let stats = catalog.stats();
        log::info!(
            "Opener catalog loaded: {} openers for {} jobs",
            stats.num_openers,
            stats.num_jobs
        );
        Ok(catalog)
    }

    /// Build a catalog from already-constructed openers, in the given order
    pub fn from_openers(openers: impl IntoIterator<Item = Opener>) -> Self {
        let mut catalog = Self::new();
        for opener in openers {
            catalog.insert(opener);
        }
        catalog
    }

    fn insert_filtered(&mut self, opener: Opener, config: &CatalogConfig) {
        if config.should_load_job(&opener.job) {
            self.insert(opener);
        } else {
            log::debug!("Job filter excludes opener '{}' ({})", opener.id, opener.job);
        }
    }

    /// Add an opener; the first opener with a given id wins
    pub fn insert(&mut self, opener: Opener) -> bool {
        if self.by_id(&opener.id).is_some() {
            log::warn!("Duplicate opener id '{}', keeping the first one", opener.id);
            return false;
        }

        let opener = Arc::new(opener);
        self.by_job
            .entry(opener.job.to_uppercase())
            .or_default()
            .push(Arc::clone(&opener));
        self.all.push(opener);
        true
    }

    /// Openers for a job, in load order; unknown jobs give an empty slice
    pub fn by_job(&self, job: &str) -> &[Arc<Opener>] {
        self.by_job
            .get(&job.trim().to_uppercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Find an opener by id across all jobs
    pub fn by_id(&self, opener_id: &str) -> Option<&Arc<Opener>> {
        self.all.iter().find(|o| o.id == opener_id)
    }

    /// First opener for a job in load order
    pub fn default_for(&self, job: &str) -> Option<&Arc<Opener>> {
        self.by_job(job).first()
    }

    /// Openers for a job bound to a specific zone
    pub fn for_zone(&self, job: &str, zone_id: u32) -> Vec<&Arc<Opener>> {
        self.by_job(job)
            .iter()
            .filter(|o| o.zone_id == Some(zone_id))
            .collect()
    }

    /// Fresh progress for an opener
    pub fn create_progress(&self, opener: &Opener) -> OpenerProgress {
        OpenerProgress::new(opener.id.clone())
    }

    /// The job code -> openers mapping
    pub fn as_map(&self) -> &BTreeMap<String, Vec<Arc<Opener>>> {
        &self.by_job
    }

    /// Every opener in load order
    pub fn all(&self) -> impl Iterator<Item = &Arc<Opener>> {
        self.all.iter()
    }

    /// Job codes that have at least one opener
    pub fn jobs(&self) -> Vec<&str> {
        self.by_job.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Get catalog statistics
    pub fn stats(&self) -> CatalogStats {
        let zones: HashSet<u32> = self.all.iter().filter_map(|o| o.zone_id).collect();
        CatalogStats {
            num_openers: self.all.len(),
            num_jobs: self.by_job.len(),
            num_actions: self.all.iter().map(|o| o.len()).sum(),
            num_zones: zones.len(),
        }
    }
}

/// `*.json` files in a directory, sorted by file name
fn definition_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|s| s.to_str())
                    .map(|s| s.eq_ignore_ascii_case("json"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Catalog statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogStats {
    /// Total number of openers
    pub num_openers: usize,
    /// Number of distinct job codes
    pub num_jobs: usize,
    /// Total number of actions across all openers
    pub num_actions: usize,
    /// Number of distinct zones with a zone-specific opener
    pub num_zones: usize,
}
