//! Opener catalog and definition file loading
//!
//! This module contains the definition file parser, the builtin definitions
//! and the catalog that indexes them by job.

pub mod builtin;
pub mod definition;
pub mod index;

// Re-export key types for convenience
pub use definition::{parse_definition, parse_definition_file, validate_opener, ActionFile, OpenerFile};
pub use index::{CatalogStats, OpenerCatalog};
