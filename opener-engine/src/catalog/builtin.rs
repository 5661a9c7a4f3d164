//! Opener definitions shipped with the library
//!
//! Order here is the catalog load order for builtin openers, which decides
//! what `default_for` returns for a job.

use super::definition::parse_definition;
use crate::types::{Opener, Result};

const BUILTIN: &[(&str, &str)] = &[
    ("war-standard.json", include_str!("../../openers/war-standard.json")),
    ("war-savage-m4s.json", include_str!("../../openers/war-savage-m4s.json")),
    ("drk-standard.json", include_str!("../../openers/drk-standard.json")),
];

/// Parse every builtin definition
///
/// A builtin that fails to parse is a packaging bug, so it is an error
/// rather than a skipped file.
pub fn builtin_openers() -> Result<Vec<Opener>> {
    BUILTIN
        .iter()
        .map(|(name, json)| parse_definition(name, json))
        .collect()
}
