//! Log line parser
//!
//! Turns one host log record (an ordered list of text fields) into a
//! [`DetectedAction`]. Anything that is not an ability-usage record is a
//! normal "not for us" outcome and yields `None`.
//!
//! Field layout:
//!
//! | index | field                          |
//! |-------|--------------------------------|
//! | 0     | record type code               |
//! | 1     | timestamp                      |
//! | 2     | source id                      |
//! | 3     | source name                    |
//! | 4     | ability id (hex, maybe `0x`)   |
//! | 5     | ability name                   |
//! | 6     | target id (optional)           |
//! | 7     | target name (optional)         |

use crate::types::DetectedAction;

/// Record type code for single-target ability usage
pub const SINGLE_ABILITY_CODE: &str = "21";

/// Record type code for area ability usage (one line per target hit)
pub const AREA_ABILITY_CODE: &str = "22";

/// Minimum number of fields for an ability line
pub const MIN_FIELDS: usize = 6;

/// Field separator used by raw host log lines
pub const FIELD_SEPARATOR: char = '|';

/// Stateless log line parser
pub struct LogLineParser;

impl LogLineParser {
    /// Parse one tokenized log record
    ///
    /// # Returns
    /// * `Some(DetectedAction)` for ability-usage records
    /// * `None` for short lines and any other record type
    pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Option<DetectedAction> {
        if tokens.len() < MIN_FIELDS {
            return None;
        }

        let record_type = tokens[0].as_ref();
        if record_type != SINGLE_ABILITY_CODE && record_type != AREA_ABILITY_CODE {
            log::trace!("Ignoring record type {}", record_type);
            return None;
        }

        let field = |index: usize| tokens.get(index).map(|t| t.as_ref().to_string());

        Some(DetectedAction {
            record_type: record_type.to_string(),
            timestamp: tokens[1].as_ref().to_string(),
            source_id: tokens[2].as_ref().to_string(),
            source_name: tokens[3].as_ref().to_string(),
            ability_id: normalize_ability_id(tokens[4].as_ref()),
            ability_name: tokens[5].as_ref().to_string(),
            target_id: field(6),
            target_name: field(7),
        })
    }

    /// Split a raw `|`-separated line and parse it
    pub fn parse_line(raw: &str) -> Option<DetectedAction> {
        let tokens: Vec<&str> = raw.trim_end_matches(['\r', '\n']).split(FIELD_SEPARATOR).collect();
        Self::parse(&tokens)
    }
}

/// Normalize an ability id to canonical form
///
/// Strips a leading `0x`/`0X` marker, uppercases, and left-pads with `0` to
/// at least four characters. Total and idempotent; `""` becomes `"0000"`.
pub fn normalize_ability_id(raw: &str) -> String {
    // Padding can expose a new marker ("x12" -> "0X12"), so settle on a fixed point.
    let mut current = normalize_step(raw);
    loop {
        let next = normalize_step(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_step(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    format!("{:0>4}", digits.to_uppercase())
}
