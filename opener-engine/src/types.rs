//! Core types for the opener engine
//!
//! This module defines the data shapes shared by the parser, the catalog and
//! the matcher. Openers and their actions are immutable once loaded; progress
//! is a value that is replaced, never mutated in place, on every transition.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type used for progress bookkeeping
pub type Timestamp = DateTime<Utc>;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while loading opener definitions
///
/// Nothing on the event path produces these: non-ability lines, catalog
/// misses and mismatches are reported through `Option`/`bool` instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to parse opener definition {source_name}: {message}")]
    DefinitionParseError { source_name: String, message: String },

    #[error("Invalid opener '{opener_id}': {reason}")]
    InvalidOpener { opener_id: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Kind of step inside an opener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Global-cooldown ability
    Gcd,
    /// Off-global-cooldown ability weaved between GCDs
    Ogcd,
    /// Potion (item use)
    Potion,
    /// Sprint
    Sprint,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Gcd => write!(f, "gcd"),
            ActionKind::Ogcd => write!(f, "ogcd"),
            ActionKind::Potion => write!(f, "potion"),
            ActionKind::Sprint => write!(f, "sprint"),
        }
    }
}

/// A single step of an opener
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    /// Step id, unique within the opener
    pub id: String,
    /// Display name
    pub name: String,
    pub kind: ActionKind,
    /// 1-indexed GCD slot this step belongs to
    pub position: u32,
    /// Which oGCD window inside the GCD slot (oGCD only)
    pub weave_slot: Option<u8>,
    /// Canonical ability id, normalized hex
    pub ability_id: String,
    pub icon_ref: String,
    pub audio_ref: Option<String>,
    /// Offset from the nominal pull time; negative means pre-pull
    pub delay_ms: Option<i64>,
}

impl ActionDefinition {
    /// True if this step happens before the pull
    pub fn is_prepull(&self) -> bool {
        self.delay_ms.map(|d| d < 0).unwrap_or(false)
    }
}

/// An immutable, ordered plan of abilities for one job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Opener {
    pub id: String,
    /// Job code, stored uppercase (e.g. "WAR")
    pub job: String,
    pub name: String,
    pub version: String,
    pub zone_id: Option<u32>,
    pub encounter_name: Option<String>,
    /// Informational flag for the audio cue player
    pub audio_enabled: bool,
    pub notes: Option<String>,
    pub source: Option<String>,
    /// Steps in authoritative execution order
    pub sequence: Vec<ActionDefinition>,
}

impl Opener {
    /// Number of steps in the sequence
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Step at `index`, if in range
    pub fn action(&self, index: usize) -> Option<&ActionDefinition> {
        self.sequence.get(index)
    }

    /// Number of distinct GCD slots covered by the sequence
    pub fn gcd_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for action in &self.sequence {
            if last != Some(action.position) {
                count += 1;
                last = Some(action.position);
            }
        }
        count
    }
}

/// Per-session progress through one opener
///
/// `completed_ids` is always a prefix of the opener's action ids and its
/// length equals `current_index`. A new value is produced on every
/// transition; readers only ever see snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenerProgress {
    /// Id of the opener this progress belongs to
    pub opener_id: String,
    pub current_index: usize,
    pub completed_ids: Vec<String>,
    pub missed_ids: Vec<String>,
    pub is_complete: bool,
    /// Set on the first successful match, then fixed
    pub start_time: Option<Timestamp>,
}

impl OpenerProgress {
    /// Canonical initial state for `opener_id`
    pub fn new(opener_id: impl Into<String>) -> Self {
        Self {
            opener_id: opener_id.into(),
            current_index: 0,
            completed_ids: Vec::new(),
            missed_ids: Vec::new(),
            is_complete: false,
            start_time: None,
        }
    }

    /// True if this progress was created for `opener`
    pub fn belongs_to(&self, opener: &Opener) -> bool {
        self.opener_id == opener.id
    }
}

/// Coarse state of an opener run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressState {
    NotStarted,
    InProgress,
    Complete,
}

impl fmt::Display for ProgressState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressState::NotStarted => write!(f, "not started"),
            ProgressState::InProgress => write!(f, "in progress"),
            ProgressState::Complete => write!(f, "complete"),
        }
    }
}

/// An ability usage extracted from one log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedAction {
    /// Record type code the line was recognized by
    pub record_type: String,
    /// Raw timestamp field as written by the host
    pub timestamp: String,
    pub source_id: String,
    pub source_name: String,
    /// Normalized ability id
    pub ability_id: String,
    pub ability_name: String,
    pub target_id: Option<String>,
    pub target_name: Option<String>,
}

impl DetectedAction {
    /// True if the line was an area-of-effect record (one line per target)
    pub fn is_area(&self) -> bool {
        self.record_type == crate::parser::AREA_ABILITY_CODE
    }

    /// Parse the raw timestamp as RFC 3339
    pub fn parsed_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}
