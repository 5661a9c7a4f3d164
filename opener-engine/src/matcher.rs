//! Progression matcher
//!
//! Decides whether a detected ability is the next expected step of an
//! opener and computes the next progress value. Every operation is a pure
//! function of its arguments (plus the clock for `advance`); progress is
//! returned as a new value, never mutated in place.
//!
//! States:
//! - `NotStarted`: `current_index == 0`, no start time
//! - `InProgress`: `0 < current_index < len`
//! - `Complete`: `current_index == len`, terminal
//!
//! A mismatch never changes state. The sequence waits for the correct next
//! action or an explicit reset from the caller.

use crate::parser::normalize_ability_id;
use crate::types::{ActionDefinition, Opener, OpenerProgress, ProgressState, Timestamp};
use chrono::Utc;

/// Stateless progression matcher
pub struct ProgressionMatcher;

impl ProgressionMatcher {
    /// True if `ability_id` is the action expected at the progress cursor
    ///
    /// Always false once complete, and for progress that belongs to a
    /// different opener.
    pub fn matches(opener: &Opener, progress: &OpenerProgress, ability_id: &str) -> bool {
        if progress.is_complete || !progress.belongs_to(opener) {
            return false;
        }
        match opener.action(progress.current_index) {
            Some(expected) => {
                normalize_ability_id(ability_id) == normalize_ability_id(&expected.ability_id)
            }
            None => false,
        }
    }

    /// The action expected next, if any
    pub fn expected<'a>(opener: &'a Opener, progress: &OpenerProgress) -> Option<&'a ActionDefinition> {
        if progress.is_complete || !progress.belongs_to(opener) {
            return None;
        }
        opener.action(progress.current_index)
    }

    /// Advance past the current action, stamping the start time with now
    pub fn advance(opener: &Opener, progress: &OpenerProgress) -> OpenerProgress {
        Self::advance_at(opener, progress, Utc::now())
    }

    /// Advance past the current action with an explicit clock value
    ///
    /// Exactly one step per call. Returns `progress` unchanged when already
    /// complete, when the cursor is out of range, or when the progress
    /// belongs to another opener.
    pub fn advance_at(opener: &Opener, progress: &OpenerProgress, now: Timestamp) -> OpenerProgress {
        if progress.is_complete || !progress.belongs_to(opener) {
            return progress.clone();
        }
        let Some(action) = opener.action(progress.current_index) else {
            return progress.clone();
        };

        let mut completed_ids = progress.completed_ids.clone();
        completed_ids.push(action.id.clone());
        let current_index = progress.current_index + 1;

        OpenerProgress {
            opener_id: progress.opener_id.clone(),
            current_index,
            completed_ids,
            missed_ids: progress.missed_ids.clone(),
            is_complete: current_index == opener.len(),
            start_time: progress.start_time.or(Some(now)),
        }
    }

    /// Flag the current action as missed without moving the cursor
    ///
    /// The matcher never infers a miss on its own; callers decide when to
    /// invoke this. No-op when complete or out of range.
    pub fn mark_missed(opener: &Opener, progress: &OpenerProgress) -> OpenerProgress {
        let Some(action) = Self::expected(opener, progress) else {
            return progress.clone();
        };

        let mut next = progress.clone();
        next.missed_ids.push(action.id.clone());
        next
    }

    /// Fresh progress for `opener`
    pub fn reset(opener: &Opener) -> OpenerProgress {
        OpenerProgress::new(opener.id.clone())
    }

    /// Coarse state of `progress`
    pub fn state(opener: &Opener, progress: &OpenerProgress) -> ProgressState {
        if progress.is_complete || progress.current_index >= opener.len() {
            ProgressState::Complete
        } else if progress.current_index == 0 && progress.start_time.is_none() {
            ProgressState::NotStarted
        } else {
            ProgressState::InProgress
        }
    }
}
