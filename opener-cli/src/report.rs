//! Report generation
//!
//! Plain-text output for the CLI: catalog listings, opener sequences,
//! live status lines and the end-of-replay progress report.

use crate::bridge::LineOutcome;
use crate::state::PublishedState;
use chrono::{DateTime, Utc};
use opener_engine::{ActionKind, Opener, OpenerCatalog, ProgressionMatcher};
use std::fmt::Write;

/// Counts of log line outcomes seen during a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayTally {
    pub lines: usize,
    pub ignored: usize,
    pub other_source: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub duplicates: usize,
}

impl ReplayTally {
    pub fn record(&mut self, outcome: &LineOutcome) {
        self.lines += 1;
        match outcome {
            LineOutcome::NotAbility | LineOutcome::NoOpener | LineOutcome::AlreadyComplete => {
                self.ignored += 1
            }
            LineOutcome::OtherSource => self.other_source += 1,
            LineOutcome::Duplicate => self.duplicates += 1,
            LineOutcome::Matched { .. } => self.matched += 1,
            LineOutcome::Mismatch { .. } => self.mismatched += 1,
        }
    }
}

/// One line per opener, grouped by job
pub fn catalog_listing(catalog: &OpenerCatalog, job: Option<&str>) -> String {
    let mut out = String::new();
    for (code, openers) in catalog.as_map() {
        if job.map(|j| !j.eq_ignore_ascii_case(code)).unwrap_or(false) {
            continue;
        }
        let _ = writeln!(out, "{}", code);
        for opener in openers {
            let zone = opener
                .zone_id
                .map(|z| format!("  [zone {}]", z))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {:<20} {} (v{}, {} actions, {} GCDs){}",
                opener.id,
                opener.name,
                opener.version,
                opener.len(),
                opener.gcd_count(),
                zone
            );
        }
    }
    out
}

/// The full action sequence of an opener
pub fn opener_sequence(opener: &Opener) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} ({}, {}, v{})", opener.name, opener.id, opener.job, opener.version);
    if let Some(encounter) = &opener.encounter_name {
        let _ = writeln!(out, "Encounter: {}", encounter);
    }
    if let Some(notes) = &opener.notes {
        let _ = writeln!(out, "Notes: {}", notes);
    }
    let _ = writeln!(out);

    for (index, action) in opener.sequence.iter().enumerate() {
        let slot = match (action.kind, action.weave_slot) {
            (ActionKind::Ogcd, Some(weave)) => format!("{}.{}", action.position, weave),
            _ => format!("{}", action.position),
        };
        let delay = action
            .delay_ms
            .map(|d| format!("  {:+}ms", d))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>3}. {:<5} {:<6} {:<28} {}{}",
            index + 1,
            slot,
            action.kind.to_string(),
            action.name,
            action.ability_id,
            delay
        );
    }
    out
}

/// One-line progress summary for live output
///
/// Elapsed time is measured from the first matched action to `now`.
pub fn status_line(state: &PublishedState, now: DateTime<Utc>) -> String {
    let (Some(opener), Some(progress)) = (&state.opener, &state.progress) else {
        return "no active opener".to_string();
    };

    let mut line = format!(
        "[{}] {}: {}/{}",
        opener.job,
        opener.name,
        progress.current_index,
        opener.len()
    );
    match opener.action(progress.current_index) {
        Some(next) if !progress.is_complete => {
            let _ = write!(line, ", next {}", next.name);
        }
        _ => line.push_str(", complete"),
    }
    if !progress.missed_ids.is_empty() {
        let _ = write!(line, ", {} missed", progress.missed_ids.len());
    }
    if let Some(start) = progress.start_time {
        let elapsed = now.signed_duration_since(start);
        let _ = write!(line, " (+{:.1}s)", elapsed.num_milliseconds() as f64 / 1000.0);
    }
    line
}

/// End-of-replay progress report
pub fn progress_report(state: &PublishedState, tally: &ReplayTally) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "═══════════════════════════════════════════════");
    let _ = writeln!(out, "  Opener Progress Report");
    let _ = writeln!(out, "═══════════════════════════════════════════════\n");

    if let Some(player) = &state.player {
        let _ = writeln!(
            out,
            "Player:    {} ({})",
            player.name,
            player.job.as_deref().unwrap_or("job unknown")
        );
    }
    if let Some(zone) = &state.zone {
        let _ = writeln!(out, "Zone:      {} {}", zone.id, zone.name.as_deref().unwrap_or(""));
    }
    if let Some(title) = &state.encounter_title {
        let _ = writeln!(out, "Encounter: {}", title);
    }

    let _ = writeln!(
        out,
        "\nLog lines: {} ({} matched, {} mismatched, {} duplicates, {} other players, {} ignored)",
        tally.lines, tally.matched, tally.mismatched, tally.duplicates, tally.other_source, tally.ignored
    );

    let (Some(opener), Some(progress)) = (&state.opener, &state.progress) else {
        let _ = writeln!(out, "\nNo active opener.");
        return out;
    };

    let _ = writeln!(
        out,
        "\nOpener:    {} ({})\nState:     {} ({}/{} actions)",
        opener.name,
        opener.id,
        ProgressionMatcher::state(opener, progress),
        progress.current_index,
        opener.len()
    );
    if let Some(start) = progress.start_time {
        let _ = writeln!(out, "Started:   {}", start.to_rfc3339());
    }

    let _ = writeln!(out);
    for (index, action) in opener.sequence.iter().enumerate() {
        let mark = if index < progress.current_index {
            "✓"
        } else if progress.missed_ids.contains(&action.id) {
            "✗"
        } else if index == progress.current_index {
            "→"
        } else {
            " "
        };
        let _ = writeln!(out, "  {} {:<28} {}", mark, action.name, action.id);
    }
    out
}
