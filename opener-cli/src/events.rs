//! Host events
//!
//! The event surface the host automation plugin delivers. Event names match
//! the host's subscription names and are also the `type` tag used in
//! recorded session files.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Subscription names offered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostEventKind {
    PlayerChanged,
    ZoneChanged,
    CombatStateChanged,
    PartyChanged,
    LogLine,
}

impl HostEventKind {
    /// Every kind the bridge subscribes to
    pub const ALL: [HostEventKind; 5] = [
        HostEventKind::PlayerChanged,
        HostEventKind::ZoneChanged,
        HostEventKind::CombatStateChanged,
        HostEventKind::PartyChanged,
        HostEventKind::LogLine,
    ];

    /// Host-side event name
    pub fn name(&self) -> &'static str {
        match self {
            HostEventKind::PlayerChanged => "player-changed",
            HostEventKind::ZoneChanged => "zone-changed",
            HostEventKind::CombatStateChanged => "combat-state-changed",
            HostEventKind::PartyChanged => "party-changed",
            HostEventKind::LogLine => "log-line",
        }
    }
}

impl fmt::Display for HostEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One entry of the host's combatant roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    /// Hex combatant id, as it appears in log lines
    pub id: String,
    pub name: String,
    /// Numeric job code
    pub job: u32,
}

/// An event delivered by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostEvent {
    /// The primary player changed; the job may or may not be included
    PlayerChanged {
        id: String,
        name: String,
        #[serde(default)]
        job: Option<u32>,
    },
    ZoneChanged {
        zone_id: u32,
        #[serde(default)]
        zone_name: Option<String>,
    },
    CombatStateChanged {
        in_combat: bool,
        #[serde(default)]
        encounter_title: Option<String>,
    },
    /// Party roster with jobs
    PartyChanged { party: Vec<Combatant> },
    /// One raw log record, already split into fields
    LogLine { fields: Vec<String> },
}

impl HostEvent {
    /// The subscription this event is delivered through
    pub fn kind(&self) -> HostEventKind {
        match self {
            HostEvent::PlayerChanged { .. } => HostEventKind::PlayerChanged,
            HostEvent::ZoneChanged { .. } => HostEventKind::ZoneChanged,
            HostEvent::CombatStateChanged { .. } => HostEventKind::CombatStateChanged,
            HostEvent::PartyChanged { .. } => HostEventKind::PartyChanged,
            HostEvent::LogLine { .. } => HostEventKind::LogLine,
        }
    }

    /// Convenience constructor for a `|`-separated raw log line
    pub fn log_line(raw: &str) -> Self {
        HostEvent::LogLine {
            fields: raw.split('|').map(str::to_string).collect(),
        }
    }
}
