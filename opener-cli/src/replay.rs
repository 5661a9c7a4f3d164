//! Recorded session replay
//!
//! A session file is JSON lines: each line is either a host event (tagged
//! with its event name), a `{"roster": [...]}` record that sets what the
//! replay host answers to roster requests from that point on, or a
//! `{"control": {...}}` record carrying a user command for the bridge.
//! Blank lines and lines starting with `#` are skipped.

use crate::bridge::BridgeCommand;
use crate::events::{Combatant, HostEvent, HostEventKind};
use crate::host::{EventSender, Host, RosterReceiver, Subscription};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Errors while loading a session recording
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("line {line}: {source}")]
    InvalidRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One line of a session recording
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SessionRecord {
    Roster { roster: Vec<Combatant> },
    Control { control: BridgeCommand },
    Event(HostEvent),
}

/// Parse one session line; `None` for blank and comment lines
pub fn parse_record(line: &str) -> Result<Option<SessionRecord>, serde_json::Error> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    serde_json::from_str(trimmed).map(Some)
}

/// Parse a session recording
pub fn read_session(reader: impl BufRead) -> Result<Vec<SessionRecord>, SessionError> {
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let record = parse_record(&line).map_err(|source| SessionError::InvalidRecord {
            line: index + 1,
            source,
        })?;
        records.extend(record);
    }
    Ok(records)
}

/// Read a session recording from disk
pub fn load_session(path: &Path) -> Result<Vec<SessionRecord>, SessionError> {
    let file = std::fs::File::open(path)?;
    read_session(std::io::BufReader::new(file))
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<HostEventKind, Vec<(u64, EventSender)>>,
    roster: Option<Vec<Combatant>>,
}

/// Host that delivers recorded events on demand
///
/// Roster requests are answered immediately with the last roster record
/// seen; before any roster record the request is dropped.
#[derive(Clone, Default)]
pub struct ReplayHost {
    registry: Arc<Mutex<Registry>>,
}

impl ReplayHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the roster returned by later requests
    pub fn set_roster(&self, roster: Vec<Combatant>) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.roster = Some(roster);
        }
    }

    /// Send an event to every subscriber of its kind
    ///
    /// Returns the number of subscribers reached.
    pub fn deliver(&self, event: HostEvent) -> usize {
        let Ok(mut registry) = self.registry.lock() else {
            return 0;
        };
        let Some(subscribers) = registry.subscribers.get_mut(&event.kind()) else {
            return 0;
        };
        subscribers.retain(|(_, tx)| !tx.is_closed());
        subscribers
            .iter()
            .filter(|(_, tx)| tx.send(event.clone()).is_ok())
            .count()
    }

    /// Apply one host-side session record
    ///
    /// Control records are not host input; they are handed back to the
    /// caller to apply to the bridge.
    pub fn play(&self, record: SessionRecord) -> Option<BridgeCommand> {
        match record {
            SessionRecord::Roster { roster } => self.set_roster(roster),
            SessionRecord::Control { control } => return Some(control),
            SessionRecord::Event(event) => {
                let reached = self.deliver(event);
                log::trace!("Session event delivered to {} subscribers", reached);
            }
        }
        None
    }

    /// Drop every subscriber so their feeds close
    pub fn close(&self) {
        if let Ok(mut registry) = self.registry.lock() {
            registry.subscribers.clear();
        }
    }

    /// Number of live subscriptions across all kinds
    pub fn subscriber_count(&self) -> usize {
        self.registry
            .lock()
            .map(|r| r.subscribers.values().map(Vec::len).sum())
            .unwrap_or(0)
    }
}

impl Host for ReplayHost {
    fn subscribe(&self, kind: HostEventKind, sender: EventSender) -> Option<Subscription> {
        let mut registry = self.registry.lock().ok()?;
        registry.next_id += 1;
        let id = registry.next_id;
        registry.subscribers.entry(kind).or_default().push((id, sender));

        let shared = Arc::clone(&self.registry);
        Some(Subscription::new(kind, move || {
            if let Ok(mut registry) = shared.lock() {
                if let Some(subscribers) = registry.subscribers.get_mut(&kind) {
                    subscribers.retain(|(sub_id, _)| *sub_id != id);
                }
            }
        }))
    }

    fn request_roster(&self) -> Option<RosterReceiver> {
        let registry = self.registry.lock().ok()?;
        let (tx, rx) = oneshot::channel();
        if let Some(roster) = &registry.roster {
            let _ = tx.send(roster.clone());
        }
        Some(rx)
    }
}
