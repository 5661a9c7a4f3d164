//! Published state
//!
//! The bridge is the only writer. Consumers (timeline rendering, audio cues)
//! hold a `watch::Receiver` and only ever see whole snapshots; the active
//! opener and its progress always change in the same publish.

use opener_engine::{Opener, OpenerProgress};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// The player whose log lines are tracked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedPlayer {
    pub id: String,
    pub name: String,
    /// Resolved job abbreviation, once known
    pub job: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub id: u32,
    pub name: Option<String>,
}

/// Everything rendering and audio consumers read
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedState {
    pub opener: Option<Arc<Opener>>,
    pub progress: Option<OpenerProgress>,
    pub in_combat: bool,
    pub encounter_title: Option<String>,
    pub zone: Option<ZoneInfo>,
    pub player: Option<TrackedPlayer>,
}

/// Write side of the published state
#[derive(Debug)]
pub struct StateSink {
    tx: watch::Sender<PublishedState>,
}

impl StateSink {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PublishedState::default());
        Self { tx }
    }

    /// New reader; sees the current value immediately
    pub fn subscribe(&self) -> watch::Receiver<PublishedState> {
        self.tx.subscribe()
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> PublishedState {
        self.tx.borrow().clone()
    }

    /// Replace opener and progress together
    pub fn publish_run(&self, opener: Option<Arc<Opener>>, progress: Option<OpenerProgress>) {
        self.tx.send_modify(|state| {
            state.opener = opener;
            state.progress = progress;
        });
    }

    pub fn publish_progress(&self, progress: OpenerProgress) {
        self.tx.send_modify(|state| state.progress = Some(progress));
    }

    pub fn publish_combat(&self, in_combat: bool, encounter_title: Option<String>) {
        self.tx.send_modify(|state| {
            state.in_combat = in_combat;
            state.encounter_title = encounter_title;
        });
    }

    pub fn publish_zone(&self, zone: ZoneInfo) {
        self.tx.send_modify(|state| state.zone = Some(zone));
    }

    pub fn publish_player(&self, player: Option<TrackedPlayer>) {
        self.tx.send_modify(|state| state.player = player);
    }
}

impl Default for StateSink {
    fn default() -> Self {
        Self::new()
    }
}
