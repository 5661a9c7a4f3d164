//! Event bridge
//!
//! The only stateful, I/O-facing part of the coach. Subscribes to the host
//! event feed, resolves the active opener when the player's job or zone
//! changes, and runs log lines through the parser and matcher, publishing
//! every new progress value to the state sink.
//!
//! Events are handled one at a time in delivery order. The only suspending
//! operation is the roster fetch, which runs as a separate task and reports
//! back through a channel; replies are tagged with a generation number and
//! discarded if a newer resolution happened in the meantime.

use crate::config::{BridgeConfig, DuplicatePolicy};
use crate::events::{Combatant, HostEvent, HostEventKind};
use crate::host::{Host, RosterReceiver, Subscription};
use crate::state::{PublishedState, StateSink, TrackedPlayer, ZoneInfo};
use opener_engine::{
    job_name, DetectedAction, LogLineParser, Opener, OpenerCatalog, OpenerProgress,
    ProgressionMatcher,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, watch};

/// What happened to one log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Not an ability-usage record
    NotAbility,
    /// Ability used by someone other than the tracked player
    OtherSource,
    /// No opener is active for the current job
    NoOpener,
    AlreadyComplete,
    /// Same line as the one that produced the last advance
    Duplicate,
    Matched {
        action_id: String,
        index: usize,
        complete: bool,
    },
    /// Wrong ability for the current step; progress is unchanged
    Mismatch { expected: String, detected: String },
}

/// Caller-side commands, e.g. from a UI button or a recorded session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum BridgeCommand {
    /// Start the active opener over
    Reset,
    /// Activate a specific catalog opener
    Select { opener: String },
}

/// Roster reply delivered back to the bridge
#[derive(Debug)]
struct RosterResult {
    generation: u64,
    /// `None` when the request failed or timed out
    roster: Option<Vec<Combatant>>,
}

/// Identity of the log line that produced the last advance
#[derive(Debug, Clone, PartialEq, Eq)]
struct LineKey {
    timestamp: String,
    source_id: String,
    ability_id: String,
}

impl From<&DetectedAction> for LineKey {
    fn from(action: &DetectedAction) -> Self {
        Self {
            timestamp: action.timestamp.clone(),
            source_id: action.source_id.clone(),
            ability_id: action.ability_id.clone(),
        }
    }
}

/// The active opener and its progress, always replaced together
#[derive(Debug, Clone)]
struct ActiveRun {
    opener: Arc<Opener>,
    progress: OpenerProgress,
}

pub struct EventBridge {
    host: Arc<dyn Host>,
    catalog: Arc<OpenerCatalog>,
    config: BridgeConfig,
    state: StateSink,
    subscriptions: Vec<Subscription>,
    player: Option<TrackedPlayer>,
    zone: Option<ZoneInfo>,
    active: Option<ActiveRun>,
    last_advance: Option<LineKey>,
    roster_generation: u64,
    roster_tx: mpsc::UnboundedSender<RosterResult>,
    roster_rx: mpsc::UnboundedReceiver<RosterResult>,
}

impl EventBridge {
    pub fn new(host: Arc<dyn Host>, catalog: Arc<OpenerCatalog>, config: BridgeConfig) -> Self {
        let (roster_tx, roster_rx) = mpsc::unbounded_channel();
        Self {
            host,
            catalog,
            config,
            state: StateSink::new(),
            subscriptions: Vec::new(),
            player: None,
            zone: None,
            active: None,
            last_advance: None,
            roster_generation: 0,
            roster_tx,
            roster_rx,
        }
    }

    /// Reader handle for the published state
    pub fn subscribe_state(&self) -> watch::Receiver<PublishedState> {
        self.state.subscribe()
    }

    /// Copy of the current published state
    pub fn snapshot(&self) -> PublishedState {
        self.state.snapshot()
    }

    /// Number of live host subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.iter().filter(|s| s.is_active()).count()
    }

    /// Subscribe to every host event kind
    ///
    /// Returns the receiving end of the event feed. With no host available
    /// the receiver simply never yields anything and the bridge works
    /// standalone through direct `handle_*` calls.
    pub fn start(&mut self) -> mpsc::UnboundedReceiver<HostEvent> {
        self.shutdown();

        let (tx, rx) = mpsc::unbounded_channel();
        for kind in HostEventKind::ALL {
            match self.host.subscribe(kind, tx.clone()) {
                Some(subscription) => self.subscriptions.push(subscription),
                None => log::warn!("Host unavailable, not subscribed to {}", kind),
            }
        }
        log::info!("Event bridge started with {} subscriptions", self.subscriptions.len());
        rx
    }

    /// Release every host subscription
    ///
    /// Safe to call any number of times, before or after `start`.
    pub fn shutdown(&mut self) {
        if self.subscriptions.is_empty() {
            return;
        }
        for mut subscription in self.subscriptions.drain(..) {
            log::debug!("Cancelling {} subscription", subscription.kind());
            subscription.cancel();
        }
        log::info!("Event bridge subscriptions released");
    }

    /// Process events until the feed closes
    ///
    /// `on_line` sees the outcome of every log line handled.
    pub async fn run<F>(&mut self, mut events: mpsc::UnboundedReceiver<HostEvent>, mut on_line: F)
    where
        F: FnMut(&LineOutcome),
    {
        loop {
            tokio::select! {
                biased;
                Some(result) = self.roster_rx.recv() => self.apply_roster(result),
                event = events.recv() => match event {
                    Some(event) => {
                        if let Some(outcome) = self.handle_event(event) {
                            log::trace!("Log line outcome: {:?}", outcome);
                            on_line(&outcome);
                        }
                    }
                    None => break,
                },
            }
        }
        log::debug!("Host event feed closed");
    }

    /// Process whatever is ready right now without waiting
    ///
    /// Returns the outcomes of the log lines handled.
    pub fn pump(&mut self, events: &mut mpsc::UnboundedReceiver<HostEvent>) -> Vec<LineOutcome> {
        let mut outcomes = Vec::new();
        loop {
            while let Ok(result) = self.roster_rx.try_recv() {
                self.apply_roster(result);
            }
            match events.try_recv() {
                Ok(event) => outcomes.extend(self.handle_event(event)),
                Err(_) => break,
            }
        }
        outcomes
    }

    /// Dispatch one host event
    pub fn handle_event(&mut self, event: HostEvent) -> Option<LineOutcome> {
        match event {
            HostEvent::PlayerChanged { id, name, job } => {
                self.handle_player_changed(id, name, job);
                None
            }
            HostEvent::ZoneChanged { zone_id, zone_name } => {
                self.handle_zone_changed(zone_id, zone_name);
                None
            }
            HostEvent::CombatStateChanged {
                in_combat,
                encounter_title,
            } => {
                self.handle_combat_state(in_combat, encounter_title);
                None
            }
            HostEvent::PartyChanged { party } => {
                self.handle_party_changed(&party);
                None
            }
            HostEvent::LogLine { fields } => Some(self.handle_log_line(&fields)),
        }
    }

    pub fn handle_player_changed(&mut self, id: String, name: String, job: Option<u32>) {
        let same_player = self.player.as_ref().map(|p| p.id == id).unwrap_or(false);
        let known_job = if same_player {
            self.player.as_ref().and_then(|p| p.job.clone())
        } else {
            None
        };

        log::info!("Tracking player {} ({})", name, id);
        self.player = Some(TrackedPlayer { id, name, job: known_job });
        self.state.publish_player(self.player.clone());

        match job {
            Some(code) => self.resolve_job(code),
            None => self.refresh_job(),
        }
    }

    pub fn handle_party_changed(&mut self, party: &[Combatant]) {
        if let Some(member) = self.find_player(party) {
            self.resolve_job(member.job);
        }
    }

    pub fn handle_zone_changed(&mut self, zone_id: u32, zone_name: Option<String>) {
        log::info!("Zone changed to {} ({})", zone_id, zone_name.as_deref().unwrap_or("unknown"));
        let zone = ZoneInfo { id: zone_id, name: zone_name };
        self.zone = Some(zone.clone());
        self.state.publish_zone(zone);

        // Job updates can be missed across zone loads; confirm it again
        if self.player.is_some() {
            self.refresh_job();
        }
    }

    pub fn handle_combat_state(&mut self, in_combat: bool, encounter_title: Option<String>) {
        log::debug!("Combat state: in_combat={} encounter={:?}", in_combat, encounter_title);
        self.state.publish_combat(in_combat, encounter_title);
    }

    /// Run one log record through the parser and matcher
    pub fn handle_log_line<S: AsRef<str>>(&mut self, fields: &[S]) -> LineOutcome {
        let Some(action) = LogLineParser::parse(fields) else {
            return LineOutcome::NotAbility;
        };

        let tracked = self
            .player
            .as_ref()
            .map(|p| p.name == action.source_name)
            .unwrap_or(false);
        if !tracked {
            return LineOutcome::OtherSource;
        }

        let Some(run) = self.active.as_mut() else {
            return LineOutcome::NoOpener;
        };
        if run.progress.is_complete {
            return LineOutcome::AlreadyComplete;
        }

        let key = LineKey::from(&action);
        if self.config.duplicate_policy == DuplicatePolicy::SameTimestamp
            && self.last_advance.as_ref() == Some(&key)
        {
            log::trace!("Duplicate line for {} ignored", action.ability_name);
            return LineOutcome::Duplicate;
        }

        if ProgressionMatcher::matches(&run.opener, &run.progress, &action.ability_id) {
            let index = run.progress.current_index;
            let next = ProgressionMatcher::advance(&run.opener, &run.progress);
            let action_id = next.completed_ids.last().cloned().unwrap_or_default();
            let complete = next.is_complete;

            log::debug!(
                "Step {}/{} done: {} ({})",
                next.current_index,
                run.opener.len(),
                action_id,
                action.ability_name
            );
            if complete {
                log::info!("Opener '{}' complete", run.opener.name);
            }

            run.progress = next.clone();
            self.last_advance = Some(key);
            self.state.publish_progress(next);

            return LineOutcome::Matched {
                action_id,
                index,
                complete,
            };
        }

        let expected = ProgressionMatcher::expected(&run.opener, &run.progress)
            .map(|a| a.id.clone())
            .unwrap_or_default();
        log::debug!(
            "Expected {} but {} used {} ({})",
            expected,
            action.source_name,
            action.ability_name,
            action.ability_id
        );

        if self.config.mark_missed_on_mismatch && !run.progress.missed_ids.contains(&expected) {
            let next = ProgressionMatcher::mark_missed(&run.opener, &run.progress);
            run.progress = next.clone();
            self.state.publish_progress(next);
        }

        LineOutcome::Mismatch {
            expected,
            detected: action.ability_id,
        }
    }

    /// Apply a caller-side command
    pub fn apply_command(&mut self, command: &BridgeCommand) {
        match command {
            BridgeCommand::Reset => self.reset(),
            BridgeCommand::Select { opener } => {
                self.select_opener(opener);
            }
        }
    }

    /// Start the active opener over
    pub fn reset(&mut self) {
        if let Some(run) = self.active.as_mut() {
            log::info!("Resetting opener '{}'", run.opener.name);
            run.progress = self.catalog.create_progress(&run.opener);
            self.last_advance = None;
            self.state.publish_progress(run.progress.clone());
        }
    }

    /// Activate a catalog opener by id; false if the id is unknown
    pub fn select_opener(&mut self, opener_id: &str) -> bool {
        match self.catalog.by_id(opener_id).cloned() {
            Some(opener) => {
                self.activate(Some(opener));
                true
            }
            None => {
                log::warn!("Unknown opener id '{}'", opener_id);
                false
            }
        }
    }

    /// Resolve a numeric job code and switch openers if needed
    fn resolve_job(&mut self, code: u32) {
        // Direct job information supersedes any roster reply still in flight
        self.roster_generation += 1;

        let Some(job) = job_name(code) else {
            log::warn!("Unknown job code {}, no opener", code);
            if let Some(player) = self.player.as_mut() {
                if player.job.take().is_some() {
                    self.state.publish_player(self.player.clone());
                }
            }
            self.activate(None);
            return;
        };

        if let Some(player) = self.player.as_mut() {
            if player.job.as_deref() != Some(job) {
                log::info!("Player job is {}", job);
                player.job = Some(job.to_string());
                self.state.publish_player(self.player.clone());
            }
        }

        let selected = self.select_for_job(job);
        if selected.is_none() {
            log::info!("No opener defined for {}", job);
        }
        self.activate(selected);
    }

    /// Re-resolve the current job, asking the host for the roster when possible
    fn refresh_job(&mut self) {
        if self.request_roster() {
            return;
        }
        // No host: fall back to what we already know
        let known = self.player.as_ref().and_then(|p| p.job.clone());
        if let Some(job) = known {
            let selected = self.select_for_job(&job);
            self.activate(selected);
        }
    }

    fn select_for_job(&self, job: &str) -> Option<Arc<Opener>> {
        if self.config.prefer_zone_openers {
            if let Some(zone) = &self.zone {
                if let Some(&opener) = self.catalog.for_zone(job, zone.id).first() {
                    return Some(Arc::clone(opener));
                }
            }
        }
        self.catalog.default_for(job).cloned()
    }

    /// Replace the active run if `opener` differs from the current one
    fn activate(&mut self, opener: Option<Arc<Opener>>) {
        let current = self.active.as_ref().map(|run| run.opener.id.as_str());
        let next = opener.as_ref().map(|o| o.id.as_str());
        if current == next {
            return;
        }

        self.active = opener.map(|opener| {
            log::info!("Active opener: {} ({})", opener.name, opener.id);
            ActiveRun {
                progress: self.catalog.create_progress(&opener),
                opener,
            }
        });
        self.last_advance = None;

        let (opener, progress) = match &self.active {
            Some(run) => (Some(Arc::clone(&run.opener)), Some(run.progress.clone())),
            None => (None, None),
        };
        self.state.publish_run(opener, progress);
    }

    /// Ask the host for the roster; false if the host is unavailable
    fn request_roster(&mut self) -> bool {
        let Some(mut receiver) = self.host.request_roster() else {
            log::debug!("Roster unavailable from host");
            return false;
        };

        self.roster_generation += 1;
        let generation = self.roster_generation;

        match receiver.try_recv() {
            Ok(roster) => self.apply_roster(RosterResult {
                generation,
                roster: Some(roster),
            }),
            Err(TryRecvError::Closed) => self.apply_roster(RosterResult {
                generation,
                roster: None,
            }),
            Err(TryRecvError::Empty) => self.spawn_roster_wait(generation, receiver),
        }
        true
    }

    fn spawn_roster_wait(&self, generation: u64, receiver: RosterReceiver) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::warn!("No async runtime, dropping roster request");
            return;
        };

        let tx = self.roster_tx.clone();
        let timeout = self.config.roster_timeout();
        runtime.spawn(async move {
            let roster = match tokio::time::timeout(timeout, receiver).await {
                Ok(Ok(roster)) => Some(roster),
                Ok(Err(_)) => {
                    log::warn!("Host dropped the roster request");
                    None
                }
                Err(_) => {
                    log::warn!("Roster request timed out after {:?}", timeout);
                    None
                }
            };
            let _ = tx.send(RosterResult { generation, roster });
        });
    }

    fn apply_roster(&mut self, result: RosterResult) {
        if result.generation != self.roster_generation {
            log::debug!(
                "Discarding stale roster reply ({} < {})",
                result.generation,
                self.roster_generation
            );
            return;
        }

        let member = result
            .roster
            .as_deref()
            .and_then(|roster| self.find_player(roster))
            .map(|member| member.job);

        match member {
            Some(code) => self.resolve_job(code),
            None => {
                let known = self.player.as_ref().and_then(|p| p.job.clone());
                if let Some(job) = known {
                    let selected = self.select_for_job(&job);
                    self.activate(selected);
                }
            }
        }
    }

    /// The tracked player's entry in a roster, by id then by name
    fn find_player<'a>(&self, roster: &'a [Combatant]) -> Option<&'a Combatant> {
        let player = self.player.as_ref()?;
        roster
            .iter()
            .find(|c| !player.id.is_empty() && c.id.eq_ignore_ascii_case(&player.id))
            .or_else(|| roster.iter().find(|c| c.name == player.name))
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EventSender, NullHost};
    use opener_engine::catalog::parse_definition;
    use opener_engine::CatalogConfig;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    const PLAYER_ID: &str = "1039A1B2";
    const PLAYER: &str = "Kaia Stone";
    const WAR: u32 = 21;
    const DRK: u32 = 32;
    const BLU: u32 = 36;

    /// Host whose roster replies are answered by hand
    #[derive(Default)]
    struct ManualHost {
        subscribed: Mutex<Vec<HostEventKind>>,
        pending: Mutex<Vec<oneshot::Sender<Vec<Combatant>>>>,
    }

    impl Host for ManualHost {
        fn subscribe(&self, kind: HostEventKind, _sender: EventSender) -> Option<Subscription> {
            self.subscribed.lock().unwrap().push(kind);
            Some(Subscription::new(kind, || {}))
        }

        fn request_roster(&self) -> Option<RosterReceiver> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push(tx);
            Some(rx)
        }
    }

    impl ManualHost {
        fn answer(&self, index: usize, job: u32) {
            let tx = self.pending.lock().unwrap().remove(index);
            let _ = tx.send(vec![Combatant {
                id: PLAYER_ID.to_string(),
                name: PLAYER.to_string(),
                job,
            }]);
        }
    }

    fn builtin() -> Arc<OpenerCatalog> {
        Arc::new(OpenerCatalog::load_all(&CatalogConfig::new()).unwrap())
    }

    fn null_bridge(config: BridgeConfig) -> EventBridge {
        EventBridge::new(Arc::new(NullHost), builtin(), config)
    }

    fn war_player(bridge: &mut EventBridge) {
        bridge.handle_player_changed(PLAYER_ID.to_string(), PLAYER.to_string(), Some(WAR));
    }

    fn ability(source: &str, ability_id: &str, timestamp: &str) -> Vec<String> {
        ["21", timestamp, PLAYER_ID, source, ability_id, "Ability", "40001234", "Dummy"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn progress(bridge: &EventBridge) -> OpenerProgress {
        bridge.snapshot().progress.unwrap()
    }

    #[test]
    fn test_job_resolution_activates_default_opener() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);

        let state = bridge.snapshot();
        assert_eq!(state.opener.unwrap().id, "war-standard");
        assert_eq!(state.progress.unwrap(), OpenerProgress::new("war-standard"));
        assert_eq!(state.player.unwrap().job.as_deref(), Some("WAR"));
    }

    #[test]
    fn test_job_without_openers_leaves_opener_unset() {
        let mut bridge = null_bridge(BridgeConfig::default());
        bridge.handle_player_changed(PLAYER_ID.to_string(), PLAYER.to_string(), Some(BLU));

        let state = bridge.snapshot();
        assert!(state.opener.is_none());
        assert!(state.progress.is_none());
        assert_eq!(bridge.handle_log_line(&ability(PLAYER, "002E", "t1")), LineOutcome::NoOpener);
    }

    #[test]
    fn test_unknown_job_code_has_no_opener() {
        let mut bridge = null_bridge(BridgeConfig::default());
        bridge.handle_player_changed(PLAYER_ID.to_string(), PLAYER.to_string(), Some(4242));
        assert!(bridge.snapshot().opener.is_none());
    }

    #[test]
    fn test_switch_to_unknown_job_clears_opener() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);
        bridge.handle_log_line(&ability(PLAYER, "002E", "t1"));

        bridge.handle_party_changed(&[Combatant {
            id: PLAYER_ID.to_string(),
            name: PLAYER.to_string(),
            job: 99,
        }]);

        let state = bridge.snapshot();
        assert!(state.opener.is_none());
        assert!(state.progress.is_none());
        assert_eq!(state.player.unwrap().job, None);
        assert_eq!(bridge.handle_log_line(&ability(PLAYER, "002E", "t2")), LineOutcome::NoOpener);
    }

    #[test]
    fn test_log_lines_advance_progress() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);

        let outcome = bridge.handle_log_line(&ability(PLAYER, "0x2E", "t1"));
        assert_eq!(
            outcome,
            LineOutcome::Matched {
                action_id: "tomahawk".to_string(),
                index: 0,
                complete: false,
            }
        );
        let after = progress(&bridge);
        assert_eq!(after.current_index, 1);
        assert!(after.start_time.is_some());

        assert!(matches!(
            bridge.handle_log_line(&ability(PLAYER, "34", "t2")),
            LineOutcome::Matched { index: 1, .. }
        ));
        assert_eq!(progress(&bridge).completed_ids, vec!["tomahawk", "infuriate-1"]);
    }

    #[test]
    fn test_other_sources_and_non_ability_lines_dropped() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);

        assert_eq!(bridge.handle_log_line(&ability("Someone Else", "002E", "t1")), LineOutcome::OtherSource);
        assert_eq!(bridge.handle_log_line(&ability("kaia stone", "002E", "t1")), LineOutcome::OtherSource);
        assert_eq!(bridge.handle_log_line(&["26", "t1", PLAYER_ID, PLAYER, "2E", "x"]), LineOutcome::NotAbility);
        assert_eq!(bridge.handle_log_line(&["21", "t1"]), LineOutcome::NotAbility);
        assert_eq!(progress(&bridge).current_index, 0);
    }

    #[test]
    fn test_lines_before_player_known_are_dropped() {
        let mut bridge = null_bridge(BridgeConfig::default());
        assert_eq!(bridge.handle_log_line(&ability(PLAYER, "002E", "t1")), LineOutcome::OtherSource);
    }

    #[test]
    fn test_mismatch_leaves_progress_untouched() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);
        let before = progress(&bridge);

        let outcome = bridge.handle_log_line(&ability(PLAYER, "1CDD", "t1"));
        assert_eq!(
            outcome,
            LineOutcome::Mismatch {
                expected: "tomahawk".to_string(),
                detected: "1CDD".to_string(),
            }
        );
        assert_eq!(progress(&bridge), before);
    }

    #[test]
    fn test_mark_missed_on_mismatch_flags_once() {
        let config = BridgeConfig {
            mark_missed_on_mismatch: true,
            ..BridgeConfig::default()
        };
        let mut bridge = null_bridge(config);
        war_player(&mut bridge);

        bridge.handle_log_line(&ability(PLAYER, "1CDD", "t1"));
        bridge.handle_log_line(&ability(PLAYER, "1CDB", "t2"));

        let after = progress(&bridge);
        assert_eq!(after.missed_ids, vec!["tomahawk"]);
        assert_eq!(after.current_index, 0);
    }

    fn repeat_catalog() -> Arc<OpenerCatalog> {
        let json = r#"{
            "id": "war-repeat", "job": "WAR", "name": "Repeat", "version": "1",
            "actions": [
                { "id": "fell-cleave-1", "name": "Fell Cleave", "type": "gcd", "position": 1, "actionId": "0DDD", "iconId": "002557" },
                { "id": "fell-cleave-2", "name": "Fell Cleave", "type": "gcd", "position": 2, "actionId": "0DDD", "iconId": "002557" },
                { "id": "upheaval", "name": "Upheaval", "type": "ogcd", "position": 2, "weaveSlot": 1, "actionId": "1CDB", "iconId": "002562" }
            ]
        }"#;
        Arc::new(OpenerCatalog::from_openers(vec![parse_definition("repeat.json", json).unwrap()]))
    }

    #[test]
    fn test_same_timestamp_duplicate_ignored() {
        let mut bridge = EventBridge::new(Arc::new(NullHost), repeat_catalog(), BridgeConfig::default());
        war_player(&mut bridge);

        assert!(matches!(bridge.handle_log_line(&ability(PLAYER, "0DDD", "t1")), LineOutcome::Matched { .. }));
        assert_eq!(bridge.handle_log_line(&ability(PLAYER, "0DDD", "t1")), LineOutcome::Duplicate);
        assert_eq!(progress(&bridge).current_index, 1);

        // A legitimate repeat carries a later timestamp
        assert!(matches!(bridge.handle_log_line(&ability(PLAYER, "0DDD", "t2")), LineOutcome::Matched { index: 1, .. }));
        assert_eq!(progress(&bridge).current_index, 2);
    }

    #[test]
    fn test_always_advance_policy_double_advances() {
        let config = BridgeConfig {
            duplicate_policy: DuplicatePolicy::AlwaysAdvance,
            ..BridgeConfig::default()
        };
        let mut bridge = EventBridge::new(Arc::new(NullHost), repeat_catalog(), config);
        war_player(&mut bridge);

        bridge.handle_log_line(&ability(PLAYER, "0DDD", "t1"));
        bridge.handle_log_line(&ability(PLAYER, "0DDD", "t1"));
        assert_eq!(progress(&bridge).current_index, 2);
    }

    #[test]
    fn test_completed_opener_ignores_further_lines() {
        let mut bridge = EventBridge::new(Arc::new(NullHost), repeat_catalog(), BridgeConfig::default());
        war_player(&mut bridge);

        bridge.handle_log_line(&ability(PLAYER, "0DDD", "t1"));
        bridge.handle_log_line(&ability(PLAYER, "0DDD", "t2"));
        assert!(matches!(
            bridge.handle_log_line(&ability(PLAYER, "1CDB", "t3")),
            LineOutcome::Matched { complete: true, .. }
        ));
        assert_eq!(bridge.handle_log_line(&ability(PLAYER, "1CDB", "t4")), LineOutcome::AlreadyComplete);
        assert!(progress(&bridge).is_complete);
    }

    #[test]
    fn test_same_opener_keeps_progress() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);
        bridge.handle_log_line(&ability(PLAYER, "002E", "t1"));

        // Zone change without a host re-confirms the known job
        bridge.handle_zone_changed(1232, Some("AAC Light-heavyweight M4 (Savage)".to_string()));
        war_player(&mut bridge);

        assert_eq!(progress(&bridge).current_index, 1);
        assert_eq!(bridge.snapshot().zone.unwrap().id, 1232);
    }

    #[test]
    fn test_job_switch_replaces_opener_and_progress() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);
        bridge.handle_log_line(&ability(PLAYER, "002E", "t1"));

        bridge.handle_party_changed(&[Combatant {
            id: PLAYER_ID.to_string(),
            name: PLAYER.to_string(),
            job: DRK,
        }]);

        let state = bridge.snapshot();
        assert_eq!(state.opener.unwrap().id, "drk-standard");
        assert_eq!(state.progress.unwrap(), OpenerProgress::new("drk-standard"));

        bridge.handle_party_changed(&[Combatant {
            id: PLAYER_ID.to_string(),
            name: PLAYER.to_string(),
            job: BLU,
        }]);
        let state = bridge.snapshot();
        assert!(state.opener.is_none());
        assert!(state.progress.is_none());
    }

    #[test]
    fn test_party_without_player_changes_nothing() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);
        bridge.handle_party_changed(&[Combatant {
            id: "10FFFFFF".to_string(),
            name: "Other".to_string(),
            job: DRK,
        }]);
        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-standard");
    }

    #[test]
    fn test_prefer_zone_openers() {
        let config = BridgeConfig {
            prefer_zone_openers: true,
            ..BridgeConfig::default()
        };
        let mut bridge = null_bridge(config);
        bridge.handle_zone_changed(1232, None);
        war_player(&mut bridge);
        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-m4s");

        bridge.handle_zone_changed(1, None);
        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-standard");
    }

    #[test]
    fn test_combat_state_published() {
        let mut bridge = null_bridge(BridgeConfig::default());
        bridge.handle_event(HostEvent::CombatStateChanged {
            in_combat: true,
            encounter_title: Some("Wicked Thunder".to_string()),
        });
        let state = bridge.snapshot();
        assert!(state.in_combat);
        assert_eq!(state.encounter_title.as_deref(), Some("Wicked Thunder"));
        assert!(state.opener.is_none());
    }

    #[test]
    fn test_reset_and_select_opener() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);
        bridge.handle_log_line(&ability(PLAYER, "002E", "t1"));

        bridge.reset();
        assert_eq!(progress(&bridge), OpenerProgress::new("war-standard"));
        // The same line may advance again after a reset
        assert!(matches!(bridge.handle_log_line(&ability(PLAYER, "002E", "t1")), LineOutcome::Matched { .. }));

        assert!(!bridge.select_opener("does-not-exist"));
        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-standard");

        assert!(bridge.select_opener("war-m4s"));
        assert_eq!(progress(&bridge), OpenerProgress::new("war-m4s"));
    }

    #[test]
    fn test_apply_command() {
        let mut bridge = null_bridge(BridgeConfig::default());
        war_player(&mut bridge);

        let command: BridgeCommand = serde_json::from_str(r#"{"command":"select","opener":"war-m4s"}"#).unwrap();
        bridge.apply_command(&command);
        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-m4s");

        bridge.handle_log_line(&ability(PLAYER, "002E", "t1"));
        bridge.apply_command(&BridgeCommand::Reset);
        assert_eq!(progress(&bridge), OpenerProgress::new("war-m4s"));
    }

    #[test]
    fn test_unavailable_host_start_and_shutdown() {
        let mut bridge = null_bridge(BridgeConfig::default());
        bridge.shutdown();
        let mut rx = bridge.start();
        assert_eq!(bridge.subscription_count(), 0);
        assert!(rx.try_recv().is_err());
        bridge.shutdown();
        bridge.shutdown();
    }

    #[test]
    fn test_start_subscribes_every_kind() {
        let host = Arc::new(ManualHost::default());
        let mut bridge = EventBridge::new(host.clone(), builtin(), BridgeConfig::default());
        let _rx = bridge.start();

        assert_eq!(bridge.subscription_count(), HostEventKind::ALL.len());
        assert_eq!(host.subscribed.lock().unwrap().len(), HostEventKind::ALL.len());

        bridge.shutdown();
        assert_eq!(bridge.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_deferred_roster_reply_resolves_job() {
        let host = Arc::new(ManualHost::default());
        let mut bridge = EventBridge::new(host.clone(), builtin(), BridgeConfig::default());

        bridge.handle_player_changed(PLAYER_ID.to_string(), PLAYER.to_string(), None);
        assert!(bridge.snapshot().opener.is_none());

        host.answer(0, WAR);
        let result = tokio::time::timeout(Duration::from_secs(5), bridge.roster_rx.recv())
            .await
            .unwrap()
            .unwrap();
        bridge.apply_roster(result);

        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-standard");
    }

    #[tokio::test]
    async fn test_stale_roster_reply_discarded() {
        let host = Arc::new(ManualHost::default());
        let mut bridge = EventBridge::new(host.clone(), builtin(), BridgeConfig::default());

        bridge.handle_player_changed(PLAYER_ID.to_string(), PLAYER.to_string(), None);
        // Newer, direct job information arrives before the roster reply
        bridge.handle_party_changed(&[Combatant {
            id: PLAYER_ID.to_string(),
            name: PLAYER.to_string(),
            job: DRK,
        }]);

        host.answer(0, WAR);
        let result = tokio::time::timeout(Duration::from_secs(5), bridge.roster_rx.recv())
            .await
            .unwrap()
            .unwrap();
        bridge.apply_roster(result);

        assert_eq!(bridge.snapshot().opener.unwrap().id, "drk-standard");
    }

    #[tokio::test]
    async fn test_roster_timeout_degrades_gracefully() {
        let host = Arc::new(ManualHost::default());
        let config = BridgeConfig {
            roster_timeout_ms: 20,
            ..BridgeConfig::default()
        };
        let mut bridge = EventBridge::new(host.clone(), builtin(), config);

        bridge.handle_player_changed(PLAYER_ID.to_string(), PLAYER.to_string(), None);
        let result = tokio::time::timeout(Duration::from_secs(5), bridge.roster_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(result.roster.is_none());
        bridge.apply_roster(result);

        assert!(bridge.snapshot().opener.is_none());
        // Host still holds the sender; nothing was answered
        assert_eq!(host.pending.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_processes_events_in_order() {
        let mut bridge = null_bridge(BridgeConfig::default());
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(HostEvent::PlayerChanged {
            id: PLAYER_ID.to_string(),
            name: PLAYER.to_string(),
            job: Some(WAR),
        })
        .unwrap();
        tx.send(HostEvent::LogLine { fields: ability(PLAYER, "002E", "t1") }).unwrap();
        tx.send(HostEvent::LogLine { fields: ability(PLAYER, "0034", "t2") }).unwrap();
        tx.send(HostEvent::LogLine { fields: ability(PLAYER, "001F", "t3") }).unwrap();
        tx.send(HostEvent::LogLine { fields: ability("Someone Else", "0025", "t4") }).unwrap();
        drop(tx);

        let mut outcomes = Vec::new();
        bridge.run(rx, |outcome| outcomes.push(outcome.clone())).await;
        assert_eq!(progress(&bridge).completed_ids, vec!["tomahawk", "infuriate-1", "heavy-swing"]);
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(outcomes[2], LineOutcome::Matched { index: 2, .. }));
        assert_eq!(outcomes[3], LineOutcome::OtherSource);
    }

    #[tokio::test]
    async fn test_run_applies_deferred_roster_reply() {
        let host = Arc::new(ManualHost::default());
        let mut bridge = EventBridge::new(host.clone(), builtin(), BridgeConfig::default());
        let mut updates = bridge.subscribe_state();
        let (tx, rx) = mpsc::unbounded_channel();

        let feed = async {
            tx.send(HostEvent::PlayerChanged {
                id: PLAYER_ID.to_string(),
                name: PLAYER.to_string(),
                job: None,
            })
            .unwrap();
            while host.pending.lock().unwrap().is_empty() {
                tokio::task::yield_now().await;
            }
            host.answer(0, WAR);

            // The reply arrives through the run loop while the feed is still open
            while updates.borrow_and_update().opener.is_none() {
                updates.changed().await.unwrap();
            }
            tx.send(HostEvent::LogLine { fields: ability(PLAYER, "002E", "t1") }).unwrap();
            drop(tx);
        };

        let mut outcomes = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(bridge.run(rx, |outcome| outcomes.push(outcome.clone())), feed) },
        )
        .await
        .unwrap();

        assert_eq!(bridge.snapshot().opener.unwrap().id, "war-standard");
        assert_eq!(progress(&bridge).completed_ids, vec!["tomahawk"]);
        assert!(matches!(outcomes[..], [LineOutcome::Matched { index: 0, .. }]));
    }
}
