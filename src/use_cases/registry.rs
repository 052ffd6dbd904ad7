// Match registry: creation, lookup and teardown of match runners.

use super::game::{MatchRunner, RunnerOutputs};
use super::types::{EndReason, FinalScore, MatchNotice, MatchStatus};
use crate::domain::ports::Clock;
use crate::domain::state::{
    Difficulty, Direction, IntentSlot, Lifecycle, MatchConfig, MatchId, MatchState, Participant,
    ParticipantId, ParticipantKind, Snapshot,
};
use crate::domain::systems::placement::{self, Area};
use crate::domain::tuning::rules::MatchRules;
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Shared configuration for spawning matches.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Capacity for broadcast snapshots and their serialized form.
    pub snapshot_broadcast_capacity: usize,
    /// Capacity for one-off match notices.
    pub notice_broadcast_capacity: usize,
    /// Fixed tick interval for match runners.
    pub tick_interval: Duration,
    /// Defaults for matches created by clients.
    pub defaults: MatchConfig,
    /// Gameplay rules applied by every runner.
    pub rules: MatchRules,
}

/// Errors returned by registry operations. All are reported to the caller only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("match already started")]
    AlreadyStarted,
    #[error("operation not valid in the current match state")]
    InvalidState,
    #[error("match already exists")]
    AlreadyExists,
    #[error("direction ({dx}, {dy}) is not a unit vector")]
    InvalidIntent { dx: i32, dy: i32 },
}

impl MatchError {
    /// Stable machine-readable code for wire errors.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::NotFound(_) => "not_found",
            MatchError::AlreadyStarted => "already_started",
            MatchError::InvalidState => "invalid_state",
            MatchError::AlreadyExists => "already_exists",
            MatchError::InvalidIntent { .. } => "invalid_intent",
        }
    }
}

/// Per-match channels and lookup state. Cheap to clone.
#[derive(Clone)]
pub struct MatchHandle {
    /// Identifier clients use to target this match.
    pub match_id: Arc<str>,
    /// Creation time, used by the reaper.
    pub created_at: Instant,
    /// Broadcast sender for per-tick snapshots.
    pub snapshot_tx: broadcast::Sender<Arc<Snapshot>>,
    /// Latest snapshot, for lookups and late subscribers.
    pub latest_tx: watch::Sender<Arc<Snapshot>>,
    /// Broadcast sender for serialized snapshots.
    pub snapshot_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest serialized snapshot.
    pub snapshot_latest_bytes_tx: watch::Sender<Utf8Bytes>,
    /// Lifecycle changes (pending, running, ended).
    pub status_tx: watch::Sender<MatchStatus>,
    /// Joins and other one-off notices.
    pub notice_tx: broadcast::Sender<MatchNotice>,
    // Match state while pending; taken by the runner on start.
    pending: Arc<Mutex<Option<MatchState>>>,
    // Intent slots by participant, shared with the match state.
    intents: Arc<RwLock<HashMap<ParticipantId, Arc<IntentSlot>>>>,
    // Stop signal observed by the runner before each tick.
    stop_tx: Arc<watch::Sender<Option<EndReason>>>,
    // Live client connections attached to this match.
    connections: Arc<AtomicUsize>,
}

impl MatchHandle {
    pub fn status(&self) -> MatchStatus {
        *self.status_tx.borrow()
    }

    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        self.latest_tx.borrow().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    fn request_stop(&self, reason: EndReason) {
        self.stop_tx.send_replace(Some(reason));
    }
}

/// Thread-safe registry for active matches.
pub struct MatchRegistry {
    /// Global settings applied to newly created matches.
    settings: MatchSettings,
    /// Map of match id to active handle.
    matches: RwLock<HashMap<MatchId, MatchHandle>>,
    /// Final scores emitted by runners, drained by the ledger writer.
    score_tx: mpsc::Sender<FinalScore>,
    /// Stamps match creation times.
    clock: Arc<dyn Clock>,
}

impl MatchRegistry {
    /// Creates a new registry with the provided settings.
    pub fn new(
        settings: MatchSettings,
        score_tx: mpsc::Sender<FinalScore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            matches: RwLock::new(HashMap::new()),
            score_tx,
            clock,
        }
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Creates an empty pending match and registers it.
    pub async fn create(&self, config: MatchConfig) -> Result<MatchHandle, MatchError> {
        let match_id = format!("match-{}", uuid::Uuid::new_v4());
        self.create_with_id(match_id, config).await
    }

    /// Creates a pending match under a caller-chosen id.
    pub async fn create_with_id(
        &self,
        match_id: MatchId,
        config: MatchConfig,
    ) -> Result<MatchHandle, MatchError> {
        let mut matches = self.matches.write().await;
        if matches.contains_key(&match_id) {
            return Err(MatchError::AlreadyExists);
        }

        let created_at = self.clock.now_epoch_seconds();
        let mut state = MatchState::new(match_id.clone(), &config, created_at);
        let rules = &self.settings.rules;
        let obstacles = placement::place_obstacles(&mut state, config.obstacle_count, rules);
        placement::place_initial_food(&mut state, rules);

        let capacity = self.settings.snapshot_broadcast_capacity;
        let (snapshot_tx, _snapshot_rx) = broadcast::channel::<Arc<Snapshot>>(capacity);
        let (latest_tx, _latest_rx) = watch::channel(Arc::new(state.snapshot()));
        let (snapshot_bytes_tx, _snapshot_bytes_rx) = broadcast::channel::<Utf8Bytes>(capacity);
        let (snapshot_latest_bytes_tx, _snapshot_latest_bytes_rx) =
            watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));
        let (status_tx, _status_rx) = watch::channel(MatchStatus::Pending);
        let (notice_tx, _notice_rx) =
            broadcast::channel::<MatchNotice>(self.settings.notice_broadcast_capacity);
        let (stop_tx, _stop_rx) = watch::channel::<Option<EndReason>>(None);

        let handle = MatchHandle {
            match_id: Arc::from(match_id.as_str()),
            created_at: Instant::now(),
            snapshot_tx,
            latest_tx,
            snapshot_bytes_tx,
            snapshot_latest_bytes_tx,
            status_tx,
            notice_tx,
            pending: Arc::new(Mutex::new(Some(state))),
            intents: Arc::new(RwLock::new(HashMap::new())),
            stop_tx: Arc::new(stop_tx),
            connections: Arc::new(AtomicUsize::new(0)),
        };

        info!(%match_id, mode = %config.mode, obstacles, "match created");
        matches.insert(match_id, handle.clone());
        Ok(handle)
    }

    /// Returns a match handle for the provided id, if it exists.
    pub async fn get(&self, match_id: &str) -> Option<MatchHandle> {
        let matches = self.matches.read().await;
        matches.get(match_id).cloned()
    }

    async fn require(&self, match_id: &str) -> Result<MatchHandle, MatchError> {
        self.get(match_id).await.ok_or(MatchError::NotFound("match"))
    }

    /// Adds a human participant with a length-1 snake. Only valid before start.
    pub async fn join(
        &self,
        match_id: &str,
        name: &str,
    ) -> Result<(ParticipantId, Arc<Snapshot>), MatchError> {
        let handle = self.require(match_id).await?;
        let participant_id = self
            .add_participant(&handle, |_| name.to_string(), ParticipantKind::Human)
            .await?;
        let _ = handle.notice_tx.send(MatchNotice::ParticipantJoined {
            participant_id,
            name: name.to_string(),
        });
        Ok((participant_id, handle.latest_snapshot()))
    }

    /// Adds a computer-controlled participant. Only valid before start.
    pub async fn add_controller(
        &self,
        match_id: &str,
        difficulty: Difficulty,
    ) -> Result<ParticipantId, MatchError> {
        let handle = self.require(match_id).await?;
        let kind = ParticipantKind::Controlled { difficulty };
        let participant_id = self
            .add_participant(
                &handle,
                |state| {
                    let controlled = state
                        .participants
                        .iter()
                        .filter(|p| matches!(p.kind, ParticipantKind::Controlled { .. }))
                        .count();
                    format!("ai_{controlled}")
                },
                kind,
            )
            .await?;
        let name = handle
            .latest_snapshot()
            .participant(participant_id)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let _ = handle.notice_tx.send(MatchNotice::ParticipantJoined {
            participant_id,
            name,
        });
        Ok(participant_id)
    }

    async fn add_participant(
        &self,
        handle: &MatchHandle,
        name: impl FnOnce(&MatchState) -> String,
        kind: ParticipantKind,
    ) -> Result<ParticipantId, MatchError> {
        let mut pending = handle.pending.lock().await;
        let Some(state) = pending.as_mut() else {
            return Err(MatchError::AlreadyStarted);
        };
        match state.board.lifecycle {
            Lifecycle::Pending => {}
            Lifecycle::Running => return Err(MatchError::AlreadyStarted),
            Lifecycle::Ended => return Err(MatchError::InvalidState),
        }

        let rules = &self.settings.rules;
        let bounds = state.board.bounds;
        let head = match placement::find_free_cell(
            state,
            Area::spawn(bounds, rules),
            rules.food_placement_attempts,
        ) {
            Some(head) => head,
            None => placement::find_free_cell(
                state,
                Area::whole(bounds),
                rules.food_placement_attempts,
            )
            .ok_or(MatchError::InvalidState)?,
        };

        let participant_id = state
            .participants
            .iter()
            .map(|p| p.id)
            .max()
            .unwrap_or(0)
            + 1;
        let participant = Participant::new(participant_id, name(&*state), kind, head);
        let slot = participant.intent.clone();
        debug!(
            match_id = %state.id,
            participant_id,
            name = %participant.name,
            ?head,
            "participant added"
        );
        state.participants.push(participant);

        handle.intents.write().await.insert(participant_id, slot);
        handle.latest_tx.send_replace(Arc::new(state.snapshot()));
        Ok(participant_id)
    }

    /// Moves a pending match to running and spawns its runner.
    pub async fn start(&self, match_id: &str) -> Result<(), MatchError> {
        let handle = self.require(match_id).await?;
        let mut state = {
            let mut pending = handle.pending.lock().await;
            match pending.take() {
                Some(state) if state.board.lifecycle == Lifecycle::Pending => state,
                Some(state) => {
                    *pending = Some(state);
                    return Err(MatchError::InvalidState);
                }
                None => return Err(MatchError::InvalidState),
            }
        };
        state.board.lifecycle = Lifecycle::Running;
        handle.latest_tx.send_replace(Arc::new(state.snapshot()));
        handle.status_tx.send_replace(MatchStatus::Running);

        let mode = state.mode.clone();
        let outputs = RunnerOutputs {
            snapshot_tx: handle.snapshot_tx.clone(),
            latest_tx: handle.latest_tx.clone(),
            status_tx: handle.status_tx.clone(),
            score_tx: self.score_tx.clone(),
        };
        let runner = MatchRunner::new(
            state,
            self.settings.rules,
            self.settings.tick_interval,
            outputs.clone(),
            handle.stop_tx.subscribe(),
        );
        spawn_supervised(handle.match_id.clone(), mode, runner, outputs);
        Ok(())
    }

    /// Stores a pending intent; it takes effect on the next tick.
    pub async fn set_intent(
        &self,
        match_id: &str,
        participant_id: ParticipantId,
        vector: (i32, i32),
    ) -> Result<(), MatchError> {
        let handle = self.require(match_id).await?;
        let intents = handle.intents.read().await;
        let slot = intents
            .get(&participant_id)
            .ok_or(MatchError::NotFound("participant"))?;
        let direction = Direction::try_from(vector)
            .map_err(|e| MatchError::InvalidIntent { dx: e.dx, dy: e.dy })?;
        slot.store(direction);
        Ok(())
    }

    /// Ends a match explicitly; a running match stops before its next tick.
    pub async fn stop(&self, match_id: &str) -> Result<(), MatchError> {
        let handle = self.require(match_id).await?;
        if handle.status().is_ended() {
            return Err(MatchError::InvalidState);
        }
        end_match(&handle, EndReason::Stopped).await;
        Ok(())
    }

    /// Deregisters a match and signals its runner to stop.
    pub async fn remove(&self, match_id: &str) -> Option<MatchHandle> {
        let handle = self.matches.write().await.remove(match_id)?;
        if !handle.status().is_ended() {
            end_match(&handle, EndReason::Removed).await;
        }
        info!(%match_id, "match removed");
        Some(handle)
    }

    /// Latest snapshot of a match.
    pub async fn snapshot(&self, match_id: &str) -> Result<Arc<Snapshot>, MatchError> {
        Ok(self.require(match_id).await?.latest_snapshot())
    }

    pub async fn len(&self) -> usize {
        self.matches.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.matches.read().await.is_empty()
    }

    /// Counts a client connection against a match. Returns the new count.
    pub async fn register_connection(&self, match_id: &str) -> Option<usize> {
        let handle = self.get(match_id).await?;
        Some(handle.connections.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Drops a connection; the last one out removes the match.
    pub async fn register_disconnect(&self, match_id: &str) {
        let Some(handle) = self.get(match_id).await else {
            return;
        };
        let previous = handle
            .connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(1))
            })
            .unwrap_or(0);
        if previous <= 1 {
            info!(%match_id, "last connection left; removing match");
            self.remove(match_id).await;
        }
    }

    /// Removes ended matches nobody watches and pending matches left idle too long.
    pub async fn reap(&self, pending_timeout: Duration) -> Vec<MatchId> {
        let stale: Vec<MatchId> = {
            let matches = self.matches.read().await;
            matches
                .iter()
                .filter(|(_, handle)| match handle.status() {
                    MatchStatus::Ended { .. } => handle.connection_count() == 0,
                    MatchStatus::Pending => handle.created_at.elapsed() >= pending_timeout,
                    MatchStatus::Running => false,
                })
                .map(|(id, _)| id.clone())
                .collect()
        };

        for match_id in &stale {
            self.remove(match_id).await;
        }
        if !stale.is_empty() {
            info!(count = stale.len(), "reaped inactive matches");
        }
        stale
    }

    /// Spawns the periodic inactivity reaper.
    pub fn spawn_reaper(
        self: Arc<Self>,
        every: Duration,
        pending_timeout: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.reap(pending_timeout).await;
            }
        })
    }
}

async fn end_match(handle: &MatchHandle, reason: EndReason) {
    // A pending match has no runner; end it in place.
    let mut pending = handle.pending.lock().await;
    if let Some(state) = pending.as_mut() {
        state.board.lifecycle = Lifecycle::Ended;
        handle.latest_tx.send_replace(Arc::new(state.snapshot()));
        handle
            .status_tx
            .send_replace(MatchStatus::Ended { reason });
        return;
    }
    handle.request_stop(reason);
}

// Runs the match on its own task; a panic ends only this match.
fn spawn_supervised(
    match_id: Arc<str>,
    mode: String,
    runner: MatchRunner,
    outputs: RunnerOutputs,
) {
    let task = tokio::spawn(runner.run());
    tokio::spawn(async move {
        if let Err(e) = task.await
            && e.is_panic()
        {
            error!(%match_id, "match runner panicked");
            publish_fault(&outputs, &mode);
        }
    });
}

// Ends a match whose runner died: last known state, marked ended, plus survivor scores.
fn publish_fault(outputs: &RunnerOutputs, mode: &str) {
    let mut last = Snapshot::clone(&outputs.latest_tx.borrow());
    if last.board.lifecycle == Lifecycle::Running {
        for p in last.participants.iter().filter(|p| p.alive) {
            let record = FinalScore {
                name: p.name.clone(),
                score: p.score,
                game_mode: mode.to_string(),
            };
            if let Err(e) = outputs.score_tx.try_send(record) {
                warn!(match_id = %last.match_id, error = %e, "dropping final score");
            }
        }
    }
    last.board.lifecycle = Lifecycle::Ended;

    let last = Arc::new(last);
    let _ = outputs.snapshot_tx.send(last.clone());
    outputs.latest_tx.send_replace(last);
    outputs.status_tx.send_replace(MatchStatus::Ended {
        reason: EndReason::Fault,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{Bounds, Position};

    struct FixedClock;

    impl Clock for FixedClock {
        fn now_epoch_seconds(&self) -> u64 {
            1_700_000_000
        }
    }

    fn settings() -> MatchSettings {
        MatchSettings {
            snapshot_broadcast_capacity: 64,
            notice_broadcast_capacity: 16,
            tick_interval: Duration::from_millis(10),
            defaults: MatchConfig::default(),
            rules: MatchRules::default(),
        }
    }

    fn registry_with(settings: MatchSettings) -> (MatchRegistry, mpsc::Receiver<FinalScore>) {
        let (score_tx, score_rx) = mpsc::channel(64);
        (
            MatchRegistry::new(settings, score_tx, Arc::new(FixedClock)),
            score_rx,
        )
    }

    fn registry() -> (MatchRegistry, mpsc::Receiver<FinalScore>) {
        registry_with(settings())
    }

    #[tokio::test]
    async fn create_registers_a_pending_match_with_food() {
        let (registry, _scores) = registry();

        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");

        assert!(handle.match_id.starts_with("match-"));
        assert_eq!(handle.status(), MatchStatus::Pending);
        let snapshot = registry.snapshot(&handle.match_id).await.expect("snapshot");
        assert_eq!(snapshot.board.lifecycle, Lifecycle::Pending);
        assert_eq!(snapshot.board.food, Some(Position::new(10, 10)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn create_with_taken_id_returns_already_exists() {
        let (registry, _scores) = registry();
        registry
            .create_with_id("match-fixed".to_string(), MatchConfig::default())
            .await
            .expect("create");

        let result = registry
            .create_with_id("match-fixed".to_string(), MatchConfig::default())
            .await;

        assert!(matches!(result, Err(MatchError::AlreadyExists)));
    }

    #[tokio::test]
    async fn join_unknown_match_returns_not_found_without_side_effects() {
        let (registry, _scores) = registry();

        let result = registry.join("match-missing", "Pilot").await;

        assert_eq!(result.unwrap_err(), MatchError::NotFound("match"));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn join_places_length_one_snake_inside_spawn_area() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");
        let mut notices = handle.notice_tx.subscribe();

        let (participant_id, snapshot) =
            registry.join(&handle.match_id, "Pilot").await.expect("join");

        let participant = snapshot.participant(participant_id).expect("participant");
        assert_eq!(participant.body.len(), 1);
        let head = participant.head().expect("head");
        assert!((5..=15).contains(&head.x) && (5..=15).contains(&head.y));
        assert_eq!(participant.score, 0);
        assert!(participant.alive);
        assert_eq!(
            notices.try_recv().expect("join notice"),
            MatchNotice::ParticipantJoined {
                participant_id,
                name: "Pilot".to_string()
            }
        );
    }

    #[tokio::test]
    async fn controllers_are_named_in_order_of_addition() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");

        let first = registry
            .add_controller(&handle.match_id, Difficulty::Easy)
            .await
            .expect("controller");
        let second = registry
            .add_controller(&handle.match_id, Difficulty::Hard)
            .await
            .expect("controller");

        let snapshot = handle.latest_snapshot();
        assert_eq!(snapshot.participant(first).expect("first").name, "ai_0");
        assert_eq!(snapshot.participant(second).expect("second").name, "ai_1");
    }

    #[tokio::test]
    async fn join_after_start_is_rejected() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");
        registry.join(&handle.match_id, "Pilot").await.expect("join");
        registry.start(&handle.match_id).await.expect("start");

        assert_eq!(
            registry.join(&handle.match_id, "Late").await.unwrap_err(),
            MatchError::AlreadyStarted
        );
        assert_eq!(
            registry
                .add_controller(&handle.match_id, Difficulty::Medium)
                .await
                .unwrap_err(),
            MatchError::AlreadyStarted
        );
        assert_eq!(
            registry.start(&handle.match_id).await.unwrap_err(),
            MatchError::InvalidState
        );
        registry.remove(&handle.match_id).await;
    }

    #[tokio::test]
    async fn start_unknown_match_returns_not_found() {
        let (registry, _scores) = registry();
        assert_eq!(
            registry.start("match-missing").await.unwrap_err(),
            MatchError::NotFound("match")
        );
    }

    #[tokio::test]
    async fn set_intent_validates_match_participant_and_vector() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");
        let (participant_id, _) = registry.join(&handle.match_id, "Pilot").await.expect("join");

        assert_eq!(
            registry
                .set_intent("match-missing", participant_id, (0, 1))
                .await
                .unwrap_err(),
            MatchError::NotFound("match")
        );
        assert_eq!(
            registry
                .set_intent(&handle.match_id, participant_id + 100, (0, 1))
                .await
                .unwrap_err(),
            MatchError::NotFound("participant")
        );
        assert_eq!(
            registry
                .set_intent(&handle.match_id, participant_id, (1, 1))
                .await
                .unwrap_err(),
            MatchError::InvalidIntent { dx: 1, dy: 1 }
        );

        let intents = handle.intents.read().await;
        assert_eq!(intents[&participant_id].peek(), None);
        drop(intents);

        registry
            .set_intent(&handle.match_id, participant_id, (0, 1))
            .await
            .expect("intent");
        let intents = handle.intents.read().await;
        assert_eq!(intents[&participant_id].peek(), Some(Direction::Down));
    }

    #[tokio::test]
    async fn running_match_broadcasts_snapshots_until_everyone_dies() {
        let (registry, mut scores) = registry();
        let config = MatchConfig {
            bounds: Bounds {
                width: 8,
                height: 8,
            },
            seed: Some(3),
            ..MatchConfig::default()
        };
        let handle = registry.create(config).await.expect("create");
        let (participant_id, _) = registry.join(&handle.match_id, "Pilot").await.expect("join");
        let mut snapshots = handle.snapshot_tx.subscribe();
        let mut status = handle.status_tx.subscribe();

        registry.start(&handle.match_id).await.expect("start");

        let first = tokio::time::timeout(Duration::from_secs(2), snapshots.recv())
            .await
            .expect("snapshot in time")
            .expect("snapshot");
        assert_eq!(first.tick, 1);
        assert_ne!(first.board.lifecycle, Lifecycle::Pending);

        // Heading right on an 8-wide board ends the match within a few ticks.
        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.is_ended()))
            .await
            .expect("match ended in time")
            .expect("status channel open");
        assert_eq!(
            handle.status(),
            MatchStatus::Ended {
                reason: EndReason::AllEliminated
            }
        );
        let final_score = scores.recv().await.expect("score emitted");
        assert_eq!(final_score.name, "Pilot");
        assert_eq!(final_score.score % 10, 0);
        assert!(!handle.latest_snapshot().participant(participant_id).expect("p").alive);
    }

    #[tokio::test]
    async fn runner_panic_ends_the_match_and_records_survivors() {
        // A zero period makes the runner's interval panic on start.
        let (registry, mut scores) = registry_with(MatchSettings {
            tick_interval: Duration::ZERO,
            ..settings()
        });
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");
        let (participant_id, _) = registry.join(&handle.match_id, "Pilot").await.expect("join");
        let mut snapshots = handle.snapshot_tx.subscribe();
        let mut status = handle.status_tx.subscribe();

        registry.start(&handle.match_id).await.expect("start");

        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.is_ended()))
            .await
            .expect("match ended in time")
            .expect("status channel open");
        assert_eq!(
            handle.status(),
            MatchStatus::Ended {
                reason: EndReason::Fault
            }
        );

        let latest = registry.snapshot(&handle.match_id).await.expect("snapshot");
        assert_eq!(latest.board.lifecycle, Lifecycle::Ended);
        assert!(latest.participant(participant_id).expect("p").alive);
        let published = snapshots.try_recv().expect("final snapshot published");
        assert_eq!(published.board.lifecycle, Lifecycle::Ended);

        let score = scores.try_recv().expect("survivor score emitted");
        assert_eq!(score.name, "Pilot");
        assert_eq!(score.score, 0);
        assert_eq!(score.game_mode, "classic");
    }

    #[tokio::test]
    async fn created_match_is_stamped_by_the_registry_clock() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");

        let pending = handle.pending.lock().await;
        assert_eq!(
            pending.as_ref().expect("pending state").created_at,
            1_700_000_000
        );
    }

    #[tokio::test]
    async fn stop_ends_a_pending_match_in_place() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");

        registry.stop(&handle.match_id).await.expect("stop");

        assert_eq!(
            handle.status(),
            MatchStatus::Ended {
                reason: EndReason::Stopped
            }
        );
        assert_eq!(
            registry.stop(&handle.match_id).await.unwrap_err(),
            MatchError::InvalidState
        );
        assert_eq!(
            registry.start(&handle.match_id).await.unwrap_err(),
            MatchError::InvalidState
        );
        assert_eq!(
            registry.join(&handle.match_id, "Late").await.unwrap_err(),
            MatchError::InvalidState
        );
    }

    #[tokio::test]
    async fn remove_stops_a_running_match() {
        let (registry, _scores) = registry();
        let mut config = MatchConfig::default();
        config.seed = Some(5);
        let handle = registry.create(config).await.expect("create");
        registry.join(&handle.match_id, "Pilot").await.expect("join");
        registry.start(&handle.match_id).await.expect("start");
        let mut status = handle.status_tx.subscribe();

        assert!(registry.remove(&handle.match_id).await.is_some());

        tokio::time::timeout(Duration::from_secs(2), status.wait_for(|s| s.is_ended()))
            .await
            .expect("runner observed removal")
            .expect("status channel open");
        assert!(registry.get(&handle.match_id).await.is_none());
    }

    #[tokio::test]
    async fn last_disconnect_removes_the_match() {
        let (registry, _scores) = registry();
        let handle = registry
            .create(MatchConfig::default())
            .await
            .expect("create");

        assert_eq!(registry.register_connection(&handle.match_id).await, Some(1));
        assert_eq!(registry.register_connection(&handle.match_id).await, Some(2));
        registry.register_disconnect(&handle.match_id).await;
        assert!(registry.get(&handle.match_id).await.is_some());
        registry.register_disconnect(&handle.match_id).await;
        assert!(registry.get(&handle.match_id).await.is_none());
    }

    #[tokio::test]
    async fn reaper_removes_stale_pending_and_ended_matches() {
        let (registry, _scores) = registry();
        let stale = registry
            .create(MatchConfig::default())
            .await
            .expect("create");
        let ended = registry
            .create(MatchConfig::default())
            .await
            .expect("create");
        registry.stop(&ended.match_id).await.expect("stop");

        let reaped = registry.reap(Duration::from_secs(3600)).await;
        assert_eq!(reaped, vec![ended.match_id.to_string()]);
        assert!(registry.get(&stale.match_id).await.is_some());

        let reaped = registry.reap(Duration::ZERO).await;
        assert_eq!(reaped, vec![stale.match_id.to_string()]);
        assert!(registry.is_empty().await);
    }
}
