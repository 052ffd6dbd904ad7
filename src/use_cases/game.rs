// Match runner: owns one match state and ticks it at a fixed interval.

use super::types::{EndReason, FinalScore, MatchStatus};
use crate::domain::state::{Lifecycle, MatchState, Snapshot};
use crate::domain::systems::movement::{self, TickOutcome};
use crate::domain::tuning::rules::MatchRules;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerPhase {
    Idle,
    Ticking,
    Stopped,
}

/// Channels a runner publishes into; cloned from the match handle.
#[derive(Clone)]
pub struct RunnerOutputs {
    pub snapshot_tx: broadcast::Sender<Arc<Snapshot>>,
    pub latest_tx: watch::Sender<Arc<Snapshot>>,
    pub status_tx: watch::Sender<MatchStatus>,
    pub score_tx: mpsc::Sender<FinalScore>,
}

pub struct MatchRunner {
    state: MatchState,
    rules: MatchRules,
    tick_interval: Duration,
    outputs: RunnerOutputs,
    // Set to a reason when the match must stop before its next tick.
    stop_rx: watch::Receiver<Option<EndReason>>,
    phase: RunnerPhase,
}

impl MatchRunner {
    pub fn new(
        state: MatchState,
        rules: MatchRules,
        tick_interval: Duration,
        outputs: RunnerOutputs,
        stop_rx: watch::Receiver<Option<EndReason>>,
    ) -> Self {
        Self {
            state,
            rules,
            tick_interval,
            outputs,
            stop_rx,
            phase: RunnerPhase::Idle,
        }
    }

    pub fn phase(&self) -> RunnerPhase {
        self.phase
    }

    /// Ticks until the match ends, is stopped, or its handle goes away.
    pub async fn run(mut self) -> RunnerPhase {
        self.phase = RunnerPhase::Ticking;
        self.state.board.lifecycle = Lifecycle::Running;
        info!(
            match_id = %self.state.id,
            participants = self.state.participants.len(),
            tick_ms = self.tick_interval.as_millis() as u64,
            "match runner started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    // A dropped sender means the handle was discarded with the registry.
                    let reason = match changed {
                        Ok(()) => self.stop_rx.borrow().unwrap_or(EndReason::Stopped),
                        Err(_) => EndReason::Removed,
                    };
                    self.finish(reason);
                    break;
                }
                _ = interval.tick() => {}
            }

            // Observe stop requests that raced with the interval.
            let pending_stop = *self.stop_rx.borrow();
            if let Some(reason) = pending_stop {
                self.finish(reason);
                break;
            }

            match movement::tick_match(&mut self.state, &self.rules) {
                Ok(outcome) => {
                    self.report_eliminated(&outcome);
                    self.publish();
                    if outcome.ended {
                        self.finish(EndReason::AllEliminated);
                        break;
                    }
                }
                Err(e) => {
                    error!(match_id = %self.state.id, error = %e, "tick failed; ending match");
                    self.finish(EndReason::Fault);
                    break;
                }
            }
        }

        self.phase = RunnerPhase::Stopped;
        self.phase
    }

    fn publish(&self) {
        let snapshot = Arc::new(self.state.snapshot());
        // Fire-and-forget: no subscribers or a lagging one never stalls the loop.
        let _ = self.outputs.snapshot_tx.send(snapshot.clone());
        self.outputs.latest_tx.send_replace(snapshot);
    }

    fn report_eliminated(&self, outcome: &TickOutcome) {
        for id in &outcome.eliminated {
            if let Some(p) = self.state.participant(*id) {
                debug!(match_id = %self.state.id, participant_id = p.id, score = p.score, "participant out");
                self.emit_score(&p.name, p.score);
            }
        }
    }

    fn emit_score(&self, name: &str, score: u32) {
        let record = FinalScore {
            name: name.to_string(),
            score,
            game_mode: self.state.mode.clone(),
        };
        if let Err(e) = self.outputs.score_tx.try_send(record) {
            warn!(match_id = %self.state.id, error = %e, "dropping final score");
        }
    }

    fn finish(&mut self, reason: EndReason) {
        let was_running = self.state.board.lifecycle == Lifecycle::Running;
        self.state.board.lifecycle = Lifecycle::Ended;

        // Participants still alive get their result recorded at match end.
        if was_running {
            for p in self.state.participants.iter().filter(|p| p.alive) {
                self.emit_score(&p.name, p.score);
            }
        }

        self.publish();
        self.outputs
            .status_tx
            .send_replace(MatchStatus::Ended { reason });

        if reason.is_abnormal() {
            warn!(match_id = %self.state.id, tick = self.state.tick, ?reason, "match ended abnormally");
        } else {
            info!(match_id = %self.state.id, tick = self.state.tick, ?reason, "match ended");
        }
    }
}
