use crate::domain::controller::OpponentController;
use crate::domain::state::{
    Direction, Lifecycle, MatchState, ParticipantId, ParticipantKind, Position,
};
use crate::domain::systems::placement;
use crate::domain::tuning::rules::MatchRules;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-tick results the runner uses for logging and score reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub eliminated: Vec<ParticipantId>,
    pub ate: Vec<ParticipantId>,
    pub ended: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("match is not running")]
    NotRunning,
    #[error("participant {0} has an empty snake")]
    EmptySnake(ParticipantId),
}

struct PlannedMove {
    index: usize,
    direction: Direction,
    new_head: Position,
}

/// Reversal into the neck is refused; the previous heading is kept instead.
pub fn resolve_direction(current: Direction, intent: Option<Direction>) -> Direction {
    match intent {
        Some(next) if !next.is_opposite(current) => next,
        _ => current,
    }
}

/// Advances a running match by one tick.
pub fn tick_match(
    state: &mut MatchState,
    rules: &MatchRules,
) -> Result<TickOutcome, SimulationError> {
    if state.board.lifecycle != Lifecycle::Running {
        return Err(SimulationError::NotRunning);
    }

    steer_controlled(state);

    // Resolve intents and compute every new head before anything moves.
    let mut planned = Vec::with_capacity(state.participants.len());
    for (index, p) in state.participants.iter().enumerate() {
        let intent = p.intent.take();
        if !p.alive {
            continue;
        }
        let head = p.snake.head().ok_or(SimulationError::EmptySnake(p.id))?;
        let direction = resolve_direction(p.direction, intent);
        planned.push(PlannedMove {
            index,
            direction,
            new_head: head.step(direction),
        });
    }

    // Dead snakes stay on the board and still block.
    let occupied: HashSet<Position> = state
        .participants
        .iter()
        .flat_map(|p| p.snake.segments().copied())
        .collect();
    let mut head_counts: HashMap<Position, usize> = HashMap::new();
    for mv in &planned {
        *head_counts.entry(mv.new_head).or_default() += 1;
    }

    let food = state.board.food;
    let mut outcome = TickOutcome::default();
    let mut food_eaten = false;

    for mv in &planned {
        let crashed = !state.board.bounds.contains(mv.new_head)
            || state.board.obstacles.contains(&mv.new_head)
            || occupied.contains(&mv.new_head)
            || head_counts.get(&mv.new_head).copied().unwrap_or(0) > 1;

        let p = &mut state.participants[mv.index];
        p.direction = mv.direction;
        if crashed {
            p.alive = false;
            outcome.eliminated.push(p.id);
            debug!(match_id = %state.id, participant_id = p.id, head = ?mv.new_head, "participant eliminated");
            continue;
        }

        let grow = food == Some(mv.new_head);
        p.snake.advance(mv.new_head, grow);
        if grow {
            p.score += rules.food_reward;
            outcome.ate.push(p.id);
            food_eaten = true;
        }
    }

    if food_eaten || state.board.food.is_none() {
        placement::respawn_food(state, rules);
    }

    state.tick += 1;
    if state.alive_count() == 0 {
        state.board.lifecycle = Lifecycle::Ended;
        outcome.ended = true;
    }

    Ok(outcome)
}

// Controllers see the pre-tick state and write into the same intent slots humans use.
fn steer_controlled(state: &MatchState) {
    let has_controlled = state.participants.iter().any(|p| {
        p.alive && matches!(p.kind, ParticipantKind::Controlled { .. })
    });
    if !has_controlled {
        return;
    }

    let view = state.snapshot();
    for p in state.participants.iter().filter(|p| p.alive) {
        if let ParticipantKind::Controlled { difficulty } = p.kind
            && let Some(direction) = OpponentController::new(difficulty).decide(&view, p.id)
        {
            p.intent.store(direction);
        }
    }
}
