use crate::domain::state::{Board, Bounds, MatchState, Participant, Position};
use crate::domain::tuning::rules::MatchRules;
use rand::Rng;

/// Inclusive rectangle of candidate cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Area {
    pub min: Position,
    pub max: Position,
}

impl Area {
    pub fn whole(bounds: Bounds) -> Self {
        Self {
            min: Position::new(0, 0),
            max: Position::new(bounds.width - 1, bounds.height - 1),
        }
    }

    /// Human spawn rectangle from the rules, clamped into the board.
    pub fn spawn(bounds: Bounds, rules: &MatchRules) -> Self {
        Self {
            min: bounds.clamp(Position::new(rules.spawn_min, rules.spawn_min)),
            max: bounds.clamp(Position::new(rules.spawn_max, rules.spawn_max)),
        }
    }

    fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y
    }

    fn cells(self) -> impl Iterator<Item = Position> {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| Position::new(x, y)))
    }
}

fn is_occupied(board: &Board, participants: &[Participant], pos: Position) -> bool {
    board.food == Some(pos)
        || board.obstacles.contains(&pos)
        || participants.iter().any(|p| p.snake.contains(pos))
}

/// Finds a cell in `area` that holds no snake segment, obstacle or food.
///
/// Tries `attempts` random draws first, then scans the area so a free cell is
/// only missed when the area is completely full.
pub fn find_free_cell(state: &mut MatchState, area: Area, attempts: usize) -> Option<Position> {
    let area = Area {
        min: state.board.bounds.clamp(area.min),
        max: state.board.bounds.clamp(area.max),
    };
    if area.is_empty() || state.board.bounds.cell_count() == 0 {
        return None;
    }

    let MatchState {
        board,
        participants,
        rng,
        ..
    } = state;
    let board: &Board = board;
    let participants: &[Participant] = participants;

    for _ in 0..attempts {
        let pos = Position::new(
            rng.random_range(area.min.x..=area.max.x),
            rng.random_range(area.min.y..=area.max.y),
        );
        if !is_occupied(board, participants, pos) {
            return Some(pos);
        }
    }

    area.cells()
        .find(|&pos| !is_occupied(board, participants, pos))
}

/// Moves the food to a free cell; leaves it unplaced when the board is full.
pub fn respawn_food(state: &mut MatchState, rules: &MatchRules) -> Option<Position> {
    state.board.food = None;
    let area = Area::whole(state.board.bounds);
    let food = find_free_cell(state, area, rules.food_placement_attempts);
    state.board.food = food;
    food
}

/// Places the opening food item at the configured cell, or anywhere free.
pub fn place_initial_food(state: &mut MatchState, rules: &MatchRules) -> Option<Position> {
    let preferred = state.board.bounds.clamp(rules.initial_food);
    if state.board.bounds.contains(preferred) && !state.is_occupied(preferred) {
        state.board.food = Some(preferred);
        return Some(preferred);
    }
    respawn_food(state, rules)
}

/// Scatters `count` obstacles over free cells. Returns how many were placed.
pub fn place_obstacles(state: &mut MatchState, count: usize, rules: &MatchRules) -> usize {
    let area = Area::whole(state.board.bounds);
    let mut placed = 0;
    for _ in 0..count {
        let Some(pos) = find_free_cell(state, area, rules.food_placement_attempts) else {
            break;
        };
        state.board.obstacles.insert(pos);
        placed += 1;
    }
    placed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{MatchConfig, ParticipantKind, Snake};

    fn state_with_bounds(width: i32, height: i32) -> MatchState {
        let config = MatchConfig {
            bounds: Bounds { width, height },
            seed: Some(7),
            ..MatchConfig::default()
        };
        MatchState::new("match-test".to_string(), &config, 0)
    }

    #[test]
    fn respawned_food_avoids_snakes_and_obstacles() {
        let mut state = state_with_bounds(4, 4);
        let rules = MatchRules::default();

        // Fill every cell except (3, 3).
        let mut participant =
            Participant::new(1, "p1".to_string(), ParticipantKind::Human, Position::new(0, 0));
        participant.snake = Snake::from_segments(
            (0..4)
                .flat_map(|y| (0..4).map(move |x| Position::new(x, y)))
                .filter(|&pos| pos != Position::new(3, 3) && pos != Position::new(2, 3)),
        )
        .expect("non-empty body");
        state.participants.push(participant);
        state.board.obstacles.insert(Position::new(2, 3));

        for _ in 0..20 {
            assert_eq!(respawn_food(&mut state, &rules), Some(Position::new(3, 3)));
        }
    }

    #[test]
    fn food_stays_unplaced_when_board_is_full() {
        let mut state = state_with_bounds(2, 1);
        let rules = MatchRules::default();
        let mut participant =
            Participant::new(1, "p1".to_string(), ParticipantKind::Human, Position::new(0, 0));
        participant.snake = Snake::from_segments([Position::new(0, 0), Position::new(1, 0)])
            .expect("non-empty body");
        state.participants.push(participant);

        assert_eq!(respawn_food(&mut state, &rules), None);
        assert_eq!(state.board.food, None);
    }

    #[test]
    fn initial_food_prefers_configured_cell() {
        let mut state = state_with_bounds(30, 30);
        let rules = MatchRules::default();
        assert_eq!(place_initial_food(&mut state, &rules), Some(Position::new(10, 10)));
    }

    #[test]
    fn obstacles_never_overlap_existing_content() {
        let mut state = state_with_bounds(3, 3);
        let rules = MatchRules::default();
        state.board.food = Some(Position::new(1, 1));

        let placed = place_obstacles(&mut state, 20, &rules);

        assert_eq!(placed, 8);
        assert!(!state.board.obstacles.contains(&Position::new(1, 1)));
    }
}
