// Heuristic steering for computer-controlled participants.

use crate::domain::state::{Difficulty, Direction, ParticipantId, Snapshot};

/// Greedy food-seeking controller.
///
/// This is not a path search: each tick it steps along the axis with the
/// larger distance to the food. It only guards against turning into its own
/// body, so it can still stall or run into walls and other snakes.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpponentController {
    pub difficulty: Difficulty,
}

impl OpponentController {
    pub fn new(difficulty: Difficulty) -> Self {
        Self { difficulty }
    }

    /// Picks the next intent for `self_id`, or `None` if it is absent or dead.
    pub fn decide(&self, snapshot: &Snapshot, self_id: ParticipantId) -> Option<Direction> {
        let me = snapshot.participant(self_id).filter(|p| p.alive)?;
        let head = me.head()?;

        let Some(food) = snapshot.board.food else {
            return Some(me.direction);
        };

        let Some(candidate) = greedy_direction(food.x - head.x, food.y - head.y) else {
            return Some(me.direction);
        };

        // Keep course rather than turn into our own body.
        let next = head.step(candidate);
        if me.body.iter().skip(1).any(|&segment| segment == next) {
            return Some(me.direction);
        }

        Some(candidate)
    }
}

fn greedy_direction(dx: i32, dy: i32) -> Option<Direction> {
    if dx.abs() > dy.abs() {
        Some(if dx > 0 {
            Direction::Right
        } else {
            Direction::Left
        })
    } else if dy != 0 {
        Some(if dy > 0 {
            Direction::Down
        } else {
            Direction::Up
        })
    } else if dx != 0 {
        Some(if dx > 0 {
            Direction::Right
        } else {
            Direction::Left
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::{
        BoardSnapshot, Lifecycle, ParticipantKind, ParticipantSnapshot, Position,
    };

    fn snapshot_with(body: Vec<Position>, direction: Direction, food: Option<Position>) -> Snapshot {
        Snapshot {
            match_id: "match-test".to_string(),
            tick: 0,
            board: BoardSnapshot {
                width: 30,
                height: 30,
                food,
                obstacles: Vec::new(),
                power_ups: Vec::new(),
                lifecycle: Lifecycle::Running,
            },
            participants: vec![ParticipantSnapshot {
                id: 9,
                name: "ai_0".to_string(),
                kind: ParticipantKind::Controlled {
                    difficulty: Difficulty::Medium,
                },
                body,
                direction,
                score: 0,
                alive: true,
            }],
        }
    }

    #[test]
    fn moves_along_the_axis_with_larger_distance() {
        let controller = OpponentController::default();

        let snapshot = snapshot_with(
            vec![Position::new(5, 5)],
            Direction::Up,
            Some(Position::new(12, 7)),
        );
        assert_eq!(controller.decide(&snapshot, 9), Some(Direction::Right));

        let snapshot = snapshot_with(
            vec![Position::new(5, 5)],
            Direction::Right,
            Some(Position::new(4, 1)),
        );
        assert_eq!(controller.decide(&snapshot, 9), Some(Direction::Up));
    }

    #[test]
    fn equal_distances_prefer_vertical_axis() {
        let controller = OpponentController::default();
        let snapshot = snapshot_with(
            vec![Position::new(5, 5)],
            Direction::Right,
            Some(Position::new(8, 8)),
        );
        assert_eq!(controller.decide(&snapshot, 9), Some(Direction::Down));
    }

    #[test]
    fn keeps_previous_direction_instead_of_turning_into_own_body() {
        let controller = OpponentController::default();
        // Food is behind the head; the greedy move would hit the neck.
        let snapshot = snapshot_with(
            vec![Position::new(5, 5), Position::new(4, 5), Position::new(3, 5)],
            Direction::Right,
            Some(Position::new(1, 5)),
        );
        assert_eq!(controller.decide(&snapshot, 9), Some(Direction::Right));
    }

    #[test]
    fn keeps_previous_direction_without_food() {
        let controller = OpponentController::default();
        let snapshot = snapshot_with(vec![Position::new(5, 5)], Direction::Down, None);
        assert_eq!(controller.decide(&snapshot, 9), Some(Direction::Down));
    }

    #[test]
    fn unknown_or_dead_participants_get_no_decision() {
        let controller = OpponentController::default();
        let mut snapshot = snapshot_with(
            vec![Position::new(5, 5)],
            Direction::Down,
            Some(Position::new(1, 1)),
        );
        assert_eq!(controller.decide(&snapshot, 42), None);

        snapshot.participants[0].alive = false;
        assert_eq!(controller.decide(&snapshot, 9), None);
    }
}
