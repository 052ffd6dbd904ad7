/// Gameplay tuning for snake matches.
///
/// Keep this separate from runtime/server configuration (tick rates, buffer sizes, etc.).
use crate::domain::state::Position;

#[derive(Debug, Clone, Copy)]
pub struct MatchRules {
    /// Points awarded per food eaten.
    pub food_reward: u32,

    /// Where the first food item is placed (clamped into the board).
    pub initial_food: Position,

    /// Inclusive range of cells (on both axes) used for human spawn points.
    pub spawn_min: i32,
    pub spawn_max: i32,

    /// Random draws before food placement falls back to a full board scan.
    pub food_placement_attempts: usize,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            food_reward: 10,
            initial_food: Position::new(10, 10),
            spawn_min: 5,
            spawn_max: 15,
            food_placement_attempts: 128,
        }
    }
}
