// Domain layer: core simulation types and rules.

pub mod controller;
pub mod ports;
pub mod scores;
pub mod state;
pub mod systems;
pub mod tuning;

pub use controller::OpponentController;
pub use state::{
    Bounds, Difficulty, Direction, Lifecycle, MatchConfig, MatchId, MatchState, Participant,
    ParticipantId, ParticipantKind, Position, Snapshot,
};
