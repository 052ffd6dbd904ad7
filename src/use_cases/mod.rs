// Use cases layer: match orchestration and score recording.

pub mod game;
pub mod leaderboard;
pub mod registry;
pub mod types;

pub use game::{MatchRunner, RunnerOutputs, RunnerPhase};
pub use leaderboard::{Leaderboard, spawn_score_writer};
pub use registry::{MatchError, MatchHandle, MatchRegistry, MatchSettings};
pub use types::{EndReason, FinalScore, MatchNotice, MatchStatus};
