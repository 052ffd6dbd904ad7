// Use-case level inputs/outputs for match orchestration.

use crate::domain::ParticipantId;

/// High-level match state pushed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Pending,
    Running,
    Ended { reason: EndReason },
}

impl MatchStatus {
    pub fn is_ended(&self) -> bool {
        matches!(self, MatchStatus::Ended { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    // Nobody left alive on the board.
    AllEliminated,
    // Explicit stop request.
    Stopped,
    // Match was removed from the registry.
    Removed,
    // The runner failed; the match was shut down on its own.
    Fault,
}

impl EndReason {
    pub fn is_abnormal(self) -> bool {
        matches!(self, EndReason::Fault)
    }
}

/// One-off notifications fanned out to match subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchNotice {
    ParticipantJoined {
        participant_id: ParticipantId,
        name: String,
    },
}

/// Final `(name, score, mode)` emitted for the score ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalScore {
    pub name: String,
    pub score: u32,
    pub game_mode: String,
}
