// Wire protocol DTOs and conversions for public arena server messages.

use crate::domain::state::{
    Direction, Lifecycle, ParticipantKind, ParticipantSnapshot, Position, Snapshot,
};
use crate::domain::scores::ScoreEntry;
use crate::domain::ParticipantId;
use crate::use_cases::{EndReason, MatchStatus};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PARTICIPANT_NAME: &str = "Player";

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Reply to CreateMatch; the connection is now bound to the new match.
    MatchCreated(MatchBindingDto),
    // Reply to JoinMatch.
    MatchJoined(MatchBindingDto),
    ParticipantJoined {
        participant_id: ParticipantId,
        name: String,
    },
    MatchStatus(MatchStatusDto),
    // Snapshot of the match for a given tick.
    StateUpdate(SnapshotDto),
    Error {
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    CreateMatch(CreateMatchPayload),
    JoinMatch(JoinMatchPayload),
    // Starts the match this connection is bound to.
    StartMatch,
    SetDirection(SetDirectionPayload),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMatchPayload {
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub add_ai: bool,
    #[serde(default)]
    pub ai_difficulty: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinMatchPayload {
    pub match_id: String,
    #[serde(default)]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetDirectionPayload {
    pub direction: VectorDto,
}

/// Unit grid vector; `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorDto {
    pub x: i32,
    pub y: i32,
}

impl From<Position> for VectorDto {
    fn from(pos: Position) -> Self {
        Self { x: pos.x, y: pos.y }
    }
}

impl From<Direction> for VectorDto {
    fn from(direction: Direction) -> Self {
        let (x, y) = direction.delta();
        Self { x, y }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchBindingDto {
    pub match_id: String,
    pub participant_id: ParticipantId,
    pub snapshot: SnapshotDto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchStatusDto {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

impl From<MatchStatus> for MatchStatusDto {
    fn from(status: MatchStatus) -> Self {
        match status {
            MatchStatus::Pending => Self {
                status: "pending",
                reason: None,
            },
            MatchStatus::Running => Self {
                status: "running",
                reason: None,
            },
            MatchStatus::Ended { reason } => Self {
                status: "ended",
                reason: Some(end_reason_label(reason)),
            },
        }
    }
}

fn end_reason_label(reason: EndReason) -> &'static str {
    match reason {
        EndReason::AllEliminated => "all_eliminated",
        EndReason::Stopped => "stopped",
        EndReason::Removed => "removed",
        EndReason::Fault => "fault",
    }
}

fn lifecycle_label(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::Pending => "pending",
        Lifecycle::Running => "running",
        Lifecycle::Ended => "ended",
    }
}

/// Full match view sent on binding and on every tick.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDto {
    pub match_id: String,
    pub tick: u64,
    pub width: i32,
    pub height: i32,
    pub lifecycle: &'static str,
    pub food: Option<VectorDto>,
    pub obstacles: Vec<VectorDto>,
    pub power_ups: Vec<VectorDto>,
    pub participants: Vec<ParticipantDto>,
}

impl From<&Snapshot> for SnapshotDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            match_id: snapshot.match_id.clone(),
            tick: snapshot.tick,
            width: snapshot.board.width,
            height: snapshot.board.height,
            lifecycle: lifecycle_label(snapshot.board.lifecycle),
            food: snapshot.board.food.map(VectorDto::from),
            obstacles: snapshot.board.obstacles.iter().copied().map(VectorDto::from).collect(),
            power_ups: snapshot.board.power_ups.iter().copied().map(VectorDto::from).collect(),
            participants: snapshot.participants.iter().map(ParticipantDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantDto {
    pub id: ParticipantId,
    pub name: String,
    // "human" or "ai"
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<&'static str>,
    // Head first.
    pub body: Vec<VectorDto>,
    pub direction: VectorDto,
    pub score: u32,
    pub alive: bool,
}

impl From<&ParticipantSnapshot> for ParticipantDto {
    fn from(p: &ParticipantSnapshot) -> Self {
        let (kind, difficulty) = match p.kind {
            ParticipantKind::Human => ("human", None),
            ParticipantKind::Controlled { difficulty } => ("ai", Some(difficulty.as_str())),
        };
        Self {
            id: p.id,
            name: p.name.clone(),
            kind,
            difficulty,
            body: p.body.iter().copied().map(VectorDto::from).collect(),
            direction: p.direction.into(),
            score: p.score,
            alive: p.alive,
        }
    }
}

/// Score submission body for `POST /api/scores`.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveScoreRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub score: u32,
    #[serde(default)]
    pub game_mode: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveScoreResponse {
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreEntryDto {
    pub name: String,
    pub score: u32,
    pub game_mode: String,
    pub timestamp: u64,
}

impl From<ScoreEntry> for ScoreEntryDto {
    fn from(entry: ScoreEntry) -> Self {
        Self {
            name: entry.name,
            score: entry.score,
            game_mode: entry.game_mode,
            timestamp: entry.recorded_at,
        }
    }
}
