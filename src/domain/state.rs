// Domain-level match entities, intent slots and snapshot types.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

pub type MatchId = String;
pub type ParticipantId = u64;

/// Grid cell coordinates. `x` grows to the right, `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the neighbouring cell one step along `direction`.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Raised when a raw vector is not one of the four unit directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidDirection {
    pub dx: i32,
    pub dy: i32,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub fn is_opposite(self, other: Direction) -> bool {
        self.opposite() == other
    }

    // Slot encoding; 0 is reserved for "no intent".
    fn to_slot(self) -> u8 {
        match self {
            Direction::Up => 1,
            Direction::Down => 2,
            Direction::Left => 3,
            Direction::Right => 4,
        }
    }

    fn from_slot(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Direction::Up),
            2 => Some(Direction::Down),
            3 => Some(Direction::Left),
            4 => Some(Direction::Right),
            _ => None,
        }
    }
}

impl TryFrom<(i32, i32)> for Direction {
    type Error = InvalidDirection;

    fn try_from((dx, dy): (i32, i32)) -> Result<Self, Self::Error> {
        match (dx, dy) {
            (0, -1) => Ok(Direction::Up),
            (0, 1) => Ok(Direction::Down),
            (-1, 0) => Ok(Direction::Left),
            (1, 0) => Ok(Direction::Right),
            _ => Err(InvalidDirection { dx, dy }),
        }
    }
}

/// Pending movement intent shared between command handlers and the tick.
///
/// Writers replace the whole value with a single atomic store, so the tick
/// always observes either no intent or one complete direction.
#[derive(Debug, Default)]
pub struct IntentSlot(AtomicU8);

impl IntentSlot {
    pub fn store(&self, direction: Direction) {
        self.0.store(direction.to_slot(), Ordering::Release);
    }

    /// Consumes the pending intent, leaving the slot empty.
    pub fn take(&self) -> Option<Direction> {
        Direction::from_slot(self.0.swap(0, Ordering::AcqRel))
    }

    pub fn peek(&self) -> Option<Direction> {
        Direction::from_slot(self.0.load(Ordering::Acquire))
    }
}

/// Ordered snake body; index 0 is the head, the back is the oldest segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snake {
    body: VecDeque<Position>,
}

impl Snake {
    pub fn new(head: Position) -> Self {
        Self {
            body: VecDeque::from([head]),
        }
    }

    /// Builds a snake from head-first segments. Returns `None` for an empty body.
    pub fn from_segments(segments: impl IntoIterator<Item = Position>) -> Option<Self> {
        let body: VecDeque<Position> = segments.into_iter().collect();
        if body.is_empty() {
            None
        } else {
            Some(Self { body })
        }
    }

    pub fn head(&self) -> Option<Position> {
        self.body.front().copied()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.body.contains(&pos)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Position> {
        self.body.iter()
    }

    /// Pushes a new head; the tail is dropped unless the snake grows.
    pub fn advance(&mut self, new_head: Position, grow: bool) {
        self.body.push_front(new_head);
        if !grow {
            self.body.pop_back();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Parses a difficulty label, falling back to `Medium` for unknown input.
    pub fn parse_or_default(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            _ => Difficulty::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantKind {
    Human,
    Controlled { difficulty: Difficulty },
}

#[derive(Debug)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    pub kind: ParticipantKind,
    pub snake: Snake,
    pub direction: Direction,
    // Written by command handlers, consumed by the tick.
    pub intent: Arc<IntentSlot>,
    pub score: u32,
    pub alive: bool,
}

impl Participant {
    pub fn new(id: ParticipantId, name: String, kind: ParticipantKind, head: Position) -> Self {
        Self {
            id,
            name,
            kind,
            snake: Snake::new(head),
            direction: Direction::Right,
            intent: Arc::new(IntentSlot::default()),
            score: 0,
            alive: true,
        }
    }
}

/// Playable area: `0 <= x < width`, `0 <= y < height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn contains(&self, pos: Position) -> bool {
        pos.x >= 0 && pos.x < self.width && pos.y >= 0 && pos.y < self.height
    }

    pub fn cell_count(&self) -> usize {
        (self.width.max(0) as usize) * (self.height.max(0) as usize)
    }

    /// Clamps a position into the playable area.
    pub fn clamp(&self, pos: Position) -> Position {
        Position {
            x: pos.x.clamp(0, (self.width - 1).max(0)),
            y: pos.y.clamp(0, (self.height - 1).max(0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Running,
    Ended,
}

#[derive(Debug, Clone)]
pub struct Board {
    pub bounds: Bounds,
    // None while no free cell could be found.
    pub food: Option<Position>,
    pub obstacles: BTreeSet<Position>,
    pub power_ups: BTreeSet<Position>,
    pub lifecycle: Lifecycle,
}

/// Per-match settings chosen at creation.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub bounds: Bounds,
    /// Label carried into score records (e.g. "classic").
    pub mode: String,
    /// Random obstacles placed when the match is created.
    pub obstacle_count: usize,
    /// Fixed RNG seed; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            bounds: Bounds {
                width: 30,
                height: 30,
            },
            mode: "classic".to_string(),
            obstacle_count: 0,
            seed: None,
        }
    }
}

/// Authoritative state of one match.
pub struct MatchState {
    pub id: MatchId,
    pub board: Board,
    // Order of addition; the tick walks participants in this order.
    pub participants: Vec<Participant>,
    pub mode: String,
    pub created_at: u64,
    pub tick: u64,
    pub rng: StdRng,
}

impl MatchState {
    pub fn new(id: MatchId, config: &MatchConfig, created_at: u64) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            id,
            board: Board {
                bounds: config.bounds,
                food: None,
                obstacles: BTreeSet::new(),
                power_ups: BTreeSet::new(),
                lifecycle: Lifecycle::Pending,
            },
            participants: Vec::new(),
            mode: config.mode.clone(),
            created_at,
            tick: 0,
            rng,
        }
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn alive_count(&self) -> usize {
        self.participants.iter().filter(|p| p.alive).count()
    }

    /// True if any snake segment (alive or dead) or obstacle covers `pos`.
    pub fn is_occupied(&self, pos: Position) -> bool {
        self.board.obstacles.contains(&pos)
            || self.participants.iter().any(|p| p.snake.contains(pos))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            match_id: self.id.clone(),
            tick: self.tick,
            board: BoardSnapshot {
                width: self.board.bounds.width,
                height: self.board.bounds.height,
                food: self.board.food,
                obstacles: self.board.obstacles.iter().copied().collect(),
                power_ups: self.board.power_ups.iter().copied().collect(),
                lifecycle: self.board.lifecycle,
            },
            participants: self.participants.iter().map(ParticipantSnapshot::from).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub width: i32,
    pub height: i32,
    pub food: Option<Position>,
    pub obstacles: Vec<Position>,
    pub power_ups: Vec<Position>,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantSnapshot {
    pub id: ParticipantId,
    pub name: String,
    pub kind: ParticipantKind,
    pub body: Vec<Position>,
    pub direction: Direction,
    pub score: u32,
    pub alive: bool,
}

impl ParticipantSnapshot {
    pub fn head(&self) -> Option<Position> {
        self.body.first().copied()
    }
}

impl From<&Participant> for ParticipantSnapshot {
    fn from(p: &Participant) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            kind: p.kind,
            body: p.snake.segments().copied().collect(),
            direction: p.direction,
            score: p.score,
            alive: p.alive,
        }
    }
}

/// Immutable post-tick copy of a match; shared as `Arc<Snapshot>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub match_id: MatchId,
    pub tick: u64,
    pub board: BoardSnapshot,
    pub participants: Vec<ParticipantSnapshot>,
}

impl Snapshot {
    pub fn participant(&self, id: ParticipantId) -> Option<&ParticipantSnapshot> {
        self.participants.iter().find(|p| p.id == id)
    }
}
