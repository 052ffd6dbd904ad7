// Final result of one participant, as recorded by the score ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub name: String,
    pub score: u32,
    pub game_mode: String,
    pub recorded_at: u64,
}
