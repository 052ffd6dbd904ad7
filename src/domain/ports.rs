use async_trait::async_trait;

use crate::domain::scores::ScoreEntry;

// Port for the score ledger fed by finished participants.
#[async_trait]
pub trait ScoreLedger: Send + Sync {
    async fn append(&self, entry: ScoreEntry) -> Result<(), String>;
    // Highest scores first, at most `limit` entries.
    async fn top(&self, limit: usize) -> Result<Vec<ScoreEntry>, String>;
}

// Port for retrieving the current time.
pub trait Clock: Send + Sync {
    fn now_epoch_seconds(&self) -> u64;
}
