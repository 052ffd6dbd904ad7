use crate::domain::ports::{Clock, ScoreLedger};
use crate::domain::scores::ScoreEntry;
use crate::use_cases::{Leaderboard, MatchRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

pub struct AppState {
    // Owns every live match and its runner.
    pub registry: Arc<MatchRegistry>,
    // Recorded results, shared with the score writer task.
    pub ledger: InMemoryScoreLedger,
}

impl AppState {
    pub fn leaderboard(&self) -> Leaderboard<SystemClock, InMemoryScoreLedger> {
        Leaderboard {
            clock: SystemClock,
            ledger: self.ledger.clone(),
        }
    }
}

// In-memory score ledger; results are lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryScoreLedger {
    pub entries: Arc<RwLock<Vec<ScoreEntry>>>,
}

#[async_trait]
impl ScoreLedger for InMemoryScoreLedger {
    async fn append(&self, entry: ScoreEntry) -> Result<(), String> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn top(&self, limit: usize) -> Result<Vec<ScoreEntry>, String> {
        let mut entries = self.entries.read().await.clone();
        // Stable sort keeps earlier entries ahead on ties.
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[derive(Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}
