use crate::domain::ports::{Clock, ScoreLedger};
use crate::domain::scores::ScoreEntry;
use crate::use_cases::types::FinalScore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const DEFAULT_PLAYER_NAME: &str = "Anonymous";
pub const DEFAULT_GAME_MODE: &str = "classic";
pub const LEADERBOARD_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeaderboardError {
    #[error("score storage failed")]
    StorageFailure,
}

// Score recording and ranking with injected dependencies.
#[derive(Clone)]
pub struct Leaderboard<C, L> {
    pub clock: C,
    pub ledger: L,
}

impl<C, L> Leaderboard<C, L>
where
    C: Clock,
    L: ScoreLedger,
{
    /// Appends one result; blank names and modes fall back to the defaults.
    pub async fn record(
        &self,
        name: Option<&str>,
        score: u32,
        game_mode: Option<&str>,
    ) -> Result<ScoreEntry, LeaderboardError> {
        let entry = ScoreEntry {
            name: non_blank(name).unwrap_or(DEFAULT_PLAYER_NAME).to_string(),
            score,
            game_mode: non_blank(game_mode).unwrap_or(DEFAULT_GAME_MODE).to_string(),
            recorded_at: self.clock.now_epoch_seconds(),
        };

        self.ledger.append(entry.clone()).await.map_err(|e| {
            warn!(error = %e, "failed to append score");
            LeaderboardError::StorageFailure
        })?;
        Ok(entry)
    }

    /// Best scores first, at most `LEADERBOARD_SIZE` entries.
    pub async fn top(&self) -> Result<Vec<ScoreEntry>, LeaderboardError> {
        self.ledger.top(LEADERBOARD_SIZE).await.map_err(|e| {
            warn!(error = %e, "failed to read scores");
            LeaderboardError::StorageFailure
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Drains final scores emitted by match runners into the ledger.
pub fn spawn_score_writer<C, L>(
    mut score_rx: mpsc::Receiver<FinalScore>,
    leaderboard: Leaderboard<C, L>,
) -> JoinHandle<()>
where
    C: Clock + 'static,
    L: ScoreLedger + 'static,
{
    tokio::spawn(async move {
        while let Some(result) = score_rx.recv().await {
            match leaderboard
                .record(Some(&result.name), result.score, Some(&result.game_mode))
                .await
            {
                Ok(entry) => debug!(name = %entry.name, score = entry.score, "score recorded"),
                Err(e) => warn!(error = %e, name = %result.name, "dropping final score"),
            }
        }
        debug!("score channel closed; writer exiting");
    })
}
