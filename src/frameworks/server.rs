// Framework bootstrap for the arena server runtime.

use crate::domain::{Bounds, MatchConfig};
use crate::domain::tuning::rules::MatchRules;
use crate::frameworks::config;
use crate::interface_adapters::routes::app;
use crate::interface_adapters::state::{AppState, InMemoryScoreLedger, SystemClock};
use crate::use_cases::{MatchRegistry, MatchSettings, spawn_score_writer};

use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::mpsc;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let state = build_state();
    let app = app(state);

    tracing::info!(%address, "listening");

    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Arc<AppState> {
    let (width, height) = config::board_size();
    let settings = MatchSettings {
        snapshot_broadcast_capacity: config::SNAPSHOT_BROADCAST_CAPACITY,
        notice_broadcast_capacity: config::NOTICE_BROADCAST_CAPACITY,
        tick_interval: config::tick_interval(),
        defaults: MatchConfig {
            bounds: Bounds { width, height },
            ..MatchConfig::default()
        },
        rules: MatchRules::default(),
    };
    tracing::debug!(
        tick_ms = settings.tick_interval.as_millis() as u64,
        width,
        height,
        "match settings configured"
    );

    // Runners push final scores here; the writer appends them to the ledger.
    let (score_tx, score_rx) = mpsc::channel(config::SCORE_CHANNEL_CAPACITY);
    let registry = Arc::new(MatchRegistry::new(
        settings,
        score_tx,
        Arc::new(SystemClock),
    ));
    let state = Arc::new(AppState {
        registry: registry.clone(),
        ledger: InMemoryScoreLedger::default(),
    });

    spawn_score_writer(score_rx, state.leaderboard());
    registry.spawn_reaper(config::reaper_interval(), config::pending_match_timeout());

    state
}
