use crate::app::AppState;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

const PRUNE_PERIOD_S: u64 = 5;

/// Periodically drop expired, unlocked streams. The task exits on its own
/// once the state lock reports shutdown.
pub fn spawn(app: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        crate::info!("Starting prune loop");
        let mut ticker = tokio::time::interval(Duration::from_secs(PRUNE_PERIOD_S));
        loop {
            ticker.tick().await;
            let Ok(mut state) = app.state.lock() else {
                crate::info!("Prune task stopping: server is shutting down");
                return;
            };
            let now = Utc::now();
            let expired: Vec<String> = state
                .streams
                .iter()
                .filter(|(_, stream)| stream.expired(now))
                .map(|(name, _)| name.clone())
                .collect();
            for name in expired {
                crate::info!("Pruning expired channel {name}");
                state.streams.remove(&name);
            }
        }
    })
}
