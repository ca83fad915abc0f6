use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::engine::Engine;

/// Background task that compacts a hotel's WAL once enough appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    run_compactor_every(engine, threshold, Duration::from_secs(60)).await;
}

async fn run_compactor_every(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        debug!("hotel {}: {appends} appends since last compaction", engine.hotel_name());
        if let Err(e) = engine.compact_wal().await {
            error!("hotel {}: WAL compaction failed: {e}", engine.hotel_name());
        }
    }
}
