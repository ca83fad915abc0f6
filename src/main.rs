use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::BufReader;
use tracing::info;

use innkeep::console::Console;
use innkeep::hotel::HotelManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let metrics_port: Option<u16> = std::env::var("INNKEEP_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    innkeep::observability::init(metrics_port)?;

    let data_dir = std::env::var("INNKEEP_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let compact_threshold: u64 = std::env::var("INNKEEP_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let manager = Arc::new(HotelManager::new(PathBuf::from(&data_dir), compact_threshold));
    info!("innkeep ready");
    info!("  data_dir: {data_dir}");
    info!("  compact_threshold: {compact_threshold}");
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let mut console = Console::new(manager);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = console.run(stdin, stdout) => result?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    info!("innkeep stopped");
    Ok(())
}
