use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

use crate::command::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: console commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "innkeep_commands_total";

/// Histogram: command latency in seconds. Labels: command.
pub const COMMAND_DURATION_SECONDS: &str = "innkeep_command_duration_seconds";

// ── Reservation outcomes ────────────────────────────────────────

/// Counter: bookings committed, direct or through a guest reservation.
pub const BOOKINGS_TOTAL: &str = "innkeep_bookings_total";

/// Counter: bookings cancelled.
pub const CANCELLATIONS_TOTAL: &str = "innkeep_cancellations_total";

/// Counter: reservation requests no room could take.
pub const NO_AVAILABILITY_TOTAL: &str = "innkeep_no_availability_total";

pub const CHECK_INS_TOTAL: &str = "innkeep_check_ins_total";

pub const CHECK_OUTS_TOTAL: &str = "innkeep_check_outs_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: hotels with a loaded engine.
pub const HOTELS_ACTIVE: &str = "innkeep_hotels_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "innkeep_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "innkeep_wal_flush_batch_size";

/// Counter: WAL compactions completed.
pub const WAL_COMPACTIONS_TOTAL: &str = "innkeep_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Initialize { .. } => "initialize",
        Command::Begin { .. } => "begin",
        Command::Quit => "quit",
        Command::Help => "help",
        Command::Register { .. } => "register",
        Command::Reserve { .. } => "reserve",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::CheckIn { .. } => "check_in",
        Command::CheckOut { .. } => "check_out",
        Command::ClientInfo { .. } => "client_info",
        Command::CurrentClients { .. } => "current_clients",
        Command::ClientId { .. } => "client_id",
        Command::Available { .. } => "available",
        Command::Calendar { .. } => "calendar",
        Command::Rooms => "rooms",
        Command::Export { .. } => "export",
    }
}
