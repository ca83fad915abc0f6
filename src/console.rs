use std::fmt::Write as _;
use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

use crate::command::{self, Command, CommandError};
use crate::engine::{Engine, EngineError};
use crate::hotel::HotelManager;
use crate::model::*;
use crate::observability;

const HELP: &str = "\
commands:
  initialize <catalog.json> [YYYY-MM-DD]   create a hotel, rooms free from the date (default today)
  begin <hotel>                            open a session on a hotel
  quit                                     close the session and leave
  register <name> <email>
  reserve <client> <room-type> <start> <end>
  delete-reservation <client>
  check-in <client>
  check-out <client> <paid>
  client-info <client>
  current-clients <1|2|3>                  1 checked in, 2 reserved, 3 idle
  client-id <name> <email>
  available <room-type> <start> <end>
  calendar <room>
  rooms
  export <room>";

/// Line-oriented front end over one hotel session at a time.
pub struct Console {
    manager: Arc<HotelManager>,
    session: Option<Arc<Engine>>,
}

impl Console {
    pub fn new(manager: Arc<HotelManager>) -> Self {
        Self { manager, session: None }
    }

    pub fn session(&self) -> Option<&Arc<Engine>> {
        self.session.as_ref()
    }

    /// Read commands until EOF or `quit`, writing one reply per command.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (reply, quit) = match command::parse(trimmed) {
                Ok(cmd) => {
                    let quit = cmd == Command::Quit;
                    (self.dispatch(cmd).await, quit)
                }
                Err(e) => (Err(ConsoleError::Command(e)), false),
            };
            let text = reply.unwrap_or_else(|e| {
                if e.is_fatal() {
                    error!("{e}");
                } else {
                    debug!("command failed: {e}");
                }
                format!("error: {e}")
            });
            writer.write_all(text.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            if quit {
                break;
            }
        }
        Ok(())
    }

    /// Execute one command, recording its latency and outcome.
    pub async fn dispatch(&mut self, cmd: Command) -> Result<String, ConsoleError> {
        let label = observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.execute(cmd).await;
        metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute(&mut self, cmd: Command) -> Result<String, ConsoleError> {
        match cmd {
            Command::Initialize { path, opened_on } => {
                if let Some(engine) = &self.session {
                    return Err(ConsoleError::SessionOpen(engine.hotel_name().to_string()));
                }
                let json = tokio::fs::read_to_string(&path).await?;
                let opened_on = opened_on.unwrap_or_else(|| chrono::Local::now().date_naive());
                let engine = self.manager.initialize(&json, opened_on).await?;
                Ok(format!(
                    "Hotel {} initialized with {} rooms, open from {opened_on}.",
                    engine.hotel_name(),
                    engine.catalog().rooms.len()
                ))
            }
            Command::Begin { hotel } => {
                if let Some(engine) = &self.session {
                    return Err(ConsoleError::SessionOpen(engine.hotel_name().to_string()));
                }
                let engine = self.manager.open(&hotel)?;
                let name = engine.hotel_name().to_string();
                self.session = Some(engine);
                info!("session opened for {name}");
                Ok(format!("The session for {name} is now open."))
            }
            Command::Quit => match self.session.take() {
                Some(engine) => {
                    info!("session closed for {}", engine.hotel_name());
                    Ok(format!("The session for {} is now closed.", engine.hotel_name()))
                }
                None => Ok("Goodbye.".into()),
            },
            Command::Help => Ok(HELP.into()),
            Command::Register { name, email } => {
                let id = self.engine()?.register_guest(&name, &email).await?;
                Ok(format!("Registration successful! Client ID: {id}"))
            }
            Command::Reserve {
                guest,
                room_type,
                range,
            } => {
                let engine = self.engine()?;
                let booking = engine.reserve(guest, room_type, range).await?;
                let rate = engine.catalog().nightly_rate(booking.room).unwrap_or(0);
                let due = engine
                    .guest(guest)
                    .await?
                    .reservation
                    .map_or(0, |r| r.payment_due);
                Ok(format!(
                    "Reservation successful! Room {} from {} to {}, {} nights at {rate}, payment due {due}.",
                    booking.room,
                    range.start,
                    range.end,
                    range.nights()
                ))
            }
            Command::DeleteReservation { guest } => {
                let reservation = self.engine()?.cancel_reservation(guest).await?;
                Ok(format!(
                    "The reservation has been deleted. Room {} is free again for {}.",
                    reservation.room, reservation.range
                ))
            }
            Command::CheckIn { guest } => {
                let room = self.engine()?.check_in(guest).await?;
                Ok(format!("You are now checked in! Room {room}."))
            }
            Command::CheckOut { guest, paid } => {
                self.engine()?.check_out(guest, paid).await?;
                Ok("You are now checked out!".into())
            }
            Command::ClientInfo { guest } => {
                let record = self.engine()?.guest(guest).await?;
                Ok(format_guest(&record))
            }
            Command::CurrentClients { state } => {
                let guests = self.engine()?.guests_in_state(state).await;
                if guests.is_empty() {
                    return Ok(format!("No clients are {state}."));
                }
                Ok(guests.iter().map(format_guest).collect::<Vec<_>>().join("\n"))
            }
            Command::ClientId { name, email } => match self.engine()?.guest_id(&name, &email) {
                Some(id) => Ok(format!("The client ID for {name} is {id}")),
                None => Err(ConsoleError::UnknownClient { name, email }),
            },
            Command::Available { room_type, range } => {
                let candidates = self.engine()?.find_rooms(room_type, range).await?;
                if candidates.is_empty() {
                    return Ok("Sorry! There are no rooms available!".into());
                }
                let mut out = String::new();
                for (rank, c) in candidates.iter().enumerate() {
                    let _ = writeln!(out, "{}. room {} (leaves {} free days)", rank + 1, c.room, c.cost);
                }
                Ok(out.trim_end().to_string())
            }
            Command::Calendar { room } => {
                let intervals = self.engine()?.calendar(room).await?;
                if intervals.is_empty() {
                    return Ok(format!("Room {room} has no free days."));
                }
                Ok(intervals.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("\n"))
            }
            Command::Rooms => {
                let mut out = String::new();
                for room in self.engine()?.list_rooms().await {
                    let _ = writeln!(
                        out,
                        "room {} type {} rate {}: {} free intervals, {} pending reservations",
                        room.number, room.room_type, room.rate, room.free_intervals, room.pending_reservations
                    );
                }
                Ok(out.trim_end().to_string())
            }
            Command::Export { room } => {
                let snapshot = self.engine()?.room_snapshot(room).await?;
                serde_json::to_string_pretty(&snapshot).map_err(|e| ConsoleError::Io(io::Error::other(e)))
            }
        }
    }

    fn engine(&self) -> Result<Arc<Engine>, ConsoleError> {
        self.session.clone().ok_or(ConsoleError::NoSession)
    }
}

fn format_guest(g: &GuestRecord) -> String {
    let mut out = format!("{}: {} <{}> state {} ({})", g.id, g.name, g.email, g.state.code(), g.state);
    if let Some(r) = &g.reservation {
        let _ = write!(out, ", room {} {} due {}", r.room, r.range, r.payment_due);
    }
    if let Some(room) = g.current_room {
        let _ = write!(out, ", in room {room}");
    }
    if g.state == GuestState::Idle && g.paid {
        out.push_str(", last stay paid");
    }
    out
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConsoleError {
    Command(CommandError),
    Engine(EngineError),
    Io(io::Error),
    NoSession,
    SessionOpen(String),
    UnknownClient { name: String, email: String },
}

impl ConsoleError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ConsoleError::Engine(e) if e.is_fatal())
    }
}

impl std::fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleError::Command(e) => write!(f, "{e}"),
            ConsoleError::Engine(EngineError::AllocationConflict(_)) => {
                write!(f, "Sorry! There are no rooms available!")
            }
            ConsoleError::Engine(e) => write!(f, "{e}"),
            ConsoleError::Io(e) => write!(f, "{e}"),
            ConsoleError::NoSession => write!(f, "no session; use `begin <hotel>` first"),
            ConsoleError::SessionOpen(hotel) => {
                write!(f, "session for {hotel} already open; quit before use")
            }
            ConsoleError::UnknownClient { name, email } => write!(
                f,
                "the name: {name} and email: {email} does not match any known client ID"
            ),
        }
    }
}

impl std::error::Error for ConsoleError {}

impl From<CommandError> for ConsoleError {
    fn from(e: CommandError) -> Self {
        ConsoleError::Command(e)
    }
}

impl From<EngineError> for ConsoleError {
    fn from(e: EngineError) -> Self {
        ConsoleError::Engine(e)
    }
}

impl From<io::Error> for ConsoleError {
    fn from(e: io::Error) -> Self {
        ConsoleError::Io(e)
    }
}
