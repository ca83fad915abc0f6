mod allocation;
mod conflict;
mod error;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use allocation::{disruption_cost, find_best, query};
pub use error::{EngineError, IntegrityFault, Missing};

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedGuest = Arc<Mutex<GuestRecord>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL flush of {} events failed: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        // Appends are batched by the caller loop.
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// One hotel: its catalog, every room's calendar and ledger, and the guest registry.
pub struct Engine {
    catalog: Catalog,
    rooms: DashMap<RoomNumber, SharedRoomState>,
    guests: DashMap<GuestId, SharedGuest>,
    guest_index: DashMap<(String, String), GuestId>,
    next_guest_id: AtomicU64,
    /// Serializes registrations so ids stay sequential and (name, email) unique.
    registration: Mutex<()>,
    wal_tx: mpsc::Sender<WalCommand>,
}

/// Apply a room-level event. Fails without touching `rs` if the event does not fit.
fn apply_to_room(rs: &mut RoomState, event: &Event) -> Result<(), EngineError> {
    match event {
        Event::CalendarOpened { from, .. } => rs.open_calendar(*from),
        Event::BookingConfirmed { booking, .. } => {
            rs.book(booking.id, booking.range, booking.occupant).map(|_| ())
        }
        Event::BookingCancelled { range, .. } => rs.cancel(*range).map(|_| ()),
        Event::CheckedIn { start, .. } => rs.check_in(*start).map(|_| ()),
        Event::RoomRestored { snapshot } => rs.restore(snapshot),
        Event::GuestRegistered { .. } | Event::CheckedOut { .. } | Event::GuestRestored { .. } => Ok(()),
    }
}

/// Apply the guest-side effect of an event. Room-side checks have already passed.
fn apply_to_guest(guest: &mut GuestRecord, event: &Event) {
    match event {
        Event::BookingConfirmed {
            booking,
            payment_due: Some(payment_due),
        } => {
            guest.state = GuestState::Reserved;
            guest.reservation = Some(Reservation {
                booking_id: booking.id,
                room: booking.room,
                range: booking.range,
                payment_due: *payment_due,
            });
            guest.paid = false;
        }
        Event::BookingCancelled { guest: Some(_), .. } => {
            guest.state = GuestState::Idle;
            guest.reservation = None;
        }
        Event::CheckedIn { room, .. } => {
            guest.state = GuestState::CheckedIn;
            guest.current_room = Some(*room);
        }
        Event::CheckedOut { paid, .. } => {
            guest.state = GuestState::Idle;
            guest.reservation = None;
            guest.current_room = None;
            guest.paid = *paid;
        }
        Event::GuestRestored { record } => *guest = record.clone(),
        _ => {}
    }
}

/// Room an event mutates, if any.
fn event_room(event: &Event) -> Option<RoomNumber> {
    match event {
        Event::CalendarOpened { room, .. }
        | Event::BookingCancelled { room, .. }
        | Event::CheckedIn { room, .. } => Some(*room),
        Event::BookingConfirmed { booking, .. } => Some(booking.room),
        Event::RoomRestored { snapshot } => Some(snapshot.room),
        Event::GuestRegistered { .. } | Event::CheckedOut { .. } | Event::GuestRestored { .. } => None,
    }
}

/// Guest record an event mutates, if any. Registration is handled separately.
fn event_guest(event: &Event) -> Option<GuestId> {
    match event {
        Event::BookingConfirmed {
            booking,
            payment_due: Some(_),
        } => Some(booking.occupant),
        Event::BookingCancelled { guest, .. } => *guest,
        Event::CheckedIn { guest, .. } | Event::CheckedOut { guest, .. } => Some(*guest),
        Event::GuestRestored { record } => Some(record.id),
        _ => None,
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, catalog: Catalog) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let rooms = DashMap::new();
        for spec in &catalog.rooms {
            let rs = RoomState::new(spec.number, spec.room_type, spec.cost);
            rooms.insert(spec.number, Arc::new(RwLock::new(rs)));
        }

        let engine = Self {
            catalog,
            rooms,
            guests: DashMap::new(),
            guest_index: DashMap::new(),
            next_guest_id: AtomicU64::new(0),
            registration: Mutex::new(()),
            wal_tx,
        };

        // Sole owner of every lock here, so try_write/try_lock cannot contend.
        // Blocking variants would panic inside the runtime.
        let mut skipped = 0usize;
        for event in &events {
            if let Err(e) = engine.replay_event(event) {
                warn!("replay of {} skipped event: {e}", engine.hotel_name());
                skipped += 1;
            }
        }
        info!(
            "hotel {} loaded: {} rooms, {} guests, {} events replayed ({skipped} skipped)",
            engine.hotel_name(),
            engine.rooms.len(),
            engine.guests.len(),
            events.len()
        );
        Ok(engine)
    }

    fn replay_event(&self, event: &Event) -> Result<(), EngineError> {
        match event {
            Event::GuestRegistered { id, name, email } => {
                self.insert_guest(GuestRecord::new(*id, name.clone(), email.clone()));
                return Ok(());
            }
            Event::GuestRestored { record } if !self.guests.contains_key(&record.id) => {
                self.insert_guest(record.clone());
                return Ok(());
            }
            _ => {}
        }
        if let Some(room) = event_room(event) {
            let rs = self.room(room)?;
            let mut guard = rs
                .try_write()
                .map_err(|_| EngineError::WalError(format!("room {room} locked during replay")))?;
            apply_to_room(&mut guard, event)?;
        }
        if let Some(id) = event_guest(event) {
            let guest = self.guest_handle(id)?;
            let mut record = guest
                .try_lock()
                .map_err(|_| EngineError::WalError(format!("guest {id} locked during replay")))?;
            apply_to_guest(&mut record, event);
        }
        Ok(())
    }

    pub(super) fn insert_guest(&self, record: GuestRecord) {
        self.next_guest_id.fetch_max(record.id.saturating_add(1), Ordering::SeqCst);
        self.guest_index
            .insert((record.name.clone(), record.email.clone()), record.id);
        self.guests.insert(record.id, Arc::new(Mutex::new(record)));
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Check the event against a copy of the room, make it durable, then publish the copy.
    /// A rejected event or failed write leaves `rs` untouched.
    pub(super) async fn persist_and_apply(&self, rs: &mut RoomState, event: &Event) -> Result<(), EngineError> {
        let mut next = rs.clone();
        if let Err(e) = apply_to_room(&mut next, event) {
            if e.is_fatal() {
                error!("hotel {}: {e}", self.hotel_name());
            }
            return Err(e);
        }
        self.wal_append(event).await?;
        *rs = next;
        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn hotel_name(&self) -> &str {
        &self.catalog.hotel_name
    }

    pub fn room(&self, number: RoomNumber) -> Result<SharedRoomState, EngineError> {
        self.rooms
            .get(&number)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(Missing::Room(number)))
    }

    pub(super) fn guest_handle(&self, id: GuestId) -> Result<SharedGuest, EngineError> {
        self.guests
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(Missing::Guest(id)))
    }
}
