use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_contact, check_fragmentation, check_occupant, validate_range};
use super::{apply_to_guest, Engine, EngineError, Missing, WalCommand};

impl Engine {
    /// Open every room whose calendar is still empty as free from `from` onwards.
    /// Returns how many calendars were opened.
    pub async fn open_calendars(&self, from: NaiveDate) -> Result<usize, EngineError> {
        let mut opened = 0;
        for spec in &self.catalog.rooms {
            let rs = self.room(spec.number)?;
            let mut guard = rs.write().await;
            if !guard.calendar.is_empty() {
                continue;
            }
            let event = Event::CalendarOpened { room: spec.number, from };
            self.persist_and_apply(&mut guard, &event).await?;
            opened += 1;
        }
        Ok(opened)
    }

    /// Book `range` on a specific room. Containment is re-checked under the write lock.
    pub async fn book(&self, room: RoomNumber, range: DateRange, occupant: GuestId) -> Result<Booking, EngineError> {
        validate_range(&range)?;
        let rs = self.room(room)?;
        let mut guard = rs.write().await;
        check_fragmentation(&guard)?;

        let booking = Booking {
            id: Ulid::new(),
            room,
            range,
            occupant,
        };
        let event = Event::BookingConfirmed {
            booking,
            payment_due: None,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
        Ok(booking)
    }

    /// Undo a booking on `room`.
    ///
    /// A booking that is a registered guest's pending reservation is cancelled on
    /// the guest's behalf, returning the guest to idle.
    pub async fn cancel(&self, room: RoomNumber, range: DateRange) -> Result<(), EngineError> {
        let rs = self.room(room)?;
        loop {
            let occupant = rs.read().await.ledger.get(range.start).ok_or(EngineError::NotFound(
                Missing::Reservation {
                    room,
                    start: range.start,
                },
            ))?;

            // Guest lock before room lock.
            let handle = self.guest_handle(occupant).ok();
            let mut record = match &handle {
                Some(h) => Some(h.lock().await),
                None => None,
            };
            let owner = record
                .as_deref()
                .filter(|g| owns_reservation(g, room, &range))
                .map(|g| g.id);

            let mut guard = rs.write().await;
            if guard.ledger.get(range.start) != Some(occupant) {
                debug!("room {room}: reservation on {} changed hands, retrying cancel", range.start);
                continue;
            }
            let event = Event::BookingCancelled {
                room,
                range,
                guest: owner,
            };
            self.persist_and_apply(&mut guard, &event).await?;
            if let (Some(_), Some(record)) = (owner, record.as_deref_mut()) {
                apply_to_guest(record, &event);
            }
            metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
            return Ok(());
        }
    }

    pub async fn register_guest(&self, name: &str, email: &str) -> Result<GuestId, EngineError> {
        check_contact(name, email)?;
        let _registration = self.registration.lock().await;
        if self.guests.len() >= MAX_GUESTS_PER_HOTEL {
            return Err(EngineError::LimitExceeded("too many guests"));
        }
        if self.guest_index.contains_key(&(name.to_string(), email.to_string())) {
            return Err(EngineError::AlreadyExists(format!("guest {name} <{email}>")));
        }

        let id = self.next_guest_id.load(std::sync::atomic::Ordering::SeqCst);
        let event = Event::GuestRegistered {
            id,
            name: name.to_string(),
            email: email.to_string(),
        };
        self.wal_append(&event).await?;
        self.insert_guest(GuestRecord::new(id, name.to_string(), email.to_string()));
        debug!("registered guest {id}");
        Ok(id)
    }

    /// Book the best room of `room_type` for an idle guest.
    ///
    /// Candidates are tried in cost order; one taken since the search is skipped.
    pub async fn reserve(&self, guest: GuestId, room_type: RoomType, range: DateRange) -> Result<Booking, EngineError> {
        validate_range(&range)?;
        let handle = self.guest_handle(guest)?;
        let mut record = handle.lock().await;
        record.expect_state(GuestState::Idle)?;

        for candidate in self.find_rooms(room_type, range).await? {
            let rs = self.room(candidate.room)?;
            let mut guard = rs.write().await;
            if let Err(e) = check_fragmentation(&guard) {
                debug!("room {} skipped: {e}", candidate.room);
                continue;
            }

            let booking = Booking {
                id: Ulid::new(),
                room: candidate.room,
                range,
                occupant: guest,
            };
            let payment_due = (range.nights() as u64).saturating_mul(guard.rate);
            let event = Event::BookingConfirmed {
                booking,
                payment_due: Some(payment_due),
            };
            match self.persist_and_apply(&mut guard, &event).await {
                Ok(()) => {}
                Err(EngineError::AllocationConflict(_)) => {
                    debug!("room {} taken since search, trying next", candidate.room);
                    continue;
                }
                Err(e) => return Err(e),
            }
            apply_to_guest(&mut record, &event);
            metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);
            return Ok(booking);
        }

        metrics::counter!(observability::NO_AVAILABILITY_TOTAL).increment(1);
        Err(EngineError::AllocationConflict(range))
    }

    /// Cancel a reserved guest's booking and return them to idle.
    pub async fn cancel_reservation(&self, guest: GuestId) -> Result<Reservation, EngineError> {
        let handle = self.guest_handle(guest)?;
        let mut record = handle.lock().await;
        record.expect_state(GuestState::Reserved)?;
        let reservation = record
            .reservation
            .ok_or(EngineError::NotFound(Missing::GuestReservation(guest)))?;

        let rs = self.room(reservation.room)?;
        let mut guard = rs.write().await;
        check_occupant(&guard, reservation.range.start, guest)?;
        let event = Event::BookingCancelled {
            room: reservation.room,
            range: reservation.range,
            guest: Some(guest),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        apply_to_guest(&mut record, &event);
        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        Ok(reservation)
    }

    /// Consume a reserved guest's ledger entry. The calendar keeps the stay.
    pub async fn check_in(&self, guest: GuestId) -> Result<RoomNumber, EngineError> {
        let handle = self.guest_handle(guest)?;
        let mut record = handle.lock().await;
        record.expect_state(GuestState::Reserved)?;
        let reservation = record
            .reservation
            .ok_or(EngineError::NotFound(Missing::GuestReservation(guest)))?;

        let rs = self.room(reservation.room)?;
        let mut guard = rs.write().await;
        check_occupant(&guard, reservation.range.start, guest)?;
        let event = Event::CheckedIn {
            guest,
            room: reservation.room,
            start: reservation.range.start,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        apply_to_guest(&mut record, &event);
        metrics::counter!(observability::CHECK_INS_TOTAL).increment(1);
        Ok(reservation.room)
    }

    /// End a stay. The room's calendar is not reopened.
    pub async fn check_out(&self, guest: GuestId, paid: bool) -> Result<(), EngineError> {
        let handle = self.guest_handle(guest)?;
        let mut record = handle.lock().await;
        record.expect_state(GuestState::CheckedIn)?;

        let event = Event::CheckedOut { guest, paid };
        self.wal_append(&event).await?;
        apply_to_guest(&mut record, &event);
        metrics::counter!(observability::CHECK_OUTS_TOTAL).increment(1);
        Ok(())
    }

    /// Rewrite the WAL as one snapshot per guest and room.
    ///
    /// Holds the registration lock, every guest lock and every room lock until the
    /// new file is in place, so no append can fall between snapshot and swap.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _registration = self.registration.lock().await;

        let mut guest_ids: Vec<GuestId> = self.guests.iter().map(|e| *e.key()).collect();
        guest_ids.sort_unstable();
        let mut guests = Vec::with_capacity(guest_ids.len());
        for id in guest_ids {
            let handle = self.guest_handle(id)?;
            guests.push(handle.lock_owned().await);
        }
        let mut rooms = Vec::with_capacity(self.catalog.rooms.len());
        for spec in &self.catalog.rooms {
            let rs = self.room(spec.number)?;
            rooms.push(rs.read_owned().await);
        }

        let mut events = Vec::with_capacity(guests.len() + rooms.len());
        events.extend(guests.iter().map(|g| Event::GuestRestored { record: (**g).clone() }));
        events.extend(rooms.iter().map(|r| Event::RoomRestored { snapshot: r.snapshot() }));
        let count = events.len();

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!("hotel {}: WAL compacted to {count} events", self.hotel_name());
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Whether `guest` is waiting on exactly this booking.
fn owns_reservation(guest: &GuestRecord, room: RoomNumber, range: &DateRange) -> bool {
    guest.state == GuestState::Reserved
        && guest
            .reservation
            .is_some_and(|r| r.room == room && r.range == *range)
}
