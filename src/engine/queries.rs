use crate::model::*;

use super::allocation::find_best;
use super::{Engine, EngineError};

impl Engine {
    /// Rooms of `room_type` that can take `range`, best fit first.
    ///
    /// Read locks on every room of the type are held together so the search sees
    /// one consistent picture. The result may be stale by the time it is used.
    pub async fn find_rooms(&self, room_type: RoomType, range: DateRange) -> Result<Vec<Candidate>, EngineError> {
        let numbers = self.catalog.rooms_of_type(room_type);
        let mut guards = Vec::with_capacity(numbers.len());
        for number in numbers {
            let rs = self.room(number)?;
            guards.push((number, rs.read_owned().await));
        }
        find_best(guards.iter().map(|(n, g)| (*n, &g.calendar)), &range)
    }

    pub async fn calendar(&self, room: RoomNumber) -> Result<Vec<FreeInterval>, EngineError> {
        let rs = self.room(room)?;
        let guard = rs.read().await;
        Ok(guard.calendar.intervals().to_vec())
    }

    pub async fn room_snapshot(&self, room: RoomNumber) -> Result<RoomSnapshot, EngineError> {
        let rs = self.room(room)?;
        let guard = rs.read().await;
        Ok(guard.snapshot())
    }

    /// Every room in catalog order.
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let mut rooms = Vec::with_capacity(self.catalog.rooms.len());
        for spec in &self.catalog.rooms {
            let Ok(rs) = self.room(spec.number) else { continue };
            let guard = rs.read().await;
            rooms.push(RoomInfo {
                number: guard.number,
                room_type: guard.room_type,
                rate: guard.rate,
                free_intervals: guard.calendar.len(),
                pending_reservations: guard.ledger.len(),
            });
        }
        rooms
    }

    pub async fn guest(&self, id: GuestId) -> Result<GuestRecord, EngineError> {
        let handle = self.guest_handle(id)?;
        let record = handle.lock().await;
        Ok(record.clone())
    }

    pub fn guest_id(&self, name: &str, email: &str) -> Option<GuestId> {
        self.guest_index
            .get(&(name.to_string(), email.to_string()))
            .map(|e| *e.value())
    }

    /// Guests currently in `state`, by id.
    pub async fn guests_in_state(&self, state: GuestState) -> Vec<GuestRecord> {
        let handles: Vec<_> = self.guests.iter().map(|e| e.value().clone()).collect();
        let mut found = Vec::new();
        for handle in handles {
            let record = handle.lock().await;
            if record.state == state {
                found.push(record.clone());
            }
        }
        found.sort_by_key(|g| g.id);
        found
    }

    pub fn guest_count(&self) -> usize {
        self.guests.len()
    }
}
