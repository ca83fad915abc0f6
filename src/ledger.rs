use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::IntegrityFault;
use crate::model::GuestId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub start: NaiveDate,
    pub occupant: GuestId,
}

/// Pending reservations of one room, keyed and sorted by start date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(mut entries: Vec<LedgerEntry>) -> Result<Self, IntegrityFault> {
        entries.sort_by_key(|e| e.start);
        if let Some(pair) = entries.windows(2).find(|w| w[0].start == w[1].start) {
            return Err(IntegrityFault::DuplicateReservation {
                start: pair[1].start,
                occupant: pair[0].occupant,
            });
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, start: NaiveDate) -> Option<GuestId> {
        self.entries
            .binary_search_by_key(&start, |e| e.start)
            .ok()
            .map(|pos| self.entries[pos].occupant)
    }

    /// Insert keeping start order. A start date that is already taken is refused
    /// and the existing entry is kept.
    pub fn insert(&mut self, start: NaiveDate, occupant: GuestId) -> Result<(), IntegrityFault> {
        match self.entries.binary_search_by_key(&start, |e| e.start) {
            Ok(pos) => Err(IntegrityFault::DuplicateReservation {
                start,
                occupant: self.entries[pos].occupant,
            }),
            Err(pos) => {
                self.entries.insert(pos, LedgerEntry { start, occupant });
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, start: NaiveDate) -> Option<GuestId> {
        let pos = self.entries.binary_search_by_key(&start, |e| e.start).ok()?;
        Some(self.entries.remove(pos).occupant)
    }
}
