use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar::Calendar;
use crate::engine::{EngineError, IntegrityFault, Missing};
use crate::ledger::{Ledger, LedgerEntry};

pub type RoomNumber = u32;
pub type RoomType = u32;
pub type GuestId = u64;

/// Whole days; the only duration type.
pub type Days = i64;

/// Days from `from` to `to` (negative if `to` is earlier).
pub fn days_between(from: NaiveDate, to: NaiveDate) -> Days {
    to.signed_duration_since(from).num_days()
}

/// End of a free interval. `Unbounded` sorts after every date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bound {
    Bounded(NaiveDate),
    Unbounded,
}

impl Bound {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Bound::Bounded(d) => Some(*d),
            Bound::Unbounded => None,
        }
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Bounded(d) => write!(f, "{d}"),
            Bound::Unbounded => write!(f, "open"),
        }
    }
}

/// Closed range `[start, end]` of whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A bookable range has at least one night.
    pub fn is_bookable(&self) -> bool {
        self.start < self.end
    }

    pub fn nights(&self) -> Days {
        days_between(self.start, self.end)
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Contiguous span during which a room has no reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreeInterval {
    pub start: NaiveDate,
    pub end: Bound,
}

impl FreeInterval {
    pub fn bounded(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end: Bound::Bounded(end),
        }
    }

    pub fn open(start: NaiveDate) -> Self {
        Self {
            start,
            end: Bound::Unbounded,
        }
    }

    /// The booking rule: `range` must leave at least one free day on each side.
    pub fn strictly_contains(&self, range: &DateRange) -> bool {
        self.start < range.start && Bound::Bounded(range.end) < self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.start <= day && Bound::Bounded(day) <= self.end
    }

    /// Free days left before `range`.
    pub fn left_gap(&self, range: &DateRange) -> Days {
        days_between(self.start, range.start)
    }

    /// Free days left after `range`; `None` when the interval is open-ended.
    pub fn right_gap(&self, range: &DateRange) -> Option<Days> {
        self.end.date().map(|end| days_between(range.end, end))
    }
}

impl std::fmt::Display for FreeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room: RoomNumber,
    pub range: DateRange,
    pub occupant: GuestId,
}

/// A room that can take a request, with the size of the smaller leftover fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub room: RoomNumber,
    pub cost: Days,
}

// ── Rooms ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoomState {
    pub number: RoomNumber,
    pub room_type: RoomType,
    /// Price per night.
    pub rate: u64,
    pub calendar: Calendar,
    pub ledger: Ledger,
}

impl RoomState {
    pub fn new(number: RoomNumber, room_type: RoomType, rate: u64) -> Self {
        Self {
            number,
            room_type,
            rate,
            calendar: Calendar::new(),
            ledger: Ledger::new(),
        }
    }

    fn fault(&self, fault: IntegrityFault) -> EngineError {
        EngineError::inconsistent(self.number, fault)
    }

    /// Open an empty calendar as free from `from` onwards.
    pub fn open_calendar(&mut self, from: NaiveDate) -> Result<(), EngineError> {
        if let Some(last) = self.calendar.intervals().last() {
            return Err(self.fault(IntegrityFault::AlreadyOpen { from, end: last.end }));
        }
        self.calendar = Calendar::open_from(from);
        Ok(())
    }

    /// Split the free interval around `range` and record the reservation.
    /// A failure leaves the room as it was.
    pub fn book(&mut self, id: Ulid, range: DateRange, occupant: GuestId) -> Result<Booking, EngineError> {
        if !range.is_bookable() {
            return Err(EngineError::InvalidRange(range));
        }
        let old = *self
            .calendar
            .containing(&range)
            .ok_or(EngineError::AllocationConflict(range))?;
        self.ledger
            .insert(range.start, occupant)
            .map_err(|f| self.fault(f))?;
        if let Err(f) = self.calendar.split(&old, &range) {
            self.ledger.remove(range.start);
            return Err(self.fault(f));
        }
        Ok(Booking {
            id,
            room: self.number,
            range,
            occupant,
        })
    }

    /// Merge the fragments around `range` back together and drop the reservation.
    /// Returns the occupant the reservation belonged to.
    pub fn cancel(&mut self, range: DateRange) -> Result<GuestId, EngineError> {
        let occupant = self.ledger.get(range.start).ok_or(EngineError::NotFound(Missing::Reservation {
            room: self.number,
            start: range.start,
        }))?;
        self.calendar.merge(&range).map_err(|f| self.fault(f))?;
        self.ledger.remove(range.start);
        Ok(occupant)
    }

    /// Consume the pending reservation starting on `start`. The calendar keeps the stay.
    pub fn check_in(&mut self, start: NaiveDate) -> Result<GuestId, EngineError> {
        self.ledger.remove(start).ok_or(EngineError::NotFound(Missing::Reservation {
            room: self.number,
            start,
        }))
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room: self.number,
            intervals: self.calendar.intervals().to_vec(),
            reservations: self.ledger.entries().to_vec(),
        }
    }

    /// Replace calendar and ledger with validated snapshot contents.
    pub fn restore(&mut self, snapshot: &RoomSnapshot) -> Result<(), EngineError> {
        let calendar = Calendar::from_intervals(snapshot.intervals.clone()).map_err(|f| self.fault(f))?;
        let ledger = Ledger::from_entries(snapshot.reservations.clone()).map_err(|f| self.fault(f))?;
        self.calendar = calendar;
        self.ledger = ledger;
        Ok(())
    }
}

/// Serializable image of one room's calendar and ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room: RoomNumber,
    pub intervals: Vec<FreeInterval>,
    pub reservations: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub number: RoomNumber,
    pub room_type: RoomType,
    pub rate: u64,
    pub free_intervals: usize,
    pub pending_reservations: usize,
}

// ── Guests ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuestState {
    CheckedIn,
    Reserved,
    Idle,
}

impl GuestState {
    /// Numeric code used on the console: 1 checked in, 2 reserved, 3 idle.
    pub fn code(&self) -> u8 {
        match self {
            GuestState::CheckedIn => 1,
            GuestState::Reserved => 2,
            GuestState::Idle => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(GuestState::CheckedIn),
            2 => Some(GuestState::Reserved),
            3 => Some(GuestState::Idle),
            _ => None,
        }
    }
}

impl std::fmt::Display for GuestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestState::CheckedIn => write!(f, "checked in"),
            GuestState::Reserved => write!(f, "reserved"),
            GuestState::Idle => write!(f, "idle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub booking_id: Ulid,
    pub room: RoomNumber,
    pub range: DateRange,
    pub payment_due: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestRecord {
    pub id: GuestId,
    pub name: String,
    pub email: String,
    pub state: GuestState,
    pub reservation: Option<Reservation>,
    pub current_room: Option<RoomNumber>,
    pub paid: bool,
}

impl GuestRecord {
    pub fn new(id: GuestId, name: String, email: String) -> Self {
        Self {
            id,
            name,
            email,
            state: GuestState::Idle,
            reservation: None,
            current_room: None,
            paid: false,
        }
    }

    pub fn expect_state(&self, expected: GuestState) -> Result<(), EngineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidState {
                guest: self.id,
                state: self.state,
                expected,
            })
        }
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CalendarOpened {
        room: RoomNumber,
        from: NaiveDate,
    },
    GuestRegistered {
        id: GuestId,
        name: String,
        email: String,
    },
    /// `payment_due` is set when the booking was made on behalf of a registered guest.
    BookingConfirmed {
        booking: Booking,
        payment_due: Option<u64>,
    },
    /// `guest` is set when the cancellation also clears that guest's reservation.
    BookingCancelled {
        room: RoomNumber,
        range: DateRange,
        guest: Option<GuestId>,
    },
    CheckedIn {
        guest: GuestId,
        room: RoomNumber,
        start: NaiveDate,
    },
    CheckedOut {
        guest: GuestId,
        paid: bool,
    },
    RoomRestored {
        snapshot: RoomSnapshot,
    },
    GuestRestored {
        record: GuestRecord,
    },
}
