use chrono::NaiveDate;

use crate::model::{Bound, DateRange, FreeInterval, GuestId, GuestState, RoomNumber};

/// Something that was looked up and is not there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    Room(RoomNumber),
    Guest(GuestId),
    Reservation { room: RoomNumber, start: NaiveDate },
    GuestReservation(GuestId),
}

impl std::fmt::Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::Room(room) => write!(f, "room {room}"),
            Missing::Guest(id) => write!(f, "guest {id}"),
            Missing::Reservation { room, start } => {
                write!(f, "reservation on room {room} starting {start}")
            }
            Missing::GuestReservation(id) => write!(f, "reservation of guest {id}"),
        }
    }
}

/// Ways a calendar or ledger can disagree with itself or with a booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFault {
    /// Interval whose end precedes its start.
    Inverted(FreeInterval),
    /// Two intervals share at least one day.
    Overlap(FreeInterval, FreeInterval),
    /// Two intervals with no day between them; they should have been one.
    Touching(FreeInterval, FreeInterval),
    /// Split target is not an interval of this calendar.
    UnknownInterval(FreeInterval),
    /// Split target does not strictly contain the booked range.
    NotContained { interval: FreeInterval, range: DateRange },
    /// No fragment ends on the day before a cancelled booking.
    MissingLeftFragment { ending: NaiveDate },
    /// No fragment starts on the day after a cancelled booking.
    MissingRightFragment { starting: NaiveDate },
    /// Something sits between the two fragments being merged.
    Interleaved { left: FreeInterval, right: FreeInterval },
    /// Booking range runs into the edge of the representable calendar.
    DateOverflow(NaiveDate),
    /// Ledger already holds a reservation starting on this day.
    DuplicateReservation { start: NaiveDate, occupant: GuestId },
    /// Ledger names a different occupant than the guest acting on the reservation.
    OccupantMismatch {
        start: NaiveDate,
        expected: GuestId,
        found: GuestId,
    },
    /// Calendar already opened; opening it again would overlap.
    AlreadyOpen { from: NaiveDate, end: Bound },
}

impl std::fmt::Display for IntegrityFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrityFault::Inverted(i) => write!(f, "inverted interval {i}"),
            IntegrityFault::Overlap(a, b) => write!(f, "intervals {a} and {b} overlap"),
            IntegrityFault::Touching(a, b) => write!(f, "intervals {a} and {b} touch"),
            IntegrityFault::UnknownInterval(i) => write!(f, "interval {i} is not in the calendar"),
            IntegrityFault::NotContained { interval, range } => {
                write!(f, "interval {interval} does not strictly contain {range}")
            }
            IntegrityFault::MissingLeftFragment { ending } => {
                write!(f, "no free interval ends on {ending}")
            }
            IntegrityFault::MissingRightFragment { starting } => {
                write!(f, "no free interval starts on {starting}")
            }
            IntegrityFault::Interleaved { left, right } => {
                write!(f, "fragments {left} and {right} are not neighbours")
            }
            IntegrityFault::DateOverflow(day) => write!(f, "date arithmetic overflow at {day}"),
            IntegrityFault::DuplicateReservation { start, occupant } => {
                write!(f, "reservation starting {start} already held by guest {occupant}")
            }
            IntegrityFault::OccupantMismatch { start, expected, found } => {
                write!(f, "reservation starting {start} belongs to guest {found}, not {expected}")
            }
            IntegrityFault::AlreadyOpen { from, end } => {
                write!(f, "calendar already open, cannot reopen from {from} (last interval ends {end})")
            }
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    /// No free interval strictly contains the requested range.
    AllocationConflict(DateRange),
    NotFound(Missing),
    /// Stored calendar/ledger state is corrupt for this room.
    CalendarInconsistency {
        room: RoomNumber,
        fault: IntegrityFault,
    },
    InvalidRange(DateRange),
    AlreadyExists(String),
    InvalidState {
        guest: GuestId,
        state: GuestState,
        expected: GuestState,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub fn inconsistent(room: RoomNumber, fault: IntegrityFault) -> Self {
        EngineError::CalendarInconsistency { room, fault }
    }

    /// True for data-integrity faults that must not be shown as user errors.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::CalendarInconsistency { .. } | EngineError::WalError(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::AllocationConflict(range) => write!(f, "no rooms available for {range}"),
            EngineError::NotFound(what) => write!(f, "not found: {what}"),
            EngineError::CalendarInconsistency { room, fault } => {
                write!(f, "calendar of room {room} is inconsistent: {fault}")
            }
            EngineError::InvalidRange(range) => {
                write!(f, "invalid range {range}: start must be before end")
            }
            EngineError::AlreadyExists(what) => write!(f, "already exists: {what}"),
            EngineError::InvalidState {
                guest,
                state,
                expected,
            } => write!(f, "guest {guest} is {state}, expected {expected}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
