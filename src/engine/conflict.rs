use chrono::NaiveDate;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, IntegrityFault};

/// Reject ranges that can never be booked before any lock is taken.
pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if !range.is_bookable() {
        return Err(EngineError::InvalidRange(*range));
    }
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

/// A booking adds one free interval; refuse it once the calendar is at its limit.
pub(crate) fn check_fragmentation(rs: &RoomState) -> Result<(), EngineError> {
    if rs.calendar.len() >= MAX_INTERVALS_PER_ROOM {
        return Err(EngineError::LimitExceeded("too many free intervals on room"));
    }
    Ok(())
}

pub(crate) fn check_contact(name: &str, email: &str) -> Result<(), EngineError> {
    if name.len() > MAX_CONTACT_LEN {
        return Err(EngineError::LimitExceeded("guest name too long"));
    }
    if email.len() > MAX_CONTACT_LEN {
        return Err(EngineError::LimitExceeded("guest email too long"));
    }
    Ok(())
}

/// The ledger entry a guest acts on must name that guest.
pub(crate) fn check_occupant(rs: &RoomState, start: NaiveDate, guest: GuestId) -> Result<(), EngineError> {
    match rs.ledger.get(start) {
        Some(found) if found != guest => Err(EngineError::inconsistent(
            rs.number,
            IntegrityFault::OccupantMismatch {
                start,
                expected: guest,
                found,
            },
        )),
        _ => Ok(()),
    }
}
