use crate::calendar::Calendar;
use crate::model::*;

use super::EngineError;

// ── Best-fit allocation ───────────────────────────────────────────

/// For each room, the single free interval that could hold a stay starting on
/// `range.start`: the one with the greatest start on or before it.
pub fn query<'a>(
    calendars: impl IntoIterator<Item = (RoomNumber, &'a Calendar)>,
    range: &DateRange,
) -> Vec<(RoomNumber, FreeInterval)> {
    calendars
        .into_iter()
        .filter_map(|(room, calendar)| calendar.candidate(range.start).map(|i| (room, *i)))
        .collect()
}

/// Size of the smaller fragment left after carving `range` out of `interval`.
/// An open-ended interval only ever leaves its left side behind.
pub fn disruption_cost(interval: &FreeInterval, range: &DateRange) -> Days {
    let left = interval.left_gap(range);
    match interval.right_gap(range) {
        Some(right) => left.min(right),
        None => left,
    }
}

/// Rooms that can take `range`, cheapest disruption first.
///
/// Ties keep the order in which `calendars` yields rooms. An empty result means
/// no availability; it is not an error.
pub fn find_best<'a>(
    calendars: impl IntoIterator<Item = (RoomNumber, &'a Calendar)>,
    range: &DateRange,
) -> Result<Vec<Candidate>, EngineError> {
    if !range.is_bookable() {
        return Err(EngineError::InvalidRange(*range));
    }
    let mut candidates: Vec<Candidate> = query(calendars, range)
        .into_iter()
        .filter(|(_, interval)| interval.strictly_contains(range))
        .map(|(room, interval)| Candidate {
            room,
            cost: disruption_cost(&interval, range),
        })
        .collect();
    // Stable: equal costs stay in room order.
    candidates.sort_by_key(|c| c.cost);
    Ok(candidates)
}
