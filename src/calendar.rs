use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::engine::IntegrityFault;
use crate::model::{Bound, DateRange, FreeInterval};

/// Free-time intervals of a single room.
///
/// Intervals are kept sorted by start, pairwise disjoint, and never touching:
/// there is always at least one occupied day between two neighbours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    intervals: Vec<FreeInterval>,
}

impl Calendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// A calendar free from `start` indefinitely.
    pub fn open_from(start: NaiveDate) -> Self {
        Self {
            intervals: vec![FreeInterval::open(start)],
        }
    }

    /// Build from persisted intervals in any order, rejecting overlapping or touching ones.
    pub fn from_intervals(mut intervals: Vec<FreeInterval>) -> Result<Self, IntegrityFault> {
        intervals.sort_by_key(|i| i.start);
        let calendar = Self { intervals };
        calendar.check_invariants()?;
        Ok(calendar)
    }

    pub fn intervals(&self) -> &[FreeInterval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// The interval with the greatest start on or before `day`.
    /// At most one interval can hold `day`, so this is the only one worth testing.
    pub fn candidate(&self, day: NaiveDate) -> Option<&FreeInterval> {
        let idx = self.intervals.partition_point(|i| i.start <= day);
        idx.checked_sub(1).map(|i| &self.intervals[i])
    }

    /// The interval that strictly contains `range`, if any.
    pub fn containing(&self, range: &DateRange) -> Option<&FreeInterval> {
        self.candidate(range.start)
            .filter(|interval| interval.strictly_contains(range))
    }

    /// Replace `old` with the fragments left on either side of `range`.
    pub fn split(
        &mut self,
        old: &FreeInterval,
        range: &DateRange,
    ) -> Result<(FreeInterval, FreeInterval), IntegrityFault> {
        let pos = self
            .intervals
            .binary_search_by_key(&old.start, |i| i.start)
            .ok()
            .filter(|&pos| self.intervals[pos] == *old)
            .ok_or(IntegrityFault::UnknownInterval(*old))?;
        if !old.strictly_contains(range) {
            return Err(IntegrityFault::NotContained {
                interval: *old,
                range: *range,
            });
        }
        // Strict containment guarantees the left neighbour day exists.
        let left_end = range
            .start
            .pred_opt()
            .ok_or(IntegrityFault::DateOverflow(range.start))?;
        let right_start = range
            .end
            .succ_opt()
            .ok_or(IntegrityFault::DateOverflow(range.end))?;

        let left = FreeInterval::bounded(old.start, left_end);
        let right = FreeInterval {
            start: right_start,
            end: old.end,
        };
        self.intervals[pos] = left;
        self.intervals.insert(pos + 1, right);
        Ok((left, right))
    }

    /// Undo a split for `range`: join the fragment ending the day before it with
    /// the fragment starting the day after it.
    pub fn merge(&mut self, range: &DateRange) -> Result<FreeInterval, IntegrityFault> {
        let left_end = range
            .start
            .pred_opt()
            .ok_or(IntegrityFault::DateOverflow(range.start))?;
        let right_start = range
            .end
            .succ_opt()
            .ok_or(IntegrityFault::DateOverflow(range.end))?;

        let left_idx = self
            .intervals
            .partition_point(|i| i.start <= left_end)
            .checked_sub(1)
            .filter(|&i| self.intervals[i].end == Bound::Bounded(left_end))
            .ok_or(IntegrityFault::MissingLeftFragment { ending: left_end })?;
        let right_idx = self
            .intervals
            .binary_search_by_key(&right_start, |i| i.start)
            .map_err(|_| IntegrityFault::MissingRightFragment {
                starting: right_start,
            })?;
        if right_idx != left_idx + 1 {
            return Err(IntegrityFault::Interleaved {
                left: self.intervals[left_idx],
                right: self.intervals[right_idx],
            });
        }

        let merged = FreeInterval {
            start: self.intervals[left_idx].start,
            end: self.intervals[right_idx].end,
        };
        self.intervals[left_idx] = merged;
        self.intervals.remove(right_idx);
        Ok(merged)
    }

    /// Sorted, disjoint, non-touching.
    pub fn check_invariants(&self) -> Result<(), IntegrityFault> {
        for interval in &self.intervals {
            if interval.end < Bound::Bounded(interval.start) {
                return Err(IntegrityFault::Inverted(*interval));
            }
        }
        for pair in self.intervals.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            match a.end {
                Bound::Bounded(end) if end < b.start => {
                    if end.succ_opt() == Some(b.start) {
                        return Err(IntegrityFault::Touching(a, b));
                    }
                }
                _ => return Err(IntegrityFault::Overlap(a, b)),
            }
        }
        Ok(())
    }
}
