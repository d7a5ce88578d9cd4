//! Chronological ordering and session segmentation.
//!
//! Entries carry no session identifier, so sessions are cut wherever the
//! stream goes quiet for longer than the configured gap. Entries without a
//! usable timestamp never cut a session; they stay with their neighbours.

use std::ops::Range;

use chrono::{DateTime, Duration, Utc};

/// Stable chronological order of `timestamps`, as indices into it.
///
/// An entry without a timestamp sorts as if it carried the timestamp of the
/// entry before it in arrival order, so it stays next to that entry.
pub fn chronological_order(timestamps: &[Option<DateTime<Utc>>]) -> Vec<usize> {
    let mut last = None;
    let keys: Vec<Option<DateTime<Utc>>> = timestamps
        .iter()
        .map(|ts| {
            if ts.is_some() {
                last = *ts;
            }
            last
        })
        .collect();

    let mut order: Vec<usize> = (0..timestamps.len()).collect();
    order.sort_by_key(|&i| keys[i]);
    order
}

/// Split time-ordered `timestamps` into sessions.
///
/// A new session starts at the first timestamped entry that follows the
/// previous timestamped entry by more than `gap`. The returned ranges are
/// contiguous, non-empty, and cover every entry.
pub fn detect_sessions(timestamps: &[Option<DateTime<Utc>>], gap: Duration) -> Vec<Range<usize>> {
    if timestamps.is_empty() {
        return Vec::new();
    }

    let mut sessions = Vec::new();
    let mut start = 0;
    let mut prev: Option<DateTime<Utc>> = None;

    for (i, ts) in timestamps.iter().enumerate() {
        let Some(current) = *ts else {
            continue;
        };
        if let Some(prev) = prev {
            if current - prev > gap {
                sessions.push(start..i);
                start = i;
            }
        }
        prev = Some(current);
    }
    sessions.push(start..timestamps.len());
    sessions
}

/// Keep only the last `max` entries of `session`.
///
/// A session always keeps at least its newest entry, so a cap of zero
/// behaves like a cap of one.
pub fn cap_session(session: Range<usize>, max: usize) -> Range<usize> {
    let max = max.max(1);
    if session.len() > max {
        session.end - max..session.end
    } else {
        session
    }
}
