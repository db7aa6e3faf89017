pub mod candidates;
pub mod lifecycle;
pub mod matching;
pub mod predicates;
pub mod snapshot;

use chrono::{NaiveDateTime, Timelike};

/// Drops seconds and sub-seconds; every recorded timestamp has minute resolution.
pub fn truncate_to_minute(when: NaiveDateTime) -> NaiveDateTime {
    when.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(when)
}
