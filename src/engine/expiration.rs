//! Liveness evaluation for TTL-bearing records.
//!
//! A record written at `last_write` with TTL `d` is live at `now` iff the TTL
//! is unset/zero or `now < last_write + d`. Arithmetic that leaves the
//! representable time range is treated as "never expires".

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Instant at which a record stops being live, if it ever does.
pub(crate) fn expires_at(last_write: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
    let delta = chrono::Duration::from_std(ttl).ok()?;
    last_write.checked_add_signed(delta)
}

pub(crate) fn is_live(last_write: DateTime<Utc>, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
    expires_at(last_write, ttl).is_none_or(|deadline| now < deadline)
}
