//! Monotonic-ish wall clock time used for lease bookkeeping.
//!
//! The original tracks `TIME` as a `time_t`. We keep the same "seconds
//! since epoch" representation (`i64`) rather than `SystemTime` so that
//! `sort_time`/`ends`/`MIN_TIME`/`MAX_TIME` arithmetic and comparisons read
//! exactly as they do in `mdb.c`.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, SecondsFormat, Utc};

pub type Time = i64;

/// No event pending / "unset" sentinel (`mdb.c`'s `MIN_TIME`).
pub const MIN_TIME: Time = 0;
/// "Never" sentinel used as the initial value when scanning for the
/// soonest pending expiry (`mdb.c`'s `MAX_TIME`).
pub const MAX_TIME: Time = i64::MAX;

/// current wall-clock time, in seconds since the epoch
pub fn now() -> Time {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the epoch")
        .as_secs() as Time
}

/// render `t` as an RFC 3339 timestamp for log messages, the way
/// `ip-manager` formats lease expiry times.
pub fn format(t: Time) -> String {
    let epoch_secs = t.max(0) as u64;
    DateTime::<Utc>::from(UNIX_EPOCH + Duration::from_secs(epoch_secs)).to_rfc3339_opts(SecondsFormat::Secs, true)
}
