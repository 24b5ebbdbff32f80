use once_cell::sync::Lazy;
use std::time::{Duration, Instant, SystemTime};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Sentinel deadline for entries that never expire.
pub(crate) const NEVER: u64 = u64::MAX;

/// Converts a `Duration` to nanoseconds, saturating instead of wrapping.
#[inline]
pub(crate) fn duration_to_nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(NEVER)
}

/// The current time as nanoseconds since the cache's epoch.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  duration_to_nanos(Instant::now().saturating_duration_since(*CACHE_EPOCH))
}

/// How long until a wall-clock deadline, or `None` if it is not strictly in
/// the future.
pub(crate) fn remaining_until(deadline: SystemTime) -> Option<Duration> {
  match deadline.duration_since(SystemTime::now()) {
    Ok(remaining) if !remaining.is_zero() => Some(remaining),
    _ => None,
  }
}
