use crate::cell::SingleFlightCell;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_ENTRY_ID: AtomicU64 = AtomicU64::new(1);

/// The expiration descriptor of an entry. All instants are nanoseconds since
/// the cache epoch.
#[derive(Debug)]
pub(crate) enum Expiry {
  Fixed { deadline: u64 },
  Sliding { window: u64, last_access: AtomicU64 },
}

impl Expiry {
  pub(crate) fn fixed(deadline: u64) -> Self {
    Expiry::Fixed { deadline }
  }

  pub(crate) fn sliding(window: u64, now: u64) -> Self {
    Expiry::Sliding {
      window,
      last_access: AtomicU64::new(now),
    }
  }
}

/// One cached slot.
///
/// Tag sets hold entries by `id`, so two entries for the same key are never
/// confused with one another.
pub(crate) struct CacheEntry<K, G> {
  id: u64,
  pub(crate) key: K,
  pub(crate) tags: Box<[G]>,
  expiry: Expiry,
  pub(crate) payload: Arc<SingleFlightCell>,
  retired: AtomicBool,
}

impl<K, G> fmt::Debug for CacheEntry<K, G> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("id", &self.id)
      .field("tags", &self.tags.len())
      .field("expiry", &self.expiry)
      .field("retired", &self.is_retired())
      .finish_non_exhaustive()
  }
}

impl<K, G> CacheEntry<K, G> {
  pub(crate) fn new(key: K, tags: Vec<G>, expiry: Expiry, payload: SingleFlightCell) -> Self {
    Self {
      id: NEXT_ENTRY_ID.fetch_add(1, Ordering::Relaxed),
      key,
      tags: tags.into_boxed_slice(),
      expiry,
      payload: Arc::new(payload),
      retired: AtomicBool::new(false),
    }
  }

  #[inline]
  pub(crate) fn id(&self) -> u64 {
    self.id
  }

  /// Checks whether the entry has expired at `now`.
  ///
  /// For a sliding entry that is still alive, the check counts as an access:
  /// `last_access` moves forward to `now`.
  pub(crate) fn is_expired(&self, now: u64) -> bool {
    match &self.expiry {
      Expiry::Fixed { deadline } => now >= *deadline,
      Expiry::Sliding {
        window,
        last_access,
      } => {
        let last = last_access.load(Ordering::Acquire);
        if now.saturating_sub(last) >= *window {
          return true;
        }
        // fetch_max so a slower thread never drags the access time backwards.
        last_access.fetch_max(now, Ordering::AcqRel);
        false
      }
    }
  }

  /// Like `is_expired`, but never counts as an access. Used by the sweeper
  /// so a sweep cannot keep sliding entries alive.
  pub(crate) fn has_expired(&self, now: u64) -> bool {
    match &self.expiry {
      Expiry::Fixed { deadline } => now >= *deadline,
      Expiry::Sliding {
        window,
        last_access,
      } => now.saturating_sub(last_access.load(Ordering::Acquire)) >= *window,
    }
  }

  /// One-shot transition to retired. Returns `true` only for the caller that
  /// performed it, which then owns the tag cleanup.
  #[inline]
  pub(crate) fn mark_retired(&self) -> bool {
    self
      .retired
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }

  #[inline]
  pub(crate) fn is_retired(&self) -> bool {
    self.retired.load(Ordering::Acquire)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::erase;

  const SECOND: u64 = 1_000_000_000;

  fn entry(expiry: Expiry) -> CacheEntry<&'static str, &'static str> {
    CacheEntry::new("k", vec!["t"], expiry, SingleFlightCell::ready(erase(1)))
  }

  #[test]
  fn fixed_expires_at_deadline() {
    let e = entry(Expiry::fixed(10 * SECOND));
    assert!(!e.is_expired(10 * SECOND - 1));
    assert!(e.is_expired(10 * SECOND));
    assert!(e.is_expired(11 * SECOND));
  }

  #[test]
  fn sliding_is_postponed_by_access() {
    let e = entry(Expiry::sliding(2 * SECOND, 0));
    for step in 1..=10 {
      assert!(!e.is_expired(step * SECOND), "access {step} should keep it alive");
    }
    assert!(e.is_expired(12 * SECOND));
  }

  #[test]
  fn sliding_expires_after_gap() {
    let e = entry(Expiry::sliding(2 * SECOND, 0));
    assert!(e.is_expired(2 * SECOND));
  }

  #[test]
  fn probing_does_not_slide() {
    let e = entry(Expiry::sliding(2 * SECOND, 0));
    assert!(!e.has_expired(SECOND));
    assert!(e.has_expired(2 * SECOND));
  }

  #[test]
  fn retirement_is_one_shot() {
    let e = entry(Expiry::fixed(u64::MAX));
    assert!(!e.is_retired());
    assert!(e.mark_retired());
    assert!(!e.mark_retired());
    assert!(e.is_retired());
  }

  #[test]
  fn ids_are_unique() {
    let a = entry(Expiry::fixed(u64::MAX));
    let b = entry(Expiry::fixed(u64::MAX));
    assert_ne!(a.id(), b.id());
  }
}
