use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Hit/Miss Ratios ---
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,

  // --- Throughput ---
  pub(crate) inserts: CachePadded<AtomicU64>,
  pub(crate) loads: CachePadded<AtomicU64>,
  pub(crate) load_failures: CachePadded<AtomicU64>,

  // --- Retirement ---
  pub(crate) replaced: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,
  pub(crate) tag_clears: CachePadded<AtomicU64>,
  pub(crate) evicted_by_tag: CachePadded<AtomicU64>,
  pub(crate) expirations: CachePadded<AtomicU64>,

  // --- Sweeper ---
  pub(crate) sweeps: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      loads: CachePadded::new(AtomicU64::new(0)),
      load_failures: CachePadded::new(AtomicU64::new(0)),
      replaced: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      tag_clears: CachePadded::new(AtomicU64::new(0)),
      evicted_by_tag: CachePadded::new(AtomicU64::new(0)),
      expirations: CachePadded::new(AtomicU64::new(0)),
      sweeps: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &CachePadded<AtomicU64>) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    let hits = self.hits.load(Ordering::Relaxed);
    let misses = self.misses.load(Ordering::Relaxed);
    let total_lookups = hits + misses;

    MetricsSnapshot {
      hits,
      misses,
      hit_ratio: if total_lookups == 0 {
        0.0
      } else {
        hits as f64 / total_lookups as f64
      },
      inserts: self.inserts.load(Ordering::Relaxed),
      loads: self.loads.load(Ordering::Relaxed),
      load_failures: self.load_failures.load(Ordering::Relaxed),
      replaced: self.replaced.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      tag_clears: self.tag_clears.load(Ordering::Relaxed),
      evicted_by_tag: self.evicted_by_tag.load(Ordering::Relaxed),
      expirations: self.expirations.load(Ordering::Relaxed),
      sweeps: self.sweeps.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Lookups that found a live entry.
  pub hits: u64,
  /// Lookups that found nothing, or only an expired entry.
  pub misses: u64,
  /// The cache hit ratio (hits / (hits + misses)).
  pub hit_ratio: f64,
  /// Entries installed through `add`.
  pub inserts: u64,
  /// Value producers that were actually executed.
  pub loads: u64,
  /// Value producers that faulted or were canceled.
  pub load_failures: u64,
  /// Entries retired because a newer entry took their key.
  pub replaced: u64,
  /// Entries retired through `remove`.
  pub invalidations: u64,
  /// Calls to `clear_tag` that found the tag.
  pub tag_clears: u64,
  /// Entries retired by a `clear_tag`.
  pub evicted_by_tag: u64,
  /// Entries retired because they expired, on read or by the sweeper.
  pub expirations: u64,
  /// Completed sweeper runs.
  pub sweeps: u64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio * 100.0))
      .field("inserts", &self.inserts)
      .field("loads", &self.loads)
      .field("load_failures", &self.load_failures)
      .field("replaced", &self.replaced)
      .field("invalidations", &self.invalidations)
      .field("tag_clears", &self.tag_clears)
      .field("evicted_by_tag", &self.evicted_by_tag)
      .field("expirations", &self.expirations)
      .field("sweeps", &self.sweeps)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
