use crate::metrics::Metrics;
use crate::runtime;
use crate::shared::CacheShared;
use crate::time;

use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

/// Throttle state for the background expiration sweep.
///
/// `next_run` is the earliest instant another sweep may start; `running`
/// collapses concurrent triggers into a single run.
#[derive(Debug)]
pub(crate) struct Sweeper {
  interval: u64,
  next_run: AtomicU64,
  running: AtomicBool,
}

impl Sweeper {
  pub(crate) fn new(interval: Duration) -> Self {
    Self {
      interval: time::duration_to_nanos(interval),
      // A fresh cache is eligible right away.
      next_run: AtomicU64::new(0),
      running: AtomicBool::new(false),
    }
  }

  /// Returns `true` if the caller won the right to run a sweep now.
  fn try_begin(&self, now: u64) -> bool {
    self.is_due(now) && self.claim(now)
  }

  fn is_due(&self, now: u64) -> bool {
    now >= self.next_run.load(Ordering::Acquire)
  }

  fn claim(&self, now: u64) -> bool {
    if self
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      return false;
    }
    // A sweep may have started and finished since the caller checked.
    if !self.is_due(now) {
      self.finish();
      return false;
    }
    self
      .next_run
      .store(now.saturating_add(self.interval), Ordering::Release);
    true
  }

  fn finish(&self) {
    self.running.store(false, Ordering::Release);
  }

  /// Triggers a sweep if the throttle allows it. Never blocks the caller.
  ///
  /// The sweep goes to the configured spawner or the ambient runtime, and
  /// only gets a thread of its own when neither is available.
  pub(crate) fn schedule<K, G, H>(shared: &Arc<CacheShared<K, G, H>>)
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    G: Eq + Hash + Clone + Send + Sync + 'static,
    H: BuildHasher + Clone + Send + Sync + 'static,
  {
    if !shared.sweeper.try_begin(time::now_nanos()) {
      return;
    }

    let sweep = Sweep(Arc::downgrade(shared));
    let task = Box::pin(async move { sweep.run() });
    let Err(task) = runtime::spawn_detached(shared.spawner(), task, false) else {
      return;
    };

    let spawned = thread::Builder::new()
      .name("tagcache-sweeper".into())
      .spawn(move || futures_executor::block_on(task));
    if let Err(err) = spawned {
      // The unrun sweep was dropped with the closure, releasing the throttle.
      warn!(error = %err, "failed to spawn expiration sweeper thread");
    }
  }
}

/// One scheduled sweep. Holds the cache weakly so a pending sweep never
/// keeps it alive, and releases the throttle when dropped, whether it ran,
/// unwound or was discarded unpolled.
struct Sweep<K, G, H>(Weak<CacheShared<K, G, H>>);

impl<K, G, H> Sweep<K, G, H>
where
  K: Eq + Hash + Clone,
  G: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  fn run(self) {
    // The cache may have been dropped before the sweep got scheduled.
    let Some(shared) = self.0.upgrade() else {
      return;
    };

    let expired = shared.retire_expired(time::now_nanos());
    let pruned = shared.tags.prune_empty();
    Metrics::incr(&shared.metrics.sweeps);

    debug!(expired, pruned_tags = pruned, "expiration sweep finished");
  }
}

impl<K, G, H> Drop for Sweep<K, G, H> {
  fn drop(&mut self) {
    if let Some(shared) = self.0.upgrade() {
      shared.sweeper.finish();
    }
  }
}
