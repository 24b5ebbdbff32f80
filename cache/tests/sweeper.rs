mod common;

use common::{build_sweeping_cache, build_test_cache};
use fibre_tagcache::EntryOptions;
use std::thread;
use std::time::Duration;

// The sweeper runs on a background thread; give it a moment to finish.
fn settle() {
  thread::sleep(Duration::from_millis(100));
}

#[test]
fn test_sweeper_removes_expired_entries_and_empty_tags() {
  let cache = build_sweeping_cache(Duration::from_millis(50));

  for key in ["a", "b", "c"] {
    cache
      .add_with(
        key,
        EntryOptions::new().tag("short").lifetime(Duration::from_millis(20)),
        1i32,
      )
      .unwrap();
  }
  cache.add_with("keep", EntryOptions::new().tag("long"), 2i32).unwrap();
  assert_eq!(cache.entry_count(), 4);
  assert_eq!(cache.tag_count(), 2);

  thread::sleep(Duration::from_millis(100));
  // Any operation may trigger a sweep once the interval has passed.
  cache.remove("nothing");
  settle();

  assert_eq!(cache.entry_count(), 1);
  assert_eq!(cache.tag_count(), 1);
  assert_eq!(cache.try_get::<i32, _>("keep").unwrap(), Some(2));

  let metrics = cache.metrics();
  assert_eq!(metrics.expirations, 3);
  assert!(metrics.sweeps >= 1);
}

#[test]
fn test_sweeper_is_throttled() {
  let cache = build_test_cache();

  // The first operation on a fresh cache is eligible to sweep.
  cache.add("k", 1i32);
  settle();
  assert_eq!(cache.metrics().sweeps, 1);

  // The default interval is a minute, so nothing else runs now.
  for _ in 0..100 {
    cache.try_get::<i32, _>("k").unwrap();
  }
  settle();
  assert_eq!(cache.metrics().sweeps, 1);
}

#[test]
fn test_sweep_does_not_count_as_access() {
  let cache = build_sweeping_cache(Duration::from_millis(10));
  cache.add_sliding("k", Duration::from_millis(150), 1i32).unwrap();

  // Keep sweeps coming through an unrelated key. They must not keep the
  // sliding entry alive.
  for _ in 0..25 {
    thread::sleep(Duration::from_millis(10));
    cache.remove("other");
  }
  settle();

  assert_eq!(cache.entry_count(), 0);
}

#[test]
fn test_sweeper_does_not_outlive_cache() {
  let cache = build_sweeping_cache(Duration::from_millis(10));
  cache.add("k", 1i32);
  drop(cache);
  // The background thread only holds a weak reference, so there is nothing
  // to assert beyond not crashing.
  settle();
}

#[test]
fn test_sweep_runs_on_configured_spawner() {
  use fibre_tagcache::{CacheBuilder, TaskSpawner};
  use std::future::Future;
  use std::pin::Pin;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  struct CountingSpawner(Arc<AtomicUsize>);

  impl TaskSpawner for CountingSpawner {
    fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
      self.0.fetch_add(1, Ordering::SeqCst);
      thread::spawn(move || futures_executor::block_on(future));
    }
  }

  let spawned = Arc::new(AtomicUsize::new(0));
  let cache: fibre_tagcache::MemoryCache<&'static str> = CacheBuilder::new()
    .spawner(Arc::new(CountingSpawner(spawned.clone())))
    .build()
    .unwrap();

  cache.add("k", 1i32);
  settle();

  assert_eq!(spawned.load(Ordering::SeqCst), 1);
  assert_eq!(cache.metrics().sweeps, 1);
}

#[test]
fn test_discarded_sweep_releases_throttle() {
  use fibre_tagcache::{CacheBuilder, TaskSpawner};
  use std::future::Future;
  use std::pin::Pin;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  // Drops every task unpolled, like a runtime that is shutting down.
  struct DroppingSpawner(Arc<AtomicUsize>);

  impl TaskSpawner for DroppingSpawner {
    fn spawn(&self, _future: Pin<Box<dyn Future<Output = ()> + Send>>) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  let spawned = Arc::new(AtomicUsize::new(0));
  let cache: fibre_tagcache::MemoryCache<&'static str> = CacheBuilder::new()
    .expiration_scan_frequency(Duration::from_millis(10))
    .spawner(Arc::new(DroppingSpawner(spawned.clone())))
    .build()
    .unwrap();

  cache.add("k", 1i32);
  assert_eq!(spawned.load(Ordering::SeqCst), 1);

  // Once the interval passes, the next trigger is accepted again.
  thread::sleep(Duration::from_millis(30));
  cache.remove("other");
  assert_eq!(spawned.load(Ordering::SeqCst), 2);
  assert_eq!(cache.metrics().sweeps, 0);
}
