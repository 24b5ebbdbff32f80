mod common;

use common::{build_test_cache, slow_counting_factory, Boom};
use fibre_tagcache::{CacheError, Canceled, EntryOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_get_or_add_runs_factory_once() {
  let cache = build_test_cache();
  let load_count = Arc::new(AtomicUsize::new(0));

  // 1. First call on a missing key runs the factory.
  let value = cache
    .get_or_add("k", slow_counting_factory(&load_count, 5))
    .unwrap();
  assert_eq!(value, 5);
  assert_eq!(cache.metrics().misses, 1);

  // 2. Second call is a hit and does not run the new factory.
  let value = cache
    .get_or_add("k", slow_counting_factory(&load_count, 6))
    .unwrap();
  assert_eq!(value, 5);
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert_eq!(cache.metrics().hits, 1);
  assert_eq!(cache.metrics().loads, 1);
}

#[test]
fn test_get_or_add_returns_added_value() {
  let cache = build_test_cache();
  cache.add("k", 1i32);
  let value = cache
    .get_or_add("k", || -> i32 { panic!("factory must not run") })
    .unwrap();
  assert_eq!(value, 1);
}

#[test]
fn test_thundering_herd() {
  let cache = build_test_cache();
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_threads = 20;
  let barrier = Arc::new(Barrier::new(num_threads));

  let handles: Vec<_> = (0..num_threads)
    .map(|i| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      let factory = slow_counting_factory(&load_count, i as i32);
      thread::spawn(move || {
        // All threads request the same missing key at once.
        barrier.wait();
        cache.get_or_add("herd", factory).unwrap()
      })
    })
    .collect();

  let results: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();

  // Exactly one factory ran and everyone saw its value.
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
  assert_eq!(cache.try_get::<i32, _>("herd").unwrap(), Some(results[0]));
}

#[test]
fn test_options_apply_only_to_the_installer() {
  let cache = build_test_cache();
  cache
    .get_or_add_with("k", EntryOptions::new().tag("first"), || 1i32)
    .unwrap();
  cache
    .get_or_add_with("k", EntryOptions::new().tag("second"), || 2i32)
    .unwrap();

  assert!(!cache.clear_tag("second"), "the losing call never registered its tag");
  assert!(cache.clear_tag("first"));
  assert_eq!(cache.try_get::<i32, _>("k").unwrap(), None);
}

#[test]
fn test_fault_is_shared_by_joined_callers() {
  let cache = build_test_cache();
  let load_count = Arc::new(AtomicUsize::new(0));
  let num_threads = 8;
  let barrier = Arc::new(Barrier::new(num_threads));

  let handles: Vec<_> = (0..num_threads)
    .map(|_| {
      let cache = cache.clone();
      let barrier = barrier.clone();
      let load_count = load_count.clone();
      thread::spawn(move || {
        barrier.wait();
        cache.try_get_or_add_with("k", EntryOptions::new(), move || -> Result<i32, Boom> {
          load_count.fetch_add(1, Ordering::SeqCst);
          thread::sleep(Duration::from_millis(200));
          Err(Boom)
        })
      })
    })
    .collect();

  for handle in handles {
    let err = handle.join().unwrap().unwrap_err();
    assert!(matches!(err, CacheError::Producer(_)));
    assert_eq!(err.to_string(), "value producer failed: boom");
  }
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
  assert_eq!(cache.entry_count(), 0, "a fault is never cached");
  assert_eq!(cache.metrics().load_failures, 1);
}

#[test]
fn test_factory_runs_again_after_fault() {
  let cache = build_test_cache();

  let first = cache.try_get_or_add_with("k", EntryOptions::new(), || Err::<i32, _>(Boom));
  assert!(first.is_err());

  let second = cache.get_or_add("k", || 2i32).unwrap();
  assert_eq!(second, 2);
  assert_eq!(cache.try_get::<i32, _>("k").unwrap(), Some(2));
}

#[test]
fn test_canceled_factory() {
  let cache = build_test_cache();

  let err = cache
    .try_get_or_add_with("k", EntryOptions::new(), || Err::<i32, _>(Canceled))
    .unwrap_err();
  assert!(matches!(err, CacheError::Canceled));
  assert_eq!(cache.try_get::<i32, _>("k").unwrap(), None);
}

#[test]
fn test_panicking_factory_cancels_waiters() {
  let cache = build_test_cache();

  let claimant = {
    let cache = cache.clone();
    thread::spawn(move || {
      cache.get_or_add("k", || -> i32 {
        thread::sleep(Duration::from_millis(100));
        panic!("factory panicked");
      })
    })
  };
  thread::sleep(Duration::from_millis(20));
  let waiter = {
    let cache = cache.clone();
    thread::spawn(move || cache.get_or_add("k", || 1i32))
  };

  assert!(claimant.join().is_err());
  assert!(matches!(waiter.join().unwrap(), Err(CacheError::Canceled)));

  // The next caller starts over.
  assert_eq!(cache.get_or_add("k", || 3i32).unwrap(), 3);
}

#[test]
fn test_try_get_joins_inflight_computation() {
  let cache = build_test_cache();
  let load_count = Arc::new(AtomicUsize::new(0));

  let producer = {
    let cache = cache.clone();
    let factory = slow_counting_factory(&load_count, 11);
    thread::spawn(move || cache.get_or_add("k", factory).unwrap())
  };
  thread::sleep(Duration::from_millis(20));

  assert_eq!(cache.try_get::<i32, _>("k").unwrap(), Some(11));
  assert_eq!(producer.join().unwrap(), 11);
  assert_eq!(load_count.load(Ordering::SeqCst), 1);
}

#[test]
fn test_remove_during_computation_keeps_joined_callers() {
  let cache = build_test_cache();
  let load_count = Arc::new(AtomicUsize::new(0));

  let producer = {
    let cache = cache.clone();
    let factory = slow_counting_factory(&load_count, 1);
    thread::spawn(move || cache.get_or_add("k", factory).unwrap())
  };
  thread::sleep(Duration::from_millis(20));

  assert!(cache.remove("k"));
  // The caller that started the computation still gets its value.
  assert_eq!(producer.join().unwrap(), 1);
  // The key slot was vacated, so a new call computes afresh.
  assert_eq!(cache.get_or_add("k", || 2i32).unwrap(), 2);
}

#[test]
fn test_add_during_computation_replaces_it() {
  let cache = build_test_cache();
  let load_count = Arc::new(AtomicUsize::new(0));

  let producer = {
    let cache = cache.clone();
    let factory = slow_counting_factory(&load_count, 1);
    thread::spawn(move || cache.get_or_add("k", factory).unwrap())
  };
  thread::sleep(Duration::from_millis(20));

  cache.add("k", 2i32);
  assert_eq!(producer.join().unwrap(), 1);
  assert_eq!(cache.try_get::<i32, _>("k").unwrap(), Some(2));
}
