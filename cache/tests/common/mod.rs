#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fibre_tagcache::{CacheBuilder, MemoryCache};

// A predictable hasher: integers hash to themselves and byte strings fold
// into an FNV-1a hash. Lets the tests pin down collisions across shards.
#[derive(Clone, Default)]
pub struct PredictableHasher;
impl BuildHasher for PredictableHasher {
  type Hasher = TestHasher;
  fn build_hasher(&self) -> Self::Hasher {
    TestHasher(0xcbf2_9ce4_8422_2325)
  }
}
pub struct TestHasher(u64);
impl Hasher for TestHasher {
  fn finish(&self) -> u64 {
    self.0
  }
  fn write(&mut self, bytes: &[u8]) {
    for byte in bytes {
      self.0 ^= u64::from(*byte);
      self.0 = self.0.wrapping_mul(0x0100_0000_01b3);
    }
  }
  fn write_i32(&mut self, i: i32) {
    self.0 = i as u64;
  }
}

pub type TestCache = MemoryCache<&'static str>;

pub fn build_test_cache() -> TestCache {
  CacheBuilder::new().shards(4).build().unwrap()
}

pub fn build_hashed_cache(shards: usize) -> MemoryCache<i32, &'static str, PredictableHasher> {
  CacheBuilder::new()
    .shards(shards)
    .hasher(PredictableHasher)
    .build()
    .unwrap()
}

// A cache whose sweeper may run every `frequency`.
pub fn build_sweeping_cache(frequency: Duration) -> TestCache {
  CacheBuilder::new()
    .shards(4)
    .expiration_scan_frequency(frequency)
    .build()
    .unwrap()
}

// A factory that counts its invocations and is slow enough for others to pile up.
pub fn slow_counting_factory(
  counter: &Arc<AtomicUsize>,
  value: i32,
) -> impl FnOnce() -> i32 + Send + 'static {
  let counter = counter.clone();
  move || {
    counter.fetch_add(1, Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(100));
    value
  }
}

#[derive(Debug)]
pub struct Boom;

impl std::fmt::Display for Boom {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("boom")
  }
}

impl std::error::Error for Boom {}
