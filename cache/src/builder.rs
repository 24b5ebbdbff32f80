use crate::error::BuildError;
use crate::handles::MemoryCache;
use crate::metrics::Metrics;
use crate::shared::CacheShared;
use crate::tags::TagIndex;
use crate::task::sweeper::Sweeper;
use crate::TaskSpawner;

use core::fmt;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

/// The default minimum interval between two expiration sweeps.
pub const DEFAULT_SCAN_FREQUENCY: Duration = Duration::from_secs(60);

/// A builder for creating [`MemoryCache`] instances.
///
/// `K` is the key type and `G` the tag type, which defaults to the key type.
pub struct CacheBuilder<K, G = K, H = ahash::RandomState> {
  pub(crate) shards: usize,
  pub(crate) scan_frequency: Duration,
  pub(crate) hasher: H,
  spawner: Option<Arc<dyn TaskSpawner>>,
  _key_marker: PhantomData<K>,
  _tag_marker: PhantomData<G>,
}

// Manual Debug implementation for CacheBuilder.
impl<K, G, H> fmt::Debug for CacheBuilder<K, G, H> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("shards", &self.shards)
      .field("scan_frequency", &self.scan_frequency)
      .field("has_spawner", &self.spawner.is_some())
      .finish_non_exhaustive()
  }
}

// --- General Configuration Methods ---
impl<K, G, H> CacheBuilder<K, G, H> {
  /// Sets the number of concurrent shards used by the key store and the tag
  /// index.
  pub fn shards(mut self, shards: usize) -> Self {
    // dashmap wants a power of two greater than one.
    self.shards = shards.max(2).next_power_of_two();
    self
  }

  /// Sets the minimum interval between two expiration sweeps.
  ///
  /// A sweep is triggered by cache operations, never by a timer, and runs on
  /// a background thread. Defaults to one minute.
  pub fn expiration_scan_frequency(mut self, frequency: Duration) -> Self {
    self.scan_frequency = frequency;
    self
  }

  /// Sets the spawner used to run asynchronous value producers.
  ///
  /// Without one, producers are spawned on the ambient Tokio runtime when
  /// there is one and driven by the claiming caller otherwise.
  pub fn spawner(mut self, spawner: Arc<dyn TaskSpawner>) -> Self {
    self.spawner = Some(spawner);
    self
  }

  /// Sets the hasher for the key store and the tag index.
  pub fn hasher(mut self, hasher: H) -> Self {
    self.hasher = hasher;
    self
  }
}

// --- Default Constructor ---
impl<K, G, H: BuildHasher + Default> CacheBuilder<K, G, H> {
  /// Creates a new `CacheBuilder` with default settings.
  pub fn new() -> Self {
    Self {
      shards: (num_cpus::get() * 4).max(2).next_power_of_two(),
      scan_frequency: DEFAULT_SCAN_FREQUENCY,
      hasher: H::default(),
      spawner: None,
      _key_marker: PhantomData,
      _tag_marker: PhantomData,
    }
  }
}

impl<K, G> Default for CacheBuilder<K, G, ahash::RandomState> {
  fn default() -> Self {
    Self::new()
  }
}

// --- Build Methods ---
impl<K, G, H> CacheBuilder<K, G, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  G: Eq + Hash + Clone + Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Builds the cache.
  pub fn build(self) -> Result<MemoryCache<K, G, H>, BuildError> {
    self.validate()?;
    Ok(self.assemble())
  }

  /// Constructs the shared core. Callers must have validated the settings.
  pub(crate) fn assemble(self) -> MemoryCache<K, G, H> {
    let shared = CacheShared {
      entries: DashMap::with_capacity_and_hasher_and_shard_amount(
        0,
        self.hasher.clone(),
        self.shards,
      ),
      tags: TagIndex::new(self.hasher, self.shards),
      sweeper: Sweeper::new(self.scan_frequency),
      metrics: Arc::new(Metrics::new()),
      spawner: self.spawner,
    };

    MemoryCache {
      shared: Arc::new(shared),
    }
  }

  fn validate(&self) -> Result<(), BuildError> {
    if self.scan_frequency.is_zero() {
      return Err(BuildError::ZeroScanFrequency);
    }
    Ok(())
  }
}
