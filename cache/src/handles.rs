mod futures;
mod sync;

use crate::builder::CacheBuilder;
use crate::cell::SingleFlightCell;
use crate::entry::{CacheEntry, Expiry};
use crate::error::CacheError;
use crate::metrics::Metrics;
use crate::options::EntryOptions;
use crate::shared::{CacheShared, EntryRef};
use crate::task::sweeper::Sweeper;
use crate::{time, value, MetricsSnapshot};

use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// A thread-safe, in-process cache of heterogeneous values with tag based
/// invalidation.
///
/// The handle is cheap to clone; every clone shares the same entries. Values
/// of any `'static + Send + Sync` type can be stored and are cloned out on
/// read, so store an `Arc<T>` to share ownership instead.
pub struct MemoryCache<K, G = K, H = ahash::RandomState> {
  pub(crate) shared: Arc<CacheShared<K, G, H>>,
}

impl<K, G, H> Clone for MemoryCache<K, G, H> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<K, G, H> fmt::Debug for MemoryCache<K, G, H>
where
  K: Eq + Hash,
  G: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<K, G> MemoryCache<K, G, ahash::RandomState>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  G: Eq + Hash + Clone + Send + Sync + 'static,
{
  /// Creates a cache with default settings.
  pub fn new() -> Self {
    CacheBuilder::default().assemble()
  }

  /// Starts configuring a cache.
  pub fn builder() -> CacheBuilder<K, G> {
    CacheBuilder::default()
  }
}

impl<K, G> Default for MemoryCache<K, G, ahash::RandomState>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  G: Eq + Hash + Clone + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, G, H> MemoryCache<K, G, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  G: Eq + Hash + Clone + Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// Number of key slots currently held, including entries that have
  /// expired but were not swept yet.
  pub fn entry_count(&self) -> usize {
    self.shared.entries.len()
  }

  /// Number of tags currently indexed, including tags whose sets are empty
  /// but were not pruned yet.
  pub fn tag_count(&self) -> usize {
    self.shared.tags.len()
  }

  /// Stores `value` under `key`. The entry never expires and has no tags.
  ///
  /// Any previous entry for the key is replaced, including one whose value
  /// is still being computed; callers already waiting on that computation
  /// still receive its outcome.
  pub fn add<V>(&self, key: K, value: V)
  where
    V: Any + Send + Sync,
  {
    self.install(key, Expiry::fixed(time::NEVER), Vec::new(), value);
  }

  /// Stores `value` under `key` for a fixed `lifetime`.
  pub fn add_with_lifetime<V>(&self, key: K, lifetime: Duration, value: V) -> Result<(), CacheError>
  where
    V: Any + Send + Sync,
  {
    self.add_with(key, EntryOptions::new().lifetime(lifetime), value)
  }

  /// Stores `value` under `key` until the wall-clock `deadline`.
  pub fn add_with_deadline<V>(&self, key: K, deadline: SystemTime, value: V) -> Result<(), CacheError>
  where
    V: Any + Send + Sync,
  {
    self.add_with(key, EntryOptions::new().deadline(deadline), value)
  }

  /// Stores `value` under `key` until it goes unaccessed for `window`.
  pub fn add_sliding<V>(&self, key: K, window: Duration, value: V) -> Result<(), CacheError>
  where
    V: Any + Send + Sync,
  {
    self.add_with(key, EntryOptions::new().sliding(window), value)
  }

  /// Stores `value` under `key` with explicit tags and expiration.
  ///
  /// Fails with [`CacheError::InvalidArgument`] for a zero lifetime or
  /// window and for a deadline that is not strictly in the future. The
  /// cache is left untouched in that case.
  pub fn add_with<V>(&self, key: K, options: EntryOptions<G>, value: V) -> Result<(), CacheError>
  where
    V: Any + Send + Sync,
  {
    let expiry = options.expiration.resolve(time::now_nanos())?;
    self.install(key, expiry, options.tags, value);
    Ok(())
  }

  fn install<V>(&self, key: K, expiry: Expiry, tags: Vec<G>, value: V)
  where
    V: Any + Send + Sync,
  {
    self.maintain();
    let entry = CacheEntry::new(key, tags, expiry, SingleFlightCell::ready(value::erase(value)));
    self.shared.install(Arc::new(entry));
    Metrics::incr(&self.shared.metrics.inserts);
  }

  /// Removes the entry for `key`. Returns `true` if there was a live one;
  /// an expired or failed entry is dropped but reported as absent.
  ///
  /// Callers already waiting on the entry's computation still receive its
  /// outcome.
  pub fn remove<Q>(&self, key: &Q) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.maintain();
    self.shared.remove(key, time::now_nanos())
  }

  /// Evicts every entry that was registered under `tag`. Returns `true` if
  /// the tag was known.
  ///
  /// The clear acts on the tag's members at the moment it detaches them.
  /// An entry whose registration was already underway against that set is
  /// evicted too; one that registers after the detach starts a fresh set
  /// and survives.
  pub fn clear_tag<Q>(&self, tag: &Q) -> bool
  where
    G: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.maintain();
    self.shared.clear_tag(tag)
  }

  /// Gives the sweeper a chance to run. Never blocks.
  pub(crate) fn maintain(&self) {
    Sweeper::schedule(&self.shared);
  }

  /// Records the lookup and returns the live entry for `key`, if any.
  pub(crate) fn find<Q>(&self, key: &Q) -> Option<EntryRef<K, G>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    self.maintain();
    let found = self.shared.lookup(key, time::now_nanos());
    let counter = match found {
      Some(_) => &self.shared.metrics.hits,
      None => &self.shared.metrics.misses,
    };
    Metrics::incr(counter);
    found
  }

  /// Returns the live entry for `key`, or installs one that computes its
  /// value through `cell`. The expiration is validated before anything
  /// else happens.
  pub(crate) fn find_or_install<F>(
    &self,
    key: K,
    options: EntryOptions<G>,
    cell: F,
  ) -> Result<EntryRef<K, G>, CacheError>
  where
    F: FnOnce() -> SingleFlightCell,
  {
    let now = time::now_nanos();
    let expiry = options.expiration.resolve(now)?;
    self.maintain();

    if let Some(entry) = self.shared.lookup(&key, now) {
      Metrics::incr(&self.shared.metrics.hits);
      return Ok(entry);
    }

    let candidate = Arc::new(CacheEntry::new(key, options.tags, expiry, cell()));
    let (entry, installed) = self.shared.install_if_vacant(candidate, now);
    let counter = if installed {
      &self.shared.metrics.misses
    } else {
      &self.shared.metrics.hits
    };
    Metrics::incr(counter);
    Ok(entry)
  }
}
