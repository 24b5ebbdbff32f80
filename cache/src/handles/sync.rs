use crate::cell::{Producer, SingleFlightCell};
use crate::error::{BoxError, CacheError};
use crate::metrics::Metrics;
use crate::options::EntryOptions;
use crate::shared::EntryRef;
use crate::value;
use crate::MemoryCache;

use std::any::Any;
use std::borrow::Borrow;
use std::convert::Infallible;
use std::hash::{BuildHasher, Hash};

// --- Blocking operations ---
//
// These park the calling thread while a value is being computed by another
// caller. Do not call them from inside a current-thread async runtime while
// an asynchronous producer for the same key is in flight on that runtime.

impl<K, G, H> MemoryCache<K, G, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  G: Eq + Hash + Clone + Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Looks up `key` and returns a clone of its value.
  ///
  /// Returns `Ok(None)` if no live entry exists. If the value is still being
  /// computed, blocks until it is available and fails with the producer's
  /// error if the computation fails. Fails with
  /// [`CacheError::TypeMismatch`] if the stored value is not a `V`.
  pub fn try_get<V, Q>(&self, key: &Q) -> Result<Option<V>, CacheError>
  where
    V: Any + Clone,
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    match self.find(key) {
      Some(entry) => self.read_blocking(&entry).map(Some),
      None => Ok(None),
    }
  }

  /// Like [`try_get`](Self::try_get), but yields `V::default()` when no live
  /// entry exists.
  pub fn get<V, Q>(&self, key: &Q) -> Result<V, CacheError>
  where
    V: Any + Clone + Default,
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    Ok(self.try_get(key)?.unwrap_or_default())
  }

  /// Returns the value for `key`, computing it with `factory` if there is no
  /// live entry. The entry never expires and has no tags.
  pub fn get_or_add<V, F>(&self, key: K, factory: F) -> Result<V, CacheError>
  where
    V: Any + Clone + Send + Sync,
    F: FnOnce() -> V + Send + 'static,
  {
    self.get_or_add_with(key, EntryOptions::new(), factory)
  }

  /// Returns the value for `key`, computing it with `factory` if there is no
  /// live entry.
  ///
  /// Concurrent callers for the same key share a single execution of one
  /// factory; the others are never invoked. `options` only apply if this
  /// call installs the entry.
  pub fn get_or_add_with<V, F>(
    &self,
    key: K,
    options: EntryOptions<G>,
    factory: F,
  ) -> Result<V, CacheError>
  where
    V: Any + Clone + Send + Sync,
    F: FnOnce() -> V + Send + 'static,
  {
    self.try_get_or_add_with(key, options, move || Ok::<_, Infallible>(factory()))
  }

  /// Like [`get_or_add_with`](Self::get_or_add_with), with a fallible factory.
  ///
  /// If the factory fails, this call and every caller that joined it fail
  /// with the same [`CacheError::Producer`] error and the entry is removed,
  /// so a later call starts over. Returning [`Canceled`](crate::Canceled)
  /// reports [`CacheError::Canceled`] instead.
  pub fn try_get_or_add_with<V, E, F>(
    &self,
    key: K,
    options: EntryOptions<G>,
    factory: F,
  ) -> Result<V, CacheError>
  where
    V: Any + Clone + Send + Sync,
    E: Into<BoxError> + 'static,
    F: FnOnce() -> Result<V, E> + Send + 'static,
  {
    let metrics = self.shared.metrics.clone();
    let entry = self.find_or_install(key, options, move || {
      SingleFlightCell::deferred(Producer::blocking(move || {
        Metrics::incr(&metrics.loads);
        factory().map(value::erase).map_err(Into::<BoxError>::into)
      }))
    })?;
    self.read_blocking(&entry)
  }

  fn read_blocking<V: Any + Clone>(&self, entry: &EntryRef<K, G>) -> Result<V, CacheError> {
    let outcome = entry.payload.get_blocking(self.shared.spawner());
    let value = self.shared.settle(entry, outcome)?;
    value::downcast(&value)
  }
}
