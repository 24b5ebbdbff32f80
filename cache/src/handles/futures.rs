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
use std::future::Future;
use std::hash::{BuildHasher, Hash};

// --- Async operations ---
//
// These suspend the calling task while a value is being computed. They join
// computations started by blocking callers and vice versa.

impl<K, G, H> MemoryCache<K, G, H>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  G: Eq + Hash + Clone + Send + Sync + 'static,
  H: BuildHasher + Clone + Send + Sync + 'static,
{
  /// Async counterpart of [`try_get`](Self::try_get).
  pub async fn try_get_async<V, Q>(&self, key: &Q) -> Result<Option<V>, CacheError>
  where
    V: Any + Clone,
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    match self.find(key) {
      Some(entry) => self.read(&entry).await.map(Some),
      None => Ok(None),
    }
  }

  /// Async counterpart of [`get`](Self::get).
  pub async fn get_async<V, Q>(&self, key: &Q) -> Result<V, CacheError>
  where
    V: Any + Clone + Default,
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    Ok(self.try_get_async(key).await?.unwrap_or_default())
  }

  /// Returns the value for `key`, computing it with the async `factory` if
  /// there is no live entry. The entry never expires and has no tags.
  pub async fn get_or_add_async<V, F, Fut>(&self, key: K, factory: F) -> Result<V, CacheError>
  where
    V: Any + Clone + Send + Sync,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = V> + Send + 'static,
  {
    self
      .get_or_add_async_with(key, EntryOptions::new(), factory)
      .await
  }

  /// Returns the value for `key`, computing it with the async `factory` if
  /// there is no live entry.
  ///
  /// The factory's future runs detached from this call: dropping the
  /// returned future does not cancel it when a runtime was available to
  /// spawn it on. Without a runtime the claiming caller drives it, and
  /// dropping that caller cancels the computation for everyone.
  pub async fn get_or_add_async_with<V, F, Fut>(
    &self,
    key: K,
    options: EntryOptions<G>,
    factory: F,
  ) -> Result<V, CacheError>
  where
    V: Any + Clone + Send + Sync,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = V> + Send + 'static,
  {
    self
      .try_get_or_add_async_with(key, options, move || {
        let fut = factory();
        async move { Ok::<_, Infallible>(fut.await) }
      })
      .await
  }

  /// Like [`get_or_add_async_with`](Self::get_or_add_async_with), with a
  /// fallible factory. See
  /// [`try_get_or_add_with`](Self::try_get_or_add_with) for fault handling.
  pub async fn try_get_or_add_async_with<V, E, F, Fut>(
    &self,
    key: K,
    options: EntryOptions<G>,
    factory: F,
  ) -> Result<V, CacheError>
  where
    V: Any + Clone + Send + Sync,
    E: Into<BoxError> + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
  {
    let metrics = self.shared.metrics.clone();
    let entry = self.find_or_install(key, options, move || {
      SingleFlightCell::deferred(Producer::future(move || {
        Metrics::incr(&metrics.loads);
        let fut = factory();
        async move { fut.await.map(value::erase).map_err(Into::<BoxError>::into) }
      }))
    })?;
    self.read(&entry).await
  }

  async fn read<V: Any + Clone>(&self, entry: &EntryRef<K, G>) -> Result<V, CacheError> {
    let outcome = entry.payload.get(self.shared.spawner()).await;
    let value = self.shared.settle(entry, outcome)?;
    value::downcast(&value)
  }
}
