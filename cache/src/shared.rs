use crate::cell::Outcome;
use crate::entry::CacheEntry;
use crate::metrics::Metrics;
use crate::tags::TagIndex;
use crate::task::sweeper::Sweeper;
use crate::TaskSpawner;

use std::borrow::Borrow;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

pub(crate) type EntryRef<K, G> = Arc<CacheEntry<K, G>>;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Retirement {
  Replaced,
  Removed,
  Expired,
  TagCleared,
  Faulted,
}

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<K, G, H> {
  pub(crate) entries: DashMap<K, EntryRef<K, G>, H>,
  pub(crate) tags: TagIndex<K, G, H>,
  pub(crate) sweeper: Sweeper,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) spawner: Option<Arc<dyn TaskSpawner>>,
}

impl<K, G, H> fmt::Debug for CacheShared<K, G, H>
where
  K: Eq + Hash,
  G: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("entries", &self.entries.len())
      .field("tags", &self.tags.len())
      .field("sweeper", &self.sweeper)
      .field("metrics", &self.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<K, G, H> CacheShared<K, G, H>
where
  K: Eq + Hash + Clone,
  G: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  pub(crate) fn spawner(&self) -> Option<&dyn TaskSpawner> {
    self.spawner.as_deref()
  }

  /// Returns the entry for `key` if it is live, retiring it on the spot if
  /// it turns out to be expired or faulted.
  pub(crate) fn lookup<Q>(&self, key: &Q, now: u64) -> Option<EntryRef<K, G>>
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let entry = self.entries.get(key).map(|r| r.value().clone())?;
    if entry.is_retired() {
      return None;
    }
    if entry.is_expired(now) {
      self.retire_live(&entry, Retirement::Expired);
      return None;
    }
    if matches!(entry.payload.peek(), Some(Err(_))) {
      self.retire_live(&entry, Retirement::Faulted);
      return None;
    }
    Some(entry)
  }

  /// Unconditionally installs `entry`, retiring whatever held its key.
  pub(crate) fn install(&self, entry: EntryRef<K, G>) {
    if let Some(displaced) = self.entries.insert(entry.key.clone(), entry.clone()) {
      self.retire_detached(&displaced, Retirement::Replaced);
    }
    self.register(&entry);
  }

  /// Installs `candidate` unless a live entry already holds its key.
  ///
  /// Returns the entry that holds the key afterwards and whether it is the
  /// candidate.
  pub(crate) fn install_if_vacant(
    &self,
    candidate: EntryRef<K, G>,
    now: u64,
  ) -> (EntryRef<K, G>, bool) {
    let (winner, displaced) = match self.entries.entry(candidate.key.clone()) {
      Entry::Occupied(mut slot) => {
        let occupant = slot.get();
        let live = !occupant.is_retired()
          && !occupant.is_expired(now)
          && !matches!(occupant.payload.peek(), Some(Err(_)));
        if live {
          (slot.get().clone(), None)
        } else {
          let old = slot.insert(candidate.clone());
          (candidate.clone(), Some(old))
        }
      }
      Entry::Vacant(slot) => {
        slot.insert(candidate.clone());
        (candidate.clone(), None)
      }
    };

    if let Some(old) = displaced {
      self.retire_detached(&old, Retirement::Expired);
    }

    let installed = Arc::ptr_eq(&winner, &candidate);
    if installed {
      self.register(&winner);
    }
    (winner, installed)
  }

  /// Links a freshly installed entry into its tag sets. If one of them was
  /// cleared concurrently, the entry is evicted with it.
  fn register(&self, entry: &EntryRef<K, G>) {
    if entry.tags.is_empty() || self.tags.link(entry) {
      return;
    }
    self
      .entries
      .remove_if(&entry.key, |_, live| Arc::ptr_eq(live, entry));
    // `link` already undid its own registrations.
    if entry.mark_retired() {
      self.count(Retirement::TagCleared);
      trace!(entry = entry.id(), "entry evicted by a concurrent tag clear");
    }
  }

  /// Vacates the key slot if `entry` still holds it, then retires `entry`.
  pub(crate) fn retire_live(&self, entry: &EntryRef<K, G>, reason: Retirement) -> bool {
    self
      .entries
      .remove_if(&entry.key, |_, live| Arc::ptr_eq(live, entry));
    self.retire_detached(entry, reason)
  }

  /// Retires an entry that is no longer in the key store. Returns `false` if
  /// another caller already did.
  fn retire_detached(&self, entry: &CacheEntry<K, G>, reason: Retirement) -> bool {
    if !entry.mark_retired() {
      return false;
    }
    self.tags.unlink(entry);
    self.count(reason);
    trace!(entry = entry.id(), ?reason, "entry retired");
    true
  }

  fn count(&self, reason: Retirement) {
    let counter = match reason {
      Retirement::Replaced => &self.metrics.replaced,
      Retirement::Removed => &self.metrics.invalidations,
      Retirement::Expired => &self.metrics.expirations,
      Retirement::TagCleared => &self.metrics.evicted_by_tag,
      Retirement::Faulted => &self.metrics.load_failures,
    };
    Metrics::incr(counter);
  }

  /// Hands a cell outcome back to a reader. A failed outcome retires the
  /// entry so the next caller starts a fresh attempt.
  pub(crate) fn settle(&self, entry: &EntryRef<K, G>, outcome: Outcome) -> Outcome {
    if let Err(err) = &outcome {
      if self.retire_live(entry, Retirement::Faulted) {
        debug!(entry = entry.id(), error = %err, "value producer failed, entry retired");
      }
    }
    outcome
  }

  /// Removes the entry for `key`. Returns `false` if the slot was empty or
  /// held an entry that lookups already treat as absent.
  pub(crate) fn remove<Q>(&self, key: &Q, now: u64) -> bool
  where
    K: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let Some((_, entry)) = self.entries.remove(key) else {
      return false;
    };
    if entry.has_expired(now) {
      self.retire_detached(&entry, Retirement::Expired);
      return false;
    }
    if matches!(entry.payload.peek(), Some(Err(_))) {
      self.retire_detached(&entry, Retirement::Faulted);
      return false;
    }
    // Loses against a concurrent retirement of the same entry.
    self.retire_detached(&entry, Retirement::Removed)
  }

  /// Retires every entry registered under `tag`. Returns `false` if the tag
  /// was unknown.
  pub(crate) fn clear_tag<Q>(&self, tag: &Q) -> bool
  where
    G: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let Some(members) = self.tags.detach(tag) else {
      return false;
    };
    Metrics::incr(&self.metrics.tag_clears);

    let evicted = members
      .iter()
      .filter(|entry| self.retire_live(entry, Retirement::TagCleared))
      .count();
    debug!(evicted, "tag cleared");
    true
  }

  /// Retires every entry that has expired at `now`. Returns how many this
  /// call retired.
  pub(crate) fn retire_expired(&self, now: u64) -> usize {
    // Collect first: retiring takes shard locks of its own.
    let expired: Vec<EntryRef<K, G>> = self
      .entries
      .iter()
      .filter(|r| r.value().has_expired(now))
      .map(|r| r.value().clone())
      .collect();

    expired
      .iter()
      .filter(|entry| self.retire_live(entry, Retirement::Expired))
      .count()
  }
}
