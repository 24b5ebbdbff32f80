use crate::entry::CacheEntry;

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use ahash::{HashMap, HashMapExt};
use dashmap::DashMap;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
  Active,
  /// Removed by the sweeper while empty. Late registrations retry against a
  /// fresh set.
  Pruned,
  /// Removed by `clear_tag`. Late registrations abort.
  Cleared,
}

/// The outcome of trying to add an entry to a tag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
  Added,
  Pruned,
  Cleared,
}

struct Members<K, G> {
  state: TagState,
  entries: HashMap<u64, Arc<CacheEntry<K, G>>>,
}

/// The set of entries registered under one tag.
pub(crate) struct TagEntry<K, G> {
  members: Mutex<Members<K, G>>,
}

impl<K, G> TagEntry<K, G> {
  fn new() -> Self {
    Self {
      members: Mutex::new(Members {
        state: TagState::Active,
        entries: HashMap::new(),
      }),
    }
  }

  fn try_add(&self, entry: &Arc<CacheEntry<K, G>>) -> Link {
    let mut members = self.members.lock();
    match members.state {
      TagState::Active => {
        members.entries.insert(entry.id(), entry.clone());
        Link::Added
      }
      TagState::Pruned => Link::Pruned,
      TagState::Cleared => Link::Cleared,
    }
  }

  fn remove(&self, id: u64) {
    self.members.lock().entries.remove(&id);
  }

  /// Marks the set cleared and hands back everything it held.
  fn clear(&self) -> Vec<Arc<CacheEntry<K, G>>> {
    let mut members = self.members.lock();
    members.state = TagState::Cleared;
    members.entries.drain().map(|(_, entry)| entry).collect()
  }

  /// Marks the set pruned if, and only if, it is empty right now.
  fn prune_if_empty(&self) -> bool {
    let mut members = self.members.lock();
    if members.state == TagState::Active && members.entries.is_empty() {
      members.state = TagState::Pruned;
      true
    } else {
      false
    }
  }

  fn is_empty(&self) -> bool {
    self.members.lock().entries.is_empty()
  }
}

/// Tag -> set of live entries.
///
/// Membership of a tag set means the entry was live when it registered, not
/// that it still is. Readers never go through the tag index, so a lingering
/// retired member only costs memory until it is unlinked.
pub(crate) struct TagIndex<K, G, H> {
  map: DashMap<G, Arc<TagEntry<K, G>>, H>,
}

impl<K, G, H> TagIndex<K, G, H>
where
  G: Eq + Hash + Clone,
  H: BuildHasher + Clone,
{
  pub(crate) fn new(hasher: H, shards: usize) -> Self {
    Self {
      map: DashMap::with_capacity_and_hasher_and_shard_amount(0, hasher, shards),
    }
  }

  pub(crate) fn len(&self) -> usize {
    self.map.len()
  }

  /// Registers `entry` under each of its tags, creating sets on demand.
  ///
  /// Returns `false` if registration was aborted because the entry got
  /// retired or one of its tags got cleared in the meantime. Links made so
  /// far are undone before returning.
  pub(crate) fn link(&self, entry: &Arc<CacheEntry<K, G>>) -> bool {
    for (linked, tag) in entry.tags.iter().enumerate() {
      let added = loop {
        let tag_entry = self
          .map
          .entry(tag.clone())
          .or_insert_with(|| Arc::new(TagEntry::new()))
          .value()
          .clone();

        match tag_entry.try_add(entry) {
          Link::Added => break true,
          // The sweeper dropped this set under us; the next lookup creates a fresh one.
          Link::Pruned => continue,
          Link::Cleared => break false,
        }
      };

      if !added || entry.is_retired() {
        // Include the tag just linked, if any.
        let undo = if added { linked + 1 } else { linked };
        self.unlink_tags(entry, &entry.tags[..undo]);
        return false;
      }
    }
    true
  }

  /// Removes `entry` from every tag set it may be registered in.
  pub(crate) fn unlink(&self, entry: &CacheEntry<K, G>) {
    self.unlink_tags(entry, &entry.tags);
  }

  fn unlink_tags(&self, entry: &CacheEntry<K, G>, tags: &[G]) {
    for tag in tags {
      // Clone the set out so no map shard lock is held while locking it.
      let tag_entry = self.map.get(tag).map(|r| r.value().clone());
      if let Some(tag_entry) = tag_entry {
        tag_entry.remove(entry.id());
      }
    }
  }

  /// Detaches the whole set for `tag` and marks it cleared. Returns the
  /// members at that instant, or `None` if the tag was unknown.
  pub(crate) fn detach<Q>(&self, tag: &Q) -> Option<Vec<Arc<CacheEntry<K, G>>>>
  where
    G: Borrow<Q>,
    Q: Hash + Eq + ?Sized,
  {
    let (_, tag_entry) = self.map.remove(tag)?;
    Some(tag_entry.clear())
  }

  /// Drops every tag whose set is empty. Returns how many were pruned.
  pub(crate) fn prune_empty(&self) -> usize {
    let candidates: Vec<G> = self
      .map
      .iter()
      .filter(|r| r.value().is_empty())
      .map(|r| r.key().clone())
      .collect();

    candidates
      .iter()
      .filter(|tag| {
        self
          .map
          .remove_if(*tag, |_, tag_entry| tag_entry.prune_if_empty())
          .is_some()
      })
      .count()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cell::SingleFlightCell;
  use crate::entry::Expiry;
  use crate::value::erase;

  type Entry = CacheEntry<&'static str, &'static str>;

  fn index() -> TagIndex<&'static str, &'static str, ahash::RandomState> {
    TagIndex::new(ahash::RandomState::new(), 4)
  }

  fn entry(key: &'static str, tags: &[&'static str]) -> Arc<Entry> {
    Arc::new(CacheEntry::new(
      key,
      tags.to_vec(),
      Expiry::fixed(u64::MAX),
      SingleFlightCell::ready(erase(())),
    ))
  }

  #[test]
  fn link_then_detach_returns_members() {
    let tags = index();
    let a = entry("a", &["t", "u"]);
    let b = entry("b", &["t"]);
    assert!(tags.link(&a));
    assert!(tags.link(&b));
    assert_eq!(tags.len(), 2);

    let mut detached: Vec<_> = tags.detach("t").unwrap().iter().map(|e| e.key).collect();
    detached.sort();
    assert_eq!(detached, vec!["a", "b"]);
    assert!(tags.detach("t").is_none());
  }

  #[test]
  fn link_of_retired_entry_is_undone() {
    let tags = index();
    let a = entry("a", &["t", "u"]);
    a.mark_retired();
    assert!(!tags.link(&a));
    // Aborted after the first tag, so only that set was ever created.
    assert_eq!(tags.prune_empty(), 1);
    assert_eq!(tags.len(), 0);
  }

  #[test]
  fn unlink_leaves_empty_sets_for_the_sweeper() {
    let tags = index();
    let a = entry("a", &["t"]);
    assert!(tags.link(&a));
    tags.unlink(&a);
    assert_eq!(tags.len(), 1);
    assert_eq!(tags.prune_empty(), 1);
    assert_eq!(tags.len(), 0);
  }

  #[test]
  fn cleared_set_rejects_late_registration() {
    let tags = index();
    let stale = tags
      .map
      .entry("t")
      .or_insert_with(|| Arc::new(TagEntry::new()))
      .value()
      .clone();
    tags.detach("t");
    assert_eq!(stale.try_add(&entry("a", &["t"])), Link::Cleared);
  }

  #[test]
  fn pruned_set_is_replaced_on_registration() {
    let tags = index();
    let a = entry("a", &["t"]);
    assert!(tags.link(&a));
    tags.unlink(&a);
    assert_eq!(tags.prune_empty(), 1);

    let b = entry("b", &["t"]);
    assert!(tags.link(&b));
    assert_eq!(tags.detach("t").unwrap().len(), 1);
  }
}
