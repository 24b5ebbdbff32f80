use crate::entry::Expiry;
use crate::error::CacheError;
use crate::time;

use std::time::{Duration, SystemTime};

/// How an entry expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
  /// The entry lives until it is replaced, removed or cleared through a tag.
  #[default]
  Never,
  /// The entry expires a fixed duration after it was added.
  Lifetime(Duration),
  /// The entry expires at an absolute wall-clock instant.
  Deadline(SystemTime),
  /// The entry expires once it has gone unaccessed for the given window.
  /// Every successful access pushes the expiry forward.
  Sliding(Duration),
}

impl Expiration {
  /// Builds a fixed or sliding expiration from the `(sliding, duration)` pair.
  pub fn from_parts(sliding: bool, duration: Duration) -> Self {
    if sliding {
      Expiration::Sliding(duration)
    } else {
      Expiration::Lifetime(duration)
    }
  }

  /// Validates the expiration and anchors it at `now`.
  pub(crate) fn resolve(self, now: u64) -> Result<Expiry, CacheError> {
    match self {
      Expiration::Never => Ok(Expiry::fixed(time::NEVER)),
      Expiration::Lifetime(lifetime) => {
        if lifetime.is_zero() {
          return Err(CacheError::invalid_argument(
            "lifetime",
            "must be greater than zero",
          ));
        }
        Ok(Expiry::fixed(
          now.saturating_add(time::duration_to_nanos(lifetime)),
        ))
      }
      Expiration::Deadline(deadline) => {
        let remaining = time::remaining_until(deadline).ok_or(CacheError::invalid_argument(
          "deadline",
          "must be strictly in the future",
        ))?;
        Ok(Expiry::fixed(
          now.saturating_add(time::duration_to_nanos(remaining)),
        ))
      }
      Expiration::Sliding(window) => {
        if window.is_zero() {
          return Err(CacheError::invalid_argument(
            "window",
            "must be greater than zero",
          ));
        }
        Ok(Expiry::sliding(time::duration_to_nanos(window), now))
      }
    }
  }
}

/// Per-entry options: the tags that can invalidate the entry and its
/// expiration policy.
///
/// ```
/// use fibre_tagcache::EntryOptions;
/// use std::time::Duration;
///
/// let options = EntryOptions::<&str>::new()
///   .tag("user:42")
///   .tag("profiles")
///   .sliding(Duration::from_secs(30));
/// assert_eq!(options.tags(), &["user:42", "profiles"]);
/// ```
#[derive(Debug, Clone)]
pub struct EntryOptions<G> {
  pub(crate) tags: Vec<G>,
  pub(crate) expiration: Expiration,
}

impl<G> Default for EntryOptions<G> {
  fn default() -> Self {
    Self {
      tags: Vec::new(),
      expiration: Expiration::Never,
    }
  }
}

impl<G> EntryOptions<G> {
  /// Options with no tags that never expire.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the expiration policy.
  pub fn expiration(mut self, expiration: Expiration) -> Self {
    self.expiration = expiration;
    self
  }

  /// Expire a fixed duration after insertion.
  pub fn lifetime(self, lifetime: Duration) -> Self {
    self.expiration(Expiration::Lifetime(lifetime))
  }

  /// Expire at an absolute wall-clock instant.
  pub fn deadline(self, deadline: SystemTime) -> Self {
    self.expiration(Expiration::Deadline(deadline))
  }

  /// Expire after `window` without access.
  pub fn sliding(self, window: Duration) -> Self {
    self.expiration(Expiration::Sliding(window))
  }

  /// The tags, in insertion order and without duplicates.
  pub fn tags(&self) -> &[G] {
    &self.tags
  }

  /// The configured expiration policy.
  pub fn get_expiration(&self) -> Expiration {
    self.expiration
  }
}

impl<G: PartialEq> EntryOptions<G> {
  /// Adds a tag. Duplicates are ignored.
  pub fn tag(mut self, tag: impl Into<G>) -> Self {
    let tag = tag.into();
    if !self.tags.contains(&tag) {
      self.tags.push(tag);
    }
    self
  }

  /// Adds several tags. Duplicates are ignored.
  pub fn tags_from<I, T>(self, tags: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<G>,
  {
    tags.into_iter().fold(self, |options, tag| options.tag(tag))
  }
}
