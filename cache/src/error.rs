use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

/// A boxed error as returned by fallible value producers.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Errors that can occur when building a cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// The expiration scan frequency was zero. The sweeper needs a strictly
  /// positive minimum interval between runs.
  #[error("expiration scan frequency must be greater than zero")]
  ZeroScanFrequency,
}

/// Errors surfaced by cache operations.
///
/// The type is `Clone` because a single producer outcome is handed to every
/// caller that joined the same computation.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
  /// An argument was rejected before the cache was touched.
  #[error("invalid argument `{name}`: {reason}")]
  InvalidArgument {
    name: &'static str,
    reason: &'static str,
  },

  /// The cached value is not of the type requested by the caller.
  /// The cache is left untouched.
  #[error("cached value is not of the requested type `{requested}`")]
  TypeMismatch { requested: &'static str },

  /// The value producer failed. The error is shared verbatim with every
  /// caller that was waiting on the same computation.
  #[error("value producer failed: {0}")]
  Producer(#[source] Arc<dyn Error + Send + Sync>),

  /// The value producer was canceled before it published a value.
  #[error("value producer was canceled")]
  Canceled,
}

impl CacheError {
  pub(crate) fn invalid_argument(name: &'static str, reason: &'static str) -> Self {
    CacheError::InvalidArgument { name, reason }
  }

  /// Returns `true` for outcomes that come from a failed producer rather than
  /// from the caller's own arguments.
  pub fn is_producer_failure(&self) -> bool {
    matches!(self, CacheError::Producer(_) | CacheError::Canceled)
  }

  /// Maps the error returned by a fallible producer into the shared outcome.
  ///
  /// A producer signals cancellation by returning [`Canceled`] (or
  /// `CacheError::Canceled`); anything else is a fault.
  pub(crate) fn from_producer(error: BoxError) -> Self {
    if error.is::<Canceled>() {
      return CacheError::Canceled;
    }
    if let Some(inner) = error.downcast_ref::<CacheError>() {
      return inner.clone();
    }
    CacheError::Producer(Arc::from(error))
  }
}

/// Returned by a fallible producer to cancel its computation.
///
/// Every caller waiting on the computation observes [`CacheError::Canceled`]
/// and the entry is retired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Error)]
#[error("operation canceled")]
pub struct Canceled;
