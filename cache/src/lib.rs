//! A concurrent, in-process cache of heterogeneous values with tag based
//! invalidation and single-flight value production.
//!
//! # Features
//! - **Any value type**: Entries are type-erased; reads name the type they
//!   expect and get a clone back, or a `TypeMismatch` error.
//! - **Expiration**: Fixed lifetimes, absolute wall-clock deadlines and
//!   sliding windows that every access pushes forward.
//! - **Tags**: Any entry can carry tags; clearing a tag evicts the entries
//!   registered under it at that moment. Later registrations start afresh.
//! - **Single-flight**: Concurrent `get_or_add*` calls for one key run one
//!   factory and share its outcome, value or failure. A failed computation is
//!   never cached.
//! - **Sync & Async**: Blocking and `async` callers join the same
//!   computations.
//! - **Observability**: `tracing` events and a metrics snapshot.
//!
//! ```
//! use fibre_tagcache::{EntryOptions, MemoryCache};
//! use std::time::Duration;
//!
//! let cache: MemoryCache<String> = MemoryCache::new();
//! let options = EntryOptions::new()
//!   .tag("users")
//!   .lifetime(Duration::from_secs(60));
//!
//! let name: String = cache
//!   .get_or_add_with("user:1".to_string(), options, || "Ada".to_string())
//!   .unwrap();
//! assert_eq!(name, "Ada");
//!
//! cache.clear_tag("users");
//! assert_eq!(cache.try_get::<String, _>("user:1").unwrap(), None);
//! ```

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod metrics;
pub mod options;
pub mod runtime;

// Internal, crate-only modules
mod cell;
mod entry;
mod shared;
mod tags;
mod task;
mod time;
mod value;

// Re-export the primary user-facing types for convenience
pub use builder::CacheBuilder;
pub use error::{BoxError, BuildError, CacheError, Canceled};
pub use handles::MemoryCache;
pub use metrics::MetricsSnapshot;
pub use options::{EntryOptions, Expiration};
pub use runtime::TaskSpawner;
#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
