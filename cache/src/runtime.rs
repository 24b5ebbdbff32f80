use std::{future::Future, pin::Pin};

/// A trait for spawning a future onto an asynchronous runtime.
///
/// Asynchronous value producers are spawned through it so that they keep
/// running independently of whichever caller happened to claim them.
pub trait TaskSpawner: Send + Sync + 'static {
  /// Spawns a type-erased future.
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>);
}

#[cfg(feature = "tokio")]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Creates a spawner bound to an explicit runtime handle.
  pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl Default for TokioSpawner {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(feature = "tokio")]
impl TaskSpawner for TokioSpawner {
  fn spawn(&self, future: Pin<Box<dyn Future<Output = ()> + Send>>) {
    self.0.spawn(future);
  }
}

/// Spawns `task` on the configured spawner, falling back to the ambient Tokio
/// runtime. Hands the task back if neither is usable so the caller can drive
/// it in place.
///
/// A caller that is about to block its thread on the task's outcome only
/// accepts a multi-threaded ambient runtime: on a current-thread runtime the
/// task could never make progress.
pub(crate) fn spawn_detached(
  spawner: Option<&dyn TaskSpawner>,
  task: Pin<Box<dyn Future<Output = ()> + Send>>,
  caller_blocks: bool,
) -> Result<(), Pin<Box<dyn Future<Output = ()> + Send>>> {
  if let Some(spawner) = spawner {
    spawner.spawn(task);
    return Ok(());
  }

  #[cfg(feature = "tokio")]
  if let Ok(handle) = tokio::runtime::Handle::try_current() {
    let usable =
      !caller_blocks || handle.runtime_flavor() == tokio::runtime::RuntimeFlavor::MultiThread;
    if usable {
      handle.spawn(task);
      return Ok(());
    }
  }

  #[cfg(not(feature = "tokio"))]
  let _ = caller_blocks;

  Err(task)
}
