use crate::error::{BoxError, CacheError};
use crate::runtime::{self, TaskSpawner};
use crate::value::Value;

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

/// The outcome every observer of a cell sees.
pub(crate) type Outcome = Result<Value, CacheError>;

pub(crate) type SyncProducer = Box<dyn FnOnce() -> Result<Value, BoxError> + Send>;
pub(crate) type AsyncProducer =
  Box<dyn FnOnce() -> BoxFuture<'static, Result<Value, BoxError>> + Send>;

/// A deferred computation, either blocking or asynchronous.
pub(crate) enum Producer {
  Sync(SyncProducer),
  Async(AsyncProducer),
}

impl Producer {
  pub(crate) fn blocking<F>(produce: F) -> Self
  where
    F: FnOnce() -> Result<Value, BoxError> + Send + 'static,
  {
    Producer::Sync(Box::new(produce))
  }

  pub(crate) fn future<F, Fut>(produce: F) -> Self
  where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
  {
    Producer::Async(Box::new(move || produce().boxed()))
  }
}

/// Represents a waiter in the queue of an unresolved cell.
enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

enum State {
  Pending(Producer),
  Claimed,
  Resolved(Outcome),
}

struct Inner {
  state: State,
  waiters: VecDeque<Waiter>,
}

/// An exactly-once computation holder.
///
/// The first accessor claims the producer (`Pending -> Claimed`) and is the
/// only one to run it. Every other accessor joins: synchronous callers park
/// their thread, asynchronous callers suspend. When the claimant publishes,
/// all of them observe the same outcome, value or failure.
pub(crate) struct SingleFlightCell {
  inner: Mutex<Inner>,
}

impl SingleFlightCell {
  /// A cell that is already resolved with `value`.
  pub(crate) fn ready(value: Value) -> Self {
    Self::with_state(State::Resolved(Ok(value)))
  }

  /// A cell that will run `producer` on first access.
  pub(crate) fn deferred(producer: Producer) -> Self {
    Self::with_state(State::Pending(producer))
  }

  fn with_state(state: State) -> Self {
    Self {
      inner: Mutex::new(Inner {
        state,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Returns the outcome if the cell has already resolved.
  pub(crate) fn peek(&self) -> Option<Outcome> {
    match &self.inner.lock().state {
      State::Resolved(outcome) => Some(outcome.clone()),
      _ => None,
    }
  }

  /// Atomically moves `Pending -> Claimed`, handing the producer to the caller.
  fn claim(&self) -> Option<Producer> {
    let mut inner = self.inner.lock();
    if !matches!(inner.state, State::Pending(_)) {
      return None;
    }
    match std::mem::replace(&mut inner.state, State::Claimed) {
      State::Pending(producer) => Some(producer),
      _ => None,
    }
  }

  /// Publishes the outcome and wakes every waiter. Only the first publish
  /// of a claimed cell takes effect.
  fn resolve(&self, outcome: Outcome) {
    let mut inner = self.inner.lock();
    if !matches!(inner.state, State::Claimed) {
      return;
    }
    inner.state = State::Resolved(outcome);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }

  /// Reads the outcome, blocking the current thread while the computation
  /// is in flight.
  ///
  /// If the cell is still pending, the calling thread becomes the claimant.
  /// A synchronous producer runs inline. An asynchronous producer is spawned
  /// on a multi-threaded runtime when one is available and run to completion
  /// on this thread otherwise.
  pub(crate) fn get_blocking(self: &Arc<Self>, spawner: Option<&dyn TaskSpawner>) -> Outcome {
    if let Some(producer) = self.claim() {
      match producer {
        Producer::Sync(produce) => self.run_sync(produce),
        Producer::Async(produce) => {
          let task = self.publishing_task(produce);
          if let Err(task) = runtime::spawn_detached(spawner, task, true) {
            futures_executor::block_on(task);
          }
        }
      }
    }

    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        State::Resolved(outcome) => return outcome.clone(),
        _ => {
          inner.waiters.push_back(Waiter::Sync(thread::current()));
          drop(inner); // Unlock before parking.
          thread::park();
          inner = self.inner.lock();
        }
      }
    }
  }

  /// Reads the outcome, suspending the current task while the computation
  /// is in flight.
  ///
  /// If the cell is still pending, this task becomes the claimant. A
  /// synchronous producer runs inline. An asynchronous producer is spawned
  /// when a runtime is available and awaited in place otherwise; dropping
  /// this future then cancels the computation for every waiter.
  pub(crate) async fn get(self: &Arc<Self>, spawner: Option<&dyn TaskSpawner>) -> Outcome {
    if let Some(producer) = self.claim() {
      match producer {
        Producer::Sync(produce) => self.run_sync(produce),
        Producer::Async(produce) => {
          let task = self.publishing_task(produce);
          if let Err(task) = runtime::spawn_detached(spawner, task, false) {
            task.await;
          }
        }
      }
    }

    Resolution { cell: self }.await
  }

  fn run_sync(self: &Arc<Self>, produce: SyncProducer) {
    let guard = PublishGuard::new(self.clone());
    let result = produce();
    guard.publish(result.map_err(CacheError::from_producer));
  }

  /// Wraps an async producer in a task that publishes its outcome. If the
  /// task is dropped before completion, the cell resolves as canceled.
  fn publishing_task(self: &Arc<Self>, produce: AsyncProducer) -> BoxFuture<'static, ()> {
    let guard = PublishGuard::new(self.clone());
    Box::pin(async move {
      let result = produce().await;
      guard.publish(result.map_err(CacheError::from_producer));
    })
  }
}

/// Resolves a claimed cell as canceled unless an outcome was published.
/// Covers producers that panic and async producers that are dropped.
struct PublishGuard {
  cell: Option<Arc<SingleFlightCell>>,
}

impl PublishGuard {
  fn new(cell: Arc<SingleFlightCell>) -> Self {
    Self { cell: Some(cell) }
  }

  fn publish(mut self, outcome: Outcome) {
    if let Some(cell) = self.cell.take() {
      cell.resolve(outcome);
    }
  }
}

impl Drop for PublishGuard {
  fn drop(&mut self) {
    if let Some(cell) = self.cell.take() {
      cell.resolve(Err(CacheError::Canceled));
    }
  }
}

/// Future that completes once the cell is resolved.
#[must_use = "futures do nothing unless you .await or poll them"]
struct Resolution<'a> {
  cell: &'a SingleFlightCell,
}

impl Future for Resolution<'_> {
  type Output = Outcome;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.cell.inner.lock();
    match &inner.state {
      State::Resolved(outcome) => Poll::Ready(outcome.clone()),
      _ => {
        let registered = inner.waiters.iter().any(|waiter| match waiter {
          Waiter::Async(waker) => waker.will_wake(cx.waker()),
          Waiter::Sync(_) => false,
        });
        if !registered {
          inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
        }
        Poll::Pending
      }
    }
  }
}
