use fibre_tagcache::{CacheError, EntryOptions, MemoryCache};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tokio::time::{sleep, Duration};

// A simulated database or slow external service.
async fn fetch_from_database(key: u32, load_count: Arc<AtomicUsize>) -> String {
  println!(
    "--- Database: Received request for key {}. Simulating slow query...",
    key
  );
  load_count.fetch_add(1, Ordering::SeqCst);
  sleep(Duration::from_millis(500)).await;
  let value = format!("value_for_{}", key);
  println!("--- Database: Responding with '{}' for key {}.", value, key);
  value
}

#[tokio::main]
async fn main() {
  let load_counter = Arc::new(AtomicUsize::new(0));
  let cache: MemoryCache<u32, &'static str> = MemoryCache::new();

  println!("--- Thundering Herd Demonstration ---");
  println!("Spawning 10 tasks to request the same key '42' at once.\n");

  let mut tasks = Vec::new();
  for i in 0..10 {
    let cache = cache.clone();
    let counter = load_counter.clone();
    tasks.push(tokio::spawn(async move {
      println!("[Task {}] Requesting key 42...", i);
      let value: String = cache
        .get_or_add_async_with(
          42,
          EntryOptions::new().tag("db").lifetime(Duration::from_secs(30)),
          move || fetch_from_database(42, counter),
        )
        .await
        .expect("loading never fails here");
      println!("[Task {}] Received value: {}", i, value);
      assert_eq!(value, "value_for_42");
    }));
  }

  for task in tasks {
    task.await.unwrap();
  }

  println!(
    "\nDatabase was queried {} time(s).",
    load_counter.load(Ordering::SeqCst)
  );

  println!("\n--- Failures are shared, never cached ---");
  let failed = cache
    .try_get_or_add_async_with(7, EntryOptions::new(), || async {
      sleep(Duration::from_millis(100)).await;
      Err::<String, _>("connection reset")
    })
    .await;
  match failed {
    Err(CacheError::Producer(err)) => println!("Load of key 7 failed: {}", err),
    other => println!("Unexpected outcome: {:?}", other),
  }
  let retried: String = cache
    .get_or_add_async(7, || async { "recovered".to_string() })
    .await
    .unwrap();
  println!("Retry of key 7 produced: {}", retried);

  println!("\nCache metrics: {:#?}", cache.metrics());
}
