use fibre_tagcache::{EntryOptions, MemoryCache};
use std::thread;
use std::time::Duration;

fn main() {
  let cache: MemoryCache<String> = MemoryCache::builder()
    .expiration_scan_frequency(Duration::from_secs(1))
    .build()
    .expect("Failed to build cache");

  println!("Adding 'user:1' tagged 'users' with a 2-second lifetime.");
  cache
    .add_with(
      "user:1".to_string(),
      EntryOptions::new().tag("users").lifetime(Duration::from_secs(2)),
      "Ada".to_string(),
    )
    .expect("lifetime is positive");

  println!("Adding 'user:2' tagged 'users' and 'admins' with a sliding 1-second window.");
  cache
    .add_with(
      "user:2".to_string(),
      EntryOptions::new()
        .tag("users")
        .tag("admins")
        .sliding(Duration::from_secs(1)),
      "Grace".to_string(),
    )
    .expect("window is positive");

  // Values can be of any type; the reader names the type it expects.
  cache.add("hits".to_string(), 0u64);

  match cache.try_get::<String, _>("user:1") {
    Ok(Some(name)) => println!("Found user:1 = {}", name),
    Ok(None) => println!("user:1 not found."),
    Err(err) => println!("Lookup failed: {}", err),
  }

  // Asking for the wrong type is an error, and leaves the entry alone.
  if let Err(err) = cache.try_get::<i32, _>("user:1") {
    println!("Reading user:1 as i32: {}", err);
  }

  println!("\nClearing tag 'admins'.");
  cache.clear_tag("admins");
  println!(
    "user:2 after clear: {:?}",
    cache.try_get::<String, _>("user:2").unwrap()
  );

  println!("\nWaiting 3 seconds for user:1 to expire...");
  thread::sleep(Duration::from_secs(3));
  println!(
    "user:1 after lifetime: {:?}",
    cache.try_get::<String, _>("user:1").unwrap()
  );

  println!("\nCache metrics: {:#?}", cache.metrics());
}
