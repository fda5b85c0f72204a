#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::Duration;

use zsock::Context;

/// Long enough for cross-thread delivery, short enough to fail fast.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
  static INIT: Once = Once::new();
  INIT.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

pub fn test_context() -> Context {
  init_tracing();
  Context::new().expect("failed to create context")
}

/// A fresh `inproc://` endpoint per call, so tests never collide on names.
pub fn unique_endpoint(tag: &str) -> String {
  static COUNTER: AtomicUsize = AtomicUsize::new(0);
  format!("inproc://{}-{}", tag, COUNTER.fetch_add(1, Ordering::Relaxed))
}
