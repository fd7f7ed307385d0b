// kubeforge/src/core/retry.rs

use std::future::Future;
use std::time::Duration;
use tracing::{event, Level};

/// Attempt count and pause shared by prepare evaluation and action execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub attempts: usize,
  pub delay: Duration,
}

/// The last error of an exhausted [`RetryPolicy`] and how many attempts were made.
#[derive(Debug)]
pub struct Exhausted {
  pub attempts: usize,
  pub error: anyhow::Error,
}

impl RetryPolicy {
  /// At least one attempt is always made.
  pub fn new(attempts: usize, delay: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      delay,
    }
  }

  /// Runs `op` until it succeeds or the attempts are used up, sleeping `delay` between
  /// attempts. Intermediate failures are logged against `host`; only the final error
  /// is returned.
  pub async fn run<T, F, Fut>(&self, host: &str, mut op: F) -> Result<T, Exhausted>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
  {
    let attempts = self.attempts.max(1);
    let mut attempt = 1;
    loop {
      match op().await {
        Ok(value) => return Ok(value),
        Err(error) if attempt >= attempts => return Err(Exhausted { attempts: attempt, error }),
        Err(error) => {
          event!(
            Level::WARN,
            host = %host,
            attempt,
            max_attempts = attempts,
            error = %format!("{:#}", error),
            "retry: [{}]",
            host
          );
          tokio::time::sleep(self.delay).await;
          attempt += 1;
        }
      }
    }
  }
}
