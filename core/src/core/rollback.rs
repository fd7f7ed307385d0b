// kubeforge/src/core/rollback.rs

use crate::core::result::ActionResult;
use crate::runtime::Runtime;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Undo step invoked for each host a task failed on. Receives the failed result so it
/// can decide how much to undo. Errors are logged and never replace the task failure.
#[async_trait]
pub trait Rollback: Send + Sync {
  async fn execute(&self, runtime: &Runtime, result: &ActionResult) -> anyhow::Result<()>;
}

type RollbackHandler = Box<dyn Fn(Runtime, ActionResult) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A rollback backed by an async closure receiving copies of the runtime and the
/// failed result.
pub struct RollbackFn {
  handler: RollbackHandler,
}

impl RollbackFn {
  pub fn new<F, Fut>(f: F) -> Self
  where
    F: Fn(Runtime, ActionResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    Self {
      handler: Box::new(move |rt, result| Box::pin(f(rt, result))),
    }
  }
}

impl fmt::Debug for RollbackFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("RollbackFn")
  }
}

#[async_trait]
impl Rollback for RollbackFn {
  async fn execute(&self, runtime: &Runtime, result: &ActionResult) -> anyhow::Result<()> {
    (self.handler)(runtime.clone(), result.clone()).await
  }
}
