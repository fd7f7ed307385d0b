// kubeforge/src/task/mod.rs

//! Tasks bind a prepare, an action and an optional rollback to target hosts.

pub mod execution;
pub mod local;
pub mod remote;

pub use local::LocalTask;
pub use remote::RemoteTask;

use crate::cache::Cache;
use crate::core::TaskResult;
use crate::error::ForgeResult;
use crate::runtime::Runtime;
use async_trait::async_trait;

/// Name given to tasks constructed without one.
pub const DEFAULT_TASK_NAME: &str = "DefaultTask";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
  /// Runs against a list of real hosts.
  Remote,
  /// Runs once against the local pseudo-host.
  Local,
}

/// A task as modules drive it: `init` once, then `execute`.
#[async_trait]
pub trait Task: Send + Sync {
  fn name(&self) -> &str;

  fn desc(&self) -> &str;

  fn kind(&self) -> TaskKind;

  /// Binds the runtime and caches and fills unset settings from the engine config.
  fn init(&mut self, runtime: Runtime, module_cache: Cache, pipeline_cache: Cache) -> ForgeResult<()>;

  /// Runs the task on every target host. Calling this before `init` yields a failed
  /// result carrying [`crate::ForgeError::NotInitialized`].
  async fn execute(&mut self) -> TaskResult;
}
