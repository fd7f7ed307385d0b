// kubeforge/src/module/mod.rs

//! Modules: ordered task lists forming one installation phase.
//!
//! A module is driven through a fixed lifecycle by [`run_module`]:
//!
//! 1. `bind`: the runtime and the pipeline/module caches are attached.
//! 2. `auto_assert`: typed configuration is pulled from the runtime.
//! 3. `init`: the task list is built.
//! 4. `run`, repeated while `until` asks for another round.
//! 5. post hooks, with the final result.

pub mod base;
pub mod task_module;

pub use base::{ModuleBase, ModuleOutcome, PostHook, PostHookFn};
pub use task_module::TaskModule;

use crate::cache::Cache;
use crate::core::{ModuleResult, TaskResult};
use crate::error::{ForgeError, ForgeResult};
use crate::runtime::Runtime;
use crate::task::{Task, TaskKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[async_trait]
pub trait Module: Send + Sync {
  fn base(&self) -> &ModuleBase;

  fn base_mut(&mut self) -> &mut ModuleBase;

  fn name(&self) -> &str {
    self.base().name()
  }

  fn desc(&self) -> &str {
    self.base().desc()
  }

  fn is_skip(&self) -> bool {
    self.base().is_skip()
  }

  fn bind(&mut self, runtime: &Runtime, pipeline_cache: Cache, module_cache: Cache) {
    self.base_mut().bind(runtime, pipeline_cache, module_cache);
  }

  fn auto_assert(&mut self) -> ForgeResult<()> {
    Ok(())
  }

  fn init(&mut self) -> ForgeResult<()> {
    Ok(())
  }

  /// One round of work. Failures are recorded in `result`.
  async fn run(&mut self, result: &mut ModuleResult);

  /// `Some(false)` asks for another round; `None` and `Some(true)` stop.
  async fn until(&mut self) -> ForgeResult<Option<bool>> {
    Ok(None)
  }

  fn append_post_hook(&mut self, hook: Arc<dyn PostHook>) {
    self.base_mut().append_post_hook(hook);
  }

  async fn call_post_hooks(&self, result: &ModuleResult) -> ForgeResult<()> {
    let base = self.base();
    let runtime = base.runtime()?;
    for hook in base.post_hooks() {
      hook.call(runtime, result).await.map_err(|source| ForgeError::PostHook {
        module: base.name().to_string(),
        source,
      })?;
    }
    Ok(())
  }

  fn slogan(&self) {
    if self.desc().is_empty() {
      return;
    }
    event!(Level::INFO, module = %self.name(), "[{}] {}", self.name(), self.desc());
  }
}

/// Drives one module through its lifecycle against a fresh module cache, which is
/// cleaned once the module is done. Skipped modules report `Skipped` untouched.
#[instrument(name = "Module::run", skip_all, fields(module = %module.name()))]
pub async fn run_module(module: &mut dyn Module, runtime: &Runtime, pipeline_cache: &Cache) -> ModuleResult {
  let mut result = ModuleResult::new(module.name());
  if module.is_skip() {
    event!(Level::DEBUG, "Module skipped.");
    result.skip();
    return result;
  }

  let module_cache = Cache::new();
  module.bind(runtime, pipeline_cache.clone(), module_cache.clone());

  if let Err(e) = module.auto_assert().and_then(|_| module.init()) {
    event!(Level::ERROR, error = %e, "Module setup failed.");
    result.fail(e);
    module_cache.clean();
    return result;
  }

  module.slogan();
  loop {
    module.run(&mut result).await;
    if result.is_failed() {
      break;
    }
    match module.until().await {
      Ok(Some(false)) => continue,
      Ok(_) => break,
      Err(e) => {
        result.fail(e);
        break;
      }
    }
  }

  if !result.is_failed() {
    result.succeed();
  }
  if let Err(e) = module.call_post_hooks(&result).await {
    event!(Level::ERROR, error = %e, "Post hook failed.");
    if !result.is_failed() {
      result.fail(e);
    }
  }
  module_cache.clean();
  result
}

/// Initializes and executes `tasks` in order, stopping at the first failed task.
///
/// With [`Runtime::ignore_error`], the failed hosts of a remote task are dropped from
/// the runtime and the module carries on with the remaining hosts.
pub async fn execute_tasks(
  base: &ModuleBase,
  tasks: &mut [Box<dyn Task>],
  result: &mut ModuleResult,
) -> ForgeResult<()> {
  let runtime = base.runtime()?;
  for task in tasks.iter_mut() {
    task.init(runtime.clone(), base.module_cache().clone(), base.pipeline_cache().clone())?;
    if !task.desc().is_empty() {
      event!(Level::INFO, task = %task.name(), "{}", task.desc());
    }

    let mut task_result: TaskResult = task.execute().await;
    if !task_result.is_failed() {
      result.append_task(task_result);
      continue;
    }

    if task.kind() == TaskKind::Remote && runtime.ignore_error() {
      for failed in task_result.failed_hosts() {
        if let Some(host) = runtime.all_hosts().into_iter().find(|h| h.name() == failed) {
          runtime.delete_host(&host);
        }
      }
      event!(
        Level::WARN,
        task = %task.name(),
        hosts = ?task_result.failed_hosts(),
        "Ignoring failed hosts."
      );
      result.append_task(task_result);
      continue;
    }

    let error = task_result.take_error().unwrap_or_else(|| {
      ForgeError::Internal(format!("task '{}' failed without an error", task.name()))
    });
    result.append_task(task_result);
    return Err(error);
  }
  Ok(())
}
