// kubeforge/src/module/task_module.rs

use super::base::{ModuleBase, PostHook};
use super::{execute_tasks, Module};
use crate::core::ModuleResult;
use crate::error::ForgeResult;
use crate::runtime::Runtime;
use crate::task::Task;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type TaskBuilder = Box<dyn Fn(&Runtime) -> ForgeResult<Vec<Box<dyn Task>>> + Send + Sync>;
type UntilPredicate = Box<dyn Fn(&Runtime) -> ForgeResult<bool> + Send + Sync>;

/// A module made of tasks, either listed up front or built at `init` from the bound
/// runtime (so the list can depend on configuration and on facts gathered earlier).
///
/// ```
/// use kubeforge::{ActionFn, LocalTask, TaskModule};
///
/// let module = TaskModule::new("GreetingModule")
///   .desc("Say hello")
///   .task(LocalTask::new("Hello").action(ActionFn::new(|_rt| async move { Ok(()) })));
/// # drop(module);
/// ```
pub struct TaskModule {
  base: ModuleBase,
  tasks: Vec<Box<dyn Task>>,
  builder: Option<TaskBuilder>,
  until: Option<UntilPredicate>,
  until_interval: Duration,
}

impl TaskModule {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      base: ModuleBase::new(name),
      tasks: Vec::new(),
      builder: None,
      until: None,
      until_interval: Duration::from_secs(5),
    }
  }

  pub fn desc(mut self, desc: impl Into<String>) -> Self {
    self.base.set_desc(desc);
    self
  }

  pub fn skip(mut self, skip: bool) -> Self {
    self.base.set_skip(skip);
    self
  }

  pub fn task(mut self, task: impl Task + 'static) -> Self {
    self.tasks.push(Box::new(task));
    self
  }

  pub fn boxed_task(mut self, task: Box<dyn Task>) -> Self {
    self.tasks.push(task);
    self
  }

  /// Builds the task list at `init`; replaces any listed tasks.
  pub fn tasks_from<F>(mut self, builder: F) -> Self
  where
    F: Fn(&Runtime) -> ForgeResult<Vec<Box<dyn Task>>> + Send + Sync + 'static,
  {
    self.builder = Some(Box::new(builder));
    self
  }

  /// Repeats the task list until `predicate` returns true, pausing `interval` between
  /// rounds.
  pub fn until<F>(mut self, predicate: F, interval: Duration) -> Self
  where
    F: Fn(&Runtime) -> ForgeResult<bool> + Send + Sync + 'static,
  {
    self.until = Some(Box::new(predicate));
    self.until_interval = interval;
    self
  }

  pub fn post_hook(mut self, hook: impl PostHook + 'static) -> Self {
    self.base.append_post_hook(Arc::new(hook));
    self
  }

  pub fn task_names(&self) -> Vec<&str> {
    self.tasks.iter().map(|t| t.name()).collect()
  }
}

impl fmt::Debug for TaskModule {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskModule")
      .field("base", &self.base)
      .field("tasks", &self.task_names())
      .field("dynamic", &self.builder.is_some())
      .finish()
  }
}

#[async_trait]
impl Module for TaskModule {
  fn base(&self) -> &ModuleBase {
    &self.base
  }

  fn base_mut(&mut self) -> &mut ModuleBase {
    &mut self.base
  }

  fn init(&mut self) -> ForgeResult<()> {
    if let Some(builder) = &self.builder {
      self.tasks = builder(self.base.runtime()?)?;
    }
    Ok(())
  }

  async fn run(&mut self, result: &mut ModuleResult) {
    if let Err(e) = execute_tasks(&self.base, &mut self.tasks, result).await {
      result.fail(e);
    }
  }

  async fn until(&mut self) -> ForgeResult<Option<bool>> {
    let Some(predicate) = &self.until else {
      return Ok(None);
    };
    if predicate(self.base.runtime()?)? {
      return Ok(Some(true));
    }
    tokio::time::sleep(self.until_interval).await;
    Ok(Some(false))
  }
}
