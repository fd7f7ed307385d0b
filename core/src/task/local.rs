// kubeforge/src/task/local.rs

use super::execution::{execute_plan, TaskPlan, TaskSettings};
use super::{Task, TaskKind};
use crate::cache::Cache;
use crate::core::{Action, Prepare, Rollback, TaskResult};
use crate::error::{ForgeError, ForgeResult};
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A task run once on the machine the engine runs on, for work with no remote
/// counterpart: rendering files, aggregating cache facts, asking the operator.
///
/// The runner it hands to actions executes commands through a local shell.
pub struct LocalTask {
  settings: TaskSettings,
  plan: Option<Arc<TaskPlan>>,
}

impl LocalTask {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      settings: TaskSettings::new(name),
      plan: None,
    }
  }

  pub fn desc(mut self, desc: impl Into<String>) -> Self {
    self.settings.desc = desc.into();
    self
  }

  pub fn prepare(mut self, prepare: impl Prepare + 'static) -> Self {
    self.settings.prepare = Some(Arc::new(prepare));
    self
  }

  pub fn action(mut self, action: impl Action + 'static) -> Self {
    self.settings.action = Some(Arc::new(action));
    self
  }

  pub fn rollback(mut self, rollback: impl Rollback + 'static) -> Self {
    self.settings.rollback = Some(Arc::new(rollback));
    self
  }

  pub fn retry(mut self, attempts: usize) -> Self {
    self.settings.retry = Some(attempts);
    self
  }

  pub fn delay(mut self, delay: Duration) -> Self {
    self.settings.delay = Some(delay);
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.settings.timeout = Some(timeout);
    self
  }
}

impl fmt::Debug for LocalTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LocalTask")
      .field("name", &self.settings.name)
      .field("initialized", &self.plan.is_some())
      .finish()
  }
}

#[async_trait]
impl Task for LocalTask {
  fn name(&self) -> &str {
    &self.settings.name
  }

  fn desc(&self) -> &str {
    &self.settings.desc
  }

  fn kind(&self) -> TaskKind {
    TaskKind::Local
  }

  fn init(&mut self, runtime: Runtime, module_cache: Cache, pipeline_cache: Cache) -> ForgeResult<()> {
    let plan = self.settings.plan(
      runtime,
      module_cache,
      pipeline_cache,
      |config| config.local_retries,
      false,
      None,
      true,
    )?;
    self.plan = Some(Arc::new(plan));
    Ok(())
  }

  async fn execute(&mut self) -> TaskResult {
    match &self.plan {
      Some(plan) => execute_plan(plan.clone(), vec![plan.runtime.local_host()]).await,
      None => TaskResult::failed(
        &self.settings.name,
        ForgeError::NotInitialized {
          what: format!("task '{}'", self.settings.name),
        },
      ),
    }
  }
}
