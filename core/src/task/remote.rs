// kubeforge/src/task/remote.rs

use super::execution::{execute_plan, TaskPlan, TaskSettings};
use super::{Task, TaskKind};
use crate::cache::Cache;
use crate::connector::Host;
use crate::core::{Action, Prepare, Rollback, TaskResult};
use crate::error::{ForgeError, ForgeResult};
use crate::runtime::Runtime;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

enum HostSelection {
  Explicit(Vec<Arc<Host>>),
  Role(String),
  All,
}

/// A task run on a set of remote hosts.
///
/// Hosts run one after another unless [`RemoteTask::parallel`] is set, in which case
/// at most `round(concurrency * hosts)` (at least one) run at once.
pub struct RemoteTask {
  settings: TaskSettings,
  selection: HostSelection,
  parallel: bool,
  concurrency: Option<f64>,
  hosts: Vec<Arc<Host>>,
  plan: Option<Arc<TaskPlan>>,
}

impl RemoteTask {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      settings: TaskSettings::new(name),
      selection: HostSelection::Explicit(Vec::new()),
      parallel: false,
      concurrency: None,
      hosts: Vec::new(),
      plan: None,
    }
  }

  pub fn desc(mut self, desc: impl Into<String>) -> Self {
    self.settings.desc = desc.into();
    self
  }

  /// Targets the named hosts; `init` swaps each for the runtime's own entry.
  pub fn hosts(mut self, hosts: impl IntoIterator<Item = Arc<Host>>) -> Self {
    self.selection = HostSelection::Explicit(hosts.into_iter().collect());
    self
  }

  /// Targets the live hosts of `role`, resolved at `init`.
  pub fn role(mut self, role: impl Into<String>) -> Self {
    self.selection = HostSelection::Role(role.into());
    self
  }

  /// Targets every live host, resolved at `init`.
  pub fn all_hosts(mut self) -> Self {
    self.selection = HostSelection::All;
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

  pub fn parallel(mut self, parallel: bool) -> Self {
    self.parallel = parallel;
    self
  }

  /// Attempts per host for both pre-check and action.
  pub fn retry(mut self, attempts: usize) -> Self {
    self.settings.retry = Some(attempts);
    self
  }

  pub fn delay(mut self, delay: Duration) -> Self {
    self.settings.delay = Some(delay);
    self
  }

  /// Bound on one host's run, retries included.
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.settings.timeout = Some(timeout);
    self
  }

  /// Fraction in `(0, 1]` of the hosts that may run at once; other values fall back
  /// to the engine default.
  pub fn concurrency(mut self, fraction: f64) -> Self {
    self.concurrency = Some(fraction);
    self
  }

  /// Hosts resolved by `init`.
  pub fn target_hosts(&self) -> &[Arc<Host>] {
    &self.hosts
  }
}

impl fmt::Debug for RemoteTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RemoteTask")
      .field("name", &self.settings.name)
      .field("hosts", &self.hosts.iter().map(|h| h.name()).collect::<Vec<_>>())
      .field("parallel", &self.parallel)
      .field("initialized", &self.plan.is_some())
      .finish()
  }
}

#[async_trait]
impl Task for RemoteTask {
  fn name(&self) -> &str {
    &self.settings.name
  }

  fn desc(&self) -> &str {
    &self.settings.desc
  }

  fn kind(&self) -> TaskKind {
    TaskKind::Remote
  }

  fn init(&mut self, runtime: Runtime, module_cache: Cache, pipeline_cache: Cache) -> ForgeResult<()> {
    self.hosts = match &self.selection {
      HostSelection::Explicit(hosts) => resolve_hosts(&runtime, &self.settings.name, hosts)?,
      HostSelection::Role(role) => runtime.hosts_by_role(role),
      HostSelection::All => runtime.all_hosts(),
    };
    let plan = self.settings.plan(
      runtime,
      module_cache,
      pipeline_cache,
      |config| config.remote_retries,
      self.parallel,
      self.concurrency,
      false,
    )?;
    self.plan = Some(Arc::new(plan));
    Ok(())
  }

  async fn execute(&mut self) -> TaskResult {
    match &self.plan {
      Some(plan) => execute_plan(plan.clone(), self.hosts.clone()).await,
      None => TaskResult::failed(
        &self.settings.name,
        ForgeError::NotInitialized {
          what: format!("task '{}'", self.settings.name),
        },
      ),
    }
  }
}

/// Maps caller-supplied hosts onto the runtime's indexed entries by name.
fn resolve_hosts(runtime: &Runtime, task: &str, hosts: &[Arc<Host>]) -> ForgeResult<Vec<Arc<Host>>> {
  hosts
    .iter()
    .map(|host| {
      runtime.host(host.name()).ok_or_else(|| {
        ForgeError::config(format!(
          "task '{}' targets host '{}' which is not part of runtime '{}'",
          task,
          host.name(),
          runtime.name()
        ))
      })
    })
    .collect()
}
