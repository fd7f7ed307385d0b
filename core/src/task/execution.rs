// kubeforge/src/task/execution.rs

//! Per-host fan-out shared by remote and local tasks: connect, pre-check and act with
//! retry, bound every host by the task timeout, then roll back the failed hosts.

use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::connector::{Connection, Host, LocalConnection, Runner};
use crate::core::{Action, ActionResult, Prepare, RetryPolicy, Rollback, TaskResult, Verdict};
use crate::error::{ForgeError, ForgeResult};
use crate::runtime::Runtime;
use crate::util::concurrency_limit;
use chrono::Local;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{event, instrument, Level};

/// Everything a task needs at execution time, resolved during `init`.
pub(crate) struct TaskPlan {
  pub name: String,
  pub prepare: Arc<dyn Prepare>,
  pub action: Arc<dyn Action>,
  pub rollback: Option<Arc<dyn Rollback>>,
  pub retry: RetryPolicy,
  pub timeout: Duration,
  pub parallel: bool,
  pub concurrency: f64,
  pub local: bool,
  pub runtime: Runtime,
}

/// Settings common to both task flavours; unset values fall back to the engine config.
#[derive(Default)]
pub(crate) struct TaskSettings {
  pub name: String,
  pub desc: String,
  pub prepare: Option<Arc<dyn Prepare>>,
  pub action: Option<Arc<dyn Action>>,
  pub rollback: Option<Arc<dyn Rollback>>,
  pub retry: Option<usize>,
  pub delay: Option<Duration>,
  pub timeout: Option<Duration>,
}

impl TaskSettings {
  pub fn new(name: impl Into<String>) -> Self {
    let name = name.into();
    Self {
      name: if name.is_empty() {
        super::DEFAULT_TASK_NAME.to_string()
      } else {
        name
      },
      ..Default::default()
    }
  }

  pub fn plan(
    &self,
    mut runtime: Runtime,
    module_cache: Cache,
    pipeline_cache: Cache,
    default_retries: impl FnOnce(&EngineConfig) -> usize,
    parallel: bool,
    concurrency: Option<f64>,
    local: bool,
  ) -> ForgeResult<TaskPlan> {
    let action = self.action.clone().ok_or_else(|| {
      ForgeError::config(format!("task '{}' has no action", self.name))
    })?;
    runtime.bind_caches(module_cache, pipeline_cache);
    let config = runtime.config().clone();

    let retry = self.retry.filter(|n| *n > 0).unwrap_or_else(|| default_retries(&config));
    let delay = self.delay.unwrap_or(config.retry_delay);
    let timeout = self.timeout.filter(|t| !t.is_zero()).unwrap_or(config.task_timeout);
    let concurrency = concurrency
      .filter(|f| *f > 0.0 && *f <= 1.0)
      .unwrap_or(config.concurrency);

    Ok(TaskPlan {
      name: self.name.clone(),
      prepare: self.prepare.clone().unwrap_or_else(|| Arc::new(crate::core::AlwaysRun)),
      action,
      rollback: self.rollback.clone(),
      retry: RetryPolicy::new(retry, delay),
      timeout,
      parallel,
      concurrency,
      local,
      runtime,
    })
  }
}

/// Runs the plan on `hosts` and returns the finalized result. Deprecated hosts are
/// left out entirely; an empty host list fails the task.
#[instrument(
  name = "Task::execute",
  skip_all,
  fields(task = %plan.name, hosts = hosts.len(), parallel = plan.parallel)
)]
pub(crate) async fn execute_plan(plan: Arc<TaskPlan>, hosts: Vec<Arc<Host>>) -> TaskResult {
  if hosts.is_empty() {
    let error = ForgeError::config(format!("the length of task '{}' hosts is 0", plan.name));
    event!(Level::ERROR, error = %error, "Task has no hosts.");
    return TaskResult::failed(&plan.name, error);
  }

  let mut task_result = TaskResult::new(&plan.name);
  let targets: Vec<(usize, Arc<Host>)> = hosts
    .into_iter()
    .enumerate()
    .filter(|(_, host)| !plan.runtime.host_is_deprecated(host.name()))
    .collect();

  let limit = concurrency_limit(plan.concurrency, targets.len());
  let worker_plan = plan.clone();
  let results: Vec<ActionResult> = schedule(plan.parallel, limit, targets.clone(), move |(index, host)| {
    execute_host(worker_plan.clone(), index, host)
  })
  .await
  .into_iter()
  .zip(targets.iter())
  .map(|(slot, (_, host))| slot.unwrap_or_else(|| lost_worker(host)))
  .collect();

  if plan.rollback.is_some() {
    let failed: Vec<(usize, Arc<Host>, ActionResult)> = targets
      .into_iter()
      .zip(results.iter())
      .filter(|(_, result)| result.is_failed())
      .map(|((index, host), result)| (index, host, result.clone()))
      .collect();
    if !failed.is_empty() {
      let rollback_plan = plan.clone();
      schedule(plan.parallel, limit, failed, move |(index, host, result)| {
        rollback_host(rollback_plan.clone(), index, host, result)
      })
      .await;
    }
  }

  for result in results {
    task_result.append(result);
  }
  task_result.finalize();
  event!(Level::DEBUG, status = %task_result.status, "Task finished.");
  task_result
}

fn lost_worker(host: &Host) -> ActionResult {
  let mut result = ActionResult::new(host.name());
  result.fail(ForgeError::Internal(format!(
    "worker for host '{}' terminated abnormally",
    host.name()
  )));
  result
}

/// Runs `jobs` one after another, or concurrently with at most `limit` in flight.
/// Outputs keep the order of `jobs`; a worker that panicked leaves `None` in its slot.
async fn schedule<J, T, F, Fut>(parallel: bool, limit: usize, jobs: Vec<J>, f: F) -> Vec<Option<T>>
where
  J: Send + 'static,
  T: Send + 'static,
  F: Fn(J) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = T> + Send + 'static,
{
  if !parallel || jobs.len() <= 1 {
    let mut out = Vec::with_capacity(jobs.len());
    for job in jobs {
      out.push(Some(f(job).await));
    }
    return out;
  }

  let total = jobs.len();
  let semaphore = Arc::new(Semaphore::new(limit.max(1)));
  let f = Arc::new(f);
  let mut workers = JoinSet::new();
  for (position, job) in jobs.into_iter().enumerate() {
    let semaphore = semaphore.clone();
    let f = f.clone();
    workers.spawn(async move {
      let _permit = semaphore.acquire_owned().await;
      (position, f(job).await)
    });
  }

  let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
  while let Some(joined) = workers.join_next().await {
    match joined {
      Ok((position, value)) => slots[position] = Some(value),
      Err(e) => event!(Level::ERROR, error = %e, "Task worker terminated abnormally."),
    }
  }
  slots
}

/// One host's run raced against the task timeout. On expiry the host's cancellation
/// token fires and its worker is aborted; the result is a timeout failure.
async fn execute_host(plan: Arc<TaskPlan>, index: usize, host: Arc<Host>) -> ActionResult {
  let started = Local::now();
  let token = plan.runtime.cancellation().child_token();
  let mut worker = tokio::spawn(run_host(plan.clone(), index, host.clone(), token.clone()));

  match tokio::time::timeout(plan.timeout, &mut worker).await {
    Ok(Ok(result)) => result,
    Ok(Err(join_err)) => {
      let mut result = ActionResult::new(host.name());
      result.start_time = started;
      event!(Level::ERROR, host = %host.name(), error = %join_err, "failed: [{}]", host.name());
      result.fail(ForgeError::Internal(format!(
        "worker for host '{}' terminated: {}",
        host.name(),
        join_err
      )));
      result
    }
    Err(_) => {
      token.cancel();
      worker.abort();
      let mut result = ActionResult::new(host.name());
      result.start_time = started;
      let error = ForgeError::Timeout {
        task: plan.name.clone(),
        host: host.name().to_string(),
        timeout: plan.timeout,
      };
      event!(Level::ERROR, host = %host.name(), error = %error, "failed: [{}]", host.name());
      result.fail(error);
      result
    }
  }
}

async fn run_host(plan: Arc<TaskPlan>, index: usize, host: Arc<Host>, token: CancellationToken) -> ActionResult {
  let mut result = ActionResult::new(host.name());

  let runtime = match bind_runtime(&plan, index, &host, token).await {
    Ok(rt) => rt,
    Err(e) => {
      event!(Level::ERROR, host = %host.name(), error = %e, "failed: [{}]", host.name());
      result.fail(e);
      return result;
    }
  };
  let rt = &runtime;

  let prepare = &plan.prepare;
  match plan.retry.run(host.name(), move || prepare.pre_check(rt)).await {
    Ok(Verdict::Run) => {}
    Ok(Verdict::Skip) => {
      event!(Level::INFO, host = %host.name(), "skipped: [{}]", host.name());
      result.skip();
      return result;
    }
    Err(exhausted) => {
      let error = ForgeError::Precheck {
        task: plan.name.clone(),
        host: host.name().to_string(),
        attempts: exhausted.attempts,
        source: exhausted.error,
      };
      event!(Level::ERROR, host = %host.name(), error = %error, "failed: [{}]", host.name());
      result.fail(error);
      return result;
    }
  }

  let action = &plan.action;
  match plan.retry.run(host.name(), move || action.execute(rt)).await {
    Ok(()) => {
      event!(Level::INFO, host = %host.name(), "success: [{}]", host.name());
      result.succeed();
    }
    Err(exhausted) => {
      let error = ForgeError::ActionFailed {
        task: plan.name.clone(),
        host: host.name().to_string(),
        attempts: exhausted.attempts,
        source: exhausted.error,
      };
      event!(Level::ERROR, host = %host.name(), error = %error, "failed: [{}]", host.name());
      result.fail(error);
    }
  }
  result
}

/// A runtime copy bound to `host`: its runner, its own cancellation token.
/// Remote hosts connect through the pool; connect failures are not retried.
async fn bind_runtime(
  plan: &TaskPlan,
  index: usize,
  host: &Arc<Host>,
  token: CancellationToken,
) -> ForgeResult<Runtime> {
  let mut runtime = plan.runtime.copy();
  runtime.set_cancellation(token);

  let conn: Arc<dyn Connection> = if plan.local {
    Arc::new(LocalConnection::new())
  } else {
    plan.runtime.dialer().connect(host).await?
  };
  let runner = Runner::new(Some(conn), host.clone(), index)
    .with_verbose(runtime.verbose())
    .with_tmp_dir(runtime.config().tmp_dir.clone());
  runtime.set_runner(runner);
  Ok(runtime)
}

async fn rollback_host(plan: Arc<TaskPlan>, index: usize, host: Arc<Host>, failed: ActionResult) {
  let Some(rollback) = plan.rollback.clone() else {
    return;
  };
  let token = plan.runtime.cancellation().child_token();
  let worker_plan = plan.clone();
  let worker_host = host.clone();
  let worker_token = token.clone();
  let mut worker = tokio::spawn(async move {
    let runtime = bind_runtime(&worker_plan, index, &worker_host, worker_token).await?;
    event!(Level::INFO, host = %worker_host.name(), "rollback: [{}]", worker_host.name());
    rollback.execute(&runtime, &failed).await.map_err(ForgeError::from)
  });

  let outcome = match tokio::time::timeout(plan.timeout, &mut worker).await {
    Ok(Ok(outcome)) => outcome,
    Ok(Err(join_err)) => Err(ForgeError::Internal(join_err.to_string())),
    Err(_) => {
      token.cancel();
      worker.abort();
      Err(ForgeError::Timeout {
        task: plan.name.clone(),
        host: host.name().to_string(),
        timeout: plan.timeout,
      })
    }
  };
  if let Err(e) = outcome {
    event!(Level::ERROR, host = %host.name(), error = %e, "rollback-failed: [{}]", host.name());
  }
}
