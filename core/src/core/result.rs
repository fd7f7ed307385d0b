// kubeforge/src/core/result.rs

//! Outcome records: one per host attempt, aggregated per task and per module.

use crate::error::ForgeError;
use chrono::{DateTime, Local};
use std::fmt;
use std::sync::Arc;

/// Outcome of a host, task or module run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultStatus {
  /// Not run yet.
  #[default]
  Null,
  Success,
  Failed,
  Skipped,
}

impl fmt::Display for ResultStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ResultStatus::Null => "NULL",
      ResultStatus::Success => "SUCCESS",
      ResultStatus::Failed => "FAILED",
      ResultStatus::Skipped => "SKIPPED",
    };
    f.write_str(s)
  }
}

/// One host, one task run.
#[derive(Debug, Clone)]
pub struct ActionResult {
  pub host: String,
  pub status: ResultStatus,
  pub error: Option<Arc<ForgeError>>,
  pub start_time: DateTime<Local>,
  pub end_time: DateTime<Local>,
}

impl ActionResult {
  pub fn new(host: impl Into<String>) -> Self {
    let now = Local::now();
    Self {
      host: host.into(),
      status: ResultStatus::Null,
      error: None,
      start_time: now,
      end_time: now,
    }
  }

  pub fn succeed(&mut self) {
    self.status = ResultStatus::Success;
    self.end_time = Local::now();
  }

  pub fn skip(&mut self) {
    self.status = ResultStatus::Skipped;
    self.end_time = Local::now();
  }

  pub fn fail(&mut self, error: ForgeError) {
    self.status = ResultStatus::Failed;
    self.error = Some(Arc::new(error));
    self.end_time = Local::now();
  }

  pub fn is_failed(&self) -> bool {
    self.status == ResultStatus::Failed
  }

  /// True if this host failed because its run did not finish in time.
  pub fn is_timeout(&self) -> bool {
    self.error.as_ref().map_or(false, |e| e.is_timeout())
  }
}

/// Every host's result for one task.
#[derive(Debug)]
pub struct TaskResult {
  pub task: String,
  pub status: ResultStatus,
  pub action_results: Vec<ActionResult>,
  /// Combined error of all failed hosts, set once the task is finalized.
  pub error: Option<ForgeError>,
  pub start_time: DateTime<Local>,
  pub end_time: DateTime<Local>,
}

impl TaskResult {
  pub fn new(task: impl Into<String>) -> Self {
    let now = Local::now();
    Self {
      task: task.into(),
      status: ResultStatus::Null,
      action_results: Vec::new(),
      error: None,
      start_time: now,
      end_time: now,
    }
  }

  /// A result that failed before any host ran.
  pub fn failed(task: impl Into<String>, error: ForgeError) -> Self {
    let mut result = Self::new(task);
    result.status = ResultStatus::Failed;
    result.error = Some(error);
    result
  }

  pub fn append(&mut self, result: ActionResult) {
    self.action_results.push(result);
  }

  /// Fixes the aggregate status. Any failed host fails the task; otherwise the task is
  /// skipped if every host skipped, and succeeds if at least one host succeeded.
  pub fn finalize(&mut self) {
    self.end_time = Local::now();
    let failed: Vec<&ActionResult> = self.action_results.iter().filter(|r| r.is_failed()).collect();

    if !failed.is_empty() {
      let hosts = failed.iter().map(|r| r.host.clone()).collect();
      let message = failed
        .iter()
        .map(|r| match &r.error {
          Some(e) => format!("[{}] {}", r.host, e),
          None => format!("[{}] failed", r.host),
        })
        .collect::<Vec<_>>()
        .join("; ");
      self.status = ResultStatus::Failed;
      self.error = Some(ForgeError::TaskFailed {
        task: self.task.clone(),
        hosts,
        message,
      });
      return;
    }

    if !self.action_results.is_empty() && self.action_results.iter().all(|r| r.status == ResultStatus::Skipped) {
      self.status = ResultStatus::Skipped;
    } else {
      self.status = ResultStatus::Success;
    }
  }

  pub fn is_failed(&self) -> bool {
    self.status == ResultStatus::Failed
  }

  pub fn failed_hosts(&self) -> Vec<&str> {
    self
      .action_results
      .iter()
      .filter(|r| r.is_failed())
      .map(|r| r.host.as_str())
      .collect()
  }

  /// Result of `host`, if it was targeted.
  pub fn host_result(&self, host: &str) -> Option<&ActionResult> {
    self.action_results.iter().find(|r| r.host == host)
  }

  /// Moves the combined error out, leaving the status untouched.
  pub fn take_error(&mut self) -> Option<ForgeError> {
    self.error.take()
  }
}

/// The result of one module run.
#[derive(Debug)]
pub struct ModuleResult {
  pub module: String,
  pub status: ResultStatus,
  pub task_results: Vec<TaskResult>,
  pub error: Option<ForgeError>,
  pub start_time: DateTime<Local>,
  pub end_time: DateTime<Local>,
}

impl ModuleResult {
  pub fn new(module: impl Into<String>) -> Self {
    let now = Local::now();
    Self {
      module: module.into(),
      status: ResultStatus::Null,
      task_results: Vec::new(),
      error: None,
      start_time: now,
      end_time: now,
    }
  }

  pub fn append_task(&mut self, result: TaskResult) {
    self.task_results.push(result);
  }

  pub fn succeed(&mut self) {
    self.status = ResultStatus::Success;
    self.end_time = Local::now();
  }

  pub fn skip(&mut self) {
    self.status = ResultStatus::Skipped;
    self.end_time = Local::now();
  }

  pub fn fail(&mut self, error: ForgeError) {
    self.status = ResultStatus::Failed;
    self.error = Some(error);
    self.end_time = Local::now();
  }

  pub fn is_failed(&self) -> bool {
    self.status == ResultStatus::Failed
  }
}
