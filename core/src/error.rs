// kubeforge/src/error.rs
use anyhow::Error as AnyhowError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::util::short_dur;

#[derive(Debug, Error)]
pub enum ForgeError {
  // --- Connection layer ---
  #[error("could not establish connection to {address} (host '{host}'). Source: {source}")]
  Dial {
    host: String,
    address: String,
    #[source]
    source: AnyhowError,
  },

  #[error("authentication as '{user}' rejected by host '{host}'")]
  Auth { host: String, user: String },

  #[error("transport failure on host '{host}'. Source: {source}")]
  Transport {
    host: String,
    #[source]
    source: AnyhowError,
  },

  #[error("command exited with code {exit_code} on host '{host}': {command}\n{stderr}")]
  CommandFailed {
    host: String,
    command: String,
    exit_code: i32,
    stdout: String,
    stderr: String,
  },

  #[error("no connection available for host '{host}'")]
  NoConnection { host: String },

  #[error("validate sha256sum failed for '{path}': local {local} != remote {remote}")]
  ChecksumMismatch {
    path: String,
    local: String,
    remote: String,
  },

  #[error("I/O error on '{}'. Source: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Invalid configuration: {message}")]
  InvalidConfig { message: String },

  // --- Task layer ---
  #[error("[{task}] pre-check failed on host '{host}' after {attempts} attempt(s). Source: {source}")]
  Precheck {
    task: String,
    host: String,
    attempts: usize,
    #[source]
    source: AnyhowError,
  },

  #[error("[{task}] exec failed on host '{host}' after {attempts} attempt(s). Source: {source}")]
  ActionFailed {
    task: String,
    host: String,
    attempts: usize,
    #[source]
    source: AnyhowError,
  },

  #[error("[{task}] execute task timeout on host '{host}', Timeout={}", short_dur(*timeout))]
  Timeout {
    task: String,
    host: String,
    timeout: Duration,
  },

  #[error("Task[{task}] failed on host(s) {}: {message}", hosts.join(", "))]
  TaskFailed {
    task: String,
    hosts: Vec<String>,
    message: String,
  },

  #[error("Module[{module}] exec failed: {source}")]
  ModuleFailed {
    module: String,
    #[source]
    source: Box<ForgeError>,
  },

  #[error("Pipeline[{pipeline}] execute failed: {source}")]
  PipelineFailed {
    pipeline: String,
    #[source]
    source: Box<ForgeError>,
  },

  #[error("Pipeline[{pipeline}] finished but {failed} host(s) failed and were dropped")]
  HostsFailed { pipeline: String, failed: usize },

  #[error("post hook of Module[{module}] failed. Source: {source}")]
  PostHook {
    module: String,
    #[source]
    source: AnyhowError,
  },

  #[error("Type mismatch (expected {expected_type}, what: '{what}')")]
  TypeMismatch { what: String, expected_type: String },

  #[error("'{what}' used before it was initialized")]
  NotInitialized { what: String },

  #[error("Error in collaborator-provided code. Source: {source}")]
  Extension {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal kubeforge error: {0}")]
  Internal(String),
}

impl ForgeError {
  /// True when the work did not finish in time, as opposed to finishing with an error.
  pub fn is_timeout(&self) -> bool {
    matches!(self, ForgeError::Timeout { .. })
  }

  /// True for dial, authentication and transport failures.
  pub fn is_connection_error(&self) -> bool {
    matches!(
      self,
      ForgeError::Dial { .. } | ForgeError::Auth { .. } | ForgeError::Transport { .. } | ForgeError::NoConnection { .. }
    )
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    ForgeError::Io {
      path: path.into(),
      source,
    }
  }

  pub(crate) fn config(message: impl Into<String>) -> Self {
    ForgeError::InvalidConfig {
      message: message.into(),
    }
  }
}

// Errors coming back from collaborators are anyhow errors. If one of them is a
// ForgeError that was propagated with `?`, hand back the original variant.
impl From<AnyhowError> for ForgeError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<ForgeError>() {
      Ok(forge_err) => forge_err,
      Err(other) => ForgeError::Extension { source: other },
    }
  }
}

pub type ForgeResult<T, E = ForgeError> = std::result::Result<T, E>;
