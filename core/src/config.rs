// kubeforge/src/config.rs

//! Engine-wide defaults applied to tasks and connections that leave a setting unset.

use crate::error::{ForgeError, ForgeResult};
use std::time::Duration;

/// Prefix of every environment variable read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "KUBEFORGE_";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
  /// Per-host timeout for one task run when the task sets none.
  pub task_timeout: Duration,
  /// Pause between two attempts of a failing prepare/action.
  pub retry_delay: Duration,
  /// Attempts for remote tasks.
  pub remote_retries: usize,
  /// Attempts for local tasks.
  pub local_retries: usize,
  /// Fraction of a task's hosts that may run at once.
  pub concurrency: f64,
  /// Bound on establishing one SSH session.
  pub connect_timeout: Duration,
  pub ssh_port: u16,
  /// Remote staging directory used by privileged uploads.
  pub tmp_dir: String,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      task_timeout: Duration::from_secs(120 * 60),
      retry_delay: Duration::from_secs(5),
      remote_retries: 3,
      local_retries: 1,
      concurrency: 1.0,
      connect_timeout: Duration::from_secs(60),
      ssh_port: 22,
      tmp_dir: "/tmp/kubeforge".to_string(),
    }
  }
}

impl EngineConfig {
  /// Loads `.env` if present, then reads `KUBEFORGE_*` variables on top of the defaults.
  pub fn from_env() -> ForgeResult<Self> {
    dotenvy::dotenv().ok();
    let config = Self::from_lookup(|key| std::env::var(key).ok())?;
    tracing::debug!(?config, "Engine configuration loaded.");
    Ok(config)
  }

  /// Builds a configuration from an arbitrary key lookup. Keys are the full variable
  /// names, e.g. `KUBEFORGE_TASK_TIMEOUT_SECS`.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ForgeResult<Self> {
    let mut config = Self::default();
    let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(v) = get("TASK_TIMEOUT_SECS") {
      config.task_timeout = Duration::from_secs(parse_positive(&v, "TASK_TIMEOUT_SECS")?);
    }
    if let Some(v) = get("RETRY_DELAY_SECS") {
      config.retry_delay = Duration::from_secs(parse_number(&v, "RETRY_DELAY_SECS")?);
    }
    if let Some(v) = get("REMOTE_RETRIES") {
      config.remote_retries = parse_positive(&v, "REMOTE_RETRIES")? as usize;
    }
    if let Some(v) = get("LOCAL_RETRIES") {
      config.local_retries = parse_positive(&v, "LOCAL_RETRIES")? as usize;
    }
    if let Some(v) = get("CONCURRENCY") {
      let fraction = v
        .trim()
        .parse::<f64>()
        .map_err(|e| ForgeError::config(format!("Invalid {}CONCURRENCY: {}", ENV_PREFIX, e)))?;
      if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(ForgeError::config(format!(
          "{}CONCURRENCY must be in (0, 1], got {}",
          ENV_PREFIX, fraction
        )));
      }
      config.concurrency = fraction;
    }
    if let Some(v) = get("CONNECT_TIMEOUT_SECS") {
      config.connect_timeout = Duration::from_secs(parse_positive(&v, "CONNECT_TIMEOUT_SECS")?);
    }
    if let Some(v) = get("SSH_PORT") {
      config.ssh_port = v
        .trim()
        .parse::<u16>()
        .map_err(|e| ForgeError::config(format!("Invalid {}SSH_PORT: {}", ENV_PREFIX, e)))?;
    }
    if let Some(v) = get("TMP_DIR") {
      if v.trim().is_empty() {
        return Err(ForgeError::config(format!("{}TMP_DIR must not be empty", ENV_PREFIX)));
      }
      config.tmp_dir = v.trim().to_string();
    }
    Ok(config)
  }
}

fn parse_number(value: &str, name: &str) -> ForgeResult<u64> {
  value
    .trim()
    .parse::<u64>()
    .map_err(|e| ForgeError::config(format!("Invalid {}{}: {}", ENV_PREFIX, name, e)))
}

fn parse_positive(value: &str, name: &str) -> ForgeResult<u64> {
  match parse_number(value, name)? {
    0 => Err(ForgeError::config(format!("{}{} must be greater than zero", ENV_PREFIX, name))),
    n => Ok(n),
  }
}
