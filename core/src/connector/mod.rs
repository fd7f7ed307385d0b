// kubeforge/src/connector/mod.rs

//! The remote-execution layer: per-host sessions, the pool that owns them and the
//! [`Runner`] tasks use to run commands and move files.

pub mod dialer;
pub mod host;
pub mod local;
pub mod runner;
pub mod ssh;

pub use dialer::Dialer;
pub use host::{role, Host, LOCAL_HOST};
pub use local::LocalConnection;
pub use runner::Runner;
pub use ssh::{SshConfig, SshConnection, SshConnector};

use crate::error::{ForgeError, ForgeResult};
use crate::util::{shell_quote, sudo_prefix};
use async_trait::async_trait;
use std::sync::Arc;

/// Output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
  /// Standard output with surrounding whitespace trimmed.
  pub stdout: String,
  pub stderr: String,
  /// Exit status; `-1` when the remote side reported none.
  pub code: i32,
}

impl ExecOutput {
  pub fn success(&self) -> bool {
    self.code == 0
  }
}

/// A live session with one host.
///
/// `exec` reports a non-zero exit through [`ExecOutput::code`]; only transport problems
/// are errors. The provided helpers build on `exec` and may be overridden by
/// implementations that can answer them natively.
#[async_trait]
pub trait Connection: Send + Sync {
  async fn exec(&self, cmd: &str) -> ForgeResult<ExecOutput>;

  /// Writes `data` to `remote`, truncating it, and applies `mode`.
  async fn upload(&self, data: &[u8], remote: &str, mode: u32) -> ForgeResult<()>;

  async fn download(&self, remote: &str) -> ForgeResult<Vec<u8>>;

  /// Terminates the session. Further calls fail with a transport error.
  async fn close(&self) -> ForgeResult<()>;

  /// Hex SHA-256 of a remote regular file, `None` if it does not exist.
  async fn file_sha256(&self, remote: &str) -> ForgeResult<Option<String>> {
    let path = shell_quote(remote);
    let out = self
      .exec(&format!("if [ -f {p} ]; then sha256sum {p} | cut -d' ' -f1; fi", p = path))
      .await?;
    if !out.success() || out.stdout.is_empty() {
      return Ok(None);
    }
    Ok(Some(out.stdout))
  }

  async fn mkdir_all(&self, remote: &str) -> ForgeResult<()> {
    let out = self
      .exec(&sudo_prefix(&format!("mkdir -p {} || true", shell_quote(remote))))
      .await?;
    if !out.success() {
      return Err(ForgeError::CommandFailed {
        host: String::new(),
        command: format!("mkdir -p {}", remote),
        exit_code: out.code,
        stdout: out.stdout,
        stderr: out.stderr,
      });
    }
    Ok(())
  }
}

/// Dials new sessions. The [`Dialer`] pools what this returns.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn connect(&self, host: &Host) -> ForgeResult<Arc<dyn Connection>>;
}
