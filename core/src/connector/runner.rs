// kubeforge/src/connector/runner.rs

//! Per-host command and file-transfer primitives handed to actions.

use super::{Connection, ExecOutput, Host};
use crate::error::{ForgeError, ForgeResult};
use crate::util::{remote_join, remote_parent, shell_quote, sudo_prefix};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{event, Level};

/// What an idempotent transfer ended up doing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
  /// Files whose content was written to the destination.
  pub transferred: usize,
  /// Files left alone because the destination already had identical content.
  pub skipped: usize,
}

impl TransferReport {
  fn merge(&mut self, other: TransferReport) {
    self.transferred += other.transferred;
    self.skipped += other.skipped;
  }
}

/// The current host's connection plus the helpers actions use.
///
/// A runner without a connection belongs to a task that never connected; every
/// operation then fails with [`ForgeError::NoConnection`].
#[derive(Clone)]
pub struct Runner {
  conn: Option<Arc<dyn Connection>>,
  host: Arc<Host>,
  index: usize,
  verbose: bool,
  tmp_dir: String,
}

impl fmt::Debug for Runner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Runner")
      .field("host", &self.host.name())
      .field("index", &self.index)
      .field("connected", &self.conn.is_some())
      .finish()
  }
}

impl Runner {
  pub fn new(conn: Option<Arc<dyn Connection>>, host: Arc<Host>, index: usize) -> Self {
    Self {
      conn,
      host,
      index,
      verbose: false,
      tmp_dir: "/tmp/kubeforge".to_string(),
    }
  }

  /// Logs stdout of every command at info level.
  pub fn with_verbose(mut self, verbose: bool) -> Self {
    self.verbose = verbose;
    self
  }

  /// Remote directory `sudo_scp` stages files in.
  pub fn with_tmp_dir(mut self, tmp_dir: impl Into<String>) -> Self {
    self.tmp_dir = tmp_dir.into();
    self
  }

  pub fn host(&self) -> &Arc<Host> {
    &self.host
  }

  /// Position of the host in the task's host list.
  pub fn index(&self) -> usize {
    self.index
  }

  pub(crate) fn connection(&self) -> ForgeResult<&Arc<dyn Connection>> {
    self.conn.as_ref().ok_or_else(|| ForgeError::NoConnection {
      host: self.host.name().to_string(),
    })
  }

  /// Runs `cmd`. A non-zero exit is returned as [`ForgeError::CommandFailed`] carrying
  /// the exit code and both output streams.
  pub async fn exec(&self, cmd: &str, print_output: bool) -> ForgeResult<ExecOutput> {
    let out = self.connection()?.exec(cmd).await?;
    if (print_output || self.verbose) && !out.stdout.is_empty() {
      event!(Level::INFO, host = %self.host.name(), "stdout: [{}]\n{}", self.host.name(), out.stdout);
    }
    if !out.success() {
      event!(Level::DEBUG, host = %self.host.name(), code = out.code, command = %cmd, "Command failed.");
      return Err(ForgeError::CommandFailed {
        host: self.host.name().to_string(),
        command: cmd.to_string(),
        exit_code: out.code,
        stdout: out.stdout,
        stderr: out.stderr,
      });
    }
    Ok(out)
  }

  /// Runs `cmd` and returns its trimmed stdout.
  pub async fn cmd(&self, cmd: &str, print_output: bool) -> ForgeResult<String> {
    self.exec(cmd, print_output).await.map(|out| out.stdout)
  }

  pub async fn sudo_exec(&self, cmd: &str, print_output: bool) -> ForgeResult<ExecOutput> {
    self.exec(&sudo_prefix(cmd), print_output).await
  }

  pub async fn sudo_cmd(&self, cmd: &str, print_output: bool) -> ForgeResult<String> {
    self.cmd(&sudo_prefix(cmd), print_output).await
  }

  /// Copies a local file or directory tree to `remote`, creating missing remote
  /// directories. Files whose remote SHA-256 already matches are not sent again,
  /// and every sent file is verified afterwards.
  pub async fn scp(&self, local: impl AsRef<Path>, remote: &str) -> ForgeResult<TransferReport> {
    let local = local.as_ref();
    let conn = self.connection()?;
    let meta = tokio::fs::metadata(local).await.map_err(|e| ForgeError::io(local, e))?;

    let report = if meta.is_dir() {
      self.copy_dir_to_remote(conn, local, remote).await
    } else {
      conn.mkdir_all(remote_parent(remote)).await?;
      self.copy_file_to_remote(conn, local, remote).await
    };

    match &report {
      Ok(r) => event!(
        Level::DEBUG,
        host = %self.host.name(),
        transferred = r.transferred,
        skipped = r.skipped,
        "scp local file {} to remote {} success",
        local.display(),
        remote
      ),
      Err(e) => event!(
        Level::DEBUG,
        host = %self.host.name(),
        error = %e,
        "scp local file {} to remote {} failed",
        local.display(),
        remote
      ),
    }
    report
  }

  async fn copy_dir_to_remote(
    &self,
    conn: &Arc<dyn Connection>,
    local: &Path,
    remote: &str,
  ) -> ForgeResult<TransferReport> {
    let mut report = TransferReport::default();
    if count_files(local).await? == 0 {
      return Ok(report);
    }

    // Depth-first walk without recursion in async code.
    let mut pending: Vec<(PathBuf, String)> = vec![(local.to_path_buf(), remote.to_string())];
    while let Some((dir, remote_dir)) = pending.pop() {
      conn.mkdir_all(&remote_dir).await?;
      let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| ForgeError::io(&dir, e))?;
      while let Some(entry) = entries.next_entry().await.map_err(|e| ForgeError::io(&dir, e))? {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        let target = remote_join(&remote_dir, &name);
        let file_type = entry.file_type().await.map_err(|e| ForgeError::io(&path, e))?;
        if file_type.is_dir() {
          pending.push((path, target));
        } else {
          report.merge(self.copy_file_to_remote(conn, &path, &target).await?);
        }
      }
    }
    Ok(report)
  }

  async fn copy_file_to_remote(
    &self,
    conn: &Arc<dyn Connection>,
    local: &Path,
    remote: &str,
  ) -> ForgeResult<TransferReport> {
    let data = tokio::fs::read(local).await.map_err(|e| ForgeError::io(local, e))?;
    let local_sum = sha256_hex(&data);

    if let Some(remote_sum) = conn.file_sha256(remote).await? {
      if remote_sum == local_sum {
        event!(
          Level::DEBUG,
          host = %self.host.name(),
          "remote file {} sha256 value is the same as local file, skip scp",
          remote
        );
        return Ok(TransferReport {
          transferred: 0,
          skipped: 1,
        });
      }
    }

    conn.upload(&data, remote, file_mode(local).await).await?;

    let written = conn.file_sha256(remote).await?.unwrap_or_default();
    if written != local_sum {
      return Err(ForgeError::ChecksumMismatch {
        path: remote.to_string(),
        local: local_sum,
        remote: written,
      });
    }
    Ok(TransferReport {
      transferred: 1,
      skipped: 0,
    })
  }

  /// Uploads into the staging directory, then moves the result into place with sudo.
  pub async fn sudo_scp(&self, local: impl AsRef<Path>, remote: &str) -> ForgeResult<TransferReport> {
    let local = local.as_ref();
    let conn = self.connection()?;
    let staged = remote_join(&self.tmp_dir, remote);
    let report = self.scp(local, &staged).await?;

    let is_dir = tokio::fs::metadata(local).await.map_err(|e| ForgeError::io(local, e))?.is_dir();
    let base = if is_dir { remote } else { remote_parent(remote) };
    conn.mkdir_all(base).await?;

    self
      .sudo_cmd(&format!("cp -r -f {} {}", shell_quote(&staged), shell_quote(remote)), false)
      .await?;
    self
      .sudo_cmd(&format!("rm -rf {}", shell_quote(&staged)), false)
      .await?;
    Ok(report)
  }

  /// Copies a remote file to `local`, creating missing local directories.
  pub async fn fetch(&self, local: impl AsRef<Path>, remote: &str) -> ForgeResult<()> {
    let local = local.as_ref();
    let conn = self.connection()?;
    let data = match conn.download(remote).await {
      Ok(data) => data,
      Err(e) => {
        event!(Level::DEBUG, host = %self.host.name(), error = %e, "fetch remote file {} to local {} failed", remote, local.display());
        return Err(e);
      }
    };
    if let Some(parent) = local.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ForgeError::io(parent, e))?;
    }
    tokio::fs::write(local, &data).await.map_err(|e| ForgeError::io(local, e))?;
    event!(Level::DEBUG, host = %self.host.name(), "fetch remote file {} to local {} success", remote, local.display());
    Ok(())
  }

  pub async fn file_exist(&self, remote: &str) -> ForgeResult<bool> {
    let out = self
      .connection()?
      .exec(&sudo_prefix(&format!("test -f {}", shell_quote(remote))))
      .await?;
    Ok(out.success())
  }

  pub async fn dir_exist(&self, remote: &str) -> ForgeResult<bool> {
    let out = self
      .connection()?
      .exec(&sudo_prefix(&format!("test -d {}", shell_quote(remote))))
      .await?;
    Ok(out.success())
  }

  pub async fn mkdir(&self, remote: &str) -> ForgeResult<()> {
    self.connection()?.mkdir_all(remote).await.map_err(|e| {
      event!(Level::ERROR, host = %self.host.name(), error = %e, "make remote dir {} failed", remote);
      e
    })
  }

  pub async fn chmod(&self, remote: &str, mode: u32) -> ForgeResult<()> {
    self
      .sudo_cmd(&format!("chmod {:o} {}", mode & 0o7777, shell_quote(remote)), false)
      .await
      .map(|_| ())
  }

  pub async fn file_sha256(&self, remote: &str) -> ForgeResult<Option<String>> {
    self.connection()?.file_sha256(remote).await
  }
}

/// Hex encoded SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
  hex::encode(Sha256::digest(data))
}

async fn count_files(dir: &Path) -> ForgeResult<usize> {
  let mut count = 0;
  let mut pending = vec![dir.to_path_buf()];
  while let Some(dir) = pending.pop() {
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| ForgeError::io(&dir, e))?;
    while let Some(entry) = entries.next_entry().await.map_err(|e| ForgeError::io(&dir, e))? {
      let path = entry.path();
      if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
        pending.push(path);
      } else {
        count += 1;
      }
    }
  }
  Ok(count)
}

#[cfg(unix)]
async fn file_mode(path: &Path) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  tokio::fs::metadata(path)
    .await
    .map(|m| m.permissions().mode() & 0o7777)
    .unwrap_or(0o644)
}

#[cfg(not(unix))]
async fn file_mode(_path: &Path) -> u32 {
  0o644
}
