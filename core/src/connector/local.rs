// kubeforge/src/connector/local.rs

//! A [`Connection`] to the machine the engine runs on, used by local tasks.

use super::{Connection, ExecOutput};
use crate::error::{ForgeError, ForgeResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct LocalConnection {
  shell: String,
}

impl Default for LocalConnection {
  fn default() -> Self {
    Self {
      shell: "/bin/bash".to_string(),
    }
  }
}

impl LocalConnection {
  pub fn new() -> Self {
    Self::default()
  }

  /// Runs commands through `shell -c` instead of bash.
  pub fn with_shell(shell: impl Into<String>) -> Self {
    Self { shell: shell.into() }
  }
}

#[async_trait]
impl Connection for LocalConnection {
  async fn exec(&self, cmd: &str) -> ForgeResult<ExecOutput> {
    let output = Command::new(&self.shell)
      .arg("-c")
      .arg(cmd)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| ForgeError::io(&self.shell, e))?;

    Ok(ExecOutput {
      stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).to_string(),
      code: output.status.code().unwrap_or(-1),
    })
  }

  async fn upload(&self, data: &[u8], remote: &str, mode: u32) -> ForgeResult<()> {
    let path = Path::new(remote);
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| ForgeError::io(parent, e))?;
    }
    tokio::fs::write(path, data).await.map_err(|e| ForgeError::io(path, e))?;
    set_mode(path, mode).await
  }

  async fn download(&self, remote: &str) -> ForgeResult<Vec<u8>> {
    tokio::fs::read(remote).await.map_err(|e| ForgeError::io(remote, e))
  }

  async fn close(&self) -> ForgeResult<()> {
    Ok(())
  }

  async fn mkdir_all(&self, remote: &str) -> ForgeResult<()> {
    tokio::fs::create_dir_all(remote)
      .await
      .map_err(|e| ForgeError::io(remote, e))
  }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> ForgeResult<()> {
  use std::os::unix::fs::PermissionsExt;
  tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    .await
    .map_err(|e| ForgeError::io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> ForgeResult<()> {
  Ok(())
}
