// kubeforge/src/connector/ssh.rs

//! SSH sessions on top of `russh`.
//!
//! Each session runs every command on a fresh channel, so one connection serves
//! concurrent commands. Files travel over the same channels (`cat` on either end),
//! which avoids depending on an SFTP subsystem being enabled on the target.

use super::{Connection, Connector, ExecOutput, Host};
use crate::config::EngineConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::util::shell_quote;
use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::RwLock;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect};
use russh_keys::key;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

/// A jump host every connection is tunnelled through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bastion {
  pub address: String,
  pub port: u16,
  /// Defaults to the target host's user.
  pub user: Option<String>,
}

/// Validated parameters of one SSH connection.
#[derive(Clone, Default)]
pub struct SshConfig {
  pub host_name: String,
  pub username: String,
  pub password: Option<String>,
  pub address: String,
  pub port: u16,
  pub private_key: Option<String>,
  pub key_file: Option<PathBuf>,
  pub timeout: Duration,
  pub bastion: Option<Bastion>,
}

impl fmt::Debug for SshConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SshConfig")
      .field("host_name", &self.host_name)
      .field("username", &self.username)
      .field("address", &self.address)
      .field("port", &self.port)
      .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
      .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
      .field("key_file", &self.key_file)
      .field("timeout", &self.timeout)
      .field("bastion", &self.bastion)
      .finish()
  }
}

impl SshConfig {
  pub fn from_host(host: &Host, defaults: &EngineConfig) -> Self {
    Self {
      host_name: host.name().to_string(),
      username: host.user().to_string(),
      password: host.password().map(str::to_string),
      address: host.address().to_string(),
      port: host.port(),
      private_key: host.private_key().map(str::to_string),
      key_file: host.private_key_path().cloned(),
      timeout: host.timeout().unwrap_or(defaults.connect_timeout),
      bastion: None,
    }
  }

  /// Checks required fields and fills defaults. A key file is read into memory here.
  pub fn validate(mut self) -> ForgeResult<Self> {
    if self.username.is_empty() {
      return Err(ForgeError::config("No username specified for SSH connection"));
    }
    if self.address.is_empty() {
      return Err(ForgeError::config("No address specified for SSH connection"));
    }
    let has_password = self.password.as_deref().map_or(false, |p| !p.is_empty());
    let has_key = self.private_key.as_deref().map_or(false, |k| !k.is_empty());
    if !has_password && !has_key && self.key_file.is_none() {
      return Err(ForgeError::config(
        "Must specify at least one of password, private key or keyfile",
      ));
    }
    if !has_key {
      if let Some(path) = self.key_file.take() {
        let content = std::fs::read_to_string(&path).map_err(|e| ForgeError::io(&path, e))?;
        self.private_key = Some(content);
      }
    }
    if self.port == 0 {
      self.port = 22;
    }
    if self.timeout.is_zero() {
      self.timeout = Duration::from_secs(60);
    }
    if let Some(bastion) = self.bastion.as_mut() {
      if bastion.port == 0 {
        bastion.port = 22;
      }
      if bastion.user.as_deref().map_or(true, str::is_empty) {
        bastion.user = Some(self.username.clone());
      }
    }
    Ok(self)
  }
}

struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
  type Error = russh::Error;

  async fn check_server_key(&mut self, _server_public_key: &key::PublicKey) -> Result<bool, Self::Error> {
    Ok(true)
  }
}

struct Sessions {
  target: Arc<Handle<ClientHandler>>,
  // Keeps the tunnel alive for as long as the target session.
  jump: Option<Arc<Handle<ClientHandler>>>,
}

pub struct SshConnection {
  host_name: String,
  sessions: RwLock<Option<Sessions>>,
}

impl fmt::Debug for SshConnection {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SshConnection")
      .field("host_name", &self.host_name)
      .field("open", &self.sessions.read().is_some())
      .finish()
  }
}

impl SshConnection {
  /// Dials and authenticates within `cfg.timeout`. `cfg` must have been validated.
  pub async fn connect(cfg: &SshConfig) -> ForgeResult<Self> {
    let endpoint = format!("{}:{}", cfg.address, cfg.port);
    let dial = async {
      let config = Arc::new(client::Config::default());
      match &cfg.bastion {
        None => {
          let mut target = client::connect(config, (cfg.address.as_str(), cfg.port), ClientHandler)
            .await
            .map_err(|e| dial_error(cfg, &endpoint, e))?;
          authenticate(&mut target, cfg, &cfg.username).await?;
          Ok::<_, ForgeError>(Sessions {
            target: Arc::new(target),
            jump: None,
          })
        }
        Some(bastion) => {
          let bastion_endpoint = format!("{}:{}", bastion.address, bastion.port);
          let mut jump = client::connect(config.clone(), (bastion.address.as_str(), bastion.port), ClientHandler)
            .await
            .map_err(|e| dial_error(cfg, &bastion_endpoint, e))?;
          let bastion_user = bastion.user.clone().unwrap_or_else(|| cfg.username.clone());
          authenticate(&mut jump, cfg, &bastion_user).await?;

          let tunnel = jump
            .channel_open_direct_tcpip(cfg.address.clone(), cfg.port as u32, "127.0.0.1", 0)
            .await
            .map_err(|e| dial_error(cfg, &endpoint, e))?;
          let mut target = client::connect_stream(config, tunnel.into_stream(), ClientHandler)
            .await
            .map_err(|e| dial_error(cfg, &endpoint, e))?;
          authenticate(&mut target, cfg, &cfg.username).await?;
          Ok(Sessions {
            target: Arc::new(target),
            jump: Some(Arc::new(jump)),
          })
        }
      }
    };

    let sessions = match tokio::time::timeout(cfg.timeout, dial).await {
      Ok(res) => res?,
      Err(_) => {
        return Err(ForgeError::Dial {
          host: cfg.host_name.clone(),
          address: endpoint,
          source: anyhow!("connection timed out after {:?}", cfg.timeout),
        })
      }
    };
    event!(Level::DEBUG, host = %cfg.host_name, "SSH session established.");
    Ok(Self {
      host_name: cfg.host_name.clone(),
      sessions: RwLock::new(Some(sessions)),
    })
  }

  fn target(&self) -> ForgeResult<Arc<Handle<ClientHandler>>> {
    self
      .sessions
      .read()
      .as_ref()
      .map(|s| s.target.clone())
      .ok_or_else(|| self.transport(anyhow!("connection closed")))
  }

  fn transport(&self, source: impl Into<anyhow::Error>) -> ForgeError {
    ForgeError::Transport {
      host: self.host_name.clone(),
      source: source.into(),
    }
  }

  /// Runs `cmd` on a new channel, optionally feeding `stdin`, and collects raw output.
  async fn run(&self, cmd: &str, stdin: Option<&[u8]>) -> ForgeResult<(Vec<u8>, Vec<u8>, i32)> {
    let target = self.target()?;
    let mut channel = target
      .channel_open_session()
      .await
      .map_err(|e| self.transport(e))?;
    channel.exec(true, cmd).await.map_err(|e| self.transport(e))?;
    if let Some(data) = stdin {
      channel.data(data).await.map_err(|e| self.transport(e))?;
      channel.eof().await.map_err(|e| self.transport(e))?;
    }

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut code = None;
    while let Some(msg) = channel.wait().await {
      match msg {
        ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
        ChannelMsg::ExtendedData { ref data, ext } if ext == 1 => stderr.extend_from_slice(data),
        ChannelMsg::ExitStatus { exit_status } => code = Some(exit_status as i32),
        _ => {}
      }
    }
    Ok((stdout, stderr, code.unwrap_or(-1)))
  }
}

#[async_trait]
impl Connection for SshConnection {
  async fn exec(&self, cmd: &str) -> ForgeResult<ExecOutput> {
    let (stdout, stderr, code) = self.run(cmd, None).await?;
    Ok(ExecOutput {
      stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
      stderr: String::from_utf8_lossy(&stderr).to_string(),
      code,
    })
  }

  async fn upload(&self, data: &[u8], remote: &str, mode: u32) -> ForgeResult<()> {
    let path = shell_quote(remote);
    let cmd = format!("cat > {p} && chmod {mode:o} {p}", p = path, mode = mode & 0o7777);
    let (stdout, stderr, code) = self.run(&cmd, Some(data)).await?;
    if code != 0 {
      return Err(ForgeError::CommandFailed {
        host: self.host_name.clone(),
        command: cmd,
        exit_code: code,
        stdout: String::from_utf8_lossy(&stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
      });
    }
    Ok(())
  }

  async fn download(&self, remote: &str) -> ForgeResult<Vec<u8>> {
    let cmd = format!("cat {}", shell_quote(remote));
    let (stdout, stderr, code) = self.run(&cmd, None).await?;
    if code != 0 {
      return Err(ForgeError::CommandFailed {
        host: self.host_name.clone(),
        command: cmd,
        exit_code: code,
        stdout: String::new(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
      });
    }
    Ok(stdout)
  }

  async fn close(&self) -> ForgeResult<()> {
    let sessions = self.sessions.write().take();
    if let Some(sessions) = sessions {
      sessions
        .target
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
        .map_err(|e| self.transport(e))?;
      if let Some(jump) = sessions.jump {
        jump
          .disconnect(Disconnect::ByApplication, "", "English")
          .await
          .map_err(|e| self.transport(e))?;
      }
    }
    Ok(())
  }
}

async fn authenticate(handle: &mut Handle<ClientHandler>, cfg: &SshConfig, user: &str) -> ForgeResult<()> {
  if let Some(pem) = cfg.private_key.as_deref().filter(|k| !k.is_empty()) {
    let key_pair = russh_keys::decode_secret_key(pem, None).map_err(|e| {
      ForgeError::config(format!("The given SSH key for host '{}' could not be parsed: {}", cfg.host_name, e))
    })?;
    let accepted = handle
      .authenticate_publickey(user, Arc::new(key_pair))
      .await
      .map_err(|e| ForgeError::Transport {
        host: cfg.host_name.clone(),
        source: e.into(),
      })?;
    if accepted {
      return Ok(());
    }
  }
  if let Some(password) = cfg.password.as_deref().filter(|p| !p.is_empty()) {
    let accepted = handle
      .authenticate_password(user, password)
      .await
      .map_err(|e| ForgeError::Transport {
        host: cfg.host_name.clone(),
        source: e.into(),
      })?;
    if accepted {
      return Ok(());
    }
  }
  Err(ForgeError::Auth {
    host: cfg.host_name.clone(),
    user: user.to_string(),
  })
}

fn dial_error(cfg: &SshConfig, endpoint: &str, source: russh::Error) -> ForgeError {
  ForgeError::Dial {
    host: cfg.host_name.clone(),
    address: endpoint.to_string(),
    source: source.into(),
  }
}

/// Dials [`SshConnection`]s using each host's credentials.
#[derive(Debug, Clone, Default)]
pub struct SshConnector {
  defaults: EngineConfig,
  bastion: Option<Bastion>,
}

impl SshConnector {
  pub fn new(defaults: EngineConfig) -> Self {
    Self { defaults, bastion: None }
  }

  pub fn with_bastion(mut self, bastion: Bastion) -> Self {
    self.bastion = Some(bastion);
    self
  }

  pub fn config_for(&self, host: &Host) -> ForgeResult<SshConfig> {
    let mut cfg = SshConfig::from_host(host, &self.defaults);
    if cfg.port == 0 {
      cfg.port = self.defaults.ssh_port;
    }
    cfg.bastion = self.bastion.clone();
    cfg.validate()
  }
}

#[async_trait]
impl Connector for SshConnector {
  async fn connect(&self, host: &Host) -> ForgeResult<Arc<dyn Connection>> {
    let cfg = self.config_for(host)?;
    let conn = SshConnection::connect(&cfg).await?;
    Ok(Arc::new(conn))
  }
}
