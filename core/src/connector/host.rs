// kubeforge/src/connector/host.rs

//! Target machine identity, credentials and role membership.

use crate::cache::Cache;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// Name of the synthetic host local tasks run against.
pub const LOCAL_HOST: &str = "LocalHost";

/// Index used by the local pseudo-host; never pooled by the dialer.
pub const LOCAL_HOST_INDEX: usize = usize::MAX;

/// Role names conventionally used by installation phases. Roles are plain strings;
/// the engine itself never interprets them.
pub mod role {
  pub const CONTROL_PLANE: &str = "master";
  pub const WORKER: &str = "worker";
  pub const ETCD: &str = "etcd";
  pub const REGISTRY: &str = "registry";
  pub const K8S: &str = "k8s";
}

/// One target machine.
///
/// Everything except the cache is immutable once the host is handed to a
/// [`crate::RuntimeBuilder`]. Clones share the same cache.
#[derive(Clone)]
pub struct Host {
  pub(crate) name: String,
  pub(crate) address: String,
  pub(crate) internal_address: String,
  pub(crate) port: u16,
  pub(crate) user: String,
  pub(crate) password: Option<String>,
  pub(crate) private_key: Option<String>,
  pub(crate) private_key_path: Option<PathBuf>,
  pub(crate) arch: String,
  pub(crate) timeout: Option<Duration>,
  pub(crate) roles: Vec<String>,
  pub(crate) index: usize,
  cache: std::sync::Arc<OnceLock<Cache>>,
}

impl Host {
  /// A host reachable at `address`. The internal address defaults to the same value,
  /// the user to `root` and the architecture to `amd64`; port 0 means "engine default".
  pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
    let address = address.into();
    Self {
      name: name.into(),
      internal_address: address.clone(),
      address,
      port: 0,
      user: "root".to_string(),
      password: None,
      private_key: None,
      private_key_path: None,
      arch: "amd64".to_string(),
      timeout: None,
      roles: Vec::new(),
      index: 0,
      cache: Default::default(),
    }
  }

  /// The pseudo-host local tasks execute on.
  pub fn localhost() -> Self {
    let mut host = Host::new(LOCAL_HOST, "127.0.0.1");
    host.index = LOCAL_HOST_INDEX;
    host
  }

  pub fn with_internal_address(mut self, address: impl Into<String>) -> Self {
    self.internal_address = address.into();
    self
  }

  pub fn with_port(mut self, port: u16) -> Self {
    self.port = port;
    self
  }

  pub fn with_user(mut self, user: impl Into<String>) -> Self {
    self.user = user.into();
    self
  }

  pub fn with_password(mut self, password: impl Into<String>) -> Self {
    self.password = Some(password.into());
    self
  }

  /// In-memory PEM/OpenSSH private key.
  pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
    self.private_key = Some(key.into());
    self
  }

  pub fn with_private_key_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.private_key_path = Some(path.into());
    self
  }

  pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
    self.arch = arch.into();
    self
  }

  /// Connect timeout for this host, overriding the engine default.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_role(mut self, role: impl Into<String>) -> Self {
    let role = role.into();
    if !self.roles.contains(&role) {
      self.roles.push(role);
    }
    self
  }

  pub fn with_roles<I, S>(self, roles: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    roles.into_iter().fold(self, |host, r| host.with_role(r))
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  pub fn internal_address(&self) -> &str {
    &self.internal_address
  }

  pub fn port(&self) -> u16 {
    self.port
  }

  pub fn user(&self) -> &str {
    &self.user
  }

  pub fn password(&self) -> Option<&str> {
    self.password.as_deref()
  }

  pub fn private_key(&self) -> Option<&str> {
    self.private_key.as_deref()
  }

  pub fn private_key_path(&self) -> Option<&PathBuf> {
    self.private_key_path.as_ref()
  }

  pub fn arch(&self) -> &str {
    &self.arch
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  pub fn roles(&self) -> &[String] {
    &self.roles
  }

  pub fn is_role(&self, role: &str) -> bool {
    self.roles.iter().any(|r| r == role)
  }

  /// Stable position of the host in the runtime; the connection pool key.
  pub fn index(&self) -> usize {
    self.index
  }

  pub fn is_localhost(&self) -> bool {
    self.index == LOCAL_HOST_INDEX
  }

  /// The host-scoped cache, created on first use.
  pub fn cache(&self) -> Cache {
    self.cache.get_or_init(Cache::new).clone()
  }
}

impl fmt::Debug for Host {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Host")
      .field("name", &self.name)
      .field("address", &self.address)
      .field("internal_address", &self.internal_address)
      .field("port", &self.port)
      .field("user", &self.user)
      .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
      .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
      .field("private_key_path", &self.private_key_path)
      .field("arch", &self.arch)
      .field("roles", &self.roles)
      .field("index", &self.index)
      .finish()
  }
}

impl fmt::Display for Host {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}
