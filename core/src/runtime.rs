// kubeforge/src/runtime.rs

//! The bundle of hosts, caches and connections one pipeline run operates on.

use crate::cache::Cache;
use crate::config::EngineConfig;
use crate::connector::{Connector, Dialer, Host, Runner, SshConnector};
use crate::error::{ForgeError, ForgeResult};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{event, Level};

struct RuntimeShared {
  name: String,
  work_dir: PathBuf,
  dialer: Dialer,
  config: EngineConfig,
  ignore_error: bool,
  verbose: bool,
  registered: Vec<Arc<Host>>,
  hosts: RwLock<Vec<Arc<Host>>>,
  role_hosts: RwLock<HashMap<String, Vec<Arc<Host>>>>,
  deprecated: RwLock<HashSet<String>>,
  extension: Option<Arc<dyn Any + Send + Sync>>,
  local_host: Arc<Host>,
}

/// What tasks and actions see of the current run.
///
/// Cloning is shallow: host list, role index, pool and extension payload are shared.
/// The bound [`Runner`], the module/pipeline caches and the cancellation token are
/// per-copy, which is how every host execution gets its own "current host" view.
#[derive(Clone)]
pub struct Runtime {
  shared: Arc<RuntimeShared>,
  runner: Option<Arc<Runner>>,
  module_cache: Cache,
  pipeline_cache: Cache,
  cancel: CancellationToken,
}

impl Runtime {
  pub fn builder(name: impl Into<String>) -> RuntimeBuilder {
    RuntimeBuilder::new(name)
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn work_dir(&self) -> &Path {
    &self.shared.work_dir
  }

  pub fn config(&self) -> &EngineConfig {
    &self.shared.config
  }

  pub fn dialer(&self) -> &Dialer {
    &self.shared.dialer
  }

  /// Failed hosts of remote tasks are dropped instead of failing the module.
  pub fn ignore_error(&self) -> bool {
    self.shared.ignore_error
  }

  pub fn verbose(&self) -> bool {
    self.shared.verbose
  }

  /// A copy with no runner bound.
  pub fn copy(&self) -> Runtime {
    let mut copy = self.clone();
    copy.runner = None;
    copy
  }

  pub fn set_runner(&mut self, runner: Runner) {
    self.runner = Some(Arc::new(runner));
  }

  /// The runner of the host currently being worked on.
  pub fn runner(&self) -> ForgeResult<&Arc<Runner>> {
    self.runner.as_ref().ok_or_else(|| ForgeError::NotInitialized {
      what: "runner".to_string(),
    })
  }

  pub fn remote_host(&self) -> ForgeResult<Arc<Host>> {
    Ok(self.runner()?.host().clone())
  }

  /// Cache of the host currently being worked on.
  pub fn host_cache(&self) -> ForgeResult<Cache> {
    Ok(self.runner()?.host().cache())
  }

  pub fn module_cache(&self) -> &Cache {
    &self.module_cache
  }

  pub fn pipeline_cache(&self) -> &Cache {
    &self.pipeline_cache
  }

  pub fn bind_caches(&mut self, module_cache: Cache, pipeline_cache: Cache) {
    self.module_cache = module_cache;
    self.pipeline_cache = pipeline_cache;
  }

  /// Replaces the cancellation token; used to give each host attempt its own.
  pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
    self.cancel = token;
  }

  /// Cancelled when the current host attempt has been abandoned (e.g. timed out).
  /// Long-running actions may watch it to stop early.
  pub fn cancellation(&self) -> &CancellationToken {
    &self.cancel
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }

  /// Live (not deprecated) hosts, in declaration order.
  pub fn all_hosts(&self) -> Vec<Arc<Host>> {
    self.shared.hosts.read().clone()
  }

  pub fn host_count(&self) -> usize {
    self.shared.hosts.read().len()
  }

  /// Looks a host up by name, deprecated hosts included.
  pub fn host(&self, name: &str) -> Option<Arc<Host>> {
    self.shared.registered.iter().find(|h| h.name() == name).cloned()
  }

  pub fn hosts_by_role(&self, role: &str) -> Vec<Arc<Host>> {
    self.shared.role_hosts.read().get(role).cloned().unwrap_or_default()
  }

  /// Removes a host from the live host list and every role, marking it deprecated.
  /// Later tasks skip deprecated hosts.
  pub fn delete_host(&self, host: &Host) {
    let name = host.name();
    self.shared.hosts.write().retain(|h| h.name() != name);
    for members in self.shared.role_hosts.write().values_mut() {
      members.retain(|h| h.name() != name);
    }
    self.shared.deprecated.write().insert(name.to_string());
    event!(Level::WARN, host = %name, "Host removed from runtime.");
  }

  pub fn host_is_deprecated(&self, name: &str) -> bool {
    self.shared.deprecated.read().contains(name)
  }

  /// `<work_dir>/<current host name>`.
  pub fn host_work_dir(&self) -> ForgeResult<PathBuf> {
    Ok(self.shared.work_dir.join(self.runner()?.host().name()))
  }

  /// The pseudo-host local tasks run against.
  pub fn local_host(&self) -> Arc<Host> {
    self.shared.local_host.clone()
  }

  /// The typed payload attached with [`RuntimeBuilder::extension`].
  pub fn extension<T: Any + Send + Sync>(&self) -> ForgeResult<Arc<T>> {
    let payload = self.shared.extension.clone().ok_or_else(|| ForgeError::NotInitialized {
      what: "runtime extension".to_string(),
    })?;
    payload.downcast::<T>().map_err(|_| ForgeError::TypeMismatch {
      what: "runtime extension".to_string(),
      expected_type: std::any::type_name::<T>().to_string(),
    })
  }
}

impl fmt::Debug for Runtime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Runtime")
      .field("name", &self.shared.name)
      .field("work_dir", &self.shared.work_dir)
      .field("hosts", &self.host_count())
      .field("current_host", &self.runner.as_ref().map(|r| r.host().name().to_string()))
      .finish()
  }
}

/// Assembles a [`Runtime`].
pub struct RuntimeBuilder {
  name: String,
  hosts: Vec<Host>,
  connector: Option<Arc<dyn Connector>>,
  work_dir: Option<PathBuf>,
  config: EngineConfig,
  ignore_error: bool,
  verbose: bool,
  extension: Option<Arc<dyn Any + Send + Sync>>,
}

impl RuntimeBuilder {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      hosts: Vec::new(),
      connector: None,
      work_dir: None,
      config: EngineConfig::default(),
      ignore_error: false,
      verbose: false,
      extension: None,
    }
  }

  pub fn host(mut self, host: Host) -> Self {
    self.hosts.push(host);
    self
  }

  pub fn hosts(mut self, hosts: impl IntoIterator<Item = Host>) -> Self {
    self.hosts.extend(hosts);
    self
  }

  /// Defaults to an [`SshConnector`] built from the engine config.
  pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
    self.connector = Some(connector);
    self
  }

  /// Defaults to `./kubeforge`.
  pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.work_dir = Some(dir.into());
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn ignore_error(mut self, ignore: bool) -> Self {
    self.ignore_error = ignore;
    self
  }

  pub fn verbose(mut self, verbose: bool) -> Self {
    self.verbose = verbose;
    self
  }

  pub fn extension<T: Any + Send + Sync>(mut self, payload: T) -> Self {
    self.extension = Some(Arc::new(payload));
    self
  }

  /// Indexes the hosts and creates the work dir, its `logs/` dir and one dir per host.
  pub fn build(self) -> ForgeResult<Runtime> {
    let mut seen = HashSet::new();
    for host in &self.hosts {
      if host.name().is_empty() {
        return Err(ForgeError::config("host name must not be empty"));
      }
      if !seen.insert(host.name().to_string()) {
        return Err(ForgeError::config(format!("duplicate host name '{}'", host.name())));
      }
    }

    let work_dir = match self.work_dir {
      Some(dir) => dir,
      None => std::env::current_dir()
        .map_err(|e| ForgeError::io(".", e))?
        .join("kubeforge"),
    };
    let logs = work_dir.join("logs");
    std::fs::create_dir_all(&logs).map_err(|e| ForgeError::io(&logs, e))?;

    let mut hosts = Vec::with_capacity(self.hosts.len());
    let mut role_hosts: HashMap<String, Vec<Arc<Host>>> = HashMap::new();
    for (index, mut host) in self.hosts.into_iter().enumerate() {
      host.index = index;
      let host_dir = work_dir.join(host.name());
      std::fs::create_dir_all(&host_dir).map_err(|e| ForgeError::io(&host_dir, e))?;

      let host = Arc::new(host);
      for role in host.roles() {
        role_hosts.entry(role.clone()).or_default().push(host.clone());
      }
      hosts.push(host);
    }

    let connector = self
      .connector
      .unwrap_or_else(|| Arc::new(SshConnector::new(self.config.clone())));

    event!(
      Level::DEBUG,
      runtime = %self.name,
      hosts = hosts.len(),
      work_dir = %work_dir.display(),
      "Runtime built."
    );

    Ok(Runtime {
      shared: Arc::new(RuntimeShared {
        name: self.name,
        work_dir,
        dialer: Dialer::new(connector),
        config: self.config,
        ignore_error: self.ignore_error,
        verbose: self.verbose,
        registered: hosts.clone(),
        hosts: RwLock::new(hosts),
        role_hosts: RwLock::new(role_hosts),
        deprecated: RwLock::new(HashSet::new()),
        extension: self.extension,
        local_host: Arc::new(Host::localhost()),
      }),
      runner: None,
      module_cache: Cache::new(),
      pipeline_cache: Cache::new(),
      cancel: CancellationToken::new(),
    })
  }
}
