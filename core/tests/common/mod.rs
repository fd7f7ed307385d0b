// tests/common/mod.rs
#![allow(dead_code)] // Not every test file uses every helper

use async_trait::async_trait;
use kubeforge::connector::runner::sha256_hex;
use kubeforge::{Connection, Connector, EngineConfig, ExecOutput, ForgeError, ForgeResult, Host, Runtime};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::Level;

// --- Helper for Tracing Setup ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- In-memory connection ---

/// A fake session keeping uploaded files in memory and recording every command.
#[derive(Default)]
pub struct MockConnection {
  pub host: String,
  pub files: Mutex<HashMap<String, Vec<u8>>>,
  pub dirs: Mutex<HashSet<String>>,
  pub commands: Mutex<Vec<String>>,
  pub uploads: AtomicUsize,
  pub closed: AtomicBool,
  /// Stored content gets an extra byte, so post-upload verification fails.
  pub corrupt_uploads: bool,
  /// Commands containing the key answer with the given output.
  pub responses: Mutex<Vec<(String, ExecOutput)>>,
}

impl MockConnection {
  pub fn new(host: &str) -> Self {
    Self {
      host: host.to_string(),
      ..Default::default()
    }
  }

  pub fn corrupting(host: &str) -> Self {
    Self {
      host: host.to_string(),
      corrupt_uploads: true,
      ..Default::default()
    }
  }

  pub fn respond(&self, needle: &str, stdout: &str, code: i32) {
    self.responses.lock().push((
      needle.to_string(),
      ExecOutput {
        stdout: stdout.to_string(),
        stderr: if code == 0 { String::new() } else { format!("{} failed", needle) },
        code,
      },
    ));
  }

  pub fn put_file(&self, path: &str, data: &[u8]) {
    self.files.lock().insert(path.to_string(), data.to_vec());
  }

  pub fn file(&self, path: &str) -> Option<Vec<u8>> {
    self.files.lock().get(path).cloned()
  }

  pub fn commands(&self) -> Vec<String> {
    self.commands.lock().clone()
  }

  fn check_open(&self) -> ForgeResult<()> {
    if self.closed.load(Ordering::SeqCst) {
      return Err(ForgeError::Transport {
        host: self.host.clone(),
        source: anyhow::anyhow!("connection closed"),
      });
    }
    Ok(())
  }
}

#[async_trait]
impl Connection for MockConnection {
  async fn exec(&self, cmd: &str) -> ForgeResult<ExecOutput> {
    self.check_open()?;
    self.commands.lock().push(cmd.to_string());
    let canned = self
      .responses
      .lock()
      .iter()
      .find(|(needle, _)| cmd.contains(needle.as_str()))
      .map(|(_, out)| out.clone());
    Ok(canned.unwrap_or_default())
  }

  async fn upload(&self, data: &[u8], remote: &str, _mode: u32) -> ForgeResult<()> {
    self.check_open()?;
    self.uploads.fetch_add(1, Ordering::SeqCst);
    let mut stored = data.to_vec();
    if self.corrupt_uploads {
      stored.push(b'!');
    }
    self.files.lock().insert(remote.to_string(), stored);
    Ok(())
  }

  async fn download(&self, remote: &str) -> ForgeResult<Vec<u8>> {
    self.check_open()?;
    self.file(remote).ok_or_else(|| ForgeError::CommandFailed {
      host: self.host.clone(),
      command: format!("cat {}", remote),
      exit_code: 1,
      stdout: String::new(),
      stderr: "No such file or directory".to_string(),
    })
  }

  async fn close(&self) -> ForgeResult<()> {
    self.closed.store(true, Ordering::SeqCst);
    Ok(())
  }

  async fn file_sha256(&self, remote: &str) -> ForgeResult<Option<String>> {
    self.check_open()?;
    Ok(self.file(remote).map(|data| sha256_hex(&data)))
  }

  async fn mkdir_all(&self, remote: &str) -> ForgeResult<()> {
    self.check_open()?;
    self.dirs.lock().insert(remote.to_string());
    Ok(())
  }
}

/// Hands out one [`MockConnection`] per host name and counts dials.
#[derive(Default)]
pub struct MockConnector {
  pub dials: AtomicUsize,
  pub unreachable: Mutex<HashSet<String>>,
  pub connections: Mutex<HashMap<String, Arc<MockConnection>>>,
  /// Canned answers every new connection starts with.
  pub responses: Mutex<Vec<(String, String, i32)>>,
  /// How long each dial takes before it answers.
  pub dial_delay: Mutex<Option<Duration>>,
}

impl MockConnector {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn make_unreachable(&self, host: &str) {
    self.unreachable.lock().insert(host.to_string());
  }

  pub fn connection(&self, host: &str) -> Option<Arc<MockConnection>> {
    self.connections.lock().get(host).cloned()
  }

  pub fn dial_count(&self) -> usize {
    self.dials.load(Ordering::SeqCst)
  }

  pub fn slow_dials(&self, delay: Duration) {
    *self.dial_delay.lock() = Some(delay);
  }

  pub fn respond_all(&self, needle: &str, stdout: &str, code: i32) {
    self.responses.lock().push((needle.to_string(), stdout.to_string(), code));
  }
}

#[async_trait]
impl Connector for MockConnector {
  async fn connect(&self, host: &Host) -> ForgeResult<Arc<dyn Connection>> {
    self.dials.fetch_add(1, Ordering::SeqCst);
    let delay = *self.dial_delay.lock();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    if self.unreachable.lock().contains(host.name()) {
      return Err(ForgeError::Dial {
        host: host.name().to_string(),
        address: format!("{}:22", host.address()),
        source: anyhow::anyhow!("connection refused"),
      });
    }
    let conn = Arc::new(MockConnection::new(host.name()));
    for (needle, stdout, code) in self.responses.lock().iter() {
      conn.respond(needle, stdout, *code);
    }
    self.connections.lock().insert(host.name().to_string(), conn.clone());
    Ok(conn)
  }
}

// --- Runtime fixtures ---

pub fn fast_config() -> EngineConfig {
  EngineConfig {
    retry_delay: Duration::from_millis(10),
    ..EngineConfig::default()
  }
}

pub fn hosts(names: &[&str]) -> Vec<Host> {
  names
    .iter()
    .enumerate()
    .map(|(i, name)| Host::new(*name, format!("10.0.0.{}", i + 1)).with_password("secret"))
    .collect()
}

pub struct Fixture {
  pub runtime: Runtime,
  pub connector: Arc<MockConnector>,
  // Keeps the work dir alive for the duration of the test.
  pub work_dir: TempDir,
}

pub fn fixture_with(hosts: Vec<Host>, ignore_error: bool) -> Fixture {
  let work_dir = tempfile::tempdir().expect("tempdir");
  let connector = MockConnector::new();
  let runtime = Runtime::builder("test")
    .hosts(hosts)
    .connector(connector.clone())
    .work_dir(work_dir.path().join("kubeforge"))
    .config(fast_config())
    .ignore_error(ignore_error)
    .build()
    .expect("runtime builds");
  Fixture {
    runtime,
    connector,
    work_dir,
  }
}

pub fn fixture(names: &[&str]) -> Fixture {
  fixture_with(hosts(names), false)
}

// --- Recording helpers ---

/// Tracks how many callers are inside a section at once, and the peak.
#[derive(Default)]
pub struct InFlight {
  current: AtomicUsize,
  peak: AtomicUsize,
}

impl InFlight {
  pub fn enter(&self) {
    let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
  }

  pub fn leave(&self) {
    self.current.fetch_sub(1, Ordering::SeqCst);
  }

  pub fn peak(&self) -> usize {
    self.peak.load(Ordering::SeqCst)
  }
}

/// Ordered log of events written by actions, shared across hosts.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
  pub fn push(&self, entry: impl Into<String>) {
    self.0.lock().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().clone()
  }

  pub fn count(&self, entry: &str) -> usize {
    self.0.lock().iter().filter(|e| e.as_str() == entry).count()
  }
}
