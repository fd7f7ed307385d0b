// kubeforge/src/core/action.rs

//! The unit of work a task performs on one host.

use crate::runtime::Runtime;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// Work against the host bound to `runtime`.
///
/// Implementations read everything they need from the runtime and its caches and
/// must not keep state between invocations: the same action value runs on every
/// targeted host, possibly concurrently, and again on every retry.
#[async_trait]
pub trait Action: Send + Sync {
  async fn execute(&self, runtime: &Runtime) -> anyhow::Result<()>;
}

type ActionHandler = Box<dyn Fn(Runtime) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// An action backed by an async closure receiving a copy of the runtime.
///
/// ```
/// use kubeforge::ActionFn;
///
/// let action = ActionFn::new(|rt| async move {
///   let runner = rt.runner()?;
///   runner.sudo_cmd("systemctl restart containerd", false).await?;
///   Ok(())
/// });
/// # drop(action);
/// ```
pub struct ActionFn {
  handler: ActionHandler,
}

impl ActionFn {
  pub fn new<F, Fut>(f: F) -> Self
  where
    F: Fn(Runtime) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    Self {
      handler: Box::new(move |rt| Box::pin(f(rt))),
    }
  }
}

impl fmt::Debug for ActionFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("ActionFn")
  }
}

#[async_trait]
impl Action for ActionFn {
  async fn execute(&self, runtime: &Runtime) -> anyhow::Result<()> {
    (self.handler)(runtime.clone()).await
  }
}

/// Runs a shell command on the host, optionally with sudo, optionally storing the
/// trimmed stdout in the host cache.
#[derive(Debug, Clone)]
pub struct ShellAction {
  pub command: String,
  pub sudo: bool,
  pub save_as: Option<String>,
  pub print_output: bool,
}

impl ShellAction {
  pub fn new(command: impl Into<String>) -> Self {
    Self {
      command: command.into(),
      sudo: false,
      save_as: None,
      print_output: false,
    }
  }

  pub fn sudo(mut self) -> Self {
    self.sudo = true;
    self
  }

  /// Stores stdout under `key` in the host cache.
  pub fn save_as(mut self, key: impl Into<String>) -> Self {
    self.save_as = Some(key.into());
    self
  }

  pub fn print_output(mut self) -> Self {
    self.print_output = true;
    self
  }
}

#[async_trait]
impl Action for ShellAction {
  async fn execute(&self, runtime: &Runtime) -> anyhow::Result<()> {
    let runner = runtime.runner()?;
    let stdout = if self.sudo {
      runner.sudo_cmd(&self.command, self.print_output).await?
    } else {
      runner.cmd(&self.command, self.print_output).await?
    };
    if let Some(key) = &self.save_as {
      runner.host().cache().set(key.clone(), stdout);
    }
    Ok(())
  }
}
