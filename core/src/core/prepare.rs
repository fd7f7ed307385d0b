// kubeforge/src/core/prepare.rs

//! Preconditions deciding whether a task runs on the current host.

use crate::runtime::Runtime;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;

/// The outcome of a successful pre-check. An `Err` from [`Prepare::pre_check`] is the
/// third outcome: abort the task for this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Run,
  Skip,
}

impl Verdict {
  pub fn is_run(self) -> bool {
    self == Verdict::Run
  }
}

impl From<bool> for Verdict {
  fn from(run: bool) -> Self {
    if run {
      Verdict::Run
    } else {
      Verdict::Skip
    }
  }
}

/// A precondition evaluated against the runtime bound to one host.
#[async_trait]
pub trait Prepare: Send + Sync {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict>;
}

/// Always runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRun;

#[async_trait]
impl Prepare for AlwaysRun {
  async fn pre_check(&self, _runtime: &Runtime) -> anyhow::Result<Verdict> {
    Ok(Verdict::Run)
  }
}

type PrepareHandler = Box<dyn Fn(Runtime) -> BoxFuture<'static, anyhow::Result<Verdict>> + Send + Sync>;

/// A prepare backed by an async closure receiving a copy of the runtime.
pub struct PrepareFn {
  handler: PrepareHandler,
}

impl PrepareFn {
  pub fn new<F, Fut>(f: F) -> Self
  where
    F: Fn(Runtime) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Verdict>> + Send + 'static,
  {
    Self {
      handler: Box::new(move |rt| Box::pin(f(rt))),
    }
  }
}

impl fmt::Debug for PrepareFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("PrepareFn")
  }
}

#[async_trait]
impl Prepare for PrepareFn {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict> {
    (self.handler)(runtime.clone()).await
  }
}

/// Ordered AND of prepares. Evaluation stops at the first skip or error.
#[derive(Default)]
pub struct PrepareCollection {
  items: Vec<Box<dyn Prepare>>,
}

impl PrepareCollection {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, prepare: impl Prepare + 'static) -> Self {
    self.items.push(Box::new(prepare));
    self
  }

  pub fn push(&mut self, prepare: Box<dyn Prepare>) {
    self.items.push(prepare);
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

#[async_trait]
impl Prepare for PrepareCollection {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict> {
    for prepare in &self.items {
      if prepare.pre_check(runtime).await? == Verdict::Skip {
        return Ok(Verdict::Skip);
      }
    }
    Ok(Verdict::Run)
  }
}

/// Inverts run and skip; errors pass through.
pub struct Not(pub Box<dyn Prepare>);

impl Not {
  pub fn new(inner: impl Prepare + 'static) -> Self {
    Not(Box::new(inner))
  }
}

#[async_trait]
impl Prepare for Not {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict> {
    Ok(match self.0.pre_check(runtime).await? {
      Verdict::Run => Verdict::Skip,
      Verdict::Skip => Verdict::Run,
    })
  }
}

/// Runs on hosts that carry `role`.
#[derive(Debug, Clone)]
pub struct HasRole {
  pub role: String,
}

impl HasRole {
  pub fn new(role: impl Into<String>) -> Self {
    Self { role: role.into() }
  }
}

#[async_trait]
impl Prepare for HasRole {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict> {
    Ok(runtime.remote_host()?.is_role(&self.role).into())
  }
}

/// Runs only on the first live host of `role`.
#[derive(Debug, Clone)]
pub struct FirstOfRole {
  pub role: String,
}

impl FirstOfRole {
  pub fn new(role: impl Into<String>) -> Self {
    Self { role: role.into() }
  }
}

#[async_trait]
impl Prepare for FirstOfRole {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict> {
    let host = runtime.remote_host()?;
    let first = runtime.hosts_by_role(&self.role).into_iter().next();
    Ok(first.map_or(false, |h| h.name() == host.name()).into())
  }
}

/// Which cache a [`CacheFlag`] reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
  Host,
  Module,
  Pipeline,
}

/// Runs when the bool stored under `key` equals `expect`. A missing key or a value
/// of another type counts as `false`.
#[derive(Debug, Clone)]
pub struct CacheFlag {
  pub scope: CacheScope,
  pub key: String,
  pub expect: bool,
}

impl CacheFlag {
  pub fn new(scope: CacheScope, key: impl Into<String>, expect: bool) -> Self {
    Self {
      scope,
      key: key.into(),
      expect,
    }
  }
}

#[async_trait]
impl Prepare for CacheFlag {
  async fn pre_check(&self, runtime: &Runtime) -> anyhow::Result<Verdict> {
    let value = match self.scope {
      CacheScope::Host => runtime.host_cache()?.get_must_bool(&self.key),
      CacheScope::Module => runtime.module_cache().get_must_bool(&self.key),
      CacheScope::Pipeline => runtime.pipeline_cache().get_must_bool(&self.key),
    };
    Ok((value.unwrap_or(false) == self.expect).into())
  }
}
