// kubeforge/src/module/base.rs

use crate::cache::Cache;
use crate::core::{ModuleResult, ResultStatus};
use crate::error::{ForgeError, ForgeResult};
use crate::runtime::Runtime;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Side effect run after a module's result is known, e.g. persisting its status.
#[async_trait]
pub trait PostHook: Send + Sync {
  async fn call(&self, runtime: &Runtime, result: &ModuleResult) -> anyhow::Result<()>;
}

/// What a [`PostHookFn`] is told about the finished module.
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
  pub module: String,
  pub status: ResultStatus,
  pub error: Option<String>,
}

type PostHookHandler = Box<dyn Fn(Runtime, ModuleOutcome) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

pub struct PostHookFn {
  handler: PostHookHandler,
}

impl PostHookFn {
  pub fn new<F, Fut>(f: F) -> Self
  where
    F: Fn(Runtime, ModuleOutcome) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    Self {
      handler: Box::new(move |rt, outcome| Box::pin(f(rt, outcome))),
    }
  }
}

impl fmt::Debug for PostHookFn {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("PostHookFn")
  }
}

#[async_trait]
impl PostHook for PostHookFn {
  async fn call(&self, runtime: &Runtime, result: &ModuleResult) -> anyhow::Result<()> {
    let outcome = ModuleOutcome {
      module: result.module.clone(),
      status: result.status,
      error: result.error.as_ref().map(|e| e.to_string()),
    };
    (self.handler)(runtime.clone(), outcome).await
  }
}

/// State every module carries: identity, skip flag, the bound runtime and caches, and
/// its post hooks.
pub struct ModuleBase {
  name: String,
  desc: String,
  skip: bool,
  runtime: Option<Runtime>,
  module_cache: Cache,
  pipeline_cache: Cache,
  post_hooks: Vec<Arc<dyn PostHook>>,
}

impl ModuleBase {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      desc: String::new(),
      skip: false,
      runtime: None,
      module_cache: Cache::new(),
      pipeline_cache: Cache::new(),
      post_hooks: Vec::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn desc(&self) -> &str {
    &self.desc
  }

  pub fn set_desc(&mut self, desc: impl Into<String>) {
    self.desc = desc.into();
  }

  pub fn is_skip(&self) -> bool {
    self.skip
  }

  pub fn set_skip(&mut self, skip: bool) {
    self.skip = skip;
  }

  /// Binds a runtime copy that sees `module_cache` and `pipeline_cache`.
  pub fn bind(&mut self, runtime: &Runtime, pipeline_cache: Cache, module_cache: Cache) {
    let mut bound = runtime.copy();
    bound.bind_caches(module_cache.clone(), pipeline_cache.clone());
    self.runtime = Some(bound);
    self.module_cache = module_cache;
    self.pipeline_cache = pipeline_cache;
  }

  pub fn runtime(&self) -> ForgeResult<&Runtime> {
    self.runtime.as_ref().ok_or_else(|| ForgeError::NotInitialized {
      what: format!("runtime of module '{}'", self.name),
    })
  }

  pub fn module_cache(&self) -> &Cache {
    &self.module_cache
  }

  pub fn pipeline_cache(&self) -> &Cache {
    &self.pipeline_cache
  }

  pub fn append_post_hook(&mut self, hook: Arc<dyn PostHook>) {
    self.post_hooks.push(hook);
  }

  pub fn post_hooks(&self) -> &[Arc<dyn PostHook>] {
    &self.post_hooks
  }
}

impl fmt::Debug for ModuleBase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ModuleBase")
      .field("name", &self.name)
      .field("skip", &self.skip)
      .field("bound", &self.runtime.is_some())
      .field("post_hooks", &self.post_hooks.len())
      .finish()
  }
}
