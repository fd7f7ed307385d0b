// kubeforge/src/pipeline/definition.rs

//! The `Pipeline` struct and the methods that assemble it.

use crate::cache::Cache;
use crate::core::ModuleResult;
use crate::module::{Module, PostHook};
use crate::runtime::Runtime;
use std::fmt;
use std::sync::Arc;

/// An ordered list of modules forming one end-to-end operation, plus the cache that
/// carries facts across them.
pub struct Pipeline {
  pub(crate) name: String,
  pub(crate) runtime: Runtime,
  pub(crate) modules: Vec<Box<dyn Module>>,
  pub(crate) pipeline_cache: Cache,
  pub(crate) post_hooks: Vec<Arc<dyn PostHook>>,
  pub(crate) results: Vec<ModuleResult>,
}

impl Pipeline {
  pub fn new(name: impl Into<String>, runtime: Runtime) -> Self {
    Self {
      name: name.into(),
      runtime,
      modules: Vec::new(),
      pipeline_cache: Cache::new(),
      post_hooks: Vec::new(),
      results: Vec::new(),
    }
  }

  /// Uses a caller-provided pipeline cache, e.g. one pre-seeded with facts.
  pub fn with_cache(mut self, cache: Cache) -> Self {
    self.pipeline_cache = cache;
    self
  }

  pub fn with_module(mut self, module: impl Module + 'static) -> Self {
    self.push_module(Box::new(module));
    self
  }

  pub fn with_boxed_module(mut self, module: Box<dyn Module>) -> Self {
    self.push_module(module);
    self
  }

  /// Appends `hook` to every module, including ones added later.
  pub fn with_post_hook(mut self, hook: impl PostHook + 'static) -> Self {
    let hook: Arc<dyn PostHook> = Arc::new(hook);
    for module in &mut self.modules {
      module.append_post_hook(hook.clone());
    }
    self.post_hooks.push(hook);
    self
  }

  pub fn push_module(&mut self, mut module: Box<dyn Module>) {
    for hook in &self.post_hooks {
      module.append_post_hook(hook.clone());
    }
    self.modules.push(module);
  }

  /// Removes the first module called `name`. Returns whether one was found.
  pub fn remove_module(&mut self, name: &str) -> bool {
    match self.modules.iter().position(|m| m.name() == name) {
      Some(idx) => {
        self.modules.remove(idx);
        true
      }
      None => false,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn runtime(&self) -> &Runtime {
    &self.runtime
  }

  pub fn cache(&self) -> &Cache {
    &self.pipeline_cache
  }

  pub fn module_names(&self) -> Vec<&str> {
    self.modules.iter().map(|m| m.name()).collect()
  }

  /// Results of the modules the last `start` reached, in order.
  pub fn module_results(&self) -> &[ModuleResult] {
    &self.results
  }
}

impl fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pipeline")
      .field("name", &self.name)
      .field("modules", &self.module_names())
      .field("post_hooks", &self.post_hooks.len())
      .finish()
  }
}
