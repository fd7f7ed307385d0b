// kubeforge/src/pipeline/execution.rs

//! `Pipeline::start()`: runs the modules in order and tears the run down.

use crate::error::{ForgeError, ForgeResult};
use crate::module::run_module;
use crate::pipeline::definition::Pipeline;
use tracing::{event, instrument, Level};

impl Pipeline {
  /// Runs every module in order, stopping at the first failed one.
  ///
  /// Whatever the outcome, the pipeline cache is cleaned and every pooled connection
  /// is closed before returning. A module failure comes back as
  /// [`ForgeError::PipelineFailed`] wrapping [`ForgeError::ModuleFailed`]. If all
  /// modules succeeded but hosts were dropped along the way (see
  /// [`crate::Runtime::ignore_error`]), the result is [`ForgeError::HostsFailed`].
  #[instrument(
    name = "Pipeline::start",
    skip_all,
    fields(pipeline = %self.name, num_modules = self.modules.len()),
    err(Display)
  )]
  pub async fn start(&mut self) -> ForgeResult<()> {
    event!(Level::DEBUG, "Pipeline execution starting.");
    let initial_hosts = self.runtime.host_count();
    self.results.clear();

    let outcome = self.run_modules().await;

    self.pipeline_cache.clean();
    self.runtime.dialer().close_all().await;

    if let Err(source) = outcome {
      return Err(ForgeError::PipelineFailed {
        pipeline: self.name.clone(),
        source: Box::new(source),
      });
    }

    let remaining = self.runtime.host_count();
    if remaining < initial_hosts {
      event!(Level::WARN, failed = initial_hosts - remaining, "Pipeline finished with dropped hosts.");
      return Err(ForgeError::HostsFailed {
        pipeline: self.name.clone(),
        failed: initial_hosts - remaining,
      });
    }

    event!(Level::INFO, "Pipeline[{}] execute successfully", self.name);
    Ok(())
  }

  async fn run_modules(&mut self) -> ForgeResult<()> {
    for module in self.modules.iter_mut() {
      let mut result = run_module(module.as_mut(), &self.runtime, &self.pipeline_cache).await;
      if result.is_failed() {
        let source = result
          .error
          .take()
          .unwrap_or_else(|| ForgeError::Internal("module failed without an error".to_string()));
        let module_name = result.module.clone();
        event!(Level::ERROR, module = %module_name, error = %source, "Module failed.");
        self.results.push(result);
        return Err(ForgeError::ModuleFailed {
          module: module_name,
          source: Box::new(source),
        });
      }
      self.results.push(result);
    }
    Ok(())
  }
}
